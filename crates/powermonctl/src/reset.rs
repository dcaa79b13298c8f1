//! Imaging-prep reset.
//!
//! Returns a configured device to pristine state so its storage can be
//! cloned for a new site. Every step is individually idempotent: a step
//! whose target state already holds is skipped silently, so a reset
//! interrupted half-way completes on the next invocation.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use powermon_common::config::ConfigStore;
use powermon_common::error::SetupError;
use powermon_common::lock::ProvisionLock;
use powermon_common::marker::MarkerStore;
use powermon_common::paths::Paths;
use powermon_common::service::ServiceLifecycle;

/// Execute the full reset.
///
/// Fails fast with [`SetupError::LockContention`] while a provisioning
/// attempt is in progress; never races the orchestrator.
pub fn run(paths: &Paths, service: &dyn ServiceLifecycle) -> Result<(), SetupError> {
    let _lock = ProvisionLock::acquire(&paths.lock_file, "reset")?;

    info!("stopping and removing the monitoring service");
    service.stop()?;
    service.disable()?;
    service.uninstall()?;

    info!("removing device configuration and setup marker");
    ConfigStore::new(paths).remove()?;
    MarkerStore::new(paths).remove()?;

    info!("purging service logs and working files");
    service.purge_logs()?;
    purge_work_files(&paths.work_dir)?;

    info!("purging host identity");
    purge_host_keys(&paths.ssh_dir)?;
    clear_session_history(&paths.home_dir)?;

    info!("device reset to unconfigured state");
    Ok(())
}

/// Remove temporary and log files the monitoring process left in its
/// working directory. The directory itself and the executable stay.
fn purge_work_files(work_dir: &Path) -> Result<(), SetupError> {
    let entries = match fs::read_dir(work_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".tmp") || name.ends_with(".log") {
            debug!(file = %entry.path().display(), "removing work file");
            remove_if_present(&entry.path())?;
        }
    }
    Ok(())
}

/// Remove persistent SSH host keys so a cloned image does not share its
/// identity with this device. Keys are regenerated on first boot.
fn purge_host_keys(ssh_dir: &Path) -> Result<(), SetupError> {
    let entries = match fs::read_dir(ssh_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("ssh_host_") {
            debug!(file = %entry.path().display(), "removing host key");
            remove_if_present(&entry.path())?;
        }
    }
    Ok(())
}

/// Drop retained interactive shell history.
fn clear_session_history(home_dir: &Path) -> Result<(), SetupError> {
    for name in [".bash_history", ".zsh_history"] {
        remove_if_present(&home_dir.join(name))?;
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), SetupError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "could not remove file");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn purge_work_files_keeps_executable() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("opt/powermonitor");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("powermond"), b"#!").unwrap();
        fs::write(work.join("readings.tmp"), b"x").unwrap();
        fs::write(work.join("debug.log"), b"x").unwrap();

        purge_work_files(&work).unwrap();

        assert!(work.join("powermond").exists());
        assert!(!work.join("readings.tmp").exists());
        assert!(!work.join("debug.log").exists());
    }

    #[test]
    fn purge_host_keys_only_touches_host_keys() {
        let temp = TempDir::new().unwrap();
        let ssh = temp.path().join("etc/ssh");
        fs::create_dir_all(&ssh).unwrap();
        fs::write(ssh.join("ssh_host_ed25519_key"), b"k").unwrap();
        fs::write(ssh.join("ssh_host_ed25519_key.pub"), b"k").unwrap();
        fs::write(ssh.join("sshd_config"), b"cfg").unwrap();

        purge_host_keys(&ssh).unwrap();

        assert!(!ssh.join("ssh_host_ed25519_key").exists());
        assert!(!ssh.join("ssh_host_ed25519_key.pub").exists());
        assert!(ssh.join("sshd_config").exists());
    }

    #[test]
    fn missing_directories_are_silently_skipped() {
        let temp = TempDir::new().unwrap();
        purge_work_files(&temp.path().join("nope")).unwrap();
        purge_host_keys(&temp.path().join("nope")).unwrap();
        clear_session_history(&temp.path().join("nope")).unwrap();
    }
}
