//! systemd backend for [`ServiceLifecycle`].
//!
//! Unit management is file-based: `install` renders the unit descriptor,
//! writes it atomically under `/etc/systemd/system`, and asks systemd to
//! reload. Control operations shell out to `systemctl`, which serializes
//! concurrent operations against the same unit name itself.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::error::SetupError;
use crate::paths::{Paths, SERVICE_NAME};
use crate::service::{ServiceLifecycle, ServiceState};

pub struct SystemdLifecycle {
    unit_file: PathBuf,
    work_dir: PathBuf,
}

impl SystemdLifecycle {
    pub fn new(paths: &Paths) -> Self {
        Self {
            unit_file: paths.unit_file.clone(),
            work_dir: paths.work_dir.clone(),
        }
    }

    /// Render the unit descriptor: restart-always with a 10 second
    /// backoff, fixed working directory, output to the journal.
    fn render_unit(&self, exec_path: &Path) -> String {
        format!(
            "\
[Unit]
Description=Power Monitor Service
After=network.target
Wants=network.target

[Service]
Type=simple
User=pi
Group=pi
WorkingDirectory={work_dir}
ExecStart={exec}
Restart=always
RestartSec=10
StandardOutput=journal
StandardError=journal

[Install]
WantedBy=multi-user.target
",
            work_dir = self.work_dir.display(),
            exec = exec_path.display(),
        )
    }

    fn systemctl(args: &[&str]) -> Result<std::process::Output, std::io::Error> {
        Command::new("systemctl").args(args).output()
    }

    fn daemon_reload() -> Result<(), SetupError> {
        let output = Self::systemctl(&["daemon-reload"])
            .map_err(|e| SetupError::ServiceInstallFailed(format!("daemon-reload: {e}")))?;
        if !output.status.success() {
            return Err(SetupError::ServiceInstallFailed(format!(
                "daemon-reload: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl ServiceLifecycle for SystemdLifecycle {
    fn install(&self, exec_path: &Path) -> Result<(), SetupError> {
        let rendered = self.render_unit(exec_path);

        // Reinstall with identical parameters is a no-op.
        if let Ok(existing) = fs::read_to_string(&self.unit_file) {
            if existing == rendered {
                debug!(unit = SERVICE_NAME, "unit already installed, unchanged");
                return Ok(());
            }
        }

        let parent = self.unit_file.parent().ok_or_else(|| {
            SetupError::ServiceInstallFailed(format!(
                "unit path has no parent: {}",
                self.unit_file.display()
            ))
        })?;
        fs::create_dir_all(parent)
            .map_err(|e| SetupError::ServiceInstallFailed(e.to_string()))?;

        let tmp = self.unit_file.with_extension("service.tmp");
        (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(rendered.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.unit_file)
        })()
        .map_err(|e| SetupError::ServiceInstallFailed(e.to_string()))?;

        Self::daemon_reload()?;
        info!(unit = SERVICE_NAME, "unit installed");
        Ok(())
    }

    fn uninstall(&self) -> Result<(), SetupError> {
        match fs::remove_file(&self.unit_file) {
            Ok(()) => {
                // Best-effort reload; the file is already gone.
                if let Err(e) = Self::daemon_reload() {
                    warn!(error = %e, "daemon-reload after uninstall failed");
                }
                info!(unit = SERVICE_NAME, "unit uninstalled");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SetupError::ServiceCommandFailed(e.to_string())),
        }
    }

    fn start(&self) -> Result<(), SetupError> {
        if self.status() == ServiceState::InstalledRunning {
            return Ok(());
        }
        let output = Self::systemctl(&["start", SERVICE_NAME])
            .map_err(|e| SetupError::ServiceInstallFailed(format!("start: {e}")))?;
        if !output.status.success() {
            return Err(SetupError::ServiceInstallFailed(format!(
                "start rejected: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), SetupError> {
        if self.status() == ServiceState::NotInstalled {
            return Ok(());
        }
        let output = Self::systemctl(&["stop", SERVICE_NAME])
            .map_err(|e| SetupError::ServiceCommandFailed(format!("stop: {e}")))?;
        if !output.status.success() {
            return Err(SetupError::ServiceCommandFailed(format!(
                "stop rejected: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn enable(&self) -> Result<(), SetupError> {
        let output = Self::systemctl(&["enable", SERVICE_NAME])
            .map_err(|e| SetupError::ServiceInstallFailed(format!("enable: {e}")))?;
        if !output.status.success() {
            return Err(SetupError::ServiceInstallFailed(format!(
                "enable rejected: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn disable(&self) -> Result<(), SetupError> {
        if self.status() == ServiceState::NotInstalled {
            return Ok(());
        }
        let output = Self::systemctl(&["disable", SERVICE_NAME])
            .map_err(|e| SetupError::ServiceCommandFailed(format!("disable: {e}")))?;
        if !output.status.success() {
            return Err(SetupError::ServiceCommandFailed(format!(
                "disable rejected: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn status(&self) -> ServiceState {
        let output = match Self::systemctl(&[
            "show",
            SERVICE_NAME,
            "--property=LoadState,ActiveState,SubState,Result",
            "--no-pager",
        ]) {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "systemctl show failed"
                );
                return ServiceState::Unknown;
            }
            Err(e) => {
                warn!(error = %e, "could not run systemctl");
                return ServiceState::Unknown;
            }
        };
        parse_show_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn purge_logs(&self) -> Result<(), SetupError> {
        // Output goes to the journal; rotate then vacuum. Failures are
        // logged, not fatal: a freshly imaged host may have no journal yet.
        for args in [
            &["--rotate"][..],
            &["--vacuum-time=1s", "--quiet"][..],
        ] {
            match Command::new("journalctl").args(args).output() {
                Ok(output) if output.status.success() => {}
                Ok(output) => warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "journal purge step failed"
                ),
                Err(e) => warn!(error = %e, "could not run journalctl"),
            }
        }
        Ok(())
    }
}

/// Map `systemctl show` property output onto [`ServiceState`].
///
/// The distinctions the orchestrator needs:
/// - `LoadState=not-found` → the unit was never installed.
/// - `ActiveState=failed`, or crash-looping under `Restart=always`
///   (`activating` + `auto-restart`), or inactive with a non-success
///   `Result` → failed.
/// - otherwise active means running, inactive means stopped.
fn parse_show_output(stdout: &str) -> ServiceState {
    let mut load_state = "";
    let mut active_state = "";
    let mut sub_state = "";
    let mut result = "";
    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key {
                "LoadState" => load_state = value.trim(),
                "ActiveState" => active_state = value.trim(),
                "SubState" => sub_state = value.trim(),
                "Result" => result = value.trim(),
                _ => {}
            }
        }
    }

    if load_state == "not-found" {
        return ServiceState::NotInstalled;
    }
    match active_state {
        "failed" => ServiceState::Failed,
        "activating" if sub_state == "auto-restart" => ServiceState::Failed,
        "active" | "activating" | "reloading" => ServiceState::InstalledRunning,
        "inactive" | "deactivating" => {
            if result.is_empty() || result == "success" {
                ServiceState::InstalledStopped
            } else {
                ServiceState::Failed
            }
        }
        _ => ServiceState::Unknown,
    }
}
