//! Well-known filesystem locations for the power monitor installation.
//!
//! Every store in this crate takes its location from a [`Paths`] value
//! instead of hard-coded constants so tests can point the whole suite at a
//! temporary directory.

use std::path::{Path, PathBuf};

/// Unit name registered with the init system.
pub const SERVICE_NAME: &str = "powermonitor";

/// Filesystem layout of a provisioned device.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Device configuration (`KEY=VALUE` file).
    pub config_file: PathBuf,
    /// Setup-complete marker.
    pub marker_file: PathBuf,
    /// Exclusive provisioning lock.
    pub lock_file: PathBuf,
    /// Rendered systemd unit file.
    pub unit_file: PathBuf,
    /// Working directory of the monitoring process.
    pub work_dir: PathBuf,
    /// Monitoring process executable registered in the unit file.
    pub monitor_exec: PathBuf,
    /// IANA timezone database root.
    pub zoneinfo_dir: PathBuf,
    /// SSH host key directory (purged by the reset tool).
    pub ssh_dir: PathBuf,
    /// Home directory whose shell history the reset tool clears.
    pub home_dir: PathBuf,
}

impl Paths {
    /// Layout used on a real device.
    pub fn system() -> Self {
        Self {
            config_file: PathBuf::from("/etc/powermonitor/config.conf"),
            marker_file: PathBuf::from("/opt/powermonitor/.setup_complete"),
            lock_file: PathBuf::from("/run/powermonitor/provision.lock"),
            unit_file: PathBuf::from("/etc/systemd/system/powermonitor.service"),
            work_dir: PathBuf::from("/opt/powermonitor"),
            monitor_exec: PathBuf::from("/opt/powermonitor/powermond"),
            zoneinfo_dir: PathBuf::from("/usr/share/zoneinfo"),
            ssh_dir: PathBuf::from("/etc/ssh"),
            home_dir: PathBuf::from("/home/pi"),
        }
    }

    /// Same layout rooted under an arbitrary directory. Test use only.
    pub fn under_root(root: &Path) -> Self {
        Self {
            config_file: root.join("etc/powermonitor/config.conf"),
            marker_file: root.join("opt/powermonitor/.setup_complete"),
            lock_file: root.join("run/powermonitor/provision.lock"),
            unit_file: root.join("etc/systemd/system/powermonitor.service"),
            work_dir: root.join("opt/powermonitor"),
            monitor_exec: root.join("opt/powermonitor/powermond"),
            zoneinfo_dir: root.join("usr/share/zoneinfo"),
            ssh_dir: root.join("etc/ssh"),
            home_dir: root.join("home/pi"),
        }
    }
}
