//! Service lifecycle abstraction.
//!
//! The orchestrator and reset tool talk to the init system only through
//! the [`ServiceLifecycle`] trait. One concrete backend exists today
//! (systemd, [`SystemdLifecycle`]); other init systems or container
//! supervisors would implement the same contract.

mod systemd;

pub use systemd::SystemdLifecycle;

use std::path::Path;

use crate::error::SetupError;

/// Live state of the monitoring unit. Derived on each query, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// The unit was never installed.
    NotInstalled,
    /// Installed but inactive.
    InstalledStopped,
    /// Installed and active.
    InstalledRunning,
    /// Installed and in a failed state (e.g. the process exited non-zero).
    Failed,
    /// The init system could not be queried.
    Unknown,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not installed",
            Self::InstalledStopped => "stopped",
            Self::InstalledRunning => "running",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Managed-unit operations the provisioning suite needs.
///
/// Every mutation is idempotent: calling it when the unit is already in
/// the target state returns success, not an error. At-most-one running
/// instance of the monitored process is the init system's own per-unit
/// guarantee; no extra mutex here.
pub trait ServiceLifecycle {
    /// Register the monitoring process as a managed unit. Reinstalling
    /// with identical parameters is a no-op success.
    fn install(&self, exec_path: &Path) -> Result<(), SetupError>;

    /// Remove the unit registration. Success when never installed.
    fn uninstall(&self) -> Result<(), SetupError>;

    fn start(&self) -> Result<(), SetupError>;
    fn stop(&self) -> Result<(), SetupError>;
    fn enable(&self) -> Result<(), SetupError>;
    fn disable(&self) -> Result<(), SetupError>;

    /// Live unit state. Query failures map to [`ServiceState::Unknown`],
    /// never an error.
    fn status(&self) -> ServiceState;

    /// Drop retained service logs. Best-effort; success when there is
    /// nothing to purge.
    fn purge_logs(&self) -> Result<(), SetupError>;
}
