//! Error types shared across the provisioning suite.

use thiserror::Error;

/// Errors produced by the configuration store, lock, service manager, and
/// orchestration flows.
///
/// Validation and lock errors are resolved where they occur (re-prompt,
/// report-and-retry-later); install and service errors propagate to the
/// top-level caller.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration failed validation. The wizard re-prompts locally.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// No configuration present. Expected while unconfigured.
    #[error("no device configuration present")]
    ConfigurationMissing,

    /// The init system rejected the unit descriptor or refused to
    /// enable/start it. Fatal for the current provisioning attempt.
    #[error("service install failed: {0}")]
    ServiceInstallFailed(String),

    /// A stop/disable/uninstall request failed unexpectedly.
    #[error("service command failed: {0}")]
    ServiceCommandFailed(String),

    /// The init system could not be queried; status becomes `unknown`.
    #[error("service status query failed: {0}")]
    ServiceQueryFailed(String),

    /// Another provisioning or reset attempt holds the lock.
    #[error("provisioning lock held by pid {pid} for {age_secs}s")]
    LockContention { pid: u32, age_secs: u64 },

    /// Best-effort timezone lookup failed; caller falls back to a manual
    /// prompt.
    #[error("timezone detection failed: {0}")]
    TimezoneDetectionFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SetupError {
    /// True for errors the caller should resolve locally rather than abort
    /// the session over.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationInvalid(_)
                | Self::ConfigurationMissing
                | Self::LockContention { .. }
                | Self::TimezoneDetectionFailed(_)
        )
    }
}
