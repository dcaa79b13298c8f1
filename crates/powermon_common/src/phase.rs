//! Derived device lifecycle phase.
//!
//! Never stored. Computed from three facts: whether the provisioning lock
//! is held, whether the setup marker exists, and the live service state.

use crate::service::ServiceState;

/// Where the device is in its provisioning lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No configuration, no marker. Next interactive session runs the
    /// wizard.
    Unconfigured,
    /// Provisioning lock held, marker not yet written.
    Configuring,
    /// Provisioned and the service is running.
    ConfiguredRunning,
    /// Provisioned but the service is not running.
    ConfiguredStopped,
}

impl LifecyclePhase {
    /// Derive the phase from current facts.
    ///
    /// A configuration left behind by a failed attempt (config present,
    /// marker absent, no lock held) still derives `Unconfigured`: the next
    /// invocation redoes the wizard from scratch.
    pub fn derive(lock_held: bool, marker_complete: bool, service: ServiceState) -> Self {
        if marker_complete {
            match service {
                ServiceState::InstalledRunning => Self::ConfiguredRunning,
                _ => Self::ConfiguredStopped,
            }
        } else if lock_held {
            Self::Configuring
        } else {
            Self::Unconfigured
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configuring => "configuring",
            Self::ConfiguredRunning => "configured (running)",
            Self::ConfiguredStopped => "configured (stopped)",
        }
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_drives_configured_phases() {
        assert_eq!(
            LifecyclePhase::derive(false, true, ServiceState::InstalledRunning),
            LifecyclePhase::ConfiguredRunning
        );
        assert_eq!(
            LifecyclePhase::derive(false, true, ServiceState::InstalledStopped),
            LifecyclePhase::ConfiguredStopped
        );
        assert_eq!(
            LifecyclePhase::derive(false, true, ServiceState::Failed),
            LifecyclePhase::ConfiguredStopped
        );
    }

    #[test]
    fn lock_without_marker_is_configuring() {
        assert_eq!(
            LifecyclePhase::derive(true, false, ServiceState::NotInstalled),
            LifecyclePhase::Configuring
        );
    }

    #[test]
    fn nothing_means_unconfigured() {
        assert_eq!(
            LifecyclePhase::derive(false, false, ServiceState::NotInstalled),
            LifecyclePhase::Unconfigured
        );
    }
}
