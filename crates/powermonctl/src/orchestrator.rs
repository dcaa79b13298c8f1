//! Provisioning orchestrator.
//!
//! Decides, on each interactive session start, which provisioning step (if
//! any) runs next. Safe to invoke on every login: the whole flow runs
//! under the exclusive provisioning lock, and completion is recorded only
//! after every prior step succeeded, so an interrupted attempt is redone
//! from scratch instead of resumed half-way.

use tracing::{debug, error, info, warn};

use powermon_common::config::{ConfigStore, DeviceConfiguration};
use powermon_common::error::SetupError;
use powermon_common::lock::ProvisionLock;
use powermon_common::marker::{MarkerStore, SetupMarker};
use powermon_common::paths::Paths;
use powermon_common::service::{ServiceLifecycle, ServiceState};
use powermon_common::timezone;

use crate::wizard::generate_device_id;

/// What a `check_and_run` invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First-time provisioning completed: config saved, service running,
    /// marker written.
    Provisioned,
    /// An already-provisioned device was reconfigured.
    Reconfigured,
    /// Device is provisioned; summary reported, no menu (non-interactive).
    AlreadyConfigured,
    /// Device is unconfigured but the session is non-interactive; nothing
    /// was changed.
    SetupRequired,
    /// Operator chose to skip (or the menu timed out).
    Skipped,
    /// Operator cancelled the wizard; nothing was changed.
    Cancelled,
}

/// Operator's choice from the configured-device menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Reconfigure,
    ViewLogs,
    Skip,
}

/// Values the wizard pre-fills.
#[derive(Debug, Clone)]
pub struct WizardDefaults {
    /// Current configuration, when reconfiguring.
    pub existing: Option<DeviceConfiguration>,
    /// Hardware-derived device id suggestion.
    pub device_id: String,
    /// Timezone from the best-effort network lookup, if it succeeded.
    pub detected_timezone: Option<String>,
}

/// The interactive wizard collecting a device configuration.
///
/// `Ok(None)` means the operator cancelled; provisioning is aborted with
/// nothing changed.
pub trait Wizard {
    fn collect(
        &mut self,
        defaults: &WizardDefaults,
    ) -> Result<Option<DeviceConfiguration>, SetupError>;
}

/// Session-facing rendering the orchestrator delegates: the configured
/// summary, the single-key menu, and the log tail.
pub trait SessionUi {
    fn show_summary(
        &mut self,
        config: Option<&DeviceConfiguration>,
        marker: Option<&SetupMarker>,
        state: ServiceState,
    );

    /// Single-key choice with a bounded wait; no key press defaults to
    /// [`MenuChoice::Skip`].
    fn menu_choice(&mut self) -> MenuChoice;

    /// Stream the service log tail until interrupted.
    fn stream_logs(&mut self);

    fn notify(&mut self, message: &str);
}

pub struct Orchestrator<'a> {
    paths: Paths,
    config: ConfigStore,
    marker: MarkerStore,
    service: &'a dyn ServiceLifecycle,
    timezone_lookup: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(paths: Paths, service: &'a dyn ServiceLifecycle) -> Self {
        let config = ConfigStore::new(&paths);
        let marker = MarkerStore::new(&paths);
        Self {
            paths,
            config,
            marker,
            service,
            timezone_lookup: true,
        }
    }

    /// Disable the network timezone lookup (offline operation, tests).
    pub fn with_timezone_lookup(mut self, enabled: bool) -> Self {
        self.timezone_lookup = enabled;
        self
    }

    /// Idempotent session-start check.
    ///
    /// Acquires the provisioning lock for the whole invocation; a second
    /// concurrent session gets [`SetupError::LockContention`] immediately
    /// and never launches a second wizard.
    pub async fn check_and_run(
        &self,
        interactive: bool,
        wizard: &mut dyn Wizard,
        ui: &mut dyn SessionUi,
    ) -> Result<Outcome, SetupError> {
        let _lock = ProvisionLock::acquire(&self.paths.lock_file, "provision")?;

        if !self.marker.is_complete() {
            if !interactive {
                debug!("unconfigured device, non-interactive session; skipping wizard");
                return Ok(Outcome::SetupRequired);
            }
            return self.provision(wizard, ui).await;
        }

        loop {
            let config = match self.config.load() {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(error = %e, "marker present but configuration unreadable");
                    ui.notify("Configuration is unreadable; choose reconfigure to repair it.");
                    None
                }
            };
            ui.show_summary(
                config.as_ref(),
                self.marker.read().as_ref(),
                self.service.status(),
            );

            if !interactive {
                return Ok(Outcome::AlreadyConfigured);
            }

            match ui.menu_choice() {
                MenuChoice::Reconfigure => return self.provision(wizard, ui).await,
                MenuChoice::ViewLogs => ui.stream_logs(),
                MenuChoice::Skip => return Ok(Outcome::Skipped),
            }
        }
    }

    /// Run the wizard and apply its result: save, install, enable, start,
    /// then record completion. All-or-nothing: on any failure the
    /// configuration from this attempt is discarded (restored to the prior
    /// value, or removed) and the marker is left untouched.
    async fn provision(
        &self,
        wizard: &mut dyn Wizard,
        ui: &mut dyn SessionUi,
    ) -> Result<Outcome, SetupError> {
        let reconfiguring = self.marker.is_complete();
        let prior = self.config.snapshot()?;
        let existing = self.config.load().ok();

        // One best-effort lookup; a miss just means the wizard prompts.
        let detected_timezone = if existing.is_none() && self.timezone_lookup {
            match timezone::detect_timezone().await {
                Ok(zone) => Some(zone),
                Err(e) => {
                    debug!(error = %e, "timezone auto-detect failed, wizard will prompt");
                    None
                }
            }
        } else {
            None
        };

        let defaults = WizardDefaults {
            device_id: existing
                .as_ref()
                .map(|c| c.device_id.clone())
                .unwrap_or_else(generate_device_id),
            existing,
            detected_timezone,
        };

        let Some(config) = wizard.collect(&defaults)? else {
            info!("wizard cancelled, nothing changed");
            return Ok(Outcome::Cancelled);
        };

        self.config.save(&config)?;
        ui.notify("Configuration saved.");

        match self.install_cycle(reconfiguring) {
            Ok(()) => {
                if !self.marker.is_complete() {
                    self.marker.write()?;
                }
                info!(device_id = %config.device_id, "provisioning complete");
                ui.notify("Power monitor service installed and started.");
                Ok(if reconfiguring {
                    Outcome::Reconfigured
                } else {
                    Outcome::Provisioned
                })
            }
            Err(e) => {
                error!(error = %e, "provisioning failed, rolling back");
                self.rollback(prior, reconfiguring);
                Err(e)
            }
        }
    }

    fn install_cycle(&self, restart: bool) -> Result<(), SetupError> {
        self.service.install(&self.paths.monitor_exec)?;
        self.service.enable()?;
        if restart {
            // Running service picks up the new configuration on restart.
            self.service.stop()?;
        }
        self.service.start()
    }

    /// Undo this attempt's configuration write. A previously working
    /// device is restored byte-for-byte and brought back up; a first-time
    /// attempt leaves no configuration behind.
    fn rollback(&self, prior: Option<Vec<u8>>, reconfiguring: bool) {
        let restored = match prior {
            Some(bytes) => self.config.write_raw(&bytes),
            None => self.config.remove(),
        };
        if let Err(e) = restored {
            error!(error = %e, "rollback of configuration failed");
            return;
        }
        if reconfiguring {
            if let Err(e) = self.service.start() {
                warn!(error = %e, "could not restart service with restored configuration");
            }
        }
    }
}
