//! End-to-end provisioning, reconfiguration, and reset flows against a
//! fake service backend and a scripted wizard.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use chrono::Utc;
use tempfile::TempDir;

use powermon_common::config::{ConfigStore, DeviceConfiguration, DEFAULT_SERVER_URL};
use powermon_common::error::SetupError;
use powermon_common::lock::ProvisionLock;
use powermon_common::marker::{MarkerStore, SetupMarker};
use powermon_common::paths::Paths;
use powermon_common::phase::LifecyclePhase;
use powermon_common::service::{ServiceLifecycle, ServiceState};
use powermonctl::orchestrator::{
    MenuChoice, Orchestrator, Outcome, SessionUi, Wizard, WizardDefaults,
};
use powermonctl::reset;

#[derive(Debug, Default)]
struct FakeState {
    installed: bool,
    enabled: bool,
    running: bool,
    failed: bool,
    install_calls: usize,
    start_calls: usize,
    logs_purged: bool,
    fail_install: bool,
    fail_start: bool,
}

/// In-memory init system double.
#[derive(Debug, Default)]
struct FakeService {
    state: RefCell<FakeState>,
}

impl FakeService {
    fn snapshot(&self) -> FakeState {
        let s = self.state.borrow();
        FakeState {
            installed: s.installed,
            enabled: s.enabled,
            running: s.running,
            failed: s.failed,
            install_calls: s.install_calls,
            start_calls: s.start_calls,
            logs_purged: s.logs_purged,
            fail_install: s.fail_install,
            fail_start: s.fail_start,
        }
    }

    fn set_fail_start(&self, fail: bool) {
        self.state.borrow_mut().fail_start = fail;
    }

    fn set_fail_install(&self, fail: bool) {
        self.state.borrow_mut().fail_install = fail;
    }

    fn halt(&self) {
        self.state.borrow_mut().running = false;
    }
}

impl ServiceLifecycle for FakeService {
    fn install(&self, _exec_path: &Path) -> Result<(), SetupError> {
        let mut s = self.state.borrow_mut();
        s.install_calls += 1;
        if s.fail_install {
            return Err(SetupError::ServiceInstallFailed("unit rejected".into()));
        }
        s.installed = true;
        Ok(())
    }

    fn uninstall(&self) -> Result<(), SetupError> {
        let mut s = self.state.borrow_mut();
        s.installed = false;
        s.running = false;
        s.failed = false;
        Ok(())
    }

    fn start(&self) -> Result<(), SetupError> {
        let mut s = self.state.borrow_mut();
        s.start_calls += 1;
        if s.fail_start {
            return Err(SetupError::ServiceInstallFailed("start rejected".into()));
        }
        if !s.installed {
            return Err(SetupError::ServiceInstallFailed("unit not installed".into()));
        }
        s.running = true;
        Ok(())
    }

    fn stop(&self) -> Result<(), SetupError> {
        self.state.borrow_mut().running = false;
        Ok(())
    }

    fn enable(&self) -> Result<(), SetupError> {
        let mut s = self.state.borrow_mut();
        if !s.installed {
            return Err(SetupError::ServiceInstallFailed("unit not installed".into()));
        }
        s.enabled = true;
        Ok(())
    }

    fn disable(&self) -> Result<(), SetupError> {
        self.state.borrow_mut().enabled = false;
        Ok(())
    }

    fn status(&self) -> ServiceState {
        let s = self.state.borrow();
        if !s.installed {
            ServiceState::NotInstalled
        } else if s.failed {
            ServiceState::Failed
        } else if s.running {
            ServiceState::InstalledRunning
        } else {
            ServiceState::InstalledStopped
        }
    }

    fn purge_logs(&self) -> Result<(), SetupError> {
        self.state.borrow_mut().logs_purged = true;
        Ok(())
    }
}

/// Wizard double returning a canned configuration (or cancelling).
#[derive(Default)]
struct ScriptedWizard {
    config: Option<DeviceConfiguration>,
    calls: usize,
    seen_defaults: Option<WizardDefaults>,
}

impl Wizard for ScriptedWizard {
    fn collect(
        &mut self,
        defaults: &WizardDefaults,
    ) -> Result<Option<DeviceConfiguration>, SetupError> {
        self.calls += 1;
        self.seen_defaults = Some(defaults.clone());
        Ok(self.config.clone())
    }
}

/// Session UI double replaying scripted menu choices.
#[derive(Default)]
struct ScriptedUi {
    choices: RefCell<VecDeque<MenuChoice>>,
    summaries: usize,
    logs_viewed: usize,
}

impl ScriptedUi {
    fn with_choices(choices: &[MenuChoice]) -> Self {
        Self {
            choices: RefCell::new(choices.iter().copied().collect()),
            ..Self::default()
        }
    }
}

impl SessionUi for ScriptedUi {
    fn show_summary(
        &mut self,
        _config: Option<&DeviceConfiguration>,
        _marker: Option<&SetupMarker>,
        _state: ServiceState,
    ) {
        self.summaries += 1;
    }

    fn menu_choice(&mut self) -> MenuChoice {
        self.choices
            .borrow_mut()
            .pop_front()
            .unwrap_or(MenuChoice::Skip)
    }

    fn stream_logs(&mut self) {
        self.logs_viewed += 1;
    }

    fn notify(&mut self, _message: &str) {}
}

fn test_paths(temp: &TempDir) -> Paths {
    let paths = Paths::under_root(temp.path());
    for zone in ["America/New_York", "Europe/Oslo", "UTC"] {
        let path = paths.zoneinfo_dir.join(zone);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"TZif").unwrap();
    }
    paths
}

fn sample_config() -> DeviceConfiguration {
    DeviceConfiguration {
        device_id: "garage-meter".into(),
        location_name: "Garage".into(),
        timezone: "America/New_York".into(),
        voltage: 240.0,
        ct_rating: vec![20.0; 6],
        server_url: DEFAULT_SERVER_URL.into(),
        created_at: Some(Utc::now()),
    }
}

fn orchestrator<'a>(paths: &Paths, service: &'a FakeService) -> Orchestrator<'a> {
    Orchestrator::new(paths.clone(), service).with_timezone_lookup(false)
}

#[tokio::test]
async fn unconfigured_noninteractive_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();

    let outcome = orchestrator(&paths, &service)
        .check_and_run(false, &mut wizard, &mut ui)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::SetupRequired);
    assert_eq!(wizard.calls, 0);
    assert!(!ConfigStore::new(&paths).exists());
    assert!(!MarkerStore::new(&paths).is_complete());
    assert_eq!(service.snapshot().install_calls, 0);
}

#[tokio::test]
async fn first_time_provisioning_installs_and_marks_complete() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let config = sample_config();
    let mut wizard = ScriptedWizard {
        config: Some(config.clone()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();

    let outcome = orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Provisioned);
    assert_eq!(ConfigStore::new(&paths).load().unwrap(), config);
    assert!(MarkerStore::new(&paths).is_complete());

    let state = service.snapshot();
    assert!(state.installed && state.enabled && state.running);
    assert_eq!(service.status(), ServiceState::InstalledRunning);
    assert_eq!(
        LifecyclePhase::derive(false, true, service.status()),
        LifecyclePhase::ConfiguredRunning
    );
}

#[tokio::test]
async fn wizard_cancel_leaves_device_untouched() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let mut wizard = ScriptedWizard::default(); // returns None: cancel
    let mut ui = ScriptedUi::default();

    let outcome = orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(wizard.calls, 1);
    assert!(!ConfigStore::new(&paths).exists());
    assert!(!MarkerStore::new(&paths).is_complete());
}

#[tokio::test]
async fn failed_start_rolls_back_configuration_and_marker() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    service.set_fail_start(true);
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();

    let result = orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await;

    assert!(matches!(result, Err(SetupError::ServiceInstallFailed(_))));
    // All-or-nothing: no marker, no leftover configuration.
    assert!(!MarkerStore::new(&paths).is_complete());
    assert!(!ConfigStore::new(&paths).exists());
}

#[tokio::test]
async fn failed_install_never_writes_marker() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    service.set_fail_install(true);
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();

    let result = orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await;

    assert!(matches!(result, Err(SetupError::ServiceInstallFailed(_))));
    assert!(!MarkerStore::new(&paths).is_complete());
    assert!(!ConfigStore::new(&paths).exists());

    // Crash-and-restart: marker true never coexists with absent config,
    // and the next interactive run redoes the wizard from scratch.
    service.set_fail_install(false);
    let outcome = orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Provisioned);
    assert_eq!(wizard.calls, 2);
}

#[tokio::test]
async fn configured_device_check_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();

    let orch = orchestrator(&paths, &service);
    orch.check_and_run(true, &mut wizard, &mut ui).await.unwrap();
    let bytes_before = fs::read(&paths.config_file).unwrap();
    let installs_before = service.snapshot().install_calls;

    // Second and third invocations: summary plus skip, nothing else.
    let mut ui = ScriptedUi::with_choices(&[MenuChoice::Skip]);
    let outcome = orch.check_and_run(true, &mut wizard, &mut ui).await.unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    let outcome = orch.check_and_run(false, &mut wizard, &mut ui).await.unwrap();
    assert_eq!(outcome, Outcome::AlreadyConfigured);

    assert_eq!(wizard.calls, 1);
    assert_eq!(service.snapshot().install_calls, installs_before);
    assert_eq!(fs::read(&paths.config_file).unwrap(), bytes_before);
    assert_eq!(service.status(), ServiceState::InstalledRunning);
}

#[tokio::test]
async fn menu_view_logs_returns_to_menu() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();
    let orch = orchestrator(&paths, &service);
    orch.check_and_run(true, &mut wizard, &mut ui).await.unwrap();

    let mut ui = ScriptedUi::with_choices(&[MenuChoice::ViewLogs, MenuChoice::Skip]);
    let outcome = orch.check_and_run(true, &mut wizard, &mut ui).await.unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(ui.logs_viewed, 1);
    assert_eq!(ui.summaries, 2);
}

#[tokio::test]
async fn reconfigure_prefills_existing_configuration() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let original = sample_config();
    let mut wizard = ScriptedWizard {
        config: Some(original.clone()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();
    let orch = orchestrator(&paths, &service);
    orch.check_and_run(true, &mut wizard, &mut ui).await.unwrap();

    let mut updated = original.clone();
    updated.location_name = "Main Panel".into();
    updated.voltage = 120.0;
    let mut wizard = ScriptedWizard {
        config: Some(updated.clone()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::with_choices(&[MenuChoice::Reconfigure]);
    let outcome = orch.check_and_run(true, &mut wizard, &mut ui).await.unwrap();

    assert_eq!(outcome, Outcome::Reconfigured);
    assert_eq!(
        wizard.seen_defaults.unwrap().existing.unwrap(),
        original
    );
    assert_eq!(ConfigStore::new(&paths).load().unwrap(), updated);
    assert!(MarkerStore::new(&paths).is_complete());
    assert_eq!(service.status(), ServiceState::InstalledRunning);
}

#[tokio::test]
async fn failed_reconfigure_restores_previous_configuration() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let original = sample_config();
    let mut wizard = ScriptedWizard {
        config: Some(original.clone()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();
    let orch = orchestrator(&paths, &service);
    orch.check_and_run(true, &mut wizard, &mut ui).await.unwrap();
    let bytes_before = fs::read(&paths.config_file).unwrap();

    service.set_fail_start(true);
    let mut updated = original.clone();
    updated.location_name = "Attic".into();
    let mut wizard = ScriptedWizard {
        config: Some(updated),
        ..Default::default()
    };
    let mut ui = ScriptedUi::with_choices(&[MenuChoice::Reconfigure]);
    let result = orch.check_and_run(true, &mut wizard, &mut ui).await;

    assert!(matches!(result, Err(SetupError::ServiceInstallFailed(_))));
    // Exactly as it was before the attempt.
    assert_eq!(fs::read(&paths.config_file).unwrap(), bytes_before);
    assert!(MarkerStore::new(&paths).is_complete());
    assert_eq!(ConfigStore::new(&paths).load().unwrap(), original);
}

#[tokio::test]
async fn held_lock_blocks_provisioning() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();

    let _held = ProvisionLock::acquire(&paths.lock_file, "provision").unwrap();
    let result = orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await;

    assert!(matches!(result, Err(SetupError::LockContention { .. })));
    // The second session never reaches the wizard.
    assert_eq!(wizard.calls, 0);
}

#[tokio::test]
async fn abandoned_attempt_redoes_wizard_from_scratch() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();

    // A prior attempt wrote configuration but died before the marker.
    ConfigStore::new(&paths).save(&sample_config()).unwrap();
    assert!(!MarkerStore::new(&paths).is_complete());

    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();
    let outcome = orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Provisioned);
    assert_eq!(wizard.calls, 1);
    // The leftover values were offered back as defaults.
    assert!(wizard.seen_defaults.unwrap().existing.is_some());
}

#[tokio::test]
async fn reset_from_running_reaches_unconfigured() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();
    orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await
        .unwrap();

    // Leave identity artifacts for the purge steps.
    fs::create_dir_all(&paths.ssh_dir).unwrap();
    fs::write(paths.ssh_dir.join("ssh_host_rsa_key"), b"k").unwrap();
    fs::create_dir_all(&paths.home_dir).unwrap();
    fs::write(paths.home_dir.join(".bash_history"), b"history").unwrap();

    reset::run(&paths, &service).unwrap();

    assert!(!ConfigStore::new(&paths).exists());
    assert!(!MarkerStore::new(&paths).is_complete());
    assert_eq!(service.status(), ServiceState::NotInstalled);
    let state = service.snapshot();
    assert!(!state.enabled && !state.running && state.logs_purged);
    assert!(!paths.ssh_dir.join("ssh_host_rsa_key").exists());
    assert!(!paths.home_dir.join(".bash_history").exists());
    assert_eq!(
        LifecyclePhase::derive(false, false, service.status()),
        LifecyclePhase::Unconfigured
    );
}

#[tokio::test]
async fn reset_from_stopped_reaches_unconfigured() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();
    orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await
        .unwrap();
    service.halt();
    assert_eq!(service.status(), ServiceState::InstalledStopped);

    reset::run(&paths, &service).unwrap();

    assert!(!ConfigStore::new(&paths).exists());
    assert!(!MarkerStore::new(&paths).is_complete());
    assert_eq!(service.status(), ServiceState::NotInstalled);

    // Idempotent: a second reset on a pristine device is a no-op success.
    reset::run(&paths, &service).unwrap();
}

#[tokio::test]
async fn reset_refuses_while_lock_is_held() {
    let temp = TempDir::new().unwrap();
    let paths = test_paths(&temp);
    let service = FakeService::default();
    let mut wizard = ScriptedWizard {
        config: Some(sample_config()),
        ..Default::default()
    };
    let mut ui = ScriptedUi::default();
    orchestrator(&paths, &service)
        .check_and_run(true, &mut wizard, &mut ui)
        .await
        .unwrap();

    let _held = ProvisionLock::acquire(&paths.lock_file, "provision").unwrap();
    let result = reset::run(&paths, &service);

    assert!(matches!(result, Err(SetupError::LockContention { .. })));
    // Nothing was torn down.
    assert!(ConfigStore::new(&paths).exists());
    assert!(MarkerStore::new(&paths).is_complete());
    assert_eq!(service.status(), ServiceState::InstalledRunning);
}
