//! Status report for a device.
//!
//! Prints a structured block: setup completion, live service state,
//! derived lifecycle phase, and the configuration summary. Exit code 0 on
//! success, 1 when a configuration is present but unreadable or invalid.

use chrono::Utc;
use owo_colors::OwoColorize;

use powermon_common::config::ConfigStore;
use powermon_common::error::SetupError;
use powermon_common::lock::ProvisionLock;
use powermon_common::marker::MarkerStore;
use powermon_common::paths::{Paths, SERVICE_NAME};
use powermon_common::phase::LifecyclePhase;
use powermon_common::service::{ServiceLifecycle, ServiceState};

/// Render the status block. Returns the process exit code.
pub fn run(paths: &Paths, service: &dyn ServiceLifecycle) -> i32 {
    let config_store = ConfigStore::new(paths);
    let marker_store = MarkerStore::new(paths);

    println!("{}", "Power Monitor Status".bold());
    println!("{}", "=".repeat(50));
    println!("Time: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    println!();

    let marker = marker_store.read();
    match &marker {
        Some(m) => match m.completed_at {
            Some(ts) => println!(
                "Setup Complete: {} ({})",
                "yes".green(),
                ts.format("%Y-%m-%d %H:%M UTC")
            ),
            None => println!("Setup Complete: {}", "yes".green()),
        },
        None => println!("Setup Complete: {}", "no".red()),
    }

    let state = service.status();
    let state_line = match state {
        ServiceState::InstalledRunning => state.as_str().green().to_string(),
        ServiceState::Failed => state.as_str().red().to_string(),
        ServiceState::Unknown => state.as_str().yellow().to_string(),
        _ => state.as_str().to_string(),
    };
    println!("Service State:  {state_line}");

    let phase = LifecyclePhase::derive(
        ProvisionLock::is_held(&paths.lock_file),
        marker.is_some(),
        state,
    );
    println!("Phase:          {phase}");
    println!();

    let exit_code = match config_store.load() {
        Ok(config) => {
            if let Err(e) = config_store.validate(&config) {
                println!("Configuration:  {} ({e})", "invalid".red());
                1
            } else {
                println!("Configuration:");
                println!("  Device ID:  {}", config.device_id);
                println!("  Location:   {}", config.location_name);
                println!("  Timezone:   {}", config.timezone);
                println!("  Voltage:    {}V", config.voltage);
                let ratings: Vec<String> =
                    config.ct_rating.iter().map(|r| format!("{r}A")).collect();
                println!("  CT ratings: {}", ratings.join(", "));
                println!("  Server URL: {}", config.server_url);
                0
            }
        }
        Err(SetupError::ConfigurationMissing) => {
            println!("Configuration:  {}", "not found".yellow());
            println!();
            println!("Run setup with: powermon-setup");
            0
        }
        Err(e) => {
            println!("Configuration:  {} ({e})", "unreadable".red());
            1
        }
    };

    println!();
    println!("Commands:");
    println!("  sudo systemctl start {SERVICE_NAME}     # start service");
    println!("  sudo systemctl stop {SERVICE_NAME}      # stop service");
    println!("  journalctl -u {SERVICE_NAME} -f         # live logs");

    exit_code
}
