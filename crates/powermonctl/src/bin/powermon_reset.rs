//! Imaging-prep reset CLI.
//!
//! Returns the device to pristine unconfigured state: service removed,
//! configuration and marker deleted, logs and host identity purged.
//! Exit code 0 on success, 1 when the provisioning lock is held.

use clap::Parser;
use console::{style, Term};
use std::io::Write;
use tracing_subscriber::EnvFilter;

use powermon_common::error::SetupError;
use powermon_common::paths::Paths;
use powermon_common::service::SystemdLifecycle;
use powermonctl::reset;

#[derive(Parser)]
#[command(name = "powermon-reset")]
#[command(about = "Reset a power monitor device for re-imaging", long_about = None)]
#[command(version)]
struct Cli {}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let _cli = Cli::parse();

    // Attended runs confirm first; imaging pipelines (no tty) proceed.
    if console::user_attended() && !confirm() {
        println!("Reset aborted; nothing was changed.");
        return;
    }

    let mut paths = Paths::system();
    if let Some(home) = dirs::home_dir() {
        paths.home_dir = home;
    }
    let service = SystemdLifecycle::new(&paths);

    match reset::run(&paths, &service) {
        Ok(()) => {
            println!(
                "{} Device reset to unconfigured state; ready for re-imaging.",
                style("✓").green()
            );
        }
        Err(SetupError::LockContention { pid, age_secs }) => {
            eprintln!(
                "Provisioning lock is held (pid {pid}, {age_secs}s); reset refused."
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Reset failed: {e}");
            std::process::exit(1);
        }
    }
}

fn confirm() -> bool {
    println!("This will:");
    println!("  - stop, disable, and remove the powermonitor service");
    println!("  - delete the device configuration and setup marker");
    println!("  - purge service logs, SSH host keys, and shell history");
    print!("Type 'reset' to continue: ");
    let _ = std::io::stdout().flush();
    let term = Term::stdout();
    matches!(term.read_line(), Ok(line) if line.trim() == "reset")
}
