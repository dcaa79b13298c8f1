//! First-contact setup entry point.
//!
//! Invoked by the login-session trigger (see `deploy/profile.d/`). On an
//! unconfigured device it runs the wizard and provisions the monitoring
//! service; on a configured one it reports status and offers the
//! reconfigure/logs/skip menu.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use powermon_common::error::SetupError;
use powermon_common::paths::Paths;
use powermon_common::service::SystemdLifecycle;
use powermonctl::orchestrator::{Orchestrator, Outcome};
use powermonctl::{ConsoleSession, ConsoleWizard};

#[derive(Parser)]
#[command(name = "powermon-setup")]
#[command(about = "Power monitor first-contact setup", long_about = None)]
#[command(version)]
struct Cli {
    /// Report-only: never launch the wizard or the menu
    #[arg(long)]
    non_interactive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Default to warnings only; the wizard owns the terminal.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let paths = Paths::system();
    let service = SystemdLifecycle::new(&paths);
    let orchestrator = Orchestrator::new(paths.clone(), &service);
    let mut wizard = ConsoleWizard::new(paths.clone());
    let mut ui = ConsoleSession::new();

    match orchestrator
        .check_and_run(!cli.non_interactive, &mut wizard, &mut ui)
        .await
    {
        Ok(Outcome::SetupRequired) => {
            println!("Device is unconfigured; run powermon-setup from an interactive session.");
            Ok(())
        }
        Ok(Outcome::Cancelled) => {
            println!("Setup cancelled; nothing was changed.");
            Ok(())
        }
        Ok(_) => Ok(()),
        // Another login session is already provisioning. Informative, not
        // an error for this session.
        Err(SetupError::LockContention { pid, age_secs }) => {
            println!(
                "Another provisioning session is in progress (pid {pid}, {age_secs}s); try again later."
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
