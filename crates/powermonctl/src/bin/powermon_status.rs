//! Status CLI. Prints the device's provisioning and service state.
//!
//! Exit code 0 on success, 1 when a configuration is present but
//! unreadable or invalid.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use powermon_common::paths::Paths;
use powermon_common::service::SystemdLifecycle;
use powermonctl::status;

#[derive(Parser)]
#[command(name = "powermon-status")]
#[command(about = "Power monitor device status", long_about = None)]
#[command(version)]
struct Cli {}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let _cli = Cli::parse();
    let paths = Paths::system();
    let service = SystemdLifecycle::new(&paths);
    std::process::exit(status::run(&paths, &service));
}
