//! Console session UI for the configured-device path.
//!
//! Renders the status summary at login, the single-key
//! reconfigure/logs/skip menu with its bounded wait, and the journal tail.

use console::style;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

use powermon_common::config::DeviceConfiguration;
use powermon_common::marker::SetupMarker;
use powermon_common::paths::SERVICE_NAME;
use powermon_common::service::ServiceState;

use crate::orchestrator::{MenuChoice, SessionUi};

/// No key press within this window defaults to skip, so an unattended
/// login session never hangs on the menu.
const MENU_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ConsoleSession;

impl ConsoleSession {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw-mode guard; restores cooked mode on drop.
struct RawMode;

impl RawMode {
    fn enter() -> Option<Self> {
        terminal::enable_raw_mode().ok().map(|_| Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl SessionUi for ConsoleSession {
    fn show_summary(
        &mut self,
        config: Option<&DeviceConfiguration>,
        marker: Option<&SetupMarker>,
        state: ServiceState,
    ) {
        println!();
        println!("{}", style("Power Monitor — Device Status").bold());

        let completed = match marker.and_then(|m| m.completed_at) {
            Some(ts) => format!("yes ({})", ts.format("%Y-%m-%d %H:%M UTC")),
            None => {
                if marker.is_some() {
                    "yes".to_string()
                } else {
                    "no".to_string()
                }
            }
        };
        println!("  Setup complete: {completed}");

        let state_styled = match state {
            ServiceState::InstalledRunning => style(state.as_str()).green(),
            ServiceState::Failed => style(state.as_str()).red(),
            _ => style(state.as_str()).yellow(),
        };
        println!("  Service:        {state_styled}");

        match config {
            Some(config) => {
                println!("  Device ID:      {}", config.device_id);
                println!("  Location:       {}", config.location_name);
                println!("  Timezone:       {}", config.timezone);
                println!("  Voltage:        {}V", config.voltage);
                let ratings: Vec<String> =
                    config.ct_rating.iter().map(|r| format!("{r}A")).collect();
                println!("  CT ratings:     {}", ratings.join(", "));
                println!("  Server URL:     {}", config.server_url);
            }
            None => {
                println!("  Configuration:  {}", style("unreadable").red());
            }
        }
        println!();
    }

    fn menu_choice(&mut self) -> MenuChoice {
        println!(
            "  [{}]econfigure  [{}]iew logs  [{}]kip   (auto-skip in {}s)",
            style("r").bold(),
            style("v").bold(),
            style("s").bold(),
            MENU_TIMEOUT.as_secs()
        );
        let _ = io::stdout().flush();

        let Some(_raw) = RawMode::enter() else {
            // Not a terminal worth polling; behave like a timeout.
            return MenuChoice::Skip;
        };

        let deadline = Instant::now() + MENU_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return MenuChoice::Skip;
            }
            match event::poll(remaining.min(Duration::from_millis(500))) {
                Ok(true) => {
                    let Ok(Event::Key(key)) = event::read() else {
                        continue;
                    };
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if key.modifiers.contains(KeyModifiers::CONTROL) {
                        return MenuChoice::Skip;
                    }
                    match key.code {
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            return MenuChoice::Reconfigure
                        }
                        KeyCode::Char('v') | KeyCode::Char('V') | KeyCode::Char('l') => {
                            return MenuChoice::ViewLogs
                        }
                        KeyCode::Char('s') | KeyCode::Char('S')
                        | KeyCode::Enter
                        | KeyCode::Esc => return MenuChoice::Skip,
                        _ => {}
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "menu key polling failed");
                    return MenuChoice::Skip;
                }
            }
        }
    }

    fn stream_logs(&mut self) {
        println!(
            "--- journalctl -u {SERVICE_NAME} -f --- {}",
            style("(press any key to return)").dim()
        );

        let child = Command::new("journalctl")
            .args(["-u", SERVICE_NAME, "-n", "40", "-f", "--no-pager"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                println!("Could not read service logs: {e}");
                return;
            }
        };

        // Raw mode eats newlines, so the reader thread emits CRLF itself.
        let reader = child.stdout.take().map(|stdout| {
            thread::spawn(move || {
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    print!("{line}\r\n");
                    let _ = io::stdout().flush();
                }
            })
        });

        {
            let _raw = RawMode::enter();
            loop {
                if matches!(event::poll(Duration::from_millis(200)), Ok(true)) {
                    let _ = event::read();
                    break;
                }
                if matches!(child.try_wait(), Ok(Some(_))) {
                    break;
                }
            }
        }

        let _ = child.kill();
        let _ = child.wait();
        if let Some(handle) = reader {
            let _ = handle.join();
        }
        println!();
    }

    fn notify(&mut self, message: &str) {
        println!("{} {message}", style("✓").green());
    }
}
