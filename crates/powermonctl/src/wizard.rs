//! Console setup wizard.
//!
//! Collects device id, location, CT ratings, grid voltage, timezone, and
//! ingest URL from the operator, re-prompting locally on invalid input.
//! The orchestrator only sees the [`Wizard`] trait, so tests drive it with
//! a scripted implementation instead.

use console::{style, Key, Term};
use std::fs;
use tracing::debug;
use uuid::Uuid;

use powermon_common::config::{
    DeviceConfiguration, ALLOWED_VOLTAGES, CT_CHANNELS, DEFAULT_SERVER_URL, STANDARD_CT_RATINGS,
};
use powermon_common::error::SetupError;
use powermon_common::paths::Paths;
use powermon_common::timezone;

use crate::orchestrator::{Wizard, WizardDefaults};

/// Suggest a device id from hardware identity: SoC serial number, then
/// first NIC MAC, then a random fragment.
pub fn generate_device_id() -> String {
    if let Some(serial) = cpu_serial() {
        return format!("powermon_{serial}");
    }
    if let Some(mac) = first_mac() {
        return format!("powermon_{mac}");
    }
    let uuid = Uuid::new_v4().simple().to_string();
    format!("powermon_{}", &uuid[..8])
}

fn cpu_serial() -> Option<String> {
    let cpuinfo = fs::read_to_string("/proc/cpuinfo").ok()?;
    cpuinfo.lines().find_map(|line| {
        let rest = line.strip_prefix("Serial")?;
        let serial = rest.trim_start().strip_prefix(':')?.trim().to_lowercase();
        (!serial.is_empty()).then_some(serial)
    })
}

fn first_mac() -> Option<String> {
    let entries = fs::read_dir("/sys/class/net").ok()?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "lo")
        .collect();
    names.sort();
    names.into_iter().find_map(|name| {
        let address = fs::read_to_string(format!("/sys/class/net/{name}/address")).ok()?;
        let mac = address.trim().replace(':', "").to_lowercase();
        (!mac.is_empty()).then_some(mac)
    })
}

/// Keep device ids shell- and URL-friendly: lowercase alphanumerics,
/// underscore, hyphen.
pub fn sanitize_device_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect::<String>()
        .to_lowercase()
}

/// Interactive console implementation of the wizard.
pub struct ConsoleWizard {
    term: Term,
    paths: Paths,
}

impl ConsoleWizard {
    pub fn new(paths: Paths) -> Self {
        Self {
            term: Term::stdout(),
            paths,
        }
    }

    fn prompt(&self, label: &str, default: Option<&str>) -> Result<String, SetupError> {
        match default {
            Some(default) => self
                .term
                .write_str(&format!("{} [{}]: ", style(label).bold(), default))?,
            None => self.term.write_str(&format!("{}: ", style(label).bold()))?,
        }
        let line = self.term.read_line()?;
        let line = line.trim();
        if line.is_empty() {
            if let Some(default) = default {
                return Ok(default.to_string());
            }
        }
        Ok(line.to_string())
    }

    fn prompt_device_id(&self, default: &str) -> Result<String, SetupError> {
        loop {
            let raw = self.prompt("Device name", Some(default))?;
            let id = sanitize_device_id(&raw);
            if !id.is_empty() {
                return Ok(id);
            }
            self.term
                .write_line("Device name must contain letters or digits.")?;
        }
    }

    fn prompt_location(&self, default: Option<&str>) -> Result<String, SetupError> {
        loop {
            let location = self.prompt("Location name", default)?;
            if !location.trim().is_empty() {
                return Ok(location.trim().to_string());
            }
            self.term.write_line("Location name must not be empty.")?;
        }
    }

    fn prompt_voltage(&self, default: f64) -> Result<f64, SetupError> {
        let options: Vec<String> = ALLOWED_VOLTAGES.iter().map(|v| format!("{v}V")).collect();
        self.term.write_line(&format!(
            "Grid voltage options: {}",
            style(options.join(", ")).dim()
        ))?;
        loop {
            let raw = self.prompt("Grid voltage", Some(&default.to_string()))?;
            match raw.trim_end_matches(['v', 'V']).parse::<f64>() {
                Ok(voltage) if ALLOWED_VOLTAGES.contains(&voltage) => return Ok(voltage),
                _ => self.term.write_line(&format!(
                    "Voltage must be one of: {}",
                    options.join(", ")
                ))?,
            }
        }
    }

    fn prompt_ct_ratings(&self, defaults: &[f64]) -> Result<Vec<f64>, SetupError> {
        let standard: Vec<String> = STANDARD_CT_RATINGS.iter().map(|r| format!("{r}A")).collect();
        self.term.write_line(&format!(
            "CT rating guide: 30A individual circuits, 100A sub-panels, 200A service entrance ({})",
            style(standard.join(", ")).dim()
        ))?;

        let default_common = defaults.first().copied().unwrap_or(100.0);
        let common = loop {
            let raw = self.prompt(
                "CT sensor rating (amps, applied to all 6 channels)",
                Some(&default_common.to_string()),
            )?;
            match raw.trim_end_matches(['a', 'A']).parse::<f64>() {
                Ok(rating) if rating.is_finite() && rating > 0.0 => break rating,
                _ => self
                    .term
                    .write_line("CT rating must be a positive number of amps.")?,
            }
        };

        let mut ratings = vec![common; CT_CHANNELS];
        let customize = self.prompt("Customize individual channels? (y/N)", Some("n"))?;
        if customize.eq_ignore_ascii_case("y") {
            for (idx, rating) in ratings.iter_mut().enumerate() {
                *rating = loop {
                    let raw = self.prompt(
                        &format!("  CT{} rating", idx + 1),
                        Some(&rating.to_string()),
                    )?;
                    match raw.trim_end_matches(['a', 'A']).parse::<f64>() {
                        Ok(r) if r.is_finite() && r > 0.0 => break r,
                        _ => self
                            .term
                            .write_line("CT rating must be a positive number of amps.")?,
                    }
                };
            }
        }
        Ok(ratings)
    }

    fn prompt_timezone(&self, defaults: &WizardDefaults) -> Result<String, SetupError> {
        let default = defaults
            .existing
            .as_ref()
            .map(|c| c.timezone.clone())
            .or_else(|| defaults.detected_timezone.clone());
        if defaults.detected_timezone.is_some() && defaults.existing.is_none() {
            self.term.write_line(&format!(
                "{} detected timezone from network lookup",
                style("✓").green()
            ))?;
        }
        loop {
            let zone = self.prompt("Timezone (IANA id)", default.as_deref())?;
            if timezone::zone_is_known(&self.paths.zoneinfo_dir, &zone) {
                return Ok(zone);
            }
            self.term.write_line(&format!(
                "Unknown timezone {:?}; expected an IANA id like America/New_York.",
                zone
            ))?;
        }
    }

    /// Summary screen. Enter confirms, `e` edits again, Esc cancels.
    fn confirm(&self, config: &DeviceConfiguration) -> Result<Confirmation, SetupError> {
        self.term.write_line("")?;
        self.term
            .write_line(&style("Configuration Summary").bold().to_string())?;
        self.term
            .write_line(&format!("  Device ID:  {}", config.device_id))?;
        self.term
            .write_line(&format!("  Location:   {}", config.location_name))?;
        self.term
            .write_line(&format!("  Timezone:   {}", config.timezone))?;
        self.term
            .write_line(&format!("  Voltage:    {}V", config.voltage))?;
        let ratings: Vec<String> = config.ct_rating.iter().map(|r| format!("{r}A")).collect();
        self.term
            .write_line(&format!("  CT ratings: {}", ratings.join(", ")))?;
        self.term
            .write_line(&format!("  Server URL: {}", config.server_url))?;
        self.term.write_line("")?;
        self.term.write_line(
            "Press ENTER to install and start monitoring, 'e' to edit, ESC to cancel.",
        )?;

        loop {
            match self.term.read_key()? {
                Key::Enter => return Ok(Confirmation::Install),
                Key::Char('e') | Key::Char('E') => return Ok(Confirmation::Edit),
                Key::Escape | Key::Char('q') => return Ok(Confirmation::Cancel),
                _ => {}
            }
        }
    }
}

enum Confirmation {
    Install,
    Edit,
    Cancel,
}

impl Wizard for ConsoleWizard {
    fn collect(
        &mut self,
        defaults: &WizardDefaults,
    ) -> Result<Option<DeviceConfiguration>, SetupError> {
        self.term.write_line("")?;
        self.term.write_line(
            &style("Power Monitor Setup — Device Configuration")
                .bold()
                .to_string(),
        )?;
        self.term.write_line("")?;

        loop {
            let existing = defaults.existing.as_ref();
            let device_id = self.prompt_device_id(&defaults.device_id)?;
            let location_name =
                self.prompt_location(existing.map(|c| c.location_name.as_str()))?;
            let ct_defaults: Vec<f64> = existing
                .map(|c| c.ct_rating.clone())
                .unwrap_or_else(|| vec![100.0; CT_CHANNELS]);
            let ct_rating = self.prompt_ct_ratings(&ct_defaults)?;
            let voltage =
                self.prompt_voltage(existing.map(|c| c.voltage).unwrap_or(120.0))?;
            let timezone = self.prompt_timezone(defaults)?;
            let server_url = self.prompt(
                "Server URL",
                Some(
                    existing
                        .map(|c| c.server_url.as_str())
                        .unwrap_or(DEFAULT_SERVER_URL),
                ),
            )?;

            let config = DeviceConfiguration {
                device_id,
                location_name,
                timezone,
                voltage,
                ct_rating,
                server_url,
                created_at: existing.and_then(|c| c.created_at).or_else(|| Some(chrono::Utc::now())),
            };

            match self.confirm(&config)? {
                Confirmation::Install => return Ok(Some(config)),
                Confirmation::Edit => {
                    debug!("operator chose to edit configuration again");
                    continue;
                }
                Confirmation::Cancel => return Ok(None),
            }
        }
    }
}
