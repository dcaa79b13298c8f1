//! Device configuration store.
//!
//! The configuration lives in a line-oriented `KEY=VALUE` file
//! (`/etc/powermonitor/config.conf` on a device). `#`-prefixed lines are
//! comments and unknown keys are ignored, so files written by older
//! releases still load.
//!
//! Writes are atomic: the new content goes to a temporary file in the same
//! directory, is synced, and is renamed into place. A concurrent reader
//! never observes a partially written file, and a crash mid-save leaves the
//! previous configuration intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::SetupError;
use crate::paths::Paths;
use crate::timezone;

/// Number of CT sensor channels on the board.
pub const CT_CHANNELS: usize = 6;

/// Grid voltages the wizard and validator accept.
pub const ALLOWED_VOLTAGES: [f64; 4] = [110.0, 120.0, 230.0, 240.0];

/// Standard CT ratings offered by the wizard (amps). Custom positive
/// ratings are also valid.
pub const STANDARD_CT_RATINGS: [f64; 4] = [30.0, 50.0, 100.0, 200.0];

/// Default ingest endpoint for readings.
pub const DEFAULT_SERVER_URL: &str = "https://linesights.com/api/data";

/// Identity and sensor parameters of one monitoring device.
///
/// Never partially persisted: [`ConfigStore::save`] validates first and
/// writes atomically, so on disk this is either fully absent or fully
/// present and valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    /// Operator-chosen identifier. Non-empty; not globally unique.
    pub device_id: String,
    /// Human-readable site name.
    pub location_name: String,
    /// IANA timezone id, e.g. `America/New_York`.
    pub timezone: String,
    /// Grid voltage, member of [`ALLOWED_VOLTAGES`].
    pub voltage: f64,
    /// Per-channel CT rating in amps, exactly [`CT_CHANNELS`] entries.
    pub ct_rating: Vec<f64>,
    /// Ingest endpoint the monitoring process posts readings to.
    pub server_url: String,
    /// When this configuration was first written.
    pub created_at: Option<DateTime<Utc>>,
}

impl DeviceConfiguration {
    /// Render as the `KEY=VALUE` file format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Power Monitor Configuration - Auto-generated\n");
        out.push_str("#\n");
        out.push_str(&format!("DEVICE_ID={}\n", self.device_id));
        out.push_str(&format!("LOCATION_NAME={}\n", self.location_name));
        out.push_str(&format!("TIMEZONE={}\n", self.timezone));
        out.push_str(&format!("VOLTAGE={}\n", self.voltage));
        let ratings: Vec<String> = self.ct_rating.iter().map(|r| r.to_string()).collect();
        out.push_str(&format!("CT_RATING={}\n", ratings.join(",")));
        out.push_str(&format!("SERVER_URL={}\n", self.server_url));
        if let Some(ts) = self.created_at {
            out.push_str(&format!("CREATED_AT={}\n", ts.to_rfc3339()));
        }
        out
    }

    /// Parse the `KEY=VALUE` file format.
    ///
    /// Lenient about shape (missing keys stay empty, any number of CT
    /// entries) so that [`ConfigStore::validate`] is the single place that
    /// decides what is acceptable.
    pub fn parse(content: &str) -> Result<Self, SetupError> {
        let mut config = Self {
            device_id: String::new(),
            location_name: String::new(),
            timezone: String::new(),
            voltage: 0.0,
            ct_rating: Vec::new(),
            server_url: String::new(),
            created_at: None,
        };

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(SetupError::ConfigurationInvalid(format!(
                    "malformed line: {line:?}"
                )));
            };
            let value = value.trim();
            match key.trim() {
                "DEVICE_ID" => config.device_id = value.to_string(),
                "LOCATION_NAME" => config.location_name = value.to_string(),
                "TIMEZONE" => config.timezone = value.to_string(),
                "VOLTAGE" => {
                    config.voltage = value.parse().map_err(|_| {
                        SetupError::ConfigurationInvalid(format!("VOLTAGE not numeric: {value:?}"))
                    })?;
                }
                "CT_RATING" => {
                    config.ct_rating = value
                        .split(',')
                        .map(|part| {
                            part.trim().parse::<f64>().map_err(|_| {
                                SetupError::ConfigurationInvalid(format!(
                                    "CT_RATING entry not numeric: {part:?}"
                                ))
                            })
                        })
                        .collect::<Result<_, _>>()?;
                }
                "SERVER_URL" => config.server_url = value.to_string(),
                "CREATED_AT" => {
                    config.created_at = DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|ts| ts.with_timezone(&Utc));
                }
                // Unknown keys from other releases are ignored.
                _ => {}
            }
        }

        Ok(config)
    }
}

/// Persistence for [`DeviceConfiguration`].
pub struct ConfigStore {
    path: PathBuf,
    zoneinfo_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(paths: &Paths) -> Self {
        Self {
            path: paths.config_file.clone(),
            zoneinfo_dir: paths.zoneinfo_dir.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when a configuration file is present (valid or not).
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and parse the configuration.
    ///
    /// Absent file maps to [`SetupError::ConfigurationMissing`]; a present
    /// but unparseable file maps to [`SetupError::ConfigurationInvalid`].
    pub fn load(&self) -> Result<DeviceConfiguration, SetupError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SetupError::ConfigurationMissing);
            }
            Err(e) => return Err(e.into()),
        };
        DeviceConfiguration::parse(&content)
    }

    /// Raw file bytes, for snapshot/rollback. `Ok(None)` when absent.
    pub fn snapshot(&self) -> Result<Option<Vec<u8>>, SetupError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate a configuration against the data-model rules.
    pub fn validate(&self, config: &DeviceConfiguration) -> Result<(), SetupError> {
        if config.device_id.trim().is_empty() {
            return Err(SetupError::ConfigurationInvalid(
                "device id must not be empty".into(),
            ));
        }
        if config.location_name.trim().is_empty() {
            return Err(SetupError::ConfigurationInvalid(
                "location name must not be empty".into(),
            ));
        }
        if !timezone::zone_is_known(&self.zoneinfo_dir, &config.timezone) {
            return Err(SetupError::ConfigurationInvalid(format!(
                "unknown timezone: {:?}",
                config.timezone
            )));
        }
        if !ALLOWED_VOLTAGES.contains(&config.voltage) {
            return Err(SetupError::ConfigurationInvalid(format!(
                "voltage {} not in allowed set {:?}",
                config.voltage, ALLOWED_VOLTAGES
            )));
        }
        if config.ct_rating.len() != CT_CHANNELS {
            return Err(SetupError::ConfigurationInvalid(format!(
                "expected {} CT ratings, got {}",
                CT_CHANNELS,
                config.ct_rating.len()
            )));
        }
        for (idx, rating) in config.ct_rating.iter().enumerate() {
            if !rating.is_finite() || *rating <= 0.0 {
                return Err(SetupError::ConfigurationInvalid(format!(
                    "CT rating for channel {} must be a positive number, got {}",
                    idx + 1,
                    rating
                )));
            }
        }
        if config.server_url.trim().is_empty() {
            return Err(SetupError::ConfigurationInvalid(
                "server URL must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Validate, then atomically write the configuration.
    ///
    /// The previous file is only replaced once the new content is fully on
    /// disk; an invalid configuration never touches the file at all.
    pub fn save(&self, config: &DeviceConfiguration) -> Result<(), SetupError> {
        self.validate(config)?;
        self.write_raw(config.render().as_bytes())?;
        debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    /// Atomically write raw bytes, bypassing validation. Used by rollback
    /// to restore a prior snapshot byte-for-byte.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<(), SetupError> {
        let parent = self.path.parent().ok_or_else(|| {
            SetupError::ConfigurationInvalid(format!(
                "config path has no parent: {}",
                self.path.display()
            ))
        })?;
        fs::create_dir_all(parent)?;

        let tmp = self.path.with_extension("conf.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Delete the configuration. Success when already absent.
    pub fn remove(&self) -> Result<(), SetupError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
