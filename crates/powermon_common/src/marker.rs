//! Setup-complete marker.
//!
//! A small persisted record stating that first-time provisioning finished
//! successfully. Its invariant: when the marker exists, a valid device
//! configuration exists and the service was installed. The reverse is not
//! required; a configuration may exist while install is still in progress
//! or failed.
//!
//! Control decisions check only existence. The timestamp inside is for
//! operators, never parsed for control flow.

use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

use crate::error::SetupError;
use crate::paths::Paths;

/// The persisted completion fact.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupMarker {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persistence for [`SetupMarker`].
pub struct MarkerStore {
    path: PathBuf,
}

impl MarkerStore {
    pub fn new(paths: &Paths) -> Self {
        Self {
            path: paths.marker_file.clone(),
        }
    }

    /// Whether provisioning has completed. Existence check only.
    pub fn is_complete(&self) -> bool {
        self.path.exists()
    }

    /// Read the marker for display. `None` when provisioning has not
    /// completed. A present but unparseable timestamp still counts as
    /// completed.
    pub fn read(&self) -> Option<SetupMarker> {
        let content = fs::read_to_string(&self.path).ok()?;
        let completed_at = content
            .lines()
            .find_map(|line| line.strip_prefix("completed_at="))
            .and_then(|value| DateTime::parse_from_rfc3339(value.trim()).ok())
            .map(|ts| ts.with_timezone(&Utc));
        Some(SetupMarker {
            completed: true,
            completed_at,
        })
    }

    /// Record completion. Atomic write so an interrupted writer never
    /// leaves a half-written marker.
    pub fn write(&self) -> Result<SetupMarker, SetupError> {
        let now = Utc::now();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        writeln!(file, "completed_at={}", now.to_rfc3339())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "setup marker written");
        Ok(SetupMarker {
            completed: true,
            completed_at: Some(now),
        })
    }

    /// Delete the marker. Success when already absent.
    pub fn remove(&self) -> Result<(), SetupError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
