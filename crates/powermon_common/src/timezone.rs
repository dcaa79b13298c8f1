//! Timezone validation and best-effort auto-detection.
//!
//! Validation resolves zone ids against the system IANA zoneinfo database.
//! Detection performs at most one network lookup under a short timeout;
//! every failure mode maps to [`SetupError::TimezoneDetectionFailed`] so
//! the wizard can fall back to a manual prompt instead of blocking.

use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::SetupError;

/// Geo-IP endpoint returning the caller's timezone as plain text.
const DETECT_URL: &str = "https://ipapi.co/timezone";

/// Hard ceiling on the single detection request.
const DETECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Whether `zone` names a known IANA timezone.
///
/// A well-formed id (`Area/Location`, segments of `[A-Za-z0-9_+-]`) is
/// resolved against `zoneinfo_dir`. When the zoneinfo database itself is
/// absent (stripped-down test hosts), the syntactic check alone decides,
/// so validation never depends on the machine running the test suite.
pub fn zone_is_known(zoneinfo_dir: &Path, zone: &str) -> bool {
    if !zone_is_well_formed(zone) {
        return false;
    }
    if !zoneinfo_dir.is_dir() {
        return true;
    }
    zoneinfo_dir.join(zone).is_file()
}

fn zone_is_well_formed(zone: &str) -> bool {
    if zone.is_empty() || zone.len() > 64 {
        return false;
    }
    zone.split('/').all(|segment| {
        !segment.is_empty()
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'))
    })
}

/// One best-effort network lookup of the local timezone.
pub async fn detect_timezone() -> Result<String, SetupError> {
    let client = reqwest::Client::builder()
        .timeout(DETECT_TIMEOUT)
        .build()
        .map_err(|e| SetupError::TimezoneDetectionFailed(e.to_string()))?;

    let response = client
        .get(DETECT_URL)
        .send()
        .await
        .map_err(|e| SetupError::TimezoneDetectionFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(SetupError::TimezoneDetectionFailed(format!(
            "lookup returned HTTP {}",
            response.status()
        )));
    }

    let zone = response
        .text()
        .await
        .map_err(|e| SetupError::TimezoneDetectionFailed(e.to_string()))?
        .trim()
        .to_string();

    if !zone_is_well_formed(&zone) {
        return Err(SetupError::TimezoneDetectionFailed(format!(
            "lookup returned implausible zone: {zone:?}"
        )));
    }

    debug!(zone, "timezone auto-detected");
    Ok(zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_zoneinfo() -> TempDir {
        let temp = TempDir::new().unwrap();
        for zone in ["America/New_York", "Europe/Oslo", "UTC"] {
            let path = temp.path().join(zone);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"TZif").unwrap();
        }
        temp
    }

    #[test]
    fn known_zones_resolve() {
        let zoneinfo = fake_zoneinfo();
        assert!(zone_is_known(zoneinfo.path(), "America/New_York"));
        assert!(zone_is_known(zoneinfo.path(), "UTC"));
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let zoneinfo = fake_zoneinfo();
        assert!(!zone_is_known(zoneinfo.path(), "America/Springfield"));
    }

    #[test]
    fn malformed_zones_are_rejected_even_without_zoneinfo() {
        let missing = Path::new("/nonexistent/zoneinfo");
        assert!(!zone_is_known(missing, ""));
        assert!(!zone_is_known(missing, "../../etc/passwd"));
        assert!(!zone_is_known(missing, "America/New York"));
        assert!(zone_is_known(missing, "America/New_York"));
    }
}
