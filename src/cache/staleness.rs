//! Staleness checking for the mirror's freshness marker.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use filetime::FileTime;

/// Read the time of the last successful refresh from the marker's mtime.
///
/// Returns `None` if the marker is missing or its metadata can't be read.
pub fn last_refresh(marker: &Path) -> Option<SystemTime> {
    fs::metadata(marker).ok()?.modified().ok()
}

/// Check if the mirror is stale.
///
/// Returns true if:
/// - The marker doesn't exist (treat as stale, never as an error)
/// - At least `ttl` has passed since the marker was last written
///
/// A zero `ttl` is always stale. A marker dated in the future counts as
/// just written.
pub fn is_stale(marker: &Path, ttl: Duration) -> bool {
    match last_refresh(marker) {
        Some(modified) => age(modified, SystemTime::now()) >= ttl,
        None => true,
    }
}

fn age(modified: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(modified).unwrap_or(Duration::ZERO)
}

/// Stamp the marker with the current time, creating it if needed.
///
/// Used after a successful clone or fetch to reset the staleness clock.
pub fn touch_marker(marker: &Path) -> io::Result<()> {
    // git owns the contents of FETCH_HEAD, only create it when absent
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(marker)?;
    filetime::set_file_mtime(marker, FileTime::now())
}
