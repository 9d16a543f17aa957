//! Discovery of snapshots at a destination.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::destination::Destination;
use crate::error::{HoldfastError, Result};

use super::{parse_timestamp, Snapshot, MANIFEST_FILE_NAME};

/// List all finalized snapshots at a destination.
///
/// Root entries count as snapshots when their name parses as a snapshot
/// timestamp and they contain a readable manifest; anything else is skipped
/// as partial or unrelated. Manifest decode failures propagate.
pub fn list_snapshots(dest: &dyn Destination) -> Result<Vec<Snapshot>> {
    let mut snapshots = Vec::new();
    for entry in dest.read_dir("")? {
        if !entry.is_dir || parse_timestamp(&entry.name).is_none() {
            continue;
        }
        let manifest_key = format!("{}/{}", entry.name, MANIFEST_FILE_NAME);
        let Some(data) = dest.read_file(&manifest_key)? else {
            debug!(entry = %entry.name, "skipping snapshot directory without manifest");
            continue;
        };
        snapshots.push(Snapshot::decode(&data)?);
    }
    Ok(snapshots)
}

/// The snapshot with the greatest creation time, if any.
pub fn latest_snapshot(dest: &dyn Destination) -> Result<Option<Snapshot>> {
    Ok(list_snapshots(dest)?
        .into_iter()
        .max_by_key(|s| s.created_at))
}

/// The most recent snapshot created strictly before `t`.
pub fn latest_before(dest: &dyn Destination, t: DateTime<Utc>) -> Result<Option<Snapshot>> {
    Ok(list_snapshots(dest)?
        .into_iter()
        .filter(|s| s.created_at < t)
        .max_by_key(|s| s.created_at))
}

/// Resolve a snapshot query: `latest` (case-insensitive) or an exact
/// timestamp directory name.
pub fn resolve(dest: &dyn Destination, query: &str) -> Result<Snapshot> {
    if query.eq_ignore_ascii_case("latest") {
        return latest_snapshot(dest)?
            .ok_or_else(|| HoldfastError::SnapshotNotFound("latest".into()));
    }
    list_snapshots(dest)?
        .into_iter()
        .find(|s| s.rel_path() == query)
        .ok_or_else(|| HoldfastError::SnapshotNotFound(query.into()))
}
