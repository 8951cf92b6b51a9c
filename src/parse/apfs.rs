//! `diskutil apfs list -plist` parsing.
//!
//! APFS containers share space between their volumes, so mounted-volume
//! usage is a lie: the container's `CapacityNotAllocated` is the true
//! free-space figure. The listing is parsed from raw bytes — diskutil can
//! emit a binary property list and a lossy text decode would corrupt it.

use std::time::SystemTime;

use serde::Deserialize;

use super::ParseError;

/// The mount point whose container the space accounting tracks.
pub const DATA_MOUNT_POINT: &str = "/System/Volumes/Data";

/// A point-in-time capture of container free space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApfsMetrics {
    pub container: String,
    pub not_allocated: u64,
    pub captured_at: SystemTime,
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(rename = "Containers", default)]
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    #[serde(rename = "ContainerReference", default)]
    reference: String,
    #[serde(rename = "CapacityNotAllocated")]
    capacity_not_allocated: Option<u64>,
    #[serde(rename = "CapacityFree")]
    capacity_free: Option<u64>,
    #[serde(rename = "CapacityAvailable")]
    capacity_available: Option<u64>,
    #[serde(rename = "Volumes", default)]
    volumes: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(rename = "MountPoint")]
    mount_point: Option<String>,
    #[serde(rename = "Roles", default)]
    roles: Vec<String>,
}

/// Extract the free-space metric for the container owning `mount_point`.
///
/// A missing capacity field is a distinct [`ParseError::MetricUnavailable`]
/// outcome — it must never be coerced to zero, because zero would fabricate
/// a "nothing reclaimed" claim the data does not support.
pub fn parse_not_allocated(bytes: &[u8], mount_point: &str) -> Result<ApfsMetrics, ParseError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty("diskutil apfs list"));
    }
    let listing: Listing = plist::from_bytes(bytes).map_err(|error| ParseError::Malformed {
        what: "diskutil apfs list",
        detail: error.to_string(),
    })?;

    let container = listing
        .containers
        .iter()
        .find(|container| {
            container.volumes.iter().any(|volume| {
                volume.mount_point.as_deref() == Some(mount_point)
                    || (mount_point == DATA_MOUNT_POINT
                        && volume.roles.iter().any(|role| role == "Data"))
            })
        })
        .ok_or(ParseError::MetricUnavailable)?;

    // CapacityNotAllocated is canonical; older diskutil builds expose the
    // figure under CapacityFree or CapacityAvailable instead.
    let not_allocated = container
        .capacity_not_allocated
        .or(container.capacity_free)
        .or(container.capacity_available)
        .ok_or(ParseError::MetricUnavailable)?;

    Ok(ApfsMetrics {
        container: container.reference.clone(),
        not_allocated,
        captured_at: SystemTime::now(),
    })
}
