//! `diskutil list -plist` parsing.
//!
//! The listing is parsed from raw bytes because diskutil emits a property
//! list (XML today, binary under some tool versions) and text decoding would
//! corrupt the binary form.

use regex::Regex;
use serde::Deserialize;

use super::{simulator_related, ParseError};

/// One physical or synthesized disk, keyed by its whole-disk identifier.
///
/// `device` is always a whole-disk identifier (`disk4`), never a slice
/// (`disk4s1`): unmounting by parent is atomic across the volumes sharing a
/// disk image and succeeds far more consistently than per-slice unmounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRecord {
    pub device: String,
    pub volume_name: String,
    pub mount_point: Option<String>,
    pub simulator_related: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(rename = "AllDisksAndPartitions", default)]
    disks: Vec<WholeDisk>,
}

#[derive(Debug, Deserialize)]
struct WholeDisk {
    #[serde(rename = "DeviceIdentifier")]
    device: String,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "Partitions", default)]
    partitions: Vec<Slice>,
    #[serde(rename = "APFSVolumes", default)]
    apfs_volumes: Vec<Slice>,
}

#[derive(Debug, Deserialize)]
struct Slice {
    #[serde(rename = "VolumeName")]
    volume_name: Option<String>,
    #[serde(rename = "MountPoint")]
    mount_point: Option<String>,
}

/// Parse a diskutil listing into one record per whole disk.
///
/// Slice identifiers are collapsed into their parent disk at construction
/// time; a disk is simulator-related if any of its volumes matches the
/// simulator keyword heuristics by name or mount point.
pub fn parse_disk_list(bytes: &[u8]) -> Result<Vec<DiskRecord>, ParseError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty("diskutil list"));
    }
    let listing: Listing = plist::from_bytes(bytes).map_err(|error| ParseError::Malformed {
        what: "diskutil list",
        detail: error.to_string(),
    })?;

    let mut records = Vec::new();
    for disk in listing.disks {
        let slices: Vec<&Slice> = disk.partitions.iter().chain(disk.apfs_volumes.iter()).collect();
        let named: Vec<&&Slice> = slices
            .iter()
            .filter(|slice| slice.volume_name.is_some() || slice.mount_point.is_some())
            .collect();
        if named.is_empty() {
            continue;
        }

        let related = named.iter().find(|slice| {
            simulator_related(slice.volume_name.as_deref().unwrap_or(""))
                || simulator_related(slice.mount_point.as_deref().unwrap_or(""))
        });
        let representative = related.unwrap_or(&named[0]);

        records.push(DiskRecord {
            device: parent_disk(&disk.device),
            volume_name: representative
                .volume_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            mount_point: representative.mount_point.clone(),
            simulator_related: related.is_some(),
            size_bytes: disk.size,
        });
    }
    Ok(records)
}

/// Normalize a slice identifier to its parent whole-disk identifier.
///
/// Idempotent: `disk4` stays `disk4`, `disk4s1` and `/dev/disk4s1` both
/// become `disk4`. Unrecognized input is returned unchanged so a bad id
/// surfaces in the unmount step instead of being silently rewritten.
pub fn parent_disk(device: &str) -> String {
    let re = Regex::new(r"^(?:/dev/)?(disk\d+)").expect("static pattern");
    match re.captures(device) {
        Some(captures) => captures[1].to_string(),
        None => device.to_string(),
    }
}
