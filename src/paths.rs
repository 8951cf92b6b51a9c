//! The fixed catalog of filesystem paths this tool is allowed to touch.
//!
//! Two tiers with a hard boundary between them: user-space paths are
//! deletable without elevation and are the only targets manual mode may
//! ever name; system-level paths back registered runtimes, require
//! elevation, and are reachable only through the primary (simctl) path
//! with explicit authorization.

use std::path::{Path, PathBuf};

/// Prefixes of runtime volume directories under the system Volumes root.
pub const RUNTIME_VOLUME_PREFIXES: &[&str] = &["iOS_", "tvOS_", "watchOS_", "xrOS_"];

pub const SYSTEM_VOLUMES_ROOT: &str = "/Library/Developer/CoreSimulator/Volumes";
pub const SYSTEM_CRYPTEX_PATH: &str = "/Library/Developer/CoreSimulator/Cryptex";

const USER_DEVICE_DATA: &str = "Library/Developer/CoreSimulator/Devices";
const USER_PROFILES: &str = "Library/Developer/CoreSimulator/Profiles";

/// User-space directories safe to delete without elevation.
const USER_CACHE_SUFFIXES: &[&str] = &[
    "Library/Developer/CoreSimulator/Caches",
    "Library/Developer/CoreSimulator/Temp",
    "Library/Caches/com.apple.CoreSimulator",
    "Library/Developer/Xcode/DerivedData",
];

/// Additional user-space targets for the manual cleanup path.
const USER_MANUAL_SUFFIXES: &[&str] = &[
    "Library/Developer/Xcode/Archives",
    "Library/Developer/Xcode/iOS DeviceSupport",
    "Library/Caches/com.apple.dt.Xcode",
    "Library/Caches/org.swift.swiftpm",
];

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/empty"))
}

pub fn user_device_data() -> PathBuf {
    home().join(USER_DEVICE_DATA)
}

pub fn user_profiles() -> PathBuf {
    home().join(USER_PROFILES)
}

pub fn user_cache_paths() -> Vec<PathBuf> {
    let home = home();
    USER_CACHE_SUFFIXES.iter().map(|suffix| home.join(suffix)).collect()
}

/// Everything manual mode is allowed to delete. Strictly user-space.
pub fn manual_cleanup_paths() -> Vec<PathBuf> {
    let home = home();
    let mut paths = vec![user_device_data(), user_profiles()];
    paths.extend(user_cache_paths());
    paths.extend(USER_MANUAL_SUFFIXES.iter().map(|suffix| home.join(suffix)));
    paths
}

/// System-level runtime backing stores: mounted runtime volume directories
/// plus the cryptex store. Requires elevation and simctl un-registration.
pub fn system_runtime_paths() -> Vec<PathBuf> {
    let mut paths = runtime_volume_dirs(Path::new(SYSTEM_VOLUMES_ROOT));
    paths.push(PathBuf::from(SYSTEM_CRYPTEX_PATH));
    paths
}

/// Enumerate runtime volume directories under `root` by name prefix.
pub fn runtime_volume_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .into_iter()
        .flatten()
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            RUNTIME_VOLUME_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
        })
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs
}

/// True when `path` lies outside every user-space tier. Used as a guard
/// assertion in manual mode.
pub fn is_system_level(path: &Path) -> bool {
    !path.starts_with(home())
}
