//! `xcrun simctl runtime list -j` parsing.
//!
//! simctl's JSON shape has shifted across Xcode releases: current builds
//! emit a map keyed by runtime identifier, older ones wrap the entries in a
//! `"runtimes"` array. Both are accepted.

use serde::Deserialize;
use serde_json::Value;

use super::ParseError;

/// A simulator runtime registered with simctl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRecord {
    pub identifier: String,
    pub name: String,
    pub version: String,
    pub build: String,
    pub state: String,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct Entry {
    identifier: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    build: String,
    #[serde(default, rename = "buildversion")]
    buildversion: String,
    #[serde(default)]
    state: String,
    #[serde(default, rename = "sizeBytes")]
    size_bytes: Option<u64>,
    #[serde(default, rename = "bundleSize")]
    bundle_size: Option<u64>,
}

impl Entry {
    fn into_record(self, fallback_id: Option<&str>) -> Option<RuntimeRecord> {
        let identifier = self
            .identifier
            .or_else(|| fallback_id.map(str::to_string))
            .filter(|id| !id.is_empty())?;
        let build = if self.build.is_empty() { self.buildversion } else { self.build };
        Some(RuntimeRecord {
            identifier,
            name: if self.name.is_empty() { "Unknown".to_string() } else { self.name },
            version: self.version,
            build,
            state: self.state,
            size_bytes: self.size_bytes.or(self.bundle_size).unwrap_or(0),
        })
    }
}

pub fn parse_runtime_list(text: &str) -> Result<Vec<RuntimeRecord>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty("simctl runtime list"));
    }
    let value: Value = serde_json::from_str(text).map_err(|error| ParseError::Malformed {
        what: "simctl runtime list",
        detail: error.to_string(),
    })?;

    let mut records = Vec::new();
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(entries)) = map.get("runtimes") {
                for entry in entries {
                    if let Ok(entry) = serde_json::from_value::<Entry>(entry.clone()) {
                        records.extend(entry.into_record(None));
                    }
                }
            } else {
                for (key, entry) in &map {
                    if let Ok(entry) = serde_json::from_value::<Entry>(entry.clone()) {
                        records.extend(entry.into_record(Some(key)));
                    }
                }
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                if let Ok(entry) = serde_json::from_value::<Entry>(entry) {
                    records.extend(entry.into_record(None));
                }
            }
        }
        _ => {
            return Err(ParseError::Malformed {
                what: "simctl runtime list",
                detail: "expected a JSON object or array".to_string(),
            })
        }
    }
    Ok(records)
}
