//! Typed deserialization of the stable download listing

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::entity::{CatalogSource, VersionEntity};
use crate::catalog::error::CatalogError;
use crate::catalog::semver::minimum_version;

/// Raw listing response ("seedlist")
#[derive(Debug, Deserialize)]
struct Seedlist {
    #[serde(default)]
    downloads: Vec<serde_json::Value>,
}

/// One listing record; records missing any required field are rejected
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRecord {
    name: String,
    date_modified: Timestamp,
    files: Vec<DownloadFile>,
    #[serde(rename = "release_notes_path", default)]
    release_notes_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadFile {
    remote_path: String,
}

/// The portal has served both numeric and string timestamps
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Integer(i64),
    Text(String),
}

impl Timestamp {
    fn as_i64(&self) -> i64 {
        match self {
            Timestamp::Integer(value) => *value,
            Timestamp::Text(text) => text
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .fold(0i64, |acc, c| {
                    acc.saturating_mul(10)
                        .saturating_add(i64::from(c as u8 - b'0'))
                }),
        }
    }
}

/// Parse a listing response into catalog entries.
///
/// Keeps product releases at or above the minimum version whose artifact is a
/// disk image, ordered by `date_modified` (oldest first). When the listing
/// repeats a name, the most recently modified record wins.
pub fn parse_seedlist(body: &str, url_prefix: &str) -> Result<Vec<VersionEntity>, CatalogError> {
    let seedlist: Seedlist = serde_json::from_str(body).map_err(|e| {
        warn!("Failed to parse download listing: {}", e);
        CatalogError::InvalidResponse(e.to_string())
    })?;

    let product_name = product_name_pattern();
    let minimum = minimum_version();

    let mut entries: Vec<VersionEntity> = seedlist
        .downloads
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<DownloadRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Rejecting listing record: {}", e);
                None
            }
        })
        .filter(|record| product_name.is_match(&record.name))
        .filter_map(|record| {
            let Some(file) = record.files.first() else {
                debug!("Rejecting {}: no files", record.name);
                return None;
            };
            Some(VersionEntity::new(
                &record.name,
                record.date_modified.as_i64(),
                &file.remote_path,
                record.release_notes_path.as_deref(),
                url_prefix,
                CatalogSource::Stable,
            ))
        })
        .filter(|entity| entity.semantic_version >= minimum)
        .collect();

    entries.sort_by_key(|entity| entity.date_modified);

    let mut by_name: IndexMap<String, VersionEntity> = IndexMap::new();
    for entity in entries.into_iter().filter(VersionEntity::is_dmg) {
        by_name.shift_remove(&entity.name);
        by_name.insert(entity.name.clone(), entity);
    }

    Ok(by_name.into_values().collect())
}

fn product_name_pattern() -> Regex {
    Regex::new(r"^Xcode [0-9]").expect("product name pattern is valid")
}
