//! Catalog entry for one downloadable release

use std::fmt;

use semver::Version;

use crate::catalog::semver::{minimum_version, parse_release_label};

/// Label prefix the portal puts in front of every release name
pub const PRODUCT_PREFIX: &str = "Xcode ";

pub const DMG_EXTENSION: &str = ".dmg";

/// Where a catalog entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    /// Paginated download listing
    Stable,
    /// Scraped prerelease page
    Prerelease,
}

impl CatalogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogSource::Stable => "stable",
            CatalogSource::Prerelease => "prerelease",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stable" => Some(CatalogSource::Stable),
            "prerelease" => Some(CatalogSource::Prerelease),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntity {
    /// Release label without the product prefix, e.g. "11.3" or "12.0 beta 2"
    pub name: String,
    pub semantic_version: Version,
    pub date_modified: i64,
    pub remote_path: String,
    pub download_url: String,
    pub release_notes_url: Option<String>,
    pub source: CatalogSource,
}

impl VersionEntity {
    /// Builds an entry from portal fields, deriving the URLs from `url_prefix`.
    pub fn new(
        name: &str,
        date_modified: i64,
        remote_path: &str,
        release_notes_path: Option<&str>,
        url_prefix: &str,
        source: CatalogSource,
    ) -> Self {
        let name = name.trim();
        let name = name.strip_prefix(PRODUCT_PREFIX).unwrap_or(name).to_string();
        let semantic_version = parse_release_label(&name).unwrap_or_else(minimum_version);

        Self {
            semantic_version,
            date_modified,
            remote_path: remote_path.to_string(),
            download_url: format!("{url_prefix}{remote_path}"),
            release_notes_url: release_notes_path.map(|path| format!("{url_prefix}{path}")),
            source,
            name,
        }
    }

    pub fn is_dmg(&self) -> bool {
        self.download_url.ends_with(DMG_EXTENSION)
    }

    /// File name of the artifact, e.g. `Xcode_11.3.dmg`
    pub fn file_name(&self) -> &str {
        self.remote_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.remote_path)
    }
}

impl fmt::Display for VersionEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Xcode {} -- {}", self.semantic_version, self.download_url)
    }
}
