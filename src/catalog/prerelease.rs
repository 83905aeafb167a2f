//! Prerelease page adapter
//!
//! Prereleases are not part of the paginated listing; they are scraped from an
//! authenticated HTML page. Parsing is best-effort and confined to this module
//! so format drift only breaks prerelease discovery.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::catalog::error::CatalogError;
use crate::catalog::session::AuthSession;
use crate::config::PRERELEASE_PATH;

/// Structured prerelease link scraped from the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrereleaseRecord {
    pub name: String,
    pub remote_path: String,
    pub release_notes_path: Option<String>,
}

/// Source of prerelease entries
#[async_trait::async_trait]
pub trait PrereleaseCatalogAdapter: Send + Sync {
    async fn fetch_prereleases(&self) -> Result<Vec<PrereleaseRecord>, CatalogError>;
}

/// Adapter scraping the prerelease download page through an [`AuthSession`]
pub struct ScrapedPrereleaseAdapter {
    session: Arc<dyn AuthSession>,
}

impl ScrapedPrereleaseAdapter {
    pub fn new(session: Arc<dyn AuthSession>) -> Self {
        Self { session }
    }
}

#[async_trait::async_trait]
impl PrereleaseCatalogAdapter for ScrapedPrereleaseAdapter {
    async fn fetch_prereleases(&self) -> Result<Vec<PrereleaseRecord>, CatalogError> {
        let body = self.session.get(PRERELEASE_PATH, &[]).await?;
        let records = parse_prerelease_page(&body);
        debug!("Found {} prerelease links", records.len());
        Ok(records)
    }
}

/// Extract disk image links and their release notes from the prerelease page.
///
/// Release notes are the first PDF link sharing the image's `path=/a/b/` parent.
pub fn parse_prerelease_page(body: &str) -> Vec<PrereleaseRecord> {
    let (Ok(anchor), Ok(parent), Ok(label_prefix)) = (
        Regex::new(r#"<a[^>]+?href="([^"]+?\.dmg)"[^>]*>(.*?)</a>"#),
        Regex::new(r"path=(/.*/.*/)"),
        Regex::new(r"^.*Xcode "),
    ) else {
        warn!("Prerelease patterns failed to compile");
        return Vec::new();
    };

    anchor
        .captures_iter(body)
        .filter_map(|captures| {
            let href = captures.get(1)?.as_str();
            let text = captures.get(2)?.as_str();

            let name = label_prefix.replace(text.trim(), "").trim().to_string();
            if name.is_empty() {
                debug!("Skipping prerelease link without label: {}", href);
                return None;
            }

            let remote_path = href.rsplit('=').next().unwrap_or(href).to_string();
            let release_notes_path = parent
                .captures(href)
                .and_then(|c| c.get(1))
                .and_then(|parent| find_release_notes(body, parent.as_str()));

            Some(PrereleaseRecord {
                name,
                remote_path,
                release_notes_path,
            })
        })
        .collect()
}

fn find_release_notes(body: &str, parent: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"{}(.+?\.pdf)", regex::escape(parent))).ok()?;
    let file = pattern.captures(body)?.get(1)?.as_str();
    Some(format!("{parent}{file}"))
}
