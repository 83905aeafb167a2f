//! Catalog retrieval: listing + prereleases, merged and persisted

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::cache::CatalogCache;
use crate::catalog::entity::{CatalogSource, VersionEntity};
use crate::catalog::error::CatalogError;
use crate::catalog::listing::parse_seedlist;
use crate::catalog::prerelease::{PrereleaseCatalogAdapter, PrereleaseRecord};
use crate::catalog::semver::minimum_version;
use crate::catalog::session::AuthSession;
use crate::config::{LISTING_PAGE_SIZE, LISTING_PATH};

/// Fetches the release catalog and keeps it for the lifetime of the process.
///
/// The in-memory catalog is loaded once: from the cache file when present,
/// otherwise from the network. Only an explicit [`CatalogClient::purge`]
/// forces the next access to go back to the portal.
pub struct CatalogClient {
    session: Arc<dyn AuthSession>,
    prereleases: Arc<dyn PrereleaseCatalogAdapter>,
    cache: CatalogCache,
    download_url_prefix: String,
    catalog: Option<Vec<VersionEntity>>,
}

impl CatalogClient {
    pub fn new(
        session: Arc<dyn AuthSession>,
        prereleases: Arc<dyn PrereleaseCatalogAdapter>,
        cache: CatalogCache,
        download_url_prefix: &str,
    ) -> Self {
        Self {
            session,
            prereleases,
            cache,
            download_url_prefix: download_url_prefix.to_string(),
            catalog: None,
        }
    }

    /// Returns the catalog, loading it from cache or network on first use.
    pub async fn catalog(&mut self) -> Result<&[VersionEntity], CatalogError> {
        if self.catalog.is_none() {
            let entries = match self.cache.load()? {
                Some(entries) => {
                    debug!("Using cached catalog with {} entries", entries.len());
                    entries
                }
                None => self.fetch_catalog().await?,
            };
            self.catalog = Some(entries);
        }

        Ok(self.catalog.as_deref().unwrap_or_default())
    }

    /// Fetches stable and prerelease entries, merges them and overwrites the cache.
    pub async fn fetch_catalog(&mut self) -> Result<Vec<VersionEntity>, CatalogError> {
        let page_size = LISTING_PAGE_SIZE.to_string();
        let query = [
            ("start", "0"),
            ("limit", page_size.as_str()),
            ("sort", "dateModified"),
            ("dir", "DESC"),
            ("searchTextField", ""),
            ("searchCategories", ""),
            ("search", "false"),
        ];

        let body = self.session.get(LISTING_PATH, &query).await?;
        let stable = parse_seedlist(&body, &self.download_url_prefix)?;
        info!("Fetched {} stable releases", stable.len());

        let prereleases = self
            .prereleases
            .fetch_prereleases()
            .await?
            .into_iter()
            .filter_map(|record| self.prerelease_entity(record))
            .collect();

        let merged = merge(stable, prereleases);
        self.cache.save(&merged)?;
        self.catalog = Some(merged.clone());

        Ok(merged)
    }

    /// Drops the persisted and in-memory catalog.
    pub fn purge(&mut self) -> Result<(), CatalogError> {
        self.catalog = None;
        self.cache.purge()?;
        Ok(())
    }

    fn prerelease_entity(&self, record: PrereleaseRecord) -> Option<VersionEntity> {
        let entity = VersionEntity::new(
            &record.name,
            chrono::Utc::now().timestamp(),
            &record.remote_path,
            record.release_notes_path.as_deref(),
            &self.download_url_prefix,
            CatalogSource::Prerelease,
        );

        if !entity.is_dmg() || entity.semantic_version < minimum_version() {
            debug!("Discarding prerelease {}", entity.name);
            return None;
        }
        Some(entity)
    }
}

/// Appends prereleases whose name is not already taken by a stable entry.
///
/// Stable entries win on collision; the result stays ordered by `date_modified`.
pub fn merge(stable: Vec<VersionEntity>, prereleases: Vec<VersionEntity>) -> Vec<VersionEntity> {
    let mut names: HashSet<String> = stable.iter().map(|e| e.name.clone()).collect();
    let mut merged = stable;

    for prerelease in prereleases {
        if names.insert(prerelease.name.clone()) {
            merged.push(prerelease);
        } else {
            debug!("Prerelease {} shadowed by stable entry", prerelease.name);
        }
    }

    merged.sort_by_key(|e| e.date_modified);
    merged
}
