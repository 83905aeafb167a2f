use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};
use semver::Version;
use tracing::{debug, info};

use crate::catalog::entity::{CatalogSource, VersionEntity};
use crate::catalog::error::CacheError;

/// Merge metadata stored next to the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMetadata {
    /// Unix timestamp (seconds) of the fetch that produced the snapshot
    pub fetched_at: i64,
    pub stable_count: usize,
    pub prerelease_count: usize,
}

/// On-disk snapshot of the last fetched catalog.
///
/// The snapshot is a single SQLite file; `save` replaces its contents inside
/// one transaction so readers never observe a half-written catalog. There is
/// no expiry: the snapshot stays authoritative until `purge` removes it.
pub struct CatalogCache {
    path: PathBuf,
}

impl CatalogCache {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection, CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::create_schema(&conn)?;
        Ok(conn)
    }

    fn create_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                position INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                semantic_version TEXT NOT NULL,
                date_modified INTEGER NOT NULL,
                remote_path TEXT NOT NULL,
                download_url TEXT NOT NULL,
                release_notes_url TEXT,
                source TEXT NOT NULL DEFAULT 'stable'
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                fetched_at INTEGER NOT NULL,
                stable_count INTEGER NOT NULL,
                prerelease_count INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Ok(())
    }

    /// Loads the persisted catalog, or `None` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<Vec<VersionEntity>>, CacheError> {
        if !self.path.exists() {
            debug!("No catalog cache at {:?}", self.path);
            return Ok(None);
        }

        let conn = self.open()?;
        if Self::read_metadata(&conn)?.is_none() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT name, semantic_version, date_modified, remote_path,
                   download_url, release_notes_url, source
            FROM versions ORDER BY position
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let entries = rows
            .into_iter()
            .map(
                |(name, version, date_modified, remote_path, download_url, notes, source)| {
                    let semantic_version =
                        Version::parse(&version).map_err(|e| CacheError::Corrupt {
                            name: name.clone(),
                            reason: e.to_string(),
                        })?;
                    let source = CatalogSource::parse(&source).ok_or_else(|| CacheError::Corrupt {
                        name: name.clone(),
                        reason: format!("unknown source {source:?}"),
                    })?;
                    Ok(VersionEntity {
                        name,
                        semantic_version,
                        date_modified,
                        remote_path,
                        download_url,
                        release_notes_url: notes,
                        source,
                    })
                },
            )
            .collect::<Result<Vec<_>, CacheError>>()?;

        debug!("Loaded {} catalog entries from cache", entries.len());
        Ok(Some(entries))
    }

    /// Replaces the persisted catalog with `entries`, keeping their order.
    pub fn save(&self, entries: &[VersionEntity]) -> Result<(), CacheError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM versions", [])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO versions (position, name, semantic_version, date_modified,
                                      remote_path, download_url, release_notes_url, source)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for (position, entry) in entries.iter().enumerate() {
                stmt.execute((
                    position as i64,
                    &entry.name,
                    entry.semantic_version.to_string(),
                    entry.date_modified,
                    &entry.remote_path,
                    &entry.download_url,
                    &entry.release_notes_url,
                    entry.source.as_str(),
                ))?;
            }
        }

        let prerelease_count = entries
            .iter()
            .filter(|e| e.source == CatalogSource::Prerelease)
            .count();
        tx.execute(
            r#"
            INSERT INTO catalog_meta (id, fetched_at, stable_count, prerelease_count)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                fetched_at = excluded.fetched_at,
                stable_count = excluded.stable_count,
                prerelease_count = excluded.prerelease_count
            "#,
            (
                chrono::Utc::now().timestamp(),
                (entries.len() - prerelease_count) as i64,
                prerelease_count as i64,
            ),
        )?;

        tx.commit()?;
        info!("Saved {} catalog entries to {:?}", entries.len(), self.path);
        Ok(())
    }

    /// Metadata of the persisted catalog, if any.
    pub fn metadata(&self) -> Result<Option<CatalogMetadata>, CacheError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let conn = self.open()?;
        Self::read_metadata(&conn)
    }

    fn read_metadata(conn: &Connection) -> Result<Option<CatalogMetadata>, CacheError> {
        let metadata = conn
            .query_row(
                "SELECT fetched_at, stable_count, prerelease_count FROM catalog_meta WHERE id = 1",
                [],
                |row| {
                    Ok(CatalogMetadata {
                        fetched_at: row.get(0)?,
                        stable_count: row.get::<_, i64>(1)? as usize,
                        prerelease_count: row.get::<_, i64>(2)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(metadata)
    }

    /// Removes the persisted catalog. Missing files are not an error.
    pub fn purge(&self) -> Result<(), CacheError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Purged catalog cache {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PREFIX: &str = "https://example.test/download?path=";

    fn entity(name: &str, date: i64, source: CatalogSource) -> VersionEntity {
        VersionEntity::new(
            name,
            date,
            &format!("/Xcode_{name}/Xcode_{name}.dmg"),
            Some(&format!("/Xcode_{name}/Notes.pdf")),
            PREFIX,
            source,
        )
    }

    #[test]
    fn load_returns_none_without_cache_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CatalogCache::new(&temp_dir.path().join("xcodes.db"));

        assert_eq!(cache.load().unwrap(), None);
        assert_eq!(cache.metadata().unwrap(), None);
    }

    #[test]
    fn save_then_load_preserves_entries_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CatalogCache::new(&temp_dir.path().join("xcodes.db"));
        let entries = vec![
            entity("11.3", 300, CatalogSource::Stable),
            entity("10.1", 100, CatalogSource::Stable),
            entity("12.0 beta 2", 400, CatalogSource::Prerelease),
        ];

        cache.save(&entries).unwrap();

        assert_eq!(cache.load().unwrap(), Some(entries));
    }

    #[test]
    fn save_is_idempotent_over_load() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CatalogCache::new(&temp_dir.path().join("xcodes.db"));
        cache
            .save(&[
                entity("9.0", 1, CatalogSource::Stable),
                entity("9.1", 2, CatalogSource::Stable),
            ])
            .unwrap();

        let first = cache.load().unwrap().unwrap();
        cache.save(&first).unwrap();
        let second = cache.load().unwrap().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn save_replaces_previous_snapshot_and_records_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CatalogCache::new(&temp_dir.path().join("nested").join("xcodes.db"));

        cache
            .save(&[entity("9.0", 1, CatalogSource::Stable)])
            .unwrap();
        cache
            .save(&[
                entity("10.0", 2, CatalogSource::Stable),
                entity("11.0 beta", 3, CatalogSource::Prerelease),
            ])
            .unwrap();

        let loaded = cache.load().unwrap().unwrap();
        let names: Vec<&str> = loaded.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["10.0", "11.0 beta"]);

        let metadata = cache.metadata().unwrap().unwrap();
        assert_eq!(metadata.stable_count, 1);
        assert_eq!(metadata.prerelease_count, 1);
        assert!(metadata.fetched_at > 0);
    }

    #[test]
    fn save_of_empty_catalog_loads_as_empty_not_absent() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CatalogCache::new(&temp_dir.path().join("xcodes.db"));

        cache.save(&[]).unwrap();

        assert_eq!(cache.load().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn purge_removes_snapshot_and_tolerates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CatalogCache::new(&temp_dir.path().join("xcodes.db"));
        cache
            .save(&[entity("9.0", 1, CatalogSource::Stable)])
            .unwrap();

        cache.purge().unwrap();
        cache.purge().unwrap();

        assert!(!cache.path().exists());
        assert_eq!(cache.load().unwrap(), None);
    }
}
