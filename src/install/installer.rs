//! Facade composing catalog, download, registry and pipeline

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::cache::CatalogCache;
use crate::catalog::client::CatalogClient;
use crate::catalog::entity::VersionEntity;
use crate::catalog::prerelease::PrereleaseCatalogAdapter;
use crate::catalog::semver::select_current;
use crate::catalog::session::AuthSession;
use crate::config::Config;
use crate::install::command::{CommandSpec, SystemCommand};
use crate::install::download::Downloader;
use crate::install::error::InstallError;
use crate::install::lock::InstallLock;
use crate::install::pipeline::{InstallOptions, InstallReport, InstallationPipeline, PipelinePaths};
use crate::install::registry::{InstalledVersionEntity, InstalledVersionRegistry};

/// What `install_version` should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub version: String,
    /// Explicit artifact location: an existing local file or a URL to download
    pub url: Option<String>,
    /// Run the installation pipeline (otherwise only download)
    pub install: bool,
    pub show_progress: bool,
    pub options: InstallOptions,
}

impl InstallRequest {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            url: None,
            install: true,
            show_progress: true,
            options: InstallOptions::default(),
        }
    }
}

pub struct Installer {
    config: Config,
    session: Arc<dyn AuthSession>,
    system: Arc<dyn SystemCommand>,
    catalog: CatalogClient,
    downloader: Downloader,
    registry: InstalledVersionRegistry,
    pipeline: InstallationPipeline,
    installed: Option<Vec<InstalledVersionEntity>>,
}

impl Installer {
    pub fn new(
        config: Config,
        session: Arc<dyn AuthSession>,
        prereleases: Arc<dyn PrereleaseCatalogAdapter>,
        system: Arc<dyn SystemCommand>,
    ) -> Result<Self, InstallError> {
        std::fs::create_dir_all(&config.cache_dir)?;

        let catalog = CatalogClient::new(
            session.clone(),
            prereleases,
            CatalogCache::new(&config.catalog_path()),
            &config.download_url_prefix,
        );
        let registry = InstalledVersionRegistry::new(system.clone());
        let pipeline = InstallationPipeline::new(system.clone(), PipelinePaths::from(&config));

        Ok(Self {
            config,
            session,
            system,
            catalog,
            downloader: Downloader::default(),
            registry,
            pipeline,
            installed: None,
        })
    }

    /// Installed bundles, queried once per process.
    pub async fn installed_versions(&mut self) -> Result<&[InstalledVersionEntity], InstallError> {
        if self.installed.is_none() {
            self.installed = Some(self.registry.list_installed().await?);
        }
        Ok(self.installed.as_deref().unwrap_or_default())
    }

    pub async fn is_installed(&mut self, version: &str) -> Result<bool, InstallError> {
        Ok(self
            .installed_versions()
            .await?
            .iter()
            .any(|installed| installed.version == version))
    }

    /// Catalog names not yet installed, in catalog order.
    pub async fn list_versions(&mut self) -> Result<Vec<String>, InstallError> {
        let installed: Vec<String> = self
            .installed_versions()
            .await?
            .iter()
            .map(|installed| installed.version.clone())
            .collect();

        Ok(self
            .catalog
            .catalog()
            .await?
            .iter()
            .map(|entry| entry.name.clone())
            .filter(|name| !installed.contains(name))
            .collect())
    }

    pub async fn exists(&mut self, version: &str) -> Result<bool, InstallError> {
        Ok(self.list_versions().await?.iter().any(|name| name == version))
    }

    /// Installable versions of the latest stable major.
    pub async fn list_current(&mut self) -> Result<Vec<String>, InstallError> {
        Ok(select_current(&self.list_versions().await?))
    }

    /// Purges the cached catalog and fetches a fresh one.
    pub async fn update(&mut self) -> Result<Vec<VersionEntity>, InstallError> {
        self.catalog.purge()?;
        Ok(self.catalog.fetch_catalog().await?)
    }

    async fn find(&mut self, version: &str) -> Result<Option<VersionEntity>, InstallError> {
        Ok(self
            .catalog
            .catalog()
            .await?
            .iter()
            .find(|entry| entry.name == version)
            .cloned())
    }

    /// Downloads the disk image for `version` into the cache directory.
    ///
    /// With `url`, that URL is fetched instead of the catalog entry's and no
    /// session cookie is sent.
    pub async fn download(
        &mut self,
        version: &str,
        show_progress: bool,
        url: Option<&str>,
    ) -> Result<PathBuf, InstallError> {
        let (url, file_name, cookie) = match url {
            Some(url) => {
                let file_name = Path::new(url)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| InstallError::UnknownVersion(version.to_string()))?;
                (url.to_string(), file_name, None)
            }
            None => {
                if !self.exists(version).await? {
                    return Err(InstallError::UnknownVersion(version.to_string()));
                }
                let entry = self
                    .find(version)
                    .await?
                    .ok_or_else(|| InstallError::UnknownVersion(version.to_string()))?;
                let cookie = self.session.cookie().await?;
                (entry.download_url.clone(), entry.file_name().to_string(), cookie)
            }
        };

        info!("Downloading Xcode {} from {}", version, url);
        self.downloader
            .fetch(
                &url,
                &self.config.cache_dir,
                cookie.as_deref(),
                Some(&file_name),
                show_progress,
            )
            .await
            .map_err(|source| InstallError::DownloadFailed {
                version: version.to_string(),
                source,
            })
    }

    /// Locates the disk image: a local `url`, the shared artifact cache, or a fresh download.
    async fn get_dmg(
        &mut self,
        version: &str,
        show_progress: bool,
        url: Option<&str>,
    ) -> Result<PathBuf, InstallError> {
        if let Some(url) = url {
            let path = Path::new(url);
            if path.exists() {
                debug!("Using local disk image {:?}", path);
                return Ok(path.to_path_buf());
            }
        }

        if let Some(dir) = &self.config.artifact_cache_dir {
            let cached = dir.join(format!("xcode-{version}.dmg"));
            if cached.exists() {
                info!("Using cached disk image {:?}", cached);
                return Ok(cached);
            }
        }

        self.download(version, show_progress, url).await
    }

    /// Obtains the disk image and, unless `request.install` is false, installs it.
    pub async fn install_version(
        &mut self,
        request: &InstallRequest,
    ) -> Result<Option<InstallReport>, InstallError> {
        let dmg = self
            .get_dmg(&request.version, request.show_progress, request.url.as_deref())
            .await?;

        let report = if request.install {
            let target = self.config.install_path(&request.version);
            let report = self.pipeline.install(&dmg, &target, request.options).await?;
            self.installed = None;
            info!("Installed Xcode {} at {:?}", report.installed.version, target);
            Some(report)
        } else {
            info!("Downloaded Xcode {} to {:?}", request.version, dmg);
            None
        };

        self.open_release_notes(&request.version).await;
        Ok(report)
    }

    /// Opens the release notes of `version` when the catalog knows them.
    pub async fn open_release_notes(&mut self, version: &str) {
        let entry = match self.find(version).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cannot look up release notes for {}: {}", version, e);
                return;
            }
        };
        let Some(url) = entry.and_then(|entry| entry.release_notes_url) else {
            return;
        };

        match self.system.run(&CommandSpec::new("open").arg(&url)).await {
            Ok(output) if output.success() => debug!("Opened {}", url),
            Ok(output) => warn!("Failed to open {}: {}", url, output.stderr.trim()),
            Err(e) => warn!("Failed to open {}: {}", url, e),
        }
    }

    /// Points the active symlink at an installed version.
    pub async fn select(&mut self, version: &str) -> Result<PathBuf, InstallError> {
        let installed = self
            .installed_versions()
            .await?
            .iter()
            .find(|installed| installed.version == version)
            .cloned()
            .ok_or_else(|| InstallError::NotInstalled(version.to_string()))?;

        let _lock = InstallLock::acquire(&self.pipeline.paths().lock_path)?;
        self.pipeline.link_active(&installed.path).await?;
        Ok(installed.path)
    }

    /// The active symlink, if one exists.
    pub fn current_symlink(&self) -> Option<&Path> {
        let path = self.config.symlink_path.as_path();
        std::fs::symlink_metadata(path)
            .ok()
            .filter(|metadata| metadata.file_type().is_symlink())
            .map(|_| path)
    }

    /// Absolute target of the active symlink.
    pub fn symlinks_to(&self) -> Option<PathBuf> {
        let symlink = self.current_symlink()?;
        let target = std::fs::read_link(symlink).ok()?;
        if target.is_absolute() {
            return Some(target);
        }
        symlink.parent().map(|parent| parent.join(target))
    }
}
