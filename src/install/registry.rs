//! Installed Xcode bundles, discovered through the Spotlight index

use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use tracing::{debug, warn};

use crate::catalog::semver::parse_version;
use crate::install::command::{CommandSpec, SystemCommand};
use crate::install::error::RegistryError;

/// Bundle identifier every Xcode release carries
pub const BUNDLE_IDENTIFIER: &str = "com.apple.dt.Xcode";

/// Reported when a bundle's own version tool prints nothing
pub const UNKNOWN_VERSION: &str = "0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersionEntity {
    pub path: PathBuf,
    pub version: String,
}

impl InstalledVersionEntity {
    /// Builds the entity by asking the bundle for its version.
    pub async fn query(path: &Path, system: &dyn SystemCommand) -> Self {
        Self {
            path: path.to_path_buf(),
            version: report_version(path, system).await,
        }
    }

    pub fn semantic_version(&self) -> Version {
        parse_version(&self.version).unwrap_or_else(|| Version::new(0, 0, 0))
    }

    pub fn license_path(&self) -> PathBuf {
        self.path
            .join("Contents/Resources/English.lproj/License.rtf")
    }

    pub fn version_plist_path(&self) -> PathBuf {
        self.path.join("Contents/version.plist")
    }

    pub fn mobile_device_package_path(&self) -> PathBuf {
        self.path
            .join("Contents/Resources/Packages/MobileDevice.pkg")
    }
}

fn xcodebuild_path(bundle: &Path) -> PathBuf {
    bundle.join("Contents/Developer/usr/bin/xcodebuild")
}

/// Runs the bundle's `xcodebuild -version` with `DEVELOPER_DIR` cleared and
/// returns the second token of the first line ("Xcode 11.3" -> "11.3").
async fn report_version(bundle: &Path, system: &dyn SystemCommand) -> String {
    let command = CommandSpec::new(xcodebuild_path(bundle).to_string_lossy())
        .arg("-version")
        .env("DEVELOPER_DIR", "");

    let output = match system.run(&command).await {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to query version of {:?}: {}", bundle, e);
            return UNKNOWN_VERSION.to_string();
        }
    };

    output
        .stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

pub struct InstalledVersionRegistry {
    system: Arc<dyn SystemCommand>,
}

impl InstalledVersionRegistry {
    pub fn new(system: Arc<dyn SystemCommand>) -> Self {
        Self { system }
    }

    /// Fails fast when Spotlight indexing is off, since the listing would be incomplete.
    async fn ensure_index_enabled(&self) -> Result<(), RegistryError> {
        let output = self
            .system
            .run(&CommandSpec::new("mdutil").args(["-s", "/"]))
            .await?;

        if output.stdout.contains("disabled") {
            return Err(RegistryError::IndexDisabled);
        }
        Ok(())
    }

    /// Lists installed bundles ordered by version (lowest first).
    pub async fn list_installed(&self) -> Result<Vec<InstalledVersionEntity>, RegistryError> {
        self.ensure_index_enabled().await?;

        let query = format!("kMDItemCFBundleIdentifier == '{BUNDLE_IDENTIFIER}'");
        let output = self
            .system
            .run(&CommandSpec::new("mdfind").arg(query))
            .await?;

        let mut installed = Vec::new();
        for line in output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let entity = InstalledVersionEntity::query(Path::new(line), self.system.as_ref()).await;
            installed.push(entity);
        }

        installed.sort_by(|a, b| {
            a.semantic_version()
                .cmp(&b.semantic_version())
                .then_with(|| a.path.cmp(&b.path))
        });
        debug!("Found {} installed versions", installed.len());

        Ok(installed)
    }
}
