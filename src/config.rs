use std::path::PathBuf;

use crate::catalog::error::SessionError;

// =============================================================================
// Vendor endpoints
// =============================================================================

/// Base URL of the developer portal serving the catalog listing and prerelease page
pub const DEFAULT_PORTAL_URL: &str = "https://developer.apple.com";

/// Base URL of the account sign-in service
pub const DEFAULT_AUTH_URL: &str = "https://idmsa.apple.com";

/// Prefix turning a vendor-relative remote path into a download URL
pub const DEFAULT_DOWNLOAD_URL_PREFIX: &str =
    "https://developer.apple.com/devcenter/download.action?path=";

/// Listing endpoint for stable downloads
pub const LISTING_PATH: &str = "/services-account/QH65B2/downloadws/listDownloads.action";

/// Page listing prerelease disk images
pub const PRERELEASE_PATH: &str = "/xcode/download/";

/// Page size requested from the listing endpoint
pub const LISTING_PAGE_SIZE: u32 = 1000;

// =============================================================================
// Environment variables
// =============================================================================

pub const ENV_USER: &str = "XCODE_INSTALL_USER";
pub const ENV_PASSWORD: &str = "XCODE_INSTALL_PASSWORD";
pub const ENV_TEAM_ID: &str = "XCODE_INSTALL_TEAM_ID";
pub const ENV_ARTIFACT_CACHE_DIR: &str = "XCODE_INSTALL_CACHE_DIR";

/// Log filter override, same syntax as `RUST_LOG`
pub const ENV_LOG: &str = "XCVERSION_LOG";

/// Filesystem locations and endpoints used by the installer.
///
/// Every fixed path of the installation flow lives here so tests can point
/// the whole pipeline at a temporary directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Per-user cache directory holding the catalog database, downloads and logs
    pub cache_dir: PathBuf,
    /// Optional directory of pre-fetched `xcode-<version>.dmg` artifacts
    pub artifact_cache_dir: Option<PathBuf>,
    /// Directory receiving installed bundles
    pub applications_dir: PathBuf,
    /// Active-version symlink
    pub symlink_path: PathBuf,
    /// Where disk images get mounted
    pub mount_point: PathBuf,
    /// System preferences file recording the accepted license
    pub license_plist_path: PathBuf,
    pub portal_url: String,
    pub auth_url: String,
    pub download_url_prefix: String,
}

impl Config {
    /// Builds the default configuration for the current user.
    pub fn from_env() -> Self {
        Self::with_env(
            dirs::home_dir(),
            std::env::var(ENV_ARTIFACT_CACHE_DIR).ok(),
        )
    }

    fn with_env(home_dir: Option<PathBuf>, artifact_cache_dir: Option<String>) -> Self {
        let applications_dir = PathBuf::from("/Applications");
        Self {
            cache_dir: cache_dir_with_env(home_dir),
            artifact_cache_dir: artifact_cache_dir
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            symlink_path: applications_dir.join("Xcode.app"),
            applications_dir,
            mount_point: PathBuf::from("/Volumes/Xcode"),
            license_plist_path: PathBuf::from("/Library/Preferences/com.apple.dt.Xcode.plist"),
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            download_url_prefix: DEFAULT_DOWNLOAD_URL_PREFIX.to_string(),
        }
    }

    /// Returns the path to the persisted catalog.
    pub fn catalog_path(&self) -> PathBuf {
        self.cache_dir.join("xcodes.db")
    }

    /// Returns the path to the log file.
    pub fn log_path(&self) -> PathBuf {
        self.cache_dir.join("xcversion.log")
    }

    /// Returns the advisory lock guarding installs and symlink switches.
    pub fn lock_path(&self) -> PathBuf {
        self.cache_dir.join("install.lock")
    }

    /// Returns the installation target for a version, e.g. `/Applications/Xcode-11.3.app`.
    pub fn install_path(&self, version: &str) -> PathBuf {
        let suffix = version.split_whitespace().next().unwrap_or(version);
        self.applications_dir.join(format!("Xcode-{suffix}.app"))
    }
}

/// Account credentials for the vendor portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub team_id: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Result<Self, SessionError> {
        Self::with_env(
            std::env::var(ENV_USER).ok(),
            std::env::var(ENV_PASSWORD).ok(),
            std::env::var(ENV_TEAM_ID).ok(),
        )
    }

    fn with_env(
        user: Option<String>,
        password: Option<String>,
        team_id: Option<String>,
    ) -> Result<Self, SessionError> {
        match (user, password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => Ok(Self {
                user,
                password,
                team_id: team_id.filter(|id| !id.is_empty()),
            }),
            _ => Err(SessionError::MissingCredentials),
        }
    }
}

/// Returns the per-user cache directory.
/// Uses ~/Library/Caches/XcodeInstall, or ./XcodeInstall without a home directory.
fn cache_dir_with_env(home_dir: Option<PathBuf>) -> PathBuf {
    home_dir
        .map(|home| home.join("Library/Caches"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("XcodeInstall")
}
