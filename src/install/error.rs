use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::error::{CatalogError, SessionError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid download URL {0}")]
    InvalidUrl(String),

    #[error("Download of {url} failed with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to write download: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Please enable Spotlight indexing for /Applications.")]
    IndexDisabled,

    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Version {0} doesn't exist.")]
    UnknownVersion(String),

    #[error("Version {0} is not installed.")]
    NotInstalled(String),

    #[error("Failed to download Xcode {version}: {source}")]
    DownloadFailed {
        version: String,
        #[source]
        source: DownloadError,
    },

    #[error("Failed to mount {dmg:?}: {stderr}")]
    Mount { dmg: PathBuf, stderr: String },

    #[error(
        "No `Xcode.app` found in DMG. Please remove {dmg:?} if you suspect a corrupted \
         download or run `xcversion update` to see if the version you tried to install \
         has been pulled by Apple."
    )]
    SourceNotFound { dmg: PathBuf },

    #[error("Failed to copy {source_path:?} to {target:?}: {stderr}")]
    Copy {
        source_path: PathBuf,
        target: PathBuf,
        stderr: String,
    },

    #[error("Code signature assessment failed for {path:?}; the copy has been removed.")]
    Integrity { path: PathBuf },

    #[error("No license agreement identifier found in {path:?}")]
    LicenseNotFound { path: PathBuf },

    #[error("`{command}` failed: {stderr}")]
    StepFailed { command: String, stderr: String },

    #[error("Failed to acquire install lock {path:?}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
