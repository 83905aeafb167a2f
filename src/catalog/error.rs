use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to access catalog cache: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt catalog cache entry {name}: {reason}")]
    Corrupt { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(
        "Please provide your Apple developer account credentials via the \
         XCODE_INSTALL_USER and XCODE_INSTALL_PASSWORD environment variables."
    )]
    MissingCredentials,

    #[error("The specified Apple developer account credentials are incorrect.")]
    InvalidCredentials,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SessionError {
    /// Credential failures cannot be fixed by retrying
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::MissingCredentials | Self::InvalidCredentials)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Catalog cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid catalog response: {0}")]
    InvalidResponse(String),
}
