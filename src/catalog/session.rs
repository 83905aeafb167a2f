//! Authenticated session against the developer portal

use reqwest::StatusCode;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::catalog::error::SessionError;
use crate::config::Credentials;

/// Performs login and authorized requests against the vendor portal.
///
/// Constructed once by the caller and shared with every component that needs
/// authenticated access.
#[async_trait::async_trait]
pub trait AuthSession: Send + Sync {
    /// Performs an authorized GET of `path` and returns the response body
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String, SessionError>;

    /// Session cookie to hand to the downloader, if the session has one
    async fn cookie(&self) -> Result<Option<String>, SessionError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    account_name: &'a str,
    password: &'a str,
    remember_me: bool,
}

/// Portal session that signs in lazily on the first authorized request.
///
/// Listing a warm catalog therefore never requires credentials.
pub struct PortalSession {
    client: reqwest::Client,
    portal_url: String,
    auth_url: String,
    credentials: Result<Credentials, SessionError>,
    cookie: OnceCell<String>,
}

impl PortalSession {
    pub fn new(
        portal_url: &str,
        auth_url: &str,
        credentials: Result<Credentials, SessionError>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("xcversion/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to create HTTP client"),
            portal_url: portal_url.trim_end_matches('/').to_string(),
            auth_url: auth_url.trim_end_matches('/').to_string(),
            credentials,
            cookie: OnceCell::new(),
        }
    }

    fn credentials(&self) -> Result<&Credentials, SessionError> {
        self.credentials.as_ref().map_err(|e| match e {
            SessionError::InvalidCredentials => SessionError::InvalidCredentials,
            _ => SessionError::MissingCredentials,
        })
    }

    async fn session_cookie(&self) -> Result<&String, SessionError> {
        self.cookie.get_or_try_init(|| self.sign_in()).await
    }

    async fn sign_in(&self) -> Result<String, SessionError> {
        let credentials = self.credentials()?;
        info!("Signing in to the developer portal as {}", credentials.user);

        let url = format!("{}/appleauth/auth/signin", self.auth_url);
        let response = self
            .client
            .post(&url)
            .json(&SignInRequest {
                account_name: &credentials.user,
                password: &credentials.password,
                remember_me: false,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SessionError::InvalidCredentials);
        }
        if !status.is_success() {
            warn!("Sign-in returned status {}: {}", status, url);
            return Err(SessionError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let cookie = collect_cookies(response.headers().get_all(SET_COOKIE).iter());
        if cookie.is_empty() {
            return Err(SessionError::InvalidResponse(
                "Sign-in response carried no session cookie".to_string(),
            ));
        }

        debug!("Signed in, session cookie established");
        Ok(cookie)
    }
}

#[async_trait::async_trait]
impl AuthSession for PortalSession {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String, SessionError> {
        let cookie = self.session_cookie().await?;
        let url = format!("{}{}", self.portal_url, path);

        let mut request = self.client.get(&url).header(COOKIE, cookie.as_str()).query(query);
        if let Some(team_id) = self.credentials()?.team_id.as_deref() {
            request = request.query(&[("teamId", team_id)]);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SessionError::InvalidCredentials);
        }
        if !status.is_success() {
            warn!("Portal returned status {}: {}", status, url);
            return Err(SessionError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        Ok(response.text().await?)
    }

    async fn cookie(&self) -> Result<Option<String>, SessionError> {
        Ok(Some(self.session_cookie().await?.clone()))
    }
}

/// Joins the `name=value` parts of `Set-Cookie` headers into one `Cookie` header value.
fn collect_cookies<'a>(headers: impl Iterator<Item = &'a reqwest::header::HeaderValue>) -> String {
    headers
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect::<Vec<_>>()
        .join("; ")
}
