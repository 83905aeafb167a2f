//! Session test utilities

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use xcode_install::catalog::error::SessionError;
use xcode_install::catalog::session::AuthSession;

/// Session serving canned bodies per path and recording every request
#[derive(Default)]
pub struct FakeSession {
    bodies: HashMap<String, String>,
    cookie: Option<String>,
    reject: bool,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, path: &str, body: impl Into<String>) -> Self {
        self.bodies.insert(path.to_string(), body.into());
        self
    }

    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.cookie = Some(cookie.to_string());
        self
    }

    /// Every request fails as if the portal rejected the credentials
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn query_for(&self, path: &str) -> Option<Vec<(String, String)>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(requested, _)| requested == path)
            .map(|(_, query)| query.clone())
    }
}

#[async_trait]
impl AuthSession for FakeSession {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String, SessionError> {
        self.requests.lock().unwrap().push((
            path.to_string(),
            query
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        ));

        if self.reject {
            return Err(SessionError::InvalidCredentials);
        }
        self.bodies
            .get(path)
            .cloned()
            .ok_or_else(|| SessionError::InvalidResponse(format!("no canned body for {path}")))
    }

    async fn cookie(&self) -> Result<Option<String>, SessionError> {
        if self.reject {
            return Err(SessionError::InvalidCredentials);
        }
        Ok(self.cookie.clone())
    }
}

/// Listing body in the portal's JSON shape
pub fn listing(records: &[(&str, i64, &str)]) -> String {
    let downloads: Vec<serde_json::Value> = records
        .iter()
        .map(|(name, date, remote_path)| {
            serde_json::json!({
                "name": name,
                "dateModified": date,
                "files": [{ "remotePath": remote_path }],
            })
        })
        .collect();
    serde_json::json!({ "downloads": downloads }).to_string()
}

/// Prerelease page linking the given `(label, remote_path)` disk images
pub fn prerelease_page(links: &[(&str, &str)]) -> String {
    let anchors: String = links
        .iter()
        .map(|(label, remote_path)| {
            format!(
                "<p><a class=\"button\" href=\"/services-account/download?path={remote_path}\">{label}</a></p>\n"
            )
        })
        .collect();
    format!("<div class=\"downloads\">\n{anchors}</div>\n")
}
