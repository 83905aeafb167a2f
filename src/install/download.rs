//! Resumable, cookie-authenticated artifact download

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::cookie::Jar;
use reqwest::header::RANGE;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::install::error::DownloadError;

pub struct Downloader {
    user_agent: String,
}

impl Downloader {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
        }
    }

    /// Downloads `url` into `destination_dir`, resuming a partial file if one exists.
    ///
    /// `cookie` seeds a cookie jar that lives only for this call, so cookies set
    /// during redirects never outlive or leak between invocations. Seeded
    /// cookies apply to every path on the host. The file name
    /// defaults to the last segment of the URL path.
    pub async fn fetch(
        &self,
        url: &str,
        destination_dir: &Path,
        cookie: Option<&str>,
        output_name: Option<&str>,
        show_progress: bool,
    ) -> Result<PathBuf, DownloadError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
        let file_name = match output_name {
            Some(name) => name.to_string(),
            None => parsed
                .path_segments()
                .and_then(|segments| segments.last())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))?,
        };

        tokio::fs::create_dir_all(destination_dir).await?;
        let destination = destination_dir.join(file_name);

        let offset = match tokio::fs::metadata(&destination).await {
            Ok(metadata) => metadata.len(),
            Err(_) => 0,
        };

        let jar = Arc::new(Jar::default());
        if let Some(cookie) = cookie {
            // Path=/ keeps the cookie on redirects leaving the request path
            for pair in cookie.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                jar.add_cookie_str(&format!("{pair}; Path=/"), &parsed);
            }
        }
        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .cookie_provider(jar)
            .build()?;

        let mut request = client.get(parsed);
        if offset > 0 {
            info!("Resuming download of {:?} at byte {}", destination, offset);
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await?;
        let status = response.status();

        let resume = match status {
            StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 => {
                info!("{:?} is already complete", destination);
                return Ok(destination);
            }
            StatusCode::PARTIAL_CONTENT => offset > 0,
            status if status.is_success() => {
                if offset > 0 {
                    warn!("Server ignored range request, restarting {:?}", destination);
                }
                false
            }
            status => {
                warn!("Download returned status {}: {}", status, url);
                return Err(DownloadError::Status {
                    url: url.to_string(),
                    status,
                });
            }
        };

        let start = if resume { offset } else { 0 };
        let progress = progress_bar(
            show_progress,
            response.content_length().map(|len| len + start),
        );
        progress.set_position(start);

        let mut file = if resume {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&destination)
                .await?
        } else {
            tokio::fs::File::create(&destination).await?
        };

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            progress.inc(chunk.len() as u64);
        }
        file.flush().await?;
        progress.finish_and_clear();

        debug!("Downloaded {} to {:?}", url, destination);
        Ok(destination)
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(concat!("xcversion/", env!("CARGO_PKG_VERSION")))
    }
}

fn progress_bar(visible: bool, total: Option<u64>) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::default_bar()
        .template("[{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    bar.set_style(style);
    bar
}
