use anyhow::{Context, Result};
use reqwest::Url;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::types::{GenerationOutcome, GenerationRequest, WireResponse};

const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Formats a transport-level failure the way the error panel expects it.
pub fn network_error_message(err: &anyhow::Error) -> String {
    format!("Network error: {err}")
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
}

impl Client {
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let url = base_url
            .map(Url::parse)
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL))
            .context("invalid server base URL")?;
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url: url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Submits one generation request and reads the JSON payload whatever the
    /// status code. The server reports application failures as
    /// `success: false` bodies, on non-2xx responses included.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let url = self.base_url.join("generate").context("failed to build generate URL")?;
        debug!(%url, "submitting generation request");
        let response = self.http.post(url).json(request).send().await?;
        let payload: WireResponse = response.json().await?;
        GenerationOutcome::from_wire(payload)
    }

    /// Downloads a server-relative artifact (`/static/...`) into `dir`, named
    /// after the last URL segment. An already-downloaded artifact is reused.
    pub async fn fetch_artifact(&self, path: &str, dir: &Path) -> Result<PathBuf> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid artifact URL {path}"))?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("artifact")
            .to_string();
        let target = dir.join(file_name);
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(target);
        }

        debug!(%url, "fetching artifact");
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("server responded with status {}", response.status());
        }
        let bytes = response.bytes().await?;

        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create download dir {}", dir.display()))?;
        fs::write(&target, &bytes)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn network_errors_carry_the_underlying_message() {
        let err = anyhow!("timeout");
        assert_eq!(network_error_message(&err), "Network error: timeout");
    }

    #[test]
    fn client_rejects_malformed_base_url() {
        assert!(Client::new(Some("not a url")).is_err());
    }

    #[test]
    fn client_defaults_to_local_server() {
        let client = Client::new(None).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:5000/");
    }
}
