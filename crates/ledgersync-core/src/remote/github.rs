//! Remote blob client for a file in a GitHub repository.
//!
//! Reads go through the raw content host and need no credential. Version
//! tokens are the blob SHA from the contents API, and writes are `PUT`s to
//! the contents API carrying the SHA the writer last observed; the server
//! rejects the write if the file moved on in between.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{RemoteBlobStore, RemoteError, VersionToken};

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the repository contents API
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Default base URL for raw file reads
pub const DEFAULT_RAW_BASE_URL: &str = "https://raw.githubusercontent.com";

/// HTTP request timeout in seconds.
/// The orchestrator applies its own deadline on top of this one.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Media type the contents API expects
const GITHUB_JSON: &str = "application/vnd.github.v3+json";

/// The contents API refuses requests without a User-Agent
const USER_AGENT: &str = concat!("ledgersync/", env!("CARGO_PKG_VERSION"));

/// Repository coordinate of the blob: owner, repository and branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl BlobLocation {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: ContentsResponse,
}

/// Blob client for GitHub.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct GitHubBlobClient {
    client: Client,
    location: BlobLocation,
    api_base_url: String,
    raw_base_url: String,
    token: Option<String>,
}

impl GitHubBlobClient {
    /// Create a client for the public GitHub endpoints.
    pub fn new(location: BlobLocation) -> Result<Self, RemoteError> {
        Self::with_endpoints(location, DEFAULT_API_BASE_URL, DEFAULT_RAW_BASE_URL)
    }

    /// Create a client against custom endpoints (GitHub Enterprise, test servers).
    pub fn with_endpoints(
        location: BlobLocation,
        api_base_url: &str,
        raw_base_url: &str,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            location,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            raw_base_url: raw_base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Set the bearer token used for writes
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new client with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            location: self.location.clone(),
            api_base_url: self.api_base_url.clone(),
            raw_base_url: self.raw_base_url.clone(),
            token: Some(token),
        }
    }

    pub fn location(&self) -> &BlobLocation {
        &self.location
    }

    fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base_url,
            self.location.owner,
            self.location.repo,
            self.location.branch,
            path.trim_start_matches('/')
        )
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base_url,
            self.location.owner,
            self.location.repo,
            path.trim_start_matches('/')
        )
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, RemoteError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::InvalidResponse("token is not a valid header value".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response, RemoteError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, path, &body))
        }
    }

    fn encode_content(content: &str) -> String {
        BASE64_STANDARD.encode(content.as_bytes())
    }
}

#[async_trait]
impl RemoteBlobStore for GitHubBlobClient {
    async fn fetch(&self, path: &str) -> Result<Option<String>, RemoteError> {
        let url = self.raw_url(path);
        debug!(url = %url, "Fetching remote blob");

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_response(response, path).await?;
        Ok(Some(response.text().await?))
    }

    async fn fetch_version_token(&self, path: &str) -> Result<Option<VersionToken>, RemoteError> {
        let url = self.contents_url(path);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .header(header::ACCEPT, GITHUB_JSON)
            .query(&[("ref", self.location.branch.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path = path, "Remote blob does not exist yet");
            return Ok(None);
        }
        let response = Self::check_response(response, path).await?;
        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("contents metadata: {}", e)))?;
        Ok(Some(VersionToken::new(contents.sha)))
    }

    async fn conditional_write(
        &self,
        path: &str,
        content: &str,
        expected: Option<&VersionToken>,
        branch: &str,
        message: &str,
    ) -> Result<VersionToken, RemoteError> {
        if self.token.is_none() {
            warn!(path = path, "Conditional write attempted without a token");
        }
        let url = self.contents_url(path);
        let body = WriteRequest {
            message,
            content: Self::encode_content(content),
            sha: expected.map(VersionToken::as_str),
            branch,
        };

        let response = self
            .client
            .put(&url)
            .headers(self.auth_headers()?)
            .header(header::ACCEPT, GITHUB_JSON)
            .json(&body)
            .send()
            .await?;

        let response = Self::check_response(response, path).await?;
        let written: WriteResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("write response: {}", e)))?;
        Ok(VersionToken::new(written.content.sha))
    }

    async fn head_check(&self, path: &str) -> bool {
        let url = self.raw_url(path);
        let headers = match self.auth_headers() {
            Ok(headers) => headers,
            Err(_) => return false,
        };
        match self
            .client
            .head(&url)
            .headers(headers)
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GitHubBlobClient {
        GitHubBlobClient::with_endpoints(
            BlobLocation::new("smarques", "financeiro", "main"),
            "https://api.example.test/",
            "https://raw.example.test",
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.raw_url("data/gastos.json"),
            "https://raw.example.test/smarques/financeiro/main/data/gastos.json"
        );
        assert_eq!(
            client.contents_url("/data/gastos.json"),
            "https://api.example.test/repos/smarques/financeiro/contents/data/gastos.json"
        );
    }

    #[test]
    fn test_auth_headers() {
        let client = client();
        assert!(client.auth_headers().unwrap().is_empty());

        let client = client.with_token("ghp_secret".into());
        let headers = client.auth_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer ghp_secret");
    }

    #[test]
    fn test_write_request_body() {
        let body = WriteRequest {
            message: "Automatic update",
            content: GitHubBlobClient::encode_content("{\"receitas\":[]}"),
            sha: None,
            branch: "main",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("sha").is_none());
        assert_eq!(value["branch"], "main");

        let decoded = BASE64_STANDARD.decode(value["content"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, b"{\"receitas\":[]}");

        let body = WriteRequest { sha: Some("abc"), ..body };
        assert_eq!(serde_json::to_value(&body).unwrap()["sha"], "abc");
    }

    #[test]
    fn test_parse_write_response() {
        let json = r#"{"content": {"name": "gastos.json", "path": "data/gastos.json", "sha": "95b966ae1c166bd92f8ae7d1c313e738c731dfc3"}, "commit": {"sha": "7638417db6d59f3c431d3e1f261cc637155684cd"}}"#;
        let parsed: WriteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.content.sha, "95b966ae1c166bd92f8ae7d1c313e738c731dfc3");
    }
}
