#![doc = "GitHub REST adapter: implements the repository client contract over reqwest."]
//
//! # GitHub client
//!
//! Bridges [`RepositoryClient`] to the GitHub REST API:
//!
//! | operation               | endpoint                                          |
//! |-------------------------|---------------------------------------------------|
//! | default reference       | `GET /repos/{owner}/{repo}`                       |
//! | tree listing            | `GET /repos/{owner}/{repo}/git/trees/{ref}?recursive=1` |
//! | latest revision         | `GET /repos/{owner}/{repo}/commits/{ref}`         |
//! | file content            | `GET /repos/{owner}/{repo}/contents/{path}?ref={ref}` |
//! | revision diff           | `GET /repos/{owner}/{repo}/compare/{base}...{head}` |
//!
//! - Construct with [`GithubClient::new`] (public API) or
//!   [`GithubClient::with_base_url`] (enterprise hosts, test servers).
//! - The optional token is sent as `Authorization: Bearer <token>`. Without one
//!   the host applies a lower rate ceiling; nothing here enforces it.
//! - HTTP 403/429 responses that look like rate limiting are reported as
//!   [`ClientError::RateLimited`] so callers can show targeted guidance.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::contract::{ChangeKind, ClientError, FileChange, RepositoryClient, TreeEntry};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const USER_AGENT: &str = concat!("repo-dump/", env!("CARGO_PKG_VERSION"));

/// The compare endpoint silently stops listing files at this count.
pub const COMPARE_FILE_LIMIT: usize = 300;

#[derive(Deserialize)]
struct RepositoryResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Deserialize)]
struct CompareFile {
    filename: String,
    status: ChangeKind,
    #[serde(default)]
    previous_filename: Option<String>,
}

pub struct GithubClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl GithubClient {
    /// Client for the public GitHub API.
    pub fn new(token: Option<String>) -> Result<Self, ClientError> {
        Self::with_base_url(DEFAULT_API_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: Option<String>) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::Transport {
            url: base_url.to_string(),
            message: format!("invalid base URL: {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Transport {
                url: base_url.to_string(),
                message: "invalid base URL: cannot be a base".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Transport {
                url: base_url.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let token = token.filter(|t| !t.trim().is_empty());
        tracing::info!(
            base_url = %base_url,
            token_set = token.is_some(),
            "Initialized GitHub client"
        );
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Joins `segments` under the base URL, percent-encoding each one.
    /// Segments containing `/` are split so paths and branch names keep their slashes.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        url
    }

    fn get(&self, url: &Url) -> RequestBuilder {
        let request = self.http.get(url.clone());
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = ?e, url = %url, "GitHub request failed");
            ClientError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;
        check_status(response, url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        tracing::debug!(url = %url, "GET");
        let response = self.send(self.get(&url), &url).await?;
        response.json::<T>().await.map_err(|e| ClientError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_raw(&self, url: Url) -> Result<Vec<u8>, ClientError> {
        tracing::debug!(url = %url, "GET (raw)");
        let request = self.get(&url).header(ACCEPT, RAW_MEDIA_TYPE);
        let response = self.send(request, &url).await?;
        let bytes = response.bytes().await.map_err(|e| ClientError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

async fn check_status(response: Response, url: &Url) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let remaining_zero = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    let body = response.text().await.unwrap_or_default();

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (remaining_zero || body.to_ascii_lowercase().contains("rate limit")));
    if rate_limited {
        tracing::warn!(status = %status, url = %url, "GitHub rate limit reached");
        return Err(ClientError::RateLimited {
            url: url.to_string(),
        });
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(url.to_string()));
    }

    tracing::error!(status = %status, url = %url, body = %body, "GitHub API returned error");
    Err(ClientError::Status {
        url: url.to_string(),
        status: status.as_u16(),
    })
}

fn decode_base64(encoded: &str, url: &Url) -> Result<Vec<u8>, ClientError> {
    // The API wraps base64 payloads at 60 columns.
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| ClientError::Decode {
        url: url.to_string(),
        message: format!("invalid base64 content: {e}"),
    })
}

#[async_trait]
impl RepositoryClient for GithubClient {
    async fn get_default_reference(&self, owner: &str, repo: &str) -> Result<String, ClientError> {
        let url = self.url(&["repos", owner, repo]);
        let meta: RepositoryResponse = self.get_json(url).await?;
        tracing::info!(owner, repo, default_branch = %meta.default_branch, "Resolved default branch");
        Ok(meta.default_branch)
    }

    async fn list_tree(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<Vec<TreeEntry>, ClientError> {
        let mut url = self.url(&["repos", owner, repo, "git", "trees", reference]);
        url.query_pairs_mut().append_pair("recursive", "1");
        let listing: TreeResponse = self.get_json(url).await?;
        if listing.truncated {
            tracing::warn!(
                owner,
                repo,
                reference,
                entries = listing.tree.len(),
                "Tree listing was truncated by the host; some files will be missing"
            );
        }
        tracing::info!(owner, repo, reference, entries = listing.tree.len(), "Listed tree");
        Ok(listing.tree)
    }

    async fn get_latest_revision(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<String, ClientError> {
        let url = self.url(&["repos", owner, repo, "commits", reference]);
        let commit: CommitResponse = self.get_json(url).await?;
        Ok(commit.sha)
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<Vec<u8>, ClientError> {
        let mut url = self.url(&["repos", owner, repo, "contents", path]);
        url.query_pairs_mut().append_pair("ref", reference);

        let body: serde_json::Value = self.get_json(url.clone()).await?;
        if body.is_array() {
            return Err(ClientError::IsDirectory(path.to_string()));
        }
        let content: ContentResponse =
            serde_json::from_value(body).map_err(|e| ClientError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        if content.kind.as_deref() == Some("dir") {
            return Err(ClientError::IsDirectory(path.to_string()));
        }

        match (content.encoding.as_deref(), content.content) {
            (Some("base64"), Some(encoded)) => decode_base64(&encoded, &url),
            _ => {
                // Large files come back with `encoding: "none"` and no inline payload.
                tracing::debug!(path, "No inline content, falling back to raw media type");
                self.get_raw(url).await
            }
        }
    }

    async fn diff_revisions(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Vec<FileChange>, ClientError> {
        let range = format!("{base}...{head}");
        let url = self.url(&["repos", owner, repo, "compare", &range]);
        let compare: CompareResponse = self.get_json(url.clone()).await?;
        if compare.files.len() >= COMPARE_FILE_LIMIT {
            tracing::warn!(
                owner,
                repo,
                base,
                head,
                files = compare.files.len(),
                "Compare result hit the host's file limit; the change list may be incomplete"
            );
            return Err(ClientError::Decode {
                url: url.to_string(),
                message: format!(
                    "compare listed {} files, at or above the {COMPARE_FILE_LIMIT}-file limit; change list is incomplete",
                    compare.files.len()
                ),
            });
        }
        tracing::info!(owner, repo, base, head, files = compare.files.len(), "Compared revisions");
        Ok(compare
            .files
            .into_iter()
            .map(|f| FileChange {
                path: f.filename,
                kind: f.status,
                previous_path: f.previous_filename,
            })
            .collect())
    }
}
