//! GitHub Contents API implementation of [`RemoteStore`].
//!
//! Files travel base64-encoded; the blob SHA is the version token. GitHub has no
//! compare-and-swap across files, and a PUT with a stale SHA is answered with 409.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EntryKind, PutRequest, RemoteEntry, RemoteFile, RemoteStore, RepoId, VersionToken};
use crate::error::{ConfigError, RemoteError};

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("macp-sync/", env!("CARGO_PKG_VERSION"));

/// Client for one repository, authenticated as one principal.
pub struct GitHubContents {
    client: Client,
    api_base: String,
    repo: RepoId,
    read_timeout: Duration,
    write_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Dir(Vec<ContentsEntry>),
    File(ContentsFile),
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

impl GitHubContents {
    pub fn new(
        api_base: &str,
        repo: RepoId,
        token: &str,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ConfigError::MissingCredentials("token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static(API_VERSION),
        );

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo,
            read_timeout,
            write_timeout,
        })
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    fn contents_url(&self, path: &str) -> Result<String, RemoteError> {
        let path = path.trim_matches('/');
        let traversal = path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
        if traversal || path.contains(['?', '#', '%', '\\']) {
            return Err(RemoteError::Unprocessable(format!("unsafe remote path: {path}")));
        }
        Ok(format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.repo.owner(),
            self.repo.name(),
            path
        ))
    }

    async fn fetch(&self, path: &str) -> Result<Option<ContentsResponse>, RemoteError> {
        let url = self.contents_url(path)?;
        let response = self
            .client
            .get(&url)
            .timeout(self.read_timeout)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status, truncate(&body)));
        }
        Ok(Some(response.json::<ContentsResponse>().await?))
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

fn decode_content(file: ContentsFile, path: &str) -> Result<RemoteFile, RemoteError> {
    if file.encoding.as_deref().is_some_and(|e| e != "base64") {
        return Err(RemoteError::Decode(format!(
            "{path}: unsupported encoding {:?}",
            file.encoding
        )));
    }
    let compact: String = file.content.split_whitespace().collect();
    let bytes = STANDARD.decode(compact)?;
    let content = String::from_utf8(bytes)
        .map_err(|e| RemoteError::Decode(format!("{path}: not UTF-8: {e}")))?;
    Ok(RemoteFile {
        content,
        version: VersionToken(file.sha),
    })
}

#[async_trait]
impl RemoteStore for GitHubContents {
    async fn get(&self, path: &str) -> Result<Option<RemoteFile>, RemoteError> {
        match self.fetch(path).await? {
            None => Ok(None),
            Some(ContentsResponse::File(file)) => decode_content(file, path).map(Some),
            Some(ContentsResponse::Dir(_)) => {
                Err(RemoteError::Decode(format!("{path} is a directory")))
            }
        }
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, RemoteError> {
        let url = self.contents_url(request.path)?;
        let body = PutBody {
            message: request.message,
            content: STANDARD.encode(request.content.as_bytes()),
            sha: request.version.map(VersionToken::as_str),
        };

        let response = self
            .client
            .put(&url)
            .timeout(self.write_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            let parsed: PutResponse = response.json().await?;
            return Ok(VersionToken(parsed.content.sha));
        }

        let text = response.text().await.unwrap_or_default();
        tracing::warn!(
            path = request.path,
            status = status.as_u16(),
            body = %truncate(&text),
            "remote PUT rejected"
        );
        Err(RemoteError::from_status(status.as_u16(), format!("{}: {}", request.path, truncate(&text))))
    }

    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        match self.fetch(dir).await? {
            None => Ok(Vec::new()),
            Some(ContentsResponse::Dir(entries)) => Ok(entries
                .into_iter()
                .filter_map(|entry| {
                    let kind = match entry.kind.as_str() {
                        "file" => EntryKind::File,
                        "dir" => EntryKind::Dir,
                        _ => return None,
                    };
                    Some(RemoteEntry {
                        name: entry.name,
                        path: entry.path,
                        kind,
                    })
                })
                .collect()),
            Some(ContentsResponse::File(_)) => {
                Err(RemoteError::Decode(format!("{dir} is a file, not a directory")))
            }
        }
    }

    fn describe(&self) -> String {
        format!("github:{}", self.repo)
    }
}
