//! Remote Object Client.
//!
//! [`RemoteStore`] is the whole contract the sync engine needs from the system of
//! record: read a file with its version token, write a file presenting a token,
//! list a directory. [`github::GitHubContents`] implements it over the GitHub
//! Contents API. The trait carries no business logic.

pub mod credentials;
pub mod github;
pub mod repo_id;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

pub use credentials::{PlaintextToken, TokenDecryptor};
pub use github::GitHubContents;
pub use repo_id::RepoId;

/// Opaque revision identifier of a remote file (the blob SHA on GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A file read from the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub version: VersionToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File name without directory.
    pub name: String,
    /// Full path from the repository root.
    pub path: String,
    pub kind: EntryKind,
}

impl RemoteEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// A write request.
#[derive(Debug, Clone)]
pub struct PutRequest<'a> {
    pub path: &'a str,
    pub content: &'a str,
    /// Commit message recorded by the remote.
    pub message: &'a str,
    /// Token observed by the last read; `None` is a blind create.
    pub version: Option<&'a VersionToken>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read a file. A missing file is `Ok(None)`, not an error.
    async fn get(&self, path: &str) -> Result<Option<RemoteFile>, RemoteError>;

    /// Create or replace a file. Returns the new version token.
    async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, RemoteError>;

    /// List a directory. A missing directory lists as empty.
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Human-readable identity of the store, used in logs.
    fn describe(&self) -> String;
}
