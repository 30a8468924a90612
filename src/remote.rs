//! Remote feed API boundary
//!
//! The replica never talks to the network itself. Everything it needs from
//! the remote social graph goes through [`RemoteFeed`], which the embedding
//! application implements on top of its own transport.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::{PaginatedResult, RemoteNotification, RemotePublication, Token};
use crate::error::RemoteError;

/// Content identifier returned by an upload (e.g. an `ipfs://` URI)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentUri(pub String);

impl fmt::Display for ContentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a gasless post/comment submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerResult {
    /// Transaction hash; becomes the id of the new publication
    pub tx_hash: String,
    pub tx_id: Option<String>,
}

/// Explore (global) source page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreRequest {
    pub count: u32,
    pub cursor: Option<Token>,
    pub sort: String,
    pub kinds: Vec<String>,
    /// Signed-in profile, for per-user reaction flags
    pub user_id: Option<String>,
}

/// Personal feed source page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub count: u32,
    pub cursor: Option<Token>,
    pub user_id: String,
}

/// Notifications page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationsRequest {
    pub user_id: String,
    pub count: u32,
    pub cursor: Option<Token>,
}

/// Comment thread page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentsRequest {
    pub parent_id: String,
    pub count: u32,
    pub cursor: Option<Token>,
}

/// Remote social-graph API consumed by the replica
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteFeed: Send + Sync {
    async fn fetch_explore(
        &self,
        request: ExploreRequest,
    ) -> Result<PaginatedResult<RemotePublication>, RemoteError>;

    async fn fetch_feed(
        &self,
        request: FeedRequest,
    ) -> Result<PaginatedResult<RemotePublication>, RemoteError>;

    async fn fetch_notifications(
        &self,
        request: NotificationsRequest,
    ) -> Result<PaginatedResult<RemoteNotification>, RemoteError>;

    async fn fetch_comments(
        &self,
        request: CommentsRequest,
    ) -> Result<PaginatedResult<RemotePublication>, RemoteError>;

    /// Look up a publication by the transaction hash that created it.
    ///
    /// `Ok(None)` means the remote has not indexed it yet.
    async fn fetch_publication_by_hash(
        &self,
        tx_hash: String,
    ) -> Result<Option<RemotePublication>, RemoteError>;

    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        mime_type: String,
    ) -> Result<ContentUri, RemoteError>;

    async fn upload_metadata(&self, metadata: serde_json::Value)
    -> Result<ContentUri, RemoteError>;

    async fn submit_post(
        &self,
        profile_id: String,
        content_uri: ContentUri,
    ) -> Result<RelayerResult, RemoteError>;

    async fn submit_comment(
        &self,
        profile_id: String,
        parent_id: String,
        content_uri: ContentUri,
    ) -> Result<RelayerResult, RemoteError>;
}
