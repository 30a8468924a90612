//! Comment service
//!
//! Pages comment threads into the store, one cursor per parent publication.

use std::sync::Arc;

use super::cursors::CursorBook;
use super::{PageOutcome, fetch_failed, record_fetch};
use crate::config::PageConfig;
use crate::data::EntityStore;
use crate::error::ReplicaError;
use crate::remote::{CommentsRequest, RemoteFeed};

/// Comment thread pagination service
pub struct CommentService {
    store: Arc<EntityStore>,
    remote: Arc<dyn RemoteFeed>,
    config: PageConfig,
    cursors: CursorBook,
}

impl CommentService {
    /// Create new comment service
    pub fn new(store: Arc<EntityStore>, remote: Arc<dyn RemoteFeed>, config: PageConfig) -> Self {
        Self {
            store,
            remote,
            config,
            cursors: CursorBook::default(),
        }
    }

    /// Start the thread over and fetch its first page
    pub async fn refresh(&self, parent_id: &str) -> Result<PageOutcome, ReplicaError> {
        self.cursors.reset(parent_id).await;
        self.load_more(parent_id).await
    }

    /// Fetch the next page of the thread, unless it is exhausted
    pub async fn load_more(&self, parent_id: &str) -> Result<PageOutcome, ReplicaError> {
        let cursor = self.cursors.get(parent_id).await;
        if cursor.is_exhausted() {
            tracing::debug!(parent_id, "Comment thread exhausted; skipping fetch");
            return Ok(PageOutcome::Exhausted);
        }

        let result = self
            .remote
            .fetch_comments(CommentsRequest {
                parent_id: parent_id.to_string(),
                count: self.config.page_size,
                cursor: cursor.next_token(),
            })
            .await;
        record_fetch("comments", &result);
        let page = result.map_err(|error| fetch_failed("comments", error))?;

        self.cursors.advance(parent_id, &page.cursor).await;

        let fetched = page.data.len();
        let report = self.store.upsert_many(page.data).await;

        tracing::debug!(
            parent_id,
            fetched,
            stored = report.stored,
            "Comment page stored"
        );
        Ok(PageOutcome::fetched(fetched, report))
    }

    /// Forget pagination state (logout)
    pub async fn reset(&self) {
        self.cursors.clear().await;
    }
}
