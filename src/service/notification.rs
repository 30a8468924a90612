//! Notification service
//!
//! Pages the signed-in profile's notifications into the store. One cursor
//! per profile.

use std::sync::Arc;

use super::cursors::CursorBook;
use super::{PageOutcome, fetch_failed, record_fetch};
use crate::config::PageConfig;
use crate::data::EntityStore;
use crate::error::ReplicaError;
use crate::remote::{NotificationsRequest, RemoteFeed};

/// Notification pagination service
pub struct NotificationService {
    store: Arc<EntityStore>,
    remote: Arc<dyn RemoteFeed>,
    config: PageConfig,
    cursors: CursorBook,
}

impl NotificationService {
    /// Create new notification service
    pub fn new(store: Arc<EntityStore>, remote: Arc<dyn RemoteFeed>, config: PageConfig) -> Self {
        Self {
            store,
            remote,
            config,
            cursors: CursorBook::default(),
        }
    }

    /// Start over and fetch the first page
    pub async fn refresh(&self, user_id: &str) -> Result<PageOutcome, ReplicaError> {
        self.cursors.reset(user_id).await;
        self.load_more(user_id).await
    }

    /// Fetch the next page, unless the source is exhausted
    pub async fn load_more(&self, user_id: &str) -> Result<PageOutcome, ReplicaError> {
        let cursor = self.cursors.get(user_id).await;
        if cursor.is_exhausted() {
            tracing::debug!(user_id, "Notifications exhausted; skipping fetch");
            return Ok(PageOutcome::Exhausted);
        }

        let result = self
            .remote
            .fetch_notifications(NotificationsRequest {
                user_id: user_id.to_string(),
                count: self.config.page_size,
                cursor: cursor.next_token(),
            })
            .await;
        record_fetch("notifications", &result);
        let page = result.map_err(|error| fetch_failed("notifications", error))?;

        self.cursors.advance(user_id, &page.cursor).await;

        let fetched = page.data.len();
        let report = self.store.upsert_many(page.data).await;

        tracing::info!(
            user_id,
            fetched,
            stored = report.stored,
            rejected = report.rejected,
            "Notifications page stored"
        );
        Ok(PageOutcome::fetched(fetched, report))
    }

    /// Forget pagination state (logout)
    pub async fn reset(&self) {
        self.cursors.clear().await;
    }
}
