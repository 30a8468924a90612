//! Feed service
//!
//! Merges the explore source and the personal feed source into the single
//! feed view. Both sources are paged independently; the store removes
//! duplicates by id and the view is ordered on read.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::{PageOutcome, fetch_failed, record_fetch};
use crate::config::FeedConfig;
use crate::data::{Cursor, EntityStore, UpsertOptions};
use crate::error::ReplicaError;
use crate::remote::{ExploreRequest, FeedRequest, RemoteFeed};

/// Cursor pair for the merged feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedCursors {
    pub explore: Cursor,
    pub feed: Cursor,
}

/// Feed pagination service
pub struct FeedService {
    store: Arc<EntityStore>,
    remote: Arc<dyn RemoteFeed>,
    config: FeedConfig,
    cursors: Mutex<FeedCursors>,
}

impl FeedService {
    /// Create new feed service
    pub fn new(store: Arc<EntityStore>, remote: Arc<dyn RemoteFeed>, config: FeedConfig) -> Self {
        Self {
            store,
            remote,
            config,
            cursors: Mutex::new(FeedCursors::default()),
        }
    }

    /// Start both sources over and fetch their first pages
    pub async fn refresh(&self, user_id: Option<&str>) -> Result<PageOutcome, ReplicaError> {
        *self.cursors.lock().await = FeedCursors::default();
        tracing::debug!(user_id, "Feed cursors reset");
        self.load_more(user_id).await
    }

    /// Fetch the next page of every source that is not exhausted
    ///
    /// With a signed-in user the explore and feed sources are fetched
    /// concurrently and upserted feed-first; without one only explore is
    /// used. When every eligible source is exhausted nothing is requested.
    ///
    /// # Errors
    /// Returns `RemoteFetch` if any fetched source fails. Nothing is stored
    /// and no cursor moves in that case.
    pub async fn load_more(&self, user_id: Option<&str>) -> Result<PageOutcome, ReplicaError> {
        let cursors = self.cursors.lock().await.clone();

        let explore_cursor = (!cursors.explore.is_exhausted()).then_some(&cursors.explore);
        let feed_request = user_id
            .filter(|_| !cursors.feed.is_exhausted())
            .map(|user_id| FeedRequest {
                count: self.config.page_size,
                cursor: cursors.feed.next_token(),
                user_id: user_id.to_string(),
            });

        if explore_cursor.is_none() && feed_request.is_none() {
            tracing::debug!(user_id, "Feed sources exhausted; skipping fetch");
            return Ok(PageOutcome::Exhausted);
        }

        let explore_request = explore_cursor.map(|cursor| ExploreRequest {
            count: self.config.page_size,
            cursor: cursor.next_token(),
            sort: self.config.explore_sort.clone(),
            kinds: self.config.publication_kinds.clone(),
            user_id: user_id.map(str::to_string),
        });

        let explore = async {
            match explore_request {
                Some(request) => {
                    let result = self.remote.fetch_explore(request).await;
                    record_fetch("explore", &result);
                    Some(result)
                }
                None => None,
            }
        };
        let feed = async {
            match feed_request {
                Some(request) => {
                    let result = self.remote.fetch_feed(request).await;
                    record_fetch("feed", &result);
                    Some(result)
                }
                None => None,
            }
        };
        let (explore, feed) = tokio::join!(explore, feed);

        let explore = explore
            .transpose()
            .map_err(|error| fetch_failed("explore", error))?;
        let feed = feed
            .transpose()
            .map_err(|error| fetch_failed("feed", error))?;

        {
            let mut cursors = self.cursors.lock().await;
            if let Some(page) = &explore {
                cursors.explore.advance(&page.cursor);
            }
            if let Some(page) = &feed {
                cursors.feed.advance(&page.cursor);
            }
        }

        let items: Vec<_> = feed
            .into_iter()
            .chain(explore)
            .flat_map(|page| page.data)
            .collect();
        let fetched = items.len();

        let report = self
            .store
            .upsert_many_with(
                items,
                UpsertOptions {
                    shows_in_feed: true,
                },
            )
            .await;

        tracing::info!(
            user_id,
            fetched,
            stored = report.stored,
            rejected = report.rejected,
            "Feed page merged"
        );

        Ok(PageOutcome::fetched(fetched, report))
    }

    /// Current cursor pair
    pub async fn cursors(&self) -> FeedCursors {
        self.cursors.lock().await.clone()
    }

    /// Forget pagination state (logout)
    pub async fn reset(&self) {
        *self.cursors.lock().await = FeedCursors::default();
    }
}
