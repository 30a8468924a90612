//! Service layer
//!
//! Orchestrates the remote feed API and the entity store: pagination of
//! the merged feed, notifications and comment threads, and publishing with
//! optimistic placeholders.

mod comments;
mod cursors;
mod feed;
mod notification;
mod publish;

pub use comments::CommentService;
pub use feed::{FeedCursors, FeedService};
pub use notification::NotificationService;
pub use publish::{
    MediaUpload, NewPublication, PublishReceipt, PublishService, ReconciliationOutcome,
};

use crate::data::UpsertReport;
use crate::error::{RemoteError, ReplicaError};

/// Result of one pagination pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Pages were fetched and upserted
    Fetched {
        /// Records received from the remote
        fetched: usize,
        /// Records accepted by the store
        stored: usize,
        /// Records dropped for violating an invariant
        rejected: usize,
    },
    /// Every eligible source was exhausted; nothing was requested
    Exhausted,
}

impl PageOutcome {
    fn fetched(fetched: usize, report: UpsertReport) -> Self {
        Self::Fetched {
            fetched,
            stored: report.stored,
            rejected: report.rejected,
        }
    }
}

/// Count a paginated fetch by source and outcome
fn record_fetch<T>(source: &'static str, result: &Result<T, RemoteError>) {
    use crate::metrics::REMOTE_FETCHES_TOTAL;

    let outcome = if result.is_ok() { "ok" } else { "error" };
    REMOTE_FETCHES_TOTAL
        .with_label_values(&[source, outcome])
        .inc();
}

fn fetch_failed(source: &'static str, error: RemoteError) -> ReplicaError {
    tracing::warn!(source, %error, "Remote fetch failed");
    ReplicaError::RemoteFetch(format!("{source}: {error}")).recorded()
}
