//! feed-replica - a local, observable replica of a remote social feed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Replica (facade)                         │
//! │  - refresh / load more / publish / clear                    │
//! │  - observer subscriptions                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Feed merge (explore + personal feed)                     │
//! │  - Notification and comment pagination                      │
//! │  - Optimistic publishing and reconciliation                 │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                           │
//! ┌───────────────────────────────┐ ┌───────────────────────────┐
//! │          Data Layer            │ │       Remote (trait)       │
//! │  - Flat entity tables          │ │  - Paged fetches           │
//! │  - Batched upserts/deletes     │ │  - Uploads, relayer        │
//! │  - Collection/element observers│ │  - Lookup by tx hash       │
//! └───────────────────────────────┘ └───────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `data`: Entity models, the entity store and its observers
//! - `remote`: The remote feed API boundary
//! - `service`: Pagination and publishing
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus metrics
//! - `telemetry`: Tracing subscriber setup

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod remote;
pub mod service;
pub mod telemetry;

use std::sync::Arc;

use data::{
    CollectionObserver, CollectionScope, ElementObserver, Entity, EntityKind, EntityStore,
    Media, Notification, Profile, Publication,
};
use error::ReplicaError;
use remote::RemoteFeed;
use service::{
    CommentService, FeedService, MediaUpload, NewPublication, NotificationService, PageOutcome,
    PublishReceipt, PublishService,
};

/// Client-side replica shared across the UI
///
/// Owns the entity store and the services that fill it. Cheap to share
/// behind an `Arc`; every method takes `&self`.
pub struct Replica {
    /// Replica configuration
    pub config: Arc<config::ReplicaConfig>,

    /// Entity store (volatile, emptied on logout)
    store: Arc<EntityStore>,

    feed: FeedService,
    notifications: NotificationService,
    comments: CommentService,
    publish: PublishService,
}

impl Replica {
    /// Build a replica on top of a remote feed API
    ///
    /// # Errors
    /// Returns `Config` if the configuration is invalid
    pub fn new(
        config: config::ReplicaConfig,
        remote: Arc<dyn RemoteFeed>,
    ) -> Result<Self, ReplicaError> {
        config.validate()?;
        metrics::init_metrics();

        let store = Arc::new(EntityStore::new());
        let feed = FeedService::new(store.clone(), remote.clone(), config.feed.clone());
        let notifications =
            NotificationService::new(store.clone(), remote.clone(), config.notifications.clone());
        let comments = CommentService::new(store.clone(), remote.clone(), config.comments.clone());
        let publish = PublishService::new(
            store.clone(),
            remote,
            config.publish.clone(),
            config.reconciliation.clone(),
        );

        tracing::info!(
            page_size = config.feed.page_size,
            max_attempts = config.reconciliation.max_attempts,
            "Replica initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            feed,
            notifications,
            comments,
            publish,
        })
    }

    /// Underlying entity store
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    // =========================================================================
    // Feed
    // =========================================================================

    /// Reset the feed cursors and fetch the first pages
    pub async fn refresh_feed(&self, user_id: Option<&str>) -> Result<PageOutcome, ReplicaError> {
        self.feed.refresh(user_id).await
    }

    /// Fetch the next feed pages
    pub async fn load_more(&self, user_id: Option<&str>) -> Result<PageOutcome, ReplicaError> {
        self.feed.load_more(user_id).await
    }

    /// Publications flagged for the feed, newest first
    pub async fn publications_for_feed(&self) -> Vec<Publication> {
        self.store.publications_for_feed().await
    }

    // =========================================================================
    // Notifications and comments
    // =========================================================================

    pub async fn refresh_notifications(&self, user_id: &str) -> Result<PageOutcome, ReplicaError> {
        self.notifications.refresh(user_id).await
    }

    pub async fn load_more_notifications(
        &self,
        user_id: &str,
    ) -> Result<PageOutcome, ReplicaError> {
        self.notifications.load_more(user_id).await
    }

    pub async fn refresh_comments(&self, parent_id: &str) -> Result<PageOutcome, ReplicaError> {
        self.comments.refresh(parent_id).await
    }

    pub async fn load_more_comments(&self, parent_id: &str) -> Result<PageOutcome, ReplicaError> {
        self.comments.load_more(parent_id).await
    }

    // =========================================================================
    // Reads and subscriptions
    // =========================================================================

    /// Look up any entity by kind and id
    pub async fn get(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        self.store.get_entity(kind, id).await
    }

    pub async fn publication(&self, id: &str) -> Option<Publication> {
        self.store.get(id).await
    }

    pub async fn profile(&self, id: &str) -> Option<Profile> {
        self.store.get(id).await
    }

    pub async fn notification(&self, id: &str) -> Option<Notification> {
        self.store.get(id).await
    }

    pub async fn media(&self, url: &str) -> Option<Media> {
        self.store.get(url).await
    }

    /// Observe a collection; the first event is the current snapshot
    pub async fn subscribe_collection(&self, scope: CollectionScope) -> CollectionObserver {
        self.store.subscribe_collection(scope).await
    }

    /// Observe one entity
    pub async fn subscribe_element(&self, kind: EntityKind, id: &str) -> ElementObserver {
        self.store.subscribe_element(kind, id).await
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Publish a post or comment with an optimistic placeholder
    ///
    /// See [`PublishService::create_publication`].
    pub async fn create_publication(
        &self,
        kind: NewPublication,
        text: &str,
        author: Profile,
        media: Vec<MediaUpload>,
    ) -> Result<PublishReceipt, ReplicaError> {
        self.publish
            .create_publication(kind, text, author, media)
            .await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Drop every cached record and all pagination state (logout)
    ///
    /// Observers receive deletions for everything they were showing.
    /// Reconciliation loops still running find their placeholder gone and
    /// stop without inserting anything.
    pub async fn clear_cache(&self) {
        self.feed.reset().await;
        self.notifications.reset().await;
        self.comments.reset().await;
        self.store.clear().await;
    }
}
