//! Common test utilities for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use feed_replica::data::{
    CollectionEvent, CollectionObserver, Cursor, Entity, PaginatedResult, Profile,
    RemoteNotification, RemoteNotificationEvent, RemotePublication, RemotePublicationKind,
};
use feed_replica::error::RemoteError;
use feed_replica::remote::{
    CommentsRequest, ContentUri, ExploreRequest, FeedRequest, NotificationsRequest, RelayerResult,
    RemoteFeed,
};

type Pages<T> = Mutex<HashMap<Option<String>, PaginatedResult<T>>>;

/// Call counters per remote operation
#[derive(Debug, Default)]
pub struct Calls {
    pub explore: AtomicUsize,
    pub feed: AtomicUsize,
    pub notifications: AtomicUsize,
    pub comments: AtomicUsize,
    pub lookups: AtomicUsize,
    pub uploads: AtomicUsize,
    pub submits: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Scripted in-memory remote
///
/// Pages are keyed by the cursor token they answer; an unscripted token
/// gets an empty last page.
#[derive(Default)]
pub struct FakeRemote {
    pub calls: Calls,
    explore: Pages<RemotePublication>,
    feed: Pages<RemotePublication>,
    notifications: Pages<RemoteNotification>,
    comments: Mutex<HashMap<(String, Option<String>), PaginatedResult<RemotePublication>>>,
    lookups: Mutex<VecDeque<Result<Option<RemotePublication>, RemoteError>>>,
    lookup_times: Mutex<Vec<tokio::time::Instant>>,
    fail_feed: AtomicBool,
    fail_media_upload: AtomicBool,
    next_hash: Mutex<String>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        *remote.next_hash.lock().unwrap() = "0xhash".to_string();
        remote
    }

    pub fn explore_page(&self, cursor: Option<&str>, items: Vec<RemotePublication>, next: Option<&str>) {
        self.explore
            .lock()
            .unwrap()
            .insert(cursor.map(str::to_string), page(items, next));
    }

    pub fn feed_page(&self, cursor: Option<&str>, items: Vec<RemotePublication>, next: Option<&str>) {
        self.feed
            .lock()
            .unwrap()
            .insert(cursor.map(str::to_string), page(items, next));
    }

    pub fn notifications_page(
        &self,
        cursor: Option<&str>,
        items: Vec<RemoteNotification>,
        next: Option<&str>,
    ) {
        self.notifications
            .lock()
            .unwrap()
            .insert(cursor.map(str::to_string), page(items, next));
    }

    pub fn comments_page(
        &self,
        parent_id: &str,
        cursor: Option<&str>,
        items: Vec<RemotePublication>,
        next: Option<&str>,
    ) {
        self.comments.lock().unwrap().insert(
            (parent_id.to_string(), cursor.map(str::to_string)),
            page(items, next),
        );
    }

    /// Queue answers for successive lookups by hash; once drained the
    /// publication is reported as not indexed
    pub fn script_lookups(
        &self,
        answers: impl IntoIterator<Item = Result<Option<RemotePublication>, RemoteError>>,
    ) {
        self.lookups.lock().unwrap().extend(answers);
    }

    pub fn lookup_times(&self) -> Vec<tokio::time::Instant> {
        self.lookup_times.lock().unwrap().clone()
    }

    pub fn fail_feed(&self, fail: bool) {
        self.fail_feed.store(fail, Ordering::SeqCst);
    }

    pub fn fail_media_upload(&self, fail: bool) {
        self.fail_media_upload.store(fail, Ordering::SeqCst);
    }

    pub fn set_next_hash(&self, hash: &str) {
        *self.next_hash.lock().unwrap() = hash.to_string();
    }

    fn relayed(&self) -> RelayerResult {
        self.calls.submits.fetch_add(1, Ordering::SeqCst);
        RelayerResult {
            tx_hash: self.next_hash.lock().unwrap().clone(),
            tx_id: Some("relay-1".to_string()),
        }
    }
}

fn page<T>(items: Vec<T>, next: Option<&str>) -> PaginatedResult<T> {
    PaginatedResult::new(items, Cursor::from_page(None, next.map(str::to_string)))
}

fn answer<T: Clone>(pages: &Pages<T>, cursor: &Option<String>) -> PaginatedResult<T> {
    pages
        .lock()
        .unwrap()
        .get(cursor)
        .cloned()
        .unwrap_or_else(|| page(Vec::new(), None))
}

#[async_trait]
impl RemoteFeed for FakeRemote {
    async fn fetch_explore(
        &self,
        request: ExploreRequest,
    ) -> Result<PaginatedResult<RemotePublication>, RemoteError> {
        self.calls.explore.fetch_add(1, Ordering::SeqCst);
        Ok(answer(&self.explore, &request.cursor))
    }

    async fn fetch_feed(
        &self,
        request: FeedRequest,
    ) -> Result<PaginatedResult<RemotePublication>, RemoteError> {
        self.calls.feed.fetch_add(1, Ordering::SeqCst);
        if self.fail_feed.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        Ok(answer(&self.feed, &request.cursor))
    }

    async fn fetch_notifications(
        &self,
        request: NotificationsRequest,
    ) -> Result<PaginatedResult<RemoteNotification>, RemoteError> {
        self.calls.notifications.fetch_add(1, Ordering::SeqCst);
        Ok(answer(&self.notifications, &request.cursor))
    }

    async fn fetch_comments(
        &self,
        request: CommentsRequest,
    ) -> Result<PaginatedResult<RemotePublication>, RemoteError> {
        self.calls.comments.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .comments
            .lock()
            .unwrap()
            .get(&(request.parent_id, request.cursor))
            .cloned()
            .unwrap_or_else(|| page(Vec::new(), None)))
    }

    async fn fetch_publication_by_hash(
        &self,
        _tx_hash: String,
    ) -> Result<Option<RemotePublication>, RemoteError> {
        self.calls.lookups.fetch_add(1, Ordering::SeqCst);
        self.lookup_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        self.lookups.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn upload_media(
        &self,
        _bytes: Vec<u8>,
        _mime_type: String,
    ) -> Result<ContentUri, RemoteError> {
        let n = self.calls.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_media_upload.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("upload timed out".to_string()));
        }
        Ok(ContentUri(format!("ipfs://media-{n}")))
    }

    async fn upload_metadata(
        &self,
        _metadata: serde_json::Value,
    ) -> Result<ContentUri, RemoteError> {
        self.calls.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(ContentUri("ipfs://metadata".to_string()))
    }

    async fn submit_post(
        &self,
        _profile_id: String,
        _content_uri: ContentUri,
    ) -> Result<RelayerResult, RemoteError> {
        Ok(self.relayed())
    }

    async fn submit_comment(
        &self,
        _profile_id: String,
        _parent_id: String,
        _content_uri: ContentUri,
    ) -> Result<RelayerResult, RemoteError> {
        Ok(self.relayed())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Fixed reference time; `minute(n)` is n minutes after it
pub fn minute(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(n)
}

pub fn profile(id: &str) -> Profile {
    Profile {
        id: id.to_string(),
        handle: format!("{id}.lens"),
        name: None,
        owned_by: "0xowner".to_string(),
        picture_url: None,
        cover_url: None,
        bio: None,
        followers: 0,
        following: 0,
        attributes: Default::default(),
        is_default: true,
    }
}

pub fn post(id: &str, at: i64) -> RemotePublication {
    RemotePublication {
        id: id.to_string(),
        kind: RemotePublicationKind::Post,
        created_at: minute(at),
        content: format!("post {id}"),
        profile: profile("0x01"),
        media: Vec::new(),
        stats: Default::default(),
        reactions: Default::default(),
    }
}

pub fn comment(id: &str, at: i64, parent: RemotePublication) -> RemotePublication {
    RemotePublication {
        kind: RemotePublicationKind::Comment {
            of: Some(Box::new(parent)),
        },
        ..post(id, at)
    }
}

pub fn followed(id: &str, at: i64, by: &str) -> RemoteNotification {
    RemoteNotification {
        id: id.to_string(),
        event: RemoteNotificationEvent::Followed,
        created_at: minute(at),
        profile: profile(by),
    }
}

// =============================================================================
// Observer replay
// =============================================================================

/// Rebuilds a collection from its observer events alone
#[derive(Debug, Default)]
pub struct Mirror {
    pub entries: HashMap<String, Entity>,
}

impl Mirror {
    pub fn apply(&mut self, event: CollectionEvent) {
        match event {
            CollectionEvent::Initial(entities) => {
                self.entries = entities
                    .into_iter()
                    .map(|entity| (entity.id().to_string(), entity))
                    .collect();
            }
            CollectionEvent::Delete(ids) => {
                for id in ids {
                    self.entries.remove(&id);
                }
            }
            CollectionEvent::Update(entities) => {
                for entity in entities {
                    self.entries.insert(entity.id().to_string(), entity);
                }
            }
        }
    }

    /// Apply every event already delivered
    pub fn drain(&mut self, observer: &mut CollectionObserver) -> usize {
        let mut applied = 0;
        while let Some(event) = observer.try_next() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    pub fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}
