//! Change notification
//!
//! Observers are registered with the entity store and fed from inside its
//! write lock, so every subscriber sees the same batches in the same order.
//! Each subscriber owns an unbounded queue; sending never blocks the store.
//!
//! A collection observer remembers the ids it last reported for its scope.
//! After each batch it reports the ids that left the scope (`Delete`) and
//! then the entries that joined it or changed (`Update`). Replaying
//! `Initial`, `Delete` and `Update` in order rebuilds the scope exactly.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::models::{Entity, EntityKind};
use super::store::{Tables, newest_first};

// =============================================================================
// Scopes and events
// =============================================================================

/// What a collection observer watches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionScope {
    /// Publications shown in the feed, newest first
    Feed,
    /// Comments under one publication, oldest first
    Comments { parent_id: String },
    /// Notifications, newest first
    Notifications,
}

impl CollectionScope {
    /// Entity kind this scope is made of
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Feed | Self::Comments { .. } => EntityKind::Publication,
            Self::Notifications => EntityKind::Notification,
        }
    }

    /// Current members of the scope, in scope order
    pub(crate) fn select(&self, tables: &Tables) -> Vec<Entity> {
        match self {
            Self::Feed => {
                let mut publications: Vec<_> = tables
                    .iter(EntityKind::Publication)
                    .filter_map(Entity::as_publication)
                    .filter(|publication| publication.shows_in_feed)
                    .collect();
                publications.sort_by(|a, b| {
                    newest_first((&a.created_at, &a.id), (&b.created_at, &b.id))
                });
                publications
                    .into_iter()
                    .cloned()
                    .map(Entity::Publication)
                    .collect()
            }
            Self::Comments { parent_id } => {
                let mut comments: Vec<_> = tables
                    .iter(EntityKind::Publication)
                    .filter_map(Entity::as_publication)
                    .filter(|publication| publication.parent_id() == Some(parent_id.as_str()))
                    .collect();
                comments.sort_by(|a, b| {
                    newest_first((&b.created_at, &b.id), (&a.created_at, &a.id))
                });
                comments
                    .into_iter()
                    .cloned()
                    .map(Entity::Publication)
                    .collect()
            }
            Self::Notifications => {
                let mut notifications: Vec<_> = tables
                    .iter(EntityKind::Notification)
                    .filter_map(Entity::as_notification)
                    .collect();
                notifications.sort_by(|a, b| {
                    newest_first((&a.created_at, &a.id), (&b.created_at, &b.id))
                });
                notifications
                    .into_iter()
                    .cloned()
                    .map(Entity::Notification)
                    .collect()
            }
        }
    }
}

/// Event delivered to a collection observer
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent {
    /// Snapshot of the scope at subscription time
    Initial(Vec<Entity>),
    /// Ids that left the scope
    Delete(Vec<String>),
    /// Entries that joined the scope or changed, in scope order
    Update(Vec<Entity>),
}

/// Event delivered to an element observer
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    Update(Entity),
}

// =============================================================================
// Subscriber handles
// =============================================================================

/// Subscriber side of a collection subscription
///
/// Dropping it ends the subscription; the store forgets the registration
/// on its next mutation.
#[derive(Debug)]
pub struct CollectionObserver {
    scope: CollectionScope,
    events: mpsc::UnboundedReceiver<CollectionEvent>,
}

impl CollectionObserver {
    pub fn scope(&self) -> &CollectionScope {
        &self.scope
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<CollectionEvent> {
        self.events.recv().await
    }

    /// Next event if one is already queued
    pub fn try_next(&mut self) -> Option<CollectionEvent> {
        self.events.try_recv().ok()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<CollectionEvent> {
        UnboundedReceiverStream::new(self.events)
    }
}

/// Subscriber side of a single-entity subscription
#[derive(Debug)]
pub struct ElementObserver {
    kind: EntityKind,
    id: String,
    events: mpsc::UnboundedReceiver<ElementEvent>,
}

impl ElementObserver {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<ElementEvent> {
        self.events.recv().await
    }

    /// Next event if one is already queued
    pub fn try_next(&mut self) -> Option<ElementEvent> {
        self.events.try_recv().ok()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<ElementEvent> {
        UnboundedReceiverStream::new(self.events)
    }
}

// =============================================================================
// Registry (store side)
// =============================================================================

/// Keys touched by one mutation batch
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    keys: HashSet<(EntityKind, String)>,
}

impl ChangeSet {
    pub(crate) fn insert(&mut self, kind: EntityKind, id: String) {
        self.keys.insert((kind, id));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.keys.contains(&(kind, id.to_string()))
    }

    fn touches(&self, kind: EntityKind) -> bool {
        self.keys.iter().any(|(touched, _)| *touched == kind)
    }
}

#[derive(Debug)]
struct CollectionRegistration {
    scope: CollectionScope,
    /// Ids last reported to the subscriber, in scope order
    reported: Vec<String>,
    sender: mpsc::UnboundedSender<CollectionEvent>,
}

impl CollectionRegistration {
    /// Diff the scope against what was last reported and emit the delta.
    ///
    /// Returns false once the subscriber is gone.
    fn dispatch(&mut self, tables: &Tables, changes: &ChangeSet) -> bool {
        let kind = self.scope.kind();
        if !changes.touches(kind) {
            return !self.sender.is_closed();
        }

        let current = self.scope.select(tables);
        let current_ids: HashSet<&str> = current.iter().map(Entity::id).collect();
        let previous_ids: HashSet<&str> = self.reported.iter().map(String::as_str).collect();

        let removed: Vec<String> = self
            .reported
            .iter()
            .filter(|id| !current_ids.contains(id.as_str()))
            .cloned()
            .collect();
        let updated: Vec<Entity> = current
            .iter()
            .filter(|entity| {
                !previous_ids.contains(entity.id()) || changes.contains(kind, entity.id())
            })
            .cloned()
            .collect();

        if removed.is_empty() && updated.is_empty() {
            return !self.sender.is_closed();
        }

        let next_reported = current.iter().map(|entity| entity.id().to_string()).collect();
        let delivered = self.sender.send(CollectionEvent::Delete(removed)).is_ok()
            && self.sender.send(CollectionEvent::Update(updated)).is_ok();
        self.reported = next_reported;
        delivered
    }
}

#[derive(Debug)]
struct ElementRegistration {
    kind: EntityKind,
    id: String,
    sender: mpsc::UnboundedSender<ElementEvent>,
}

impl ElementRegistration {
    fn dispatch(&self, tables: &Tables, changes: &ChangeSet) -> bool {
        if !changes.contains(self.kind, &self.id) {
            return !self.sender.is_closed();
        }
        match tables.get(self.kind, &self.id) {
            Some(entity) => self.sender.send(ElementEvent::Update(entity.clone())).is_ok(),
            None => !self.sender.is_closed(),
        }
    }
}

/// Every live observer registration; owned by the store
#[derive(Debug, Default)]
pub(crate) struct ObserverRegistry {
    collections: Vec<CollectionRegistration>,
    elements: Vec<ElementRegistration>,
}

impl ObserverRegistry {
    pub(crate) fn register_collection(
        &mut self,
        scope: CollectionScope,
        tables: &Tables,
    ) -> CollectionObserver {
        let (sender, events) = mpsc::unbounded_channel();
        let snapshot = scope.select(tables);
        let reported = snapshot
            .iter()
            .map(|entity| entity.id().to_string())
            .collect();
        // The receiver is alive here, the send cannot fail
        let _ = sender.send(CollectionEvent::Initial(snapshot));

        tracing::debug!(?scope, "Collection observer registered");
        self.collections.push(CollectionRegistration {
            scope: scope.clone(),
            reported,
            sender,
        });
        self.prune();

        CollectionObserver { scope, events }
    }

    pub(crate) fn register_element(
        &mut self,
        kind: EntityKind,
        id: &str,
        tables: &Tables,
    ) -> ElementObserver {
        let (sender, events) = mpsc::unbounded_channel();
        if let Some(entity) = tables.get(kind, id) {
            let _ = sender.send(ElementEvent::Update(entity.clone()));
        }

        tracing::debug!(kind = kind.as_str(), id, "Element observer registered");
        self.elements.push(ElementRegistration {
            kind,
            id: id.to_string(),
            sender,
        });
        self.prune();

        ElementObserver {
            kind,
            id: id.to_string(),
            events,
        }
    }

    /// Push one batch to every observer, dropping the ones that are gone
    pub(crate) fn dispatch(&mut self, tables: &Tables, changes: &ChangeSet) {
        self.collections
            .retain_mut(|registration| registration.dispatch(tables, changes));
        self.elements
            .retain(|registration| registration.dispatch(tables, changes));
        self.record_active();
    }

    /// Forget registrations whose subscriber handle was dropped
    pub(crate) fn prune(&mut self) {
        let before = self.len();
        self.collections
            .retain(|registration| !registration.sender.is_closed());
        self.elements
            .retain(|registration| !registration.sender.is_closed());

        let removed = before - self.len();
        if removed > 0 {
            tracing::debug!(removed, "Pruned dropped observers");
        }
        self.record_active();
    }

    pub(crate) fn len(&self) -> usize {
        self.collections.len() + self.elements.len()
    }

    fn record_active(&self) {
        use crate::metrics::OBSERVERS_ACTIVE;

        OBSERVERS_ACTIVE
            .with_label_values(&["collection"])
            .set(self.collections.len() as i64);
        OBSERVERS_ACTIVE
            .with_label_values(&["element"])
            .set(self.elements.len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        EntityStore, Profile, Publication, PublicationKind, RemotePublication,
        RemotePublicationKind, UpsertOptions,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn profile(id: &str) -> Profile {
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
            is_default: false,
        }
    }

    fn post(id: &str, minutes: i64) -> RemotePublication {
        RemotePublication {
            id: id.to_string(),
            kind: RemotePublicationKind::Post,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
            content: id.to_string(),
            profile: profile("0x01"),
            media: Vec::new(),
            stats: Default::default(),
            reactions: Default::default(),
        }
    }

    fn in_feed() -> UpsertOptions {
        UpsertOptions {
            shows_in_feed: true,
        }
    }

    fn ids(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(Entity::id).collect()
    }

    #[tokio::test]
    async fn collection_starts_with_initial_snapshot() {
        let store = EntityStore::new();
        store
            .upsert_many_with(vec![post("a", 0), post("b", 1)], in_feed())
            .await;

        let mut observer = store.subscribe_collection(CollectionScope::Feed).await;
        match observer.try_next() {
            Some(CollectionEvent::Initial(entries)) => assert_eq!(ids(&entries), vec!["b", "a"]),
            other => panic!("expected initial snapshot, got {other:?}"),
        }
        assert!(observer.try_next().is_none());
    }

    #[tokio::test]
    async fn batch_emits_delete_then_update() {
        let store = EntityStore::new();
        store
            .upsert_many_with(vec![post("a", 0), post("b", 1)], in_feed())
            .await;
        let mut observer = store.subscribe_collection(CollectionScope::Feed).await;
        observer.try_next();

        store.delete_many::<Publication>(&["a".to_string()]).await;
        assert_eq!(
            observer.try_next(),
            Some(CollectionEvent::Delete(vec!["a".to_string()]))
        );
        assert_eq!(observer.try_next(), Some(CollectionEvent::Update(Vec::new())));

        let mut edited = post("b", 1);
        edited.content = "edited".to_string();
        store
            .upsert_many_with(vec![edited, post("c", 2)], in_feed())
            .await;
        assert_eq!(observer.try_next(), Some(CollectionEvent::Delete(Vec::new())));
        match observer.try_next() {
            Some(CollectionEvent::Update(entries)) => assert_eq!(ids(&entries), vec!["c", "b"]),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unchanged_records_emit_nothing() {
        let store = EntityStore::new();
        store.upsert_many_with(vec![post("a", 0)], in_feed()).await;
        let mut observer = store.subscribe_collection(CollectionScope::Feed).await;
        observer.try_next();

        store.upsert_many_with(vec![post("a", 0)], in_feed()).await;
        assert!(observer.try_next().is_none());
    }

    #[tokio::test]
    async fn other_scopes_are_not_notified() {
        let store = EntityStore::new();
        let mut notifications = store
            .subscribe_collection(CollectionScope::Notifications)
            .await;
        let mut comments = store
            .subscribe_collection(CollectionScope::Comments {
                parent_id: "p".to_string(),
            })
            .await;
        notifications.try_next();
        comments.try_next();

        store.upsert_many_with(vec![post("a", 0)], in_feed()).await;
        assert!(notifications.try_next().is_none());
        assert!(comments.try_next().is_none());
    }

    #[tokio::test]
    async fn comments_scope_is_oldest_first() {
        let store = EntityStore::new();
        let comment = |id: &str, minutes| {
            let mut publication = post(id, minutes);
            publication.kind = RemotePublicationKind::Comment {
                of: Some(Box::new(post("p", 0))),
            };
            publication
        };
        store
            .upsert_many(vec![comment("late", 9), comment("early", 1)])
            .await;

        let mut observer = store
            .subscribe_collection(CollectionScope::Comments {
                parent_id: "p".to_string(),
            })
            .await;
        match observer.try_next() {
            Some(CollectionEvent::Initial(entries)) => {
                assert_eq!(ids(&entries), vec!["early", "late"])
            }
            other => panic!("expected initial snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn element_observer_follows_one_record() {
        let store = EntityStore::new();
        let mut missing = store.subscribe_element(EntityKind::Publication, "a").await;
        assert!(missing.try_next().is_none());

        store.upsert_many(vec![post("a", 0), post("b", 1)]).await;
        match missing.try_next() {
            Some(ElementEvent::Update(entity)) => assert_eq!(entity.id(), "a"),
            other => panic!("expected update, got {other:?}"),
        }
        assert!(missing.try_next().is_none());

        // Deletion is silent
        store.delete_many::<Publication>(&["a".to_string()]).await;
        assert!(missing.try_next().is_none());
    }

    #[tokio::test]
    async fn dropped_observers_are_pruned() {
        let store = EntityStore::new();
        let first = store.subscribe_collection(CollectionScope::Feed).await;
        let _second = store.subscribe_collection(CollectionScope::Feed).await;
        let element = store.subscribe_element(EntityKind::Profile, "0x01").await;
        assert_eq!(store.observer_count().await, 3);

        drop(first);
        drop(element);
        store.upsert_many_with(vec![post("a", 0)], in_feed()).await;
        assert_eq!(store.observer_count().await, 1);
    }

    #[tokio::test]
    async fn placeholder_swap_is_a_single_update() {
        let store = EntityStore::new();
        store.upsert_many(vec![profile("0x01")]).await;
        store
            .upsert_many(vec![Publication {
                id: "0xhash".to_string(),
                kind: PublicationKind::Post,
                created_at: Utc::now(),
                content: "hello".to_string(),
                profile_id: "0x01".to_string(),
                media: Vec::new(),
                stats: Default::default(),
                reactions: Default::default(),
                shows_in_feed: true,
                is_indexing: true,
            }])
            .await;
        let mut observer = store.subscribe_collection(CollectionScope::Feed).await;
        observer.try_next();

        store
            .replace_publication("0xhash", post("indexed", 0))
            .await
            .unwrap();

        assert_eq!(observer.try_next(), Some(CollectionEvent::Delete(Vec::new())));
        match observer.try_next() {
            Some(CollectionEvent::Update(entries)) => {
                assert_eq!(ids(&entries), vec!["0xhash"]);
                let publication = entries[0].as_publication().unwrap();
                assert!(!publication.is_indexing);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clear_reports_every_member_removed() {
        let store = EntityStore::new();
        store
            .upsert_many_with(vec![post("a", 0), post("b", 1)], in_feed())
            .await;
        let mut observer = store.subscribe_collection(CollectionScope::Feed).await;
        observer.try_next();

        store.clear().await;
        assert_eq!(
            observer.try_next(),
            Some(CollectionEvent::Delete(vec!["b".to_string(), "a".to_string()]))
        );
        assert_eq!(observer.try_next(), Some(CollectionEvent::Update(Vec::new())));
    }
}
