//! Entity store
//!
//! Flat, keyed, in-memory tables for publications, profiles, notifications
//! and media. Every mutation runs under one write lock, applies as a single
//! batch, and is diffed into the registered observers before the lock is
//! released. Nothing here performs I/O.
//!
//! Records reference each other by id only. Upserting a remote record
//! flattens its embedded relations into their own tables first, so every
//! relation target is resolvable once the owning record is stored.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use super::models::{
    Entity, EntityKind, Media, Notification, NotificationEvent, Profile, Publication,
    PublicationKind, RemoteNotification, RemoteNotificationEvent, RemotePublication,
    RemotePublicationKind,
};
use super::observe::{
    ChangeSet, CollectionObserver, CollectionScope, ElementObserver, ObserverRegistry,
};
use crate::error::ReplicaError;

// =============================================================================
// Tables
// =============================================================================

/// Backing tables, one map per entity kind
#[derive(Debug, Default)]
pub(crate) struct Tables {
    rows: HashMap<EntityKind, HashMap<String, Entity>>,
}

impl Tables {
    pub(crate) fn get(&self, kind: EntityKind, id: &str) -> Option<&Entity> {
        self.rows.get(&kind).and_then(|table| table.get(id))
    }

    pub(crate) fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.get(kind, id).is_some()
    }

    pub(crate) fn iter(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.rows.get(&kind).into_iter().flat_map(|table| table.values())
    }

    fn len(&self, kind: EntityKind) -> usize {
        self.rows.get(&kind).map_or(0, HashMap::len)
    }

    fn insert(&mut self, entity: Entity) {
        self.rows
            .entry(entity.kind())
            .or_default()
            .insert(entity.id().to_string(), entity);
    }

    fn remove(&mut self, kind: EntityKind, id: &str) -> Option<Entity> {
        self.rows.get_mut(&kind).and_then(|table| table.remove(id))
    }

    fn drain_keys(&mut self) -> Vec<(EntityKind, String)> {
        self.rows
            .drain()
            .flat_map(|(kind, table)| table.into_keys().map(move |id| (kind, id)))
            .collect()
    }
}

/// Feed and notification order: newest first, id as tie-break
pub(crate) fn newest_first(
    a: (&chrono::DateTime<chrono::Utc>, &str),
    b: (&chrono::DateTime<chrono::Utc>, &str),
) -> Ordering {
    b.0.cmp(a.0).then_with(|| b.1.cmp(a.1))
}

// =============================================================================
// Typed access
// =============================================================================

/// A stored entity type that can be read back out of the store
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn from_entity(entity: &Entity) -> Option<&Self>;
}

impl Record for Publication {
    const KIND: EntityKind = EntityKind::Publication;

    fn from_entity(entity: &Entity) -> Option<&Self> {
        entity.as_publication()
    }
}

impl Record for Profile {
    const KIND: EntityKind = EntityKind::Profile;

    fn from_entity(entity: &Entity) -> Option<&Self> {
        entity.as_profile()
    }
}

impl Record for Notification {
    const KIND: EntityKind = EntityKind::Notification;

    fn from_entity(entity: &Entity) -> Option<&Self> {
        entity.as_notification()
    }
}

impl Record for Media {
    const KIND: EntityKind = EntityKind::Media;

    fn from_entity(entity: &Entity) -> Option<&Self> {
        entity.as_media()
    }
}

// =============================================================================
// Upsert staging
// =============================================================================

/// Per-call upsert options
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertOptions {
    /// Mark top-level publications as feed entries
    pub shows_in_feed: bool,
}

/// Outcome of one upsert call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Top-level items accepted
    pub stored: usize,
    /// Top-level items dropped for violating an invariant
    pub rejected: usize,
}

/// Records accepted so far in the current upsert call
///
/// Relation checks see both the committed tables and everything staged
/// earlier in the same call.
pub struct Staging<'a> {
    tables: &'a Tables,
    options: UpsertOptions,
    upserts: Vec<Entity>,
    staged: HashSet<(EntityKind, String)>,
}

impl<'a> Staging<'a> {
    fn new(tables: &'a Tables, options: UpsertOptions) -> Self {
        Self {
            tables,
            options,
            upserts: Vec::new(),
            staged: HashSet::new(),
        }
    }

    fn resolvable(&self, kind: EntityKind, id: &str) -> bool {
        self.staged.contains(&(kind, id.to_string())) || self.tables.contains(kind, id)
    }

    fn push(&mut self, entity: Entity) {
        self.staged.insert((entity.kind(), entity.id().to_string()));
        self.upserts.push(entity);
    }
}

/// Anything that can be upserted into the store
///
/// Implementations check every invariant before staging anything, so a
/// rejected item leaves no partial records behind.
pub trait Ingest {
    /// Table the item lands in, used to label rejections
    fn kind(&self) -> EntityKind;

    fn stage(self, staging: &mut Staging<'_>) -> Result<(), ReplicaError>;
}

fn require_id(kind: EntityKind, id: &str) -> Result<(), ReplicaError> {
    if id.trim().is_empty() {
        return Err(ReplicaError::Validation(format!(
            "{} without an id",
            kind.as_str()
        )));
    }
    Ok(())
}

pub(crate) fn validate_profile(profile: &Profile) -> Result<(), ReplicaError> {
    require_id(EntityKind::Profile, &profile.id)?;
    if profile.handle.trim().is_empty() {
        return Err(ReplicaError::Validation(format!(
            "profile {} has no handle",
            profile.id
        )));
    }
    Ok(())
}

fn validate_media(media: &Media) -> Result<(), ReplicaError> {
    url::Url::parse(&media.url).map_err(|e| {
        ReplicaError::Validation(format!("media url {:?} is not a URL ({})", media.url, e))
    })?;
    if media.mime_type.trim().is_empty() {
        return Err(ReplicaError::Validation(format!(
            "media {} has no mime type",
            media.url
        )));
    }
    Ok(())
}

impl Ingest for Profile {
    fn kind(&self) -> EntityKind {
        EntityKind::Profile
    }

    fn stage(self, staging: &mut Staging<'_>) -> Result<(), ReplicaError> {
        validate_profile(&self)?;
        staging.push(Entity::Profile(self));
        Ok(())
    }
}

impl Ingest for Media {
    fn kind(&self) -> EntityKind {
        EntityKind::Media
    }

    fn stage(self, staging: &mut Staging<'_>) -> Result<(), ReplicaError> {
        validate_media(&self)?;
        staging.push(Entity::Media(self));
        Ok(())
    }
}

impl RemotePublication {
    fn validate(&self) -> Result<(), ReplicaError> {
        require_id(EntityKind::Publication, &self.id)?;
        validate_profile(&self.profile)?;
        for media in &self.media {
            validate_media(media)?;
        }
        match &self.kind {
            RemotePublicationKind::Post => Ok(()),
            RemotePublicationKind::Comment { of: Some(parent) } => parent.validate(),
            RemotePublicationKind::Comment { of: None } => Err(ReplicaError::Validation(
                format!("comment {} has no parent publication", self.id),
            )),
            RemotePublicationKind::Mirror { by: Some(profile) } => validate_profile(profile),
            RemotePublicationKind::Mirror { by: None } => Err(ReplicaError::Validation(format!(
                "mirror {} has no mirroring profile",
                self.id
            ))),
        }
    }

    /// Stage this publication and its embedded relations, returning its id.
    ///
    /// Callers validate first.
    fn flatten(self, shows_in_feed: bool, staging: &mut Staging<'_>) -> Result<String, ReplicaError> {
        let RemotePublication {
            id,
            kind,
            created_at,
            content,
            profile,
            media,
            stats,
            reactions,
        } = self;

        let profile_id = profile.id.clone();
        staging.push(Entity::Profile(profile));

        let media_urls = media.iter().map(|item| item.url.clone()).collect();
        for item in media {
            staging.push(Entity::Media(item));
        }

        let kind = match kind {
            RemotePublicationKind::Post => PublicationKind::Post,
            RemotePublicationKind::Comment { of } => {
                let parent = of.ok_or_else(|| {
                    ReplicaError::Validation(format!("comment {id} has no parent publication"))
                })?;
                let parent_id = parent.flatten(false, staging)?;
                PublicationKind::Comment { parent_id }
            }
            RemotePublicationKind::Mirror { by } => {
                let by = by.ok_or_else(|| {
                    ReplicaError::Validation(format!("mirror {id} has no mirroring profile"))
                })?;
                let mirrored_by = by.id.clone();
                staging.push(Entity::Profile(by));
                PublicationKind::Mirror { mirrored_by }
            }
        };

        staging.push(Entity::Publication(Publication {
            id: id.clone(),
            kind,
            created_at,
            content,
            profile_id,
            media: media_urls,
            stats,
            reactions,
            shows_in_feed,
            is_indexing: false,
        }));

        Ok(id)
    }
}

impl Ingest for RemotePublication {
    fn kind(&self) -> EntityKind {
        EntityKind::Publication
    }

    fn stage(self, staging: &mut Staging<'_>) -> Result<(), ReplicaError> {
        self.validate()?;
        let shows_in_feed = staging.options.shows_in_feed;
        self.flatten(shows_in_feed, staging)?;
        Ok(())
    }
}

impl Ingest for Publication {
    fn kind(&self) -> EntityKind {
        EntityKind::Publication
    }

    fn stage(self, staging: &mut Staging<'_>) -> Result<(), ReplicaError> {
        require_id(EntityKind::Publication, &self.id)?;
        if !staging.resolvable(EntityKind::Profile, &self.profile_id) {
            return Err(ReplicaError::Validation(format!(
                "publication {} references unknown profile {}",
                self.id, self.profile_id
            )));
        }
        match &self.kind {
            PublicationKind::Post => {}
            PublicationKind::Comment { parent_id } => {
                if !staging.resolvable(EntityKind::Publication, parent_id) {
                    return Err(ReplicaError::Validation(format!(
                        "comment {} references unknown parent {}",
                        self.id, parent_id
                    )));
                }
            }
            PublicationKind::Mirror { mirrored_by } => {
                if !staging.resolvable(EntityKind::Profile, mirrored_by) {
                    return Err(ReplicaError::Validation(format!(
                        "mirror {} references unknown profile {}",
                        self.id, mirrored_by
                    )));
                }
            }
        }

        let mut publication = self;
        publication.shows_in_feed |= staging.options.shows_in_feed;
        staging.push(Entity::Publication(publication));
        Ok(())
    }
}

impl RemoteNotification {
    fn validate(&self) -> Result<(), ReplicaError> {
        require_id(EntityKind::Notification, &self.id)?;
        validate_profile(&self.profile)?;

        let publication = match &self.event {
            RemoteNotificationEvent::Followed => return Ok(()),
            RemoteNotificationEvent::Collected { publication }
            | RemoteNotificationEvent::Mirrored { publication }
            | RemoteNotificationEvent::Mentioned { publication }
            | RemoteNotificationEvent::Reacted { publication, .. } => publication.as_ref(),
            RemoteNotificationEvent::Commented { comment } => {
                if let Some(comment) = comment {
                    if !matches!(comment.kind, RemotePublicationKind::Comment { .. }) {
                        return Err(ReplicaError::Validation(format!(
                            "notification {} carries {} which is not a comment",
                            self.id, comment.id
                        )));
                    }
                }
                comment.as_ref()
            }
        };

        let publication = publication.ok_or_else(|| {
            ReplicaError::Validation(format!(
                "notification {} has no related publication",
                self.id
            ))
        })?;
        publication.validate()
    }
}

impl Ingest for RemoteNotification {
    fn kind(&self) -> EntityKind {
        EntityKind::Notification
    }

    fn stage(self, staging: &mut Staging<'_>) -> Result<(), ReplicaError> {
        self.validate()?;

        let RemoteNotification {
            id,
            event,
            created_at,
            profile,
        } = self;

        let missing =
            || ReplicaError::Validation(format!("notification {id} has no related publication"));

        let event = match event {
            RemoteNotificationEvent::Followed => NotificationEvent::Followed,
            RemoteNotificationEvent::Collected { publication } => NotificationEvent::Collected {
                publication_id: publication.ok_or_else(missing)?.flatten(false, staging)?,
            },
            RemoteNotificationEvent::Mirrored { publication } => NotificationEvent::Mirrored {
                publication_id: publication.ok_or_else(missing)?.flatten(false, staging)?,
            },
            RemoteNotificationEvent::Mentioned { publication } => NotificationEvent::Mentioned {
                publication_id: publication.ok_or_else(missing)?.flatten(false, staging)?,
            },
            RemoteNotificationEvent::Reacted {
                publication,
                reaction,
            } => NotificationEvent::Reacted {
                publication_id: publication.ok_or_else(missing)?.flatten(false, staging)?,
                reaction,
            },
            RemoteNotificationEvent::Commented { comment } => {
                let comment = comment.ok_or_else(missing)?;
                let publication_id = match &comment.kind {
                    RemotePublicationKind::Comment { of: Some(parent) } => parent.id.clone(),
                    _ => return Err(missing()),
                };
                let comment_id = comment.flatten(false, staging)?;
                NotificationEvent::Commented {
                    comment_id,
                    publication_id,
                }
            }
        };

        let profile_id = profile.id.clone();
        staging.push(Entity::Profile(profile));
        staging.push(Entity::Notification(Notification {
            id,
            event,
            created_at,
            profile_id,
        }));
        Ok(())
    }
}

impl Ingest for Notification {
    fn kind(&self) -> EntityKind {
        EntityKind::Notification
    }

    fn stage(self, staging: &mut Staging<'_>) -> Result<(), ReplicaError> {
        require_id(EntityKind::Notification, &self.id)?;
        if !staging.resolvable(EntityKind::Profile, &self.profile_id) {
            return Err(ReplicaError::Validation(format!(
                "notification {} references unknown profile {}",
                self.id, self.profile_id
            )));
        }
        for publication_id in self.event.publication_ids() {
            if publication_id.is_empty()
                || !staging.resolvable(EntityKind::Publication, publication_id)
            {
                return Err(ReplicaError::Validation(format!(
                    "notification {} references unknown publication {:?}",
                    self.id, publication_id
                )));
            }
        }
        staging.push(Entity::Notification(self));
        Ok(())
    }
}

impl Ingest for Entity {
    fn kind(&self) -> EntityKind {
        Entity::kind(self)
    }

    fn stage(self, staging: &mut Staging<'_>) -> Result<(), ReplicaError> {
        match self {
            Entity::Publication(publication) => publication.stage(staging),
            Entity::Profile(profile) => profile.stage(staging),
            Entity::Notification(notification) => notification.stage(staging),
            Entity::Media(media) => media.stage(staging),
        }
    }
}

// =============================================================================
// Entity Store
// =============================================================================

/// One atomic set of table changes; deletes apply before upserts
#[derive(Debug, Default)]
struct MutationBatch {
    deletes: Vec<(EntityKind, String)>,
    upserts: Vec<Entity>,
}

#[derive(Debug, Default)]
struct StoreInner {
    tables: Tables,
    observers: ObserverRegistry,
}

impl StoreInner {
    fn apply(&mut self, batch: MutationBatch) {
        let StoreInner { tables, observers } = self;
        let mut changes = ChangeSet::default();

        for (kind, id) in batch.deletes {
            if tables.remove(kind, &id).is_some() {
                changes.insert(kind, id);
            }
        }

        for entity in batch.upserts {
            let entity = merge_with_existing(tables, entity);
            if tables.get(entity.kind(), entity.id()) == Some(&entity) {
                continue;
            }
            changes.insert(entity.kind(), entity.id().to_string());
            tables.insert(entity);
        }

        if changes.is_empty() {
            return;
        }

        record_table_sizes(tables);
        observers.dispatch(tables, &changes);
    }
}

/// Full replacement, except that a publication never leaves the feed once
/// it has been shown there.
fn merge_with_existing(tables: &Tables, entity: Entity) -> Entity {
    match entity {
        Entity::Publication(mut publication) => {
            if let Some(Entity::Publication(existing)) =
                tables.get(EntityKind::Publication, &publication.id)
            {
                publication.shows_in_feed |= existing.shows_in_feed;
            }
            Entity::Publication(publication)
        }
        other => other,
    }
}

fn record_table_sizes(tables: &Tables) {
    use crate::metrics::CACHE_SIZE;

    for kind in [
        EntityKind::Publication,
        EntityKind::Profile,
        EntityKind::Notification,
        EntityKind::Media,
    ] {
        CACHE_SIZE
            .with_label_values(&[kind.as_str()])
            .set(tables.len(kind) as i64);
    }
}

fn record_lookup(kind: EntityKind, hit: bool) {
    use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};

    if hit {
        CACHE_HITS_TOTAL.with_label_values(&[kind.as_str()]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[kind.as_str()]).inc();
    }
}

/// In-memory replica of remote entities
///
/// Shared by handle (`Arc<EntityStore>`) between the pagination services,
/// the reconciliation loop and the facade. Cleared on logout, never
/// persisted.
#[derive(Debug, Default)]
pub struct EntityStore {
    inner: RwLock<StoreInner>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert items, replacing records with the same id.
    ///
    /// Items violating a data model invariant are logged and dropped; the
    /// rest of the batch is stored.
    pub async fn upsert_many<T: Ingest>(&self, items: Vec<T>) -> UpsertReport {
        self.upsert_many_with(items, UpsertOptions::default()).await
    }

    /// Upsert items with explicit options
    pub async fn upsert_many_with<T: Ingest>(
        &self,
        items: Vec<T>,
        options: UpsertOptions,
    ) -> UpsertReport {
        use crate::metrics::VALIDATION_REJECTIONS_TOTAL;

        let mut inner = self.inner.write().await;
        let mut report = UpsertReport::default();

        let batch = {
            let mut staging = Staging::new(&inner.tables, options);
            for item in items {
                let kind = Ingest::kind(&item);
                match item.stage(&mut staging) {
                    Ok(()) => report.stored += 1,
                    Err(error) => {
                        report.rejected += 1;
                        VALIDATION_REJECTIONS_TOTAL
                            .with_label_values(&[kind.as_str()])
                            .inc();
                        tracing::warn!(
                            kind = kind.as_str(),
                            %error,
                            "Dropping record that failed validation"
                        );
                    }
                }
            }
            MutationBatch {
                deletes: Vec::new(),
                upserts: staging.upserts,
            }
        };

        inner.apply(batch);

        tracing::debug!(
            stored = report.stored,
            rejected = report.rejected,
            "Upsert batch applied"
        );
        report
    }

    /// Get a record by id
    pub async fn get<T: Record>(&self, id: &str) -> Option<T> {
        let inner = self.inner.read().await;
        let result = inner
            .tables
            .get(T::KIND, id)
            .and_then(T::from_entity)
            .cloned();
        record_lookup(T::KIND, result.is_some());
        result
    }

    /// Get any entity by kind and id
    pub async fn get_entity(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        let inner = self.inner.read().await;
        let result = inner.tables.get(kind, id).cloned();
        record_lookup(kind, result.is_some());
        result
    }

    /// All records of one type matching a predicate, in no particular order
    pub async fn query<T, F>(&self, predicate: F) -> Vec<T>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        let inner = self.inner.read().await;
        inner
            .tables
            .iter(T::KIND)
            .filter_map(T::from_entity)
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// Feed publications, newest first
    pub async fn publications_for_feed(&self) -> Vec<Publication> {
        self.select_scope(&CollectionScope::Feed)
            .await
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::Publication(publication) => Some(publication),
                _ => None,
            })
            .collect()
    }

    /// Comments under one publication, oldest first
    pub async fn comments_for(&self, parent_id: &str) -> Vec<Publication> {
        let scope = CollectionScope::Comments {
            parent_id: parent_id.to_string(),
        };
        self.select_scope(&scope)
            .await
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::Publication(publication) => Some(publication),
                _ => None,
            })
            .collect()
    }

    /// Notifications, newest first
    pub async fn notifications(&self) -> Vec<Notification> {
        self.select_scope(&CollectionScope::Notifications)
            .await
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::Notification(notification) => Some(notification),
                _ => None,
            })
            .collect()
    }

    async fn select_scope(&self, scope: &CollectionScope) -> Vec<Entity> {
        let inner = self.inner.read().await;
        scope.select(&inner.tables)
    }

    /// Remove records by id, returning how many existed
    pub async fn delete_many<T: Record>(&self, ids: &[String]) -> usize {
        let mut inner = self.inner.write().await;
        let deletes: Vec<(EntityKind, String)> = ids
            .iter()
            .filter(|id| inner.tables.contains(T::KIND, id))
            .map(|id| (T::KIND, id.clone()))
            .collect();
        let removed = deletes.len();

        inner.apply(MutationBatch {
            deletes,
            upserts: Vec::new(),
        });

        tracing::debug!(kind = T::KIND.as_str(), removed, "Deleted records");
        removed
    }

    /// Swap a placeholder publication for its canonical record in one batch.
    ///
    /// The canonical record keeps the placeholder's id, stays in the feed and
    /// is no longer indexing. Returns `Ok(false)` without touching the store
    /// when the placeholder is already gone (e.g. the cache was cleared).
    pub async fn replace_publication(
        &self,
        placeholder_id: &str,
        canonical: RemotePublication,
    ) -> Result<bool, ReplicaError> {
        let mut canonical = canonical;
        canonical.id = placeholder_id.to_string();
        canonical.validate()?;

        let mut inner = self.inner.write().await;
        if !inner
            .tables
            .contains(EntityKind::Publication, placeholder_id)
        {
            return Ok(false);
        }

        let batch = {
            let mut staging = Staging::new(
                &inner.tables,
                UpsertOptions {
                    shows_in_feed: true,
                },
            );
            canonical.flatten(true, &mut staging)?;
            MutationBatch {
                deletes: vec![(EntityKind::Publication, placeholder_id.to_string())],
                upserts: staging.upserts,
            }
        };

        inner.apply(batch);
        Ok(true)
    }

    /// Insert a canonical publication under a given id, shown in the feed
    ///
    /// Used when no placeholder could be stored for a publication that was
    /// nonetheless submitted.
    pub async fn insert_publication(
        &self,
        id: &str,
        canonical: RemotePublication,
    ) -> Result<(), ReplicaError> {
        let mut canonical = canonical;
        canonical.id = id.to_string();
        canonical.validate()?;

        self.upsert_many_with(
            vec![canonical],
            UpsertOptions {
                shows_in_feed: true,
            },
        )
        .await;
        Ok(())
    }

    /// Empty every table (logout)
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        let StoreInner { tables, observers } = &mut *inner;

        let mut changes = ChangeSet::default();
        for (kind, id) in tables.drain_keys() {
            changes.insert(kind, id);
        }

        record_table_sizes(tables);
        if !changes.is_empty() {
            observers.dispatch(tables, &changes);
        }
        tracing::info!(removed = changes.len(), "Entity store cleared");
    }

    /// Number of records in one table
    pub async fn len(&self, kind: EntityKind) -> usize {
        self.inner.read().await.tables.len(kind)
    }

    /// Subscribe to a collection scope.
    ///
    /// The observer's first event is `Initial` with the current snapshot.
    pub async fn subscribe_collection(&self, scope: CollectionScope) -> CollectionObserver {
        let mut inner = self.inner.write().await;
        let StoreInner { tables, observers } = &mut *inner;
        observers.register_collection(scope, tables)
    }

    /// Subscribe to a single entity
    pub async fn subscribe_element(&self, kind: EntityKind, id: &str) -> ElementObserver {
        let mut inner = self.inner.write().await;
        let StoreInner { tables, observers } = &mut *inner;
        observers.register_element(kind, id, tables)
    }

    /// Live observer registrations, after dropping those whose handle is gone
    pub async fn observer_count(&self) -> usize {
        let mut inner = self.inner.write().await;
        inner.observers.prune();
        inner.observers.len()
    }
}
