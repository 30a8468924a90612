//! Publish service
//!
//! Publishing goes through three remote steps (media upload, metadata
//! upload, relayer submission) and then shows up locally right away as an
//! indexing placeholder keyed by the relayer's transaction hash. A detached
//! task polls the remote until the canonical record is indexed and swaps it
//! in, or gives up after the configured number of attempts and leaves the
//! placeholder in place.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::{PublishConfig, ReconciliationConfig};
use crate::data::{
    Entity, EntityStore, Media, MediaKind, Profile, Publication, PublicationKind,
    validate_profile,
};
use crate::error::{RemoteError, ReplicaError};
use crate::remote::RemoteFeed;

/// Concurrent media uploads per publication
const MEDIA_UPLOAD_CONCURRENCY: usize = 4;

/// What is being published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewPublication {
    Post,
    Comment { parent_id: String },
}

impl NewPublication {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment { .. } => "comment",
        }
    }
}

/// Raw media attached to a new publication
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// How a reconciliation loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// Canonical record replaced the placeholder
    Confirmed { attempts: u32 },
    /// Attempts ran out; the placeholder is still indexing
    TimedOut { attempts: u32 },
    /// The placeholder disappeared (cache cleared) before confirmation
    Abandoned { attempts: u32 },
}

/// Returned once the placeholder is in the store
///
/// Dropping `reconciliation` detaches the loop; it keeps running.
#[derive(Debug)]
pub struct PublishReceipt {
    /// Placeholder id (the relayer transaction hash)
    pub publication_id: String,
    pub reconciliation: JoinHandle<ReconciliationOutcome>,
}

/// Publish service
pub struct PublishService {
    store: Arc<EntityStore>,
    remote: Arc<dyn RemoteFeed>,
    publish: PublishConfig,
    reconciliation: ReconciliationConfig,
}

impl PublishService {
    /// Create new publish service
    pub fn new(
        store: Arc<EntityStore>,
        remote: Arc<dyn RemoteFeed>,
        publish: PublishConfig,
        reconciliation: ReconciliationConfig,
    ) -> Self {
        Self {
            store,
            remote,
            publish,
            reconciliation,
        }
    }

    /// Publish a post or comment
    ///
    /// # Side Effects
    /// - Uploads media and metadata, submits through the relayer
    /// - Inserts an indexing placeholder shown in the feed
    /// - Spawns the reconciliation loop
    ///
    /// # Errors
    /// `Validation` for empty content, an invalid author or an unknown
    /// parent, `Upload` and
    /// `Relayer` for remote failures. In every error case nothing is
    /// written to the store.
    pub async fn create_publication(
        &self,
        kind: NewPublication,
        text: &str,
        author: Profile,
        media: Vec<MediaUpload>,
    ) -> Result<PublishReceipt, ReplicaError> {
        let text = text.trim();
        if text.is_empty() && media.is_empty() {
            return Err(ReplicaError::Validation(
                "publication content or media is required".to_string(),
            )
            .recorded());
        }
        validate_profile(&author).map_err(ReplicaError::recorded)?;
        if let NewPublication::Comment { parent_id } = &kind {
            if self.store.get::<Publication>(parent_id).await.is_none() {
                return Err(ReplicaError::Validation(format!(
                    "cannot comment on unknown publication {parent_id}"
                ))
                .recorded());
            }
        }

        let media = self.upload_media(media).await?;

        let metadata = self.build_metadata(&kind, text, &author, &media);
        let content_uri = self
            .remote
            .upload_metadata(metadata)
            .await
            .map_err(|error| upload_failed("metadata", error))?;

        let submitted = match &kind {
            NewPublication::Post => {
                self.remote
                    .submit_post(author.id.clone(), content_uri.clone())
                    .await
            }
            NewPublication::Comment { parent_id } => {
                self.remote
                    .submit_comment(author.id.clone(), parent_id.clone(), content_uri.clone())
                    .await
            }
        };
        let relayed = submitted.map_err(|error| {
            tracing::warn!(kind = kind.as_str(), %error, "Relayer submission failed");
            ReplicaError::Relayer(error.to_string()).recorded()
        })?;

        let id = relayed.tx_hash;
        let placeholder = Publication {
            id: id.clone(),
            kind: match kind {
                NewPublication::Post => PublicationKind::Post,
                NewPublication::Comment { parent_id } => PublicationKind::Comment { parent_id },
            },
            created_at: Utc::now(),
            content: text.to_string(),
            profile_id: author.id.clone(),
            media: media.iter().map(|item| item.url.clone()).collect(),
            stats: Default::default(),
            reactions: Default::default(),
            shows_in_feed: true,
            is_indexing: true,
        };

        let mut entities = vec![Entity::Profile(author)];
        entities.extend(media.into_iter().map(Entity::Media));
        entities.push(Entity::Publication(placeholder));
        let report = self.store.upsert_many(entities).await;
        let placeholder_stored = self.store.get::<Publication>(&id).await.is_some();
        if !placeholder_stored {
            tracing::warn!(
                id = %id,
                rejected = report.rejected,
                "Placeholder rejected; publication will appear once indexed"
            );
        }

        tracing::info!(
            id = %id,
            content_uri = %content_uri,
            "Publication submitted; placeholder inserted"
        );

        let reconciliation = tokio::spawn(reconcile(
            self.store.clone(),
            self.remote.clone(),
            id.clone(),
            self.reconciliation.clone(),
            placeholder_stored,
        ));

        Ok(PublishReceipt {
            publication_id: id,
            reconciliation,
        })
    }

    async fn upload_media(&self, uploads: Vec<MediaUpload>) -> Result<Vec<Media>, ReplicaError> {
        let remote = &self.remote;
        stream::iter(uploads)
            .map(|upload| async move {
                let MediaUpload { bytes, mime_type } = upload;
                let uri = remote.upload_media(bytes, mime_type.clone()).await?;
                Ok::<_, RemoteError>(Media {
                    url: uri.0,
                    kind: MediaKind::Image,
                    mime_type,
                })
            })
            .buffered(MEDIA_UPLOAD_CONCURRENCY)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|error| upload_failed("media", error))
    }

    fn build_metadata(
        &self,
        kind: &NewPublication,
        text: &str,
        author: &Profile,
        media: &[Media],
    ) -> serde_json::Value {
        let main_content_focus = if media.is_empty() {
            "TEXT_ONLY"
        } else {
            "IMAGE"
        };

        json!({
            "version": "2.0.0",
            "metadata_id": ulid::Ulid::new().to_string(),
            "name": format!("{} by @{}", capitalized(kind.as_str()), author.handle),
            "description": text,
            "content": text,
            "attributes": [{
                "traitType": "type",
                "displayType": "string",
                "value": kind.as_str(),
            }],
            "media": media
                .iter()
                .map(|item| json!({ "item": item.url, "type": item.mime_type }))
                .collect::<Vec<_>>(),
            "image": media.first().map(|item| item.url.clone()),
            "imageMimeType": media.first().map(|item| item.mime_type.clone()),
            "mainContentFocus": main_content_focus,
            "locale": self.publish.locale,
            "appId": self.publish.app_id,
            "tags": [],
        })
    }
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn upload_failed(what: &'static str, error: RemoteError) -> ReplicaError {
    tracing::warn!(what, %error, "Upload failed; nothing was published");
    ReplicaError::Upload(format!("{what}: {error}")).recorded()
}

/// Poll for the canonical record and swap it in for the placeholder
///
/// Without a stored placeholder the canonical record is inserted as soon
/// as it is indexed. With one, a placeholder that vanished in the meantime
/// (cache cleared) ends the loop without inserting anything.
async fn reconcile(
    store: Arc<EntityStore>,
    remote: Arc<dyn RemoteFeed>,
    id: String,
    config: ReconciliationConfig,
    placeholder_stored: bool,
) -> ReconciliationOutcome {
    use crate::metrics::{RECONCILIATION_ATTEMPTS_TOTAL, RECONCILIATION_OUTCOMES_TOTAL};

    let interval = config.interval();
    for attempt in 1..=config.max_attempts {
        tokio::time::sleep(interval).await;
        RECONCILIATION_ATTEMPTS_TOTAL.inc();

        match remote.fetch_publication_by_hash(id.clone()).await {
            Ok(Some(canonical)) => {
                let confirmed = if placeholder_stored {
                    store.replace_publication(&id, canonical).await
                } else {
                    store.insert_publication(&id, canonical).await.map(|()| true)
                };
                match confirmed {
                    Ok(true) => {
                        tracing::info!(id = %id, attempt, "Publication indexed");
                        RECONCILIATION_OUTCOMES_TOTAL
                            .with_label_values(&["confirmed"])
                            .inc();
                        return ReconciliationOutcome::Confirmed { attempts: attempt };
                    }
                    Ok(false) => {
                        tracing::info!(id = %id, attempt, "Placeholder gone before indexing finished");
                        RECONCILIATION_OUTCOMES_TOTAL
                            .with_label_values(&["abandoned"])
                            .inc();
                        return ReconciliationOutcome::Abandoned { attempts: attempt };
                    }
                    Err(error) => {
                        tracing::warn!(id = %id, attempt, %error, "Canonical publication rejected");
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(id = %id, attempt, "Publication not indexed yet");
            }
            Err(error) => {
                tracing::debug!(id = %id, attempt, %error, "Publication poll failed");
            }
        }
    }

    let error = ReplicaError::ReconciliationTimeout {
        id,
        attempts: config.max_attempts,
    }
    .recorded();
    tracing::warn!(%error, "Giving up; placeholder stays indexing");
    RECONCILIATION_OUTCOMES_TOTAL
        .with_label_values(&["timed_out"])
        .inc();

    ReconciliationOutcome::TimedOut {
        attempts: config.max_attempts,
    }
}
