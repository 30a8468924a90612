//! Data models
//!
//! Two shapes exist for every remote entity:
//! - the *remote* shape (`RemotePublication`, `RemoteNotification`) as the
//!   feed API hands it over, with related entities embedded
//! - the *stored* shape (`Publication`, `Notification`, ...) kept by the
//!   entity store, where relations are plain ids resolved by lookup
//!
//! Flattening happens at the upsert boundary, see [`crate::data::EntityStore`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Opaque pagination token handed out by the remote API
pub type Token = String;

/// Publication id (for locally created posts: the relayer transaction hash)
pub type PublicationId = String;

/// Profile id
pub type ProfileId = String;

/// Notification id
pub type NotificationId = String;

// =============================================================================
// Pagination
// =============================================================================

/// Cursor over one remote paginated source
///
/// A fresh cursor (`Cursor::default()`) has no tokens and is never
/// exhausted. Once a page comes back without a `next` token the source
/// has no more pages and the cursor is marked exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub prev: Option<Token>,
    pub next: Option<Token>,
    #[serde(default)]
    exhausted: bool,
}

impl Cursor {
    /// Cursor as reported by a fetched page
    pub fn from_page(prev: Option<Token>, next: Option<Token>) -> Self {
        let exhausted = next.is_none();
        Self {
            prev,
            next,
            exhausted,
        }
    }

    /// Whether the source behind this cursor has no further pages
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Token to request the following page with
    pub fn next_token(&self) -> Option<Token> {
        self.next.clone()
    }

    /// Move this cursor past a fetched page.
    ///
    /// Exhaustion is derived from the page's `next` token, regardless of
    /// how the remote built the page cursor.
    pub fn advance(&mut self, page: &Cursor) {
        self.prev = page.prev.clone();
        self.next = page.next.clone();
        self.exhausted = page.next.is_none();
    }
}

/// One page fetched from one remote source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub cursor: Cursor,
}

impl<T> PaginatedResult<T> {
    pub fn new(data: Vec<T>, cursor: Cursor) -> Self {
        Self { data, cursor }
    }
}

// =============================================================================
// Profile
// =============================================================================

/// A social-graph profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    /// Unique display handle (e.g. "alice.lens")
    pub handle: String,
    pub name: Option<String>,
    /// Owning wallet address
    pub owned_by: String,
    pub picture_url: Option<String>,
    pub cover_url: Option<String>,
    pub bio: Option<String>,
    pub followers: u64,
    pub following: u64,
    /// Free-form attributes: location, twitter, website
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub is_default: bool,
}

impl Profile {
    pub fn location(&self) -> Option<&str> {
        self.attributes.get("location").map(String::as_str)
    }

    pub fn twitter(&self) -> Option<&str> {
        self.attributes.get("twitter").map(String::as_str)
    }

    pub fn website(&self) -> Option<&str> {
        self.attributes.get("website").map(String::as_str)
    }
}

// =============================================================================
// Publication
// =============================================================================

/// Interaction counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationStats {
    pub upvotes: u64,
    pub collects: u64,
    pub comments: u64,
    pub mirrors: u64,
}

/// Interactions of the signed-in user with a publication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationReactions {
    pub upvoted: bool,
    pub collected: bool,
    pub mirrored: bool,
}

/// Publication variant, relations by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typename", rename_all = "snake_case")]
pub enum PublicationKind {
    Post,
    Comment { parent_id: PublicationId },
    Mirror { mirrored_by: ProfileId },
}

/// Stored publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: PublicationId,
    pub kind: PublicationKind,
    pub created_at: DateTime<Utc>,
    pub content: String,
    /// Owning profile
    pub profile_id: ProfileId,
    /// Attached media, by canonical URL
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub stats: PublicationStats,
    #[serde(default)]
    pub reactions: PublicationReactions,
    pub shows_in_feed: bool,
    pub is_indexing: bool,
}

impl Publication {
    pub fn parent_id(&self) -> Option<&str> {
        match &self.kind {
            PublicationKind::Comment { parent_id } => Some(parent_id),
            _ => None,
        }
    }
}

/// Publication variant as delivered by the remote API
///
/// The relation targets are optional because the API may omit them; a
/// comment without its parent or a mirror without its profile is rejected
/// at the upsert boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typename", rename_all = "snake_case")]
pub enum RemotePublicationKind {
    Post,
    Comment { of: Option<Box<RemotePublication>> },
    Mirror { by: Option<Profile> },
}

/// Publication as delivered by the remote API, relations embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePublication {
    pub id: PublicationId,
    pub kind: RemotePublicationKind,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub profile: Profile,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default)]
    pub stats: PublicationStats,
    #[serde(default)]
    pub reactions: PublicationReactions,
}

// =============================================================================
// Notification
// =============================================================================

/// Reaction kinds carried by `reacted` notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Upvote,
    Downvote,
}

/// Stored notification event, relations by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    Followed,
    Collected {
        publication_id: PublicationId,
    },
    Commented {
        comment_id: PublicationId,
        publication_id: PublicationId,
    },
    Mirrored {
        publication_id: PublicationId,
    },
    Mentioned {
        publication_id: PublicationId,
    },
    Reacted {
        publication_id: PublicationId,
        reaction: Reaction,
    },
}

impl NotificationEvent {
    /// Ids of every publication this event refers to
    pub fn publication_ids(&self) -> Vec<&str> {
        match self {
            Self::Followed => Vec::new(),
            Self::Commented {
                comment_id,
                publication_id,
            } => vec![comment_id.as_str(), publication_id.as_str()],
            Self::Collected { publication_id }
            | Self::Mirrored { publication_id }
            | Self::Mentioned { publication_id }
            | Self::Reacted { publication_id, .. } => vec![publication_id.as_str()],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Followed => "followed",
            Self::Collected { .. } => "collected",
            Self::Commented { .. } => "commented",
            Self::Mirrored { .. } => "mirrored",
            Self::Mentioned { .. } => "mentioned",
            Self::Reacted { .. } => "reacted",
        }
    }
}

/// Stored notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub event: NotificationEvent,
    pub created_at: DateTime<Utc>,
    /// Profile that triggered the notification
    pub profile_id: ProfileId,
}

/// Notification event as delivered by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RemoteNotificationEvent {
    Followed,
    Collected {
        publication: Option<RemotePublication>,
    },
    /// The commented publication is the comment's parent
    Commented {
        comment: Option<RemotePublication>,
    },
    Mirrored {
        publication: Option<RemotePublication>,
    },
    Mentioned {
        publication: Option<RemotePublication>,
    },
    Reacted {
        publication: Option<RemotePublication>,
        reaction: Reaction,
    },
}

/// Notification as delivered by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteNotification {
    pub id: NotificationId,
    pub event: RemoteNotificationEvent,
    pub created_at: DateTime<Utc>,
    pub profile: Profile,
}

// =============================================================================
// Media
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
}

/// Media item, identified by its canonical URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub url: String,
    pub kind: MediaKind,
    pub mime_type: String,
}

// =============================================================================
// Entity (closed variant over every stored kind)
// =============================================================================

/// Table selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Publication,
    Profile,
    Notification,
    Media,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publication => "publication",
            Self::Profile => "profile",
            Self::Notification => "notification",
            Self::Media => "media",
        }
    }
}

/// Any stored entity
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Publication(Publication),
    Profile(Profile),
    Notification(Notification),
    Media(Media),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Publication(_) => EntityKind::Publication,
            Self::Profile(_) => EntityKind::Profile,
            Self::Notification(_) => EntityKind::Notification,
            Self::Media(_) => EntityKind::Media,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Publication(publication) => &publication.id,
            Self::Profile(profile) => &profile.id,
            Self::Notification(notification) => &notification.id,
            Self::Media(media) => &media.url,
        }
    }

    pub fn as_publication(&self) -> Option<&Publication> {
        match self {
            Self::Publication(publication) => Some(publication),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&Profile> {
        match self {
            Self::Profile(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_notification(&self) -> Option<&Notification> {
        match self {
            Self::Notification(notification) => Some(notification),
            _ => None,
        }
    }

    pub fn as_media(&self) -> Option<&Media> {
        match self {
            Self::Media(media) => Some(media),
            _ => None,
        }
    }
}
