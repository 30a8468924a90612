//! Data layer module
//!
//! Handles the local replica:
//! - Entity models (remote and stored shapes)
//! - Entity store (volatile, upsert-based)
//! - Change notification for collection and element observers

mod models;
mod observe;
mod store;

pub use models::*;
pub use observe::{
    CollectionEvent, CollectionObserver, CollectionScope, ElementEvent, ElementObserver,
};
pub use store::{EntityStore, Ingest, Record, Staging, UpsertOptions, UpsertReport};
pub(crate) use store::validate_profile;
