//! Per-key pagination cursors
//!
//! Cursors are private service state. The lock is only held to read or
//! advance a cursor, never across a fetch.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::data::Cursor;

#[derive(Debug, Default)]
pub(crate) struct CursorBook {
    cursors: Mutex<HashMap<String, Cursor>>,
}

impl CursorBook {
    /// Current cursor for a key (fresh if never fetched)
    pub(crate) async fn get(&self, key: &str) -> Cursor {
        self.cursors
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Forget the cursor for a key so the next fetch starts over
    pub(crate) async fn reset(&self, key: &str) {
        self.cursors.lock().await.remove(key);
    }

    /// Advance a key's cursor past a fetched page
    pub(crate) async fn advance(&self, key: &str, page: &Cursor) -> Cursor {
        let mut cursors = self.cursors.lock().await;
        let cursor = cursors.entry(key.to_string()).or_default();
        cursor.advance(page);
        cursor.clone()
    }

    pub(crate) async fn clear(&self) {
        self.cursors.lock().await.clear();
    }
}
