// Document store seam: a key-value store of JSON objects grouped into
// named collections. Backends: MemoryStore (tests, local runs) and
// PgDocumentStore (JSONB table).

use async_trait::async_trait;
use serde_json::{Map, Value};

use waypoint_common::error::StoreResult;

pub type Document = Map<String, Value>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>>;

    /// Write a document. With `merge`, top-level fields are overlaid onto the
    /// existing document; otherwise the document is replaced.
    async fn set(&self, collection: &str, key: &str, fields: Document, merge: bool)
        -> StoreResult<()>;

    /// All documents in a collection, ordered by key.
    async fn list(&self, collection: &str) -> StoreResult<Vec<(String, Document)>>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, key: &str) -> StoreResult<bool>;

    /// Remove every document in a collection. Returns how many were removed.
    async fn clear(&self, collection: &str) -> StoreResult<u64>;
}

pub mod collections {
    use waypoint_common::CityId;

    pub const STATUS: &str = "status";
    pub const STATUS_KEY: &str = "current";

    pub const CITIES: &str = "cities";

    pub const SETTINGS: &str = "settings";
    pub const SETTINGS_KEY: &str = "scrape";

    /// Per-city post collection.
    pub fn city_posts(id: &CityId) -> String {
        format!("cities/{id}/posts")
    }
}
