// Typed access to the Status, Cities, Settings and per-city Posts
// collections. Invariants across documents (one current city) belong to
// the journey engine, not here.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use waypoint_common::error::{StoreError, StoreResult};
use waypoint_common::{City, CityId, Post, PostRetention, ScrapeSettings, Status};

use crate::document::{collections, Document, DocumentStore};
use crate::memory::MemoryStore;

#[derive(Clone)]
pub struct JourneyRepo {
    store: Arc<dyn DocumentStore>,
}

impl JourneyRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // --- Status ---

    pub async fn get_status(&self) -> StoreResult<Option<Status>> {
        match self
            .store
            .get(collections::STATUS, collections::STATUS_KEY)
            .await?
        {
            Some(doc) => decode(collections::STATUS, collections::STATUS_KEY, doc).map(Some),
            None => Ok(None),
        }
    }

    /// Merge `patch` into the status document, stamping `lastUpdated`.
    pub async fn update_status(&self, mut patch: Document) -> StoreResult<Status> {
        patch.insert("lastUpdated".into(), serde_json::to_value(Utc::now())?);
        self.store
            .set(collections::STATUS, collections::STATUS_KEY, patch, true)
            .await?;
        Ok(self.get_status().await?.unwrap_or_default())
    }

    // --- Cities ---

    /// All cities ascending by sequence order, ties broken by id.
    /// Undecodable documents are skipped.
    pub async fn list_cities(&self) -> StoreResult<Vec<City>> {
        let docs = self.store.list(collections::CITIES).await?;
        let mut cities: Vec<City> = docs
            .into_iter()
            .filter_map(|(key, doc)| match decode_city(&key, doc) {
                Ok(city) => Some(city),
                Err(e) => {
                    warn!(city_id = key.as_str(), error = %e, "Skipping unreadable city document");
                    None
                }
            })
            .collect();
        cities.sort_by(|a, b| {
            a.sequence_order
                .cmp(&b.sequence_order)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(cities)
    }

    pub async fn get_city(&self, id: &CityId) -> StoreResult<Option<City>> {
        match self.store.get(collections::CITIES, id.as_str()).await? {
            Some(doc) => decode_city(id.as_str(), doc).map(Some),
            None => Ok(None),
        }
    }

    /// Write the whole city document.
    pub async fn put_city(&self, city: &City) -> StoreResult<()> {
        let mut doc = encode(collections::CITIES, city.id.as_str(), city)?;
        // The key is the id; don't duplicate it in the body.
        doc.remove("id");
        self.store
            .set(collections::CITIES, city.id.as_str(), doc, false)
            .await
    }

    /// Merge selected fields into an existing city document.
    pub async fn patch_city(&self, id: &CityId, patch: Document) -> StoreResult<()> {
        self.store
            .set(collections::CITIES, id.as_str(), patch, true)
            .await
    }

    /// Remove a city and its posts.
    pub async fn delete_city(&self, id: &CityId) -> StoreResult<bool> {
        let removed = self.store.delete(collections::CITIES, id.as_str()).await?;
        if removed {
            self.store.clear(&collections::city_posts(id)).await?;
        }
        Ok(removed)
    }

    // --- Settings ---

    pub async fn get_settings(&self) -> StoreResult<Option<ScrapeSettings>> {
        match self
            .store
            .get(collections::SETTINGS, collections::SETTINGS_KEY)
            .await?
        {
            Some(doc) => decode(collections::SETTINGS, collections::SETTINGS_KEY, doc).map(Some),
            None => Ok(None),
        }
    }

    pub async fn put_settings(&self, settings: &ScrapeSettings) -> StoreResult<()> {
        let doc = encode(collections::SETTINGS, collections::SETTINGS_KEY, settings)?;
        self.store
            .set(collections::SETTINGS, collections::SETTINGS_KEY, doc, false)
            .await
    }

    // --- Posts ---

    /// Persist a scrape batch under the city's post collection. Posts are
    /// keyed by `platform:externalId`, so re-scraped posts overwrite their
    /// earlier copy.
    ///
    /// With `Replace`, posts not in the batch are deleted only after the
    /// whole batch is written. A failed write leaves the previous posts in
    /// place alongside whatever was written.
    pub async fn save_city_posts(
        &self,
        city_id: &CityId,
        posts: &[Post],
        retention: PostRetention,
    ) -> StoreResult<usize> {
        let collection = collections::city_posts(city_id);
        let mut keys = HashSet::with_capacity(posts.len());
        for post in posts {
            let key = post.doc_key();
            let doc = encode(&collection, &key, post)?;
            self.store.set(&collection, &key, doc, false).await?;
            keys.insert(key);
        }

        if retention == PostRetention::Replace {
            let mut stale = 0usize;
            for (key, _) in self.store.list(&collection).await? {
                if !keys.contains(&key) && self.store.delete(&collection, &key).await? {
                    stale += 1;
                }
            }
            debug!(city_id = %city_id, stale, "Replaced city posts");
        }
        Ok(posts.len())
    }

    /// Stored posts for a city, most liked first, then newest first.
    pub async fn list_city_posts(&self, city_id: &CityId, limit: usize) -> StoreResult<Vec<Post>> {
        let collection = collections::city_posts(city_id);
        let mut posts: Vec<Post> = self
            .store
            .list(&collection)
            .await?
            .into_iter()
            .filter_map(|(key, doc)| match decode::<Post>(&collection, &key, doc) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "Skipping unreadable post document");
                    None
                }
            })
            .collect();
        posts.sort_by(|a, b| {
            b.like_count
                .cmp(&a.like_count)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        posts.truncate(limit);
        Ok(posts)
    }
}

fn decode<T: DeserializeOwned>(collection: &str, key: &str, doc: Document) -> StoreResult<T> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Corrupt {
        collection: collection.to_string(),
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode_city(key: &str, mut doc: Document) -> StoreResult<City> {
    doc.insert("id".into(), Value::String(key.to_string()));
    decode(collections::CITIES, key, doc)
}

fn encode<T: Serialize>(collection: &str, key: &str, value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(doc) => Ok(doc),
        other => Err(StoreError::Corrupt {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: format!("expected an object, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use waypoint_common::Platform;

    fn city(id: &str, order: u32) -> City {
        City {
            id: CityId::from(id),
            name: format!("City {id}"),
            region: "Region".into(),
            latitude: 41.0,
            longitude: -87.0,
            sequence_order: order,
            is_current: false,
            became_current_at: None,
            keywords: Vec::new(),
        }
    }

    fn post(id: &str, likes: u64, minutes: i64) -> Post {
        Post {
            platform: Platform::Instagram,
            external_id: id.into(),
            username: Some("fan".into()),
            caption: Some("Chicago".into()),
            url: None,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
            like_count: likes,
            raw: Document::new(),
        }
    }

    #[tokio::test]
    async fn cities_list_in_sequence_order() {
        let repo = JourneyRepo::in_memory();
        for (id, order) in [("a", 3), ("b", 1), ("c", 2)] {
            repo.put_city(&city(id, order)).await.unwrap();
        }
        let orders: Vec<u32> = repo
            .list_cities()
            .await
            .unwrap()
            .iter()
            .map(|c| c.sequence_order)
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn city_id_comes_from_document_key() {
        let repo = JourneyRepo::in_memory();
        repo.store()
            .set(
                collections::CITIES,
                "42",
                json!({"name": "Chicago", "region": "Illinois", "sequenceOrder": 1, "keywords": "bean, loop"})
                    .as_object()
                    .cloned()
                    .unwrap(),
                false,
            )
            .await
            .unwrap();

        let city = repo.get_city(&CityId::from(42)).await.unwrap().unwrap();
        assert_eq!(city.id.as_str(), "42");
        assert_eq!(city.keywords, vec!["bean", "loop"]);
    }

    #[tokio::test]
    async fn unreadable_city_documents_are_skipped() {
        let repo = JourneyRepo::in_memory();
        repo.put_city(&city("ok", 1)).await.unwrap();
        repo.store()
            .set(collections::CITIES, "bad", json!({"sequenceOrder": "x"}).as_object().cloned().unwrap(), false)
            .await
            .unwrap();
        let cities = repo.list_cities().await.unwrap();
        assert_eq!(cities.len(), 1);
    }

    #[tokio::test]
    async fn status_update_merges_and_stamps() {
        let repo = JourneyRepo::in_memory();
        repo.update_status(json!({"isSleep": true}).as_object().cloned().unwrap())
            .await
            .unwrap();
        let status = repo
            .update_status(json!({"city": "Chicago"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        assert!(status.is_sleep);
        assert_eq!(status.city.as_deref(), Some("Chicago"));
        assert!(status.last_updated.is_some());
    }

    #[tokio::test]
    async fn accumulate_keeps_earlier_batches_and_dedupes() {
        let repo = JourneyRepo::in_memory();
        let id = CityId::from("chi");
        repo.save_city_posts(&id, &[post("1", 5, 0), post("2", 1, 0)], PostRetention::Accumulate)
            .await
            .unwrap();
        repo.save_city_posts(&id, &[post("1", 9, 0), post("3", 3, 0)], PostRetention::Accumulate)
            .await
            .unwrap();

        let posts = repo.list_city_posts(&id, 100).await.unwrap();
        let ids: Vec<&str> = posts.iter().map(|p| p.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
        assert_eq!(posts[0].like_count, 9);
    }

    #[tokio::test]
    async fn replace_drops_previous_batch() {
        let repo = JourneyRepo::in_memory();
        let id = CityId::from("chi");
        repo.save_city_posts(&id, &[post("1", 5, 0)], PostRetention::Replace)
            .await
            .unwrap();
        repo.save_city_posts(&id, &[post("2", 1, 0)], PostRetention::Replace)
            .await
            .unwrap();

        let posts = repo.list_city_posts(&id, 100).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].external_id, "2");
    }

    /// Memory store whose writes fail for one key.
    struct FailingWrites {
        inner: MemoryStore,
        bad_key: String,
    }

    #[async_trait::async_trait]
    impl DocumentStore for FailingWrites {
        async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
            self.inner.get(collection, key).await
        }

        async fn set(
            &self,
            collection: &str,
            key: &str,
            fields: Document,
            merge: bool,
        ) -> StoreResult<()> {
            if key == self.bad_key {
                return Err(StoreError::Backend("connection reset".into()));
            }
            self.inner.set(collection, key, fields, merge).await
        }

        async fn list(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
            self.inner.list(collection).await
        }

        async fn delete(&self, collection: &str, key: &str) -> StoreResult<bool> {
            self.inner.delete(collection, key).await
        }

        async fn clear(&self, collection: &str) -> StoreResult<u64> {
            self.inner.clear(collection).await
        }
    }

    #[tokio::test]
    async fn failed_replace_keeps_previous_posts() {
        let repo = JourneyRepo::new(Arc::new(FailingWrites {
            inner: MemoryStore::new(),
            bad_key: post("bad", 0, 0).doc_key(),
        }));
        let id = CityId::from("chi");
        repo.save_city_posts(&id, &[post("old", 4, 0)], PostRetention::Replace)
            .await
            .unwrap();

        let err = repo
            .save_city_posts(&id, &[post("new", 1, 0), post("bad", 2, 0)], PostRetention::Replace)
            .await;
        assert!(matches!(err, Err(StoreError::Backend(_))));

        let mut ids: Vec<String> = repo
            .list_city_posts(&id, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.external_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn listing_breaks_like_ties_by_recency_and_limits() {
        let repo = JourneyRepo::in_memory();
        let id = CityId::from("chi");
        repo.save_city_posts(
            &id,
            &[post("old", 2, 0), post("new", 2, 30), post("top", 7, -60)],
            PostRetention::Accumulate,
        )
        .await
        .unwrap();

        let ids: Vec<String> = repo
            .list_city_posts(&id, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.external_id)
            .collect();
        assert_eq!(ids, vec!["top", "new"]);
    }

    #[tokio::test]
    async fn deleting_a_city_clears_its_posts() {
        let repo = JourneyRepo::in_memory();
        let c = city("chi", 1);
        repo.put_city(&c).await.unwrap();
        repo.save_city_posts(&c.id, &[post("1", 1, 0)], PostRetention::Accumulate)
            .await
            .unwrap();

        assert!(repo.delete_city(&c.id).await.unwrap());
        assert!(repo.list_city_posts(&c.id, 10).await.unwrap().is_empty());
        assert!(!repo.delete_city(&c.id).await.unwrap());
    }
}
