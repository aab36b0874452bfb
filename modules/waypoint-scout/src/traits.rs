// Trait seam for the external actor service.
//
// ActorRunner wraps ApifyClient so platform fetchers can be tested with
// MockActorRunner: no network, no Apify account.

use async_trait::async_trait;
use serde_json::Value;

use apify_client::{ApifyClient, RunData};

#[async_trait]
pub trait ActorRunner: Send + Sync {
    /// Start an actor with `input` and wait for the run to finish.
    async fn call_actor(&self, actor_id: &str, input: &Value) -> apify_client::Result<RunData>;

    /// Raw items of a finished run's dataset.
    async fn dataset_items(&self, dataset_id: &str) -> apify_client::Result<Vec<Value>>;
}

#[async_trait]
impl ActorRunner for ApifyClient {
    async fn call_actor(&self, actor_id: &str, input: &Value) -> apify_client::Result<RunData> {
        ApifyClient::call_actor(self, actor_id, input).await
    }

    async fn dataset_items(&self, dataset_id: &str) -> apify_client::Result<Vec<Value>> {
        self.get_dataset_items(dataset_id).await
    }
}
