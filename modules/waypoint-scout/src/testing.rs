// Test doubles for the scout seams: actor service, platform fetchers,
// scrape jobs and interval sources. No network, no store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;

use apify_client::{ApifyError, RunData};
use waypoint_common::{City, CityId, Platform, Post};

use crate::cycle::{CycleReport, ScrapeJob};
use crate::fetchers::{FetchError, FetchOutcome, FetchQuery, PlatformFetcher};
use crate::scheduler::IntervalSource;
use crate::traits::ActorRunner;

// ---------------------------------------------------------------------------
// MockActorRunner
// ---------------------------------------------------------------------------

/// Actor service keyed by actor id. Each actor's dataset id is the actor id.
#[derive(Default)]
pub struct MockActorRunner {
    datasets: HashMap<String, Vec<Value>>,
    failures: HashMap<String, (u16, String)>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockActorRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_actor(mut self, actor_id: &str, items: Vec<Value>) -> Self {
        self.datasets.insert(actor_id.to_string(), items);
        self
    }

    pub fn failing(mut self, actor_id: &str, status: u16, message: &str) -> Self {
        self.failures
            .insert(actor_id.to_string(), (status, message.to_string()));
        self
    }

    /// Every `(actor_id, input)` seen, in call order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inputs_for(&self, actor_id: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(id, _)| id == actor_id)
            .map(|(_, input)| input)
            .collect()
    }
}

#[async_trait]
impl ActorRunner for MockActorRunner {
    async fn call_actor(&self, actor_id: &str, input: &Value) -> apify_client::Result<RunData> {
        self.calls
            .lock()
            .unwrap()
            .push((actor_id.to_string(), input.clone()));

        if let Some((status, message)) = self.failures.get(actor_id) {
            return Err(ApifyError::Api {
                status: *status,
                message: message.clone(),
            });
        }
        if !self.datasets.contains_key(actor_id) {
            return Err(ApifyError::Api {
                status: 404,
                message: format!("actor {actor_id} not found"),
            });
        }
        Ok(RunData {
            id: format!("run-{actor_id}"),
            status: "SUCCEEDED".to_string(),
            default_dataset_id: actor_id.to_string(),
            started_at: None,
            finished_at: None,
        })
    }

    async fn dataset_items(&self, dataset_id: &str) -> apify_client::Result<Vec<Value>> {
        self.datasets
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| ApifyError::Api {
                status: 404,
                message: format!("dataset {dataset_id} not found"),
            })
    }
}

// ---------------------------------------------------------------------------
// StaticFetcher
// ---------------------------------------------------------------------------

enum Behaviour {
    Posts(Vec<Post>),
    Fail(String),
    Hang,
    Panic,
}

/// Fetcher with a canned answer. Records every query it receives.
pub struct StaticFetcher {
    platform: Platform,
    behaviour: Behaviour,
    delay: Option<Duration>,
    queries: Mutex<Vec<FetchQuery>>,
}

impl StaticFetcher {
    fn with(platform: Platform, behaviour: Behaviour) -> Self {
        Self {
            platform,
            behaviour,
            delay: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(platform: Platform, posts: Vec<Post>) -> Self {
        Self::with(platform, Behaviour::Posts(posts))
    }

    pub fn failing(platform: Platform, message: &str) -> Self {
        Self::with(platform, Behaviour::Fail(message.to_string()))
    }

    /// Never answers.
    pub fn hanging(platform: Platform) -> Self {
        Self::with(platform, Behaviour::Hang)
    }

    pub fn panicking(platform: Platform) -> Self {
        Self::with(platform, Behaviour::Panic)
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<FetchQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformFetcher for StaticFetcher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, query: &FetchQuery, _since: DateTime<Utc>) -> FetchOutcome {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behaviour {
            Behaviour::Posts(posts) => FetchOutcome::from_posts(posts.clone()),
            Behaviour::Fail(message) => {
                FetchOutcome::Failed(FetchError::Upstream(ApifyError::Network(message.clone())))
            }
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Panic => panic!("fetcher exploded"),
        }
    }
}

// ---------------------------------------------------------------------------
// GatedJob
// ---------------------------------------------------------------------------

/// Scrape job that counts runs and, when closed, blocks each run until
/// `release` hands it a permit.
pub struct GatedJob {
    gate: Semaphore,
    started: AtomicUsize,
    finished: AtomicUsize,
    fail: bool,
}

impl GatedJob {
    pub fn open() -> Self {
        Self {
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn closed() -> Self {
        Self {
            gate: Semaphore::new(0),
            ..Self::open()
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn release(&self, runs: usize) {
        self.gate.add_permits(runs);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScrapeJob for GatedJob {
    async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await?;
        permit.forget();
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("store unavailable");
        }
        Ok(CycleReport::NoCurrentCity)
    }
}

// ---------------------------------------------------------------------------
// FixedInterval
// ---------------------------------------------------------------------------

/// Interval source an admin edit can be simulated on with `set`.
pub struct FixedInterval(AtomicI64);

impl FixedInterval {
    pub fn new(minutes: i64) -> Self {
        Self(AtomicI64::new(minutes))
    }

    pub fn set(&self, minutes: i64) {
        self.0.store(minutes, Ordering::SeqCst);
    }
}

#[async_trait]
impl IntervalSource for FixedInterval {
    async fn interval_minutes(&self) -> anyhow::Result<i64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Noon UTC on 2025-06-01; fixtures count from here.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn post(platform: Platform, id: &str, likes: u64, caption: &str) -> Post {
    Post {
        platform,
        external_id: id.to_string(),
        username: Some("fan".to_string()),
        caption: Some(caption.to_string()),
        url: None,
        created_at: t0(),
        like_count: likes,
        raw: Map::new(),
    }
}

/// A city that became current at `t0()`.
pub fn current_city(id: &str, name: &str, region: &str) -> City {
    City {
        id: CityId::from(id),
        name: name.to_string(),
        region: region.to_string(),
        latitude: 41.88,
        longitude: -87.63,
        sequence_order: 1,
        is_current: true,
        became_current_at: Some(t0()),
        keywords: Vec::new(),
    }
}
