use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// --- Cities ---

/// Stable, opaque city identifier. Doubles as the document key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityId(String);

impl CityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for CityId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// A stop on the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub id: CityId,
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub sequence_order: u32,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub became_current_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "keyword_list")]
    pub keywords: Vec<String>,
}

/// Caller-supplied fields for creating or editing a city. The current-city
/// flags are owned by the journey engine and never come from here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityUpsert {
    pub id: Option<CityId>,
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    pub sequence_order: u32,
    #[serde(default, deserialize_with = "keyword_list")]
    pub keywords: Vec<String>,
}

/// Computed view of the route. Not persisted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Journey {
    pub current_city: Option<City>,
    /// Cities strictly before the current one, ascending by sequence order.
    pub path: Vec<City>,
}

// --- Status ---

/// Singleton snapshot for fast reads; mirrors the current city.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Status {
    pub city_id: Option<CityId>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub quote: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// When set, client-facing updates are frozen.
    pub is_sleep: bool,
}

// --- Posts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    TikTok,
    Twitter,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Instagram, Platform::TikTok, Platform::Twitter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::TikTok),
            "twitter" | "x" => Ok(Platform::Twitter),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// A social post normalized from any platform. Never mutated after a scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub platform: Platform,
    pub external_id: String,
    pub username: Option<String>,
    pub caption: Option<String>,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub like_count: u64,
    /// Upstream record as returned by the actor, kept for debugging.
    #[serde(default)]
    pub raw: Map<String, Value>,
}

/// Raw fields that can carry post text, across all platforms.
const SEARCHABLE_FIELDS: [&str; 4] = ["caption", "text", "description", "title"];

impl Post {
    /// Deduplication identity.
    pub fn identity(&self) -> (Platform, &str) {
        (self.platform, self.external_id.as_str())
    }

    /// Document key inside a city's post collection.
    pub fn doc_key(&self) -> String {
        format!("{}:{}", self.platform, self.external_id)
    }

    /// Lowercased caption plus any text-bearing raw fields.
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(caption) = self.caption.as_deref() {
            parts.push(caption);
        }
        for field in SEARCHABLE_FIELDS {
            if let Some(Value::String(s)) = self.raw.get(field) {
                parts.push(s);
            }
        }
        parts.join(" ").to_lowercase()
    }
}

/// What to do with a city's stored posts when a new batch arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostRetention {
    /// Upsert by (platform, externalId); earlier batches stay.
    #[default]
    Accumulate,
    /// Drop the previous batch before writing.
    Replace,
}

impl FromStr for PostRetention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accumulate" => Ok(PostRetention::Accumulate),
            "replace" => Ok(PostRetention::Replace),
            other => Err(format!("unknown post retention policy: {other}")),
        }
    }
}

// --- Settings ---

pub const DEFAULT_SCRAPE_INTERVAL_MINUTES: i64 = 60;

/// Runtime-editable scrape configuration, stored as a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapeSettings {
    /// `<= 0` disables the scheduler.
    #[serde(alias = "socialScrapeIntervalMin")]
    pub scrape_interval_minutes: i64,
    pub instagram_username: Option<String>,
    pub tiktok_username: Option<String>,
    pub twitter_username: Option<String>,
    /// Handles scraped in addition to the per-platform ones.
    #[serde(deserialize_with = "keyword_list")]
    pub profiles: Vec<String>,
    #[serde(deserialize_with = "keyword_list")]
    pub extra_keywords: Vec<String>,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            scrape_interval_minutes: DEFAULT_SCRAPE_INTERVAL_MINUTES,
            instagram_username: None,
            tiktok_username: None,
            twitter_username: None,
            profiles: Vec::new(),
            extra_keywords: Vec::new(),
        }
    }
}

impl ScrapeSettings {
    /// All configured handles without `@`, first spelling wins on
    /// case-insensitive duplicates.
    pub fn profiles(&self) -> Vec<String> {
        let named = [
            self.instagram_username.as_deref(),
            self.twitter_username.as_deref(),
            self.tiktok_username.as_deref(),
        ];
        let mut out: Vec<String> = Vec::new();
        for handle in named
            .into_iter()
            .flatten()
            .chain(self.profiles.iter().map(String::as_str))
        {
            let handle = handle.trim().trim_start_matches('@');
            if handle.is_empty() || out.iter().any(|h| h.eq_ignore_ascii_case(handle)) {
                continue;
            }
            out.push(handle.to_string());
        }
        out
    }

    pub fn is_enabled(&self) -> bool {
        self.scrape_interval_minutes > 0
    }

    /// Fill empty handle and keyword lists from environment defaults.
    pub fn or_defaults(mut self, defaults: &ScrapeSettings) -> Self {
        if self.profiles().is_empty() {
            self.profiles = defaults.profiles();
        }
        if self.extra_keywords.is_empty() {
            self.extra_keywords = defaults.extra_keywords.clone();
        }
        self
    }
}

// --- Helpers ---

/// Split a comma-delimited list, trimming and dropping blanks.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stored documents carry keyword lists either as arrays or as
/// comma-delimited strings.
fn keyword_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::List(items)) => items
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        Some(Raw::Csv(s)) => split_csv(&s),
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn city_keywords_accept_comma_string() {
        let city: City = serde_json::from_value(json!({
            "id": "7",
            "name": "Chicago",
            "region": "Illinois",
            "sequenceOrder": 3,
            "keywords": "windy city, , chi-town"
        }))
        .unwrap();
        assert_eq!(city.keywords, vec!["windy city", "chi-town"]);
        assert!(!city.is_current);
        assert!(city.became_current_at.is_none());
    }

    #[test]
    fn city_keywords_accept_null() {
        let city: City = serde_json::from_value(json!({
            "id": "1",
            "name": "Austin",
            "keywords": null
        }))
        .unwrap();
        assert!(city.keywords.is_empty());
    }

    #[test]
    fn settings_read_legacy_interval_key() {
        let settings: ScrapeSettings =
            serde_json::from_value(json!({ "socialScrapeIntervalMin": 15 })).unwrap();
        assert_eq!(settings.scrape_interval_minutes, 15);
        assert!(settings.is_enabled());
    }

    #[test]
    fn settings_profiles_strip_at_and_dedupe() {
        let settings = ScrapeSettings {
            instagram_username: Some("@ExampleUser".into()),
            twitter_username: Some("exampleuser".into()),
            tiktok_username: Some("  ".into()),
            profiles: vec!["other".into()],
            ..Default::default()
        };
        assert_eq!(settings.profiles(), vec!["ExampleUser", "other"]);
    }

    #[test]
    fn settings_fall_back_to_defaults_only_when_empty() {
        let defaults = ScrapeSettings {
            profiles: vec!["envuser".into()],
            extra_keywords: vec!["roadtrip".into()],
            ..Default::default()
        };
        let stored = ScrapeSettings {
            twitter_username: Some("stored".into()),
            ..Default::default()
        };
        let merged = stored.or_defaults(&defaults);
        assert_eq!(merged.profiles(), vec!["stored"]);
        assert_eq!(merged.extra_keywords, vec!["roadtrip"]);
    }

    #[test]
    fn platform_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Platform::TikTok).unwrap(), json!("tiktok"));
        assert_eq!("X".parse::<Platform>().unwrap(), Platform::Twitter);
    }

    #[test]
    fn searchable_text_includes_raw_description_and_title() {
        let mut raw = Map::new();
        raw.insert("title".into(), json!("Live in CHICAGO"));
        raw.insert("likes".into(), json!(4));
        let post = Post {
            platform: Platform::TikTok,
            external_id: "1".into(),
            username: None,
            caption: Some("Stream tonight".into()),
            url: None,
            created_at: Utc::now(),
            like_count: 0,
            raw,
        };
        let text = post.searchable_text();
        assert!(text.contains("stream tonight"));
        assert!(text.contains("live in chicago"));
        assert_eq!(post.doc_key(), "tiktok:1");
    }
}
