use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunData {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "SUCCEEDED" | "FAILED" | "ABORTED" | "TIMED-OUT"
        )
    }
}

// --- Instagram ---

/// Input for the apify/instagram-scraper actor.
///
/// Either `direct_urls` (profile or tagged feed) or `search` is set.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramScraperInput {
    #[serde(rename = "directUrls", skip_serializing_if = "Vec::is_empty")]
    pub direct_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(rename = "searchType", skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(rename = "resultsType")]
    pub results_type: String,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
    #[serde(rename = "addParentData")]
    pub add_parent_data: bool,
}

impl InstagramScraperInput {
    /// Posts other accounts tagged `handle` in.
    pub fn tagged_feed(handle: &str, limit: u32) -> Self {
        Self {
            direct_urls: vec![format!("https://www.instagram.com/{handle}/tagged/")],
            search: None,
            search_type: None,
            results_type: "posts".to_string(),
            results_limit: limit,
            add_parent_data: false,
        }
    }

    /// Hashtag search over free-text terms.
    pub fn search(term: &str, limit: u32) -> Self {
        Self {
            direct_urls: Vec::new(),
            search: Some(term.to_string()),
            search_type: Some("hashtag".to_string()),
            results_type: "posts".to_string(),
            results_limit: limit,
            add_parent_data: false,
        }
    }
}

// --- TikTok ---

/// Input for clockworks/tiktok-scraper keyword search.
#[derive(Debug, Clone, Serialize)]
pub struct TikTokSearchInput {
    #[serde(rename = "searchQueries")]
    pub search_queries: Vec<String>,
    #[serde(rename = "searchSection")]
    pub search_section: String,
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
}

impl TikTokSearchInput {
    pub fn videos(query: String, limit: u32) -> Self {
        Self {
            search_queries: vec![query],
            search_section: "/video".to_string(),
            results_per_page: limit,
        }
    }
}

// --- X/Twitter ---

/// Input for apidojo/tweet-scraper search. `mentioning` and `search_terms`
/// are separate request parameters upstream.
#[derive(Debug, Clone, Serialize)]
pub struct TweetSearchInput {
    #[serde(rename = "searchTerms", skip_serializing_if = "Vec::is_empty")]
    pub search_terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentioning: Option<String>,
    /// Lower date bound, `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    pub sort: String,
    #[serde(rename = "maxItems")]
    pub max_items: u32,
}
