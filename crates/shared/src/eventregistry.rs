use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const GET_EVENTS_URL: &str = "https://eventregistry.org/api/v1/event/getEvents";
const GET_EVENT_URL: &str = "https://eventregistry.org/api/v1/event/getEvent";

/// Windows larger than this are clamped; EventRegistry gets very slow on
/// multi-month date ranges.
const MAX_WINDOW_MINUTES: u32 = 30 * 24 * 60;

/// Terms whose dominance over "bitcoin" disqualifies an event
const EXCLUDE_CRYPTO_TERMS: &[&str] = &[
    "ethereum", "bitcoin cash", "litecoin", "dogecoin", "solana", "cardano", "ripple", "polygon",
];

const MINING_TERMS: &[&str] = &["mining", "miner", "hashrate", "hash rate", "asic"];

#[derive(Debug, Clone)]
pub enum QueryStyle {
    /// Built-in Bitcoin-mining keyword set with strict relevance filtering
    Mining,
    /// Single keyword with lenient filtering; used for overrides and for the
    /// narrower-window fallback
    Simple(String),
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub recency_minutes: u32,
    pub max_events: usize,
    pub style: QueryStyle,
}

impl SearchQuery {
    /// The one permitted fallback: same target count, window clamped to 30
    /// minutes, simplified query form.
    pub fn narrowed(&self) -> SearchQuery {
        let keyword = match &self.style {
            QueryStyle::Mining => "bitcoin".to_string(),
            QueryStyle::Simple(kw) => kw.clone(),
        };
        SearchQuery {
            recency_minutes: self.recency_minutes.min(30),
            max_events: self.max_events,
            style: QueryStyle::Simple(keyword),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    api_key: String,
    result_type: String,
    keyword: Vec<String>,
    keyword_oper: String,
    date_start: String,
    date_end: String,
    lang: String,
    min_articles_in_event: u32,
    max_articles_in_event: u32,
    events_page: u32,
    events_count: u32,
    events_sort_by: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoRequest {
    api_key: String,
    event_uri: String,
    result_type: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LangText {
    #[serde(default)]
    pub eng: Option<String>,
}

impl LangText {
    pub fn text(&self) -> &str {
        self.eng.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub label: LangText,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub uri: String,
    #[serde(default)]
    pub title: LangText,
    #[serde(default)]
    pub summary: LangText,
    #[serde(default, rename = "eventDate")]
    pub event_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    events: Option<EventsPage>,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    results: Vec<Event>,
}

/// Full detail for a single event, as returned by getEvent
#[derive(Debug, Clone, Deserialize)]
pub struct EventInfo {
    #[serde(default)]
    pub title: LangText,
    #[serde(default)]
    pub summary: LangText,
    #[serde(default)]
    pub concepts: Vec<Concept>,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    event: Option<EventInfo>,
}

/// Build the getEvents request body. Pure so the query shape stays testable.
pub fn build_search_request(
    api_key: &str,
    query: &SearchQuery,
    now: DateTime<Utc>,
) -> SearchRequest {
    let recency_minutes = query.recency_minutes.min(MAX_WINDOW_MINUTES);
    let start = now - Duration::minutes(recency_minutes as i64);

    let (keyword, max_articles, count) = match &query.style {
        QueryStyle::Mining => (
            vec![
                "bitcoin mining".to_string(),
                "bitcoin miner".to_string(),
                "bitcoin hashrate".to_string(),
                "bitcoin ASIC".to_string(),
            ],
            20,
            // Request ~3x the target so relevance filtering still leaves enough
            (query.max_events * 3).min(15) as u32,
        ),
        QueryStyle::Simple(kw) => (
            vec![kw.clone()],
            10,
            (query.max_events * 2).min(10) as u32,
        ),
    };

    SearchRequest {
        api_key: api_key.to_string(),
        result_type: "events".to_string(),
        keyword,
        keyword_oper: "or".to_string(),
        date_start: start.format("%Y-%m-%d").to_string(),
        date_end: now.format("%Y-%m-%d").to_string(),
        lang: "eng".to_string(),
        min_articles_in_event: 1,
        max_articles_in_event: max_articles,
        events_page: 1,
        events_count: count.max(1),
        events_sort_by: "date".to_string(),
    }
}

/// EventRegistry answers small windows quickly but needs headroom on large
/// ones; mirror that in the per-request timeout.
pub fn timeout_for_window(recency_minutes: u32) -> std::time::Duration {
    let secs = match recency_minutes {
        0..=60 => 25,
        61..=120 => 30,
        121..=240 => 35,
        241..=480 => 40,
        _ => 45,
    };
    std::time::Duration::from_secs(secs)
}

/// True when the error chain bottoms out in a request timeout. Only timeouts
/// earn the fallback query; everything else aborts the run.
pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .map(|e| e.is_timeout())
        .unwrap_or(false)
}

/// Keep events that are actually about Bitcoin mining, in input order, at
/// most `max_events` of them.
pub fn filter_events(events: Vec<Event>, style: &QueryStyle, max_events: usize) -> Vec<Event> {
    let mut kept = Vec::new();

    for event in events {
        if kept.len() >= max_events {
            break;
        }

        let text = format!("{} {}", event.title.text(), event.summary.text()).to_lowercase();

        match style {
            QueryStyle::Mining => {
                if !text.contains("bitcoin") {
                    continue;
                }
                if !MINING_TERMS.iter().any(|term| text.contains(term)) {
                    continue;
                }
                let bitcoin_count = text.matches("bitcoin").count();
                let other_crypto_count = EXCLUDE_CRYPTO_TERMS
                    .iter()
                    .filter(|term| text.contains(*term))
                    .count();
                // Skip events where competing coins dominate the coverage
                if other_crypto_count > 0 && bitcoin_count <= other_crypto_count {
                    continue;
                }
            }
            // Lenient: the keyword itself appearing anywhere is enough
            QueryStyle::Simple(keyword) => {
                if !text.contains(&keyword.to_lowercase()) {
                    continue;
                }
            }
        }

        kept.push(event);
    }

    kept
}

pub struct EventRegistryClient {
    client: Client,
    api_key: String,
}

impl EventRegistryClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, api_key })
    }

    /// Run one search. Network and HTTP-level failures are errors; an empty
    /// result set is not.
    pub async fn search_events(&self, query: &SearchQuery) -> Result<Vec<Event>> {
        let request = build_search_request(&self.api_key, query, Utc::now());
        let timeout = timeout_for_window(query.recency_minutes);

        eprintln!(
            "Searching events from the last {} minutes (timeout {}s)...",
            query.recency_minutes,
            timeout.as_secs()
        );

        let response = self
            .client
            .post(GET_EVENTS_URL)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .context("Failed to query EventRegistry")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("EventRegistry API returned error: {} - {}", status, error_text);
        }

        let search_response = response
            .json::<SearchResponse>()
            .await
            .context("Failed to parse EventRegistry response")?;

        let results = search_response
            .events
            .map(|page| page.results)
            .unwrap_or_default();

        eprintln!("Found {} raw events from EventRegistry", results.len());

        Ok(filter_events(results, &query.style, query.max_events))
    }

    /// Search once; on a request timeout, retry exactly once with the
    /// narrower fallback query. Any other failure propagates.
    pub async fn search_with_fallback(&self, query: &SearchQuery) -> Result<Vec<Event>> {
        match self.search_events(query).await {
            Ok(events) => Ok(events),
            Err(err) if is_timeout(&err) => {
                let narrowed = query.narrowed();
                eprintln!(
                    "⚠ Query timed out with a {} minute window; retrying once with {} minutes...",
                    query.recency_minutes, narrowed.recency_minutes
                );
                self.search_events(&narrowed)
                    .await
                    .context("Fallback query with narrower window also failed")
            }
            Err(err) => Err(err),
        }
    }

    /// Fetch title, summary, and concepts for one event URI.
    pub async fn event_info(&self, event_uri: &str) -> Result<EventInfo> {
        let request = InfoRequest {
            api_key: self.api_key.clone(),
            event_uri: event_uri.to_string(),
            result_type: "info".to_string(),
        };

        let response = self
            .client
            .post(GET_EVENT_URL)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to fetch event details for {}", event_uri))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("EventRegistry API returned error: {} - {}", status, error_text);
        }

        let info_response = response
            .json::<InfoResponse>()
            .await
            .context("Failed to parse EventRegistry event response")?;

        info_response
            .event
            .ok_or_else(|| anyhow::anyhow!("No event information found for {}", event_uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(uri: &str, title: &str, summary: &str) -> Event {
        Event {
            uri: uri.to_string(),
            title: LangText {
                eng: Some(title.to_string()),
            },
            summary: LangText {
                eng: Some(summary.to_string()),
            },
            event_date: None,
        }
    }

    // ==================== Request Building Tests ====================

    #[test]
    fn test_mining_request_shape() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let query = SearchQuery {
            recency_minutes: 90,
            max_events: 5,
            style: QueryStyle::Mining,
        };

        let request = build_search_request("test-key", &query, now);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["apiKey"], "test-key");
        assert_eq!(body["resultType"], "events");
        assert_eq!(body["keywordOper"], "or");
        assert_eq!(body["lang"], "eng");
        assert_eq!(body["eventsSortBy"], "date");
        assert_eq!(body["dateStart"], "2026-08-06");
        assert_eq!(body["dateEnd"], "2026-08-06");
        // 3x the target, capped at 15
        assert_eq!(body["eventsCount"], 15);
        assert_eq!(body["keyword"][0], "bitcoin mining");
    }

    #[test]
    fn test_window_crosses_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 0, 30, 0).unwrap();
        let query = SearchQuery {
            recency_minutes: 90,
            max_events: 5,
            style: QueryStyle::Mining,
        };

        let request = build_search_request("test-key", &query, now);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["dateStart"], "2026-08-05");
        assert_eq!(body["dateEnd"], "2026-08-06");
    }

    #[test]
    fn test_simple_request_caps_count_at_ten() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let query = SearchQuery {
            recency_minutes: 30,
            max_events: 8,
            style: QueryStyle::Simple("bitcoin".to_string()),
        };

        let request = build_search_request("test-key", &query, now);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["eventsCount"], 10);
        assert_eq!(body["keyword"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let query = SearchQuery {
            recency_minutes: 365 * 24 * 60,
            max_events: 5,
            style: QueryStyle::Mining,
        };

        let request = build_search_request("test-key", &query, now);
        let body = serde_json::to_value(&request).unwrap();

        // 30 days back from Aug 6, not a year
        assert_eq!(body["dateStart"], "2026-07-07");
    }

    // ==================== Fallback Tests ====================

    #[test]
    fn test_narrowed_clamps_window_and_simplifies() {
        let query = SearchQuery {
            recency_minutes: 90,
            max_events: 5,
            style: QueryStyle::Mining,
        };

        let narrowed = query.narrowed();

        assert_eq!(narrowed.recency_minutes, 30);
        assert_eq!(narrowed.max_events, 5);
        assert!(matches!(narrowed.style, QueryStyle::Simple(ref kw) if kw == "bitcoin"));
    }

    #[test]
    fn test_narrowed_keeps_small_window() {
        let query = SearchQuery {
            recency_minutes: 15,
            max_events: 5,
            style: QueryStyle::Simple("bitcoin".to_string()),
        };

        assert_eq!(query.narrowed().recency_minutes, 15);
    }

    #[test]
    fn test_timeout_tiers() {
        assert_eq!(timeout_for_window(30).as_secs(), 25);
        assert_eq!(timeout_for_window(90).as_secs(), 30);
        assert_eq!(timeout_for_window(240).as_secs(), 35);
        assert_eq!(timeout_for_window(480).as_secs(), 40);
        assert_eq!(timeout_for_window(2880).as_secs(), 45);
    }

    #[test]
    fn test_is_timeout_rejects_plain_errors() {
        let err = anyhow::anyhow!("EventRegistry API returned error: 500");
        assert!(!is_timeout(&err));
    }

    // ==================== Relevance Filter Tests ====================

    #[test]
    fn test_filter_keeps_mining_events() {
        let events = vec![event(
            "eng-1",
            "Bitcoin mining difficulty hits record",
            "Hashrate climbs as miners expand",
        )];

        let kept = filter_events(events, &QueryStyle::Mining, 5);

        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_filter_drops_events_without_mining_context() {
        let events = vec![event(
            "eng-1",
            "Bitcoin price rallies",
            "Traders react to ETF inflows",
        )];

        let kept = filter_events(events, &QueryStyle::Mining, 5);

        assert!(kept.is_empty());
    }

    #[test]
    fn test_filter_drops_other_crypto_dominated_events() {
        let events = vec![event(
            "eng-1",
            "Ethereum and Solana mining rigs repurposed",
            "Ethereum validators and solana nodes, with a bitcoin mining mention",
        )];

        let kept = filter_events(events, &QueryStyle::Mining, 5);

        assert!(kept.is_empty());
    }

    #[test]
    fn test_filter_respects_max_events() {
        let events: Vec<Event> = (0..10)
            .map(|i| {
                event(
                    &format!("eng-{}", i),
                    "Bitcoin mining update",
                    "Miners and hashrate",
                )
            })
            .collect();

        let kept = filter_events(events, &QueryStyle::Mining, 3);

        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].uri, "eng-0");
    }

    #[test]
    fn test_simple_filter_accepts_bitcoin_title_without_mining() {
        let events = vec![event("eng-1", "Bitcoin hits new high", "Markets move")];

        let kept = filter_events(events, &QueryStyle::Simple("bitcoin".to_string()), 5);

        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_simple_filter_matches_custom_keyword() {
        let events = vec![
            event("eng-1", "Halving economics", "Impact on miners"),
            event("eng-2", "Unrelated story", "Nothing here"),
        ];

        let kept = filter_events(events, &QueryStyle::Simple("halving".to_string()), 5);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].uri, "eng-1");
    }

    // ==================== Response Parsing Tests ====================

    #[test]
    fn test_search_response_parses_nested_lang_fields() {
        let json = r#"{
            "events": {
                "results": [
                    {
                        "uri": "eng-123",
                        "title": {"eng": "Bitcoin mining news"},
                        "summary": {"eng": "A summary"},
                        "eventDate": "2026-08-05"
                    }
                ]
            }
        }"#;

        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let results = response.events.unwrap().results;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].uri, "eng-123");
        assert_eq!(results[0].title.text(), "Bitcoin mining news");
        assert_eq!(results[0].event_date.as_deref(), Some("2026-08-05"));
    }

    #[test]
    fn test_search_response_tolerates_missing_events() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(response.events.is_none());
    }

    #[test]
    fn test_info_response_parses_event() {
        let json = r#"{
            "event": {
                "title": {"eng": "Mining pool consolidation"},
                "summary": {"eng": "Two large pools merge"},
                "concepts": [
                    {"label": {"eng": "Bitcoin"}},
                    {"label": {"eng": "Mining pool"}}
                ]
            }
        }"#;

        let response: InfoResponse = serde_json::from_str(json).unwrap();
        let info = response.event.unwrap();

        assert_eq!(info.title.text(), "Mining pool consolidation");
        assert_eq!(info.concepts.len(), 2);
        assert_eq!(info.concepts[1].label.text(), "Mining pool");
    }
}
