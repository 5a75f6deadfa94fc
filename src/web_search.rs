//! Web search: the decision heuristic and the search provider.
//!
//! [`needs_search`] is a keyword match deciding whether a query likely
//! wants fresh information. [`DuckDuckGoSearch`] queries the DuckDuckGo
//! Instant Answer API and normalizes hits into [`SearchResult`]s.
//!
//! The Instant Answer API is not a full web index. It answers entity and
//! definition lookups ("who is", "what is") but returns nothing for most
//! news-style or long-tail questions, in which case the prompt simply has
//! no search block. A provider backed by a full results page can be
//! swapped in through the [`WebSearch`] trait.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::models::SearchResult;

/// Phrases that suggest a query needs current information.
///
/// Plain substring matching means "when" and "now" also fire inside
/// unrelated words ("know"). That imprecision is accepted.
pub const SEARCH_TRIGGERS: &[&str] = &[
    "latest", "current", "recent", "news", "today", "now", "what is", "who is", "where is", "when",
];

/// Returns true if the lowercased query contains any trigger phrase.
pub fn needs_search(query: &str) -> bool {
    let lowered = query.to_lowercase();
    SEARCH_TRIGGERS.iter().any(|t| lowered.contains(t))
}

/// A web-search provider.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Returns at most `max_results` hits for `query`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Search provider that never returns results. Used when search is disabled.
pub struct NoSearch;

#[async_trait]
impl WebSearch for NoSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }
}

/// DuckDuckGo Instant Answer API client.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("efiko/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("DuckDuckGo API error {}: {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        Ok(parse_duckduckgo_response(&json, max_results))
    }
}

/// Normalizes an Instant Answer payload: the abstract first, then the
/// direct answer and dictionary definition, then direct results, then
/// related topics (nested topic groups flattened).
fn parse_duckduckgo_response(json: &serde_json::Value, max_results: usize) -> Vec<SearchResult> {
    let mut out = Vec::new();
    let field = |key: &str| json.get(key).and_then(|v| v.as_str()).unwrap_or("");

    let abstract_text = json
        .get("AbstractText")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if !abstract_text.is_empty() {
        out.push(SearchResult {
            title: json
                .get("Heading")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            link: json
                .get("AbstractURL")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    let answer = field("Answer");
    if !answer.is_empty() {
        out.push(SearchResult {
            title: format!("{} (answer)", field("AnswerType")).trim_start().to_string(),
            link: String::new(),
            snippet: answer.to_string(),
        });
    }

    let definition = field("Definition");
    if !definition.is_empty() {
        out.push(SearchResult {
            title: field("DefinitionSource").to_string(),
            link: field("DefinitionURL").to_string(),
            snippet: definition.to_string(),
        });
    }

    for key in ["Results", "RelatedTopics"] {
        if let Some(items) = json.get(key).and_then(|v| v.as_array()) {
            collect_topics(items, &mut out);
        }
    }

    out.truncate(max_results);
    out
}

fn collect_topics(items: &[serde_json::Value], out: &mut Vec<SearchResult>) {
    for item in items {
        if let Some(nested) = item.get("Topics").and_then(|v| v.as_array()) {
            collect_topics(nested, out);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let link = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or(text);
        out.push(SearchResult {
            title: title.to_string(),
            link: link.to_string(),
            snippet: text.to_string(),
        });
    }
}
