use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::services::model_client::{ModelClient, Unavailable};

const SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";
pub(crate) const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_QUERIES_PER_ROUND: usize = 3;

#[derive(Debug, Error)]
pub(crate) enum SearchError {
    #[error("search query must not be empty")]
    EmptyQuery,
    #[error("search request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct SearchResult {
    pub(crate) title: String,
    pub(crate) snippet: String,
    pub(crate) url: String,
    pub(crate) source: String,
}

/// DuckDuckGo Instant Answer lookup. Best effort: an empty result list is a
/// valid outcome, only transport problems are errors.
pub(crate) async fn search_internet(
    http: &reqwest::Client,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    let response = http
        .get(SEARCH_ENDPOINT)
        .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
        .send()
        .await
        .map_err(|err| SearchError::Request(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Request(format!("upstream status {status}")));
    }

    let body: Value =
        response.json().await.map_err(|err| SearchError::Request(err.to_string()))?;

    Ok(parse_duckduckgo(&body, max_results))
}

fn parse_duckduckgo(body: &Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = body.get("AbstractText").and_then(Value::as_str).unwrap_or("");
    if !abstract_text.is_empty() {
        results.push(SearchResult {
            title: body
                .get("Heading")
                .and_then(Value::as_str)
                .unwrap_or("Instant answer")
                .to_string(),
            snippet: abstract_text.to_string(),
            url: body.get("AbstractURL").and_then(Value::as_str).unwrap_or("").to_string(),
            source: "duckduckgo".to_string(),
        });
    }

    let mut topics: Vec<&Value> = Vec::new();
    if let Some(related) = body.get("RelatedTopics").and_then(Value::as_array) {
        for entry in related {
            // Category entries nest one more level of topics.
            if let Some(nested) = entry.get("Topics").and_then(Value::as_array) {
                topics.extend(nested.iter());
            } else {
                topics.push(entry);
            }
        }
    }

    for topic in topics {
        if results.len() >= max_results {
            break;
        }
        let Some(text) = topic.get("Text").and_then(Value::as_str).filter(|t| !t.is_empty())
        else {
            continue;
        };
        let url = topic.get("FirstURL").and_then(Value::as_str).unwrap_or("");
        let title: String = text.chars().take(80).collect();
        results.push(SearchResult {
            title,
            snippet: text.to_string(),
            url: url.to_string(),
            source: "duckduckgo".to_string(),
        });
    }

    results.truncate(max_results);
    results
}

fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| format!("- {} ({}): {}", result.title, result.url, result.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Structured-JSON completion that may run one research round first: when the
/// first reply asks for `search_queries`, the results are folded into a
/// follow-up prompt. Search failures degrade to the plain completion, never
/// to `Unavailable`.
pub(crate) async fn request_ai_json_with_web_search(
    model: &ModelClient,
    system: &str,
    user: &str,
    max_rounds: usize,
) -> Result<Value, Unavailable> {
    let mut prompt = user.to_string();

    for round in 0..max_rounds.max(1) {
        let value = model.complete_json(system, &prompt, 0.4).await?;

        let queries: Vec<String> = value
            .get("search_queries")
            .and_then(Value::as_array)
            .map(|queries| {
                queries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .take(MAX_QUERIES_PER_ROUND)
                    .collect()
            })
            .unwrap_or_default();

        if queries.is_empty() || round + 1 >= max_rounds {
            return Ok(value);
        }

        let mut findings = Vec::new();
        for query in &queries {
            match search_internet(model.http(), query, DEFAULT_MAX_RESULTS).await {
                Ok(results) => findings.extend(results),
                Err(err) => {
                    tracing::warn!(error = %err, query = %query, "Web research lookup failed");
                }
            }
        }

        let reason = value.get("reason").and_then(Value::as_str).unwrap_or("");
        tracing::info!(
            queries = queries.len(),
            findings = findings.len(),
            reason = %reason,
            "Assistant requested web research"
        );

        prompt = format!(
            "{user}\n\nWeb research results you requested:\n{}",
            if findings.is_empty() { "- no results found".to_string() } else { format_results(&findings) }
        );
    }

    model.complete_json(system, &prompt, 0.4).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let http = reqwest::Client::new();
        let err = search_internet(&http, "   ", 5).await.expect_err("blank query");
        assert!(matches!(err, SearchError::EmptyQuery));
    }

    #[test]
    fn duckduckgo_parsing_flattens_nested_topics() {
        let body = json!({
            "Heading": "ESL",
            "AbstractText": "English as a second language.",
            "AbstractURL": "https://example.com/esl",
            "RelatedTopics": [
                {"Text": "Modern ESL Trends", "FirstURL": "https://example.com/trends"},
                {"Topics": [
                    {"Text": "Cultural topics in 2024", "FirstURL": "https://example.com/cultural"}
                ]}
            ]
        });

        let results = parse_duckduckgo(&body, 5);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "ESL");
        assert_eq!(results[1].snippet, "Modern ESL Trends");
        assert_eq!(results[2].url, "https://example.com/cultural");
        assert!(results.iter().all(|result| result.source == "duckduckgo"));
    }

    #[test]
    fn duckduckgo_parsing_respects_the_result_cap() {
        let body = json!({
            "RelatedTopics": [
                {"Text": "one", "FirstURL": "https://a"},
                {"Text": "two", "FirstURL": "https://b"},
                {"Text": "three", "FirstURL": "https://c"}
            ]
        });
        assert_eq!(parse_duckduckgo(&body, 2).len(), 2);
    }

    #[test]
    fn research_prompt_formatting() {
        let results = vec![SearchResult {
            title: "Modern ESL Trends".to_string(),
            snippet: "Teachers emphasize cultural topics.".to_string(),
            url: "https://example.com/esl".to_string(),
            source: "duckduckgo".to_string(),
        }];
        let block = format_results(&results);
        assert!(block.contains("Modern ESL Trends"));
        assert!(block.contains("https://example.com/esl"));
    }
}
