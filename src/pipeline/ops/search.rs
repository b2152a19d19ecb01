//! `search` (spec §4.6): delegates entirely to an external HTTP search
//! service, no browser session involved.

use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

use crate::errors::pipeline::PipelineError;

use super::{Execution, SearchParams};

#[derive(Debug, Deserialize)]
struct UpstreamResult {
    id: String,
    title: String,
    url: String,
    text: String,
    favicon: Option<String>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    results: Vec<UpstreamResult>,
}

pub async fn run(exec: Execution<'_>, params: &SearchParams) -> Result<JsonValue, PipelineError> {
    let base_url = exec
        .settings
        .search_api_url
        .as_deref()
        .ok_or_else(|| PipelineError::OpFailed("search API is not configured".into()))?;
    let secret = exec.settings.search_api_secret.as_deref().unwrap_or_default();
    let limit = params.limit.unwrap_or(10).min(20);

    let started = std::time::Instant::now();
    let response = exec
        .http
        .get(format!("{base_url}/search"))
        .bearer_auth(secret)
        .query(&[("q", params.query.as_str()), ("limit", &limit.to_string())])
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?
        .error_for_status()
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?
        .json::<UpstreamResponse>()
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;
    let search_time_ms = started.elapsed().as_millis();

    let results: Vec<JsonValue> = response
        .results
        .into_iter()
        .take(limit as usize)
        .map(|r| {
            json!({
                "id": r.url,
                "title": r.title,
                "url": r.url,
                "snippet": r.text,
                "favicon": r.favicon,
                "publishedDate": r.published_date,
            })
        })
        .collect();

    let total_results = results.len();
    Ok(json!({
        "results": results,
        "metadata": {
            "query": params.query,
            "totalResults": total_results,
            "searchTime": search_time_ms,
        },
    }))
}
