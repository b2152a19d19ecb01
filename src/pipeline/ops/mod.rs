//! Per-operation execution (spec §4.6). Each operation is data-driven: a
//! single [`run`] dispatcher keyed off [`OpKind`] and a static [`OpConfig`]
//! table, not a trait per operation (spec §9: "per-operation behavior is
//! data... not a polymorphic class hierarchy").

pub mod content;
pub mod json_extraction;
pub mod links;
pub mod markdown;
pub mod pdf;
pub mod scrape;
pub mod screenshot;
pub mod search;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::browser::{NavStrategy, Page, Viewport};
use crate::config::Settings;
use crate::errors::pipeline::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Screenshot,
    Markdown,
    Content,
    Links,
    Pdf,
    Scrape,
    Search,
    JsonExtraction,
}

impl OpKind {
    pub const ALL: [OpKind; 8] = [
        OpKind::Screenshot,
        OpKind::Markdown,
        OpKind::Content,
        OpKind::Links,
        OpKind::Pdf,
        OpKind::Scrape,
        OpKind::Search,
        OpKind::JsonExtraction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Screenshot => "screenshot",
            OpKind::Markdown => "markdown",
            OpKind::Content => "content",
            OpKind::Links => "links",
            OpKind::Pdf => "pdf",
            OpKind::Scrape => "scrape",
            OpKind::Search => "search",
            OpKind::JsonExtraction => "json_extraction",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        OpKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Requires a live browser session (`search` is a pure HTTP call).
    pub fn needs_browser(&self) -> bool {
        !matches!(self, OpKind::Search)
    }
}

/// Navigation/timeout/resource-block policy per op, spec §4.6 table.
#[derive(Debug, Clone, Copy)]
pub struct OpConfig {
    pub nav_strategy: NavStrategy,
    pub hard_timeout: Duration,
    pub block_resources: bool,
}

pub fn config_for(op: OpKind) -> OpConfig {
    match op {
        OpKind::Screenshot => OpConfig {
            nav_strategy: NavStrategy::Commit,
            hard_timeout: Duration::from_secs(10),
            block_resources: false,
        },
        OpKind::Content => OpConfig {
            nav_strategy: NavStrategy::DomContentLoaded,
            hard_timeout: Duration::from_secs(15),
            block_resources: true,
        },
        OpKind::Markdown => OpConfig {
            nav_strategy: NavStrategy::DomContentLoaded,
            hard_timeout: Duration::from_secs(15),
            block_resources: true,
        },
        OpKind::Links => OpConfig {
            nav_strategy: NavStrategy::DomContentLoaded,
            hard_timeout: Duration::from_secs(15),
            block_resources: true,
        },
        OpKind::Pdf => OpConfig {
            nav_strategy: NavStrategy::Commit,
            hard_timeout: Duration::from_secs(30),
            block_resources: false,
        },
        OpKind::Scrape => OpConfig {
            nav_strategy: NavStrategy::DomContentLoaded,
            hard_timeout: Duration::from_secs(20),
            block_resources: true,
        },
        OpKind::Search => OpConfig {
            nav_strategy: NavStrategy::DomContentLoaded,
            hard_timeout: Duration::from_secs(20),
            block_resources: true,
        },
        OpKind::JsonExtraction => OpConfig {
            nav_strategy: NavStrategy::DomContentLoaded,
            hard_timeout: Duration::from_secs(15),
            block_resources: true,
        },
    }
}

const BLOCKED_RESOURCE_KINDS: &[&str] = &["image", "media", "font", "stylesheet"];

/// Common page setup shared by every operation: harden fingerprinting
/// surface, set viewport, apply the op's resource-block policy.
pub async fn prepare_page(page: &dyn Page, op: OpKind, viewport: Option<Viewport>) -> Result<(), PipelineError> {
    page.harden()
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;
    page.set_viewport(viewport.unwrap_or(Viewport::DEFAULT))
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;
    if config_for(op).block_resources {
        page.block_resources(BLOCKED_RESOURCE_KINDS)
            .await
            .map_err(|e| PipelineError::OpFailed(e.to_string()))?;
    }
    Ok(())
}

pub async fn navigate(page: &dyn Page, url: &str, op: OpKind, wait_time: Option<u64>) -> Result<(), PipelineError> {
    let cfg = config_for(op);
    page.navigate(url, cfg.nav_strategy, cfg.hard_timeout)
        .await
        .map_err(|_| PipelineError::NavTimeout)?;
    if let Some(ms) = wait_time {
        page.wait(Duration::from_millis(ms)).await;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotParams {
    pub url: String,
    pub viewport: Option<Viewport>,
    pub full_page: Option<bool>,
    pub format: Option<String>,
    pub quality: Option<u8>,
    pub selector: Option<String>,
    pub wait_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownParams {
    pub url: String,
    pub wait_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentParams {
    pub url: String,
    pub wait_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinksParams {
    pub url: String,
    pub include_external: Option<bool>,
    pub visible_links_only: Option<bool>,
    pub wait_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfParams {
    pub url: String,
    pub format: Option<String>,
    pub wait_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeElement {
    pub selector: String,
    pub attributes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeParams {
    pub url: String,
    pub elements: Vec<ScrapeElement>,
    pub wait_time: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
    pub mobile: Option<bool>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonExtractionParams {
    pub url: String,
    pub wait_time: Option<u64>,
    pub response_type: Option<String>,
    pub prompt: Option<String>,
    pub response_format: Option<JsonValue>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone)]
pub enum OpParams {
    Screenshot(ScreenshotParams),
    Markdown(MarkdownParams),
    Content(ContentParams),
    Links(LinksParams),
    Pdf(PdfParams),
    Scrape(ScrapeParams),
    Search(SearchParams),
    JsonExtraction(JsonExtractionParams),
}

impl OpParams {
    pub fn kind(&self) -> OpKind {
        match self {
            OpParams::Screenshot(_) => OpKind::Screenshot,
            OpParams::Markdown(_) => OpKind::Markdown,
            OpParams::Content(_) => OpKind::Content,
            OpParams::Links(_) => OpKind::Links,
            OpParams::Pdf(_) => OpKind::Pdf,
            OpParams::Scrape(_) => OpKind::Scrape,
            OpParams::Search(_) => OpKind::Search,
            OpParams::JsonExtraction(_) => OpKind::JsonExtraction,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            OpParams::Screenshot(p) => Some(&p.url),
            OpParams::Markdown(p) => Some(&p.url),
            OpParams::Content(p) => Some(&p.url),
            OpParams::Links(p) => Some(&p.url),
            OpParams::Pdf(p) => Some(&p.url),
            OpParams::Scrape(p) => Some(&p.url),
            OpParams::Search(_) => None,
            OpParams::JsonExtraction(p) => Some(&p.url),
        }
    }

    /// Canonical JSON used both for validation errors and as the cache-key
    /// input (spec §3/§4.2): `userId` is deliberately not included here --
    /// callers add it before hashing if they need the stripped form.
    pub fn as_json(&self) -> JsonValue {
        let value = match self {
            OpParams::Screenshot(p) => serde_json::to_value(p),
            OpParams::Markdown(p) => serde_json::to_value(p),
            OpParams::Content(p) => serde_json::to_value(p),
            OpParams::Links(p) => serde_json::to_value(p),
            OpParams::Pdf(p) => serde_json::to_value(p),
            OpParams::Scrape(p) => serde_json::to_value(p),
            OpParams::Search(p) => serde_json::to_value(p),
            OpParams::JsonExtraction(p) => serde_json::to_value(p),
        };
        value.unwrap_or(JsonValue::Object(Map::new()))
    }

    pub fn from_json(kind: OpKind, mut value: JsonValue) -> Result<Self, PipelineError> {
        if let JsonValue::Object(map) = &mut value {
            map.remove("userId");
        }
        let invalid = |e: serde_json::Error| PipelineError::Validation(e.to_string());
        Ok(match kind {
            OpKind::Screenshot => OpParams::Screenshot(serde_json::from_value(value).map_err(invalid)?),
            OpKind::Markdown => OpParams::Markdown(serde_json::from_value(value).map_err(invalid)?),
            OpKind::Content => OpParams::Content(serde_json::from_value(value).map_err(invalid)?),
            OpKind::Links => OpParams::Links(serde_json::from_value(value).map_err(invalid)?),
            OpKind::Pdf => OpParams::Pdf(serde_json::from_value(value).map_err(invalid)?),
            OpKind::Scrape => OpParams::Scrape(serde_json::from_value(value).map_err(invalid)?),
            OpKind::Search => OpParams::Search(serde_json::from_value(value).map_err(invalid)?),
            OpKind::JsonExtraction => OpParams::JsonExtraction(serde_json::from_value(value).map_err(invalid)?),
        })
    }
}

/// `host`-equality link classification, spec §4.6: lowercase, strip a
/// leading `www.`; anything that doesn't parse as an absolute URL counts as
/// internal (relative links).
pub fn normalize_host(raw: &str) -> Option<String> {
    let without_scheme = raw.split("://").nth(1)?;
    let host = without_scheme.split(['/', '?', '#']).next()?;
    let host = host.split('@').next_back()?;
    let host = host.rsplit(':').next_back().unwrap_or(host);
    let lower = host.to_lowercase();
    Some(lower.strip_prefix("www.").map(str::to_string).unwrap_or(lower))
}

pub fn is_internal(href: &str, base_host: &str) -> bool {
    match normalize_host(href) {
        Some(host) => host == base_host,
        None => true,
    }
}

/// Run an operation against a freshly opened page. `external` carries the
/// collaborators that aren't the browser backend (search API, LLM) so the
/// pipeline can construct this once per process.
#[derive(Clone, Copy)]
pub struct Execution<'a> {
    pub page: Option<&'a dyn Page>,
    pub settings: &'a Settings,
    pub http: &'a reqwest::Client,
    pub user_id: Uuid,
}

impl<'a> Execution<'a> {
    /// Every op but `search` runs against a live page; this is the one place
    /// that assumption is spelled out.
    pub fn page(&self) -> &'a dyn Page {
        self.page.expect("browser op executed without an open page")
    }
}

pub async fn run(exec: Execution<'_>, params: &OpParams) -> Result<JsonValue, PipelineError> {
    match params {
        OpParams::Screenshot(p) => screenshot::run(exec, p).await,
        OpParams::Markdown(p) => markdown::run(exec, p).await,
        OpParams::Content(p) => content::run(exec, p).await,
        OpParams::Links(p) => links::run(exec, p).await,
        OpParams::Pdf(p) => pdf::run(exec, p).await,
        OpParams::Scrape(p) => scrape::run(exec, p).await,
        OpParams::Search(p) => search::run(exec, p).await,
        OpParams::JsonExtraction(p) => json_extraction::run(exec, p).await,
    }
}
