//! Thin HTTP surface over the pipeline/ledger/monitoring engine. Shapes only
//! -- no OpenAPI annotation, no auth implementation (spec §1 Non-goals:
//! "HTTP routing ... is an external-collaborator concern"). The caller's
//! user id is taken from an `X-User-Id` header, standing in for whatever
//! auth middleware a deployment puts in front of this crate.

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::errors::{ApiError, ErrorCode};
use crate::monitoring::MonitoringConfigInput;
use crate::pipeline::ops::OpKind;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(run_screenshot)
            .service(run_markdown)
            .service(run_content)
            .service(run_links)
            .service(run_pdf)
            .service(run_scrape)
            .service(run_search)
            .service(run_json_extraction),
    )
    .service(
        web::scope("/monitoring")
            .service(monitoring_start)
            .service(monitoring_stop)
            .service(monitoring_status)
            .service(monitoring_results)
            .service(monitoring_stats)
            .service(monitoring_test),
    );
}

fn user_id(req: &HttpRequest) -> Result<Uuid, ApiError> {
    req.headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| ApiError::new("missing or invalid X-User-Id header", ErrorCode::AuthRequired))
}

macro_rules! op_route {
    ($name:ident, $path:literal, $kind:expr) => {
        #[post($path)]
        async fn $name(
            req: HttpRequest,
            state: web::Data<AppState>,
            body: web::Json<serde_json::Value>,
        ) -> Result<HttpResponse, ApiError> {
            let uid = user_id(&req)?;
            let response = state.pipeline.execute(uid, $kind, body.into_inner()).await;
            Ok(HttpResponse::Ok().json(response))
        }
    };
}

op_route!(run_screenshot, "/screenshot", OpKind::Screenshot);
op_route!(run_markdown, "/markdown", OpKind::Markdown);
op_route!(run_content, "/content", OpKind::Content);
op_route!(run_links, "/links", OpKind::Links);
op_route!(run_pdf, "/pdf", OpKind::Pdf);
op_route!(run_scrape, "/scrape", OpKind::Scrape);
op_route!(run_search, "/search", OpKind::Search);
op_route!(run_json_extraction, "/json-extraction", OpKind::JsonExtraction);

#[derive(Debug, Deserialize, Default)]
struct StartMonitoringBody {
    interval_ms: Option<u64>,
    per_test_timeout_ms: Option<u64>,
    enabled_endpoints: Option<Vec<String>>,
}

#[post("/start")]
async fn monitoring_start(
    state: web::Data<AppState>,
    body: web::Json<StartMonitoringBody>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let input = MonitoringConfigInput {
        interval: body.interval_ms.map(std::time::Duration::from_millis),
        per_test_timeout: body.per_test_timeout_ms.map(std::time::Duration::from_millis),
        enabled_endpoints: body
            .enabled_endpoints
            .map(|names| names.iter().filter_map(|n| OpKind::from_str(n)).collect()),
    };
    state.monitoring.start(input).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[post("/stop")]
async fn monitoring_stop(state: web::Data<AppState>) -> HttpResponse {
    state.monitoring.stop().await;
    HttpResponse::Ok().json(serde_json::json!({ "success": true }))
}

#[get("/status")]
async fn monitoring_status(state: web::Data<AppState>) -> HttpResponse {
    let status = state.monitoring.status().await;
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": status }))
}

#[derive(Debug, Deserialize, Default)]
struct ResultsQuery {
    endpoint: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    success_only: Option<bool>,
}

#[get("/results")]
async fn monitoring_results(
    state: web::Data<AppState>,
    query: web::Query<ResultsQuery>,
) -> Result<HttpResponse, ApiError> {
    let filter = crate::database::monitoring::ResultsFilter {
        endpoint: query.endpoint.clone(),
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
        success_only: query.success_only,
        since: None,
    };
    let results = state.monitoring.results(filter).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": results })))
}

#[get("/stats")]
async fn monitoring_stats(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stats = state.monitoring.stats().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": stats })))
}

#[post("/test")]
async fn monitoring_test(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let session = state.monitoring.run_once().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": session })))
}
