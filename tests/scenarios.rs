//! End-to-end scenarios against a real (ephemeral, per-test) Postgres
//! database via `sqlx::test` -- the pool manager and ledger both persist
//! through `PgPool`, so these can't be exercised as pure-function unit tests.
//! Requires `DATABASE_URL` to point at a server `sqlx::test` can create
//! scratch databases on; migrations under `migrations/` are applied
//! automatically.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use weblinq_core::browser::fake::{FakeBrowserBackend, FakePageFixture};
use weblinq_core::browser::{BrowserBackend, RawLink};
use weblinq_core::cache::ArtifactCache;
use weblinq_core::config::Settings;
use weblinq_core::ledger::Ledger;
use weblinq_core::models::user::Plan;
use weblinq_core::pipeline::Pipeline;
use weblinq_core::pipeline::ops::OpKind;
use weblinq_core::pool::PoolManager;

fn test_settings() -> Settings {
    Settings {
        max_workers: 10,
        queue_max_wait: Duration::from_millis(15_000),
        browser_creation_delay: Duration::from_millis(1),
        health_check_interval: Duration::from_secs(3600),
        refresh_threshold: Duration::from_secs(3600),
        polite_cleanup_timeout: Duration::from_millis(500),
        initial_free_credits: 1000,
        initial_pro_credits: 5000,
        monthly_pro_refill: 5000,
        cache_bypass_in_development: false,
        search_api_url: None,
        search_api_secret: None,
        gemini_api_key: None,
        cloudflare_ai_model: None,
        monitoring_api_base_url: None,
        monitoring_api_key: None,
    }
}

async fn seed_user(pool: &PgPool, plan: Plan) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("{id}@example.invalid"))
        .execute(pool)
        .await
        .unwrap();
    if plan == Plan::Pro {
        sqlx::query(
            "INSERT INTO credit_balances (user_id, balance, plan, last_refill) VALUES ($1, 100, 'pro', NULL)",
        )
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    }
    id
}

fn links_fixture() -> FakePageFixture {
    FakePageFixture {
        html: "<html></html>".to_string(),
        links: vec![
            RawLink { href: "https://example.com/about".into(), text: "About".into(), visible: true },
            RawLink { href: "https://example.com/contact".into(), text: "Contact".into(), visible: true },
            RawLink { href: "/pricing".into(), text: "Pricing".into(), visible: true },
            RawLink { href: "https://other.org/page".into(), text: "Other".into(), visible: true },
            RawLink { href: "https://another.net/page".into(), text: "Another".into(), visible: true },
        ],
    }
}

struct Harness {
    pipeline: Pipeline,
    ledger: Ledger,
    backend: Arc<FakeBrowserBackend>,
}

fn build_harness(pool: PgPool, settings: Settings) -> Harness {
    let backend = Arc::new(FakeBrowserBackend::default());
    let pool_manager = PoolManager::new(backend.clone() as Arc<dyn BrowserBackend>, settings.clone(), pool.clone());
    let ledger = Ledger::new(pool.clone());
    let cache = ArtifactCache::new(pool.clone());
    let pipeline = Pipeline::new(pool_manager, Arc::new(Ledger::new(pool.clone())), cache, pool, settings);
    Harness { pipeline, ledger, backend }
}

/// S1 -- cache miss, deduct.
#[sqlx::test]
async fn s1_cache_miss_deducts_credits(pool: PgPool) {
    let user_id = seed_user(&pool, Plan::Free).await;
    let settings = test_settings();
    let harness = build_harness(pool.clone(), settings.clone());
    harness.ledger.assign_initial(user_id, settings.initial_free_credits).await.unwrap();
    harness.backend.set_fixture("https://example.com", links_fixture());

    let response = harness
        .pipeline
        .execute(user_id, OpKind::Links, json!({"url": "https://example.com", "includeExternal": false}))
        .await;

    assert!(response.success);
    assert!(!response.from_cache);
    assert_eq!(response.credits_cost, 1);
    assert_eq!(response.credits_remaining, 999);
    let data = response.data.unwrap();
    assert_eq!(data["links"].as_array().unwrap().len(), 3);
    assert_eq!(data["metadata"]["internalLinks"], 3);
    assert_eq!(data["metadata"]["externalLinks"], 2);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let balance = harness.ledger.get_balance(user_id).await.unwrap();
    assert_eq!(balance.balance, 999);

    let txns = weblinq_core::ledger::list_transactions(&pool, user_id).await.unwrap();
    assert_eq!(txns.iter().filter(|t| t.reason == "op:links").count(), 1);
}

/// S2 -- cache hit on repeat within the TTL.
#[sqlx::test]
async fn s2_cache_hit_still_bills(pool: PgPool) {
    let user_id = seed_user(&pool, Plan::Free).await;
    let settings = test_settings();
    let harness = build_harness(pool.clone(), settings.clone());
    harness.ledger.assign_initial(user_id, settings.initial_free_credits).await.unwrap();
    harness.backend.set_fixture("https://example.com", links_fixture());

    let params = json!({"url": "https://example.com", "includeExternal": false});
    let first = harness.pipeline.execute(user_id, OpKind::Links, params.clone()).await;
    assert!(!first.from_cache);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = harness.pipeline.execute(user_id, OpKind::Links, params).await;
    assert!(second.from_cache);
    assert_eq!(second.credits_cost, 1);
    assert_eq!(second.credits_remaining, 998);
    assert_eq!(second.data, first.data);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let txns = weblinq_core::ledger::list_transactions(&pool, user_id).await.unwrap();
    assert_eq!(txns.iter().filter(|t| t.reason == "op:links").count(), 2);
}

/// S3 -- insufficient credits.
#[sqlx::test]
async fn s3_insufficient_credits_rejects(pool: PgPool) {
    let user_id = seed_user(&pool, Plan::Free).await;
    let settings = test_settings();
    let harness = build_harness(pool.clone(), settings.clone());
    harness.ledger.assign_initial(user_id, 0).await.unwrap();
    harness.backend.set_fixture("https://example.com", links_fixture());

    let response = harness
        .pipeline
        .execute(user_id, OpKind::Links, json!({"url": "https://example.com", "includeExternal": false}))
        .await;

    assert!(!response.success);
    assert_eq!(response.credits_cost, 1);
    assert_eq!(response.credits_remaining, 0);
    assert_eq!(response.error.unwrap().code, weblinq_core::errors::ErrorCode::InsufficientCredits);

    let txns = weblinq_core::ledger::list_transactions(&pool, user_id).await.unwrap();
    assert!(txns.is_empty());
}

/// S4 -- pool saturation, FIFO fulfillment, and queue timeout.
#[sqlx::test]
async fn s4_pool_saturation_fifo_and_timeout(pool: PgPool) {
    let mut settings = test_settings();
    settings.max_workers = 1;
    settings.queue_max_wait = Duration::from_millis(50);
    let backend = Arc::new(FakeBrowserBackend::default());
    let pool_manager = PoolManager::new(backend as Arc<dyn BrowserBackend>, settings, pool);

    let (first_worker, _) = pool_manager.acquire().await.unwrap();

    let pm1 = pool_manager.clone();
    let waiter_a = tokio::spawn(async move { pm1.acquire().await });
    let pm2 = pool_manager.clone();
    let waiter_b = tokio::spawn(async move { pm2.acquire().await });

    tokio::time::sleep(Duration::from_millis(5)).await;
    pool_manager
        .report_status(&first_worker, weblinq_core::models::worker::WorkerStatus::Idle, None)
        .await;

    let a = waiter_a.await.unwrap();
    assert!(a.is_ok(), "older waiter should be fulfilled by the freed worker");

    let b = waiter_b.await.unwrap();
    assert!(matches!(b, Err(e) if matches!(e, weblinq_core::errors::pool::PoolError::PoolExhausted)));
}

/// S5 -- monthly refill idempotence on `orderId`.
#[sqlx::test]
async fn s5_refill_is_idempotent_per_order(pool: PgPool) {
    let user_id = seed_user(&pool, Plan::Pro).await;
    let ledger = Ledger::new(pool.clone());
    let subscription_id = Uuid::new_v4();

    let first = ledger.apply_monthly_refill(user_id, subscription_id, "order1", 5000).await.unwrap();
    assert_eq!(first.balance, 5100);

    let second = ledger.apply_monthly_refill(user_id, subscription_id, "order1", 5000).await;
    assert!(second.is_err());
    let third = ledger.apply_monthly_refill(user_id, subscription_id, "order1", 5000).await;
    assert!(third.is_err());

    let balance = ledger.get_balance(user_id).await.unwrap();
    assert_eq!(balance.balance, 5100);

    let txns = weblinq_core::ledger::list_transactions(&pool, user_id).await.unwrap();
    assert_eq!(txns.iter().filter(|t| t.reason == "monthly_refill").count(), 1);
}

/// S6 -- blue-green refresh: an aged session is closed and replaced without
/// an in-flight caller ever observing the stale session id.
#[sqlx::test]
async fn s6_aged_worker_refreshes_and_closes_old_session(pool: PgPool) {
    let mut settings = test_settings();
    settings.refresh_threshold = Duration::from_millis(10);
    settings.health_check_interval = Duration::from_millis(20);
    settings.polite_cleanup_timeout = Duration::from_millis(200);
    let backend = Arc::new(FakeBrowserBackend::default());
    let pool_manager = PoolManager::new(backend.clone() as Arc<dyn BrowserBackend>, settings, pool);

    let (worker_id, old_session) = pool_manager.acquire().await.unwrap();
    pool_manager
        .report_status(&worker_id, weblinq_core::models::worker::WorkerStatus::Idle, None)
        .await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(backend.was_closed(&old_session), "old session must be closed after the refresh threshold elapses");
}
