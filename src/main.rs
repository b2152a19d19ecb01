use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use sqlx::postgres::PgPool;

use weblinq_core::browser::fake::FakeBrowserBackend;
use weblinq_core::config::Settings;
use weblinq_core::{AppState, routes};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let server_url = env::var("SERVER_URL").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");

    let pool = PgPool::connect(&database_url).await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations completed successfully");

    let settings = Settings::from_env();

    // No CDP-speaking rendering engine is wired up here (spec §1 Non-goals:
    // "No rendering-engine implementation"); FakeBrowserBackend stands in as
    // the BrowserBackend collaborator a real deployment would replace.
    let backend: Arc<dyn weblinq_core::browser::BrowserBackend> = Arc::new(FakeBrowserBackend::default());

    let state = AppState::new(pool, settings, backend);
    state.bootstrap().await;
    let state = web::Data::new(state);

    let http_server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(["GET", "POST"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind(&server_url)?
    .run();

    http_server.await?;

    Ok(())
}
