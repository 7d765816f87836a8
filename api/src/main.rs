mod answers;
mod auth;
mod collections;
mod config;
mod db;
mod error;
mod pagination;
mod pokedex;
mod questions;
mod tags;
mod tasks;
#[cfg(test)]
mod test_util;
mod votes;

use std::{sync::Arc, time::Duration};

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tokio::{net::TcpListener, signal, sync::RwLock};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub db: DbPool,
    pub jwt_secret: String,
    pub http: reqwest::Client,
    pub pokeapi_url: String,
    pub types_cache: Arc<RwLock<Option<pokedex::CachedTypes>>>,
}

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = config::Config::load();

    let manager = r2d2_sqlite::SqliteConnectionManager::file(&cfg.database_url);
    let pool = r2d2::Pool::new(manager).expect("Failed to create DB pool");

    db::run_migrations(&pool).expect("Failed to run migrations");

    // One outbound client for the whole process; the timeout is the only
    // bound on third-party calls, so it is explicit and configured.
    let http = reqwest::Client::builder()
        .user_agent("quibble-api")
        .timeout(Duration::from_secs(cfg.upstream_timeout_secs))
        .build()
        .expect("Failed to build HTTP client");

    let state = AppState {
        db: pool,
        jwt_secret: cfg.jwt_secret.clone(),
        http,
        pokeapi_url: cfg.pokeapi_url.clone(),
        types_cache: Arc::new(RwLock::new(None)),
    };

    let cors = CorsLayer::new()
        .allow_origin(
            cfg.cors_origin
                .parse::<axum::http::HeaderValue>()
                .expect("Invalid CORS_ORIGIN"),
        )
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any());

    let app = Router::new()
        .route("/api/health", get(|| async { "ok" }))
        // Auth
        .route("/api/auth/token", post(auth::issue_token))
        .route("/api/auth/me", get(auth::me))
        // Questions
        .route(
            "/api/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route("/api/questions/hot", get(questions::hot_questions))
        .route(
            "/api/questions/{id}",
            get(questions::get_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )
        .route("/api/questions/{id}/views", post(questions::increment_views))
        // Answers
        .route(
            "/api/questions/{id}/answers",
            get(answers::list_answers).post(answers::create_answer),
        )
        .route("/api/answers/{id}", delete(answers::delete_answer))
        // Tags
        .route("/api/tags", get(tags::list_tags))
        .route("/api/tags/popular", get(tags::popular_tags))
        .route("/api/tags/{id}/questions", get(tags::tag_questions))
        // Votes
        .route("/api/votes", get(votes::get_votes).post(votes::cast_vote))
        // Collections
        .route("/api/collections", get(collections::list_saved))
        .route("/api/collections/toggle", post(collections::toggle_save))
        .route("/api/collections/status", get(collections::saved_status))
        // Tasks
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/api/tasks/top", get(tasks::top_tasks))
        .route(
            "/api/tasks/{id}",
            put(tasks::update_task).delete(tasks::delete_task),
        )
        // Pokédex
        .route("/api/pokedex/pokemon", get(pokedex::list_pokemon))
        .route("/api/pokedex/types", get(pokedex::list_types))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    info!("API server listening on {addr}");
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
