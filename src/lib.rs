pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::{Config, CorsConfig, StoreConfig};
use crate::database::Database;
use crate::services::identity::{FirebaseVerifier, IdentityError, TokenVerifier};
use crate::store::{DocumentStore, MemoryDocumentStore, PgDocumentStore};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to connect to the database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to run migrations: {0}")]
    Migrations(#[from] sqlx::migrate::MigrateError),
    #[error("failed to set up the identity client: {0}")]
    Identity(#[from] IdentityError),
}

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn TokenVerifier>) -> Self {
        Self { store, identity }
    }

    /// Connects the configured store (running migrations for Postgres) and
    /// the identity provider client.
    pub async fn from_config(config: &Config) -> Result<Arc<Self>, StartupError> {
        let store: Arc<dyn DocumentStore> = match &config.store {
            StoreConfig::Postgres { url, pool_size } => {
                let db = Database::connect(url, *pool_size).await?;
                db.migrate().await?;
                Arc::new(PgDocumentStore::new(&db))
            }
            StoreConfig::Memory => {
                warn!("Using the in-memory store, data will not survive a restart");
                Arc::new(MemoryDocumentStore::new())
            }
        };

        let identity = FirebaseVerifier::from_config(&config.identity)?;
        info!("Verifying tokens for project {}", config.identity.project_id);

        Ok(Arc::new(Self::new(store, Arc::new(identity))))
    }
}

/// The full HTTP surface, ready to serve.
pub fn app(state: Arc<AppState>, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(|| async { "Sports club booking server is running" }))
        .route("/health", get(health))
        .merge(controllers::routes())
        .with_state(state)
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Database unavailable")
        }
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}
