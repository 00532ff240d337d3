//! Polly: a small polling service.
//!
//! Users create polls with a handful of text options, others vote (signed in
//! or anonymously), and results are reported per option as rounded
//! percentages. Everything persistent goes through [`store::PollStore`].
//!
//! # Routes
//! - `GET  /health`
//! - `GET  /api/polls`, `POST /api/polls`
//! - `GET  /api/polls/{id}`, `PUT /api/polls/{id}`, `DELETE /api/polls/{id}`
//! - `POST /api/polls/{id}/vote`, `GET /api/polls/{id}/vote`
//! - `GET  /api/polls/{id}/results`
//! - `GET  /api/profile`

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod poll;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use std::sync::Arc;

use axum::Router;
use http::HeaderValue;

pub use auth::JwtVerifier;
pub use config::{Config, StoreBackend};
pub use state::AppState;
pub use store::{MemoryStore, PgStore, PollStore};

/// Router with CORS applied, ready to serve.
pub fn app(state: AppState, cors_origin: Option<&HeaderValue>) -> Router {
    routes::create_routes(state).layer(routes::cors_layer(cors_origin))
}

/// Builds the store selected by `config`, connecting and migrating Postgres if needed.
pub async fn build_store(config: &Config) -> Result<Arc<dyn PollStore>, Box<dyn std::error::Error>> {
    match config.store {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or(config::ConfigError::Missing("DATABASE_URL"))?;
            let pool = db::create_pool(url, config.max_connections).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}
