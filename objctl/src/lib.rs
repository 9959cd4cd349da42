//! # objctl: Management Gateway for S3-Compatible Object Storage
//!
//! `objctl` sits in front of an S3-compatible storage backend and manages the
//! metadata around stored objects: who may act on them, how their versions
//! are tagged, and which identities have been seen. Byte transfer itself is
//! left to the backend; the gateway's job is deciding *who* is calling and
//! *what* they may touch, and keeping the relational metadata consistent
//! while they do.
//!
//! ## Request Flow
//!
//! Every request passes through three stages before reaching a handler:
//!
//! 1. **Authentication** ([`auth::middleware::authenticate`]) resolves the
//!    `Authorization` header into an immutable identity: a shared-secret
//!    `Basic` service account, an OIDC `Bearer` user, or anonymous. Bearer
//!    tokens are verified either locally against a configured signing key or
//!    remotely via the provider's introspection endpoint, and the carrying
//!    user is reconciled into the database on every login.
//! 2. **Resource loading** ([`auth::authorization::current_object`]) resolves
//!    the object addressed by the request path into a merged view of its
//!    persisted metadata and a live head probe against the storage backend.
//!    Failures here are deliberately swallowed: a request for an unloadable
//!    object simply proceeds without one.
//! 3. **Permission gating** ([`auth::authorization::check_permission`])
//!    denies the request unless a current object was loaded and the caller
//!    holds the required permission on it.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL for all persistence. The **database
//! layer** ([`db`]) uses repository structs over `&mut PgConnection`, so any
//! multi-statement mutation can run either in a repository-owned transaction
//! or inside a caller-supplied one. The **storage layer** ([`storage`])
//! wraps the AWS SDK behind a small probing trait so tests can substitute an
//! in-memory backend.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use objctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = objctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     objctl::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod storage;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::{
    auth::{
        authorization::{check_permission, current_object},
        middleware::authenticate,
        verifier::TokenVerifier,
    },
    storage::{S3Storage, StorageProber},
    types::Permission,
};
use axum::{
    Router,
    extract::{Request, State},
    middleware::{Next, from_fn_with_state},
    routing::{get, put},
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, instrument};

pub use types::{ObjectId, TagId, UserId, VersionId};

/// Application state shared across all request handlers.
///
/// - `db`: PostgreSQL connection pool
/// - `config`: process-wide, read-only configuration loaded at startup
/// - `storage`: storage-backend prober for head lookups
/// - `verifier`: bearer-token verification strategy; present iff OIDC is
///   configured, selected once at startup
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub storage: Arc<dyn StorageProber>,
    pub verifier: Option<Arc<TokenVerifier>>,
}

/// Get the objctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Build the application router with all endpoints and middleware.
///
/// Per-route permission gates sit closest to the handlers; the resource
/// loader and authentication middleware wrap the whole API surface.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/objects/{object_id}",
            get(api::handlers::objects::read_object).route_layer(from_fn_with_state(
                state.clone(),
                |state: State<AppState>, request: Request, next: Next| {
                    check_permission(Permission::Read, state, request, next)
                },
            )),
        )
        .route(
            "/objects/{object_id}/head",
            get(api::handlers::objects::head_object).route_layer(from_fn_with_state(
                state.clone(),
                |state: State<AppState>, request: Request, next: Next| {
                    check_permission(Permission::Read, state, request, next)
                },
            )),
        )
        .route(
            "/objects/{object_id}/tags",
            put(api::handlers::objects::replace_tags).route_layer(from_fn_with_state(
                state.clone(),
                |state: State<AppState>, request: Request, next: Next| {
                    check_permission(Permission::Update, state, request, next)
                },
            )),
        )
        .layer(from_fn_with_state(state.clone(), current_object))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Main application struct that owns all resources and lifecycle.
///
/// [`Application::new`] connects to the database, runs migrations and builds
/// the router; [`Application::serve`] binds the listener and runs until the
/// shutdown future resolves.
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = PgPool::connect(&config.database.url).await?;
        migrator().run(&pool).await?;

        let storage: Arc<dyn StorageProber> = Arc::new(S3Storage::from_config(&config.storage).await);

        // Verification strategy is fixed at startup from configuration
        let verifier = match &config.auth.oidc {
            Some(oidc) => Some(Arc::new(TokenVerifier::from_config(oidc)?)),
            None => None,
        };

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .storage(storage)
            .maybe_verifier(verifier)
            .build();

        let router = build_router(&state);

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("objctl listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
