//! hostpool-api — REST API for the resource pool.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/match` | Match (and optionally commit) hosts |
//! | POST | `/api/v1/reservations/{id}/commit` | Mark a held selection `Used` |
//! | POST | `/api/v1/reservations/{id}/release` | Return a held selection to `Unused` |
//! | POST | `/api/v1/import` | Import hosts from the external catalogs |
//! | GET | `/api/v1/hosts?status=` | List hosts, optionally by status |
//! | GET | `/api/v1/hosts/{id}` | Get one host |
//! | GET | `/api/v1/hosts/{id}/history?limit=` | Status-change history, newest first |
//! | POST | `/api/v1/hosts/{id}/status` | Manual status transition |
//! | GET | `/healthz` | Liveness |
//!
//! Failures are returned as `{ "code": ..., "message": ... }` with an HTTP
//! status derived from the error code.

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use hostpool_import::HostLoader;
use hostpool_matcher::Matcher;
use hostpool_state::InventoryStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: InventoryStore,
    pub matcher: Matcher,
    /// `None` when no external catalog is configured.
    pub loader: Option<HostLoader>,
}

impl ApiState {
    pub fn new(store: InventoryStore, loader: Option<HostLoader>) -> Self {
        Self {
            matcher: Matcher::new(store.clone()),
            store,
            loader,
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/match", post(handlers::match_hosts))
        .route("/reservations/{id}/commit", post(handlers::commit_reservation))
        .route("/reservations/{id}/release", post(handlers::release_reservation))
        .route("/import", post(handlers::import_hosts))
        .route("/hosts", get(handlers::list_hosts))
        .route("/hosts/{id}", get(handlers::get_host))
        .route("/hosts/{id}/history", get(handlers::host_history))
        .route("/hosts/{id}/status", post(handlers::update_host_status))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
