//! REST API handlers.
//!
//! Each handler calls into the matcher, the loader, or the inventory and
//! returns JSON. Errors carry their [`ErrorCode`] in the body.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use hostpool_core::{ErrorBody, ErrorCode};
use hostpool_import::ImportRequest;
use hostpool_placement::MatchRequest;
use hostpool_state::{ChangeReason, HostId, HostStatus, StatusUpdate, Transition};

use crate::ApiState;

const DEFAULT_OPERATOR: &str = "hostpool";
const DEFAULT_HISTORY_LIMIT: usize = 20;

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
        ErrorCode::HostNotFound => StatusCode::NOT_FOUND,
        ErrorCode::DuplicateHost | ErrorCode::ReservationLost => StatusCode::CONFLICT,
        ErrorCode::NoCandidates
        | ErrorCode::TooFewCandidates
        | ErrorCode::AffinityUnsatisfied
        | ErrorCode::CrossSwitchExhausted => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::ExternalCatalogError => StatusCode::BAD_GATEWAY,
        ErrorCode::SystemError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(code: ErrorCode, msg: impl Into<String>) -> Response {
    let body = ErrorBody::new(code, msg);
    if code == ErrorCode::SystemError {
        error!(code = %code, message = %body.message, "request failed");
    } else if !code.is_client_error() {
        warn!(code = %code, message = %body.message, "request refused");
    }
    (status_for(code), Json(body)).into_response()
}

fn operator_or_default(operator: Option<String>) -> String {
    operator
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| DEFAULT_OPERATOR.to_string())
}

// ── Matching ───────────────────────────────────────────────────

/// POST /api/v1/match
pub async fn match_hosts(State(state): State<ApiState>, Json(req): Json<MatchRequest>) -> Response {
    match state.matcher.match_hosts(&req) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e.code(), e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct OperatorParams {
    pub operator: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReservationResult {
    pub reservation_id: String,
    pub hosts: Vec<HostId>,
    pub status: HostStatus,
}

/// POST /api/v1/reservations/{id}/commit
pub async fn commit_reservation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<OperatorParams>,
) -> Response {
    let operator = operator_or_default(params.operator);
    match state.matcher.commit(&id, &operator) {
        Ok(hosts) => Json(ReservationResult {
            reservation_id: id,
            hosts,
            status: HostStatus::Used,
        })
        .into_response(),
        Err(e) => error_response(e.code(), e.to_string()),
    }
}

/// POST /api/v1/reservations/{id}/release
pub async fn release_reservation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<OperatorParams>,
) -> Response {
    let operator = operator_or_default(params.operator);
    match state.matcher.release(&id, &operator) {
        Ok(hosts) => Json(ReservationResult {
            reservation_id: id,
            hosts,
            status: HostStatus::Unused,
        })
        .into_response(),
        Err(e) => error_response(e.code(), e.to_string()),
    }
}

// ── Import ─────────────────────────────────────────────────────

/// POST /api/v1/import
pub async fn import_hosts(State(state): State<ApiState>, Json(req): Json<ImportRequest>) -> Response {
    let Some(loader) = state.loader.as_ref() else {
        return error_response(
            ErrorCode::ExternalCatalogError,
            "no external host catalog is configured",
        );
    };
    match loader.import(&req).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => error_response(e.code(), e.to_string()),
    }
}

// ── Inventory ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// GET /api/v1/hosts?status=
pub async fn list_hosts(State(state): State<ApiState>, Query(params): Query<ListParams>) -> Response {
    let result = match params.status.as_deref() {
        None => state.store.list_hosts(),
        Some(raw) => match HostStatus::parse(raw) {
            Some(status) => state.store.find_by_status(status),
            None => {
                return error_response(ErrorCode::ValidationError, format!("unknown status {raw:?}"));
            }
        },
    };
    match result {
        Ok(hosts) => Json(hosts).into_response(),
        Err(e) => error_response(e.code(), e.to_string()),
    }
}

/// GET /api/v1/hosts/{id}
pub async fn get_host(State(state): State<ApiState>, Path(id): Path<HostId>) -> Response {
    match state.store.get_host(id) {
        Ok(Some(host)) => Json(host).into_response(),
        Ok(None) => error_response(ErrorCode::HostNotFound, format!("host {id} not found")),
        Err(e) => error_response(e.code(), e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// GET /api/v1/hosts/{id}/history?limit=
pub async fn host_history(
    State(state): State<ApiState>,
    Path(id): Path<HostId>,
    Query(params): Query<HistoryParams>,
) -> Response {
    match state.store.get_host(id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(ErrorCode::HostNotFound, format!("host {id} not found")),
        Err(e) => return error_response(e.code(), e.to_string()),
    }
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.store.find_status_change_history(id, limit) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => error_response(e.code(), e.to_string()),
    }
}

/// Manual status change body.
#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: HostStatus,
    #[serde(default)]
    pub detail: String,
    pub operator: Option<String>,
}

/// POST /api/v1/hosts/{id}/status
///
/// Moves a host along one legal transition. Holds are created by the
/// matcher and ended through `/reservations/{id}/…`, so `Preselect`,
/// `Confirm` and `Release` are refused here.
pub async fn update_host_status(
    State(state): State<ApiState>,
    Path(id): Path<HostId>,
    Json(req): Json<StatusChangeRequest>,
) -> Response {
    let host = match state.store.get_host(id) {
        Ok(Some(host)) => host,
        Ok(None) => return error_response(ErrorCode::HostNotFound, format!("host {id} not found")),
        Err(e) => return error_response(e.code(), e.to_string()),
    };
    let transition = match Transition::between(host.status, req.status) {
        Some(Transition::Preselect) => {
            return error_response(
                ErrorCode::ValidationError,
                "hosts are preselected only by a match",
            );
        }
        Some(t) if t.ends_hold() => {
            return error_response(
                ErrorCode::ValidationError,
                format!("host {id} is held; commit or release its reservation"),
            );
        }
        Some(t) => t,
        None => {
            return error_response(
                ErrorCode::ValidationError,
                format!("illegal transition {} -> {}", host.status, req.status),
            );
        }
    };

    let operator = operator_or_default(req.operator);
    let update = StatusUpdate::new(vec![id], transition, ChangeReason::ManualUpdate)
        .detail(req.detail)
        .operator(operator.as_str());
    match state.store.batch_update_status(&update) {
        Ok(1) => {
            info!(host_id = id, from = %host.status, to = %req.status, %operator, "manual status update");
            match state.store.get_host(id) {
                Ok(Some(updated)) => Json(updated).into_response(),
                Ok(None) => error_response(ErrorCode::HostNotFound, format!("host {id} not found")),
                Err(e) => error_response(e.code(), e.to_string()),
            }
        }
        Ok(_) => error_response(
            ErrorCode::ValidationError,
            format!("host {id} is no longer {}", host.status),
        ),
        Err(e) => error_response(e.code(), e.to_string()),
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostpool_state::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn test_state() -> ApiState {
        let store = InventoryStore::open_in_memory().unwrap();
        ApiState::new(store, None)
    }

    fn test_host(id: HostId) -> HostRecord {
        HostRecord {
            bk_host_id: id,
            ip: format!("10.9.0.{id}"),
            bk_cloud_id: 0,
            asset_id: String::new(),
            cpu_num: 8,
            dram_cap: 16384,
            storage_cap: 0,
            storage_device: BTreeMap::new(),
            city: "shenzhen".to_string(),
            sub_zone: "sz-1".to_string(),
            rack_id: format!("R{id}"),
            net_device_id: format!("S{id}"),
            device_class: "S5".to_string(),
            os_type: OsType::Linux,
            os_bit: String::new(),
            os_version: String::new(),
            os_name: String::new(),
            dedicated_biz: 0,
            rs_type: String::new(),
            labels: BTreeSet::new(),
            operator: "admin".to_string(),
            status: HostStatus::Unused,
            agent_status: AgentStatus::Alive,
            reservation_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn status_change(status: HostStatus) -> Json<StatusChangeRequest> {
        Json(StatusChangeRequest {
            status,
            detail: "checked by hand".to_string(),
            operator: Some("bob".to_string()),
        })
    }

    #[test]
    fn error_codes_map_to_http_status() {
        assert_eq!(status_for(ErrorCode::ValidationError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCode::HostNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCode::ReservationLost), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorCode::TooFewCandidates), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorCode::ExternalCatalogError), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn match_on_empty_pool_is_no_candidates() {
        let state = test_state();
        let resp = match_hosts(State(state), Json(MatchRequest::new(1))).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn match_then_commit() {
        let state = test_state();
        state.store.insert_hosts(&[test_host(1), test_host(2)]).unwrap();

        let resp = match_hosts(State(state.clone()), Json(MatchRequest::new(2))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let token = state.store.get_host(1).unwrap().unwrap().reservation_id.unwrap();

        let resp = commit_reservation(
            State(state.clone()),
            Path(token.clone()),
            Query(OperatorParams { operator: None }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.store.find_by_status(HostStatus::Used).unwrap().len(), 2);

        let resp = commit_reservation(State(state), Path(token), Query(OperatorParams { operator: None })).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn release_unknown_reservation_is_ok() {
        let state = test_state();
        let resp = release_reservation(
            State(state),
            Path("rsv-none".to_string()),
            Query(OperatorParams { operator: None }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn import_without_catalog_is_refused() {
        let state = test_state();
        let resp = import_hosts(State(state), Json(ImportRequest::default())).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn list_hosts_by_status() {
        let state = test_state();
        state.store.insert_hosts(&[test_host(1)]).unwrap();

        let resp = list_hosts(State(state.clone()), Query(ListParams { status: Some("Unused".to_string()) })).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = list_hosts(State(state), Query(ListParams { status: Some("Gone".to_string()) })).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_missing_host() {
        let state = test_state();
        let resp = get_host(State(state.clone()), Path(9)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = host_history(State(state), Path(9), Query(HistoryParams { limit: None })).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_update_follows_transitions() {
        let state = test_state();
        state.store.insert_hosts(&[test_host(1)]).unwrap();

        let resp = update_host_status(State(state.clone()), Path(1), status_change(HostStatus::FaultHazard)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let entry = &state.store.find_status_change_history(1, 1).unwrap()[0];
        assert_eq!(entry.reason, ChangeReason::ManualUpdate);
        assert_eq!(entry.operator, "bob");

        // FaultHazard is terminal.
        let resp = update_host_status(State(state.clone()), Path(1), status_change(HostStatus::Unused)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn manual_preselect_is_refused() {
        let state = test_state();
        state.store.insert_hosts(&[test_host(1)]).unwrap();
        let resp = update_host_status(State(state.clone()), Path(1), status_change(HostStatus::Preselected)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.get_host(1).unwrap().unwrap().status, HostStatus::Unused);
    }

    #[tokio::test]
    async fn held_host_cannot_be_moved_by_hand() {
        let state = test_state();
        state.store.insert_hosts(&[test_host(1), test_host(2)]).unwrap();
        let resp = match_hosts(State(state.clone()), Json(MatchRequest::new(2))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let token = state.store.get_host(1).unwrap().unwrap().reservation_id.unwrap();

        for target in [HostStatus::Unused, HostStatus::Used] {
            let resp = update_host_status(State(state.clone()), Path(1), status_change(target)).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(state.store.find_by_reservation(&token).unwrap(), vec![1, 2]);

        let resp = commit_reservation(State(state.clone()), Path(token), Query(OperatorParams { operator: None })).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.store.find_by_status(HostStatus::Used).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
