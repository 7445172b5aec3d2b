use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::health::{EndpointStatus, HealthSnapshot, StartOptions};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub paused: bool,
    pub monitored_endpoints: usize,
}

#[derive(Deserialize)]
pub struct EndpointQuery {
    pub endpoint: String,
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub endpoint: String,
    #[serde(flatten)]
    pub options: StartOptions,
}

#[derive(Serialize)]
pub struct Ack {
    pub endpoint: String,
    pub references: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let paused = state.monitor.is_paused();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if paused { "paused" } else { "operational" },
        paused,
        monitored_endpoints: state.monitor.endpoints().len(),
    })
}

pub async fn get_endpoints(State(state): State<AdminState>) -> Json<Vec<EndpointStatus>> {
    Json(state.monitor.endpoints())
}

pub async fn get_health(
    State(state): State<AdminState>,
    Query(query): Query<EndpointQuery>,
) -> Result<Json<HealthSnapshot>, StatusCode> {
    state
        .monitor
        .get_health(&query.endpoint)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn start_endpoint(
    State(state): State<AdminState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<Ack>, StatusCode> {
    if request.endpoint.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    state.monitor.start_monitoring(&request.endpoint, request.options);
    tracing::info!(endpoint = %request.endpoint, "Monitoring started via admin API");
    Ok(Json(ack(&state, request.endpoint)))
}

pub async fn stop_endpoint(
    State(state): State<AdminState>,
    Query(query): Query<EndpointQuery>,
) -> Json<Ack> {
    state.monitor.stop_monitoring(&query.endpoint);
    tracing::info!(endpoint = %query.endpoint, "Monitoring released via admin API");
    Json(ack(&state, query.endpoint))
}

pub async fn pause(State(state): State<AdminState>) -> Json<SystemStatus> {
    state.monitor.pause();
    get_status(State(state)).await
}

pub async fn resume(State(state): State<AdminState>) -> Json<SystemStatus> {
    state.monitor.resume();
    get_status(State(state)).await
}

fn ack(state: &AdminState, endpoint: String) -> Ack {
    let references = state
        .monitor
        .endpoints()
        .into_iter()
        .find(|status| status.endpoint == endpoint)
        .map_or(0, |status| status.references);
    Ack {
        endpoint,
        references,
    }
}
