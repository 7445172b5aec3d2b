//! Admin API over the endpoint monitor.
//!
//! # Design Decisions
//! - Every route requires `Authorization: Bearer <api_key>`
//! - The key is read from the live config, so a reload rotates it
//! - Handlers are thin; all semantics live in the monitor

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::MonitorConfig;
use crate::health::EndpointMonitor;

#[derive(Clone)]
pub struct AdminState {
    pub monitor: EndpointMonitor,
    pub config: Arc<ArcSwap<MonitorConfig>>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route(
            "/admin/endpoints",
            get(get_endpoints).post(start_endpoint).delete(stop_endpoint),
        )
        .route("/admin/health", get(get_health))
        .route("/admin/pause", post(pause))
        .route("/admin/resume", post(resume))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API on an already bound listener until `shutdown` fires.
pub async fn serve_admin(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let local_addr: SocketAddr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
