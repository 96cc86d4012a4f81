pub mod auth;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod fcm;
pub mod forward;
pub mod http;
pub mod session;
pub mod state;
pub mod ws_common;

pub use state::AppState;

use axum::{
    routing::{delete, get, post},
    Router,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/e/{uid}", post(http::ingress::deliver))
        .route("/endpoint", post(http::ingress::forward_endpoint))
        .route("/polling", get(http::ingress::polling))
        .route("/invitation", get(http::ingress::invitation))
        .route("/maintenance/health_check", get(http::ingress::health_check))
        .route("/maintenance/liveness_check", get(http::ingress::liveness_check))
        .route("/ws", get(http::ws::session_handler))
        .route("/ws/events", get(http::ws::events_handler))
        .route("/admin/agents", get(http::admin::list_agents))
        .route("/admin/endpoints", get(http::admin::list_endpoints))
        .route(
            "/admin/settings/{name}",
            get(http::admin::get_setting).put(http::admin::put_setting),
        )
        .route("/admin/backups", post(http::admin::create_backup))
        .route("/admin/backups/{description}", get(http::admin::get_backup))
        .route("/admin/users", post(http::admin::create_user))
        .route("/admin/users/{id}", delete(http::admin::delete_user))
        .with_state(state)
}
