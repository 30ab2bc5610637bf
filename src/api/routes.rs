use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::{
    handlers::{
        access_log_handler, checkin_handler, confirm_password_handler, disable_machine_handler,
        disable_unenrolled_handler, enroll_handler, expire_handler, issue_share_link_handler,
        list_machines_handler, machine_detail_handler, ping_handler, redeem_share_link_handler,
        share_link_status_handler, show_password_handler, submit_password_handler,
    },
    identity::{require_device, require_operator},
};
use crate::rotation::RotationEngine;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<RotationEngine>,
}

pub fn build_router(engine: Arc<RotationEngine>) -> Router {
    let state = ApiState { engine };

    let device_api = Router::new()
        .route("/api/checkin", post(checkin_handler))
        .route("/api/password", post(submit_password_handler))
        .route("/api/password-confirm", post(confirm_password_handler))
        .route_layer(middleware::from_fn(require_device));

    let operator_api = Router::new()
        .route("/api/admin/password", get(show_password_handler))
        .route("/api/admin/expire", post(expire_handler))
        .route("/api/admin/machines", get(list_machines_handler))
        .route("/api/admin/machines/disable-unenrolled", post(disable_unenrolled_handler))
        .route("/api/admin/machines/{mid}", get(machine_detail_handler))
        .route("/api/admin/machines/{mid}/disable", post(disable_machine_handler))
        .route("/api/admin/access-log", get(access_log_handler))
        .route("/api/admin/share-links", post(issue_share_link_handler))
        .route_layer(middleware::from_fn(require_operator));

    let public_api = Router::new()
        .route("/ping", get(ping_handler))
        .route("/api/enroll", post(enroll_handler))
        .route(
            "/api/share/{token}",
            get(share_link_status_handler).post(redeem_share_link_handler),
        );

    Router::new()
        .merge(public_api)
        .merge(device_api)
        .merge(operator_api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
