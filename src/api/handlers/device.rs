//! Device-facing endpoints: enrollment and the rotation protocol.

use axum::{extract::State, Extension, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::Reply;
use crate::api::{error::ApiError, identity::DeviceIdentity, routes::ApiState};
use crate::rotation::CheckinOutcome;
use crate::secrets::SecretString;

pub async fn ping_handler() -> Json<Reply<&'static str>> {
    Json(Reply::new("pong"))
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    /// Base64 of the PEM certificate request
    pub csr: String,
    pub hn: String,
    pub sn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollReply {
    /// PEM certificate
    pub response: String,
    pub machine_id: String,
}

#[instrument(skip(state, payload), fields(hostname = %payload.hn))]
pub async fn enroll_handler(
    State(state): State<ApiState>,
    Json(payload): Json<EnrollRequest>,
) -> Result<Json<EnrollReply>, ApiError> {
    let csr = STANDARD
        .decode(payload.csr.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| ApiError::bad_request("csr must be base64-encoded UTF-8 PEM"))?;

    let enrollment = state.engine.enroll(&csr, &payload.hn, &payload.sn).await?;
    Ok(Json(EnrollReply {
        response: enrollment.certificate,
        machine_id: enrollment.machine_id.into_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    pub hn: String,
    pub sn: String,
}

#[derive(Debug, Serialize)]
pub struct CheckinReply {
    pub response: &'static str,
    #[serde(rename = "updateSessionID", skip_serializing_if = "Option::is_none")]
    pub update_session_id: Option<String>,
}

#[instrument(skip(state, device, payload), fields(machine_id = %device.machine_id))]
pub async fn checkin_handler(
    State(state): State<ApiState>,
    Extension(device): Extension<DeviceIdentity>,
    Json(payload): Json<CheckinRequest>,
) -> Result<Json<CheckinReply>, ApiError> {
    let reply = match state.engine.checkin(&device.machine_id, &payload.hn, &payload.sn).await? {
        CheckinOutcome::Current => CheckinReply { response: "ok", update_session_id: None },
        CheckinOutcome::NeedsUpdate { session_token } => {
            CheckinReply { response: "update", update_session_id: Some(session_token) }
        }
    };
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
pub struct SubmitPasswordRequest {
    #[serde(rename = "Password")]
    pub password: SecretString,
    #[serde(rename = "updateSessionID")]
    pub update_session_id: String,
}

#[instrument(skip(state, device, payload), fields(machine_id = %device.machine_id))]
pub async fn submit_password_handler(
    State(state): State<ApiState>,
    Extension(device): Extension<DeviceIdentity>,
    Json(payload): Json<SubmitPasswordRequest>,
) -> Result<Json<Reply<&'static str>>, ApiError> {
    state
        .engine
        .submit_secret(&device.machine_id, &payload.update_session_id, &payload.password)
        .await?;
    Ok(Json(Reply::new("ok")))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPasswordRequest {
    /// Device report: success text or an error message
    pub res: String,
    #[serde(rename = "updateSessionID")]
    pub update_session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmReply {
    pub response: &'static str,
    pub applied: bool,
}

#[instrument(skip(state, device, payload), fields(machine_id = %device.machine_id))]
pub async fn confirm_password_handler(
    State(state): State<ApiState>,
    Extension(device): Extension<DeviceIdentity>,
    Json(payload): Json<ConfirmPasswordRequest>,
) -> Result<Json<ConfirmReply>, ApiError> {
    let outcome = state
        .engine
        .confirm_secret(&device.machine_id, &payload.update_session_id, &payload.res)
        .await?;
    Ok(Json(ConfirmReply { response: "ok", applied: outcome.applied }))
}
