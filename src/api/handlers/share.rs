//! Share-link endpoints. No operator identity: the token and the gate
//! password are the capability.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

use super::{PasswordReply, Reply};
use crate::api::{error::ApiError, routes::ApiState};
use crate::rotation::ShareLinkStatus;
use crate::secrets::SecretString;

pub async fn share_link_status_handler(
    State(state): State<ApiState>,
    Path(token): Path<String>,
) -> Result<Json<Reply<ShareLinkStatus>>, ApiError> {
    Ok(Json(Reply::new(state.engine.share_link_status(&token).await?)))
}

#[derive(Debug, Deserialize)]
pub struct RedeemShareLinkRequest {
    pub password: SecretString,
}

#[instrument(skip_all)]
pub async fn redeem_share_link_handler(
    State(state): State<ApiState>,
    Path(token): Path<String>,
    Json(payload): Json<RedeemShareLinkRequest>,
) -> Result<Json<PasswordReply>, ApiError> {
    let disclosure = state.engine.redeem_share_link(&token, &payload.password).await?;
    Ok(Json(disclosure.into()))
}
