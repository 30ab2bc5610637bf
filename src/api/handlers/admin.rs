//! Operator endpoints
//!
//! All routes here sit behind [`crate::api::identity::require_operator`].

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use tracing::instrument;

use super::{PasswordReply, Reply};
use crate::api::{error::ApiError, identity::OperatorIdentity, routes::ApiState};
use crate::domain::{AccessLogView, MachineId, PasswordId, PasswordSummary};
use crate::rotation::{IssuedShareLink, MachineDetail, MachineOverview, PasswordLookup};
use crate::secrets::SecretString;

/// Select a password by machine or by id; exactly one must be given
#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub mid: Option<String>,
    pub pwid: Option<String>,
}

impl LookupQuery {
    fn into_lookup(self) -> Result<PasswordLookup, ApiError> {
        match (self.mid, self.pwid) {
            (Some(mid), None) => parse_machine_id(&mid).map(PasswordLookup::Machine),
            (None, Some(pwid)) => PasswordId::parse(&pwid)
                .map(PasswordLookup::Password)
                .map_err(|_| ApiError::bad_request("pwid is not a valid password id")),
            _ => Err(ApiError::bad_request("exactly one of mid or pwid is required")),
        }
    }
}

fn parse_machine_id(raw: &str) -> Result<MachineId, ApiError> {
    MachineId::parse(raw).map_err(|_| ApiError::bad_request("mid is not a valid machine id"))
}

#[instrument(skip(state, operator), fields(operator = %operator.as_str()))]
pub async fn show_password_handler(
    State(state): State<ApiState>,
    Extension(operator): Extension<OperatorIdentity>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<PasswordReply>, ApiError> {
    let lookup = query.into_lookup()?;
    let disclosure = state.engine.disclose(&lookup, operator.as_str()).await?;
    Ok(Json(disclosure.into()))
}

#[instrument(skip(state, operator), fields(operator = %operator.as_str()))]
pub async fn expire_handler(
    State(state): State<ApiState>,
    Extension(operator): Extension<OperatorIdentity>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<Reply<PasswordSummary>>, ApiError> {
    let lookup = query.into_lookup()?;
    Ok(Json(Reply::new(state.engine.expire_now(&lookup).await?)))
}

#[instrument(skip(state, operator), fields(operator = %operator.as_str()))]
pub async fn disable_machine_handler(
    State(state): State<ApiState>,
    Extension(operator): Extension<OperatorIdentity>,
    Path(mid): Path<String>,
) -> Result<Json<Reply<&'static str>>, ApiError> {
    let machine_id = parse_machine_id(&mid)?;
    state.engine.disable_machine(&machine_id).await?;
    Ok(Json(Reply::new("ok")))
}

#[instrument(skip(state, operator), fields(operator = %operator.as_str()))]
pub async fn disable_unenrolled_handler(
    State(state): State<ApiState>,
    Extension(operator): Extension<OperatorIdentity>,
) -> Result<Json<Reply<u64>>, ApiError> {
    Ok(Json(Reply::new(state.engine.disable_unenrolled_machines().await?)))
}

pub async fn list_machines_handler(
    State(state): State<ApiState>,
) -> Result<Json<Reply<Vec<MachineOverview>>>, ApiError> {
    Ok(Json(Reply::new(state.engine.machine_overview().await?)))
}

pub async fn machine_detail_handler(
    State(state): State<ApiState>,
    Path(mid): Path<String>,
) -> Result<Json<Reply<MachineDetail>>, ApiError> {
    let machine_id = parse_machine_id(&mid)?;
    Ok(Json(Reply::new(state.engine.machine_detail(&machine_id).await?)))
}

pub async fn access_log_handler(
    State(state): State<ApiState>,
) -> Result<Json<Reply<Vec<AccessLogView>>>, ApiError> {
    Ok(Json(Reply::new(state.engine.access_log().await?)))
}

#[derive(Debug, Deserialize)]
pub struct IssueShareLinkRequest {
    pub mid: String,
    /// Gate password the link holder must present
    pub password: SecretString,
}

#[instrument(skip(state, operator, payload), fields(operator = %operator.as_str()))]
pub async fn issue_share_link_handler(
    State(state): State<ApiState>,
    Extension(operator): Extension<OperatorIdentity>,
    Json(payload): Json<IssueShareLinkRequest>,
) -> Result<Json<Reply<IssuedShareLink>>, ApiError> {
    let machine_id = parse_machine_id(&payload.mid)?;
    let link =
        state.engine.issue_share_link(&machine_id, payload.password, operator.as_str()).await?;
    Ok(Json(Reply::new(link)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_requires_exactly_one_selector() {
        let both =
            LookupQuery { mid: Some(MachineId::new().into_string()), pwid: Some("x".into()) };
        assert!(both.into_lookup().is_err());

        let neither = LookupQuery { mid: None, pwid: None };
        assert!(neither.into_lookup().is_err());

        let machine = MachineId::new();
        let by_machine = LookupQuery { mid: Some(machine.to_string()), pwid: None };
        assert_eq!(by_machine.into_lookup().unwrap(), PasswordLookup::Machine(machine));
    }

    #[test]
    fn lookup_rejects_malformed_ids() {
        let bad = LookupQuery { mid: None, pwid: Some("not-a-uuid".into()) };
        assert!(matches!(bad.into_lookup(), Err(ApiError::BadRequest(_))));
    }
}
