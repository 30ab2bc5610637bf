//! Caller identity middleware.
//!
//! TLS and operator login are terminated upstream. Devices arrive with the
//! subject DN of their client certificate in the `ssl-client` header;
//! operators arrive with their name in `x-operator`.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::warn;

use crate::api::error::ApiError;
use crate::domain::MachineId;

pub const CLIENT_DN_HEADER: &str = "ssl-client";
pub const OPERATOR_HEADER: &str = "x-operator";

/// Machine authenticated by its client certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub machine_id: MachineId,
}

/// Operator authenticated by the fronting identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorIdentity(pub String);

impl OperatorIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Pull the `CN=` value out of a subject DN. Accepts both the RFC 4514
/// comma form and the slash-separated OpenSSL form.
pub fn common_name(dn: &str) -> Option<&str> {
    dn.split([',', '/'])
        .map(str::trim)
        .find_map(|part| part.strip_prefix("CN="))
        .map(str::trim)
        .filter(|cn| !cn.is_empty())
}

pub async fn require_device(mut request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let dn = request
        .headers()
        .get(CLIENT_DN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Failed to read certificate correctly"))?;

    let machine_id = common_name(dn).and_then(|cn| MachineId::parse(cn).ok()).ok_or_else(|| {
        warn!(dn, "Client certificate without a usable machine id");
        ApiError::unauthorized("Failed to read uid from certificate")
    })?;

    request.extensions_mut().insert(DeviceIdentity { machine_id });
    Ok(next.run(request).await)
}

pub async fn require_operator(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let operator = request
        .headers()
        .get(OPERATOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Operator identity missing"))?
        .to_string();

    request.extensions_mut().insert(OperatorIdentity(operator));
    Ok(next.run(request).await)
}
