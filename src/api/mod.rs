//! # HTTP API
//!
//! Thin axum boundary over [`crate::rotation::RotationEngine`]: device
//! protocol, operator actions and share links. Engine outcomes are mapped to
//! status codes in [`error`].

pub mod error;
pub mod handlers;
pub mod identity;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use identity::{DeviceIdentity, OperatorIdentity, CLIENT_DN_HEADER, OPERATOR_HEADER};
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
