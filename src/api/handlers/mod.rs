//! Request handlers, grouped by caller.
//!
//! Every body is a JSON object with a `response` field; failures add a
//! `reason` (see [`crate::api::error::ApiError`]).

pub mod admin;
pub mod device;
pub mod share;

use serde::Serialize;

pub use admin::{
    access_log_handler, disable_machine_handler, disable_unenrolled_handler, expire_handler,
    issue_share_link_handler, list_machines_handler, machine_detail_handler,
    show_password_handler,
};
pub use device::{
    checkin_handler, confirm_password_handler, enroll_handler, ping_handler,
    submit_password_handler,
};
pub use share::{redeem_share_link_handler, share_link_status_handler};

/// Plain `{"response": ...}` body
#[derive(Debug, Serialize)]
pub struct Reply<T: Serialize> {
    pub response: T,
}

impl<T: Serialize> Reply<T> {
    pub fn new(response: T) -> Self {
        Self { response }
    }
}

/// Body carrying a disclosed password
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReply {
    pub response: String,
    pub machine_id: String,
    pub password_id: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::rotation::Disclosure> for PasswordReply {
    fn from(disclosure: crate::rotation::Disclosure) -> Self {
        Self {
            response: disclosure.password.expose_secret().to_string(),
            machine_id: disclosure.machine_id.into_string(),
            password_id: disclosure.password_id.into_string(),
            expires_at: disclosure.expires_at,
        }
    }
}
