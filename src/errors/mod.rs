//! # Error Handling
//!
//! Infrastructure error types for the lapsvault service. Rotation protocol
//! outcomes have their own taxonomy in [`crate::rotation::RotationError`];
//! the types here describe failures of the plumbing underneath it
//! (configuration, the credential store, I/O).

pub mod types;

pub use types::{LapsError, Result};
