//! Opaque random tokens for update sessions and share links.

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// Length of update-session and share-link tokens (~190 bits of entropy).
pub const TOKEN_LENGTH: usize = 32;

/// Draw an alphanumeric token straight from the operating system CSPRNG.
pub fn generate_token() -> String {
    OsRng.sample_iter(&Alphanumeric).take(TOKEN_LENGTH).map(char::from).collect()
}
