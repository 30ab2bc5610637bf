//! Per-machine password retention.
//!
//! Only applied passwords count toward the retained history. Passwords that
//! are still awaiting device confirmation belong to an open rotation round
//! and are never selected.

use crate::domain::{PasswordId, PasswordRecord};

/// Pick the passwords to delete so that at most `keep` applied passwords
/// remain.
///
/// `newest_first` must be ordered by receipt time, newest first, which is
/// the order the credential store lists them in.
pub fn select_for_pruning(newest_first: &[PasswordRecord], keep: usize) -> Vec<PasswordId> {
    newest_first
        .iter()
        .filter(|record| record.applied)
        .skip(keep)
        .map(|record| record.id.clone())
        .collect()
}
