//! Core types used throughout the system
//!
//! These are fundamental identifiers shared by the ledger, the sequencer
//! and the worker pool.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Client ID - globally unique, immutable after assignment.
///
/// # Usage:
/// - Primary key for client accounts
/// - Key of the sequencer's per-client queue registry
pub type ClientId = u64;

/// Transaction ID - 32 lowercase hex chars produced by [`crate::id_gen`].
///
/// Opaque to everything except the generator: the sequencer and workers only
/// move it around and hand it back to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
