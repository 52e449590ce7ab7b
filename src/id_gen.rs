//! Transaction ID generation
//!
//! IDs are the md5 digest of sender, receiver, amount and a wall-clock
//! component, rendered as 32 lowercase hex chars. Collisions are not
//! expected but not cryptographically excluded; a process-local sequence is
//! mixed in so two identical transfers in the same clock tick still differ.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;

use crate::core_types::{ClientId, TransactionId};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a new transaction id for `from -> to` of `amount`.
pub fn generate_transaction_id(from: ClientId, to: ClientId, amount: Decimal) -> TransactionId {
    let now = Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000));
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let digest = md5::compute(format!("{}{}{}{}:{}", from, to, amount.normalize(), nanos, seq));
    TransactionId::new(format!("{:x}", digest))
}
