//! Startup Recovery
//!
//! Transactions admitted before an unclean shutdown are still `pending` in
//! storage. They are resubmitted once, oldest first, exactly like fresh
//! sequencing requests.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TransferError;
use crate::ledger::LedgerStore;
use crate::sequencer::{SequencerHandle, SequencingRequest};

/// Resubmit every pending transaction; returns how many were sequenced
///
/// Uses the waiting submit so a large backlog is fed in at the sequencer's
/// pace instead of being rejected by the intake bound. Requests are marked
/// recovered, so a full client FIFO parks them rather than failing them.
pub async fn recover_pending(
    ledger: Arc<dyn LedgerStore>,
    sequencer: SequencerHandle,
    shutdown: CancellationToken,
) -> Result<usize, TransferError> {
    let pending = ledger.pending_transactions().await?;
    if pending.is_empty() {
        info!("Recovery found no pending transactions");
        return Ok(0);
    }

    info!(count = pending.len(), "Recovering pending transactions");

    let mut recovered = 0;
    for tx in pending {
        let request = SequencingRequest::recovered(tx.sender_id, tx.id);
        let submitted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = sequencer.submit(request) => Some(result),
        };
        match submitted {
            Some(Ok(())) => recovered += 1,
            Some(Err(e)) => {
                warn!(recovered = recovered, error = %e, "Sequencer stopped during recovery");
                break;
            }
            None => {
                warn!(recovered = recovered, "Recovery interrupted by shutdown");
                break;
            }
        }
    }

    info!(recovered = recovered, "Recovery complete");
    Ok(recovered)
}
