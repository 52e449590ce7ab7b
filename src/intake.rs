//! Admission Intake
//!
//! Validates a transfer request, records it as `pending` and hands it to the
//! sequencer without waiting. No balance is mutated here; the funds check is
//! advisory and repeated at execution time.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core_types::{ClientId, TransactionId};
use crate::error::TransferError;
use crate::id_gen::generate_transaction_id;
use crate::ledger::{Client, LedgerError, LedgerStore, Transaction, is_valid_amount};
use crate::sequencer::{SequencerHandle, SequencingRequest, SubmitError};

#[derive(Clone)]
pub struct Intake {
    ledger: Arc<dyn LedgerStore>,
    sequencer: SequencerHandle,
    shutdown: CancellationToken,
}

impl Intake {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        sequencer: SequencerHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            sequencer,
            shutdown,
        }
    }

    /// Admit a transfer from an authenticated sender
    ///
    /// On success the transaction is `pending` and sequenced; its outcome is
    /// observable only by reading the record later.
    pub async fn submit(
        &self,
        sender: &Client,
        to: ClientId,
        amount: Decimal,
    ) -> Result<TransactionId, TransferError> {
        if self.shutdown.is_cancelled() {
            return Err(TransferError::ShuttingDown);
        }
        if to == sender.id {
            return Err(TransferError::SameAccount);
        }
        if !is_valid_amount(amount) {
            return Err(TransferError::InvalidAmount);
        }
        if amount > sender.balance {
            debug!(
                client_id = sender.id,
                balance = %sender.balance,
                amount = %amount,
                "Rejecting transfer, insufficient balance"
            );
            return Err(TransferError::InsufficientFunds);
        }

        match self.ledger.client_by_id(to).await {
            Ok(_) => {}
            Err(LedgerError::ClientNotFound) => return Err(TransferError::TargetNotFound),
            Err(e) => {
                error!(client_id = sender.id, to = to, error = %e, "Failed to resolve target client");
                return Err(e.into());
            }
        }

        let tx = Transaction::pending(generate_transaction_id(sender.id, to, amount), sender.id, to, amount);
        if let Err(e) = self.ledger.create_transaction(&tx).await {
            error!(transaction_id = %tx.id, error = %e, "Failed to create transaction");
            return Err(e.into());
        }

        match self
            .sequencer
            .try_submit(SequencingRequest::new(sender.id, tx.id.clone()))
        {
            Ok(()) => {
                debug!(
                    transaction_id = %tx.id,
                    sender_id = sender.id,
                    receiver_id = to,
                    amount = %amount,
                    "Transfer admitted"
                );
                Ok(tx.id)
            }
            Err(e) => {
                let reason = match e {
                    SubmitError::Full(_) => "intake full",
                    SubmitError::Closed(_) => "sequencer stopped",
                };
                warn!(transaction_id = %tx.id, reason = reason, "Server busy, rejecting transfer");
                if let Err(e) = self.ledger.mark_error(&tx.id).await {
                    error!(transaction_id = %tx.id, error = %e, "Failed to mark rejected transaction as error");
                }
                Err(TransferError::ServerBusy)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, TransactionStatus};
    use crate::sequencer::{DispatchReceiver, Sequencer, SequencerConfig};
    use crate::stats::EngineStats;

    fn alice() -> Client {
        Client::new(1, "alice", "alice-token", Decimal::new(100, 0))
    }

    fn ledger() -> Arc<InMemoryLedger> {
        Arc::new(InMemoryLedger::with_clients([
            alice(),
            Client::new(2, "bob", "bob-token", Decimal::ZERO),
        ]))
    }

    /// Intake wired to a sequencer whose loop is not running
    fn intake(
        ledger: Arc<InMemoryLedger>,
        intake_capacity: usize,
    ) -> (Intake, Sequencer, DispatchReceiver, CancellationToken) {
        let shutdown = CancellationToken::new();
        let config = SequencerConfig {
            intake_capacity,
            ..SequencerConfig::default()
        };
        let (sequencer, handle, dispatch_rx) = Sequencer::new(
            &config,
            ledger.clone(),
            Arc::new(EngineStats::new()),
            shutdown.clone(),
        );
        (
            Intake::new(ledger, handle, shutdown.clone()),
            sequencer,
            dispatch_rx,
            shutdown,
        )
    }

    #[tokio::test]
    async fn test_admits_pending_transaction() {
        let ledger = ledger();
        let (intake, _sequencer, _rx, _shutdown) = intake(ledger.clone(), 10);

        let id = intake.submit(&alice(), 2, Decimal::new(30, 0)).await.unwrap();
        let tx = ledger.transaction(&id).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.sender_id, 1);
        assert_eq!(tx.receiver_id, 2);
        // Intake never touches balances
        assert_eq!(ledger.balance(1), Some(Decimal::new(100, 0)));
    }

    #[tokio::test]
    async fn test_validation_rejects_without_record() {
        let ledger = ledger();
        let (intake, _sequencer, _rx, _shutdown) = intake(ledger.clone(), 10);
        let sender = alice();

        assert_eq!(
            intake.submit(&sender, 1, Decimal::ONE).await,
            Err(TransferError::SameAccount)
        );
        assert_eq!(
            intake.submit(&sender, 2, Decimal::ZERO).await,
            Err(TransferError::InvalidAmount)
        );
        assert_eq!(
            intake.submit(&sender, 2, Decimal::new(-5, 0)).await,
            Err(TransferError::InvalidAmount)
        );
        // Finer than storage precision
        assert_eq!(
            intake.submit(&sender, 2, Decimal::new(5, 3)).await,
            Err(TransferError::InvalidAmount)
        );
        assert_eq!(
            intake.submit(&sender, 2, Decimal::new(150, 0)).await,
            Err(TransferError::InsufficientFunds)
        );
        assert_eq!(
            intake.submit(&sender, 99, Decimal::ONE).await,
            Err(TransferError::TargetNotFound)
        );
        assert_eq!(ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_full_intake_marks_error_and_reports_busy() {
        let ledger = ledger();
        let (intake, _sequencer, _rx, _shutdown) = intake(ledger.clone(), 1);
        let sender = alice();

        intake.submit(&sender, 2, Decimal::ONE).await.unwrap();
        assert_eq!(
            intake.submit(&sender, 2, Decimal::ONE).await,
            Err(TransferError::ServerBusy)
        );

        // Both were recorded, only the sequenced one is still pending
        assert_eq!(ledger.transaction_count(), 2);
        assert_eq!(ledger.pending_transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_sequencer_reports_busy() {
        let ledger = ledger();
        let (intake, sequencer, _rx, _shutdown) = intake(ledger.clone(), 10);
        drop(sequencer);

        assert_eq!(
            intake.submit(&alice(), 2, Decimal::ONE).await,
            Err(TransferError::ServerBusy)
        );
        assert!(ledger.pending_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_after_shutdown() {
        let ledger = ledger();
        let (intake, _sequencer, _rx, shutdown) = intake(ledger.clone(), 10);
        shutdown.cancel();

        assert_eq!(
            intake.submit(&alice(), 2, Decimal::ONE).await,
            Err(TransferError::ShuttingDown)
        );
        assert_eq!(ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let ledger = ledger();
        let (intake, _sequencer, _rx, _shutdown) = intake(ledger.clone(), 10);
        ledger.set_available(false);

        assert!(matches!(
            intake.submit(&alice(), 2, Decimal::ONE).await,
            Err(TransferError::Storage(_))
        ));
    }
}
