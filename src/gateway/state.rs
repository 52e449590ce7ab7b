use std::sync::Arc;

use crate::intake::Intake;
use crate::ledger::LedgerStore;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub intake: Intake,
}

impl AppState {
    pub fn new(ledger: Arc<dyn LedgerStore>, intake: Intake) -> Self {
        Self { ledger, intake }
    }
}
