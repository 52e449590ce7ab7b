//! Transfer handlers

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Form, Json,
    extract::{Path, State, rejection::FormRejection},
};
use rust_decimal::Decimal;
use tracing::error;

use super::super::state::AppState;
use super::super::types::{ApiResponse, TransferAccepted, TransferForm};
use crate::core_types::{ClientId, TransactionId};
use crate::error::TransferError;
use crate::ledger::{Client, LedgerError, Transaction, TransactionStatus, is_valid_amount};

/// POST /transfer
///
/// Accepts `to` and `amount` form fields from the authenticated client.
/// The transfer runs asynchronously; the response only means "accepted".
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<Client>,
    form: Result<Form<TransferForm>, FormRejection>,
) -> Result<Json<ApiResponse<TransferAccepted>>, TransferError> {
    let Form(form) = form.map_err(|e| TransferError::MalformedRequest(e.body_text()))?;
    let (to, amount) = parse_transfer_form(&form)?;

    let transaction_id = state.intake.submit(&client, to, amount).await?;

    Ok(Json(ApiResponse::success(TransferAccepted {
        transaction_id,
        status: TransactionStatus::Pending,
    })))
}

/// GET /transaction/{id}
///
/// Visible to the sender and the receiver only; anyone else gets not found.
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<Client>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Transaction>>, TransferError> {
    let tx = match state.ledger.transaction(&TransactionId::new(id)).await {
        Ok(tx) => tx,
        Err(LedgerError::TransactionNotFound(_)) => return Err(TransferError::TransactionNotFound),
        Err(e) => {
            error!(error = %e, "Failed to load transaction");
            return Err(e.into());
        }
    };

    if tx.sender_id != client.id && tx.receiver_id != client.id {
        return Err(TransferError::TransactionNotFound);
    }

    Ok(Json(ApiResponse::success(tx)))
}

fn parse_transfer_form(form: &TransferForm) -> Result<(ClientId, Decimal), TransferError> {
    let to = form
        .to
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(TransferError::MissingTarget)?;
    let to: ClientId = to.parse().map_err(|_| TransferError::InvalidTargetId)?;
    if to == 0 {
        return Err(TransferError::InvalidTargetId);
    }

    let amount = form
        .amount
        .as_deref()
        .map(str::trim)
        .ok_or(TransferError::InvalidAmount)?;
    let amount = Decimal::from_str(amount).map_err(|_| TransferError::InvalidAmount)?;
    if !is_valid_amount(amount) {
        return Err(TransferError::InvalidAmount);
    }

    Ok((to, amount))
}
