//! Balance ledger - delta computation and apply/reverse.
//!
//! A transaction's effect on the books is fully determined by its type, amount
//! and target. [`apply_transaction`] computes both deltas with a sign of `+1`
//! and writes them; passing `reversing = true` runs the identical computation
//! with a sign of `-1`, so applying then reversing a row is exact.
//!
//! Transfers have a zero ledger delta: their envelope moves are written by the
//! transfer operation itself and the transfer row is only a record of it.
//!
//! Reversing a row whose envelope has since been physically deleted lands the
//! target half on unassigned cash, where the deleted envelope's balance went.

use crate::{
    core::{envelope::update_envelope_balance_atomic, metadata},
    entities::{TransactionType, transaction},
    errors::{Error, Result},
};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::{trace, warn};

/// Target id for transactions against the unassigned-cash pool.
pub const UNASSIGNED: &str = "unassigned";

/// `-1` when reversing, `+1` otherwise.
#[must_use]
pub const fn sign(reversing: bool) -> i64 {
    if reversing { -1 } else { 1 }
}

/// Change to the actual balance caused by a transaction.
#[must_use]
pub const fn delta_for_actual_balance(kind: TransactionType, amount: i64, sign: i64) -> i64 {
    match kind {
        TransactionType::Income => amount * sign,
        TransactionType::Expense => -amount.abs() * sign,
        TransactionType::Transfer => 0,
    }
}

/// Change to the transaction's target, either an envelope balance or unassigned
/// cash.
#[must_use]
pub const fn delta_for_target(kind: TransactionType, amount: i64, sign: i64) -> i64 {
    delta_for_actual_balance(kind, amount, sign)
}

/// Whether `envelope_id` names the unassigned-cash pool.
#[must_use]
pub fn is_unassigned(envelope_id: &str) -> bool {
    envelope_id == UNASSIGNED
}

/// Deltas written by one [`apply_transaction`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEffect {
    /// Applied to the envelope, or to unassigned cash for the sentinel target
    pub target_delta: i64,
    /// Applied to the actual balance
    pub actual_delta: i64,
}

/// Writes a transaction's effect, or its exact inverse when `reversing`.
///
/// Callers run this on the same database transaction that persists or deletes
/// the row, so the row and its effect commit together.
pub async fn apply_transaction<C>(
    db: &C,
    tx: &transaction::Model,
    reversing: bool,
) -> Result<LedgerEffect>
where
    C: ConnectionTrait,
{
    let sign = sign(reversing);
    let effect = LedgerEffect {
        target_delta: delta_for_target(tx.transaction_type, tx.amount, sign),
        actual_delta: delta_for_actual_balance(tx.transaction_type, tx.amount, sign),
    };

    if tx.transaction_type == TransactionType::Transfer {
        return Ok(effect);
    }

    if is_unassigned(&tx.envelope_id) {
        metadata::adjust(db, effect.target_delta, effect.actual_delta).await?;
    } else {
        match update_envelope_balance_atomic(db, &tx.envelope_id, effect.target_delta).await {
            Ok(_) => metadata::adjust(db, 0, effect.actual_delta).await?,
            Err(Error::EnvelopeNotFound { .. }) if reversing => {
                warn!(
                    transaction_id = %tx.id,
                    envelope_id = %tx.envelope_id,
                    "Envelope no longer exists, reversing against unassigned cash"
                );
                metadata::adjust(db, effect.target_delta, effect.actual_delta).await?;
            }
            Err(e) => return Err(e),
        }
    }

    trace!(
        transaction_id = %tx.id,
        reversing,
        target_delta = effect.target_delta,
        actual_delta = effect.actual_delta,
        "Ledger effect applied"
    );
    Ok(effect)
}
