//! The singleton budget metadata row: unassigned cash and the actual balance.

use crate::{
    entities::{Budget, Envelope, budget, envelope},
    errors::Result,
    storage::timestamps::now_millis,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};

/// Primary key of the metadata row.
pub const METADATA_ID: &str = "metadata";

/// Pool-level figures derived from the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    /// Sum of every envelope balance
    pub envelope_total: i64,
    /// Money not assigned to any envelope
    pub unassigned_cash: i64,
    /// `envelope_total + unassigned_cash`
    pub virtual_balance: i64,
    /// Independently tracked real-world balance
    pub actual_balance: i64,
    /// `actual_balance - virtual_balance`
    pub balance_difference: i64,
}

/// Returns the metadata row, creating a zeroed one if it does not exist yet.
pub async fn get_or_create<C>(db: &C) -> Result<budget::Model>
where
    C: ConnectionTrait,
{
    if let Some(row) = Budget::find_by_id(METADATA_ID).one(db).await? {
        return Ok(row);
    }

    let row = budget::ActiveModel {
        id: Set(METADATA_ID.to_string()),
        unassigned_cash: Set(0),
        actual_balance: Set(0),
        payload: Set(None),
        version: Set(1),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(row)
}

/// Adds the given deltas to unassigned cash and the actual balance in one
/// statement.
pub async fn adjust<C>(db: &C, unassigned_delta: i64, actual_delta: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    get_or_create(db).await?;

    // update_many bypasses the save hook, so last_modified is set here
    Budget::update_many()
        .col_expr(
            budget::Column::UnassignedCash,
            Expr::col(budget::Column::UnassignedCash).add(unassigned_delta),
        )
        .col_expr(
            budget::Column::ActualBalance,
            Expr::col(budget::Column::ActualBalance).add(actual_delta),
        )
        .col_expr(budget::Column::LastModified, Expr::value(now_millis()))
        .filter(budget::Column::Id.eq(METADATA_ID))
        .exec(db)
        .await?;
    Ok(())
}

/// Overwrites both pool figures.
pub async fn set_balances<C>(db: &C, unassigned_cash: i64, actual_balance: i64) -> Result<budget::Model>
where
    C: ConnectionTrait,
{
    let row = get_or_create(db).await?;
    let mut active: budget::ActiveModel = row.into();
    active.unassigned_cash = Set(unassigned_cash);
    active.actual_balance = Set(actual_balance);
    Ok(active.update(db).await?)
}

/// Overwrites unassigned cash, leaving the actual balance alone.
pub async fn set_unassigned_cash<C>(db: &C, amount: i64) -> Result<budget::Model>
where
    C: ConnectionTrait,
{
    let row = get_or_create(db).await?;
    let actual = row.actual_balance;
    set_balances(db, amount, actual).await
}

/// Overwrites the actual balance, e.g. after reconciling with a bank statement.
pub async fn set_actual_balance<C>(db: &C, amount: i64) -> Result<budget::Model>
where
    C: ConnectionTrait,
{
    let row = get_or_create(db).await?;
    let unassigned = row.unassigned_cash;
    set_balances(db, unassigned, amount).await
}

/// Sum of every envelope balance, archived envelopes included.
pub async fn envelope_total<C>(db: &C) -> Result<i64>
where
    C: ConnectionTrait,
{
    let total: Option<Option<i64>> = Envelope::find()
        .select_only()
        .column_as(Expr::col(envelope::Column::CurrentBalance).sum(), "total")
        .into_tuple()
        .one(db)
        .await?;
    Ok(total.flatten().unwrap_or(0))
}

/// Computes the virtual balance and how far the actual balance is from it.
pub async fn balance_summary<C>(db: &C) -> Result<BalanceSummary>
where
    C: ConnectionTrait,
{
    let row = get_or_create(db).await?;
    let envelope_total = envelope_total(db).await?;
    let virtual_balance = envelope_total + row.unassigned_cash;

    Ok(BalanceSummary {
        envelope_total,
        unassigned_cash: row.unassigned_cash,
        virtual_balance,
        actual_balance: row.actual_balance,
        balance_difference: row.actual_balance - virtual_balance,
    })
}
