//! Paycheck history entity.
//!
//! Each record keeps the pool figures from before and after it was applied,
//! together with the envelope allocations, so deleting it can restore the
//! ledger without recomputing anything.

use crate::storage::timestamps;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Paycheck record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "paycheck_history")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the paycheck
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Pay date
    pub date: Date,
    /// Gross amount received, in cents
    pub amount: i64,
    /// Payer name
    pub source: String,
    /// Unassigned cash before processing, in cents
    pub unassigned_cash_before: i64,
    /// Unassigned cash after processing, in cents
    pub unassigned_cash_after: i64,
    /// Actual balance before processing, in cents
    pub actual_balance_before: i64,
    /// Actual balance after processing, in cents
    pub actual_balance_after: i64,
    /// JSON list of `{envelopeId, amount}` allocations
    pub allocations: Json,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    /// Last modification time, epoch milliseconds
    pub last_modified: i64,
}

/// `PaycheckHistory` has no declared relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(timestamps::stamp(
            self,
            insert,
            Column::CreatedAt,
            Column::LastModified,
        ))
    }
}
