//! Transaction entity - One money movement recorded against an envelope or the
//! unassigned pool.
//!
//! The sign of `amount` encodes direction: income is positive, expenses are
//! negative. Transfers record the outflow from `envelope_id` and name the
//! receiving envelope in `to_envelope_id`.

use crate::storage::timestamps;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a transaction
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money coming in
    #[sea_orm(string_value = "income")]
    Income,
    /// Money going out
    #[sea_orm(string_value = "expense")]
    Expense,
    /// Money moving between two envelopes
    #[sea_orm(string_value = "transfer")]
    Transfer,
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Calendar date the transaction happened on
    pub date: Date,
    /// Signed amount in cents
    pub amount: i64,
    /// Target envelope id, or `"unassigned"`
    pub envelope_id: String,
    /// Receiving envelope for transfers
    pub to_envelope_id: Option<String>,
    /// Spending category
    pub category: String,
    /// Direction of the transaction
    pub transaction_type: TransactionType,
    /// Free-form description
    pub description: String,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    /// Last modification time, epoch milliseconds
    pub last_modified: i64,
}

/// `Transaction` has no declared relations
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
