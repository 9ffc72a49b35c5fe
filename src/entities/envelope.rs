//! Envelope entity - A named bucket holding part of the user's money.
//!
//! Balances are stored in cents. Liability-type envelopes double as bill envelopes
//! and are the targets of the bill-funding prioritizer.

use crate::storage::timestamps;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of envelope, which drives funding recommendations
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    /// Everyday variable spending
    #[sea_orm(string_value = "standard")]
    Standard,
    /// Savings toward a target amount
    #[sea_orm(string_value = "goal")]
    Goal,
    /// Recurring bills and debts
    #[sea_orm(string_value = "liability")]
    Liability,
    /// Side accounts such as HSA/FSA
    #[sea_orm(string_value = "supplemental")]
    Supplemental,
}

/// Envelope database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "envelopes")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the envelope
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Human-readable name (e.g., "Groceries", "Rent")
    pub name: String,
    /// Budget category used for grouping and type classification
    pub category: String,
    /// Envelope kind
    pub envelope_type: EnvelopeType,
    /// Current balance in cents
    pub current_balance: i64,
    /// Savings target in cents (goal envelopes)
    pub target_amount: i64,
    /// Amount set aside every pay period, in cents
    pub biweekly_allocation: i64,
    /// Monthly spending budget in cents (variable envelopes)
    pub monthly_budget: i64,
    /// Hidden from active views but kept for history
    pub archived: bool,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    /// Last modification time, epoch milliseconds
    pub last_modified: i64,
}

/// Envelopes have no declared relations; transactions may point at the
/// `unassigned` sentinel instead of a row
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
