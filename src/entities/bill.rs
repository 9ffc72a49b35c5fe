//! Bill entity - A recurring payment linked to a liability envelope.

use crate::storage::timestamps;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Bill database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bills")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the bill
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Display name (e.g., "Electric")
    pub name: String,
    /// Amount due in cents
    pub amount: i64,
    /// Next due date
    pub due_date: Date,
    /// Whether the current cycle has been paid
    pub is_paid: bool,
    /// Whether the bill repeats
    pub is_recurring: bool,
    /// Repeat cadence: `"weekly"`, `"biweekly"`, `"monthly"`, ...
    pub frequency: String,
    /// Spending category
    pub category: String,
    /// Liability envelope funding this bill, if linked
    pub envelope_id: Option<String>,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    /// Last modification time, epoch milliseconds
    pub last_modified: i64,
}

/// `Bill` links to envelopes by id only
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
