//! Budget entity - Singleton rows holding pool-level figures.
//!
//! The row with id `"metadata"` carries the unassigned-cash pool and the actual
//! balance. Other ids (such as `"budgetData"`) hold opaque payloads.

use crate::storage::timestamps;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budget")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Record key (`"metadata"` for the ledger row)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Money not yet assigned to any envelope, in cents
    pub unassigned_cash: i64,
    /// Independently tracked real-world balance, in cents
    pub actual_balance: i64,
    /// Opaque payload for non-ledger rows
    pub payload: Option<Json>,
    /// Payload format version
    pub version: i32,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    /// Last modification time, epoch milliseconds
    pub last_modified: i64,
}

/// `Budget` has no relationships with other entities
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
