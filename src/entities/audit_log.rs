//! Audit log entity - Append-only record of ledger mutations.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Autoincrementing identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// When the action happened, epoch milliseconds
    pub timestamp: i64,
    /// Action name (e.g., `"transaction_added"`)
    pub action: String,
    /// Kind of entity touched
    pub entity_type: String,
    /// Identifier of the entity touched
    pub entity_id: String,
    /// Optional structured details
    pub details: Option<Json>,
}

/// `AuditLog` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
