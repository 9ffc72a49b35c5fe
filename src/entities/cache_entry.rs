//! Cache entry entity - Memoized query results with an expiry time.
//! Cache rows are always recomputable and never the source of truth.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Cache entry database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cache")]
pub struct Model {
    /// Cache key
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Cached JSON value
    pub value: Json,
    /// Expiry time, epoch milliseconds
    pub expires_at: i64,
    /// Invalidation category (e.g., `"envelopes"`)
    pub category: String,
}

/// `Cache` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
