//! Schema version entity - One row per applied schema version.

use sea_orm::entity::prelude::*;

/// Applied schema version
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "schema_versions")]
pub struct Model {
    /// Version number
    #[sea_orm(primary_key, auto_increment = false)]
    pub version: i32,
    /// When the version was applied, epoch milliseconds
    pub applied_at: i64,
}

/// `SchemaVersion` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
