//! Legacy savings goal entity.
//!
//! Savings goals now live in `envelopes` as goal-type envelopes. The table is
//! still created by early schema versions and dropped by a later one, so the
//! definition is kept for the migration history only.

use sea_orm::entity::prelude::*;

/// Legacy savings goal database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "savings_goals")]
pub struct Model {
    /// Unique identifier for the goal
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Display name
    pub name: String,
    /// Target in cents
    pub target_amount: i64,
    /// Saved so far in cents
    pub current_amount: i64,
    /// Last modification time, epoch milliseconds
    pub last_modified: i64,
}

/// `SavingsGoal` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
