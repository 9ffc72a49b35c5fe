//! Auto-backup entity - Whole-dataset snapshots taken before risky operations.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Auto-backup database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "auto_backups")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Backup id, `auto_backup_<syncType>_<millis>_<suffix>`
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Creation time, epoch milliseconds
    pub timestamp: i64,
    /// `"sync_triggered"`, `"manual"` or `"scheduled"`
    pub backup_type: String,
    /// Sync flavour that triggered the backup
    pub sync_type: Option<String>,
    /// Serialized snapshot of every ledger table
    pub snapshot: Json,
    /// Number of rows captured
    pub record_count: i64,
    /// Serialized size of the snapshot in bytes
    pub size_estimate: i64,
    /// Time spent collecting the snapshot, milliseconds
    pub duration_ms: i64,
}

/// `AutoBackup` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
