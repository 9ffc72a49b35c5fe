//! Offline request queue entity - Requests waiting for connectivity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Queued request database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "offline_request_queue")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Autoincrementing identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Kind of request (e.g., `"sync_push"`)
    pub request_type: String,
    /// Request body
    pub payload: Json,
    /// `"pending"`, `"failed"` or `"done"`
    pub status: String,
    /// Number of delivery attempts so far
    pub attempts: i32,
    /// Enqueue time, epoch milliseconds
    pub created_at: i64,
    /// Last attempt time, epoch milliseconds
    pub last_attempt_at: Option<i64>,
}

/// `OfflineRequest` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
