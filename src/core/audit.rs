//! Append-only audit trail written inside each mutation's database transaction.

use crate::{
    entities::{AuditLog, audit_log},
    errors::Result,
    storage::timestamps::now_millis,
};
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, QueryOrder, QuerySelect, Set};

/// Appends one audit entry.
pub async fn record<C>(
    db: &C,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    details: Option<serde_json::Value>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    audit_log::ActiveModel {
        timestamp: Set(now_millis()),
        action: Set(action.to_string()),
        entity_type: Set(entity_type.to_string()),
        entity_id: Set(entity_id.to_string()),
        details: Set(details),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Most recent entries, newest first.
pub async fn recent<C>(db: &C, limit: u64) -> Result<Vec<audit_log::Model>>
where
    C: ConnectionTrait,
{
    Ok(AuditLog::find()
        .order_by_desc(audit_log::Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}
