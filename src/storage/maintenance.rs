//! Database housekeeping.
//!
//! None of these functions touch ledger balances. `clear_data` empties the ledger
//! tables but keeps `auto_backups`, so a wiped database can still be restored.

use crate::{
    cache::CacheStore,
    entities::{
        AuditLog, AutoBackup, Bill, Budget, CacheEntry, Envelope, Paycheck, Transaction, audit_log,
    },
    errors::Result,
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};

/// Number of audit entries kept by [`optimize_database`].
pub const AUDIT_LOG_RETENTION: u64 = 1000;

/// What [`optimize_database`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeReport {
    /// Expired cache rows deleted
    pub expired_cache_entries: u64,
    /// Old audit entries deleted
    pub trimmed_audit_entries: u64,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    /// Envelopes, archived included
    pub envelopes: u64,
    /// Transactions
    pub transactions: u64,
    /// Bills
    pub bills: u64,
    /// Paycheck records
    pub paychecks: u64,
    /// Cache rows, expired included
    pub cache_entries: u64,
    /// Audit log entries
    pub audit_entries: u64,
    /// Auto-backups
    pub auto_backups: u64,
}

/// Drops expired cache rows and trims the audit log to the newest
/// [`AUDIT_LOG_RETENTION`] entries.
#[instrument(skip(db))]
pub async fn optimize_database(db: &DatabaseConnection) -> Result<OptimizeReport> {
    let expired_cache_entries = CacheStore::new(db.clone()).cleanup(None).await?;

    // Newest-first; everything at or below the first row past the retention window goes
    let cutoff = AuditLog::find()
        .order_by_desc(audit_log::Column::Id)
        .offset(AUDIT_LOG_RETENTION)
        .one(db)
        .await?;

    let trimmed_audit_entries = match cutoff {
        Some(row) => {
            AuditLog::delete_many()
                .filter(audit_log::Column::Id.lte(row.id))
                .exec(db)
                .await?
                .rows_affected
        }
        None => 0,
    };

    info!(
        expired_cache_entries,
        trimmed_audit_entries, "Database optimization complete"
    );

    Ok(OptimizeReport {
        expired_cache_entries,
        trimmed_audit_entries,
    })
}

/// Counts the rows in every data table.
pub async fn database_stats(db: &DatabaseConnection) -> Result<DatabaseStats> {
    Ok(DatabaseStats {
        envelopes: Envelope::find().count(db).await?,
        transactions: Transaction::find().count(db).await?,
        bills: Bill::find().count(db).await?,
        paychecks: Paycheck::find().count(db).await?,
        cache_entries: CacheEntry::find().count(db).await?,
        audit_entries: AuditLog::find().count(db).await?,
        auto_backups: AutoBackup::find().count(db).await?,
    })
}

/// Empties every ledger table, the cache and the audit log in one transaction.
#[instrument(skip(db))]
pub async fn clear_data(db: &DatabaseConnection) -> Result<()> {
    let txn = db.begin().await?;

    Transaction::delete_many().exec(&txn).await?;
    Envelope::delete_many().exec(&txn).await?;
    Bill::delete_many().exec(&txn).await?;
    Paycheck::delete_many().exec(&txn).await?;
    Budget::delete_many().exec(&txn).await?;
    CacheEntry::delete_many().exec(&txn).await?;
    AuditLog::delete_many().exec(&txn).await?;

    txn.commit().await?;
    info!("All ledger data cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{core::audit, test_utils::*};
    use sea_orm::{ActiveModelTrait, Set};
    use serde_json::json;

    #[tokio::test]
    async fn test_optimize_trims_audit_log() -> Result<()> {
        let db = setup_test_db().await?;

        let rows = (0..AUDIT_LOG_RETENTION + 5).map(|i| audit_log::ActiveModel {
            timestamp: Set(i64::try_from(i).unwrap()),
            action: Set("envelope_updated".to_string()),
            entity_type: Set("envelope".to_string()),
            entity_id: Set(format!("env-{i}")),
            details: Set(None),
            ..Default::default()
        });
        AuditLog::insert_many(rows).exec_without_returning(&db).await?;

        let report = optimize_database(&db).await?;
        assert_eq!(report.trimmed_audit_entries, 5);

        let remaining = AuditLog::find().count(&db).await?;
        assert_eq!(remaining, AUDIT_LOG_RETENTION);

        // The oldest entries are the ones removed
        let oldest = AuditLog::find()
            .order_by_asc(audit_log::Column::Id)
            .one(&db)
            .await?
            .unwrap();
        assert_eq!(oldest.entity_id, "env-5");
        Ok(())
    }

    #[tokio::test]
    async fn test_optimize_removes_expired_cache() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = CacheStore::new(db.clone());

        cache.set("fresh", &json!(1), 60_000, "general").await?;
        crate::entities::cache_entry::ActiveModel {
            key: Set("stale".to_string()),
            value: Set(json!(2)),
            expires_at: Set(1),
            category: Set("general".to_string()),
        }
        .insert(&db)
        .await?;

        let report = optimize_database(&db).await?;
        assert_eq!(report.expired_cache_entries, 1);
        assert_eq!(report.trimmed_audit_entries, 0);
        assert_eq!(CacheEntry::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_and_clear_data() -> Result<()> {
        let db = setup_test_db().await?;
        create_funded_envelope(&db, "Groceries", 10_000).await?;
        create_funded_envelope(&db, "Rent", 50_000).await?;
        audit::record(&db, "envelope_created", "envelope", "env-1", None).await?;

        let stats = database_stats(&db).await?;
        assert_eq!(stats.envelopes, 2);
        assert_eq!(stats.audit_entries, 1);
        assert_eq!(stats.transactions, 0);

        clear_data(&db).await?;
        let stats = database_stats(&db).await?;
        assert_eq!(stats, DatabaseStats::default());
        Ok(())
    }
}
