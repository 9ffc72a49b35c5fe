//! Automatic whole-dataset snapshots and restore.
//!
//! A backup row holds every envelope, transaction, bill, paycheck record and the
//! metadata row as one JSON document. Only the newest `max_backups` rows are kept.
//! Restore replaces the ledger tables in a single database transaction and skips
//! snapshot rows that no longer deserialize or validate.

use crate::{
    cache::CacheStore,
    config::settings::{BackupSettings, DEFAULT_BULK_BATCH_SIZE},
    core::{
        metadata,
        sync::{QueryGroup, SharedNotifier},
    },
    entities::{
        AutoBackup, Bill, Budget, Envelope, Paycheck, Transaction, auto_backup, bill, budget,
        envelope, paycheck, transaction,
    },
    errors::{Error, Result},
    storage::timestamps::now_millis,
    validation::Validate,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Backups kept before the oldest is evicted.
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Why a backup was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Taken right before a sync
    SyncTriggered,
    /// Requested by the user
    Manual,
    /// Taken on a timer
    Scheduled,
}

impl BackupKind {
    /// Value stored in `auto_backups.backup_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyncTriggered => "sync_triggered",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    envelopes: &'a [envelope::Model],
    transactions: &'a [transaction::Model],
    liabilities: &'a [bill::Model],
    paychecks: &'a [paycheck::Model],
    metadata: Option<&'a budget::Model>,
}

/// Snapshot as read back, before each row is checked.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSnapshot {
    envelopes: Vec<Value>,
    transactions: Vec<Value>,
    liabilities: Vec<Value>,
    paychecks: Vec<Value>,
    metadata: Option<Value>,
}

/// Rows written by [`BackupService::restore`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    /// Backup restored
    pub backup_id: String,
    /// Envelopes restored
    pub envelopes: usize,
    /// Transactions restored
    pub transactions: usize,
    /// Bills restored
    pub bills: usize,
    /// Paycheck records restored
    pub paychecks: usize,
    /// Whether the metadata row was restored
    pub metadata: bool,
    /// Snapshot rows skipped as invalid
    pub skipped: usize,
}

/// Aggregate figures over the stored backups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    /// Backups stored
    pub count: usize,
    /// Sum of their size estimates in bytes
    pub total_size: i64,
    /// Timestamp of the newest backup
    pub newest: Option<i64>,
    /// Timestamp of the oldest backup
    pub oldest: Option<i64>,
}

/// Formats a byte count as `B`, `KB` or `MB`.
// Cast safety: display only
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{:.1} MB", b as f64 / MB as f64),
    }
}

/// Deserializes and validates each row, dropping the ones that fail.
fn checked_rows<T>(table: &str, rows: Vec<Value>, skipped: &mut usize) -> Vec<T>
where
    T: DeserializeOwned + Validate,
{
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let row = serde_json::from_value::<T>(raw)
                .map_err(Error::from)
                .and_then(|row| row.validate().map(|()| row));
            match row {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(table, index, error = %e, "Skipping invalid snapshot row");
                    *skipped += 1;
                    None
                }
            }
        })
        .collect()
}

/// Snapshot and restore of the ledger tables.
#[derive(Clone, Debug)]
pub struct BackupService {
    db: DatabaseConnection,
    cache: CacheStore,
    notifier: SharedNotifier,
    enabled: bool,
    max_backups: usize,
    batch_size: usize,
}

impl BackupService {
    /// Creates an enabled service keeping [`DEFAULT_MAX_BACKUPS`] backups.
    #[must_use]
    pub fn new(db: DatabaseConnection, notifier: SharedNotifier) -> Self {
        Self {
            cache: CacheStore::new(db.clone()),
            db,
            notifier,
            enabled: true,
            max_backups: DEFAULT_MAX_BACKUPS,
            batch_size: DEFAULT_BULK_BATCH_SIZE,
        }
    }

    /// Applies the `[backup]` settings.
    #[must_use]
    pub fn with_settings(mut self, settings: BackupSettings) -> Self {
        self.enabled = settings.enabled;
        self.max_backups = settings.max_backups.max(1);
        self
    }

    /// Overrides the restore batch size. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Whether backups are taken.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Snapshots the dataset before a sync. Returns `None` when backups are
    /// disabled.
    pub async fn create_pre_sync_backup(
        &self,
        sync_type: &str,
    ) -> Result<Option<auto_backup::Model>> {
        if !self.enabled {
            debug!(sync_type, "Auto-backup disabled, skipping");
            return Ok(None);
        }
        self.create(BackupKind::SyncTriggered, Some(sync_type))
            .await
            .map(Some)
    }

    /// Snapshots the dataset and evicts backups beyond the retention limit.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        kind: BackupKind,
        sync_type: Option<&str>,
    ) -> Result<auto_backup::Model> {
        let started = Instant::now();

        let envelopes = Envelope::find().all(&self.db).await?;
        let transactions = Transaction::find().all(&self.db).await?;
        let liabilities = Bill::find().all(&self.db).await?;
        let paychecks = Paycheck::find().all(&self.db).await?;
        let metadata_row = Budget::find_by_id(metadata::METADATA_ID).one(&self.db).await?;

        let snapshot = serde_json::to_value(SnapshotRef {
            envelopes: &envelopes,
            transactions: &transactions,
            liabilities: &liabilities,
            paychecks: &paychecks,
            metadata: metadata_row.as_ref(),
        })?;
        let size_estimate = snapshot.to_string().len();
        let record_count = envelopes.len()
            + transactions.len()
            + liabilities.len()
            + paychecks.len()
            + usize::from(metadata_row.is_some());

        let timestamp = now_millis();
        let label = sync_type.unwrap_or(kind.as_str());
        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect();
        let id = format!("auto_backup_{label}_{timestamp}_{suffix}");

        let backup = auto_backup::ActiveModel {
            id: Set(id),
            timestamp: Set(timestamp),
            backup_type: Set(kind.as_str().to_string()),
            sync_type: Set(sync_type.map(str::to_string)),
            snapshot: Set(snapshot),
            record_count: Set(i64::try_from(record_count).unwrap_or(i64::MAX)),
            size_estimate: Set(i64::try_from(size_estimate).unwrap_or(i64::MAX)),
            duration_ms: Set(i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)),
        }
        .insert(&self.db)
        .await?;

        let evicted = self.enforce_retention().await?;
        info!(
            backup_id = %backup.id,
            records = record_count,
            size = %format_size(backup.size_estimate),
            evicted,
            "Auto-backup created"
        );
        Ok(backup)
    }

    async fn enforce_retention(&self) -> Result<u64> {
        let stale: Vec<String> = AutoBackup::find()
            .select_only()
            .column(auto_backup::Column::Id)
            .order_by_desc(auto_backup::Column::Timestamp)
            .order_by_desc(auto_backup::Column::Id)
            .offset(u64::try_from(self.max_backups).unwrap_or(u64::MAX))
            .into_tuple()
            .all(&self.db)
            .await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let deleted = AutoBackup::delete_many()
            .filter(auto_backup::Column::Id.is_in(stale))
            .exec(&self.db)
            .await?;
        Ok(deleted.rows_affected)
    }

    async fn insert_batched<A>(&self, txn: &DatabaseTransaction, rows: Vec<A>) -> Result<()>
    where
        A: ActiveModelTrait,
        <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    {
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let batch: Vec<A> = rows.by_ref().take(self.batch_size).collect();
            <A::Entity as EntityTrait>::insert_many(batch)
                .exec_without_returning(txn)
                .await?;
        }
        Ok(())
    }

    /// Replaces the ledger tables with a backup's contents.
    ///
    /// Invalid rows are logged and skipped. The metadata row gets a fresh
    /// `last_modified` so sync treats the restore as the newest state.
    #[instrument(skip(self))]
    pub async fn restore(&self, backup_id: &str) -> Result<RestoreReport> {
        let backup = AutoBackup::find_by_id(backup_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::BackupNotFound {
                id: backup_id.to_string(),
            })?;
        let raw: RawSnapshot = serde_json::from_value(backup.snapshot)?;

        let mut skipped = 0;
        let envelopes: Vec<envelope::Model> =
            checked_rows("envelopes", raw.envelopes, &mut skipped);
        let transactions: Vec<transaction::Model> =
            checked_rows("transactions", raw.transactions, &mut skipped);
        let bills: Vec<bill::Model> = checked_rows("bills", raw.liabilities, &mut skipped);
        let paychecks: Vec<paycheck::Model> =
            checked_rows("paycheck_history", raw.paychecks, &mut skipped);
        let metadata_row = raw
            .metadata
            .map(serde_json::from_value::<budget::Model>)
            .transpose()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Skipping invalid snapshot metadata");
                skipped += 1;
                None
            });

        let report = RestoreReport {
            backup_id: backup_id.to_string(),
            envelopes: envelopes.len(),
            transactions: transactions.len(),
            bills: bills.len(),
            paychecks: paychecks.len(),
            metadata: metadata_row.is_some(),
            skipped,
        };

        let txn = self.db.begin().await?;
        Transaction::delete_many().exec(&txn).await?;
        Paycheck::delete_many().exec(&txn).await?;
        Bill::delete_many().exec(&txn).await?;
        Envelope::delete_many().exec(&txn).await?;

        self.insert_batched(&txn, active_models(envelopes)).await?;
        self.insert_batched(&txn, active_models(transactions)).await?;
        self.insert_batched(&txn, active_models(bills)).await?;
        self.insert_batched(&txn, active_models(paychecks)).await?;

        if let Some(row) = metadata_row {
            metadata::set_balances(&txn, row.unassigned_cash, row.actual_balance).await?;
        }
        txn.commit().await?;

        if let Err(e) = self.cache.clear().await {
            warn!(error = %e, "Cache clear after restore failed");
        }
        for group in [
            QueryGroup::Envelopes,
            QueryGroup::Transactions,
            QueryGroup::Bills,
            QueryGroup::Paychecks,
            QueryGroup::Budget,
            QueryGroup::Analytics,
        ] {
            self.notifier.invalidate_queries(group);
        }
        self.notifier.trigger_critical_change("backup_restored");

        info!(?report, "Backup restored");
        Ok(report)
    }

    /// Stored backups, newest first.
    pub async fn list(&self) -> Result<Vec<auto_backup::Model>> {
        AutoBackup::find()
            .order_by_desc(auto_backup::Column::Timestamp)
            .order_by_desc(auto_backup::Column::Id)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Deletes one backup.
    pub async fn delete(&self, backup_id: &str) -> Result<()> {
        let result = AutoBackup::delete_by_id(backup_id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(Error::BackupNotFound {
                id: backup_id.to_string(),
            });
        }
        Ok(())
    }

    /// Deletes every backup and returns how many were removed.
    pub async fn delete_all(&self) -> Result<u64> {
        let result = AutoBackup::delete_many().exec(&self.db).await?;
        info!(deleted = result.rows_affected, "All auto-backups deleted");
        Ok(result.rows_affected)
    }

    /// Count, total size and age range of the stored backups.
    pub async fn stats(&self) -> Result<BackupStats> {
        let rows: Vec<(i64, i64)> = AutoBackup::find()
            .select_only()
            .column(auto_backup::Column::Timestamp)
            .column(auto_backup::Column::SizeEstimate)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(BackupStats {
            count: rows.len(),
            total_size: rows.iter().map(|(_, size)| size).sum(),
            newest: rows.iter().map(|(ts, _)| *ts).max(),
            oldest: rows.iter().map(|(ts, _)| *ts).min(),
        })
    }
}

fn active_models<M, A>(rows: Vec<M>) -> Vec<A>
where
    M: IntoActiveModel<A>,
    A: ActiveModelTrait,
{
    rows.into_iter()
        .map(|row| row.into_active_model().reset_all())
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{
            envelope::EnvelopeService,
            metadata::balance_summary,
            transaction::{NewTransaction, TransactionService},
        },
        entities::TransactionType,
        test_utils::*,
    };
    use chrono::NaiveDate;
    use sea_orm::PaginatorTrait;
    use serde_json::json;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn test_backup_and_restore_round_trip() -> Result<()> {
        let db = setup_test_db().await?;
        let backups = BackupService::new(db.clone(), noop_notifier());
        for (name, balance) in [("Groceries", 10_000), ("Rent", 50_000), ("Gas", 4_000)] {
            create_funded_envelope(&db, name, balance).await?;
        }
        let groceries = Envelope::find()
            .filter(envelope::Column::Name.eq("Groceries"))
            .one(&db)
            .await?
            .unwrap();
        TransactionService::new(db.clone(), noop_notifier())
            .add(NewTransaction {
                id: None,
                date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                amount: -2_500,
                envelope_id: groceries.id.clone(),
                category: "food".to_string(),
                transaction_type: TransactionType::Expense,
                description: "Market".to_string(),
            })
            .await?;

        let envelopes_before = Envelope::find()
            .order_by_asc(envelope::Column::Id)
            .all(&db)
            .await?;
        let transactions_before = Transaction::find().all(&db).await?;
        let summary_before = balance_summary(&db).await?;

        let backup = backups.create_pre_sync_backup("full").await?.unwrap();
        assert!(backup.id.starts_with("auto_backup_full_"));
        assert_eq!(backup.record_count, 5);

        EnvelopeService::new(db.clone(), noop_notifier())
            .delete(&groceries.id, true)
            .await?;
        metadata::set_balances(&db, 0, 0).await?;

        let report = backups.restore(&backup.id).await?;
        assert_eq!(report.envelopes, 3);
        assert_eq!(report.transactions, 1);
        assert_eq!(report.skipped, 0);
        assert!(report.metadata);

        let envelopes_after = Envelope::find()
            .order_by_asc(envelope::Column::Id)
            .all(&db)
            .await?;
        assert_eq!(envelopes_after, envelopes_before);
        assert_eq!(Transaction::find().all(&db).await?, transactions_before);
        assert_eq!(balance_summary(&db).await?, summary_before);
        Ok(())
    }

    #[tokio::test]
    async fn test_retention_keeps_newest() -> Result<()> {
        let db = setup_test_db().await?;
        let backups = BackupService::new(db.clone(), noop_notifier()).with_settings(
            BackupSettings {
                enabled: true,
                max_backups: 3,
            },
        );

        for _ in 0..5 {
            backups.create(BackupKind::Manual, None).await?;
        }

        let stats = backups.stats().await?;
        assert_eq!(stats.count, 3);
        assert_eq!(backups.list().await?.len(), 3);
        assert_eq!(backups.delete_all().await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_service_skips_backup() -> Result<()> {
        let db = setup_test_db().await?;
        let backups = BackupService::new(db.clone(), noop_notifier()).with_settings(
            BackupSettings {
                enabled: false,
                max_backups: 5,
            },
        );

        assert!(backups.create_pre_sync_backup("full").await?.is_none());
        assert_eq!(AutoBackup::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_skips_invalid_rows() -> Result<()> {
        init_test_tracing();
        let db = setup_test_db().await?;
        let backups = BackupService::new(db.clone(), noop_notifier()).with_batch_size(1);
        create_funded_envelope(&db, "Keep", 1_000).await?;
        let good = Envelope::find().one(&db).await?.unwrap();
        let mut nameless = serde_json::to_value(&good).unwrap();
        nameless["id"] = json!("env-nameless");
        nameless["name"] = json!("  ");

        auto_backup::ActiveModel {
            id: Set("auto_backup_manual_1_abc".to_string()),
            timestamp: Set(1),
            backup_type: Set("manual".to_string()),
            sync_type: Set(None),
            snapshot: Set(json!({
                "envelopes": [good, nameless, { "garbage": true }],
                "transactions": [],
            })),
            record_count: Set(3),
            size_estimate: Set(0),
            duration_ms: Set(0),
        }
        .insert(&db)
        .await?;

        let report = backups.restore("auto_backup_manual_1_abc").await?;
        assert_eq!(report.envelopes, 1);
        assert_eq!(report.skipped, 2);
        assert!(!report.metadata);
        assert_eq!(Envelope::find().count(&db).await?, 1);

        let missing = backups.restore("nope").await;
        assert!(matches!(missing, Err(Error::BackupNotFound { .. })));
        assert!(matches!(
            backups.delete("nope").await,
            Err(Error::BackupNotFound { .. })
        ));
        Ok(())
    }
}
