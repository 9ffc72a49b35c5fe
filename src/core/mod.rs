//! Ledger business logic, independent of any UI or sync transport.

/// Append-only audit trail
pub mod audit;
/// Pre-sync snapshots and restore
pub mod backup;
/// Bill records and payment
pub mod bill;
/// Bill-envelope priority and cash distribution strategies
pub mod bill_funding;
/// Category keyword classification
pub mod classify;
/// Envelope operations
pub mod envelope;
/// Transaction delta rules and apply/reverse
pub mod ledger;
/// Unassigned cash and actual balance
pub mod metadata;
/// Paycheck processing
pub mod paycheck;
/// Interfaces for the remote sync collaborator
pub mod sync;
/// Transaction operations
pub mod transaction;

use crate::{
    cache::{CacheStore, category},
    config::settings::LedgerSettings,
    errors::Result,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

const BALANCE_SUMMARY_KEY: &str = "balance_summary";

/// Every service wired to one connection and notifier.
#[derive(Clone, Debug)]
pub struct Ledger {
    /// Envelope operations
    pub envelopes: envelope::EnvelopeService,
    /// Transaction operations
    pub transactions: transaction::TransactionService,
    /// Paycheck operations
    pub paychecks: paycheck::PaycheckService,
    /// Bill operations
    pub bills: bill::BillService,
    /// Auto-backups
    pub backups: backup::BackupService,
    db: DatabaseConnection,
    cache: CacheStore,
    summary_ttl_ms: i64,
}

impl Ledger {
    /// Builds the services from settings.
    #[must_use]
    pub fn new(
        db: &DatabaseConnection,
        notifier: &sync::SharedNotifier,
        settings: &LedgerSettings,
    ) -> Self {
        Self {
            envelopes: envelope::EnvelopeService::new(db.clone(), Arc::clone(notifier))
                .with_category_ttl(settings.cache.envelope_category_ttl_ms),
            transactions: transaction::TransactionService::new(db.clone(), Arc::clone(notifier))
                .with_batch_size(settings.bulk_batch_size),
            paychecks: paycheck::PaycheckService::new(db.clone(), Arc::clone(notifier)),
            bills: bill::BillService::new(db.clone(), Arc::clone(notifier)),
            backups: backup::BackupService::new(db.clone(), Arc::clone(notifier))
                .with_settings(settings.backup)
                .with_batch_size(settings.bulk_batch_size),
            cache: CacheStore::new(db.clone()),
            db: db.clone(),
            summary_ttl_ms: settings.cache.default_ttl_ms,
        }
    }

    /// Balance summary, served from the cache until a mutation touches the
    /// analytics category.
    pub async fn balance_summary(&self) -> Result<metadata::BalanceSummary> {
        let db = &self.db;
        self.cache
            .get_or_insert_with(
                BALANCE_SUMMARY_KEY,
                self.summary_ttl_ms,
                category::ANALYTICS,
                || async move { metadata::balance_summary(db).await },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{ledger::UNASSIGNED, transaction::NewTransaction},
        entities::TransactionType,
        test_utils::*,
    };
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_cached_summary_refreshes_after_mutation() -> Result<()> {
        let db = setup_test_db().await?;
        let ledger = Ledger::new(&db, &noop_notifier(), &LedgerSettings::default());

        let empty = ledger.balance_summary().await?;
        assert_eq!(empty.virtual_balance, 0);

        ledger
            .transactions
            .add(NewTransaction {
                id: None,
                date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                amount: 12_000,
                envelope_id: UNASSIGNED.to_string(),
                category: "salary".to_string(),
                transaction_type: TransactionType::Income,
                description: String::new(),
            })
            .await?;

        let summary = ledger.balance_summary().await?;
        assert_eq!(summary.unassigned_cash, 12_000);
        assert_eq!(summary.actual_balance, 12_000);
        Ok(())
    }
}
