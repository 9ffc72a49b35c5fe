//! Envelope business logic - create, update, archive, delete-with-redistribution,
//! transfers and unassigned-cash distribution.
//!
//! Every mutation runs inside one database transaction, then invalidates the
//! envelope-derived cache categories and signals the sync notifier.

use crate::{
    cache::{CacheStore, category},
    config::settings::SeedEnvelope,
    core::{
        audit,
        classify::classify_category,
        ledger::UNASSIGNED,
        metadata,
        sync::{Change, QueryGroup, SharedNotifier, publish},
    },
    entities::{Bill, Envelope, EnvelopeType, TransactionType, bill, envelope, transaction},
    errors::{Error, Result},
    storage::timestamps::now_millis,
    validation::{Validate, require_max_len, require_name, require_non_negative},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    QueryOrder, Set, TransactionTrait,
    prelude::*,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Default lifetime of the per-category envelope lists.
pub const DEFAULT_CATEGORY_TTL_MS: i64 = 60_000;

const ENVELOPE_CHANGE_CATEGORIES: &[&str] =
    &[category::ENVELOPES, category::ANALYTICS, category::GENERAL];
const TRANSFER_CHANGE_CATEGORIES: &[&str] = &[
    category::ENVELOPES,
    category::TRANSACTIONS,
    category::ANALYTICS,
    category::GENERAL,
];

/// Input for [`EnvelopeService::add`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewEnvelope {
    /// Caller-supplied id; a UUID is generated when absent
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Budget category
    pub category: String,
    /// Envelope kind; classified from the category when absent
    pub envelope_type: Option<EnvelopeType>,
    /// Savings target in cents
    pub target_amount: i64,
    /// Per-paycheck allocation in cents
    pub biweekly_allocation: i64,
    /// Monthly budget in cents
    pub monthly_budget: i64,
}

impl Validate for NewEnvelope {
    fn validate(&self) -> Result<()> {
        if self.id.as_deref() == Some(UNASSIGNED) {
            return Err(Error::validation("id", "is reserved for unassigned cash"));
        }
        require_name("name", &self.name)?;
        require_max_len("category", &self.category, crate::validation::MAX_NAME_LEN)?;
        require_non_negative("targetAmount", self.target_amount)?;
        require_non_negative("biweeklyAllocation", self.biweekly_allocation)?;
        require_non_negative("monthlyBudget", self.monthly_budget)
    }
}

/// Partial update for [`EnvelopeService::update`]. `None` leaves a field as is.
///
/// Balances are not patchable; they only move through the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopePatch {
    /// New display name
    pub name: Option<String>,
    /// New category
    pub category: Option<String>,
    /// New envelope kind
    pub envelope_type: Option<EnvelopeType>,
    /// New savings target
    pub target_amount: Option<i64>,
    /// New per-paycheck allocation
    pub biweekly_allocation: Option<i64>,
    /// New monthly budget
    pub monthly_budget: Option<i64>,
}

impl Validate for EnvelopePatch {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_name("name", name)?;
        }
        if let Some(category) = &self.category {
            require_max_len("category", category, crate::validation::MAX_NAME_LEN)?;
        }
        for (field, value) in [
            ("targetAmount", self.target_amount),
            ("biweeklyAllocation", self.biweekly_allocation),
            ("monthlyBudget", self.monthly_budget),
        ] {
            if let Some(amount) = value {
                require_non_negative(field, amount)?;
            }
        }
        Ok(())
    }
}

/// Outcome of [`EnvelopeService::delete`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDeletion {
    /// The deleted row as it was before deletion
    pub envelope: envelope::Model,
    /// Balance moved to unassigned cash
    pub redistributed: i64,
    /// Linked bills removed
    pub bills_deleted: u64,
    /// Linked bills detached from the envelope
    pub bills_unlinked: u64,
}

/// Outcome of [`EnvelopeService::distribute_unassigned`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignedDistribution {
    /// Total moved into envelopes
    pub distributed: i64,
    /// Unassigned cash left afterwards
    pub remaining_unassigned: i64,
}

/// Adds `amount_delta` to an envelope balance in a single `UPDATE`.
///
/// `UPDATE envelopes SET current_balance = current_balance + ? WHERE id = ?`
/// avoids the lost-update window of read-modify-write.
pub async fn update_envelope_balance_atomic<C>(
    db: &C,
    envelope_id: &str,
    amount_delta: i64,
) -> Result<envelope::Model>
where
    C: ConnectionTrait,
{
    let result = Envelope::update_many()
        .col_expr(
            envelope::Column::CurrentBalance,
            Expr::col(envelope::Column::CurrentBalance).add(amount_delta),
        )
        .col_expr(envelope::Column::LastModified, Expr::value(now_millis()))
        .filter(envelope::Column::Id.eq(envelope_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::EnvelopeNotFound {
            id: envelope_id.to_string(),
        });
    }

    Envelope::find_by_id(envelope_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::EnvelopeNotFound {
            id: envelope_id.to_string(),
        })
}

/// Looks an envelope up inside a database transaction or fails with
/// [`Error::EnvelopeNotFound`].
pub(crate) async fn require_envelope<C>(db: &C, envelope_id: &str) -> Result<envelope::Model>
where
    C: ConnectionTrait,
{
    Envelope::find_by_id(envelope_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::EnvelopeNotFound {
            id: envelope_id.to_string(),
        })
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Envelope operations.
#[derive(Clone, Debug)]
pub struct EnvelopeService {
    db: DatabaseConnection,
    cache: CacheStore,
    notifier: SharedNotifier,
    category_ttl_ms: i64,
}

impl EnvelopeService {
    /// Creates the service.
    #[must_use]
    pub fn new(db: DatabaseConnection, notifier: SharedNotifier) -> Self {
        Self {
            cache: CacheStore::new(db.clone()),
            db,
            notifier,
            category_ttl_ms: DEFAULT_CATEGORY_TTL_MS,
        }
    }

    /// Overrides how long per-category lists stay cached.
    #[must_use]
    pub fn with_category_ttl(mut self, ttl_ms: i64) -> Self {
        self.category_ttl_ms = ttl_ms;
        self
    }

    async fn publish(&self, change_type: &str, categories: &[&str], groups: &[QueryGroup]) {
        publish(
            &self.cache,
            self.notifier.as_ref(),
            Change {
                change_type,
                cache_categories: categories,
                query_groups: groups,
            },
        )
        .await;
    }

    /// Creates an envelope with a zero balance.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn add(&self, input: NewEnvelope) -> Result<envelope::Model> {
        input.validate()?;

        let envelope_type = input
            .envelope_type
            .unwrap_or_else(|| classify_category(&input.category));
        let id = input
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let txn = self.db.begin().await?;
        let created = envelope::ActiveModel {
            id: Set(id),
            name: Set(input.name.trim().to_string()),
            category: Set(input.category),
            envelope_type: Set(envelope_type),
            current_balance: Set(0),
            target_amount: Set(input.target_amount),
            biweekly_allocation: Set(input.biweekly_allocation),
            monthly_budget: Set(input.monthly_budget),
            archived: Set(false),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        audit::record(&txn, "envelope_created", "envelope", &created.id, None).await?;
        txn.commit().await?;

        info!(envelope_id = %created.id, ?envelope_type, "Envelope created");
        self.publish("envelope_created", ENVELOPE_CHANGE_CATEGORIES, &[QueryGroup::Envelopes])
            .await;
        Ok(created)
    }

    /// Merges a partial update into an envelope.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, envelope_id: &str, patch: EnvelopePatch) -> Result<envelope::Model> {
        patch.validate()?;

        let txn = self.db.begin().await?;
        let existing = require_envelope(&txn, envelope_id).await?;

        let mut active: envelope::ActiveModel = existing.into();
        if let Some(name) = patch.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(category) = patch.category {
            active.category = Set(category);
        }
        if let Some(kind) = patch.envelope_type {
            active.envelope_type = Set(kind);
        }
        if let Some(target) = patch.target_amount {
            active.target_amount = Set(target);
        }
        if let Some(allocation) = patch.biweekly_allocation {
            active.biweekly_allocation = Set(allocation);
        }
        if let Some(budget) = patch.monthly_budget {
            active.monthly_budget = Set(budget);
        }

        let updated = active.update(&txn).await?;
        audit::record(&txn, "envelope_updated", "envelope", envelope_id, None).await?;
        txn.commit().await?;

        self.publish("envelope_updated", ENVELOPE_CHANGE_CATEGORIES, &[QueryGroup::Envelopes])
            .await;
        Ok(updated)
    }

    async fn set_archived(&self, envelope_id: &str, archived: bool) -> Result<envelope::Model> {
        let txn = self.db.begin().await?;
        let existing = require_envelope(&txn, envelope_id).await?;

        let mut active: envelope::ActiveModel = existing.into();
        active.archived = Set(archived);
        let updated = active.update(&txn).await?;

        let action = if archived {
            "envelope_archived"
        } else {
            "envelope_unarchived"
        };
        audit::record(&txn, action, "envelope", envelope_id, None).await?;
        txn.commit().await?;

        self.publish(action, ENVELOPE_CHANGE_CATEGORIES, &[QueryGroup::Envelopes])
            .await;
        Ok(updated)
    }

    /// Hides an envelope while keeping it and its balance for history.
    pub async fn archive(&self, envelope_id: &str) -> Result<envelope::Model> {
        self.set_archived(envelope_id, true).await
    }

    /// Makes an archived envelope active again.
    pub async fn unarchive(&self, envelope_id: &str) -> Result<envelope::Model> {
        self.set_archived(envelope_id, false).await
    }

    /// Physically deletes an envelope.
    ///
    /// A positive balance moves to unassigned cash. Bills linked to the envelope
    /// are deleted when `delete_linked_too` is set, otherwise detached.
    #[instrument(skip(self))]
    pub async fn delete(&self, envelope_id: &str, delete_linked_too: bool) -> Result<EnvelopeDeletion> {
        let txn = self.db.begin().await?;
        let existing = require_envelope(&txn, envelope_id).await?;

        let redistributed = existing.current_balance.max(0);
        if redistributed > 0 {
            metadata::adjust(&txn, redistributed, 0).await?;
        }

        let (bills_deleted, bills_unlinked) = if delete_linked_too {
            let deleted = Bill::delete_many()
                .filter(bill::Column::EnvelopeId.eq(envelope_id))
                .exec(&txn)
                .await?
                .rows_affected;
            (deleted, 0)
        } else {
            let unlinked = Bill::update_many()
                .col_expr(bill::Column::EnvelopeId, Expr::value(Option::<String>::None))
                .col_expr(bill::Column::LastModified, Expr::value(now_millis()))
                .filter(bill::Column::EnvelopeId.eq(envelope_id))
                .exec(&txn)
                .await?
                .rows_affected;
            (0, unlinked)
        };

        Envelope::delete_by_id(envelope_id).exec(&txn).await?;
        audit::record(
            &txn,
            "envelope_deleted",
            "envelope",
            envelope_id,
            Some(json!({
                "redistributed": redistributed,
                "billsDeleted": bills_deleted,
                "billsUnlinked": bills_unlinked,
            })),
        )
        .await?;
        txn.commit().await?;

        info!(
            envelope_id,
            redistributed, bills_deleted, bills_unlinked, "Envelope deleted"
        );
        self.publish(
            "envelope_deleted",
            &[
                category::ENVELOPES,
                category::BILLS,
                category::ANALYTICS,
                category::GENERAL,
            ],
            &[QueryGroup::Envelopes, QueryGroup::Bills, QueryGroup::Budget],
        )
        .await;

        Ok(EnvelopeDeletion {
            envelope: existing,
            redistributed,
            bills_deleted,
            bills_unlinked,
        })
    }

    /// Moves `amount` cents from one envelope to another and records a
    /// `transfer` transaction against the source.
    ///
    /// Nothing is written when the amount is not positive, the envelopes are the
    /// same, or the source balance is short.
    #[instrument(skip(self, description))]
    pub async fn transfer(
        &self,
        from_id: &str,
        to_id: &str,
        amount: i64,
        description: Option<String>,
    ) -> Result<transaction::Model> {
        if amount <= 0 {
            return Err(Error::InvalidAmount { amount });
        }
        if from_id == to_id {
            return Err(Error::validation(
                "toEnvelopeId",
                "must differ from the source envelope",
            ));
        }

        let txn = self.db.begin().await?;
        let from = require_envelope(&txn, from_id).await?;
        let to = require_envelope(&txn, to_id).await?;

        if from.current_balance < amount {
            warn!(
                from_id,
                available = from.current_balance,
                required = amount,
                "Transfer rejected"
            );
            return Err(Error::InsufficientBalance {
                available: from.current_balance,
                required: amount,
            });
        }

        update_envelope_balance_atomic(&txn, from_id, -amount).await?;
        update_envelope_balance_atomic(&txn, to_id, amount).await?;

        let record = transaction::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            date: Set(today()),
            amount: Set(-amount),
            envelope_id: Set(from.id.clone()),
            to_envelope_id: Set(Some(to.id.clone())),
            category: Set("transfer".to_string()),
            transaction_type: Set(TransactionType::Transfer),
            description: Set(description
                .unwrap_or_else(|| format!("Transfer from {} to {}", from.name, to.name))),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        audit::record(
            &txn,
            "envelope_transfer",
            "transaction",
            &record.id,
            Some(json!({"from": from_id, "to": to_id, "amount": amount})),
        )
        .await?;
        txn.commit().await?;

        self.publish(
            "envelope_transfer",
            TRANSFER_CHANGE_CATEGORIES,
            &[QueryGroup::Envelopes, QueryGroup::Transactions],
        )
        .await;
        Ok(record)
    }

    /// Moves money from unassigned cash into envelopes.
    ///
    /// Every amount must be positive and the total must not exceed unassigned
    /// cash. Either every allocation lands or none does.
    #[instrument(skip(self, allocations))]
    pub async fn distribute_unassigned(
        &self,
        allocations: &BTreeMap<String, i64>,
    ) -> Result<UnassignedDistribution> {
        if allocations.is_empty() {
            return Err(Error::validation("allocations", "must not be empty"));
        }
        if let Some(&amount) = allocations.values().find(|&&a| a <= 0) {
            return Err(Error::InvalidAmount { amount });
        }
        let total: i64 = allocations.values().sum();

        let txn = self.db.begin().await?;
        let meta = metadata::get_or_create(&txn).await?;
        if total > meta.unassigned_cash {
            return Err(Error::InsufficientBalance {
                available: meta.unassigned_cash,
                required: total,
            });
        }

        for (envelope_id, &amount) in allocations {
            update_envelope_balance_atomic(&txn, envelope_id, amount).await?;
        }
        metadata::adjust(&txn, -total, 0).await?;
        audit::record(
            &txn,
            "unassigned_distributed",
            "budget",
            metadata::METADATA_ID,
            Some(json!({ "allocations": allocations, "total": total })),
        )
        .await?;
        txn.commit().await?;

        self.publish(
            "unassigned_distributed",
            ENVELOPE_CHANGE_CATEGORIES,
            &[QueryGroup::Envelopes, QueryGroup::Budget],
        )
        .await;

        Ok(UnassignedDistribution {
            distributed: total,
            remaining_unassigned: meta.unassigned_cash - total,
        })
    }

    /// Creates configured envelopes that do not exist yet, matched by name.
    /// Returns how many were created.
    pub async fn seed(&self, seeds: &[SeedEnvelope]) -> Result<usize> {
        let mut created = 0;
        for seed in seeds {
            let exists = Envelope::find()
                .filter(envelope::Column::Name.eq(seed.name.trim()))
                .one(&self.db)
                .await?
                .is_some();
            if exists {
                continue;
            }

            self.add(NewEnvelope {
                id: None,
                name: seed.name.clone(),
                category: seed.category.clone(),
                envelope_type: seed.envelope_type,
                target_amount: seed.target_amount,
                biweekly_allocation: seed.biweekly_allocation,
                monthly_budget: seed.monthly_budget,
            })
            .await?;
            created += 1;
        }
        if created > 0 {
            info!(created, "Seeded envelopes");
        }
        Ok(created)
    }

    /// Looks up an envelope by id.
    pub async fn get(&self, envelope_id: &str) -> Result<Option<envelope::Model>> {
        Envelope::find_by_id(envelope_id)
            .one(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Non-archived envelopes ordered by name.
    pub async fn list_active(&self) -> Result<Vec<envelope::Model>> {
        Envelope::find()
            .filter(envelope::Column::Archived.eq(false))
            .order_by_asc(envelope::Column::Name)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Every envelope, archived included, ordered by name.
    pub async fn list_all(&self) -> Result<Vec<envelope::Model>> {
        Envelope::find()
            .order_by_asc(envelope::Column::Name)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Non-archived envelopes in a category, served from the cache when fresh.
    pub async fn by_category(&self, category_name: &str) -> Result<Vec<envelope::Model>> {
        let key = format!("envelopes_by_category_{category_name}");
        let db = &self.db;
        self.cache
            .get_or_insert_with(&key, self.category_ttl_ms, category::ENVELOPES, || async move {
                Envelope::find()
                    .filter(envelope::Column::Category.eq(category_name))
                    .filter(envelope::Column::Archived.eq(false))
                    .order_by_asc(envelope::Column::Name)
                    .all(db)
                    .await
                    .map_err(Error::from)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{
            metadata::balance_summary,
            sync::{ChannelNotifier, SyncSignal},
        },
        entities::Transaction,
        test_utils::*,
    };
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_add_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let service = EnvelopeService::new(db, noop_notifier());

        let result = service
            .add(NewEnvelope {
                name: "   ".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result = service
            .add(NewEnvelope {
                name: "Rent".to_string(),
                biweekly_allocation: -5,
                ..Default::default()
            })
            .await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_add_classifies_missing_type() -> Result<()> {
        let db = setup_test_db().await?;
        let (notifier, mut rx) = ChannelNotifier::new();
        let service = EnvelopeService::new(db, Arc::new(notifier));

        let created = service
            .add(NewEnvelope {
                name: " Electric ".to_string(),
                category: "Utilities".to_string(),
                ..Default::default()
            })
            .await?;

        assert_eq!(created.name, "Electric");
        assert_eq!(created.envelope_type, EnvelopeType::Liability);
        assert_eq!(created.current_balance, 0);
        assert!(!created.archived);

        let explicit = service
            .add(NewEnvelope {
                name: "Car".to_string(),
                category: "Utilities".to_string(),
                envelope_type: Some(EnvelopeType::Goal),
                ..Default::default()
            })
            .await?;
        assert_eq!(explicit.envelope_type, EnvelopeType::Goal);

        assert_eq!(
            rx.try_recv().unwrap(),
            SyncSignal::InvalidateQueries(QueryGroup::Envelopes)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncSignal::CriticalChange("envelope_created".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_update_keeps_omitted_fields() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        let groceries = create_funded_envelope(&db, "Groceries", 4_000).await?;

        let updated = service
            .update(
                &groceries.id,
                EnvelopePatch {
                    monthly_budget: Some(60_000),
                    ..Default::default()
                },
            )
            .await?;

        assert_eq!(updated.name, "Groceries");
        assert_eq!(updated.category, groceries.category);
        assert_eq!(updated.monthly_budget, 60_000);
        assert_eq!(updated.current_balance, 4_000);
        assert!(updated.last_modified >= groceries.last_modified);

        let missing = service.update("ghost", EnvelopePatch::default()).await;
        assert!(matches!(missing, Err(Error::EnvelopeNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_round_trip() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        let old = create_funded_envelope(&db, "Old", 0).await?;
        create_funded_envelope(&db, "Current", 0).await?;

        service.archive(&old.id).await?;
        let active = service.list_active().await?;
        assert_eq!(active.len(), 1);
        assert_eq!(service.list_all().await?.len(), 2);

        service.unarchive(&old.id).await?;
        assert_eq!(service.list_active().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_redistributes_and_unlinks_bills() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        let rent = create_funded_envelope(&db, "Rent", 25_000).await?;
        set_unassigned(&db, 1_000).await?;
        let bill = create_test_bill(&db, "Landlord", 100_000, Some(rent.id.as_str()), today()).await?;
        let before = balance_summary(&db).await?;

        let result = service.delete(&rent.id, false).await?;
        assert_eq!(result.redistributed, 25_000);
        assert_eq!(result.bills_unlinked, 1);

        let after = balance_summary(&db).await?;
        assert_eq!(after.unassigned_cash, 26_000);
        assert_eq!(after.virtual_balance, before.virtual_balance);

        let bill = Bill::find_by_id(&bill.id).one(&db).await?.unwrap();
        assert_eq!(bill.envelope_id, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_cascades_bills() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        let phone = create_funded_envelope(&db, "Phone", 0).await?;
        create_test_bill(&db, "Carrier", 6_000, Some(phone.id.as_str()), today()).await?;
        create_test_bill(&db, "Unrelated", 1_000, None, today()).await?;

        let result = service.delete(&phone.id, true).await?;
        assert_eq!(result.redistributed, 0);
        assert_eq!(result.bills_deleted, 1);
        assert_eq!(Bill::find().count(&db).await?, 1);
        assert!(service.get(&phone.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_symmetry() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        let a = create_funded_envelope(&db, "A", 10_000).await?;
        let b = create_funded_envelope(&db, "B", 2_500).await?;
        let before = balance_summary(&db).await?;

        let record = service.transfer(&a.id, &b.id, 4_000, None).await?;
        assert_eq!(record.transaction_type, TransactionType::Transfer);
        assert_eq!(record.amount, -4_000);
        assert_eq!(record.to_envelope_id.as_deref(), Some(b.id.as_str()));
        assert_eq!(balance_summary(&db).await?, before);

        service.transfer(&b.id, &a.id, 4_000, None).await?;
        assert_eq!(service.get(&a.id).await?.unwrap().current_balance, 10_000);
        assert_eq!(service.get(&b.id).await?.unwrap().current_balance, 2_500);
        assert_eq!(Transaction::find().count(&db).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_insufficient_balance_mutates_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        let a = create_funded_envelope(&db, "A", 1_000).await?;
        let b = create_funded_envelope(&db, "B", 0).await?;

        let result = service.transfer(&a.id, &b.id, 1_001, None).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientBalance {
                available: 1_000,
                required: 1_001
            })
        ));
        assert_eq!(service.get(&a.id).await?.unwrap().current_balance, 1_000);
        assert_eq!(service.get(&b.id).await?.unwrap().current_balance, 0);
        assert_eq!(Transaction::find().count(&db).await?, 0);

        // Exact balance is allowed
        service.transfer(&a.id, &b.id, 1_000, None).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let service = EnvelopeService::new(db, noop_notifier());

        assert!(matches!(
            service.transfer("a", "b", 0, None).await,
            Err(Error::InvalidAmount { amount: 0 })
        ));
        assert!(matches!(
            service.transfer("a", "a", 10, None).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_distribute_unassigned() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        let a = create_funded_envelope(&db, "A", 0).await?;
        let b = create_funded_envelope(&db, "B", 0).await?;
        set_unassigned(&db, 10_000).await?;

        let too_much = BTreeMap::from([(a.id.clone(), 6_000), (b.id.clone(), 6_000)]);
        assert!(matches!(
            service.distribute_unassigned(&too_much).await,
            Err(Error::InsufficientBalance { .. })
        ));

        let plan = BTreeMap::from([(a.id.clone(), 6_000), (b.id.clone(), 3_000)]);
        let result = service.distribute_unassigned(&plan).await?;
        assert_eq!(result.remaining_unassigned, 1_000);

        let summary = balance_summary(&db).await?;
        assert_eq!(summary.unassigned_cash, 1_000);
        assert_eq!(summary.envelope_total, 9_000);
        assert_eq!(summary.balance_difference, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_by_category_is_cached_until_invalidated() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        service
            .add(NewEnvelope {
                name: "Groceries".to_string(),
                category: "food".to_string(),
                ..Default::default()
            })
            .await?;

        assert_eq!(service.by_category("food").await?.len(), 1);

        // A row written behind the service's back is not seen while cached
        create_funded_envelope_in(&db, "Snacks", "food", 0).await?;
        assert_eq!(service.by_category("food").await?.len(), 1);

        // Any envelope mutation through the service drops the cached list
        service
            .add(NewEnvelope {
                name: "Dining".to_string(),
                category: "food".to_string(),
                ..Default::default()
            })
            .await?;
        assert_eq!(service.by_category("food").await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_skips_existing() -> Result<()> {
        let db = setup_test_db().await?;
        let service = EnvelopeService::new(db.clone(), noop_notifier());
        let seeds = vec![
            SeedEnvelope {
                name: "Rent".to_string(),
                category: "bills".to_string(),
                envelope_type: None,
                target_amount: 0,
                biweekly_allocation: 60_000,
                monthly_budget: 0,
            },
            SeedEnvelope {
                name: "Groceries".to_string(),
                category: "food".to_string(),
                envelope_type: None,
                target_amount: 0,
                biweekly_allocation: 0,
                monthly_budget: 50_000,
            },
        ];

        assert_eq!(service.seed(&seeds).await?, 2);
        assert_eq!(service.seed(&seeds).await?, 0);

        let rent = Envelope::find()
            .filter(envelope::Column::Name.eq("Rent"))
            .one(&db)
            .await?
            .unwrap();
        assert_eq!(rent.envelope_type, EnvelopeType::Liability);
        Ok(())
    }
}
