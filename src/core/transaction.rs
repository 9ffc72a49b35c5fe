//! Transaction business logic - add, update, delete, split and bulk operations.
//!
//! Every operation that changes money persists the row and applies its ledger
//! effect on the same database transaction, so a row never exists without its
//! balance effect. Expense amounts are stored negative and income positive
//! regardless of the sign the caller used.

use crate::{
    cache::{CacheStore, category},
    config::settings::DEFAULT_BULK_BATCH_SIZE,
    core::{
        audit,
        envelope::require_envelope,
        ledger::{apply_transaction, is_unassigned},
        sync::{Change, QueryGroup, SharedNotifier, publish},
    },
    entities::{Transaction, TransactionType, transaction},
    errors::{Error, Result},
    validation::{
        MAX_DESCRIPTION_LEN, MAX_NAME_LEN, Validate, require_max_len, require_name, validate_all,
    },
};
use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

const TRANSACTION_CHANGE_CATEGORIES: &[&str] = &[
    category::TRANSACTIONS,
    category::ENVELOPES,
    category::ANALYTICS,
    category::GENERAL,
];
const TRANSACTION_QUERY_GROUPS: &[QueryGroup] = &[
    QueryGroup::Transactions,
    QueryGroup::Envelopes,
    QueryGroup::Budget,
];

/// Gives an amount the sign its type implies.
#[must_use]
pub const fn normalize_amount(kind: TransactionType, amount: i64) -> i64 {
    match kind {
        TransactionType::Expense => -amount.abs(),
        TransactionType::Income => amount.abs(),
        TransactionType::Transfer => amount,
    }
}

/// Input for [`TransactionService::add`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    /// Caller-supplied id; a UUID is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Calendar date
    pub date: NaiveDate,
    /// Amount in cents; the sign is normalized from the type
    pub amount: i64,
    /// Target envelope id, or `"unassigned"`
    pub envelope_id: String,
    /// Spending category
    #[serde(default)]
    pub category: String,
    /// Income or expense
    pub transaction_type: TransactionType,
    /// Free-form description
    #[serde(default)]
    pub description: String,
}

impl NewTransaction {
    fn normalized(mut self) -> Self {
        self.amount = normalize_amount(self.transaction_type, self.amount);
        self
    }
}

impl Validate for NewTransaction {
    fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(Error::InvalidAmount { amount: 0 });
        }
        if self.transaction_type == TransactionType::Transfer {
            return Err(Error::validation(
                "transactionType",
                "transfers are created through envelope transfers",
            ));
        }
        require_name("envelopeId", &self.envelope_id)?;
        require_max_len("category", &self.category, MAX_NAME_LEN)?;
        require_max_len("description", &self.description, MAX_DESCRIPTION_LEN)
    }
}

/// Partial update for [`TransactionService::update`]. `None` leaves a field as
/// is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionPatch {
    /// New date
    pub date: Option<NaiveDate>,
    /// New amount; sign is normalized from the resulting type
    pub amount: Option<i64>,
    /// New target envelope
    pub envelope_id: Option<String>,
    /// New category
    pub category: Option<String>,
    /// New type
    pub transaction_type: Option<TransactionType>,
    /// New description
    pub description: Option<String>,
}

impl TransactionPatch {
    fn category_only(category: String) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    /// Applies the patch to a copy of `existing`.
    fn merge(&self, existing: &transaction::Model) -> transaction::Model {
        let mut merged = existing.clone();
        if let Some(date) = self.date {
            merged.date = date;
        }
        if let Some(kind) = self.transaction_type {
            merged.transaction_type = kind;
        }
        if let Some(amount) = self.amount {
            merged.amount = amount;
        }
        if let Some(envelope_id) = &self.envelope_id {
            merged.envelope_id.clone_from(envelope_id);
        }
        if let Some(category) = &self.category {
            merged.category.clone_from(category);
        }
        if let Some(description) = &self.description {
            merged.description.clone_from(description);
        }
        merged.amount = normalize_amount(merged.transaction_type, merged.amount);
        merged
    }
}

impl Validate for TransactionPatch {
    fn validate(&self) -> Result<()> {
        if self.amount == Some(0) {
            return Err(Error::InvalidAmount { amount: 0 });
        }
        if self.transaction_type == Some(TransactionType::Transfer) {
            return Err(Error::validation(
                "transactionType",
                "cannot change a transaction into a transfer",
            ));
        }
        if let Some(envelope_id) = &self.envelope_id {
            require_name("envelopeId", envelope_id)?;
        }
        if let Some(category) = &self.category {
            require_max_len("category", category, MAX_NAME_LEN)?;
        }
        if let Some(description) = &self.description {
            require_max_len("description", description, MAX_DESCRIPTION_LEN)?;
        }
        Ok(())
    }
}

/// Whether the ledger effect of `merged` differs from that of `existing`.
fn changes_ledger(existing: &transaction::Model, merged: &transaction::Model) -> bool {
    existing.amount != merged.amount
        || existing.envelope_id != merged.envelope_id
        || existing.transaction_type != merged.transaction_type
}

/// One child of a [`TransactionService::split`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitPart {
    /// Amount in cents; the sign follows the original's type
    pub amount: i64,
    /// Category of this part
    pub category: String,
    /// Description; the original's when absent
    #[serde(default)]
    pub description: Option<String>,
    /// Target envelope; the original's when absent
    #[serde(default)]
    pub envelope_id: Option<String>,
}

impl Validate for SplitPart {
    fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(Error::InvalidAmount { amount: 0 });
        }
        require_max_len("category", &self.category, MAX_NAME_LEN)?;
        if let Some(envelope_id) = &self.envelope_id {
            require_name("envelopeId", envelope_id)?;
        }
        Ok(())
    }
}

/// One item of a [`TransactionService::bulk`] call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
pub enum BulkOperation {
    /// Delete and reverse a transaction
    Delete {
        /// Transaction id
        id: String,
    },
    /// Merge a partial update
    Update {
        /// Transaction id
        id: String,
        /// Fields to change
        patch: TransactionPatch,
    },
    /// Change only the category
    Classify {
        /// Transaction id
        id: String,
        /// New category
        category: String,
    },
}

impl BulkOperation {
    fn id(&self) -> &str {
        match self {
            Self::Delete { id } | Self::Update { id, .. } | Self::Classify { id, .. } => id,
        }
    }
}

/// A failed item of a bulk call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemError {
    /// Position in the input list
    pub index: usize,
    /// Transaction id the item referred to
    pub id: String,
    /// Why it failed
    pub message: String,
}

/// Per-item results of a bulk call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    /// Items applied
    pub success_count: usize,
    /// Items that failed and were skipped
    pub failure_count: usize,
    /// Details of each failure
    pub errors: Vec<BulkItemError>,
}

/// Transaction operations.
#[derive(Clone, Debug)]
pub struct TransactionService {
    db: DatabaseConnection,
    cache: CacheStore,
    notifier: SharedNotifier,
    batch_size: usize,
}

impl TransactionService {
    /// Creates the service.
    #[must_use]
    pub fn new(db: DatabaseConnection, notifier: SharedNotifier) -> Self {
        Self {
            cache: CacheStore::new(db.clone()),
            db,
            notifier,
            batch_size: DEFAULT_BULK_BATCH_SIZE,
        }
    }

    /// Overrides the bulk batch size. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn publish(&self, change_type: &str) {
        publish(
            &self.cache,
            self.notifier.as_ref(),
            Change {
                change_type,
                cache_categories: TRANSACTION_CHANGE_CATEGORIES,
                query_groups: TRANSACTION_QUERY_GROUPS,
            },
        )
        .await;
    }

    /// Records a transaction and applies it to the ledger.
    #[instrument(skip(self, input), fields(envelope_id = %input.envelope_id))]
    pub async fn add(&self, input: NewTransaction) -> Result<transaction::Model> {
        let input = input.normalized();
        input.validate()?;

        let txn = self.db.begin().await?;
        if !is_unassigned(&input.envelope_id) {
            require_envelope(&txn, &input.envelope_id).await?;
        }

        let created = transaction::ActiveModel {
            id: Set(input
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
            date: Set(input.date),
            amount: Set(input.amount),
            envelope_id: Set(input.envelope_id),
            to_envelope_id: Set(None),
            category: Set(input.category),
            transaction_type: Set(input.transaction_type),
            description: Set(input.description),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let effect = apply_transaction(&txn, &created, false).await?;
        audit::record(
            &txn,
            "transaction_added",
            "transaction",
            &created.id,
            Some(json!({ "amount": created.amount, "envelopeId": created.envelope_id })),
        )
        .await?;
        txn.commit().await?;

        debug!(transaction_id = %created.id, ?effect, "Transaction added");
        self.publish("transaction_added").await;
        Ok(created)
    }

    /// Merges a partial update. If the amount, target or type changes, the old
    /// effect is reversed and the new one applied in the same database
    /// transaction.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        transaction_id: &str,
        patch: TransactionPatch,
    ) -> Result<transaction::Model> {
        patch.validate()?;

        let txn = self.db.begin().await?;
        let updated = update_row(&txn, transaction_id, &patch).await?;
        txn.commit().await?;

        self.publish("transaction_updated").await;
        Ok(updated)
    }

    /// Reverses a transaction's ledger effect and deletes it. Returns the
    /// deleted row.
    #[instrument(skip(self))]
    pub async fn delete(&self, transaction_id: &str) -> Result<transaction::Model> {
        let txn = self.db.begin().await?;
        let deleted = delete_row(&txn, transaction_id).await?;
        txn.commit().await?;

        self.publish("transaction_deleted").await;
        Ok(deleted)
    }

    /// Replaces a transaction with several children, each ledgered forward.
    ///
    /// The children inherit the original's date and type. Their amounts are not
    /// required to add up to the original.
    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    pub async fn split(
        &self,
        transaction_id: &str,
        parts: Vec<SplitPart>,
    ) -> Result<Vec<transaction::Model>> {
        if parts.is_empty() {
            return Err(Error::validation("parts", "must not be empty"));
        }
        validate_all(&parts)?;

        let txn = self.db.begin().await?;
        let original = require_transaction(&txn, transaction_id).await?;
        if original.transaction_type == TransactionType::Transfer {
            return Err(Error::validation(
                "transactionType",
                "transfers cannot be split",
            ));
        }

        apply_transaction(&txn, &original, true).await?;
        Transaction::delete_by_id(transaction_id).exec(&txn).await?;

        let mut children = Vec::with_capacity(parts.len());
        for part in parts {
            let envelope_id = part
                .envelope_id
                .unwrap_or_else(|| original.envelope_id.clone());
            if !is_unassigned(&envelope_id) {
                require_envelope(&txn, &envelope_id).await?;
            }

            let child = transaction::ActiveModel {
                id: Set(uuid::Uuid::new_v4().to_string()),
                date: Set(original.date),
                amount: Set(normalize_amount(original.transaction_type, part.amount)),
                envelope_id: Set(envelope_id),
                to_envelope_id: Set(None),
                category: Set(part.category),
                transaction_type: Set(original.transaction_type),
                description: Set(part
                    .description
                    .unwrap_or_else(|| original.description.clone())),
                ..Default::default()
            }
            .insert(&txn)
            .await?;

            apply_transaction(&txn, &child, false).await?;
            children.push(child);
        }

        let child_ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
        audit::record(
            &txn,
            "transaction_split",
            "transaction",
            transaction_id,
            Some(json!({ "children": child_ids })),
        )
        .await?;
        txn.commit().await?;

        info!(transaction_id, children = children.len(), "Transaction split");
        self.publish("transaction_split").await;
        Ok(children)
    }

    async fn apply_bulk_item(&self, operation: &BulkOperation) -> Result<()> {
        let txn = self.db.begin().await?;
        match operation {
            BulkOperation::Delete { id } => {
                delete_row(&txn, id).await?;
            }
            BulkOperation::Update { id, patch } => {
                patch.validate()?;
                update_row(&txn, id, patch).await?;
            }
            BulkOperation::Classify { id, category } => {
                let patch = TransactionPatch::category_only(category.clone());
                patch.validate()?;
                update_row(&txn, id, &patch).await?;
            }
        }
        txn.commit().await?;
        Ok(())
    }

    /// Applies a list of operations in order, in batches. Each item commits or
    /// fails on its own; failures are collected and do not stop the run.
    #[instrument(skip(self, operations), fields(items = operations.len()))]
    pub async fn bulk(&self, operations: &[BulkOperation]) -> BulkReport {
        let mut report = BulkReport::default();

        for (batch_number, batch) in operations.chunks(self.batch_size).enumerate() {
            debug!(batch_number, size = batch.len(), "Processing bulk batch");
            for (offset, operation) in batch.iter().enumerate() {
                let index = batch_number * self.batch_size + offset;
                match self.apply_bulk_item(operation).await {
                    Ok(()) => report.success_count += 1,
                    Err(e) => {
                        warn!(index, id = operation.id(), error = %e, "Bulk item failed");
                        report.failure_count += 1;
                        report.errors.push(BulkItemError {
                            index,
                            id: operation.id().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        if report.success_count > 0 {
            self.publish("transactions_bulk_updated").await;
        }
        info!(
            success = report.success_count,
            failed = report.failure_count,
            "Bulk operation finished"
        );
        report
    }

    /// Looks up a transaction by id.
    pub async fn get(&self, transaction_id: &str) -> Result<Option<transaction::Model>> {
        Transaction::find_by_id(transaction_id)
            .one(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Transactions touching an envelope, as target or transfer receiver,
    /// newest first.
    pub async fn for_envelope(&self, envelope_id: &str) -> Result<Vec<transaction::Model>> {
        Transaction::find()
            .filter(
                transaction::Column::EnvelopeId
                    .eq(envelope_id)
                    .or(transaction::Column::ToEnvelopeId.eq(envelope_id)),
            )
            .order_by_desc(transaction::Column::Date)
            .order_by_desc(transaction::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Transactions dated within `start..=end`, newest first.
    pub async fn in_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<transaction::Model>> {
        Transaction::find()
            .filter(transaction::Column::Date.between(start, end))
            .order_by_desc(transaction::Column::Date)
            .order_by_desc(transaction::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Transactions of one type, newest first.
    pub async fn by_type(&self, kind: TransactionType) -> Result<Vec<transaction::Model>> {
        Transaction::find()
            .filter(transaction::Column::TransactionType.eq(kind))
            .order_by_desc(transaction::Column::Date)
            .order_by_desc(transaction::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }
}

async fn update_row(
    txn: &DatabaseTransaction,
    transaction_id: &str,
    patch: &TransactionPatch,
) -> Result<transaction::Model> {
    let existing = require_transaction(txn, transaction_id).await?;
    let merged = patch.merge(&existing);
    let reledgered = changes_ledger(&existing, &merged);

    if reledgered {
        if existing.transaction_type == TransactionType::Transfer {
            return Err(Error::validation(
                "transactionType",
                "transfer amounts and envelopes cannot be edited",
            ));
        }
        if !is_unassigned(&merged.envelope_id) {
            require_envelope(txn, &merged.envelope_id).await?;
        }
        apply_transaction(txn, &existing, true).await?;
        apply_transaction(txn, &merged, false).await?;
    }

    let updated = merged.into_active_model().reset_all().update(txn).await?;
    audit::record(
        txn,
        "transaction_updated",
        "transaction",
        transaction_id,
        Some(json!({ "reledgered": reledgered })),
    )
    .await?;
    Ok(updated)
}

async fn delete_row(
    txn: &DatabaseTransaction,
    transaction_id: &str,
) -> Result<transaction::Model> {
    let existing = require_transaction(txn, transaction_id).await?;
    apply_transaction(txn, &existing, true).await?;
    Transaction::delete_by_id(transaction_id).exec(txn).await?;
    audit::record(
        txn,
        "transaction_deleted",
        "transaction",
        transaction_id,
        Some(json!({ "amount": existing.amount, "envelopeId": existing.envelope_id })),
    )
    .await?;
    Ok(existing)
}

async fn require_transaction<C>(db: &C, transaction_id: &str) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::TransactionNotFound {
            id: transaction_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{
            envelope::EnvelopeService,
            ledger::UNASSIGNED,
            metadata::balance_summary,
            sync::{ChannelNotifier, SyncSignal},
        },
        entities::Envelope,
        test_utils::*,
    };
    use sea_orm::{DatabaseBackend, MockDatabase, PaginatorTrait};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn expense(envelope_id: &str, amount: i64) -> NewTransaction {
        NewTransaction {
            id: None,
            date: date(1),
            amount,
            envelope_id: envelope_id.to_string(),
            category: "food".to_string(),
            transaction_type: TransactionType::Expense,
            description: "Test transaction".to_string(),
        }
    }

    async fn balance_of(db: &DatabaseConnection, envelope_id: &str) -> i64 {
        Envelope::find_by_id(envelope_id)
            .one(db)
            .await
            .unwrap()
            .unwrap()
            .current_balance
    }

    #[tokio::test]
    async fn test_add_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let service = TransactionService::new(db, noop_notifier());

        let result = service.add(expense("env", 0)).await;
        assert!(matches!(result, Err(Error::InvalidAmount { amount: 0 })));

        let result = service
            .add(NewTransaction {
                transaction_type: TransactionType::Transfer,
                ..expense("env", -10)
            })
            .await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = service.add(expense("", -10)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_add_expense_scenario() -> Result<()> {
        let db = setup_test_db().await?;
        let (notifier, mut rx) = ChannelNotifier::new();
        let service = TransactionService::new(db.clone(), std::sync::Arc::new(notifier));
        let e1 = create_funded_envelope(&db, "E1", 10_000).await?;
        set_unassigned(&db, 5_000).await?;
        let before = balance_summary(&db).await?;

        // Positive input for an expense is normalized to negative
        let created = service.add(expense(&e1.id, 3_000)).await?;
        assert_eq!(created.amount, -3_000);

        let after = balance_summary(&db).await?;
        assert_eq!(balance_of(&db, &e1.id).await, 7_000);
        assert_eq!(after.unassigned_cash, 5_000);
        assert_eq!(after.actual_balance, before.actual_balance - 3_000);
        let mut signals = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            signals.push(signal);
        }
        assert!(signals.contains(&SyncSignal::InvalidateQueries(QueryGroup::Transactions)));
        assert_eq!(
            signals.last(),
            Some(&SyncSignal::CriticalChange("transaction_added".to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_add_normalizes_income_sign() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());

        let created = service
            .add(NewTransaction {
                transaction_type: TransactionType::Income,
                ..expense(UNASSIGNED, -4_000)
            })
            .await?;
        assert_eq!(created.amount, 4_000);

        let summary = balance_summary(&db).await?;
        assert_eq!(summary.unassigned_cash, 4_000);
        assert_eq!(summary.actual_balance, 4_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_missing_envelope_writes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());

        let result = service.add(expense("ghost", -500)).await;
        assert!(matches!(result, Err(Error::EnvelopeNotFound { .. })));
        assert_eq!(Transaction::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_after_envelope_removed() -> Result<()> {
        init_test_tracing();
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());
        let envelopes = EnvelopeService::new(db.clone(), noop_notifier());
        let e1 = create_funded_envelope(&db, "E1", 10_000).await?;
        let spend = service.add(expense(&e1.id, -2_500)).await?;

        let deletion = envelopes.delete(&e1.id, false).await?;
        assert_eq!(deletion.redistributed, 7_500);

        service.delete(&spend.id).await?;
        assert_eq!(Transaction::find().count(&db).await?, 0);

        let summary = balance_summary(&db).await?;
        assert_eq!(summary.unassigned_cash, 10_000);
        assert_eq!(summary.actual_balance, 10_000);
        assert_eq!(summary.balance_difference, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_then_delete_conserves_balances() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());
        let e1 = create_funded_envelope(&db, "E1", 10_000).await?;
        set_unassigned(&db, 2_000).await?;
        let before = balance_summary(&db).await?;

        let income = service
            .add(NewTransaction {
                transaction_type: TransactionType::Income,
                ..expense(UNASSIGNED, 45_000)
            })
            .await?;
        let spend = service.add(expense(&e1.id, -1_234)).await?;
        service.delete(&spend.id).await?;
        service.delete(&income.id).await?;

        assert_eq!(balance_summary(&db).await?, before);
        assert_eq!(balance_of(&db, &e1.id).await, 10_000);

        let missing = service.delete(&spend.id).await;
        assert!(matches!(missing, Err(Error::TransactionNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_without_ledger_change() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());
        let e1 = create_funded_envelope(&db, "E1", 10_000).await?;
        let created = service.add(expense(&e1.id, -2_000)).await?;
        let before = balance_summary(&db).await?;

        let updated = service
            .update(
                &created.id,
                TransactionPatch {
                    description: Some("Farmers market".to_string()),
                    category: Some("groceries".to_string()),
                    ..Default::default()
                },
            )
            .await?;

        assert_eq!(updated.description, "Farmers market");
        assert_eq!(updated.amount, -2_000);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(balance_summary(&db).await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_moves_effect_between_envelopes() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());
        let a = create_funded_envelope(&db, "A", 10_000).await?;
        let b = create_funded_envelope(&db, "B", 10_000).await?;
        let created = service.add(expense(&a.id, -2_000)).await?;
        let actual_after_add = balance_summary(&db).await?.actual_balance;

        service
            .update(
                &created.id,
                TransactionPatch {
                    envelope_id: Some(b.id.clone()),
                    amount: Some(-500),
                    ..Default::default()
                },
            )
            .await?;

        assert_eq!(balance_of(&db, &a.id).await, 10_000);
        assert_eq!(balance_of(&db, &b.id).await, 9_500);
        assert_eq!(
            balance_summary(&db).await?.actual_balance,
            actual_after_add + 1_500
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_update_type_change_reledgers() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());
        let a = create_funded_envelope(&db, "A", 10_000).await?;
        let created = service.add(expense(&a.id, -1_000)).await?;

        let updated = service
            .update(
                &created.id,
                TransactionPatch {
                    transaction_type: Some(TransactionType::Income),
                    ..Default::default()
                },
            )
            .await?;

        assert_eq!(updated.amount, 1_000);
        assert_eq!(balance_of(&db, &a.id).await, 11_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_to_missing_envelope_rolls_back() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());
        let a = create_funded_envelope(&db, "A", 10_000).await?;
        let created = service.add(expense(&a.id, -1_000)).await?;

        let result = service
            .update(
                &created.id,
                TransactionPatch {
                    envelope_id: Some("ghost".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::EnvelopeNotFound { .. })));
        assert_eq!(balance_of(&db, &a.id).await, 9_000);
        assert_eq!(service.get(&created.id).await?.unwrap().envelope_id, a.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_split_reledgers_children() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());
        let food = create_funded_envelope(&db, "Food", 10_000).await?;
        let home = create_funded_envelope(&db, "Home", 10_000).await?;
        let original = service.add(expense(&food.id, -6_000)).await?;

        let children = service
            .split(
                &original.id,
                vec![
                    SplitPart {
                        amount: 4_000,
                        category: "groceries".to_string(),
                        description: None,
                        envelope_id: None,
                    },
                    SplitPart {
                        amount: -1_500,
                        category: "cleaning".to_string(),
                        description: Some("Soap".to_string()),
                        envelope_id: Some(home.id.clone()),
                    },
                ],
            )
            .await?;

        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.amount < 0));
        assert!(service.get(&original.id).await?.is_none());
        assert_eq!(balance_of(&db, &food.id).await, 6_000);
        assert_eq!(balance_of(&db, &home.id).await, 8_500);
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_continues_on_error() -> Result<()> {
        init_test_tracing();
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier()).with_batch_size(2);
        let e1 = create_funded_envelope(&db, "E1", 10_000).await?;
        let first = service.add(expense(&e1.id, -1_000)).await?;
        let second = service.add(expense(&e1.id, -2_000)).await?;
        let third = service.add(expense(&e1.id, -3_000)).await?;

        let report = service
            .bulk(&[
                BulkOperation::Delete {
                    id: first.id.clone(),
                },
                BulkOperation::Delete {
                    id: "ghost".to_string(),
                },
                BulkOperation::Classify {
                    id: second.id.clone(),
                    category: "dining".to_string(),
                },
                BulkOperation::Update {
                    id: third.id.clone(),
                    patch: TransactionPatch {
                        amount: Some(0),
                        ..Default::default()
                    },
                },
            ])
            .await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 2);
        assert_eq!(report.errors[0].index, 1);
        assert_eq!(report.errors[0].id, "ghost");
        assert_eq!(report.errors[1].index, 3);

        assert_eq!(service.get(&second.id).await?.unwrap().category, "dining");
        assert_eq!(service.get(&third.id).await?.unwrap().amount, -3_000);
        assert_eq!(balance_of(&db, &e1.id).await, 5_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_queries() -> Result<()> {
        let db = setup_test_db().await?;
        let service = TransactionService::new(db.clone(), noop_notifier());
        let e1 = create_funded_envelope(&db, "E1", 10_000).await?;

        service
            .add(NewTransaction {
                date: date(3),
                ..expense(&e1.id, -100)
            })
            .await?;
        service
            .add(NewTransaction {
                date: date(20),
                transaction_type: TransactionType::Income,
                ..expense(UNASSIGNED, 900)
            })
            .await?;

        assert_eq!(service.for_envelope(&e1.id).await?.len(), 1);
        assert_eq!(service.in_date_range(date(1), date(10)).await?.len(), 1);
        assert_eq!(service.in_date_range(date(1), date(30)).await?.len(), 2);
        let income = service.by_type(TransactionType::Income).await?;
        assert_eq!(income.len(), 1);
        assert_eq!(income[0].envelope_id, UNASSIGNED);
        Ok(())
    }
}
