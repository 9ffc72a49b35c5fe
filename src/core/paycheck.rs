//! Paycheck processing and its exact reversal.
//!
//! A processed paycheck stores the unassigned-cash and actual-balance figures from
//! before and after it was applied, so [`PaycheckService::delete`] can undo it from
//! the record alone.

use crate::{
    cache::{CacheStore, category},
    core::{
        audit,
        envelope::{require_envelope, update_envelope_balance_atomic},
        metadata,
        sync::{Change, QueryGroup, SharedNotifier, publish},
    },
    entities::{Envelope, Paycheck, paycheck},
    errors::{Error, Result},
    validation::{MAX_NAME_LEN, Validate, require_max_len, require_name, validate_all},
};
use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

/// Paychecks averaged by [`PaycheckService::predict_for_source`].
pub const PREDICTION_WINDOW: u64 = 5;

const PAYCHECK_CHANGE_CATEGORIES: &[&str] =
    &[category::ENVELOPES, category::ANALYTICS, category::GENERAL];
const PAYCHECK_QUERY_GROUPS: &[QueryGroup] = &[
    QueryGroup::Paychecks,
    QueryGroup::Envelopes,
    QueryGroup::Budget,
];

/// Money routed from a paycheck straight into an envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    /// Receiving envelope
    pub envelope_id: String,
    /// Amount in cents
    pub amount: i64,
}

impl Validate for Allocation {
    fn validate(&self) -> Result<()> {
        require_name("envelopeId", &self.envelope_id)?;
        if self.amount < 0 {
            return Err(Error::InvalidAmount {
                amount: self.amount,
            });
        }
        Ok(())
    }
}

/// Input for [`PaycheckService::process`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaycheck {
    /// Caller-supplied id; a UUID is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Pay date
    pub date: NaiveDate,
    /// Gross amount in cents
    pub amount: i64,
    /// Payer name
    pub source: String,
    /// Direct envelope allocations; the remainder lands in unassigned cash
    #[serde(default)]
    pub allocations: Vec<Allocation>,
}

impl NewPaycheck {
    fn allocated(&self) -> i64 {
        self.allocations.iter().map(|a| a.amount).sum()
    }
}

impl Validate for NewPaycheck {
    fn validate(&self) -> Result<()> {
        if self.amount <= 0 {
            return Err(Error::InvalidAmount {
                amount: self.amount,
            });
        }
        require_name("source", &self.source)?;
        require_max_len("source", &self.source, MAX_NAME_LEN)?;
        validate_all(&self.allocations)?;

        let allocated = self.allocated();
        if allocated > self.amount {
            return Err(Error::validation(
                "allocations",
                format!("allocate {allocated} cents of a {} cent paycheck", self.amount),
            ));
        }
        Ok(())
    }
}

/// Expected next paycheck from a payer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaycheckPrediction {
    /// Average of the recent paychecks, in cents
    pub amount: i64,
    /// 0-100; lower when recent amounts vary more
    pub confidence: u8,
    /// Paychecks the average was taken over
    pub sample_size: usize,
}

/// Average and confidence over a payer's recent amounts.
///
/// Confidence is `100 - coefficient of variation` in percent, floored at zero.
// Cast safety: sample counts are at most PREDICTION_WINDOW and amounts are cents
// well inside f64's exact integer range; confidence is clamped to [0, 100].
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn predict_from_amounts(amounts: &[i64]) -> Option<PaycheckPrediction> {
    if amounts.is_empty() {
        return None;
    }

    let n = amounts.len() as f64;
    let mean = amounts.iter().map(|&a| a as f64).sum::<f64>() / n;
    let variance = amounts
        .iter()
        .map(|&a| (a as f64 - mean).powi(2))
        .sum::<f64>()
        / n;

    let confidence = if mean > 0.0 {
        (100.0 - variance.sqrt() / mean * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    Some(PaycheckPrediction {
        amount: mean.round() as i64,
        confidence: confidence.round() as u8,
        sample_size: amounts.len(),
    })
}

/// Paycheck operations.
#[derive(Clone, Debug)]
pub struct PaycheckService {
    db: DatabaseConnection,
    cache: CacheStore,
    notifier: SharedNotifier,
}

impl PaycheckService {
    /// Creates the service.
    #[must_use]
    pub fn new(db: DatabaseConnection, notifier: SharedNotifier) -> Self {
        Self {
            cache: CacheStore::new(db.clone()),
            db,
            notifier,
        }
    }

    async fn publish(&self, change_type: &str) {
        publish(
            &self.cache,
            self.notifier.as_ref(),
            Change {
                change_type,
                cache_categories: PAYCHECK_CHANGE_CATEGORIES,
                query_groups: PAYCHECK_QUERY_GROUPS,
            },
        )
        .await;
    }

    /// Credits a paycheck: the actual balance grows by the full amount, each
    /// allocation goes to its envelope and the rest to unassigned cash.
    #[instrument(skip(self, input), fields(source = %input.source, amount = input.amount))]
    pub async fn process(&self, input: NewPaycheck) -> Result<paycheck::Model> {
        input.validate()?;
        let allocated = input.allocated();

        let txn = self.db.begin().await?;
        for allocation in &input.allocations {
            require_envelope(&txn, &allocation.envelope_id).await?;
        }

        let summary = metadata::balance_summary(&txn).await?;
        if summary.balance_difference != 0 {
            warn!(
                virtual_balance = summary.virtual_balance,
                actual_balance = summary.actual_balance,
                difference = summary.balance_difference,
                "Virtual and actual balance diverge before paycheck"
            );
        }

        let unassigned_after = summary.unassigned_cash + input.amount - allocated;
        let actual_after = summary.actual_balance + input.amount;
        metadata::set_balances(&txn, unassigned_after, actual_after).await?;

        for allocation in input.allocations.iter().filter(|a| a.amount > 0) {
            update_envelope_balance_atomic(&txn, &allocation.envelope_id, allocation.amount)
                .await?;
        }

        let record = paycheck::ActiveModel {
            id: Set(input
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
            date: Set(input.date),
            amount: Set(input.amount),
            source: Set(input.source.trim().to_string()),
            unassigned_cash_before: Set(summary.unassigned_cash),
            unassigned_cash_after: Set(unassigned_after),
            actual_balance_before: Set(summary.actual_balance),
            actual_balance_after: Set(actual_after),
            allocations: Set(serde_json::to_value(&input.allocations)?),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        audit::record(
            &txn,
            "paycheck_processed",
            "paycheck",
            &record.id,
            Some(json!({ "amount": record.amount, "allocated": allocated })),
        )
        .await?;
        txn.commit().await?;

        info!(paycheck_id = %record.id, allocated, "Paycheck processed");
        self.publish("paycheck_processed").await;
        Ok(record)
    }

    /// Undoes a processed paycheck from its stored figures and deletes it.
    ///
    /// Envelope decrements stop at zero if the money has since been spent, and
    /// allocations to envelopes that no longer exist are skipped.
    #[instrument(skip(self))]
    pub async fn delete(&self, paycheck_id: &str) -> Result<paycheck::Model> {
        let txn = self.db.begin().await?;
        let record = Paycheck::find_by_id(paycheck_id)
            .one(&txn)
            .await?
            .ok_or_else(|| Error::PaycheckNotFound {
                id: paycheck_id.to_string(),
            })?;
        let allocations: Vec<Allocation> = serde_json::from_value(record.allocations.clone())?;

        let row = metadata::get_or_create(&txn).await?;
        let unassigned_delta = record.unassigned_cash_after - record.unassigned_cash_before;
        metadata::set_balances(
            &txn,
            row.unassigned_cash - unassigned_delta,
            row.actual_balance - record.amount,
        )
        .await?;

        for allocation in &allocations {
            let Some(envelope) = Envelope::find_by_id(&allocation.envelope_id)
                .one(&txn)
                .await?
            else {
                warn!(
                    envelope_id = %allocation.envelope_id,
                    "Allocated envelope no longer exists, skipping reversal"
                );
                continue;
            };

            let floored = (envelope.current_balance - allocation.amount).max(0);
            let delta = floored - envelope.current_balance;
            if delta != 0 {
                update_envelope_balance_atomic(&txn, &envelope.id, delta).await?;
            }
        }

        Paycheck::delete_by_id(paycheck_id).exec(&txn).await?;
        audit::record(
            &txn,
            "paycheck_deleted",
            "paycheck",
            paycheck_id,
            Some(json!({ "amount": record.amount })),
        )
        .await?;
        txn.commit().await?;

        info!(paycheck_id, "Paycheck reversed");
        self.publish("paycheck_deleted").await;
        Ok(record)
    }

    /// Most recent paychecks, newest first.
    pub async fn history(&self, limit: u64) -> Result<Vec<paycheck::Model>> {
        Paycheck::find()
            .order_by_desc(paycheck::Column::Date)
            .order_by_desc(paycheck::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Paychecks from one payer, newest first.
    pub async fn by_source(&self, source: &str) -> Result<Vec<paycheck::Model>> {
        Paycheck::find()
            .filter(paycheck::Column::Source.eq(source))
            .order_by_desc(paycheck::Column::Date)
            .order_by_desc(paycheck::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Predicts the next paycheck from a payer from their last five.
    pub async fn predict_for_source(&self, source: &str) -> Result<Option<PaycheckPrediction>> {
        let amounts: Vec<i64> = Paycheck::find()
            .filter(paycheck::Column::Source.eq(source))
            .order_by_desc(paycheck::Column::Date)
            .order_by_desc(paycheck::Column::CreatedAt)
            .limit(PREDICTION_WINDOW)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|p| p.amount)
            .collect();

        Ok(predict_from_amounts(&amounts))
    }
}
