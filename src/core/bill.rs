//! Bill records, bill payment through the ledger, and funding recommendations.

use crate::{
    cache::{CacheStore, category},
    core::{
        audit,
        bill_funding::{
            BillDistribution, BillPriority, bill_envelope_priority, recommend_bill_distribution,
        },
        envelope::require_envelope,
        ledger::{UNASSIGNED, apply_transaction},
        metadata,
        sync::{Change, QueryGroup, SharedNotifier, publish},
    },
    entities::{Bill, Envelope, EnvelopeType, TransactionType, bill, envelope, transaction},
    errors::{Error, Result},
    validation::{MAX_NAME_LEN, Validate, require_max_len, require_name},
};
use chrono::{Days, Months, NaiveDate};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

/// Repeat cadences a recurring bill may use.
pub const FREQUENCIES: &[&str] = &["weekly", "biweekly", "monthly", "quarterly", "yearly"];

const BILL_CHANGE_CATEGORIES: &[&str] = &[category::BILLS, category::ANALYTICS];
const PAYMENT_CHANGE_CATEGORIES: &[&str] = &[
    category::BILLS,
    category::TRANSACTIONS,
    category::ENVELOPES,
    category::ANALYTICS,
    category::GENERAL,
];

/// Due date of the cycle after `due_date`. Month steps clamp to the last day of
/// shorter months.
#[must_use]
pub fn next_due_date(due_date: NaiveDate, frequency: &str) -> Option<NaiveDate> {
    match frequency {
        "weekly" => due_date.checked_add_days(Days::new(7)),
        "biweekly" => due_date.checked_add_days(Days::new(14)),
        "monthly" => due_date.checked_add_months(Months::new(1)),
        "quarterly" => due_date.checked_add_months(Months::new(3)),
        "yearly" => due_date.checked_add_months(Months::new(12)),
        _ => None,
    }
}

fn default_frequency() -> String {
    "monthly".to_string()
}

/// Input for [`BillService::add`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    /// Caller-supplied id; a UUID is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Amount due in cents
    pub amount: i64,
    /// First due date
    pub due_date: NaiveDate,
    /// Whether paying it schedules the next cycle
    #[serde(default)]
    pub is_recurring: bool,
    /// One of [`FREQUENCIES`]
    #[serde(default = "default_frequency")]
    pub frequency: String,
    /// Spending category used for the payment transaction
    #[serde(default)]
    pub category: String,
    /// Liability envelope funding the bill
    #[serde(default)]
    pub envelope_id: Option<String>,
}

impl Validate for NewBill {
    fn validate(&self) -> Result<()> {
        require_name("name", &self.name)?;
        if self.amount <= 0 {
            return Err(Error::InvalidAmount {
                amount: self.amount,
            });
        }
        if self.is_recurring && !FREQUENCIES.contains(&self.frequency.as_str()) {
            return Err(Error::validation(
                "frequency",
                format!("must be one of {}", FREQUENCIES.join(", ")),
            ));
        }
        require_max_len("category", &self.category, MAX_NAME_LEN)
    }
}

/// Outcome of [`BillService::pay`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillPayment {
    /// The bill after payment: next cycle for recurring bills, otherwise paid
    pub bill: bill::Model,
    /// Expense recorded for the payment
    pub transaction: transaction::Model,
}

/// Bill operations.
#[derive(Clone, Debug)]
pub struct BillService {
    db: DatabaseConnection,
    cache: CacheStore,
    notifier: SharedNotifier,
}

impl BillService {
    /// Creates the service.
    #[must_use]
    pub fn new(db: DatabaseConnection, notifier: SharedNotifier) -> Self {
        Self {
            cache: CacheStore::new(db.clone()),
            db,
            notifier,
        }
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

    /// Creates a bill, optionally linked to an existing envelope.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn add(&self, input: NewBill) -> Result<bill::Model> {
        input.validate()?;

        let txn = self.db.begin().await?;
        if let Some(envelope_id) = &input.envelope_id {
            require_envelope(&txn, envelope_id).await?;
        }

        let created = bill::ActiveModel {
            id: Set(input
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
            name: Set(input.name.trim().to_string()),
            amount: Set(input.amount),
            due_date: Set(input.due_date),
            is_paid: Set(false),
            is_recurring: Set(input.is_recurring),
            frequency: Set(input.frequency),
            category: Set(input.category),
            envelope_id: Set(input.envelope_id),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        audit::record(&txn, "bill_added", "bill", &created.id, None).await?;
        txn.commit().await?;

        self.publish("bill_added", BILL_CHANGE_CATEGORIES, &[QueryGroup::Bills])
            .await;
        Ok(created)
    }

    /// Deletes a bill. Money already paid stays paid.
    pub async fn delete(&self, bill_id: &str) -> Result<bill::Model> {
        let txn = self.db.begin().await?;
        let existing = require_bill(&txn, bill_id).await?;
        Bill::delete_by_id(bill_id).exec(&txn).await?;
        audit::record(&txn, "bill_deleted", "bill", bill_id, None).await?;
        txn.commit().await?;

        self.publish("bill_deleted", BILL_CHANGE_CATEGORIES, &[QueryGroup::Bills])
            .await;
        Ok(existing)
    }

    /// Pays a bill on `today`.
    ///
    /// Records an expense against the linked envelope, or against unassigned
    /// cash for an unlinked bill, through the ledger. A recurring bill moves to
    /// its next due date; a one-off bill is marked paid.
    #[instrument(skip(self))]
    pub async fn pay(&self, bill_id: &str, today: NaiveDate) -> Result<BillPayment> {
        let txn = self.db.begin().await?;
        let existing = require_bill(&txn, bill_id).await?;
        if existing.is_paid {
            return Err(Error::validation("isPaid", "bill is already paid"));
        }

        let target = match &existing.envelope_id {
            Some(envelope_id) => require_envelope(&txn, envelope_id).await?.id,
            None => UNASSIGNED.to_string(),
        };

        let payment = transaction::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            date: Set(today),
            amount: Set(-existing.amount),
            envelope_id: Set(target),
            to_envelope_id: Set(None),
            category: Set(existing.category.clone()),
            transaction_type: Set(TransactionType::Expense),
            description: Set(format!("Bill payment: {}", existing.name)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        apply_transaction(&txn, &payment, false).await?;

        let mut active: bill::ActiveModel = existing.clone().into();
        if existing.is_recurring {
            let next =
                next_due_date(existing.due_date, &existing.frequency).ok_or_else(|| {
                    Error::validation(
                        "frequency",
                        format!("unknown frequency `{}`", existing.frequency),
                    )
                })?;
            active.due_date = Set(next);
        } else {
            active.is_paid = Set(true);
        }
        let updated = active.update(&txn).await?;

        audit::record(
            &txn,
            "bill_paid",
            "bill",
            bill_id,
            Some(json!({ "transactionId": payment.id, "amount": existing.amount })),
        )
        .await?;
        txn.commit().await?;

        info!(bill_id, amount = existing.amount, "Bill paid");
        self.publish(
            "bill_paid",
            PAYMENT_CHANGE_CATEGORIES,
            &[
                QueryGroup::Bills,
                QueryGroup::Transactions,
                QueryGroup::Envelopes,
                QueryGroup::Budget,
            ],
        )
        .await;

        Ok(BillPayment {
            bill: updated,
            transaction: payment,
        })
    }

    /// Looks up a bill by id.
    pub async fn get(&self, bill_id: &str) -> Result<Option<bill::Model>> {
        Bill::find_by_id(bill_id)
            .one(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Bills linked to an envelope, soonest first.
    pub async fn list_for_envelope(&self, envelope_id: &str) -> Result<Vec<bill::Model>> {
        Bill::find()
            .filter(bill::Column::EnvelopeId.eq(envelope_id))
            .order_by_asc(bill::Column::DueDate)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Unpaid bills due on or before `until`, overdue included, soonest first.
    pub async fn upcoming(&self, until: NaiveDate) -> Result<Vec<bill::Model>> {
        Bill::find()
            .filter(bill::Column::IsPaid.eq(false))
            .filter(bill::Column::DueDate.lte(until))
            .order_by_asc(bill::Column::DueDate)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    async fn funding_inputs(&self) -> Result<(Vec<envelope::Model>, Vec<bill::Model>)> {
        let envelopes = Envelope::find()
            .filter(envelope::Column::Archived.eq(false))
            .filter(envelope::Column::EnvelopeType.eq(EnvelopeType::Liability))
            .all(&self.db)
            .await?;
        let bills = Bill::find()
            .filter(bill::Column::IsPaid.eq(false))
            .all(&self.db)
            .await?;
        Ok((envelopes, bills))
    }

    /// Active bill envelopes with their priority, most pressing first.
    ///
    /// Recommended amounts are capped at the current unassigned cash.
    pub async fn priorities(&self, today: NaiveDate) -> Result<Vec<BillPriority>> {
        let (envelopes, bills) = self.funding_inputs().await?;
        let available = metadata::get_or_create(&self.db).await?.unassigned_cash;
        let mut priorities: Vec<BillPriority> = envelopes
            .iter()
            .map(|e| bill_envelope_priority(e, &bills, available, today))
            .collect();
        priorities.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.needs.envelope_id.cmp(&b.needs.envelope_id))
        });
        Ok(priorities)
    }

    /// Recommends how to split `cash` across bill envelopes. Nothing is moved;
    /// pass the allocations to `EnvelopeService::distribute_unassigned` to apply.
    pub async fn recommend_distribution(
        &self,
        cash: i64,
        today: NaiveDate,
    ) -> Result<BillDistribution> {
        let (envelopes, bills) = self.funding_inputs().await?;
        Ok(recommend_bill_distribution(&envelopes, &bills, cash, today))
    }
}

async fn require_bill<C>(db: &C, bill_id: &str) -> Result<bill::Model>
where
    C: ConnectionTrait,
{
    Bill::find_by_id(bill_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::BillNotFound {
            id: bill_id.to_string(),
        })
}
