//! Shared test utilities for the ledger engine.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults. The `create_*` helpers
//! write rows directly and keep the books balanced, so a freshly seeded database
//! always has `balance_difference == 0`.

use crate::{
    config::database::create_tables,
    core::{
        classify::classify_category,
        metadata,
        sync::{NoopNotifier, SharedNotifier},
    },
    entities::{bill, envelope},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Routes tracing output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all migrations applied.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Notifier that discards every signal.
pub fn noop_notifier() -> SharedNotifier {
    Arc::new(NoopNotifier)
}

/// Creates a standard envelope holding `balance` cents.
///
/// The actual balance grows by the same amount, as if the money had been
/// deposited and assigned.
pub async fn create_funded_envelope(
    db: &DatabaseConnection,
    name: &str,
    balance: i64,
) -> Result<envelope::Model> {
    create_funded_envelope_in(db, name, "general", balance).await
}

/// Creates a funded envelope in `category`; the type is classified from it.
pub async fn create_funded_envelope_in(
    db: &DatabaseConnection,
    name: &str,
    category: &str,
    balance: i64,
) -> Result<envelope::Model> {
    let created = envelope::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        name: Set(name.to_string()),
        category: Set(category.to_string()),
        envelope_type: Set(classify_category(category)),
        current_balance: Set(balance),
        target_amount: Set(0),
        biweekly_allocation: Set(0),
        monthly_budget: Set(0),
        archived: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await?;

    metadata::adjust(db, 0, balance).await?;
    Ok(created)
}

/// Sets unassigned cash and moves the actual balance by the same delta.
pub async fn set_unassigned(db: &DatabaseConnection, amount: i64) -> Result<()> {
    let current = metadata::get_or_create(db).await?;
    let delta = amount - current.unassigned_cash;
    metadata::adjust(db, delta, delta).await
}

/// Creates a recurring monthly bill, optionally linked to an envelope.
pub async fn create_test_bill(
    db: &DatabaseConnection,
    name: &str,
    amount: i64,
    envelope_id: Option<&str>,
    due_date: NaiveDate,
) -> Result<bill::Model> {
    let created = bill::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        name: Set(name.to_string()),
        amount: Set(amount),
        due_date: Set(due_date),
        is_paid: Set(false),
        is_recurring: Set(true),
        frequency: Set("monthly".to_string()),
        category: Set("bills".to_string()),
        envelope_id: Set(envelope_id.map(str::to_string)),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(created)
}
