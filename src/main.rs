use dotenvy::dotenv;
use envelope_ledger::{
    config::{database, settings},
    core::{
        Ledger,
        sync::{NoopNotifier, SharedNotifier},
    },
    errors::Result,
    money::format_cents,
    storage::maintenance,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load ledger settings
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load ledger settings: {}", e))?;

    // 4. Connect and bring the schema up to date
    let database_url = settings.resolve_database_url();
    let db = database::connect_and_migrate(&database_url)
        .await
        .inspect(|_| info!("Database ready"))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Seed configured envelopes
    let notifier: SharedNotifier = Arc::new(NoopNotifier);
    let ledger = Ledger::new(&db, &notifier, &settings);
    ledger
        .envelopes
        .seed(&settings.envelopes)
        .await
        .inspect_err(|e| error!("Failed to seed envelopes: {}", e))?;

    // 6. Housekeeping
    let optimized = maintenance::optimize_database(&db).await?;
    info!(
        expired_cache_entries = optimized.expired_cache_entries,
        trimmed_audit_entries = optimized.trimmed_audit_entries,
        "Database optimized"
    );

    // 7. Report
    let summary = ledger.balance_summary().await?;
    info!(
        envelopes = %format_cents(summary.envelope_total),
        unassigned = %format_cents(summary.unassigned_cash),
        actual = %format_cents(summary.actual_balance),
        "Balance summary"
    );
    if summary.balance_difference != 0 {
        warn!(
            difference = %format_cents(summary.balance_difference),
            "Actual balance differs from envelopes plus unassigned cash"
        );
    }

    let stats = maintenance::database_stats(&db).await?;
    info!(?stats, "Database stats");

    Ok(())
}
