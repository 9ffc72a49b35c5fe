//! Storage engine - versioned schema, row timestamps and housekeeping.

/// Database housekeeping: cache expiry, audit trimming, row counts
pub mod maintenance;
/// Ordered schema versions and the migration runner
pub mod migrations;
/// `created_at` / `last_modified` stamping used by entity save hooks
pub mod timestamps;

pub use migrations::{CURRENT_SCHEMA_VERSION, run_migrations};
