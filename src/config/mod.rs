/// Database connection and schema initialization
pub mod database;

/// Ledger settings loaded from ledger.toml
pub mod settings;
