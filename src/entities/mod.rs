//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod audit_log;
pub mod auto_backup;
pub mod auto_funding;
pub mod bill;
pub mod budget;
pub mod cache_entry;
pub mod envelope;
pub mod history;
pub mod offline_request;
pub mod paycheck;
pub mod savings_goal;
pub mod schema_version;
pub mod transaction;

pub use auto_funding::{auto_funding_history, auto_funding_rule};
pub use history::{budget_branch, budget_change, budget_commit, budget_tag};

// Re-export specific types to avoid conflicts
pub use audit_log::{Entity as AuditLog, Model as AuditLogModel};
pub use auto_backup::{Entity as AutoBackup, Model as AutoBackupModel};
pub use bill::{Entity as Bill, Model as BillModel};
pub use budget::{Entity as Budget, Model as BudgetModel};
pub use cache_entry::{Entity as CacheEntry, Model as CacheEntryModel};
pub use envelope::{Entity as Envelope, EnvelopeType, Model as EnvelopeModel};
pub use paycheck::{Entity as Paycheck, Model as PaycheckModel};
pub use schema_version::Entity as SchemaVersion;
pub use transaction::{Entity as Transaction, Model as TransactionModel, TransactionType};
