//! Versioned schema definition and migration runner.
//!
//! The schema is an ordered list of [`SchemaRevision`]s. Each version is a list
//! of additive [`MigrationStep`]s, except for the explicit
//! [`MigrationStep::DropTable`] which removes a table together with its rows.
//! Table creation uses `SeaORM`'s `Schema::create_table_from_entity`, so column
//! definitions always match the entity structs. Every step is idempotent
//! (`IF NOT EXISTS` / `IF EXISTS`) and the highest applied version is recorded in
//! `schema_versions`, so running the migrations twice is a no-op.

use crate::{
    entities::{
        AuditLog, AutoBackup, Bill, Budget, CacheEntry, Envelope, Paycheck, Transaction,
        auto_funding_history, auto_funding_rule, budget_branch, budget_change,
        budget_commit, budget_tag, offline_request, savings_goal, schema_version,
    },
    errors::Result,
    storage::timestamps::now_millis,
};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryOrder, Schema, Set,
    TransactionTrait,
    sea_query::{Alias, Index, IndexCreateStatement, Table as SqlTable, TableCreateStatement},
};
use tracing::{debug, info, instrument};

/// Latest schema version known to this build.
pub const CURRENT_SCHEMA_VERSION: i32 = 6;

/// Tables the migration steps can create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    /// Singleton metadata and blob rows
    Budget,
    /// Envelopes
    Envelopes,
    /// Transactions
    Transactions,
    /// Bills linked to liability envelopes
    Bills,
    /// Legacy savings goals
    SavingsGoals,
    /// Paycheck records
    PaycheckHistory,
    /// Audit trail
    AuditLog,
    /// TTL cache
    Cache,
    /// History commits
    BudgetCommits,
    /// History changes
    BudgetChanges,
    /// History branches
    BudgetBranches,
    /// History tags
    BudgetTags,
    /// Pre-sync snapshots
    AutoBackups,
    /// Requests waiting for connectivity
    OfflineRequestQueue,
    /// Auto-funding rules
    AutoFundingRules,
    /// Auto-funding executions
    AutoFundingHistory,
}

impl Table {
    /// Physical table name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Envelopes => "envelopes",
            Self::Transactions => "transactions",
            Self::Bills => "bills",
            Self::SavingsGoals => "savings_goals",
            Self::PaycheckHistory => "paycheck_history",
            Self::AuditLog => "audit_log",
            Self::Cache => "cache",
            Self::BudgetCommits => "budget_commits",
            Self::BudgetChanges => "budget_changes",
            Self::BudgetBranches => "budget_branches",
            Self::BudgetTags => "budget_tags",
            Self::AutoBackups => "auto_backups",
            Self::OfflineRequestQueue => "offline_request_queue",
            Self::AutoFundingRules => "auto_funding_rules",
            Self::AutoFundingHistory => "auto_funding_history",
        }
    }

    fn create_statement(self, schema: &Schema) -> TableCreateStatement {
        let mut statement = match self {
            Self::Budget => schema.create_table_from_entity(Budget),
            Self::Envelopes => schema.create_table_from_entity(Envelope),
            Self::Transactions => schema.create_table_from_entity(Transaction),
            Self::Bills => schema.create_table_from_entity(Bill),
            Self::SavingsGoals => schema.create_table_from_entity(savings_goal::Entity),
            Self::PaycheckHistory => schema.create_table_from_entity(Paycheck),
            Self::AuditLog => schema.create_table_from_entity(AuditLog),
            Self::Cache => schema.create_table_from_entity(CacheEntry),
            Self::BudgetCommits => schema.create_table_from_entity(budget_commit::Entity),
            Self::BudgetChanges => schema.create_table_from_entity(budget_change::Entity),
            Self::BudgetBranches => schema.create_table_from_entity(budget_branch::Entity),
            Self::BudgetTags => schema.create_table_from_entity(budget_tag::Entity),
            Self::AutoBackups => schema.create_table_from_entity(AutoBackup),
            Self::OfflineRequestQueue => schema.create_table_from_entity(offline_request::Entity),
            Self::AutoFundingRules => schema.create_table_from_entity(auto_funding_rule::Entity),
            Self::AutoFundingHistory => {
                schema.create_table_from_entity(auto_funding_history::Entity)
            }
        };
        statement.if_not_exists();
        statement
    }
}

/// One schema change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationStep {
    /// Create a table from its entity definition
    AddTable(Table),
    /// Create a (possibly compound) index
    AddIndex {
        /// Index name, unique across the database
        name: &'static str,
        /// Indexed table
        table: Table,
        /// Indexed columns in order
        columns: &'static [&'static str],
    },
    /// Drop a table and every row in it
    DropTable(&'static str),
}

impl MigrationStep {
    async fn apply<C>(self, db: &C, schema: &Schema) -> Result<()>
    where
        C: ConnectionTrait,
    {
        let builder = db.get_database_backend();
        match self {
            Self::AddTable(table) => {
                debug!(table = table.name(), "Creating table");
                db.execute(builder.build(&table.create_statement(schema)))
                    .await?;
            }
            Self::AddIndex {
                name,
                table,
                columns,
            } => {
                debug!(index = name, table = table.name(), "Creating index");
                db.execute(builder.build(&index_statement(name, table, columns)))
                    .await?;
            }
            Self::DropTable(name) => {
                debug!(table = name, "Dropping table");
                let statement = SqlTable::drop()
                    .table(Alias::new(name))
                    .if_exists()
                    .to_owned();
                db.execute(builder.build(&statement)).await?;
            }
        }
        Ok(())
    }
}

fn index_statement(name: &str, table: Table, columns: &[&str]) -> IndexCreateStatement {
    let mut statement = Index::create();
    statement
        .name(name)
        .table(Alias::new(table.name()))
        .if_not_exists();
    for column in columns {
        statement.col(Alias::new(*column));
    }
    statement.to_owned()
}

/// A numbered set of steps.
#[derive(Clone, Debug)]
pub struct SchemaRevision {
    /// Monotonically increasing version number
    pub version: i32,
    /// Steps applied in order
    pub steps: Vec<MigrationStep>,
}

/// The full schema history, oldest first.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn schema_revisions() -> Vec<SchemaRevision> {
    use MigrationStep::{AddIndex, AddTable, DropTable};

    vec![
        SchemaRevision {
            version: 1,
            steps: vec![
                AddTable(Table::Budget),
                AddTable(Table::Envelopes),
                AddTable(Table::Transactions),
                AddTable(Table::Bills),
                AddTable(Table::SavingsGoals),
                AddTable(Table::PaycheckHistory),
                AddIndex {
                    name: "idx_envelopes_category_archived",
                    table: Table::Envelopes,
                    columns: &["category", "archived"],
                },
                AddIndex {
                    name: "idx_transactions_date",
                    table: Table::Transactions,
                    columns: &["date"],
                },
                AddIndex {
                    name: "idx_transactions_envelope_date",
                    table: Table::Transactions,
                    columns: &["envelope_id", "date"],
                },
                AddIndex {
                    name: "idx_bills_due_paid",
                    table: Table::Bills,
                    columns: &["due_date", "is_paid"],
                },
            ],
        },
        SchemaRevision {
            version: 2,
            steps: vec![
                AddTable(Table::AuditLog),
                AddTable(Table::Cache),
                AddIndex {
                    name: "idx_cache_category_expires",
                    table: Table::Cache,
                    columns: &["category", "expires_at"],
                },
                AddIndex {
                    name: "idx_audit_log_timestamp",
                    table: Table::AuditLog,
                    columns: &["timestamp"],
                },
            ],
        },
        SchemaRevision {
            version: 3,
            steps: vec![
                AddTable(Table::BudgetCommits),
                AddTable(Table::BudgetChanges),
                AddTable(Table::BudgetBranches),
                AddTable(Table::BudgetTags),
                AddIndex {
                    name: "idx_budget_changes_commit",
                    table: Table::BudgetChanges,
                    columns: &["commit_hash"],
                },
            ],
        },
        SchemaRevision {
            version: 4,
            steps: vec![
                AddTable(Table::AutoBackups),
                AddIndex {
                    name: "idx_auto_backups_type_timestamp",
                    table: Table::AutoBackups,
                    columns: &["backup_type", "timestamp"],
                },
            ],
        },
        SchemaRevision {
            version: 5,
            steps: vec![
                AddTable(Table::OfflineRequestQueue),
                AddTable(Table::AutoFundingRules),
                AddTable(Table::AutoFundingHistory),
            ],
        },
        SchemaRevision {
            version: 6,
            steps: vec![
                // Savings goals are goal-type envelopes now
                DropTable("savings_goals"),
                AddIndex {
                    name: "idx_transactions_type_date",
                    table: Table::Transactions,
                    columns: &["transaction_type", "date"],
                },
                AddIndex {
                    name: "idx_bills_envelope",
                    table: Table::Bills,
                    columns: &["envelope_id"],
                },
            ],
        },
    ]
}

/// Highest version recorded in `schema_versions`, or 0 for a fresh database.
pub async fn current_version<C>(db: &C) -> Result<i32>
where
    C: ConnectionTrait,
{
    let latest = schema_version::Entity::find()
        .order_by_desc(schema_version::Column::Version)
        .one(db)
        .await?;
    Ok(latest.map_or(0, |row| row.version))
}

/// Applies every schema version newer than the recorded one, each inside its
/// own database transaction. Returns the version the database ends up at.
#[instrument(skip(db))]
pub async fn run_migrations(db: &DatabaseConnection) -> Result<i32> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let bootstrap = schema
        .create_table_from_entity(schema_version::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&bootstrap)).await?;

    let mut applied = current_version(db).await?;
    for version in schema_revisions() {
        if version.version <= applied {
            continue;
        }

        info!(version = version.version, "Applying schema version");
        let txn = db.begin().await?;
        for step in &version.steps {
            step.apply(&txn, &schema).await?;
        }
        schema_version::ActiveModel {
            version: Set(version.version),
            applied_at: Set(now_millis()),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        applied = version.version;
    }

    debug!(version = applied, "Schema is up to date");
    Ok(applied)
}
