//! Database configuration module.
//!
//! Resolves the `SQLite` URL, makes sure the directory of a file-backed database
//! exists, connects through `SeaORM` and brings the schema up to date with the
//! versioned migrations in [`crate::storage::migrations`].

use crate::errors::Result;
use crate::storage::migrations::run_migrations;
use sea_orm::{Database, DatabaseConnection};
use std::path::Path;
use tracing::{debug, info};

/// Database used when neither `DATABASE_URL` nor the settings file name one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/envelope_ledger.sqlite?mode=rwc";

/// File path of a `sqlite://` URL, or `None` for in-memory databases.
fn sqlite_file_path(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Some(Path::new(path))
}

/// Establishes a connection, creating the database directory when needed.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    let parent = sqlite_file_path(database_url)
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)?;
        debug!(directory = %parent.display(), "Ensured database directory exists");
    }

    Database::connect(database_url).await.map_err(Into::into)
}

/// Applies every pending schema version.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let version = run_migrations(db).await?;
    info!(schema_version = version, "Database schema ready");
    Ok(())
}

/// Connects and migrates in one step.
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection> {
    let db = create_connection(database_url).await?;
    create_tables(&db).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Envelope, envelope::Model as EnvelopeModel};
    use sea_orm::{EntityTrait, QuerySelect};

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(
            sqlite_file_path(DEFAULT_DATABASE_URL),
            Some(Path::new("data/envelope_ledger.sqlite"))
        );
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_connect_and_migrate() -> Result<()> {
        let db = connect_and_migrate("sqlite::memory:").await?;

        // Tables exist and are queryable
        let _: Vec<EnvelopeModel> = Envelope::find().limit(1).all(&db).await?;

        // Migrating an up-to-date database is a no-op
        create_tables(&db).await?;
        Ok(())
    }
}
