//! TTL cache stored in the `cache` table.
//!
//! Entries are tagged with a category so every row derived from, say, envelopes can
//! be dropped in one statement when envelopes change. An entry is served only
//! while `expires_at > now`; expired rows are ignored by reads and removed by
//! [`CacheStore::cleanup`].

use crate::{
    entities::{CacheEntry, cache_entry},
    errors::Result,
    storage::timestamps::now_millis,
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, sea_query::OnConflict,
};
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use tracing::{debug, trace, warn};

/// Default entry lifetime, five minutes.
pub const DEFAULT_TTL_MS: i64 = 300_000;

/// Well-known cache categories.
pub mod category {
    /// Anything without a more specific category
    pub const GENERAL: &str = "general";
    /// Rows derived from envelopes
    pub const ENVELOPES: &str = "envelopes";
    /// Rows derived from transactions
    pub const TRANSACTIONS: &str = "transactions";
    /// Aggregates spanning several tables
    pub const ANALYTICS: &str = "analytics";
    /// Rows derived from bills
    pub const BILLS: &str = "bills";
}

/// Handle to the cache table. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: DatabaseConnection,
}

impl CacheStore {
    /// Creates a cache over the given connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the cached value for `key` if present and not expired.
    ///
    /// A row whose JSON no longer decodes into `T` is treated as a miss.
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.get_at(key, now_millis()).await
    }

    pub(crate) async fn get_at<T>(&self, key: &str, now: i64) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(entry) = CacheEntry::find_by_id(key).one(&self.db).await? else {
            trace!(key, "Cache miss");
            return Ok(None);
        };

        if entry.expires_at <= now {
            trace!(key, "Cache entry expired");
            return Ok(None);
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => {
                trace!(key, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Stores `value` under `key` for `ttl_ms` milliseconds, replacing any
    /// existing entry.
    pub async fn set<T>(&self, key: &str, value: &T, ttl_ms: i64, category: &str) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.set_at(key, value, ttl_ms, category, now_millis())
            .await
    }

    pub(crate) async fn set_at<T>(
        &self,
        key: &str,
        value: &T,
        ttl_ms: i64,
        category: &str,
        now: i64,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let entry = cache_entry::ActiveModel {
            key: Set(key.to_string()),
            value: Set(serde_json::to_value(value)?),
            expires_at: Set(now + ttl_ms),
            category: Set(category.to_string()),
        };

        CacheEntry::insert(entry)
            .on_conflict(
                OnConflict::column(cache_entry::Column::Key)
                    .update_columns([
                        cache_entry::Column::Value,
                        cache_entry::Column::ExpiresAt,
                        cache_entry::Column::Category,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        trace!(key, category, ttl_ms, "Cache entry stored");
        Ok(())
    }

    /// Returns the cached value, or computes, stores and returns it.
    pub async fn get_or_insert_with<T, F, Fut>(
        &self,
        key: &str,
        ttl_ms: i64,
        category: &str,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }

        let value = compute().await?;
        self.set(key, &value, ttl_ms, category).await?;
        Ok(value)
    }

    /// Removes a single entry.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        CacheEntry::delete_by_id(key).exec(&self.db).await?;
        Ok(())
    }

    /// Removes every entry tagged with `category`. Returns the number removed.
    pub async fn invalidate_category(&self, category: &str) -> Result<u64> {
        let result = CacheEntry::delete_many()
            .filter(cache_entry::Column::Category.eq(category))
            .exec(&self.db)
            .await?;

        debug!(
            category,
            removed = result.rows_affected,
            "Cache category invalidated"
        );
        Ok(result.rows_affected)
    }

    /// Removes expired entries, optionally limited to one category.
    pub async fn cleanup(&self, category: Option<&str>) -> Result<u64> {
        self.cleanup_at(category, now_millis()).await
    }

    pub(crate) async fn cleanup_at(&self, category: Option<&str>, now: i64) -> Result<u64> {
        let mut query = CacheEntry::delete_many().filter(cache_entry::Column::ExpiresAt.lte(now));
        if let Some(category) = category {
            query = query.filter(cache_entry::Column::Category.eq(category));
        }

        let removed = query.exec(&self.db).await?.rows_affected;
        debug!(removed, "Expired cache entries removed");
        Ok(removed)
    }

    /// Removes every entry.
    pub async fn clear(&self) -> Result<u64> {
        Ok(CacheEntry::delete_many()
            .exec(&self.db)
            .await?
            .rows_affected)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_respects_expiry() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = CacheStore::new(db);

        cache
            .set_at("totals", &json!({"sum": 42}), 1_000, category::ANALYTICS, 10_000)
            .await?;

        let hit: Option<serde_json::Value> = cache.get_at("totals", 10_999).await?;
        assert_eq!(hit, Some(json!({"sum": 42})));

        // Expiry is exclusive: at expires_at the entry is gone
        let miss: Option<serde_json::Value> = cache.get_at("totals", 11_000).await?;
        assert!(miss.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_entry() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = CacheStore::new(db);

        cache.set("key", &1_i64, 60_000, category::GENERAL).await?;
        cache.set("key", &2_i64, 60_000, category::ENVELOPES).await?;

        assert_eq!(cache.get::<i64>("key").await?, Some(2));

        // Category moved with the overwrite
        cache.invalidate_category(category::ENVELOPES).await?;
        assert_eq!(cache.get::<i64>("key").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalidate_category_only_touches_that_category() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = CacheStore::new(db);

        cache.set("a", &"x", 60_000, category::ENVELOPES).await?;
        cache.set("b", &"y", 60_000, category::ENVELOPES).await?;
        cache.set("c", &"z", 60_000, category::TRANSACTIONS).await?;

        let removed = cache.invalidate_category(category::ENVELOPES).await?;
        assert_eq!(removed, 2);
        assert_eq!(cache.get::<String>("a").await?, None);
        assert_eq!(cache.get::<String>("c").await?, Some("z".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_cleanup_by_category() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = CacheStore::new(db);

        cache.set_at("old-env", &1, 10, category::ENVELOPES, 0).await?;
        cache.set_at("old-gen", &2, 10, category::GENERAL, 0).await?;
        cache.set_at("new-env", &3, 10_000, category::ENVELOPES, 0).await?;

        assert_eq!(cache.cleanup_at(Some(category::ENVELOPES), 100).await?, 1);
        assert_eq!(cache.cleanup_at(None, 100).await?, 1);
        assert_eq!(cache.get_at::<i32>("new-env", 100).await?, Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_or_insert_with_memoizes() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = CacheStore::new(db);

        let first: Vec<String> = cache
            .get_or_insert_with("names", 60_000, category::GENERAL, || async {
                Ok(vec!["Rent".to_string()])
            })
            .await?;
        let second: Vec<String> = cache
            .get_or_insert_with("names", 60_000, category::GENERAL, || async {
                Ok(vec!["Different".to_string()])
            })
            .await?;

        assert_eq!(first, second);
        assert_eq!(cache.clear().await?, 1);
        Ok(())
    }
}
