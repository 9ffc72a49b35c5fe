//! Interfaces consumed by the remote sync collaborator.
//!
//! Services receive a [`SharedNotifier`] at construction and signal it after every
//! committed mutation. The engine never depends on what the notifier does with
//! those signals; [`ChannelNotifier`] forwards them over a tokio channel so a sync
//! task can consume them without sharing state.

use crate::{
    cache::CacheStore,
    entities::{Budget, Envelope, Transaction, budget, envelope, transaction},
    errors::Result,
};
use sea_orm::{ConnectionTrait, EntityTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

/// Query group a UI layer would refetch after a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryGroup {
    /// Envelope lists and details
    Envelopes,
    /// Transaction lists
    Transactions,
    /// Bills and bill-funding views
    Bills,
    /// Paycheck history
    Paychecks,
    /// Balance summary and metadata
    Budget,
    /// Aggregates and reports
    Analytics,
}

/// Receiver side of the sync collaboration.
pub trait SyncNotifier: Send + Sync + fmt::Debug {
    /// Signals that a mutation happened that should speed up the next sync.
    fn trigger_critical_change(&self, change_type: &str);

    /// Asks the query layer to refetch a group. Ignored by default.
    fn invalidate_queries(&self, _group: QueryGroup) {}
}

/// Notifier handle shared by all services.
pub type SharedNotifier = Arc<dyn SyncNotifier>;

/// Notifier that drops every signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl SyncNotifier for NoopNotifier {
    fn trigger_critical_change(&self, change_type: &str) {
        debug!(change_type, "Critical change (no sync attached)");
    }
}

/// Message sent by [`ChannelNotifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncSignal {
    /// A committed mutation of the given kind
    CriticalChange(String),
    /// A query group to refetch
    InvalidateQueries(QueryGroup),
}

/// Notifier that forwards signals over an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    sender: UnboundedSender<SyncSignal>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiver its signals arrive on.
    #[must_use]
    pub fn new() -> (Self, UnboundedReceiver<SyncSignal>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, signal: SyncSignal) {
        // A closed receiver means sync has shut down; the mutation already committed
        if self.sender.send(signal).is_err() {
            debug!("Sync receiver dropped, signal discarded");
        }
    }
}

impl SyncNotifier for ChannelNotifier {
    fn trigger_critical_change(&self, change_type: &str) {
        self.send(SyncSignal::CriticalChange(change_type.to_string()));
    }

    fn invalidate_queries(&self, group: QueryGroup) {
        self.send(SyncSignal::InvalidateQueries(group));
    }
}

/// Post-commit bookkeeping for one mutation: which cache categories and query
/// groups went stale, and the change type reported to sync.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Change<'a> {
    pub change_type: &'a str,
    pub cache_categories: &'a [&'a str],
    pub query_groups: &'a [QueryGroup],
}

/// Invalidates the cache and signals the notifier. Runs after commit, so a
/// failure here is logged and never reported as a failed mutation.
pub(crate) async fn publish(cache: &CacheStore, notifier: &dyn SyncNotifier, change: Change<'_>) {
    for category in change.cache_categories {
        if let Err(e) = cache.invalidate_category(category).await {
            warn!(category, error = %e, "Cache invalidation failed");
        }
    }
    for group in change.query_groups {
        notifier.invalidate_queries(*group);
    }
    notifier.trigger_critical_change(change.change_type);
}

/// Local state handed to sync for diffing against the remote copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSnapshot {
    /// Every envelope, archived included
    pub envelopes: Vec<envelope::Model>,
    /// Every transaction, newest first
    pub transactions: Vec<transaction::Model>,
    /// Newest `last_modified` across metadata, envelopes and transactions
    pub last_modified: i64,
}

/// Reads the state sync diffs against.
pub async fn fetch_local_snapshot<C>(db: &C) -> Result<LocalSnapshot>
where
    C: ConnectionTrait,
{
    let envelopes = Envelope::find()
        .order_by_asc(envelope::Column::Name)
        .all(db)
        .await?;
    let transactions = Transaction::find()
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::CreatedAt)
        .all(db)
        .await?;
    let metadata_modified = Budget::find_by_id(crate::core::metadata::METADATA_ID)
        .one(db)
        .await?
        .map_or(0, |row: budget::Model| row.last_modified);

    let last_modified = envelopes
        .iter()
        .map(|e| e.last_modified)
        .chain(transactions.iter().map(|t| t.last_modified))
        .fold(metadata_modified, i64::max);

    Ok(LocalSnapshot {
        envelopes,
        transactions,
        last_modified,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_channel_notifier_forwards_signals() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.invalidate_queries(QueryGroup::Envelopes);
        notifier.trigger_critical_change("envelope_created");

        assert_eq!(
            rx.try_recv().unwrap(),
            SyncSignal::InvalidateQueries(QueryGroup::Envelopes)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncSignal::CriticalChange("envelope_created".to_string())
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_notifier_tolerates_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.trigger_critical_change("transaction_added");
    }

    #[tokio::test]
    async fn test_fetch_local_snapshot() -> Result<()> {
        let db = setup_test_db().await?;
        let empty = fetch_local_snapshot(&db).await?;
        assert!(empty.envelopes.is_empty());
        assert_eq!(empty.last_modified, 0);

        let groceries = create_funded_envelope(&db, "Groceries", 10_000).await?;
        let snapshot = fetch_local_snapshot(&db).await?;
        assert_eq!(snapshot.envelopes.len(), 1);
        assert_eq!(snapshot.envelopes[0].id, groceries.id);
        assert!(snapshot.last_modified >= groceries.last_modified);
        Ok(())
    }
}
