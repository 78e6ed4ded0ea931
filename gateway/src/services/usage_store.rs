//! Trait boundary for the gateway's usage ledger, plus the in-memory adapter the reference
//! binary and the test suite run against.
//!
//! A small `#[async_trait]` interface so a persistent adapter (Postgres, Redis, ...) can be
//! swapped in without touching the dispatcher or session handler, even though the bundled
//! adapter here never actually suspends.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use gateway_types::{UsageRecord, UserId};
use parking_lot::Mutex;

/// Dynamic trait object for a usage store implementation.
pub(crate) type UsageStoreService = Arc<dyn UsageStore + Send + Sync>;

/// Tracks each user's remaining and total transcription usage.
///
/// Implementations are not required to make `update_usage` atomic with `get_usage` across a
/// network boundary; the core tolerates mild drift (a client may slightly overrun its budget
/// within one packet whose cost was underestimated by admission). The core never pre-reserves
/// budget — admission only ever checks that `remaining_ms > 0` at a point in time.
#[async_trait]
pub(crate) trait UsageStore {
    /// Returns the current ledger for `user_id`. A user never seen before has `{0, 0}`.
    async fn get_usage(&self, user_id: &UserId) -> UsageRecord;

    /// Applies `used_ms` to `user_id`'s ledger: `total_used_ms += used_ms`,
    /// `remaining_ms = max(0, remaining_ms - used_ms)`.
    async fn update_usage(&self, user_id: &UserId, used_ms: u64) -> UsageRecord;

    /// Ensures `user_id` has a ledger, materializing the configured default budget the first
    /// time the user is seen. Returns the (possibly just-created) ledger.
    ///
    /// Distinct from `get_usage`, which reports `{0, 0}` for a never-seen user rather
    /// than implicitly creating one — admission calls this instead so a first-time user is
    /// granted their starting budget exactly once, at session start.
    async fn seed_if_absent(&self, user_id: &UserId) -> UsageRecord;

    /// Test-only: overwrites every known user's ledger to `{limit, 0}`.
    async fn reset_storage(&self, limit: u64);
}

/// An in-memory [`UsageStore`], guarded by a `parking_lot::Mutex`.
///
/// Unseen users are admitted with `default_budget_ms` the first time their usage is read, not
/// before — `get_usage` on a never-seen user returns `{0, 0}` per the contract; the default
/// budget is only materialized when the session handler explicitly seeds it at admission.
#[derive(Clone)]
pub(crate) struct InMemoryUsageStore {
    records: Arc<Mutex<HashMap<UserId, UsageRecord>>>,
    default_budget_ms: u64,
}

impl InMemoryUsageStore {
    /// Creates an empty store. `default_budget_ms` is the budget newly-admitted users start
    /// with once seeded via [`InMemoryUsageStore::seed_if_absent`].
    pub(crate) fn new(default_budget_ms: u64) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            default_budget_ms,
        }
    }

}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get_usage(&self, user_id: &UserId) -> UsageRecord {
        self.records.lock().get(user_id).copied().unwrap_or_default()
    }

    async fn update_usage(&self, user_id: &UserId, used_ms: u64) -> UsageRecord {
        let mut records = self.records.lock();
        let record = records
            .entry(user_id.clone())
            .or_insert_with(|| UsageRecord::with_limit(self.default_budget_ms));
        record.apply_usage(used_ms);
        *record
    }

    async fn seed_if_absent(&self, user_id: &UserId) -> UsageRecord {
        *self
            .records
            .lock()
            .entry(user_id.clone())
            .or_insert_with(|| UsageRecord::with_limit(self.default_budget_ms))
    }

    async fn reset_storage(&self, limit: u64) {
        let mut records = self.records.lock();
        for record in records.values_mut() {
            *record = UsageRecord::with_limit(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_user_has_zero_usage() {
        let store = InMemoryUsageStore::new(1000);
        let usage = store.get_usage(&UserId::new("a")).await;
        assert_eq!(usage.remaining_ms, 0);
        assert_eq!(usage.total_used_ms, 0);
    }

    #[tokio::test]
    async fn seed_if_absent_grants_default_budget_once() {
        let store = InMemoryUsageStore::new(1000);
        let user = UserId::new("a");
        let first = store.seed_if_absent(&user).await;
        assert_eq!(first.remaining_ms, 1000);
        store.update_usage(&user, 400).await;
        let second = store.seed_if_absent(&user).await;
        assert_eq!(second.remaining_ms, 600, "re-seeding must not reset an existing ledger");
    }

    #[tokio::test]
    async fn update_usage_accumulates_and_clamps() {
        let store = InMemoryUsageStore::new(1000);
        let user = UserId::new("a");
        store.seed_if_absent(&user).await;

        let after_one = store.update_usage(&user, 250).await;
        assert_eq!(after_one.remaining_ms, 750);
        assert_eq!(after_one.total_used_ms, 250);

        let after_two = store.update_usage(&user, 900).await;
        // remaining clamps at zero even though 250 + 900 > 1000
        assert_eq!(after_two.remaining_ms, 0);
        // total keeps accumulating the full cost
        assert_eq!(after_two.total_used_ms, 1150);
    }

    #[tokio::test]
    async fn reset_storage_overwrites_known_users() {
        let store = InMemoryUsageStore::new(1000);
        let user = UserId::new("a");
        store.update_usage(&user, 500).await;
        store.reset_storage(2000).await;
        let usage = store.get_usage(&user).await;
        assert_eq!(usage.remaining_ms, 2000);
        assert_eq!(usage.total_used_ms, 0);
    }
}
