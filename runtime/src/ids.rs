//! Order id generation.
//!
//! Ids look like `20260319143015` + `17` + `-000042-3f9a1c2e`: a second
//! resolution timestamp and the buyer id keep them human sortable, the
//! process-wide sequence and a random suffix keep two commits by the same
//! buyer in the same second (or on two hosts) apart.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use storefront_core::{OrderId, UserId};
use uuid::Uuid;

/// Produces collision-resistant order ids.
pub trait OrderIdGenerator: Send + Sync {
    /// Next id for an order created by `user_id` at `now`.
    fn next_id(&self, user_id: UserId, now: DateTime<Utc>) -> OrderId;
}

/// Timestamp + user + sequence + random suffix.
#[derive(Debug, Default)]
pub struct TimestampIdGenerator {
    sequence: AtomicU64,
}

impl TimestampIdGenerator {
    /// Generator starting its sequence at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
        }
    }
}

impl OrderIdGenerator for TimestampIdGenerator {
    fn next_id(&self, user_id: UserId, now: DateTime<Utc>) -> OrderId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        let random = Uuid::new_v4().simple().to_string();
        let suffix = random.get(..8).unwrap_or(&random);
        OrderId::new(format!(
            "{}{}-{seq:06}-{suffix}",
            now.format("%Y%m%d%H%M%S"),
            user_id
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn ids_start_with_timestamp_and_user() {
        let generator = TimestampIdGenerator::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 19, 14, 30, 15).unwrap();

        let id = generator.next_id(UserId::new(17), now);

        assert!(id.as_str().starts_with("2026031914301517-000000-"));
        assert_eq!(id.as_str().len(), "2026031914301517-000000-".len() + 8);
    }

    #[test]
    fn same_user_same_second_never_collides() {
        let generator = TimestampIdGenerator::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 19, 14, 30, 15).unwrap();

        let ids: HashSet<_> = (0..1000)
            .map(|_| generator.next_id(UserId::new(17), now))
            .collect();

        assert_eq!(ids.len(), 1000);
    }
}
