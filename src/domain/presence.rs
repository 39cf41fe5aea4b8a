//! User presence tracking
//!
//! Heartbeat-driven online/last-seen state, read by peers before
//! dialing. Presence is advisory: it can lag reality, so the dial path
//! treats "offline" as a confirmation prompt, never a hard stop.

use crate::domain::shared::value_objects::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-user presence snapshot. Latest write wins, no history kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    fn online(user_id: UserId) -> Self {
        Self {
            user_id,
            is_online: true,
            last_seen: Utc::now(),
        }
    }
}

/// Presence oracle
///
/// Clients heartbeat on a fixed interval (default 30s) and on activity
/// signals. A user reads as online while the flag is set AND the last
/// heartbeat is younger than the staleness threshold. The threshold is
/// at least twice the interval, so one missed beat never flips a user
/// to offline.
pub struct PresenceOracle {
    records: Mutex<HashMap<UserId, PresenceRecord>>,
    staleness: Duration,
}

impl PresenceOracle {
    pub fn new(staleness: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            staleness,
        }
    }

    /// Upsert `is_online=true, last_seen=now` for the user
    pub fn heartbeat(&self, user: &UserId) {
        let mut records = self.records.lock().unwrap();
        records.insert(*user, PresenceRecord::online(*user));
    }

    /// Clean disconnect: flag goes down, last_seen stays
    pub fn mark_offline(&self, user: &UserId) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(user) {
            record.is_online = false;
        }
    }

    /// Online flag AND a heartbeat younger than the staleness threshold
    pub fn is_online(&self, user: &UserId) -> bool {
        let records = self.records.lock().unwrap();
        records
            .get(user)
            .map(|r| r.is_online && Utc::now() - r.last_seen < self.staleness)
            .unwrap_or(false)
    }

    pub fn last_seen(&self, user: &UserId) -> Option<DateTime<Utc>> {
        let records = self.records.lock().unwrap();
        records.get(user).map(|r| r.last_seen)
    }

    pub fn snapshot(&self, user: &UserId) -> Option<PresenceRecord> {
        let records = self.records.lock().unwrap();
        records.get(user).cloned()
    }

    /// Flip the online flag down for users whose heartbeats went stale.
    /// Run periodically; returns how many flags were lowered.
    pub fn sweep_stale(&self) -> usize {
        let mut records = self.records.lock().unwrap();
        let now = Utc::now();
        let mut swept = 0;

        for record in records.values_mut() {
            if record.is_online && now - record.last_seen >= self.staleness {
                record.is_online = false;
                swept += 1;
            }
        }

        swept
    }

    pub fn online_count(&self) -> usize {
        let records = self.records.lock().unwrap();
        let now = Utc::now();
        records
            .values()
            .filter(|r| r.is_online && now - r.last_seen < self.staleness)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> PresenceOracle {
        PresenceOracle::new(Duration::seconds(90))
    }

    #[test]
    fn test_unknown_user_is_offline() {
        assert!(!oracle().is_online(&UserId::new()));
        assert!(oracle().last_seen(&UserId::new()).is_none());
    }

    #[test]
    fn test_heartbeat_marks_online() {
        let oracle = oracle();
        let user = UserId::new();

        oracle.heartbeat(&user);
        assert!(oracle.is_online(&user));
        assert!(oracle.last_seen(&user).is_some());
    }

    #[test]
    fn test_mark_offline_keeps_last_seen() {
        let oracle = oracle();
        let user = UserId::new();

        oracle.heartbeat(&user);
        let seen = oracle.last_seen(&user);
        oracle.mark_offline(&user);

        assert!(!oracle.is_online(&user));
        assert_eq!(oracle.last_seen(&user), seen);
    }

    #[test]
    fn test_stale_heartbeat_reads_offline() {
        let oracle = PresenceOracle::new(Duration::zero());
        let user = UserId::new();

        oracle.heartbeat(&user);
        // Zero threshold: the beat is stale the moment it lands
        assert!(!oracle.is_online(&user));
    }

    #[test]
    fn test_sweep_stale_lowers_flags() {
        let oracle = PresenceOracle::new(Duration::zero());
        let user = UserId::new();

        oracle.heartbeat(&user);
        assert_eq!(oracle.sweep_stale(), 1);
        assert_eq!(oracle.sweep_stale(), 0);
        assert!(!oracle.snapshot(&user).unwrap().is_online);
    }

    #[test]
    fn test_online_count() {
        let oracle = oracle();
        let a = UserId::new();
        let b = UserId::new();

        oracle.heartbeat(&a);
        oracle.heartbeat(&b);
        oracle.mark_offline(&b);

        assert_eq!(oracle.online_count(), 1);
    }
}
