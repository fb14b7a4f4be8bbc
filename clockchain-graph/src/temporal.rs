//! Record timestamps for stored moments
//!
//! Tracks when a node record was created, last written, and first made
//! public. These are system times, unrelated to the historical date the
//! node describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle timestamps for a node record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTimestamps {
    /// When the record was first inserted
    pub created_at: DateTime<Utc>,

    /// When any field was last written
    pub updated_at: DateTime<Utc>,

    /// When the record first became public (never cleared)
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl RecordTimestamps {
    /// Timestamps for a record created at `now`
    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }

    /// Timestamps for a record created now
    pub fn now() -> Self {
        Self::new_at(Utc::now())
    }

    /// Record a write
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Stamp first publication; returns false if already published
    pub fn mark_published(&mut self, now: DateTime<Utc>) -> bool {
        if self.published_at.is_some() {
            return false;
        }
        self.published_at = Some(now);
        true
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}

impl Default for RecordTimestamps {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_at() {
        let now = Utc::now();
        let ts = RecordTimestamps::new_at(now);
        assert_eq!(ts.created_at, now);
        assert_eq!(ts.updated_at, now);
        assert!(!ts.is_published());
    }

    #[test]
    fn test_touch_only_moves_forward() {
        let now = Utc::now();
        let mut ts = RecordTimestamps::new_at(now);

        ts.touch(now - Duration::hours(1));
        assert_eq!(ts.updated_at, now);

        let later = now + Duration::minutes(5);
        ts.touch(later);
        assert_eq!(ts.updated_at, later);
        assert_eq!(ts.created_at, now);
    }

    #[test]
    fn test_mark_published_once() {
        let now = Utc::now();
        let mut ts = RecordTimestamps::new_at(now);

        assert!(ts.mark_published(now));
        assert!(!ts.mark_published(now + Duration::days(1)));
        assert_eq!(ts.published_at, Some(now));
    }

    #[test]
    fn test_bincode_round_trip() {
        let mut ts = RecordTimestamps::now();
        ts.mark_published(Utc::now());
        let bytes = bincode::serialize(&ts).unwrap();
        let back: RecordTimestamps = bincode::deserialize(&bytes).unwrap();
        assert_eq!(ts, back);
    }
}
