use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Default shared budget of dispatch attempts per window
pub const MAX_REQUESTS_PER_MINUTE: usize = 10;

/// One dispatch attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub operation: &'static str,
    pub issued_at: DateTime<Utc>,
}

/// Sliding-window limiter over every operation kind combined.
#[derive(Debug)]
pub struct RateWindow {
    records: VecDeque<RequestRecord>,
    limit: usize,
    window: Duration,
}

impl RateWindow {
    pub fn new(limit: usize) -> Self {
        RateWindow {
            records: VecDeque::new(),
            limit,
            window: Duration::seconds(60),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Attempts inside the trailing window. Prunes expired records first.
    pub fn count(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        self.records.retain(|r| r.issued_at > cutoff);
        self.records.len()
    }

    pub fn has_capacity(&mut self, now: DateTime<Utc>) -> bool {
        self.count(now) < self.limit
    }

    /// Earliest attempt still held. Call after `count` to skip expired ones.
    pub fn oldest(&self) -> Option<&RequestRecord> {
        self.records.front()
    }

    pub fn record(&mut self, operation: &'static str, now: DateTime<Utc>) {
        self.records.push_back(RequestRecord {
            operation,
            issued_at: now,
        });
    }
}
