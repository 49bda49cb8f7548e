use chrono::{DateTime, Utc};

use crate::messages::Request;

/// A request held back until `ready_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRequest {
    pub request: Request,
    pub ready_at: DateTime<Utc>,
}

/// Pending requests, at most one per distinct request.
#[derive(Debug, Default)]
pub struct DeferredRequests {
    items: Vec<ScheduledRequest>,
}

impl DeferredRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request, or pull an existing identical one earlier.
    pub fn insert(&mut self, request: Request, ready_at: DateTime<Utc>) {
        match self.items.iter_mut().find(|s| s.request == request) {
            Some(existing) => {
                if ready_at < existing.ready_at {
                    existing.ready_at = ready_at;
                }
            }
            None => self.items.push(ScheduledRequest { request, ready_at }),
        }
    }

    /// Remove and return every request whose time has passed, in insertion order.
    pub fn take_ready(&mut self, now: DateTime<Utc>) -> Vec<Request> {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|s| s.ready_at < now);
        self.items = waiting;
        ready.into_iter().map(|s| s.request).collect()
    }

    #[cfg(test)]
    pub fn ready_at(&self, request: &Request) -> Option<DateTime<Utc>> {
        self.items
            .iter()
            .find(|s| &s.request == request)
            .map(|s| s.ready_at)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
