//! Event deduplication
//!
//! The processor delivers events at least once. Processed event ids are kept
//! in a bounded set (oldest evicted first) so a redelivery is acknowledged
//! without touching the ledger. Ids currently being applied are tracked
//! separately; a delivery that fails releases its id so the next attempt can
//! apply it.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of claiming an event id
#[derive(Debug)]
pub enum Claim<'a> {
    /// First delivery; apply it and then call [`EventClaim::complete`]
    Fresh(EventClaim<'a>),
    /// Already applied
    Duplicate,
    /// Another delivery of the same event is being applied
    InFlight,
}

#[derive(Debug, Default)]
struct Inner {
    processed: HashSet<String>,
    order: VecDeque<String>,
    in_flight: HashSet<String>,
}

/// Bounded record of processed event ids
#[derive(Debug)]
pub struct ProcessedEvents {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ProcessedEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims `event_id` for processing
    pub fn claim(&self, event_id: &str) -> Claim<'_> {
        let mut inner = self.lock();
        if inner.processed.contains(event_id) {
            return Claim::Duplicate;
        }
        if !inner.in_flight.insert(event_id.to_string()) {
            return Claim::InFlight;
        }
        Claim::Fresh(EventClaim {
            events: self,
            event_id: event_id.to_string(),
            completed: false,
        })
    }

    pub fn is_processed(&self, event_id: &str) -> bool {
        self.lock().processed.contains(event_id)
    }

    /// Number of remembered processed ids
    pub fn len(&self) -> usize {
        self.lock().processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(&self, event_id: &str, processed: bool) {
        let mut inner = self.lock();
        inner.in_flight.remove(event_id);
        if !processed || self.capacity == 0 {
            return;
        }
        if inner.processed.insert(event_id.to_string()) {
            inner.order.push_back(event_id.to_string());
        }
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.processed.remove(&evicted);
            }
        }
    }
}

/// An in-flight event id, released on drop unless completed
#[derive(Debug)]
pub struct EventClaim<'a> {
    events: &'a ProcessedEvents,
    event_id: String,
    completed: bool,
}

impl EventClaim<'_> {
    /// Marks the event as processed
    pub fn complete(mut self) {
        self.completed = true;
        self.events.finish(&self.event_id, true);
    }
}

impl Drop for EventClaim<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.events.finish(&self.event_id, false);
        }
    }
}
