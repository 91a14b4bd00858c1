//! Events and the batches they are grouped into.
//!
//! The relay never looks inside an [`Event`] payload: it records when the
//! event arrived and moves the JSON value intact. A [`Batch`] is the unit
//! of downstream delivery and preserves the arrival order of its events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, EventId};

/// A single ingested event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier assigned at ingestion.
    pub id: EventId,
    /// The opaque payload exactly as accepted by the ingestion layer.
    pub payload: serde_json::Value,
    /// Wall-clock time the event was accepted.
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Wrap a payload in a new event stamped with the current time.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// An ordered group of events handed to delivery as one unit.
///
/// `created_at` is the arrival time of the first event. Events are kept
/// in the order they were appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier for this batch.
    pub id: BatchId,
    /// Arrival time of the first event in the batch.
    pub created_at: DateTime<Utc>,
    /// Events in arrival order.
    pub events: Vec<Event>,
}

impl Batch {
    /// Start a batch with its first event.
    pub fn start(first: Event) -> Self {
        Self {
            id: BatchId::new(),
            created_at: first.received_at,
            events: vec![first],
        }
    }

    /// Append an event to the end of the batch.
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the event IDs in arrival order.
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.events.iter().map(|e| e.id)
    }
}
