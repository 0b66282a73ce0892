use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::detection::domain::detection::MaskLabel;
use crate::events::domain::event::{Event, EventId, EventSource};

#[derive(Error, Debug)]
pub enum EventStoreError {
    #[error("event append failed: {0}")]
    Append(String),
    #[error("event query failed: {0}")]
    Query(String),
}

/// Filter set for querying logged events. Empty filters match everything.
#[derive(Clone, Debug, Default)]
pub struct EventQuery {
    pub source: Option<EventSource>,
    pub label: Option<MaskLabel>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl EventQuery {
    pub fn matches(&self, event: &Event) -> bool {
        if self.source.is_some_and(|s| s != event.source) {
            return false;
        }
        if self.label.is_some_and(|l| l != event.label) {
            return false;
        }
        if self.start.is_some_and(|start| event.timestamp < start) {
            return false;
        }
        if self.end.is_some_and(|end| event.timestamp > end) {
            return false;
        }
        true
    }
}

/// Port for the durable event log collaborator.
///
/// The core treats it as an append-only sink safe for concurrent appends;
/// query results are ordered newest first. A failed append must not abort
/// the alert decision that produced the event.
pub trait EventStore: Send + Sync {
    fn append(&self, event: Event) -> Result<EventId, EventStoreError>;

    fn query(&self, query: &EventQuery) -> Result<Vec<Event>, EventStoreError>;
}
