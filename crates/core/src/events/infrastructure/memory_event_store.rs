use std::sync::Mutex;

use crate::events::domain::event::{Event, EventId};
use crate::events::domain::event_store::{EventQuery, EventStore, EventStoreError};

/// Process-local event sink.
///
/// The durable store is an external collaborator; this implementation
/// backs tests, the CLI, and deployments that accept losing history on
/// restart. Safe for concurrent appends per the port contract.
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
}

struct Inner {
    events: Vec<Event>,
    next_id: u64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: Vec::new(),
                next_id: 1,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, event: Event) -> Result<EventId, EventStoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EventStoreError::Append("store mutex poisoned".into()))?;
        let id = EventId(inner.next_id);
        inner.next_id += 1;
        inner.events.push(event);
        Ok(id)
    }

    fn query(&self, query: &EventQuery) -> Result<Vec<Event>, EventStoreError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| EventStoreError::Query("store mutex poisoned".into()))?;
        let mut matched: Vec<Event> = inner
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::{MaskLabel, TrackId};
    use crate::events::domain::event::EventSource;
    use std::sync::Arc;

    fn event(ts: &str, source: EventSource, label: MaskLabel) -> Event {
        Event {
            timestamp: ts.parse().unwrap(),
            source,
            label,
            confidence: 0.8,
            track_id: Some(TrackId(1)),
            snapshot_ref: None,
            meta: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let store = InMemoryEventStore::new();
        let a = store
            .append(event("2026-01-05T12:00:00Z", EventSource::Live, MaskLabel::NoMask))
            .unwrap();
        let b = store
            .append(event("2026-01-05T12:00:01Z", EventSource::Live, MaskLabel::NoMask))
            .unwrap();
        assert!(b.0 > a.0);
    }

    #[test]
    fn test_query_is_reverse_chronological() {
        let store = InMemoryEventStore::new();
        store
            .append(event("2026-01-05T12:00:00Z", EventSource::Live, MaskLabel::NoMask))
            .unwrap();
        store
            .append(event("2026-01-05T14:00:00Z", EventSource::Live, MaskLabel::NoMask))
            .unwrap();
        store
            .append(event("2026-01-05T13:00:00Z", EventSource::Live, MaskLabel::NoMask))
            .unwrap();

        let events = store.query(&EventQuery::default()).unwrap();
        let hours: Vec<u32> = events
            .iter()
            .map(|e| chrono::Timelike::hour(&e.timestamp))
            .collect();
        assert_eq!(hours, vec![14, 13, 12]);
    }

    #[test]
    fn test_query_applies_filters() {
        let store = InMemoryEventStore::new();
        store
            .append(event("2026-01-05T12:00:00Z", EventSource::Live, MaskLabel::NoMask))
            .unwrap();
        store
            .append(event("2026-01-05T12:00:01Z", EventSource::Video, MaskLabel::NoMask))
            .unwrap();
        store
            .append(event("2026-01-05T12:00:02Z", EventSource::Video, MaskLabel::MaskOn))
            .unwrap();

        let events = store
            .query(&EventQuery {
                source: Some(EventSource::Video),
                label: Some(MaskLabel::NoMask),
                ..EventQuery::default()
            })
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, EventSource::Video);
    }

    #[test]
    fn test_concurrent_appends_all_land() {
        let store = Arc::new(InMemoryEventStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .append(event(
                            "2026-01-05T12:00:00Z",
                            EventSource::Live,
                            MaskLabel::NoMask,
                        ))
                        .unwrap()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap().0).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(store.len(), 8);
    }
}
