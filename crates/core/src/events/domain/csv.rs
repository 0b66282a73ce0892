//! CSV export of logged events.
//!
//! Fixed column order so downstream spreadsheets and scripts can rely on
//! positions: timestamp, source, label, confidence, track_id, snapshot_ref.

use crate::events::domain::event::Event;

pub const CSV_HEADER: &str = "timestamp,source,label,confidence,track_id,snapshot_ref";

/// Renders events (already filtered/ordered by the caller) as a CSV
/// document with a header row.
pub fn export_csv(events: &[Event]) -> String {
    let mut out = String::with_capacity(64 * (events.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');

    for event in events {
        let track = event
            .track_id
            .map(|t| t.to_string())
            .unwrap_or_default();
        let snapshot = event.snapshot_ref.as_deref().unwrap_or_default();

        out.push_str(&quote(&event.timestamp.to_rfc3339()));
        out.push(',');
        out.push_str(event.source.as_str());
        out.push(',');
        out.push_str(event.label.as_str());
        out.push(',');
        out.push_str(&format!("{:.4}", event.confidence));
        out.push(',');
        out.push_str(&track);
        out.push(',');
        out.push_str(&quote(snapshot));
        out.push('\n');
    }
    out
}

/// Standard CSV quoting: wrap when the field contains a delimiter, quote,
/// or newline; embedded quotes are doubled.
fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
