use chrono::{DateTime, Utc};

/// Second precision, no offset. This is the layout the chat endpoint parses.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_timestamp(moment: DateTime<Utc>) -> String {
    moment.format(TIMESTAMP_FORMAT).to_string()
}

/// An explicit date-field value wins verbatim; a blank or missing one means "now".
pub fn effective_timestamp(explicit: Option<&str>, now: DateTime<Utc>) -> String {
    match explicit {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => format_timestamp(now),
    }
}
