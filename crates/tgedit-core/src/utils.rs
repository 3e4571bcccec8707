use chrono::Utc;

/// RFC3339 timestamp in UTC, as stored in `last_update` and `edit_history`.
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}
