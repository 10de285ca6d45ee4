//! Common types used across pluginhub modules.

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Free-form JSON map used for plugin configuration and event payloads.
pub type JsonMap = std::collections::HashMap<String, serde_json::Value>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
