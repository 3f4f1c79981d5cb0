//! ID generation utilities.

use uuid::Uuid;

/// Generate a new UUID v4.
pub fn uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a short random ID (8 characters).
pub fn short_id() -> String {
    let bytes: [u8; 4] = rand::random();
    hex::encode(bytes)
}

/// Build an echo tag: the bridge's marker for messages it originated itself.
pub fn echo_tag(prefix: &str, native_id: &str) -> String {
    format!("{}{}", prefix, native_id)
}

/// Check whether a source id carries the bridge's echo-tag prefix.
pub fn is_echo_tag(prefix: &str, source_id: &str) -> bool {
    !prefix.is_empty() && source_id.starts_with(prefix)
}
