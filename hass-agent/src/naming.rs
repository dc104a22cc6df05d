//! Identifier and topic normalization
//!
//! Home Assistant discovery topics and `unique_id`s only tolerate a small
//! alphabet. Every human-facing name goes through [`normalize`] and then
//! [`safe_id`] before it lands in a topic.

/// Collapse runs of whitespace into a single space and trim both ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reduce `text` to `[a-z0-9_-]`.
///
/// Lower-cases the input, replaces each maximal run of characters outside
/// `[a-z0-9-]` with one `_`, then trims `_` from both ends. Symbol-only input
/// yields an empty string.
pub fn safe_id(text: &str) -> String {
    let mut id = String::with_capacity(text.len());
    let mut in_run = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            id.push(c);
            in_run = false;
        } else if !in_run {
            id.push('_');
            in_run = true;
        }
    }

    id.trim_matches('_').to_string()
}

/// `safe_id(normalize(name))`, the form used inside topics.
pub fn sensor_id(name: &str) -> String {
    safe_id(&normalize(name))
}
