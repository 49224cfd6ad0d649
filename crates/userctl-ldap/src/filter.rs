//! Search filter construction.

/// `(objectClass=<class>)`
#[must_use]
pub fn object_class(class: &str) -> String {
    format!("(objectClass={})", escape_filter_value(class))
}

/// Exact-match filter in the `(&(attr=value))` form used for account lookups.
#[must_use]
pub fn equals(attribute: &str, value: &str) -> String {
    format!("(&({attribute}={}))", escape_filter_value(value))
}

/// Escapes a value for inclusion in a search filter (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
