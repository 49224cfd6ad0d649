//! Directory entries as returned by searches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

/// Attribute name paired with its values, as submitted in add requests.
pub type Attribute = (String, Vec<String>);

/// Snapshot of a directory entry at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map; values keep the order returned by the server.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Creates an entry from a DN and attribute pairs.
    #[must_use]
    pub fn new<I>(dn: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = Attribute>,
    {
        Self {
            dn: dn.into(),
            attributes: attributes.into_iter().collect(),
        }
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute.
    ///
    /// Attribute names are matched case-insensitively, as the directory does.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }

    /// Returns true if the attribute holds `value` exactly.
    #[must_use]
    pub fn has_value(&self, attribute: &str, value: &str) -> bool {
        self.values(attribute)
            .is_some_and(|values| values.iter().any(|v| v == value))
    }
}

/// Renders entries as indented JSON.
///
/// # Errors
///
/// Returns [`userctl_core::Error::Serialization`] if encoding fails.
pub fn render_report(entries: &[DirectoryEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}
