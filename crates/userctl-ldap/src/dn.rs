//! Distinguished name handling and the directory tree layout.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use userctl_core::{DirectoryConfig, Error as CoreError};

/// Errors that can occur when parsing distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidArgument(err.to_string())
    }
}

/// Single `attribute=value` component of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Create a new relative distinguished name from an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute portion of the RDN (e.g. `uid`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape(&self.value))
    }
}

/// Parsed distinguished name, most specific component first.
///
/// Values are stored unescaped and re-escaped on output, so a username containing `,` or `+`
/// cannot inject additional components into an entry DN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    rdns: Vec<RelativeDistinguishedName>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// Multi-valued RDNs (`cn=a+uid=b`) are not used by the Samba schema and are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the input is empty or malformed.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let rdns = split_escaped(raw, ',')?
            .iter()
            .map(|component| {
                if split_escaped(component, '+')?.len() > 1 {
                    return Err(DistinguishedNameError::InvalidComponent(component.clone()));
                }
                let (attribute, value) = split_attribute_value(component)?;
                Ok(RelativeDistinguishedName::new(attribute, value))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { rdns })
    }

    /// Components in order, most specific first.
    #[must_use]
    pub fn rdns(&self) -> &[RelativeDistinguishedName] {
        &self.rdns
    }

    /// Value of the first component whose attribute matches (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns
            .iter()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Returns a new DN with `rdn` placed below this one.
    #[must_use]
    pub fn child(&self, rdn: RelativeDistinguishedName) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, rdn) in self.rdns.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Where user and group entries live below the base DN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    base: DistinguishedName,
    people: DistinguishedName,
    groups: DistinguishedName,
}

impl DirectoryLayout {
    /// Builds the layout `ou=<people>,<base>` / `ou=<group>,<base>`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the base DN does not parse.
    pub fn from_config(config: &DirectoryConfig) -> userctl_core::Result<Self> {
        let base = DistinguishedName::parse(&config.base_dn)?;
        let people = base.child(RelativeDistinguishedName::new("ou", config.people_ou.as_str()));
        let groups = base.child(RelativeDistinguishedName::new("ou", config.group_ou.as_str()));
        Ok(Self {
            base,
            people,
            groups,
        })
    }

    /// Base DN of the whole tree.
    #[must_use]
    pub fn base(&self) -> &DistinguishedName {
        &self.base
    }

    /// Subtree holding user entries.
    #[must_use]
    pub fn people(&self) -> &DistinguishedName {
        &self.people
    }

    /// Subtree holding group entries.
    #[must_use]
    pub fn groups(&self) -> &DistinguishedName {
        &self.groups
    }

    /// `uid=<username>,ou=People,<base>`
    #[must_use]
    pub fn user_dn(&self, username: &str) -> DistinguishedName {
        self.people
            .child(RelativeDistinguishedName::new("uid", username))
    }

    /// `cn=<groupname>,ou=Group,<base>`
    #[must_use]
    pub fn group_dn(&self, groupname: &str) -> DistinguishedName {
        self.groups
            .child(RelativeDistinguishedName::new("cn", groupname))
    }
}

fn split_escaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push(ch);
            escape = false;
            continue;
        }

        if ch == '\\' {
            // Keep the escape so the value splitter and unescape see it.
            current.push(ch);
            escape = true;
            continue;
        }

        if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
            continue;
        }

        current.push(ch);
    }

    if escape {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }

    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn split_attribute_value(
    component: &str,
) -> std::result::Result<(String, String), DistinguishedNameError> {
    let mut escape = false;
    let mut index = None;

    for (i, ch) in component.char_indices() {
        if escape {
            escape = false;
            continue;
        }

        if ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '=' {
            index = Some(i);
            break;
        }
    }

    let idx =
        index.ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;
    let attribute = component[..idx].trim();
    let value_part = component[idx + 1..].trim_start();

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.to_string(),
        ));
    }

    if value_part.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok((attribute.to_string(), unescape(value_part)?))
}

fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let next = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            result.push(next);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn escape(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch == ' ' || ch == '#'))
            || (idx == last && ch == ' ');

        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}
