//! In-memory directory for tests.
//!
//! Compiled for this crate's own tests and, with the `testing` feature, for dependents that
//! need a [`DirectorySession`] without a server.
#![allow(clippy::missing_panics_doc)]

use crate::{
    entry::{Attribute, DirectoryEntry},
    session::{
        map_result_code, DirectoryModification, DirectorySession, LdapConnector, LdapSession,
        ModifyOperation,
    },
    Result,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use userctl_core::{BindCredentials, DirectoryConfig, Error};

/// `sambaSID` of the seeded Samba domain.
pub const DOMAIN_SID: &str = "S-1-5-21-1004336348-1177238915-682003330";

/// Configuration matching the seeded tree and the accepted administrator.
pub fn sample_config() -> DirectoryConfig {
    DirectoryConfig::new(
        "127.0.0.1:389",
        "dc=test,dc=com",
        BindCredentials::new("cn=manager,dc=test,dc=com", "123456"),
    )
    .unwrap()
}

/// Request recorded by the fake, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Request {
    Search { base: String, filter: String },
    Add { dn: String },
    Modify { dn: String, modifications: Vec<DirectoryModification> },
    Delete { dn: String },
    PasswordModify { dn: String, password: String },
    Unbind,
}

impl Request {
    /// Whether the request changes the tree.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Search { .. } | Self::Unbind)
    }
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, DirectoryEntry>,
    requests: Vec<Request>,
}

/// Shared handle to a fake directory tree.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    /// Directory with the base, the two organizational units and the Samba domain object.
    pub fn seeded() -> Self {
        let directory = Self::default();
        for dn in ["dc=test,dc=com", "ou=People,dc=test,dc=com", "ou=Group,dc=test,dc=com"] {
            directory.insert(DirectoryEntry::new(dn, Vec::new()));
        }
        directory.insert(DirectoryEntry::new(
            "sambaDomainName=SAMBA,dc=test,dc=com",
            [
                attr("objectClass", &["sambaDomain"]),
                attr("sambaDomainName", &["SAMBA"]),
                attr("sambaSID", &[DOMAIN_SID]),
            ],
        ));
        directory
    }

    /// Stores `entry`, replacing any entry with the same DN.
    pub fn insert(&self, entry: DirectoryEntry) {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(entry.dn.to_ascii_lowercase(), entry);
    }

    /// Current state of the entry at `dn`.
    pub fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        let state = self.state.lock().unwrap();
        state.entries.get(&dn.to_ascii_lowercase()).cloned()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests that changed, or tried to change, the tree.
    pub fn mutations(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(Request::is_mutation)
            .collect()
    }

    /// Connected session with [`sample_config`].
    pub async fn session(&self) -> DirectorySession {
        self.session_with(sample_config()).await
    }

    /// Connected session with `config`.
    pub async fn session_with(&self, config: DirectoryConfig) -> DirectorySession {
        let mut session = self.unconnected_session(config);
        session.connect().await.unwrap();
        session
    }

    /// Session backed by this directory that has not been connected yet.
    pub fn unconnected_session(&self, config: DirectoryConfig) -> DirectorySession {
        DirectorySession::with_connector(config, Box::new(self.clone())).unwrap()
    }

    fn record(&self, request: Request) {
        self.state.lock().unwrap().requests.push(request);
    }
}

/// Attribute pair from string slices.
pub fn attr(name: &str, values: &[&str]) -> Attribute {
    (
        name.to_string(),
        values.iter().map(ToString::to_string).collect(),
    )
}

#[async_trait]
impl LdapConnector for MemoryDirectory {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl LdapSession for MemoryDirectory {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        if dn == "cn=manager,dc=test,dc=com" && password == "123456" {
            Ok(())
        } else {
            Err(map_result_code(49, "", dn))
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<DirectoryEntry>> {
        self.record(Request::Search {
            base: base_dn.to_string(),
            filter: filter.to_string(),
        });
        let assertions = parse_filter(filter)
            .ok_or_else(|| Error::directory(format!("unsupported filter {filter}")))?;
        let base = base_dn.to_ascii_lowercase();

        let state = self.state.lock().unwrap();
        if !state.entries.contains_key(&base) {
            return Err(map_result_code(32, "", base_dn));
        }

        let matches = state
            .entries
            .iter()
            .filter(|(dn, _)| **dn == base || dn.ends_with(&format!(",{base}")))
            .map(|(_, entry)| entry)
            .filter(|entry| {
                assertions.iter().all(|(attribute, value)| {
                    entry.values(attribute).is_some_and(|values| {
                        values.iter().any(|v| v.eq_ignore_ascii_case(value))
                    })
                })
            })
            .map(|entry| select(entry, attributes))
            .collect();
        Ok(matches)
    }

    async fn add(&mut self, dn: &str, attributes: &[Attribute]) -> Result<()> {
        self.record(Request::Add { dn: dn.to_string() });
        let mut state = self.state.lock().unwrap();
        let key = dn.to_ascii_lowercase();
        if state.entries.contains_key(&key) {
            return Err(map_result_code(68, "", dn));
        }
        state
            .entries
            .insert(key, DirectoryEntry::new(dn, attributes.iter().cloned()));
        Ok(())
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        self.record(Request::Modify {
            dn: dn.to_string(),
            modifications: modifications.to_vec(),
        });
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .get_mut(&dn.to_ascii_lowercase())
            .ok_or_else(|| map_result_code(32, "", dn))?;

        let mut updated = entry.attributes.clone();
        for modification in modifications {
            apply_modification(&mut updated, modification)
                .map_err(|(code, text)| map_result_code(code, text, dn))?;
        }
        entry.attributes = updated;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        self.record(Request::Delete { dn: dn.to_string() });
        let mut state = self.state.lock().unwrap();
        state
            .entries
            .remove(&dn.to_ascii_lowercase())
            .map(|_| ())
            .ok_or_else(|| map_result_code(32, "", dn))
    }

    async fn password_modify(&mut self, dn: &str, new_password: &str) -> Result<()> {
        self.record(Request::PasswordModify {
            dn: dn.to_string(),
            password: new_password.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .get_mut(&dn.to_ascii_lowercase())
            .ok_or_else(|| map_result_code(32, "", dn))?;
        entry
            .attributes
            .insert("userPassword".to_string(), vec![new_password.to_string()]);
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.record(Request::Unbind);
        Ok(())
    }
}

fn apply_modification(
    attributes: &mut BTreeMap<String, Vec<String>>,
    modification: &DirectoryModification,
) -> std::result::Result<(), (u32, &'static str)> {
    let current = attributes.entry(modification.attribute.clone()).or_default();
    let outcome = match modification.operation {
        ModifyOperation::Add if modification.values.iter().any(|v| current.contains(v)) => {
            Err((20, "value already exists"))
        }
        ModifyOperation::Add => {
            current.extend(modification.values.iter().cloned());
            Ok(())
        }
        ModifyOperation::Delete if modification.values.is_empty() => {
            current.clear();
            Ok(())
        }
        ModifyOperation::Delete if !modification.values.iter().all(|v| current.contains(v)) => {
            Err((16, "no such value"))
        }
        ModifyOperation::Delete => {
            current.retain(|v| !modification.values.contains(v));
            Ok(())
        }
        ModifyOperation::Replace => {
            current.clone_from(&modification.values);
            Ok(())
        }
    };

    if current.is_empty() {
        attributes.remove(&modification.attribute);
    }
    outcome
}

fn select(entry: &DirectoryEntry, attributes: &[&str]) -> DirectoryEntry {
    if attributes.is_empty() || attributes.contains(&"*") {
        return entry.clone();
    }
    DirectoryEntry::new(
        entry.dn.clone(),
        entry
            .attributes
            .iter()
            .filter(|(name, _)| attributes.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(name, values)| (name.clone(), values.clone())),
    )
}

/// Understands `(a=b)` and `(&(a=b)(c=d)...)` with no escapes beyond `\xx`.
fn parse_filter(filter: &str) -> Option<Vec<(String, String)>> {
    let inner = filter.strip_prefix('(')?.strip_suffix(')')?;
    let body = match inner.strip_prefix('&') {
        Some(conjunction) => conjunction,
        None => return parse_assertion(inner).map(|pair| vec![pair]),
    };

    body.strip_prefix('(')?
        .strip_suffix(')')?
        .split(")(")
        .map(parse_assertion)
        .collect()
}

fn parse_assertion(assertion: &str) -> Option<(String, String)> {
    let (attribute, value) = assertion.split_once('=')?;
    Some((attribute.to_string(), unescape_filter_value(value)?))
}

fn unescape_filter_value(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut rest = value.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'\\' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}
