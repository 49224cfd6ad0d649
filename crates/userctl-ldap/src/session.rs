//! Directory session: one bound connection and the raw LDAP primitives.

use crate::{
    dn::DirectoryLayout,
    entry::{Attribute, DirectoryEntry},
    Result,
};
use async_trait::async_trait;
use ldap3::{
    exop::PasswordModify, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry,
};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};
use userctl_core::{DirectoryConfig, Error};

/// Attribute list that asks the server for no attributes at all.
const NO_ATTRIBUTES: &[&str] = &["1.1"];

const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ALREADY_EXISTS: u32 = 68;

/// Kind of single-attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    /// Add values to the attribute.
    Add,
    /// Delete values (all values when none are given).
    Delete,
    /// Replace every value of the attribute.
    Replace,
}

impl FromStr for ModifyOperation {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "delete" | "del" => Ok(Self::Delete),
            "replace" => Ok(Self::Replace),
            _ => Err(Error::InvalidArgument(format!(
                "unknown modify operation `{tag}`"
            ))),
        }
    }
}

impl fmt::Display for ModifyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Replace => "replace",
        })
    }
}

/// LDAP modification request against one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryModification {
    /// What to do with the values.
    pub operation: ModifyOperation,
    /// Attribute to modify.
    pub attribute: String,
    /// Values the operation applies to.
    pub values: Vec<String>,
}

/// Outcome of an existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// At least one entry matched.
    Found,
    /// The search succeeded and matched nothing.
    NotFound,
    /// The search itself failed.
    ProbeFailed,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<DirectoryEntry>>;
    async fn add(&mut self, dn: &str, attributes: &[Attribute]) -> Result<()>;
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    async fn delete(&mut self, dn: &str) -> Result<()>;
    async fn password_modify(&mut self, dn: &str, new_password: &str) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// A single administrator session against the directory.
///
/// Not meant for concurrent reuse: open it with [`DirectorySession::connect`], run one
/// logical operation, then [`DirectorySession::close`] it.
pub struct DirectorySession {
    config: Arc<DirectoryConfig>,
    layout: DirectoryLayout,
    connector: Box<dyn LdapConnector>,
    inner: Option<Box<dyn LdapSession>>,
}

impl DirectorySession {
    /// Creates an unconnected session backed by `ldap3`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the configured base DN does not parse.
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self::from_parts(config, connector)
    }

    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn with_connector(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Result<Self> {
        Self::from_parts(Arc::new(config), connector)
    }

    fn from_parts(config: Arc<DirectoryConfig>, connector: Box<dyn LdapConnector>) -> Result<Self> {
        let layout = DirectoryLayout::from_config(&config)?;
        Ok(Self {
            config,
            layout,
            connector,
            inner: None,
        })
    }

    /// The configuration this session was built from.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Tree layout derived from the base DN.
    #[must_use]
    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    /// Whether [`DirectorySession::connect`] succeeded and the session is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_some()
    }

    /// Opens the transport and binds as the configured administrator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the transport cannot be established and
    /// [`Error::Auth`] if the bind is rejected.
    pub async fn connect(&mut self) -> Result<()> {
        self.close().await;

        let mut session = self.connector.connect().await?;
        let credentials = &self.config.credentials;
        if let Err(err) = session
            .simple_bind(credentials.bind_dn(), credentials.bind_password())
            .await
        {
            if let Err(unbind_err) = session.unbind().await {
                debug!("releasing transport after failed bind: {unbind_err}");
            }
            return Err(err);
        }

        debug!(bind_dn = credentials.bind_dn(), "bound to directory");
        self.inner = Some(session);
        Ok(())
    }

    /// Releases the transport. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.inner.take() {
            if let Err(err) = session.unbind().await {
                warn!("failed to unbind directory session: {err}");
            }
        }
    }

    /// Subtree search rooted at `base`. An empty `attributes` slice requests all attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches.
    pub async fn search(
        &mut self,
        filter: &str,
        attributes: &[&'static str],
        base: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        debug!(base, filter, "searching directory");
        let entries = self.session()?.search(base, filter, attributes).await?;
        if entries.is_empty() {
            return Err(Error::NotFound(format!("no entry matches {filter} under {base}")));
        }
        Ok(entries)
    }

    /// Adds a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] or [`Error::Directory`] when the server rejects it.
    pub async fn add(&mut self, dn: &str, attributes: &[Attribute]) -> Result<()> {
        debug!(dn, attributes = attributes.len(), "adding entry");
        self.session()?.add(dn, attributes).await
    }

    /// Applies one modification to one attribute of `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] (or [`Error::NotFound`] for a missing entry) when the
    /// server rejects the change.
    pub async fn modify(
        &mut self,
        dn: &str,
        operation: ModifyOperation,
        attribute: &str,
        values: &[String],
    ) -> Result<()> {
        let modification = DirectoryModification {
            operation,
            attribute: attribute.to_string(),
            values: values.to_vec(),
        };
        self.apply(dn, &[modification]).await
    }

    /// Applies several modifications to `dn` in one request; the server applies all or none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] (or [`Error::NotFound`] for a missing entry) when the
    /// server rejects the change.
    pub async fn apply(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        debug!(dn, changes = modifications.len(), "modifying entry");
        self.session()?.modify(dn, modifications).await
    }

    /// Like [`DirectorySession::modify`], with the operation given by its textual tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a tag other than `add`, `delete` or `replace`.
    pub async fn modify_tagged(
        &mut self,
        dn: &str,
        tag: &str,
        attribute: &str,
        values: &[String],
    ) -> Result<()> {
        let operation = tag.parse::<ModifyOperation>()?;
        self.modify(dn, operation, attribute, values).await
    }

    /// Deletes the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist, [`Error::Directory`] otherwise.
    pub async fn delete(&mut self, dn: &str) -> Result<()> {
        debug!(dn, "deleting entry");
        self.session()?.delete(dn).await
    }

    /// Sets a new password through the password-modify extended operation.
    ///
    /// # Errors
    ///
    /// Returns the mapped server error when the operation is rejected.
    pub async fn password_modify(&mut self, dn: &str, new_password: &str) -> Result<()> {
        debug!(dn, "password modify extended operation");
        self.session()?.password_modify(dn, new_password).await
    }

    /// Three-state existence probe from the base DN.
    pub async fn probe(&mut self, filter: &str) -> Presence {
        let base = self.layout.base().to_string();
        let outcome = match self.session() {
            Ok(session) => session.search(&base, filter, NO_ATTRIBUTES).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(entries) if entries.is_empty() => Presence::NotFound,
            Ok(_) => Presence::Found,
            Err(Error::NotFound(_)) => Presence::NotFound,
            Err(err) => {
                warn!(filter, "existence probe failed: {err}");
                Presence::ProbeFailed
            }
        }
    }

    /// Whether anything under the base DN matches `filter`.
    ///
    /// A failed probe reads as absent.
    pub async fn exists(&mut self, filter: &str) -> bool {
        self.probe(filter).await == Presence::Found
    }

    fn session(&mut self) -> Result<&mut (dyn LdapSession + 'static)> {
        self.inner
            .as_deref_mut()
            .ok_or_else(|| Error::Connection("directory session is not connected".to_string()))
    }
}

/// Real LDAP connector backed by `ldap3`.
struct RealLdapConnector {
    config: Arc<DirectoryConfig>,
}

impl RealLdapConnector {
    fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        let url = self.config.url();
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|err| Error::Connection(format!("{url}: {err}")))?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let fut = self.inner.simple_bind(dn, password);
        let result = timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| Error::Timeout("directory bind timed out".to_string()))?
            .map_err(|err| Error::Connection(err.to_string()))?;
        if result.rc != 0 {
            return Err(Error::Auth(format!(
                "bind as {dn} rejected (code {}): {}",
                result.rc, result.text
            )));
        }
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<DirectoryEntry>> {
        let fut = self.inner.search(base_dn, Scope::Subtree, filter, attributes.to_vec());
        let result = with_timeout(self.operation_timeout, "search", fut).await?;
        let (entries, _) = result
            .success()
            .map_err(|err| map_ldap_error(err, "search"))?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(directory_entry)
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: &[Attribute]) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| (name.clone(), values.iter().cloned().collect::<HashSet<_>>()))
            .collect::<Vec<_>>();
        let fut = self.inner.add(dn, attrs);
        let result = with_timeout(self.operation_timeout, "add", fut).await?;
        result.success().map_err(|err| map_ldap_error(err, dn))?;
        Ok(())
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let changes = modifications
            .iter()
            .map(|modification| {
                let attribute = modification.attribute.clone();
                let values = modification.values.iter().cloned().collect::<HashSet<_>>();
                match modification.operation {
                    ModifyOperation::Add => Mod::Add(attribute, values),
                    ModifyOperation::Delete => Mod::Delete(attribute, values),
                    ModifyOperation::Replace => Mod::Replace(attribute, values),
                }
            })
            .collect::<Vec<_>>();

        let fut = self.inner.modify(dn, changes);
        let result = with_timeout(self.operation_timeout, "modify", fut).await?;
        result.success().map_err(|err| map_ldap_error(err, dn))?;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let fut = self.inner.delete(dn);
        let result = with_timeout(self.operation_timeout, "delete", fut).await?;
        result.success().map_err(|err| map_ldap_error(err, dn))?;
        Ok(())
    }

    async fn password_modify(&mut self, dn: &str, new_password: &str) -> Result<()> {
        let exop = PasswordModify {
            user_id: Some(dn),
            old_pass: None,
            new_pass: Some(new_password),
        };
        let fut = self.inner.extended(exop);
        let result = with_timeout(self.operation_timeout, "password modify", fut).await?;
        result.success().map_err(|err| map_ldap_error(err, dn))?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        let fut = self.inner.unbind();
        with_timeout(self.operation_timeout, "unbind", fut).await
    }
}

async fn with_timeout<F, T>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<T, LdapError>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(format!("directory {operation} timed out")))?
        .map_err(|err| map_ldap_error(err, operation))
}

/// Converts a search result; binary values (`jpegPhoto`, ...) are kept as lowercase hex.
fn directory_entry(entry: SearchEntry) -> DirectoryEntry {
    let binary = entry.bin_attrs.into_iter().map(|(name, values)| {
        let encoded = values.iter().map(hex::encode).collect::<Vec<_>>();
        (name, encoded)
    });
    DirectoryEntry::new(entry.dn, entry.attrs.into_iter().chain(binary))
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.uses_starttls());

    if !config.tls_verify {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|err| Error::Config(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert.as_ref() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::Config(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::Config(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::Config(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: LdapError, context: &str) -> Error {
    match err {
        LdapError::LdapResult { result } => map_result_code(result.rc, &result.text, context),
        other => Error::directory(format!("{context}: {other}")),
    }
}

/// Maps an LDAP result code onto the error taxonomy.
pub(crate) fn map_result_code(rc: u32, text: &str, context: &str) -> Error {
    match rc {
        RC_NO_SUCH_OBJECT => Error::NotFound(format!("{context}: no such object")),
        RC_INVALID_CREDENTIALS => Error::Auth(format!("{context}: invalid credentials")),
        RC_ALREADY_EXISTS => Error::AlreadyExists(format!("{context}: entry already exists")),
        code => Error::Directory {
            code,
            message: if text.is_empty() {
                context.to_string()
            } else {
                format!("{context}: {text}")
            },
        },
    }
}
