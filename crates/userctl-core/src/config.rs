//! Connection configuration for the directory server.
//!
//! A [`DirectoryConfig`] is constructed once per invocation and handed by reference to every
//! directory operation. Nothing here is persisted.

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;
use validator::Validate;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Default `sambaDomainName` of the domain object holding the base SID.
pub const DEFAULT_SAMBA_DOMAIN: &str = "SAMBA";
/// Default organizational unit for user entries.
pub const DEFAULT_PEOPLE_OU: &str = "People";
/// Default organizational unit for group entries.
pub const DEFAULT_GROUP_OU: &str = "Group";

/// Transport used to reach the directory server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Plain LDAP.
    #[default]
    Plain,
    /// Implicit TLS (`ldaps://`).
    Tls,
    /// Plain LDAP upgraded with StartTLS before binding.
    StartTls,
}

impl TransportSecurity {
    /// Resolves the transport from the two independent switches accepted on the command line.
    ///
    /// Implicit TLS takes precedence; StartTLS only applies to a plain connection.
    #[must_use]
    pub const fn from_flags(tls: bool, start_tls: bool) -> Self {
        match (tls, start_tls) {
            (true, _) => Self::Tls,
            (false, true) => Self::StartTls,
            (false, false) => Self::Plain,
        }
    }

    /// URL scheme for this transport.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Tls => "ldaps",
            Self::Plain | Self::StartTls => "ldap",
        }
    }
}

/// Administrator identity used for the simple bind.
#[derive(Debug)]
pub struct BindCredentials {
    bind_dn: String,
    bind_password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    ///
    /// # Arguments
    ///
    /// * `bind_dn` - The DN of the administrator account
    /// * `bind_password` - The administrator password
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, bind_password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(bind_password.into()),
        }
    }

    /// Get the bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }
}

/// Configuration for one directory session.
#[derive(Debug, Validate)]
pub struct DirectoryConfig {
    /// Server address, either `host:port` or a full `ldap://`/`ldaps://` URL
    #[validate(length(min = 1))]
    pub address: String,

    /// Base distinguished name of the directory tree
    #[validate(length(min = 1))]
    pub base_dn: String,

    /// Administrator bind identity
    pub credentials: BindCredentials,

    /// Transport selection
    pub transport: TransportSecurity,

    /// Whether TLS certificates are verified
    pub tls_verify: bool,

    /// Optional path to a PEM CA certificate
    pub tls_ca_cert: Option<PathBuf>,

    /// `sambaDomainName` of the domain object
    #[validate(length(min = 1))]
    pub samba_domain: String,

    /// Organizational unit holding user entries
    #[validate(length(min = 1))]
    pub people_ou: String,

    /// Organizational unit holding group entries
    #[validate(length(min = 1))]
    pub group_ou: String,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    pub connection_timeout_secs: u64,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    pub operation_timeout_secs: u64,

    /// Whether account creation also issues the password-modify extended operation
    pub sync_password_on_create: bool,
}

impl DirectoryConfig {
    /// Create a configuration with defaults for everything but the connection target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address cannot form a valid LDAP URL or a field fails
    /// validation.
    pub fn new(
        address: impl Into<String>,
        base_dn: impl Into<String>,
        credentials: BindCredentials,
    ) -> Result<Self> {
        Self {
            address: address.into(),
            base_dn: base_dn.into(),
            credentials,
            transport: TransportSecurity::default(),
            tls_verify: true,
            tls_ca_cert: None,
            samba_domain: DEFAULT_SAMBA_DOMAIN.to_string(),
            people_ou: DEFAULT_PEOPLE_OU.to_string(),
            group_ou: DEFAULT_GROUP_OU.to_string(),
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            sync_password_on_create: true,
        }
        .validated()
    }

    /// Re-run validation after builder overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when any field is out of range or the URL is malformed.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        self.parse_url()?;
        Ok(self)
    }

    /// Select the transport.
    #[must_use]
    pub const fn with_transport(mut self, transport: TransportSecurity) -> Self {
        self.transport = transport;
        self
    }

    /// Enable or disable TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set custom CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Override the Samba domain name.
    #[must_use]
    pub fn with_samba_domain(mut self, domain: impl Into<String>) -> Self {
        self.samba_domain = domain.into();
        self
    }

    /// Override the user and group organizational units.
    #[must_use]
    pub fn with_units(mut self, people_ou: impl Into<String>, group_ou: impl Into<String>) -> Self {
        self.people_ou = people_ou.into();
        self.group_ou = group_ou.into();
        self
    }

    /// Set both timeouts in seconds.
    #[must_use]
    pub const fn with_timeouts(mut self, connection_secs: u64, operation_secs: u64) -> Self {
        self.connection_timeout_secs = connection_secs;
        self.operation_timeout_secs = operation_secs;
        self
    }

    /// Toggle the password-modify extended operation after account creation.
    #[must_use]
    pub const fn with_sync_password_on_create(mut self, enabled: bool) -> Self {
        self.sync_password_on_create = enabled;
        self
    }

    /// Connection timeout as a Duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Operation timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// LDAP URL derived from the address and transport.
    ///
    /// An address that already carries a scheme is used verbatim; [`DirectoryConfig::validated`]
    /// rejects a scheme that contradicts the transport.
    #[must_use]
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("{}://{}", self.transport.scheme(), self.address)
        }
    }

    /// Parse and check the LDAP URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL cannot be parsed or does not use an LDAP scheme.
    pub fn parse_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url())?;
        match (url.scheme(), self.transport) {
            ("ldap", TransportSecurity::Plain | TransportSecurity::StartTls)
            | ("ldaps", TransportSecurity::Plain | TransportSecurity::Tls) => {
                debug!(url = %url, "directory endpoint resolved");
                Ok(url)
            }
            ("ldap" | "ldaps", transport) => Err(Error::Config(format!(
                "URL scheme `{}` contradicts the {transport:?} transport",
                url.scheme()
            ))),
            (other, _) => Err(Error::Config(format!(
                "unsupported directory URL scheme `{other}`"
            ))),
        }
    }

    /// Whether the session must upgrade the plain connection with StartTLS.
    #[must_use]
    pub const fn uses_starttls(&self) -> bool {
        matches!(self.transport, TransportSecurity::StartTls)
    }
}
