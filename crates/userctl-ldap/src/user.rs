//! Samba user accounts.

use secrecy::{ExposeSecret, SecretString};
use userctl_core::Error;

use crate::{entry::Attribute, Result};

/// Object classes of a Samba-enabled POSIX account.
pub const USER_OBJECT_CLASSES: &[&str] = &[
    "top",
    "person",
    "organizationalPerson",
    "inetOrgPerson",
    "sambaSamAccount",
    "posixAccount",
    "shadowAccount",
];

/// Attributes returned when listing users.
pub const USER_LIST_ATTRIBUTES: &[&str] = &["uid", "uidNumber"];

/// Login shell given to new accounts.
pub const DEFAULT_LOGIN_SHELL: &str = "/bin/bash";
/// Primary group placeholder given to new accounts.
pub const PLACEHOLDER_GID_NUMBER: &str = "0";
/// `sambaAcctFlags` of a normal user account.
pub const NORMAL_ACCOUNT_FLAGS: &str = "[U ]";

/// A user account to be provisioned.
#[derive(Debug)]
pub struct UserSpec {
    username: String,
    uid_number: u32,
    password: SecretString,
}

impl UserSpec {
    /// Creates a user spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty username.
    pub fn new(username: impl Into<String>, uid_number: u32, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(Error::InvalidArgument("username cannot be empty".to_string()));
        }
        Ok(Self {
            username,
            uid_number,
            password: SecretString::from(password.into()),
        })
    }

    /// Login name, also used as the RDN value.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Numeric POSIX uid.
    #[must_use]
    pub const fn uid_number(&self) -> u32 {
        self.uid_number
    }

    /// Plaintext password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Full attribute set of the new entry.
    ///
    /// `nt_hash` is the NT hash of the password and `pwd_last_set` the current unix time.
    #[must_use]
    pub fn attributes(&self, security_id: &str, nt_hash: &str, pwd_last_set: i64) -> Vec<Attribute> {
        let name = self.username.as_str();
        vec![
            values("objectClass", USER_OBJECT_CLASSES),
            single("uid", name),
            single("cn", name),
            single("givenName", name),
            single("sn", name),
            single("displayName", name),
            single("homeDirectory", &format!("/home/{name}")),
            single("loginShell", DEFAULT_LOGIN_SHELL),
            single("uidNumber", &self.uid_number.to_string()),
            single("gidNumber", PLACEHOLDER_GID_NUMBER),
            single("shadowMin", "0"),
            single("sambaSID", security_id),
            single("sambaAcctFlags", NORMAL_ACCOUNT_FLAGS),
            single("userPassword", self.password()),
            single("sambaNTPassword", nt_hash),
            single("sambaPwdLastSet", &pwd_last_set.to_string()),
        ]
    }
}

pub(crate) fn single(name: &str, value: &str) -> Attribute {
    (name.to_string(), vec![value.to_string()])
}

pub(crate) fn values(name: &str, values: &[&str]) -> Attribute {
    (
        name.to_string(),
        values.iter().map(ToString::to_string).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DirectoryEntry;

    #[test]
    fn rejects_blank_username() {
        assert!(matches!(
            UserSpec::new("  ", 1001, "s3cret"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn password_is_not_debug_printed() {
        let spec = UserSpec::new("alice", 1001, "s3cret").unwrap();
        assert!(!format!("{spec:?}").contains("s3cret"));
        assert_eq!(spec.password(), "s3cret");
    }

    #[test]
    fn attributes_apply_schema_defaults() {
        let spec = UserSpec::new("alice", 1001, "s3cret").unwrap();
        let entry = DirectoryEntry::new(
            "uid=alice,ou=People,dc=test,dc=com",
            spec.attributes("S-1-5-21-7-3002", "abcdef", 1_700_000_000),
        );

        for name in ["uid", "cn", "givenName", "sn", "displayName"] {
            assert_eq!(entry.first(name), Some("alice"), "{name}");
        }
        assert_eq!(entry.first("homeDirectory"), Some("/home/alice"));
        assert_eq!(entry.first("loginShell"), Some("/bin/bash"));
        assert_eq!(entry.first("uidNumber"), Some("1001"));
        assert_eq!(entry.first("gidNumber"), Some("0"));
        assert_eq!(entry.first("sambaSID"), Some("S-1-5-21-7-3002"));
        assert_eq!(entry.first("sambaAcctFlags"), Some("[U ]"));
        assert_eq!(entry.first("userPassword"), Some("s3cret"));
        assert_eq!(entry.first("sambaNTPassword"), Some("abcdef"));
        assert_eq!(entry.first("sambaPwdLastSet"), Some("1700000000"));
        assert_eq!(entry.values("objectClass").unwrap().len(), 7);
        assert!(entry.has_value("objectClass", "sambaSamAccount"));
        assert!(entry.has_value("objectClass", "posixAccount"));
    }
}
