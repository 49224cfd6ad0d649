//! Samba group mappings.

use userctl_core::Error;

use crate::{
    entry::Attribute,
    user::{single, values},
    Result,
};

/// Object classes of a POSIX group mapped into Samba.
pub const GROUP_OBJECT_CLASSES: &[&str] = &["top", "posixGroup", "sambaGroupMapping"];

/// Attributes returned when listing groups.
pub const GROUP_LIST_ATTRIBUTES: &[&str] = &["cn", "gidNumber", "memberUid"];

/// Attribute holding the login names of group members.
pub const MEMBER_ATTRIBUTE: &str = "memberUid";

/// `sambaGroupType` of a domain group.
pub const DOMAIN_GROUP_TYPE: &str = "2";

/// A group to be provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    name: String,
    gid_number: u32,
}

impl GroupSpec {
    /// Creates a group spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty group name.
    pub fn new(name: impl Into<String>, gid_number: u32) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("group name cannot be empty".to_string()));
        }
        Ok(Self { name, gid_number })
    }

    /// Group name (`cn`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric POSIX gid.
    #[must_use]
    pub const fn gid_number(&self) -> u32 {
        self.gid_number
    }

    /// Full attribute set of the new entry.
    #[must_use]
    pub fn attributes(&self, security_id: &str) -> Vec<Attribute> {
        vec![
            values("objectClass", GROUP_OBJECT_CLASSES),
            single("cn", &self.name),
            single("gidNumber", &self.gid_number.to_string()),
            single("sambaSID", security_id),
            single("sambaGroupType", DOMAIN_GROUP_TYPE),
        ]
    }
}
