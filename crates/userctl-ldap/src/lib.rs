//! LDAP access for Samba user and group administration.
//!
//! [`DirectorySession`] owns the connection. [`Query`] reads users and groups, [`Provisioner`]
//! creates, deletes and edits them, keeping the POSIX and Samba attributes of each entry in step.

#![deny(missing_docs)]

mod dn;
mod entry;
pub mod filter;
mod group;
mod identity;
mod provision;
mod query;
mod session;
mod user;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dn::{
    DirectoryLayout, DistinguishedName, DistinguishedNameError, RelativeDistinguishedName,
};
pub use entry::{render_report, Attribute, DirectoryEntry};
pub use group::{GroupSpec, GROUP_LIST_ATTRIBUTES, GROUP_OBJECT_CLASSES};
pub use identity::{domain_security_id, nt_password_hash, security_id_for};
pub use provision::Provisioner;
pub use query::Query;
pub use session::{DirectoryModification, DirectorySession, ModifyOperation, Presence};
pub use user::{UserSpec, USER_LIST_ATTRIBUTES, USER_OBJECT_CLASSES};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = userctl_core::Result<T>;
