//! Samba security identifiers and NT password hashes.

use md4::{Digest, Md4};
use tracing::debug;
use userctl_core::Error;

use crate::{filter, session::DirectorySession, Result};

/// Attribute holding a security identifier.
pub const SAMBA_SID_ATTRIBUTE: &str = "sambaSID";
/// Attribute naming the Samba domain object.
pub const SAMBA_DOMAIN_NAME_ATTRIBUTE: &str = "sambaDomainName";
/// Offset applied to every derived relative identifier.
pub const RID_BASE: u64 = 1000;

/// Looks up the base SID of the configured Samba domain.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the domain object is missing or carries no `sambaSID`.
pub async fn domain_security_id(session: &mut DirectorySession) -> Result<String> {
    let domain = session.config().samba_domain.clone();
    let base = session.layout().base().to_string();
    let filter = format!(
        "({SAMBA_DOMAIN_NAME_ATTRIBUTE}={})",
        filter::escape_filter_value(&domain)
    );

    let entries = session
        .search(&filter, &[SAMBA_SID_ATTRIBUTE], &base)
        .await?;
    let sid = entries
        .iter()
        .find_map(|entry| entry.first(SAMBA_SID_ATTRIBUTE))
        .ok_or_else(|| {
            Error::NotFound(format!("Samba domain `{domain}` has no {SAMBA_SID_ATTRIBUTE}"))
        })?;

    debug!(domain, sid, "resolved domain security identifier");
    Ok(sid.to_string())
}

/// Derives the SID of a user or group: `<domain>-<id * 2 + 1000>`.
///
/// The mapping is injective over `u32`; keeping user and group id ranges apart is up to
/// whoever allocates them.
#[must_use]
pub fn security_id_for(domain_id: &str, numeric_id: u32) -> String {
    format!("{domain_id}-{}", u64::from(numeric_id) * 2 + RID_BASE)
}

/// NT password hash: MD4 over the UTF-16LE encoding of the password, lowercase hex.
#[must_use]
pub fn nt_password_hash(plaintext: &str) -> String {
    let encoded: Vec<u8> = plaintext
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    hex::encode(Md4::digest(&encoded))
}
