//! Account provisioning: creating, deleting and editing users and groups.

use chrono::Utc;
use tracing::{error, info, instrument};
use userctl_core::Error;

use crate::{
    filter,
    group::{GroupSpec, MEMBER_ATTRIBUTE},
    identity::{domain_security_id, nt_password_hash, security_id_for},
    session::{DirectoryModification, DirectorySession, ModifyOperation},
    user::UserSpec,
    Result,
};

/// Mutating operations against a connected [`DirectorySession`].
pub struct Provisioner<'a> {
    session: &'a mut DirectorySession,
}

impl<'a> Provisioner<'a> {
    /// Wraps a connected session.
    #[must_use]
    pub fn new(session: &'a mut DirectorySession) -> Self {
        Self { session }
    }

    /// Creates a Samba user account.
    ///
    /// When `sync_password_on_create` is enabled the password is additionally set through the
    /// password-modify extended operation, so servers that hash `userPassword` themselves end up
    /// with their own scheme. A failure there leaves the entry created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the username is taken (nothing is written),
    /// [`Error::NotFound`] if the Samba domain object is missing, or the server's rejection.
    #[instrument(skip(self, spec), fields(username = spec.username(), uid = spec.uid_number()))]
    pub async fn create_user(&mut self, spec: &UserSpec) -> Result<()> {
        let username = spec.username();
        if self.session.exists(&filter::equals("uid", username)).await {
            return Err(Error::AlreadyExists(format!(
                "user `{username}` already exists"
            )));
        }

        let domain_sid = domain_security_id(self.session).await?;
        let security_id = security_id_for(&domain_sid, spec.uid_number());
        let attributes = spec.attributes(
            &security_id,
            &nt_password_hash(spec.password()),
            Utc::now().timestamp(),
        );

        let dn = self.session.layout().user_dn(username).to_string();
        self.session.add(&dn, &attributes).await?;
        info!(dn, security_id, "user created");

        if self.session.config().sync_password_on_create {
            if let Err(err) = self.session.password_modify(&dn, spec.password()).await {
                error!(dn, "user created but password could not be set: {err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Sets a new password on both the directory password and the NT hash.
    ///
    /// The NT hash and `sambaPwdLastSet` are replaced together in a single modify request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordSync`] if the password-modify operation fails; the NT hash is
    /// then left untouched.
    #[instrument(skip(self, new_password))]
    pub async fn change_password(&mut self, username: &str, new_password: &str) -> Result<()> {
        let dn = self.session.layout().user_dn(username).to_string();
        self.session
            .password_modify(&dn, new_password)
            .await
            .map_err(|err| Error::PasswordSync(format!("{dn}: {err}")))?;

        let changes = [
            DirectoryModification {
                operation: ModifyOperation::Replace,
                attribute: "sambaNTPassword".to_string(),
                values: vec![nt_password_hash(new_password)],
            },
            DirectoryModification {
                operation: ModifyOperation::Replace,
                attribute: "sambaPwdLastSet".to_string(),
                values: vec![Utc::now().timestamp().to_string()],
            },
        ];
        self.session.apply(&dn, &changes).await?;
        info!(dn, "password changed");
        Ok(())
    }

    /// Deletes a user entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such user.
    #[instrument(skip(self))]
    pub async fn delete_user(&mut self, username: &str) -> Result<()> {
        let dn = self.session.layout().user_dn(username).to_string();
        self.session.delete(&dn).await?;
        info!(dn, "user deleted");
        Ok(())
    }

    /// Creates a Samba group mapping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the group name is taken, [`Error::NotFound`] if the
    /// Samba domain object is missing, or the server's rejection.
    #[instrument(skip(self, spec), fields(group = spec.name(), gid = spec.gid_number()))]
    pub async fn create_group(&mut self, spec: &GroupSpec) -> Result<()> {
        let dn = self.session.layout().group_dn(spec.name()).to_string();
        if self.group_exists(spec.name()).await {
            return Err(Error::AlreadyExists(format!(
                "group `{}` already exists",
                spec.name()
            )));
        }

        let domain_sid = domain_security_id(self.session).await?;
        let security_id = security_id_for(&domain_sid, spec.gid_number());
        self.session.add(&dn, &spec.attributes(&security_id)).await?;
        info!(dn, security_id, "group created");
        Ok(())
    }

    /// Deletes a group entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such group.
    #[instrument(skip(self))]
    pub async fn delete_group(&mut self, groupname: &str) -> Result<()> {
        let dn = self.session.layout().group_dn(groupname).to_string();
        self.session.delete(&dn).await?;
        info!(dn, "group deleted");
        Ok(())
    }

    /// Adds an existing user to a group's `memberUid` list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the user does not exist; no modify is issued then.
    #[instrument(skip(self))]
    pub async fn add_group_member(&mut self, groupname: &str, username: &str) -> Result<()> {
        if !self.session.exists(&filter::equals("uid", username)).await {
            return Err(Error::Validation(format!(
                "user `{username}` does not exist"
            )));
        }

        let dn = self.session.layout().group_dn(groupname).to_string();
        self.session
            .modify(
                &dn,
                ModifyOperation::Add,
                MEMBER_ATTRIBUTE,
                &[username.to_string()],
            )
            .await?;
        info!(dn, username, "member added");
        Ok(())
    }

    /// Removes a user from a group's `memberUid` list. The user need not exist.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection, e.g. when the user is not a member.
    #[instrument(skip(self))]
    pub async fn remove_group_member(&mut self, groupname: &str, username: &str) -> Result<()> {
        let dn = self.session.layout().group_dn(groupname).to_string();
        self.session
            .modify(
                &dn,
                ModifyOperation::Delete,
                MEMBER_ATTRIBUTE,
                &[username.to_string()],
            )
            .await?;
        info!(dn, username, "member removed");
        Ok(())
    }

    // Probed in the group subtree only: user entries carry a `cn` too.
    async fn group_exists(&mut self, groupname: &str) -> bool {
        let base = self.session.layout().groups().to_string();
        self.session
            .search(&filter::equals("cn", groupname), &["1.1"], &base)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockLdapConnector, MockLdapSession};
    use crate::testing::{attr, sample_config, MemoryDirectory, Request, DOMAIN_SID};
    use crate::{DirectoryEntry, Query};

    const ALICE_DN: &str = "uid=alice,ou=People,dc=test,dc=com";
    const ENGINEERS_DN: &str = "cn=engineers,ou=Group,dc=test,dc=com";

    fn alice() -> UserSpec {
        UserSpec::new("alice", 1001, "s3cret").unwrap()
    }

    fn engineers() -> GroupSpec {
        GroupSpec::new("engineers", 500).unwrap()
    }

    fn mocked_session(session: MockLdapSession) -> DirectorySession {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .return_once(move || Ok(Box::new(session)));
        DirectorySession::with_connector(sample_config(), Box::new(connector)).unwrap()
    }

    #[tokio::test]
    async fn create_user_then_find_by_name() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory.session().await;

        Provisioner::new(&mut session)
            .create_user(&alice())
            .await
            .unwrap();
        let found = Query::new(&mut session)
            .find_user_by_name("alice")
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dn, ALICE_DN);
        assert_eq!(found[0].first("uid"), Some("alice"));
        assert_eq!(found[0].first("uidNumber"), Some("1001"));
        assert_eq!(
            found[0].first("sambaSID"),
            Some(format!("{DOMAIN_SID}-3002").as_str())
        );
        assert_eq!(
            found[0].first("sambaNTPassword"),
            Some(nt_password_hash("s3cret").as_str())
        );
        assert!(directory.requests().contains(&Request::PasswordModify {
            dn: ALICE_DN.to_string(),
            password: "s3cret".to_string(),
        }));
    }

    #[tokio::test]
    async fn create_user_without_password_sync() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory
            .session_with(sample_config().with_sync_password_on_create(false))
            .await;

        Provisioner::new(&mut session)
            .create_user(&alice())
            .await
            .unwrap();
        assert_eq!(
            directory.mutations(),
            vec![Request::Add {
                dn: ALICE_DN.to_string()
            }]
        );
    }

    #[tokio::test]
    async fn duplicate_user_is_rejected_without_mutation() {
        let directory = MemoryDirectory::seeded();
        directory.insert(DirectoryEntry::new(ALICE_DN, [attr("uid", &["alice"])]));
        let mut session = directory.session().await;

        let err = Provisioner::new(&mut session)
            .create_user(&alice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(directory.mutations().is_empty());
    }

    #[tokio::test]
    async fn missing_domain_blocks_user_creation() {
        let directory = MemoryDirectory::default();
        directory.insert(DirectoryEntry::new("dc=test,dc=com", Vec::new()));
        directory.insert(DirectoryEntry::new("ou=People,dc=test,dc=com", Vec::new()));
        let mut session = directory.session().await;

        let err = Provisioner::new(&mut session)
            .create_user(&alice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(directory.mutations().is_empty());
    }

    #[tokio::test]
    async fn failed_password_sync_after_create_is_reported() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        session
            .expect_search()
            .returning(|base, filter, _| {
                if filter.starts_with("(sambaDomainName=") {
                    Ok(vec![DirectoryEntry::new(
                        format!("sambaDomainName=SAMBA,{base}"),
                        [attr("sambaSID", &[DOMAIN_SID])],
                    )])
                } else {
                    Ok(Vec::new())
                }
            });
        session.expect_add().times(1).returning(|_, _| Ok(()));
        session
            .expect_password_modify()
            .times(1)
            .returning(|_, _| Err(Error::directory("unwilling to perform")));

        let mut directory = mocked_session(session);
        directory.connect().await.unwrap();
        let err = Provisioner::new(&mut directory)
            .create_user(&alice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Directory { .. }));
    }

    #[tokio::test]
    async fn delete_user_then_lookup_is_not_found() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory.session().await;
        Provisioner::new(&mut session)
            .create_user(&alice())
            .await
            .unwrap();

        Provisioner::new(&mut session)
            .delete_user("alice")
            .await
            .unwrap();
        let result = Query::new(&mut session).find_user_by_name("alice").await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let again = Provisioner::new(&mut session).delete_user("alice").await;
        assert!(matches!(again, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn change_password_updates_both_forms() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory.session().await;
        Provisioner::new(&mut session)
            .create_user(&alice())
            .await
            .unwrap();

        Provisioner::new(&mut session)
            .change_password("alice", "n3w-pass")
            .await
            .unwrap();
        let entry = directory.entry(ALICE_DN).unwrap();
        assert_eq!(entry.first("userPassword"), Some("n3w-pass"));
        assert_eq!(
            entry.first("sambaNTPassword"),
            Some(nt_password_hash("n3w-pass").as_str())
        );
    }

    #[tokio::test]
    async fn change_password_replaces_hash_and_timestamp_together() {
        let directory = MemoryDirectory::seeded();
        directory.insert(DirectoryEntry::new(
            ALICE_DN,
            [
                attr("uid", &["alice"]),
                attr("sambaNTPassword", &["stale"]),
                attr("sambaPwdLastSet", &["0"]),
            ],
        ));
        let mut session = directory.session().await;

        Provisioner::new(&mut session)
            .change_password("alice", "n3w-pass")
            .await
            .unwrap();

        let modifies: Vec<Vec<DirectoryModification>> = directory
            .requests()
            .into_iter()
            .filter_map(|request| match request {
                Request::Modify { modifications, .. } => Some(modifications),
                _ => None,
            })
            .collect();
        assert_eq!(modifies.len(), 1);
        let attributes: Vec<&str> = modifies[0]
            .iter()
            .map(|change| change.attribute.as_str())
            .collect();
        assert_eq!(attributes, ["sambaNTPassword", "sambaPwdLastSet"]);
        assert!(modifies[0]
            .iter()
            .all(|change| change.operation == ModifyOperation::Replace));
        assert_ne!(
            directory.entry(ALICE_DN).unwrap().first("sambaPwdLastSet"),
            Some("0")
        );
    }

    #[tokio::test]
    async fn failed_password_modify_leaves_nt_hash_alone() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        session
            .expect_password_modify()
            .times(1)
            .returning(|dn, _| Err(crate::session::map_result_code(32, "", dn)));
        session.expect_modify().never();

        let mut directory = mocked_session(session);
        directory.connect().await.unwrap();
        let err = Provisioner::new(&mut directory)
            .change_password("ghost", "n3w-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PasswordSync(_)));
    }

    #[tokio::test]
    async fn create_group_then_list() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory.session().await;

        Provisioner::new(&mut session)
            .create_group(&engineers())
            .await
            .unwrap();
        let groups = Query::new(&mut session).list_groups().await.unwrap();

        let group = groups
            .iter()
            .find(|entry| entry.first("cn") == Some("engineers"))
            .expect("engineers listed");
        assert_eq!(group.first("gidNumber"), Some("500"));
        assert_eq!(
            directory.entry(ENGINEERS_DN).unwrap().first("sambaSID"),
            Some(format!("{DOMAIN_SID}-2000").as_str())
        );
    }

    #[tokio::test]
    async fn duplicate_group_is_rejected() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory.session().await;
        Provisioner::new(&mut session)
            .create_group(&engineers())
            .await
            .unwrap();

        let err = Provisioner::new(&mut session)
            .create_group(&engineers())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(directory.mutations().len(), 1);
    }

    #[tokio::test]
    async fn group_may_share_a_users_name() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory.session().await;
        Provisioner::new(&mut session)
            .create_user(&alice())
            .await
            .unwrap();
        Provisioner::new(&mut session)
            .create_group(&GroupSpec::new("alice", 1001).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_member_is_rejected_without_modify() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory.session().await;
        Provisioner::new(&mut session)
            .create_group(&engineers())
            .await
            .unwrap();

        let err = Provisioner::new(&mut session)
            .add_group_member("engineers", "mallory")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!directory
            .requests()
            .iter()
            .any(|request| matches!(request, Request::Modify { .. })));
    }

    #[tokio::test]
    async fn membership_round_trip() {
        let directory = MemoryDirectory::seeded();
        let mut session = directory.session().await;
        let mut provisioner = Provisioner::new(&mut session);
        provisioner.create_group(&engineers()).await.unwrap();
        provisioner.create_user(&alice()).await.unwrap();

        provisioner
            .add_group_member("engineers", "alice")
            .await
            .unwrap();
        let group = Query::new(&mut session)
            .find_group_by_name("engineers")
            .await
            .unwrap();
        assert!(group[0].has_value("memberUid", "alice"));

        Provisioner::new(&mut session)
            .remove_group_member("engineers", "alice")
            .await
            .unwrap();
        let group = Query::new(&mut session)
            .find_group_by_name("engineers")
            .await
            .unwrap();
        assert!(!group[0].has_value("memberUid", "alice"));
    }

    #[tokio::test]
    async fn removing_a_member_needs_no_user_entry() {
        let directory = MemoryDirectory::seeded();
        directory.insert(DirectoryEntry::new(
            ENGINEERS_DN,
            [
                attr("cn", &["engineers"]),
                attr("memberUid", &["departed"]),
            ],
        ));
        let mut session = directory.session().await;

        Provisioner::new(&mut session)
            .remove_group_member("engineers", "departed")
            .await
            .unwrap();
        assert!(directory
            .entry(ENGINEERS_DN)
            .unwrap()
            .values("memberUid")
            .is_none());

        let err = Provisioner::new(&mut session)
            .remove_group_member("engineers", "departed")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Directory { code: 16, .. }));
    }
}
