//! Lookups of users and groups.

use crate::{
    entry::DirectoryEntry,
    filter,
    group::GROUP_LIST_ATTRIBUTES,
    session::DirectorySession,
    user::USER_LIST_ATTRIBUTES,
    Result,
};

const ALL_ATTRIBUTES: &[&str] = &[];

/// Read-only queries against a connected [`DirectorySession`].
///
/// Every lookup fails with [`userctl_core::Error::NotFound`] when nothing matches.
pub struct Query<'a> {
    session: &'a mut DirectorySession,
}

impl<'a> Query<'a> {
    /// Wraps a connected session.
    #[must_use]
    pub fn new(session: &'a mut DirectorySession) -> Self {
        Self { session }
    }

    /// All Samba accounts, with `uid` and `uidNumber` only.
    pub async fn list_users(&mut self) -> Result<Vec<DirectoryEntry>> {
        self.in_people(&filter::object_class("sambaSamAccount"), USER_LIST_ATTRIBUTES)
            .await
    }

    /// The user with login `name`, all attributes.
    pub async fn find_user_by_name(&mut self, name: &str) -> Result<Vec<DirectoryEntry>> {
        self.in_people(&filter::equals("uid", name), ALL_ATTRIBUTES)
            .await
    }

    /// The user with numeric uid `id`, all attributes.
    pub async fn find_user_by_id(&mut self, id: u32) -> Result<Vec<DirectoryEntry>> {
        self.in_people(&filter::equals("uidNumber", &id.to_string()), ALL_ATTRIBUTES)
            .await
    }

    /// All Samba group mappings, with `cn`, `gidNumber` and `memberUid` only.
    pub async fn list_groups(&mut self) -> Result<Vec<DirectoryEntry>> {
        self.in_groups(&filter::object_class("sambaGroupMapping"), GROUP_LIST_ATTRIBUTES)
            .await
    }

    /// The group named `name`, all attributes.
    pub async fn find_group_by_name(&mut self, name: &str) -> Result<Vec<DirectoryEntry>> {
        self.in_groups(&filter::equals("cn", name), ALL_ATTRIBUTES)
            .await
    }

    async fn in_people(
        &mut self,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<DirectoryEntry>> {
        let base = self.session.layout().people().to_string();
        self.session.search(filter, attributes, &base).await
    }

    async fn in_groups(
        &mut self,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<DirectoryEntry>> {
        let base = self.session.layout().groups().to_string();
        self.session.search(filter, attributes, &base).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{attr, MemoryDirectory, Request};
    use userctl_core::Error;

    fn directory() -> MemoryDirectory {
        let directory = MemoryDirectory::seeded();
        directory.insert(DirectoryEntry::new(
            "uid=bob,ou=People,dc=test,dc=com",
            [
                attr("objectClass", &["posixAccount", "sambaSamAccount"]),
                attr("uid", &["bob"]),
                attr("uidNumber", &["1002"]),
                attr("loginShell", &["/bin/bash"]),
            ],
        ));
        directory.insert(DirectoryEntry::new(
            "cn=ops,ou=Group,dc=test,dc=com",
            [
                attr("objectClass", &["posixGroup", "sambaGroupMapping"]),
                attr("cn", &["ops"]),
                attr("gidNumber", &["600"]),
                attr("memberUid", &["bob"]),
                attr("sambaGroupType", &["2"]),
            ],
        ));
        directory
    }

    #[tokio::test]
    async fn list_users_restricts_attributes() {
        let directory = directory();
        let mut session = directory.session().await;
        let users = Query::new(&mut session).list_users().await.unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].first("uid"), Some("bob"));
        assert_eq!(users[0].first("uidNumber"), Some("1002"));
        assert!(users[0].values("loginShell").is_none());
        assert!(directory.requests().contains(&Request::Search {
            base: "ou=People,dc=test,dc=com".to_string(),
            filter: "(objectClass=sambaSamAccount)".to_string(),
        }));
    }

    #[tokio::test]
    async fn find_user_by_id_returns_all_attributes() {
        let directory = directory();
        let mut session = directory.session().await;
        let users = Query::new(&mut session).find_user_by_id(1002).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].first("loginShell"), Some("/bin/bash"));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let directory = directory();
        let mut session = directory.session().await;
        let mut query = Query::new(&mut session);
        assert!(matches!(
            query.find_user_by_name("mallory").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            query.find_user_by_id(4242).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn group_lookups() {
        let directory = directory();
        let mut session = directory.session().await;
        let mut query = Query::new(&mut session);

        let groups = query.list_groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].has_value("memberUid", "bob"));
        assert!(groups[0].values("sambaGroupType").is_none());

        let group = query.find_group_by_name("ops").await.unwrap();
        assert_eq!(group[0].first("sambaGroupType"), Some("2"));

        assert!(matches!(
            query.find_group_by_name("nobody").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn wildcard_names_are_escaped() {
        let directory = directory();
        let mut session = directory.session().await;
        let result = Query::new(&mut session).find_user_by_name("*").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(directory.requests().contains(&Request::Search {
            base: "ou=People,dc=test,dc=com".to_string(),
            filter: "(&(uid=\\2a))".to_string(),
        }));
    }
}
