//! File ownership: who an instance belongs to, and handing files to them.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::unistd::{chown, Gid, Group, Uid, User};
use serde::Serialize;

use crate::command::Credentials;
use crate::error::{HostError, Result};

/// Placeholder for an id with no passwd/group entry.
pub const UNKNOWN_NAME: &str = "?";

/// The user and group owning a path, with resolved names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Owner {
    /// Numeric user id.
    pub uid: u32,
    /// Numeric group id.
    pub gid: u32,
    /// User name, or `?` if the uid has no passwd entry.
    pub username: String,
    /// Group name, or `?` if the gid has no group entry.
    pub groupname: String,
}

impl Owner {
    /// Build an owner from numeric ids, resolving names where possible.
    #[must_use]
    pub fn from_ids(uid: u32, gid: u32) -> Self {
        let username = User::from_uid(Uid::from_raw(uid))
            .ok()
            .flatten()
            .map_or_else(|| UNKNOWN_NAME.to_string(), |u| u.name);
        let groupname = Group::from_gid(Gid::from_raw(gid))
            .ok()
            .flatten()
            .map_or_else(|| UNKNOWN_NAME.to_string(), |g| g.name);
        Self {
            uid,
            gid,
            username,
            groupname,
        }
    }

    /// The owner of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be stat'ed.
    pub async fn of(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self::from_ids(metadata.uid(), metadata.gid()))
    }

    /// The effective user and group of this process.
    #[must_use]
    pub fn current() -> Self {
        Self::from_ids(Uid::effective().as_raw(), Gid::effective().as_raw())
    }

    /// Resolve `user` or `user:group`. Without a group, the user's primary
    /// group is used.
    ///
    /// # Errors
    ///
    /// Returns `UnknownUser`/`UnknownGroup` if a name does not resolve.
    pub fn lookup(spec: &str) -> Result<Self> {
        let (user_name, group_name) = match spec.split_once(':') {
            Some((user, group)) => (user, Some(group)),
            None => (spec, None),
        };

        let user = User::from_name(user_name)
            .ok()
            .flatten()
            .ok_or_else(|| HostError::UnknownUser(user_name.to_string()))?;

        let group = match group_name {
            Some(name) => Group::from_name(name)
                .ok()
                .flatten()
                .ok_or_else(|| HostError::UnknownGroup(name.to_string()))?,
            None => Group::from_gid(user.gid)
                .ok()
                .flatten()
                .ok_or_else(|| HostError::UnknownGroup(user.gid.to_string()))?,
        };

        Ok(Self {
            uid: user.uid.as_raw(),
            gid: group.gid.as_raw(),
            username: user.name,
            groupname: group.name,
        })
    }

    /// The ids a child process should run as.
    #[must_use]
    pub const fn credentials(&self) -> Credentials {
        Credentials {
            uid: self.uid,
            gid: self.gid,
        }
    }

    /// `user:group` as accepted by `chown(1)` and `rsync --chown`.
    #[must_use]
    pub fn chown_spec(&self) -> String {
        format!("{}:{}", self.username, self.groupname)
    }

    /// Give `path` to this owner.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Chown` if the kernel refuses.
    pub fn assign(&self, path: &Path) -> Result<()> {
        chown(
            path,
            Some(Uid::from_raw(self.uid)),
            Some(Gid::from_raw(self.gid)),
        )
        .map_err(|source| HostError::Chown {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn owner_of_fresh_file_is_current_user() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.properties");
        std::fs::write(&path, "").unwrap();

        let owner = Owner::of(&path).await.unwrap();
        let me = Owner::current();
        assert_eq!(owner.uid, me.uid);
        assert_eq!(owner.credentials().uid, me.uid);
    }

    #[test]
    fn assign_to_self_succeeds() {
        let dir = TempDir::new().unwrap();
        Owner::current().assign(dir.path()).unwrap();
    }

    #[test]
    fn unresolvable_ids_use_placeholder() {
        let owner = Owner::from_ids(4_000_000_000, 4_000_000_000);
        assert_eq!(owner.username, UNKNOWN_NAME);
        assert_eq!(owner.groupname, UNKNOWN_NAME);
        assert_eq!(owner.chown_spec(), "?:?");
    }

    #[test]
    fn lookup_unknown_user() {
        assert!(matches!(
            Owner::lookup("blockhost-no-such-user"),
            Err(HostError::UnknownUser(_))
        ));
    }

    #[test]
    fn lookup_root() {
        let owner = Owner::lookup("root").unwrap();
        assert_eq!(owner.uid, 0);
        assert_eq!(owner.username, "root");
    }
}
