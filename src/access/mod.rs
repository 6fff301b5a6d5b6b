//! Whether a uid may read a problem directory.
//!
//! Root and world-readable directories are always accessible. Beyond
//! that the store supports two ownership policies, chosen at build time:
//! by owning uid, or by membership in the owning group.

use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;

use tracing::debug;

use crate::users;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipPolicy {
    /// A directory belongs to the uid owning the inode.
    OwnedByUser,
    /// A directory belongs to the members of its owning group.
    GroupMember,
}

impl OwnershipPolicy {
    /// Build-time default, selected by the `dir-owned-by-user` feature.
    pub const fn default_policy() -> Self {
        if cfg!(feature = "dir-owned-by-user") {
            OwnershipPolicy::OwnedByUser
        } else {
            OwnershipPolicy::GroupMember
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DirStat {
    accessible: bool,
    owned: bool,
}

fn uid_in_group(uid: u32, gid: u32) -> bool {
    let Some(pwd) = users::passwd_by_uid(uid) else {
        return false;
    };
    if pwd.gid == gid {
        return true;
    }
    let Some(members) = users::group_members(gid) else {
        return false;
    };
    let member = members.iter().any(|name| name == &pwd.name);
    debug!(user = %pwd.name, gid, member, "group membership check");
    member
}

fn stat_for_uid(dir_fd: BorrowedFd<'_>, uid: u32, policy: OwnershipPolicy) -> io::Result<DirStat> {
    let st = crate::io::fstat(&dir_fd)?;
    if (st.st_mode & libc::S_IFMT) != libc::S_IFDIR {
        return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
    }

    let world_readable = st.st_mode & libc::S_IROTH != 0;
    let owned = match policy {
        OwnershipPolicy::OwnedByUser => uid == st.st_uid,
        OwnershipPolicy::GroupMember => uid_in_group(uid, st.st_gid),
    };

    let mut stat = DirStat::default();
    if uid == 0 || world_readable {
        stat.accessible = true;
    }
    if uid == 0 || world_readable || owned {
        stat.accessible = true;
        stat.owned = true;
    }
    debug!(uid, accessible = stat.accessible, owned = stat.owned, "directory status for uid");
    Ok(stat)
}

/// Whether `uid` may read the problem directory behind `dir_fd`, under
/// the build-time default policy.
pub fn accessible_by_uid_at(dir_fd: BorrowedFd<'_>, uid: u32) -> bool {
    accessible_by_uid_at_with(dir_fd, uid, OwnershipPolicy::default_policy())
}

pub fn accessible_by_uid_at_with(
    dir_fd: BorrowedFd<'_>,
    uid: u32,
    policy: OwnershipPolicy,
) -> bool {
    match stat_for_uid(dir_fd, uid, policy) {
        Ok(stat) => stat.accessible,
        Err(err) => {
            debug!(uid, error = %err, "can't determine accessibility");
            false
        }
    }
}

/// Whether `uid` may read the problem directory at `dirname`, under the
/// build-time default policy.
pub fn accessible_by_uid(dirname: impl AsRef<Path>, uid: u32) -> bool {
    accessible_by_uid_with(dirname, uid, OwnershipPolicy::default_policy())
}

pub fn accessible_by_uid_with(
    dirname: impl AsRef<Path>,
    uid: u32,
    policy: OwnershipPolicy,
) -> bool {
    let dir_fd = match crate::io::open_dir(dirname.as_ref()) {
        Ok(fd) => fd,
        Err(err) => {
            debug!(dir = %dirname.as_ref().display(), error = %err, "can't open directory");
            return false;
        }
    };
    accessible_by_uid_at_with(dir_fd.as_fd(), uid, policy)
}
