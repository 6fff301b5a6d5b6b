//! The problem-directory handle and its lifecycle flows.

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{error, warn};

use crate::users;
use crate::{Error, Result};

mod lock;
pub mod reported;

use lock::{LockError, LockRole};

pub const ITEM_TIME: &str = "time";
pub const ITEM_LAST_OCCURRENCE: &str = "last_occurrence";
pub const ITEM_UID: &str = "uid";
pub const ITEM_KERNEL: &str = "kernel";
pub const ITEM_ARCHITECTURE: &str = "architecture";
pub const ITEM_HOSTNAME: &str = "hostname";
pub const ITEM_OS_RELEASE: &str = "os_release";
pub const ITEM_OS_RELEASE_IN_ROOTDIR: &str = "os_release_in_rootdir";
pub const ITEM_REPORTED_TO: &str = "reported_to";

/// Account that receives ownership of freshly created directories, so a
/// crashing user cannot later rewrite security-sensitive items.
pub const SERVICE_ACCOUNT: &str = "probdir";

/// Sleep between `rmdir` attempts while a fresh creator briefly holds a
/// lock on the emptied directory, and how many attempts to make.
const RMDIR_FAIL: Duration = Duration::from_millis(10);
const RMDIR_FAIL_COUNT: u32 = 50;

/// True for names that may be used as item names: non-empty, no `/`, no
/// control bytes, and not `.` or `..`.
pub fn is_correct_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.bytes().any(|b| b == b'/' || b < 0x20 || b == 0x7f)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Accept an unlocked read-only handle when the directory cannot be
    /// locked for writing but is readable.
    pub readonly: bool,
    /// Suppress the diagnostic when the directory does not exist.
    pub quiet_missing: bool,
    /// Suppress the diagnostic when access is denied.
    pub quiet_denied: bool,
    /// Give up immediately when the validity check fails instead of
    /// backing off and retrying.
    pub dont_wait_for_lock: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadFlags {
    /// Suppress the diagnostic when the item cannot be opened.
    pub quiet_missing: bool,
    /// Return `None` instead of an empty string when loading fails.
    pub null_on_failure: bool,
    /// Dereference symlinks. Honoured only for external paths, never
    /// for items inside a problem directory.
    pub follow_links: bool,
}

#[derive(Debug, Clone, Copy)]
struct Owner {
    uid: u32,
    gid: u32,
}

/// Handle to one problem directory.
///
/// Obtained from [`DumpDir::open`] or [`DumpDir::create`]. Reads are
/// always allowed; mutating operations require the advisory lock, which
/// both flows acquire and [`Drop`] releases. A read-only handle (see
/// [`OpenFlags::readonly`]) holds no lock and refuses mutation.
#[derive(Debug)]
pub struct DumpDir {
    dirname: PathBuf,
    dir: OwnedFd,
    locked: bool,
    /// Mode for newly saved items: directory mode at open, executable
    /// bits stripped.
    mode: u32,
    /// Ownership applied to new and sanitised items; `None` disables
    /// sanitisation (unprivileged opener, or creation without a uid).
    owner: Option<Owner>,
    /// Cached value of the `time` item, when it has been parsed.
    time: Option<i64>,
}

fn strip_trailing_slashes(dir: &Path) -> PathBuf {
    let bytes = dir.as_os_str().as_bytes();
    let mut len = bytes.len();
    while len > 0 && bytes[len - 1] == b'/' {
        len -= 1;
    }
    PathBuf::from(OsStr::from_bytes(&bytes[..len]))
}

fn last_component(bytes: &[u8]) -> &[u8] {
    match bytes.iter().rposition(|&b| b == b'/') {
        Some(pos) => &bytes[pos + 1..],
        None => bytes,
    }
}

/// Open a directory fd the way the open flow does, for callers that
/// want to hold the fd before constructing a handle with
/// [`DumpDir::from_fd`].
pub fn open_fd(dir: impl AsRef<Path>) -> Result<OwnedFd> {
    Ok(crate::io::open_dir(dir.as_ref())?)
}

fn access_failure(dirname: &Path, err: io::Error, flags: OpenFlags) -> anyhow::Error {
    match err.raw_os_error() {
        Some(libc::ENOENT) | Some(libc::ENOTDIR) => {
            if !flags.quiet_missing {
                error!(dir = %dirname.display(), "problem directory does not exist");
            }
            Error::MissingPath(dirname.display().to_string()).into()
        }
        Some(libc::EACCES) => {
            if !flags.quiet_denied {
                error!(dir = %dirname.display(), error = %err, "can't access problem directory");
            }
            Error::PermissionDenied(dirname.display().to_string()).into()
        }
        _ => {
            if !flags.quiet_denied {
                error!(dir = %dirname.display(), error = %err, "can't access problem directory");
            }
            Error::Io(err).into()
        }
    }
}

impl DumpDir {
    /// Open an existing problem directory.
    pub fn open(dir: impl AsRef<Path>, flags: OpenFlags) -> Result<Self> {
        let dirname = strip_trailing_slashes(dir.as_ref());
        let dir_fd = crate::io::open_dir(&dirname);
        Self::do_open(dir_fd, dirname, flags)
    }

    /// Open a problem directory from an already-open directory fd.
    /// `dir` is used for diagnostics and for the final `rmdir` of
    /// [`DumpDir::delete`].
    pub fn from_fd(dir_fd: OwnedFd, dir: impl AsRef<Path>, flags: OpenFlags) -> Result<Self> {
        let dirname = strip_trailing_slashes(dir.as_ref());
        Self::do_open(Ok(dir_fd), dirname, flags)
    }

    fn do_open(dir_fd: io::Result<OwnedFd>, dirname: PathBuf, flags: OpenFlags) -> Result<Self> {
        let dir = match dir_fd {
            Ok(fd) => fd,
            Err(err) => return Err(access_failure(&dirname, err, flags)),
        };
        let st = match crate::io::fstat(&dir) {
            Ok(st) => st,
            Err(err) => return Err(access_failure(&dirname, err, flags)),
        };

        let mut dd = DumpDir {
            dirname,
            dir,
            locked: false,
            // Executable bits make no sense on items.
            mode: (st.st_mode & 0o666) as u32,
            owner: None,
            time: None,
        };

        match lock::lock(
            dd.dir.as_fd(),
            &dd.dirname,
            LockRole::Opener,
            flags.dont_wait_for_lock,
        ) {
            Ok(time) => {
                dd.locked = true;
                dd.time = time;
            }
            Err(LockError::Denied(err)) => {
                if flags.readonly && crate::io::dir_is_readable(dd.dir.as_fd()) {
                    // Not writable but readable: hand out an unlocked
                    // read-only handle if it is a valid dump dir.
                    return match crate::io::read_time_at(dd.dir.as_fd(), ITEM_TIME) {
                        Ok(time) => {
                            dd.time = Some(time);
                            Ok(dd)
                        }
                        Err(_) => {
                            Err(Error::NotProblemDir(dd.dirname.display().to_string()).into())
                        }
                    };
                }
                return Err(access_failure(&dd.dirname, err, flags));
            }
            Err(LockError::Missing(err)) => {
                return Err(access_failure(&dd.dirname, err, flags));
            }
            Err(LockError::NotProblemDir) => {
                // Catches e.g. a tool defaulting its target to "." and
                // happily consuming the current directory.
                error!(dir = %dd.dirname.display(), "not a problem directory");
                return Err(Error::NotProblemDir(dd.dirname.display().to_string()).into());
            }
            Err(LockError::Io(err)) => return Err(Error::Io(err).into()),
        }

        if unsafe { libc::geteuid() } == 0 {
            // A privileged caller creating more items needs the uid:gid
            // to sanitise them to.
            let st = match crate::io::fstat(&dd.dir) {
                Ok(st) => st,
                Err(err) => {
                    error!(dir = %dd.dirname.display(), error = %err, "can't stat problem directory");
                    return Err(Error::Io(err).into());
                }
            };
            dd.owner = Some(Owner {
                uid: st.st_uid,
                gid: st.st_gid,
            });
        }

        Ok(dd)
    }

    /// Create a fresh problem directory owned by the calling user, with
    /// missing parents created on demand, and reset its ownership for
    /// the store.
    pub fn create(dir: impl AsRef<Path>, uid: Option<u32>, mode: u32) -> Result<Self> {
        let dd = Self::create_skeleton(dir, uid, mode, true)?;
        // Diagnostics already emitted; creation itself succeeded.
        let _ = dd.reset_ownership();
        Ok(dd)
    }

    /// Create a fresh empty problem directory and lock it. `uid` is the
    /// crashed application's user id; `None` leaves sanitisation
    /// disabled. `mode` is the item file mode; the directory gets the
    /// read bits copied into the exec bits so traversal matches read
    /// intent.
    pub fn create_skeleton(
        dir: impl AsRef<Path>,
        uid: Option<u32>,
        mode: u32,
        create_parents: bool,
    ) -> Result<Self> {
        let dir_mode = mode | ((mode & 0o444) >> 2);
        let dirname = strip_trailing_slashes(dir.as_ref());

        let last = last_component(dirname.as_os_str().as_bytes());
        if last == b"." || last == b".." {
            // create("."), create("dir/..") and similar are madness.
            error!(dir = %dirname.display(), "bad dir name");
            return Err(Error::BadDirName(dirname.display().to_string()).into());
        }

        let mut builder = fs::DirBuilder::new();
        builder.mode(dir_mode);
        if create_parents {
            builder.recursive(true);
        }
        if let Err(err) = builder.create(&dirname) {
            error!(dir = %dirname.display(), error = %err, "can't create directory");
            return Err(Error::Io(err).into());
        }

        let dir_fd = match crate::io::open_dir(&dirname) {
            Ok(fd) => fd,
            Err(err) => {
                error!(dir = %dirname.display(), error = %err, "can't open newly created directory");
                return Err(Error::Io(err).into());
            }
        };

        let mut dd = DumpDir {
            dirname,
            dir: dir_fd,
            locked: false,
            mode,
            owner: None,
            time: None,
        };

        match lock::lock(dd.dir.as_fd(), &dd.dirname, LockRole::Creator, false) {
            Ok(_) => dd.locked = true,
            Err(LockError::Missing(_)) => {
                return Err(Error::MissingPath(dd.dirname.display().to_string()).into());
            }
            Err(LockError::Denied(_)) => {
                return Err(Error::PermissionDenied(dd.dirname.display().to_string()).into());
            }
            Err(LockError::NotProblemDir) => unreachable!("creator runs no validity check"),
            Err(LockError::Io(err)) => return Err(Error::Io(err).into()),
        }

        // mkdir's mode above is filtered by umask; fix it.
        if let Err(err) = crate::io::fchmod(&dd.dir, dir_mode) {
            error!(dir = %dd.dirname.display(), error = %err, "can't change directory mode");
            return Err(Error::Io(err).into());
        }

        if let Some(uid) = uid {
            let service_uid = match users::passwd_by_name(SERVICE_ACCOUNT) {
                Some(pw) => pw.uid,
                None => {
                    error!(
                        account = SERVICE_ACCOUNT,
                        "service account does not exist, using uid 0"
                    );
                    0
                }
            };
            let crashed_gid = match users::passwd_by_uid(uid) {
                Some(pw) => pw.gid,
                None => {
                    error!(uid, "user does not exist, using gid 0");
                    0
                }
            };
            dd.owner = Some(Owner {
                uid: service_uid,
                gid: crashed_gid,
            });
        }

        Ok(dd)
    }

    /// Apply the ownership computed by [`DumpDir::create_skeleton`] to
    /// the directory itself. No-op when sanitisation is disabled.
    pub fn reset_ownership(&self) -> Result<()> {
        let Some(owner) = self.owner else {
            return Ok(());
        };
        if let Err(err) = crate::io::fchown(&self.dir, owner.uid, owner.gid) {
            warn!(
                dir = %self.dirname.display(),
                uid = owner.uid,
                gid = owner.gid,
                error = %err,
                "can't change directory ownership"
            );
            return Err(Error::Io(err).into());
        }
        Ok(())
    }

    /// Populate the items any valid problem directory carries: `time`
    /// and `last_occurrence` (when absent), `uid` (when given),
    /// `kernel`/`architecture`/`hostname` from `uname(2)`, and the OS
    /// release string, optionally also from inside `chroot`.
    pub fn create_basic_files(&mut self, uid: Option<u32>, chroot: Option<&Path>) -> Result<()> {
        let probe = LoadFlags {
            quiet_missing: true,
            null_on_failure: true,
            follow_links: false,
        };

        if self.load_text_ext(ITEM_TIME, probe)?.is_none() {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
                .to_string();
            // First and, so far, last occurrence.
            self.save_text(ITEM_TIME, &now)?;
            self.save_text(ITEM_LAST_OCCURRENCE, &now)?;
        }

        if let Some(uid) = uid {
            self.save_text(ITEM_UID, &uid.to_string())?;
        }

        let uts = users::uname();
        self.save_text(ITEM_KERNEL, &uts.release)?;
        self.save_text(ITEM_ARCHITECTURE, &uts.machine)?;
        self.save_text(ITEM_HOSTNAME, &uts.nodename)?;

        if self.load_text_ext(ITEM_OS_RELEASE, probe)?.is_none() {
            let release = load_text_file(
                Path::new("/etc/system-release"),
                LoadFlags {
                    null_on_failure: true,
                    follow_links: true,
                    quiet_missing: false,
                },
            )
            .unwrap_or_else(|| {
                load_text_file(
                    Path::new("/etc/redhat-release"),
                    LoadFlags {
                        follow_links: true,
                        ..Default::default()
                    },
                )
                .unwrap_or_default()
            });
            self.save_text(ITEM_OS_RELEASE, &release)?;

            if let Some(chroot) = chroot {
                let release = load_text_file(
                    &chroot.join("etc/system-release"),
                    LoadFlags {
                        follow_links: true,
                        ..Default::default()
                    },
                )
                .unwrap_or_default();
                if !release.is_empty() {
                    self.save_text(ITEM_OS_RELEASE_IN_ROOTDIR, &release)?;
                }
            }
        }

        Ok(())
    }

    pub fn dirname(&self) -> &Path {
        &self.dirname
    }

    /// Parsed value of the `time` item, cached at open.
    pub fn time(&self) -> Option<i64> {
        self.time
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Mode applied to newly saved items.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn as_dir_fd(&self) -> BorrowedFd<'_> {
        self.dir.as_fd()
    }

    fn require_locked(&self) -> Result<()> {
        if self.locked {
            Ok(())
        } else {
            error!(dir = %self.dirname.display(), "problem directory is not locked");
            Err(Error::NotLocked(self.dirname.display().to_string()).into())
        }
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if is_correct_filename(name) {
            Ok(())
        } else {
            error!(name, "not a valid item name");
            Err(Error::BadItemName(name.to_string()).into())
        }
    }

    /// Whether an item (regular file or subdirectory) of that name
    /// exists.
    pub fn exist(&self, name: &str) -> Result<bool> {
        self.check_name(name)?;
        Ok(match crate::io::stat_at(self.dir.as_fd(), name) {
            Ok(st) => {
                let fmt = st.st_mode & libc::S_IFMT;
                fmt == libc::S_IFREG || fmt == libc::S_IFDIR
            }
            Err(_) => false,
        })
    }

    /// Load a text item, normalised per [`crate::dump`] rules. Returns
    /// an empty string when the item cannot be opened.
    pub fn load_text(&self, name: &str) -> Result<String> {
        Ok(self
            .load_text_ext(name, LoadFlags::default())?
            .unwrap_or_default())
    }

    /// Load a text item with explicit failure behaviour. `None` is
    /// returned only under [`LoadFlags::null_on_failure`].
    pub fn load_text_ext(&self, name: &str, flags: LoadFlags) -> Result<Option<String>> {
        if !is_correct_filename(name) {
            error!(name, "cannot load text, not a valid item name");
            if flags.null_on_failure {
                return Ok(None);
            }
            return Err(Error::BadItemName(name.to_string()).into());
        }

        // Compat with old dumps.
        let name = if name == "release" { ITEM_OS_RELEASE } else { name };

        Ok(load_text_from(
            crate::io::open_item_at(self.dir.as_fd(), name),
            name,
            flags,
        ))
    }

    /// Save a text item. Requires the lock.
    pub fn save_text(&self, name: &str, text: &str) -> Result<()> {
        self.require_locked()?;
        self.check_name(name)?;
        self.save_item(name, text.as_bytes())
    }

    /// Save a binary item. Requires the lock.
    pub fn save_binary(&self, name: &str, data: &[u8]) -> Result<()> {
        self.require_locked()?;
        self.check_name(name)?;
        self.save_item(name, data)
    }

    fn save_item(&self, name: &str, data: &[u8]) -> Result<()> {
        // Drop any previous item of that name; O_EXCL below then
        // guarantees we create the inode we write to.
        let _ = crate::io::unlink_at(self.dir.as_fd(), name, false);

        let mut file = match crate::io::create_item_at(self.dir.as_fd(), name, self.mode) {
            Ok(file) => file,
            Err(err) => {
                warn!(item = name, error = %err, "can't open item for writing");
                return Err(Error::Io(err).into());
            }
        };

        if let Some(owner) = self.owner {
            if let Err(err) = crate::io::fchown(&file, owner.uid, owner.gid) {
                warn!(
                    item = name,
                    uid = owner.uid,
                    gid = owner.gid,
                    error = %err,
                    "can't change item ownership"
                );
                return Err(Error::Io(err).into());
            }
        }

        // O_CREAT applied (mode & ~umask); fix the mode up.
        if let Err(err) = crate::io::fchmod(&file, self.mode) {
            warn!(item = name, error = %err, "can't change item mode");
            return Err(Error::Io(err).into());
        }

        if let Err(err) = file.write_all(data) {
            warn!(item = name, error = %err, "can't save item");
            return Err(Error::Io(err).into());
        }
        Ok(())
    }

    /// Delete an item. Missing items are not an error. Requires the
    /// lock.
    pub fn delete_item(&self, name: &str) -> Result<()> {
        self.require_locked()?;
        self.check_name(name)?;
        match crate::io::unlink_at(self.dir.as_fd(), name, false) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!(item = name, error = %err, "can't delete item");
                Err(Error::Io(err).into())
            }
        }
    }

    /// Iterate the names of the regular-file items. The iterator reads
    /// from a duplicated descriptor, so the handle stays fully usable
    /// while it lives.
    pub fn items(&self) -> Result<Items<'_>> {
        Ok(Items {
            dir: self.dir.as_fd(),
            stream: crate::io::DirStream::from_dup(self.dir.as_fd())?,
        })
    }

    /// Reset mode and ownership of every regular item to the handle's
    /// cached values. No-op unless a privileged open enabled
    /// sanitisation; requires the lock.
    ///
    /// Unprivileged writers get correct modes from their umask and own
    /// their files anyway. Root operating on another user's directory
    /// does not: `hostname > file` there creates a file owned by root,
    /// which this routine repairs.
    pub fn sanitize_mode_and_owner(&self) -> Result<()> {
        let Some(owner) = self.owner else {
            return Ok(());
        };
        self.require_locked()?;

        for name in self.items()? {
            // Read access is the least the current process needs; items
            // failing the hardlink check are skipped, not chowned.
            let file = match crate::io::secure_open_at(self.dir.as_fd(), &name) {
                Ok(file) => file,
                Err(_) => continue,
            };
            if let Err(err) = crate::io::fchmod(&file, self.mode) {
                warn!(item = %name, mode = self.mode, error = %err, "can't change item mode");
            }
            if let Err(err) = crate::io::fchown(&file, owner.uid, owner.gid) {
                warn!(
                    item = %name,
                    uid = owner.uid,
                    gid = owner.gid,
                    error = %err,
                    "can't change item ownership"
                );
            }
        }
        Ok(())
    }

    /// Remove the directory's contents and the directory itself,
    /// consuming the handle. Requires the lock.
    pub fn delete(mut self) -> Result<()> {
        if !self.locked {
            error!(dir = %self.dirname.display(), "unlocked problem directory cannot be deleted");
            return Err(Error::NotLocked(self.dirname.display().to_string()).into());
        }

        if delete_contents(self.dir.as_fd(), true).is_err() {
            error!(dir = %self.dirname.display(), "can't remove contents of directory");
            return Err(Error::RemoveContents(self.dirname.display().to_string()).into());
        }
        // The content walk already removed `.lock`.
        self.locked = false;

        let mut budget = RMDIR_FAIL_COUNT;
        loop {
            match fs::remove_dir(&self.dirname) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    budget -= 1;
                    if budget == 0 {
                        error!(dir = %self.dirname.display(), error = %err, "can't remove directory");
                        return Err(Error::RemoveDir(self.dirname.display().to_string()).into());
                    }
                    // A fresh creator may have locked the emptied
                    // directory between our walk and rmdir. Its
                    // validity check fails and it backs off at once, so
                    // retrying with a minimal sleep wins.
                    thread::sleep(RMDIR_FAIL);
                }
            }
        }
    }
}

impl Drop for DumpDir {
    fn drop(&mut self) {
        if self.locked {
            // Clear first: even a failing unlink leaves the handle
            // unlocked.
            self.locked = false;
            lock::unlock(self.dir.as_fd(), &self.dirname);
        }
    }
}

/// Iterator over the regular-file item names of a [`DumpDir`].
pub struct Items<'a> {
    dir: BorrowedFd<'a>,
    stream: crate::io::DirStream,
}

impl Iterator for Items<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some(name) = self.stream.next_entry() {
            if let Ok(st) = crate::io::stat_at(self.dir, &name) {
                if (st.st_mode & libc::S_IFMT) == libc::S_IFREG {
                    return Some(name.to_string_lossy().into_owned());
                }
            }
        }
        None
    }
}

/// Open and immediately delete a problem directory.
pub fn delete_dump_dir(dir: impl AsRef<Path>) -> Result<()> {
    DumpDir::open(dir.as_ref(), OpenFlags::default())?.delete()
}

fn load_text_from(opened: io::Result<fs::File>, what: &str, flags: LoadFlags) -> Option<String> {
    let mut file = match opened {
        Ok(file) => file,
        Err(err) => {
            if !flags.quiet_missing {
                warn!(file = what, error = %err, "can't open file");
            }
            return if flags.null_on_failure {
                None
            } else {
                Some(String::new())
            };
        }
    };

    let mut raw = Vec::new();
    if let Err(err) = file.read_to_end(&mut raw) {
        if !flags.quiet_missing {
            warn!(file = what, error = %err, "can't read file");
        }
        return if flags.null_on_failure {
            None
        } else {
            Some(String::new())
        };
    }

    Some(crate::io::normalize_text(&raw))
}

/// Load a text file from outside any problem directory (OS release
/// files and the like). This is the only reader that may follow
/// symlinks.
fn load_text_file(path: &Path, flags: LoadFlags) -> Option<String> {
    let what = path.display().to_string();
    load_text_from(
        crate::io::open_external(path, flags.follow_links),
        &what,
        flags,
    )
}

fn delete_contents(dir_fd: BorrowedFd<'_>, skip_lock_file: bool) -> io::Result<()> {
    let mut stream = match crate::io::DirStream::from_dup(dir_fd) {
        Ok(stream) => stream,
        Err(err) => {
            // Only an error when the directory still exists.
            return match err.raw_os_error() {
                Some(libc::ENOENT) | Some(libc::ENOTDIR) => Ok(()),
                _ => Err(err),
            };
        }
    };

    let mut unlink_lock_file = false;
    while let Some(name) = stream.next_entry() {
        if name == "." || name == ".." {
            continue;
        }
        if skip_lock_file && name == lock::LOCK_FILE {
            // Unlinked last, after everything else is gone.
            unlink_lock_file = true;
            continue;
        }
        match crate::io::unlink_at(dir_fd, &name, false) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) if err.raw_os_error() == Some(libc::EISDIR) => {
                let sub = match crate::io::open_dir_at(dir_fd, &name) {
                    Ok(fd) => fd,
                    Err(err) => {
                        warn!(name = %name.to_string_lossy(), error = %err, "can't open subdirectory");
                        return Err(err);
                    }
                };
                delete_contents(sub.as_fd(), false)?;
                drop(sub);
                match crate::io::unlink_at(dir_fd, &name, true) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => {
                        warn!(name = %name.to_string_lossy(), error = %err, "can't remove subdirectory");
                        return Err(err);
                    }
                }
            }
            Err(err) => {
                warn!(name = %name.to_string_lossy(), error = %err, "can't remove entry");
                return Err(err);
            }
        }
    }

    if unlink_lock_file {
        let _ = crate::io::unlink_at(dir_fd, lock::LOCK_FILE, false);
    }
    Ok(())
}
