//! Advisory cross-process lock on a problem directory.
//!
//! The directory is locked by creating a symlink named `.lock` inside
//! it, whose target string is the pid of the locking process. A symlink
//! is used rather than an ordinary file because symlink creation is
//! atomic on any reasonable filesystem.
//!
//! After creating `.lock` we may still discover the directory is not
//! really usable: another process created the directory but has not yet
//! populated it, or a deleter emptied it (removing `.lock` with the
//! rest) and is about to rmdir the husk. Both cases are detected by the
//! `time` item being absent, and both are handled by unlinking our lock
//! and backing off: the creator retries its own lock, the deleter
//! retries its rmdir. An ordinary directory mistaken for a problem
//! directory looks exactly the same, so the opener bails out of the
//! check-and-back-off loop after a bounded number of rounds.
//!
//! The retry cadence matters: a creator re-locking its own directory
//! must poll much faster than an opener waiting on a stranger's lock,
//! so a deleter racing a creator converges quickly.

use std::io;
use std::os::fd::BorrowedFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::io::{read_time_at, readlink_at, symlink_at, unlink_at};

pub(crate) const LOCK_FILE: &str = ".lock";

/// Sleep between "symlinkat fails with EEXIST, readlinkat fails with
/// ENOENT" rounds. Someone just unlocked the dir; we retry forever.
const SYMLINK_RETRY: Duration = Duration::from_millis(10);

/// Opener's sleep while a live process holds the lock.
const WAIT_FOR_OTHER_PROCESS: Duration = Duration::from_millis(500);

/// Creator's sleep while somebody else holds the lock on the directory
/// the creator itself just made. Short: the creator has priority here.
const CREATE_LOCK: Duration = Duration::from_millis(10);

/// Backoff after locking a directory and finding no `time` item, and
/// the number of such rounds before declaring it not a problem dir.
const NO_TIME_FILE: Duration = Duration::from_millis(50);
const NO_TIME_FILE_COUNT: u32 = 10;

/// Which flow is acquiring the lock. The opener validates the `time`
/// item after locking; the creator is about to write it and must not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockRole {
    Opener,
    Creator,
}

impl LockRole {
    fn wait_for_holder(self) -> Duration {
        match self {
            LockRole::Opener => WAIT_FOR_OTHER_PROCESS,
            LockRole::Creator => CREATE_LOCK,
        }
    }
}

#[derive(Debug)]
pub(crate) enum LockError {
    /// The directory vanished underneath us (ENOENT / ENOTDIR).
    Missing(io::Error),
    /// The directory is not writable by us (EACCES).
    Denied(io::Error),
    /// The opener exhausted its validity budget: lockable, but no
    /// well-formed `time` item ever showed up.
    NotProblemDir,
    /// Anything else; a diagnostic has already been emitted.
    Io(io::Error),
}

enum Attempt {
    Acquired,
    HeldByOther,
}

fn is_digits(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit)
}

fn holder_alive(pid: &str) -> bool {
    PathBuf::from("/proc").join(pid).exists()
}

/// One pass of the create-or-inspect protocol. Loops internally over the
/// transient races (lock vanished mid-read, stale lock unlinked); exits
/// with `HeldByOther` only for a live holder, so the caller owns the
/// inter-holder sleep.
fn try_create_lock(dir_fd: BorrowedFd<'_>, pid: &str) -> Result<Attempt, LockError> {
    loop {
        match symlink_at(pid, dir_fd, LOCK_FILE) {
            Ok(()) => {
                debug!(pid, "locked");
                return Ok(Attempt::Acquired);
            }
            Err(err) if err.raw_os_error() == Some(libc::EEXIST) => {}
            Err(err) => {
                return Err(match err.raw_os_error() {
                    Some(libc::ENOENT) | Some(libc::ENOTDIR) => LockError::Missing(err),
                    Some(libc::EACCES) => LockError::Denied(err),
                    _ => {
                        warn!(error = %err, "can't create lock file");
                        LockError::Io(err)
                    }
                });
            }
        }

        let target = match readlink_at(dir_fd, LOCK_FILE) {
            Ok(target) => target,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // The holder released between our symlinkat and
                // readlinkat. Avoid a CPU-eating loop; never give up.
                thread::sleep(SYMLINK_RETRY);
                continue;
            }
            Err(err) => {
                warn!(error = %err, "can't read lock file");
                return Err(LockError::Io(err));
            }
        };

        if target == pid.as_bytes() {
            warn!(pid, "lock file is already locked by us");
            return Ok(Attempt::HeldByOther);
        }
        if is_digits(&target) {
            let holder = String::from_utf8_lossy(&target).into_owned();
            if holder_alive(&holder) {
                debug!(holder, "lock file is locked by a live process");
                return Ok(Attempt::HeldByOther);
            }
            warn!(holder, "lock file was locked by a process that crashed?");
        }

        // Stale or garbage lock. It may be gone already; that's fine.
        match unlink_at(dir_fd, LOCK_FILE, false) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(error = %err, "can't remove stale lock file");
                return Err(LockError::Io(err));
            }
        }
    }
}

/// Acquire the lock on `dir_fd` for `role`. For the opener, also runs
/// the validity check and returns the parsed `time` value; for the
/// creator, returns `None` (there is no `time` yet, the creator writes
/// it while holding the lock).
pub(crate) fn lock(
    dir_fd: BorrowedFd<'_>,
    dirname: &Path,
    role: LockRole,
    dont_wait_for_lock: bool,
) -> Result<Option<i64>, LockError> {
    let pid = std::process::id().to_string();
    let mut budget = NO_TIME_FILE_COUNT;

    loop {
        loop {
            match try_create_lock(dir_fd, &pid)? {
                Attempt::Acquired => break,
                Attempt::HeldByOther => thread::sleep(role.wait_for_holder()),
            }
        }

        if role == LockRole::Creator {
            return Ok(None);
        }

        match read_time_at(dir_fd, super::ITEM_TIME) {
            Ok(time) => return Ok(Some(time)),
            Err(_) => {
                // We managed to lock a directory that was just created
                // by somebody else, or is half-deleted. Unlock and back
                // off.
                if let Err(err) = unlink_at(dir_fd, LOCK_FILE, false) {
                    if err.kind() != io::ErrorKind::NotFound {
                        warn!(error = %err, "can't remove own lock file");
                    }
                }
                debug!(dir = %dirname.display(), "unlocked (no or corrupted 'time' item)");
                budget -= 1;
                if budget == 0 || dont_wait_for_lock {
                    return Err(LockError::NotProblemDir);
                }
                thread::sleep(NO_TIME_FILE);
            }
        }
    }
}

/// Drop the lock. Callers clear their `locked` flag before calling so a
/// failed unlink still leaves the handle unlocked.
pub(crate) fn unlock(dir_fd: BorrowedFd<'_>, dirname: &Path) {
    match unlink_at(dir_fd, LOCK_FILE, false) {
        Ok(()) => debug!(dir = %dirname.display(), "unlocked"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(dir = %dirname.display(), error = %err, "can't remove lock file"),
    }
}
