//! Fd-relative filesystem primitives for working inside a problem
//! directory without following symlinks, plus payload normalisation for
//! short text items.

use std::ffi::{CStr, CString, OsStr, OsString};
use std::fs::File;
use std::io::{self, Read};
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::NonNull;

use tracing::debug;

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn name_cstr(name: &OsStr) -> io::Result<CString> {
    Ok(CString::new(name.as_bytes())?)
}

pub(crate) fn open_dir(path: &Path) -> io::Result<OwnedFd> {
    let path = CString::new(path.as_os_str().as_bytes())?;
    let fd = cvt(unsafe {
        libc::open(
            path.as_ptr(),
            libc::O_DIRECTORY | libc::O_NOFOLLOW | libc::O_CLOEXEC,
        )
    })?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn open_dir_at(dir: BorrowedFd<'_>, name: impl AsRef<OsStr>) -> io::Result<OwnedFd> {
    let cname = name_cstr(name.as_ref())?;
    let fd = cvt(unsafe {
        libc::openat(
            dir.as_raw_fd(),
            cname.as_ptr(),
            libc::O_DIRECTORY | libc::O_CLOEXEC,
        )
    })?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Open a file by absolute path. Symlink dereference is allowed only when
/// the caller asks for it (host files such as `/etc/system-release`).
pub(crate) fn open_external(path: &Path, follow: bool) -> io::Result<File> {
    let cpath = CString::new(path.as_os_str().as_bytes())?;
    let mut flags = libc::O_RDONLY | libc::O_CLOEXEC;
    if !follow {
        flags |= libc::O_NOFOLLOW;
    }
    let fd = cvt(unsafe { libc::open(cpath.as_ptr(), flags) })?;
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Open an item for reading relative to `dir`, never dereferencing a
/// symlink in its place.
pub(crate) fn open_item_at(dir: BorrowedFd<'_>, name: &str) -> io::Result<File> {
    let cname = name_cstr(name.as_ref())?;
    let fd = cvt(unsafe {
        libc::openat(
            dir.as_raw_fd(),
            cname.as_ptr(),
            libc::O_RDONLY | libc::O_NOFOLLOW | libc::O_CLOEXEC,
        )
    })?;
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Like [`open_item_at`], but additionally rejects anything that is not a
/// regular file with link count 1. The store may be group-writable by
/// partially-trusted users; a hard link planted in place of an item must
/// not trick a privileged caller into chowning the linked inode.
pub(crate) fn secure_open_at(dir: BorrowedFd<'_>, name: &str) -> io::Result<File> {
    let file = open_item_at(dir, name)?;
    let st = fstat(&file)?;
    if (st.st_mode & libc::S_IFMT) != libc::S_IFREG || st.st_nlink > 1 {
        debug!(
            name,
            nlink = st.st_nlink as u64,
            "item is not a regular file or has extra hard links"
        );
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }
    Ok(file)
}

/// Create a fresh item relative to `dir`. The caller unlinks any previous
/// file of that name first; `O_EXCL` keeps us from writing through a
/// symlink or into somebody else's inode.
pub(crate) fn create_item_at(dir: BorrowedFd<'_>, name: &str, mode: u32) -> io::Result<File> {
    let cname = name_cstr(name.as_ref())?;
    let fd = cvt(unsafe {
        libc::openat(
            dir.as_raw_fd(),
            cname.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL | libc::O_NOFOLLOW | libc::O_CLOEXEC,
            mode as libc::c_uint,
        )
    })?;
    Ok(unsafe { File::from_raw_fd(fd) })
}

pub(crate) fn unlink_at(dir: BorrowedFd<'_>, name: impl AsRef<OsStr>, remove_dir: bool) -> io::Result<()> {
    let cname = name_cstr(name.as_ref())?;
    let flags = if remove_dir { libc::AT_REMOVEDIR } else { 0 };
    cvt(unsafe { libc::unlinkat(dir.as_raw_fd(), cname.as_ptr(), flags) })?;
    Ok(())
}

pub(crate) fn symlink_at(target: &str, dir: BorrowedFd<'_>, name: &str) -> io::Result<()> {
    let ctarget = CString::new(target)?;
    let cname = name_cstr(name.as_ref())?;
    cvt(unsafe { libc::symlinkat(ctarget.as_ptr(), dir.as_raw_fd(), cname.as_ptr()) })?;
    Ok(())
}

pub(crate) fn readlink_at(dir: BorrowedFd<'_>, name: &str) -> io::Result<Vec<u8>> {
    let cname = name_cstr(name.as_ref())?;
    let mut buf = [0u8; 64];
    let len = unsafe {
        libc::readlinkat(
            dir.as_raw_fd(),
            cname.as_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
        )
    };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(buf[..len as usize].to_vec())
}

pub(crate) fn stat_at(dir: BorrowedFd<'_>, name: impl AsRef<OsStr>) -> io::Result<libc::stat> {
    let cname = name_cstr(name.as_ref())?;
    let mut st = MaybeUninit::<libc::stat>::uninit();
    cvt(unsafe {
        libc::fstatat(
            dir.as_raw_fd(),
            cname.as_ptr(),
            st.as_mut_ptr(),
            libc::AT_SYMLINK_NOFOLLOW,
        )
    })?;
    Ok(unsafe { st.assume_init() })
}

pub(crate) fn fstat(fd: &impl AsRawFd) -> io::Result<libc::stat> {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    cvt(unsafe { libc::fstat(fd.as_raw_fd(), st.as_mut_ptr()) })?;
    Ok(unsafe { st.assume_init() })
}

pub(crate) fn fchmod(fd: &impl AsRawFd, mode: u32) -> io::Result<()> {
    cvt(unsafe { libc::fchmod(fd.as_raw_fd(), mode as libc::mode_t) })?;
    Ok(())
}

pub(crate) fn fchown(fd: &impl AsRawFd, uid: u32, gid: u32) -> io::Result<()> {
    cvt(unsafe { libc::fchown(fd.as_raw_fd(), uid as libc::uid_t, gid as libc::gid_t) })?;
    Ok(())
}

pub(crate) fn dir_is_readable(dir: BorrowedFd<'_>) -> bool {
    let dot = CString::new(".").expect("static string");
    unsafe {
        libc::faccessat(
            dir.as_raw_fd(),
            dot.as_ptr(),
            libc::R_OK,
            libc::AT_SYMLINK_NOFOLLOW,
        ) == 0
    }
}

/// Directory entry stream over a duplicated fd, so reading it never
/// disturbs the owning handle's descriptor.
pub(crate) struct DirStream {
    dir: NonNull<libc::DIR>,
}

impl DirStream {
    pub(crate) fn from_dup(fd: BorrowedFd<'_>) -> io::Result<Self> {
        let dup = fd.try_clone_to_owned()?;
        let raw = dup.into_raw_fd();
        let dir = unsafe { libc::fdopendir(raw) };
        let Some(dir) = NonNull::new(dir) else {
            let err = io::Error::last_os_error();
            unsafe { libc::close(raw) };
            return Err(err);
        };
        // The dup shares the directory offset with the original fd.
        unsafe { libc::rewinddir(dir.as_ptr()) };
        Ok(Self { dir })
    }

    pub(crate) fn next_entry(&mut self) -> Option<OsString> {
        let ent = unsafe { libc::readdir(self.dir.as_ptr()) };
        if ent.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr((*ent).d_name.as_ptr()) };
        Some(OsStr::from_bytes(name.to_bytes()).to_os_string())
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        unsafe { libc::closedir(self.dir.as_ptr()) };
    }
}

fn is_space_byte(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r' | b' ')
}

/// Normalise a text item payload for display.
///
/// NUL bytes become spaces, control bytes other than whitespace are
/// dropped, and bytes >= 0x20 pass through (so UTF-8 sequences survive).
/// A single trailing newline is stripped, which lets `echo value > item`
/// produce the item `"value"`; any other payload containing a newline is
/// made to end with one. Byte sequences that are not valid UTF-8 are
/// replaced when converting to a `String`.
pub(crate) fn normalize_text(raw: &[u8]) -> String {
    let mut out: Vec<u8> = Vec::with_capacity(raw.len());
    let mut newlines = 0u32;
    for &b in raw {
        if b == b'\n' {
            newlines = newlines.saturating_add(1);
        }
        let b = if b == 0 { b' ' } else { b };
        if is_space_byte(b) || b >= 0x20 {
            out.push(b);
        }
    }

    if out.last() == Some(&b'\n') {
        if newlines == 1 {
            out.pop();
        }
    } else if newlines >= 1 {
        // Last line is unterminated, fix it. A payload with no newline at
        // all is kept verbatim.
        out.push(b'\n');
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Read `name` relative to `dir` and parse it as a decimal unix
/// timestamp: digits only, an optional single trailing newline, and a
/// value that fits `time_t` with room to spare.
pub(crate) fn read_time_at(dir: BorrowedFd<'_>, name: &str) -> io::Result<i64> {
    let mut file = secure_open_at(dir, name)?;

    // Maximal number of digits in a positive time_t, plus one byte so a
    // longer file is detectable.
    let mut buf = [0u8; std::mem::size_of::<libc::time_t>() * 3 + 1];
    let mut len = 0;
    loop {
        match file.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
        if len == buf.len() {
            break;
        }
    }
    if len == buf.len() {
        debug!(name, max = buf.len(), "file is too long to be a valid unix time stamp");
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }

    let mut bytes = &buf[..len];
    if let [head @ .., b'\n'] = bytes {
        bytes = head;
    }
    parse_time(bytes).ok_or_else(|| {
        debug!(
            name,
            content = %String::from_utf8_lossy(bytes),
            "file doesn't contain a valid unix time stamp"
        );
        io::Error::from_raw_os_error(libc::EINVAL)
    })
}

fn parse_time(bytes: &[u8]) -> Option<i64> {
    // Digits only: filters out "-num", "  num" and "".
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    let val: i64 = text.parse().ok()?;
    let max_time = (1i128 << (std::mem::size_of::<libc::time_t>() * 8 - 1)) - 1;
    if i128::from(val) >= max_time {
        return None;
    }
    Some(val)
}
