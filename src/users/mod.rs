//! Reentrant wrappers around the account database and `uname(2)`.

use std::ffi::{CStr, CString};
use std::mem::MaybeUninit;

const MAX_LOOKUP_BUF: usize = 1 << 20;

#[derive(Debug, Clone)]
pub(crate) struct Passwd {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

unsafe fn string_from(ptr: *const libc::c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

unsafe fn passwd_from(raw: &libc::passwd) -> Passwd {
    Passwd {
        name: string_from(raw.pw_name),
        uid: raw.pw_uid,
        gid: raw.pw_gid,
    }
}

pub(crate) fn passwd_by_name(name: &str) -> Option<Passwd> {
    let cname = CString::new(name).ok()?;
    let mut buf = vec![0u8; 1024];
    loop {
        let mut pwd = MaybeUninit::<libc::passwd>::uninit();
        let mut found: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe {
            libc::getpwnam_r(
                cname.as_ptr(),
                pwd.as_mut_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut found,
            )
        };
        if rc == libc::ERANGE && buf.len() < MAX_LOOKUP_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || found.is_null() {
            return None;
        }
        let pwd = unsafe { pwd.assume_init() };
        return Some(unsafe { passwd_from(&pwd) });
    }
}

pub(crate) fn passwd_by_uid(uid: u32) -> Option<Passwd> {
    let mut buf = vec![0u8; 1024];
    loop {
        let mut pwd = MaybeUninit::<libc::passwd>::uninit();
        let mut found: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe {
            libc::getpwuid_r(
                uid as libc::uid_t,
                pwd.as_mut_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut found,
            )
        };
        if rc == libc::ERANGE && buf.len() < MAX_LOOKUP_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || found.is_null() {
            return None;
        }
        let pwd = unsafe { pwd.assume_init() };
        return Some(unsafe { passwd_from(&pwd) });
    }
}

/// Member names of the group `gid`, or `None` when the group does not
/// exist. Primary members (users whose passwd gid is `gid`) are not
/// listed here.
pub(crate) fn group_members(gid: u32) -> Option<Vec<String>> {
    let mut buf = vec![0u8; 1024];
    loop {
        let mut grp = MaybeUninit::<libc::group>::uninit();
        let mut found: *mut libc::group = std::ptr::null_mut();
        let rc = unsafe {
            libc::getgrgid_r(
                gid as libc::gid_t,
                grp.as_mut_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut found,
            )
        };
        if rc == libc::ERANGE && buf.len() < MAX_LOOKUP_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || found.is_null() {
            return None;
        }
        let grp = unsafe { grp.assume_init() };

        let mut members = Vec::new();
        let mut cursor = grp.gr_mem;
        unsafe {
            while !cursor.is_null() && !(*cursor).is_null() {
                members.push(string_from(*cursor));
                cursor = cursor.add(1);
            }
        }
        return Some(members);
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Uname {
    pub release: String,
    pub machine: String,
    pub nodename: String,
}

pub(crate) fn uname() -> Uname {
    let mut uts = MaybeUninit::<libc::utsname>::zeroed();
    if unsafe { libc::uname(uts.as_mut_ptr()) } != 0 {
        return Uname::default();
    }
    let uts = unsafe { uts.assume_init() };
    unsafe {
        Uname {
            release: string_from(uts.release.as_ptr()),
            machine: string_from(uts.machine.as_ptr()),
            nodename: string_from(uts.nodename.as_ptr()),
        }
    }
}
