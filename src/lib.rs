//! Filesystem-backed store of problem directories.
//!
//! A problem directory captures one incident (typically an application
//! crash) as a directory of named items: short text files such as `time`,
//! `uid` or `kernel`, plus arbitrary binary blobs. Many unrelated
//! processes on the same host work on the store concurrently (crash
//! hooks create directories, reporters read them, janitors delete them),
//! coordinated only through an advisory `.lock` symlink whose target is
//! the decimal pid of the holder.

use thiserror::Error;

pub mod access;
pub mod dump;
mod io;
pub mod logging;
mod users;

pub use dump::reported::ReportResult;
pub use dump::{
    delete_dump_dir, is_correct_filename, open_fd, DumpDir, Items, LoadFlags, OpenFlags,
};

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("'{0}' is not a problem directory")]
    NotProblemDir(String),
    #[error("'{0}' does not exist")]
    MissingPath(String),
    #[error("can't access '{0}'")]
    PermissionDenied(String),
    #[error("bad dir name '{0}'")]
    BadDirName(String),
    #[error("'{0}' is not a valid item name")]
    BadItemName(String),
    #[error("problem directory '{0}' is not locked")]
    NotLocked(String),
    #[error("can't remove contents of directory '{0}'")]
    RemoveContents(String),
    #[error("can't remove directory '{0}'")]
    RemoveDir(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
