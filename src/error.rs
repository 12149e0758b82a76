//! POSIX error codes returned by the operation layer (§6/§7).
//!
//! A kernel's own syscall layer can get away with threading a bare
//! `Result<T, ()>` through its helpers and only reconstructing a concrete
//! errno at the very top. This crate's callers need the specific code
//! throughout — a host translating `Errno` to a FUSE reply needs to know
//! *which* error it is, not just that one occurred — so helpers here return
//! `Result<T, Errno>` directly.

use thiserror::Error;

/// The subset of POSIX error codes this filesystem ever returns.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    #[error("no such file or directory")]
    NoEnt,
    #[error("not a directory")]
    NotDir,
    #[error("is a directory")]
    IsDir,
    #[error("directory not empty")]
    NotEmpty,
    #[error("file exists")]
    Exist,
    #[error("file name too long")]
    NameTooLong,
    #[error("no space left on device")]
    NoSpace,
    #[error("cannot allocate memory")]
    NoMem,
    #[error("bad address")]
    Fault,
    #[error("invalid argument")]
    Invalid,
}

impl Errno {
    /// Maps this error to the `libc` errno constant a host should surface
    /// to the kernel (or store in `*errno_out`, per §6).
    pub const fn to_raw(self) -> libc::c_int {
        match self {
            Errno::NoEnt => libc::ENOENT,
            Errno::NotDir => libc::ENOTDIR,
            Errno::IsDir => libc::EISDIR,
            Errno::NotEmpty => libc::ENOTEMPTY,
            Errno::Exist => libc::EEXIST,
            Errno::NameTooLong => libc::ENAMETOOLONG,
            Errno::NoSpace => libc::ENOSPC,
            Errno::NoMem => libc::ENOMEM,
            Errno::Fault => libc::EFAULT,
            Errno::Invalid => libc::EINVAL,
        }
    }
}

/// Convenience alias used throughout the core.
pub type FsResult<T> = Result<T, Errno>;
