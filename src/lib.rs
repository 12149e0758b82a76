//! An in-memory, mmap-persistent POSIX-style filesystem core.
//!
//! The crate owns the layout and semantics of a contiguous byte region
//! handed to it by a host (a FUSE-like dispatcher): how free space is
//! tracked, how files and directories are represented, how paths are
//! resolved, and how the thirteen filesystem operations mutate the region.
//! It does not `mmap` anything itself, dispatch kernel requests, or enforce
//! permissions — those are the host's concern (see [`ffi`]).
//!
//! Every structure inside the region is reached by `u32` offset, never by
//! native pointer, so a remount at a different base address reads back
//! exactly the same filesystem. See [`region`] for the only functions
//! allowed to cross that boundary.

#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod alloc;
pub mod config;
pub mod error;
pub mod ffi;
pub mod inode;
pub mod layout;
pub mod mount;
pub mod ops;
pub mod path;
pub mod region;

pub use error::{Errno, FsResult};
pub use mount::Filesystem;
pub use ops::{Attr, StatfsInfo};
