//! Compile-time tunables for the on-region layout.
//!
//! Centralising these as `pub const`s (rather than scattering magic numbers
//! through `layout`/`alloc`/`inode`) mirrors `param.rs`, which gathers the
//! same kind of kernel-wide tunables (`BSIZE`, `NINODE`, `MAXPATH`, ...) in
//! one place. Changing any of these changes the on-region binary layout and
//! therefore requires bumping [`MAGIC`].

/// Magic number gating "already initialised; do not touch" on remount.
pub const MAGIC: u32 = 0x0ADD_BEEF;

/// Maximum file/directory name length, in bytes (NUL excluded).
pub const NAME_MAX: usize = 255;

/// Size of the on-region name buffer (one extra byte for the NUL terminator).
pub const NAME_BUF_LEN: usize = NAME_MAX + 1;

/// Preferred capacity of a single file block's data area, in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Initial capacity (in slots) of a directory's children array, including
/// the reserved parent slot.
pub const CHILDREN_INITIAL_CAPACITY: u32 = 4;

/// Fixed mode reported for every inode (permission enforcement is out of scope).
pub const FILE_MODE: u32 = 0o100_755;
pub const DIR_MODE: u32 = 0o40_755;

/// Name stamped on the root inode. Never matched against by the resolver
/// (the root is reached by walking off the front of a path, never by name),
/// purely cosmetic for anything that inspects the raw inode record.
pub const ROOT_NAME: &str = "/";
