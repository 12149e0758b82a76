//! On-region record layout (§3).
//!
//! Every record here is `#[repr(C)]`, has no padding (fields are ordered by
//! descending alignment so the compiler never inserts filler bytes), and
//! derives `zerocopy`'s `FromBytes`/`AsBytes`/`FromZeroes` so it can be read
//! or written straight out of the mmap'd byte slice via [`crate::region::Region`]
//! with no manual (de)serialisation step. `static_assertions::const_assert!`
//! pins each record's size so the layout cannot drift silently between a
//! change here and the on-region bytes a previous mount already wrote —
//! exactly the role `fs/superblock.rs` and `fs/inode.rs` give
//! `static_assertions::const_assert!` around `Dinode`/`Superblock` sizes.
//!
//! No record stores a native pointer; every cross-reference is a `u32`
//! offset into the region, with `0` reserved for "no reference" (§4.A).

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::config::{MAGIC, NAME_BUF_LEN};

/// Superblock, at offset 0. Its magic is the gate: present ⇒ "already
/// initialised, do not touch" (§3).
#[derive(Clone, Copy, Debug, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct Superblock {
    pub magic: u32,
    pub region_size: u32,
    pub root_inode: u32,
    pub free_head: u32,
}

const_assert_eq!(core::mem::size_of::<Superblock>(), 16);

impl Superblock {
    pub fn is_initialised(&self) -> bool {
        self.magic == MAGIC
    }
}

/// Discriminant for [`Inode::kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum InodeKind {
    File = 1,
    Dir = 2,
}

impl InodeKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(InodeKind::File),
            2 => Some(InodeKind::Dir),
            _ => None,
        }
    }
}

/// A fixed-size inode record.
///
/// The FILE/DIR split is a tagged variant on [`Inode::kind`] rather than a
/// native Rust `union` or a trait object: the record is read and written in
/// place over raw bytes, so any language-level polymorphism that could
/// embed a vtable or fat pointer is inappropriate here. `size`/`data` are
/// reused across both kinds exactly like `Dinode` reuses its `addrs` array
/// for both regular files and directories:
/// - FILE: `size` is the logical byte length, `data` is the offset of the
///   first [`FileBlockHeader`] (0 ⇒ empty file).
/// - DIR: `size` is `N`, the number of children array slots in use
///   (including the reserved parent slot 0), `data` is the offset of the
///   children array (a [`ChildrenArrayHeader`] followed by `N_capacity`
///   `u32` slots).
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct Inode {
    pub atime: i64,
    pub mtime: i64,
    pub size: u32,
    pub data: u32,
    pub kind: u32,
    _reserved: u32,
    pub name: [u8; NAME_BUF_LEN],
}

const_assert_eq!(core::mem::size_of::<Inode>(), 8 + 8 + 4 + 4 + 4 + 4 + NAME_BUF_LEN);

impl Inode {
    pub fn kind(&self) -> Option<InodeKind> {
        InodeKind::from_raw(self.kind)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind(), Some(InodeKind::Dir))
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind(), Some(InodeKind::File))
    }

    /// The name, with the trailing NUL (and anything past it) stripped.
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [0; NAME_BUF_LEN];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }
}

/// Header of a directory's children array: a contiguous run of `u32`
/// offsets, one per slot, slot 0 holding the parent back-reference.
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct ChildrenArrayHeader {
    pub capacity: u32,
}

const_assert_eq!(core::mem::size_of::<ChildrenArrayHeader>(), 4);

/// Header of one node in a file's block chain.
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct FileBlockHeader {
    pub capacity: u32,
    pub allocated: u32,
    pub next: u32,
    pub data: u32,
}

const_assert_eq!(core::mem::size_of::<FileBlockHeader>(), 16);

/// A node in the sorted, coalesced free list (§3, §4.B).
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct FreeBlockHeader {
    /// Usable payload size, excluding this header.
    pub size: u32,
    /// Offset of the next free block, 0 terminates.
    pub next: u32,
}

const_assert_eq!(core::mem::size_of::<FreeBlockHeader>(), 8);
