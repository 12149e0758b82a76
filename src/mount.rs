//! Mount / bootstrap detection (§4.E preamble).
//!
//! Same shape as `fs/mod.rs`/`kernel.rs`'s top-level init sequence
//! (`fsinit`-style "check the superblock, bootstrap if absent, otherwise
//! leave untouched" flow) — here performed on every single entry point
//! rather than once at kernel boot, since this crate has no persistent
//! in-process state across calls (§5): each call re-derives a
//! [`Filesystem`] from the raw bytes handed to it.

use log::{debug, info};

use crate::alloc;
use crate::config::{CHILDREN_INITIAL_CAPACITY, MAGIC, ROOT_NAME};
use crate::error::{Errno, FsResult};
use crate::layout::{ChildrenArrayHeader, Inode, Superblock};
use crate::region::Region;

const SUPERBLOCK_SIZE: u32 = core::mem::size_of::<Superblock>() as u32;
const INODE_SIZE: u32 = core::mem::size_of::<Inode>() as u32;
const CHILDREN_HEADER_SIZE: u32 = core::mem::size_of::<ChildrenArrayHeader>() as u32;

/// A mounted view over one entry point's call. Borrows the region for the
/// duration of the call and is dropped at its end — nothing here is ever
/// retained across entry points (§5).
pub struct Filesystem<'a> {
    region: Region<'a>,
}

impl<'a> Filesystem<'a> {
    /// Mounts `bytes`, bootstrapping a fresh layout if the superblock's
    /// magic is absent, otherwise leaving it untouched (§4.E).
    pub fn mount(bytes: &'a mut [u8]) -> FsResult<Self> {
        let region_size = u32::try_from(bytes.len()).map_err(|_| Errno::Fault)?;
        let mut region = Region::new(bytes);

        let sb: Superblock = region.read(0)?;
        if sb.is_initialised() {
            debug!("mount: existing region, magic OK, root={}", sb.root_inode);
        } else {
            info!("mount: fresh region ({} bytes), bootstrapping", region_size);
            bootstrap(&mut region, region_size)?;
        }

        Ok(Filesystem { region })
    }

    pub fn region(&self) -> &Region<'a> {
        &self.region
    }

    pub fn region_mut(&mut self) -> &mut Region<'a> {
        &mut self.region
    }

    pub fn root_offset(&self) -> FsResult<u32> {
        let sb: Superblock = self.region.read(0)?;
        Ok(sb.root_inode)
    }

    pub fn free_head(&self) -> FsResult<u32> {
        let sb: Superblock = self.region.read(0)?;
        Ok(sb.free_head)
    }

    pub fn set_free_head(&mut self, free_head: u32) -> FsResult<()> {
        let mut sb: Superblock = self.region.read(0)?;
        sb.free_head = free_head;
        self.region.write(0, &sb)
    }

    /// Runs `f` with a mutable borrow of the region and the current
    /// `free_head`, writing the (possibly updated) `free_head` back to the
    /// superblock once `f` returns successfully. This is the shape every
    /// mutating operation in `ops.rs` uses so that the superblock round-trip
    /// happens exactly once per entry point (§5).
    pub fn with_free_head<T>(
        &mut self,
        f: impl FnOnce(&mut Region<'a>, &mut u32) -> FsResult<T>,
    ) -> FsResult<T> {
        let mut free_head = self.free_head()?;
        let result = f(&mut self.region, &mut free_head);
        if result.is_ok() {
            self.set_free_head(free_head)?;
        }
        result
    }
}

/// Lays out a fresh region: superblock at offset 0, the root directory
/// inode immediately after it, the root's bootstrap children array
/// immediately after that, and the remainder as one free block (§3
/// "Initial state").
fn bootstrap(region: &mut Region, region_size: u32) -> FsResult<()> {
    let root_offset = SUPERBLOCK_SIZE;
    let children_offset = root_offset + INODE_SIZE;
    let data_start = children_offset + CHILDREN_HEADER_SIZE + CHILDREN_INITIAL_CAPACITY * 4;

    if data_start > region_size {
        return Err(Errno::NoSpace);
    }

    let mut free_head = 0u32;
    alloc::bootstrap(region, &mut free_head, data_start, region_size)?;

    // `create_dir` would allocate its own inode/children array out of the
    // free list; the root's placement is fixed instead, so its record is
    // written directly rather than routed through the allocator.
    let mut root = Inode::new_zeroed();
    root.kind = crate::layout::InodeKind::Dir as u32;
    root.set_name(ROOT_NAME);
    let stamp = crate::inode::now();
    root.atime = stamp;
    root.mtime = stamp;
    root.data = children_offset;
    root.size = 1; // slot 0 only
    region.write(root_offset, &root)?;
    region.write(children_offset, &ChildrenArrayHeader { capacity: CHILDREN_INITIAL_CAPACITY })?;
    region.write(children_offset + CHILDREN_HEADER_SIZE, &0u32)?; // slot 0: root has no parent

    let superblock = Superblock { magic: MAGIC, region_size, root_inode: root_offset, free_head };
    region.write(0, &superblock)?;
    Ok(())
}
