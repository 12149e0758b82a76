//! The thirteen filesystem operations (§4.E).
//!
//! Same shape as `sysfile.rs` — the single file where every filesystem-shaped
//! syscall lives, each doing argument validation before calling into the
//! lower layers. This module mirrors that shape one operation at a time:
//! each method here resolves its path(s), checks type/existence
//! preconditions, and only then mutates.

use log::{debug, warn};

use crate::config::{BLOCK_SIZE, DIR_MODE, FILE_MODE, NAME_MAX};
use crate::error::{Errno, FsResult};
use crate::inode::{
    append_child, child_offsets, create_dir, create_file, destroy_dir, destroy_file, find_child, list_children,
    now, read_file, remove_child, set_parent, truncate_file, validate_name, write_file,
};
use crate::layout::Inode;
use crate::mount::Filesystem;
use crate::path::{final_component, is_ancestor_or_self, resolve};

/// The subset of `struct stat` this filesystem can fill in (§4.E `getattr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    /// Passed straight through from the caller (§4.E: "fill uid/gid from
    /// arguments") — this filesystem has no owner concept of its own.
    pub uid: u32,
    pub gid: u32,
}

/// The fields `statfs` reports (§4.E `statfs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatfsInfo {
    pub f_bsize: u32,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_bavail: u64,
    pub f_namemax: u32,
}

impl<'a> Filesystem<'a> {
    fn resolve(&self, path: &str, skip_tail: usize) -> FsResult<(u32, Inode)> {
        let root = self.root_offset()?;
        resolve(self.region(), root, path, skip_tail).map_err(|e| {
            warn!("resolve {path} (skip_tail={skip_tail}) failed: {e}");
            e
        })
    }

    pub fn getattr(&mut self, path: &str, uid: u32, gid: u32) -> FsResult<Attr> {
        debug!("getattr {path}");
        let (offset, mut inode) = self.resolve(path, 0)?;
        inode.atime = now();
        self.region_mut().write(offset, &inode)?;

        let (mode, nlink, size) = if inode.is_dir() {
            let subdirs = child_offsets(self.region(), &inode)?
                .into_iter()
                .filter_map(|off| self.region().read::<Inode>(off).ok())
                .filter(|child| child.is_dir())
                .count() as u32;
            (DIR_MODE, 2 + subdirs, 0u64)
        } else {
            (FILE_MODE, 1, inode.size as u64)
        };

        Ok(Attr { mode, nlink, size, atime: inode.atime, mtime: inode.mtime, uid, gid })
    }

    pub fn readdir(&mut self, path: &str) -> FsResult<Vec<String>> {
        debug!("readdir {path}");
        let (offset, mut inode) = self.resolve(path, 0)?;
        if !inode.is_dir() {
            return Err(Errno::NotDir);
        }
        let names = list_children(self.region(), &inode)?;
        inode.atime = now();
        self.region_mut().write(offset, &inode)?;
        Ok(names)
    }

    pub fn open(&self, path: &str) -> FsResult<()> {
        debug!("open {path}");
        self.resolve(path, 0)?;
        Ok(())
    }

    fn create_entry(&mut self, path: &str, is_dir: bool) -> FsResult<()> {
        let name = final_component(path)?;
        validate_name(name)?;

        let (parent_offset, parent) = self.resolve(path, 1)?;
        if !parent.is_dir() {
            return Err(Errno::NotDir);
        }
        if find_child(self.region(), &parent, name)?.is_some() {
            warn!("create {path}: already exists");
            return Err(Errno::Exist);
        }

        self.with_free_head(|region, free_head| {
            let child_offset = if is_dir {
                create_dir(region, free_head, name, parent_offset)?
            } else {
                create_file(region, free_head, name)?
            };
            if let Err(e) = append_child(region, free_head, parent_offset, child_offset) {
                let _ = if is_dir {
                    destroy_dir(region, free_head, child_offset)
                } else {
                    destroy_file(region, free_head, child_offset)
                };
                return Err(e);
            }
            Ok(())
        })
    }

    pub fn mknod(&mut self, path: &str) -> FsResult<()> {
        debug!("mknod {path}");
        self.create_entry(path, false)
    }

    pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
        debug!("mkdir {path}");
        self.create_entry(path, true)
    }

    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        debug!("unlink {path}");
        let (file_offset, file) = self.resolve(path, 0)?;
        if !file.is_file() {
            return Err(Errno::IsDir);
        }
        let (parent_offset, _) = self.resolve(path, 1)?;

        self.with_free_head(|region, free_head| {
            remove_child(region, free_head, parent_offset, file_offset)?;
            destroy_file(region, free_head, file_offset)
        })
    }

    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        debug!("rmdir {path}");
        let (dir_offset, dir) = self.resolve(path, 0)?;
        if !dir.is_dir() {
            return Err(Errno::NotDir);
        }
        if dir.size != 1 {
            warn!("rmdir {path}: not empty");
            return Err(Errno::NotEmpty);
        }
        let (parent_offset, _) = self.resolve(path, 1)?;

        self.with_free_head(|region, free_head| {
            remove_child(region, free_head, parent_offset, dir_offset)?;
            destroy_dir(region, free_head, dir_offset)
        })
    }

    pub fn truncate(&mut self, path: &str, new_size: i64) -> FsResult<()> {
        debug!("truncate {path} to {new_size}");
        if new_size < 0 {
            return Err(Errno::Invalid);
        }
        let new_size = new_size as u32;
        let (file_offset, file) = self.resolve(path, 0)?;
        if !file.is_file() {
            return Err(Errno::IsDir);
        }
        self.with_free_head(|region, free_head| truncate_file(region, free_head, file_offset, new_size))
    }

    pub fn read(&mut self, path: &str, offset: u32, count: u32) -> FsResult<Vec<u8>> {
        debug!("read {path} offset={offset} count={count}");
        let (file_offset, mut file) = self.resolve(path, 0)?;
        if !file.is_file() {
            return Err(Errno::IsDir);
        }
        let bytes = read_file(self.region(), &file, offset, count)?;
        file.atime = now();
        self.region_mut().write(file_offset, &file)?;
        Ok(bytes)
    }

    pub fn write(&mut self, path: &str, offset: u32, data: &[u8]) -> FsResult<u32> {
        debug!("write {path} offset={offset} len={}", data.len());
        let (file_offset, file) = self.resolve(path, 0)?;
        if !file.is_file() {
            return Err(Errno::IsDir);
        }
        self.with_free_head(|region, free_head| write_file(region, free_head, file_offset, offset, data))
    }

    pub fn utimens(&mut self, path: &str, atime: i64, mtime: i64) -> FsResult<()> {
        debug!("utimens {path}");
        let (offset, mut inode) = self.resolve(path, 0)?;
        inode.atime = atime;
        inode.mtime = mtime;
        self.region_mut().write(offset, &inode)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        debug!("rename {from} -> {to}");
        let (from_offset, mut from_inode) = self.resolve(from, 0)?;
        let (from_parent_offset, _) = self.resolve(from, 1)?;
        let (to_parent_offset, to_parent) = self.resolve(to, 1)?;
        if !to_parent.is_dir() {
            return Err(Errno::NotDir);
        }
        let to_name = final_component(to)?;
        validate_name(to_name)?;

        let root = self.root_offset()?;
        if is_ancestor_or_self(self.region(), root, from_offset, to_parent_offset)? {
            return Err(Errno::Invalid);
        }

        let existing_offset = find_child(self.region(), &to_parent, to_name)?;
        if existing_offset == Some(from_offset) {
            // rename(a, a): a no-op (§8 round-trip law).
            return Ok(());
        }

        if let Some(existing_offset) = existing_offset {
            let existing: Inode = self.region().read(existing_offset)?;
            match (existing.is_dir(), from_inode.is_dir()) {
                (true, false) => return Err(Errno::IsDir),
                (false, true) => return Err(Errno::NotDir),
                _ => {}
            }
            if existing.is_dir() && existing.size != 1 {
                return Err(Errno::NotEmpty);
            }
        }

        self.with_free_head(|region, free_head| {
            if from_parent_offset == to_parent_offset {
                // Same directory: the slot for `from_offset` already lives in
                // this array, so only the name (and any displaced target)
                // need to change.
                if let Some(existing_offset) = existing_offset {
                    remove_child(region, free_head, to_parent_offset, existing_offset)?;
                    destroy_displaced(region, free_head, existing_offset, existing_is_dir(region, existing_offset)?)?;
                }
                from_inode.set_name(to_name);
                from_inode.mtime = now();
                region.write(from_offset, &from_inode)?;
            } else {
                // Cross-directory move: commit the new location first so a
                // failure here leaves `from` exactly where it was, then
                // remove the old slot and destroy whatever was displaced.
                append_child(region, free_head, to_parent_offset, from_offset)?;
                from_inode.set_name(to_name);
                from_inode.mtime = now();
                region.write(from_offset, &from_inode)?;
                if from_inode.is_dir() {
                    set_parent(region, &from_inode, to_parent_offset)?;
                }
                remove_child(region, free_head, from_parent_offset, from_offset)?;
                if let Some(existing_offset) = existing_offset {
                    remove_child(region, free_head, to_parent_offset, existing_offset)?;
                    destroy_displaced(region, free_head, existing_offset, existing_is_dir(region, existing_offset)?)?;
                }
            }
            Ok(())
        })
    }

    pub fn statfs(&self) -> FsResult<StatfsInfo> {
        let region = self.region();
        let sb: crate::layout::Superblock = region.read(0)?;
        let free_bytes = crate::alloc::total_free(region, sb.free_head)?;
        let block_size = BLOCK_SIZE as u64;
        Ok(StatfsInfo {
            f_bsize: BLOCK_SIZE as u32,
            f_blocks: sb.region_size as u64 / block_size,
            f_bfree: free_bytes / block_size,
            f_bavail: free_bytes / block_size,
            f_namemax: NAME_MAX as u32,
        })
    }
}

fn existing_is_dir(region: &crate::region::Region, offset: u32) -> FsResult<bool> {
    let inode: Inode = region.read(offset)?;
    Ok(inode.is_dir())
}

fn destroy_displaced(region: &mut crate::region::Region, free_head: &mut u32, offset: u32, is_dir: bool) -> FsResult<()> {
    if is_dir {
        destroy_dir(region, free_head, offset)
    } else {
        destroy_file(region, free_head, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::Filesystem;

    fn mounted(size: usize) -> Vec<u8> {
        vec![0u8; size]
    }

    #[test]
    fn fresh_mount_getattr_root() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        let attr = fs.getattr("/", 1000, 1000).unwrap();
        assert_eq!(attr.mode, DIR_MODE);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn mknod_write_read_round_trip() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mknod("/a").unwrap();
        fs.write("/a", 0, b"Hello").unwrap();
        let data = fs.read("/a", 0, 5).unwrap();
        assert_eq!(data, b"Hello");
        assert_eq!(fs.getattr("/a", 1000, 1000).unwrap().size, 5);
    }

    #[test]
    fn mkdir_mknod_readdir() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mkdir("/d").unwrap();
        fs.mknod("/d/x").unwrap();
        let names = fs.readdir("/d").unwrap();
        assert_eq!(names, vec!["x".to_string()]);
    }

    #[test]
    fn truncate_grows_with_zero_fill() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mknod("/a").unwrap();
        fs.truncate("/a", 2048).unwrap();
        let data = fs.read("/a", 0, 2048).unwrap();
        assert_eq!(data, vec![0u8; 2048]);
    }

    #[test]
    fn write_past_eof_then_getattr_reports_full_size() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mknod("/a").unwrap();
        fs.write("/a", 100_000, b"X").unwrap();
        assert_eq!(fs.getattr("/a", 1000, 1000).unwrap().size, 100_001);
        assert_eq!(fs.read("/a", 0, 1).unwrap(), vec![0u8]);
    }

    #[test]
    fn remount_preserves_tree() {
        let mut bytes = mounted(1 << 20);
        {
            let mut fs = Filesystem::mount(&mut bytes).unwrap();
            fs.mknod("/a").unwrap();
        }
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        assert_eq!(fs.read("/a", 0, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn mknod_duplicate_name_is_eexist() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mknod("/a").unwrap();
        assert_eq!(fs.mknod("/a").unwrap_err(), Errno::Exist);
    }

    #[test]
    fn rmdir_nonempty_is_enotempty() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mkdir("/d").unwrap();
        fs.mknod("/d/x").unwrap();
        assert_eq!(fs.rmdir("/d").unwrap_err(), Errno::NotEmpty);
    }

    #[test]
    fn rename_a_to_a_is_noop() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mknod("/a").unwrap();
        fs.write("/a", 0, b"data").unwrap();
        fs.rename("/a", "/a").unwrap();
        assert_eq!(fs.read("/a", 0, 4).unwrap(), b"data");
    }

    #[test]
    fn rename_moves_across_directories() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mkdir("/d").unwrap();
        fs.mknod("/a").unwrap();
        fs.write("/a", 0, b"hi").unwrap();
        fs.rename("/a", "/d/b").unwrap();
        assert_eq!(fs.read("/d/b", 0, 2).unwrap(), b"hi");
        assert_eq!(fs.readdir("/").unwrap(), vec!["d".to_string()]);
    }

    #[test]
    fn rename_directory_across_parents_updates_parent_backreference() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/b").unwrap();
        fs.mkdir("/a/d").unwrap();

        fs.rename("/a/d", "/b/d").unwrap();

        // Slot 0 of the moved directory's children array must now point at
        // /b, not the old parent /a, so `..` resolves correctly.
        let parent_attr = fs.getattr("/b/d/..", 1000, 1000).unwrap();
        assert_eq!(parent_attr.mode, DIR_MODE);
        assert_eq!(fs.readdir("/b/d/..").unwrap(), vec!["d".to_string()]);
        assert_eq!(fs.readdir("/a").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn rename_making_directory_its_own_descendant_is_einval() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mkdir("/d").unwrap();
        assert_eq!(fs.rename("/d", "/d/sub").unwrap_err(), Errno::Invalid);
    }

    #[test]
    fn statfs_reports_block_accounting() {
        let mut bytes = mounted(1 << 20);
        let fs = Filesystem::mount(&mut bytes).unwrap();
        let info = fs.statfs().unwrap();
        assert_eq!(info.f_bsize, 1024);
        assert_eq!(info.f_blocks, (1 << 20) / 1024);
        assert!(info.f_bfree > 0);
    }

    #[test]
    fn name_too_long_is_enametoolong() {
        let mut bytes = mounted(1 << 20);
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        let long_name = "a".repeat(300);
        let path = format!("/{long_name}");
        assert_eq!(fs.mknod(&path).unwrap_err(), Errno::NameTooLong);
    }
}
