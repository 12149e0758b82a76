//! Path tokenisation and resolution (§4.D).
//!
//! Same shape as `fs/path.rs`'s `Path::skipelem` (component-at-a-time
//! tokeniser with no heap allocation, leaving `.`/`..` handling to the
//! caller) — generalised here to also interpret `.` and `..` directly, since
//! this crate's children array (unlike a flat directory block of fixed-size
//! dirents) stores the parent back-reference at slot 0 rather than as a
//! literal `".."` directory entry.

use crate::error::{Errno, FsResult};
use crate::inode::find_child;
use crate::layout::Inode;
use crate::region::Region;

/// Splits `path` into its `/`-separated, non-empty components. A trailing
/// slash produces no extra empty component (§4.D: "ignored after
/// tokenisation").
fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Walks `path` from the root, resolving all but the final `skip_tail`
/// components (§4.D: `skip_tail ∈ {0, 1}`).
///
/// - `skip_tail = 0`: returns `(inode_offset, inode)` for `path` itself.
/// - `skip_tail = 1`: returns the parent directory of `path`'s final
///   component, leaving that component to the caller (the shape every
///   create/delete/rename site needs).
///
/// Traversing through a non-directory is `ENOTDIR`; a missing component is
/// `ENOENT`.
pub fn resolve(region: &Region, root_offset: u32, path: &str, skip_tail: usize) -> FsResult<(u32, Inode)> {
    let parts = components(path);
    let walk_len = parts.len().saturating_sub(skip_tail);

    let mut current_offset = root_offset;
    let mut current: Inode = region.read(current_offset)?;

    for &part in &parts[..walk_len] {
        if !current.is_dir() {
            return Err(Errno::NotDir);
        }
        let next_offset = match part {
            "." => current_offset,
            ".." if current_offset == root_offset => root_offset,
            ".." => parent_of(region, &current)?,
            name => find_child(region, &current, name)?.ok_or(Errno::NoEnt)?,
        };
        current_offset = next_offset;
        current = region.read(current_offset)?;
    }

    Ok((current_offset, current))
}

/// Slot 0 of a directory's children array: the parent back-reference
/// (§3 I5). The root's own slot 0 holds the reserved value 0 (there is
/// nothing above it to ascend to) — callers must special-case `..` at the
/// root themselves rather than dereferencing that value as an offset; see
/// `resolve`'s `".." if current_offset == root_offset` arm.
fn parent_of(region: &Region, dir: &Inode) -> FsResult<u32> {
    let parent: u32 = region.read(dir.data)?;
    Ok(parent)
}

/// The final path component, i.e. the name a create/delete/rename site must
/// still act on after resolving with `skip_tail = 1`.
pub fn final_component(path: &str) -> FsResult<&str> {
    components(path).last().copied().ok_or(Errno::Invalid)
}

/// Returns `true` if `ancestor_offset` lies on the path from the root to
/// `descendant_offset`, inclusive of `descendant_offset` itself — used by
/// `rename` to reject moving a directory into its own subtree (§4.E, §8).
pub fn is_ancestor_or_self(region: &Region, root_offset: u32, ancestor_offset: u32, descendant_offset: u32) -> FsResult<bool> {
    let mut current_offset = descendant_offset;
    loop {
        if current_offset == ancestor_offset {
            return Ok(true);
        }
        if current_offset == root_offset {
            return Ok(false);
        }
        let current: Inode = region.read(current_offset)?;
        if !current.is_dir() {
            return Ok(false);
        }
        let parent = parent_of(region, &current)?;
        if parent == current_offset {
            return Ok(false);
        }
        current_offset = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::bootstrap;
    use crate::inode::{append_child, create_dir, create_file};
    use crate::layout::Superblock;

    fn mounted(size: usize) -> (Vec<u8>, u32) {
        let mut bytes = vec![0u8; size];
        let root_offset = core::mem::size_of::<Superblock>() as u32;
        let inode_size = core::mem::size_of::<Inode>() as u32;
        let data_start = root_offset + inode_size;
        {
            let mut region = Region::new(&mut bytes);
            let mut free_head = 0u32;
            bootstrap(&mut region, &mut free_head, data_start, region.len() as u32).unwrap();
            let root = create_dir(&mut region, &mut free_head, "/", 0).unwrap();
            assert_eq!(root, root_offset);
        }
        (bytes, root_offset)
    }

    #[test]
    fn components_ignores_trailing_and_repeated_slashes() {
        assert_eq!(components("/a//b/"), vec!["a", "b"]);
        assert_eq!(components("/"), Vec::<&str>::new());
    }

    #[test]
    fn resolve_root_with_empty_path() {
        let (mut bytes, root_offset) = mounted(4096);
        let region = Region::new(&mut bytes);
        let (offset, inode) = resolve(&region, root_offset, "/", 0).unwrap();
        assert_eq!(offset, root_offset);
        assert!(inode.is_dir());
    }

    #[test]
    fn resolve_walks_nested_directories() {
        let (mut bytes, root_offset) = mounted(16384);
        let sub;
        let file;
        {
            let mut region = Region::new(&mut bytes);
            let mut free_head = {
                let sb: Superblock = region.read(0).unwrap();
                sb.free_head
            };
            sub = create_dir(&mut region, &mut free_head, "sub", root_offset).unwrap();
            append_child(&mut region, &mut free_head, root_offset, sub).unwrap();
            file = create_file(&mut region, &mut free_head, "leaf").unwrap();
            append_child(&mut region, &mut free_head, sub, file).unwrap();
        }
        let region = Region::new(&mut bytes);
        let (offset, inode) = resolve(&region, root_offset, "/sub/leaf", 0).unwrap();
        assert_eq!(offset, file);
        assert!(inode.is_file());
    }

    #[test]
    fn resolve_skip_tail_returns_parent() {
        let (mut bytes, root_offset) = mounted(16384);
        let sub;
        {
            let mut region = Region::new(&mut bytes);
            let mut free_head = {
                let sb: Superblock = region.read(0).unwrap();
                sb.free_head
            };
            sub = create_dir(&mut region, &mut free_head, "sub", root_offset).unwrap();
            append_child(&mut region, &mut free_head, root_offset, sub).unwrap();
        }
        let region = Region::new(&mut bytes);
        let (offset, _) = resolve(&region, root_offset, "/sub/new.txt", 1).unwrap();
        assert_eq!(offset, sub);
        assert_eq!(final_component("/sub/new.txt").unwrap(), "new.txt");
    }

    #[test]
    fn resolve_through_file_is_enotdir() {
        let (mut bytes, root_offset) = mounted(16384);
        {
            let mut region = Region::new(&mut bytes);
            let mut free_head = {
                let sb: Superblock = region.read(0).unwrap();
                sb.free_head
            };
            let file = create_file(&mut region, &mut free_head, "a").unwrap();
            append_child(&mut region, &mut free_head, root_offset, file).unwrap();
        }
        let region = Region::new(&mut bytes);
        assert_eq!(resolve(&region, root_offset, "/a/b", 0).unwrap_err(), Errno::NotDir);
    }

    #[test]
    fn resolve_missing_component_is_enoent() {
        let (mut bytes, root_offset) = mounted(4096);
        let region = Region::new(&mut bytes);
        assert_eq!(resolve(&region, root_offset, "/missing", 0).unwrap_err(), Errno::NoEnt);
    }
}
