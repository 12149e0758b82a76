//! Inode & directory model (§4.C).
//!
//! Same shape as `fs/inode.rs` (`Inode`/`Dinode` lifecycle — name handling,
//! timestamp stamping) and `fs/mod.rs`'s directory helpers, generalised from
//! a fixed-size `Dirent`/`addrs` array to a dynamically-grown children array
//! and linked file-block chain.
//!
//! Every function here takes `region`/`free_head` the same way `alloc.rs`
//! does: borrowed for the duration of one call, nothing retained.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::alloc;
use crate::config::{CHILDREN_INITIAL_CAPACITY, NAME_MAX};
use crate::error::{Errno, FsResult};
use crate::layout::{ChildrenArrayHeader, FileBlockHeader, Inode, InodeKind};
use crate::region::Region;

const INODE_SIZE: u32 = core::mem::size_of::<Inode>() as u32;
const CHILDREN_HEADER_SIZE: u32 = core::mem::size_of::<ChildrenArrayHeader>() as u32;
const FILE_BLOCK_HEADER_SIZE: u32 = core::mem::size_of::<FileBlockHeader>() as u32;

/// Current realtime clock as the on-region `i64` epoch-second representation
/// (§4.C: "set timestamps to the current realtime clock").
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Validates a path component against the §4.C name limit.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name.len() > NAME_MAX {
        return Err(Errno::NameTooLong);
    }
    Ok(())
}

/// Allocates and zero-initialises a fresh inode record, stamping both
/// timestamps with the current clock (§4.C "Creating an inode").
fn new_inode(region: &mut Region, free_head: &mut u32, kind: InodeKind, name: &str) -> FsResult<u32> {
    let offset = alloc::alloc(region, free_head, INODE_SIZE)?;
    let mut inode = Inode::new_zeroed();
    inode.kind = kind as u32;
    inode.set_name(name);
    let stamp = now();
    inode.atime = stamp;
    inode.mtime = stamp;
    region.write(offset, &inode)?;
    Ok(offset)
}

/// Allocates a file inode with an empty (zero-block) body.
pub fn create_file(region: &mut Region, free_head: &mut u32, name: &str) -> FsResult<u32> {
    new_inode(region, free_head, InodeKind::File, name)
}

/// Allocates a directory inode, its children array (capacity `C₀`), and
/// wires slot 0 to `parent_offset` (§3, §4.C). Rolls back the inode
/// allocation if the children array allocation fails.
pub fn create_dir(region: &mut Region, free_head: &mut u32, name: &str, parent_offset: u32) -> FsResult<u32> {
    let inode_offset = new_inode(region, free_head, InodeKind::Dir, name)?;

    let children_bytes = CHILDREN_HEADER_SIZE + CHILDREN_INITIAL_CAPACITY * 4;
    let children_offset = match alloc::alloc(region, free_head, children_bytes) {
        Ok(offset) => offset,
        Err(e) => {
            alloc::free(region, free_head, inode_offset)?;
            return Err(e);
        }
    };
    region.write(children_offset, &ChildrenArrayHeader { capacity: CHILDREN_INITIAL_CAPACITY })?;
    write_slot(region, children_offset, 0, parent_offset)?;

    let mut inode: Inode = region.read(inode_offset)?;
    inode.data = children_offset;
    inode.size = 1; // slot 0 only
    region.write(inode_offset, &inode)?;

    Ok(inode_offset)
}

fn slot_offset(children_offset: u32, index: u32) -> u32 {
    children_offset + CHILDREN_HEADER_SIZE + index * 4
}

fn read_slot(region: &Region, children_offset: u32, index: u32) -> FsResult<u32> {
    region.read(slot_offset(children_offset, index))
}

fn write_slot(region: &mut Region, children_offset: u32, index: u32, value: u32) -> FsResult<()> {
    region.write(slot_offset(children_offset, index), &value)
}

/// Rewrites slot 0 of `dir`'s children array, the parent back-reference
/// (§3 I5). Callers that move a directory to a new parent (`rename`) must
/// call this on the moved directory's own inode so `..` keeps resolving
/// correctly afterwards.
pub fn set_parent(region: &mut Region, dir: &Inode, new_parent_offset: u32) -> FsResult<()> {
    write_slot(region, dir.data, 0, new_parent_offset)
}

/// Returns the offset of the child named `name` in `dir`'s children array,
/// skipping slot 0 (the parent back-reference), per §4.D.
pub fn find_child(region: &Region, dir: &Inode, name: &str) -> FsResult<Option<u32>> {
    let n = dir.size;
    for index in 1..n {
        let child_offset = read_slot(region, dir.data, index)?;
        let child: Inode = region.read(child_offset)?;
        if child.name_str() == name {
            return Ok(Some(child_offset));
        }
    }
    Ok(None)
}

/// Returns every child name except slot 0, in array order (for `readdir`).
pub fn list_children(region: &Region, dir: &Inode) -> FsResult<Vec<String>> {
    let mut names = Vec::with_capacity(dir.size.saturating_sub(1) as usize);
    for index in 1..dir.size {
        let child_offset = read_slot(region, dir.data, index)?;
        let child: Inode = region.read(child_offset)?;
        names.push(child.name_str().to_owned());
    }
    Ok(names)
}

/// Returns every child inode offset except slot 0, in array order. Used by
/// `getattr` to count subdirectories for `nlink` (§4.E, §9 open question b).
pub fn child_offsets(region: &Region, dir: &Inode) -> FsResult<Vec<u32>> {
    let mut offsets = Vec::with_capacity(dir.size.saturating_sub(1) as usize);
    for index in 1..dir.size {
        offsets.push(read_slot(region, dir.data, index)?);
    }
    Ok(offsets)
}

/// Appends `child_offset` to `dir`'s children array, growing capacity by
/// doubling when full (§3, §4.C). On allocator failure the directory's
/// `size` (≡ "`num_children` counter") is left untouched — nothing is
/// written until the slot write is known to succeed.
pub fn append_child(region: &mut Region, free_head: &mut u32, dir_offset: u32, child_offset: u32) -> FsResult<()> {
    let mut dir: Inode = region.read(dir_offset)?;
    let header: ChildrenArrayHeader = region.read(dir.data)?;

    let (children_offset, capacity) = if dir.size < header.capacity {
        (dir.data, header.capacity)
    } else {
        let new_capacity = header.capacity * 2;
        let new_bytes = CHILDREN_HEADER_SIZE + new_capacity * 4;
        let old_bytes = CHILDREN_HEADER_SIZE + header.capacity * 4;
        let new_offset = alloc::realloc(region, free_head, dir.data, old_bytes, new_bytes)?;
        region.write(new_offset, &ChildrenArrayHeader { capacity: new_capacity })?;
        dir.data = new_offset;
        (new_offset, new_capacity)
    };
    debug_assert!(dir.size < capacity);

    write_slot(region, children_offset, dir.size, child_offset)?;
    dir.size += 1;
    dir.mtime = now();
    region.write(dir_offset, &dir)?;
    Ok(())
}

/// Removes the child at `child_offset` from `dir`'s children array by
/// overwriting its slot with the last slot and decrementing `size`
/// (§4.E `unlink`/`rmdir`: "compact ... overwrite the removed slot with the
/// last slot"). Optionally shrinks the array once usage drops to ≤ 1/4
/// capacity, mirroring the geometric growth policy symmetrically.
pub fn remove_child(region: &mut Region, free_head: &mut u32, dir_offset: u32, child_offset: u32) -> FsResult<()> {
    let mut dir: Inode = region.read(dir_offset)?;
    let n = dir.size;

    let mut found = None;
    for index in 1..n {
        if read_slot(region, dir.data, index)? == child_offset {
            found = Some(index);
            break;
        }
    }
    let index = found.ok_or(Errno::NoEnt)?;

    let last_index = n - 1;
    if index != last_index {
        let last_value = read_slot(region, dir.data, last_index)?;
        write_slot(region, dir.data, index, last_value)?;
    }
    dir.size -= 1;
    dir.mtime = now();

    let header: ChildrenArrayHeader = region.read(dir.data)?;
    if header.capacity > CHILDREN_INITIAL_CAPACITY && dir.size.saturating_mul(4) <= header.capacity {
        let new_capacity = (header.capacity / 2).max(CHILDREN_INITIAL_CAPACITY);
        let old_bytes = CHILDREN_HEADER_SIZE + header.capacity * 4;
        let new_bytes = CHILDREN_HEADER_SIZE + new_capacity * 4;
        if let Ok(new_offset) = alloc::realloc(region, free_head, dir.data, old_bytes, new_bytes) {
            region.write(new_offset, &ChildrenArrayHeader { capacity: new_capacity })?;
            dir.data = new_offset;
        }
        // Shrink failure is not fatal: an oversized array is still correct.
    }

    region.write(dir_offset, &dir)?;
    Ok(())
}

/// Frees a directory's (already-empty, slot-0-only) children array, then the
/// directory inode itself.
pub fn destroy_dir(region: &mut Region, free_head: &mut u32, dir_offset: u32) -> FsResult<()> {
    let dir: Inode = region.read(dir_offset)?;
    alloc::free(region, free_head, dir.data)?;
    alloc::free(region, free_head, dir_offset)
}

/// Frees a file's entire block chain, then the file inode itself.
pub fn destroy_file(region: &mut Region, free_head: &mut u32, file_offset: u32) -> FsResult<()> {
    let file: Inode = region.read(file_offset)?;
    free_chain(region, free_head, file.data)?;
    alloc::free(region, free_head, file_offset)
}

fn free_chain(region: &mut Region, free_head: &mut u32, mut block_offset: u32) -> FsResult<()> {
    while block_offset != 0 {
        let block: FileBlockHeader = region.read(block_offset)?;
        alloc::free(region, free_head, block.data)?;
        alloc::free(region, free_head, block_offset)?;
        block_offset = block.next;
    }
    Ok(())
}

/// One step of walking a file's block chain: the block's header plus its
/// own offset, for callers that need to relink `next`.
struct ChainNode {
    offset: u32,
    header: FileBlockHeader,
}

fn walk_chain(region: &Region, head: u32) -> FsResult<Vec<ChainNode>> {
    let mut nodes = Vec::new();
    let mut cur = head;
    while cur != 0 {
        let header: FileBlockHeader = region.read(cur)?;
        let next = header.next;
        nodes.push(ChainNode { offset: cur, header });
        cur = next;
    }
    Ok(nodes)
}

/// Reads up to `count` bytes from `file` starting at `offset`, returning the
/// bytes actually copied (§4.E `read`: "if offset ≥ size, return 0; else
/// copy min(count, size-offset) bytes").
pub fn read_file(region: &Region, file: &Inode, offset: u32, count: u32) -> FsResult<Vec<u8>> {
    if offset >= file.size {
        return Ok(Vec::new());
    }
    let to_read = count.min(file.size - offset) as usize;
    let mut out = Vec::with_capacity(to_read);

    let nodes = walk_chain(region, file.data)?;
    let mut skip = offset as usize;
    for node in &nodes {
        if out.len() == to_read {
            break;
        }
        let available = node.header.allocated as usize;
        if skip >= available {
            skip -= available;
            continue;
        }
        let start = skip;
        let want = (to_read - out.len()).min(available - start);
        let bytes = region.slice(node.header.data, available)?;
        out.extend_from_slice(&bytes[start..start + want]);
        skip = 0;
    }
    Ok(out)
}

/// Ensures `file`'s block chain has at least `target_size` bytes of
/// allocated capacity, filling the current tail's spare capacity first and
/// only then appending new ≤ block-size blocks (§4.C "Grow path"). New
/// bytes beyond the previous `allocated` watermark of each touched block are
/// zero-filled, satisfying both `truncate`'s zero-fill grow and `write`'s
/// implicit-hole zero-fill.
///
/// On any allocation failure, every block allocated *during this call* is
/// freed and the inode is left exactly as it was — no partial growth is
/// ever observable (§4.C, §7).
fn grow_chain(region: &mut Region, free_head: &mut u32, file_offset: u32, target_size: u32) -> FsResult<()> {
    use crate::config::BLOCK_SIZE;

    let mut file: Inode = region.read(file_offset)?;
    let mut nodes = walk_chain(region, file.data)?;

    let current_capacity: u32 = nodes.iter().map(|n| n.header.capacity).sum();
    if target_size <= current_capacity {
        // Enough capacity already exists; only `allocated` watermarks need
        // to move, handled by the caller via `bump_allocated`.
        bump_allocated(region, &nodes, target_size)?;
        return Ok(());
    }

    let mut needed = target_size - current_capacity;
    let mut new_block_offsets: Vec<u32> = Vec::new();
    let mut new_data_offsets: Vec<u32> = Vec::new();

    let grow_result = (|| -> FsResult<()> {
        while needed > 0 {
            let capacity = needed.min(BLOCK_SIZE as u32);
            let data_offset = alloc::alloc(region, free_head, capacity)?;
            new_data_offsets.push(data_offset);
            let block_offset = alloc::alloc(region, free_head, FILE_BLOCK_HEADER_SIZE)?;
            new_block_offsets.push(block_offset);
            region.write(
                block_offset,
                &FileBlockHeader { capacity, allocated: 0, next: 0, data: data_offset },
            )?;
            needed -= capacity;
        }
        Ok(())
    })();

    if let Err(e) = grow_result {
        for &offset in &new_block_offsets {
            let _ = alloc::free(region, free_head, offset);
        }
        for &offset in &new_data_offsets {
            let _ = alloc::free(region, free_head, offset);
        }
        return Err(e);
    }

    // Commit: link the new blocks onto the chain's tail.
    if let Some(last) = nodes.last() {
        let mut tail: FileBlockHeader = region.read(last.offset)?;
        tail.next = new_block_offsets.first().copied().unwrap_or(0);
        region.write(last.offset, &tail)?;
    } else {
        file.data = new_block_offsets.first().copied().unwrap_or(0);
    }
    for window in new_block_offsets.windows(2) {
        let mut hdr: FileBlockHeader = region.read(window[0])?;
        hdr.next = window[1];
        region.write(window[0], &hdr)?;
    }
    region.write(file_offset, &file)?;

    // Re-walk (now including the newly linked blocks) to set watermarks.
    nodes = walk_chain(region, file.data)?;
    bump_allocated(region, &nodes, target_size)
}

/// Raises each block's `allocated` watermark up to `target_size` in chain
/// order, zero-filling the newly-exposed bytes (holes, per §4.E `write`, and
/// `truncate`'s explicit zero-fill grow).
fn bump_allocated(region: &mut Region, nodes: &[ChainNode], target_size: u32) -> FsResult<()> {
    let mut remaining = target_size;
    for node in nodes {
        let want = remaining.min(node.header.capacity);
        if want > node.header.allocated {
            let zero_from = node.header.allocated as usize;
            let zero_to = want as usize;
            region.slice_mut(node.header.data, node.header.capacity as usize)?[zero_from..zero_to]
                .fill(0);
            let mut hdr: FileBlockHeader = region.read(node.offset)?;
            hdr.allocated = want;
            region.write(node.offset, &hdr)?;
        }
        remaining = remaining.saturating_sub(node.header.capacity);
    }
    Ok(())
}

/// Writes `data` into `file` at `offset`, implicitly zero-filling any hole
/// between the previous end-of-file and `offset`, and growing the chain as
/// needed (§4.E `write`).
pub fn write_file(
    region: &mut Region,
    free_head: &mut u32,
    file_offset: u32,
    offset: u32,
    data: &[u8],
) -> FsResult<u32> {
    let target_size = offset.checked_add(data.len() as u32).ok_or(Errno::Invalid)?;
    let mut file: Inode = region.read(file_offset)?;

    if target_size > file.size {
        grow_chain(region, free_head, file_offset, target_size)?;
    }

    if !data.is_empty() {
        let nodes = walk_chain(region, file.data)?;
        let mut pos = offset as usize;
        let mut src = data;
        for node in &nodes {
            if src.is_empty() {
                break;
            }
            let capacity = node.header.capacity as usize;
            if pos >= capacity {
                pos -= capacity;
                continue;
            }
            let want = src.len().min(capacity - pos);
            region.slice_mut(node.header.data, capacity)?[pos..pos + want].copy_from_slice(&src[..want]);
            src = &src[want..];
            pos = 0;
        }
    }

    file.size = file.size.max(target_size);
    file.mtime = now();
    region.write(file_offset, &file)?;
    Ok(data.len() as u32)
}

/// Implements `truncate`'s shrink and grow paths (§4.C, §4.E). The shrink
/// path always frees the unused suffix of the chain ("optionally free" is
/// resolved here as "always free" — see the design ledger).
pub fn truncate_file(region: &mut Region, free_head: &mut u32, file_offset: u32, new_size: u32) -> FsResult<()> {
    let mut file: Inode = region.read(file_offset)?;

    if new_size == file.size {
        file.atime = now();
        region.write(file_offset, &file)?;
        return Ok(());
    }

    if new_size > file.size {
        grow_chain(region, free_head, file_offset, new_size)?;
        file = region.read(file_offset)?;
        file.size = new_size;
        file.mtime = now();
        region.write(file_offset, &file)?;
        return Ok(());
    }

    // Shrink: walk to the block containing the new logical end, truncate its
    // `allocated`, free the unused suffix of its data area and every
    // following block in chain order.
    let nodes = walk_chain(region, file.data)?;
    let mut remaining = new_size;
    let mut keep_until: Option<usize> = None;
    for (i, node) in nodes.iter().enumerate() {
        if remaining <= node.header.capacity {
            keep_until = Some(i);
            break;
        }
        remaining -= node.header.capacity;
    }

    match keep_until {
        None => {
            // new_size == 0 and there were no blocks, or it exactly spans
            // every block: nothing to keep.
        }
        Some(i) => {
            let kept = &nodes[i];
            let mut hdr: FileBlockHeader = region.read(kept.offset)?;
            let old_allocated = hdr.allocated;
            hdr.allocated = remaining;
            if remaining < old_allocated {
                let old_capacity = hdr.capacity;
                let new_data = alloc::realloc(region, free_head, hdr.data, old_capacity, remaining)?;
                hdr.data = new_data;
                hdr.capacity = remaining;
            }
            hdr.next = 0;
            region.write(kept.offset, &hdr)?;

            for node in &nodes[i + 1..] {
                alloc::free(region, free_head, node.header.data)?;
                alloc::free(region, free_head, node.offset)?;
            }
        }
    }

    if new_size == 0 {
        for node in &nodes {
            alloc::free(region, free_head, node.header.data)?;
            alloc::free(region, free_head, node.offset)?;
        }
        file.data = 0;
    }

    file.size = new_size;
    file.mtime = now();
    region.write(file_offset, &file)?;
    Ok(())
}
