//! Free-space allocator (§4.B).
//!
//! A block header of [`FreeBlockHeader`]'s shape precedes every block this
//! allocator ever hands out, free or allocated — while free, its `next`
//! field chains the sorted list; while allocated, `size` still records the
//! block's payload capacity (the caller only ever touches the bytes *after*
//! its header) so that a later `free()` can reconstruct a valid free node
//! without any side table. This is the same "header glued to the front of
//! the block it describes" shape as `kalloc.rs::Run` (an intrusive
//! singly-linked free list stored *inside* the freed memory itself)
//! generalised from whole pages to arbitrary byte spans, and from
//! "most-recently-freed-first" to "sorted by offset, best-fit".
//!
//! All public functions operate on `*free_head`, the superblock's
//! `free_head` field, passed by the caller (`mount`/`ops`) so that exactly
//! one `Superblock` read/write bookends each entry point per §5.

use log::trace;

use crate::error::{Errno, FsResult};
use crate::layout::FreeBlockHeader;
use crate::region::Region;

/// Size of the header glued to the front of every block (free or allocated).
pub const HEADER_SIZE: u32 = core::mem::size_of::<FreeBlockHeader>() as u32;

#[inline]
fn header_offset_of(payload_offset: u32) -> FsResult<u32> {
    payload_offset.checked_sub(HEADER_SIZE).ok_or(Errno::Fault)
}

#[inline]
fn payload_offset_of(header_offset: u32) -> u32 {
    header_offset + HEADER_SIZE
}

/// Lays out the single free block spanning `[start, region_size)` that a
/// fresh (never-before-mounted) region bootstraps with.
pub fn bootstrap(region: &mut Region, free_head: &mut u32, start: u32, region_size: u32) -> FsResult<()> {
    let total = region_size.checked_sub(start).ok_or(Errno::Fault)?;
    let size = total.checked_sub(HEADER_SIZE).ok_or(Errno::NoSpace)?;
    region.write(start, &FreeBlockHeader { size, next: 0 })?;
    *free_head = start;
    Ok(())
}

/// Unlinks the free node at `node` (whose predecessor in the list is
/// `prev`, and whose successor is `node_next`) from the list.
fn unlink(region: &mut Region, free_head: &mut u32, prev: Option<u32>, node_next: u32) -> FsResult<()> {
    match prev {
        None => *free_head = node_next,
        Some(p) => {
            let mut phdr: FreeBlockHeader = region.read(p)?;
            phdr.next = node_next;
            region.write(p, &phdr)?;
        }
    }
    Ok(())
}

/// Inserts the (already-header-written) free node at `node` into the
/// sorted list, returning its new list-neighbours.
fn list_insert(region: &mut Region, free_head: &mut u32, node: u32) -> FsResult<(Option<u32>, Option<u32>)> {
    let mut prev: Option<u32> = None;
    let mut cur = *free_head;
    while cur != 0 && cur < node {
        prev = Some(cur);
        let hdr: FreeBlockHeader = region.read(cur)?;
        cur = hdr.next;
    }
    let next = (cur != 0).then_some(cur);

    let mut node_hdr: FreeBlockHeader = region.read(node)?;
    node_hdr.next = cur;
    region.write(node, &node_hdr)?;

    match prev {
        None => *free_head = node,
        Some(p) => {
            let mut phdr: FreeBlockHeader = region.read(p)?;
            phdr.next = node;
            region.write(p, &phdr)?;
        }
    }
    Ok((prev, next))
}

/// Merges `node` with its immediate list-neighbours if they are physically
/// contiguous (I3: the free list carries no two adjacent free blocks).
fn coalesce(region: &mut Region, free_head: &mut u32, node: u32, prev: Option<u32>, next: Option<u32>) -> FsResult<()> {
    let mut node_hdr: FreeBlockHeader = region.read(node)?;

    if let Some(next_off) = next {
        if node + HEADER_SIZE + node_hdr.size == next_off {
            let next_hdr: FreeBlockHeader = region.read(next_off)?;
            node_hdr.size += HEADER_SIZE + next_hdr.size;
            node_hdr.next = next_hdr.next;
            region.write(node, &node_hdr)?;
            trace!("coalesce {node} with following block {next_off}");
        }
    }

    if let Some(prev_off) = prev {
        let mut prev_hdr: FreeBlockHeader = region.read(prev_off)?;
        if prev_off + HEADER_SIZE + prev_hdr.size == node {
            prev_hdr.size += HEADER_SIZE + node_hdr.size;
            prev_hdr.next = node_hdr.next;
            region.write(prev_off, &prev_hdr)?;
            trace!("coalesce {prev_off} with preceding-merge block {node}");
        }
    }
    Ok(())
}

fn insert_and_coalesce(region: &mut Region, free_head: &mut u32, node: u32) -> FsResult<()> {
    let (prev, next) = list_insert(region, free_head, node)?;
    coalesce(region, free_head, node, prev, next)
}

/// Returns the offset of a freshly usable payload region of at least `size`
/// bytes, or [`Errno::NoSpace`] if no single free block is large enough.
pub fn alloc(region: &mut Region, free_head: &mut u32, size: u32) -> FsResult<u32> {
    let needed = size.max(HEADER_SIZE);

    let mut best: Option<(u32, u32, Option<u32>)> = None;
    let mut prev: Option<u32> = None;
    let mut cur = *free_head;
    while cur != 0 {
        let hdr: FreeBlockHeader = region.read(cur)?;
        if hdr.size >= needed {
            let better = best.map(|(_, best_size, _)| hdr.size < best_size).unwrap_or(true);
            if better {
                best = Some((cur, hdr.size, prev));
            }
        }
        prev = Some(cur);
        cur = hdr.next;
    }
    let (chosen, chosen_size, chosen_prev) = best.ok_or(Errno::NoSpace)?;

    let chosen_hdr: FreeBlockHeader = region.read(chosen)?;
    unlink(region, free_head, chosen_prev, chosen_hdr.next)?;

    let remainder = chosen_size - needed;
    if remainder < HEADER_SIZE + 1 {
        trace!("alloc {needed}: whole block {chosen} consumed ({chosen_size} payload, {remainder} left over)");
        // Whole block consumed; internal fragmentation folds into this
        // allocation's recorded capacity (it stays `chosen_size`, not
        // `needed`, so a later `free()` gives back everything).
        Ok(payload_offset_of(chosen))
    } else {
        region.write(chosen, &FreeBlockHeader { size: needed, next: 0 })?;
        let tail_offset = chosen + HEADER_SIZE + needed;
        region.write(tail_offset, &FreeBlockHeader { size: remainder - HEADER_SIZE, next: 0 })?;
        insert_and_coalesce(region, free_head, tail_offset)?;
        trace!("alloc {needed}: split block {chosen}, {} byte tail at {tail_offset}", remainder - HEADER_SIZE);
        Ok(payload_offset_of(chosen))
    }
}

/// Returns the block whose payload begins at `offset` to the free list,
/// eagerly merging with contiguous neighbours.
pub fn free(region: &mut Region, free_head: &mut u32, offset: u32) -> FsResult<()> {
    let header_offset = header_offset_of(offset)?;
    insert_and_coalesce(region, free_head, header_offset)
}

/// The size of the largest single free block, in payload bytes.
pub fn max_free_chunk(region: &Region, free_head: u32) -> FsResult<u32> {
    let mut max = 0u32;
    let mut cur = free_head;
    while cur != 0 {
        let hdr: FreeBlockHeader = region.read(cur)?;
        max = max.max(hdr.size);
        cur = hdr.next;
    }
    Ok(max)
}

/// The sum of every free block's payload size, for `statfs` (P5).
pub fn total_free(region: &Region, free_head: u32) -> FsResult<u64> {
    let mut total = 0u64;
    let mut cur = free_head;
    while cur != 0 {
        let hdr: FreeBlockHeader = region.read(cur)?;
        total += hdr.size as u64;
        cur = hdr.next;
    }
    Ok(total)
}

/// Attempts to grow the allocation whose header sits at `alloc_header_offset`
/// (currently `alloc_current_size` payload bytes) by `additional_needed`
/// bytes, by absorbing the free block immediately following it in memory —
/// the "preferred neighbour" in §4.B's realloc contract. Returns `true` iff
/// the growth happened in place (the allocation's offset never changes).
pub fn extend_into_neighbour(
    region: &mut Region,
    free_head: &mut u32,
    alloc_header_offset: u32,
    alloc_current_size: u32,
    additional_needed: u32,
) -> FsResult<bool> {
    let neighbour_offset = alloc_header_offset + HEADER_SIZE + alloc_current_size;

    let mut prev: Option<u32> = None;
    let mut cur = *free_head;
    let mut found: Option<FreeBlockHeader> = None;
    while cur != 0 {
        let hdr: FreeBlockHeader = region.read(cur)?;
        if cur == neighbour_offset {
            found = Some(hdr);
            break;
        }
        prev = Some(cur);
        cur = hdr.next;
    }
    let Some(neigh_hdr) = found else {
        return Ok(false);
    };
    if neigh_hdr.size < additional_needed {
        return Ok(false);
    }

    unlink(region, free_head, prev, neigh_hdr.next)?;

    let leftover = neigh_hdr.size - additional_needed;
    let mut new_size = alloc_current_size + additional_needed;
    if leftover >= HEADER_SIZE + 1 {
        let tail_offset = neighbour_offset + HEADER_SIZE + additional_needed;
        region.write(tail_offset, &FreeBlockHeader { size: leftover - HEADER_SIZE, next: 0 })?;
        insert_and_coalesce(region, free_head, tail_offset)?;
    } else {
        new_size += leftover;
    }
    region.write(alloc_header_offset, &FreeBlockHeader { size: new_size, next: 0 })?;
    Ok(true)
}

/// Resizes the allocation at `offset` (currently `old_size` payload bytes)
/// to `new_size`, preferring in-place growth via [`extend_into_neighbour`]
/// and falling back to allocate-copy-free.
pub fn realloc(
    region: &mut Region,
    free_head: &mut u32,
    offset: u32,
    old_size: u32,
    new_size: u32,
) -> FsResult<u32> {
    let header_offset = header_offset_of(offset)?;

    if new_size <= old_size {
        let shrink = old_size - new_size;
        if shrink < HEADER_SIZE + 1 {
            return Ok(offset);
        }
        region.write(header_offset, &FreeBlockHeader { size: new_size, next: 0 })?;
        let tail_offset = header_offset + HEADER_SIZE + new_size;
        region.write(tail_offset, &FreeBlockHeader { size: shrink - HEADER_SIZE, next: 0 })?;
        insert_and_coalesce(region, free_head, tail_offset)?;
        return Ok(offset);
    }

    let additional = new_size - old_size;
    if extend_into_neighbour(region, free_head, header_offset, old_size, additional)? {
        return Ok(offset);
    }

    let new_offset = alloc(region, free_head, new_size)?;
    {
        let (src_start, dst_start) = (offset, new_offset);
        let copy_len = old_size.min(new_size) as usize;
        let mut buf = vec![0u8; copy_len];
        buf.copy_from_slice(region.slice(src_start, copy_len)?);
        region.slice_mut(dst_start, copy_len)?.copy_from_slice(&buf);
    }
    free(region, free_head, offset)?;
    Ok(new_offset)
}
