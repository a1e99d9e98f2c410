//! Shared split/merge/overlap machinery used by more than one public
//! operation on [`crate::AddressSpace`].
//!
//! These are free functions rather than methods so each can borrow exactly
//! the index (or pair of indexes) it needs, independent of the rest of
//! `AddressSpace`.

use alloc::vec::Vec;

use vma_tree::{NodeId, Tree};

use crate::error::MmError;
use crate::info::Info;

/// Reserve up to two boundary-split nodes in `tree`, rolling back cleanly if
/// the second reservation fails after the first succeeded.
///
/// Mirrors the pre-allocate-then-commit discipline every split in this crate
/// follows: callers must secure all storage a mutation could need before
/// touching the tree, so a failure partway through never leaves it
/// half-mutated.
pub(crate) fn reserve_boundary<I: Clone>(
    tree: &mut Tree<I>,
    needs_before: bool,
    needs_after: bool,
) -> Result<(Option<NodeId>, Option<NodeId>), MmError> {
    let before = needs_before.then(|| tree.reserve()).transpose()?;
    let after = match needs_after.then(|| tree.reserve()) {
        Some(Ok(id)) => Some(id),
        Some(Err(err)) => {
            if let Some(b) = before {
                tree.release(b);
            }
            return Err(err.into());
        }
        None => None,
    };
    Ok((before, after))
}

/// Insert `[start, start+len)` into `free`, reusing `id`'s storage, and
/// coalesce with an adjacent predecessor and/or successor range if present.
///
/// Reuses at most one of the participating nodes' storage for the merged
/// range and releases the rest, matching the source's single-survivor
/// coalesce trick.
pub(crate) fn insert_merge_free(free: &mut Tree<()>, id: NodeId, start: u64, len: u64) {
    let before = free.search_end(start);
    let after = free.search_addr(start + len);

    match (before, after) {
        (Some(before_id), Some(after_id)) => {
            let before_start = free.start(before_id);
            let before_len = free.len_of(before_id);
            let after_start = free.start(after_id);
            let after_len = free.len_of(after_id);
            let slot = free
                .remove(before_start)
                .expect("predecessor located by search_end must still be present");
            let spare = free
                .remove(after_start)
                .expect("successor located by search_addr must still be present");
            free.release(spare);
            free.release(id);
            free.put(slot, before_start, before_len + len + after_len, ())
                .expect("merged free range key cannot already be present");
        }
        (Some(before_id), None) => {
            let before_start = free.start(before_id);
            let before_len = free.len_of(before_id);
            let slot = free
                .remove(before_start)
                .expect("predecessor located by search_end must still be present");
            free.release(id);
            free.put(slot, before_start, before_len + len, ())
                .expect("merged free range key cannot already be present");
        }
        (None, Some(after_id)) => {
            let after_start = free.start(after_id);
            let after_len = free.len_of(after_id);
            let slot = free
                .remove(after_start)
                .expect("successor located by search_addr must still be present");
            free.release(id);
            free.put(slot, start, len + after_len, ())
                .expect("merged free range key cannot already be present");
        }
        (None, None) => {
            free.put(id, start, len, ())
                .expect("fresh free range key cannot already be present");
        }
    }
}

/// Rewrite the `info` of every node in `tree` overlapping
/// `[addr_pg, addr_pg+len_pg)`, splitting at most the first and last
/// overlapping node where the request doesn't land on an existing boundary.
///
/// Used both by `protect`'s multi-region branch (which only ever changes
/// `prot`) and `map_at`'s overwrite branch (which replaces the whole `Info`),
/// distinguished by `make_info`.
pub(crate) fn rewrite_in_place(
    tree: &mut Tree<Info>,
    addr_pg: u64,
    len_pg: u64,
    mut make_info: impl FnMut(&Info) -> Info,
    mut on_rewrite: impl FnMut(u64, u64, Info),
) -> Result<(), MmError> {
    let overlaps = tree.collect_overlaps(addr_pg, len_pg)?;
    if overlaps.is_empty() {
        return Ok(());
    }

    let needs_before = overlaps.first().is_some_and(|ov| ov.start < addr_pg);
    let needs_after = overlaps
        .last()
        .is_some_and(|ov| ov.start + ov.len > addr_pg + len_pg);
    let (before, after) = reserve_boundary(tree, needs_before, needs_after)?;

    for ov in &overlaps {
        let lo = ov.start.max(addr_pg);
        let hi = (ov.start + ov.len).min(addr_pg + len_pg);
        let removed = tree
            .remove(ov.start)
            .expect("snapshot start must still be present");

        if ov.start < addr_pg {
            let b = before.expect("left-straddling node was pre-reserved");
            tree.put(b, ov.start, addr_pg - ov.start, ov.info)
                .expect("leading remainder key cannot already be present");
        }
        if ov.start + ov.len > addr_pg + len_pg {
            let a = after.expect("right-straddling node was pre-reserved");
            tree.put(a, addr_pg + len_pg, (ov.start + ov.len) - (addr_pg + len_pg), ov.info)
                .expect("trailing remainder key cannot already be present");
        }

        let new_info = make_info(&ov.info);
        tree.put(removed, lo, hi - lo, new_info)
            .expect("rewritten range key cannot already be present");
        on_rewrite(lo, hi, new_info);
    }
    Ok(())
}

/// Move every node in `alloc` overlapping `[addr_pg, addr_pg+len_pg)` into
/// `free`, splitting the first/last overlapping node as needed and
/// coalescing each arrival.
///
/// `alloc` and `free` are separately-typed arenas (`Info` vs. `()` payloads),
/// so unlike [`rewrite_in_place`] a node's storage cannot be transplanted
/// directly: each migrated range gets a freshly reserved slot in `free` and
/// the vacated `alloc` slot is released back to `alloc`'s free list.
pub(crate) fn move_to_free(
    alloc: &mut Tree<Info>,
    free: &mut Tree<()>,
    addr_pg: u64,
    len_pg: u64,
    mut on_move: impl FnMut(u64, u64, Info),
) -> Result<(), MmError> {
    let overlaps = alloc.collect_overlaps(addr_pg, len_pg)?;
    if overlaps.is_empty() {
        return Ok(());
    }

    let needs_before = overlaps.first().is_some_and(|ov| ov.start < addr_pg);
    let needs_after = overlaps
        .last()
        .is_some_and(|ov| ov.start + ov.len > addr_pg + len_pg);
    let (before, after) = reserve_boundary(alloc, needs_before, needs_after)?;

    let mut dest: Vec<NodeId> = Vec::new();
    if dest.try_reserve_exact(overlaps.len()).is_err() {
        release_boundary(alloc, before, after);
        return Err(MmError::NoMemory);
    }
    for _ in &overlaps {
        match free.reserve() {
            Ok(id) => dest.push(id),
            Err(err) => {
                for id in dest {
                    free.release(id);
                }
                release_boundary(alloc, before, after);
                return Err(err.into());
            }
        }
    }

    for (ov, dest_id) in overlaps.iter().zip(dest) {
        let lo = ov.start.max(addr_pg);
        let hi = (ov.start + ov.len).min(addr_pg + len_pg);
        let removed = alloc
            .remove(ov.start)
            .expect("snapshot start must still be present");

        if ov.start < addr_pg {
            let b = before.expect("left-straddling node was pre-reserved");
            alloc
                .put(b, ov.start, addr_pg - ov.start, ov.info)
                .expect("leading remainder key cannot already be present");
        }
        if ov.start + ov.len > addr_pg + len_pg {
            let a = after.expect("right-straddling node was pre-reserved");
            alloc
                .put(a, addr_pg + len_pg, (ov.start + ov.len) - (addr_pg + len_pg), ov.info)
                .expect("trailing remainder key cannot already be present");
        }

        alloc.release(removed);
        insert_merge_free(free, dest_id, lo, hi - lo);
        on_move(lo, hi, ov.info);
    }
    Ok(())
}

fn release_boundary<I: Clone>(tree: &mut Tree<I>, before: Option<NodeId>, after: Option<NodeId>) {
    if let Some(b) = before {
        tree.release(b);
    }
    if let Some(a) = after {
        tree.release(a);
    }
}
