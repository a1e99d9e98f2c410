//! The two-tree address-space table: `free` and `alloc` indexes kept in
//! lock-step so their union always covers the window exactly once.

use log::{trace, warn};
use vma_tree::Tree;

use crate::error::MmError;
use crate::info::Info;
use crate::ops::{insert_merge_free, move_to_free, reserve_boundary, rewrite_in_place};
use crate::window::Window;

/// A no-op callback for the non-`_cb` entry points.
fn ignore(_start_bytes: u64, _len_bytes: u64, _info: Info) {}

/// In-process bookkeeper for a single virtual address-space window.
///
/// Tracks which page-aligned ranges of `[base, base+len)` are mapped, their
/// protection/flags/backing metadata, and supports allocate-anywhere,
/// map-at, unmap, protect and query. Performs no real I/O and touches no
/// page tables; callers consult this before invoking the host's actual
/// mapping primitive.
///
/// `free` and `alloc` always partition the window exactly: every page is in
/// exactly one of the two indexes (the *Cover* and *Disjoint* invariants).
/// `free` additionally never holds two adjacent ranges (the *Normalised
/// free* invariant) — every insertion into it is followed by a coalesce
/// pass.
pub struct AddressSpace {
    window: Window,
    free: Tree<()>,
    alloc: Tree<Info>,
}

impl AddressSpace {
    /// Initialize a bookkeeper over `[base_bytes, base_bytes+len_bytes)`,
    /// divided into `pagesize`-byte pages. The entire window starts free.
    ///
    /// # Errors
    /// Returns [`MmError::Invalid`] if `pagesize` is zero or not a power of
    /// two, or if `len_bytes` rounds down to zero pages. Returns
    /// [`MmError::NoMemory`] if the initial free-range node cannot be
    /// allocated.
    pub fn new(base_bytes: u64, len_bytes: u64, pagesize: u64) -> Result<Self, MmError> {
        Self::with_node_budget(base_bytes, len_bytes, pagesize, None)
    }

    /// Initialize a bookkeeper whose `free` and `alloc` node arenas never
    /// grow past `node_budget` slots each.
    ///
    /// Exists so that the pre-allocate-then-commit discipline (`spec.md` R3)
    /// can be exercised deterministically in tests: once `node_budget` nodes
    /// have been handed out to one of the two indexes, further mutations that
    /// would need another node fail with [`MmError::NoMemory`] instead of
    /// depending on the global allocator's mood, and the address space is
    /// guaranteed to be left byte-for-byte unchanged.
    ///
    /// # Errors
    /// Same as [`Self::new`].
    pub fn with_node_budget(
        base_bytes: u64,
        len_bytes: u64,
        pagesize: u64,
        node_budget: Option<usize>,
    ) -> Result<Self, MmError> {
        if pagesize == 0 || !pagesize.is_power_of_two() {
            warn!("address space init: pagesize {pagesize} is not a power of two");
            return Err(MmError::Invalid);
        }
        let log2_pagesize = pagesize.trailing_zeros();
        let base_pg = base_bytes >> log2_pagesize;
        let len_pg = len_bytes >> log2_pagesize;
        if len_pg == 0 {
            warn!("address space init: {len_bytes} bytes rounds down to zero pages");
            return Err(MmError::Invalid);
        }
        let window = Window {
            base_pg,
            len_pg,
            log2_pagesize,
        };

        let mut free = node_budget.map_or_else(Tree::new, Tree::with_capacity_limit);
        let node = free.reserve()?;
        free.put(node, base_pg, len_pg, ())
            .expect("a freshly created tree cannot already hold this start");

        trace!(
            "address space initialized: [{base_pg}, {}) pages, log2 pagesize {log2_pagesize}",
            base_pg + len_pg
        );

        Ok(Self {
            window,
            free,
            alloc: node_budget.map_or_else(Tree::new, Tree::with_capacity_limit),
        })
    }

    /// Create a mapping of `len_bytes`, letting the bookkeeper choose the
    /// location among free holes.
    ///
    /// # Errors
    /// Returns [`MmError::Invalid`] if `len_bytes` rounds down to zero
    /// pages, [`MmError::NoMemory`] if no free hole fits or node storage
    /// cannot be allocated.
    pub fn map_anywhere(
        &mut self,
        len_bytes: u64,
        prot: i32,
        flags: i32,
        fd: i32,
        offset: i64,
    ) -> Result<u64, MmError> {
        let len_pg = self.window.ceil_pages(len_bytes);
        if len_pg == 0 {
            return Err(MmError::Invalid);
        }

        let Some(hole) = self.free.search_size(len_pg) else {
            warn!("map_anywhere: no free hole fits {len_pg} pages");
            return Err(MmError::NoMemory);
        };
        let hole_start = self.free.start(hole);
        let hole_len = self.free.len_of(hole);

        let alloc_node = self.alloc.reserve()?;

        let removed = self
            .free
            .remove(hole_start)
            .expect("search_size result must still be present");
        if hole_len > len_pg {
            self.free
                .put(removed, hole_start + len_pg, hole_len - len_pg, ())
                .expect("remainder key cannot already be present");
        } else {
            self.free.release(removed);
        }

        let info = Info {
            mapping_base: hole_start << self.window.log2_pagesize,
            mapping_len: len_pg << self.window.log2_pagesize,
            prot,
            flags,
            fd,
            offset,
        };
        self.alloc
            .put(alloc_node, hole_start, len_pg, info)
            .expect("fresh allocation cannot collide with an existing start");

        trace!("map_anywhere: mapped {len_pg} pages at {hole_start}");
        Ok(hole_start << self.window.log2_pagesize)
    }

    /// Create a mapping at exactly `addr_bytes`, without notification.
    ///
    /// # Errors
    /// See [`Self::map_at_cb`].
    pub fn map_at(
        &mut self,
        addr_bytes: u64,
        len_bytes: u64,
        prot: i32,
        flags: i32,
        fd: i32,
        offset: i64,
    ) -> Result<u64, MmError> {
        self.map_at_cb(addr_bytes, len_bytes, prot, flags, fd, offset, &mut ignore)
    }

    /// Create a mapping at exactly `addr_bytes`.
    ///
    /// The requested range must lie entirely inside one free region, or
    /// entirely inside existing allocated coverage (possibly spanning
    /// several allocated ranges), in which case every overlapping region's
    /// `info` is rewritten to the new mapping's and `cb` fires once per
    /// affected sub-range. A range straddling both free and allocated
    /// territory is rejected.
    ///
    /// # Errors
    /// Returns [`MmError::Invalid`] if `addr_bytes` is misaligned,
    /// `len_bytes` rounds down to zero pages, the range falls outside the
    /// window, or it straddles free and allocated territory.
    /// Returns [`MmError::NoMemory`] if node storage cannot be allocated.
    pub fn map_at_cb(
        &mut self,
        addr_bytes: u64,
        len_bytes: u64,
        prot: i32,
        flags: i32,
        fd: i32,
        offset: i64,
        cb: &mut dyn FnMut(u64, u64, Info),
    ) -> Result<u64, MmError> {
        if !self.window.is_page_aligned(addr_bytes) {
            return Err(MmError::Invalid);
        }
        let addr_pg = self.window.trunc_page(addr_bytes);
        let len_pg = self.window.ceil_pages(len_bytes);
        if len_pg == 0 || !self.window.contains(addr_pg, len_pg) {
            return Err(MmError::Invalid);
        }
        let log2_pagesize = self.window.log2_pagesize;

        let info = Info {
            mapping_base: addr_pg << log2_pagesize,
            mapping_len: len_pg << log2_pagesize,
            prot,
            flags,
            fd,
            offset,
        };

        if let Some(hole) = self.free.search_contains(addr_pg, len_pg) {
            let hole_start = self.free.start(hole);
            let hole_len = self.free.len_of(hole);
            let needs_before = hole_start < addr_pg;
            let needs_after = hole_start + hole_len > addr_pg + len_pg;

            let (before, after) = reserve_boundary(&mut self.free, needs_before, needs_after)?;
            let alloc_node = match self.alloc.reserve() {
                Ok(id) => id,
                Err(err) => {
                    if let Some(b) = before {
                        self.free.release(b);
                    }
                    if let Some(a) = after {
                        self.free.release(a);
                    }
                    return Err(err.into());
                }
            };

            let removed = self
                .free
                .remove(hole_start)
                .expect("search_contains result must still be present");
            if needs_before {
                let b = before.expect("left-straddling hole was pre-reserved");
                self.free
                    .put(b, hole_start, addr_pg - hole_start, ())
                    .expect("leading remainder key cannot already be present");
            }
            if needs_after {
                let a = after.expect("right-straddling hole was pre-reserved");
                self.free
                    .put(a, addr_pg + len_pg, (hole_start + hole_len) - (addr_pg + len_pg), ())
                    .expect("trailing remainder key cannot already be present");
            }
            self.alloc
                .put(alloc_node, addr_pg, len_pg, info)
                .expect("fresh allocation cannot collide with an existing start");

            trace!("map_at: mapped {len_pg} pages at {addr_pg} into free territory");
            cb(addr_pg << log2_pagesize, len_pg << log2_pagesize, info);
            return Ok(addr_pg << log2_pagesize);
        }

        if self.free.count_overlaps(addr_pg, len_pg) > 0 {
            warn!("map_at: requested range straddles free and allocated territory");
            return Err(MmError::Invalid);
        }
        if self.alloc.count_overlaps(addr_pg, len_pg) == 0 {
            warn!("map_at: requested range is not covered by this window");
            return Err(MmError::Invalid);
        }

        rewrite_in_place(&mut self.alloc, addr_pg, len_pg, |_old| info, |lo, hi, new_info| {
            cb(lo << log2_pagesize, hi << log2_pagesize, new_info);
        })?;
        trace!("map_at: overwrote {len_pg} allocated pages at {addr_pg}");
        Ok(addr_pg << log2_pagesize)
    }

    /// Release pages back to the free set, without notification.
    ///
    /// # Errors
    /// See [`Self::unmap_cb`].
    pub fn unmap(&mut self, addr_bytes: u64, len_bytes: u64) -> Result<(), MmError> {
        self.unmap_cb(addr_bytes, len_bytes, &mut ignore)
    }

    /// Release pages back to the free set, merging with neighbouring free
    /// ranges.
    ///
    /// The requested range may touch zero, one, or many allocated regions,
    /// and may include pages that are already free — those are skipped
    /// silently. `cb` fires once per unmapped sub-range, carrying the `info`
    /// that was associated with it.
    ///
    /// # Errors
    /// Returns [`MmError::Invalid`] if `addr_bytes` is misaligned,
    /// `len_bytes` is zero, or the range falls outside the window. Returns
    /// [`MmError::NotFound`] if the range contains no allocated page at all.
    /// Returns [`MmError::NoMemory`] if node storage cannot be allocated.
    pub fn unmap_cb(
        &mut self,
        addr_bytes: u64,
        len_bytes: u64,
        cb: &mut dyn FnMut(u64, u64, Info),
    ) -> Result<(), MmError> {
        if !self.window.is_page_aligned(addr_bytes) || len_bytes == 0 {
            return Err(MmError::Invalid);
        }
        let addr_pg = self.window.trunc_page(addr_bytes);
        let len_pg = self.window.ceil_pages(len_bytes);
        if !self.window.contains(addr_pg, len_pg) {
            return Err(MmError::Invalid);
        }
        let log2_pagesize = self.window.log2_pagesize;

        if let Some(n) = self.alloc.search_contains(addr_pg, len_pg) {
            let n_start = self.alloc.start(n);
            let n_len = self.alloc.len_of(n);
            let info = *self.alloc.info(n);
            let needs_before = n_start < addr_pg;
            let needs_after = n_start + n_len > addr_pg + len_pg;

            let (before, after) = reserve_boundary(&mut self.alloc, needs_before, needs_after)?;
            let free_slot = match self.free.reserve() {
                Ok(id) => id,
                Err(err) => {
                    if let Some(b) = before {
                        self.alloc.release(b);
                    }
                    if let Some(a) = after {
                        self.alloc.release(a);
                    }
                    return Err(err.into());
                }
            };

            let removed = self
                .alloc
                .remove(n_start)
                .expect("search_contains result must still be present");
            if needs_before {
                let b = before.expect("left-straddling region was pre-reserved");
                self.alloc
                    .put(b, n_start, addr_pg - n_start, info)
                    .expect("leading remainder key cannot already be present");
            }
            if needs_after {
                let a = after.expect("right-straddling region was pre-reserved");
                self.alloc
                    .put(a, addr_pg + len_pg, (n_start + n_len) - (addr_pg + len_pg), info)
                    .expect("trailing remainder key cannot already be present");
            }
            self.alloc.release(removed);

            cb(addr_pg << log2_pagesize, len_pg << log2_pagesize, info);
            insert_merge_free(&mut self.free, free_slot, addr_pg, len_pg);
            trace!("unmap: released {len_pg} pages at {addr_pg}");
            return Ok(());
        }

        if self.alloc.count_overlaps(addr_pg, len_pg) == 0 {
            return Err(MmError::NotFound);
        }

        move_to_free(&mut self.alloc, &mut self.free, addr_pg, len_pg, |lo, hi, info| {
            cb(lo << log2_pagesize, hi << log2_pagesize, info);
        })?;
        trace!("unmap: released {len_pg} pages at {addr_pg} across multiple regions");
        Ok(())
    }

    /// Look up the metadata of the allocated page at `addr_bytes`, if any.
    ///
    /// A misaligned address always yields `None`.
    #[must_use]
    pub fn query(&self, addr_bytes: u64) -> Option<Info> {
        if !self.window.is_page_aligned(addr_bytes) {
            return None;
        }
        let addr_pg = self.window.trunc_page(addr_bytes);
        let n = self.alloc.search_contains(addr_pg, 1)?;
        Some(*self.alloc.info(n))
    }

    /// Change the protection of an allocated range, without notification.
    ///
    /// # Errors
    /// See [`Self::protect_cb`].
    pub fn protect(&mut self, addr_bytes: u64, len_bytes: u64, new_prot: i32) -> Result<(), MmError> {
        self.protect_cb(addr_bytes, len_bytes, new_prot, &mut ignore)
    }

    /// Change the protection of every page in `[addr_bytes, addr_bytes+len_bytes)`.
    ///
    /// The rounded range must be window-valid and have zero overlap with
    /// the free set — any unmapped page in the range is an error. Only
    /// `prot` changes; `mapping_base`/`mapping_len`/`fd`/`offset` are
    /// preserved so the callback can faithfully report "this sub-range of
    /// mapping M now has protection P".
    ///
    /// # Errors
    /// Returns [`MmError::Invalid`] if `addr_bytes` is misaligned,
    /// `len_bytes` rounds down to zero pages, the range falls outside the
    /// window, or any page in the range is unmapped. Returns
    /// [`MmError::NoMemory`] if node storage cannot be allocated.
    pub fn protect_cb(
        &mut self,
        addr_bytes: u64,
        len_bytes: u64,
        new_prot: i32,
        cb: &mut dyn FnMut(u64, u64, Info),
    ) -> Result<(), MmError> {
        if !self.window.is_page_aligned(addr_bytes) {
            return Err(MmError::Invalid);
        }
        let addr_pg = self.window.trunc_page(addr_bytes);
        let len_pg = self.window.ceil_pages(len_bytes);
        if len_pg == 0 || !self.window.contains(addr_pg, len_pg) {
            return Err(MmError::Invalid);
        }
        let log2_pagesize = self.window.log2_pagesize;

        if self.free.count_overlaps(addr_pg, len_pg) > 0 {
            warn!("protect: requested range overlaps unmapped pages");
            return Err(MmError::Invalid);
        }

        let noverlap = self.alloc.count_overlaps(addr_pg, len_pg);
        debug_assert!(
            noverlap > 0,
            "cover invariant violated: range overlaps neither free nor allocated pages"
        );

        if noverlap == 1 {
            let n = self
                .alloc
                .search_contains(addr_pg, len_pg)
                .expect("a single overlap not straddling free pages must contain the request");
            let info = *self.alloc.info(n);
            if info.prot == new_prot {
                return Ok(());
            }

            let n_start = self.alloc.start(n);
            let n_len = self.alloc.len_of(n);
            if n_start == addr_pg && n_len == len_pg {
                let mut new_info = info;
                new_info.prot = new_prot;
                *self.alloc.info_mut(n) = new_info;
                cb(addr_pg << log2_pagesize, len_pg << log2_pagesize, new_info);
                trace!("protect: changed prot to {new_prot} for {len_pg} pages at {addr_pg}");
                return Ok(());
            }

            let needs_before = n_start < addr_pg;
            let needs_after = n_start + n_len > addr_pg + len_pg;
            let (before, after) = reserve_boundary(&mut self.alloc, needs_before, needs_after)?;

            let removed = self
                .alloc
                .remove(n_start)
                .expect("search_contains result must still be present");
            if needs_before {
                let b = before.expect("left-straddling region was pre-reserved");
                self.alloc
                    .put(b, n_start, addr_pg - n_start, info)
                    .expect("leading remainder key cannot already be present");
            }
            if needs_after {
                let a = after.expect("right-straddling region was pre-reserved");
                self.alloc
                    .put(a, addr_pg + len_pg, (n_start + n_len) - (addr_pg + len_pg), info)
                    .expect("trailing remainder key cannot already be present");
            }
            let mut new_info = info;
            new_info.prot = new_prot;
            self.alloc
                .put(removed, addr_pg, len_pg, new_info)
                .expect("rewritten range key cannot already be present");

            cb(addr_pg << log2_pagesize, len_pg << log2_pagesize, new_info);
            trace!("protect: changed prot to {new_prot} for {len_pg} pages at {addr_pg}");
            return Ok(());
        }

        rewrite_in_place(
            &mut self.alloc,
            addr_pg,
            len_pg,
            |old| {
                let mut updated = *old;
                updated.prot = new_prot;
                updated
            },
            |lo, hi, new_info| cb(lo << log2_pagesize, hi << log2_pagesize, new_info),
        )?;
        trace!("protect: changed prot to {new_prot} across {noverlap} regions at {addr_pg}");
        Ok(())
    }
}
