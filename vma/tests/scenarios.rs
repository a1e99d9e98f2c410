//! Literal end-to-end scenarios from `spec.md` §8 (S1-S6), translated from
//! `original_source/test/test{1..5}.c` where the scenario numbers correspond.

use vma::{AddressSpace, MmError};

const PAGESIZE: u64 = 4096;

/// S1 / `test1.c`: a `map_at` big enough to exhaust a 16-page window leaves
/// no hole for a subsequent `map_anywhere`, and unmapping the whole window
/// empties it back out.
#[test]
fn s1_map_at_exhausts_window_then_unmap_empties_it() {
    let mut mm = AddressSpace::new(0, PAGESIZE * 16, PAGESIZE).unwrap();

    let r = mm.map_at(3 * PAGESIZE, 8 * PAGESIZE, 0, 0, 0, 0);
    assert!(r.is_ok());

    let r = mm.map_anywhere(8 * PAGESIZE, 0, 0, 0, 0);
    assert_eq!(r, Err(MmError::NoMemory));

    mm.unmap(0, 16 * PAGESIZE).unwrap();
    // the whole window is free again, so a full-window allocation succeeds
    assert_eq!(mm.map_anywhere(16 * PAGESIZE, 0, 0, 0, 0).unwrap(), 0);
}

/// S2 / `test2.c` & `test3.c`: map-at then unmap restores the table well
/// enough that a full-window `map_anywhere` succeeds afterwards.
#[test]
fn s2_map_at_unmap_roundtrip_then_full_window_map_any() {
    let mut mm = AddressSpace::new(0, PAGESIZE * 16, PAGESIZE).unwrap();

    let addr = mm.map_at(3 * PAGESIZE, 8 * PAGESIZE, 0, 0, 0, 0).unwrap();
    assert_eq!(addr, 3 * PAGESIZE);
    mm.unmap(addr, 8 * PAGESIZE).unwrap();

    let addr = mm.map_anywhere(16 * PAGESIZE, 0, 0, 0, 0).unwrap();
    assert_eq!(addr, 0);
}

/// S3 / `test4.c`: protect rejects a range overlapping free pages but
/// succeeds once narrowed to allocated territory; only the protected
/// sub-range observes the new protection.
#[test]
fn s3_protect_rejects_straddle_then_narrows_successfully() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();

    mm.map_at(3, 8, 0, 0, 0, 0).unwrap();

    // [0, 5) overlaps free pages [0, 3) as well as allocated [3, 5)
    assert_eq!(mm.protect(0, 5, 1), Err(MmError::Invalid));
    assert_eq!(mm.query(4).unwrap().prot, 0);

    assert!(mm.protect(5, 3, 1).is_ok());
    assert_eq!(mm.query(4).unwrap().prot, 0);
    assert_eq!(mm.query(5).unwrap().prot, 1);
    assert_eq!(mm.query(7).unwrap().prot, 1);
    assert_eq!(mm.query(8).unwrap().prot, 0, "page 8 lies past the protected sub-range");
}

/// S4 / `test5.c`: unmapping a range that extends past the end of an
/// allocation still succeeds and releases the intersection.
#[test]
fn s4_unmap_past_allocation_end_releases_intersection() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();

    mm.map_at(3, 8, 1, 0, 0, 0).unwrap();
    assert!(mm.unmap(4, 9).is_ok());

    assert!(mm.query(4).is_none());
    let info = mm.query(3).unwrap();
    assert_eq!(info.prot, 1);
}

/// S5: three back-to-back `map_anywhere(4)` calls in a 16-page window all
/// succeed, and unmapping the middle one frees a hole a later
/// `map_anywhere(4)` can occupy. The spec leaves the specific hole chosen by
/// `map_anywhere` unspecified (`spec.md` §9, open question 4), so this only
/// checks that the freed capacity becomes available again, not which address
/// is handed back.
#[test]
fn s5_freed_middle_hole_is_available_to_map_anywhere() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();

    let a = mm.map_anywhere(4, 0, 0, 0, 0).unwrap();
    let b = mm.map_anywhere(4, 0, 0, 0, 0).unwrap();
    let c = mm.map_anywhere(4, 0, 0, 0, 0).unwrap();
    assert_ne!(a, b);
    assert_ne!(b, c);
    // window is now fully allocated: 16 pages used, none free
    assert_eq!(mm.map_anywhere(1, 0, 0, 0, 0), Err(MmError::NoMemory));

    mm.unmap(b, 4).unwrap();
    // exactly 4 pages are free again, so a fourth 4-page mapping succeeds...
    let d = mm.map_anywhere(4, 0, 0, 0, 0).unwrap();
    // ...and the window is once again fully allocated
    assert_eq!(mm.map_anywhere(1, 0, 0, 0, 0), Err(MmError::NoMemory));
    assert!(mm.query(d).is_some());
}

/// S6: mapping the whole window, then overwriting a middle sub-range with a
/// new protection via `map_at`'s overwrite path splits the one pre-existing
/// allocation into three, with the middle fragment carrying the new prot.
#[test]
fn s6_map_at_overwrite_splits_one_region_into_three() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();

    mm.map_at(0, 16, 0, 0, 0, 0).unwrap();
    mm.map_at(4, 4, 7, 0, 0, 0).unwrap();

    assert_eq!(mm.query(0).unwrap().prot, 0);
    assert_eq!(mm.query(3).unwrap().prot, 0);
    assert_eq!(mm.query(4).unwrap().prot, 7);
    assert_eq!(mm.query(7).unwrap().prot, 7);
    assert_eq!(mm.query(8).unwrap().prot, 0);
    assert_eq!(mm.query(15).unwrap().prot, 0);
}

#[test]
fn map_at_straddling_free_and_alloc_is_rejected() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();
    mm.map_at(4, 4, 0, 0, 0, 0).unwrap();

    // [2, 6) overlaps free [0,4) and allocated [4,8) simultaneously
    assert_eq!(mm.map_at(2, 4, 0, 0, 0, 0), Err(MmError::Invalid));
}

#[test]
fn unmap_of_wholly_unmapped_range_is_not_found() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();
    assert_eq!(mm.unmap(0, 4), Err(MmError::NotFound));
}

#[test]
fn unmap_touching_partly_unmapped_range_succeeds() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();
    mm.map_at(4, 4, 0, 0, 0, 0).unwrap();
    // [2, 8) includes already-free [2,4), which must be skipped silently
    assert!(mm.unmap(2, 6).is_ok());
    assert!(mm.query(4).is_none());
}

#[test]
fn misaligned_addr_is_invalid_everywhere() {
    let mut mm = AddressSpace::new(0, 16 * PAGESIZE, PAGESIZE).unwrap();
    assert_eq!(mm.map_at(1, PAGESIZE, 0, 0, 0, 0), Err(MmError::Invalid));
    assert_eq!(mm.unmap(1, PAGESIZE), Err(MmError::Invalid));
    assert_eq!(mm.protect(1, PAGESIZE, 0), Err(MmError::Invalid));
    assert_eq!(mm.query(1), None);
}

#[test]
fn out_of_window_range_is_invalid() {
    let mut mm = AddressSpace::new(0, 16 * PAGESIZE, PAGESIZE).unwrap();
    assert_eq!(mm.map_at(15 * PAGESIZE, 2 * PAGESIZE, 0, 0, 0, 0), Err(MmError::Invalid));
    assert_eq!(mm.unmap(16 * PAGESIZE, PAGESIZE), Err(MmError::Invalid));
}

#[test]
fn zero_length_unmap_is_invalid() {
    let mut mm = AddressSpace::new(0, 16 * PAGESIZE, PAGESIZE).unwrap();
    assert_eq!(mm.unmap(0, 0), Err(MmError::Invalid));
}

#[test]
fn init_rejects_non_power_of_two_pagesize() {
    assert_eq!(AddressSpace::new(0, 4096, 100), Err(MmError::Invalid));
}

#[test]
fn protect_to_same_prot_is_a_no_op() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();
    mm.map_at(0, 16, 5, 0, 0, 0).unwrap();
    assert!(mm.protect(4, 4, 5).is_ok());
    assert_eq!(mm.query(4).unwrap().prot, 5);
}

#[test]
fn callback_fires_once_per_affected_subrange_in_ascending_order() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();
    mm.map_at(0, 4, 1, 0, 0, 0).unwrap();
    mm.map_at(4, 4, 2, 0, 0, 0).unwrap();
    mm.map_at(8, 4, 3, 0, 0, 0).unwrap();

    let mut seen = Vec::new();
    mm.unmap_cb(0, 12, &mut |start, len, info| {
        seen.push((start, len, info.prot));
    })
    .unwrap();

    assert_eq!(seen, vec![(0, 4, 1), (4, 4, 2), (8, 4, 3)]);
}

#[test]
fn mapping_base_and_len_survive_splits() {
    let mut mm = AddressSpace::new(0, 16, 1).unwrap();
    let addr = mm.map_at(4, 8, 0, 0, 0, 0).unwrap();

    // narrow the protection to the middle, splitting off two fragments
    mm.protect(6, 2, 9).unwrap();

    let before = mm.query(4).unwrap();
    let middle = mm.query(6).unwrap();
    let after = mm.query(10).unwrap();
    for info in [before, middle, after] {
        assert_eq!(info.mapping_base, addr);
        assert_eq!(info.mapping_len, 8);
    }
    assert_eq!(middle.prot, 9);
    assert_eq!(before.prot, 0);
    assert_eq!(after.prot, 0);
}

#[test]
fn no_memory_on_budget_exhaustion_leaves_space_unchanged() {
    // exactly enough nodes for the initial free range and one allocation,
    // none left over for the split a second `map_at` would need
    let mut mm = AddressSpace::with_node_budget(0, 16, 1, Some(1)).unwrap();
    mm.map_anywhere(16, 0, 0, 0, 0).unwrap();

    // fully allocated: unmap needs a free-tree node it doesn't have budget for
    assert_eq!(mm.unmap(4, 4), Err(MmError::NoMemory));
    // the table is untouched: the full window is still one allocation
    assert!(mm.query(0).is_some());
    assert!(mm.query(15).is_some());
    assert_eq!(mm.map_anywhere(1, 0, 0, 0, 0), Err(MmError::NoMemory));
}
