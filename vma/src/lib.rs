//! # Virtual Address-Space Bookkeeper
//!
//! An in-process data structure that tracks which page-aligned ranges of a
//! fixed virtual-address window are currently mapped, remembers per-range
//! metadata (protection bits, flags, backing descriptor, offset), and
//! supports the usual mutations of a memory-map table: allocate-anywhere,
//! map-at, unmap, protect, query.
//!
//! This is the *bookkeeping* layer a userspace loader or syscall emulator
//! would consult before calling the host's real mapping primitive — it
//! performs no I/O and touches no page tables. See [`AddressSpace`] for the
//! public entry points.
//!
//! ## Two-tree invariant
//!
//! [`AddressSpace`] keeps a `free` and an `alloc` [`vma_tree::Tree`] that
//! together cover the window exactly once: every page is either free or
//! allocated, never both, never neither. Every public method restores this
//! invariant before returning, pre-allocating all node storage a mutation
//! could need ([`vma_tree::Tree::reserve`]) so that a failure midway through
//! never leaves the tables half-mutated — see the `ops` module for the
//! shared split/merge/overlap machinery this discipline relies on.
//!
//! ## Concurrency
//!
//! Single-threaded and synchronous: no internal locking, no re-entrancy
//! guarantees, no suspension points. The owner serializes all calls against
//! one [`AddressSpace`]; a caller-supplied callback must not attempt to
//! mutate the same `AddressSpace` from within the call that invoked it.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod address_space;
mod error;
mod info;
mod ops;
mod window;

pub use address_space::AddressSpace;
pub use error::MmError;
pub use info::Info;
