//! # Augmented Interval Index
//!
//! An arena-backed, height-balanced binary search tree keyed by the start of
//! a half-open page range `[start, start+len)`. Every node augments its
//! subtree with two maxima — the greatest range length (`max_len`, for
//! best-first gap search) and the greatest range end (`max_end`, for overlap
//! pruning) — so that gap search, containment lookup and overlap counting
//! all run in `O(log n)` rather than falling back to a linear scan.
//!
//! ## Design
//!
//! Nodes live in a [`Tree`]'s internal arena and are addressed by [`NodeId`]
//! handles rather than pointers: there are no parent links, no
//! reference-counted owners, and no `unsafe`. Every mutation descends from
//! the root and rebalances recursively on the way back up, which is why
//! parent pointers are unnecessary (see [`Tree::put`] and [`Tree::remove`]).
//!
//! Node storage is requested explicitly via [`Tree::reserve`] before a
//! mutation begins and committed via [`Tree::put`]; an unused reservation is
//! returned with [`Tree::release`]. This lets a caller that needs several
//! nodes for one logical operation (a split that produces a leading and a
//! trailing fragment, say) gather every handle it could need up front and
//! fail atomically before touching the tree if the arena is exhausted,
//! rather than leaving the structure half-mutated.
//!
//! This crate has no notion of address spaces, protection bits, free vs.
//! allocated territory, or callbacks — it is a plain augmented interval
//! index generic over an arbitrary payload `I`. The higher-level bookkeeping
//! lives in the `vma` crate, which keeps two of these indexes in lock-step.
//!
//! ## Safety
//!
//! No `unsafe` is used anywhere in this crate. Bounds on arena indices are
//! enforced by construction: a [`NodeId`] can only be produced by
//! [`Tree::reserve`] or returned from a lookup on the same tree.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod error;
mod node;
mod tree;

pub use error::TreeError;
pub use node::NodeId;
pub use tree::Tree;
