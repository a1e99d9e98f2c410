/// Handle to a node's storage inside a [`crate::Tree`]'s arena.
///
/// A `NodeId` is only meaningful for the [`crate::Tree`] that produced it via
/// [`crate::Tree::reserve`] or a lookup method; it carries no type-level
/// connection to that tree, so nothing stops it from being handed to a
/// *different* tree by mistake. Tree methods index their own arena directly
/// and will panic (via the usual `Vec` bounds check or the slot-kind
/// `debug_assert`s) rather than silently operate on unrelated storage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).expect("arena index exceeds u32::MAX"))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The live payload of an occupied arena slot.
#[derive(Clone)]
pub(crate) struct NodeData<I> {
    pub start: u64,
    pub len: u64,
    pub info: I,
    pub max_len: u64,
    pub max_end: u64,
    pub height: u32,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
}

/// One slot of a [`crate::Tree`]'s arena.
///
/// `Free` slots form a singly linked free list threaded through the arena
/// itself (no separate bookkeeping `Vec`). `Reserved` slots have been handed
/// out by [`crate::Tree::reserve`] (or detached by [`crate::Tree::remove`])
/// but carry no structural data yet. `Occupied` slots are linked into the
/// tree proper.
pub(crate) enum Slot<I> {
    Free(Option<NodeId>),
    Reserved,
    Occupied(NodeData<I>),
}
