/// Failure modes of [`crate::Tree`] operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// [`crate::Tree::put`] was asked to insert a range whose start already
    /// exists in the tree. The tree is left unchanged.
    #[error("a range already starts at this key")]
    DuplicateStart,
    /// The arena could not grow to satisfy [`crate::Tree::reserve`], either
    /// because the allocator reported failure or because the tree's
    /// configured capacity limit was reached.
    #[error("out of node storage")]
    NoMemory,
}
