use vma_tree::TreeError;

/// Failure modes of [`crate::AddressSpace`] operations.
///
/// Every fallible method leaves the address space byte-for-byte unchanged on
/// `Err`: either a mutation commits wholly or nothing about the tables moves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MmError {
    /// An argument was misaligned, zero-length, out of the window, or the
    /// requested range straddled free and allocated territory in a way the
    /// operation cannot represent.
    #[error("invalid argument")]
    Invalid,
    /// Node storage could not be grown to satisfy the operation; pre-existing
    /// state is untouched.
    #[error("out of memory")]
    NoMemory,
    /// `unmap` was asked to release a range that contains no allocated page
    /// at all.
    #[error("no mapping found in the requested range")]
    NotFound,
}

impl From<TreeError> for MmError {
    fn from(value: TreeError) -> Self {
        match value {
            TreeError::DuplicateStart => Self::Invalid,
            TreeError::NoMemory => Self::NoMemory,
        }
    }
}
