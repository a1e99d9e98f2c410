/// Per-range metadata carried by nodes in the allocated index.
///
/// `mapping_base`/`mapping_len` describe the *original* mapping a range
/// descends from and are preserved verbatim across splits, so a caller can
/// always tell which mapping a fragment used to belong to even after
/// `unmap`/`protect` have chopped it up. Only `prot` is ever rewritten in
/// place; everything else is copied unchanged from parent to fragment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Info {
    /// Byte address of the start of the originating mapping.
    pub mapping_base: u64,
    /// Byte length of the originating mapping.
    pub mapping_len: u64,
    pub prot: i32,
    pub flags: i32,
    pub fd: i32,
    pub offset: i64,
}
