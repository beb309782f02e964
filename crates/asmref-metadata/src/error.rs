pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("not a portable executable image")]
    NotPortableExecutable,

    #[error("image has no CLI header (not a managed assembly)")]
    NotManaged,

    #[error("rva 0x{0:08x} is not mapped by any section")]
    UnmappedRva(u32),

    #[error("invalid metadata signature: 0x{0:08x}")]
    InvalidSignature(u32),

    #[error("metadata stream `{0}` is missing")]
    MissingStream(&'static str),

    #[error("metadata table 0x{0:02x} is not supported")]
    UnsupportedTable(u8),

    #[error("invalid {heap} heap index: {index}")]
    InvalidHeapIndex { heap: &'static str, index: u32 },

    #[error("invalid UTF-8 in #Strings heap at index {0}")]
    InvalidUtf8(u32),

    #[error("image is a module without an assembly manifest")]
    NoAssemblyManifest,

    #[error("malformed metadata: {0}")]
    Malformed(&'static str),
}
