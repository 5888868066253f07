//! Error types for the formpatch library.

/// Result type alias for formpatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while parsing or rewriting a document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structural failure during xref discovery or parsing
    #[error("Malformed cross-reference: {0}")]
    MalformedXref(String),

    /// Deflate or predictor failure on an xref or object stream
    #[error("Corrupt stream: {0}")]
    CorruptStream(String),

    /// Filter on an xref or object stream other than Flate
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Referenced object has no entry in the effective index
    #[error("Object not found: {0} {1} R")]
    MissingObject(i64, u16),

    /// A patched dictionary failed the post-edit sanity check
    #[error("Invalid dictionary after edit: {0}")]
    InvalidDictionary(String),

    /// Incremental render produced no xref entries
    #[error("Incremental update produced no xref entries")]
    EmptyXref,

    /// Encrypted documents are not supported
    #[error("Encrypted documents are not supported")]
    Encrypted,

    /// IO error from the file-opening conveniences
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
