//! Per-codec error types and the crate-wide aggregate.

use jstudio_stream::StreamError;
use thiserror::Error;

/// Errors from the BMD/BDL (J3D) codec.
#[derive(Debug, Error)]
pub enum BmdError {
    /// Header magic was not `J3D2`.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Header version was neither `bmd3` nor `bdl4`.
    #[error("unsupported J3D version {0:?}")]
    UnsupportedVersion([u8; 4]),

    /// A section the reader requires to resolve forward references was
    /// never present in the section table.
    #[error("required section {0:?} missing from file")]
    MissingSection([u8; 4]),

    /// A shape referenced a vertex index past the end of its buffer.
    #[error("shape referenced vertex index {index} but buffer {channel} has {len} entries")]
    VertexIndexOutOfRange {
        /// Channel name (`"Position"`, `"Color0"`, ...).
        channel: &'static str,
        index: u32,
        len: usize,
    },
}

/// Errors from the BRRES (G3D) codec.
#[derive(Debug, Error)]
pub enum BrresError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("unsupported BRRES version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown resource group kind {0:?}")]
    UnknownGroupKind(String),
}

/// Errors from the KMP codec.
#[derive(Debug, Error)]
pub enum KmpError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("unknown area type {0}")]
    UnknownAreaType(u8),

    #[error("unknown area shape {0}")]
    UnknownAreaShape(u8),
}

/// Errors from the SZS (Yaz0) codec.
#[derive(Debug, Error)]
pub enum SzsError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("back-reference distance {distance} at output position {position} underflows the output buffer")]
    InvalidBackReference { distance: u32, position: usize },

    #[error("expanded size mismatch: header said {expected}, decoder produced {actual}")]
    SizeMismatch { expected: u32, actual: usize },
}

/// Errors from the U8/RARC archive codec.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("node {0} has an out-of-range parent/sibling index")]
    BrokenNodeTable(usize),

    #[error("path {0:?} is not valid UTF-8 after decoding")]
    InvalidPath(String),
}

/// Errors from the small EGG binaries (BLIGHT/BLMAP/BDOF/BBLM/BFG).
#[derive(Debug, Error)]
pub enum EggError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("unsupported {kind} version {version}")]
    UnsupportedVersion { kind: &'static str, version: u32 },
}

/// Errors from KCL header parsing.
#[derive(Debug, Error)]
pub enum KclError {
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// A top-level error aggregating every format-specific error, for callers
/// (the `Registry`, the CLI) that dispatch on extension/magic and don't
/// care which concrete codec failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("BMD/BDL: {0}")]
    Bmd(#[from] BmdError),

    #[error("BRRES: {0}")]
    Brres(#[from] BrresError),

    #[error("KMP: {0}")]
    Kmp(#[from] KmpError),

    #[error("SZS: {0}")]
    Szs(#[from] SzsError),

    #[error("archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("EGG binary: {0}")]
    Egg(#[from] EggError),

    #[error("KCL: {0}")]
    Kcl(#[from] KclError),

    #[error("stream: {0}")]
    Stream(#[from] StreamError),
}
