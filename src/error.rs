//! Typed failures that callers need to tell apart.
//!
//! Orchestration code uses `anyhow`; these enums exist where a caller
//! branches on the kind of failure (skip an entry, abort an archive,
//! log a rejected write).

use std::path::PathBuf;
use thiserror::Error;

use crate::store::NodeId;

/// A class artifact could not be decoded.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("class file truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("bad class file magic {0:#010x}")]
    BadMagic(u32),

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag { tag: u8, index: u16 },

    #[error("constant pool index {index} does not point to a {expected} entry")]
    InvalidConstant { index: u16, expected: &'static str },
}

/// The archive as a whole could not be trusted; it is skipped entirely.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt archive {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to read entry {entry} of {path}: {source}")]
    Entry {
        path: PathBuf,
        entry: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("graph store backend error: {0}")]
    Backend(#[from] heed::Error),

    #[error("no graph store in {0}; run `build` first")]
    NotFound(PathBuf),

    #[error("failed to prepare graph store directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record for node {id}: {source}")]
    Record {
        id: NodeId,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode node record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("node {0} does not exist")]
    MissingNode(NodeId),

    #[error("corrupt id counter value: {0}")]
    Counter(String),
}
