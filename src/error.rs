//! Unified error taxonomy.
//!
//! Every layer (`rs`, `block`, `container`, `password`, `checker`) owns a
//! small `thiserror` enum for its own failure modes; [`SbxError`] composes
//! them via `#[from]` so callers at the CLI boundary only match one type.

use std::path::PathBuf;
use thiserror::Error;

use crate::block::BlockError;
use crate::metadata::MetadataError;
use crate::password::PasswordError;
use crate::rs::RsError;

#[derive(Debug, Error)]
pub enum SbxError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not an SBX block: bad magic")]
    NotAnSbxBlock { path: PathBuf },

    #[error("unsupported SBX version {version}")]
    UnsupportedVersion { version: u8 },

    #[error("malformed block: {reason}")]
    MalformedBlock { reason: String },

    #[error("CRC mismatch in block {blocknum}")]
    CrcMismatch { blocknum: u32 },

    #[error("block {blocknum} has more symbol errors than Reed-Solomon can correct")]
    RsUncorrectable { blocknum: u32 },

    #[error("header block unrecoverable even after RAID fallback")]
    HeaderUnrecoverable,

    #[error("blocks are out of order: header block number was {got}, expected 0 or 1")]
    HeaderOutOfOrder { got: u32 },

    #[error("block {0} is missing")]
    BlockMissing(u32),

    #[error("decoded content hash does not match the stored HSH digest")]
    HashMismatch,

    #[error("target file already exists: {0}")]
    TargetExists(PathBuf),

    #[error(transparent)]
    Rs(#[from] RsError),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl SbxError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SbxError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, SbxError>;
