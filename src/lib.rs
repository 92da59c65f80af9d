//! SBX: a self-describing, Reed-Solomon-protected block container for
//! shielding a file against silent bit rot, with optional RAID-1 twin
//! sidecars and a FUSE mirror that shields files transparently on write.
//!
//! # Layout
//!
//! - [`rs`] — the raw GF(2^8) Reed-Solomon codec (encode/decode over a
//!   single codeword, chunking messages longer than 255 - parity bytes).
//! - [`block`] — the physical 16-byte-header block format, versioned by
//!   [`block::VersionParams`], built on top of [`rs`].
//! - [`metadata`] — the TLV-encoded block-0 metadata record (`Metadata`).
//! - [`password`] — the SHA-256 keystream XOR obfuscation layer (explicitly
//!   not encryption).
//! - [`container`] — whole-file encode/decode into/from a `.sbx` sidecar,
//!   including RAID-1 fallback and running-hash verification.
//! - [`checker`] — directory-wide sidecar/live-file integrity auditing and
//!   optional repair.
//! - [`recovery`] — forward-scan recovery of SBX blocks from damaged or
//!   foreign media into a SQLite catalog, and sidecar reconstruction from
//!   that catalog.
//! - [`mount`] — a `fuser`-based passthrough filesystem that shields every
//!   file it mirrors behind an SBX sidecar.
//! - [`perf`] — ambient I/O helpers shared by the above.
//! - [`error`] — the unified `SbxError` taxonomy.

pub mod block;
pub mod checker;
pub mod container;
pub mod error;
pub mod metadata;
pub mod mount;
pub mod password;
pub mod perf;
pub mod recovery;
pub mod rs;

// Flat re-exports for the most common types.
pub use block::VersionParams;
pub use container::{decode_file, encode_file, DecodeOptions, DecodeReport, EncodeOptions, EncodeReport};
pub use error::{Result, SbxError};
pub use metadata::Metadata;
