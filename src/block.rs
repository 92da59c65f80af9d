//! Physical SBX block codec.
//!
//! # On-disk layout (big-endian, 16-byte header)
//!
//! ```text
//! Offset  Size  Field
//!    0      3   magic       = "SBx"
//!    3      1   version     1 or 2
//!    4      2   crc16       crc_hqx(uid || blocknum || data, seed=version)
//!    6      6   uid         container identifier, constant across all blocks
//!   12      4   blocknum    big-endian, 0 = metadata block
//!   16      N   data        chunk_read_size bytes (version-dependent)
//! ```
//!
//! The 16-byte header plus `data` form one Reed-Solomon message. Because a
//! single GF(2^8) codeword cannot exceed 255 bytes, the message is split
//! into `num_rs_chunks` pieces of `255 - parity` bytes, each RS-encoded
//! independently and concatenated; the result is padded with trailing
//! `0x1A` tail bytes (`tailpad`) to reach the fixed block size. Decoding
//! reverses this: strip the tail pad, RS-decode each 255-byte chunk (this is
//! where single-chunk Reed-Solomon correction happens and where
//! [`BlockError::RsUncorrectable`] can surface), reassemble the message,
//! then validate the CRC before trusting any other field — cheapest check
//! first, same discipline used for this crate's on-disk headers generally.

use thiserror::Error;

use crate::rs;

pub const MAGIC: [u8; 3] = *b"SBx";
pub const TAIL_BYTE: u8 = 0x1A;
const HEADER_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("not an SBX block: bad magic")]
    NotAnSbxBlock,

    #[error("unsupported SBX version {0}")]
    UnsupportedVersion(u8),

    #[error("malformed block: {0}")]
    MalformedBlock(String),

    #[error("CRC mismatch in block {blocknum}")]
    CrcMismatch { blocknum: u32 },

    #[error("block {blocknum} has uncorrectable symbol errors")]
    RsUncorrectable { blocknum: u32 },

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
}

/// Container parameters for one SBX format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionParams {
    pub version: u8,
    pub blocksize: usize,
    pub hdrsize: usize,
    pub datasize: usize,
    pub parity: usize,
    pub chunk_read_size: usize,
    pub tailpad: usize,
}

pub const V1: VersionParams = VersionParams {
    version: 1,
    blocksize: 512,
    hdrsize: 16,
    datasize: 496,
    parity: 108,
    chunk_read_size: 278,
    tailpad: 2,
};

pub const V2: VersionParams = VersionParams {
    version: 2,
    blocksize: 4096,
    hdrsize: 16,
    datasize: 4080,
    parity: 107,
    chunk_read_size: 2352,
    tailpad: 16,
};

impl VersionParams {
    pub fn for_version(version: u8) -> Result<Self, BlockError> {
        match version {
            1 => Ok(V1),
            2 => Ok(V2),
            other => Err(BlockError::UnsupportedVersion(other)),
        }
    }

    #[inline]
    fn rs_chunk_size(&self) -> usize {
        255 - self.parity
    }

    #[inline]
    fn num_rs_chunks(&self) -> usize {
        (self.hdrsize + self.chunk_read_size) / self.rs_chunk_size()
    }
}

/// CRC-16/CCITT (`binascii.crc_hqx`): polynomial 0x1021, seeded (not
/// reflected, no final XOR). The seed is intentionally the version byte,
/// so a block cannot be silently reinterpreted under the wrong version.
pub fn crc_hqx(data: &[u8], seed: u16) -> u16 {
    let mut crc = seed;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

#[derive(Debug, Clone)]
pub struct DecodedBlock {
    pub uid: [u8; 6],
    pub blocknum: u32,
    pub data: Vec<u8>,
}

/// Encode one physical block. `data` must be exactly `params.chunk_read_size`
/// bytes — callers pad the final short read (and the metadata TLV stream)
/// with `0x1A` to this length before calling.
pub fn encode_block(
    params: &VersionParams,
    uid: [u8; 6],
    blocknum: u32,
    data: &[u8],
) -> Result<Vec<u8>, BlockError> {
    if data.len() != params.chunk_read_size {
        return Err(BlockError::MalformedBlock(format!(
            "data length {} != chunk_read_size {}",
            data.len(),
            params.chunk_read_size
        )));
    }

    let mut crc_input = Vec::with_capacity(6 + 4 + data.len());
    crc_input.extend_from_slice(&uid);
    crc_input.extend_from_slice(&blocknum.to_be_bytes());
    crc_input.extend_from_slice(data);
    let crc = crc_hqx(&crc_input, params.version as u16);

    let mut message = Vec::with_capacity(params.hdrsize + data.len());
    message.extend_from_slice(&MAGIC);
    message.push(params.version);
    message.extend_from_slice(&crc.to_be_bytes());
    message.extend_from_slice(&uid);
    message.extend_from_slice(&blocknum.to_be_bytes());
    message.extend_from_slice(data);
    debug_assert_eq!(message.len(), params.hdrsize + params.chunk_read_size);

    let rs_chunk_size = params.rs_chunk_size();
    let mut out = Vec::with_capacity(params.blocksize);
    for chunk in message.chunks(rs_chunk_size) {
        let codeword = rs::encode(chunk, params.parity)
            .map_err(|e| BlockError::MalformedBlock(e.to_string()))?;
        out.extend_from_slice(&codeword);
    }
    out.extend(std::iter::repeat(TAIL_BYTE).take(params.tailpad));
    debug_assert_eq!(out.len(), params.blocksize);
    Ok(out)
}

/// Decode one physical block. `raw` must be exactly `params.blocksize` bytes.
pub fn decode_block(params: &VersionParams, raw: &[u8]) -> Result<DecodedBlock, BlockError> {
    if raw.len() != params.blocksize {
        return Err(BlockError::ShortRead { expected: params.blocksize, got: raw.len() });
    }

    let body = &raw[..raw.len() - params.tailpad];
    let rs_chunk_size = params.rs_chunk_size();
    let num_chunks = params.num_rs_chunks();
    let codeword_size = rs_chunk_size + params.parity;
    debug_assert_eq!(body.len(), num_chunks * codeword_size);

    let mut message = Vec::with_capacity(params.hdrsize + params.chunk_read_size);
    for chunk in body.chunks(codeword_size) {
        // A per-chunk decode failure means more than parity/2 symbol errors
        // landed in this 255-byte codeword; the caller (container decoder)
        // is responsible for falling back to the RAID twin.
        let decoded = rs::decode(chunk, params.parity).map_err(|_| {
            BlockError::RsUncorrectable { blocknum: u32::MAX }
        })?;
        message.extend_from_slice(&decoded);
    }

    if message[0..3] != MAGIC {
        return Err(BlockError::NotAnSbxBlock);
    }
    let version = message[3];
    if version != params.version {
        return Err(BlockError::UnsupportedVersion(version));
    }
    let stored_crc = u16::from_be_bytes([message[4], message[5]]);
    let uid: [u8; 6] = message[6..12].try_into().unwrap();
    let blocknum = u32::from_be_bytes(message[12..16].try_into().unwrap());
    let data = message[16..].to_vec();

    let mut crc_input = Vec::with_capacity(6 + 4 + data.len());
    crc_input.extend_from_slice(&uid);
    crc_input.extend_from_slice(&blocknum.to_be_bytes());
    crc_input.extend_from_slice(&data);
    let expected_crc = crc_hqx(&crc_input, version as u16);
    if expected_crc != stored_crc {
        return Err(BlockError::CrcMismatch { blocknum });
    }

    Ok(DecodedBlock { uid, blocknum, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_v1() {
        let data = vec![b'A'; V1.chunk_read_size];
        let block = encode_block(&V1, [1, 2, 3, 4, 5, 6], 7, &data).unwrap();
        assert_eq!(block.len(), V1.blocksize);
        let decoded = decode_block(&V1, &block).unwrap();
        assert_eq!(decoded.uid, [1, 2, 3, 4, 5, 6]);
        assert_eq!(decoded.blocknum, 7);
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn roundtrip_v2() {
        let data = vec![b'Z'; V2.chunk_read_size];
        let block = encode_block(&V2, [9, 9, 9, 9, 9, 9], 0, &data).unwrap();
        assert_eq!(block.len(), V2.blocksize);
        let decoded = decode_block(&V2, &block).unwrap();
        assert_eq!(decoded.blocknum, 0);
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn tolerates_symbol_errors_within_parity_budget() {
        let data = vec![b'Q'; V1.chunk_read_size];
        let mut block = encode_block(&V1, [0; 6], 1, &data).unwrap();
        // Flip a handful of bytes inside the first RS chunk, well under parity/2.
        for i in [1usize, 3, 5, 9, 12] {
            block[i] ^= 0xFF;
        }
        let decoded = decode_block(&V1, &block).unwrap();
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn detects_bad_magic() {
        let data = vec![b'Q'; V1.chunk_read_size];
        let mut block = encode_block(&V1, [0; 6], 1, &data).unwrap();
        // Corrupt the whole header-bearing RS chunk beyond correction.
        for i in 0..(V1.parity) {
            block[i] ^= 0xFF;
        }
        assert!(decode_block(&V1, &block).is_err());
    }

    #[test]
    fn crc_hqx_matches_known_vector() {
        // crc_hqx(b"123456789", 0) is a commonly cited CRC-CCITT test vector.
        assert_eq!(crc_hqx(b"123456789", 0), 0x31C3);
    }
}
