//! TLV metadata carried in block 0.
//!
//! Each record is `tag(3 bytes) || len(1 byte) || value(len bytes)`. The
//! stream ends at the exact 3-byte sequence `0x1A 0x1A 0x1A` or at the end
//! of the payload, whichever comes first. Unknown tags are skipped, not
//! rejected — a future version of this format can add tags without
//! breaking older readers.

use thiserror::Error;

pub const TAG_FNM: [u8; 3] = *b"FNM";
pub const TAG_SNM: [u8; 3] = *b"SNM";
pub const TAG_FSZ: [u8; 3] = *b"FSZ";
pub const TAG_FDT: [u8; 3] = *b"FDT";
pub const TAG_SDT: [u8; 3] = *b"SDT";
pub const TAG_HSH: [u8; 3] = *b"HSH";
pub const TAG_PAD: [u8; 3] = *b"PAD";
pub const TAG_RSL: [u8; 3] = *b"RSL";

const TERMINATOR: [u8; 3] = [0x1A, 0x1A, 0x1A];

/// Multihash prefix for SHA-256: function code 0x12, digest length 0x20.
const MULTIHASH_SHA256_PREFIX: [u8; 2] = [0x12, 0x20];

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("TLV value for tag {tag:?} exceeds 255 bytes")]
    ValueTooLong { tag: [u8; 3] },

    #[error("metadata stream too short to hold a complete record")]
    Truncated,

    #[error("filename is not valid UTF-8")]
    InvalidUtf8,

    #[error("HSH record does not carry a recognized multihash prefix")]
    UnrecognizedHash,
}

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub filename: Option<String>,
    pub sbxname: Option<String>,
    pub filesize: Option<u64>,
    pub filedatetime: Option<i64>,
    pub sbxdatetime: Option<i64>,
    pub sha256: Option<[u8; 32]>,
    pub padding_last_block: Option<u16>,
    pub redundancy_level: Option<u8>,
}

fn push_record(out: &mut Vec<u8>, tag: [u8; 3], value: &[u8]) -> Result<(), MetadataError> {
    if value.len() > 255 {
        return Err(MetadataError::ValueTooLong { tag });
    }
    out.extend_from_slice(&tag);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
    Ok(())
}

impl Metadata {
    /// Serialize to the TLV stream, including the terminator.
    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let mut out = Vec::new();
        if let Some(name) = &self.filename {
            push_record(&mut out, TAG_FNM, name.as_bytes())?;
        }
        if let Some(name) = &self.sbxname {
            push_record(&mut out, TAG_SNM, name.as_bytes())?;
        }
        if let Some(sz) = self.filesize {
            push_record(&mut out, TAG_FSZ, &sz.to_be_bytes())?;
        }
        if let Some(t) = self.filedatetime {
            push_record(&mut out, TAG_FDT, &(t as u64).to_be_bytes())?;
        }
        if let Some(t) = self.sbxdatetime {
            push_record(&mut out, TAG_SDT, &(t as u64).to_be_bytes())?;
        }
        if let Some(hash) = &self.sha256 {
            let mut value = Vec::with_capacity(2 + 32);
            value.extend_from_slice(&MULTIHASH_SHA256_PREFIX);
            value.extend_from_slice(hash);
            push_record(&mut out, TAG_HSH, &value)?;
        }
        if let Some(pad) = self.padding_last_block {
            push_record(&mut out, TAG_PAD, &pad.to_be_bytes())?;
        }
        if let Some(rsl) = self.redundancy_level {
            push_record(&mut out, TAG_RSL, &[rsl])?;
        }
        out.extend_from_slice(&TERMINATOR);
        Ok(out)
    }

    /// Parse a TLV stream, tolerating unknown tags and a missing terminator
    /// (payload end also ends the stream).
    pub fn decode(data: &[u8]) -> Result<Self, MetadataError> {
        let mut meta = Metadata::default();
        let mut p = 0usize;
        while p + 3 <= data.len() {
            let tag: [u8; 3] = data[p..p + 3].try_into().unwrap();
            if tag == TERMINATOR {
                break;
            }
            p += 3;
            if p >= data.len() {
                return Err(MetadataError::Truncated);
            }
            let len = data[p] as usize;
            p += 1;
            if p + len > data.len() {
                return Err(MetadataError::Truncated);
            }
            let value = &data[p..p + len];
            p += len;

            match tag {
                TAG_FNM => {
                    meta.filename = Some(
                        String::from_utf8(value.to_vec()).map_err(|_| MetadataError::InvalidUtf8)?,
                    )
                }
                TAG_SNM => {
                    meta.sbxname = Some(
                        String::from_utf8(value.to_vec()).map_err(|_| MetadataError::InvalidUtf8)?,
                    )
                }
                TAG_FSZ => meta.filesize = Some(be_u64(value)),
                TAG_FDT => meta.filedatetime = Some(be_u64(value) as i64),
                TAG_SDT => meta.sbxdatetime = Some(be_u64(value) as i64),
                TAG_HSH => {
                    if value.len() != 34 || value[0..2] != MULTIHASH_SHA256_PREFIX {
                        return Err(MetadataError::UnrecognizedHash);
                    }
                    let mut h = [0u8; 32];
                    h.copy_from_slice(&value[2..2 + 32]);
                    meta.sha256 = Some(h);
                }
                TAG_PAD => meta.padding_last_block = Some(be_u16(value)),
                TAG_RSL => meta.redundancy_level = value.first().copied(),
                _ => {
                    // Unknown tag: skip, per the format's forward-compatibility rule.
                }
            }
        }
        Ok(meta)
    }
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[8 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    u64::from_be_bytes(buf)
}

fn be_u16(bytes: &[u8]) -> u16 {
    let mut buf = [0u8; 2];
    let n = bytes.len().min(2);
    buf[2 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    u16::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let meta = Metadata {
            filename: Some("notes.txt".into()),
            sbxname: Some("notes.txt.sbx".into()),
            filesize: Some(12345),
            filedatetime: Some(1_700_000_000),
            sbxdatetime: Some(1_700_000_100),
            sha256: Some([0x42; 32]),
            padding_last_block: Some(17),
            redundancy_level: None,
        };
        let encoded = meta.encode().unwrap();
        let decoded = Metadata::decode(&encoded).unwrap();
        assert_eq!(decoded.filename, meta.filename);
        assert_eq!(decoded.filesize, meta.filesize);
        assert_eq!(decoded.sha256, meta.sha256);
        assert_eq!(decoded.padding_last_block, meta.padding_last_block);
    }

    #[test]
    fn tolerates_unknown_tags() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"ZZZ");
        stream.push(2);
        stream.extend_from_slice(b"hi");
        stream.extend_from_slice(&TAG_FSZ);
        stream.push(1);
        stream.push(42);
        stream.extend_from_slice(&TERMINATOR);

        let meta = Metadata::decode(&stream).unwrap();
        assert_eq!(meta.filesize, Some(42));
    }

    #[test]
    fn missing_terminator_stops_at_payload_end() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&TAG_FSZ);
        stream.push(1);
        stream.push(7);
        let meta = Metadata::decode(&stream).unwrap();
        assert_eq!(meta.filesize, Some(7));
    }
}
