//! Container encoder/decoder — the SBX sidecar file as a whole.
//!
//! Streams a source file into sequential physical blocks (block 0 carries
//! TLV metadata, written provisionally then rewritten once the final
//! block's padding length is known), and reverses the process on decode.
//! A `.sbx.raid` twin, when present, is consulted per-block whenever the
//! primary sidecar fails its CRC or Reed-Solomon check.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use nix::sys::stat::utimes;
use nix::sys::time::TimeVal;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::block::{self, DecodedBlock, VersionParams};
use crate::error::{Result, SbxError};
use crate::metadata::Metadata;
use crate::password::Keystream;
use crate::perf::WriteBuffer;

/// Options governing an encode pass.
pub struct EncodeOptions {
    pub version: u8,
    pub uid: Option<[u8; 6]>,
    pub password: Option<String>,
    pub raid: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions { version: 1, uid: None, password: None, raid: false }
    }
}

pub struct EncodeReport {
    pub sbx_path: PathBuf,
    pub sbx_size: u64,
    pub total_blocks: u64,
    pub overhead_pct: f64,
}

fn random_uid() -> [u8; 6] {
    rand::random()
}

pub(crate) fn sha256_file(path: &Path) -> Result<[u8; 32]> {
    let mut f = File::open(path).map_err(|e| SbxError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 1024];
    loop {
        let n = f.read(&mut buf).map_err(|e| SbxError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

fn unix_mtime(path: &Path) -> Result<i64> {
    let meta = fs::metadata(path).map_err(|e| SbxError::io(path, e))?;
    let mtime = meta
        .modified()
        .map_err(|e| SbxError::io(path, e))?
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Ok(mtime as i64)
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Removes `sbx_path` and its `.raid` twin on drop unless [`disarm`]ed,
/// so any error between sidecar creation and a fully committed encode never
/// leaves a partial sidecar a later reader could mistake for valid (spec
/// §4.3 failure semantics, §7 "the encoder treats all errors as fatal and
/// rolls back partial sidecars").
///
/// [`disarm`]: RollbackGuard::disarm
struct RollbackGuard<'a> {
    sbx_path: &'a Path,
    armed: bool,
}

impl<'a> RollbackGuard<'a> {
    fn new(sbx_path: &'a Path) -> Self {
        RollbackGuard { sbx_path, armed: true }
    }

    /// Encode committed successfully: leave the sidecar (and twin) in place.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(path = %self.sbx_path.display(), "encode failed, removing partial sidecar");
            let _ = fs::remove_file(self.sbx_path);
            let _ = fs::remove_file(raid_path_for(self.sbx_path));
        }
    }
}

/// Encode `src` into a new SBX sidecar at `sbx_path`.
pub fn encode_file(src: &Path, sbx_path: &Path, opts: &EncodeOptions) -> Result<EncodeReport> {
    let params = VersionParams::for_version(opts.version)
        .map_err(|_| SbxError::UnsupportedVersion { version: opts.version })?;
    let uid = opts.uid.unwrap_or_else(random_uid);

    let filesize = fs::metadata(src).map_err(|e| SbxError::io(src, e))?.len();
    let sha256 = sha256_file(src)?;
    let filedatetime = unix_mtime(src)?;
    let sbxdatetime = unix_now();
    let filename = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sbxname = sbx_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut out = File::create(sbx_path).map_err(|e| SbxError::io(sbx_path, e))?;
    let rollback = RollbackGuard::new(sbx_path);

    let mut meta = Metadata {
        filename: Some(filename),
        sbxname: Some(sbxname),
        filesize: Some(filesize),
        filedatetime: Some(filedatetime),
        sbxdatetime: Some(sbxdatetime),
        sha256: Some(sha256),
        padding_last_block: Some(0),
        redundancy_level: None,
    };
    write_block0(&mut out, &params, uid, &meta)?;

    let keystream = match &opts.password {
        Some(pass) => Some(Keystream::derive(pass, params.chunk_read_size)?),
        None => None,
    };

    let mut fin = File::open(src).map_err(|e| SbxError::io(src, e))?;
    let mut blocknum: u32 = 0;
    let mut buf = vec![0u8; params.chunk_read_size];
    // Data blocks stream through a write buffer sized to a handful of
    // blocks at a time, so the many fixed-size block writes (512 B at
    // version 1) coalesce into far fewer underlying syscalls.
    let mut writer = WriteBuffer::new(out, params.blocksize * 32);
    loop {
        let n = read_fill(&mut fin, &mut buf).map_err(|e| SbxError::io(src, e))?;
        if n == 0 {
            break;
        }
        let mut data = buf[..n].to_vec();
        let mut padding = 0u16;
        if n < params.chunk_read_size {
            padding = (params.chunk_read_size - n) as u16;
            data.extend(std::iter::repeat(block::TAIL_BYTE).take(padding as usize));
            meta.padding_last_block = Some(padding);
        }
        if let Some(ks) = &keystream {
            ks.apply(&mut data);
        }
        blocknum += 1;
        let encoded = block::encode_block(&params, uid, blocknum, &data)?;
        writer.write_all(&encoded).map_err(|e| SbxError::io(sbx_path, e))?;
        if n < params.chunk_read_size {
            break;
        }
    }
    let mut out = writer.into_inner().map_err(|e| SbxError::io(sbx_path, e))?;

    // Rewrite block 0 now that padding_last_block is known.
    out.seek(SeekFrom::Start(0)).map_err(|e| SbxError::io(sbx_path, e))?;
    write_block0(&mut out, &params, uid, &meta)?;
    out.flush().map_err(|e| SbxError::io(sbx_path, e))?;
    drop(out);

    if opts.raid {
        let raid_path = raid_path_for(sbx_path);
        fs::copy(sbx_path, &raid_path).map_err(|e| SbxError::io(&raid_path, e))?;
    }

    let total_blocks = blocknum as u64 + 1;
    let sbx_size = total_blocks * params.blocksize as u64;
    let overhead_pct = if filesize > 0 {
        100.0 * sbx_size as f64 / filesize as f64 - 100.0
    } else {
        0.0
    };

    rollback.disarm();
    Ok(EncodeReport { sbx_path: sbx_path.to_path_buf(), sbx_size, total_blocks, overhead_pct })
}

fn write_block0(
    out: &mut File,
    params: &VersionParams,
    uid: [u8; 6],
    meta: &Metadata,
) -> Result<()> {
    let mut tlv = meta.encode()?;
    if tlv.len() > params.chunk_read_size {
        return Err(SbxError::MalformedBlock { reason: "metadata exceeds one block".into() });
    }
    tlv.extend(std::iter::repeat(block::TAIL_BYTE).take(params.chunk_read_size - tlv.len()));
    let encoded = block::encode_block(params, uid, 0, &tlv)?;
    out.write_all(&encoded).map_err(|e| SbxError::io("<sbx>", e))
}

fn read_fill(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

pub fn raid_path_for(sbx_path: &Path) -> PathBuf {
    let mut s = sbx_path.as_os_str().to_owned();
    s.push(".raid");
    PathBuf::from(s)
}

/// Options governing a decode pass.
pub struct DecodeOptions {
    pub version: u8,
    pub raid: bool,
    pub password: Option<String>,
    pub overwrite: bool,
    pub continue_on_error: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions { version: 1, raid: false, password: None, overwrite: false, continue_on_error: false }
    }
}

pub struct DecodeReport {
    pub out_path: PathBuf,
    pub bytes_written: u64,
    pub hash_verified: bool,
}

/// Read one physical block at `index` (0-based) from `primary`, falling back
/// to `raid` (if given) on CRC or Reed-Solomon failure.
fn read_block_with_raid(
    primary: &mut File,
    raid: Option<&mut File>,
    params: &VersionParams,
    index: u64,
) -> Result<DecodedBlock> {
    let offset = index * params.blocksize as u64;
    let mut buf = vec![0u8; params.blocksize];

    primary
        .seek(SeekFrom::Start(offset))
        .map_err(|e| SbxError::io("<sbx>", e))?;
    let primary_result = primary.read_exact(&mut buf).map_err(|e| SbxError::io("<sbx>", e));

    let decoded = if primary_result.is_ok() {
        block::decode_block(params, &buf).ok()
    } else {
        None
    };

    if let Some(d) = decoded {
        return Ok(d);
    }

    if let Some(raid) = raid {
        warn!(block = index, "primary block failed, falling back to RAID twin");
        raid.seek(SeekFrom::Start(offset)).map_err(|e| SbxError::io("<sbx.raid>", e))?;
        raid.read_exact(&mut buf).map_err(|e| SbxError::io("<sbx.raid>", e))?;
        return block::decode_block(params, &buf).map_err(SbxError::from);
    }

    Err(SbxError::RsUncorrectable { blocknum: index as u32 })
}

/// Decode an SBX sidecar back into its original file.
pub fn decode_file(sbx_path: &Path, out_path: &Path, opts: &DecodeOptions) -> Result<DecodeReport> {
    if out_path.exists() && !opts.overwrite {
        return Err(SbxError::TargetExists(out_path.to_path_buf()));
    }

    let params = VersionParams::for_version(opts.version)
        .map_err(|_| SbxError::UnsupportedVersion { version: opts.version })?;

    let mut primary = File::open(sbx_path).map_err(|e| SbxError::io(sbx_path, e))?;
    let raid_path = raid_path_for(sbx_path);
    let mut raid_file = if opts.raid && raid_path.exists() {
        Some(File::open(&raid_path).map_err(|e| SbxError::io(&raid_path, e))?)
    } else {
        None
    };

    let header = read_block_with_raid(&mut primary, raid_file.as_mut(), &params, 0)
        .map_err(|_| SbxError::HeaderUnrecoverable)?;
    let has_metadata = header.blocknum == 0;
    if header.blocknum > 1 {
        return Err(SbxError::HeaderOutOfOrder { got: header.blocknum });
    }

    let (meta, hash_check) = if has_metadata {
        let meta = Metadata::decode(&header.data)?;
        let hash_check = meta.sha256.is_some();
        (meta, hash_check)
    } else {
        (Metadata::default(), false)
    };

    // Corrected block-count math: ceil(filesize / chunk_read_size), not the
    // truncating division the original tool used (which undercounts by one
    // whenever filesize isn't an exact multiple of chunk_read_size).
    let total_data_blocks = if has_metadata {
        let filesize = meta.filesize.unwrap_or(0);
        if filesize == 0 {
            0
        } else {
            (filesize + params.chunk_read_size as u64 - 1) / params.chunk_read_size as u64
        }
    } else {
        // No metadata block: every block in the sidecar, including the one
        // just read as a would-be header, is a data block. Fall back to the
        // sidecar's own length to find out how many there are.
        let sbx_len = primary.metadata().map_err(|e| SbxError::io(sbx_path, e))?.len();
        sbx_len / params.blocksize as u64
    };
    let padding_last_block = meta.padding_last_block.unwrap_or(0) as u64;

    let mut out = File::create(out_path).map_err(|e| SbxError::io(out_path, e))?;
    let keystream = match &opts.password {
        Some(pass) => Some(Keystream::derive(pass, params.chunk_read_size)?),
        None => None,
    };

    let mut hasher = Sha256::new();
    let mut bytes_written: u64 = 0;
    let mut last_blocknum: u32 = 0;

    let first_data_index: u64 = if has_metadata { 1 } else { 0 };
    for i in 0..total_data_blocks {
        let index = first_data_index + i;
        let block = match read_block_with_raid(&mut primary, raid_file.as_mut(), &params, index) {
            Ok(b) => b,
            Err(e) => {
                if opts.continue_on_error {
                    warn!(block = index, error = %e, "skipping unreadable block");
                    continue;
                }
                return Err(e);
            }
        };

        if block.blocknum != last_blocknum + 1 && !opts.continue_on_error {
            return Err(SbxError::BlockMissing(last_blocknum + 1));
        }
        last_blocknum = block.blocknum;

        let mut data = block.data;
        if let Some(ks) = &keystream {
            ks.apply(&mut data);
        }

        let is_final = i == total_data_blocks - 1;
        if is_final && padding_last_block > 0 {
            let keep = data.len().saturating_sub(padding_last_block as usize);
            data.truncate(keep);
        }

        out.write_all(&data).map_err(|e| SbxError::io(out_path, e))?;
        if hash_check {
            hasher.update(&data);
        }
        bytes_written += data.len() as u64;
    }
    out.flush().map_err(|e| SbxError::io(out_path, e))?;

    let mut hash_verified = false;
    if hash_check {
        let computed: [u8; 32] = hasher.finalize().into();
        if Some(computed) == meta.sha256 {
            hash_verified = true;
        } else {
            debug!("decoded content hash does not match stored HSH digest");
            return Err(SbxError::HashMismatch);
        }
    }

    // Restore the original file's mtime from FDT, the same (time.time(),
    // filedatetime) atime/mtime pair the upstream tool passes to os.utime.
    if let Some(fdt) = meta.filedatetime {
        let atime = TimeVal::new(unix_now(), 0);
        let mtime = TimeVal::new(fdt, 0);
        if let Err(e) = utimes(out_path, &atime, &mtime) {
            warn!(path = %out_path.display(), error = %e, "failed to restore mtime from FDT");
        }
    }

    Ok(DecodeReport { out_path: out_path.to_path_buf(), bytes_written, hash_verified })
}

/// Read just the metadata block, for `sbxdec --info`-style inspection.
pub fn read_metadata(sbx_path: &Path, version: u8, raid: bool) -> Result<Metadata> {
    let params = VersionParams::for_version(version)
        .map_err(|_| SbxError::UnsupportedVersion { version })?;
    let mut primary = File::open(sbx_path).map_err(|e| SbxError::io(sbx_path, e))?;
    let raid_path = raid_path_for(sbx_path);
    let mut raid_file = if raid && raid_path.exists() {
        Some(File::open(&raid_path).map_err(|e| SbxError::io(&raid_path, e))?)
    } else {
        None
    };
    let header = read_block_with_raid(&mut primary, raid_file.as_mut(), &params, 0)?;
    if header.blocknum != 0 {
        return Ok(Metadata::default());
    }
    Metadata::decode(&header.data[..params.chunk_read_size]).map_err(SbxError::from)
}

pub fn open_readwrite(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| SbxError::io(path, e))
}
