//! Legacy scan/recover tooling (`sbxscan`/`sbxreco`), specified at the
//! external-interface level only — not part of the core container format.
//!
//! [`scan_into_db`] forward-scans arbitrary files or raw devices for
//! candidate SBX blocks, tolerant of garbage before/after/between them
//! (a scan-classify-and-skip-past-declared-length loop, here keyed on
//! `(uid, blocknum)` instead of `(file_id, file_offset)`), and records every
//! hit into a SQLite database. [`reconstruct`] reverses the process,
//! reassembling `.sbx` sidecars from that database.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::{debug, warn};

use crate::block::{self, VersionParams, MAGIC};
use crate::metadata::Metadata;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("no blocks found for the requested selector")]
    NothingToReconstruct,
}

pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Open (creating if necessary) the scan database and ensure its schema
/// exists. Table/column names match the normative on-disk schema exactly; the
/// schema itself is treated as an internal artifact, not a versioned
/// external interface (see DESIGN.md).
pub fn open_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sbx_source(
            id   INTEGER PRIMARY KEY,
            name TEXT UNIQUE NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sbx_uids(
            uid BLOB PRIMARY KEY,
            ver INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sbx_meta(
            uid         BLOB,
            size        INTEGER,
            name        TEXT,
            sbxname     TEXT,
            datetime    INTEGER,
            sbxdatetime INTEGER,
            fileid      INTEGER
        );
        CREATE TABLE IF NOT EXISTS sbx_blocks(
            uid    BLOB,
            num    INTEGER,
            fileid INTEGER,
            pos    INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_sbx_blocks ON sbx_blocks(uid, num, pos);",
    )?;
    Ok(conn)
}

#[derive(Debug, Default)]
pub struct ScanSummary {
    pub sources_scanned: usize,
    pub blocks_found: usize,
    pub meta_blocks_found: usize,
}

fn source_id(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO sbx_source(name) VALUES (?1)",
        params![name],
    )?;
    let id: i64 =
        conn.query_row("SELECT id FROM sbx_source WHERE name = ?1", params![name], |r| r.get(0))?;
    Ok(id)
}

/// Scan `sources` for candidate SBX blocks and record them into `db_path`.
///
/// Tolerant of leading/trailing/interleaved garbage: the scan looks for the
/// `"SBx"` magic at any byte offset, validates the candidate block (version
/// byte, then a full decode through RS/CRC for that version's blocksize),
/// and on success records `(uid, blocknum, source, offset)` before skipping
/// forward past the full block. A failed candidate only advances by one
/// byte, so the scan can resynchronize after corruption.
pub fn scan_into_db(sources: &[PathBuf], db_path: &Path) -> Result<ScanSummary> {
    let conn = open_db(db_path)?;
    let mut summary = ScanSummary::default();

    for src in sources {
        let name = src.to_string_lossy().into_owned();
        let fileid = source_id(&conn, &name)?;
        let data = fs::read(src)?;
        summary.sources_scanned += 1;

        let mut pos = 0usize;
        while pos + 4 <= data.len() {
            if data[pos..pos + 3] != MAGIC {
                pos += 1;
                continue;
            }
            let version = data[pos + 3];
            let params = match VersionParams::for_version(version) {
                Ok(p) => p,
                Err(_) => {
                    pos += 1;
                    continue;
                }
            };
            if pos + params.blocksize > data.len() {
                pos += 1;
                continue;
            }

            let raw = &data[pos..pos + params.blocksize];
            match block::decode_block(&params, raw) {
                Ok(decoded) => {
                    conn.execute(
                        "INSERT OR REPLACE INTO sbx_uids(uid, ver) VALUES (?1, ?2)",
                        params![decoded.uid.as_slice(), version as i64],
                    )?;
                    conn.execute(
                        "INSERT INTO sbx_blocks(uid, num, fileid, pos) VALUES (?1, ?2, ?3, ?4)",
                        params![decoded.uid.as_slice(), decoded.blocknum as i64, fileid, pos as i64],
                    )?;
                    summary.blocks_found += 1;

                    if decoded.blocknum == 0 {
                        if let Ok(meta) = Metadata::decode(&decoded.data) {
                            conn.execute(
                                "INSERT INTO sbx_meta(uid, size, name, sbxname, datetime, sbxdatetime, fileid)
                                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                                params![
                                    decoded.uid.as_slice(),
                                    meta.filesize.map(|v| v as i64),
                                    meta.filename,
                                    meta.sbxname,
                                    meta.filedatetime,
                                    meta.sbxdatetime,
                                    fileid,
                                ],
                            )?;
                            summary.meta_blocks_found += 1;
                        }
                    }
                    pos += params.blocksize;
                }
                Err(e) => {
                    debug!(offset = pos, error = %e, "candidate block rejected, resyncing");
                    pos += 1;
                }
            }
        }
    }

    Ok(summary)
}

/// Which sidecars to reassemble from the scan database.
pub enum RecoSelector {
    All,
    Uids(Vec<[u8; 6]>),
    SbxNames(Vec<String>),
    FileNames(Vec<String>),
}

pub struct RecoOptions {
    /// Fill gaps in the block sequence with zeroed data blocks rather than
    /// failing the reconstruction outright.
    pub fill_missing: bool,
    pub overwrite: bool,
}

impl Default for RecoOptions {
    fn default() -> Self {
        RecoOptions { fill_missing: false, overwrite: false }
    }
}

fn matching_uids(conn: &Connection, selector: &RecoSelector) -> Result<Vec<([u8; 6], u8)>> {
    let mut out = Vec::new();
    match selector {
        RecoSelector::All => {
            let mut stmt = conn.prepare("SELECT uid, ver FROM sbx_uids")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                out.push((blob_to_uid(row.get(0)?), row.get::<_, i64>(1)? as u8));
            }
        }
        RecoSelector::Uids(uids) => {
            for uid in uids {
                let ver: Option<i64> = conn
                    .query_row(
                        "SELECT ver FROM sbx_uids WHERE uid = ?1",
                        params![uid.as_slice()],
                        |r| r.get(0),
                    )
                    .ok();
                if let Some(ver) = ver {
                    out.push((*uid, ver as u8));
                }
            }
        }
        RecoSelector::SbxNames(names) => {
            for name in names {
                let mut stmt =
                    conn.prepare("SELECT uid FROM sbx_meta WHERE sbxname = ?1")?;
                let mut rows = stmt.query(params![name])?;
                while let Some(row) = rows.next()? {
                    let uid = blob_to_uid(row.get(0)?);
                    if let Ok(ver) = conn.query_row(
                        "SELECT ver FROM sbx_uids WHERE uid = ?1",
                        params![uid.as_slice()],
                        |r| r.get::<_, i64>(0),
                    ) {
                        out.push((uid, ver as u8));
                    }
                }
            }
        }
        RecoSelector::FileNames(names) => {
            for name in names {
                let mut stmt = conn.prepare("SELECT uid FROM sbx_meta WHERE name = ?1")?;
                let mut rows = stmt.query(params![name])?;
                while let Some(row) = rows.next()? {
                    let uid = blob_to_uid(row.get(0)?);
                    if let Ok(ver) = conn.query_row(
                        "SELECT ver FROM sbx_uids WHERE uid = ?1",
                        params![uid.as_slice()],
                        |r| r.get::<_, i64>(0),
                    ) {
                        out.push((uid, ver as u8));
                    }
                }
            }
        }
    }
    Ok(out)
}

fn blob_to_uid(blob: Vec<u8>) -> [u8; 6] {
    let mut uid = [0u8; 6];
    let n = blob.len().min(6);
    uid[..n].copy_from_slice(&blob[..n]);
    uid
}

/// Reassemble every sidecar matching `selector` from `db_path` into
/// `dest_dir`. Returns the paths of the sidecars written.
pub fn reconstruct(
    db_path: &Path,
    dest_dir: &Path,
    selector: &RecoSelector,
    opts: &RecoOptions,
) -> Result<Vec<PathBuf>> {
    let conn = open_db(db_path)?;
    let uids = matching_uids(&conn, selector)?;
    if uids.is_empty() {
        return Err(RecoveryError::NothingToReconstruct);
    }

    let mut written = Vec::new();
    for (uid, version) in uids {
        let params = VersionParams::for_version(version).unwrap_or(block::V1);

        let max_num: i64 = conn.query_row(
            "SELECT COALESCE(MAX(num), 0) FROM sbx_blocks WHERE uid = ?1",
            params![uid.as_slice()],
            |r| r.get(0),
        )?;

        let sbxname: Option<String> = conn
            .query_row(
                "SELECT sbxname FROM sbx_meta WHERE uid = ?1",
                params![uid.as_slice()],
                |r| r.get(0),
            )
            .ok();
        let out_name = sbxname.unwrap_or_else(|| format!("{}.sbx", hex::encode(uid)));
        let out_path = dest_dir.join(&out_name);
        if out_path.exists() && !opts.overwrite {
            warn!(path = %out_path.display(), "skipping existing sidecar (no -o)");
            continue;
        }

        let mut blocks = Vec::with_capacity(max_num as usize + 1);
        let mut missing = 0usize;
        for num in 0..=max_num {
            let row: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT fileid, pos FROM sbx_blocks WHERE uid = ?1 AND num = ?2 LIMIT 1",
                    params![uid.as_slice(), num],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .ok();

            let raw = match row {
                Some((fileid, pos)) => {
                    let source: String = conn.query_row(
                        "SELECT name FROM sbx_source WHERE id = ?1",
                        params![fileid],
                        |r| r.get(0),
                    )?;
                    let bytes = fs::read(&source)?;
                    let pos = pos as usize;
                    bytes[pos..pos + params.blocksize].to_vec()
                }
                None if opts.fill_missing => {
                    missing += 1;
                    vec![0u8; params.blocksize]
                }
                None => {
                    return Err(RecoveryError::NothingToReconstruct);
                }
            };
            blocks.push(raw);
        }

        if missing > 0 {
            warn!(uid = %hex::encode(uid), missing, "filled missing blocks with zeroed data");
        }

        fs::create_dir_all(dest_dir)?;
        let mut out = Vec::with_capacity(blocks.len() * params.blocksize);
        for b in blocks {
            out.extend_from_slice(&b);
        }
        fs::write(&out_path, out)?;
        written.push(out_path);
    }

    Ok(written)
}
