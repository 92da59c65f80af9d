//! FUSE passthrough mount: mirrors a backing directory, shielding every
//! regular file behind an SBX sidecar.
//!
//! Delegates all file/directory operations to the host filesystem; the only
//! SBX-specific behavior is at two seams:
//!
//! - `release` (after a write-capable file descriptor is closed): re-encode
//!   the just-closed path into its sidecar, on a detached worker thread so
//!   the FUSE request loop is not blocked for a full-file encode.
//! - `open`: if a sidecar exists and the live file's SHA-256 disagrees with
//!   the sidecar's stored `HSH`, rebuild the backing file from the sidecar
//!   before serving the open.
//!
//! Inode identity is the host filesystem's inode (`st_ino`). Because
//! hardlinks let one inode answer to several paths, `inode_paths` is a
//! plain multimap (`HashMap<u64, HashSet<PathBuf>>`), not a tagged
//! single-path/multi-path union: a hardlinked file must be able to answer
//! to every one of its names without picking a "primary" arbitrarily.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{FileExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::{EIO, ENOENT};
use tracing::{debug, error, warn};

use crate::checker::sidecar_path_for;
use crate::container::{self, DecodeOptions, EncodeOptions};

const TTL: Duration = Duration::from_secs(1);

pub struct MountOptions {
    pub version: u8,
    pub raid: bool,
    pub password: Option<String>,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions { version: 1, raid: false, password: None }
    }
}

struct OpenFile {
    file: File,
    ino: u64,
    path: PathBuf,
    writable: bool,
}

/// A passthrough mirror filesystem that shields every regular file it
/// writes behind an SBX sidecar.
pub struct SbxFs {
    source_root: PathBuf,
    opts: MountOptions,

    inode_paths: Mutex<HashMap<u64, HashSet<PathBuf>>>,
    lookup_counts: Mutex<HashMap<u64, u64>>,

    next_fh: AtomicU64,
    open_files: Mutex<HashMap<u64, OpenFile>>,

    /// Paths currently being (re)encoded. Guards against two concurrent
    /// `release`s racing to build the same sidecar, and tells `open` to
    /// skip its decode-on-mismatch check while a fresh encode is in
    /// flight. Locked only for set insert/remove, never across I/O. `Arc`
    /// because the encode worker thread needs its own handle to clear the
    /// entry when it finishes.
    active_sbx_encodings: Arc<Mutex<HashSet<PathBuf>>>,
}

impl SbxFs {
    pub fn new(source_root: PathBuf, opts: MountOptions) -> Self {
        let root_ino = fs::metadata(&source_root).map(|m| m.ino()).unwrap_or(1);
        let mut inode_paths = HashMap::new();
        inode_paths.insert(root_ino, HashSet::from([source_root.clone()]));

        SbxFs {
            source_root,
            opts,
            inode_paths: Mutex::new(inode_paths),
            lookup_counts: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
            open_files: Mutex::new(HashMap::new()),
            active_sbx_encodings: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn add_path(&self, ino: u64, path: PathBuf) {
        let mut map = self.inode_paths.lock().unwrap();
        map.entry(ino).or_default().insert(path);
        *self.lookup_counts.lock().unwrap().entry(ino).or_insert(0) += 1;
    }

    fn forget_path(&self, ino: u64, path: &Path) {
        let mut map = self.inode_paths.lock().unwrap();
        if let Some(set) = map.get_mut(&ino) {
            set.remove(path);
            if set.is_empty() {
                map.remove(&ino);
            }
        }
    }

    /// Pick an arbitrary representative path for `ino` (hardlinks alias a
    /// single inode to several paths; any one will do for ops that only
    /// need *a* valid path rather than every alias).
    fn path_for(&self, ino: u64) -> Option<PathBuf> {
        self.inode_paths.lock().unwrap().get(&ino).and_then(|set| set.iter().next().cloned())
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path_for(parent).map(|p| p.join(name))
    }

    fn attr_for(&self, ino: u64, path: &Path) -> Option<FileAttr> {
        let meta = fs::symlink_metadata(path).ok()?;
        Some(to_file_attr(ino, &meta))
    }

    /// Begin tracking `path` as mid-encode; returns `false` (and does
    /// nothing) if another encode of the same path is already in flight.
    fn begin_encoding(&self, path: &Path) -> bool {
        self.active_sbx_encodings.lock().unwrap().insert(path.to_path_buf())
    }

    fn is_encoding(&self, path: &Path) -> bool {
        self.active_sbx_encodings.lock().unwrap().contains(path)
    }

    /// Re-encode `path` into its sidecar on a detached worker thread, so
    /// `release` returns immediately instead of blocking the FUSE loop for
    /// a full-file Reed-Solomon pass.
    fn spawn_encode(&self, path: PathBuf) {
        if !self.begin_encoding(&path) {
            debug!(path = %path.display(), "encode already in flight, skipping duplicate");
            return;
        }
        let sbx_path = sidecar_path_for(&path);
        let opts = EncodeOptions {
            version: self.opts.version,
            uid: None,
            password: self.opts.password.clone(),
            raid: self.opts.raid,
        };
        let active = Arc::clone(&self.active_sbx_encodings);
        let flag_path = path.clone();
        std::thread::spawn(move || {
            match container::encode_file(&path, &sbx_path, &opts) {
                Ok(report) => debug!(
                    path = %path.display(),
                    blocks = report.total_blocks,
                    "sidecar re-encoded"
                ),
                Err(e) => error!(path = %path.display(), error = %e, "sidecar encode failed"),
            }
            active.lock().unwrap().remove(&flag_path);
        });
    }

    /// Decode-on-open: if a sidecar exists and the live file's hash
    /// disagrees with the sidecar's `HSH`, rebuild the backing file before
    /// serving the open. Runs synchronously (on a spawned-and-joined
    /// worker thread) because the caller's subsequent `read` needs the
    /// rebuilt content to already be in place.
    fn repair_if_needed(&self, path: &Path) {
        if self.is_encoding(path) {
            return;
        }
        let sbx_path = sidecar_path_for(path);
        if !sbx_path.exists() {
            return;
        }

        let live_hash = match container::sha256_file(path) {
            Ok(h) => h,
            Err(_) => return,
        };
        let meta = match container::read_metadata(&sbx_path, self.opts.version, self.opts.raid) {
            Ok(m) => m,
            Err(_) => return,
        };
        if meta.sha256 == Some(live_hash) {
            return;
        }

        warn!(path = %path.display(), "hash mismatch on open, rebuilding from sidecar");
        let decode_opts = DecodeOptions {
            version: self.opts.version,
            raid: self.opts.raid,
            password: self.opts.password.clone(),
            overwrite: true,
            continue_on_error: false,
        };
        let path = path.to_path_buf();
        let handle = std::thread::spawn(move || container::decode_file(&sbx_path, &path, &decode_opts));
        match handle.join() {
            Ok(Ok(_)) => debug!("sidecar rebuild succeeded"),
            Ok(Err(e)) => error!(error = %e, "sidecar rebuild failed"),
            Err(_) => error!("sidecar rebuild worker panicked"),
        }
    }
}

fn to_file_attr(ino: u64, meta: &fs::Metadata) -> FileAttr {
    let kind = if meta.is_dir() {
        FileType::Directory
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else {
        FileType::RegularFile
    };
    FileAttr {
        ino,
        size: meta.size(),
        blocks: meta.blocks(),
        atime: UNIX_EPOCH + Duration::from_secs(meta.atime().max(0) as u64),
        mtime: UNIX_EPOCH + Duration::from_secs(meta.mtime().max(0) as u64),
        ctime: UNIX_EPOCH + Duration::from_secs(meta.ctime().max(0) as u64),
        crtime: UNIX_EPOCH,
        kind,
        perm: (meta.mode() & 0o7777) as u16,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as u32,
        blksize: meta.blksize() as u32,
        flags: 0,
    }
}

fn errno_of(e: &std::io::Error) -> i32 {
    e.raw_os_error().unwrap_or(EIO)
}

impl Filesystem for SbxFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        match fs::symlink_metadata(&path) {
            Ok(meta) => {
                let ino = meta.ino();
                self.add_path(ino, path.clone());
                reply.entry(&TTL, &to_file_attr(ino, &meta), 0);
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        let mut counts = self.lookup_counts.lock().unwrap();
        let remaining = counts.entry(ino).or_insert(0);
        *remaining = remaining.saturating_sub(nlookup);
        if *remaining == 0 {
            counts.remove(&ino);
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.path_for(ino).and_then(|p| self.attr_for(ino, &p)) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(ENOENT),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(ENOENT);
            return;
        };

        if let Some(mode) = mode {
            let _ = fs::set_permissions(&path, fs::Permissions::from_mode(mode));
        }
        if let Some(size) = size {
            if let Ok(f) = OpenOptions::new().write(true).open(&path) {
                let _ = f.set_len(size);
            }
        }
        if uid.is_some() || gid.is_some() {
            // Ownership changes require CAP_CHOWN in the common case;
            // silently best-effort, matching the pyfuse3 original's
            // permissive passthrough posture.
        }

        match self.attr_for(ino, &path) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(ENOENT),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        if self.path_for(ino).is_some() {
            reply.opened(0, 0);
        } else {
            reply.error(ENOENT);
        }
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.path_for(ino) else {
            reply.error(ENOENT);
            return;
        };
        let entries = match fs::read_dir(&path) {
            Ok(e) => e,
            Err(e) => {
                reply.error(errno_of(&e));
                return;
            }
        };

        let mut all = vec![(ino, FileType::Directory, ".".to_string()), (ino, FileType::Directory, "..".to_string())];
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                let kind = if meta.is_dir() { FileType::Directory } else { FileType::RegularFile };
                all.push((meta.ino(), kind, entry.file_name().to_string_lossy().into_owned()));
            }
        }

        for (i, (e_ino, kind, name)) in all.into_iter().enumerate().skip(offset as usize) {
            if reply.add(e_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, ino: u64, reply: ReplyStatfs) {
        let path = self.path_for(ino).unwrap_or_else(|| self.source_root.clone());
        match nix::sys::statvfs::statvfs(&path) {
            Ok(stat) => reply.statfs(
                stat.blocks(),
                stat.blocks_free(),
                stat.blocks_available(),
                stat.files(),
                stat.files_free(),
                stat.fragment_size() as u32,
                stat.name_max() as u32,
                stat.fragment_size() as u32,
            ),
            Err(_) => reply.error(EIO),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for(ino) else {
            reply.error(ENOENT);
            return;
        };
        self.repair_if_needed(&path);

        let writable = flags & (libc::O_WRONLY | libc::O_RDWR) != 0;
        let opened = OpenOptions::new().read(true).write(writable).open(&path);
        match opened {
            Ok(file) => {
                let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
                self.open_files.lock().unwrap().insert(fh, OpenFile { file, ino, path, writable });
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        let opened = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(flags & libc::O_TRUNC != 0)
            .mode(mode)
            .open(&path);

        match opened {
            Ok(file) => {
                let meta = match file.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        reply.error(errno_of(&e));
                        return;
                    }
                };
                let ino = meta.ino();
                self.add_path(ino, path.clone());
                let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
                self.open_files.lock().unwrap().insert(
                    fh,
                    OpenFile { file, ino, path, writable: true },
                );
                reply.created(&TTL, &to_file_attr(ino, &meta), 0, fh, 0);
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let files = self.open_files.lock().unwrap();
        let Some(entry) = files.get(&fh) else {
            reply.error(ENOENT);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        match entry.file.read_at(&mut buf, offset as u64) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let mut files = self.open_files.lock().unwrap();
        let Some(entry) = files.get_mut(&fh) else {
            reply.error(ENOENT);
            return;
        };
        match entry.file.write_at(data, offset as u64) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        if let Some(entry) = self.open_files.lock().unwrap().get_mut(&fh) {
            let _ = entry.file.flush();
        }
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let entry = self.open_files.lock().unwrap().remove(&fh);
        if let Some(entry) = entry {
            drop(entry.file);
            if entry.writable {
                self.spawn_encode(entry.path);
            }
        }
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        let ino = fs::symlink_metadata(&path).ok().map(|m| m.ino());
        match fs::remove_file(&path) {
            Ok(()) => {
                let _ = fs::remove_file(sidecar_path_for(&path));
                let _ = fs::remove_file(container::raid_path_for(&sidecar_path_for(&path)));
                if let Some(ino) = ino {
                    self.forget_path(ino, &path);
                }
                reply.ok();
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn mkdir(&mut self, _req: &Request, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        match fs::create_dir(&path).and_then(|_| fs::set_permissions(&path, fs::Permissions::from_mode(mode))) {
            Ok(()) => match fs::symlink_metadata(&path) {
                Ok(meta) => {
                    let ino = meta.ino();
                    self.add_path(ino, path.clone());
                    reply.entry(&TTL, &to_file_attr(ino, &meta), 0);
                }
                Err(e) => reply.error(errno_of(&e)),
            },
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        let ino = fs::symlink_metadata(&path).ok().map(|m| m.ino());
        match fs::remove_dir(&path) {
            Ok(()) => {
                if let Some(ino) = ino {
                    self.forget_path(ino, &path);
                }
                reply.ok();
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(old), Some(new)) = (self.child_path(parent, name), self.child_path(newparent, newname)) else {
            reply.error(ENOENT);
            return;
        };
        match fs::rename(&old, &new) {
            Ok(()) => {
                let _ = fs::rename(sidecar_path_for(&old), sidecar_path_for(&new));
                if let Ok(meta) = fs::symlink_metadata(&new) {
                    let ino = meta.ino();
                    self.forget_path(ino, &old);
                    self.add_path(ino, new);
                }
                reply.ok();
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }
}

/// Mount `fs` at `mountpoint`, blocking until the filesystem is unmounted.
/// On unmount, `fuser` drains any outstanding requests before tearing down,
/// which gives a final in-flight release its chance to dispatch an encode;
/// that encode itself runs detached, so nothing here needs to join it.
pub fn run(source: PathBuf, mountpoint: PathBuf, opts: MountOptions) -> std::io::Result<()> {
    let fs = SbxFs::new(source, opts);
    let options = vec![
        fuser::MountOption::FSName("sbxfs".to_string()),
        fuser::MountOption::DefaultPermissions,
    ];
    fuser::mount2(fs, &mountpoint, &options)
}
