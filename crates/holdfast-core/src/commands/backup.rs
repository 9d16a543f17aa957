//! Capture a new snapshot of a backup set's source tree.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use tracing::{debug, info};

use crate::backup_set::BackupSet;
use crate::blob::{self, BlobId, BLOB_SIZE};
use crate::destination::Destination;
use crate::error::{HoldfastError, Result};
use crate::index::BlobIndex;
use crate::snapshot::{self, catalog, FileSnapshot, Snapshot};

/// Result of a snapshot run.
#[derive(Debug, Clone, Copy)]
pub struct BackupOutcome {
    pub files: u64,
    pub total_size: u64,
    /// Distinct blobs referenced by the new manifest.
    pub referenced_blobs: usize,
    /// Blobs written to the destination by this run.
    pub uploaded_blobs: usize,
}

struct SnapshotContext<'a> {
    dest: &'a dyn Destination,
    snapshot: Snapshot,
    previous: Option<Snapshot>,
    existing: BlobIndex,
    referenced: HashMap<BlobId, u32>,
    uploaded: HashMap<BlobId, u32>,
    blob_size: usize,
    /// Chunk buffer, allocated once per run and reused for every file.
    buf: Vec<u8>,
}

/// Capture a new snapshot of the backup set.
pub fn run(set: &BackupSet) -> Result<BackupOutcome> {
    take_snapshot_at(set, Utc::now(), BLOB_SIZE)
}

/// Snapshot run with an explicit creation time and blob size. Tests use this
/// to pin timestamps and keep blobs small.
pub(crate) fn take_snapshot_at(
    set: &BackupSet,
    created_at: DateTime<Utc>,
    blob_size: usize,
) -> Result<BackupOutcome> {
    let source = Path::new(&set.config().source.path);
    let excludes = build_excludes(source, &set.config().source.exclude)?;
    let dest = set.open_destination()?;

    let snapshot = Snapshot::new(created_at);
    if dest.file_exists(&snapshot.manifest_key())? {
        return Err(HoldfastError::SnapshotCollision(snapshot.rel_path()));
    }

    let existing = BlobIndex::load(dest.as_ref())?;
    let previous = catalog::latest_before(dest.as_ref(), snapshot.created_at)?;
    match &previous {
        Some(prev) => info!(previous = %prev.rel_path(), "found previous snapshot"),
        None => info!("no previous snapshot found"),
    }

    let mut ctx = SnapshotContext {
        dest: dest.as_ref(),
        snapshot,
        previous,
        existing,
        referenced: HashMap::new(),
        uploaded: HashMap::new(),
        blob_size,
        buf: vec![0u8; blob_size],
    };

    gather_files(set, excludes, &mut ctx)?;
    info!(
        files = ctx.snapshot.files.len(),
        total_size = ctx.snapshot.total_size,
        "gathered files for snapshot"
    );

    upload_blobs(set, &mut ctx)?;
    info!(
        uploaded = ctx.uploaded.len(),
        referenced = ctx.referenced.len(),
        "uploaded blobs"
    );

    // Every referenced blob is on the destination at this point. The manifest
    // write publishes the snapshot; the index rewrite below is the commit
    // point, so a crash in between leaves a readable snapshot.
    ctx.dest
        .write_file(&ctx.snapshot.manifest_key(), &ctx.snapshot.encode()?)?;

    let mut index = BlobIndex::load(ctx.dest)?;
    index.merge(ctx.referenced.iter().map(|(id, len)| (*id, *len)));
    index.store(ctx.dest)?;

    Ok(BackupOutcome {
        files: ctx.snapshot.files.len() as u64,
        total_size: ctx.snapshot.total_size,
        referenced_blobs: ctx.referenced.len(),
        uploaded_blobs: ctx.uploaded.len(),
    })
}

fn build_excludes(source: &Path, patterns: &[String]) -> Result<ignore::gitignore::Gitignore> {
    let mut builder = ignore::gitignore::GitignoreBuilder::new(source);
    for pat in patterns {
        builder
            .add_line(None, pat)
            .map_err(|e| HoldfastError::Config(format!("invalid exclude pattern '{pat}': {e}")))?;
    }
    builder
        .build()
        .map_err(|e| HoldfastError::Config(format!("exclude matcher build failed: {e}")))
}

/// Walk the source tree and record every regular file into the manifest in
/// progress. Directories contribute nothing; the tree is rebuilt from file
/// paths at read time.
fn gather_files(
    set: &BackupSet,
    excludes: ignore::gitignore::Gitignore,
    ctx: &mut SnapshotContext,
) -> Result<()> {
    let source = Path::new(&set.config().source.path);
    if !source.is_dir() {
        return Err(HoldfastError::Config(format!(
            "source directory does not exist: {}",
            source.display()
        )));
    }

    let mut walker = WalkBuilder::new(source);
    walker
        .follow_links(false)
        .hidden(false)
        .ignore(false)
        .git_global(false)
        .git_exclude(false)
        .git_ignore(false)
        .require_git(false)
        .sort_by_file_name(std::ffi::OsStr::cmp);

    let source_buf = source.to_path_buf();
    walker.filter_entry(move |entry| {
        let path = entry.path();
        if path == source_buf {
            return true;
        }
        let rel = path.strip_prefix(&source_buf).unwrap_or(path);
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        !excludes.matched_path_or_any_parents(rel, is_dir).is_ignore()
    });

    for entry in walker.build() {
        let entry = entry.map_err(|e| HoldfastError::Other(format!("walk error: {e}")))?;
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            if file_type.is_symlink() {
                debug!(path = %entry.path().display(), "skipping symlink");
            }
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(source)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if rel_path.is_empty() {
            continue;
        }
        if rel_path.as_bytes().contains(&0) {
            return Err(HoldfastError::InvalidFormat(format!(
                "path contains a NUL byte: {rel_path:?}"
            )));
        }

        let metadata = std::fs::symlink_metadata(entry.path())?;
        let modified: DateTime<Utc> = metadata.modified()?.into();
        let size = metadata.len();
        ctx.snapshot.total_size += size;
        ctx.snapshot.files.insert(
            rel_path.clone(),
            FileSnapshot {
                path: rel_path,
                last_modified: snapshot::truncate_to_millis(modified),
                size,
                blobs: Vec::new(),
            },
        );
    }
    Ok(())
}

fn upload_blobs(set: &BackupSet, ctx: &mut SnapshotContext) -> Result<()> {
    let mut paths: Vec<String> = ctx.snapshot.files.keys().cloned().collect();
    paths.sort();
    for path in paths {
        upload_blobs_of_file(set, ctx, &path)
            .map_err(|e| match e {
                e @ (HoldfastError::Inconsistent(_) | HoldfastError::Config(_)) => e,
                e => HoldfastError::Other(format!("upload file blobs of '{path}': {e}")),
            })?;
    }
    Ok(())
}

fn upload_blobs_of_file(set: &BackupSet, ctx: &mut SnapshotContext, rel_path: &str) -> Result<()> {
    let mut file = ctx.snapshot.files[rel_path].clone();

    // Unchanged-file fast path: the same path with an equal mtime at
    // millisecond precision adopts the previous blob chain verbatim.
    // Filesystems with coarser mtime resolution miss this and re-chunk.
    if let Some(prev) = &ctx.previous {
        if let Some(prev_file) = prev.files.get(rel_path) {
            if prev_file.last_modified.timestamp_millis() == file.last_modified.timestamp_millis()
            {
                for id in &prev_file.blobs {
                    let Some(len) = ctx.existing.get(id) else {
                        return Err(HoldfastError::Inconsistent(format!(
                            "file '{rel_path}' is unchanged but blob {id} is missing from the destination index"
                        )));
                    };
                    ctx.referenced.insert(*id, len);
                }
                file.blobs = prev_file.blobs.clone();
                debug!(
                    path = rel_path,
                    blobs = file.blobs.len(),
                    "unchanged file, adopting previous blob chain"
                );
                ctx.snapshot.files.insert(rel_path.to_string(), file);
                return Ok(());
            }
        }
    }

    let local_path = Path::new(&set.config().source.path).join(rel_path);
    let mut f = File::open(&local_path)?;

    file.blobs = Vec::with_capacity((file.size / ctx.blob_size as u64) as usize + 1);
    let mut offset = 0u64;
    while offset < file.size {
        let chunk_len = (file.size - offset).min(ctx.blob_size as u64) as usize;
        f.read_exact(&mut ctx.buf[..chunk_len])?;
        let chunk = &ctx.buf[..chunk_len];

        let id = BlobId::compute(chunk);
        file.blobs.push(id);
        ctx.referenced.insert(id, chunk_len as u32);

        if !ctx.existing.contains(&id) {
            blob::write_blob(ctx.dest, &id, chunk)?;
            // Recording the upload in the in-memory index makes identical
            // chunks later in this run dedup against the one just written.
            ctx.existing.insert(id, chunk_len as u32);
            ctx.uploaded.insert(id, chunk_len as u32);
        }
        offset += chunk_len as u64;
    }

    debug!(path = rel_path, blobs = file.blobs.len(), "chunked file");
    ctx.snapshot.files.insert(rel_path.to_string(), file);
    Ok(())
}
