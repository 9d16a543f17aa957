//! Read-only WebDAV server for browsing a snapshot.
//!
//! Exposes one snapshot as a virtual filesystem that file managers can mount
//! natively. The snapshot is immutable; every mutating verb is rejected.

use std::convert::Infallible;
use std::fmt;
use std::io::SeekFrom;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::Bytes;
use dav_server::davpath::DavPath;
use dav_server::fs::*;
use dav_server::DavHandler;
use futures_util::stream;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use lru::LruCache;
use tokio::net::TcpListener;

use crate::backup_set::BackupSet;
use crate::blob::BlobId;
use crate::browser::Browser;
use crate::error::{HoldfastError, Result};
use crate::snapshot::{FileSnapshot, Snapshot};

type BlobCache = Arc<Mutex<LruCache<BlobId, Arc<Vec<u8>>>>>;

// ─── DavMetaData ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct DavMeta {
    size: u64,
    mtime: SystemTime,
    is_dir: bool,
}

impl DavMeta {
    fn for_file(file: &FileSnapshot) -> Self {
        Self {
            size: file.size,
            mtime: file.last_modified.into(),
            is_dir: false,
        }
    }

    fn for_dir(snapshot: &Snapshot) -> Self {
        Self {
            size: 0,
            mtime: snapshot.created_at.into(),
            is_dir: true,
        }
    }
}

impl DavMetaData for DavMeta {
    fn len(&self) -> u64 {
        self.size
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.mtime)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

// ─── DavDirEntry ───────────────────────────────────────────────────────────

struct HoldfastDirEntry {
    name: String,
    meta: DavMeta,
}

impl DavDirEntry for HoldfastDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = self.meta.clone();
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }
}

// ─── DavFileSystem ─────────────────────────────────────────────────────────

/// Read-only WebDAV filesystem backed by a snapshot [`Browser`].
#[derive(Clone)]
struct HoldfastDavFs {
    browser: Arc<Browser>,
    cache: BlobCache,
}

impl HoldfastDavFs {
    fn path_str(path: &DavPath) -> FsResult<String> {
        let path = std::str::from_utf8(path.as_bytes()).map_err(|_| FsError::NotFound)?;
        Ok(path.trim_matches('/').to_string())
    }
}

impl DavFileSystem for HoldfastDavFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let path = Self::path_str(path)?;
            if self.browser.is_dir(&path) {
                return Ok(Box::new(DavMeta::for_dir(self.browser.snapshot()))
                    as Box<dyn DavMetaData>);
            }
            match self.browser.get_file(&path) {
                Some(file) => Ok(Box::new(DavMeta::for_file(file)) as Box<dyn DavMetaData>),
                None => Err(FsError::NotFound),
            }
        })
    }

    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _meta: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let path = Self::path_str(path)?;
            if !self.browser.is_dir(&path) {
                return Err(FsError::NotFound);
            }
            let snapshot = self.browser.snapshot();
            let mut entries: Vec<FsResult<Box<dyn DavDirEntry>>> = Vec::new();
            for name in self.browser.list_dirs(&path) {
                entries.push(Ok(Box::new(HoldfastDirEntry {
                    name,
                    meta: DavMeta::for_dir(snapshot),
                }) as Box<dyn DavDirEntry>));
            }
            for file in self.browser.list_files(&path) {
                entries.push(Ok(Box::new(HoldfastDirEntry {
                    name: Browser::file_name(&file.path),
                    meta: DavMeta::for_file(file),
                }) as Box<dyn DavDirEntry>));
            }
            Ok(Box::pin(stream::iter(entries)) as FsStream<Box<dyn DavDirEntry>>)
        })
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            if options.write || options.append || options.create || options.create_new {
                return Err(FsError::Forbidden);
            }

            let path = Self::path_str(path)?;
            match self.browser.get_file(&path) {
                Some(file) => Ok(Box::new(HoldfastDavFile {
                    file: file.clone(),
                    pos: 0,
                    browser: self.browser.clone(),
                    cache: self.cache.clone(),
                }) as Box<dyn DavFile>),
                None if self.browser.is_dir(&path) => Err(FsError::Forbidden),
                None => Err(FsError::NotFound),
            }
        })
    }
}

// ─── DavFile ───────────────────────────────────────────────────────────────

struct HoldfastDavFile {
    file: FileSnapshot,
    pos: u64,
    browser: Arc<Browser>,
    cache: BlobCache,
}

impl fmt::Debug for HoldfastDavFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HoldfastDavFile")
            .field("path", &self.file.path)
            .field("pos", &self.pos)
            .field("size", &self.file.size)
            .finish()
    }
}

/// Read a blob via the LRU cache, falling back to the destination.
fn read_blob_cached(
    browser: &Arc<Browser>,
    cache: &BlobCache,
    id: &BlobId,
) -> FsResult<Arc<Vec<u8>>> {
    {
        let mut guard = cache.lock().unwrap();
        if let Some(data) = guard.get(id) {
            return Ok(data.clone());
        }
    }

    let data = browser.read_blob(id).map_err(|_| FsError::GeneralFailure)?;
    let data = Arc::new(data);

    {
        let mut guard = cache.lock().unwrap();
        guard.put(*id, data.clone());
    }

    Ok(data)
}

impl DavFile for HoldfastDavFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = DavMeta::for_file(&self.file);
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        let browser = self.browser.clone();
        let cache = self.cache.clone();
        let blobs = self.file.blobs.clone();
        let start_pos = self.pos;
        let file_size = self.file.size;

        Box::pin(async move {
            if start_pos >= file_size {
                return Ok(Bytes::new());
            }

            let count = count.min((file_size - start_pos) as usize);

            let result = tokio::task::spawn_blocking(move || -> FsResult<Vec<u8>> {
                let mut buf = Vec::with_capacity(count);
                let mut remaining = count;
                let mut offset = start_pos;
                let mut blob_start: u64 = 0;

                for id in &blobs {
                    let blob_len = browser
                        .blob_index()
                        .get(id)
                        .ok_or(FsError::GeneralFailure)? as u64;
                    let blob_end = blob_start + blob_len;

                    if offset >= blob_end {
                        blob_start = blob_end;
                        continue;
                    }
                    if remaining == 0 {
                        break;
                    }

                    let data = read_blob_cached(&browser, &cache, id)?;

                    let start_in_blob = (offset - blob_start) as usize;
                    let available = data.len().saturating_sub(start_in_blob);
                    let to_copy = remaining.min(available);

                    buf.extend_from_slice(&data[start_in_blob..start_in_blob + to_copy]);

                    remaining -= to_copy;
                    offset += to_copy as u64;
                    blob_start = blob_end;
                }

                Ok(buf)
            })
            .await
            .map_err(|_| FsError::GeneralFailure)??;

            let bytes_read = result.len() as u64;
            self.pos += bytes_read;
            Ok(Bytes::from(result))
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        Box::pin(async move {
            let new_pos = match pos {
                SeekFrom::Start(p) => p,
                SeekFrom::Current(p) => {
                    if p >= 0 {
                        self.pos.saturating_add(p as u64)
                    } else {
                        self.pos
                            .checked_sub((-p) as u64)
                            .ok_or(FsError::GeneralFailure)?
                    }
                }
                SeekFrom::End(p) => {
                    if p >= 0 {
                        self.file.size.saturating_add(p as u64)
                    } else {
                        self.file
                            .size
                            .checked_sub((-p) as u64)
                            .ok_or(FsError::GeneralFailure)?
                    }
                }
            };
            self.pos = new_pos;
            Ok(new_pos)
        })
    }

    fn write_buf(&mut self, _buf: Box<dyn bytes::Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async { Err(FsError::Forbidden) })
    }

    fn write_bytes(&mut self, _buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async { Err(FsError::Forbidden) })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

// ─── Public API ────────────────────────────────────────────────────────────

/// Start a read-only WebDAV server exposing one snapshot at the root.
pub fn run(set: &BackupSet, snapshot: Snapshot, address: &str, cache_size: usize) -> Result<()> {
    let browser = Arc::new(Browser::new(set, snapshot)?);
    let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
    let cache: BlobCache = Arc::new(Mutex::new(LruCache::new(cache_size)));

    let fs = HoldfastDavFs { browser, cache };
    let handler = DavHandler::builder()
        .filesystem(Box::new(fs))
        .build_handler();

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| HoldfastError::Other(format!("failed to create tokio runtime: {e}")))?;

    rt.block_on(async { serve(handler, address).await })
}

async fn serve(handler: DavHandler, address: &str) -> Result<()> {
    let addr: std::net::SocketAddr = address
        .parse()
        .map_err(|e| HoldfastError::Config(format!("invalid address '{address}': {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| HoldfastError::Other(format!("failed to bind to {addr}: {e}")))?;

    eprintln!("WebDAV server listening on http://{addr}");
    eprintln!("The snapshot is served read-only. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, _) = result
                    .map_err(|e| HoldfastError::Other(format!("accept error: {e}")))?;
                let io = TokioIo::new(stream);
                let handler = handler.clone();

                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(
                            io,
                            service_fn(move |req| {
                                let handler = handler.clone();
                                async move {
                                    Ok::<_, Infallible>(handler.handle(req).await)
                                }
                            }),
                        )
                        .await
                    {
                        tracing::debug!("connection error: {e}");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down.");
                break;
            }
        }
    }

    Ok(())
}
