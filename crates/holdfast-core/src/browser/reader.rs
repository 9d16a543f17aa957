use std::io::{self, Read, Seek, SeekFrom};

use crate::blob::BlobId;
use crate::error::{HoldfastError, Result};
use crate::index::BlobIndex;
use crate::snapshot::FileSnapshot;

use super::Browser;

/// Locate the blob covering byte `pos` of a file.
///
/// Returns `(blob id, file offset of the blob's first byte)`, or `None` when
/// `pos` is at or past the end of the chain. Lengths come from the blob
/// index; a chain blob missing from the index is an error.
pub(crate) fn locate_blob(
    blobs: &[BlobId],
    index: &BlobIndex,
    pos: u64,
) -> Result<Option<(BlobId, u64)>> {
    let mut start = 0u64;
    for id in blobs {
        let len = index.get(id).ok_or(HoldfastError::BlobNotInIndex(*id))? as u64;
        if pos < start + len {
            return Ok(Some((*id, start)));
        }
        start += len;
    }
    Ok(None)
}

/// Seekable reader reconstructing a file from its blob chain on demand.
///
/// A single read never spans two blobs; callers loop. The most recently
/// fetched blob is kept so adjacent reads do not refetch it.
pub struct SnapshotFileReader<'a> {
    browser: &'a Browser,
    file: FileSnapshot,
    pos: u64,
    cached: Option<(BlobId, Vec<u8>)>,
}

impl<'a> SnapshotFileReader<'a> {
    pub(crate) fn new(browser: &'a Browser, file: FileSnapshot) -> Self {
        Self {
            browser,
            file,
            pos: 0,
            cached: None,
        }
    }

    /// Total size of the file being read.
    pub fn size(&self) -> u64 {
        self.file.size
    }

    /// Drop any cached blob bytes. Idempotent; reading afterwards refetches.
    pub fn close(&mut self) {
        self.cached = None;
    }

    fn fill_cache(&mut self, id: BlobId) -> Result<()> {
        if !matches!(&self.cached, Some((cached, _)) if *cached == id) {
            let data = self.browser.read_blob(&id)?;
            self.cached = Some((id, data));
        }
        Ok(())
    }
}

impl Read for SnapshotFileReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let located = locate_blob(&self.file.blobs, self.browser.blob_index(), self.pos)
            .map_err(io::Error::other)?;
        let Some((id, blob_start)) = located else {
            // At or past end of file.
            return Ok(0);
        };
        self.fill_cache(id).map_err(io::Error::other)?;
        let Some((_, data)) = &self.cached else {
            // fill_cache just populated the cache.
            return Ok(0);
        };

        let blob_offset = (self.pos - blob_start) as usize;
        if blob_offset >= data.len() {
            return Err(io::Error::other(format!(
                "blob {id} is shorter than its indexed length"
            )));
        }
        let n = buf.len().min(data.len() - blob_offset);
        buf[..n].copy_from_slice(&data[blob_offset..blob_offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SnapshotFileReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(offset) => i128::from(self.pos) + i128::from(offset),
            SeekFrom::End(offset) => i128::from(self.file.size) + i128::from(offset),
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.pos = u64::try_from(target).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek position overflow")
        })?;
        Ok(self.pos)
    }
}
