use std::io::{ErrorKind, Read, Seek, SeekFrom};

use chrono::{TimeZone, Utc};

use crate::blob::{self, BlobId};
use crate::browser::Browser;
use crate::index::BlobIndex;
use crate::snapshot::{FileSnapshot, Snapshot};
use crate::testutil::MemoryDestination;

use super::helpers::ts;

/// Browser over one file split into the given blobs, with index and store
/// populated accordingly.
fn browser_with_blobs(path: &str, blobs: &[&[u8]]) -> Browser {
    let dest = MemoryDestination::new();
    let mut index = BlobIndex::new();
    let mut chain = Vec::new();
    let mut size = 0u64;
    for body in blobs {
        let id = BlobId::compute(body);
        blob::write_blob(&dest, &id, body).unwrap();
        index.insert(id, body.len() as u32);
        chain.push(id);
        size += body.len() as u64;
    }
    index.store(&dest).unwrap();

    let mut snapshot = Snapshot::new(ts("20250101T120000Z"));
    snapshot.total_size = size;
    snapshot.files.insert(
        path.to_string(),
        FileSnapshot {
            path: path.to_string(),
            last_modified: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            size,
            blobs: chain,
        },
    );
    Browser::from_destination(Box::new(dest), snapshot).unwrap()
}

const B1: &[u8] = b"0123456789";
const B2: &[u8] = b"abcdefghij";
const B3: &[u8] = b"XY";

fn read_all(reader: &mut impl Read) -> Vec<u8> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn linear_read_reconstructs_file() {
    let browser = browser_with_blobs("file.bin", &[B1, B2, B3]);
    let mut reader = browser.open_file("file.bin").unwrap();
    assert_eq!(reader.size(), 22);
    assert_eq!(read_all(&mut reader), b"0123456789abcdefghijXY");
}

#[test]
fn read_never_spans_blobs() {
    let browser = browser_with_blobs("file.bin", &[B1, B2, B3]);
    let mut reader = browser.open_file("file.bin").unwrap();
    let mut buf = [0u8; 64];
    // The first call stops at the end of the first blob.
    assert_eq!(reader.read(&mut buf).unwrap(), 10);
    assert_eq!(&buf[..10], B1);
    assert_eq!(reader.read(&mut buf).unwrap(), 10);
    assert_eq!(&buf[..10], B2);
    assert_eq!(reader.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], B3);
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn read_within_blob_honors_buffer_len() {
    let browser = browser_with_blobs("file.bin", &[B1, B2]);
    let mut reader = browser.open_file("file.bin").unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"0123");
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"4567");
}

#[test]
fn seek_then_read_matches_linear_read() {
    let browser = browser_with_blobs("file.bin", &[B1, B2, B3]);
    let linear = {
        let mut reader = browser.open_file("file.bin").unwrap();
        read_all(&mut reader)
    };
    for offset in [0u64, 1, 9, 10, 11, 19, 20, 21, 22] {
        let mut reader = browser.open_file("file.bin").unwrap();
        assert_eq!(reader.seek(SeekFrom::Start(offset)).unwrap(), offset);
        let rest = read_all(&mut reader);
        assert_eq!(rest, &linear[offset as usize..], "offset {offset}");
    }
}

#[test]
fn seek_crossing_into_middle_blob() {
    let browser = browser_with_blobs("file.bin", &[B1, B2, B3]);
    let mut reader = browser.open_file("file.bin").unwrap();
    reader.seek(SeekFrom::Start(15)).unwrap();
    let mut buf = [0u8; 32];
    // Remainder of the second blob only.
    assert_eq!(reader.read(&mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"fghij");
}

#[test]
fn seek_from_end_and_current() {
    let browser = browser_with_blobs("file.bin", &[B1, B2, B3]);
    let mut reader = browser.open_file("file.bin").unwrap();
    assert_eq!(reader.seek(SeekFrom::End(-2)).unwrap(), 20);
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"XY");

    reader.seek(SeekFrom::Start(5)).unwrap();
    assert_eq!(reader.seek(SeekFrom::Current(3)).unwrap(), 8);
    assert_eq!(reader.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"89");
}

#[test]
fn seek_past_end_reads_nothing() {
    let browser = browser_with_blobs("file.bin", &[B1]);
    let mut reader = browser.open_file("file.bin").unwrap();
    assert_eq!(reader.seek(SeekFrom::Start(100)).unwrap(), 100);
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn read_at_size_is_end_of_stream() {
    let browser = browser_with_blobs("file.bin", &[B1]);
    let mut reader = browser.open_file("file.bin").unwrap();
    reader.seek(SeekFrom::Start(10)).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn negative_seek_is_an_error() {
    let browser = browser_with_blobs("file.bin", &[B1]);
    let mut reader = browser.open_file("file.bin").unwrap();
    let err = reader.seek(SeekFrom::Current(-1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = reader.seek(SeekFrom::End(-11)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    // The failed seek leaves the position untouched.
    assert_eq!(read_all(&mut reader), B1);
}

#[test]
fn zero_byte_file_reads_nothing() {
    let browser = browser_with_blobs("empty.bin", &[]);
    let mut reader = browser.open_file("empty.bin").unwrap();
    assert_eq!(reader.size(), 0);
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn missing_blob_in_index_fails_read() {
    let dest = MemoryDestination::new();
    let id = BlobId::compute(b"data");
    blob::write_blob(&dest, &id, b"data").unwrap();
    // Index left empty: the chain references an unindexed blob.
    let mut snapshot = Snapshot::new(ts("20250101T120000Z"));
    snapshot.files.insert(
        "file.bin".to_string(),
        FileSnapshot {
            path: "file.bin".to_string(),
            last_modified: Utc.timestamp_millis_opt(0).unwrap(),
            size: 4,
            blobs: vec![id],
        },
    );
    let browser = Browser::from_destination(Box::new(dest), snapshot).unwrap();
    let mut reader = browser.open_file("file.bin").unwrap();
    let mut buf = [0u8; 8];
    assert!(reader.read(&mut buf).is_err());
}

#[test]
fn missing_blob_in_store_fails_read() {
    let dest = MemoryDestination::new();
    let id = BlobId::compute(b"data");
    let mut index = BlobIndex::new();
    index.insert(id, 4);
    index.store(&dest).unwrap();
    // Indexed but never written to the store.
    let mut snapshot = Snapshot::new(ts("20250101T120000Z"));
    snapshot.files.insert(
        "file.bin".to_string(),
        FileSnapshot {
            path: "file.bin".to_string(),
            last_modified: Utc.timestamp_millis_opt(0).unwrap(),
            size: 4,
            blobs: vec![id],
        },
    );
    let browser = Browser::from_destination(Box::new(dest), snapshot).unwrap();
    let mut reader = browser.open_file("file.bin").unwrap();
    let mut buf = [0u8; 8];
    assert!(reader.read(&mut buf).is_err());
}

#[test]
fn browsing_survives_index_loss_after_load() {
    use std::sync::Arc;

    let dest = Arc::new(MemoryDestination::new());
    let id = BlobId::compute(b"still here");
    blob::write_blob(&*dest, &id, b"still here").unwrap();
    let mut index = BlobIndex::new();
    index.insert(id, 10);
    index.store(&*dest).unwrap();

    let mut snapshot = Snapshot::new(ts("20250101T120000Z"));
    snapshot.files.insert(
        "file.bin".to_string(),
        FileSnapshot {
            path: "file.bin".to_string(),
            last_modified: Utc.timestamp_millis_opt(0).unwrap(),
            size: 10,
            blobs: vec![id],
        },
    );
    let browser = Browser::from_destination(Box::new(dest.clone()), snapshot).unwrap();

    // The on-destination index disappears after the browser loaded its copy.
    BlobIndex::new().store(&*dest).unwrap();

    let mut reader = browser.open_file("file.bin").unwrap();
    assert_eq!(read_all(&mut reader), b"still here");
}

#[test]
fn close_is_idempotent_and_reading_continues() {
    let browser = browser_with_blobs("file.bin", &[B1, B2]);
    let mut reader = browser.open_file("file.bin").unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(reader.read(&mut buf).unwrap(), 10);
    reader.close();
    reader.close();
    assert_eq!(reader.read(&mut buf).unwrap(), 10);
    assert_eq!(&buf, B2);
}
