//! Snapshot stream format.
//!
//! ```text
//! [magic "SHLF"][version u32 BE][record count u64 BE]
//! [frame]*
//! [blake3 digest of everything above, 32 bytes]
//! ```
//!
//! Each frame is `[payload len u32 LE][crc32 u32 LE][bincode payload]`,
//! the payload being one [`SnapshotRecord`]. Records are written in
//! depth-first order so that a namespace always precedes its contents.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::keys::ROOT;
use crate::traits::BackupSink;
use crate::tree::ReadTree;

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"SHLF";
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: u64 = 16;
const FRAME_HEADER_LEN: u64 = 8;
const TRAILER_LEN: u64 = 32;

/// One record of a snapshot stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotRecord {
    /// A namespace, by its full path from the root.
    Namespace { path: Vec<Vec<u8>> },
    /// A leaf entry inside the namespace at `path`.
    Entry {
        path: Vec<Vec<u8>>,
        key: Vec<u8>,
        value: Vec<u8>,
    },
}

/// Totals of a written or read snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub namespaces: u64,
    pub entries: u64,
    pub bytes: u64,
}

impl SnapshotSummary {
    fn count(&mut self, record: &SnapshotRecord) {
        match record {
            SnapshotRecord::Namespace { .. } => self.namespaces += 1,
            SnapshotRecord::Entry { .. } => self.entries += 1,
        }
    }

    pub fn records(&self) -> u64 {
        self.namespaces + self.entries
    }
}

fn bincode_err(e: bincode::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

/// Depth-first walk of the whole tree, namespaces before their contents,
/// siblings in ascending name order.
pub(crate) fn walk(
    tree: &ReadTree,
    visit: &mut dyn FnMut(SnapshotRecord) -> StoreResult<()>,
) -> StoreResult<()> {
    let mut stack: Vec<(u64, Vec<Vec<u8>>)> = vec![(ROOT, Vec::new())];

    while let Some((id, path)) = stack.pop() {
        if !path.is_empty() {
            visit(SnapshotRecord::Namespace { path: path.clone() })?;
        }

        tree.visit_entries(id, &mut |key, value| {
            visit(SnapshotRecord::Entry {
                path: path.clone(),
                key: key.to_vec(),
                value: value.to_vec(),
            })
        })?;

        let children = tree.child_buckets(id)?;
        for (name, child) in children.into_iter().rev() {
            let mut child_path = path.clone();
            child_path.push(name);
            stack.push((child, child_path));
        }
    }

    Ok(())
}

struct HashingSink<'a> {
    inner: &'a mut dyn BackupSink,
    hasher: blake3::Hasher,
    written: u64,
}

impl HashingSink<'_> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.hasher.update(buf);
        self.inner.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }
}

/// Write a snapshot of `tree` to `sink`.
///
/// Two passes over the same read transaction: the first sizes every frame
/// so the total can be announced before the header goes out, the second
/// streams the frames.
pub(crate) fn write_snapshot(tree: &ReadTree, sink: &mut dyn BackupSink) -> StoreResult<u64> {
    let mut summary = SnapshotSummary::default();
    let mut body_len = 0u64;
    walk(tree, &mut |record| {
        body_len += FRAME_HEADER_LEN + bincode::serialized_size(&record).map_err(bincode_err)?;
        summary.count(&record);
        Ok(())
    })?;

    let total = HEADER_LEN + body_len + TRAILER_LEN;
    sink.announce_length(total)?;

    let mut out = HashingSink {
        inner: sink,
        hasher: blake3::Hasher::new(),
        written: 0,
    };

    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(SNAPSHOT_MAGIC);
    header.extend_from_slice(&SNAPSHOT_VERSION.to_be_bytes());
    header.extend_from_slice(&summary.records().to_be_bytes());
    out.write_all(&header)?;

    walk(tree, &mut |record| {
        let payload = bincode::serialize(&record).map_err(bincode_err)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            StoreError::Serialization(format!("record too large: {} bytes", payload.len()))
        })?;
        let crc = crc32fast::hash(&payload);
        out.write_all(&len.to_le_bytes())?;
        out.write_all(&crc.to_le_bytes())?;
        out.write_all(&payload)?;
        Ok(())
    })?;

    let digest = out.hasher.finalize();
    out.inner.write_all(digest.as_bytes())?;
    out.inner.flush()?;
    let written = out.written + TRAILER_LEN;

    debug!(
        namespaces = summary.namespaces,
        entries = summary.entries,
        bytes = written,
        "snapshot written"
    );
    Ok(written)
}

struct HashingSource<R> {
    inner: R,
    hasher: blake3::Hasher,
    read: u64,
}

impl<R: Read> HashingSource<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)?;
        self.hasher.update(buf);
        self.read += buf.len() as u64;
        Ok(())
    }
}

fn truncated(record: u64, e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StoreError::CorruptSnapshot {
            record,
            reason: "stream ended early".into(),
        }
    } else {
        StoreError::Io(e)
    }
}

/// Decode and validate a snapshot stream, handing each record to `apply`
/// as it is read.
///
/// The checksum trailer is only checked after the last record, so callers
/// that apply records must do so somewhere they can discard (an
/// uncommitted transaction) until this returns `Ok`.
pub fn read_snapshot<R: Read>(
    source: R,
    apply: &mut dyn FnMut(SnapshotRecord) -> StoreResult<()>,
) -> StoreResult<SnapshotSummary> {
    let mut src = HashingSource {
        inner: source,
        hasher: blake3::Hasher::new(),
        read: 0,
    };

    let mut header = [0u8; HEADER_LEN as usize];
    src.read_exact(&mut header).map_err(|e| truncated(0, e))?;
    if &header[..4] != SNAPSHOT_MAGIC {
        return Err(StoreError::InvalidMagic {
            expected: String::from_utf8_lossy(SNAPSHOT_MAGIC).into_owned(),
            actual: String::from_utf8_lossy(&header[..4]).into_owned(),
        });
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&header[4..8]);
    let version = u32::from_be_bytes(word);
    if version != SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[8..16]);
    let count = u64::from_be_bytes(count_bytes);

    let mut summary = SnapshotSummary::default();
    for index in 0..count {
        let mut frame = [0u8; FRAME_HEADER_LEN as usize];
        src.read_exact(&mut frame).map_err(|e| truncated(index, e))?;
        let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let expected_crc = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);

        let mut payload = Vec::new();
        (&mut src.inner)
            .take(u64::from(len))
            .read_to_end(&mut payload)?;
        if payload.len() != len as usize {
            return Err(StoreError::CorruptSnapshot {
                record: index,
                reason: "stream ended early".into(),
            });
        }
        src.hasher.update(&payload);
        src.read += payload.len() as u64;

        if crc32fast::hash(&payload) != expected_crc {
            return Err(StoreError::CorruptSnapshot {
                record: index,
                reason: "crc mismatch".into(),
            });
        }
        let record: SnapshotRecord =
            bincode::deserialize(&payload).map_err(|e| StoreError::CorruptSnapshot {
                record: index,
                reason: e.to_string(),
            })?;
        summary.count(&record);
        apply(record)?;
    }

    let digest = src.hasher.finalize();
    let mut trailer = [0u8; TRAILER_LEN as usize];
    src.inner
        .read_exact(&mut trailer)
        .map_err(|e| truncated(count, e))?;
    if digest.as_bytes() != &trailer {
        return Err(StoreError::ChecksumMismatch);
    }
    let mut extra = [0u8; 1];
    if src.inner.read(&mut extra)? != 0 {
        return Err(StoreError::CorruptSnapshot {
            record: count,
            reason: "trailing bytes after checksum".into(),
        });
    }

    summary.bytes = src.read + TRAILER_LEN;
    Ok(summary)
}

/// Validate a snapshot stream without applying it anywhere.
pub fn verify_snapshot<R: Read>(source: R) -> StoreResult<SnapshotSummary> {
    read_snapshot(source, &mut |_| Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RedbStore;
    use crate::query::Query;
    use crate::traits::Storer;

    fn sample_store() -> RedbStore {
        let store = RedbStore::in_memory().unwrap();
        store
            .put(&[
                Query::at(["products", "Cards", "Birthday"])
                    .key("clown")
                    .value(br#"{"description":"a sad clown","id":"33"}"#.to_vec()),
                Query::at(["products", "Cards"])
                    .key("_price_")
                    .value(br#"{"retail":"3.50","wholesale":"1.75"}"#.to_vec()),
                Query::at(["images", "products", "clown"])
                    .key("image")
                    .value(vec![0xFF, 0xD8, 0x00, 0x01]),
            ])
            .unwrap();
        store
    }

    fn snapshot(store: &RedbStore) -> Vec<u8> {
        let mut out = Vec::new();
        let written = store.backup(&mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        out
    }

    #[test]
    fn announced_length_matches_stream() {
        struct Recording {
            announced: Option<u64>,
            bytes: Vec<u8>,
        }
        impl io::Write for Recording {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.bytes.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        impl BackupSink for Recording {
            fn announce_length(&mut self, len: u64) -> io::Result<()> {
                assert!(self.bytes.is_empty(), "length announced after data");
                self.announced = Some(len);
                Ok(())
            }
        }

        let store = sample_store();
        let mut sink = Recording {
            announced: None,
            bytes: Vec::new(),
        };
        let written = store.backup(&mut sink).unwrap();
        assert_eq!(sink.announced, Some(written));
        assert_eq!(sink.bytes.len() as u64, written);
    }

    #[test]
    fn records_are_depth_first_with_namespaces_first() {
        let store = sample_store();
        let bytes = snapshot(&store);
        let mut records = Vec::new();
        read_snapshot(bytes.as_slice(), &mut |r| {
            records.push(r);
            Ok(())
        })
        .unwrap();

        let products = records
            .iter()
            .position(|r| matches!(r, SnapshotRecord::Namespace { path } if path == &vec![b"products".to_vec()]))
            .unwrap();
        let clown = records
            .iter()
            .position(|r| matches!(r, SnapshotRecord::Entry { key, .. } if key == b"clown"))
            .unwrap();
        assert!(products < clown);
    }

    #[test]
    fn verify_counts_records() {
        let store = sample_store();
        let bytes = snapshot(&store);
        let summary = verify_snapshot(bytes.as_slice()).unwrap();
        assert_eq!(summary.entries, 3);
        // six bootstrap namespaces plus Cards, Birthday, images/products, clown
        assert_eq!(summary.namespaces, 10);
        assert_eq!(summary.bytes, bytes.len() as u64);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let store = sample_store();
        let mut bytes = snapshot(&store);
        bytes[0] = b'X';
        assert!(matches!(
            verify_snapshot(bytes.as_slice()),
            Err(StoreError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let store = sample_store();
        let mut bytes = snapshot(&store);
        bytes[7] = 9;
        assert!(matches!(
            verify_snapshot(bytes.as_slice()),
            Err(StoreError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn flipped_payload_byte_fails_crc() {
        let store = sample_store();
        let mut bytes = snapshot(&store);
        // first frame payload starts right after header + frame header
        let at = (HEADER_LEN + FRAME_HEADER_LEN) as usize;
        bytes[at] ^= 0xFF;
        assert!(matches!(
            verify_snapshot(bytes.as_slice()),
            Err(StoreError::CorruptSnapshot { record: 0, .. })
        ));
    }

    #[test]
    fn damaged_trailer_fails_checksum() {
        let store = sample_store();
        let mut bytes = snapshot(&store);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            verify_snapshot(bytes.as_slice()),
            Err(StoreError::ChecksumMismatch)
        ));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let store = sample_store();
        let bytes = snapshot(&store);
        let cut = &bytes[..bytes.len() - 40];
        assert!(matches!(
            verify_snapshot(cut),
            Err(StoreError::CorruptSnapshot { .. })
        ));
    }

    #[test]
    fn trailing_garbage_is_corrupt() {
        let store = sample_store();
        let mut bytes = snapshot(&store);
        bytes.push(0);
        assert!(matches!(
            verify_snapshot(bytes.as_slice()),
            Err(StoreError::CorruptSnapshot { .. })
        ));
    }
}
