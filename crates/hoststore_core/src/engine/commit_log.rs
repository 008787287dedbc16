//! Durable commit log.
//!
//! Each committed write batch is appended as one framed record:
//!
//! ```text
//! | magic (4) | version (2) | length (4) | payload (length) | crc32 (4) |
//! ```
//!
//! The CRC covers the header and the payload. Integers are little-endian.
//!
//! Payload layout:
//!
//! ```text
//! | sequence (8) | op count (4) | op* |
//! op = | tag (1) | key len (4) | key | [value len (4) | value | expires_at (8)] |
//! ```
//!
//! Tag 1 is a put and carries the bracketed part; tag 2 is a delete.
//! `expires_at` is milliseconds since the epoch, `0` meaning no expiry.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use bytes::Bytes;
use hoststore_storage::{StorageBackend, StorageResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Magic bytes opening every commit record.
pub const LOG_MAGIC: [u8; 4] = *b"HSCL";

/// Current commit record format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_SIZE: usize = 10;

const CRC_SIZE: usize = 4;

const TAG_PUT: u8 = 1;
const TAG_DELETE: u8 = 2;

/// One write inside a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOp {
    /// Upsert of a key.
    Put {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Bytes,
        /// Expiry in epoch milliseconds.
        expires_at: Option<u64>,
    },
    /// Removal of a key.
    Delete {
        /// Key bytes.
        key: Vec<u8>,
    },
}

impl LogOp {
    /// The key this op writes.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// All writes of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    /// Sequence number the batch committed under.
    pub sequence: SequenceNumber,
    /// Writes in key order.
    pub ops: Vec<LogOp>,
}

impl CommitBatch {
    /// Serializes the batch payload (without framing).
    ///
    /// # Errors
    ///
    /// Returns a validation error if a key, a value or the op count does
    /// not fit a 4-byte length field.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(12 + self.ops.len() * 32);
        buf.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf.extend_from_slice(&len_u32(self.ops.len(), "op count")?.to_le_bytes());

        for op in &self.ops {
            match op {
                LogOp::Put {
                    key,
                    value,
                    expires_at,
                } => {
                    buf.push(TAG_PUT);
                    put_chunk(&mut buf, key, "key")?;
                    put_chunk(&mut buf, value, "value")?;
                    buf.extend_from_slice(&expires_at.unwrap_or(0).to_le_bytes());
                }
                LogOp::Delete { key } => {
                    buf.push(TAG_DELETE);
                    put_chunk(&mut buf, key, "key")?;
                }
            }
        }
        Ok(buf)
    }

    /// Deserializes a batch payload found at log offset `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] if the payload is malformed.
    pub fn decode_payload(payload: &[u8], offset: u64) -> CoreResult<Self> {
        let mut cursor = PayloadCursor {
            payload,
            pos: 0,
            offset,
        };

        let sequence = SequenceNumber::new(cursor.u64()?);
        let count = cursor.u32()? as usize;
        let mut ops = Vec::with_capacity(count.min(4096));

        for _ in 0..count {
            let tag = cursor.u8()?;
            let key = cursor.chunk()?.to_vec();
            let op = match tag {
                TAG_PUT => {
                    let value = Bytes::copy_from_slice(cursor.chunk()?);
                    let expires_at = match cursor.u64()? {
                        0 => None,
                        at => Some(at),
                    };
                    LogOp::Put {
                        key,
                        value,
                        expires_at,
                    }
                }
                TAG_DELETE => LogOp::Delete { key },
                other => {
                    return Err(CoreError::log_corruption(
                        offset,
                        format!("unknown op tag {other}"),
                    ))
                }
            };
            ops.push(op);
        }

        if cursor.pos != payload.len() {
            return Err(CoreError::log_corruption(
                offset,
                format!(
                    "trailing bytes in commit record: used {} of {}",
                    cursor.pos,
                    payload.len()
                ),
            ));
        }

        Ok(Self { sequence, ops })
    }
}

fn len_u32(len: usize, what: &str) -> CoreResult<u32> {
    u32::try_from(len)
        .map_err(|_| CoreError::validation(format!("{what} too large for commit log: {len}")))
}

fn put_chunk(buf: &mut Vec<u8>, data: &[u8], what: &str) -> CoreResult<()> {
    buf.extend_from_slice(&len_u32(data.len(), what)?.to_le_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

struct PayloadCursor<'a> {
    payload: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> PayloadCursor<'a> {
    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| CoreError::log_corruption(self.offset, "unexpected end of payload"))?;
        let slice = &self.payload[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn chunk(&mut self) -> CoreResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

/// Frames a payload into a complete commit record.
fn frame(payload: &[u8]) -> CoreResult<Vec<u8>> {
    let len = len_u32(payload.len(), "commit record")?;
    let mut record = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    record.extend_from_slice(&LOG_MAGIC);
    record.extend_from_slice(&LOG_VERSION.to_le_bytes());
    record.extend_from_slice(&len.to_le_bytes());
    record.extend_from_slice(payload);
    let crc = crc32fast::hash(&record);
    record.extend_from_slice(&crc.to_le_bytes());
    Ok(record)
}

fn write_record(
    backend: &mut dyn StorageBackend,
    record: &[u8],
    sync: bool,
) -> StorageResult<u64> {
    let offset = backend.append(record)?;
    if sync {
        backend.sync()?;
    }
    Ok(offset)
}

/// Append-only log of committed batches over a storage backend.
pub struct CommitLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
    /// Set when a failed append could not be cut back off the log.
    poisoned: AtomicBool,
}

impl CommitLog {
    /// Wraps a backend. Nothing is read until [`replay`](Self::replay).
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
            poisoned: AtomicBool::new(false),
        }
    }

    /// Appends one batch and returns the offset it was written at.
    ///
    /// If the write or the sync fails, the log is truncated back to its
    /// size before the append, so a failed batch never reappears on replay.
    /// If that truncation fails too, the log is poisoned and every later
    /// append fails with [`CoreError::LogPoisoned`].
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be encoded, the backend fails,
    /// or the log is poisoned.
    pub fn append(&self, batch: &CommitBatch) -> CoreResult<u64> {
        let record = frame(&batch.encode_payload()?)?;
        let mut backend = self.backend.lock();
        if self.is_poisoned() {
            return Err(CoreError::LogPoisoned);
        }

        let start = backend.size()?;
        match write_record(&mut **backend, &record, self.sync_on_commit) {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if let Err(undo) = backend.truncate(start).and_then(|()| backend.sync()) {
                    self.poisoned.store(true, Ordering::SeqCst);
                    tracing::error!(
                        offset = start,
                        error = %err,
                        undo_error = %undo,
                        "failed append left in commit log, refusing further commits"
                    );
                } else {
                    tracing::warn!(offset = start, error = %err, "commit log append failed");
                }
                Err(err.into())
            }
        }
    }

    /// Whether a failed append could not be undone.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Reads every complete batch in log order.
    ///
    /// A record cut short at the end of the log (a torn write) is dropped
    /// and the log is truncated to the last complete record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] for bad magic, an unsupported
    /// version, a CRC mismatch or a malformed payload.
    pub fn replay(&self) -> CoreResult<Vec<CommitBatch>> {
        let mut backend = self.backend.lock();
        let size = backend.size()?;
        let total = usize::try_from(size)
            .map_err(|_| CoreError::log_corruption(0, "commit log larger than address space"))?;
        let data = if total == 0 {
            Vec::new()
        } else {
            backend.read_at(0, total)?
        };

        let mut batches = Vec::new();
        let mut pos = 0usize;

        while pos < data.len() {
            let offset = pos as u64;
            let remaining = data.len() - pos;

            if remaining < HEADER_SIZE {
                if data[pos..].iter().zip(LOG_MAGIC.iter()).any(|(a, b)| a != b) {
                    return Err(CoreError::log_corruption(offset, "invalid magic"));
                }
                break;
            }

            let header = &data[pos..pos + HEADER_SIZE];
            if header[0..4] != LOG_MAGIC {
                return Err(CoreError::log_corruption(offset, "invalid magic"));
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version > LOG_VERSION {
                return Err(CoreError::log_corruption(
                    offset,
                    format!("unsupported version {version}"),
                ));
            }
            let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;

            let record_len = HEADER_SIZE + len + CRC_SIZE;
            if remaining < record_len {
                break;
            }

            let body_end = pos + HEADER_SIZE + len;
            let expected = u32::from_le_bytes([
                data[body_end],
                data[body_end + 1],
                data[body_end + 2],
                data[body_end + 3],
            ]);
            let actual = crc32fast::hash(&data[pos..body_end]);
            if expected != actual {
                return Err(CoreError::log_corruption(
                    offset,
                    format!("crc mismatch: stored {expected:#010x}, computed {actual:#010x}"),
                ));
            }

            batches.push(CommitBatch::decode_payload(
                &data[pos + HEADER_SIZE..body_end],
                offset,
            )?);
            pos += record_len;
        }

        if pos < data.len() {
            tracing::warn!(
                offset = pos,
                dropped = data.len() - pos,
                "truncating torn commit log tail"
            );
            backend.truncate(pos as u64)?;
            backend.sync()?;
        }

        Ok(batches)
    }

    /// Replaces the whole log with `batches`.
    ///
    /// A successful rewrite clears the poisoned state, since the damaged
    /// tail is gone with the old contents.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend rewrite fails.
    pub fn rewrite(&self, batches: &[CommitBatch]) -> CoreResult<()> {
        let mut contents = Vec::new();
        for batch in batches {
            contents.extend_from_slice(&frame(&batch.encode_payload()?)?);
        }
        let mut backend = self.backend.lock();
        backend.rewrite(&contents)?;
        self.poisoned.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .field("poisoned", &self.is_poisoned())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoststore_storage::InMemoryBackend;

    fn sample(seq: u64) -> CommitBatch {
        CommitBatch {
            sequence: SequenceNumber::new(seq),
            ops: vec![
                LogOp::Put {
                    key: b"page:faq".to_vec(),
                    value: Bytes::from_static(b"\x0a\x03faq"),
                    expires_at: None,
                },
                LogOp::Put {
                    key: b"recover:a@b.c".to_vec(),
                    value: Bytes::from_static(b"code"),
                    expires_at: Some(1_700_000_060_000),
                },
                LogOp::Delete {
                    key: b"page:help".to_vec(),
                },
            ],
        }
    }

    fn log_over(data: Vec<u8>) -> CommitLog {
        CommitLog::new(Box::new(InMemoryBackend::with_data(data)), true)
    }

    #[test]
    fn payload_keeps_ops_and_expiry() {
        let batch = sample(3);
        let payload = batch.encode_payload().unwrap();
        assert_eq!(CommitBatch::decode_payload(&payload, 0).unwrap(), batch);
    }

    #[test]
    fn replay_returns_batches_in_order() {
        let log = log_over(Vec::new());
        log.append(&sample(1)).unwrap();
        log.append(&sample(2)).unwrap();

        let batches = log.replay().unwrap();
        let seqs: Vec<_> = batches.iter().map(|b| b.sequence.as_u64()).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn empty_log_replays_nothing() {
        assert!(log_over(Vec::new()).replay().unwrap().is_empty());
    }

    #[test]
    fn torn_tail_is_truncated() {
        let first = frame(&sample(1).encode_payload().unwrap()).unwrap();
        let second = frame(&sample(2).encode_payload().unwrap()).unwrap();
        let mut data = first.clone();
        data.extend_from_slice(&second[..second.len() - 3]);

        let log = log_over(data);
        let batches = log.replay().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(log.size().unwrap(), first.len() as u64);
    }

    #[test]
    fn torn_header_is_truncated() {
        let mut data = frame(&sample(1).encode_payload().unwrap()).unwrap();
        let keep = data.len() as u64;
        data.extend_from_slice(&LOG_MAGIC[..2]);

        let log = log_over(data);
        assert_eq!(log.replay().unwrap().len(), 1);
        assert_eq!(log.size().unwrap(), keep);
    }

    #[test]
    fn crc_mismatch_is_fatal() {
        let mut data = frame(&sample(1).encode_payload().unwrap()).unwrap();
        data[HEADER_SIZE + 2] ^= 0xFF;

        let err = log_over(data).replay().unwrap_err();
        assert!(matches!(err, CoreError::LogCorruption { offset: 0, .. }));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut data = frame(&sample(1).encode_payload().unwrap()).unwrap();
        data[0] = b'X';
        assert!(matches!(
            log_over(data).replay(),
            Err(CoreError::LogCorruption { .. })
        ));
    }

    #[test]
    fn rewrite_replaces_contents() {
        let log = log_over(Vec::new());
        log.append(&sample(1)).unwrap();
        log.append(&sample(2)).unwrap();

        let compacted = CommitBatch {
            sequence: SequenceNumber::new(2),
            ops: vec![LogOp::Put {
                key: b"page:faq".to_vec(),
                value: Bytes::from_static(b"v"),
                expires_at: None,
            }],
        };
        log.rewrite(std::slice::from_ref(&compacted)).unwrap();
        assert_eq!(log.replay().unwrap(), vec![compacted]);
    }
}
