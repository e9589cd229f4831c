//! .occl append-only bucket log.
//!
//! Layout: a 64-byte little-endian header, then one record per sealed bucket,
//! each a `u32` byte length followed by a JSON `BucketRecord`.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Bucket, CounterError, CounterResult, SessionId};

/// Magic bytes: "OCCL"
const OCCL_MAGIC: u32 = 0x4F43434C;

/// Current format version.
const FORMAT_VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 64;

/// Refuse records larger than this; anything bigger is a corrupt length.
const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHeader {
    pub version: u16,
    pub flags: u16,
    pub session_id: SessionId,
    pub window_ms: u64,
    /// Unix seconds.
    pub created_at: u64,
}

/// One persisted sealed bucket, keyed by `(session_id, bucket.index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecord {
    pub session_id: SessionId,
    pub bucket: Bucket,
}

#[derive(Serialize)]
struct BucketRecordRef<'a> {
    session_id: SessionId,
    bucket: &'a Bucket,
}

/// Appends sealed buckets to a session's log file.
pub struct BucketLogWriter {
    path: PathBuf,
    session_id: SessionId,
    writer: BufWriter<File>,
    records: u64,
}

impl BucketLogWriter {
    /// Create (or truncate) a log and write its header.
    pub fn create(path: &Path, session_id: SessionId, window_ms: u64) -> CounterResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let header = LogHeader {
            version: FORMAT_VERSION,
            flags: 0,
            session_id,
            window_ms,
            created_at: chrono::Utc::now().timestamp().max(0) as u64,
        };
        write_header(&mut writer, &header)?;
        writer.flush()?;

        tracing::info!("Opened bucket log {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            session_id,
            writer,
            records: 0,
        })
    }

    pub fn append(&mut self, bucket: &Bucket) -> CounterResult<()> {
        let payload = serde_json::to_vec(&BucketRecordRef {
            session_id: self.session_id,
            bucket,
        })
        .map_err(|e| CounterError::Storage(format!("Serialization failed: {e}")))?;

        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_RECORD_LEN)
            .ok_or_else(|| {
                CounterError::Storage(format!("Record too large: {} bytes", payload.len()))
            })?;

        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> CounterResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }
}

impl Drop for BucketLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::error!("Failed to flush bucket log {}: {e}", self.path.display());
        }
    }
}

/// Contents of a bucket log.
#[derive(Debug, Clone)]
pub struct BucketLog {
    pub header: LogHeader,
    pub records: Vec<BucketRecord>,
    /// A partial record was found at the end and ignored.
    pub truncated: bool,
}

impl BucketLog {
    /// Check that records belong to the header's session and that bucket
    /// indices and windows are contiguous.
    pub fn verify(&self) -> CounterResult<()> {
        let window = self.header.window_ms as i64;
        let mut previous: Option<&Bucket> = None;
        for record in &self.records {
            let bucket = &record.bucket;
            if record.session_id != self.header.session_id {
                return Err(CounterError::Storage(format!(
                    "Bucket {} belongs to session {}, expected {}",
                    bucket.index, record.session_id, self.header.session_id
                )));
            }
            if bucket.end_ms - bucket.start_ms != window {
                return Err(CounterError::Storage(format!(
                    "Bucket {} spans {}ms, expected {window}ms",
                    bucket.index,
                    bucket.end_ms - bucket.start_ms
                )));
            }
            if let Some(prev) = previous {
                if bucket.index != prev.index + 1 || bucket.start_ms != prev.end_ms {
                    return Err(CounterError::Storage(format!(
                        "Gap between bucket {} and {}",
                        prev.index, bucket.index
                    )));
                }
            }
            previous = Some(bucket);
        }
        Ok(())
    }

    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.records.iter().map(|r| &r.bucket)
    }
}

/// Reader for .occl files.
pub struct BucketLogReader;

impl BucketLogReader {
    pub fn read_from_file(path: &Path) -> CounterResult<BucketLog> {
        let mut file = File::open(path)?;
        Self::read_from(&mut file)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> CounterResult<BucketLog> {
        let header = read_header(reader)?;
        let mut records = Vec::new();
        let mut truncated = false;

        loop {
            let mut len_buf = [0u8; 4];
            match read_full(reader, &mut len_buf)? {
                0 => break,
                4 => {}
                _ => {
                    truncated = true;
                    break;
                }
            }
            let len = read_u32(&len_buf);
            if len > MAX_RECORD_LEN {
                return Err(CounterError::Storage(format!(
                    "Record {} has invalid length {len}",
                    records.len()
                )));
            }

            let mut payload = vec![0u8; len as usize];
            if read_full(reader, &mut payload)? < payload.len() {
                truncated = true;
                break;
            }
            let record: BucketRecord = serde_json::from_slice(&payload).map_err(|e| {
                CounterError::Storage(format!("Record {} is malformed: {e}", records.len()))
            })?;
            records.push(record);
        }

        if truncated {
            tracing::warn!(
                "Bucket log ends in a partial record; kept {} records",
                records.len()
            );
        }

        Ok(BucketLog {
            header,
            records,
            truncated,
        })
    }
}

fn write_header<W: Write>(writer: &mut W, header: &LogHeader) -> CounterResult<()> {
    let mut buf = [0u8; HEADER_SIZE];
    write_u32(&mut buf[0..4], OCCL_MAGIC);
    write_u16(&mut buf[4..6], header.version);
    write_u16(&mut buf[6..8], header.flags);
    buf[8..24].copy_from_slice(header.session_id.as_uuid().as_bytes());
    write_u64(&mut buf[24..32], header.window_ms);
    write_u64(&mut buf[32..40], header.created_at);
    writer.write_all(&buf)?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> CounterResult<LogHeader> {
    let mut buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut buf)?;

    let magic = read_u32(&buf[0..4]);
    if magic != OCCL_MAGIC {
        return Err(CounterError::Storage(format!(
            "Invalid magic: expected 0x{OCCL_MAGIC:08X}, got 0x{magic:08X}"
        )));
    }
    let version = read_u16(&buf[4..6]);
    if version != FORMAT_VERSION {
        return Err(CounterError::Storage(format!(
            "Unsupported version: {version}"
        )));
    }

    let mut uuid = [0u8; 16];
    uuid.copy_from_slice(&buf[8..24]);

    Ok(LogHeader {
        version,
        flags: read_u16(&buf[6..8]),
        session_id: SessionId::from_uuid(uuid::Uuid::from_bytes(uuid)),
        window_ms: read_u64(&buf[24..32]),
        created_at: read_u64(&buf[32..40]),
    })
}

/// Read until `buf` is full or EOF; returns the byte count.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> CounterResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

// Little-endian byte helpers
fn write_u16(buf: &mut [u8], val: u16) {
    buf[..2].copy_from_slice(&val.to_le_bytes());
}
fn write_u32(buf: &mut [u8], val: u32) {
    buf[..4].copy_from_slice(&val.to_le_bytes());
}
fn write_u64(buf: &mut [u8], val: u64) {
    buf[..8].copy_from_slice(&val.to_le_bytes());
}
fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}
fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
fn read_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgeBand, Gender};

    fn bucket(index: u64) -> Bucket {
        let mut b = Bucket::empty(index, index as i64 * 1_000, 1_000);
        b.current_count = 2;
        b.total_delta = 1;
        b.running_total = index + 1;
        b.age_histogram.increment(AgeBand::From35To54);
        b.gender_histogram.increment(Gender::Male);
        b
    }

    fn write_log(path: &Path, id: SessionId, n: u64) {
        let mut writer = BucketLogWriter::create(path, id, 1_000).unwrap();
        for i in 0..n {
            writer.append(&bucket(i)).unwrap();
        }
        writer.flush().unwrap();
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("session.occl");
        let id = SessionId::new();
        write_log(&path, id, 3);

        let log = BucketLogReader::read_from_file(&path).unwrap();
        assert_eq!(log.header.session_id, id);
        assert_eq!(log.header.window_ms, 1_000);
        assert_eq!(log.records.len(), 3);
        assert_eq!(log.records[2].bucket, bucket(2));
        assert!(!log.truncated);
        log.verify().unwrap();
    }

    #[test]
    fn test_header_only_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.occl");
        write_log(&path, SessionId::new(), 0);

        let log = BucketLogReader::read_from_file(&path).unwrap();
        assert!(log.records.is_empty());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_SIZE as u64);
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.occl");
        write_log(&path, SessionId::new(), 2);

        let bytes = std::fs::read(&path).unwrap();
        let cut = &bytes[..bytes.len() - 5];
        let log = BucketLogReader::read_from(&mut &cut[..]).unwrap();
        assert_eq!(log.records.len(), 1);
        assert!(log.truncated);
    }

    #[test]
    fn test_invalid_magic() {
        let buf = [0u8; HEADER_SIZE + 10];
        assert!(matches!(
            BucketLogReader::read_from(&mut &buf[..]),
            Err(CounterError::Storage(_))
        ));
    }

    #[test]
    fn test_verify_detects_gap() {
        let id = SessionId::new();
        let log = BucketLog {
            header: LogHeader {
                version: FORMAT_VERSION,
                flags: 0,
                session_id: id,
                window_ms: 1_000,
                created_at: 0,
            },
            records: vec![
                BucketRecord {
                    session_id: id,
                    bucket: bucket(0),
                },
                BucketRecord {
                    session_id: id,
                    bucket: bucket(2),
                },
            ],
            truncated: false,
        };
        assert!(log.verify().is_err());
    }
}
