//! Append-only record of applied writes, kept beside the snapshot file.
//!
//! Each record is a u32 payload length, a u32 CRC32 of the payload, then the
//! bincode-encoded [`JournalRecord`]. Replay stops at the first torn or
//! corrupt record. The journal is emptied whenever a full snapshot is written.

use crate::data::{Key, Value};
use crate::error::{Error, Result};
use bincode::{Decode, Encode};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const RECORD_HEADER_LEN: usize = 4 + 4;

/// Cells written to one table by one batch.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub(crate) struct JournalRecord {
    pub(crate) table: String,
    pub(crate) last_timestamp: i64,
    pub(crate) cells: Vec<(Key, Value)>,
}

pub(crate) struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

/// Journal file that belongs to the snapshot at `snapshot_path`.
pub(crate) fn journal_path(snapshot_path: &Path) -> PathBuf {
    let mut name = snapshot_path.as_os_str().to_owned();
    name.push(".log");
    PathBuf::from(name)
}

impl Journal {
    /// Open for appending, creating the file if needed.
    pub(crate) fn open(path: &Path, records: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            records,
        })
    }

    /// Records appended since the journal was last emptied.
    pub(crate) fn records(&self) -> usize {
        self.records
    }

    pub(crate) fn append(&mut self, record: &JournalRecord) -> Result<()> {
        let payload = bincode::encode_to_vec(record, bincode::config::standard())
            .map_err(|e| Error::Serialization(format!("Failed to encode journal record: {}", e)))?;
        self.writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.records += 1;
        Ok(())
    }

    /// Drop every record; called once a snapshot holds their effects.
    pub(crate) fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.records = 0;
        Ok(())
    }
}

/// Every intact record in the journal at `path`, oldest first. A missing
/// file has no records.
pub(crate) fn read_journal(path: &Path) -> Result<Vec<JournalRecord>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();

    loop {
        let mut header = [0u8; RECORD_HEADER_LEN];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).is_err() || crc32fast::hash(&payload) != expected {
            warn!(
                "Ignoring torn journal tail in {} after {} record(s)",
                path.display(),
                records.len()
            );
            break;
        }
        let (record, _): (JournalRecord, usize) =
            bincode::decode_from_slice(&payload, bincode::config::standard()).map_err(|e| {
                Error::Serialization(format!("Failed to decode journal record: {}", e))
            })?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record(table: &str, ts: i64) -> JournalRecord {
        JournalRecord {
            table: table.to_string(),
            last_timestamp: ts,
            cells: vec![(
                Key::new("row_0", "colfam", "colqual_0", ts),
                Value::from("value_0_0"),
            )],
        }
    }

    #[test]
    fn test_append_then_read() {
        let dir = tempdir().unwrap();
        let path = journal_path(&dir.path().join("store.snap"));
        {
            let mut journal = Journal::open(&path, 0).unwrap();
            journal.append(&record("a", 1)).unwrap();
            journal.append(&record("b", 2)).unwrap();
            assert_eq!(journal.records(), 2);
        }
        let records = read_journal(&path).unwrap();
        assert_eq!(records, vec![record("a", 1), record("b", 2)]);
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.snap.log");
        {
            let mut journal = Journal::open(&path, 0).unwrap();
            journal.append(&record("a", 1)).unwrap();
            journal.append(&record("a", 2)).unwrap();
        }
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert_eq!(read_journal(&path).unwrap(), vec![record("a", 1)]);
    }

    #[test]
    fn test_truncate_empties_journal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.snap.log");
        let mut journal = Journal::open(&path, 0).unwrap();
        journal.append(&record("a", 1)).unwrap();
        journal.truncate().unwrap();
        assert_eq!(journal.records(), 0);
        journal.append(&record("a", 2)).unwrap();

        assert_eq!(read_journal(&path).unwrap(), vec![record("a", 2)]);
        assert!(read_journal(&dir.path().join("missing.log")).unwrap().is_empty());
    }
}
