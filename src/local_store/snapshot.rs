//! On-disk image of a [`super::LocalStore`].
//!
//! Layout: 4-byte magic, u32 format version, u32 CRC32 of the payload,
//! u64 payload length, then the bincode-encoded payload. Files are written
//! to a temporary sibling and renamed into place.

use crate::admin::{NewTableConfiguration, TimeType};
use crate::data::{Key, Value};
use crate::error::{Error, Result};
use bincode::{Decode, Encode};
use crc32fast::Hasher;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"TKVS";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct StoreSnapshot {
    pub(crate) tables: Vec<TableSnapshot>,
    pub(crate) users: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct TableSnapshot {
    pub(crate) name: String,
    pub(crate) logical_time: bool,
    pub(crate) max_versions: u64,
    pub(crate) properties: Vec<(String, String)>,
    pub(crate) last_timestamp: i64,
    pub(crate) entries: Vec<(Key, Value)>,
}

impl TableSnapshot {
    pub(crate) fn config(&self) -> NewTableConfiguration {
        NewTableConfiguration {
            time_type: if self.logical_time {
                TimeType::Logical
            } else {
                TimeType::Millis
            },
            properties: self.properties.iter().cloned().collect(),
            max_versions: (self.max_versions as usize).max(1),
        }
    }
}

pub(crate) fn write_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<()> {
    let payload = bincode::encode_to_vec(snapshot, bincode::config::standard())
        .map_err(|e| Error::Serialization(format!("Failed to encode store snapshot: {}", e)))?;

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let checksum = hasher.finalize();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(MAGIC)?;
        file.write_all(&FORMAT_VERSION.to_le_bytes())?;
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        file.write_all(&payload)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Returns `Ok(None)` when no snapshot exists yet.
pub(crate) fn read_snapshot(path: &Path) -> Result<Option<StoreSnapshot>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    if bytes.len() < HEADER_LEN {
        return Err(Error::Corrupted(format!(
            "{} is truncated ({} bytes)",
            path.display(),
            bytes.len()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(Error::Corrupted(format!("{} has a bad magic number", path.display())));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::Corrupted(format!(
            "unsupported snapshot version {}",
            version
        )));
    }
    let expected = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[12..20]);
    let len = u64::from_le_bytes(len_bytes) as usize;

    let payload = &bytes[HEADER_LEN..];
    if payload.len() != len {
        return Err(Error::Corrupted(format!(
            "payload length mismatch: header says {}, found {}",
            len,
            payload.len()
        )));
    }

    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(Error::Corrupted(format!(
            "checksum mismatch - expected: {:08x}, actual: {:08x}",
            expected, actual
        )));
    }

    let (snapshot, _): (StoreSnapshot, usize) =
        bincode::decode_from_slice(payload, bincode::config::standard())
            .map_err(|e| Error::Serialization(format!("Failed to decode store snapshot: {}", e)))?;
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> StoreSnapshot {
        StoreSnapshot {
            tables: vec![TableSnapshot {
                name: "hellotable".into(),
                logical_time: false,
                max_versions: 1,
                properties: vec![("table.split.threshold".into(), "1G".into())],
                last_timestamp: 7,
                entries: vec![(Key::new("row_0", "colfam", "colqual_0", 7), Value::from("value_0_0"))],
            }],
            users: vec![("root".into(), b"secret".to_vec())],
        }
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = tempdir().unwrap();
        assert!(read_snapshot(&dir.path().join("store.snap")).unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.snap");
        write_snapshot(&path, &sample()).unwrap();

        let loaded = read_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded.tables.len(), 1);
        assert_eq!(loaded.tables[0].entries, sample().tables[0].entries);
        assert_eq!(loaded.tables[0].config().time_type, TimeType::Millis);
        assert_eq!(loaded.users, sample().users);
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.snap");
        write_snapshot(&path, &sample()).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(read_snapshot(&path), Err(Error::Corrupted(_))));
    }
}
