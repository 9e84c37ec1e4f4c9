use bincode::{Decode, Encode};
use std::cmp::Ordering;
use std::fmt;

/// Fully qualified cell coordinate.
///
/// Keys sort by row, column family, column qualifier and visibility
/// ascending, then by timestamp descending so the newest version of a
/// column is seen first. At equal timestamps a delete marker sorts before
/// the value it removes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Key {
    pub row: Vec<u8>,
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub visibility: Vec<u8>,
    pub timestamp: i64,
    pub deleted: bool,
}

impl Key {
    pub fn new(
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            visibility: Vec::new(),
            timestamp,
            deleted: false,
        }
    }

    /// True when both keys address the same column, ignoring timestamp and
    /// delete flag.
    pub fn same_column(&self, other: &Key) -> bool {
        self.row == other.row
            && self.family == other.family
            && self.qualifier == other.qualifier
            && self.visibility == other.visibility
    }

    pub fn row_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.row)
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.family.cmp(&other.family))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
            .then_with(|| self.visibility.cmp(&other.visibility))
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| other.deleted.cmp(&self.deleted))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} [{}] {}",
            String::from_utf8_lossy(&self.row),
            String::from_utf8_lossy(&self.family),
            String::from_utf8_lossy(&self.qualifier),
            String::from_utf8_lossy(&self.visibility),
            self.timestamp
        )?;
        if self.deleted {
            write!(f, " (deleted)")?;
        }
        Ok(())
    }
}

/// Cell contents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct Value(pub Vec<u8>);

impl Value {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value(bytes.to_vec())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(s.into_bytes())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![
            Key::new("row_1", "cf", "a", 5),
            Key::new("row_0", "cf", "b", 1),
            Key::new("row_0", "cf", "a", 1),
            Key::new("row_0", "cf", "a", 9),
            Key::new("row_0", "aa", "z", 1),
        ];
        keys.sort();

        let rendered: Vec<_> = keys
            .iter()
            .map(|k| format!("{}/{}/{}", k.row_str(), String::from_utf8_lossy(&k.qualifier), k.timestamp))
            .collect();
        assert_eq!(
            rendered,
            vec!["row_0/z/1", "row_0/a/9", "row_0/a/1", "row_0/b/1", "row_1/a/5"]
        );
    }

    #[test]
    fn test_delete_sorts_before_put_at_same_timestamp() {
        let put = Key::new("r", "f", "q", 7);
        let mut del = put.clone();
        del.deleted = true;
        assert!(del < put);
        assert!(del.same_column(&put));
    }
}
