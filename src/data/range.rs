use super::Key;
use std::ops::Bound;

/// Row interval for a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    pub start: Bound<Vec<u8>>,
    pub end: Bound<Vec<u8>>,
}

impl Default for RowRange {
    fn default() -> Self {
        Self::all()
    }
}

impl RowRange {
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Both ends inclusive.
    pub fn closed(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Included(end.into()),
        }
    }

    /// Start inclusive, end exclusive.
    pub fn half_open(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Excluded(end.into()),
        }
    }

    pub fn exact(row: impl Into<Vec<u8>>) -> Self {
        let row = row.into();
        Self::closed(row.clone(), row)
    }

    pub fn contains_row(&self, row: &[u8]) -> bool {
        let after_start = match &self.start {
            Bound::Included(s) => row >= s.as_slice(),
            Bound::Excluded(s) => row > s.as_slice(),
            Bound::Unbounded => true,
        };
        after_start && !self.is_past_end(row)
    }

    pub fn is_past_end(&self, row: &[u8]) -> bool {
        match &self.end {
            Bound::Included(e) => row > e.as_slice(),
            Bound::Excluded(e) => row >= e.as_slice(),
            Bound::Unbounded => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }

    /// First key a scan over this range should visit.
    pub fn start_key(&self) -> Bound<Key> {
        match &self.start {
            Bound::Included(row) => Bound::Included(Key {
                row: row.clone(),
                family: Vec::new(),
                qualifier: Vec::new(),
                visibility: Vec::new(),
                timestamp: i64::MAX,
                deleted: true,
            }),
            // Every key whose row equals `row` sorts before the smallest key of
            // the next row, which is `row` followed by a zero byte.
            Bound::Excluded(row) => {
                let mut next = row.clone();
                next.push(0);
                Bound::Included(Key {
                    row: next,
                    family: Vec::new(),
                    qualifier: Vec::new(),
                    visibility: Vec::new(),
                    timestamp: i64::MAX,
                    deleted: true,
                })
            }
            Bound::Unbounded => Bound::Unbounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_range_bounds() {
        let range = RowRange::closed("row_0", "row_1002");
        assert!(range.contains_row(b"row_0"));
        assert!(range.contains_row(b"row_1002"));
        assert!(range.contains_row(b"row_1"));
        assert!(range.contains_row(b"row_1000"));
        // lexicographic ordering: "row_1003" > "row_1002"
        assert!(!range.contains_row(b"row_1003"));
        assert!(!range.contains_row(b"row_2"));
    }

    #[test]
    fn test_half_open_and_empty() {
        let range = RowRange::half_open("a", "c");
        assert!(range.contains_row(b"b"));
        assert!(!range.contains_row(b"c"));
        assert!(RowRange::half_open("c", "c").is_empty());
        assert!(!RowRange::exact("c").is_empty());
    }

    #[test]
    fn test_start_key_sorts_before_row() {
        let range = RowRange::closed("r", "z");
        match range.start_key() {
            Bound::Included(k) => assert!(k <= Key::new("r", "", "", i64::MAX)),
            other => panic!("unexpected bound {:?}", other),
        }
    }
}
