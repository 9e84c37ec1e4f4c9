use crate::admin::{NewTableConfiguration, TimeType};
use crate::data::{Key, Mutation, RejectReason, RowRange, Value};
use crate::security::{Authorizations, ColumnVisibility};
use crate::transport::BatchId;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::time::{SystemTime, UNIX_EPOCH};

/// Batch ids remembered per table for duplicate suppression.
const APPLIED_BATCH_WINDOW: usize = 4096;

pub(crate) struct Table {
    pub(crate) config: NewTableConfiguration,
    pub(crate) entries: BTreeMap<Key, Value>,
    pub(crate) last_timestamp: i64,
    applied: HashMap<BatchId, Vec<(usize, RejectReason)>>,
    applied_order: VecDeque<BatchId>,
}

/// One page of scan output plus whether the range is exhausted.
pub(crate) struct TablePage {
    pub(crate) entries: Vec<(Key, Value)>,
    pub(crate) finished: bool,
}

impl Table {
    pub(crate) fn new(config: NewTableConfiguration) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            last_timestamp: 0,
            applied: HashMap::new(),
            applied_order: VecDeque::new(),
        }
    }

    /// Mutations (by index) rejected when `batch_id` was first applied, or
    /// `None` if the batch has not been seen.
    pub(crate) fn applied_batch(&self, batch_id: BatchId) -> Option<&[(usize, RejectReason)]> {
        self.applied.get(&batch_id).map(Vec::as_slice)
    }

    pub(crate) fn record_batch(&mut self, batch_id: BatchId, rejected: Vec<(usize, RejectReason)>) {
        if self.applied_order.len() >= APPLIED_BATCH_WINDOW {
            if let Some(oldest) = self.applied_order.pop_front() {
                self.applied.remove(&oldest);
            }
        }
        self.applied_order.push_back(batch_id);
        self.applied.insert(batch_id, rejected);
    }

    fn next_timestamp(&mut self) -> i64 {
        let next = match self.config.time_type {
            TimeType::Logical => self.last_timestamp + 1,
            // Never go backwards even if the wall clock does.
            TimeType::Millis => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                now.max(self.last_timestamp)
            }
        };
        self.last_timestamp = next;
        next
    }

    /// All updates of one mutation share a timestamp when the client did not
    /// supply one.
    pub(crate) fn apply(&mut self, mutation: &Mutation) {
        self.apply_recording(mutation, None);
    }

    /// As [`Table::apply`], also pushing every stored cell onto `written`.
    pub(crate) fn apply_recording(
        &mut self,
        mutation: &Mutation,
        mut written: Option<&mut Vec<(Key, Value)>>,
    ) {
        let assigned = if mutation.updates().iter().any(|u| u.timestamp().is_none()) {
            Some(self.next_timestamp())
        } else {
            None
        };

        for update in mutation.updates() {
            let timestamp = update.timestamp().or(assigned).unwrap_or_default();
            let key = Key {
                row: mutation.row().to_vec(),
                family: update.family().to_vec(),
                qualifier: update.qualifier().to_vec(),
                visibility: update.visibility().to_vec(),
                timestamp,
                deleted: update.is_delete(),
            };
            let value = Value(update.value().to_vec());
            if let Some(cells) = written.as_deref_mut() {
                cells.push((key.clone(), value.clone()));
            }
            self.entries.insert(key, value);
        }
    }

    /// Re-insert cells recovered from the journal.
    pub(crate) fn restore(&mut self, last_timestamp: i64, cells: Vec<(Key, Value)>) {
        self.last_timestamp = self.last_timestamp.max(last_timestamp);
        self.entries.extend(cells);
    }

    /// Collect up to `limit` visible entries in `range` that sort after
    /// `resume_after`.
    pub(crate) fn scan(
        &self,
        range: &RowRange,
        authorizations: &Authorizations,
        families: &[Vec<u8>],
        resume_after: Option<&Key>,
        limit: usize,
    ) -> TablePage {
        // When resuming inside a column, restart at the top of that column so
        // version counting and delete markers see everything that precedes
        // the resume point.
        let start = match resume_after {
            Some(key) => Bound::Included(Key {
                timestamp: i64::MAX,
                deleted: true,
                ..key.clone()
            }),
            None => range.start_key(),
        };

        let mut visible_cache: HashMap<Vec<u8>, bool> = HashMap::new();
        let mut column: Option<&Key> = None;
        let mut versions = 0usize;
        let mut deleted_at: Option<i64> = None;
        let mut entries = Vec::new();

        for (key, value) in self.entries.range((start, Bound::Unbounded)) {
            if range.is_past_end(&key.row) {
                return TablePage {
                    entries,
                    finished: true,
                };
            }

            if column.is_none_or(|c| !c.same_column(key)) {
                column = Some(key);
                versions = 0;
                deleted_at = None;
            }

            if key.deleted {
                deleted_at = Some(deleted_at.map_or(key.timestamp, |t| t.max(key.timestamp)));
                continue;
            }
            if deleted_at.is_some_and(|t| key.timestamp <= t) {
                continue;
            }
            if versions >= self.config.max_versions {
                continue;
            }
            versions += 1;

            if resume_after.is_some_and(|r| key <= r) {
                continue;
            }
            if !range.contains_row(&key.row) {
                continue;
            }
            if !families.is_empty() && !families.iter().any(|f| f == &key.family) {
                continue;
            }
            let visible = *visible_cache
                .entry(key.visibility.clone())
                .or_insert_with(|| {
                    ColumnVisibility::parse(&key.visibility)
                        .map(|v| v.evaluate(authorizations))
                        .unwrap_or(false)
                });
            if !visible {
                continue;
            }

            if entries.len() >= limit {
                return TablePage {
                    entries,
                    finished: false,
                };
            }
            entries.push((key.clone(), value.clone()));
        }

        TablePage {
            entries,
            finished: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logical_table(max_versions: usize) -> Table {
        Table::new(
            NewTableConfiguration::new()
                .set_time_type(TimeType::Logical)
                .set_max_versions(max_versions),
        )
    }

    fn put(table: &mut Table, row: &str, qual: &str, value: &str) {
        let mut m = Mutation::new(row);
        m.put("cf", qual, value);
        table.apply(&m);
    }

    fn values(page: &TablePage) -> Vec<String> {
        page.entries.iter().map(|(_, v)| v.to_string()).collect()
    }

    #[test]
    fn test_newest_version_wins() {
        let mut table = logical_table(1);
        put(&mut table, "r1", "q", "old");
        put(&mut table, "r1", "q", "new");

        let page = table.scan(&RowRange::all(), &Authorizations::empty(), &[], None, 10);
        assert_eq!(values(&page), vec!["new"]);
        assert!(page.finished);
    }

    #[test]
    fn test_delete_hides_older_versions() {
        let mut table = logical_table(3);
        put(&mut table, "r1", "q", "v1");
        put(&mut table, "r1", "q", "v2");
        let mut del = Mutation::new("r1");
        del.put_delete("cf", "q");
        table.apply(&del);
        put(&mut table, "r1", "q", "v3");

        let page = table.scan(&RowRange::all(), &Authorizations::empty(), &[], None, 10);
        assert_eq!(values(&page), vec!["v3"]);
    }

    #[test]
    fn test_paging_resumes_after_last_key() {
        let mut table = logical_table(1);
        for i in 0..5 {
            put(&mut table, &format!("row_{}", i), "q", &format!("v{}", i));
        }
        // Older version of row_1 must stay hidden across a page boundary.
        let mut old = Mutation::new("row_1");
        old.put_with_timestamp("cf", "q", 0, "stale");
        table.apply(&old);

        let auths = Authorizations::empty();
        let first = table.scan(&RowRange::all(), &auths, &[], None, 2);
        assert_eq!(values(&first), vec!["v0", "v1"]);
        assert!(!first.finished);

        let last = first.entries.last().map(|(k, _)| k.clone());
        let second = table.scan(&RowRange::all(), &auths, &[], last.as_ref(), 10);
        assert_eq!(values(&second), vec!["v2", "v3", "v4"]);
        assert!(second.finished);
    }

    #[test]
    fn test_visibility_and_family_filters() {
        let mut table = logical_table(1);
        let secret = ColumnVisibility::parse("secret").unwrap();
        let mut m = Mutation::new("r");
        m.put("public", "q", "open")
            .put_with_visibility("private", "q", &secret, "hidden");
        table.apply(&m);

        let none = table.scan(&RowRange::all(), &Authorizations::empty(), &[], None, 10);
        assert_eq!(values(&none), vec!["open"]);

        let all = table.scan(&RowRange::all(), &Authorizations::new(["secret"]), &[], None, 10);
        assert_eq!(values(&all), vec!["hidden", "open"]);

        let fam = table.scan(
            &RowRange::all(),
            &Authorizations::new(["secret"]),
            &[b"private".to_vec()],
            None,
            10,
        );
        assert_eq!(values(&fam), vec!["hidden"]);
    }

    #[test]
    fn test_batch_window_is_bounded() {
        let mut table = logical_table(1);
        for id in 0..(APPLIED_BATCH_WINDOW as u64 + 10) {
            table.record_batch(id, Vec::new());
        }
        assert!(table.applied_batch(0).is_none());
        assert!(table.applied_batch(APPLIED_BATCH_WINDOW as u64 + 9).is_some());
    }
}
