use crate::error::{Error, Result};
use crate::security::ColumnVisibility;
use std::fmt;

const UPDATE_OVERHEAD: usize = 16;

/// A single column write inside a [`Mutation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnUpdate {
    family: Vec<u8>,
    qualifier: Vec<u8>,
    visibility: Vec<u8>,
    timestamp: Option<i64>,
    value: Vec<u8>,
    deleted: bool,
}

impl ColumnUpdate {
    pub fn family(&self) -> &[u8] {
        &self.family
    }

    pub fn qualifier(&self) -> &[u8] {
        &self.qualifier
    }

    pub fn visibility(&self) -> &[u8] {
        &self.visibility
    }

    /// `None` when the server assigns the timestamp on write.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn is_delete(&self) -> bool {
        self.deleted
    }

    fn size_bytes(&self) -> usize {
        self.family.len()
            + self.qualifier.len()
            + self.visibility.len()
            + self.value.len()
            + UPDATE_OVERHEAD
    }
}

/// A batched set of column writes targeting one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    row: Vec<u8>,
    updates: Vec<ColumnUpdate>,
}

impl Mutation {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            updates: Vec::new(),
        }
    }

    pub fn put(
        &mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.push(family.into(), qualifier.into(), Vec::new(), None, value.into(), false)
    }

    pub fn put_with_timestamp(
        &mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.push(
            family.into(),
            qualifier.into(),
            Vec::new(),
            Some(timestamp),
            value.into(),
            false,
        )
    }

    pub fn put_with_visibility(
        &mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        visibility: &ColumnVisibility,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.push(
            family.into(),
            qualifier.into(),
            visibility.expression().to_vec(),
            None,
            value.into(),
            false,
        )
    }

    /// Records a delete marker hiding every older version of the column.
    pub fn put_delete(
        &mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.push(family.into(), qualifier.into(), Vec::new(), None, Vec::new(), true)
    }

    fn push(
        &mut self,
        family: Vec<u8>,
        qualifier: Vec<u8>,
        visibility: Vec<u8>,
        timestamp: Option<i64>,
        value: Vec<u8>,
        deleted: bool,
    ) -> &mut Self {
        self.updates.push(ColumnUpdate {
            family,
            qualifier,
            visibility,
            timestamp,
            value,
            deleted,
        });
        self
    }

    pub fn row(&self) -> &[u8] {
        &self.row
    }

    pub fn updates(&self) -> &[ColumnUpdate] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Approximate in-memory footprint used for buffer accounting.
    pub fn estimated_size(&self) -> usize {
        self.row.len()
            + UPDATE_OVERHEAD
            + self.updates.iter().map(ColumnUpdate::size_bytes).sum::<usize>()
    }

    pub fn validate(&self) -> Result<()> {
        if self.row.is_empty() {
            return Err(Error::InvalidMutation("row identifier is empty".to_string()));
        }
        for update in &self.updates {
            if !update.visibility.is_empty() {
                ColumnVisibility::parse(&update.visibility)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} update(s))",
            String::from_utf8_lossy(&self.row),
            self.updates.len()
        )
    }
}

/// Why the server refused an individual mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    PermissionDenied,
    ConstraintViolation(String),
    /// The tablet could not take the write right now; resending may succeed.
    Transient(String),
}

impl RejectReason {
    pub fn is_transient(&self) -> bool {
        matches!(self, RejectReason::Transient(_))
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::PermissionDenied => write!(f, "permission denied"),
            RejectReason::ConstraintViolation(c) => write!(f, "constraint violation: {}", c),
            RejectReason::Transient(r) => write!(f, "transient failure: {}", r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedMutation {
    pub mutation: Mutation,
    pub reason: RejectReason,
}
