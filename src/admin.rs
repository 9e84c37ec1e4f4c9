//! Table and user administration.

use crate::error::Result;
use crate::session::ClientSession;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// How the store assigns timestamps to writes that carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeType {
    /// Wall-clock milliseconds since the epoch.
    #[default]
    Millis,
    /// Per-table counter incremented on every write.
    Logical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTableConfiguration {
    pub time_type: TimeType,
    pub properties: BTreeMap<String, String>,
    /// Versions of a column returned by scans; older ones are hidden.
    pub max_versions: usize,
}

impl Default for NewTableConfiguration {
    fn default() -> Self {
        Self {
            time_type: TimeType::Millis,
            properties: BTreeMap::new(),
            max_versions: 1,
        }
    }
}

impl NewTableConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time_type(mut self, time_type: TimeType) -> Self {
        self.time_type = time_type;
        self
    }

    pub fn set_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    pub fn set_max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions.max(1);
        self
    }
}

pub struct TableOperations<'a> {
    session: &'a ClientSession,
}

impl<'a> TableOperations<'a> {
    pub(crate) fn new(session: &'a ClientSession) -> Self {
        Self { session }
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.session
            .call(|token| self.session.transport().list_tables(token))
    }

    pub fn exists(&self, table: &str) -> Result<bool> {
        self.session
            .call(|token| self.session.transport().table_exists(token, table))
    }

    pub fn create(&self, table: &str, config: NewTableConfiguration) -> Result<()> {
        self.session
            .call(|token| self.session.transport().create_table(token, table, &config))?;
        info!("Created table {} ({:?} time)", table, config.time_type);
        Ok(())
    }

    /// Create the table unless it already exists. Returns whether it was
    /// created.
    pub fn create_if_absent(&self, table: &str, config: NewTableConfiguration) -> Result<bool> {
        if self.exists(table)? {
            return Ok(false);
        }
        match self.create(table, config) {
            Ok(()) => Ok(true),
            // Lost a race with another client.
            Err(crate::error::Error::TableExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn delete(&self, table: &str) -> Result<()> {
        self.session
            .call(|token| self.session.transport().delete_table(token, table))
    }
}

pub struct SecurityOperations<'a> {
    session: &'a ClientSession,
}

impl<'a> SecurityOperations<'a> {
    pub(crate) fn new(session: &'a ClientSession) -> Self {
        Self { session }
    }

    pub fn list_local_users(&self) -> Result<Vec<String>> {
        self.session
            .call(|token| self.session.transport().list_local_users(token))
    }
}

/// Log every table and local user visible to the session.
///
/// Listing is informational: a failure is logged and reported as `false`
/// rather than returned.
pub fn log_tables_and_users(session: &ClientSession) -> bool {
    let listed = session.table_operations().list().and_then(|tables| {
        let users = session.security_operations().list_local_users()?;
        Ok((tables, users))
    });
    match listed {
        Ok((tables, users)) => {
            for table in tables {
                info!("table found : {}", table);
            }
            for user in users {
                info!("user found : {}", user);
            }
            true
        }
        Err(e) => {
            warn!("Failed to get table and user list: {}", e);
            false
        }
    }
}
