//! Embedded sorted store implementing [`TabletTransport`].
//!
//! Tables are ordered maps of [`Key`] to [`Value`]; an optional snapshot file
//! plus a journal of writes applied since it was taken makes them survive
//! across processes. Unknown principals are registered on
//! first login with the credential they present, later logins must present
//! the same credential.

mod faults;
mod journal;
mod snapshot;
mod table;

pub use faults::FaultPlan;

use crate::admin::{NewTableConfiguration, TimeType};
use crate::auth::{AuthToken, Credential, HandshakeOptions};
use crate::data::{Key, Mutation, RejectedMutation, Value};
use crate::error::{Error, Result};
use crate::transport::{BatchId, ScanId, ScanPage, ScanRequest, TabletTransport};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use faults::WriteFault;
use journal::{Journal, JournalRecord};
use parking_lot::{Mutex, RwLock};
use snapshot::{StoreSnapshot, TableSnapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use table::Table;
use tracing::{debug, info, trace};

/// Journal records after which the next write folds them into a snapshot.
const COMPACT_AFTER_RECORDS: usize = 1024;

struct Persistence {
    snapshot_path: PathBuf,
    journal: Journal,
    compact_after: usize,
}

struct IssuedToken {
    principal: String,
    expires_at: SystemTime,
}

pub struct LocalStore {
    tables: DashMap<String, Arc<RwLock<Table>>>,
    users: RwLock<BTreeMap<String, Vec<u8>>>,
    tokens: DashMap<Vec<u8>, IssuedToken>,
    open_scans: DashMap<ScanId, String>,
    next_scan_id: AtomicU64,
    faults: FaultPlan,
    persistence: Mutex<Option<Persistence>>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    /// In-memory store.
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            users: RwLock::new(BTreeMap::new()),
            tokens: DashMap::new(),
            open_scans: DashMap::new(),
            next_scan_id: AtomicU64::new(1),
            faults: FaultPlan::default(),
            persistence: Mutex::new(None),
        }
    }

    /// Store backed by a snapshot file and its journal, loading both if
    /// present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = Self::new();

        if let Some(snapshot) = snapshot::read_snapshot(&path)? {
            for table_snapshot in snapshot.tables {
                let mut table = Table::new(table_snapshot.config());
                table.last_timestamp = table_snapshot.last_timestamp;
                table.entries = table_snapshot.entries.into_iter().collect();
                store
                    .tables
                    .insert(table_snapshot.name, Arc::new(RwLock::new(table)));
            }
            *store.users.write() = snapshot.users.into_iter().collect();
            info!(
                "Loaded {} table(s) from {}",
                store.tables.len(),
                path.display()
            );
        }

        let journal_path = journal::journal_path(&path);
        let records = journal::read_journal(&journal_path)?;
        let replayed = records.len();
        for record in records {
            match store.tables.get(&record.table) {
                Some(table) => table.write().restore(record.last_timestamp, record.cells),
                None => debug!("Skipping journal record for missing table {}", record.table),
            }
        }
        if replayed > 0 {
            info!("Replayed {} journal record(s) from {}", replayed, journal_path.display());
        }

        *store.persistence.lock() = Some(Persistence {
            snapshot_path: path,
            journal: Journal::open(&journal_path, replayed)?,
            compact_after: COMPACT_AFTER_RECORDS,
        });
        Ok(store)
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn add_user(&self, principal: impl Into<String>, secret: &[u8]) {
        self.users.write().insert(principal.into(), secret.to_vec());
    }

    /// Invalidate every issued token, as if the server restarted its
    /// authentication service.
    pub fn revoke_tokens(&self) {
        self.tokens.clear();
    }

    pub fn open_scan_count(&self) -> usize {
        self.open_scans.len()
    }

    /// Number of stored cells in `table` including hidden versions.
    pub fn raw_entry_count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.read().entries.len())
    }

    fn table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn validate(&self, token: &AuthToken) -> Result<()> {
        let reject = |reason: &str| Error::Authentication {
            principal: token.principal.clone(),
            reason: reason.to_string(),
        };
        let expired = {
            let issued = self
                .tokens
                .get(&token.secret)
                .ok_or_else(|| reject("unknown or revoked token"))?;
            if issued.principal != token.principal {
                return Err(reject("token issued to another principal"));
            }
            SystemTime::now() >= issued.expires_at
        };
        if expired {
            self.tokens.remove(&token.secret);
            return Err(reject("token expired"));
        }
        Ok(())
    }

    /// Tokens currently held, expired ones included until they are pruned.
    pub fn issued_token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Write a full snapshot and empty the journal. Used for table and user
    /// changes; writes go through [`LocalStore::journal_write`].
    fn persist(&self) -> Result<()> {
        let mut guard = self.persistence.lock();
        match guard.as_mut() {
            Some(persistence) => self.compact(persistence),
            None => Ok(()),
        }
    }

    fn compact(&self, persistence: &mut Persistence) -> Result<()> {
        snapshot::write_snapshot(&persistence.snapshot_path, &self.snapshot_state())?;
        persistence.journal.truncate()
    }

    fn journal_write(&self, table: &str, last_timestamp: i64, cells: Vec<(Key, Value)>) -> Result<()> {
        let mut guard = self.persistence.lock();
        let Some(persistence) = guard.as_mut() else {
            return Ok(());
        };
        persistence.journal.append(&JournalRecord {
            table: table.to_string(),
            last_timestamp,
            cells,
        })?;
        if persistence.journal.records() >= persistence.compact_after {
            debug!(
                "Folding {} journal record(s) into {}",
                persistence.journal.records(),
                persistence.snapshot_path.display()
            );
            self.compact(persistence)?;
        }
        Ok(())
    }

    fn snapshot_state(&self) -> StoreSnapshot {
        let handles: Vec<(String, Arc<RwLock<Table>>)> = self
            .tables
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut tables = Vec::with_capacity(handles.len());
        for (name, table) in handles {
            let table = table.read();
            tables.push(TableSnapshot {
                name,
                logical_time: table.config.time_type == TimeType::Logical,
                max_versions: table.config.max_versions as u64,
                properties: table
                    .config
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                last_timestamp: table.last_timestamp,
                entries: table
                    .entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            });
        }
        let users = self
            .users
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        StoreSnapshot { tables, users }
    }

    fn is_persistent(&self) -> bool {
        self.persistence.lock().is_some()
    }
}

impl TabletTransport for LocalStore {
    fn authenticate(
        &self,
        principal: &str,
        credential: &Credential,
        options: &HandshakeOptions,
        ttl: Duration,
    ) -> Result<AuthToken> {
        let fail = |reason: &str| Error::Authentication {
            principal: principal.to_string(),
            reason: reason.to_string(),
        };

        if principal.is_empty() {
            return Err(fail("empty principal"));
        }
        if credential.as_bytes().is_empty() {
            return Err(fail("empty credential"));
        }
        if matches!(credential, Credential::Keytab(_)) && !options.sasl_enabled {
            return Err(fail("kerberos credentials require SASL"));
        }

        let registered = {
            let mut users = self.users.write();
            match users.get(principal) {
                Some(secret) if secret.as_slice() == credential.as_bytes() => false,
                Some(_) => return Err(fail("credential mismatch")),
                None => {
                    users.insert(principal.to_string(), credential.as_bytes().to_vec());
                    true
                }
            }
        };
        if registered {
            info!("Registered principal {}", principal);
            self.persist()?;
        }

        let now = SystemTime::now();
        self.tokens.retain(|_, issued| issued.expires_at > now);

        let secret: [u8; 16] = rand::random();
        let expires_at = now + ttl;
        self.tokens.insert(
            secret.to_vec(),
            IssuedToken {
                principal: principal.to_string(),
                expires_at,
            },
        );
        debug!(
            "Issued token for {} (qop={}, primary={})",
            principal, options.qop, options.server_primary
        );

        Ok(AuthToken {
            principal: principal.to_string(),
            secret: secret.to_vec(),
            expires_at,
        })
    }

    fn whoami(&self, token: &AuthToken) -> Result<String> {
        self.validate(token)?;
        Ok(token.principal.clone())
    }

    fn list_tables(&self, token: &AuthToken) -> Result<Vec<String>> {
        self.validate(token)?;
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn table_exists(&self, token: &AuthToken, table: &str) -> Result<bool> {
        self.validate(token)?;
        Ok(self.tables.contains_key(table))
    }

    fn create_table(
        &self,
        token: &AuthToken,
        table: &str,
        config: &NewTableConfiguration,
    ) -> Result<()> {
        self.validate(token)?;
        if table.is_empty() {
            return Err(Error::Config("table name is empty".to_string()));
        }
        match self.tables.entry(table.to_string()) {
            Entry::Occupied(_) => return Err(Error::TableExists(table.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(Table::new(config.clone()))));
            }
        }
        self.persist()
    }

    fn delete_table(&self, token: &AuthToken, table: &str) -> Result<()> {
        self.validate(token)?;
        self.tables
            .remove(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        self.persist()
    }

    fn list_local_users(&self, token: &AuthToken) -> Result<Vec<String>> {
        self.validate(token)?;
        Ok(self.users.read().keys().cloned().collect())
    }

    fn write_batch(
        &self,
        token: &AuthToken,
        table: &str,
        batch_id: BatchId,
        mutations: &[Mutation],
    ) -> Result<Vec<RejectedMutation>> {
        self.validate(token)?;
        let handle = self.table(table)?;

        let fault = self.faults.on_write();
        if matches!(fault, WriteFault::FailBeforeApply) {
            return Err(Error::Transport(format!(
                "connection reset while sending batch {}",
                batch_id
            )));
        }

        let mut written = self.is_persistent().then(Vec::new);
        let (rejected, last_timestamp) = {
            let mut table = handle.write();
            let rejected = if let Some(previous) = table.applied_batch(batch_id) {
                debug!("Batch {} already applied, acknowledging again", batch_id);
                previous.to_vec()
            } else {
                let mut rejected = Vec::new();
                for (idx, mutation) in mutations.iter().enumerate() {
                    if let Some(reason) = self.faults.rejection_for(mutation.row()) {
                        rejected.push((idx, reason));
                        continue;
                    }
                    table.apply_recording(mutation, written.as_mut());
                }
                table.record_batch(batch_id, rejected.clone());
                trace!(
                    "Applied batch {} ({} mutations, {} rejected)",
                    batch_id,
                    mutations.len(),
                    rejected.len()
                );
                rejected
            };
            (rejected, table.last_timestamp)
        };
        if let Some(cells) = written.filter(|cells| !cells.is_empty()) {
            self.journal_write(table, last_timestamp, cells)?;
        }

        if matches!(fault, WriteFault::DropAck) {
            return Err(Error::Transport(format!(
                "timed out waiting for acknowledgement of batch {}",
                batch_id
            )));
        }

        Ok(rejected
            .into_iter()
            .filter_map(|(idx, reason)| {
                mutations.get(idx).map(|m| RejectedMutation {
                    mutation: m.clone(),
                    reason,
                })
            })
            .collect())
    }

    fn scan_page(&self, token: &AuthToken, request: &ScanRequest) -> Result<ScanPage> {
        self.validate(token)?;
        let handle = self.table(&request.table)?;

        if self.faults.on_scan_page() {
            if let Some(id) = request.scan_id {
                self.open_scans.remove(&id);
            }
            return Err(Error::ScanInterrupted {
                last_key: request.resume_after.clone(),
            });
        }

        let page = handle.read().scan(
            &request.range,
            &request.authorizations,
            &request.families,
            request.resume_after.as_ref(),
            request.batch_size.max(1),
        );

        let scan_id = if page.finished {
            if let Some(id) = request.scan_id {
                self.open_scans.remove(&id);
            }
            None
        } else {
            let id = request
                .scan_id
                .unwrap_or_else(|| self.next_scan_id.fetch_add(1, Ordering::SeqCst));
            self.open_scans.insert(id, request.table.clone());
            Some(id)
        };

        Ok(ScanPage {
            entries: page.entries,
            scan_id,
        })
    }

    fn close_scan(&self, scan_id: ScanId) {
        if self.open_scans.remove(&scan_id).is_some() {
            trace!("Closed scan {}", scan_id);
        }
    }
}
