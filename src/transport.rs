//! The narrow interface the client needs from a store.
//!
//! Everything behind this trait (SASL negotiation, tablet location, RPC) is
//! the store's business. [`crate::local_store::LocalStore`] is the bundled
//! implementation.

use crate::admin::NewTableConfiguration;
use crate::auth::{AuthToken, Credential, HandshakeOptions};
use crate::data::{Key, Mutation, RejectedMutation, RowRange, Value};
use crate::error::Result;
use crate::security::Authorizations;
use std::time::Duration;

pub type BatchId = u64;
pub type ScanId = u64;

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub table: String,
    pub range: RowRange,
    pub authorizations: Authorizations,
    pub families: Vec<Vec<u8>>,
    /// Resume strictly after this key.
    pub resume_after: Option<Key>,
    pub batch_size: usize,
    /// Server-side scan session to continue, if any.
    pub scan_id: Option<ScanId>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub entries: Vec<(Key, Value)>,
    /// `None` when the scan has produced everything in range.
    pub scan_id: Option<ScanId>,
}

impl ScanPage {
    pub fn is_last(&self) -> bool {
        self.scan_id.is_none()
    }
}

pub trait TabletTransport: Send + Sync {
    /// Perform the authentication handshake and issue a token valid for
    /// `ttl`.
    fn authenticate(
        &self,
        principal: &str,
        credential: &Credential,
        options: &HandshakeOptions,
        ttl: Duration,
    ) -> Result<AuthToken>;

    fn whoami(&self, token: &AuthToken) -> Result<String>;

    fn list_tables(&self, token: &AuthToken) -> Result<Vec<String>>;

    fn table_exists(&self, token: &AuthToken, table: &str) -> Result<bool>;

    fn create_table(
        &self,
        token: &AuthToken,
        table: &str,
        config: &NewTableConfiguration,
    ) -> Result<()>;

    fn delete_table(&self, token: &AuthToken, table: &str) -> Result<()>;

    fn list_local_users(&self, token: &AuthToken) -> Result<Vec<String>>;

    /// Apply a batch. Returns the mutations the server refused; an `Err`
    /// means nothing in the batch is known to be durable. Re-sending a batch
    /// id that was already applied must not apply it twice.
    fn write_batch(
        &self,
        token: &AuthToken,
        table: &str,
        batch_id: BatchId,
        mutations: &[Mutation],
    ) -> Result<Vec<RejectedMutation>>;

    fn scan_page(&self, token: &AuthToken, request: &ScanRequest) -> Result<ScanPage>;

    /// Release server-side state for an unfinished scan.
    fn close_scan(&self, scan_id: ScanId);
}
