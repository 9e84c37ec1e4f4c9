//! Client for a sorted, versioned key-value store.
//!
//! A [`ClientSession`] authenticates once and is shared by table
//! administration, [`BatchWriter`]s and [`Scanner`]s. The store itself sits
//! behind [`TabletTransport`]; [`LocalStore`] is an embedded implementation,
//! optionally persisted to a snapshot file.

pub mod admin;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod local_store;
pub mod logging;
pub mod metrics;
pub mod opts;
pub mod retry;
pub mod scanner;
pub mod security;
pub mod session;
pub mod transport;
pub mod writer;

pub use admin::{NewTableConfiguration, SecurityOperations, TableOperations, TimeType};
pub use auth::{AuthToken, Credential, CredentialSource, KeytabFile, StaticCredential};
pub use config::ClientConfig;
pub use data::{Key, Mutation, RejectReason, RejectedMutation, RowRange, Value};
pub use error::{Error, Result};
pub use local_store::{FaultPlan, LocalStore};
pub use retry::RetryPolicy;
pub use scanner::Scanner;
pub use security::{Authorizations, ColumnVisibility};
pub use session::{with_session, ClientSession, SessionState};
pub use transport::TabletTransport;
pub use writer::{BatchWriter, BatchWriterConfig, WriterStats};
