//! Authenticated connection handle shared by table administration, batch
//! writers and scanners.

use crate::admin::{SecurityOperations, TableOperations};
use crate::auth::{AuthToken, CredentialSource, HandshakeOptions};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::scanner::Scanner;
use crate::security::Authorizations;
use crate::transport::TabletTransport;
use crate::writer::{BatchWriter, BatchWriterConfig};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

struct SessionInner {
    state: SessionState,
    token: Option<Arc<AuthToken>>,
}

pub struct ClientSession {
    transport: Arc<dyn TabletTransport>,
    credentials: Box<dyn CredentialSource>,
    handshake: HandshakeOptions,
    token_ttl: Duration,
    refresh_margin: Duration,
    scan_batch_size: usize,
    writer_config: BatchWriterConfig,
    inner: RwLock<SessionInner>,
    // Serialises re-authentication so concurrent callers refresh once.
    refresh_lock: Mutex<()>,
}

impl ClientSession {
    /// Authenticate and return a ready session.
    pub fn open(
        config: &ClientConfig,
        transport: Arc<dyn TabletTransport>,
        credentials: Box<dyn CredentialSource>,
    ) -> Result<Arc<Self>> {
        debug!(
            "qop={}, primary={}",
            config.handshake.qop, config.handshake.server_primary
        );

        let session = Arc::new(Self {
            transport,
            credentials,
            handshake: config.handshake.clone(),
            token_ttl: config.token_ttl,
            refresh_margin: config.refresh_margin,
            scan_batch_size: config.scan_batch_size,
            writer_config: config.batch_writer.clone(),
            inner: RwLock::new(SessionInner {
                state: SessionState::Unauthenticated,
                token: None,
            }),
            refresh_lock: Mutex::new(()),
        });

        let token = session.handshake()?;
        {
            let mut inner = session.inner.write();
            inner.token = Some(token);
            inner.state = SessionState::Authenticated;
        }
        debug!("principal: {} is ready for Kerberos", session.principal());

        Ok(session)
    }

    fn handshake(&self) -> Result<Arc<AuthToken>> {
        let principal = self.credentials.principal();
        let credential = self.credentials.load()?;
        let token = self.transport.authenticate(
            principal,
            &credential,
            &self.handshake,
            self.token_ttl,
        )?;
        Ok(Arc::new(token))
    }

    pub fn principal(&self) -> &str {
        self.credentials.principal()
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub(crate) fn transport(&self) -> &Arc<dyn TabletTransport> {
        &self.transport
    }

    pub(crate) fn scan_batch_size(&self) -> usize {
        self.scan_batch_size
    }

    /// Current token, refreshed first when it is about to expire. Callers
    /// keep the returned `Arc` for the duration of their operation, so a
    /// concurrent refresh never pulls a token out from under them.
    pub fn token(&self) -> Result<Arc<AuthToken>> {
        {
            let inner = self.inner.read();
            match (&inner.state, &inner.token) {
                (SessionState::Closed, _) => return Err(Error::SessionClosed),
                (SessionState::Authenticated, Some(token))
                    if !token.expires_within(self.refresh_margin) =>
                {
                    return Ok(Arc::clone(token))
                }
                _ => {}
            }
        }
        self.refresh(false)
    }

    fn refresh(&self, force: bool) -> Result<Arc<AuthToken>> {
        let _guard = self.refresh_lock.lock();

        let current = {
            let inner = self.inner.read();
            if inner.state == SessionState::Closed {
                return Err(Error::SessionClosed);
            }
            inner.token.clone()
        };
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = &current {
            if !force && !token.expires_within(self.refresh_margin) {
                return Ok(Arc::clone(token));
            }
        }

        match self.handshake() {
            Ok(token) => {
                debug!("Refreshed token for {}", self.principal());
                let mut inner = self.inner.write();
                if inner.state == SessionState::Closed {
                    return Err(Error::SessionClosed);
                }
                inner.token = Some(Arc::clone(&token));
                Ok(token)
            }
            Err(err) if err.is_authentication() => {
                warn!("Re-authentication failed, closing session: {}", err);
                self.close();
                Err(err)
            }
            Err(err) => match current {
                // Keep using a still-valid token if the store is briefly unreachable.
                Some(token) if !force && !token.is_expired() => {
                    warn!("Token refresh failed, continuing with current token: {}", err);
                    Ok(token)
                }
                _ => Err(err),
            },
        }
    }

    /// Run `op` with a valid token. If the store rejects the token, the
    /// session re-authenticates once and retries; a second rejection closes
    /// the session.
    pub(crate) fn call<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(&AuthToken) -> Result<T>,
    {
        let token = self.token()?;
        match op(&token) {
            Err(err) if err.is_authentication() => {
                debug!("Token rejected ({}), re-authenticating", err);
                let token = self.refresh(true)?;
                op(&token).inspect_err(|err| {
                    if err.is_authentication() {
                        self.close();
                    }
                })
            }
            other => other,
        }
    }

    pub fn whoami(&self) -> Result<String> {
        self.call(|token| self.transport.whoami(token))
    }

    pub fn table_operations(&self) -> TableOperations<'_> {
        TableOperations::new(self)
    }

    pub fn security_operations(&self) -> SecurityOperations<'_> {
        SecurityOperations::new(self)
    }

    /// Batch writer using the limits from the client configuration.
    pub fn create_batch_writer(self: &Arc<Self>, table: &str) -> Result<BatchWriter> {
        BatchWriter::new(Arc::clone(self), table, self.writer_config.clone())
    }

    pub fn create_batch_writer_with(
        self: &Arc<Self>,
        table: &str,
        config: BatchWriterConfig,
    ) -> Result<BatchWriter> {
        BatchWriter::new(Arc::clone(self), table, config)
    }

    pub fn create_scanner(
        self: &Arc<Self>,
        table: &str,
        authorizations: Authorizations,
    ) -> Result<Scanner> {
        Scanner::new(Arc::clone(self), table, authorizations)
    }

    /// Release the session. Calling it again is a no-op.
    pub fn close(&self) {
        let mut inner = self.inner.write();
        if inner.state != SessionState::Closed {
            inner.state = SessionState::Closed;
            inner.token = None;
            info!("Session for {} closed", self.credentials.principal());
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.close();
    }
}

struct CloseOnExit(Arc<ClientSession>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Open a session, run `f` with it and close it on every exit path,
/// including panics.
pub fn with_session<T, F>(
    config: &ClientConfig,
    transport: Arc<dyn TabletTransport>,
    credentials: Box<dyn CredentialSource>,
    f: F,
) -> Result<T>
where
    F: FnOnce(&Arc<ClientSession>) -> Result<T>,
{
    let guard = CloseOnExit(ClientSession::open(config, transport, credentials)?);
    f(&guard.0)
}
