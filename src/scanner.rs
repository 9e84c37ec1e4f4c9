use crate::data::{Key, RowRange, Value};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::security::Authorizations;
use crate::session::ClientSession;
use crate::transport::{ScanId, ScanRequest};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Lazy, pull-based iteration over a table.
///
/// Entries come back in key order: row, family, qualifier, visibility, then
/// newest timestamp first. Each call to `next` may block while the next page
/// is fetched. If a page request fails with a retryable error the scan is
/// re-issued after the last entry already returned, so nothing is repeated
/// or skipped.
pub struct Scanner {
    session: Arc<ClientSession>,
    table: String,
    range: RowRange,
    authorizations: Authorizations,
    families: Vec<Vec<u8>>,
    batch_size: usize,
    retry: RetryPolicy,
    pending: VecDeque<(Key, Value)>,
    last_key: Option<Key>,
    scan_id: Option<ScanId>,
    finished: bool,
}

impl Scanner {
    pub fn new(
        session: Arc<ClientSession>,
        table: &str,
        authorizations: Authorizations,
    ) -> Result<Self> {
        if !session.table_operations().exists(table)? {
            return Err(Error::TableNotFound(table.to_string()));
        }
        let batch_size = session.scan_batch_size();
        Ok(Self {
            session,
            table: table.to_string(),
            range: RowRange::all(),
            authorizations,
            families: Vec::new(),
            batch_size,
            retry: RetryPolicy::default(),
            pending: VecDeque::new(),
            last_key: None,
            scan_id: None,
            finished: false,
        })
    }

    /// Restrict the scan to `range`. Restarts the scan.
    pub fn set_range(&mut self, range: RowRange) -> &mut Self {
        self.range = range;
        self.restart();
        self
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) -> &mut Self {
        self.retry = retry;
        self
    }

    /// Only return entries in `family`. May be called more than once.
    pub fn fetch_column_family(&mut self, family: impl Into<Vec<u8>>) -> &mut Self {
        self.families.push(family.into());
        self.restart();
        self
    }

    pub fn range(&self) -> &RowRange {
        &self.range
    }

    /// Release server-side scan state. Further calls to `next` return `None`.
    pub fn close(&mut self) {
        self.release();
        self.pending.clear();
        self.finished = true;
    }

    fn release(&mut self) {
        if let Some(id) = self.scan_id.take() {
            self.session.transport().close_scan(id);
        }
    }

    fn restart(&mut self) {
        self.release();
        self.pending.clear();
        self.last_key = None;
        self.finished = false;
    }

    fn fetch_page(&mut self) -> Result<()> {
        let transport = Arc::clone(self.session.transport());
        let mut scan_id = self.scan_id.take();

        let result = self.retry.try_execute(&mut |attempt| {
            if attempt > 1 {
                // Server state may be gone; start a fresh scan after the
                // last key we handed out.
                if let Some(id) = scan_id.take() {
                    transport.close_scan(id);
                }
                debug!(
                    "Resuming scan of {} after {:?}",
                    self.table,
                    self.last_key.as_ref().map(|k| k.to_string())
                );
            }
            let request = ScanRequest {
                table: self.table.clone(),
                range: self.range.clone(),
                authorizations: self.authorizations.clone(),
                families: self.families.clone(),
                resume_after: self.last_key.clone(),
                batch_size: self.batch_size,
                scan_id,
            };
            self.session
                .call(|token| transport.scan_page(token, &request))
        });

        match result {
            Ok((page, _attempts)) => {
                self.finished = page.is_last();
                self.scan_id = page.scan_id;
                self.pending.extend(page.entries);
                Ok(())
            }
            Err((err, attempts)) => {
                if let Some(id) = scan_id {
                    transport.close_scan(id);
                }
                debug!("Scan of {} failed after {} attempt(s): {}", self.table, attempts, err);
                Err(err)
            }
        }
    }
}

impl Iterator for Scanner {
    type Item = Result<(Key, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, value)) = self.pending.pop_front() {
                self.last_key = Some(key.clone());
                return Some(Ok((key, value)));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.close();
                return Some(Err(err));
            }
        }
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.release();
    }
}
