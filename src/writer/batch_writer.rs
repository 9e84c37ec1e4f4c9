use super::buffer::{BufferLimits, MutationBuffer};
use super::flusher::{FlushPolicy, Flusher};
use crate::data::{Mutation, RejectedMutation};
use crate::error::{Error, Result};
use crate::metrics::WriterMetrics;
use crate::retry::RetryPolicy;
use crate::session::ClientSession;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct BatchWriterConfig {
    /// Buffered bytes that trigger a flush.
    pub max_memory: usize,
    pub max_mutations: usize,
    /// Longest a mutation may sit in the buffer before the timer flushes it.
    pub max_latency: Duration,
    pub retry: RetryPolicy,
    pub max_rejected_retries: u32,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            max_memory: 50 * 1024 * 1024,
            max_mutations: 10_000,
            max_latency: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            max_rejected_retries: 3,
        }
    }
}

impl BatchWriterConfig {
    fn limits(&self) -> BufferLimits {
        BufferLimits {
            max_mutations: self.max_mutations,
            max_memory: self.max_memory,
            max_latency: self.max_latency,
        }
    }

    fn tick(&self) -> Duration {
        (self.max_latency / 4).max(Duration::from_millis(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub mutations_added: u64,
    pub mutations_written: u64,
    pub batches_flushed: u64,
    pub flush_attempts: u64,
    pub rejected: u64,
}

/// Outcomes not yet reported to the caller.
#[derive(Default)]
struct Failures {
    unconfirmed: Vec<Mutation>,
    rejected: Vec<RejectedMutation>,
    reason: Option<Error>,
}

impl Failures {
    fn is_empty(&self) -> bool {
        self.unconfirmed.is_empty() && self.rejected.is_empty() && self.reason.is_none()
    }

    fn into_error(self) -> Error {
        match self.reason {
            Some(reason) => {
                let mut unconfirmed = self.unconfirmed;
                unconfirmed.extend(self.rejected.into_iter().map(|r| r.mutation));
                Error::WriteFailed {
                    unconfirmed,
                    reason: Box::new(reason),
                }
            }
            None => Error::PartialWrite {
                rejected: self.rejected,
            },
        }
    }
}

struct WriterShared {
    buffer: MutationBuffer,
    flusher: Flusher,
    // One flush in flight keeps writes to a row in order.
    flush_lock: Mutex<()>,
    failures: Mutex<Failures>,
    mutations_added: AtomicU64,
    mutations_written: AtomicU64,
    batches_flushed: AtomicU64,
    rejected: AtomicU64,
}

impl WriterShared {
    /// Drain and send whatever is buffered. Failures are recorded, not
    /// returned, so background flushes lose nothing.
    fn flush_buffered(&self) {
        let _guard = self.flush_lock.lock();
        let Some(batch) = self.buffer.drain() else {
            return;
        };

        match self.flusher.flush(batch) {
            Ok(report) => {
                self.mutations_written
                    .fetch_add(report.written as u64, Ordering::Relaxed);
                self.batches_flushed.fetch_add(1, Ordering::Relaxed);
                if !report.rejected.is_empty() {
                    self.rejected
                        .fetch_add(report.rejected.len() as u64, Ordering::Relaxed);
                    self.failures.lock().rejected.extend(report.rejected);
                }
            }
            Err(Error::WriteFailed {
                unconfirmed,
                reason,
            }) => {
                warn!(
                    "Flush to {} failed, {} mutation(s) unconfirmed: {}",
                    self.flusher.table(),
                    unconfirmed.len(),
                    reason
                );
                let mut failures = self.failures.lock();
                failures.unconfirmed.extend(unconfirmed);
                failures.reason.get_or_insert(*reason);
            }
            Err(err) => {
                warn!("Flush to {} failed: {}", self.flusher.table(), err);
                self.failures.lock().reason.get_or_insert(err);
            }
        }
    }

    fn take_failures(&self) -> Result<()> {
        let failures = std::mem::take(&mut *self.failures.lock());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.into_error())
        }
    }
}

/// Buffers mutations for one table and flushes them by size, count or age.
///
/// Failures from any flush, including timer-driven ones, are kept until the
/// next `flush` or `close` returns them; each unconfirmed mutation is
/// reported exactly once.
pub struct BatchWriter {
    shared: Arc<WriterShared>,
    shutdown: Option<Sender<()>>,
    timer: Option<JoinHandle<()>>,
}

impl BatchWriter {
    pub fn new(session: Arc<ClientSession>, table: &str, config: BatchWriterConfig) -> Result<Self> {
        Self::build(session, table, config, None)
    }

    pub fn with_metrics(
        session: Arc<ClientSession>,
        table: &str,
        config: BatchWriterConfig,
        metrics: WriterMetrics,
    ) -> Result<Self> {
        Self::build(session, table, config, Some(metrics))
    }

    fn build(
        session: Arc<ClientSession>,
        table: &str,
        config: BatchWriterConfig,
        metrics: Option<WriterMetrics>,
    ) -> Result<Self> {
        if !session.table_operations().exists(table)? {
            return Err(Error::TableNotFound(table.to_string()));
        }

        let policy = FlushPolicy {
            retry: config.retry.clone(),
            max_rejected_retries: config.max_rejected_retries,
        };
        let mut flusher = Flusher::new(session, table, policy);
        if let Some(metrics) = metrics {
            flusher = flusher.with_metrics(metrics);
        }

        let shared = Arc::new(WriterShared {
            buffer: MutationBuffer::new(config.limits()),
            flusher,
            flush_lock: Mutex::new(()),
            failures: Mutex::new(Failures::default()),
            mutations_added: AtomicU64::new(0),
            mutations_written: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        });

        let (shutdown, ticks) = channel::bounded::<()>(0);
        let tick = config.tick();
        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name(format!("batch-writer-{}", table))
            .spawn(move || loop {
                match ticks.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => {
                        if timer_shared.buffer.should_flush() {
                            timer_shared.flush_buffered();
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        debug!(
            "Batch writer for {} started (max {} mutations, {} bytes, {:?})",
            table, config.max_mutations, config.max_memory, config.max_latency
        );

        Ok(Self {
            shared,
            shutdown: Some(shutdown),
            timer: Some(timer),
        })
    }

    /// Buffer a mutation, flushing on this thread when a threshold is hit.
    /// A flush triggered here returns every failure recorded so far.
    pub fn add_mutation(&self, mutation: Mutation) -> Result<()> {
        let ready = self.shared.buffer.add(mutation)?;
        self.shared.mutations_added.fetch_add(1, Ordering::Relaxed);
        if ready {
            self.flush()?;
        }
        Ok(())
    }

    pub fn add_mutations<I>(&self, mutations: I) -> Result<()>
    where
        I: IntoIterator<Item = Mutation>,
    {
        for mutation in mutations {
            self.add_mutation(mutation)?;
        }
        Ok(())
    }

    /// Send everything buffered and wait for it to be acknowledged.
    pub fn flush(&self) -> Result<()> {
        self.shared.flush_buffered();
        self.shared.take_failures()
    }

    pub fn buffered(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn stats(&self) -> WriterStats {
        let shared = &self.shared;
        WriterStats {
            mutations_added: shared.mutations_added.load(Ordering::Relaxed),
            mutations_written: shared.mutations_written.load(Ordering::Relaxed),
            batches_flushed: shared.batches_flushed.load(Ordering::Relaxed),
            flush_attempts: shared.flusher.attempts(),
            rejected: shared.rejected.load(Ordering::Relaxed),
        }
    }

    /// Flush what remains and stop the timer thread.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        // Dropping the sender disconnects the timer's channel.
        drop(self.shutdown.take());
        if let Some(timer) = self.timer.take() {
            if timer.join().is_err() {
                error!("Batch writer timer thread for {} panicked", self.shared.flusher.table());
            }
        }
        self.flush()
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if self.timer.is_none() {
            return;
        }
        if let Err(err) = self.shutdown() {
            error!(
                "Batch writer for {} dropped with failures: {}",
                self.shared.flusher.table(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::NewTableConfiguration;
    use crate::auth::StaticCredential;
    use crate::config::ClientConfig;
    use crate::data::RejectReason;
    use crate::local_store::LocalStore;

    fn setup() -> (Arc<LocalStore>, Arc<ClientSession>) {
        let store = Arc::new(LocalStore::new());
        let session = ClientSession::open(
            &ClientConfig::default(),
            store.clone(),
            Box::new(StaticCredential::password("root", "secret")),
        )
        .unwrap();
        session
            .table_operations()
            .create("t", NewTableConfiguration::new())
            .unwrap();
        (store, session)
    }

    fn config(max_mutations: usize, max_latency: Duration) -> BatchWriterConfig {
        BatchWriterConfig {
            max_mutations,
            max_latency,
            retry: RetryPolicy::immediate(3),
            ..Default::default()
        }
    }

    fn mutation(i: usize) -> Mutation {
        let mut m = Mutation::new(format!("row_{}", i));
        m.put("colfam", "colqual_0", format!("value_{}_0", i));
        m
    }

    #[test]
    fn test_missing_table() {
        let (_store, session) = setup();
        let err = BatchWriter::new(session, "nope", BatchWriterConfig::default()).err();
        assert!(matches!(err, Some(Error::TableNotFound(t)) if t == "nope"));
    }

    #[test]
    fn test_count_threshold_flushes_inline() {
        let (store, session) = setup();
        let writer = BatchWriter::new(session, "t", config(10, Duration::from_secs(60))).unwrap();
        for i in 0..25 {
            writer.add_mutation(mutation(i)).unwrap();
        }
        assert_eq!(writer.buffered(), 5);
        assert_eq!(store.raw_entry_count("t").unwrap(), 20);

        let stats = writer.stats();
        assert_eq!(stats.mutations_added, 25);
        assert_eq!(stats.mutations_written, 20);
        assert_eq!(stats.batches_flushed, 2);

        writer.close().unwrap();
        assert_eq!(store.raw_entry_count("t").unwrap(), 25);
    }

    #[test]
    fn test_timer_flushes_old_mutations() {
        let (store, session) = setup();
        let writer =
            BatchWriter::new(session, "t", config(1000, Duration::from_millis(20))).unwrap();
        writer.add_mutation(mutation(0)).unwrap();

        let mut flushed = false;
        for _ in 0..200 {
            if store.raw_entry_count("t").unwrap() == 1 {
                flushed = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(flushed);
        writer.close().unwrap();
    }

    #[test]
    fn test_close_reports_unconfirmed_mutations() {
        let (store, session) = setup();
        let writer = BatchWriter::new(session, "t", config(1000, Duration::from_secs(60))).unwrap();
        for i in 0..3 {
            writer.add_mutation(mutation(i)).unwrap();
        }
        store.faults().fail_next_writes(10);

        match writer.close() {
            Err(Error::WriteFailed { unconfirmed, .. }) => assert_eq!(unconfirmed.len(), 3),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_rejections_reported_once() {
        let (store, session) = setup();
        store
            .faults()
            .reject_row("row_1", RejectReason::ConstraintViolation("bad".into()), None);
        let writer = BatchWriter::new(session, "t", config(1000, Duration::from_secs(60))).unwrap();
        for i in 0..3 {
            writer.add_mutation(mutation(i)).unwrap();
        }

        match writer.flush() {
            Err(Error::PartialWrite { rejected }) => {
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].mutation.row(), b"row_1");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(writer.flush().is_ok());
        assert_eq!(writer.stats().rejected, 1);
        writer.close().unwrap();
    }
}
