use super::buffer::{next_batch_id, PendingBatch};
use crate::data::{Mutation, RejectedMutation};
use crate::error::{Error, Result};
use crate::metrics::WriterMetrics;
use crate::retry::RetryPolicy;
use crate::session::ClientSession;
use crate::transport::BatchId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FlushPolicy {
    /// Applied to transport failures of a whole batch.
    pub retry: RetryPolicy,
    /// Times a transiently rejected mutation is re-sent on its own.
    pub max_rejected_retries: u32,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_rejected_retries: 3,
        }
    }
}

/// Outcome of a flush in which the transport eventually succeeded.
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub batch_id: BatchId,
    /// Send attempts, counting retries of the batch and of rejected mutations.
    pub attempts: u32,
    pub written: usize,
    /// Mutations the store refused; none of them are durable.
    pub rejected: Vec<RejectedMutation>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Sends drained batches over an authenticated session.
pub struct Flusher {
    session: Arc<ClientSession>,
    table: String,
    policy: FlushPolicy,
    metrics: Option<WriterMetrics>,
    attempts: AtomicU64,
}

impl Flusher {
    pub fn new(session: Arc<ClientSession>, table: impl Into<String>, policy: FlushPolicy) -> Self {
        Self {
            session,
            table: table.into(),
            policy,
            metrics: None,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn with_metrics(mut self, metrics: WriterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Send attempts made by this flusher, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Send `batch`, retrying transport failures with backoff and re-sending
    /// transiently rejected mutations.
    ///
    /// When the transport gives up, the error is [`Error::WriteFailed`]
    /// carrying every mutation of the batch that is not known durable.
    pub fn flush(&self, batch: PendingBatch) -> Result<FlushReport> {
        let started = Instant::now();
        let batch_id = batch.id;
        let total = batch.len();
        debug!(
            "Flushing batch {} ({} mutations, {} bytes) to {}",
            batch_id, total, batch.size_bytes, self.table
        );

        let (mut pending_rejects, mut attempts) = match self.send(batch_id, &batch.mutations) {
            Ok(sent) => sent,
            Err((reason, attempts)) => {
                self.record_attempts(attempts);
                return Err(Error::WriteFailed {
                    unconfirmed: batch.mutations,
                    reason: Box::new(reason),
                });
            }
        };

        let mut rejected: Vec<RejectedMutation> = Vec::new();
        let mut round = 0;
        loop {
            let (transient, permanent): (Vec<_>, Vec<_>) = pending_rejects
                .into_iter()
                .partition(|r| r.reason.is_transient());
            rejected.extend(permanent);

            if transient.is_empty() {
                break;
            }
            if round >= self.policy.max_rejected_retries {
                rejected.extend(transient);
                break;
            }
            round += 1;

            let retry: Vec<Mutation> = transient.iter().map(|r| r.mutation.clone()).collect();
            debug!(
                "Re-sending {} transiently rejected mutation(s), round {}",
                retry.len(),
                round
            );
            match self.send(next_batch_id(), &retry) {
                Ok((again, n)) => {
                    attempts += n;
                    pending_rejects = again;
                }
                Err((reason, n)) => {
                    self.record_attempts(attempts + n);
                    let mut unconfirmed = retry;
                    unconfirmed.extend(rejected.into_iter().map(|r| r.mutation));
                    return Err(Error::WriteFailed {
                        unconfirmed,
                        reason: Box::new(reason),
                    });
                }
            }
        }

        for r in &rejected {
            warn!(
                "Mutation for row {} rejected: {}",
                String::from_utf8_lossy(r.mutation.row()),
                r.reason
            );
        }

        let written = total - rejected.len();
        self.record_attempts(attempts);
        if let Some(metrics) = &self.metrics {
            metrics.mutations_written.inc_by(written as u64);
            metrics.mutations_rejected.inc_by(rejected.len() as u64);
            metrics.batches_flushed.inc();
            metrics.flush_duration.observe(started.elapsed().as_secs_f64());
        }

        Ok(FlushReport {
            batch_id,
            attempts,
            written,
            rejected,
        })
    }

    fn send(
        &self,
        batch_id: BatchId,
        mutations: &[Mutation],
    ) -> std::result::Result<(Vec<RejectedMutation>, u32), (Error, u32)> {
        let transport = self.session.transport();
        self.policy.retry.try_execute(&mut |_attempt| {
            self.session
                .call(|token| transport.write_batch(token, &self.table, batch_id, mutations))
        })
    }

    fn record_attempts(&self, attempts: u32) {
        self.attempts.fetch_add(attempts as u64, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.flush_attempts.inc_by(attempts as u64);
        }
    }
}
