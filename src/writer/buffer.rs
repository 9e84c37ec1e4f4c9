use crate::data::Mutation;
use crate::error::Result;
use crate::transport::BatchId;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Thresholds that make a buffer ready to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub max_mutations: usize,
    pub max_memory: usize,
    pub max_latency: Duration,
}

/// Snapshot of buffered mutations taken at flush time.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub id: BatchId,
    pub mutations: Vec<Mutation>,
    pub size_bytes: usize,
}

impl PendingBatch {
    pub fn new(mutations: Vec<Mutation>) -> Self {
        let size_bytes = mutations.iter().map(Mutation::estimated_size).sum();
        Self {
            id: next_batch_id(),
            mutations,
            size_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Batch ids only need to be unique per store; random ids stay unique when
/// several processes write to one store.
pub(crate) fn next_batch_id() -> BatchId {
    rand::random()
}

struct BufferInner {
    mutations: Vec<Mutation>,
    size_bytes: usize,
    last_drain: Instant,
}

/// Accumulates mutations until a count, size or age threshold is reached.
pub struct MutationBuffer {
    limits: BufferLimits,
    inner: Mutex<BufferInner>,
}

impl MutationBuffer {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(BufferInner {
                mutations: Vec::new(),
                size_bytes: 0,
                last_drain: Instant::now(),
            }),
        }
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Append a mutation. Returns whether the buffer should now be flushed.
    pub fn add(&self, mutation: Mutation) -> Result<bool> {
        mutation.validate()?;
        let size = mutation.estimated_size();

        let mut inner = self.inner.lock();
        inner.mutations.push(mutation);
        inner.size_bytes += size;
        Ok(self.over_limits(&inner))
    }

    pub fn should_flush(&self) -> bool {
        self.over_limits(&self.inner.lock())
    }

    fn over_limits(&self, inner: &BufferInner) -> bool {
        if inner.mutations.is_empty() {
            return false;
        }
        inner.mutations.len() >= self.limits.max_mutations
            || inner.size_bytes >= self.limits.max_memory
            || inner.last_drain.elapsed() >= self.limits.max_latency
    }

    /// Take everything buffered so far and reset the counters and latency
    /// clock. `None` when there is nothing to flush.
    pub fn drain(&self) -> Option<PendingBatch> {
        let (mutations, size_bytes) = {
            let mut inner = self.inner.lock();
            inner.last_drain = Instant::now();
            if inner.mutations.is_empty() {
                return None;
            }
            let size = std::mem::take(&mut inner.size_bytes);
            (std::mem::take(&mut inner.mutations), size)
        };

        Some(PendingBatch {
            id: next_batch_id(),
            mutations,
            size_bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().mutations.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.lock().size_bytes
    }

    /// Age of the oldest possible buffered mutation.
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().last_drain.elapsed()
    }
}
