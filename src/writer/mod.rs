//! Client-side write path: mutations are buffered, drained into batches and
//! flushed over an authenticated session.

mod batch_writer;
mod buffer;
mod flusher;

pub use batch_writer::{BatchWriter, BatchWriterConfig, WriterStats};
pub use buffer::{BufferLimits, MutationBuffer, PendingBatch};
pub use flusher::{FlushPolicy, FlushReport, Flusher};
