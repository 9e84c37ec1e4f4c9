//! Row, key and mutation types shared by the write and read paths.

mod key;
mod mutation;
mod range;

pub use key::{Key, Value};
pub use mutation::{ColumnUpdate, Mutation, RejectReason, RejectedMutation};
pub use range::RowRange;
