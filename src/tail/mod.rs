// ABOUTME: Tail replication core - copies new rows from the tail of source tables to a target
// ABOUTME: Fingerprint, read, filter, write, per-table sync, and run coordination

pub mod coordinator;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod reader;
pub mod row;
pub mod stats;
pub mod store;
pub mod table;
pub mod writer;

#[cfg(test)]
pub(crate) mod memory;

pub use coordinator::{resolve_eligible, run, Progress, DEFAULT_TAIL_LIMIT};
pub use error::SyncError;
pub use filter::novel_rows;
pub use fingerprint::{canonical_text, fingerprint, Fingerprint};
pub use reader::read_tail;
pub use row::{Row, RowSet, Value};
pub use stats::{RunStatistics, SyncOutcome};
pub use store::{TableStore, Window};
pub use table::sync_table;
pub use writer::{write_rows, BatchResult, RowInsert};
