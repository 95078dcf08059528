// ABOUTME: Library root for tail-replicator
// ABOUTME: Exposes the replication core, PostgreSQL backend, configuration, and reporting

pub mod commands;
pub mod config;
pub mod postgres;
pub mod report;
pub mod tail;
pub mod utils;

pub use config::{ConnectionDescriptor, ReplicationConfig};
pub use tail::{RunStatistics, SyncError, SyncOutcome, TableStore};
