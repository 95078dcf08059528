// ABOUTME: PostgreSQL backend for tail replication
// ABOUTME: Connection management and the TableStore implementation

pub mod connection;
pub mod store;

pub use connection::{connect, connect_with_retry, init_tls_policy, Connection};
pub use store::{PgInsert, PgStore};
