//! Database layer for Heartwatch.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Both the durable job queue and the
//! authorization store live in SQLite files created through this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external broker or database process is
//!   required. WAL mode allows concurrent readers with a single writer,
//!   which matches a queue with several workers and one store.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
