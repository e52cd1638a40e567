//! Store adapters implementing the [`crate::ports::store`] traits.
//!
//! - [`postgres`] - production adapter backed by PostgreSQL via SQLx
//! - [`memory`] - map-backed adapter for tests and the `--memory-store`
//!   development mode

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
