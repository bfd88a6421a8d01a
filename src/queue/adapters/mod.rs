//! Queue adapter implementations.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStatusChangeQueue;
pub use postgres::PostgresStatusChangeQueue;
