//! Knowledge-graph access: the store trait, the HTTP client, and an
//! in-memory store for tests and offline runs.

pub mod client;
pub mod store;

pub use client::GraphClient;
pub use store::{CallCounts, GraphError, GraphResult, GraphStore, MemoryGraphStore};
