//! Persistence adapters shipped with the runtime.

pub mod in_memory;

pub use in_memory::{cosine_similarity, InMemoryDatabaseAdapter};
