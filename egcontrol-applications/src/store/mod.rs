//! Document store adapters
//!
//! `MemoryDocumentStore` backs tests and throwaway runs; `SqliteDocumentStore`
//! (feature `sqlite`) is the persistent deployment.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryDocumentStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;
