//! Session Management Module
//!
//! Login state, its signed on-disk snapshot and the storage that keeps it
//! across restarts.

pub mod manager;
pub mod storage;
pub mod token;
pub mod types;

pub use manager::SessionManager;
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
pub use token::SessionSigner;
pub use types::*;
