//! User management

pub mod directory;

pub use directory::{NewUser, UserDirectory, UserProfile, UserUpdate};
