//! EG and Object records
//!
//! Both kinds are append-only, stamped at write time and read back newest
//! first.

pub mod service;
pub mod types;
pub mod validation;

pub use service::RecordQueryService;
pub use types::{EgRecord, NewObjectRecord, ObjectRecord, SearchOutcome, TrackedRecord};
pub use validation::{normalize_digits, validate_eg_code, validate_object};
