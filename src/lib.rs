//! zonewalk - traverse NSEC3-signed DNS zones and crack the harvested hashes
//!
//! A zone using NSEC3 denial-of-existence leaks, with every negative
//! answer, one link of a circular chain of hashed names. zonewalk
//! queries for names that cannot exist, collects the leaked links until
//! the chain closes, and optionally runs a dictionary attack over the
//! harvested hashes to recover the plaintext names.

pub mod crack;
pub mod dns;
pub mod error;
pub mod files;
pub mod hasher;
pub mod output;
pub mod types;
pub mod walk;

// Re-export commonly used types
pub use error::{Result, WalkError};
pub use types::{Candidate, Interval, Nsec3Params};
pub use walk::{WalkConfig, Walker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
