//! DTL Store Layer
//!
//! Everything that reaches disk goes through here.
//!
//! # Core Operations
//!
//! - [`write_exclusive`]: write-once publish, exactly one concurrent writer wins
//! - [`write_replace`]: atomic overwrite for snapshots
//! - [`EvidenceStore`], [`RunLedger`]: write-once stores built on the above
//! - [`JsonlLog`]: append-only event logs
//! - [`EvidenceCandidateQueue`]: bounded drop-oldest buffer between stages
//!
//! # Example
//!
//! ```rust,ignore
//! use dtl_store::{write_exclusive, StoreError};
//!
//! match write_exclusive(&path, b"{}") {
//!     Ok(()) => println!("published"),
//!     Err(StoreError::FileExists { .. }) => println!("someone else won"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

#![warn(unreachable_pub)]

// Core modules
mod atomic;
mod error;
mod evidence_store;
mod jsonl;
mod ledger;
mod queue;

// Re-exports
pub use atomic::{move_noclobber, write_exclusive, write_json_exclusive, write_replace, Validator};
pub use error::{StoreError, StoreResult};
pub use evidence_store::EvidenceStore;
pub use jsonl::JsonlLog;
pub use ledger::RunLedger;
pub use queue::{EvidenceCandidateQueue, QueueStats, DEFAULT_QUEUE_SIZE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
