//! DTL Kernel
//!
//! The two components that decide whether a run may persist anything.
//!
//! - [`CommitGate`]: seven ordered checks plus the prewrite/promote protocol
//! - [`DegradedModeController`]: `NORMAL` / `DEGRADED` / `HALTED` state
//!   machine consulted before every write
//!
//! # Example
//!
//! ```rust,ignore
//! use dtl_kernel::{CommitGate, GateContext, PromoteStatus};
//!
//! let gate = CommitGate::new(evidence_store, "data/run_ledger/prewrite");
//! let ctx = GateContext { active_kill_switches: &[], allowed_capabilities: &allowed, now: run.instant() };
//!
//! if gate.validate_eligibility(&bundle, &ctx).accepted() {
//!     gate.create_prewrite(&bundle)?;
//!     if gate.validate(&bundle, &ctx).accepted() {
//!         assert_eq!(gate.promote_to_committed(&bundle.run_id).status, PromoteStatus::Success);
//!     } else {
//!         gate.delete_prewrite(&bundle.run_id);
//!     }
//! }
//! ```

#![warn(unreachable_pub)]

// Core modules
mod commit_gate;
mod degraded;
mod error;
mod rejection;

// Re-exports
pub use commit_gate::{CommitGate, GateContext, PrewriteToken, DEFAULT_EVIDENCE_TTL_SECS, LEARNING_CAPABILITIES};
pub use degraded::{
    allowed_transitions, validate_transition, AlertSettings, DegradedBehavior, DegradedModeController,
    DegradedModeEvent, DegradedModePolicy, DegradedStatus, PolicyAction, RecoverySettings, SystemState,
    TriggerCondition, TriggerConditions, TriggerRule, DEFAULT_ALERT_TEMPLATE,
};
pub use error::{KernelError, KernelResult};
pub use rejection::{CommitResult, CommitStatus, PromoteResult, PromoteStatus, RejectionCode, RejectionPayload};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the kernel
    pub use crate::{
        CommitGate, CommitResult, DegradedModeController, GateContext, PromoteStatus, RejectionCode, SystemState,
        TriggerCondition,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
