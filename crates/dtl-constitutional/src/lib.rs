//! DTL Constitutional Layer
//!
//! The operator-controlled boundary around every stage.
//!
//! # Core Operations
//!
//! - **Firewall**: schema plus injection checks on every inter-stage message
//! - **Kill switches**: hard and soft blocks on named operations
//!
//! # Architecture
//!
//! ```text
//! stage output → InterStageFirewall (schema gate + injection gate) → next stage
//!                         ↑
//!                   SchemaRegistry (config/schemas/*.json)
//!
//! run start → KillSwitchEnforcer (config/kill_switches.json) → proceed / halt
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use dtl_constitutional::{InterStageFirewall, KillSwitchEnforcer, SchemaRegistry};
//!
//! let firewall = InterStageFirewall::new(SchemaRegistry::load_dir("config/schemas")?);
//! let verdict = firewall.validate(&message, "proposal_envelope");
//! if !verdict.valid {
//!     eprintln!("{}", verdict.errors.join("\n"));
//! }
//!
//! let switches = KillSwitchEnforcer::load("config/kill_switches.json")?;
//! let outcome = switches.enforce(&["run_agents", "write_evidence"]);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
mod error;
mod firewall;
mod kill_switch;
mod schema;

// Re-exports
pub use error::{ConstitutionalError, ConstitutionalResult};
pub use firewall::{scan_for_injection, FirewallVerdict, InterStageFirewall, HIGH_RISK_FIELDS, SAFE_FIELDS};
pub use kill_switch::{
    Enforcement, EnforcementResult, KillSwitch, KillSwitchEnforcer, KillSwitchPolicy, COMMIT_GATE_PASS,
    DISABLE_LEARNING, DISABLE_WRITES,
};
pub use schema::{CompiledSchema, SchemaRegistry, SchemaViolation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the Constitutional Layer
    pub use crate::{
        ConstitutionalError, EnforcementResult, FirewallVerdict, InterStageFirewall, KillSwitchEnforcer,
        SchemaRegistry,
    };
}
