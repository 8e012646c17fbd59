//! NORMAL / DEGRADED / HALTED transitions

use super::SystemState;
use crate::error::{KernelError, KernelResult};

/// Validates a system state transition.
///
/// `HALTED` only leaves through recovery; a later trigger keeps it halted.
///
/// # Errors
/// Returns [`KernelError::IllegalTransition`] if `to` is not reachable from `from`
pub fn validate_transition(from: SystemState, to: SystemState) -> KernelResult<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(KernelError::IllegalTransition { from, to })
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: SystemState) -> Vec<SystemState> {
    use SystemState::{Degraded, Halted, Normal};
    match from {
        Normal => vec![Degraded, Halted],
        Degraded => vec![Degraded, Halted, Normal],
        Halted => vec![Halted, Normal],
    }
}
