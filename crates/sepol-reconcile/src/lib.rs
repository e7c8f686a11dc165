//! sepol-reconcile
//!
//! Declarative reconciliation of SELinux host state.
//!
//! Each resource kind (enforcement mode, booleans, port policies, file-context
//! policies, file labels, policy modules) is converged by comparing the state
//! reported by a [`StateQuery`] adapter against the requested state, then
//! either reporting the would-be change (simulate-only) or applying it through
//! a [`StateMutation`] adapter and re-validating.
//!
//! Rules shared by every kind:
//! - Exactly one resource per call. The call never panics and never returns
//!   an error: every path ends in an [`Outcome`].
//! - Validation failures are reported before any adapter call.
//! - Simulate-only runs never touch the mutation side of the adapter.
//! - No retries. Retry policy belongs to whoever issues the calls.

mod boolean;
mod context;
mod engine;
mod fcontext;
mod host;
mod identity;
mod mode;
mod module;
mod outcome;
mod port;
mod types;

pub use context::ReconcileContext;
pub use engine::Reconciler;
pub use host::{HostError, SelinuxHost, StateMutation, StateQuery};
pub use identity::{resolve_port_target, InvalidPortTarget, PortTarget};
pub use outcome::{Delta, FcontextView, Outcome, OutcomeRecord, Status, Transition};
pub use types::*;
