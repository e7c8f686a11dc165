use tracing::Span;
use uuid::Uuid;

use crate::ResourceKind;

/// Per-call run settings, passed explicitly into every reconcile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileContext {
    simulate_only: bool,
    run_id: Uuid,
}

impl ReconcileContext {
    pub fn new(simulate_only: bool) -> Self {
        Self {
            simulate_only,
            run_id: Uuid::new_v4(),
        }
    }

    /// Real run: changes are applied.
    pub fn apply() -> Self {
        Self::new(false)
    }

    /// Simulate-only run: changes are reported, never applied.
    pub fn simulate() -> Self {
        Self::new(true)
    }

    /// Correlate several reconcile calls under one run id.
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn simulate_only(&self) -> bool {
        self.simulate_only
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub(crate) fn span(&self, kind: ResourceKind, identity: &str) -> Span {
        tracing::info_span!(
            "reconcile",
            kind = kind.as_str(),
            identity = identity,
            run_id = %self.run_id,
            simulate = self.simulate_only,
        )
    }
}
