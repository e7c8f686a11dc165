use crate::boolean::reconcile_boolean;
use crate::fcontext::{reconcile_fcontext_absent, reconcile_fcontext_applied, reconcile_fcontext_present};
use crate::mode::reconcile_mode;
use crate::module::reconcile_module;
use crate::port::{reconcile_port_absent, reconcile_port_present};
use crate::{
    DesiredState, FcontextSpec, ModuleSpec, Outcome, PortPolicySpec, ReconcileContext, SelinuxHost,
};

/// Entry point: one reconcile call per resource, against an injected host.
///
/// Holds no state of its own; every call starts from a fresh query.
pub struct Reconciler<'h, H: SelinuxHost + ?Sized> {
    host: &'h H,
}

impl<'h, H: SelinuxHost + ?Sized> Reconciler<'h, H> {
    pub fn new(host: &'h H) -> Self {
        Self { host }
    }

    /// Converge the enforcement mode. Accepts `enforcing` / `permissive`
    /// in any case.
    pub fn mode(&self, ctx: &ReconcileContext, requested: &str) -> Outcome {
        reconcile_mode(self.host, ctx, requested)
    }

    /// Converge a boolean. With `persist` the boot default is compared and
    /// written as well as the live value.
    pub fn boolean(
        &self,
        ctx: &ReconcileContext,
        name: &str,
        value: Option<bool>,
        persist: bool,
    ) -> Outcome {
        reconcile_boolean(self.host, ctx, name, value, persist)
    }

    pub fn port_present(&self, ctx: &ReconcileContext, spec: &PortPolicySpec) -> Outcome {
        reconcile_port_present(self.host, ctx, spec)
    }

    pub fn port_absent(&self, ctx: &ReconcileContext, spec: &PortPolicySpec) -> Outcome {
        reconcile_port_absent(self.host, ctx, spec)
    }

    pub fn fcontext_present(&self, ctx: &ReconcileContext, spec: &FcontextSpec) -> Outcome {
        reconcile_fcontext_present(self.host, ctx, spec)
    }

    pub fn fcontext_absent(&self, ctx: &ReconcileContext, spec: &FcontextSpec) -> Outcome {
        reconcile_fcontext_absent(self.host, ctx, spec)
    }

    /// Relabel files under `filespec` so their labels match the rules.
    pub fn fcontext_applied(
        &self,
        ctx: &ReconcileContext,
        filespec: &str,
        recursive: bool,
    ) -> Outcome {
        reconcile_fcontext_applied(self.host, ctx, filespec, recursive)
    }

    pub fn module(&self, ctx: &ReconcileContext, spec: &ModuleSpec) -> Outcome {
        reconcile_module(self.host, ctx, spec)
    }

    /// Dispatch a tagged request to the matching reconciler.
    pub fn reconcile(&self, ctx: &ReconcileContext, desired: &DesiredState) -> Outcome {
        match desired {
            DesiredState::Mode { mode } => self.mode(ctx, mode),
            DesiredState::Boolean {
                name,
                value,
                persist,
            } => self.boolean(ctx, name, *value, *persist),
            DesiredState::PortPolicyPresent(spec) => self.port_present(ctx, spec),
            DesiredState::PortPolicyAbsent(spec) => self.port_absent(ctx, spec),
            DesiredState::FcontextPresent(spec) => self.fcontext_present(ctx, spec),
            DesiredState::FcontextAbsent(spec) => self.fcontext_absent(ctx, spec),
            DesiredState::FcontextApplied {
                filespec,
                recursive,
            } => self.fcontext_applied(ctx, filespec, *recursive),
            DesiredState::Module(spec) => self.module(ctx, spec),
        }
    }
}
