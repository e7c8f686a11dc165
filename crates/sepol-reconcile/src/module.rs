use tracing::{debug, info, warn};

use crate::{
    Delta, ModuleSpec, ModuleState, Outcome, ReconcileContext, ResourceKind, SelinuxHost,
    Transition,
};

const KIND: ResourceKind = ResourceKind::Module;

pub(crate) fn reconcile_module<H: SelinuxHost + ?Sized>(
    host: &H,
    ctx: &ReconcileContext,
    spec: &ModuleSpec,
) -> Outcome {
    let name = spec.name.as_str();
    let span = ctx.span(KIND, name);
    let _enter = span.enter();

    let modules = match host.list_modules() {
        Ok(table) => table,
        Err(err) => {
            warn!(error = %err, "cannot list modules");
            return Outcome::failed(KIND, name, format!("Unable to list SELinux modules: {err}"));
        }
    };

    let Some(installed) = modules.get(name) else {
        return Outcome::failed(KIND, name, format!("Module {name} is not available"));
    };

    let Some(desired) = ModuleState::parse(&spec.state) else {
        return Outcome::failed(
            KIND,
            name,
            format!("{} is not a valid state for the {name} module.", spec.state),
        );
    };

    if let Some(wanted) = spec.version.as_deref() {
        if installed.version.as_deref() != Some(wanted) {
            return Outcome::failed(
                KIND,
                name,
                format!(
                    "Module version is {} and does not match the desired version of {wanted} or you are using semodule >= 2.4",
                    installed.version.as_deref().unwrap_or("None"),
                ),
            );
        }
    }

    if installed.state == desired {
        debug!(%desired, "module converged");
        return Outcome::converged(KIND, name, format!("Module {name} is in the desired state"));
    }

    if ctx.simulate_only() {
        return Outcome::pending(
            KIND,
            name,
            format!("Module {name} is set to be toggled to {desired}"),
            Delta::None,
        );
    }

    let applied = match host.set_module(name, desired) {
        Ok(applied) => applied,
        Err(err) => {
            warn!(error = %err, "semodule failed");
            false
        }
    };

    if !applied {
        return Outcome::failed(KIND, name, format!("Failed to set the Module {name} to {desired}"));
    }

    info!(old = %installed.state, new = %desired, "module toggled");
    Outcome::changed(
        KIND,
        name,
        format!("Module {name} has been set to {desired}"),
        Delta::Module(Transition::new(installed.state, desired)),
    )
}
