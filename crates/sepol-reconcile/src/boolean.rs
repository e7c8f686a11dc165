use tracing::{debug, info, warn};

use crate::{Delta, Outcome, ReconcileContext, ResourceKind, SelinuxHost, Toggle, Transition};

const KIND: ResourceKind = ResourceKind::Boolean;

pub(crate) fn reconcile_boolean<H: SelinuxHost + ?Sized>(
    host: &H,
    ctx: &ReconcileContext,
    name: &str,
    value: Option<bool>,
    persist: bool,
) -> Outcome {
    let span = ctx.span(KIND, name);
    let _enter = span.enter();

    let booleans = match host.list_booleans() {
        Ok(table) => table,
        Err(err) => {
            warn!(error = %err, "cannot list booleans");
            return Outcome::failed(KIND, name, format!("Unable to list SELinux booleans: {err}"));
        }
    };

    let Some(current) = booleans.get(name).copied() else {
        return Outcome::failed(KIND, name, format!("Boolean {name} is not available"));
    };

    let Some(value) = value else {
        return Outcome::failed(KIND, name, "None is not a valid value for the boolean");
    };
    let desired = Toggle::from(value);

    // persist compares against the boot value, otherwise the live value
    let compared = if persist { current.default } else { current.state };
    if compared == desired {
        debug!(%desired, persist, "boolean converged");
        return Outcome::converged(KIND, name, "Boolean is in the correct state");
    }

    if ctx.simulate_only() {
        return Outcome::pending(
            KIND,
            name,
            format!("Boolean {name} is set to be changed to {desired}"),
            Delta::None,
        );
    }

    let applied = match host.set_boolean(name, desired, persist) {
        Ok(applied) => applied,
        Err(err) => {
            warn!(error = %err, "setsebool failed");
            false
        }
    };

    if !applied {
        return Outcome::failed(
            KIND,
            name,
            format!("Failed to set the boolean {name} to {desired}"),
        );
    }

    info!(old = %current.state, new = %desired, persist, "boolean changed");
    let default = (persist && current.default != desired)
        .then(|| Transition::new(current.default, desired));
    Outcome::changed(
        KIND,
        name,
        format!("Boolean {name} has been set to {desired}"),
        Delta::Boolean {
            state: Transition::new(current.state, desired),
            default,
        },
    )
}
