use tracing::{debug, info, warn};

use crate::{
    resolve_port_target, CommandStatus, Delta, HostError, Outcome, PortPolicy, PortPolicySpec,
    ReconcileContext, ResourceKind, SelinuxHost, Transition,
};

const KIND: ResourceKind = ResourceKind::PortPolicy;

/// Turn the result of an add/modify/delete into an outcome.
///
/// Non-zero return codes keep `Status::Success` (see
/// [`Outcome::tolerated_adapter_error`]). A host that could not run the
/// command at all is a plain failure.
fn settle(
    name: &str,
    result: Result<CommandStatus, HostError>,
    error_prefix: &str,
    old: Option<PortPolicy>,
    new: Option<PortPolicy>,
) -> Outcome {
    match result {
        Ok(status) if status.is_success() => {
            info!(old = ?old, new = ?new, "port policy changed");
            Outcome::changed(KIND, name, "", Delta::PortPolicy(Transition::new(old, new)))
        }
        Ok(status) => {
            warn!(
                retcode = status.retcode,
                "port policy command failed; result stays true for compatibility"
            );
            Outcome::tolerated_adapter_error(
                KIND,
                name,
                format!("{error_prefix}: {}", status.retcode),
            )
        }
        Err(err) => {
            warn!(error = %err, "port policy command could not run");
            Outcome::failed(KIND, name, format!("{error_prefix}: {err}"))
        }
    }
}

pub(crate) fn reconcile_port_present<H: SelinuxHost + ?Sized>(
    host: &H,
    ctx: &ReconcileContext,
    spec: &PortPolicySpec,
) -> Outcome {
    let name = spec.name.as_str();

    let target =
        match resolve_port_target(name, spec.protocol.as_deref(), spec.port.as_deref()) {
            Ok(t) => t,
            Err(err) => return Outcome::failed(KIND, name, err.to_string()),
        };
    let Some(sel_type) = spec.sel_type.as_deref() else {
        return Outcome::failed(
            KIND,
            name,
            format!("A sel_type is required to manage the port policy \"{name}\""),
        );
    };

    let span = ctx.span(KIND, name);
    let _enter = span.enter();

    let existing = match host.get_port_policy(target.protocol, target.port) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "cannot query port policy");
            return Outcome::failed(
                KIND,
                name,
                format!("Unable to query the SELinux policy for \"{name}\": {err}"),
            );
        }
    };

    let desired = PortPolicy::new(sel_type, target.protocol, target.port);
    let sel_range = spec.sel_range.as_deref();

    match existing {
        Some(current) if current.sel_type == sel_type => {
            debug!(sel_type, "port policy converged");
            Outcome::converged(KIND, name, format!("SELinux policy for \"{name}\" already present "))
        }
        Some(current) => {
            if ctx.simulate_only() {
                return Outcome::pending(KIND, name, "", Delta::None);
            }
            let result = host.modify_port_policy(&desired, sel_range);
            settle(name, result, "Error adding new policy", Some(current), Some(desired))
        }
        None => {
            if ctx.simulate_only() {
                return Outcome::pending(KIND, name, "", Delta::None);
            }
            let result = host.add_port_policy(&desired, sel_range);
            settle(name, result, "Error adding new policy", None, Some(desired))
        }
    }
}

pub(crate) fn reconcile_port_absent<H: SelinuxHost + ?Sized>(
    host: &H,
    ctx: &ReconcileContext,
    spec: &PortPolicySpec,
) -> Outcome {
    let name = spec.name.as_str();

    let target =
        match resolve_port_target(name, spec.protocol.as_deref(), spec.port.as_deref()) {
            Ok(t) => t,
            Err(err) => return Outcome::failed(KIND, name, err.to_string()),
        };

    let span = ctx.span(KIND, name);
    let _enter = span.enter();

    let existing = match host.get_port_policy(target.protocol, target.port) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "cannot query port policy");
            return Outcome::failed(
                KIND,
                name,
                format!("Unable to query the SELinux policy for \"{name}\": {err}"),
            );
        }
    };

    let Some(current) = existing else {
        debug!("port policy already absent");
        return Outcome::converged(KIND, name, format!("SELinux policy for \"{name}\" already absent "));
    };

    if ctx.simulate_only() {
        return Outcome::pending(KIND, name, "", Delta::None);
    }

    let result = host.delete_port_policy(target.protocol, target.port);
    settle(name, result, "Error deleting policy", Some(current), None)
}
