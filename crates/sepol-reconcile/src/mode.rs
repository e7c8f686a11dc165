use tracing::{debug, info, warn};

use crate::{
    Delta, HostError, Mode, Outcome, ReconcileContext, ResourceKind, SelinuxHost, Transition,
};

const KIND: ResourceKind = ResourceKind::Mode;

/// Mode the reconciler treats as current for `target`.
///
/// The live getter is preferred; the boot configuration is the fallback.
/// When the live mode already matches but the boot configuration disagrees,
/// the boot value is reported so the change gets persisted.
fn current_mode<H: SelinuxHost + ?Sized>(host: &H, target: Mode) -> Result<Mode, HostError> {
    let live = match host.get_mode() {
        Ok(mode) => mode,
        Err(err) => {
            debug!(error = %err, "live mode unavailable, falling back to configured mode");
            return host.get_configured_mode();
        }
    };

    if live == target {
        match host.get_configured_mode() {
            Ok(configured) if configured != target => return Ok(configured),
            Ok(_) => {}
            Err(err) => debug!(error = %err, "configured mode unavailable"),
        }
    }
    Ok(live)
}

pub(crate) fn reconcile_mode<H: SelinuxHost + ?Sized>(
    host: &H,
    ctx: &ReconcileContext,
    requested: &str,
) -> Outcome {
    let Some(target) = Mode::from_request(requested) else {
        return Outcome::failed(KIND, requested, format!("{requested} is not an accepted mode"));
    };

    let span = ctx.span(KIND, requested);
    let _enter = span.enter();

    let current = match current_mode(host, target) {
        Ok(mode) => mode,
        Err(err) => {
            warn!(error = %err, "cannot read SELinux mode");
            return Outcome::failed(
                KIND,
                requested,
                format!("Unable to determine the current SELinux mode: {err}"),
            );
        }
    };

    if current == target {
        debug!(%current, "mode converged");
        return Outcome::converged(KIND, requested, format!("SELinux is already in {target} mode"));
    }

    if ctx.simulate_only() {
        debug!(%current, %target, "mode change pending");
        return Outcome::pending(
            KIND,
            requested,
            format!("SELinux mode is set to be changed to {target}"),
            Delta::Mode(Transition::new(current, target)),
        );
    }

    match host.set_mode(target) {
        Ok(now) if now == target => {
            info!(old = %current, new = %now, "mode changed");
            Outcome::changed(
                KIND,
                requested,
                format!("SELinux has been set to {target} mode"),
                Delta::Mode(Transition::new(current, now)),
            )
        }
        Ok(now) => {
            warn!(%now, %target, "mode did not take effect");
            Outcome::failed(KIND, requested, format!("Failed to set SELinux to {target} mode"))
        }
        Err(err) => {
            warn!(error = %err, "set mode failed");
            Outcome::failed(KIND, requested, format!("Failed to set SELinux to {target} mode"))
        }
    }
}
