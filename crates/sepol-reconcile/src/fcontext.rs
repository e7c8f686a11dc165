use tracing::{debug, info, warn};

use crate::{
    CommandStatus, Delta, FcontextPolicy, FcontextSpec, FcontextView, HostError, Outcome,
    ReconcileContext, ResourceKind, SelinuxHost,
};

const KIND: ResourceKind = ResourceKind::Fcontext;
const APPLIED: ResourceKind = ResourceKind::FcontextApplied;

fn full_view(rule: &FcontextPolicy) -> FcontextView {
    FcontextView {
        filetype: Some(rule.filetype.description().to_string()),
        sel_user: Some(rule.sel_user.clone()),
        sel_type: Some(rule.sel_type.clone()),
        sel_level: rule.sel_level.clone(),
    }
}

fn type_only(sel_type: &str) -> FcontextView {
    FcontextView {
        sel_type: Some(sel_type.to_string()),
        ..FcontextView::default()
    }
}

/// True when `rule` matches every optional filter the request carries.
fn matches_filters(rule: &FcontextPolicy, spec: &FcontextSpec) -> bool {
    let eq = |want: &Option<String>, have: &str| want.as_deref().map_or(true, |w| w == have);
    eq(&spec.sel_type, &rule.sel_type)
        && eq(&spec.sel_user, &rule.sel_user)
        && spec
            .sel_level
            .as_deref()
            .map_or(true, |w| rule.sel_level.as_deref() == Some(w))
}

/// Build the rule to write from the request, keeping the existing user and
/// level when the request leaves them out.
fn desired_rule(spec: &FcontextSpec, sel_type: &str, current: Option<&FcontextPolicy>) -> FcontextPolicy {
    let mut rule = FcontextPolicy::new(&spec.filespec, spec.filetype, sel_type);
    if let Some(cur) = current {
        rule.sel_user = cur.sel_user.clone();
        rule.sel_role = cur.sel_role.clone();
        rule.sel_level = cur.sel_level.clone();
    }
    if let Some(user) = &spec.sel_user {
        rule.sel_user = user.clone();
    }
    if spec.sel_level.is_some() {
        rule.sel_level = spec.sel_level.clone();
    }
    rule
}

fn settle(
    filespec: &str,
    result: Result<CommandStatus, HostError>,
    error_prefix: &str,
    delta: Delta,
) -> Outcome {
    match result {
        Ok(status) if status.is_success() => {
            info!("file-context policy changed");
            Outcome::changed(KIND, filespec, "", delta)
        }
        Ok(status) => {
            warn!(retcode = status.retcode, "file-context command failed");
            Outcome::failed(KIND, filespec, format!("{error_prefix}: {}", status.retcode))
        }
        Err(err) => {
            warn!(error = %err, "file-context command could not run");
            Outcome::failed(KIND, filespec, format!("{error_prefix}: {err}"))
        }
    }
}

fn query_failed(filespec: &str, err: HostError) -> Outcome {
    warn!(error = %err, "cannot query file-context policy");
    Outcome::failed(
        KIND,
        filespec,
        format!("Unable to query the SELinux policy for \"{filespec}\": {err}"),
    )
}

pub(crate) fn reconcile_fcontext_present<H: SelinuxHost + ?Sized>(
    host: &H,
    ctx: &ReconcileContext,
    spec: &FcontextSpec,
) -> Outcome {
    let filespec = spec.filespec.as_str();
    let Some(sel_type) = spec.sel_type.as_deref() else {
        return Outcome::failed(
            KIND,
            filespec,
            format!("A sel_type is required to manage the file context of \"{filespec}\""),
        );
    };

    let span = ctx.span(KIND, filespec);
    let _enter = span.enter();

    let current = match host.get_fcontext_policy(filespec, spec.filetype) {
        Ok(rule) => rule,
        Err(err) => return query_failed(filespec, err),
    };

    match current {
        Some(rule) if rule.sel_type == sel_type => {
            debug!(sel_type, "file-context policy converged");
            Outcome::converged(
                KIND,
                filespec,
                format!(
                    "SELinux policy for \"{filespec}\" already present with specified filetype \"{}\" and sel_type \"{sel_type}\".",
                    spec.filetype
                ),
            )
        }
        Some(rule) => {
            if ctx.simulate_only() {
                return Outcome::pending(KIND, filespec, "", Delta::None);
            }
            let desired = desired_rule(spec, sel_type, Some(&rule));
            let delta = Delta::Fcontext {
                filespec: filespec.to_string(),
                old: Some(type_only(&rule.sel_type)),
                new: Some(type_only(sel_type)),
            };
            settle(filespec, host.modify_fcontext_policy(&desired), "Error adding new rule", delta)
        }
        None => {
            if ctx.simulate_only() {
                return Outcome::pending(KIND, filespec, "", Delta::None);
            }
            let desired = desired_rule(spec, sel_type, None);
            let delta = Delta::Fcontext {
                filespec: filespec.to_string(),
                old: None,
                new: Some(FcontextView {
                    filetype: Some(spec.filetype.description().to_string()),
                    sel_user: spec.sel_user.clone(),
                    sel_type: Some(sel_type.to_string()),
                    sel_level: spec.sel_level.clone(),
                }),
            };
            settle(filespec, host.add_fcontext_policy(&desired), "Error adding new rule", delta)
        }
    }
}

pub(crate) fn reconcile_fcontext_absent<H: SelinuxHost + ?Sized>(
    host: &H,
    ctx: &ReconcileContext,
    spec: &FcontextSpec,
) -> Outcome {
    let filespec = spec.filespec.as_str();
    let span = ctx.span(KIND, filespec);
    let _enter = span.enter();

    let current = match host.get_fcontext_policy(filespec, spec.filetype) {
        Ok(rule) => rule.filter(|r| matches_filters(r, spec)),
        Err(err) => return query_failed(filespec, err),
    };

    let Some(rule) = current else {
        debug!("file-context policy already absent");
        return Outcome::converged(
            KIND,
            filespec,
            format!(
                "SELinux policy for \"{filespec}\" already absent with specified filetype \"{}\" and sel_type \"{}\".",
                spec.filetype,
                spec.sel_type.as_deref().unwrap_or("None"),
            ),
        );
    };

    let delta = Delta::Fcontext {
        filespec: filespec.to_string(),
        old: Some(full_view(&rule)),
        new: None,
    };

    if ctx.simulate_only() {
        return Outcome::pending(KIND, filespec, "", delta);
    }

    settle(
        filespec,
        host.delete_fcontext_policy(filespec, rule.filetype),
        "Error removing policy",
        delta,
    )
}

pub(crate) fn reconcile_fcontext_applied<H: SelinuxHost + ?Sized>(
    host: &H,
    ctx: &ReconcileContext,
    filespec: &str,
    recursive: bool,
) -> Outcome {
    let span = ctx.span(APPLIED, filespec);
    let _enter = span.enter();

    let pending = match host.pending_relabels(filespec, recursive) {
        Ok(items) => items,
        Err(err) => {
            warn!(error = %err, "cannot list pending relabels");
            return Outcome::failed(
                APPLIED,
                filespec,
                format!("Unable to check the labels of \"{filespec}\": {err}"),
            );
        }
    };

    if pending.is_empty() {
        debug!(recursive, "labels converged");
        return Outcome::converged(
            APPLIED,
            filespec,
            format!("SElinux policies are already applied for filespec \"{filespec}\""),
        );
    }

    if ctx.simulate_only() {
        let count = pending.len();
        return Outcome::pending(
            APPLIED,
            filespec,
            format!("{count} file(s) under \"{filespec}\" are set to be relabeled"),
            Delta::Relabel(pending),
        );
    }

    match host.apply_relabels(filespec, recursive) {
        Ok(report) if report.retcode == 0 => {
            info!(count = report.relabeled.len(), "relabel applied");
            Outcome::changed(APPLIED, filespec, "", Delta::Relabel(report.relabeled))
        }
        Ok(report) => {
            warn!(retcode = report.retcode, "relabel failed");
            Outcome::failed(
                APPLIED,
                filespec,
                format!("Error applying policy: {}", report.retcode),
            )
        }
        Err(err) => {
            warn!(error = %err, "relabel could not run");
            Outcome::failed(APPLIED, filespec, format!("Error applying policy: {err}"))
        }
    }
}
