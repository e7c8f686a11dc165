//! Scenario: boolean reconciliation.
//!
//! # Invariants under test
//!
//! 1. Unknown booleans and missing values fail without mutating.
//! 2. Without persist the live `State` is compared; with persist the boot
//!    `Default` is compared.
//! 3. Simulate-only reports a null result and no changes.
//! 4. `changes.State` carries `on`/`off` matching the requested polarity.
//! 5. A refused write is a failure with no changes.

use sepol_paper::PaperHost;
use sepol_reconcile::{BooleanState, ReconcileContext, Reconciler, Toggle};
use serde_json::json;

const NAME: &str = "samba_create_home_dirs";

#[test]
fn unknown_boolean_is_not_available() {
    let host = PaperHost::new();
    let o = Reconciler::new(&host).boolean(&ReconcileContext::apply(), NAME, Some(true), false);

    assert_eq!(
        serde_json::to_value(o.record()).unwrap(),
        json!({
            "name": NAME,
            "changes": {},
            "result": false,
            "comment": "Boolean samba_create_home_dirs is not available",
        })
    );
}

#[test]
fn missing_value_is_rejected() {
    let host = PaperHost::new().with_boolean(NAME, Toggle::On, Toggle::On);
    let o = Reconciler::new(&host).boolean(&ReconcileContext::apply(), NAME, None, false);

    assert!(o.is_failure());
    assert_eq!(o.narrative, "None is not a valid value for the boolean");
    assert_eq!(host.mutation_count(), 0);
}

#[test]
fn matching_state_is_converged_with_and_without_persist() {
    let host = PaperHost::new().with_boolean(NAME, Toggle::On, Toggle::On);
    let r = Reconciler::new(&host);

    for persist in [true, false] {
        let o = r.boolean(&ReconcileContext::apply(), NAME, Some(true), persist);
        assert!(o.is_success());
        assert!(o.delta.is_empty());
        assert_eq!(o.narrative, "Boolean is in the correct state");
    }
    assert_eq!(host.mutation_count(), 0);
}

#[test]
fn simulate_reports_pending_without_changes() {
    let host = PaperHost::new().with_boolean(NAME, Toggle::Off, Toggle::On);
    let o = Reconciler::new(&host).boolean(&ReconcileContext::simulate(), NAME, Some(true), false);

    assert_eq!(
        serde_json::to_value(o.record()).unwrap(),
        json!({
            "name": NAME,
            "changes": {},
            "result": null,
            "comment": "Boolean samba_create_home_dirs is set to be changed to on",
        })
    );
    assert_eq!(host.mutation_count(), 0);
}

#[test]
fn real_run_sets_live_state() {
    let host = PaperHost::new().with_boolean(NAME, Toggle::Off, Toggle::On);
    let r = Reconciler::new(&host);

    let o = r.boolean(&ReconcileContext::apply(), NAME, Some(true), false);
    assert_eq!(
        serde_json::to_value(o.record()).unwrap(),
        json!({
            "name": NAME,
            "changes": {"State": {"old": "off", "new": "on"}},
            "result": true,
            "comment": "Boolean samba_create_home_dirs has been set to on",
        })
    );
    assert_eq!(host.boolean(NAME), Some(BooleanState::new(Toggle::On, Toggle::On)));

    let again = r.boolean(&ReconcileContext::apply(), NAME, Some(true), false);
    assert!(again.is_success() && again.delta.is_empty());
}

#[test]
fn polarity_of_changes_follows_request() {
    for value in [true, false] {
        let start = Toggle::from(!value);
        let host = PaperHost::new().with_boolean(NAME, start, start);
        let o = Reconciler::new(&host).boolean(&ReconcileContext::apply(), NAME, Some(value), false);

        let expected = if value { "on" } else { "off" };
        assert_eq!(o.record().changes["State"]["new"], json!(expected));
        assert_eq!(o.narrative, format!("Boolean {NAME} has been set to {expected}"));
    }
}

#[test]
fn persist_compares_and_reports_default() {
    // live already on, boot default still off
    let host = PaperHost::new().with_boolean(NAME, Toggle::On, Toggle::Off);
    let r = Reconciler::new(&host);

    let o = r.boolean(&ReconcileContext::apply(), NAME, Some(true), true);
    assert!(o.is_success());
    assert_eq!(
        o.record().changes,
        json!({
            "State": {"old": "on", "new": "on"},
            "Default": {"old": "off", "new": "on"},
        })
    );
    assert_eq!(host.boolean(NAME), Some(BooleanState::new(Toggle::On, Toggle::On)));
}

#[test]
fn refused_write_fails_without_changes() {
    let host = PaperHost::new()
        .with_boolean(NAME, Toggle::Off, Toggle::On)
        .fail_boolean_writes();
    let o = Reconciler::new(&host).boolean(&ReconcileContext::apply(), NAME, Some(true), false);

    assert_eq!(
        serde_json::to_value(o.record()).unwrap(),
        json!({
            "name": NAME,
            "changes": {},
            "result": false,
            "comment": "Failed to set the boolean samba_create_home_dirs to on",
        })
    );
}
