use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde_json::Value;
use settings::{MemoryStore, Store};
use tokio::sync::mpsc;
use topwin_engine::{
    Coordinator, Dispatcher, MockControl, MockGates, PermissionId, ServiceControl, ServiceKind,
    ToggleKind, ToggleResult,
};

/// Store wrapper whose writes can be made to fail on demand.
struct FailingStore {
    inner: MemoryStore,
    fail: AtomicBool,
}

impl FailingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail: AtomicBool::new(false),
        }
    }

    fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Store for FailingStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> settings::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(settings::Error::Io {
                path: "simulated".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.set(key, value)
    }
}

/// Test coordinator over a memory store, mock gates, and a mock supervisor.
fn create_coordinator() -> (Coordinator, Arc<MockGates>, Arc<MockControl>) {
    let gates = Arc::new(MockGates::new());
    let control = Arc::new(MockControl::new());
    let coordinator = Coordinator::new(
        Arc::new(MemoryStore::new()),
        gates.clone(),
        control.clone(),
    );
    (coordinator, gates, control)
}

#[test]
fn overlay_blocked_on_first_missing_gate_in_order() {
    let (coordinator, gates, _control) = create_coordinator();

    // Nothing granted: overlay-draw is the first gate.
    let res = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Blocked(PermissionId::OverlayDraw));
    assert!(!coordinator.current_state().overlay_display_desired);

    // Overlay granted, usage denied, accessibility not desired: the
    // accessibility gate is skipped and usage-access blocks.
    gates.set_overlay(true);
    let res = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Blocked(PermissionId::UsageAccess));

    // With accessibility monitoring desired, its gate comes before usage.
    gates.set_usage(true);
    let res = coordinator
        .request_toggle(ToggleKind::AccessibilityMonitoring, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Applied);
    let res = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Blocked(PermissionId::Accessibility));
    assert!(!coordinator.current_state().overlay_display_desired);
}

#[test]
fn overlay_applied_when_gates_pass() {
    let (coordinator, gates, control) = create_coordinator();
    gates.set_overlay(true);
    gates.set_usage(true);

    let res = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Applied);

    let state = coordinator.current_state();
    assert!(state.overlay_display_desired);
    assert!(state.app_initiated_overlay_once);
    assert!(control.is_running(ServiceKind::OverlayRenderer));
    assert!(control.is_running(ServiceKind::ActivityMonitor));
}

#[test]
fn blocked_request_reverts_optimistic_on_state() {
    let (coordinator, gates, _control) = create_coordinator();
    gates.set_overlay(true);
    gates.set_usage(true);
    let res = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Applied);

    // The user revokes usage access in OS settings, then flips again.
    gates.set_usage(false);
    let res = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Blocked(PermissionId::UsageAccess));
    assert!(!coordinator.current_state().overlay_display_desired);
}

#[test]
fn repeated_request_is_idempotent() {
    let (coordinator, gates, control) = create_coordinator();
    gates.set_overlay(true);
    gates.set_usage(true);

    let first = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(first, ToggleResult::Applied);
    let state_after_first = coordinator.current_state();

    let second = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(second, ToggleResult::Applied);
    assert_eq!(coordinator.current_state(), state_after_first);
    assert!(control.is_running(ServiceKind::OverlayRenderer));

    // Stopping twice is equally a no-op.
    let _ = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, false)
        .expect("toggle");
    let _ = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, false)
        .expect("toggle");
    assert!(!control.is_running(ServiceKind::OverlayRenderer));
}

#[test]
fn toggles_round_trip_without_disturbing_each_other() {
    let (coordinator, _gates, _control) = create_coordinator();

    let res = coordinator
        .request_toggle(ToggleKind::NotificationSuppression, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Applied);

    let state = coordinator.current_state();
    assert!(state.notification_suppression_desired);
    assert!(!state.overlay_display_desired);
    assert!(!state.accessibility_monitoring_desired);
    assert!(!state.app_initiated_overlay_once);

    let res = coordinator
        .request_toggle(ToggleKind::NotificationSuppression, false)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Applied);
    assert!(!coordinator.current_state().notification_suppression_desired);
}

#[test]
fn monitor_is_shared_between_overlay_and_accessibility() {
    let (coordinator, gates, control) = create_coordinator();
    gates.set_overlay(true);
    gates.set_usage(true);
    gates.set_accessibility(true);

    let _ = coordinator
        .request_toggle(ToggleKind::AccessibilityMonitoring, true)
        .expect("toggle");
    let _ = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert!(control.is_running(ServiceKind::ActivityMonitor));

    // Overlay off: the monitor stays because accessibility still wants it.
    let _ = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, false)
        .expect("toggle");
    assert!(!control.is_running(ServiceKind::OverlayRenderer));
    assert!(control.is_running(ServiceKind::ActivityMonitor));

    // Only when both are off does the monitor stop.
    let _ = coordinator
        .request_toggle(ToggleKind::AccessibilityMonitoring, false)
        .expect("toggle");
    assert!(!control.is_running(ServiceKind::ActivityMonitor));
}

#[test]
fn accessibility_off_keeps_monitor_while_overlay_desired() {
    let (coordinator, gates, control) = create_coordinator();
    gates.set_overlay(true);
    gates.set_usage(true);

    let _ = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    let _ = coordinator
        .request_toggle(ToggleKind::AccessibilityMonitoring, true)
        .expect("toggle");
    let _ = coordinator
        .request_toggle(ToggleKind::AccessibilityMonitoring, false)
        .expect("toggle");

    // The overlay needs activity-name data, so the monitor survives.
    assert!(control.is_running(ServiceKind::ActivityMonitor));
}

#[test]
fn subscriber_sees_one_publish_per_mutation_and_no_replay() {
    let (coordinator, _gates, _control) = create_coordinator();
    let mut rx = coordinator.notifier().subscribe();

    let _ = coordinator
        .request_toggle(ToggleKind::NotificationSuppression, true)
        .expect("toggle");
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err(), "exactly one signal per mutation");

    // Unsubscribe, mutate again: a late subscriber gets no replay.
    drop(rx);
    let _ = coordinator
        .request_toggle(ToggleKind::NotificationSuppression, false)
        .expect("toggle");
    let mut late = coordinator.notifier().subscribe();
    assert!(late.try_recv().is_err());
}

#[test]
fn store_failure_reports_err_and_keeps_prior_state() {
    let store = Arc::new(FailingStore::new());
    let gates = Arc::new(MockGates::granted());
    let control = Arc::new(MockControl::new());
    let coordinator = Coordinator::new(store.clone(), gates, control);

    let res = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Applied);

    let mut rx = coordinator.notifier().subscribe();
    store.fail_writes(true);
    let res = coordinator.request_toggle(ToggleKind::OverlayDisplay, false);
    assert!(res.is_err());

    // Prior persisted state is intact, and the failed call still published.
    assert!(coordinator.current_state().overlay_display_desired);
    assert!(rx.try_recv().is_ok());
}

#[test]
fn collaborator_start_failure_still_applies_and_emits_notice() {
    let gates = Arc::new(MockGates::granted());
    let control = Arc::new(MockControl::new());
    let (tx, mut notices) = mpsc::channel(8);
    let coordinator = Coordinator::new(Arc::new(MemoryStore::new()), gates, control.clone())
        .with_dispatcher(Dispatcher::new(tx));

    control.fail_start(ServiceKind::OverlayRenderer, true);
    let res = coordinator
        .request_toggle(ToggleKind::OverlayDisplay, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Applied);
    assert!(coordinator.current_state().overlay_display_desired);
    assert!(notices.try_recv().is_ok(), "failure surfaced as a notice");

    // With suppression desired, the same failure stays silent.
    let _ = coordinator
        .request_toggle(ToggleKind::NotificationSuppression, true)
        .expect("toggle");
    control.fail_start(ServiceKind::ActivityMonitor, true);
    control.kill(ServiceKind::ActivityMonitor);
    let res = coordinator
        .request_toggle(ToggleKind::AccessibilityMonitoring, true)
        .expect("toggle");
    assert_eq!(res, ToggleResult::Applied);
    assert!(notices.try_recv().is_err());
}

#[test]
fn reconcile_restarts_desired_collaborators() {
    let (coordinator, gates, control) = create_coordinator();
    gates.set_overlay(true);
    gates.set_usage(true);

    let _ = coordinator
        .request_toggle(ToggleKind::AccessibilityMonitoring, true)
        .expect("toggle");
    assert!(control.is_running(ServiceKind::ActivityMonitor));

    // The OS kills the monitor behind our back; the next reconcile repairs it.
    control.kill(ServiceKind::ActivityMonitor);
    assert!(!control.is_running(ServiceKind::ActivityMonitor));
    coordinator.reconcile();
    assert!(control.is_running(ServiceKind::ActivityMonitor));

    // Nothing desired: reconcile starts nothing.
    let _ = coordinator
        .request_toggle(ToggleKind::AccessibilityMonitoring, false)
        .expect("toggle");
    let starts_before = control.start_count(ServiceKind::ActivityMonitor);
    coordinator.reconcile();
    assert_eq!(control.start_count(ServiceKind::ActivityMonitor), starts_before);
}

#[test]
fn display_width_is_recorded() {
    let (coordinator, _gates, _control) = create_coordinator();
    coordinator.set_display_width(1170).expect("set width");
    assert_eq!(coordinator.current_state().display_width_px, 1170);
}

#[test]
fn notifications_allowed_tracks_suppression() {
    let gates = Arc::new(MockGates::granted());
    let control = Arc::new(MockControl::new());
    let coordinator = Coordinator::new(Arc::new(MemoryStore::new()), gates, control);

    assert!(coordinator.notifications_allowed());
    let _ = coordinator
        .request_toggle(ToggleKind::NotificationSuppression, true)
        .expect("toggle");
    assert!(!coordinator.notifications_allowed());
}
