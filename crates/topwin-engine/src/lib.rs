//! Topwin Engine
//!
//! The coordinator crate for topwin's permission-gated toggles:
//! - validates OS permissions in a fixed order before honoring a toggle
//! - persists each toggle's desired state in the settings store
//! - starts/stops the overlay renderer and foreground-app monitor
//! - broadcasts "state changed" signals so every UI surface stays consistent
//!
//! It exposes a small, documented API:
//! - [`Coordinator`]: the primary type you construct once and hand by
//!   reference to whatever surface needs it
//! - [`PermissionGates`] / [`ServiceControl`]: the seams to the OS, with
//!   `System`/`Process` implementations and mocks for tests
//!
//! The mutation path is synchronous on the caller's thread; starting a
//! collaborator is fire-and-forget, so a surface may briefly render "on"
//! before the overlay has drawn anything. Eventual consistency is restored
//! by the next publish.

use std::sync::Arc;

use serde_json::json;
use settings::Store;
use tracing::{debug, info, warn};

mod deps;
mod error;
mod notifier;
mod notify;
mod state;
mod supervisor;

pub use deps::{MockGates, PermissionGates, SystemGates};
pub use error::{Error, Result};
pub use notifier::{StateChanged, StateNotifier};
pub use notify::{Dispatcher, Notice, NoticeKind};
pub use permissions::PermissionId;
pub use state::{
    KEY_ACCESSIBILITY_MONITORING, KEY_APP_INITIATED_OVERLAY_ONCE, KEY_DISPLAY_WIDTH_PX,
    KEY_NOTIFICATION_SUPPRESSION, KEY_OVERLAY_DISPLAY, PersistedState, ToggleKind, ToggleResult,
};
pub use supervisor::{MockControl, ProcessControl, ServiceControl, ServiceKind, ServiceSpec};

/// The single authority for mutating persisted toggle state and controlling
/// collaborator service lifecycle.
///
/// Construct via [`Coordinator::new`], then drive it with
/// [`Coordinator::request_toggle`]. Every call, applied or blocked or
/// failed, ends in a publish on the notifier so subscribers reconcile
/// without inspecting the return value.
pub struct Coordinator {
    /// Durable settings; the single source of truth for desired state.
    store: Arc<dyn Store>,
    /// Live permission predicates, queried fresh on every gate evaluation.
    gates: Arc<dyn PermissionGates>,
    /// Collaborator start/stop/is-running surface.
    services: Arc<dyn ServiceControl>,
    /// Broadcast of state-change signals.
    notifier: StateNotifier,
    /// Optional sink for user-visible notices (collaborator failures).
    dispatcher: Option<Dispatcher>,
}

impl Coordinator {
    /// Create a coordinator over the given store, gates, and services.
    pub fn new(
        store: Arc<dyn Store>,
        gates: Arc<dyn PermissionGates>,
        services: Arc<dyn ServiceControl>,
    ) -> Self {
        Self {
            store,
            gates,
            services,
            notifier: StateNotifier::new(),
            dispatcher: None,
        }
    }

    /// Attach a notice dispatcher for collaborator-failure reports.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// The state-change notifier; UI surfaces subscribe here.
    pub fn notifier(&self) -> &StateNotifier {
        &self.notifier
    }

    /// Read-only snapshot of persisted state. Never blocks on a
    /// collaborator; missing keys read as defaults.
    pub fn current_state(&self) -> PersistedState {
        PersistedState::load(self.store.as_ref())
    }

    /// Whether the overlay renderer's restart-failure notifier may post a
    /// user-visible notification right now.
    pub fn notifications_allowed(&self) -> bool {
        !self.current_state().notification_suppression_desired
            && self.gates.notification_post_ok()
    }

    /// Request a toggle flip. Any desired value is valid input, including a
    /// no-op repeat of the current value.
    ///
    /// Returns `Ok(Applied)` when the state was persisted,
    /// `Ok(Blocked(permission))` when the first unsatisfied gate blocked it
    /// (desired state reverted to off), and `Err` only when the settings
    /// store failed to persist a write.
    pub fn request_toggle(&self, kind: ToggleKind, desired: bool) -> Result<ToggleResult> {
        let res = self.apply(kind, desired);
        // Failed calls publish too; subscribers reconcile from state alone.
        self.notifier.publish();
        match &res {
            Ok(ToggleResult::Applied) => info!(%kind, desired, "toggle applied"),
            Ok(ToggleResult::Blocked(p)) => warn!(%kind, desired, blocked_on = %p, "toggle blocked"),
            Err(e) => warn!(%kind, desired, error = %e, "toggle failed"),
        }
        res
    }

    /// Re-assert collaborator processes against desired state.
    ///
    /// The OS can kill a collaborator without warning; rather than drifting
    /// silently, callers invoke this on resume (and after anything that may
    /// have disturbed the collaborators) to restart whatever is desired but
    /// not running. Ends in a publish.
    pub fn reconcile(&self) {
        let state = self.current_state();
        if state.overlay_display_desired && !self.services.is_running(ServiceKind::OverlayRenderer)
        {
            debug!("overlay desired but renderer not running, restarting");
            self.start_service(ServiceKind::OverlayRenderer);
        }
        let monitor_needed =
            state.overlay_display_desired || state.accessibility_monitoring_desired;
        if monitor_needed && !self.services.is_running(ServiceKind::ActivityMonitor) {
            debug!("monitor desired but not running, restarting");
            self.start_service(ServiceKind::ActivityMonitor);
        }
        self.notifier.publish();
    }

    /// Record the host display width for the overlay renderer's layout.
    /// Called by the owning UI surface every time it becomes visible.
    pub fn set_display_width(&self, px: u32) -> Result<()> {
        self.store.set(state::KEY_DISPLAY_WIDTH_PX, json!(px))?;
        Ok(())
    }

    /// Dispatch one toggle request to its handler.
    fn apply(&self, kind: ToggleKind, desired: bool) -> Result<ToggleResult> {
        match (kind, desired) {
            (ToggleKind::OverlayDisplay, true) => self.enable_overlay(),
            (ToggleKind::OverlayDisplay, false) => self.disable_overlay(),
            (ToggleKind::AccessibilityMonitoring, true) => {
                self.set_flag(state::KEY_ACCESSIBILITY_MONITORING, true)?;
                if !self.services.is_running(ServiceKind::ActivityMonitor) {
                    self.start_service(ServiceKind::ActivityMonitor);
                }
                Ok(ToggleResult::Applied)
            }
            (ToggleKind::AccessibilityMonitoring, false) => {
                self.set_flag(state::KEY_ACCESSIBILITY_MONITORING, false)?;
                // The overlay consumes activity-name data too; keep the
                // monitor while the overlay still wants it.
                if !self.current_state().overlay_display_desired {
                    self.services.stop(ServiceKind::ActivityMonitor);
                }
                Ok(ToggleResult::Applied)
            }
            (ToggleKind::NotificationSuppression, v) => {
                self.set_flag(state::KEY_NOTIFICATION_SUPPRESSION, v)?;
                Ok(ToggleResult::Applied)
            }
        }
    }

    /// Gate-checked overlay enable.
    fn enable_overlay(&self) -> Result<ToggleResult> {
        if let Some(missing) = self.first_missing_gate() {
            // Revert any optimistic "on" a UI surface may have rendered; an
            // unreachable on-state must never persist.
            self.set_flag(state::KEY_OVERLAY_DISPLAY, false)?;
            return Ok(ToggleResult::Blocked(missing));
        }
        self.set_flag(state::KEY_OVERLAY_DISPLAY, true)?;
        // Two keys, no transaction: a crash between these writes can leave
        // the once-flag behind. Accepted risk.
        self.set_flag(state::KEY_APP_INITIATED_OVERLAY_ONCE, true)?;
        self.start_service(ServiceKind::OverlayRenderer);
        self.start_service(ServiceKind::ActivityMonitor);
        Ok(ToggleResult::Applied)
    }

    /// Overlay disable: always succeeds.
    fn disable_overlay(&self) -> Result<ToggleResult> {
        self.set_flag(state::KEY_OVERLAY_DISPLAY, false)?;
        self.services.stop(ServiceKind::OverlayRenderer);
        if !self.current_state().accessibility_monitoring_desired {
            self.services.stop(ServiceKind::ActivityMonitor);
        }
        Ok(ToggleResult::Applied)
    }

    /// Evaluate the overlay's gates in their fixed order and return the
    /// first failure: overlay-draw, then accessibility (only when
    /// accessibility monitoring is itself desired), then usage-access.
    fn first_missing_gate(&self) -> Option<PermissionId> {
        if !self.gates.overlay_ok() {
            debug!("gate failed: overlay draw");
            return Some(PermissionId::OverlayDraw);
        }
        if self.current_state().accessibility_monitoring_desired && !self.gates.accessibility_ok()
        {
            debug!("gate failed: accessibility");
            return Some(PermissionId::Accessibility);
        }
        if !self.gates.usage_access_ok() {
            debug!("gate failed: usage access");
            return Some(PermissionId::UsageAccess);
        }
        None
    }

    /// Persist one boolean key.
    fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        self.store.set(key, json!(value))?;
        Ok(())
    }

    /// Fire-and-forget collaborator start. A failure is logged, reported as
    /// a notice when notifications are allowed, and otherwise left for
    /// [`Coordinator::reconcile`] to repair; it never fails the toggle.
    fn start_service(&self, kind: ServiceKind) {
        if let Err(e) = self.services.start(kind) {
            warn!(%kind, error = %e, "collaborator unavailable");
            if self.notifications_allowed()
                && let Some(dispatcher) = &self.dispatcher
            {
                let _ = dispatcher.send_error("Service", format!("could not start {kind}: {e}"));
            }
        }
    }
}
