//! Persisted toggle state and its settings-store mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use settings::Store;
use tracing::warn;

/// Settings key for the overlay toggle's desired state.
pub const KEY_OVERLAY_DISPLAY: &str = "overlay_display_desired";
/// Settings key for the notification-suppression toggle's desired state.
pub const KEY_NOTIFICATION_SUPPRESSION: &str = "notification_suppression_desired";
/// Settings key for the accessibility-monitoring toggle's desired state.
pub const KEY_ACCESSIBILITY_MONITORING: &str = "accessibility_monitoring_desired";
/// Settings key for the once-only "user explicitly enabled the overlay" flag.
pub const KEY_APP_INITIATED_OVERLAY_ONCE: &str = "app_initiated_overlay_once";
/// Settings key for the last known host display width in pixels.
pub const KEY_DISPLAY_WIDTH_PX: &str = "display_width_px";

/// One of the three independently controllable features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToggleKind {
    /// The floating info overlay.
    OverlayDisplay,
    /// Whether the overlay's restart-failure notifier may post notifications.
    NotificationSuppression,
    /// The accessibility-driven foreground-app monitor.
    AccessibilityMonitoring,
}

impl std::fmt::Display for ToggleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OverlayDisplay => "overlay",
            Self::NotificationSuppression => "notification-suppression",
            Self::AccessibilityMonitoring => "accessibility-monitoring",
        };
        f.write_str(s)
    }
}

/// Outcome of a toggle request.
///
/// Permission denial is a structured outcome, not an error: the caller is
/// expected to route the user to the settings pane for the blocking
/// permission and re-attempt after the user returns.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleResult {
    /// The requested state was persisted and collaborator lifecycle adjusted.
    Applied,
    /// The first unsatisfied gate, in the documented evaluation order.
    /// The desired state was reverted to off.
    Blocked(permissions::PermissionId),
}

/// Durable record of the user's intent, as distinct from what is actually
/// running. Created all-false on first use; mutated only through the
/// [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistedState {
    /// Whether the user wants the overlay shown.
    pub overlay_display_desired: bool,
    /// Whether the user wants restart-failure notifications suppressed.
    pub notification_suppression_desired: bool,
    /// Whether the user wants the foreground-app monitor running.
    pub accessibility_monitoring_desired: bool,
    /// Set the first time the overlay is explicitly enabled by the user;
    /// never reset by the coordinator.
    pub app_initiated_overlay_once: bool,
    /// Last known host display width, refreshed when the owning UI surface
    /// becomes visible. Consumed by the overlay renderer for layout.
    pub display_width_px: u32,
}

impl PersistedState {
    /// Load a snapshot from the store, defaulting missing or mistyped keys.
    pub fn load(store: &dyn Store) -> Self {
        Self {
            overlay_display_desired: read_bool(store, KEY_OVERLAY_DISPLAY),
            notification_suppression_desired: read_bool(store, KEY_NOTIFICATION_SUPPRESSION),
            accessibility_monitoring_desired: read_bool(store, KEY_ACCESSIBILITY_MONITORING),
            app_initiated_overlay_once: read_bool(store, KEY_APP_INITIATED_OVERLAY_ONCE),
            display_width_px: read_u32(store, KEY_DISPLAY_WIDTH_PX),
        }
    }
}

/// Read a boolean key, treating absence or a wrong type as `false`.
fn read_bool(store: &dyn Store, key: &str) -> bool {
    match store.get(key) {
        Some(Value::Bool(b)) => b,
        Some(other) => {
            warn!(key, value = %other, "mistyped settings value, using default");
            false
        }
        None => false,
    }
}

/// Read an unsigned integer key, treating absence or a wrong type as `0`.
fn read_u32(store: &dyn Store, key: &str) -> u32 {
    match store.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
        Some(other) => {
            warn!(key, value = %other, "mistyped settings value, using default");
            0
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use settings::MemoryStore;

    use super::*;

    #[test]
    fn load_defaults_all_false() {
        let store = MemoryStore::new();
        assert_eq!(PersistedState::load(&store), PersistedState::default());
    }

    #[test]
    fn mistyped_values_fall_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(KEY_OVERLAY_DISPLAY, json!("yes")).expect("set");
        store.set(KEY_DISPLAY_WIDTH_PX, json!(-5)).expect("set");
        let state = PersistedState::load(&store);
        assert!(!state.overlay_display_desired);
        assert_eq!(state.display_width_px, 0);
    }

    #[test]
    fn out_of_range_width_falls_back_to_default() {
        let store = MemoryStore::new();
        // A hand-edited value above u32::MAX must not wrap around.
        store
            .set(KEY_DISPLAY_WIDTH_PX, json!(u64::from(u32::MAX) + 6))
            .expect("set");
        assert_eq!(PersistedState::load(&store).display_width_px, 0);
    }
}
