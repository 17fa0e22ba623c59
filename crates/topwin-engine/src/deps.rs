//! Trait seams for the coordinator's external dependencies.

use std::sync::Arc;

use parking_lot::Mutex;
use permissions::UsageStatsProvider;

// ---- Permission gate abstraction ----

/// Minimal permission API used by the coordinator.
///
/// Implementations must query live OS state on every call; the coordinator
/// never caches an answer because grants can be revoked outside the process
/// at any time.
pub trait PermissionGates: Send + Sync {
    /// May the process draw an overlay above other apps?
    fn overlay_ok(&self) -> bool;
    /// Is there evidence the foreground-usage query permission is granted?
    fn usage_access_ok(&self) -> bool;
    /// Is our accessibility capability granted and active?
    fn accessibility_ok(&self) -> bool;
    /// May the process post user-visible notifications?
    fn notification_post_ok(&self) -> bool;
}

/// Production gates backed by the `permissions` crate.
pub struct SystemGates {
    /// Host-supplied source for the usage-access heuristic.
    usage: Arc<dyn UsageStatsProvider>,
}

impl SystemGates {
    /// Create gates with the given usage-statistics source.
    pub fn new(usage: Arc<dyn UsageStatsProvider>) -> Self {
        Self { usage }
    }
}

impl PermissionGates for SystemGates {
    fn overlay_ok(&self) -> bool {
        permissions::overlay_ok()
    }
    fn usage_access_ok(&self) -> bool {
        permissions::usage_access_ok(self.usage.as_ref())
    }
    fn accessibility_ok(&self) -> bool {
        permissions::accessibility_ok()
    }
    fn notification_post_ok(&self) -> bool {
        permissions::notification_post_ok()
    }
}

/// Mutable fake gates for tests: each permission flips independently.
#[derive(Default)]
pub struct MockGates {
    /// Current grant flags, in gate order.
    flags: Mutex<MockFlags>,
}

/// Grant flags backing [`MockGates`].
#[derive(Default, Clone, Copy)]
struct MockFlags {
    /// Overlay-draw grant.
    overlay: bool,
    /// Usage-access grant.
    usage: bool,
    /// Accessibility grant.
    accessibility: bool,
    /// Notification-post grant.
    notification: bool,
}

impl MockGates {
    /// All permissions denied.
    pub fn new() -> Self {
        Self::default()
    }

    /// All permissions granted.
    pub fn granted() -> Self {
        let gates = Self::default();
        gates.set_overlay(true);
        gates.set_usage(true);
        gates.set_accessibility(true);
        gates.set_notification(true);
        gates
    }

    /// Set the overlay-draw grant.
    pub fn set_overlay(&self, ok: bool) {
        self.flags.lock().overlay = ok;
    }

    /// Set the usage-access grant.
    pub fn set_usage(&self, ok: bool) {
        self.flags.lock().usage = ok;
    }

    /// Set the accessibility grant.
    pub fn set_accessibility(&self, ok: bool) {
        self.flags.lock().accessibility = ok;
    }

    /// Set the notification-post grant.
    pub fn set_notification(&self, ok: bool) {
        self.flags.lock().notification = ok;
    }
}

impl PermissionGates for MockGates {
    fn overlay_ok(&self) -> bool {
        self.flags.lock().overlay
    }
    fn usage_access_ok(&self) -> bool {
        self.flags.lock().usage
    }
    fn accessibility_ok(&self) -> bool {
        self.flags.lock().accessibility
    }
    fn notification_post_ok(&self) -> bool {
        self.flags.lock().notification
    }
}
