//! Permission checks for topwin.
//!
//! This crate exposes a minimal, stable API to query whether the process
//! holds the permissions the overlay and the foreground-app monitor need.
//! Every call queries live OS state; nothing is cached, because the user can
//! revoke a grant in system settings at any time. There is no prompting
//! logic here: the host is responsible for routing the user to the right
//! settings pane when a check fails (see [`PermissionId`]).
//!
//! Notes
//! - `overlay_ok()` checks whether the process may draw over other apps.
//! - `accessibility_ok()` checks whether the OS reports our accessibility
//!   capability as active. "Not permitted" and "service not running" are
//!   indistinguishable here; callers that care which applies must say so in
//!   a message, not a boolean.
//! - `usage_access_ok()` is a heuristic, see its docs.
//! - `notification_post_ok()` is only meaningful on platforms with a
//!   distinct post-notification permission; elsewhere it returns `true`.
//!
//! All calls are fast and side-effect free, safe to invoke once per user
//! interaction and once per UI resume.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Lookback window for the usage-access heuristic.
pub const USAGE_LOOKBACK: Duration = Duration::from_secs(60 * 60);

/// One of the permission classes the toggles depend on.
///
/// Each variant corresponds to exactly one OS settings pane the user can be
/// sent to when a toggle is blocked on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionId {
    /// Permission to draw an overlay window above other apps.
    OverlayDraw,
    /// Permission to query which app is in the foreground.
    UsageAccess,
    /// The accessibility capability (granted and active).
    Accessibility,
    /// Permission to post user-visible notifications.
    NotificationPost,
}

impl std::fmt::Display for PermissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OverlayDraw => "overlay draw",
            Self::UsageAccess => "usage access",
            Self::Accessibility => "accessibility",
            Self::NotificationPost => "notification post",
        };
        f.write_str(s)
    }
}

/// Source of recent foreground-usage statistics.
///
/// The platform query itself lives with the host; this crate only defines
/// the heuristic applied to its result.
pub trait UsageStatsProvider: Send + Sync {
    /// Number of foreground-usage events recorded since `cutoff`.
    fn events_since(&self, cutoff: SystemTime) -> usize;
}

#[cfg(target_os = "macos")]
#[link(name = "ApplicationServices", kind = "framework")]
unsafe extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn CGPreflightScreenCaptureAccess() -> bool;
}

/// Check whether the process may draw an overlay above other apps.
///
/// On macOS this preflights Screen Recording access, which the overlay needs
/// to read and display foreground window titles.
pub fn overlay_ok() -> bool {
    #[cfg(target_os = "macos")]
    {
        unsafe { CGPreflightScreenCaptureAccess() }
    }
    #[cfg(not(target_os = "macos"))]
    {
        false
    }
}

/// Check whether the OS reports our accessibility capability as active.
pub fn accessibility_ok() -> bool {
    #[cfg(target_os = "macos")]
    {
        unsafe { AXIsProcessTrusted() }
    }
    #[cfg(not(target_os = "macos"))]
    {
        false
    }
}

/// Check whether the process may post user-visible notifications.
///
/// Platforms without a distinct runtime notification permission report
/// `true`; the check is only consulted where the OS actually gates posting.
pub fn notification_post_ok() -> bool {
    true
}

/// Heuristic usage-access check: issue a minimal statistics query over the
/// last hour and treat a non-empty result as evidence of grant.
///
/// This is evidence, not a guarantee. In particular it produces a false
/// negative immediately after the grant, before any foreground event has
/// been recorded; callers recover by re-attempting the toggle after the
/// user has switched apps at least once.
pub fn usage_access_ok(provider: &dyn UsageStatsProvider) -> bool {
    let cutoff = SystemTime::now()
        .checked_sub(USAGE_LOOKBACK)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    provider.events_since(cutoff) > 0
}

/// Current permission status for the process.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PermissionsStatus {
    /// Overlay-draw permission; `true` if granted.
    pub overlay_ok: bool,
    /// Usage-access permission (heuristic); `true` if evidence of grant.
    pub usage_ok: bool,
    /// Accessibility capability; `true` if granted and active.
    pub accessibility_ok: bool,
    /// Notification-post permission; `true` if granted or ungated.
    pub notification_ok: bool,
}

/// Query all four permission classes at once.
///
/// Convenience wrapper over the individual predicates; performs no prompting
/// and has no side effects.
pub fn check_permissions(usage: &dyn UsageStatsProvider) -> PermissionsStatus {
    PermissionsStatus {
        overlay_ok: overlay_ok(),
        usage_ok: usage_access_ok(usage),
        accessibility_ok: accessibility_ok(),
        notification_ok: notification_post_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-count provider for exercising the heuristic.
    struct FixedUsage(usize);

    impl UsageStatsProvider for FixedUsage {
        fn events_since(&self, _cutoff: SystemTime) -> usize {
            self.0
        }
    }

    #[test]
    fn usage_heuristic_requires_nonempty_result() {
        assert!(!usage_access_ok(&FixedUsage(0)));
        assert!(usage_access_ok(&FixedUsage(1)));
    }

    #[test]
    fn permission_id_names_are_stable() {
        assert_eq!(PermissionId::OverlayDraw.to_string(), "overlay draw");
        assert_eq!(PermissionId::UsageAccess.to_string(), "usage access");
    }
}
