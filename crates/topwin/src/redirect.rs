//! Routes a blocked toggle to the one OS settings pane that can unblock it.

use permissions::PermissionId;
use tracing::warn;

/// Open the settings pane for `reason`.
///
/// Exactly one pane per permission: the caller presents it and re-attempts
/// the toggle only after the user returns. Nothing here polls for the grant.
pub fn open_settings_pane(reason: PermissionId) {
    #[cfg(target_os = "macos")]
    {
        use std::process::Command;

        let url = match reason {
            PermissionId::OverlayDraw => {
                "x-apple.systempreferences:com.apple.preference.security?Privacy_ScreenCapture"
            }
            PermissionId::Accessibility => {
                "x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility"
            }
            PermissionId::UsageAccess => {
                "x-apple.systempreferences:com.apple.preference.security?Privacy_Privacy"
            }
            PermissionId::NotificationPost => {
                "x-apple.systempreferences:com.apple.preference.notifications"
            }
        };
        if let Err(e) = Command::new("open").arg(url).spawn() {
            warn!(%reason, error = %e, "could not open settings pane");
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        warn!(%reason, "no settings pane integration on this platform");
        eprintln!("grant the '{reason}' permission in your system settings, then retry");
    }
}
