//! OS permission checks for installing input hooks

#[cfg(target_os = "linux")]
use std::process::Command;
#[allow(unused_imports)]
use tracing::{debug, warn};

use super::CaptureMode;

/// Permission status relevant to input hooks
#[derive(Debug, Clone)]
pub struct PermissionStatus {
    /// Accessibility permission (macOS, needed for both hook kinds)
    pub accessibility: PermissionState,
    /// An X11 display (Linux; rdev's listener does not work under Wayland)
    pub x11_display: PermissionState,
    /// Input group membership (Linux, needed for the evdev-backed grab hook)
    pub input_group: PermissionState,
}

/// State of a single permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// Permission is granted
    Granted,
    /// Permission is denied
    Denied,
    /// Permission status is unknown
    Unknown,
    /// Permission is not needed on this platform
    NotApplicable,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(
            self,
            PermissionState::Granted | PermissionState::NotApplicable | PermissionState::Unknown
        )
    }
}

/// Check the permissions for the current platform
pub fn check_permissions() -> PermissionStatus {
    #[cfg(target_os = "macos")]
    {
        PermissionStatus {
            accessibility: check_accessibility_macos(),
            x11_display: PermissionState::NotApplicable,
            input_group: PermissionState::NotApplicable,
        }
    }

    #[cfg(target_os = "linux")]
    {
        PermissionStatus {
            accessibility: PermissionState::NotApplicable,
            x11_display: check_x11_display_linux(),
            input_group: check_input_group_linux(),
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        // Windows hooks need no special permission
        PermissionStatus {
            accessibility: PermissionState::NotApplicable,
            x11_display: PermissionState::NotApplicable,
            input_group: PermissionState::NotApplicable,
        }
    }
}

// ============================================================================
// macOS Implementation
// ============================================================================

#[cfg(target_os = "macos")]
fn check_accessibility_macos() -> PermissionState {
    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXIsProcessTrusted() -> bool;
    }

    let trusted = unsafe { AXIsProcessTrusted() };
    debug!("macOS Accessibility: trusted={}", trusted);

    if trusted {
        PermissionState::Granted
    } else {
        PermissionState::Denied
    }
}

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(target_os = "linux")]
fn check_x11_display_linux() -> PermissionState {
    let is_wayland = std::env::var("XDG_SESSION_TYPE")
        .map(|s| s == "wayland")
        .unwrap_or(false);
    let has_display = std::env::var_os("DISPLAY").is_some();
    debug!("Linux display: wayland={}, DISPLAY set={}", is_wayland, has_display);

    if has_display {
        PermissionState::Granted
    } else {
        PermissionState::Denied
    }
}

#[cfg(target_os = "linux")]
fn check_input_group_linux() -> PermissionState {
    match Command::new("groups").output() {
        Ok(output) => {
            let groups = String::from_utf8_lossy(&output.stdout);
            let in_group = groups.split_whitespace().any(|g| g == "input" || g == "root");
            debug!(
                "User groups: {}, in_input_group={}",
                groups.trim(),
                in_group
            );

            if in_group {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            }
        }
        Err(e) => {
            warn!("Failed to check groups: {}", e);
            PermissionState::Unknown
        }
    }
}

// ============================================================================
// Common Functions
// ============================================================================

/// Human-readable descriptions of what stands in the way of a hook for `mode`
pub fn describe_missing_permissions(mode: CaptureMode) -> Vec<String> {
    describe_missing(&check_permissions(), mode)
}

fn describe_missing(status: &PermissionStatus, mode: CaptureMode) -> Vec<String> {
    let mut missing = Vec::new();

    if !status.accessibility.is_granted() {
        missing.push(
            "Accessibility permission is required for keyboard and mouse hooks".to_string(),
        );
    }

    if !status.x11_display.is_granted() {
        missing.push("An X11 display is required; Wayland sessions are not supported".to_string());
    }

    if mode == CaptureMode::Intercept && !status.input_group.is_granted() {
        missing.push(
            "User must be in the 'input' group for intercept mode (sudo usermod -aG input $USER)"
                .to_string(),
        );
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_permissions() {
        let status = check_permissions();
        println!("Permission status: {:?}", status);
    }

    #[test]
    fn test_describe_missing_by_mode() {
        let status = PermissionStatus {
            accessibility: PermissionState::NotApplicable,
            x11_display: PermissionState::Granted,
            input_group: PermissionState::Denied,
        };
        assert!(describe_missing(&status, CaptureMode::Observe).is_empty());

        let missing = describe_missing(&status, CaptureMode::Intercept);
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("'input' group"));
    }

    #[test]
    fn test_describe_missing_accessibility() {
        let status = PermissionStatus {
            accessibility: PermissionState::Denied,
            x11_display: PermissionState::NotApplicable,
            input_group: PermissionState::NotApplicable,
        };
        let missing = describe_missing(&status, CaptureMode::Observe);
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("Accessibility"));
    }
}
