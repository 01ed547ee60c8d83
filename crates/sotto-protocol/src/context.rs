//! Active-app context snapshot types supplied by the client.
//!
//! All of this metadata is untrusted. A snapshot that fails to parse
//! degrades to absent instead of rejecting the enclosing message.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Where the client obtained the focus information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusEventSource {
    Polling,
    Accessibility,
    Uia,
    #[default]
    Unknown,
}

/// How much the client trusts its own focus information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusConfidenceLevel {
    High,
    Medium,
    #[default]
    Low,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FocusedApplication {
    pub display_name: String,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub process_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FocusedWindow {
    pub title: String,
}

/// Best-effort browser tab details; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FocusedBrowserTab {
    pub title: Option<String>,
    pub origin: Option<String>,
    pub browser: Option<String>,
}

/// Snapshot of the user's current application/window/browser focus.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActiveAppContextSnapshot {
    pub focused_application: Option<FocusedApplication>,
    pub focused_window: Option<FocusedWindow>,
    pub focused_browser_tab: Option<FocusedBrowserTab>,
    pub event_source: FocusEventSource,
    pub confidence_level: FocusConfidenceLevel,
    pub captured_at: Option<String>,
}

impl ActiveAppContextSnapshot {
    /// Parse a snapshot from a raw JSON value, degrading to `None` on
    /// any shape mismatch.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            debug!(target: "protocol", "Ignoring non-object active_app_context payload");
            return None;
        }
        match serde_json::from_value(value) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                debug!(target: "protocol", "Ignoring malformed active_app_context payload: {err}");
                None
            }
        }
    }

    /// True when none of the three focus sub-fields carry data.
    pub fn is_entirely_unknown(&self) -> bool {
        self.focused_application.is_none()
            && self.focused_window.is_none()
            && self.focused_browser_tab.is_none()
    }
}
