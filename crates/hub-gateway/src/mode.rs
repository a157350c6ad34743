//! Live-vs-mock mode selection.
//!
//! The backend base URL is fixed at startup, so the selector is an immutable
//! value: reads need no synchronization and the answer never changes for the
//! life of the process.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Operating mode for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// Requests are forwarded to the configured backend.
    Live,
    /// Requests are answered locally by the mock responders.
    Mock,
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayMode::Live => f.write_str("live"),
            GatewayMode::Mock => f.write_str("mock"),
        }
    }
}

/// Decides whether live mode applies. Cheap to clone (Arc).
#[derive(Debug, Clone)]
pub struct ModeSelector {
    base_url: Option<Arc<str>>,
}

impl ModeSelector {
    /// Build a selector from the configured backend URL.
    ///
    /// Blank URLs select mock mode. A trailing `/` is trimmed so that
    /// `base_url + "/path"` never produces a double slash.
    pub fn new(backend_url: Option<&str>) -> Self {
        let base_url = backend_url
            .map(str::trim)
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .map(Arc::from);
        Self { base_url }
    }

    pub fn is_live_mode_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn mode(&self) -> GatewayMode {
        if self.is_live_mode_enabled() {
            GatewayMode::Live
        } else {
            GatewayMode::Mock
        }
    }

    /// The backend base URL, present only in live mode.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}
