//! Configuration for the `inkcard` tool.

use std::path::Path;
use std::time::Duration;

use inkcard_core::{DitherKernel, PollPolicy, SessionConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub encode: EncodeConfig,
    /// Card session timing.
    pub session: SessionSection,
    pub logging: LoggingConfig,
}

/// Encoding defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Dither kernel: "pillow", "none", "floyd-steinberg", "atkinson", "jarvis", "stucki".
    pub kernel: DitherKernel,
    /// Panel used when no card is attached, as `WIDTHxHEIGHTxBPP`.
    pub panel: String,
}

/// Session timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub command_timeout_ms: u64,
    pub reconnect_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Poll ceiling; 0 behaves as 1.
    pub poll_max_attempts: u32,
    pub poll_timeout_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            kernel: DitherKernel::default(),
            panel: "400x300x2".into(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        let core = SessionConfig::default();
        Self {
            command_timeout_ms: core.command_timeout.as_millis() as u64,
            reconnect_timeout_ms: core.reconnect_timeout.as_millis() as u64,
            poll_interval_ms: core.poll.interval.as_millis() as u64,
            poll_max_attempts: core.poll.max_attempts,
            poll_timeout_ms: core.poll.timeout.as_millis() as u64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CliConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Convert the `[session]` section into the core session policy.
    pub fn to_session_config(&self) -> SessionConfig {
        let s = &self.session;
        SessionConfig {
            command_timeout: Duration::from_millis(s.command_timeout_ms.max(1)),
            reconnect_timeout: Duration::from_millis(s.reconnect_timeout_ms.max(1)),
            poll: PollPolicy {
                interval: Duration::from_millis(s.poll_interval_ms),
                max_attempts: s.poll_max_attempts,
                timeout: Duration::from_millis(s.poll_timeout_ms),
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
