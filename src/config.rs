use serde::{Deserialize, Serialize};

// ─── Environment overrides ───────────────────────────────────────

/// Truthy value forces the portable backend regardless of native support.
pub const FORCE_FALLBACK_ENV: &str = "PERFGATE_FORCE_FALLBACK";

/// Truthy value insists on the native backend. Still falls back, with a
/// recorded reason, when native cannot load.
pub const FORCE_NATIVE_ENV: &str = "PERFGATE_FORCE_NATIVE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Native when it loads successfully, portable otherwise.
    #[default]
    Auto,
    ForceNative,
    ForceFallback,
}

/// Read once when the process-wide backend selector initializes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub mode: BackendMode,
}

impl SelectorConfig {
    pub fn new(mode: BackendMode) -> Self {
        Self { mode }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Fallback wins when both overrides are set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).map(|v| is_truthy(&v)).unwrap_or(false);

        let mode = if flag(FORCE_FALLBACK_ENV) {
            BackendMode::ForceFallback
        } else if flag(FORCE_NATIVE_ENV) {
            BackendMode::ForceNative
        } else {
            BackendMode::Auto
        };
        Self { mode }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ─── Scoring policy ──────────────────────────────────────────────

/// Points deducted per crossed band. Band boundaries are fixed in
/// `metrics::scoring`; only the magnitudes are tunable here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Deductions at ≥50ms, ≥100ms and ≥200ms
    #[serde(default = "default_response_time_deductions")]
    pub response_time_deductions: [u8; 3],

    /// Deductions above 10MB, 50MB and 100MB of growth
    #[serde(default = "default_memory_deductions")]
    pub memory_deductions: [u8; 3],
}

fn default_response_time_deductions() -> [u8; 3] {
    [10, 15, 25]
}
fn default_memory_deductions() -> [u8; 3] {
    [10, 15, 20]
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            response_time_deductions: default_response_time_deductions(),
            memory_deductions: default_memory_deductions(),
        }
    }
}
