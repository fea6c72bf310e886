//! Metrics → 0..=100 score.
//!
//! Every band is checked on its own against a fixed boundary and the
//! deductions add up, so a worse measurement can never score higher.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ScoringPolicy;

/// Response-time bands apply at or above each boundary (ms).
pub const RESPONSE_TIME_BANDS_MS: [f64; 3] = [50.0, 100.0, 200.0];

/// Memory bands apply strictly above each boundary (MB of growth).
pub const MEMORY_BANDS_MB: [f64; 3] = [10.0, 50.0, 100.0];

pub const MAX_SCORE: u8 = 100;

pub fn score(response_time_ms: f64, memory_delta_mb: f64, policy: &ScoringPolicy) -> u8 {
    let mut deduction: u32 = 0;

    for (boundary, points) in RESPONSE_TIME_BANDS_MS
        .iter()
        .zip(policy.response_time_deductions)
    {
        if response_time_ms >= *boundary {
            deduction += u32::from(points);
        }
    }

    for (boundary, points) in MEMORY_BANDS_MB.iter().zip(policy.memory_deductions) {
        if memory_delta_mb > *boundary {
            deduction += u32::from(points);
        }
    }

    u32::from(MAX_SCORE).saturating_sub(deduction) as u8
}

// ─── Letter grades ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    S,
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            100.. => Self::S,
            90..=99 => Self::APlus,
            80..=89 => Self::A,
            70..=79 => Self::B,
            60..=69 => Self::C,
            50..=59 => Self::D,
            _ => Self::F,
        }
    }

    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::D | Self::F)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::S => "S",
            Self::APlus => "A+",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_score(ms: f64, mb: f64) -> u8 {
        score(ms, mb, &ScoringPolicy::default())
    }

    #[test]
    fn fast_and_lean_is_perfect() {
        assert_eq!(default_score(0.0, 0.0), 100);
        assert_eq!(default_score(49.999, -500.0), 100);
        assert_eq!(default_score(10.0, 10.0), 100);
    }

    #[test]
    fn response_bands_start_at_boundary() {
        assert_eq!(default_score(50.0, 0.0), 90);
        assert_eq!(default_score(99.9, 0.0), 90);
        assert_eq!(default_score(100.0, 0.0), 75);
        assert_eq!(default_score(200.0, 0.0), 50);
        assert_eq!(default_score(10_000.0, 0.0), 50);
    }

    #[test]
    fn memory_bands_start_above_boundary() {
        assert_eq!(default_score(0.0, 10.0), 100);
        assert_eq!(default_score(0.0, 10.01), 90);
        assert_eq!(default_score(0.0, 50.01), 75);
        assert_eq!(default_score(0.0, 100.01), 55);
    }

    #[test]
    fn worst_case_with_default_policy() {
        assert_eq!(default_score(500.0, 500.0), 5);
    }

    #[test]
    fn floors_at_zero() {
        let harsh = ScoringPolicy {
            response_time_deductions: [40, 40, 40],
            memory_deductions: [40, 40, 40],
        };
        assert_eq!(score(500.0, 500.0, &harsh), 0);
    }

    #[test]
    fn grades_follow_score() {
        assert_eq!(Grade::from_score(100), Grade::S);
        assert_eq!(Grade::from_score(90), Grade::APlus);
        assert_eq!(Grade::from_score(75), Grade::B);
        assert_eq!(Grade::from_score(50), Grade::D);
        assert_eq!(Grade::from_score(49), Grade::F);
        assert!(Grade::F.needs_attention());
        assert!(!Grade::C.needs_attention());
        assert_eq!(Grade::APlus.to_string(), "A+");
    }
}
