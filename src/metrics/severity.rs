use serde::{Deserialize, Serialize};

pub const ELEVATED_THRESHOLD: f64 = 50.0;
pub const CRITICAL_THRESHOLD: f64 = 80.0;

/// Cosmetic load level for a percentage; carries no control-flow meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Elevated,
    Critical,
}

impl Severity {
    /// Thresholds are inclusive on the high side. Input is clamped to
    /// `[0, 100]`; NaN classifies as `Normal`.
    pub fn classify(percent: f64) -> Self {
        if percent.is_nan() {
            return Severity::Normal;
        }
        let percent = percent.clamp(0.0, 100.0);
        if percent >= CRITICAL_THRESHOLD {
            Severity::Critical
        } else if percent >= ELEVATED_THRESHOLD {
            Severity::Elevated
        } else {
            Severity::Normal
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Elevated => "elevated",
            Severity::Critical => "critical",
        }
    }
}
