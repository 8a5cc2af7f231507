//! Combines per-file analysis scores into one session verdict.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    /// An empty submission has no defined verdict; callers must not treat
    /// it as a zero score.
    #[error("No analysis results to aggregate")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Left-inclusive boundaries stay in the lower band: 0.70 is MEDIUM,
    /// 0.40 is LOW.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score > 0.7 {
            Self::High
        } else if score > 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// One analyzed answer file: the artifact reference and its score.
#[derive(Debug, Clone)]
pub struct FileScore {
    pub artifact: String,
    pub score: f32,
}

/// Representative-artifact selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Max,
    First,
    Last,
    Index(usize),
}

impl Pick {
    /// Absent picks default to `Max`; anything unparseable falls back to
    /// `First`. Callers rely on this exact chain to know which artifact a
    /// UI will display.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Max;
        };

        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "max" => Self::Max,
            "first" => Self::First,
            "last" => Self::Last,
            other => other.parse::<usize>().map_or(Self::First, Self::Index),
        }
    }

    fn select(self, results: &[FileScore]) -> usize {
        match self {
            Self::Max => {
                // Ties break toward first occurrence.
                let mut best = 0;
                for (i, r) in results.iter().enumerate().skip(1) {
                    if r.score > results[best].score {
                        best = i;
                    }
                }
                best
            }
            Self::First => 0,
            Self::Last => results.len() - 1,
            Self::Index(i) => {
                if i < results.len() {
                    i
                } else {
                    0
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub overall_score: f32,
    pub risk_level: RiskLevel,
    pub representative: String,
}

/// Arithmetic mean of all per-file scores plus the representative artifact
/// chosen by `pick`. Empty input is an error.
pub fn aggregate(results: &[FileScore], pick: Pick) -> Result<Verdict, AggregateError> {
    if results.is_empty() {
        return Err(AggregateError::Empty);
    }

    #[allow(clippy::cast_precision_loss)]
    let overall_score =
        results.iter().map(|r| f64::from(r.score)).sum::<f64>() as f32 / results.len() as f32;

    let representative = results[pick.select(results)].artifact.clone();

    Ok(Verdict {
        overall_score,
        risk_level: RiskLevel::from_score(overall_score),
        representative,
    })
}
