//! Dissimilarity scores between attribute values.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::tracker::attribute::Value;

/// Named dissimilarity metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Euclidean norm of the difference between two numeric vectors.
    #[default]
    Euclidean,
    /// Inverse Jaccard index of two pixel index sets: |A ∪ B| / |A ∩ B|.
    PxIntersect,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::PxIntersect => "pxintersect",
        }
    }

    /// Score `previous` against every candidate, one score per candidate.
    pub fn score(&self, previous: &Value, candidates: &[&Value]) -> Result<Vec<f64>> {
        candidates
            .iter()
            .map(|candidate| self.score_one(previous, candidate))
            .collect()
    }

    /// Score a single pair of values. The result lies in `[0, inf]`.
    pub fn score_one(&self, a: &Value, b: &Value) -> Result<f64> {
        match self {
            Metric::Euclidean => {
                let a = self.numeric(a)?;
                let b = self.numeric(b)?;
                euclidean(a, b)
            }
            Metric::PxIntersect => {
                let a = self.indices(a)?;
                let b = self.indices(b)?;
                Ok(inverse_jaccard(a, b))
            }
        }
    }

    fn numeric<'a>(&self, v: &'a Value) -> Result<&'a [f64]> {
        v.as_numeric().ok_or(TrackError::IncompatibleValue {
            metric: self.name(),
            found: v.kind(),
        })
    }

    fn indices<'a>(&self, v: &'a Value) -> Result<&'a BTreeSet<u64>> {
        v.as_indices().ok_or(TrackError::IncompatibleValue {
            metric: self.name(),
            found: v.kind(),
        })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" => Ok(Metric::Euclidean),
            "pxintersect" => Ok(Metric::PxIntersect),
            _ => Err(TrackError::UnknownMetric(s.to_string())),
        }
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(TrackError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt())
}

fn inverse_jaccard(a: &BTreeSet<u64>, b: &BTreeSet<u64>) -> f64 {
    let intersection = a.intersection(b).count();
    if intersection == 0 {
        return f64::INFINITY;
    }
    let union = a.len() + b.len() - intersection;
    union as f64 / intersection as f64
}

/// Closed interval of acceptable scores. Anything outside gates to infinity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self {
            min: 0.0,
            max: f64::INFINITY,
        }
    }

    #[inline]
    pub fn contains(&self, score: f64) -> bool {
        score.is_finite() && score >= self.min && score <= self.max
    }

    /// `score` if it lies in the range, infinity otherwise.
    #[inline]
    pub fn gate(&self, score: f64) -> f64 {
        if self.contains(score) {
            score
        } else {
            f64::INFINITY
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.min.is_nan() && !self.max.is_nan() && self.min <= self.max
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::unbounded()
    }
}
