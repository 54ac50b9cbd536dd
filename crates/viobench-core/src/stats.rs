//! Error reductions over paired positions.

use crate::error::CoreError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn distances<'a>(
    estimate: &'a [Vector3<f64>],
    ground_truth: &'a [Vector3<f64>],
) -> impl Iterator<Item = f64> + 'a {
    estimate
        .iter()
        .zip(ground_truth.iter())
        .map(|(e, g)| (e - g).norm())
}

/// Root-mean-square of the per-point distances, `None` for no pairs.
pub fn rmse(estimate: &[Vector3<f64>], ground_truth: &[Vector3<f64>]) -> Option<f64> {
    let n = estimate.len().min(ground_truth.len());
    if n == 0 {
        return None;
    }
    let sum_sq: f64 = distances(estimate, ground_truth).map(|d| d * d).sum();
    Some((sum_sq / n as f64).sqrt())
}

/// Mean of the per-point distances, `None` for no pairs.
pub fn mae(estimate: &[Vector3<f64>], ground_truth: &[Vector3<f64>]) -> Option<f64> {
    let n = estimate.len().min(ground_truth.len());
    if n == 0 {
        return None;
    }
    Some(distances(estimate, ground_truth).sum::<f64>() / n as f64)
}

// ---------------------------------------------------------------------------
// Error kind
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "MAE")]
    Mae,
    #[serde(rename = "RMSE")]
    Rmse,
    /// Mean of RMSE and MAE.
    #[serde(rename = "average")]
    Average,
}

impl ErrorKind {
    pub fn reduce(&self, estimate: &[Vector3<f64>], ground_truth: &[Vector3<f64>]) -> Option<f64> {
        match self {
            Self::Mae => mae(estimate, ground_truth),
            Self::Rmse => rmse(estimate, ground_truth),
            Self::Average => {
                let r = rmse(estimate, ground_truth)?;
                let m = mae(estimate, ground_truth)?;
                Some((r + m) / 2.0)
            }
        }
    }
}

impl FromStr for ErrorKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mae" => Ok(Self::Mae),
            "rmse" => Ok(Self::Rmse),
            "average" => Ok(Self::Average),
            _ => Err(CoreError::UnknownMetric(s.to_string())),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mae => "MAE",
            Self::Rmse => "RMSE",
            Self::Average => "average",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Full statistics
// ---------------------------------------------------------------------------
/// Distance statistics in the shape reported by absolute-pose-error tools.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub count: usize,
    pub rmse: f64,
    pub mae: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl ErrorStats {
    pub fn from_pairs(estimate: &[Vector3<f64>], ground_truth: &[Vector3<f64>]) -> Option<Self> {
        let mut d: Vec<f64> = distances(estimate, ground_truth).collect();
        if d.is_empty() {
            return None;
        }
        d.sort_by(|a, b| a.total_cmp(b));

        let n = d.len();
        let mean = d.iter().sum::<f64>() / n as f64;
        let sum_sq: f64 = d.iter().map(|x| x * x).sum();
        let var = d.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            d[n / 2]
        } else {
            (d[n / 2 - 1] + d[n / 2]) / 2.0
        };

        Some(Self {
            count: n,
            rmse: (sum_sq / n as f64).sqrt(),
            mae: mean,
            median,
            std: var.sqrt(),
            min: d[0],
            max: d[n - 1],
        })
    }
}

// ---------------------------------------------------------------------------
// Table summaries
// ---------------------------------------------------------------------------
/// Mean and population standard deviation of a row of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    pub mean: f64,
    pub std: f64,
}

impl SummaryStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std: var.sqrt(),
        })
    }
}
