// SPDX-License-Identifier: MIT OR Apache-2.0

//! Distance computation between embedding vectors.
//!
//! Candidates are scored against a query in fixed-size chunks so that very
//! large candidate sets never need more than one chunk of intermediate
//! state. Each candidate is scored independently; chunking only affects
//! progress reporting and memory, never the values.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::errors::{Error, Result};

/// Added to every norm before dividing.
pub const NORM_EPSILON: f64 = 1e-8;

/// Default number of candidates per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Supported distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Sum of squared component differences.
    #[default]
    Squared,
    /// `1 - cosine_similarity` of the normalized vectors.
    Cosine,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Squared => write!(f, "squared"),
            Metric::Cosine => write!(f, "cosine"),
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "squared" => Ok(Metric::Squared),
            "cosine" => Ok(Metric::Cosine),
            other => Err(Error::config(format!(
                "Unknown metric '{}'. Supported values: squared, cosine",
                other
            ))),
        }
    }
}

/// Scores candidate vectors against a query.
#[derive(Debug, Clone)]
pub struct DistanceEngine {
    metric: Metric,
    chunk_size: usize,
    progress: bool,
}

impl DistanceEngine {
    pub fn new(metric: Metric, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk size must be greater than 0"));
        }
        Ok(Self {
            metric,
            chunk_size,
            progress: false,
        })
    }

    /// Shows a progress bar on stderr while scoring.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// One distance per candidate, in input order. A candidate whose length
    /// differs from the query gets its own `DimensionMismatch`.
    pub fn score<C: AsRef<[f32]>>(&self, query: &[f32], candidates: &[C]) -> Vec<Result<f32>> {
        let bar = self.progress_bar(candidates.len() as u64);
        let query_norm = norm(query);
        let mut distances = Vec::with_capacity(candidates.len());

        for (index, chunk) in candidates.chunks(self.chunk_size).enumerate() {
            debug!(chunk = index, size = chunk.len(), metric = %self.metric, "scoring chunk");
            distances.extend(chunk.iter().map(|candidate| {
                self.distance_with_norm(query, query_norm, candidate.as_ref())
            }));
            bar.inc(chunk.len() as u64);
        }

        bar.finish_and_clear();
        distances
    }

    /// Distance between two vectors; a length mismatch fails the call.
    pub fn compare(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        self.distance_with_norm(a, norm(a), b)
    }

    fn distance_with_norm(&self, query: &[f32], query_norm: f64, candidate: &[f32]) -> Result<f32> {
        if query.len() != candidate.len() {
            return Err(Error::DimensionMismatch {
                expected: query.len(),
                got: candidate.len(),
            });
        }

        let value = match self.metric {
            Metric::Squared => squared_distance(query, candidate),
            Metric::Cosine => cosine_distance(query, query_norm, candidate),
        };
        Ok(value as f32)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        let style = ProgressStyle::with_template("Calculating distances {bar:40} {pos}/{len} rows")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar
    }
}

fn norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum()
}

// Both sides are scaled by 1 / (norm + eps) first, then the similarity of
// the scaled vectors is taken with each norm clamped to at least eps. A zero
// vector therefore has similarity 0 (distance 1) instead of NaN.
fn cosine_distance(query: &[f32], query_norm: f64, candidate: &[f32]) -> f64 {
    let q_scale = 1.0 / (query_norm + NORM_EPSILON);
    let c_scale = 1.0 / (norm(candidate) + NORM_EPSILON);

    let mut dot = 0.0;
    let mut q_sq = 0.0;
    let mut c_sq = 0.0;
    for (x, y) in query.iter().zip(candidate.iter()) {
        let q = f64::from(*x) * q_scale;
        let c = f64::from(*y) * c_scale;
        dot += q * c;
        q_sq += q * q;
        c_sq += c * c;
    }

    let denominator = q_sq.sqrt().max(NORM_EPSILON) * c_sq.sqrt().max(NORM_EPSILON);
    1.0 - dot / denominator
}
