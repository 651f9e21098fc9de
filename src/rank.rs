// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-K selection over scored candidates.

use serde::Serialize;
use std::cmp::Ordering;

use crate::distance::Metric;
use crate::embedding::CandidateRecord;

/// Number of results returned when the caller does not ask for a limit.
pub const DEFAULT_TOP_K: usize = 30;

/// A candidate together with its distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: CandidateRecord,
    pub distance: f32,
}

/// Ranked search output, ascending by distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub metric: Metric,
    pub results: Vec<ScoredCandidate>,
}

/// Stable top-K selection.
#[derive(Debug, Clone, Copy)]
pub struct RankSelector {
    k: usize,
}

impl Default for RankSelector {
    fn default() -> Self {
        Self { k: DEFAULT_TOP_K }
    }
}

impl RankSelector {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// The `k` closest candidates, ascending. Equal distances keep their
    /// input order.
    pub fn select(&self, scored: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        top_k_by(scored, self.k, |s| s.distance)
    }
}

/// Returns the `k` items with the smallest key, ascending by key, ties in
/// input order. NaN keys sort after every number.
pub fn top_k_by<T, F>(items: Vec<T>, k: usize, key: F) -> Vec<T>
where
    F: Fn(&T) -> f32,
{
    if k == 0 || items.is_empty() {
        return Vec::new();
    }

    let mut keyed: Vec<(f32, usize, T)> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| (key(&item), index, item))
        .collect();

    let order = |a: &(f32, usize, T), b: &(f32, usize, T)| {
        cmp_distance(a.0, b.0).then(a.1.cmp(&b.1))
    };

    if k < keyed.len() {
        keyed.select_nth_unstable_by(k - 1, order);
        keyed.truncate(k);
    }
    keyed.sort_unstable_by(order);

    keyed.into_iter().map(|(_, _, item)| item).collect()
}

fn cmp_distance(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_and_truncated() {
        let items = vec![("a", 3.0), ("b", 1.0), ("c", 2.0), ("d", 0.5)];
        let top = top_k_by(items, 2, |(_, d)| *d);
        assert_eq!(top, vec![("d", 0.5), ("b", 1.0)]);
    }

    #[test]
    fn test_fewer_than_k() {
        let items = vec![("a", 3.0), ("b", 1.0)];
        let top = top_k_by(items, 30, |(_, d)| *d);
        assert_eq!(top, vec![("b", 1.0), ("a", 3.0)]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let items = vec![("z", 1.0), ("a", 0.0), ("m", 1.0), ("b", 1.0), ("c", 0.0)];
        let top = top_k_by(items.clone(), 4, |(_, d)| *d);
        assert_eq!(top, vec![("a", 0.0), ("c", 0.0), ("z", 1.0), ("m", 1.0)]);

        let all = top_k_by(items, 5, |(_, d)| *d);
        let names: Vec<&str> = all.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["a", "c", "z", "m", "b"]);
    }

    #[test]
    fn test_zero_k_is_empty() {
        assert!(top_k_by(vec![("a", 1.0)], 0, |(_, d)| *d).is_empty());
    }

    #[test]
    fn test_nan_sorts_last() {
        let items = vec![("nan", f32::NAN), ("one", 1.0), ("zero", 0.0)];
        let top = top_k_by(items, 3, |(_, d)| *d);
        let names: Vec<&str> = top.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["zero", "one", "nan"]);
    }

    #[test]
    fn test_default_k() {
        assert_eq!(RankSelector::default().k(), 30);
    }
}
