// SPDX-License-Identifier: MIT OR Apache-2.0

//! Window extractor for localized embeddings.
//!
//! This module slices a structure graph into fixed-length windows of
//! consecutive nodes. Windows slide one node at a time and can optionally
//! pull in the pairing partners of their nodes even when those partners lie
//! outside the window's span.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::structure::StructureGraph;

/// Configuration for the window extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Number of consecutive nodes per window.
    pub length: usize,
    /// Whether pairing partners outside the span are added to a window.
    pub keep_paired_neighbors: bool,
}

impl WindowConfig {
    /// Creates a new WindowConfig, rejecting a zero length.
    pub fn new(length: usize, keep_paired_neighbors: bool) -> Result<Self> {
        if length == 0 {
            return Err(Error::config("window length must be greater than 0"));
        }
        Ok(Self {
            length,
            keep_paired_neighbors,
        })
    }
}

/// A window over a structure graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Offset of the first core node in the graph's node ordering.
    pub start: usize,
    /// Node ids in the window, ascending. Core nodes plus any included partners.
    pub nodes: Vec<usize>,
    /// Position of each entry of `nodes` within the graph's node ordering.
    pub indices: Vec<usize>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Splits structure graphs into windows.
pub struct WindowExtractor {
    config: WindowConfig,
}

impl WindowExtractor {
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Produces one window per start offset `0..=n-L`, ascending.
    ///
    /// ```text
    /// for start in 0..=n-L:
    ///   core = nodes[start..start+L]
    ///   if keep_paired_neighbors: core += partners(core)
    ///   map every node to its position in `nodes`; drop the window if any fails
    /// ```
    ///
    /// Graphs shorter than `L` yield no windows; callers treat that as
    /// "too short" rather than as an error.
    pub fn extract(&self, graph: &StructureGraph) -> Vec<Window> {
        let nodes = graph.nodes();
        let length = self.config.length;
        if length == 0 || nodes.len() < length {
            return Vec::new();
        }

        let position: HashMap<usize, usize> =
            nodes.iter().enumerate().map(|(i, node)| (*node, i)).collect();

        let mut windows = Vec::with_capacity(nodes.len() - length + 1);
        for start in 0..=nodes.len() - length {
            let mut members: BTreeSet<usize> =
                nodes[start..start + length].iter().copied().collect();

            if self.config.keep_paired_neighbors {
                for node in &nodes[start..start + length] {
                    if let Some(partner) = graph.partner(*node) {
                        members.insert(partner);
                    }
                }
            }

            let indices: Option<Vec<usize>> =
                members.iter().map(|node| position.get(node).copied()).collect();

            match indices {
                Some(indices) => windows.push(Window {
                    start,
                    nodes: members.into_iter().collect(),
                    indices,
                }),
                None => debug!(start, "dropping window with unresolvable nodes"),
            }
        }

        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Structure;

    fn extractor(length: usize, keep: bool) -> WindowExtractor {
        WindowExtractor::new(WindowConfig::new(length, keep).unwrap())
    }

    #[test]
    fn test_config_validation() {
        assert!(WindowConfig::new(1, false).is_ok());
        assert!(matches!(
            WindowConfig::new(0, true),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_window_count_and_order() {
        let graph = Structure::parse("(((...)))").unwrap().to_graph();
        let windows = extractor(4, false).extract(&graph);

        assert_eq!(windows.len(), 6);
        let starts: Vec<usize> = windows.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(windows[2].nodes, vec![2, 3, 4, 5]);
        assert_eq!(windows[2].indices, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_too_short() {
        let graph = Structure::parse(".....").unwrap().to_graph();
        assert!(extractor(10, false).extract(&graph).is_empty());
    }

    #[test]
    fn test_exact_length_single_window() {
        let graph = Structure::parse("(..)").unwrap().to_graph();
        let windows = extractor(4, true).extract(&graph);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].nodes, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_paired_neighbors_included() {
        // Pairs: 0-8, 1-7, 2-6
        let graph = Structure::parse("(((...)))").unwrap().to_graph();
        let windows = extractor(3, true).extract(&graph);

        // Window at 0 holds 0,1,2 and their partners 8,7,6.
        assert_eq!(windows[0].nodes, vec![0, 1, 2, 6, 7, 8]);
        // Window at 3 is all unpaired.
        assert_eq!(windows[3].nodes, vec![3, 4, 5]);
        // Window at 1 (1,2,3) adds 7 and 6 only once each.
        assert_eq!(windows[1].nodes, vec![1, 2, 3, 6, 7]);
    }

    #[test]
    fn test_partner_inside_window_not_duplicated() {
        let graph = Structure::parse("(.)").unwrap().to_graph();
        let windows = extractor(3, true).extract(&graph);
        assert_eq!(windows[0].nodes, vec![0, 1, 2]);
    }

    #[test]
    fn test_unresolvable_window_dropped() {
        // Node 1 claims a partner (42) that is not part of the graph.
        let graph = StructureGraph::from_parts(None, vec![0, 1, 2, 3], &[(1, 42)]);

        let with_neighbors = extractor(2, true).extract(&graph);
        let starts: Vec<usize> = with_neighbors.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![2]);

        // Without neighbor inclusion nothing dangles.
        assert_eq!(extractor(2, false).extract(&graph).len(), 3);
    }
}
