// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dot-bracket structures and their graph form.
//!
//! A [`Structure`] is parsed once from dot-bracket notation and never changes.
//! [`StructureGraph`] is the per-request view handed to encoders and to the
//! window extractor: one node per position, backbone edges between
//! neighbouring positions and one pairing edge per base pair.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const BRACKETS: [(char, char); 4] = [('(', ')'), ('[', ']'), ('{', '}'), ('<', '>')];

/// Reasons a dot-bracket string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    #[error("structure is empty")]
    Empty,
    #[error("invalid character '{ch}' at position {index}")]
    InvalidChar { ch: char, index: usize },
    #[error("unmatched closing '{ch}' at position {index}")]
    UnmatchedClose { ch: char, index: usize },
    #[error("unclosed '{ch}' at position {index}")]
    Unclosed { ch: char, index: usize },
}

/// A parsed RNA secondary structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    notation: String,
    partners: Vec<Option<usize>>,
}

impl Structure {
    /// Parses dot-bracket notation. `.` marks an unpaired position; `()`,
    /// `[]`, `{}` and `<>` mark pairs and may cross each other (pseudoknots).
    pub fn parse(notation: &str) -> Result<Self, StructureError> {
        let notation = notation.trim();
        if notation.is_empty() {
            return Err(StructureError::Empty);
        }

        let mut stacks: [Vec<usize>; BRACKETS.len()] = Default::default();
        let mut partners = vec![None; notation.chars().count()];

        for (index, ch) in notation.chars().enumerate() {
            if ch == '.' {
                continue;
            }
            if let Some(kind) = BRACKETS.iter().position(|(open, _)| *open == ch) {
                stacks[kind].push(index);
                continue;
            }
            let kind = BRACKETS
                .iter()
                .position(|(_, close)| *close == ch)
                .ok_or(StructureError::InvalidChar { ch, index })?;
            let open = stacks[kind]
                .pop()
                .ok_or(StructureError::UnmatchedClose { ch, index })?;
            partners[open] = Some(index);
            partners[index] = Some(open);
        }

        if let Some((kind, index)) = stacks
            .iter()
            .enumerate()
            .filter_map(|(kind, stack)| stack.first().map(|index| (kind, *index)))
            .min_by_key(|(_, index)| *index)
        {
            return Err(StructureError::Unclosed {
                ch: BRACKETS[kind].0,
                index,
            });
        }

        Ok(Self {
            notation: notation.to_string(),
            partners,
        })
    }

    /// The original notation (trimmed).
    pub fn notation(&self) -> &str {
        &self.notation
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    /// Pairing partner of position `index`, if paired.
    pub fn partner(&self, index: usize) -> Option<usize> {
        self.partners.get(index).copied().flatten()
    }

    /// Base pairs as `(i, j)` with `i < j`, ordered by `i`.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        self.partners
            .iter()
            .enumerate()
            .filter_map(|(i, partner)| partner.filter(|j| *j > i).map(|j| (i, j)))
            .collect()
    }

    /// Builds the graph view used for embedding.
    pub fn to_graph(&self) -> StructureGraph {
        StructureGraph::from_parts(
            Some(self.notation.clone()),
            (0..self.len()).collect(),
            &self.pairs(),
        )
    }
}

impl FromStr for Structure {
    type Err = StructureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Structure::parse(s)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.notation)
    }
}

/// Edge kinds in a structure graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Backbone,
    Pairing,
}

/// Graph edge between two node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub kind: EdgeKind,
}

/// Graph form of a structure.
///
/// Nodes are kept in ascending id order; that order is the canonical node
/// ordering encoders must follow when returning per-node vectors.
#[derive(Debug, Clone)]
pub struct StructureGraph {
    notation: Option<String>,
    nodes: Vec<usize>,
    partners: HashMap<usize, usize>,
}

impl StructureGraph {
    /// Assembles a graph from node ids and pairs. Pairs may reference ids that
    /// are not among `nodes`; such graphs come from upstream data we do not
    /// control and are tolerated here.
    pub fn from_parts(
        notation: Option<String>,
        mut nodes: Vec<usize>,
        pairs: &[(usize, usize)],
    ) -> Self {
        nodes.sort_unstable();
        nodes.dedup();

        let mut partners = HashMap::with_capacity(pairs.len() * 2);
        for &(a, b) in pairs {
            partners.insert(a, b);
            partners.insert(b, a);
        }

        Self {
            notation,
            nodes,
            partners,
        }
    }

    pub fn notation(&self) -> Option<&str> {
        self.notation.as_deref()
    }

    /// Node ids in canonical order.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn partner(&self, node: usize) -> Option<usize> {
        self.partners.get(&node).copied()
    }

    /// Backbone edges between consecutive nodes followed by pairing edges.
    pub fn edges(&self) -> Vec<Edge> {
        let backbone = self.nodes.windows(2).map(|w| Edge {
            source: w[0],
            target: w[1],
            kind: EdgeKind::Backbone,
        });

        let mut pairing: Vec<Edge> = self
            .partners
            .iter()
            .filter(|(a, b)| a < b)
            .map(|(&a, &b)| Edge {
                source: a,
                target: b,
                kind: EdgeKind::Pairing,
            })
            .collect();
        pairing.sort_by_key(|e| (e.source, e.target));

        backbone.chain(pairing).collect()
    }
}
