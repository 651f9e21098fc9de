// SPDX-License-Identifier: MIT OR Apache-2.0

//! rnasim - RNA secondary-structure similarity library
//!
//! Shared modules for the rnasim CLI tool.

pub mod config;
pub mod distance;
pub mod embedding;
pub mod errors;
pub mod output;
pub mod rank;
pub mod service;
pub mod structure;
pub mod utils;

pub use distance::{DistanceEngine, Metric};
pub use errors::{Error, Result};
pub use rank::{RankSelector, RankedResult, ScoredCandidate};
pub use service::{CompareOutcome, QueryOptions, SimilarityService, StructureInput, TaggedStructure};
pub use structure::{Structure, StructureGraph};
