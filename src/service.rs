// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embed, compare and search operations.
//!
//! This is the surface a transport (the CLI, or anything else) calls into.
//! Raw structure strings are validated here, fed to the orchestrator, scored
//! by the distance engine and ranked by the selector.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, EncoderProviderType, MismatchPolicy};
use crate::distance::{DistanceEngine, Metric, DEFAULT_CHUNK_SIZE};
use crate::embedding::{
    CandidateRecord, CandidateStore, CommandEncoder, Device, DummyEncoder, EmbedMode, Embedding,
    EmbeddingContext, EmbeddingOrchestrator, EncoderConfig, StructureEncoder,
};
use crate::errors::{Error, Result};
use crate::rank::{RankSelector, RankedResult, ScoredCandidate, DEFAULT_TOP_K};
use crate::structure::{Structure, StructureGraph};

/// One structure or a list of structures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StructureInput {
    Single(String),
    Many(Vec<String>),
}

impl StructureInput {
    pub fn is_single(&self) -> bool {
        matches!(self, StructureInput::Single(_))
    }

    /// Flattens into a list; a single structure becomes a list of one.
    pub fn into_list(self) -> Vec<String> {
        match self {
            StructureInput::Single(s) => vec![s],
            StructureInput::Many(list) => list,
        }
    }
}

impl From<&str> for StructureInput {
    fn from(value: &str) -> Self {
        StructureInput::Single(value.to_string())
    }
}

impl From<Vec<String>> for StructureInput {
    fn from(value: Vec<String>) -> Self {
        StructureInput::Many(value)
    }
}

/// Distances shaped like the [`StructureInput`] they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompareOutcome {
    Single(f32),
    Many(Vec<f32>),
}

/// An identifier-tagged structure for batch embedding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaggedStructure {
    pub id: String,
    pub structure: String,
}

/// Batch embedding output for one tagged structure.
#[derive(Debug)]
pub struct TaggedEmbeddings {
    pub id: String,
    pub embeddings: Result<Vec<Embedding>>,
}

/// Per-call options for compare and search.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub mode: EmbedMode,
    pub metric: Metric,
    pub top_k: usize,
    pub chunk_size: usize,
    pub on_mismatch: MismatchPolicy,
    pub progress: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            mode: EmbedMode::Whole,
            metric: Metric::Squared,
            top_k: DEFAULT_TOP_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            on_mismatch: MismatchPolicy::Skip,
            progress: false,
        }
    }
}

impl QueryOptions {
    /// Options taken from configuration defaults.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            mode: EmbedMode::from_window(
                config.embedding().window_length(),
                config.embedding().keep_paired_neighbors(),
            )?,
            metric: config.search().metric()?,
            top_k: config.search().top_k(),
            chunk_size: config.search().chunk_size(),
            on_mismatch: config.search().on_mismatch(),
            progress: false,
        })
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_mode(mut self, mode: EmbedMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// Similarity operations over one embedding context.
#[derive(Debug, Clone)]
pub struct SimilarityService {
    orchestrator: EmbeddingOrchestrator,
}

impl SimilarityService {
    pub fn new(ctx: EmbeddingContext) -> Result<Self> {
        Ok(Self {
            orchestrator: EmbeddingOrchestrator::new(ctx)?,
        })
    }

    /// Builds the encoder and context described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let model = config.model();
        let encoder: Arc<dyn StructureEncoder> = match model.provider() {
            EncoderProviderType::Dummy => Arc::new(DummyEncoder::new(model.dimension())),
            EncoderProviderType::Command => Arc::new(CommandEncoder::new(EncoderConfig {
                command: model.command().to_string(),
                model_path: model.path().to_string(),
            })),
        };
        let device: Device = model.device().parse()?;
        info!(model = encoder.model_id(), %device, "encoder ready");

        Self::new(
            EmbeddingContext::new(encoder)
                .with_device(device)
                .with_batch_size(config.embedding().batch_size())
                .with_workers(config.embedding().workers()),
        )
    }

    pub fn orchestrator(&self) -> &EmbeddingOrchestrator {
        &self.orchestrator
    }

    /// Embeds one or many structures. Entry `i` belongs to input `i`; an
    /// invalid or failing input does not affect its siblings.
    pub fn embed(&self, input: StructureInput, mode: EmbedMode) -> Vec<Result<Vec<Embedding>>> {
        self.embed_strings(&input.into_list(), mode)
    }

    /// Distance between the first embedding of `structure1` and the first
    /// embedding of each `structure2`. Input positions are 0 for
    /// `structure1` and 1.. for the `structure2` entries; any failure fails
    /// the call.
    pub fn compare(
        &self,
        structure1: &str,
        structure2: StructureInput,
        options: &QueryOptions,
    ) -> Result<CompareOutcome> {
        let single = structure2.is_single();
        let mut inputs = vec![structure1.to_string()];
        inputs.extend(structure2.into_list());

        let results = self.embed_strings(&inputs, options.mode);
        let mut vectors = Vec::with_capacity(results.len());
        for (position, result) in results.into_iter().enumerate() {
            vectors.push(first_vector(position, &inputs[position], result?, options.mode)?);
        }

        let engine = DistanceEngine::new(options.metric, options.chunk_size)?;
        let query = &vectors[0];
        let distances = vectors[1..]
            .iter()
            .map(|candidate| engine.compare(query, candidate))
            .collect::<Result<Vec<f32>>>()?;

        if single {
            Ok(CompareOutcome::Single(distances[0]))
        } else {
            Ok(CompareOutcome::Many(distances))
        }
    }

    /// Ranks `candidates` by distance to the query structure.
    pub fn search(
        &self,
        structure: &str,
        candidates: &[CandidateRecord],
        options: &QueryOptions,
    ) -> Result<RankedResult> {
        if options.top_k == 0 {
            return Err(Error::config("top-k must be greater than 0"));
        }
        let engine = DistanceEngine::new(options.metric, options.chunk_size)?
            .with_progress(options.progress);

        let mut results = self.embed_strings(&[structure.to_string()], options.mode);
        let query = first_vector(0, structure, results.remove(0)?, options.mode)?;

        let vectors: Vec<&[f32]> = candidates.iter().map(|c| c.vector.as_slice()).collect();
        let distances = engine.score(&query, &vectors);

        let mut scored = Vec::with_capacity(candidates.len());
        for (candidate, distance) in candidates.iter().zip(distances) {
            match distance {
                Ok(distance) => scored.push(ScoredCandidate {
                    candidate: candidate.clone(),
                    distance,
                }),
                Err(err @ Error::DimensionMismatch { .. }) => match options.on_mismatch {
                    MismatchPolicy::Skip => warn!("Skipping candidate {}: {}", candidate.id, err),
                    MismatchPolicy::Abort => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }

        debug!(scored = scored.len(), total = candidates.len(), "ranking candidates");
        Ok(RankedResult {
            metric: options.metric,
            results: RankSelector::new(options.top_k).select(scored),
        })
    }

    /// [`search`](Self::search) over a snapshot of the store. A store filled
    /// by a different model is searched anyway, with a warning.
    pub fn search_store(
        &self,
        structure: &str,
        store: &CandidateStore,
        options: &QueryOptions,
    ) -> Result<RankedResult> {
        if let Some(stored) = store.get_meta("model_id")? {
            if stored != self.model_id() {
                warn!(
                    stored = %stored,
                    query = self.model_id(),
                    "store embeddings come from another model; distances may be meaningless"
                );
            }
        }
        let candidates = store.load_candidates()?;
        self.search(structure, &candidates, options)
    }

    /// Embeds identifier-tagged structures; failures carry the identifier.
    pub fn batch_embed(&self, items: &[TaggedStructure], mode: EmbedMode) -> Vec<TaggedEmbeddings> {
        let structures: Vec<String> = items.iter().map(|item| item.structure.clone()).collect();
        self.embed_strings(&structures, mode)
            .into_iter()
            .zip(items)
            .map(|(result, item)| TaggedEmbeddings {
                id: item.id.clone(),
                embeddings: result.map_err(|err| err.with_id(&item.id)),
            })
            .collect()
    }

    /// Embeds a structure and stores every resulting vector under `id`.
    /// Returns the number of rows written (0 for a too-short structure).
    ///
    /// A store holds embeddings of one model only; adding with another model
    /// is a configuration error.
    pub fn add_to_store(
        &self,
        store: &mut CandidateStore,
        id: &str,
        structure: &str,
        metadata: Value,
        mode: EmbedMode,
    ) -> Result<usize> {
        let model_id = self.model_id();
        if let Some(stored) = store.get_meta("model_id")? {
            if stored != model_id {
                return Err(Error::config(format!(
                    "store holds embeddings from model '{}', encoder is '{}'",
                    stored, model_id
                )));
            }
        }

        let mut results = self.embed_strings(&[structure.to_string()], mode);
        let embeddings = results.remove(0).map_err(|err| err.with_id(id))?;

        let records: Vec<CandidateRecord> = embeddings
            .iter()
            .filter_map(|embedding| {
                CandidateRecord::from_embedding(id, structure.trim(), embedding, metadata.clone())
            })
            .collect();
        if records.is_empty() {
            warn!("Structure {} is shorter than the window; nothing stored", id);
            return Ok(0);
        }

        let written = store.insert_records(&records)?;
        store.set_meta("model_id", model_id)?;
        Ok(written)
    }

    fn model_id(&self) -> &str {
        self.orchestrator.context().encoder().model_id()
    }

    fn embed_strings(&self, inputs: &[String], mode: EmbedMode) -> Vec<Result<Vec<Embedding>>> {
        let mut results: Vec<Option<Result<Vec<Embedding>>>> = Vec::with_capacity(inputs.len());
        let mut graphs: Vec<StructureGraph> = Vec::new();
        let mut positions: Vec<usize> = Vec::new();

        for (position, raw) in inputs.iter().enumerate() {
            match Structure::parse(raw) {
                Ok(structure) => {
                    graphs.push(structure.to_graph());
                    positions.push(position);
                    results.push(None);
                }
                Err(err) => results.push(Some(Err(Error::InvalidStructure {
                    position,
                    message: err.to_string(),
                }))),
            }
        }

        let embedded = self.orchestrator.embed_graphs_each(&graphs, mode);
        for (local, result) in embedded.into_iter().enumerate() {
            let position = positions[local];
            results[position] = Some(result.map_err(|err| reposition(err, position)));
        }

        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(Error::config("structure was not embedded"))))
            .collect()
    }
}

fn reposition(err: Error, position: usize) -> Error {
    match err {
        Error::EmbeddingFailure { id, message, .. } => Error::EmbeddingFailure {
            position,
            id,
            message,
        },
        other => other,
    }
}

fn first_vector(
    position: usize,
    raw: &str,
    embeddings: Vec<Embedding>,
    mode: EmbedMode,
) -> Result<Vec<f32>> {
    match embeddings.into_iter().next() {
        Some(Embedding::Whole(vector)) | Some(Embedding::Window { vector, .. }) => Ok(vector),
        _ => {
            let window = match mode {
                EmbedMode::Windowed(config) => config.length,
                EmbedMode::Whole => 0,
            };
            Err(Error::TooShort {
                position,
                length: raw.trim().chars().count(),
                window,
            })
        }
    }
}
