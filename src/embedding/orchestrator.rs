// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched embedding of structures.
//!
//! The orchestrator walks the inputs in batches, asks the encoder for either
//! one vector per structure or one pooled vector per window, and guarantees
//! that every input maps to exactly one non-empty result sequence in input
//! order.

use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::codec::format_vector;
use super::provider::StructureEncoder;
use super::window::{WindowConfig, WindowExtractor};
use crate::errors::{Error, Result};
use crate::structure::{Structure, StructureGraph};

/// Origin tag carried by the too-short sentinel in serialized form.
pub const TOO_SHORT_TAG: i64 = -1;

/// How structures are embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// One vector per structure.
    Whole,
    /// One pooled vector per window.
    Windowed(WindowConfig),
}

impl EmbedMode {
    /// Windowed mode when a length is given, whole otherwise.
    pub fn from_window(length: Option<usize>, keep_paired_neighbors: bool) -> Result<Self> {
        match length {
            Some(length) => Ok(EmbedMode::Windowed(WindowConfig::new(
                length,
                keep_paired_neighbors,
            )?)),
            None => Ok(EmbedMode::Whole),
        }
    }
}

/// Device the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// GPU-style device with its own execution queue. Work is submitted
    /// sequentially regardless of the worker count.
    Accelerator,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator => write!(f, "accelerator"),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" | "cuda" | "accelerator" => Ok(Device::Accelerator),
            other => Err(Error::config(format!("Unknown device: {}", other))),
        }
    }
}

/// One embedding produced for a structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
    /// Whole-structure vector.
    Whole(Vec<f32>),
    /// Pooled vector of the window starting at `start`.
    Window { start: usize, vector: Vec<f32> },
    /// The structure had no usable window.
    TooShort,
}

impl Embedding {
    /// `None` for whole-structure vectors, the window start for windows and
    /// [`TOO_SHORT_TAG`] for the sentinel.
    pub fn origin_tag(&self) -> Option<i64> {
        match self {
            Embedding::Whole(_) => None,
            Embedding::Window { start, .. } => Some(*start as i64),
            Embedding::TooShort => Some(TOO_SHORT_TAG),
        }
    }

    /// The vector, or `None` for the sentinel.
    pub fn vector(&self) -> Option<&[f32]> {
        match self {
            Embedding::Whole(vector) | Embedding::Window { vector, .. } => Some(vector),
            Embedding::TooShort => None,
        }
    }

    pub fn is_too_short(&self) -> bool {
        matches!(self, Embedding::TooShort)
    }

    /// Text form of the vector; empty for the sentinel.
    pub fn to_text(&self) -> String {
        self.vector().map(format_vector).unwrap_or_default()
    }

    /// Serializable `(origin, text)` pair.
    pub fn to_view(&self) -> EmbeddingView {
        EmbeddingView {
            window_start: self.origin_tag(),
            embedding: self.to_text(),
        }
    }
}

/// Interchange form of an [`Embedding`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingView {
    pub window_start: Option<i64>,
    pub embedding: String,
}

/// Everything the orchestrator needs, passed in explicitly.
#[derive(Clone)]
pub struct EmbeddingContext {
    encoder: Arc<dyn StructureEncoder>,
    device: Device,
    batch_size: usize,
    workers: usize,
}

impl EmbeddingContext {
    pub fn new(encoder: Arc<dyn StructureEncoder>) -> Self {
        Self {
            encoder,
            device: Device::Cpu,
            batch_size: 1,
            workers: 1,
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn encoder(&self) -> &dyn StructureEncoder {
        self.encoder.as_ref()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl fmt::Debug for EmbeddingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingContext")
            .field("model", &self.encoder.model_id())
            .field("device", &self.device)
            .field("batch_size", &self.batch_size)
            .field("workers", &self.workers)
            .finish()
    }
}

/// Computes embeddings for batches of structures.
#[derive(Debug, Clone)]
pub struct EmbeddingOrchestrator {
    ctx: EmbeddingContext,
}

impl EmbeddingOrchestrator {
    /// Validates the context and creates an orchestrator.
    pub fn new(ctx: EmbeddingContext) -> Result<Self> {
        if ctx.batch_size == 0 {
            return Err(Error::config("batch size must be greater than 0"));
        }
        if ctx.workers == 0 {
            return Err(Error::config("worker count must be greater than 0"));
        }
        Ok(Self { ctx })
    }

    pub fn context(&self) -> &EmbeddingContext {
        &self.ctx
    }

    /// Embeds every structure, isolating failures per input.
    pub fn embed_each(
        &self,
        structures: &[Structure],
        mode: EmbedMode,
    ) -> Vec<Result<Vec<Embedding>>> {
        let graphs: Vec<StructureGraph> = structures.iter().map(Structure::to_graph).collect();
        self.embed_graphs_each(&graphs, mode)
    }

    /// All-or-nothing variant of [`embed_each`](Self::embed_each): the first
    /// failing input (by position) fails the call.
    pub fn embed_all(
        &self,
        structures: &[Structure],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<Embedding>>> {
        self.embed_each(structures, mode).into_iter().collect()
    }

    /// Embeds prepared graphs. Result `i` belongs to `graphs[i]`.
    pub fn embed_graphs_each(
        &self,
        graphs: &[StructureGraph],
        mode: EmbedMode,
    ) -> Vec<Result<Vec<Embedding>>> {
        let pool = self.worker_pool();
        let mut results = Vec::with_capacity(graphs.len());

        for (batch_index, batch) in graphs.chunks(self.ctx.batch_size).enumerate() {
            let offset = batch_index * self.ctx.batch_size;
            debug!(batch = batch_index, size = batch.len(), "embedding batch");

            let batch_results: Vec<Result<Vec<Embedding>>> = match &pool {
                Some(pool) => pool.install(|| {
                    batch
                        .par_iter()
                        .enumerate()
                        .map(|(i, graph)| self.embed_graph(offset + i, graph, mode))
                        .collect()
                }),
                None => batch
                    .iter()
                    .enumerate()
                    .map(|(i, graph)| self.embed_graph(offset + i, graph, mode))
                    .collect(),
            };
            results.extend(batch_results);
        }

        results
    }

    /// Embeds a single graph at input `position`.
    pub fn embed_graph(
        &self,
        position: usize,
        graph: &StructureGraph,
        mode: EmbedMode,
    ) -> Result<Vec<Embedding>> {
        let encoder = self.ctx.encoder();
        let failure = |err: anyhow::Error| Error::EmbeddingFailure {
            position,
            id: None,
            message: format!("{:#}", err),
        };

        match mode {
            EmbedMode::Whole => {
                let vector = encoder.structure_to_vector(graph).map_err(failure)?;
                if vector.is_empty() {
                    return Err(failure(anyhow::anyhow!("encoder returned an empty vector")));
                }
                Ok(vec![Embedding::Whole(vector)])
            }
            EmbedMode::Windowed(config) => {
                let windows = WindowExtractor::new(config).extract(graph);
                if windows.is_empty() {
                    debug!(
                        position,
                        nodes = graph.len(),
                        window = config.length,
                        "no usable windows"
                    );
                    return Ok(vec![Embedding::TooShort]);
                }

                let node_vectors = encoder
                    .structure_to_node_vectors(graph)
                    .map_err(failure)?;
                if node_vectors.len() != graph.len() {
                    return Err(failure(anyhow::anyhow!(
                        "encoder returned {} node vectors for {} nodes",
                        node_vectors.len(),
                        graph.len()
                    )));
                }

                let mut embeddings: Vec<Embedding> = Vec::with_capacity(windows.len());
                for window in &windows {
                    let subset: Vec<&[f32]> = window
                        .indices
                        .iter()
                        .map(|&i| node_vectors[i].as_slice())
                        .collect();
                    let vector = encoder.pool(&subset).map_err(failure)?;

                    if vector.is_empty() {
                        return Err(failure(anyhow::anyhow!(
                            "encoder pooled window {} into an empty vector",
                            window.start
                        )));
                    }
                    if let Some(Embedding::Window { vector: first, .. }) = embeddings.first() {
                        if first.len() != vector.len() {
                            return Err(failure(anyhow::anyhow!(
                                "encoder pooled window {} into {} components, expected {}",
                                window.start,
                                vector.len(),
                                first.len()
                            )));
                        }
                    }

                    embeddings.push(Embedding::Window {
                        start: window.start,
                        vector,
                    });
                }
                Ok(embeddings)
            }
        }
    }

    fn worker_pool(&self) -> Option<rayon::ThreadPool> {
        if self.ctx.workers <= 1 || self.ctx.device == Device::Accelerator {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.ctx.workers)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(err) => {
                warn!(
                    "Failed to start {} workers, embedding sequentially: {}",
                    self.ctx.workers, err
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::DummyEncoder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(batch_size: usize, workers: usize) -> EmbeddingOrchestrator {
        with_encoder(Arc::new(DummyEncoder::new(8)), batch_size, workers)
    }

    fn with_encoder(
        encoder: Arc<dyn StructureEncoder>,
        batch_size: usize,
        workers: usize,
    ) -> EmbeddingOrchestrator {
        let ctx = EmbeddingContext::new(encoder)
            .with_batch_size(batch_size)
            .with_workers(workers);
        EmbeddingOrchestrator::new(ctx).unwrap()
    }

    fn parse(items: &[&str]) -> Vec<Structure> {
        items.iter().map(|s| Structure::parse(s).unwrap()).collect()
    }

    fn windowed(length: usize, keep: bool) -> EmbedMode {
        EmbedMode::from_window(Some(length), keep).unwrap()
    }

    #[derive(Clone, Copy)]
    enum Fault {
        Crash,
        MissingNode,
        EmptyPool,
        RaggedPool,
    }

    /// Misbehaves on graphs with `on_len` nodes, delegates otherwise.
    struct FaultyEncoder {
        inner: DummyEncoder,
        fault: Fault,
        on_len: usize,
        pools: AtomicUsize,
    }

    impl FaultyEncoder {
        fn new(fault: Fault, on_len: usize) -> Arc<dyn StructureEncoder> {
            Arc::new(Self {
                inner: DummyEncoder::new(8),
                fault,
                on_len,
                pools: AtomicUsize::new(0),
            })
        }
    }

    impl StructureEncoder for FaultyEncoder {
        fn model_id(&self) -> &str {
            "faulty"
        }

        fn structure_to_vector(&self, graph: &StructureGraph) -> anyhow::Result<Vec<f32>> {
            self.inner.structure_to_vector(graph)
        }

        fn structure_to_node_vectors(
            &self,
            graph: &StructureGraph,
        ) -> anyhow::Result<Vec<Vec<f32>>> {
            let mut vectors = self.inner.structure_to_node_vectors(graph)?;
            if graph.len() == self.on_len {
                match self.fault {
                    Fault::Crash => anyhow::bail!("out of memory"),
                    Fault::MissingNode => {
                        vectors.pop();
                    }
                    Fault::EmptyPool | Fault::RaggedPool => {}
                }
            }
            Ok(vectors)
        }

        fn pool(&self, node_vectors: &[&[f32]]) -> anyhow::Result<Vec<f32>> {
            let mut vector = self.inner.pool(node_vectors)?;
            match self.fault {
                Fault::EmptyPool => vector.clear(),
                Fault::RaggedPool if self.pools.fetch_add(1, Ordering::SeqCst) > 0 => {
                    vector.pop();
                }
                _ => {}
            }
            Ok(vector)
        }
    }

    #[test]
    fn test_rejects_zero_batch_or_workers() {
        let encoder: Arc<dyn StructureEncoder> = Arc::new(DummyEncoder::new(4));
        let zero_batch = EmbeddingContext::new(encoder.clone()).with_batch_size(0);
        assert!(EmbeddingOrchestrator::new(zero_batch).is_err());
        let zero_workers = EmbeddingContext::new(encoder).with_workers(0);
        assert!(EmbeddingOrchestrator::new(zero_workers).is_err());
    }

    #[test]
    fn test_whole_mode() {
        let results = orchestrator(1, 1)
            .embed_all(&parse(&["(((...)))"]), EmbedMode::Whole)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 1);
        assert_eq!(results[0][0].origin_tag(), None);
        assert_eq!(results[0][0].vector().unwrap().len(), 8);
    }

    #[test]
    fn test_windowed_mode_tags_starts() {
        let results = orchestrator(2, 1)
            .embed_all(&parse(&["((....))"]), windowed(4, false))
            .unwrap();
        let tags: Vec<Option<i64>> = results[0].iter().map(Embedding::origin_tag).collect();
        assert_eq!(tags, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_too_short_sentinel() {
        let results = orchestrator(1, 1)
            .embed_all(&parse(&["....."]), windowed(10, true))
            .unwrap();
        assert_eq!(results, vec![vec![Embedding::TooShort]]);
        let view = results[0][0].to_view();
        assert_eq!(view.window_start, Some(-1));
        assert_eq!(view.embedding, "");
    }

    #[test]
    fn test_all_windows_dropped_yields_sentinel() {
        // Every window pulls in a partner that is not a node of the graph.
        let graph = StructureGraph::from_parts(None, vec![0, 1, 2], &[(0, 10), (2, 11)]);
        let results = orchestrator(1, 2).embed_graphs_each(&[graph], windowed(2, true));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &vec![Embedding::TooShort]);
    }

    #[test]
    fn test_order_is_independent_of_batching_and_workers() {
        let inputs = parse(&[
            "((..))",
            "......",
            "(.)",
            "((((....))))",
            ".(.).",
            "[[..]]..",
            "..",
            "(...)",
        ]);
        for mode in [EmbedMode::Whole, windowed(3, false), windowed(3, true)] {
            let baseline = orchestrator(1, 1).embed_all(&inputs, mode).unwrap();
            for (batch, workers) in [(3, 1), (3, 4), (8, 2), (100, 3)] {
                let results = orchestrator(batch, workers).embed_all(&inputs, mode).unwrap();
                assert_eq!(
                    results, baseline,
                    "mode={:?} batch={} workers={}",
                    mode, batch, workers
                );
            }
        }
    }

    #[test]
    fn test_missing_node_vector_is_failure_at_position() {
        let orchestrator = with_encoder(FaultyEncoder::new(Fault::MissingNode, 3), 2, 3);
        let inputs = parse(&["((..))", "....", "(.)", "(..)"]);
        let results = orchestrator.embed_each(&inputs, windowed(2, false));

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        match &results[2] {
            Err(Error::EmbeddingFailure { position, message, .. }) => {
                assert_eq!(*position, 2);
                assert!(message.contains("2 node vectors for 3 nodes"), "{}", message);
            }
            other => panic!("expected an embedding failure, got {:?}", other),
        }
        assert!(results[3].is_ok());
    }

    #[test]
    fn test_windowed_crash_is_isolated() {
        let orchestrator = with_encoder(FaultyEncoder::new(Fault::Crash, 6), 3, 2);
        let inputs = parse(&["(....)", "((..))..", "......", "(((...)))"]);
        let results = orchestrator.embed_each(&inputs, windowed(4, true));

        assert!(matches!(
            results[0],
            Err(Error::EmbeddingFailure { position: 0, .. })
        ));
        assert!(results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(Error::EmbeddingFailure { position: 2, .. })
        ));
        assert!(results[3].is_ok());
        assert!(orchestrator.embed_all(&inputs, windowed(4, true)).is_err());
    }

    #[test]
    fn test_empty_pooled_vector_is_failure() {
        let orchestrator = with_encoder(FaultyEncoder::new(Fault::EmptyPool, 0), 1, 1);
        let results = orchestrator.embed_each(&parse(&["((..))"]), windowed(3, false));
        assert!(matches!(
            results[0],
            Err(Error::EmbeddingFailure { position: 0, .. })
        ));
    }

    #[test]
    fn test_inconsistent_window_dimensions_are_failure() {
        let orchestrator = with_encoder(FaultyEncoder::new(Fault::RaggedPool, 0), 1, 1);
        let results = orchestrator.embed_each(&parse(&["((..))"]), windowed(3, false));
        match &results[0] {
            Err(Error::EmbeddingFailure { message, .. }) => {
                assert!(message.contains("7 components, expected 8"), "{}", message);
            }
            other => panic!("expected an embedding failure, got {:?}", other),
        }
    }

    #[test]
    fn test_accelerator_ignores_workers() {
        let ctx = EmbeddingContext::new(Arc::new(DummyEncoder::new(4)))
            .with_device(Device::Accelerator)
            .with_workers(4);
        let orchestrator = EmbeddingOrchestrator::new(ctx).unwrap();
        assert!(orchestrator.worker_pool().is_none());
    }

    #[test]
    fn test_device_parsing() {
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Accelerator);
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert!("tpu-9000".parse::<Device>().is_err());
    }
}
