// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns structures into vectors
//!
//! This module covers the encoder capability, window extraction, batched
//! orchestration, the text form of vectors and the candidate store.

pub mod codec;
pub mod orchestrator;
pub mod provider;
pub mod storage;
pub mod window;

pub use codec::{format_vector, parse_vector, VECTOR_PRECISION};
pub use orchestrator::{
    Device, EmbedMode, Embedding, EmbeddingContext, EmbeddingOrchestrator, EmbeddingView,
    TOO_SHORT_TAG,
};
pub use provider::{
    CommandEncoder, DummyEncoder, EncoderConfig, StructureEncoder, DEFAULT_DUMMY_DIMENSION,
};
pub use storage::{CandidateRecord, CandidateStore};
pub use window::{Window, WindowConfig, WindowExtractor};
