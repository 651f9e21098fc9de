// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structure encoder interface and implementations.
//!
//! The neural model lives outside this crate. It is reached through the
//! [`StructureEncoder`] capability: a whole-structure vector, per-node
//! vectors, and a pooling step that turns a subset of node vectors into one
//! window vector.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::structure::StructureGraph;

pub const DEFAULT_MODEL_PATH: &str = "models/model_weights.pth";
pub const DEFAULT_ENCODER_COMMAND: &str = "rnasim-encoder";
pub const DEFAULT_DUMMY_DIMENSION: usize = 64;

/// Settings for the command encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Shell command that serves encoder requests.
    pub command: String,
    /// Path to the model weights, forwarded to the command.
    pub model_path: String,
}

/// Capability interface to the structure model.
///
/// Implementations run inference only and never mutate model state, so a
/// single instance may be shared across threads.
pub trait StructureEncoder: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Embeds a whole structure.
    fn structure_to_vector(&self, graph: &StructureGraph) -> Result<Vec<f32>>;

    /// Embeds every node, in the graph's node order.
    fn structure_to_node_vectors(&self, graph: &StructureGraph) -> Result<Vec<Vec<f32>>>;

    /// Pools a subset of node vectors into one vector.
    fn pool(&self, node_vectors: &[&[f32]]) -> Result<Vec<f32>>;
}

/// Encoder that shells out to an external process.
///
/// Each call writes one JSON request to the command's stdin and reads one
/// JSON response from its stdout.
pub struct CommandEncoder {
    config: EncoderConfig,
}

impl CommandEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    fn graph_request(&self, op: &str, graph: &StructureGraph) -> Value {
        serde_json::json!({
            "model": self.config.model_path,
            "op": op,
            "structure": graph.notation(),
            "nodes": graph.nodes(),
            "edges": graph.edges(),
        })
    }

    fn run_command(&self, payload: &Value) -> Result<Value> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.config.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn encoder command: {}", self.config.command))?;

        // A command that exits before reading its input closes the pipe; its
        // exit status and stderr are reported instead of the write error.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(payload.to_string().as_bytes()),
            None => Ok(()),
        };

        let output = child
            .wait_with_output()
            .context("Failed to read encoder command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Encoder command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }
        written.context("Failed to write encoder request to stdin")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim())
            .with_context(|| "Failed to parse encoder command output as JSON")
    }
}

impl StructureEncoder for CommandEncoder {
    fn model_id(&self) -> &str {
        &self.config.model_path
    }

    fn structure_to_vector(&self, graph: &StructureGraph) -> Result<Vec<f32>> {
        let response = self.run_command(&self.graph_request("vector", graph))?;
        parse_row(field_or_self(&response, &["embedding", "vector"])?)
    }

    fn structure_to_node_vectors(&self, graph: &StructureGraph) -> Result<Vec<Vec<f32>>> {
        let response = self.run_command(&self.graph_request("nodes", graph))?;
        parse_rows(field_or_self(&response, &["node_embeddings", "embeddings"])?)
    }

    fn pool(&self, node_vectors: &[&[f32]]) -> Result<Vec<f32>> {
        let payload = serde_json::json!({
            "model": self.config.model_path,
            "op": "pool",
            "node_embeddings": node_vectors,
        });
        let response = self.run_command(&payload)?;
        parse_row(field_or_self(&response, &["embedding", "vector"])?)
    }
}

/// Deterministic stand-in for the model (for testing/offline use).
///
/// Node vectors encode pairing state and relative position; pooling is a
/// mean followed by a fixed projection.
pub struct DummyEncoder {
    model: String,
    dimension: usize,
}

impl DummyEncoder {
    /// Creates a dummy encoder producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "dummy".to_string(),
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn node_vector(&self, graph: &StructureGraph, index: usize) -> Vec<f32> {
        let nodes = graph.nodes();
        let node = nodes[index];
        let n = nodes.len();

        let mut features = [0.0_f32; 5];
        match graph.partner(node) {
            None => features[0] = 1.0,
            Some(partner) if partner > node => features[1] = 1.0,
            Some(_) => features[2] = 1.0,
        }
        if n > 1 {
            features[3] = index as f32 / (n - 1) as f32;
        }
        if let Some(partner) = graph.partner(node) {
            features[4] = partner.abs_diff(node) as f32 / n as f32;
        }

        let mut vector = vec![0.0; self.dimension];
        for (slot, value) in vector.iter_mut().zip(features.iter()) {
            *slot = *value;
        }
        vector
    }

    fn projection(row: usize, col: usize) -> f32 {
        if row == col {
            1.0
        } else {
            ((row * 31 + col * 17) % 7) as f32 / 70.0
        }
    }
}

impl StructureEncoder for DummyEncoder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn structure_to_vector(&self, graph: &StructureGraph) -> Result<Vec<f32>> {
        let node_vectors = self.structure_to_node_vectors(graph)?;
        let views: Vec<&[f32]> = node_vectors.iter().map(Vec::as_slice).collect();
        self.pool(&views)
    }

    fn structure_to_node_vectors(&self, graph: &StructureGraph) -> Result<Vec<Vec<f32>>> {
        if graph.is_empty() {
            bail!("Graph has no nodes");
        }
        Ok((0..graph.len()).map(|i| self.node_vector(graph, i)).collect())
    }

    fn pool(&self, node_vectors: &[&[f32]]) -> Result<Vec<f32>> {
        if node_vectors.is_empty() {
            bail!("Cannot pool an empty node set");
        }

        let mut mean = vec![0.0_f32; self.dimension];
        for vector in node_vectors {
            if vector.len() != self.dimension {
                bail!(
                    "Node vector has {} components, expected {}",
                    vector.len(),
                    self.dimension
                );
            }
            for (acc, value) in mean.iter_mut().zip(vector.iter()) {
                *acc += value;
            }
        }
        let count = node_vectors.len() as f32;
        for value in mean.iter_mut() {
            *value /= count;
        }

        Ok((0..self.dimension)
            .map(|row| {
                mean.iter()
                    .enumerate()
                    .map(|(col, value)| Self::projection(row, col) * value)
                    .sum()
            })
            .collect())
    }
}

fn field_or_self<'a>(value: &'a Value, keys: &[&str]) -> Result<&'a Value> {
    match value {
        Value::Array(_) => Ok(value),
        Value::Object(obj) => keys
            .iter()
            .find_map(|key| obj.get(*key))
            .ok_or_else(|| anyhow::anyhow!("Encoder output missing '{}' field", keys[0])),
        _ => bail!("Encoder output must be JSON array or object"),
    }
}

fn parse_row(value: &Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Embedding must be an array"))?
        .iter()
        .map(|value| {
            value
                .as_f64()
                .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                .map(|v| v as f32)
        })
        .collect()
}

fn parse_rows(value: &Value) -> Result<Vec<Vec<f32>>> {
    value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Node embeddings must be an array"))?
        .iter()
        .map(parse_row)
        .collect()
}
