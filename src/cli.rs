// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// rnasim - RNA secondary-structure similarity
///
/// Embeds dot-bracket structures with an external graph model, compares
/// them and ranks stored candidates by distance.
#[derive(Parser, Debug)]
#[command(name = "rnasim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Encoder provider (overrides config)
    #[arg(long, global = true, value_enum)]
    pub provider: Option<CliProvider>,

    /// Structures per batch (overrides config)
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Worker threads across structures (overrides config)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Encoder provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliProvider {
    /// External encoder command
    Command,
    /// Deterministic built-in stub
    Dummy,
}

/// Distance metric selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliMetric {
    Squared,
    Cosine,
}

/// Window options shared by embedding commands
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct WindowArgs {
    /// Embed fixed-length windows of L nodes instead of whole structures
    #[arg(short = 'L', long = "window")]
    pub window: Option<usize>,

    /// Include pairing partners outside a window's span
    #[arg(long)]
    pub keep_paired_neighbors: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed a structure (whole or windowed)
    Embed {
        /// Dot-bracket structure(s)
        #[arg(required = true)]
        structures: Vec<String>,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Compare one structure against one or more others
    Compare {
        /// Reference structure
        structure1: String,

        /// Structure(s) to compare against
        #[arg(required = true)]
        structure2: Vec<String>,

        /// Distance metric
        #[arg(long, value_enum)]
        metric: Option<CliMetric>,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Rank stored candidates by distance to a structure
    #[command(alias = "s")]
    Search {
        /// Query structure
        structure: String,

        /// Distance metric
        #[arg(long, value_enum)]
        metric: Option<CliMetric>,

        /// Maximum number of results
        #[arg(short = 'm', long = "limit")]
        limit: Option<usize>,

        /// Candidate store path
        #[arg(long)]
        store: Option<PathBuf>,

        /// Abort instead of skipping candidates with a different dimension
        #[arg(long)]
        strict: bool,

        /// Suppress the progress bar
        #[arg(short = 'q', long)]
        quiet: bool,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Embed a structure and add it to the candidate store
    Add {
        /// Record identifier
        #[arg(long)]
        id: String,

        /// Dot-bracket structure
        structure: String,

        /// Metadata as a JSON object
        #[arg(long)]
        meta: Option<String>,

        /// Candidate store path
        #[arg(long)]
        store: Option<PathBuf>,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Embed identifier-tagged structures from a JSON file
    BatchEmbed {
        /// JSON array of {"id": ..., "structure": ...}
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
