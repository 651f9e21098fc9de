// SPDX-License-Identifier: MIT OR Apache-2.0

//! rnasim - RNA secondary-structure similarity
//!
//! Embeds dot-bracket structures through a graph model, compares them with
//! squared or cosine distance and ranks stored candidates.

mod cli;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, CliMetric, CliProvider, Commands, OutputFormat, WindowArgs};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use rnasim::config::{Config, EncoderProviderType, MismatchPolicy};
use rnasim::embedding::{CandidateStore, EmbedMode, Embedding};
use rnasim::output::{
    colorize_dim, colorize_distance, colorize_error, colorize_id, colorize_tag, use_colors,
    window_label,
};
use rnasim::utils::default_store_path;
use rnasim::{
    CompareOutcome, Metric, QueryOptions, SimilarityService, StructureInput, TaggedStructure,
};

fn main() -> Result<()> {
    // Initialize tracing with RNASIM_LOG env var (e.g., RNASIM_LOG=debug rnasim search "(((...)))")
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("RNASIM_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "rnasim", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    let service = SimilarityService::from_config(&config).context("Failed to set up the encoder")?;
    let defaults = QueryOptions::from_config(&config)?;

    match cli.command {
        Commands::Embed { structures, window } => {
            let mode = embed_mode(&config, window)?;
            let input = if structures.len() == 1 {
                StructureInput::Single(structures[0].clone())
            } else {
                StructureInput::Many(structures.clone())
            };
            let results = service.embed(input, mode);
            let mut failed = false;
            let mut json_items = Vec::with_capacity(results.len());
            for (structure, result) in structures.iter().zip(results) {
                match result {
                    Ok(embeddings) => {
                        if format == OutputFormat::Json {
                            let views: Vec<_> = embeddings.iter().map(Embedding::to_view).collect();
                            json_items.push(json!({
                                "structure": structure,
                                "embeddings": views,
                            }));
                        } else {
                            print_embeddings(structure, &embeddings);
                        }
                    }
                    Err(err) => {
                        failed = true;
                        if format == OutputFormat::Json {
                            json_items.push(json!({
                                "structure": structure,
                                "error": err.to_string(),
                            }));
                        } else {
                            eprintln!("{}", colorize_error(&err.to_string(), use_colors()));
                        }
                    }
                }
            }
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&json_items)?);
            }
            if failed {
                anyhow::bail!("One or more structures failed to embed");
            }
        }

        Commands::Compare {
            structure1,
            structure2,
            metric,
            window,
        } => {
            let options = defaults
                .with_metric(metric.map(to_metric).unwrap_or(defaults.metric))
                .with_mode(embed_mode(&config, window)?);
            let input = if structure2.len() == 1 {
                StructureInput::Single(structure2[0].clone())
            } else {
                StructureInput::Many(structure2.clone())
            };
            let outcome = service.compare(&structure1, input, &options)?;
            match format {
                OutputFormat::Json => {
                    let output = json!({ "metric": options.metric, "distance": outcome });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    let use_color = use_colors();
                    let distances = match outcome {
                        CompareOutcome::Single(d) => vec![d],
                        CompareOutcome::Many(ds) => ds,
                    };
                    for (structure, distance) in structure2.iter().zip(distances) {
                        println!("{}\t{}", colorize_distance(distance, use_color), structure);
                    }
                }
            }
        }

        Commands::Search {
            structure,
            metric,
            limit,
            store,
            strict,
            quiet,
            window,
        } => {
            let mut options = defaults
                .with_metric(metric.map(to_metric).unwrap_or(defaults.metric))
                .with_mode(embed_mode(&config, window)?)
                .with_top_k(limit.unwrap_or(defaults.top_k));
            if strict {
                options.on_mismatch = MismatchPolicy::Abort;
            }
            options.progress = !quiet && format == OutputFormat::Text;

            let store = open_store(store.as_deref(), &config)?;
            let ranked = service.search_store(&structure, &store, &options)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ranked)?),
                OutputFormat::Text => {
                    let use_color = use_colors();
                    if ranked.results.is_empty() && !quiet {
                        eprintln!("No candidates found");
                    }
                    for (rank, hit) in ranked.results.iter().enumerate() {
                        let tag = window_label(hit.candidate.window_start.map(|s| s as i64));
                        println!(
                            "{:>3}. {} {} {} {}",
                            rank + 1,
                            colorize_distance(hit.distance, use_color),
                            colorize_id(&hit.candidate.id, use_color),
                            colorize_tag(&tag, use_color),
                            colorize_dim(&hit.candidate.metadata.to_string(), use_color),
                        );
                    }
                }
            }
        }

        Commands::Add {
            id,
            structure,
            meta,
            store,
            window,
        } => {
            let metadata: Value = match meta {
                Some(raw) => serde_json::from_str(&raw).context("--meta must be valid JSON")?,
                None => Value::Object(Default::default()),
            };
            let mode = embed_mode(&config, window)?;
            let mut store = open_store(store.as_deref(), &config)?;
            let written = service.add_to_store(&mut store, &id, &structure, metadata, mode)?;
            match format {
                OutputFormat::Json => {
                    let summary = json!({ "id": id, "stored": written });
                    println!("{}", serde_json::to_string_pretty(&summary)?)
                }
                OutputFormat::Text => println!("Stored {} embedding(s) for {}", written, id),
            }
        }

        Commands::BatchEmbed { input, window } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let items: Vec<TaggedStructure> = serde_json::from_str(&raw).with_context(|| {
                format!("{} is not a JSON array of {{id, structure}}", input.display())
            })?;
            let mode = embed_mode(&config, window)?;

            let mut output = Vec::with_capacity(items.len());
            for tagged in service.batch_embed(&items, mode) {
                match tagged.embeddings {
                    Ok(embeddings) => output.push(json!({
                        "id": tagged.id,
                        "embeddings": embeddings.iter().map(Embedding::to_view).collect::<Vec<_>>(),
                    })),
                    Err(err) => output.push(json!({ "id": tagged.id, "error": err.to_string() })),
                }
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(provider) = cli.provider {
        config.model.provider = Some(match provider {
            CliProvider::Command => EncoderProviderType::Command,
            CliProvider::Dummy => EncoderProviderType::Dummy,
        });
    }
    if let Some(batch_size) = cli.batch_size {
        config.embedding.batch_size = Some(batch_size);
    }
    if let Some(workers) = cli.workers {
        config.embedding.workers = Some(workers);
    }
}

fn embed_mode(config: &Config, args: WindowArgs) -> rnasim::Result<EmbedMode> {
    let length = args.window.or(config.embedding().window_length());
    let keep = args.keep_paired_neighbors || config.embedding().keep_paired_neighbors();
    EmbedMode::from_window(length, keep)
}

fn to_metric(metric: CliMetric) -> Metric {
    match metric {
        CliMetric::Squared => Metric::Squared,
        CliMetric::Cosine => Metric::Cosine,
    }
}

fn open_store(explicit: Option<&Path>, config: &Config) -> Result<CandidateStore> {
    let path: PathBuf = match explicit.or(config.store().path()) {
        Some(path) => path.to_path_buf(),
        None => default_store_path(&std::env::current_dir()?),
    };
    CandidateStore::open(&path).with_context(|| format!("Failed to open store {}", path.display()))
}

fn print_embeddings(structure: &str, embeddings: &[Embedding]) {
    let use_color = use_colors();
    println!("{}", colorize_id(structure, use_color));
    for embedding in embeddings {
        println!(
            "  {}\t{}",
            colorize_tag(&window_label(embedding.origin_tag()), use_color),
            embedding.to_text()
        );
    }
}
