//! Command-line interface for elrover.
//!
//! Provides commands for combining service results, inspecting the active
//! ranking and configuration, and replaying decision logs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{load_config, ResolvedConfig, SettingsOverrides};
use crate::core::{ClusterMode, MentionSelection};
use crate::io::{service_from_filename, ClusterRecord, DecisionLog, TsvResultFile};
use crate::runner::CombineRun;

/// elrover - ROVER-style combination of entity-linking annotations
#[derive(Parser, Debug)]
#[command(name = "elrover")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .elrover/config.yaml, then built-in settings)
    #[arg(long, global = true, env = "ELROVER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Combine per-service result files
    Combine {
        /// Result file for a service, as SERVICE=PATH (repeatable)
        #[arg(short, long = "input", value_parser = parse_input)]
        inputs: Vec<(String, PathBuf)>,

        /// Glob of result files; services are read from file names
        #[arg(long)]
        results_glob: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "elrover-out")]
        out: PathBuf,

        /// Prefix for neleval exports
        #[arg(long)]
        prefix: Option<String>,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Drop rows below each service's minimum confidence
        #[arg(long)]
        use_confidence: bool,

        /// Also write per-service neleval exports
        #[arg(long)]
        dump_individual: bool,
    },

    /// Show the ranking for a scheme and evaluation mode
    Ranks {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Show resolved configuration
    Config,

    /// Replay a decision log in group dump layout
    Show {
        /// Path to decisions.jsonl
        log: PathBuf,

        /// Only show this document
        #[arg(short, long)]
        document: Option<String>,
    },
}

/// Overrides shared by `combine` and `ranks`
#[derive(clap::Args, Debug, Default)]
pub struct SelectionArgs {
    /// Weighting scheme
    #[arg(long)]
    pub scheme: Option<String>,

    /// Evaluation mode (sam, wam, ent)
    #[arg(long)]
    pub eval_mode: Option<String>,

    /// Mention selection (longest, votes)
    #[arg(long)]
    pub mention_selection: Option<MentionSelection>,

    /// Clustering (components, chained, adjacent)
    #[arg(long)]
    pub clustering: Option<ClusterMode>,

    /// Rank spacer, overriding the scheme's value
    #[arg(long, allow_hyphen_values = true)]
    pub rank_spacer: Option<f64>,
}

impl SelectionArgs {
    fn overrides(&self, use_confidence: bool) -> SettingsOverrides {
        SettingsOverrides {
            scheme: self.scheme.clone(),
            eval_mode: self.eval_mode.clone(),
            mention_selection: self.mention_selection,
            clustering: self.clustering,
            rank_spacer: self.rank_spacer,
            use_confidence,
        }
    }
}

/// Parse SERVICE=PATH
fn parse_input(value: &str) -> Result<(String, PathBuf), String> {
    let (service, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected SERVICE=PATH, got '{}'", value))?;

    if service.trim().is_empty() || path.trim().is_empty() {
        return Err(format!("expected SERVICE=PATH, got '{}'", value));
    }
    Ok((service.trim().to_string(), PathBuf::from(path.trim())))
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;

        match self.command {
            Commands::Combine {
                inputs,
                results_glob,
                out,
                prefix,
                selection,
                use_confidence,
                dump_individual,
            } => {
                combine(
                    &config,
                    inputs,
                    results_glob.as_deref(),
                    out,
                    prefix,
                    &selection.overrides(use_confidence),
                    dump_individual,
                )
                .await
            }
            Commands::Ranks { selection } => show_ranks(&config, &selection.overrides(false)),
            Commands::Config => show_config(&config),
            Commands::Show { log, document } => show_decisions(log, document.as_deref()).await,
        }
    }
}

async fn combine(
    config: &ResolvedConfig,
    inputs: Vec<(String, PathBuf)>,
    results_glob: Option<&str>,
    out: PathBuf,
    prefix: Option<String>,
    overrides: &SettingsOverrides,
    dump_individual: bool,
) -> Result<()> {
    let settings = config.settings(overrides)?;

    // Config inputs first, then glob matches, then explicit --input
    let mut paths: BTreeMap<String, PathBuf> = config.input_paths();

    if let Some(pattern) = results_glob {
        let mut known: Vec<String> = settings.ranking.services().to_vec();
        known.extend(settings.linker_order.iter().cloned());

        for entry in glob::glob(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))? {
            let path = entry.context("Failed to read glob entry")?;
            match service_from_filename(&path, &known) {
                Some(service) => {
                    paths.insert(service, path);
                }
                None => tracing::warn!(path = %path.display(), "No known service in file name, skipping"),
            }
        }
    }

    paths.extend(inputs);

    if paths.is_empty() {
        bail!("No inputs given. Use --input SERVICE=PATH, --results-glob, or 'inputs' in the config file");
    }

    let sources = paths
        .into_iter()
        .map(|(service, path)| TsvResultFile::new(service, path))
        .collect();

    let prefix = prefix.unwrap_or_else(|| config.output_prefix().to_string());
    let run = CombineRun::new(sources, &out, prefix).with_individual_dumps(dump_individual);
    let manifest = run.execute(&settings).await?;

    eprintln!("\n[Run {} complete]", manifest.run_id);
    eprintln!("  Documents: {}", manifest.counts.documents);
    eprintln!("  Clusters:  {}", manifest.counts.clusters);
    eprintln!("  Selected:  {}", manifest.counts.selected);
    if manifest.counts.rejected > 0 {
        eprintln!("  Rejected:  {} (invalid spans)", manifest.counts.rejected);
    }
    eprintln!("  Output:    {}", out.display());

    Ok(())
}

fn show_ranks(config: &ResolvedConfig, overrides: &SettingsOverrides) -> Result<()> {
    let settings = config.settings(overrides)?;
    let ranking = &settings.ranking;

    println!("Scheme: {} ({})", settings.scheme, settings.eval_mode);
    println!();
    println!("{:<6} {:<14} {:<8}", "RANK", "SERVICE", "WEIGHT");
    println!("{}", "-".repeat(30));
    for service in ranking.services() {
        println!(
            "{:<6} {:<14} {:<8.3}",
            ranking.rank_of(service).unwrap_or_default(),
            service,
            ranking.weight_of(service).unwrap_or_default()
        );
    }
    println!();
    println!("Best service: {}", ranking.best_service());
    println!("Ceiling:      {:.3}", ranking.ceiling());
    println!("Rank spacer:  {}", ranking.rank_spacer());

    Ok(())
}

fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("elrover configuration");
    println!();
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (built-in defaults)"),
    }
    println!();

    let yaml = serde_yaml::to_string(&config.file).context("Failed to render configuration")?;
    println!("{}", yaml);

    Ok(())
}

async fn show_decisions(log: PathBuf, document: Option<&str>) -> Result<()> {
    let records = DecisionLog::new(&log).replay().await?;
    if records.is_empty() {
        println!("No decisions found in {}", log.display());
        return Ok(());
    }

    let mut by_document: BTreeMap<&str, Vec<&ClusterRecord>> = BTreeMap::new();
    for record in &records {
        if document.map_or(true, |d| d == record.document_id) {
            by_document.entry(record.document_id.as_str()).or_default().push(record);
        }
    }

    if by_document.is_empty() {
        bail!("Document not found in decision log: {}", document.unwrap_or_default());
    }

    for (document_id, mut clusters) in by_document {
        clusters.sort_by_key(|c| c.cluster_index);
        println!("==== {} {}", document_id, "=".repeat(48));
        for cluster in clusters {
            println!("{}", cluster.render());
        }
    }

    Ok(())
}
