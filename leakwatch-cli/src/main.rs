//! Leakwatch CLI - access log risk scoring

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output
// - Reports go to stdout; notices and logs go to stderr

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use leakwatch_core::aggregates::{AggregationResult, GroupValue};
use leakwatch_core::config::{self, ResolvedConfig};
use leakwatch_core::encoding::SourceEncoding;
use leakwatch_core::filter::FilterMode;
use leakwatch_core::report;
use leakwatch_core::scoring::ScoringMode;
use leakwatch_core::summary::{AlertLevel, Summary};
use leakwatch_core::{analyze, ingest_file, render_json, render_text, Analysis, Column, ScenarioId};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "leakwatch")]
#[command(about = "Risk scoring and aggregation for personal-data access logs")]
#[command(version = env!("LEAKWATCH_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a log file and show the filtered display set
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        /// Write the display set as CSV into this directory
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Headline metrics and alert level
    Summary {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Hourly mean risk and access counts
    Timeline {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Top employees by summed risk score or query length
    Top {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Records at or above the review threshold
    Review {
        #[command(flatten)]
        input: InputArgs,

        /// Minimum risk score (overrides config file)
        #[arg(long)]
        threshold: Option<u32>,
    },
    /// Validate or inspect a configuration file
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running analysis
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Source file and the flags shared by every analysis command
#[derive(Args)]
struct InputArgs {
    /// Access log file (CSV)
    file: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Active scenario (repeatable): immediate-review, bulk-query-suspect, night-access
    #[arg(long = "scenario")]
    scenarios: Vec<ScenarioId>,

    /// How active scenarios combine: any or single
    #[arg(long)]
    mode: Option<FilterMode>,

    /// Query length for the bulk-query scenario (100-1000)
    #[arg(long)]
    bulk_threshold: Option<u32>,

    /// Risk score needing immediate review
    #[arg(long)]
    high_risk_threshold: Option<u32>,

    /// Source encoding: utf-8, utf-8-sig or cp949
    #[arg(long)]
    encoding: Option<SourceEncoding>,

    /// Scoring strategy: auto, additive or legacy
    #[arg(long)]
    scoring: Option<ScoringMode>,

    /// Task category to keep (repeatable; default: all)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Number of employees in rankings
    #[arg(long)]
    top: Option<usize>,

    /// Path to config file (default: auto-discover)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { input, export } => {
            let resolved = resolve_config(&input)?;
            let (analysis, format) = run_analysis(&input, &resolved)?;

            match format {
                OutputFormat::Text => print!("{}", render_analysis_text(&analysis)),
                OutputFormat::Json => println!("{}", render_json(&analysis)?),
            }

            if let Some(dir) = export {
                let path = report::export_to_dir(
                    &dir,
                    &analysis.selection,
                    &analysis.records,
                    analysis.scoring,
                    resolved.ingest.encoding,
                    resolved.ingest.delimiter,
                )
                .context("failed to export display set")?;
                eprintln!("Exported {} rows to: {}", analysis.records.len(), path.display());
            }
        }
        Commands::Summary { input } => {
            let resolved = resolve_config(&input)?;
            let (analysis, format) = run_analysis(&input, &resolved)?;
            match format {
                OutputFormat::Text => print!("{}", render_summary_text(&analysis.summary)),
                OutputFormat::Json => println!("{}", render_json(&analysis.summary)?),
            }
        }
        Commands::Timeline { input } => {
            let resolved = resolve_config(&input)?;
            let (analysis, format) = run_analysis(&input, &resolved)?;
            match format {
                OutputFormat::Text => print!(
                    "{}",
                    render_timeline_text(&analysis.hourly_mean_risk, &analysis.hourly_access_counts)
                ),
                OutputFormat::Json => {
                    let timeline = Timeline {
                        hourly_mean_risk: &analysis.hourly_mean_risk,
                        hourly_access_counts: &analysis.hourly_access_counts,
                    };
                    println!("{}", render_json(&timeline)?);
                }
            }
        }
        Commands::Top { input } => {
            let resolved = resolve_config(&input)?;
            let (analysis, format) = run_analysis(&input, &resolved)?;
            match format {
                OutputFormat::Text => {
                    println!("Top employees by {}:", analysis.ranking_metric.as_str());
                    print!("{}", render_ranking_text(&analysis.top_employees));
                }
                OutputFormat::Json => println!("{}", render_json(&analysis.top_employees)?),
            }
        }
        Commands::Review { input, threshold } => {
            let mut resolved = resolve_config(&input)?;
            if let Some(t) = threshold {
                let mut effective = resolved.effective();
                effective.review_threshold = Some(t);
                effective.validate().context("invalid --threshold")?;
                resolved.review_threshold = t;
            }
            let (analysis, format) = run_analysis(&input, &resolved)?;
            match format {
                OutputFormat::Text => {
                    println!(
                        "Review report (risk_score >= {}): {} records",
                        resolved.review_threshold,
                        analysis.review.len()
                    );
                    print!("{}", render_text(&analysis.review, &[Column::RiskScore]));
                }
                OutputFormat::Json => println!("{}", render_json(&analysis.review)?),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let cwd = std::env::current_dir()?;
                match config::load_and_resolve(&cwd, path.as_deref()) {
                    Ok(resolved) => {
                        if let Some(ref p) = resolved.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let cwd = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&cwd, path.as_deref())
                    .context("failed to load configuration")?;
                print!("{}", render_config_text(&resolved));
            }
        },
    }

    Ok(())
}

/// Load config and apply CLI overrides (CLI flags win)
fn resolve_config(input: &InputArgs) -> anyhow::Result<ResolvedConfig> {
    let cwd = std::env::current_dir()?;
    let loaded = config::load_and_resolve(&cwd, input.config.as_deref())
        .context("failed to load configuration")?;

    if let Some(config_path) = &loaded.config_path {
        eprintln!("Using config: {}", config_path.display());
    }

    let mut effective = loaded.effective();
    if !input.scenarios.is_empty() {
        effective.active_scenarios = input.scenarios.clone();
    }
    if input.mode.is_some() {
        effective.filter_mode = input.mode;
    }
    if input.bulk_threshold.is_some() {
        effective.bulk_length_threshold = input.bulk_threshold;
    }
    if input.high_risk_threshold.is_some() {
        effective.high_risk_threshold = input.high_risk_threshold;
    }
    if let Some(encoding) = input.encoding {
        effective.encoding = Some(encoding.as_str().to_string());
    }
    if input.scoring.is_some() {
        effective.scoring = input.scoring;
    }
    if !input.categories.is_empty() {
        effective.categories = input.categories.clone();
    }
    if input.top.is_some() {
        effective.top_k = input.top;
    }

    let mut resolved = effective.resolve().context("invalid command-line options")?;
    resolved.config_path = loaded.config_path;
    log::info!("configuration from {}", config_source(&resolved));
    Ok(resolved)
}

fn run_analysis(
    input: &InputArgs,
    resolved: &ResolvedConfig,
) -> anyhow::Result<(Analysis, OutputFormat)> {
    let path = normalize_path(&input.file)?;
    log::info!(
        "reading {} as {} ({} scoring)",
        path.display(),
        resolved.ingest.encoding,
        resolved.ingest.scoring.as_str()
    );
    let dataset = ingest_file(&path, &resolved.ingest)?;
    let analysis = analyze(&dataset, resolved)?;
    Ok((analysis, input.format))
}

fn config_source(resolved: &ResolvedConfig) -> String {
    match &resolved.config_path {
        Some(path) => path.display().to_string(),
        None => "built-in defaults".to_string(),
    }
}

fn normalize_path(path: &Path) -> anyhow::Result<PathBuf> {
    let normalized = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };
    if !normalized.exists() {
        anyhow::bail!("Path does not exist: {}", normalized.display());
    }
    Ok(normalized)
}

#[derive(Serialize)]
struct Timeline<'a> {
    hourly_mean_risk: &'a AggregationResult<u8>,
    hourly_access_counts: &'a AggregationResult<u8>,
}

fn format_value(value: &GroupValue) -> String {
    match value {
        GroupValue::Value(v) => format!("{:.1}", v),
        GroupValue::NoData => "-".to_string(),
    }
}

fn render_summary_text(summary: &Summary) -> String {
    let status = match summary.alert {
        AlertLevel::Alert => "ALERT",
        AlertLevel::Clear => "OK",
    };
    format!(
        "Total logs:        {}\nImmediate review:  {}\nScraping suspects: {}\nNight access:      {}\n\n[{}] {}\n",
        summary.total,
        summary.immediate_review,
        summary.scraping_suspects,
        summary.night_access,
        status,
        summary.message
    )
}

fn render_timeline_text(mean: &AggregationResult<u8>, counts: &AggregationResult<u8>) -> String {
    let mut output = String::from("HOUR  MEAN_RISK  ACCESSES\n");
    for group in &mean.groups {
        let accesses = counts.get(&group.key).map_or(0, |g| g.count);
        output.push_str(&format!(
            "{:>4}  {:>9}  {:>8}\n",
            group.key,
            format_value(&group.value),
            accesses
        ));
    }
    output
}

fn render_ranking_text(ranking: &AggregationResult<String>) -> String {
    let mut output = String::new();
    for (idx, group) in ranking.groups.iter().enumerate() {
        output.push_str(&format!(
            "{:>2}. {:<14} {:>10}  ({} logs)\n",
            idx + 1,
            group.key,
            format_value(&group.value),
            group.count
        ));
    }
    if ranking.is_empty() {
        output.push_str("(no data)\n");
    }
    output
}

fn highlighted_columns(active: &[ScenarioId]) -> Vec<Column> {
    let mut columns: Vec<Column> = active
        .iter()
        .flat_map(|id| report::highlight_columns(*id).iter().copied())
        .collect();
    columns.sort();
    columns.dedup();
    columns
}

fn render_analysis_text(analysis: &Analysis) -> String {
    let mut output = render_summary_text(&analysis.summary);
    output.push('\n');
    output.push_str(&format!(
        "Selection: {}  |  {} records  |  sorted by {}  |  {} scoring\n",
        analysis.selection,
        analysis.records.len(),
        analysis.sort_key.as_str(),
        analysis.scoring.as_str()
    ));
    if analysis.ingest.rejected > 0 {
        output.push_str(&format!(
            "Dropped {} of {} rows without a usable employee id or hour\n",
            analysis.ingest.rejected, analysis.ingest.total_rows
        ));
    }
    output.push('\n');
    output.push_str(&render_text(
        &analysis.records,
        &highlighted_columns(&analysis.active_scenarios),
    ));
    output.push('\n');
    output.push_str(&format!(
        "Top employees by {}:\n",
        analysis.ranking_metric.as_str()
    ));
    output.push_str(&render_ranking_text(&analysis.top_employees));
    output
}

fn render_config_text(resolved: &ResolvedConfig) -> String {
    let mut output = String::from("Configuration:\n");
    match resolved.config_path {
        Some(ref p) => output.push_str(&format!("  Source: {}\n", p.display())),
        None => output.push_str("  Source: defaults (no config file found)\n"),
    }

    let filter = &resolved.filter;
    let active = if filter.active.is_empty() {
        "none (all records)".to_string()
    } else {
        filter
            .active
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    output.push_str("\nScenarios:\n");
    output.push_str(&format!("  active: {}\n", active));
    output.push_str(&format!("  mode: {}\n", filter.mode));
    output.push_str(&format!(
        "  high_risk_threshold: {}\n",
        filter.thresholds.high_risk
    ));
    output.push_str(&format!(
        "  bulk_length_threshold: {}\n",
        filter.thresholds.bulk_length
    ));

    output.push_str("\nReports:\n");
    output.push_str(&format!("  review_threshold: {}\n", resolved.review_threshold));
    output.push_str(&format!(
        "  scraping_metric_threshold: {}\n",
        resolved.scraping_metric_threshold
    ));
    output.push_str(&format!("  top_k: {}\n", resolved.top_k));
    output.push_str(&format!(
        "  categories: {}\n",
        if filter.categories.is_empty() {
            "all".to_string()
        } else {
            filter.categories.join(", ")
        }
    ));

    let ingest = &resolved.ingest;
    output.push_str("\nInput:\n");
    output.push_str(&format!("  encoding: {}\n", ingest.encoding));
    output.push_str(&format!("  delimiter: {:?}\n", ingest.delimiter as char));
    output.push_str(&format!("  scoring: {}\n", ingest.scoring.as_str()));
    output.push_str(&format!(
        "  night_shift_labels: {}\n",
        ingest.night_shift_labels.join(", ")
    ));
    output.push_str(&format!(
        "  mask_disabled_values: {}\n",
        ingest.mask_disabled_values.join(", ")
    ));
    output
}
