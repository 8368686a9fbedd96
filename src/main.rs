use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod classify;
mod config;
mod io;
mod models;
mod normalize;
mod report;
mod score;

use crate::aggregate::CompetitionScope;
use crate::classify::HeuristicClassifier;
use crate::config::{EngagementSourceKind, ScanConfig};
use crate::models::{
    ClassifiedProduct, EngagementTable, NormalizedAd, RawAdRecord, ScoredProduct, TrendPoint,
};

#[derive(Parser)]
#[command(name = "gap-scanner")]
#[command(about = "Rank candidate products by market gap from ad, search and video signals", long_about = None)]
struct Cli {
    /// TOML config file (defaults to ./gap-scanner.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the canonical per-ad feature table
    Normalize {
        #[arg(long)]
        ads: PathBuf,
        #[arg(long, default_value = "normalized_ads.csv")]
        out: PathBuf,
        #[arg(long)]
        impressions_velocity: bool,
    },
    /// Score products and list the top gap opportunities
    Score {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "gap_report.md")]
        out: PathBuf,
    },
    /// Print the top rows of a previously exported gap csv
    Show {
        #[arg(long, default_value = "gap_opportunities.csv")]
        csv: PathBuf,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Ad archive export (JSON array or `{ "data": [...] }` page)
    #[arg(long)]
    ads: PathBuf,
    /// Search interest in long form: date,keyword,trend_score
    #[arg(long)]
    trends: Option<PathBuf>,
    /// Short-video engagement export
    #[arg(long)]
    engagement: Option<PathBuf>,
    /// Classification rows from an external classifier; the built-in
    /// heuristic runs when omitted
    #[arg(long)]
    classified: Option<PathBuf>,
    #[arg(long)]
    country: Option<String>,
    /// Average competition signals over ads mentioning each product only
    #[arg(long)]
    per_product_competition: bool,
    #[arg(long)]
    impressions_velocity: bool,
}

impl InputArgs {
    fn apply(&self, config: &mut ScanConfig) {
        if let Some(country) = &self.country {
            config.country = country.to_uppercase();
        }
        if self.per_product_competition {
            config.competition_scope = CompetitionScope::MentioningAds;
        }
        if self.impressions_velocity {
            config.engagement_source = EngagementSourceKind::ImpressionsMidpoint;
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = ScanConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Normalize {
            ads,
            out,
            impressions_velocity,
        } => {
            if impressions_velocity {
                config.engagement_source = EngagementSourceKind::ImpressionsMidpoint;
            }
            let records = io::load_raw_ads(&ads)?;
            let source = config.engagement_source.source();
            let normalized = normalize::normalize_ads(&records, Utc::now(), source.as_ref());
            let file = File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            io::write_normalized(BufWriter::new(file), &normalized)?;
            println!("Normalized {} ads into {}.", normalized.len(), out.display());
        }
        Commands::Score { inputs, limit, out } => {
            inputs.apply(&mut config);
            let limit = limit.unwrap_or(config.top_n);
            let (_, scored) = analyze(&inputs, &config)?;

            if scored.is_empty() {
                println!("No results to show yet. Try more keywords or a larger ad sample.");
                return Ok(());
            }

            println!("Top gap opportunities ({}):", config.country);
            for item in score::top(&scored, limit) {
                println!(
                    "- {} gap {:.2} (demand {:.2}, competition {:.2})",
                    item.signals.product, item.gap_score, item.demand_score, item.competition_score
                );
            }

            if let Some(out) = out {
                let file = File::create(&out)
                    .with_context(|| format!("failed to create {}", out.display()))?;
                report::write_gap_csv(BufWriter::new(file), &scored)?;
                println!("Exported {} products to {}.", scored.len(), out.display());
            }
        }
        Commands::Report { inputs, limit, out } => {
            inputs.apply(&mut config);
            let limit = limit.unwrap_or(config.top_n);
            let (ads, scored) = analyze(&inputs, &config)?;
            let report = report::build_report(&config.country, &ads, &scored, limit);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Show { csv, limit } => {
            let file = File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let rows = report::read_gap_csv(file)?;
            if rows.is_empty() {
                println!("No results to show yet.");
                return Ok(());
            }
            for row in rows.iter().take(limit.unwrap_or(config.top_n)) {
                println!(
                    "- {} gap {:.2} (demand {:.2}, competition {:.2})",
                    row.product, row.gap_score, row.demand_score, row.competition_score
                );
            }
        }
    }

    Ok(())
}

fn analyze(
    inputs: &InputArgs,
    config: &ScanConfig,
) -> anyhow::Result<(Vec<NormalizedAd>, Vec<ScoredProduct>)> {
    let records = io::load_raw_ads(&inputs.ads)?;
    let trends = io::load_trends(inputs.trends.as_deref())?;
    let engagement = io::load_engagement(inputs.engagement.as_deref())?;
    tracing::info!(
        ads = records.len(),
        trend_points = trends.len(),
        engagement_rows = engagement.rows.len(),
        country = %config.country,
        "loaded collector outputs"
    );

    let classified = match &inputs.classified {
        Some(path) => Some(io::load_classified(path)?),
        None => None,
    };

    Ok(run_pipeline(
        &records,
        &trends,
        &engagement,
        classified,
        config,
        Utc::now(),
    ))
}

/// Normalize, classify (unless rows were supplied), aggregate and rank.
fn run_pipeline(
    records: &[RawAdRecord],
    trends: &[TrendPoint],
    engagement: &EngagementTable,
    classified: Option<Vec<ClassifiedProduct>>,
    config: &ScanConfig,
    now: DateTime<Utc>,
) -> (Vec<NormalizedAd>, Vec<ScoredProduct>) {
    let source = config.engagement_source.source();
    let ads = normalize::normalize_ads(records, now, source.as_ref());

    let classified = classified.unwrap_or_else(|| {
        classify::classify_ads(&ads, &HeuristicClassifier, config.batch_size)
    });

    let signals = aggregate::aggregate_signals(
        &classified,
        &ads,
        trends,
        engagement,
        config.competition_scope,
    );
    let scored = score::score_products(&signals);
    tracing::info!(
        classified = classified.len(),
        products = scored.len(),
        "scored products"
    );

    (ads, scored)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gap_scanner=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
