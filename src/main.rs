use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use cartwise::{Analysis, QueryMode, Recommendation, Result, RuleView, Settings, Summary};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transactions file, one comma separated basket per line (stdin when absent)
    input: Option<PathBuf>,

    /// Path to configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum support (overrides config file)
    #[arg(long)]
    min_support: Option<f64>,

    /// Product to recommend for
    #[arg(short, long)]
    item: Option<String>,

    /// Antecedent matching: exact or contains
    #[arg(short, long)]
    mode: Option<QueryMode>,
}

#[derive(Serialize)]
struct Report {
    summary: Summary,
    rules: Vec<RuleView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommendations: Option<Vec<Recommendation>>,
}

fn read_baskets(input: Option<&PathBuf>) -> Result<Vec<Vec<String>>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut baskets = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        baskets.push(line.split(',').map(str::to_owned).collect());
    }
    Ok(baskets)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cartwise=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(min_support) = args.min_support {
        settings.mining.min_support = min_support;
    }

    let baskets = read_baskets(args.input.as_ref())?;
    info!(baskets = baskets.len(), "transactions read");
    let analysis = Analysis::run(baskets, &settings)?;

    let recommendations = args.item.as_deref().map(|label| match args.mode {
        Some(mode) => analysis.recommend(label, mode),
        None => analysis.recommend_default(label),
    });
    let report = Report {
        summary: analysis.summary(),
        rules: analysis.rule_views(),
        recommendations,
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| cartwise::CartwiseError::Io(e.to_string()))?;
    println!("{json}");
    Ok(())
}
