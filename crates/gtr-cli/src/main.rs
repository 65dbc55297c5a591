use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use gtr_core::RadarConfig;
use gtr_digest::{build_digest, render_markdown, DigestOptions};
use gtr_rules::{Classifier, RuleSet};
use gtr_store::{find_catalog, load_catalog, merge_by_id, save_catalog, seed_records};
use gtr_views::{apply_filters, FilterCriteria};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gtr")]
#[command(about = "Grant & tender radar command-line interface")]
struct Cli {
    /// Radar configuration file (missing file means built-in defaults)
    #[arg(long, global = true, default_value = "config/radar.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the classification pass over a catalog and write it back
    Enrich {
        #[arg(long, default_value = "grants.json")]
        input: PathBuf,
        /// Output path (defaults to overwriting the input)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Replacement rule tables (YAML)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Print the weekly digest brief as markdown
    Digest {
        /// Catalog path (defaults to the conventional locations)
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long)]
        days: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        locality_only: bool,
    },
    /// Merge the starter listings into a catalog
    Seed {
        #[arg(long, default_value = "grants.json")]
        path: PathBuf,
    },
    /// Print catalog records matching the given criteria as JSON
    List {
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long = "type")]
        types: Vec<String>,
        #[arg(long)]
        jurisdiction: Vec<String>,
        #[arg(long)]
        audience: Vec<String>,
        #[arg(long)]
        discipline: Vec<String>,
        #[arg(long)]
        amount_min: Option<f64>,
        #[arg(long)]
        amount_max: Option<f64>,
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long)]
        locality_only: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = RadarConfig::load(&cli.config)?;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Enrich {
            input,
            output,
            rules,
        } => {
            let rule_set = match rules {
                Some(path) => RuleSet::from_yaml_file(&path)?,
                None => RuleSet::default(),
            };
            let classifier = Classifier::new(&rule_set, &config)?;
            let mut records = load_catalog(&input, today)?;
            classifier.classify_all(&mut records, today);
            let destination = output.unwrap_or(input);
            save_catalog(&destination, &records)?;
            println!("enriched {} records -> {}", records.len(), destination.display());
        }
        Commands::Digest {
            data,
            days,
            limit,
            locality_only,
        } => {
            let path = find_catalog(data.as_deref()).context("no catalog file found")?;
            let records = load_catalog(&path, today)?;
            let mut options = DigestOptions::from_config(&config);
            if let Some(days) = days {
                options.closing_window_days = days;
            }
            if let Some(limit) = limit {
                options.limit = limit;
            }
            options.locality_only = locality_only;
            let digest = build_digest(&records, &config, &options, today);
            info!(
                new_this_week = digest.new_this_week.len(),
                closing_soon = digest.closing_soon.len(),
                "digest built"
            );
            println!("{}", render_markdown(&digest));
        }
        Commands::Seed { path } => {
            let mut catalog = if path.exists() {
                load_catalog(&path, today)?
            } else {
                Vec::new()
            };
            let before = catalog.len();
            let added = merge_by_id(&mut catalog, seed_records(&config, today));
            save_catalog(&path, &catalog)?;
            println!(
                "added {added} seed records ({} -> {} total)",
                before,
                catalog.len()
            );
        }
        Commands::List {
            data,
            types,
            jurisdiction,
            audience,
            discipline,
            amount_min,
            amount_max,
            query,
            locality_only,
        } => {
            let path = find_catalog(data.as_deref()).context("no catalog file found")?;
            let records = load_catalog(&path, today)?;
            let criteria = FilterCriteria {
                types: to_set(types),
                jurisdictions: to_set(jurisdiction),
                audiences: to_set(audience),
                disciplines: to_set(discipline),
                amount_min,
                amount_max,
                text_query: query,
                locality_only,
            };
            let matched = apply_filters(&records, &criteria, &config.lga);
            println!("{}", serde_json::to_string_pretty(&matched)?);
        }
    }

    Ok(())
}

fn to_set(values: Vec<String>) -> BTreeSet<String> {
    values.into_iter().collect()
}
