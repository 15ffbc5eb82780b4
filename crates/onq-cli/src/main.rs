use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use onq_core::Level;
use onq_runner::{Config, Pipeline, RunOptions};

#[derive(Parser)]
#[command(name = "onq", version, about = "ONIX metadata validation and scoring")]
struct Cli {
    /// Path to onq.toml; defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Resource root override (production/, fallback/, codelists.json).
    #[arg(long, global = true)]
    resources: Option<PathBuf>,

    /// Emit the full report as JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the validation stages over an ONIX file
    Validate { file: PathBuf },

    /// Validation plus the completeness score
    Score { file: PathBuf },

    /// Validation plus retailer compatibility comparison
    Retailers {
        file: PathBuf,
        /// Profile keys to evaluate; all known profiles when omitted
        #[arg(long)]
        retailer: Vec<String>,
    },

    /// Look up a codelist, or one code within it
    Codelist { list: String, code: Option<String> },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::default_for(&std::env::current_dir()?.join("resources")),
    };
    if let Some(root) = &cli.resources {
        config.resources.root = root.clone();
    }
    let pipeline = Pipeline::new(&config);

    match cli.cmd {
        Command::Validate { file } => {
            let report = pipeline.run_file(&file, &RunOptions::default())?;
            render(&report, cli.json)?;
        }
        Command::Score { file } => {
            let options = RunOptions { completeness: true, retailers: None };
            let report = pipeline.run_file(&file, &options)?;
            render(&report, cli.json)?;
        }
        Command::Retailers { file, retailer } => {
            let options = RunOptions { completeness: false, retailers: Some(retailer) };
            let report = pipeline.run_file(&file, &options)?;
            render(&report, cli.json)?;
        }
        Command::Codelist { list, code } => {
            let registry = pipeline.registry();
            match code {
                Some(code) => match registry.describe(&list, &code) {
                    Some(description) => println!("{}: {}", code, description),
                    None if registry.has_list(&list) => {
                        println!("{}: not found in list {}", code, list)
                    }
                    None => println!("list {} is not modeled; codes pass by convention", list),
                },
                None => {
                    let table = registry.table(&list);
                    if table.is_empty() {
                        println!("list {} is empty or not modeled", list);
                    }
                    for (code, description) in table {
                        println!("{}\t{}", code, description);
                    }
                }
            }
        }
    }
    Ok(())
}

fn render(report: &onq_runner::RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{}: variant={:?} recognized={}",
        report.document_name, report.variant, report.recognized
    );
    for f in &report.findings {
        let level = match f.level {
            Level::Error => "ERROR",
            Level::Warning => "WARNING",
            Level::Info => "INFO",
        };
        println!("  {:>4}  {:<7} {:<18} {}", f.line, level, f.domain, f.message);
    }
    if let Some(completeness) = &report.completeness {
        println!(
            "completeness: {:.1} (min {:.1}, max {:.1}) over {} product(s)",
            completeness.overall_score,
            completeness.min_score,
            completeness.max_score,
            completeness.products_count
        );
        if !completeness.missing_fields.is_empty() {
            println!("  missing: {}", completeness.missing_fields.join(", "));
        }
        println!("  {}", completeness.recommendation);
    }
    if let Some(cmp) = &report.retailer_comparison {
        println!(
            "retailers: avg {:.1}, best {} ({:.1}), worst {} ({:.1})",
            cmp.average_score,
            cmp.best_fit_retailer,
            cmp.best_fit_score,
            cmp.worst_fit_retailer,
            cmp.worst_fit_score
        );
        for (key, detail) in &cmp.details {
            println!(
                "  {:<14} {:>5.1}  risk={:?}  missing critical: {}",
                key,
                detail.overall_score,
                detail.risk_level,
                if detail.critical_missing.is_empty() {
                    "none".to_string()
                } else {
                    detail.critical_missing.join(", ")
                }
            );
        }
        println!("  {}", cmp.recommendation);
    }
    Ok(())
}
