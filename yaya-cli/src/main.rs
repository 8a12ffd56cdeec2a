//! YAYA - Yet Another Yara Automaton
//!
//! Keeps a catalog of open source YARA rulesets in sync with upstream and
//! scans files with the enabled rules.

use anyhow::Result;
use clap::{error::ErrorKind, Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use yaya_core::app::ruleset_name_from_source;
use yaya_core::{
    EditCommand, EditTarget, UpdateOptions, UpdateSummary, Yaya, YayaConfig, YayaError, YayaPaths,
};

mod catalog_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "yaya",
    about = "YAYA - Yet Another Yara Automaton: curate open source YARA rulesets and scan with them",
    version,
    arg_required_else_help = true
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    json_logs: bool,

    /// Override the YAYA home directory (default $YAYA_HOME, then ~/.yaya)
    #[clap(long, global = true)]
    home: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Fetch the source index, update every enabled ruleset and rediscover rules
    Update {
        /// Only synchronize rulesets already in the catalog
        #[clap(long)]
        skip_index: bool,
    },

    /// Enable or disable rulesets, or the rules of one ruleset
    Edit {
        /// Edit the rules of this ruleset instead of the rulesets
        #[clap(long, value_name = "RULESET_ID")]
        rules: Option<i64>,

        /// Ids to toggle (prompted for when omitted)
        ids: Vec<String>,
    },

    /// Add a custom ruleset from a git URL or local repository path ending in .git
    Add {
        /// Repository to add
        source: String,
    },

    /// Scan a file or directory with every enabled rule
    Scan {
        /// File or directory to scan
        path: PathBuf,

        /// Where to write the JSON report (defaults to the configured report path)
        #[clap(long)]
        report: Option<PathBuf>,
    },

    /// Export all enabled rules into one source file
    Export {
        /// Output file
        path: PathBuf,
    },

    /// Export all enabled rules as one precompiled rules file
    ExportCompiled {
        /// Output file
        path: PathBuf,
    },

    /// Print the catalog
    List {
        /// List the rules of this ruleset
        #[clap(long, value_name = "RULESET_ID")]
        rules: Option<i64>,

        /// Output as JSON
        #[clap(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    initialize_tracing(&cli.log_level, cli.json_logs);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_env("YAYA_LOG")
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    // Logs go to stderr; stdout carries reports and listings
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Reject bad input before the catalog is opened or anything is fetched
fn validate_input(command: &Command) -> Result<Option<EditCommand>> {
    match command {
        Command::Add { source } => {
            ruleset_name_from_source(source)?;
        }
        Command::Edit { rules, ids } => {
            let target = if rules.is_some() {
                EditTarget::Rules
            } else {
                EditTarget::Rulesets
            };
            return Ok(Some(EditCommand::parse(target, &ids.join(" "))?));
        }
        Command::Scan { path, .. } => {
            if !path.exists() {
                return Err(YayaError::MissingTarget(path.clone()).into());
            }
        }
        _ => {}
    }
    Ok(None)
}

async fn run(cli: Cli) -> Result<()> {
    let edit = validate_input(&cli.command)?;

    let paths = YayaPaths::discover(cli.home)?;
    let config = YayaConfig::load(&paths)?;
    debug!("Using YAYA home {}", paths.root.display());

    let yaya = Yaya::open(paths, config)?;

    if yaya.is_first_run()? {
        println!("First run: setting up the ruleset catalog. This may take a while.");
        let summary = yaya.bootstrap().await?;
        print_update_summary(&summary);
        println!("Catalog ready. Run the command again to continue.");
        return Ok(());
    }

    match cli.command {
        Command::Update { skip_index } => {
            let summary = yaya
                .update(UpdateOptions {
                    fetch_index: !skip_index,
                })
                .await?;
            print_update_summary(&summary);
        }
        Command::Edit { rules, .. } => {
            let command =
                edit.unwrap_or_else(|| EditCommand::new(EditTarget::Rulesets, Vec::new()));
            catalog_cli::edit_command(&yaya, rules, command)?;
        }
        Command::Add { source } => {
            let summary = yaya.add(&source).await?;
            if let Some(failure) = summary.sync.failed.first() {
                println!("Could not fetch {}: {}", source, failure.error);
            }
            println!(
                "Added ruleset '{}' (id {}): {} rules, {} disabled",
                summary.ruleset.name,
                summary.ruleset.id,
                summary.discovery.rules_found,
                summary.discovery.rules_disabled
            );
        }
        Command::Scan { path, report } => {
            let outcome = yaya.scan(&path).await?;
            print!("{}", outcome.report.render_text());

            let report_path = report.unwrap_or_else(|| yaya.config().report_path.clone());
            outcome.report.write_json(&report_path)?;
            info!("Report written to {}", report_path.display());

            println!(
                "\nScanned {} files with {} rulesets ({} failed to compile): {} matches",
                outcome.summary.files,
                outcome.summary.rulesets_scanned,
                outcome.summary.rulesets_failed,
                outcome.summary.matches
            );
            println!("Report: {}", report_path.display());
        }
        Command::Export { path } => {
            let count = yaya.export_plain(&path)?;
            println!("Exported {} rules to {}", count, path.display());
        }
        Command::ExportCompiled { path } => {
            let count = yaya.export_compiled(&path)?;
            println!("Exported {} compiled rules to {}", count, path.display());
        }
        Command::List { rules, json } => catalog_cli::list_command(&yaya, rules, json)?,
    }

    Ok(())
}

fn print_update_summary(summary: &UpdateSummary) {
    if let Some(fetched) = summary.fetched {
        println!("Source index: {fetched} rulesets");
    }
    println!(
        "Working copies: {} cloned, {} updated, {} failed",
        summary.sync.cloned.len(),
        summary.sync.pulled.len(),
        summary.sync.failed.len()
    );
    for failure in &summary.sync.failed {
        println!("  - {}: {}", failure.ruleset, failure.error);
    }

    let discovery = &summary.discovery;
    println!(
        "Rules: {} found, {} disabled (failed to compile), {} retired",
        discovery.rules_found, discovery.rules_disabled, discovery.rules_pruned
    );
    if !discovery.quarantined.is_empty() {
        println!(
            "Disabled rulesets without a working copy: {}",
            discovery.quarantined.join(", ")
        );
    }
}
