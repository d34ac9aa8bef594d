// tally CLI - rule-driven entity reconciliation
// Exit codes: see exit_codes.rs

mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use tally_cli::exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Reconcile tabular sources against declared field rules")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run reconciliation from a TOML rule file (exit 0 = clean, exit 60 = findings)
    #[command(after_help = "\
Exit code 60 means the run proved a discrepancy: MISMATCH, MISSING_IN_TARGET, \
MISSING_IN_SOURCE, a duplicate key or a referential violation. NOT_VERIFIABLE and \
RULE_NOT_DEFINED are reported but only fail the run with --strict.

Examples:
  tally run mvh.toml
  tally run mvh.toml --json | jq '.report.summary'
  tally run mvh.toml --output result.json --markdown report.md
  tally run mvh.toml --entity site_costs --strict
  tally run mvh.toml --filter site_id=146 --filter vendor=Verizon")]
    Run {
        /// Path to the rule file
        config: PathBuf,

        /// Only reconcile the named entity. Repeatable.
        #[arg(long = "entity", value_name = "NAME")]
        entities: Vec<String>,

        /// Print the JSON report to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON report to a file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Write a Markdown report to a file
        #[arg(long, value_name = "FILE")]
        markdown: Option<PathBuf>,

        /// Only match records whose FIELD equals VALUE, in every entity.
        /// Repeat a field to accept several values.
        #[arg(long = "filter", value_name = "FIELD=VALUE", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        /// Treat NOT_VERIFIABLE, RULE_NOT_DEFINED and lower-severity integrity
        /// failures as findings
        #[arg(long)]
        strict: bool,
    },

    /// Validate a rule file without loading any data
    #[command(after_help = "\
Examples:
  tally validate mvh.toml")]
    Validate {
        /// Path to the rule file
        config: PathBuf,
    },

    /// List rule files in a directory and whether they are valid
    List {
        /// Directory to scan (default: current directory)
        dir: Option<PathBuf>,
    },

    /// Explain the six validation statuses
    Legend,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    let (field, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{s}'"))?;
    let (field, value) = (field.trim(), value.trim());
    if field.is_empty() || value.is_empty() {
        return Err(format!("expected FIELD=VALUE, got '{s}'"));
    }
    Ok((field.to_string(), value.to_string()))
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\nengine:  tally-recon ", env!("CARGO_PKG_VERSION"),
        "\nformat_version(json): 1.0",
    )
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        None => {
            // No subcommand = show usage
            eprintln!("Usage: tally <command> [options]");
            eprintln!("       tally --help for more information");
            Err(CliError { code: EXIT_USAGE, message: String::new(), hint: None })
        }
        Some(Commands::Run { config, entities, json, output, markdown, filters, strict }) => {
            recon::cmd_run(recon::RunArgs { config, entities, json, output, markdown, filters, strict })
        }
        Some(Commands::Validate { config }) => recon::cmd_validate(config),
        Some(Commands::List { dir }) => recon::cmd_list(dir),
        Some(Commands::Legend) => recon::cmd_legend(),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
