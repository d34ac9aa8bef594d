//! `tally run|validate|list|legend`: rule-file driven entity reconciliation.

use std::path::{Path, PathBuf};

use tally_cli::exit_codes::{
    recon_exit_code, EXIT_RECON_FINDINGS, EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME,
};
use tally_cli::render;
use tally_recon::load::load_source;
use tally_recon::model::ValidationStatus;
use tally_recon::{ReconConfig, ReconError, ReconInput};

use crate::CliError;

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn engine_err(err: ReconError) -> CliError {
    let code = recon_exit_code(&err);
    let err = recon_err(code, err.to_string());
    if code == EXIT_RECON_INVALID_CONFIG {
        err.with_hint("fix the rule file; `tally validate <CONFIG>` lists every issue")
    } else {
        err
    }
}

fn read_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        recon_err(EXIT_RECON_RUNTIME, format!("cannot read config {}: {e}", config_path.display()))
    })?;
    ReconConfig::from_toml(&config_str).map_err(engine_err)
}

/// Read every configured source, resolving file paths relative to the rule file.
fn load_sources(config: &ReconConfig, config_path: &Path) -> Result<ReconInput, CliError> {
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let mut input = ReconInput::new();
    for (id, source_config) in &config.sources {
        let path = base_dir.join(&source_config.file);
        let data = std::fs::read_to_string(&path).map_err(|e| {
            recon_err(EXIT_RECON_RUNTIME, format!("cannot read source '{id}' ({}): {e}", path.display()))
        })?;
        let source = load_source(id, &data, source_config).map_err(engine_err)?;
        tracing::info!(source = %id, rows = source.records.len(), file = %path.display(), "loaded source");
        input.insert(source);
    }
    Ok(input)
}

fn write_file(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

// ============================================================================
// run
// ============================================================================

pub struct RunArgs {
    pub config: PathBuf,
    pub entities: Vec<String>,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub markdown: Option<PathBuf>,
    pub filters: Vec<(String, String)>,
    pub strict: bool,
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let mut config = read_config(&args.config)?;
    config.retain_entities(&args.entities).map_err(engine_err)?;
    for (field, value) in args.filters {
        config.add_filter(field, value);
    }

    let input = load_sources(&config, &args.config)?;

    let report = tally_recon::run(&config, &input).map_err(engine_err)?;
    let generated_at = chrono::Utc::now();

    // Output
    if args.json || args.output.is_some() {
        let json_str = render::render_json(&report, generated_at)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;
        if let Some(ref path) = args.output {
            write_file(path, &json_str)?;
        }
        if args.json {
            println!("{json_str}");
        }
    }

    if let Some(ref path) = args.markdown {
        write_file(path, &render::render_markdown(&report, generated_at))?;
    }

    // Human summary to stderr
    for line in render::console_summary(&report) {
        eprintln!("{line}");
    }

    if report.has_findings(args.strict) {
        return Err(recon_err(EXIT_RECON_FINDINGS, "reconciliation findings present"));
    }
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "valid: recon '{}' with {} source(s), {} entit{}, {} integrity check(s)",
        config.name,
        config.sources.len(),
        config.entities.len(),
        if config.entities.len() == 1 { "y" } else { "ies" },
        config.integrity.len(),
    );
    Ok(())
}

// ============================================================================
// list
// ============================================================================

pub fn cmd_list(dir: Option<PathBuf>) -> Result<(), CliError> {
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    let entries = std::fs::read_dir(&dir)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read directory {}: {e}", dir.display())))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();

    if files.is_empty() {
        eprintln!("no rule files (*.toml) in {}", dir.display());
        return Ok(());
    }

    for path in files {
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match read_config(&path) {
            Ok(config) => {
                let description = if config.description.is_empty() {
                    String::new()
                } else {
                    format!(" - {}", config.description)
                };
                println!(
                    "{file_name}\t{}\t{} entit{}{description}",
                    config.name,
                    config.entities.len(),
                    if config.entities.len() == 1 { "y" } else { "ies" },
                );
            }
            Err(err) => {
                let first_line = err.message.lines().next().unwrap_or_default().to_string();
                tracing::debug!(file = %path.display(), error = %err.message, "invalid rule file");
                println!("{file_name}\t-\tinvalid: {first_line}");
            }
        }
    }
    Ok(())
}

// ============================================================================
// legend
// ============================================================================

pub fn cmd_legend() -> Result<(), CliError> {
    for status in ValidationStatus::ALL {
        println!("{:<18} {}", status.as_str(), render::status_description(status));
    }
    Ok(())
}
