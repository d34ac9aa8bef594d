//! Report rendering: JSON envelope, Markdown document, console summary.

use std::fmt::{self, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tally_recon::model::{ComparisonResult, ReconReport, ScopeKind, StatusCounts, ValidationStatus};

/// Bumped when the JSON layout changes incompatibly.
pub const FORMAT_VERSION: &str = "1.0";

/// Orphan keys listed per integrity check in Markdown.
pub const ORPHAN_SAMPLE: usize = 10;

pub fn status_description(status: ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Match => "Both sides present and equal (within tolerance for numeric fields)",
        ValidationStatus::Mismatch => "Both sides present but values differ, or a category is outside its allowed values",
        ValidationStatus::MissingInTarget => "Key present in the source but absent from the target",
        ValidationStatus::MissingInSource => "Key present in the target but absent from the source",
        ValidationStatus::NotVerifiable => "Cannot compare: a value or key is null, or a number does not parse",
        ValidationStatus::RuleNotDefined => "Field inspected but no mapping is configured for it",
    }
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Serialize)]
struct Meta {
    tool_version: &'static str,
    format_version: &'static str,
    generated_by: &'static str,
    generated_at: String,
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "_meta")]
    meta: Meta,
    report: &'a ReconReport,
}

/// Pretty JSON: `{"_meta": {...}, "report": {...}}`.
pub fn render_json(report: &ReconReport, generated_at: DateTime<Utc>) -> Result<String, serde_json::Error> {
    let envelope = Envelope {
        meta: Meta {
            tool_version: env!("CARGO_PKG_VERSION"),
            format_version: FORMAT_VERSION,
            generated_by: "tally",
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        },
        report,
    };
    serde_json::to_string_pretty(&envelope)
}

// ============================================================================
// Markdown
// ============================================================================

pub fn render_markdown(report: &ReconReport, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_markdown(&mut out, report, generated_at);
    out
}

/// Escape a value for a Markdown table cell.
fn cell(text: impl fmt::Display) -> String {
    text.to_string().replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn key_cell(result: &ComparisonResult) -> String {
    result.key.as_ref().map(cell).unwrap_or_else(|| "-".to_string())
}

fn write_counts(out: &mut impl Write, counts: &StatusCounts) -> fmt::Result {
    writeln!(out, "| Status | Count |")?;
    writeln!(out, "|---|---:|")?;
    for status in ValidationStatus::ALL {
        writeln!(out, "| {} | {} |", status, counts.get(status))?;
    }
    writeln!(out)
}

pub fn write_markdown(out: &mut impl Write, report: &ReconReport, generated_at: DateTime<Utc>) -> fmt::Result {
    writeln!(out, "# Reconciliation Report: {}", report.name)?;
    writeln!(out)?;
    writeln!(out, "- Generated: {}", generated_at.to_rfc3339_opts(SecondsFormat::Secs, true))?;
    writeln!(out, "- Engine: tally-recon {}", report.engine_version)?;
    writeln!(out, "- Results: {}", report.summary.total_results)?;
    writeln!(out)?;

    if !report.filters_applied.is_empty() {
        writeln!(out, "## Filters")?;
        writeln!(out)?;
        for (field, values) in &report.filters_applied {
            let values: Vec<String> = values.iter().map(|v| format!("`{v}`")).collect();
            writeln!(out, "- **{}:** {}", field, values.join(", "))?;
        }
        writeln!(out)?;
    }

    // Legend
    writeln!(out, "## Status Legend")?;
    writeln!(out)?;
    writeln!(out, "| Status | Meaning |")?;
    writeln!(out, "|---|---|")?;
    for status in ValidationStatus::ALL {
        writeln!(out, "| {} | {} |", status, status_description(status))?;
    }
    writeln!(out)?;

    // Sources
    writeln!(out, "## Sources")?;
    writeln!(out)?;
    writeln!(out, "| Source | Rows | Columns | Keyable | Unkeyable | Duplicate keys | Duplicate rows |")?;
    writeln!(out, "|---|---:|---:|---:|---:|---:|---:|")?;
    for s in &report.sources {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} ({:.2}%) |",
            cell(&s.id),
            s.rows,
            s.columns,
            s.keyable,
            s.unkeyable,
            s.duplicate_keys,
            s.duplicate_rows,
            s.duplicate_percentage
        )?;
    }
    writeln!(out)?;

    let nulls: Vec<(&str, &str, usize)> = report
        .sources
        .iter()
        .flat_map(|s| {
            s.null_counts
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(move |(column, n)| (s.id.as_str(), column.as_str(), *n))
        })
        .collect();
    if !nulls.is_empty() {
        writeln!(out, "### Null Cells")?;
        writeln!(out)?;
        writeln!(out, "| Source | Column | Null |")?;
        writeln!(out, "|---|---|---:|")?;
        for (source, column, n) in nulls {
            writeln!(out, "| {} | {} | {} |", cell(source), cell(column), n)?;
        }
        writeln!(out)?;
    }

    // Duplicates
    writeln!(out, "## Duplicate Keys")?;
    writeln!(out)?;
    if report.duplicates.is_empty() {
        writeln!(out, "No duplicate keys.")?;
    } else {
        writeln!(out, "| Source | Key | Rows |")?;
        writeln!(out, "|---|---|---|")?;
        for d in &report.duplicates {
            let rows: Vec<String> = d.rows.iter().map(|r| r.to_string()).collect();
            writeln!(out, "| {} | {} | {} |", cell(&d.source), cell(&d.key), rows.join(", "))?;
        }
    }
    writeln!(out)?;

    // Integrity
    if !report.integrity.is_empty() {
        writeln!(out, "## Integrity Checks")?;
        writeln!(out)?;
        for check in &report.integrity {
            writeln!(out, "### {} ({})", check.name, check.severity)?;
            writeln!(out)?;
            writeln!(out, "- `{}` keys must exist in `{}`", check.dependent, check.referenced)?;
            writeln!(out, "- Status: {}", check.status)?;
            writeln!(
                out,
                "- Matched: {} / {} ({:.2}%)",
                check.matched_keys, check.total_keys, check.match_percentage
            )?;
            writeln!(out, "- Missing in `{}`: {}", check.referenced, check.missing_in_target)?;
            if check.unkeyable > 0 {
                writeln!(out, "- Rows with a null key: {}", check.unkeyable)?;
            }
            if !check.orphan_keys.is_empty() {
                let sample: Vec<String> = check
                    .orphan_keys
                    .iter()
                    .take(ORPHAN_SAMPLE)
                    .map(|k| format!("`{k}`"))
                    .collect();
                write!(out, "- Orphan keys: {}", sample.join(", "))?;
                if check.orphan_keys.len() > ORPHAN_SAMPLE {
                    write!(out, " and {} more", check.orphan_keys.len() - ORPHAN_SAMPLE)?;
                }
                writeln!(out)?;
            }
            writeln!(out)?;
        }
    }

    // Required fields
    if !report.required_fields.is_empty() {
        writeln!(out, "## Required Fields")?;
        writeln!(out)?;
        writeln!(out, "| Source | Field | Rows | Null | Null rows |")?;
        writeln!(out, "|---|---|---:|---:|---|")?;
        for r in &report.required_fields {
            let rows: Vec<String> = r.null_rows.iter().take(ORPHAN_SAMPLE).map(|r| r.to_string()).collect();
            let more = if r.null_rows.len() > ORPHAN_SAMPLE { ", ..." } else { "" };
            writeln!(
                out,
                "| {} | {} | {} | {} | {}{} |",
                cell(&r.source),
                cell(&r.field),
                r.total_rows,
                r.null_count,
                rows.join(", "),
                more
            )?;
        }
        writeln!(out)?;
    }

    // Entities
    for scope in report.summary.scopes.iter().filter(|s| s.kind == ScopeKind::Entity) {
        writeln!(out, "## Entity: {}", scope.scope)?;
        writeln!(out)?;
        write_counts(out, &scope.counts)?;

        let findings: Vec<&ComparisonResult> = report
            .results_for(&scope.scope)
            .filter(|r| ScopeKind::of(&r.origin) == ScopeKind::Entity)
            .filter(|r| r.status != ValidationStatus::Match)
            .collect();
        if findings.is_empty() {
            writeln!(out, "All compared fields match.")?;
            writeln!(out)?;
            continue;
        }

        writeln!(out, "| Key | Row | Field | Status | Source value | Target value |")?;
        writeln!(out, "|---|---:|---|---|---|---|")?;
        for r in findings {
            writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                key_cell(r),
                r.row.map(|n| n.to_string()).unwrap_or_default(),
                r.field.as_deref().map(cell).unwrap_or_default(),
                r.status,
                cell(&r.source_value),
                cell(&r.target_value)
            )?;
        }
        writeln!(out)?;
    }

    // Summary
    writeln!(out, "## Summary")?;
    writeln!(out)?;
    write_counts(out, &report.summary.totals)?;
    writeln!(out, "- Duplicate keys: {}", report.summary.duplicate_keys)?;
    writeln!(out, "- Integrity violations: {}", report.summary.integrity_violations)?;
    Ok(())
}

// ============================================================================
// Console
// ============================================================================

fn scope_label(kind: ScopeKind) -> &'static str {
    match kind {
        ScopeKind::Entity => "entity",
        ScopeKind::Referential => "integrity",
        ScopeKind::RequiredFields => "required",
    }
}

fn nonzero_counts(counts: &StatusCounts) -> String {
    let parts: Vec<String> = ValidationStatus::ALL
        .iter()
        .filter(|s| counts.get(**s) > 0)
        .map(|s| format!("{} {}", counts.get(*s), s))
        .collect();
    if parts.is_empty() {
        "no results".to_string()
    } else {
        parts.join(", ")
    }
}

/// One line per entity / check, then a totals line. Written to stderr by the CLI.
pub fn console_summary(report: &ReconReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .filters_applied
        .iter()
        .map(|(field, values)| format!("filter: {} = {}", field, values.join(" | ")))
        .collect();
    lines.extend(
        report
            .summary
            .scopes
            .iter()
            .map(|s| format!("{} '{}': {}", scope_label(s.kind), s.scope, nonzero_counts(&s.counts))),
    );

    let s = &report.summary;
    lines.push(format!(
        "recon '{}': {} result(s), {} discrepancies, {} duplicate key(s), {} integrity violation(s)",
        report.name,
        s.total_results,
        s.totals.discrepancies(),
        s.duplicate_keys,
        s.integrity_violations
    ));
    lines
}
