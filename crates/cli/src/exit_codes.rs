//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `tally` exit codes.
//! Scripts and CI jobs gate on them, so treat them as a contract.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                              |
//! |---------|------------|------------------------------------------|
//! | 0       | Universal  | Success, no findings                     |
//! | 1       | Universal  | General error (unspecified)              |
//! | 2       | Universal  | CLI usage error (bad args)               |
//! | 60-69   | recon      | Reconciliation outcome and failure codes |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use tally_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed, nothing to report.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with this code on its own parse errors.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Recon (60-69)
// =============================================================================

/// The run completed and found discrepancies: MISMATCH, MISSING_IN_TARGET,
/// MISSING_IN_SOURCE, duplicate keys or referential violations.
/// With `--strict`, NOT_VERIFIABLE and RULE_NOT_DEFINED count too.
pub const EXIT_RECON_FINDINGS: u8 = 60;

/// Rule file could not be parsed or failed validation, or names a source
/// or entity that does not exist. Fix the config.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 61;

/// A source or output file could not be read, decoded or written. Fix the data.
pub const EXIT_RECON_RUNTIME: u8 = 62;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    if err.is_config_error() {
        EXIT_RECON_INVALID_CONFIG
    } else {
        EXIT_RECON_RUNTIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_recon::RuleIssue;

    #[test]
    fn config_and_data_errors_map_apart() {
        let config = ReconError::InvalidRules(vec![RuleIssue::new("entity 'x'", "bad")]);
        assert_eq!(recon_exit_code(&config), EXIT_RECON_INVALID_CONFIG);

        let data = ReconError::MissingColumn {
            source: "sites".into(),
            column: "site_id".into(),
        };
        assert_eq!(recon_exit_code(&data), EXIT_RECON_RUNTIME);
    }

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_RECON_FINDINGS,
            EXIT_RECON_INVALID_CONFIG,
            EXIT_RECON_RUNTIME,
        ];
        let unique: std::collections::HashSet<u8> = codes.iter().copied().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
