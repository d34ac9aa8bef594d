//! `tally-recon`: rule-driven entity reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded tabular sources and a rule set,
//! returns one classification per compared field. No CLI or filesystem IO.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod integrity;
pub mod load;
pub mod matcher;
pub mod model;
pub mod report;

pub use config::{CompareType, EntityRule, FieldMapping, ReconConfig, Severity, SourceConfig};
pub use engine::run;
pub use error::{ReconError, RuleIssue};
pub use model::{
    ComparisonResult, CompositeKey, ReconInput, ReconReport, Record, TabularSource, ValidationStatus,
    Value,
};
