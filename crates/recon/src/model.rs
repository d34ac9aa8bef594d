use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::config::{FieldMapping, Severity};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A scalar cell value. Absent fields read back as `Null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical string form: surrounding whitespace trimmed, integral numbers
    /// without a fractional part. `None` for null.
    pub fn canonical(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Text(s) => Some(s.trim().to_string()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n == 0.0 {
        // Collapse -0 into 0
        "0".to_string()
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One row of a tabular source. Field order is irrelevant; iteration is sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::insert`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Value of `field`, `Null` when the field is absent.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Pre-loaded rows of one source plus the fields that identify a row.
#[derive(Debug, Clone)]
pub struct TabularSource {
    pub id: String,
    pub key_fields: Vec<String>,
    /// Every column the source declares, even ones no row fills.
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl TabularSource {
    /// Columns are the sorted union of the records' field names.
    pub fn new(id: impl Into<String>, key_fields: Vec<String>, records: Vec<Record>) -> Self {
        let columns: BTreeSet<&str> = records.iter().flat_map(|r| r.fields().map(|(name, _)| name)).collect();
        let columns = columns.into_iter().map(str::to_string).collect();
        Self {
            id: id.into(),
            key_fields,
            columns,
            records,
        }
    }

    /// Replace the derived columns, e.g. with a CSV header in file order.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Pre-loaded sources by id.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub sources: BTreeMap<String, TabularSource>,
}

impl ReconInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: TabularSource) {
        self.sources.insert(source.id.clone(), source);
    }

    pub fn with(mut self, source: TabularSource) -> Self {
        self.insert(source);
        self
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Normalized key values of one record, in declared key-field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CompositeKey(pub Vec<String>);

impl CompositeKey {
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Match,
    Mismatch,
    MissingInTarget,
    MissingInSource,
    NotVerifiable,
    RuleNotDefined,
}

impl ValidationStatus {
    pub const ALL: [ValidationStatus; 6] = [
        Self::Match,
        Self::Mismatch,
        Self::MissingInTarget,
        Self::MissingInSource,
        Self::NotVerifiable,
        Self::RuleNotDefined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "MATCH",
            Self::Mismatch => "MISMATCH",
            Self::MissingInTarget => "MISSING_IN_TARGET",
            Self::MissingInSource => "MISSING_IN_SOURCE",
            Self::NotVerifiable => "NOT_VERIFIABLE",
            Self::RuleNotDefined => "RULE_NOT_DEFINED",
        }
    }

    /// Statuses that prove a discrepancy, as opposed to a gap in data or rules.
    pub fn is_discrepancy(&self) -> bool {
        match self {
            Self::Mismatch | Self::MissingInTarget | Self::MissingInSource => true,
            Self::Match | Self::NotVerifiable | Self::RuleNotDefined => false,
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultOrigin {
    /// A mapped or inspected field of a matched pair.
    Field,
    /// A key present on one side only.
    Unmatched,
    /// A record with a null key field, excluded from matching.
    Unkeyable { source: String },
    /// A dependent key missing from its referenced source.
    Referential { dependent: String, referenced: String },
    /// A required field that is null.
    RequiredField { source: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    /// Entity name, integrity check name, or source id for required-field facts.
    pub entity: String,
    pub origin: ResultOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<CompositeKey>,
    /// Zero-based position of the record in its source, where one record is implied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub mapping: Option<FieldMapping>,
    pub status: ValidationStatus,
    pub source_value: Value,
    pub target_value: Value,
}

// ---------------------------------------------------------------------------
// Side facts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateKey {
    pub source: String,
    pub key: CompositeKey,
    /// Every row carrying the key, first one is the representative used for matching.
    pub rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStats {
    pub id: String,
    pub rows: usize,
    pub columns: usize,
    pub keyable: usize,
    pub unkeyable: usize,
    pub duplicate_keys: usize,
    pub duplicate_rows: usize,
    /// `duplicate_rows` over `rows`, two decimals.
    pub duplicate_percentage: f64,
    /// Null or absent cells per declared column.
    pub null_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegritySummary {
    pub name: String,
    pub dependent: String,
    pub referenced: String,
    pub severity: Severity,
    pub status: ValidationStatus,
    pub total_keys: usize,
    pub matched_keys: usize,
    pub missing_in_target: usize,
    pub unkeyable: usize,
    pub match_percentage: f64,
    pub orphan_keys: Vec<CompositeKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequiredFieldSummary {
    pub source: String,
    pub field: String,
    pub total_rows: usize,
    pub null_count: usize,
    pub null_rows: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    #[serde(rename = "MATCH")]
    pub matched: usize,
    #[serde(rename = "MISMATCH")]
    pub mismatch: usize,
    #[serde(rename = "MISSING_IN_TARGET")]
    pub missing_in_target: usize,
    #[serde(rename = "MISSING_IN_SOURCE")]
    pub missing_in_source: usize,
    #[serde(rename = "NOT_VERIFIABLE")]
    pub not_verifiable: usize,
    #[serde(rename = "RULE_NOT_DEFINED")]
    pub rule_not_defined: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: ValidationStatus) {
        *self.slot(status) += 1;
    }

    pub fn get(&self, status: ValidationStatus) -> usize {
        match status {
            ValidationStatus::Match => self.matched,
            ValidationStatus::Mismatch => self.mismatch,
            ValidationStatus::MissingInTarget => self.missing_in_target,
            ValidationStatus::MissingInSource => self.missing_in_source,
            ValidationStatus::NotVerifiable => self.not_verifiable,
            ValidationStatus::RuleNotDefined => self.rule_not_defined,
        }
    }

    fn slot(&mut self, status: ValidationStatus) -> &mut usize {
        match status {
            ValidationStatus::Match => &mut self.matched,
            ValidationStatus::Mismatch => &mut self.mismatch,
            ValidationStatus::MissingInTarget => &mut self.missing_in_target,
            ValidationStatus::MissingInSource => &mut self.missing_in_source,
            ValidationStatus::NotVerifiable => &mut self.not_verifiable,
            ValidationStatus::RuleNotDefined => &mut self.rule_not_defined,
        }
    }

    pub fn total(&self) -> usize {
        ValidationStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    pub fn discrepancies(&self) -> usize {
        self.mismatch + self.missing_in_target + self.missing_in_source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Entity,
    Referential,
    RequiredFields,
}

impl ScopeKind {
    pub fn of(origin: &ResultOrigin) -> Self {
        match origin {
            ResultOrigin::Field | ResultOrigin::Unmatched | ResultOrigin::Unkeyable { .. } => {
                Self::Entity
            }
            ResultOrigin::Referential { .. } => Self::Referential,
            ResultOrigin::RequiredField { .. } => Self::RequiredFields,
        }
    }
}

/// Per-status counts of one entity / integrity check / required-field source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSummary {
    pub scope: String,
    pub kind: ScopeKind,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_results: usize,
    pub totals: StatusCounts,
    pub scopes: Vec<ScopeSummary>,
    pub duplicate_keys: usize,
    pub integrity_violations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconReport {
    pub name: String,
    pub engine_version: String,
    /// Run-wide filters the entities were matched under, field to accepted values.
    pub filters_applied: BTreeMap<String, Vec<String>>,
    pub sources: Vec<SourceStats>,
    pub summary: ReportSummary,
    pub results: Vec<ComparisonResult>,
    pub duplicates: Vec<DuplicateKey>,
    pub integrity: Vec<IntegritySummary>,
    pub required_fields: Vec<RequiredFieldSummary>,
}

impl ReconReport {
    /// Results of one entity (or check), in report order.
    pub fn results_for<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a ComparisonResult> + 'a {
        self.results.iter().filter(move |r| r.entity == entity)
    }

    /// True when the report proves a discrepancy: an entity discrepancy, a
    /// duplicate key, or a failing integrity check of `error` severity or
    /// above. With `strict`, failing checks of any severity and results that
    /// could not be verified or had no rule also count.
    pub fn has_findings(&self, strict: bool) -> bool {
        let entity_discrepancies: usize = self
            .summary
            .scopes
            .iter()
            .filter(|s| s.kind == ScopeKind::Entity)
            .map(|s| s.counts.discrepancies())
            .sum();
        let failing_checks = self
            .integrity
            .iter()
            .filter(|c| c.status == ValidationStatus::MissingInTarget)
            .filter(|c| strict || c.severity.is_blocking())
            .count();

        let mut findings = entity_discrepancies + failing_checks + self.summary.duplicate_keys;
        if strict {
            let totals = &self.summary.totals;
            findings += totals.not_verifiable + totals.rule_not_defined;
        }
        findings > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_trims_text_and_formats_numbers() {
        assert_eq!(Value::from("  DIA ").canonical().as_deref(), Some("DIA"));
        assert_eq!(Value::from(100.0).canonical().as_deref(), Some("100"));
        assert_eq!(Value::from(100.5).canonical().as_deref(), Some("100.5"));
        assert_eq!(Value::from(-0.0).canonical().as_deref(), Some("0"));
        assert_eq!(Value::from(true).canonical().as_deref(), Some("true"));
        assert_eq!(Value::Null.canonical(), None);
    }

    #[test]
    fn columns_default_to_field_union() {
        let source = TabularSource::new(
            "s",
            vec!["id".into()],
            vec![Record::new().with("id", "1").with("b", 1.0), Record::new().with("id", "2").with("a", "x")],
        );
        assert_eq!(source.columns, vec!["a", "b", "id"]);
        assert!(source.has_column("a"));

        let source = source.with_columns(vec!["id".into(), "b".into(), "a".into(), "empty".into()]);
        assert!(source.has_column("empty"));
    }

    #[test]
    fn absent_field_reads_as_null() {
        let rec = Record::new().with("site_id", "146");
        assert_eq!(rec.get("site_id"), &Value::from("146"));
        assert!(rec.get("vendor").is_null());
    }

    #[test]
    fn status_tokens_are_stable() {
        let tokens: Vec<String> = ValidationStatus::ALL
            .iter()
            .map(|s| serde_json::to_value(s).unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            tokens,
            vec![
                "MATCH",
                "MISMATCH",
                "MISSING_IN_TARGET",
                "MISSING_IN_SOURCE",
                "NOT_VERIFIABLE",
                "RULE_NOT_DEFINED"
            ]
        );
        for s in ValidationStatus::ALL {
            assert_eq!(serde_json::to_value(s).unwrap(), s.as_str());
        }
    }

    #[test]
    fn status_counts_cover_every_status() {
        let mut counts = StatusCounts::default();
        for s in ValidationStatus::ALL {
            counts.record(s);
        }
        counts.record(ValidationStatus::Mismatch);
        assert_eq!(counts.total(), 7);
        assert_eq!(counts.get(ValidationStatus::Mismatch), 2);
        assert_eq!(counts.discrepancies(), 4);
    }

    #[test]
    fn value_serializes_untagged() {
        let rec = Record::new()
            .with("a", Value::Null)
            .with("b", 1.5)
            .with("c", "x")
            .with("d", false);
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"a":null,"b":1.5,"c":"x","d":false}"#);
    }
}
