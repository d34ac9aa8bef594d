use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ReconError, RuleIssue};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: Settings,
    /// Run-wide filters applied to every entity on top of its own filters.
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub entities: Vec<EntityRule>,
    #[serde(default)]
    pub integrity: Vec<IntegrityRule>,
}

/// Defaults applied to mappings that leave the corresponding option unset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub numeric_tolerance: Option<f64>,
    #[serde(default)]
    pub case_insensitive: bool,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub file: String,
    #[serde(default)]
    pub format: SourceFormat,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    pub key_fields: Vec<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Cell texts read as null in addition to empty cells.
    #[serde(default)]
    pub null_tokens: Vec<String>,
}

impl SourceConfig {
    pub fn csv(file: impl Into<String>, key_fields: &[&str]) -> Self {
        Self {
            file: file.into(),
            format: SourceFormat::Csv,
            delimiter: default_delimiter(),
            key_fields: key_fields.iter().map(|s| s.to_string()).collect(),
            required_fields: Vec::new(),
            null_tokens: Vec::new(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    #[default]
    Csv,
    Json,
}

// ---------------------------------------------------------------------------
// Entity rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRule {
    pub name: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
    /// Source fields reported as RULE_NOT_DEFINED on every matched pair.
    #[serde(default)]
    pub inspect_fields: Vec<String>,
    /// Inspect every non-key source field that has no mapping.
    #[serde(default)]
    pub inspect_unmapped: bool,
    #[serde(default)]
    pub source_filter: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub target_filter: BTreeMap<String, Vec<String>>,
}

impl EntityRule {
    pub fn new(name: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            fields: Vec::new(),
            inspect_fields: Vec::new(),
            inspect_unmapped: false,
            source_filter: BTreeMap::new(),
            target_filter: BTreeMap::new(),
        }
    }

    pub fn field(mut self, mapping: FieldMapping) -> Self {
        self.fields.push(mapping);
        self
    }

    /// Mapping configured for `source_field`, if any.
    pub fn mapping_for(&self, source_field: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|m| m.source_field == source_field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareType {
    Exact,
    Numeric,
    Categorical,
}

impl std::fmt::Display for CompareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Numeric => write!(f, "numeric"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
    pub compare: CompareType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,
}

impl FieldMapping {
    fn bare(source_field: &str, target_field: &str, compare: CompareType) -> Self {
        Self {
            source_field: source_field.to_string(),
            target_field: target_field.to_string(),
            compare,
            tolerance: None,
            allowed_values: None,
            case_insensitive: None,
        }
    }

    pub fn exact(source_field: &str, target_field: &str) -> Self {
        Self::bare(source_field, target_field, CompareType::Exact)
    }

    pub fn numeric(source_field: &str, target_field: &str, tolerance: Option<f64>) -> Self {
        Self {
            tolerance,
            ..Self::bare(source_field, target_field, CompareType::Numeric)
        }
    }

    pub fn categorical(source_field: &str, target_field: &str, allowed: Option<&[&str]>) -> Self {
        Self {
            allowed_values: allowed.map(|vals| vals.iter().map(|v| v.to_string()).collect()),
            ..Self::bare(source_field, target_field, CompareType::Categorical)
        }
    }

    pub fn fold_case(mut self, on: bool) -> Self {
        self.case_insensitive = Some(on);
        self
    }
}

// ---------------------------------------------------------------------------
// Integrity checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// A failing check at this severity fails the run. Lower severities only
    /// fail it in strict mode.
    pub fn is_blocking(&self) -> bool {
        match self {
            Self::Error | Self::Critical => true,
            Self::Info | Self::Warning => false,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrityRule {
    pub name: String,
    pub dependent: String,
    pub referenced: String,
    /// Defaults to the dependent source's key fields.
    #[serde(default)]
    pub dependent_key: Option<Vec<String>>,
    /// Defaults to the referenced source's key fields.
    #[serde(default)]
    pub referenced_key: Option<Vec<String>>,
    #[serde(default)]
    pub severity: Severity,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every rule for consistency. All issues are reported together.
    pub fn validate(&self) -> Result<(), ReconError> {
        let mut issues = Vec::new();

        if self.sources.is_empty() {
            issues.push(RuleIssue::new("config", "at least one source is required"));
        }

        if let Some(tol) = self.settings.numeric_tolerance {
            if !tol.is_finite() || tol < 0.0 {
                issues.push(RuleIssue::new(
                    "settings",
                    format!("numeric_tolerance must be a non-negative number, got {tol}"),
                ));
            }
        }

        for (field, values) in &self.filters {
            if field.trim().is_empty() {
                issues.push(RuleIssue::new("filters", "filter field name must not be empty"));
            }
            if values.is_empty() {
                issues.push(RuleIssue::new("filters", format!("filter on '{field}' lists no values")));
            }
        }

        for (id, source) in &self.sources {
            validate_source(id, source, &mut issues);
        }

        let mut entity_names = HashSet::new();
        for entity in &self.entities {
            if !entity_names.insert(entity.name.as_str()) {
                issues.push(RuleIssue::new(
                    format!("entity '{}'", entity.name),
                    "entity name is defined more than once",
                ));
            }
            self.validate_entity(entity, &mut issues);
        }

        let mut check_names = HashSet::new();
        for check in &self.integrity {
            if !check_names.insert(check.name.as_str()) {
                issues.push(RuleIssue::new(
                    format!("integrity '{}'", check.name),
                    "check name is defined more than once",
                ));
            }
            self.validate_integrity(check, &mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ReconError::InvalidRules(issues))
        }
    }

    fn validate_entity(&self, entity: &EntityRule, issues: &mut Vec<RuleIssue>) {
        let scope = format!("entity '{}'", entity.name);

        if entity.name.trim().is_empty() {
            issues.push(RuleIssue::new(&scope, "name must not be empty"));
        }

        let source = self.sources.get(&entity.source);
        let target = self.sources.get(&entity.target);
        if source.is_none() {
            issues.push(RuleIssue::new(
                &scope,
                format!("source '{}' not found", entity.source),
            ));
        }
        if target.is_none() {
            issues.push(RuleIssue::new(
                &scope,
                format!("target '{}' not found", entity.target),
            ));
        }
        if let (Some(s), Some(t)) = (source, target) {
            if s.key_fields.len() != t.key_fields.len() {
                issues.push(RuleIssue::new(
                    &scope,
                    format!(
                        "source '{}' has {} key field(s) but target '{}' has {}",
                        entity.source,
                        s.key_fields.len(),
                        entity.target,
                        t.key_fields.len()
                    ),
                ));
            }
        }

        if entity.fields.is_empty() && entity.inspect_fields.is_empty() && !entity.inspect_unmapped {
            issues.push(RuleIssue::new(
                &scope,
                "no field mappings or inspected fields configured",
            ));
        }

        let mut mapped = HashSet::new();
        for mapping in &entity.fields {
            if !mapped.insert(mapping.source_field.as_str()) {
                issues.push(RuleIssue::new(
                    &scope,
                    format!("source field '{}' is mapped more than once", mapping.source_field),
                ));
            }
            validate_mapping(&scope, mapping, issues);
        }

        for field in &entity.inspect_fields {
            if field.trim().is_empty() {
                issues.push(RuleIssue::new(&scope, "inspect_fields contains an empty name"));
            }
        }

        for (field, values) in entity.source_filter.iter().chain(&entity.target_filter) {
            if values.is_empty() {
                issues.push(RuleIssue::new(
                    &scope,
                    format!("filter on '{field}' lists no values"),
                ));
            }
        }
    }

    fn validate_integrity(&self, check: &IntegrityRule, issues: &mut Vec<RuleIssue>) {
        let scope = format!("integrity '{}'", check.name);

        if check.name.trim().is_empty() {
            issues.push(RuleIssue::new(&scope, "name must not be empty"));
        }

        let dependent = self.sources.get(&check.dependent);
        let referenced = self.sources.get(&check.referenced);
        if dependent.is_none() {
            issues.push(RuleIssue::new(
                &scope,
                format!("dependent source '{}' not found", check.dependent),
            ));
        }
        if referenced.is_none() {
            issues.push(RuleIssue::new(
                &scope,
                format!("referenced source '{}' not found", check.referenced),
            ));
        }

        for (label, key) in [
            ("dependent_key", &check.dependent_key),
            ("referenced_key", &check.referenced_key),
        ] {
            if let Some(fields) = key {
                if fields.is_empty() || fields.iter().any(|f| f.trim().is_empty()) {
                    issues.push(RuleIssue::new(
                        &scope,
                        format!("{label} must list at least one non-empty field"),
                    ));
                }
            }
        }

        if let (Some(d), Some(r)) = (dependent, referenced) {
            let d_len = check.dependent_key.as_ref().unwrap_or(&d.key_fields).len();
            let r_len = check.referenced_key.as_ref().unwrap_or(&r.key_fields).len();
            if d_len != r_len {
                issues.push(RuleIssue::new(
                    &scope,
                    format!("dependent key has {d_len} field(s) but referenced key has {r_len}"),
                ));
            }
        }
    }

    /// Add a run-wide filter value. Values given for the same field are alternatives.
    pub fn add_filter(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let values = self.filters.entry(field.into()).or_default();
        let value = value.into();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// Keep only the named entities. Unknown names are configuration errors.
    pub fn retain_entities(&mut self, names: &[String]) -> Result<(), ReconError> {
        if names.is_empty() {
            return Ok(());
        }

        let issues: Vec<RuleIssue> = names
            .iter()
            .filter(|n| !self.entities.iter().any(|e| &e.name == *n))
            .map(|n| RuleIssue::new(format!("entity '{n}'"), "not defined in config"))
            .collect();
        if !issues.is_empty() {
            return Err(ReconError::InvalidRules(issues));
        }

        self.entities.retain(|e| names.contains(&e.name));
        Ok(())
    }
}

fn validate_source(id: &str, source: &SourceConfig, issues: &mut Vec<RuleIssue>) {
    let scope = format!("source '{id}'");

    if source.key_fields.is_empty() {
        issues.push(RuleIssue::new(&scope, "key_fields must not be empty"));
    }
    if source
        .key_fields
        .iter()
        .chain(&source.required_fields)
        .any(|f| f.trim().is_empty())
    {
        issues.push(RuleIssue::new(&scope, "field names must not be empty"));
    }
    if source.format == SourceFormat::Csv && !source.delimiter.is_ascii() {
        issues.push(RuleIssue::new(
            &scope,
            format!("delimiter must be a single ASCII character, got '{}'", source.delimiter),
        ));
    }
}

fn validate_mapping(scope: &str, mapping: &FieldMapping, issues: &mut Vec<RuleIssue>) {
    let label = format!("mapping '{}' -> '{}'", mapping.source_field, mapping.target_field);

    if mapping.source_field.trim().is_empty() || mapping.target_field.trim().is_empty() {
        issues.push(RuleIssue::new(scope, format!("{label}: field names must not be empty")));
    }

    match mapping.compare {
        CompareType::Numeric => {
            if let Some(tol) = mapping.tolerance {
                if !tol.is_finite() || tol < 0.0 {
                    issues.push(RuleIssue::new(
                        scope,
                        format!("{label}: tolerance must be a non-negative number, got {tol}"),
                    ));
                }
            }
            if mapping.case_insensitive.is_some() {
                issues.push(RuleIssue::new(
                    scope,
                    format!("{label}: case_insensitive is not valid on numeric mappings"),
                ));
            }
        }
        CompareType::Exact | CompareType::Categorical => {
            if mapping.tolerance.is_some() {
                issues.push(RuleIssue::new(
                    scope,
                    format!("{label}: tolerance is only valid on numeric mappings"),
                ));
            }
        }
    }

    match (mapping.compare, &mapping.allowed_values) {
        (CompareType::Categorical, Some(values)) if values.is_empty() => {
            issues.push(RuleIssue::new(
                scope,
                format!("{label}: allowed_values must not be empty"),
            ));
        }
        (CompareType::Exact | CompareType::Numeric, Some(_)) => {
            issues.push(RuleIssue::new(
                scope,
                format!("{label}: allowed_values is only valid on categorical mappings"),
            ));
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
