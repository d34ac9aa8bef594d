use std::collections::{BTreeMap, HashMap};

use crate::model::{
    ComparisonResult, DuplicateKey, IntegritySummary, ReconReport, ReportSummary,
    RequiredFieldSummary, ScopeKind, ScopeSummary, SourceStats, StatusCounts, ValidationStatus,
};

/// Append-only collector for one run. Results keep push order and scopes keep
/// first-seen order; nothing is merged or dropped.
#[derive(Debug)]
pub struct ReportBuilder {
    name: String,
    filters_applied: BTreeMap<String, Vec<String>>,
    results: Vec<ComparisonResult>,
    totals: StatusCounts,
    scopes: Vec<ScopeSummary>,
    scope_slots: HashMap<(ScopeKind, String), usize>,
    sources: Vec<SourceStats>,
    duplicates: Vec<DuplicateKey>,
    integrity: Vec<IntegritySummary>,
    required_fields: Vec<RequiredFieldSummary>,
}

impl ReportBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filters_applied: BTreeMap::new(),
            results: Vec::new(),
            totals: StatusCounts::default(),
            scopes: Vec::new(),
            scope_slots: HashMap::new(),
            sources: Vec::new(),
            duplicates: Vec::new(),
            integrity: Vec::new(),
            required_fields: Vec::new(),
        }
    }

    /// Register a scope so it is listed even if it yields no results.
    pub fn open_scope(&mut self, kind: ScopeKind, name: &str) {
        self.slot(kind, name);
    }

    fn slot(&mut self, kind: ScopeKind, name: &str) -> usize {
        if let Some(&i) = self.scope_slots.get(&(kind, name.to_string())) {
            return i;
        }
        self.scopes.push(ScopeSummary {
            scope: name.to_string(),
            kind,
            counts: StatusCounts::default(),
        });
        let i = self.scopes.len() - 1;
        self.scope_slots.insert((kind, name.to_string()), i);
        i
    }

    pub fn push(&mut self, result: ComparisonResult) {
        let slot = self.slot(ScopeKind::of(&result.origin), &result.entity);
        self.scopes[slot].counts.record(result.status);
        self.totals.record(result.status);
        self.results.push(result);
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = ComparisonResult>) {
        for result in results {
            self.push(result);
        }
    }

    pub fn set_filters(&mut self, filters: &BTreeMap<String, Vec<String>>) {
        self.filters_applied = filters.clone();
    }

    pub fn add_source(&mut self, stats: SourceStats) {
        self.sources.push(stats);
    }

    pub fn add_duplicates(&mut self, duplicates: Vec<DuplicateKey>) {
        self.duplicates.extend(duplicates);
    }

    pub fn add_integrity(&mut self, summary: IntegritySummary) {
        self.integrity.push(summary);
    }

    pub fn add_required(&mut self, summaries: Vec<RequiredFieldSummary>) {
        self.required_fields.extend(summaries);
    }

    pub fn finish(self) -> ReconReport {
        let integrity_violations = self
            .integrity
            .iter()
            .filter(|c| c.status == ValidationStatus::MissingInTarget)
            .count();

        ReconReport {
            name: self.name,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            filters_applied: self.filters_applied,
            sources: self.sources,
            summary: ReportSummary {
                total_results: self.results.len(),
                totals: self.totals,
                scopes: self.scopes,
                duplicate_keys: self.duplicates.len(),
                integrity_violations,
            },
            results: self.results,
            duplicates: self.duplicates,
            integrity: self.integrity,
            required_fields: self.required_fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResultOrigin, Value};

    fn result(entity: &str, origin: ResultOrigin, status: ValidationStatus) -> ComparisonResult {
        ComparisonResult {
            entity: entity.into(),
            origin,
            key: None,
            row: None,
            field: None,
            mapping: None,
            status,
            source_value: Value::Null,
            target_value: Value::Null,
        }
    }

    #[test]
    fn summary_counts_per_scope() {
        let mut b = ReportBuilder::new("t");
        b.open_scope(ScopeKind::Entity, "empty");
        b.push(result("sites", ResultOrigin::Field, ValidationStatus::Match));
        b.push(result("sites", ResultOrigin::Field, ValidationStatus::Mismatch));
        b.push(result("costs", ResultOrigin::Unmatched, ValidationStatus::MissingInSource));
        b.push(result("sites", ResultOrigin::Unmatched, ValidationStatus::MissingInTarget));
        // Same name, different kind: counted separately
        b.push(result(
            "sites",
            ResultOrigin::RequiredField { source: "sites".into() },
            ValidationStatus::NotVerifiable,
        ));

        let report = b.finish();
        let s = &report.summary;
        assert_eq!(s.total_results, 5);
        assert_eq!(s.totals.total(), 5);
        assert_eq!(s.totals.discrepancies(), 3);

        let scopes: Vec<(&str, ScopeKind)> = s.scopes.iter().map(|x| (x.scope.as_str(), x.kind)).collect();
        assert_eq!(
            scopes,
            vec![
                ("empty", ScopeKind::Entity),
                ("sites", ScopeKind::Entity),
                ("costs", ScopeKind::Entity),
                ("sites", ScopeKind::RequiredFields),
            ]
        );
        assert_eq!(s.scopes[0].counts.total(), 0);
        assert_eq!(s.scopes[1].counts.total(), 3);
        assert_eq!(s.scopes[1].counts.missing_in_target, 1);
        assert_eq!(s.scopes[3].counts.not_verifiable, 1);
    }

    #[test]
    fn results_keep_push_order() {
        let mut b = ReportBuilder::new("t");
        b.extend(vec![
            result("b", ResultOrigin::Field, ValidationStatus::Match),
            result("a", ResultOrigin::Field, ValidationStatus::RuleNotDefined),
            result("b", ResultOrigin::Field, ValidationStatus::NotVerifiable),
        ]);
        let report = b.finish();
        let statuses: Vec<ValidationStatus> = report.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ValidationStatus::Match,
                ValidationStatus::RuleNotDefined,
                ValidationStatus::NotVerifiable
            ]
        );
        assert!(!report.has_findings(false));
        assert!(report.has_findings(true));
    }
}
