//! Integrity checks that run independently of entity matching:
//! referential integrity between two sources and required-field non-nullity.

use crate::config::IntegrityRule;
use crate::index::{composite_key, KeyIndex};
use crate::model::{
    ComparisonResult, IntegritySummary, RequiredFieldSummary, ResultOrigin, TabularSource,
    ValidationStatus, Value,
};

#[derive(Debug, Clone)]
pub struct IntegrityOutcome {
    pub summary: IntegritySummary,
    pub facts: Vec<ComparisonResult>,
}

#[derive(Debug, Clone, Default)]
pub struct RequiredOutcome {
    pub summaries: Vec<RequiredFieldSummary>,
    pub facts: Vec<ComparisonResult>,
}

/// Every keyable dependent key must exist in the referenced source.
///
/// Orphans become MISSING_IN_TARGET facts, dependent rows with a null key
/// become NOT_VERIFIABLE facts.
pub fn check_references(
    rule: &IntegrityRule,
    dependent: &TabularSource,
    referenced: &TabularSource,
) -> IntegrityOutcome {
    let dep_key = rule.dependent_key.as_ref().unwrap_or(&dependent.key_fields);
    let ref_key = rule.referenced_key.as_ref().unwrap_or(&referenced.key_fields);

    let dep_index = KeyIndex::of_all(&dependent.id, dep_key, &dependent.records);
    let ref_index = KeyIndex::of_all(&referenced.id, ref_key, &referenced.records);

    let origin = ResultOrigin::Referential {
        dependent: dependent.id.clone(),
        referenced: referenced.id.clone(),
    };
    let fact = |status, key, row| ComparisonResult {
        entity: rule.name.clone(),
        origin: origin.clone(),
        key,
        row: Some(row),
        field: None,
        mapping: None,
        status,
        source_value: Value::Null,
        target_value: Value::Null,
    };

    let mut facts = Vec::new();
    let mut orphan_keys = Vec::new();
    for key in dep_index.keys() {
        if ref_index.contains(key) {
            continue;
        }
        let row = dep_index.get(key).map(|(row, _)| row).unwrap_or_default();
        facts.push(fact(ValidationStatus::MissingInTarget, Some(key.clone()), row));
        orphan_keys.push(key.clone());
    }
    for &row in dep_index.unkeyable() {
        facts.push(fact(ValidationStatus::NotVerifiable, None, row));
    }

    let total_keys = dep_index.len();
    let matched_keys = total_keys - orphan_keys.len();
    let status = if total_keys == 0 {
        ValidationStatus::NotVerifiable
    } else if orphan_keys.is_empty() {
        ValidationStatus::Match
    } else {
        ValidationStatus::MissingInTarget
    };
    let match_percentage = if total_keys == 0 {
        0.0
    } else {
        ((matched_keys as f64 / total_keys as f64) * 10_000.0).round() / 100.0
    };

    log::debug!(
        "integrity '{}': {}/{} {} keys found in {}",
        rule.name,
        matched_keys,
        total_keys,
        dependent.id,
        referenced.id
    );

    IntegrityOutcome {
        summary: IntegritySummary {
            name: rule.name.clone(),
            dependent: dependent.id.clone(),
            referenced: referenced.id.clone(),
            severity: rule.severity,
            status,
            total_keys,
            matched_keys,
            missing_in_target: orphan_keys.len(),
            unkeyable: dep_index.unkeyable().len(),
            match_percentage,
            orphan_keys,
        },
        facts,
    }
}

/// Report, per required field, every record where the field is null or absent.
pub fn check_required(source: &TabularSource, required: &[String]) -> RequiredOutcome {
    let mut outcome = RequiredOutcome::default();

    for field in required {
        let null_rows: Vec<usize> = source
            .records
            .iter()
            .enumerate()
            .filter(|(_, rec)| rec.get(field).is_null())
            .map(|(row, _)| row)
            .collect();

        for &row in &null_rows {
            outcome.facts.push(ComparisonResult {
                entity: source.id.clone(),
                origin: ResultOrigin::RequiredField {
                    source: source.id.clone(),
                },
                key: composite_key(&source.records[row], &source.key_fields),
                row: Some(row),
                field: Some(field.clone()),
                mapping: None,
                status: ValidationStatus::NotVerifiable,
                source_value: Value::Null,
                target_value: Value::Null,
            });
        }

        outcome.summaries.push(RequiredFieldSummary {
            source: source.id.clone(),
            field: field.clone(),
            total_rows: source.records.len(),
            null_count: null_rows.len(),
            null_rows,
        });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Severity;
    use crate::model::Record;

    fn source(id: &str, key: &str, ids: &[Option<&str>]) -> TabularSource {
        let records = ids
            .iter()
            .map(|id| Record::new().with(key, *id).with("vendor", "V"))
            .collect();
        TabularSource::new(id, vec![key.to_string()], records)
    }

    fn rule() -> IntegrityRule {
        IntegrityRule {
            name: "costs_sites".into(),
            dependent: "costs".into(),
            referenced: "sites".into(),
            dependent_key: None,
            referenced_key: None,
            severity: Severity::Error,
        }
    }

    #[test]
    fn all_references_resolve() {
        let costs = source("costs", "site_id", &[Some("1"), Some("2"), Some("1")]);
        let sites = source("sites", "site_id", &[Some("1"), Some("2"), Some("3")]);
        let out = check_references(&rule(), &costs, &sites);

        assert_eq!(out.summary.status, ValidationStatus::Match);
        assert_eq!(out.summary.total_keys, 2);
        assert_eq!(out.summary.matched_keys, 2);
        assert_eq!(out.summary.match_percentage, 100.0);
        assert!(out.facts.is_empty());
    }

    #[test]
    fn orphans_are_missing_in_target() {
        let costs = source("costs", "site_id", &[Some("1"), Some("9"), Some("8"), None]);
        let sites = source("sites", "site_id", &[Some("1")]);
        let out = check_references(&rule(), &costs, &sites);

        assert_eq!(out.summary.status, ValidationStatus::MissingInTarget);
        assert_eq!(out.summary.missing_in_target, 2);
        assert_eq!(out.summary.unkeyable, 1);
        assert_eq!(out.summary.match_percentage, 33.33);
        let orphans: Vec<String> = out.summary.orphan_keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(orphans, vec!["9", "8"]);

        assert_eq!(out.facts.len(), 3);
        assert_eq!(out.facts[0].status, ValidationStatus::MissingInTarget);
        assert_eq!(out.facts[0].row, Some(1));
        assert_eq!(
            out.facts[0].origin,
            ResultOrigin::Referential {
                dependent: "costs".into(),
                referenced: "sites".into()
            }
        );
        assert_eq!(out.facts[2].status, ValidationStatus::NotVerifiable);
        assert_eq!(out.facts[2].row, Some(3));
        assert!(out.facts.iter().all(|f| f.entity == "costs_sites"));
    }

    #[test]
    fn key_overrides_are_used() {
        let costs = TabularSource::new(
            "costs",
            vec!["cost_id".into()],
            vec![Record::new().with("cost_id", "c1").with("site", "1")],
        );
        let sites = source("sites", "site_id", &[Some("1")]);
        let mut r = rule();
        r.dependent_key = Some(vec!["site".into()]);
        let out = check_references(&r, &costs, &sites);
        assert_eq!(out.summary.status, ValidationStatus::Match);
    }

    #[test]
    fn empty_dependent_is_not_verifiable() {
        let costs = source("costs", "site_id", &[]);
        let sites = source("sites", "site_id", &[Some("1")]);
        let out = check_references(&rule(), &costs, &sites);
        assert_eq!(out.summary.status, ValidationStatus::NotVerifiable);
        assert_eq!(out.summary.match_percentage, 0.0);
    }

    #[test]
    fn required_fields_report_null_rows() {
        let sites = TabularSource::new(
            "sites",
            vec!["site_id".into()],
            vec![
                Record::new().with("site_id", "1").with("vendor", "A"),
                Record::new().with("site_id", "2").with("vendor", Value::Null),
                Record::new().with("site_id", "3"),
            ],
        );
        let out = check_required(&sites, &["vendor".to_string(), "site_id".to_string()]);

        assert_eq!(out.summaries.len(), 2);
        assert_eq!(out.summaries[0].null_count, 2);
        assert_eq!(out.summaries[0].null_rows, vec![1, 2]);
        assert_eq!(out.summaries[1].null_count, 0);

        assert_eq!(out.facts.len(), 2);
        assert_eq!(out.facts[0].field.as_deref(), Some("vendor"));
        assert_eq!(out.facts[0].key.as_ref().map(|k| k.to_string()).as_deref(), Some("2"));
        assert!(out.facts.iter().all(|f| f.status == ValidationStatus::NotVerifiable));
    }
}
