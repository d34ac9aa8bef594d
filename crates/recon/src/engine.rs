use std::collections::{BTreeMap, BTreeSet};

use crate::classify::{classify, CompareRule};
use crate::config::{EntityRule, FieldMapping, IntegrityRule, ReconConfig};
use crate::error::{ReconError, RuleIssue};
use crate::index::KeyIndex;
use crate::integrity::{check_references, check_required};
use crate::matcher::partition_keys;
use crate::model::{
    ComparisonResult, DuplicateKey, ReconInput, ReconReport, Record, ResultOrigin, ScopeKind, SourceStats,
    TabularSource, ValidationStatus, Value,
};
use crate::report::ReportBuilder;

/// Run reconciliation per config. Returns every classification plus summary.
///
/// The config is validated and every source id it references is resolved
/// against `input` before any comparison runs.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconReport, ReconError> {
    config.validate()?;
    let plans = resolve_entities(config, input)?;
    let checks = resolve_checks(config, input)?;

    let mut report = ReportBuilder::new(&config.name);
    report.set_filters(&config.filters);

    // Source-level data quality, independent of any entity
    for source in input.sources.values() {
        let index = KeyIndex::of_all(&source.id, &source.key_fields, &source.records);
        let duplicates = index.duplicates();
        if !duplicates.is_empty() {
            log::warn!("source '{}': {} duplicate key(s)", source.id, duplicates.len());
        }
        if !index.unkeyable().is_empty() {
            log::warn!(
                "source '{}': {} record(s) with a null key field",
                source.id,
                index.unkeyable().len()
            );
        }
        report.add_source(source_stats(source, &index, &duplicates));
        report.add_duplicates(duplicates);
    }

    for plan in &plans {
        run_entity(plan, &mut report);
    }

    for (rule, dependent, referenced) in checks {
        report.open_scope(ScopeKind::Referential, &rule.name);
        let outcome = check_references(rule, dependent, referenced);
        report.extend(outcome.facts);
        report.add_integrity(outcome.summary);
    }

    for (id, source_config) in &config.sources {
        if source_config.required_fields.is_empty() {
            continue;
        }
        let source = supplied(input, &format!("source '{id}'"), id)?;
        report.open_scope(ScopeKind::RequiredFields, id);
        let outcome = check_required(source, &source_config.required_fields);
        report.extend(outcome.facts);
        report.add_required(outcome.summaries);
    }

    Ok(report.finish())
}

fn source_stats(source: &TabularSource, index: &KeyIndex<'_>, duplicates: &[DuplicateKey]) -> SourceStats {
    let rows = source.records.len();
    let duplicate_rows: usize = duplicates.iter().map(|d| d.rows.len() - 1).sum();
    let duplicate_percentage = if rows == 0 {
        0.0
    } else {
        ((duplicate_rows as f64 / rows as f64) * 10_000.0).round() / 100.0
    };
    let null_counts = source
        .columns
        .iter()
        .map(|column| {
            let nulls = source.records.iter().filter(|r| r.get(column).is_null()).count();
            (column.clone(), nulls)
        })
        .collect();

    SourceStats {
        id: source.id.clone(),
        rows,
        columns: source.columns.len(),
        keyable: rows - index.unkeyable().len(),
        unkeyable: index.unkeyable().len(),
        duplicate_keys: duplicates.len(),
        duplicate_rows,
        duplicate_percentage,
        null_counts,
    }
}

/// Field name and accepted values. A record passes when every entry holds.
type Filter = Vec<(String, Vec<String>)>;

/// An entity with its sources, filters and comparison rules resolved.
struct EntityPlan<'a> {
    rule: &'a EntityRule,
    source: &'a TabularSource,
    target: &'a TabularSource,
    source_filter: Filter,
    target_filter: Filter,
    compare: Vec<(&'a FieldMapping, CompareRule)>,
}

/// Name of `field` on the target side of `rule`: the mapped target field,
/// else the target key field in the same key position, else unchanged.
fn target_name(rule: &EntityRule, source: &TabularSource, target: &TabularSource, field: &str) -> String {
    if let Some(mapping) = rule.mapping_for(field) {
        return mapping.target_field.clone();
    }
    source
        .key_fields
        .iter()
        .position(|k| k == field)
        .and_then(|i| target.key_fields.get(i))
        .cloned()
        .unwrap_or_else(|| field.to_string())
}

/// Entity filters plus the run-wide filters, each applied to the sides that
/// carry the filtered column.
fn entity_filters(
    rule: &EntityRule,
    run_filters: &BTreeMap<String, Vec<String>>,
    source: &TabularSource,
    target: &TabularSource,
) -> (Filter, Filter) {
    let mut source_filter: Filter = rule.source_filter.clone().into_iter().collect();
    let mut target_filter: Filter = rule.target_filter.clone().into_iter().collect();

    for (field, values) in run_filters {
        let target_field = target_name(rule, source, target, field);
        let on_source = source.has_column(field);
        let on_target = target.has_column(&target_field);
        if on_source {
            source_filter.push((field.clone(), values.clone()));
        }
        if on_target {
            target_filter.push((target_field, values.clone()));
        }
        if !on_source && !on_target {
            log::warn!(
                "entity '{}': filter on '{}' matches no column of '{}' or '{}'",
                rule.name,
                field,
                source.id,
                target.id
            );
        }
    }

    (source_filter, target_filter)
}

fn supplied<'a>(input: &'a ReconInput, scope: &str, id: &str) -> Result<&'a TabularSource, ReconError> {
    input.sources.get(id).ok_or_else(|| ReconError::UnknownSource {
        scope: scope.to_string(),
        source: id.to_string(),
    })
}

fn resolve_entities<'a>(
    config: &'a ReconConfig,
    input: &'a ReconInput,
) -> Result<Vec<EntityPlan<'a>>, ReconError> {
    let mut plans = Vec::with_capacity(config.entities.len());
    let mut issues = Vec::new();

    for rule in &config.entities {
        let scope = format!("entity '{}'", rule.name);
        let source = supplied(input, &scope, &rule.source)?;
        let target = supplied(input, &scope, &rule.target)?;

        if source.key_fields.len() != target.key_fields.len() {
            issues.push(RuleIssue::new(
                &scope,
                format!(
                    "supplied source '{}' has {} key field(s) but target '{}' has {}",
                    source.id,
                    source.key_fields.len(),
                    target.id,
                    target.key_fields.len()
                ),
            ));
        }

        let compare = rule
            .fields
            .iter()
            .map(|m| (m, CompareRule::resolve(m, &config.settings)))
            .collect();

        let (source_filter, target_filter) = entity_filters(rule, &config.filters, source, target);

        plans.push(EntityPlan {
            rule,
            source,
            target,
            source_filter,
            target_filter,
            compare,
        });
    }

    if issues.is_empty() {
        Ok(plans)
    } else {
        Err(ReconError::InvalidRules(issues))
    }
}

type Check<'a> = (&'a IntegrityRule, &'a TabularSource, &'a TabularSource);

fn resolve_checks<'a>(config: &'a ReconConfig, input: &'a ReconInput) -> Result<Vec<Check<'a>>, ReconError> {
    config
        .integrity
        .iter()
        .map(|rule| {
            let scope = format!("integrity '{}'", rule.name);
            let dependent = supplied(input, &scope, &rule.dependent)?;
            let referenced = supplied(input, &scope, &rule.referenced)?;
            Ok((rule, dependent, referenced))
        })
        .collect()
}

/// Keep a record only if every filtered field holds one of the listed values.
/// Null never passes a filter.
fn passes(record: &Record, filter: &[(String, Vec<String>)]) -> bool {
    filter.iter().all(|(field, values)| match record.get(field).canonical() {
        Some(v) => values.iter().any(|allowed| allowed.trim() == v),
        None => false,
    })
}

/// Source fields reported as RULE_NOT_DEFINED on every matched pair: the
/// configured `inspect_fields` first, then (with `inspect_unmapped`) every
/// other non-key field seen in the source, sorted.
fn inspected_fields<'a>(
    rule: &EntityRule,
    key_fields: &[String],
    records: impl Iterator<Item = &'a Record>,
) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for field in &rule.inspect_fields {
        if rule.mapping_for(field).is_none() && !fields.contains(field) {
            fields.push(field.clone());
        }
    }

    if rule.inspect_unmapped {
        let seen: BTreeSet<&str> = records.flat_map(|r| r.fields().map(|(name, _)| name)).collect();
        for name in seen {
            let name = name.to_string();
            if rule.mapping_for(&name).is_none()
                && !key_fields.contains(&name)
                && !fields.contains(&name)
            {
                fields.push(name);
            }
        }
    }

    fields
}

fn run_entity(plan: &EntityPlan<'_>, report: &mut ReportBuilder) {
    let rule = plan.rule;
    report.open_scope(ScopeKind::Entity, &rule.name);

    let source_rows = plan
        .source
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| passes(r, &plan.source_filter));
    let target_rows = plan
        .target
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| passes(r, &plan.target_filter));

    let source_index = KeyIndex::build(&plan.source.id, &plan.source.key_fields, source_rows);
    let target_index = KeyIndex::build(&plan.target.id, &plan.target.key_fields, target_rows);
    let partition = partition_keys(&source_index, &target_index);

    let inspected = inspected_fields(
        rule,
        &plan.source.key_fields,
        plan.source
            .records
            .iter()
            .filter(|r| passes(r, &plan.source_filter)),
    );

    log::debug!(
        "entity '{}': {} of {} source / {} of {} target rows, {} matched, {} source-only, {} target-only",
        rule.name,
        source_index.indexed_rows(),
        plan.source.records.len(),
        target_index.indexed_rows(),
        plan.target.records.len(),
        partition.both.len(),
        partition.source_only.len(),
        partition.target_only.len()
    );

    let unmatched = |key, row, status| ComparisonResult {
        entity: rule.name.clone(),
        origin: ResultOrigin::Unmatched,
        key: Some(key),
        row: Some(row),
        field: None,
        mapping: None,
        status,
        source_value: Value::Null,
        target_value: Value::Null,
    };

    for key in &partition.both {
        let (Some((row, src)), Some((_, tgt))) = (source_index.get(key), target_index.get(key)) else {
            continue;
        };

        for (mapping, compare) in &plan.compare {
            let source_value = src.get(&mapping.source_field);
            let target_value = tgt.get(&mapping.target_field);
            report.push(ComparisonResult {
                entity: rule.name.clone(),
                origin: ResultOrigin::Field,
                key: Some(key.clone()),
                row: Some(row),
                field: Some(mapping.source_field.clone()),
                mapping: Some((*mapping).clone()),
                status: classify(Some(compare), source_value, target_value),
                source_value: source_value.clone(),
                target_value: target_value.clone(),
            });
        }

        for field in &inspected {
            let source_value = src.get(field);
            let target_value = tgt.get(field);
            report.push(ComparisonResult {
                entity: rule.name.clone(),
                origin: ResultOrigin::Field,
                key: Some(key.clone()),
                row: Some(row),
                field: Some(field.clone()),
                mapping: None,
                status: classify(None, source_value, target_value),
                source_value: source_value.clone(),
                target_value: target_value.clone(),
            });
        }
    }

    for key in partition.source_only {
        let row = source_index.get(&key).map(|(row, _)| row).unwrap_or_default();
        report.push(unmatched(key, row, ValidationStatus::MissingInTarget));
    }
    for key in partition.target_only {
        let row = target_index.get(&key).map(|(row, _)| row).unwrap_or_default();
        report.push(unmatched(key, row, ValidationStatus::MissingInSource));
    }

    for index in [&source_index, &target_index] {
        for &row in index.unkeyable() {
            report.push(ComparisonResult {
                entity: rule.name.clone(),
                origin: ResultOrigin::Unkeyable {
                    source: index.source().to_string(),
                },
                key: None,
                row: Some(row),
                field: None,
                mapping: None,
                status: ValidationStatus::NotVerifiable,
                source_value: Value::Null,
                target_value: Value::Null,
            });
        }
    }
}
