//! Field comparator: one value pair + one rule in, one status out.
//!
//! Evaluation order is fixed and the first applicable step wins:
//! 1. no rule                → RULE_NOT_DEFINED
//! 2. either value null      → NOT_VERIFIABLE
//! 3. exact                  → canonical strings equal?
//! 4. numeric                → both parse and |a-b| <= tolerance?
//!                             (unparseable → NOT_VERIFIABLE)
//! 5. categorical            → out-of-domain value → MISMATCH, else exact
//!
//! Numeric comparison runs on exact decimals, never on binary floats.

use std::collections::BTreeSet;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::config::{CompareType, FieldMapping, Settings};
use crate::model::{ValidationStatus, Value};

/// A field mapping resolved against the run settings.
#[derive(Debug, Clone, PartialEq)]
pub enum CompareRule {
    Exact { fold_case: bool },
    Numeric { tolerance: Decimal },
    Categorical {
        /// Normalized the same way compared values are.
        allowed: Option<BTreeSet<String>>,
        fold_case: bool,
    },
}

impl CompareRule {
    /// Numeric rule from a configured tolerance. Tolerances beyond the
    /// decimal range accept every difference.
    pub fn numeric(tolerance: f64) -> Self {
        CompareRule::Numeric {
            tolerance: decimal_from_f64(tolerance).unwrap_or(Decimal::MAX),
        }
    }

    /// Resolve `mapping`, filling unset options from `settings`.
    /// Assumes the mapping passed config validation.
    pub fn resolve(mapping: &FieldMapping, settings: &Settings) -> Self {
        let fold_case = mapping.case_insensitive.unwrap_or(settings.case_insensitive);
        match mapping.compare {
            CompareType::Exact => CompareRule::Exact { fold_case },
            CompareType::Numeric => CompareRule::numeric(
                mapping
                    .tolerance
                    .or(settings.numeric_tolerance)
                    .unwrap_or(0.0),
            ),
            CompareType::Categorical => CompareRule::Categorical {
                allowed: mapping.allowed_values.as_ref().map(|values| {
                    values.iter().map(|v| normalize(v, fold_case)).collect()
                }),
                fold_case,
            },
        }
    }
}

/// Classify one value pair. `rule` is `None` when no mapping covers the field.
pub fn classify(rule: Option<&CompareRule>, source: &Value, target: &Value) -> ValidationStatus {
    let Some(rule) = rule else {
        return ValidationStatus::RuleNotDefined;
    };

    let (Some(left), Some(right)) = (source.canonical(), target.canonical()) else {
        return ValidationStatus::NotVerifiable;
    };

    match rule {
        CompareRule::Exact { fold_case } => compare_text(&left, &right, *fold_case),
        CompareRule::Numeric { tolerance } => {
            match (as_number(source), as_number(target)) {
                (Some(a), Some(b)) => {
                    if within_tolerance(a, b, *tolerance) {
                        ValidationStatus::Match
                    } else {
                        ValidationStatus::Mismatch
                    }
                }
                _ => ValidationStatus::NotVerifiable,
            }
        }
        CompareRule::Categorical { allowed, fold_case } => {
            if let Some(allowed) = allowed {
                let in_domain = |v: &str| allowed.contains(&normalize(v, *fold_case));
                if !in_domain(&left) || !in_domain(&right) {
                    return ValidationStatus::Mismatch;
                }
            }
            compare_text(&left, &right, *fold_case)
        }
    }
}

fn compare_text(left: &str, right: &str, fold_case: bool) -> ValidationStatus {
    if normalize(left, fold_case) == normalize(right, fold_case) {
        ValidationStatus::Match
    } else {
        ValidationStatus::Mismatch
    }
}

fn normalize(value: &str, fold_case: bool) -> String {
    let trimmed = value.trim();
    if fold_case {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// `|a - b| <= tolerance`, boundary inclusive. A difference too large to
/// represent is never within tolerance.
pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    a.checked_sub(b).is_some_and(|delta| delta.abs() <= tolerance)
}

fn as_number(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => decimal_from_f64(*n),
        Value::Text(s) => parse_amount(s),
        Value::Bool(_) | Value::Null => None,
    }
}

/// The decimal a float prints as, so `100.004` stays `100.004` rather than
/// its nearest binary expansion.
fn decimal_from_f64(n: f64) -> Option<Decimal> {
    if !n.is_finite() {
        return None;
    }
    Decimal::from_str(&n.to_string()).ok().or_else(|| Decimal::from_f64(n))
}

const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Parse an amount as vendor invoices and finance extracts write it:
/// - plain decimals with an optional sign: `-50`, `+7`, `1234.56`
/// - currency symbols and thousands separators: `$1,234.56`, `€ 980`
/// - accounting negatives: `(500.00)`
/// - ERP trailing-minus negatives: `500.00-`
///
/// Anything else (exponents, `NaN`, letters, two signs) is not an amount.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();

    let (negated, body) = if let Some(inner) = trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        (true, inner)
    } else if let Some(inner) = trimmed.strip_suffix('-') {
        (true, inner)
    } else {
        (false, trimmed)
    };

    let digits: String = body
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();

    let (minus, unsigned) = match digits.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, digits.strip_prefix('+').unwrap_or(&digits)),
    };
    if negated && unsigned.len() != digits.len() {
        return None;
    }
    let well_formed = unsigned.chars().all(|c| c.is_ascii_digit() || c == '.')
        && unsigned.chars().any(|c| c.is_ascii_digit())
        && unsigned.matches('.').count() <= 1;
    if !well_formed {
        return None;
    }

    let amount = Decimal::from_str(unsigned).ok()?;
    Some(if negated || minus { -amount } else { amount })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(tol: f64) -> CompareRule {
        CompareRule::numeric(tol)
    }

    fn exact() -> CompareRule {
        CompareRule::Exact { fold_case: false }
    }

    fn categorical(allowed: &[&str], fold_case: bool) -> CompareRule {
        let mapping = FieldMapping::categorical("a", "b", Some(allowed)).fold_case(fold_case);
        CompareRule::resolve(&mapping, &Settings::default())
    }

    #[test]
    fn no_rule_wins_over_everything() {
        let v = Value::from("same");
        assert_eq!(classify(None, &v, &v), ValidationStatus::RuleNotDefined);
        assert_eq!(classify(None, &Value::Null, &Value::Null), ValidationStatus::RuleNotDefined);
    }

    #[test]
    fn null_dominates_every_rule() {
        let rules = [exact(), numeric(1.0), categorical(&["A"], false)];
        for rule in &rules {
            assert_eq!(classify(Some(rule), &Value::Null, &Value::from("A")), ValidationStatus::NotVerifiable);
            assert_eq!(classify(Some(rule), &Value::from("A"), &Value::Null), ValidationStatus::NotVerifiable);
            assert_eq!(classify(Some(rule), &Value::Null, &Value::Null), ValidationStatus::NotVerifiable);
        }
    }

    #[test]
    fn exact_trims_but_keeps_case() {
        let rule = exact();
        assert_eq!(classify(Some(&rule), &Value::from(" Verizon "), &Value::from("Verizon")), ValidationStatus::Match);
        assert_eq!(classify(Some(&rule), &Value::from("verizon"), &Value::from("Verizon")), ValidationStatus::Mismatch);

        let folded = CompareRule::Exact { fold_case: true };
        assert_eq!(classify(Some(&folded), &Value::from("verizon"), &Value::from("VERIZON")), ValidationStatus::Match);
    }

    #[test]
    fn exact_compares_canonical_forms() {
        let rule = exact();
        assert_eq!(classify(Some(&rule), &Value::from(146.0), &Value::from("146")), ValidationStatus::Match);
        assert_eq!(classify(Some(&rule), &Value::from(146.0), &Value::from("146.0")), ValidationStatus::Mismatch);
    }

    #[test]
    fn numeric_scenarios() {
        let rule = numeric(0.01);
        assert_eq!(classify(Some(&rule), &Value::from(100.00), &Value::from(100.004)), ValidationStatus::Match);
        assert_eq!(classify(Some(&rule), &Value::from(100.00), &Value::from(100.02)), ValidationStatus::Mismatch);
        assert_eq!(classify(Some(&rule), &Value::from("$1,000.00"), &Value::from(1000.0)), ValidationStatus::Match);
    }

    #[test]
    fn numeric_tolerance_boundary_is_inclusive() {
        let rule = numeric(0.01);
        assert_eq!(classify(Some(&rule), &Value::from(100.0), &Value::from(100.01)), ValidationStatus::Match);
        assert_eq!(classify(Some(&rule), &Value::from(100.0), &Value::from(100.0101)), ValidationStatus::Mismatch);

        let rule = numeric(0.5);
        assert_eq!(classify(Some(&rule), &Value::from(1.0), &Value::from(1.5)), ValidationStatus::Match);
        assert_eq!(classify(Some(&rule), &Value::from(1.0), &Value::from(1.5000001)), ValidationStatus::Mismatch);

        // Large magnitudes keep their last digit
        let rule = numeric(0.0);
        assert_eq!(
            classify(Some(&rule), &Value::from("1234567890123456"), &Value::from("1234567890123457")),
            ValidationStatus::Mismatch
        );
        assert_eq!(
            classify(Some(&rule), &Value::from("1000000000000.000"), &Value::from("1000000000000.003")),
            ValidationStatus::Mismatch
        );
        assert_eq!(
            classify(Some(&rule), &Value::from("1,000,000,000,000.00"), &Value::from(1e12)),
            ValidationStatus::Match
        );

        let rule = numeric(0.001);
        assert_eq!(
            classify(Some(&rule), &Value::from("1000000000000.000"), &Value::from("1000000000000.001")),
            ValidationStatus::Match
        );
        assert_eq!(
            classify(Some(&rule), &Value::from("1000000000000.000"), &Value::from("1000000000000.0011")),
            ValidationStatus::Mismatch
        );
    }

    #[test]
    fn within_tolerance_on_decimals() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert!(within_tolerance(d("0.1"), d("0.3"), d("0.2")));
        assert!(!within_tolerance(d("0.1"), d("0.3"), d("0.1999999999")));
        assert!(!within_tolerance(Decimal::MAX, Decimal::MIN, Decimal::MAX));
    }

    #[test]
    fn numeric_default_tolerance_is_zero() {
        let rule = CompareRule::resolve(&FieldMapping::numeric("a", "b", None), &Settings::default());
        assert_eq!(rule, CompareRule::Numeric { tolerance: Decimal::ZERO });
        assert_eq!(classify(Some(&rule), &Value::from(1.0), &Value::from(1.0)), ValidationStatus::Match);
        assert_eq!(classify(Some(&rule), &Value::from(1.0), &Value::from(1.001)), ValidationStatus::Mismatch);
    }

    #[test]
    fn settings_tolerance_applies_when_mapping_leaves_it_unset() {
        let settings = Settings {
            numeric_tolerance: Some(0.1),
            case_insensitive: false,
        };
        let rule = CompareRule::resolve(&FieldMapping::numeric("a", "b", None), &settings);
        assert_eq!(rule, numeric(0.1));
        let rule = CompareRule::resolve(&FieldMapping::numeric("a", "b", Some(0.0)), &settings);
        assert_eq!(rule, CompareRule::Numeric { tolerance: Decimal::ZERO });
    }

    #[test]
    fn numeric_unparseable_is_not_verifiable() {
        let rule = numeric(0.01);
        assert_eq!(classify(Some(&rule), &Value::from("N/A"), &Value::from(1.0)), ValidationStatus::NotVerifiable);
        assert_eq!(classify(Some(&rule), &Value::from(true), &Value::from(1.0)), ValidationStatus::NotVerifiable);
        assert_eq!(classify(Some(&rule), &Value::from("inf"), &Value::from("inf")), ValidationStatus::NotVerifiable);
    }

    #[test]
    fn categorical_out_of_domain_is_mismatch_even_when_equal() {
        let rule = categorical(&["DIA", "Broadband"], false);
        assert_eq!(classify(Some(&rule), &Value::from("CPE"), &Value::from("CPE")), ValidationStatus::Mismatch);
        assert_eq!(classify(Some(&rule), &Value::from("DIA"), &Value::from("CPE")), ValidationStatus::Mismatch);
        assert_eq!(classify(Some(&rule), &Value::from("DIA"), &Value::from("DIA")), ValidationStatus::Match);
        assert_eq!(classify(Some(&rule), &Value::from("DIA"), &Value::from("Broadband")), ValidationStatus::Mismatch);
    }

    #[test]
    fn categorical_case_folding_applies_to_domain() {
        let strict = categorical(&["DIA"], false);
        assert_eq!(classify(Some(&strict), &Value::from("dia"), &Value::from("DIA")), ValidationStatus::Mismatch);

        let folded = categorical(&["DIA"], true);
        assert_eq!(classify(Some(&folded), &Value::from("dia"), &Value::from("DIA")), ValidationStatus::Match);
    }

    #[test]
    fn categorical_without_domain_compares_exactly() {
        let rule = CompareRule::resolve(&FieldMapping::categorical("a", "b", None), &Settings::default());
        assert_eq!(classify(Some(&rule), &Value::from("CPE"), &Value::from("CPE")), ValidationStatus::Match);
        assert_eq!(classify(Some(&rule), &Value::from("CPE"), &Value::from("DIA")), ValidationStatus::Mismatch);
    }

    #[test]
    fn parse_amount_formats() {
        let d = |s: &str| Some(Decimal::from_str(s).unwrap());
        assert_eq!(parse_amount("123.45"), d("123.45"));
        assert_eq!(parse_amount("-50"), d("-50"));
        assert_eq!(parse_amount("+7"), d("7"));
        assert_eq!(parse_amount("$1,234.56"), d("1234.56"));
        assert_eq!(parse_amount("€ 980"), d("980"));
        assert_eq!(parse_amount("(500.00)"), d("-500.00"));
        assert_eq!(parse_amount("500.00-"), d("-500.00"));
        assert_eq!(parse_amount("  7  "), d("7"));
    }

    #[test]
    fn parse_amount_rejects_non_amounts() {
        for text in ["", "$", "-", ".", "12abc", "NaN", "inf", "1e5", "(-5)", "-5-", "1.2.3"] {
            assert_eq!(parse_amount(text), None, "{text:?}");
        }
    }
}
