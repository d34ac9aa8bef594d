use std::collections::HashMap;

use crate::model::{CompositeKey, DuplicateKey, Record};

/// Composite key of `record`, or `None` when any key field is null or blank.
pub fn composite_key(record: &Record, key_fields: &[String]) -> Option<CompositeKey> {
    let mut parts = Vec::with_capacity(key_fields.len());
    for field in key_fields {
        let part = record.get(field).canonical()?;
        if part.is_empty() {
            return None;
        }
        parts.push(part);
    }
    Some(CompositeKey(parts))
}

/// Composite key → record lookup for one source.
///
/// Keys keep first-seen order. When a key repeats, the first record wins and
/// every row carrying the key is kept for the duplicate report.
#[derive(Debug)]
pub struct KeyIndex<'a> {
    source: String,
    order: Vec<CompositeKey>,
    rows_by_key: HashMap<CompositeKey, Vec<(usize, &'a Record)>>,
    unkeyable: Vec<usize>,
    indexed: usize,
}

impl<'a> KeyIndex<'a> {
    /// Index `(row, record)` pairs. Row numbers are positions in the full source,
    /// so a filtered subset still reports rows the operator can find.
    pub fn build<I>(source: &str, key_fields: &[String], rows: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a Record)>,
    {
        let mut order = Vec::new();
        let mut rows_by_key: HashMap<CompositeKey, Vec<(usize, &'a Record)>> = HashMap::new();
        let mut unkeyable = Vec::new();
        let mut indexed = 0;

        for (row, record) in rows {
            indexed += 1;
            match composite_key(record, key_fields) {
                Some(key) => {
                    let entry = rows_by_key.entry(key).or_insert_with_key(|k| {
                        order.push(k.clone());
                        Vec::with_capacity(1)
                    });
                    entry.push((row, record));
                }
                None => unkeyable.push(row),
            }
        }

        Self {
            source: source.to_string(),
            order,
            rows_by_key,
            unkeyable,
            indexed,
        }
    }

    /// Index every record of a source.
    pub fn of_all(source: &str, key_fields: &[String], records: &'a [Record]) -> Self {
        Self::build(source, key_fields, records.iter().enumerate())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Representative (first) row for `key`.
    pub fn get(&self, key: &CompositeKey) -> Option<(usize, &'a Record)> {
        self.rows_by_key.get(key).and_then(|rows| rows.first().copied())
    }

    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.rows_by_key.contains_key(key)
    }

    /// Distinct keys in first-seen order.
    pub fn keys(&self) -> &[CompositeKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Rows whose key fields contain a null.
    pub fn unkeyable(&self) -> &[usize] {
        &self.unkeyable
    }

    /// Number of records passed to [`KeyIndex::build`].
    pub fn indexed_rows(&self) -> usize {
        self.indexed
    }

    /// Keys carried by more than one row, in first-seen order.
    pub fn duplicates(&self) -> Vec<DuplicateKey> {
        self.order
            .iter()
            .filter_map(|key| {
                let rows = &self.rows_by_key[key];
                (rows.len() > 1).then(|| DuplicateKey {
                    source: self.source.clone(),
                    key: key.clone(),
                    rows: rows.iter().map(|(row, _)| *row).collect(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn keys(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    fn site(id: &str, vendor: &str, mrc: f64) -> Record {
        Record::new()
            .with("site_id", id)
            .with("vendor", vendor)
            .with("mrc", mrc)
    }

    #[test]
    fn composite_key_trims_and_orders() {
        let rec = site(" 146 ", "Verizon", 69.0);
        let key = composite_key(&rec, &keys(&["vendor", "site_id"])).unwrap();
        assert_eq!(key.parts(), ["Verizon", "146"]);
        assert_eq!(key.to_string(), "Verizon|146");
    }

    #[test]
    fn null_or_blank_key_is_unkeyable() {
        let rec = Record::new().with("site_id", Value::Null).with("vendor", "x");
        assert!(composite_key(&rec, &keys(&["site_id"])).is_none());
        let rec = Record::new().with("site_id", "   ");
        assert!(composite_key(&rec, &keys(&["site_id"])).is_none());
        let rec = Record::new().with("vendor", "x");
        assert!(composite_key(&rec, &keys(&["site_id"])).is_none());
    }

    #[test]
    fn numeric_key_matches_text_key() {
        let a = Record::new().with("id", 7_i64);
        let b = Record::new().with("id", "7");
        let k = keys(&["id"]);
        assert_eq!(composite_key(&a, &k), composite_key(&b, &k));
    }

    #[test]
    fn first_record_wins_and_duplicates_are_kept() {
        let records = vec![
            site("1", "A", 10.0),
            site("2", "B", 20.0),
            site("1", "A", 99.0),
            site("1", "A", 98.0),
        ];
        let idx = KeyIndex::of_all("sites", &keys(&["site_id"]), &records);

        assert_eq!(idx.len(), 2);
        let (row, rec) = idx.get(&CompositeKey(vec!["1".into()])).unwrap();
        assert_eq!(row, 0);
        assert_eq!(rec.get("mrc"), &Value::Number(10.0));

        let dups = idx.duplicates();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].source, "sites");
        assert_eq!(dups[0].rows, vec![0, 2, 3]);
    }

    #[test]
    fn keys_keep_first_seen_order() {
        let records = vec![site("3", "C", 1.0), site("1", "A", 1.0), site("2", "B", 1.0)];
        let idx = KeyIndex::of_all("s", &keys(&["site_id"]), &records);
        let order: Vec<String> = idx.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(order, vec!["3", "1", "2"]);
    }

    #[test]
    fn unkeyable_rows_are_listed_not_indexed() {
        let records = vec![
            site("1", "A", 1.0),
            Record::new().with("vendor", "B"),
            site("2", "C", 1.0),
        ];
        let idx = KeyIndex::of_all("s", &keys(&["site_id"]), &records);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.unkeyable(), &[1usize]);
        assert_eq!(idx.indexed_rows(), 3);
    }

    #[test]
    fn filtered_subset_keeps_source_rows() {
        let records = vec![site("1", "A", 1.0), site("2", "B", 1.0), site("2", "B", 2.0)];
        let subset = records.iter().enumerate().filter(|(_, r)| r.get("vendor") == &Value::from("B"));
        let idx = KeyIndex::build("s", &keys(&["site_id"]), subset);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.duplicates()[0].rows, vec![1, 2]);
    }
}
