use crate::index::KeyIndex;
use crate::model::CompositeKey;

/// Split of the keys of two indexed sources.
///
/// `both` and `source_only` follow source first-seen order, `target_only`
/// follows target first-seen order. The three lists never share a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPartition {
    pub both: Vec<CompositeKey>,
    pub source_only: Vec<CompositeKey>,
    pub target_only: Vec<CompositeKey>,
}

impl KeyPartition {
    pub fn total(&self) -> usize {
        self.both.len() + self.source_only.len() + self.target_only.len()
    }
}

/// Partition keys by exact composite-key equality. One pass over each index.
pub fn partition_keys(source: &KeyIndex<'_>, target: &KeyIndex<'_>) -> KeyPartition {
    let mut both = Vec::new();
    let mut source_only = Vec::new();

    for key in source.keys() {
        if target.contains(key) {
            both.push(key.clone());
        } else {
            source_only.push(key.clone());
        }
    }

    let target_only = target
        .keys()
        .iter()
        .filter(|key| !source.contains(key))
        .cloned()
        .collect();

    KeyPartition {
        both,
        source_only,
        target_only,
    }
}
