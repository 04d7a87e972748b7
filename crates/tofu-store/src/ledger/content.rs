//! Content sets and the diff between two of them

use std::collections::BTreeMap;

use tofu_core::types::{ContentRecord, RecordKey};

use super::ContentQuery;

/// Deduplicated set of content records, keyed by record identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSet {
    records: BTreeMap<RecordKey, ContentRecord>,
}

/// Difference between two content sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDiff {
    pub added: Vec<ContentRecord>,
    pub removed: Vec<ContentRecord>,
    /// Records present on both sides
    pub unchanged: usize,
}

impl ContentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a record. A record whose identity is already present is a
    /// no-op and the first declaration wins.
    pub fn insert(&mut self, record: ContentRecord) -> bool {
        let key = record.key();
        if self.records.contains_key(&key) {
            return false;
        }
        self.records.insert(key, record);
        true
    }

    pub fn get(&self, key: &RecordKey) -> Option<&ContentRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in identity order
    pub fn iter(&self) -> impl Iterator<Item = &ContentRecord> {
        self.records.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.records.keys()
    }

    /// Union with a newer set; records in `newer` replace same-identity ones here
    pub fn union(&self, newer: &ContentSet) -> ContentSet {
        let mut records = self.records.clone();
        for (key, record) in &newer.records {
            records.insert(key.clone(), record.clone());
        }
        ContentSet { records }
    }

    /// What changed going from `previous` to `self`
    pub fn diff_from(&self, previous: &ContentSet) -> ContentDiff {
        let added = self
            .records
            .iter()
            .filter(|(key, _)| !previous.records.contains_key(*key))
            .map(|(_, record)| record.clone())
            .collect::<Vec<_>>();
        let removed = previous
            .records
            .iter()
            .filter(|(key, _)| !self.records.contains_key(*key))
            .map(|(_, record)| record.clone())
            .collect();

        ContentDiff {
            unchanged: self.records.len() - added.len(),
            added,
            removed,
        }
    }

    /// Records matching a filter, in identity order
    pub fn query<'a>(&'a self, query: &'a ContentQuery) -> impl Iterator<Item = &'a ContentRecord> + 'a {
        self.records.values().filter(move |record| query.matches(record))
    }

    /// Distinct versions of one address, as advertised by the registry
    pub fn versions_of(&self, address_path: &str) -> Vec<&str> {
        let mut versions: Vec<&str> = self
            .records
            .values()
            .filter(|record| record.address.path() == address_path)
            .map(|record| record.version.as_str())
            .collect();
        versions.dedup();
        versions
    }
}

impl ContentDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl FromIterator<ContentRecord> for ContentSet {
    fn from_iter<I: IntoIterator<Item = ContentRecord>>(iter: I) -> Self {
        let mut set = ContentSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl IntoIterator for ContentSet {
    type Item = ContentRecord;
    type IntoIter = std::collections::btree_map::IntoValues<RecordKey, ContentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tofu_core::types::Address;

    fn module(version: &str) -> ContentRecord {
        ContentRecord::module(
            Address::parse("hashicorp/consul/aws").unwrap(),
            version,
            &format!("https://example.com/{}.tar.gz", version),
        )
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut set = ContentSet::new();
        assert!(set.insert(module("1.0.0")));
        assert!(!set.insert(module("1.0.0").with_protocols(["5.0"])));
        assert_eq!(set.len(), 1);
        assert!(set.iter().next().unwrap().protocols.is_empty());
    }

    #[test]
    fn test_union_keeps_everything() {
        let previous: ContentSet = [module("1.0.0"), module("1.1.0")].into_iter().collect();
        let fetched: ContentSet = [module("1.1.0"), module("1.2.0")].into_iter().collect();

        let merged = previous.union(&fetched);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_diff_from() {
        let previous: ContentSet = [module("1.0.0"), module("1.1.0")].into_iter().collect();
        let current: ContentSet = [module("1.1.0"), module("1.2.0")].into_iter().collect();

        let diff = current.diff_from(&previous);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].version, "1.2.0");
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].version, "1.0.0");
        assert_eq!(diff.unchanged, 1);
        assert!(!diff.is_empty());

        assert!(current.diff_from(&current).is_empty());
    }

    #[test]
    fn test_versions_of() {
        let set: ContentSet = [module("1.0.0"), module("1.1.0")].into_iter().collect();
        assert_eq!(set.versions_of("hashicorp/consul/aws"), vec!["1.0.0", "1.1.0"]);
        assert!(set.versions_of("hashicorp/consul/gcp").is_empty());
    }
}
