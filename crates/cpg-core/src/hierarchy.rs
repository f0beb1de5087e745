//! Record hierarchy used for nominal subtyping.
//!
//! Frontends register every record (class, struct, interface) together with
//! the names of its direct super-records. The join in the propagation crate
//! asks this registry for ancestors and lowest common ancestors. Super-record
//! names that were never registered are treated as roots.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Registry of records and their direct super-records, in registration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordHierarchy {
    supers: IndexMap<String, Vec<String>>,
}

impl RecordHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record with its direct super-records.
    ///
    /// Returns [`CoreError::DuplicateRecord`] if the name is already known.
    pub fn register(&mut self, name: &str, supers: &[String]) -> Result<(), CoreError> {
        if self.supers.contains_key(name) {
            return Err(CoreError::DuplicateRecord {
                name: name.to_string(),
            });
        }
        self.supers.insert(name.to_string(), supers.to_vec());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.supers.contains_key(name)
    }

    /// Direct super-records of `name` (empty for unknown records).
    pub fn direct_supers(&self, name: &str) -> &[String] {
        self.supers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.supers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supers.is_empty()
    }

    /// All ancestors of `name` including itself, mapped to their shortest
    /// distance. Breadth-first, so iteration order is nearest first.
    pub fn ancestors(&self, name: &str) -> IndexMap<String, usize> {
        let mut seen: IndexMap<String, usize> = IndexMap::new();
        let mut queue = VecDeque::from([(name.to_string(), 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if seen.contains_key(&current) {
                continue;
            }
            for parent in self.direct_supers(&current) {
                queue.push_back((parent.clone(), depth + 1));
            }
            seen.insert(current, depth);
        }
        seen
    }

    /// Returns `true` if `sub` equals `sup` or inherits from it.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        sub == sup || self.ancestors(sub).contains_key(sup)
    }

    /// The common ancestor closest to all `names`.
    ///
    /// Candidates are ranked by the summed distance from every member; ties
    /// keep the breadth-first order of the first member, which makes the
    /// result deterministic for a given registration order.
    pub fn lowest_common_ancestor(&self, names: &[&str]) -> Option<String> {
        let (first, rest) = names.split_first()?;
        let mut common = self.ancestors(first);

        for name in rest {
            let other = self.ancestors(name);
            common = common
                .into_iter()
                .filter_map(|(ancestor, depth)| {
                    other.get(&ancestor).map(|d| (ancestor, depth + d))
                })
                .collect();
        }

        common
            .into_iter()
            .enumerate()
            .min_by_key(|(position, (_, distance))| (*distance, *position))
            .map(|(_, (ancestor, _))| ancestor)
    }
}
