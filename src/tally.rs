//! Counting resource records into categories.
//!
//! A [`Tally`] is a plain sum per category name. Folding is commutative, so
//! records may arrive in any order and partial tallies built by concurrent
//! workers can be merged afterwards.

use std::collections::BTreeMap;

use futures::{Stream, TryStreamExt};

use crate::error::{CensusError, Result};
use crate::model::ResourceRecord;
use crate::report::CategoryCount;
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    counts: BTreeMap<String, u64>,
    unclassified: u64,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one record and add its weight.
    pub fn add(&mut self, taxonomy: &Taxonomy, record: &ResourceRecord) {
        match taxonomy.classify(record) {
            Some(category) => {
                *self.counts.entry(category.name.clone()).or_default() += record.weight;
            }
            None => self.unclassified += 1,
        }
    }

    pub fn merge(&mut self, other: Self) {
        for (category, count) in other.counts {
            *self.counts.entry(category).or_default() += count;
        }
        self.unclassified += other.unclassified;
    }

    pub fn count(&self, category: &str) -> u64 {
        self.counts.get(category).copied().unwrap_or(0)
    }

    /// Records that matched no rule.
    pub const fn unclassified(&self) -> u64 {
        self.unclassified
    }

    /// One entry per taxonomy category, in taxonomy order, zero-filled.
    pub fn category_counts(&self, taxonomy: &Taxonomy) -> Vec<CategoryCount> {
        taxonomy
            .categories()
            .iter()
            .map(|category| CategoryCount {
                name: category.name.clone(),
                count: self.count(&category.name),
                unit: category.unit.clone(),
            })
            .collect()
    }
}

/// Fold a record stream into a tally, stopping at the first error.
pub async fn aggregate<S>(taxonomy: &Taxonomy, records: S) -> Result<Tally>
where
    S: Stream<Item = Result<ResourceRecord>>,
{
    records
        .try_fold(Tally::new(), |mut tally, record| async move {
            tally.add(taxonomy, &record);
            Ok::<_, CensusError>(tally)
        })
        .await
}

#[cfg(test)]
pub fn tally_of<I>(taxonomy: &Taxonomy, records: I) -> Tally
where
    I: IntoIterator<Item = ResourceRecord>,
{
    records.into_iter().fold(Tally::new(), |mut tally, record| {
        tally.add(taxonomy, &record);
        tally
    })
}
