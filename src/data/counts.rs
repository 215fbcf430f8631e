//! # Cluster Sufficient Statistic
//!
//! Aggregated per-site allele counts for a set of sequences. The statistic is
//! additive: the statistic of a union of disjoint sequence sets is the
//! elementwise sum of the parts, which is what makes bottom-up dynamic
//! programming over a hierarchy correct.
//!
//! Only sites touched by at least one non-consensus code are stored; the
//! consensus count at any site is recoverable as `n_seqs - sum(nonzero)`.

use std::collections::BTreeMap;

use crate::data::matrix::N_VARIANT_CODES;

/// Additive allele-count summary of a cluster.
///
/// Touched sites live in a `BTreeMap` so iteration (and therefore every
/// floating-point summation downstream) is deterministic.
#[derive(Clone, Debug, Default)]
pub struct ClusterCounts {
    n_seqs: u32,
    /// site -> counts per non-consensus code (index c holds code c + 1)
    sites: BTreeMap<u32, [u32; N_VARIANT_CODES]>,
}

impl ClusterCounts {
    /// The empty cluster: the identity element for merges.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of sequences aggregated into this statistic.
    pub fn n_seqs(&self) -> u32 {
        self.n_seqs
    }

    /// Number of sites with at least one non-consensus count.
    pub fn n_touched_sites(&self) -> usize {
        self.sites.len()
    }

    /// Fold one sequence's sorted nonzero (site, code) entries in.
    pub fn add_sequence(&mut self, entries: &[(u32, u8)]) {
        self.n_seqs += 1;
        for &(site, code) in entries {
            let row = self.sites.entry(site).or_default();
            row[code as usize - 1] += 1;
        }
    }

    /// Elementwise sum with another statistic (disjoint sequence sets).
    pub fn merge_with(&self, other: &Self) -> Self {
        let (big, small) = if self.sites.len() >= other.sites.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut merged = big.clone();
        merged.n_seqs = self.n_seqs + other.n_seqs;
        for (&site, row) in &small.sites {
            let target = merged.sites.entry(site).or_default();
            for (t, &c) in target.iter_mut().zip(row.iter()) {
                *t += c;
            }
        }
        merged
    }

    /// Iterate over touched sites and their non-consensus code counts.
    pub fn touched(&self) -> impl Iterator<Item = (u32, &[u32; N_VARIANT_CODES])> {
        self.sites.iter().map(|(&site, row)| (site, row))
    }

    /// Implicit consensus-code count at a site.
    pub fn consensus_count(&self, site: u32) -> u32 {
        let nonzero: u32 = self
            .sites
            .get(&site)
            .map(|row| row.iter().sum())
            .unwrap_or(0);
        self.n_seqs - nonzero
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts_of(entries: &[&[(u32, u8)]]) -> ClusterCounts {
        let mut c = ClusterCounts::empty();
        for e in entries {
            c.add_sequence(e);
        }
        c
    }

    #[test]
    fn test_additivity() {
        let a = counts_of(&[&[(0, 1), (5, 2)], &[(0, 1)]]);
        let b = counts_of(&[&[(5, 4)], &[(7, 1)]]);
        let union = a.merge_with(&b);
        let direct = counts_of(&[&[(0, 1), (5, 2)], &[(0, 1)], &[(5, 4)], &[(7, 1)]]);

        assert_eq!(union.n_seqs(), direct.n_seqs());
        assert_eq!(union.n_touched_sites(), direct.n_touched_sites());
        for (site, row) in direct.touched() {
            let got = union.sites.get(&site).unwrap();
            assert_eq!(got, row, "site {site}");
        }
    }

    #[test]
    fn test_empty_is_identity() {
        let a = counts_of(&[&[(3, 2)]]);
        let merged = a.merge_with(&ClusterCounts::empty());
        assert_eq!(merged.n_seqs(), a.n_seqs());
        assert_eq!(merged.consensus_count(3), 0);
        assert_eq!(merged.consensus_count(4), 1);
    }

    #[test]
    fn test_consensus_count() {
        let c = counts_of(&[&[(1, 1)], &[], &[(1, 3)]]);
        assert_eq!(c.n_seqs(), 3);
        assert_eq!(c.consensus_count(1), 1);
        assert_eq!(c.consensus_count(0), 3);
    }
}
