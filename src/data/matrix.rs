//! # Sparse Allele Matrix
//!
//! The main input data structure: a sites x sequences matrix of allele codes
//! stored sparsely. Code 0 means "matches the consensus allele at this site";
//! codes 1..=4 identify a specific non-consensus allele. Only nonzero codes
//! are stored, one sorted (site, code) list per sequence.
//!
//! The matrix carries two companion tables:
//! - `consensus`: the reference symbol per site (informational; the code
//!   space is already consensus-relative),
//! - `prior`: a sites x alphabet table of strictly positive Dirichlet
//!   pseudo-counts, indexed by allele code.

use std::sync::Arc;

use crate::data::{ClusterCounts, SeqIdx, SeqLabels};
use crate::error::{BhcError, Result};

/// Alphabet size: A, C, G, T plus a gap/other category.
pub const ALPHABET: usize = 5;

/// Number of non-consensus allele codes per site.
pub const N_VARIANT_CODES: usize = ALPHABET - 1;

/// Sparse per-site allele codes for a set of aligned sequences.
///
/// Column data, consensus and prior tables are shared via `Arc` so that
/// prior swaps (prior optimization) and column restriction (multi-resolution
/// recursion) stay cheap.
#[derive(Clone, Debug)]
pub struct SparseAlleleMatrix {
    labels: Arc<SeqLabels>,
    n_sites: usize,
    /// Per sequence: sorted (site, code) entries, code in 1..ALPHABET
    columns: Arc<Vec<Vec<(u32, u8)>>>,
    /// Consensus symbol per site
    consensus: Arc<Vec<u8>>,
    /// Row-major n_sites x ALPHABET pseudo-count table, indexed by code
    prior: Arc<Vec<f64>>,
}

impl SparseAlleleMatrix {
    /// Assemble and validate a matrix.
    ///
    /// Column entries must be sorted by site with no duplicate site per
    /// sequence; every pseudo-count must be finite and strictly positive.
    pub fn new(
        labels: Arc<SeqLabels>,
        n_sites: usize,
        columns: Vec<Vec<(u32, u8)>>,
        consensus: Vec<u8>,
        prior: Vec<f64>,
    ) -> Result<Self> {
        if columns.len() != labels.len() {
            return Err(BhcError::invalid_data(format!(
                "{} columns for {} sequence labels",
                columns.len(),
                labels.len()
            )));
        }
        if consensus.len() != n_sites {
            return Err(BhcError::invalid_data(format!(
                "consensus table has {} entries for {} sites",
                consensus.len(),
                n_sites
            )));
        }
        if prior.len() != n_sites * ALPHABET {
            return Err(BhcError::invalid_data(format!(
                "prior table has {} entries, expected {}",
                prior.len(),
                n_sites * ALPHABET
            )));
        }
        if prior.iter().any(|&a| !a.is_finite() || a <= 0.0) {
            return Err(BhcError::invalid_data(
                "prior pseudo-counts must be finite and strictly positive",
            ));
        }
        for (seq, column) in columns.iter().enumerate() {
            let mut last_site: Option<u32> = None;
            for &(site, code) in column {
                if site as usize >= n_sites {
                    return Err(BhcError::invalid_data(format!(
                        "sequence {} has entry at site {} beyond {} sites",
                        seq, site, n_sites
                    )));
                }
                if code == 0 || code as usize >= ALPHABET {
                    return Err(BhcError::invalid_data(format!(
                        "sequence {} has invalid allele code {} at site {}",
                        seq, code, site
                    )));
                }
                if last_site.is_some_and(|prev| prev >= site) {
                    return Err(BhcError::invalid_data(format!(
                        "sequence {} has unsorted or duplicate entry at site {}",
                        seq, site
                    )));
                }
                last_site = Some(site);
            }
        }
        Ok(Self {
            labels,
            n_sites,
            columns: Arc::new(columns),
            consensus: Arc::new(consensus),
            prior: Arc::new(prior),
        })
    }

    pub fn n_seqs(&self) -> usize {
        self.labels.len()
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn labels(&self) -> &Arc<SeqLabels> {
        &self.labels
    }

    /// Nonzero (site, code) entries for one sequence, sorted by site.
    pub fn column(&self, seq: SeqIdx) -> &[(u32, u8)] {
        &self.columns[seq.as_usize()]
    }

    /// Pseudo-count row for one site, indexed by allele code.
    #[inline]
    pub fn prior_row(&self, site: usize) -> &[f64] {
        &self.prior[site * ALPHABET..(site + 1) * ALPHABET]
    }

    pub fn prior(&self) -> &Arc<Vec<f64>> {
        &self.prior
    }

    pub fn consensus(&self) -> &[u8] {
        &self.consensus
    }

    /// Total number of nonzero entries.
    pub fn nnz(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Sorted site indices carrying at least one non-consensus code.
    pub fn variant_sites(&self) -> Vec<u32> {
        let mut sites: Vec<u32> = self
            .columns
            .iter()
            .flat_map(|col| col.iter().map(|&(site, _)| site))
            .collect();
        sites.sort_unstable();
        sites.dedup();
        sites
    }

    /// Aggregated sufficient statistic for a set of sequences.
    pub fn counts_for<I>(&self, seqs: I) -> ClusterCounts
    where
        I: IntoIterator<Item = SeqIdx>,
    {
        let mut counts = ClusterCounts::empty();
        for seq in seqs {
            counts.add_sequence(self.column(seq));
        }
        counts
    }

    /// Sufficient statistic for a single sequence.
    pub fn singleton_counts(&self, seq: SeqIdx) -> ClusterCounts {
        self.counts_for([seq])
    }

    /// Same columns and consensus under a different prior table.
    pub fn with_prior(&self, prior: Vec<f64>) -> Result<Self> {
        if prior.len() != self.n_sites * ALPHABET {
            return Err(BhcError::invalid_data(format!(
                "prior table has {} entries, expected {}",
                prior.len(),
                self.n_sites * ALPHABET
            )));
        }
        if prior.iter().any(|&a| !a.is_finite() || a <= 0.0) {
            return Err(BhcError::invalid_data(
                "prior pseudo-counts must be finite and strictly positive",
            ));
        }
        Ok(Self {
            labels: Arc::clone(&self.labels),
            n_sites: self.n_sites,
            columns: Arc::clone(&self.columns),
            consensus: Arc::clone(&self.consensus),
            prior: Arc::new(prior),
        })
    }

    /// Restrict to a subset of sequences, preserving the given order.
    ///
    /// Sites, consensus and prior are unchanged; only the columns and label
    /// registry shrink. Used by the multi-resolution recursion.
    pub fn restrict(&self, seqs: &[SeqIdx]) -> Result<Self> {
        if seqs.is_empty() {
            return Err(BhcError::invalid_data(
                "cannot restrict matrix to an empty sequence set",
            ));
        }
        let mut sub_labels = Vec::with_capacity(seqs.len());
        let mut sub_columns = Vec::with_capacity(seqs.len());
        for &seq in seqs {
            if seq.as_usize() >= self.n_seqs() {
                return Err(BhcError::invalid_data(format!(
                    "sequence index {} out of range ({} sequences)",
                    seq.0,
                    self.n_seqs()
                )));
            }
            sub_labels.push(self.labels.label(seq).to_string());
            sub_columns.push(self.columns[seq.as_usize()].clone());
        }
        let labels = SeqLabels::from_labels(sub_labels)?;
        Ok(Self {
            labels,
            n_sites: self.n_sites,
            columns: Arc::new(sub_columns),
            consensus: Arc::clone(&self.consensus),
            prior: Arc::clone(&self.prior),
        })
    }
}

/// The two fixed baseline prior tables a matrix's prior interpolates between.
#[derive(Clone, Debug)]
pub struct PriorPair {
    n_sites: usize,
    symmetric: Vec<f64>,
    population: Vec<f64>,
}

impl PriorPair {
    pub fn new(n_sites: usize, symmetric: Vec<f64>, population: Vec<f64>) -> Result<Self> {
        if symmetric.len() != n_sites * ALPHABET || population.len() != n_sites * ALPHABET {
            return Err(BhcError::invalid_data(
                "baseline prior tables must be n_sites x alphabet",
            ));
        }
        if symmetric
            .iter()
            .chain(population.iter())
            .any(|&a| !a.is_finite() || a <= 0.0)
        {
            return Err(BhcError::invalid_data(
                "baseline prior pseudo-counts must be finite and strictly positive",
            ));
        }
        Ok(Self {
            n_sites,
            symmetric,
            population,
        })
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn symmetric(&self) -> &[f64] {
        &self.symmetric
    }

    pub fn population(&self) -> &[f64] {
        &self.population
    }

    /// Convex combination `(1 - lambda) * symmetric + lambda * population`.
    pub fn mixed(&self, lambda: f64) -> Result<Vec<f64>> {
        if !(0.0..=1.0).contains(&lambda) {
            return Err(BhcError::config(format!(
                "prior mixing parameter {lambda} outside [0, 1]"
            )));
        }
        Ok(self
            .symmetric
            .iter()
            .zip(self.population.iter())
            .map(|(&s, &p)| (1.0 - lambda) * s + lambda * p)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_matrix() -> SparseAlleleMatrix {
        let labels =
            SeqLabels::from_labels(vec!["s0".into(), "s1".into(), "s2".into()]).unwrap();
        let columns = vec![vec![(0, 1), (2, 2)], vec![(0, 1)], vec![]];
        let consensus = vec![0u8; 3];
        let prior = vec![1.0; 3 * ALPHABET];
        SparseAlleleMatrix::new(labels, 3, columns, consensus, prior).unwrap()
    }

    #[test]
    fn test_variant_sites() {
        let m = tiny_matrix();
        assert_eq!(m.variant_sites(), vec![0, 2]);
        assert_eq!(m.nnz(), 3);
    }

    #[test]
    fn test_rejects_bad_code() {
        let labels = SeqLabels::from_labels(vec!["a".into()]).unwrap();
        let bad = SparseAlleleMatrix::new(
            labels,
            2,
            vec![vec![(0, 0)]],
            vec![0, 0],
            vec![1.0; 2 * ALPHABET],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_rejects_nonpositive_prior() {
        let labels = SeqLabels::from_labels(vec!["a".into()]).unwrap();
        let mut prior = vec![1.0; 2 * ALPHABET];
        prior[3] = 0.0;
        let bad = SparseAlleleMatrix::new(labels, 2, vec![vec![]], vec![0, 0], prior);
        assert!(bad.is_err());
    }

    #[test]
    fn test_restrict_preserves_order() {
        let m = tiny_matrix();
        let sub = m.restrict(&[SeqIdx::new(2), SeqIdx::new(0)]).unwrap();
        assert_eq!(sub.n_seqs(), 2);
        assert_eq!(sub.labels().label(SeqIdx::new(0)), "s2");
        assert_eq!(sub.column(SeqIdx::new(1)), &[(0, 1), (2, 2)]);
        assert_eq!(sub.n_sites(), 3);
    }

    #[test]
    fn test_prior_pair_mixing() {
        let pair = PriorPair::new(1, vec![1.0; ALPHABET], vec![2.0; ALPHABET]).unwrap();
        let mixed = pair.mixed(0.25).unwrap();
        assert!((mixed[0] - 1.25).abs() < 1e-12);
        assert!(pair.mixed(1.5).is_err());
    }
}
