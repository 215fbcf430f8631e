//! # Dirichlet-Multinomial Likelihood Engine
//!
//! Marginal log-likelihood of a cluster under a per-site independent
//! categorical-Dirichlet conjugate model. For each site the marginal
//! likelihood of the observed allele counts is the ratio of multivariate Beta
//! functions at (prior + counts) versus prior alone, expressed in log-gamma
//! terms; sites are independent, so the cluster log-likelihood is the sum
//! over sites.
//!
//! Most sites are all-consensus for most clusters. Their contribution depends
//! only on the prior row and the cluster size, so the engine precomputes the
//! total all-consensus baseline over all sites for every cluster size up to
//! the sequence count, collapsing sites with identical prior rows. Evaluating
//! a cluster then costs one baseline lookup plus one correction per touched
//! site. The work scales with the nonzero entries rather than the dense cell
//! count.

use std::collections::BTreeMap;
use std::sync::Arc;

use statrs::function::gamma::ln_gamma;

use crate::data::matrix::{SparseAlleleMatrix, ALPHABET};
use crate::data::ClusterCounts;
use crate::error::{BhcError, Result};

/// Numerically stable `ln(exp(a) + exp(b))`.
#[inline]
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}

/// Pure, thread-safe evaluator of cluster marginal log-likelihoods.
///
/// Immutable once constructed; safe to share by reference across parallel
/// hierarchy builds.
#[derive(Debug)]
pub struct LikelihoodEngine {
    prior: Arc<Vec<f64>>,
    /// baseline[n] = sum over all sites of the all-consensus site
    /// log-marginal for a cluster of n sequences
    baseline: Vec<f64>,
}

impl LikelihoodEngine {
    /// Build the engine for one matrix, precomputing the all-consensus
    /// baseline for every cluster size `0..=n_seqs`.
    pub fn new(matrix: &SparseAlleleMatrix) -> Result<Self> {
        let n_max = matrix.n_seqs();

        // Sites sharing a prior row share baseline terms; collapse them.
        // BTreeMap keeps the accumulation order deterministic.
        let mut row_multiplicity: BTreeMap<[u64; ALPHABET], (usize, usize)> = BTreeMap::new();
        for site in 0..matrix.n_sites() {
            let row = matrix.prior_row(site);
            let mut key = [0u64; ALPHABET];
            for (k, &a) in key.iter_mut().zip(row.iter()) {
                *k = a.to_bits();
            }
            row_multiplicity
                .entry(key)
                .and_modify(|(_, mult)| *mult += 1)
                .or_insert((site, 1));
        }

        let mut baseline = vec![0.0f64; n_max + 1];
        for &(rep_site, mult) in row_multiplicity.values() {
            let row = matrix.prior_row(rep_site);
            let a0 = row[0];
            let a_sum: f64 = row.iter().sum();
            let lg_a_sum = ln_gamma(a_sum);
            let lg_a0 = ln_gamma(a0);
            for (n, slot) in baseline.iter_mut().enumerate() {
                let nf = n as f64;
                let term = lg_a_sum - ln_gamma(a_sum + nf) + ln_gamma(a0 + nf) - lg_a0;
                *slot += mult as f64 * term;
            }
        }
        if baseline.iter().any(|b| !b.is_finite()) {
            return Err(BhcError::algorithm(
                "non-finite baseline likelihood during precomputation",
            ));
        }

        Ok(Self {
            prior: Arc::clone(matrix.prior()),
            baseline,
        })
    }

    /// Largest cluster size the baseline covers (the matrix sequence count).
    pub fn max_cluster_size(&self) -> usize {
        self.baseline.len() - 1
    }

    /// All-consensus site log-marginal for one prior row and cluster size.
    #[inline]
    fn consensus_site_term(row: &[f64], nf: f64) -> f64 {
        let a_sum: f64 = row.iter().sum();
        ln_gamma(a_sum) - ln_gamma(a_sum + nf) + ln_gamma(row[0] + nf) - ln_gamma(row[0])
    }

    /// Marginal log-likelihood of a cluster from its sufficient statistic.
    ///
    /// The empty cluster scores exactly 0 (the merge identity).
    pub fn cluster_log_lik(&self, counts: &ClusterCounts) -> Result<f64> {
        let n = counts.n_seqs() as usize;
        if n == 0 {
            return Ok(0.0);
        }
        if n >= self.baseline.len() {
            return Err(BhcError::algorithm(format!(
                "cluster of {} sequences exceeds matrix size {}",
                n,
                self.baseline.len() - 1
            )));
        }
        let nf = n as f64;
        let mut total = self.baseline[n];

        for (site, codes) in counts.touched() {
            let row = &self.prior[site as usize * ALPHABET..(site as usize + 1) * ALPHABET];
            let nonzero: u32 = codes.iter().sum();
            let n0 = nf - nonzero as f64;
            let a_sum: f64 = row.iter().sum();

            let mut site_ll = ln_gamma(a_sum) - ln_gamma(a_sum + nf);
            site_ll += ln_gamma(row[0] + n0) - ln_gamma(row[0]);
            for (c, &cnt) in codes.iter().enumerate() {
                if cnt > 0 {
                    let a = row[c + 1];
                    site_ll += ln_gamma(a + cnt as f64) - ln_gamma(a);
                }
            }
            total += site_ll - Self::consensus_site_term(row, nf);
        }

        if !total.is_finite() {
            return Err(BhcError::algorithm(
                "non-finite cluster log-likelihood",
            ));
        }
        Ok(total)
    }
}
