//! # Merge Posterior Evaluation
//!
//! The single merge-scoring step shared by the agglomerative builder and the
//! fixed-tree optimizer: evaluating a fixed tree node is the same computation
//! as one agglomeration step, just without the greedy search.
//!
//! Each cluster arm carries the Bayesian hierarchical clustering
//! mixing-weight state `d` (Heller & Ghahramani recursion) alongside its
//! sufficient statistic and subtree evidence, all in log space:
//!
//! - leaf: `ln d = ln gamma` (the Dirichlet-process concentration)
//! - merge of i, j with n_k leaves:
//!   `ln d_k = logsumexp(ln gamma + lnGamma(n_k), ln d_i + ln d_j)`
//!   `ln pi_k = ln gamma + lnGamma(n_k) - ln d_k`
//!   `ln(1 - pi_k) = ln d_i + ln d_j - ln d_k`
//! - subtree evidence:
//!   `p(D_k|T_k) = pi_k L(merged) + (1 - pi_k) p(D_i|T_i) p(D_j|T_j)`
//! - merge posterior ratio: `rk = pi_k L(merged) / p(D_k|T_k)`, always in
//!   [0, 1] by construction.

use statrs::function::gamma::ln_gamma;

use crate::data::ClusterCounts;
use crate::error::{BhcError, Result};
use crate::model::likelihood::{log_sum_exp, LikelihoodEngine};

/// An active cluster in an agglomeration or a scored tree node.
#[derive(Clone, Debug)]
pub struct ClusterArm {
    /// Aggregated allele counts of all sequences under this cluster
    pub counts: ClusterCounts,
    /// Log mixing-weight denominator of the BHC recursion
    pub log_d: f64,
    /// Log subtree evidence p(D|T)
    pub log_p_tree: f64,
}

impl ClusterArm {
    /// Initial arm for a leaf cluster (singleton or pre-clustered group).
    pub fn leaf(engine: &LikelihoodEngine, counts: ClusterCounts, ln_conc: f64) -> Result<Self> {
        let log_lik = engine.cluster_log_lik(&counts)?;
        Ok(Self {
            counts,
            log_d: ln_conc,
            log_p_tree: log_lik,
        })
    }
}

/// Scores produced by evaluating one candidate or fixed merge.
#[derive(Clone, Debug)]
pub struct MergeOutcome {
    /// The merged cluster's arm (counts, log_d, log_p_tree)
    pub arm: ClusterArm,
    /// Marginal log-likelihood of the union under the one-cluster hypothesis
    pub log_lik_merged: f64,
    /// Log merge posterior ratio, <= 0
    pub log_rk: f64,
}

/// Evaluate the merge of two disjoint cluster arms.
pub fn evaluate_merge(
    engine: &LikelihoodEngine,
    ln_conc: f64,
    a: &ClusterArm,
    b: &ClusterArm,
) -> Result<MergeOutcome> {
    let counts = a.counts.merge_with(&b.counts);
    let n_k = counts.n_seqs() as f64;

    let log_weight = ln_conc + ln_gamma(n_k);
    let log_d = log_sum_exp(log_weight, a.log_d + b.log_d);
    let log_pi = log_weight - log_d;
    let log_one_minus_pi = a.log_d + b.log_d - log_d;

    let log_lik_merged = engine.cluster_log_lik(&counts)?;
    let merged_term = log_pi + log_lik_merged;
    let split_term = log_one_minus_pi + a.log_p_tree + b.log_p_tree;
    let log_p_tree = log_sum_exp(merged_term, split_term);
    let log_rk = merged_term - log_p_tree;

    if !log_rk.is_finite() && log_rk != f64::NEG_INFINITY {
        return Err(BhcError::algorithm("non-finite merge posterior ratio"));
    }

    Ok(MergeOutcome {
        arm: ClusterArm {
            counts,
            log_d,
            log_p_tree,
        },
        log_lik_merged,
        log_rk,
    })
}
