//! # Bayesian Hierarchical Clustering Builder
//!
//! Greedy agglomeration: repeatedly merge the pair of active clusters with
//! the largest merge posterior ratio until one cluster remains, recording
//! each merge and its `rk` into a [`Hierarchy`].
//!
//! Candidate pairs live in a max-heap keyed by `log_rk` with lazy
//! invalidation: node ids are never reused, so a popped candidate is stale
//! exactly when one of its endpoints is no longer active. This keeps the
//! exact greedy semantics (some globally maximal pair is always chosen; ties
//! break deterministically toward smaller node ids) while avoiding a full
//! rescan after every merge. Tests check the heap against a brute-force
//! reference on small inputs.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::data::matrix::SparseAlleleMatrix;
use crate::data::SeqIdx;
use crate::error::{BhcError, Result};
use crate::model::hierarchy::Hierarchy;
use crate::model::likelihood::LikelihoodEngine;
use crate::model::merge::{evaluate_merge, ClusterArm};

/// Agglomeration parameters.
#[derive(Clone, Debug)]
pub struct BhcParams {
    /// Dirichlet-process concentration of the merge prior
    pub concentration: f64,
    /// Optional pre-clustered starting groups; singletons when `None`
    pub initial_clusters: Option<Vec<Vec<SeqIdx>>>,
}

impl Default for BhcParams {
    fn default() -> Self {
        Self {
            concentration: 1.0,
            initial_clusters: None,
        }
    }
}

/// Result of one agglomeration run.
#[derive(Debug)]
pub struct BhcOutcome {
    /// The fully built hierarchy with every internal node's log-likelihood
    /// and merge posterior ratio populated
    pub hierarchy: Hierarchy,
    /// Log marginal likelihood of the whole tree, p(D|T) at the root
    pub root_log_evidence: f64,
}

#[derive(Debug)]
struct Candidate {
    log_rk: f64,
    left: usize,
    right: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: larger rk wins; equal rk prefers smaller node ids.
        self.log_rk
            .total_cmp(&other.log_rk)
            .then_with(|| other.left.cmp(&self.left))
            .then_with(|| other.right.cmp(&self.right))
    }
}

/// Greedy BHC agglomerator over a sparse allele matrix.
pub struct HierarchyBuilder<'a> {
    engine: &'a LikelihoodEngine,
    matrix: &'a SparseAlleleMatrix,
    params: BhcParams,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(engine: &'a LikelihoodEngine, matrix: &'a SparseAlleleMatrix) -> Self {
        Self {
            engine,
            matrix,
            params: BhcParams::default(),
        }
    }

    pub fn with_params(mut self, params: BhcParams) -> Result<Self> {
        if !(params.concentration.is_finite() && params.concentration > 0.0) {
            return Err(BhcError::config(format!(
                "concentration must be positive, got {}",
                params.concentration
            )));
        }
        self.params = params;
        Ok(self)
    }

    /// Run the agglomeration to completion.
    pub fn build(&self) -> Result<BhcOutcome> {
        let labels = self.matrix.labels().clone();
        let groups = match &self.params.initial_clusters {
            Some(groups) => groups.clone(),
            None => (0..labels.len()).map(|i| vec![SeqIdx::from(i)]).collect(),
        };
        let ln_conc = self.params.concentration.ln();

        let mut hierarchy = Hierarchy::with_leaves(labels, groups)?;
        let n_leaves = hierarchy.n_leaves();

        let mut active: HashMap<usize, ClusterArm> = HashMap::with_capacity(n_leaves);
        for id in 0..n_leaves {
            let counts = self.matrix.counts_for(hierarchy.node(id).members.iter().copied());
            active.insert(id, ClusterArm::leaf(self.engine, counts, ln_conc)?);
        }

        if n_leaves == 1 {
            let root_log_evidence = active[&0].log_p_tree;
            return Ok(BhcOutcome {
                hierarchy,
                root_log_evidence,
            });
        }

        let mut heap = BinaryHeap::with_capacity(n_leaves * (n_leaves - 1) / 2);
        for i in 0..n_leaves {
            for j in (i + 1)..n_leaves {
                let out = evaluate_merge(self.engine, ln_conc, &active[&i], &active[&j])?;
                heap.push(Candidate {
                    log_rk: out.log_rk,
                    left: i,
                    right: j,
                });
            }
        }

        while active.len() > 1 {
            // Pop until a candidate whose endpoints are both still active.
            let winner = loop {
                match heap.pop() {
                    Some(c) if active.contains_key(&c.left) && active.contains_key(&c.right) => {
                        break c;
                    }
                    Some(_) => continue,
                    None => {
                        return Err(BhcError::algorithm(
                            "candidate heap exhausted with active clusters remaining",
                        ))
                    }
                }
            };

            let left_arm = active.remove(&winner.left).unwrap();
            let right_arm = active.remove(&winner.right).unwrap();
            let out = evaluate_merge(self.engine, ln_conc, &left_arm, &right_arm)?;
            debug_assert!((out.log_rk - winner.log_rk).abs() < 1e-9);

            let new_id =
                hierarchy.push_merge(winner.left, winner.right, out.log_lik_merged, out.log_rk)?;

            for (&other_id, other_arm) in &active {
                let cand = evaluate_merge(self.engine, ln_conc, &out.arm, other_arm)?;
                let (left, right) = if other_id < new_id {
                    (other_id, new_id)
                } else {
                    (new_id, other_id)
                };
                heap.push(Candidate {
                    log_rk: cand.log_rk,
                    left,
                    right,
                });
            }
            active.insert(new_id, out.arm);
        }

        let root_log_evidence = active.values().next().unwrap().log_p_tree;
        if !root_log_evidence.is_finite() {
            return Err(BhcError::algorithm("non-finite root evidence"));
        }
        debug_assert!(hierarchy.is_complete());
        Ok(BhcOutcome {
            hierarchy,
            root_log_evidence,
        })
    }
}
