//! # Tree Partition Optimizer
//!
//! Given any rooted strictly-binary hierarchy over the same label set as a
//! sparse allele matrix, compute every node's merged log-likelihood and merge
//! posterior ratio in one bottom-up pass, then extract the best partition
//! with a top-down cut: a node whose rk clears the threshold keeps its whole
//! leaf set as one cluster; otherwise the node splits and each child
//! contributes its own clusters. Cluster ids are renumbered to consecutive
//! positive integers in first-encounter order.
//!
//! The cut is greedy and local by design: a low-rk node always splits, even
//! if a different cut elsewhere could raise the total likelihood.

use std::sync::Arc;

use crate::data::matrix::SparseAlleleMatrix;
use crate::data::{SeqIdx, SeqLabels};
use crate::error::{BhcError, Result};
use crate::model::hierarchy::Hierarchy;
use crate::model::likelihood::LikelihoodEngine;
use crate::model::merge::{evaluate_merge, ClusterArm};

/// Default cut threshold: merge wherever rk >= 1/2.
pub const DEFAULT_LN_THRESHOLD: f64 = -std::f64::consts::LN_2;

/// An assignment of sequences to mutually exclusive positive cluster ids.
#[derive(Clone, Debug)]
pub struct Partition {
    labels: Arc<SeqLabels>,
    /// Cluster id (1-based) per sequence index
    assignments: Vec<u32>,
    n_clusters: usize,
}

impl Partition {
    pub fn new(labels: Arc<SeqLabels>, assignments: Vec<u32>) -> Result<Self> {
        if assignments.len() != labels.len() {
            return Err(BhcError::invalid_data(format!(
                "{} assignments for {} sequences",
                assignments.len(),
                labels.len()
            )));
        }
        let n_clusters = assignments.iter().copied().max().unwrap_or(0) as usize;
        if assignments.iter().any(|&c| c == 0 || c as usize > n_clusters) {
            return Err(BhcError::invalid_data(
                "cluster ids must be consecutive positive integers",
            ));
        }
        Ok(Self {
            labels,
            assignments,
            n_clusters,
        })
    }

    pub fn labels(&self) -> &Arc<SeqLabels> {
        &self.labels
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn cluster_of(&self, seq: SeqIdx) -> u32 {
        self.assignments[seq.as_usize()]
    }

    pub fn cluster_of_label(&self, label: &str) -> Option<u32> {
        self.labels.lookup(label).map(|seq| self.cluster_of(seq))
    }

    pub fn assignments(&self) -> &[u32] {
        &self.assignments
    }

    /// Sequence indices belonging to a cluster, in index order.
    pub fn members(&self, cluster: u32) -> Vec<SeqIdx> {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == cluster)
            .map(|(i, _)| SeqIdx::from(i))
            .collect()
    }
}

/// Per-node scores from the bottom-up pass, indexed by node id.
#[derive(Clone, Debug)]
pub struct TreeScores {
    /// Merged-hypothesis marginal log-likelihood per node
    pub node_log_lik: Vec<f64>,
    /// Log merge posterior ratio per node (0.0 at leaves)
    pub node_log_rk: Vec<f64>,
    /// Log marginal likelihood of the whole clustering, p(D|T) at the root
    pub root_log_evidence: f64,
}

/// Scores a fixed hierarchy against a matrix and cuts it into a partition.
pub struct TreePartitionOptimizer<'a> {
    engine: &'a LikelihoodEngine,
    matrix: &'a SparseAlleleMatrix,
    ln_concentration: f64,
}

impl<'a> TreePartitionOptimizer<'a> {
    pub fn new(
        engine: &'a LikelihoodEngine,
        matrix: &'a SparseAlleleMatrix,
        concentration: f64,
    ) -> Result<Self> {
        if !(concentration.is_finite() && concentration > 0.0) {
            return Err(BhcError::config(format!(
                "concentration must be positive, got {concentration}"
            )));
        }
        Ok(Self {
            engine,
            matrix,
            ln_concentration: concentration.ln(),
        })
    }

    /// Map hierarchy sequence indices to matrix sequence indices, failing
    /// loudly when the label sets are not equal.
    fn label_remap(&self, hierarchy: &Hierarchy) -> Result<Vec<SeqIdx>> {
        let hier_labels = hierarchy.labels();
        let matrix_labels = self.matrix.labels();
        let mut missing = Vec::new();
        let mut remap = Vec::with_capacity(hier_labels.len());
        for label in hier_labels.iter() {
            match matrix_labels.lookup(label) {
                Some(seq) => remap.push(seq),
                None => missing.push(label.to_string()),
            }
        }
        if !missing.is_empty() || hier_labels.len() != matrix_labels.len() {
            missing.truncate(5);
            return Err(BhcError::structural(format!(
                "hierarchy labels do not match matrix labels ({} tree labels, \
                 {} matrix labels; first unmatched: {:?})",
                hier_labels.len(),
                matrix_labels.len(),
                missing
            )));
        }
        Ok(remap)
    }

    /// Bottom-up pass: per-node likelihoods and merge posterior ratios,
    /// computed once and memoized per node.
    pub fn score(&self, hierarchy: &Hierarchy) -> Result<TreeScores> {
        if !hierarchy.is_complete() {
            return Err(BhcError::structural(
                "hierarchy is not a complete rooted binary tree",
            ));
        }
        let remap = self.label_remap(hierarchy)?;

        let n_nodes = hierarchy.n_nodes();
        let mut arms: Vec<Option<ClusterArm>> = vec![None; n_nodes];
        let mut node_log_lik = vec![f64::NAN; n_nodes];
        let mut node_log_rk = vec![0.0f64; n_nodes];

        for id in hierarchy.post_order() {
            let node = hierarchy.node(id);
            match node.children {
                None => {
                    let counts = self
                        .matrix
                        .counts_for(node.members.iter().map(|&s| remap[s.as_usize()]));
                    let arm = ClusterArm::leaf(self.engine, counts, self.ln_concentration)?;
                    node_log_lik[id] = arm.log_p_tree;
                    arms[id] = Some(arm);
                }
                Some((l, r)) => {
                    let left = arms[l].take().ok_or_else(|| {
                        BhcError::structural(format!("node {l} has multiple parents"))
                    })?;
                    let right = arms[r].take().ok_or_else(|| {
                        BhcError::structural(format!("node {r} has multiple parents"))
                    })?;
                    let out =
                        evaluate_merge(self.engine, self.ln_concentration, &left, &right)?;
                    node_log_lik[id] = out.log_lik_merged;
                    node_log_rk[id] = out.log_rk;
                    arms[id] = Some(out.arm);
                }
            }
        }

        let root_log_evidence = arms[hierarchy.root()]
            .as_ref()
            .map(|arm| arm.log_p_tree)
            .ok_or_else(|| BhcError::algorithm("root arm missing after bottom-up pass"))?;
        if !root_log_evidence.is_finite() {
            return Err(BhcError::algorithm("non-finite root evidence"));
        }

        Ok(TreeScores {
            node_log_lik,
            node_log_rk,
            root_log_evidence,
        })
    }

    /// Top-down cut at `ln_threshold`, renumbering clusters in
    /// first-encounter (pre-order) order.
    pub fn cut(
        &self,
        hierarchy: &Hierarchy,
        scores: &TreeScores,
        ln_threshold: f64,
    ) -> Result<Partition> {
        let remap = self.label_remap(hierarchy)?;
        let matrix_labels = self.matrix.labels().clone();
        let mut assignments = vec![0u32; matrix_labels.len()];
        let mut next_cluster = 0u32;

        let mut stack = vec![hierarchy.root()];
        while let Some(id) = stack.pop() {
            let node = hierarchy.node(id);
            let keep_whole = node.is_leaf() || scores.node_log_rk[id] >= ln_threshold;
            if keep_whole {
                next_cluster += 1;
                for seq in hierarchy.seqs_under(id) {
                    assignments[remap[seq.as_usize()].as_usize()] = next_cluster;
                }
            } else {
                let (l, r) = node.children.unwrap();
                stack.push(r);
                stack.push(l);
            }
        }

        Partition::new(matrix_labels, assignments)
    }

    /// Score then cut in one call.
    pub fn run(
        &self,
        hierarchy: &Hierarchy,
        ln_threshold: f64,
    ) -> Result<(TreeScores, Partition)> {
        let scores = self.score(hierarchy)?;
        let partition = self.cut(hierarchy, &scores, ln_threshold)?;
        Ok((scores, partition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::matrix::ALPHABET;
    use crate::model::bhc::HierarchyBuilder;

    fn two_pair_matrix() -> SparseAlleleMatrix {
        let labels = SeqLabels::from_labels(
            vec!["a1".into(), "a2".into(), "b1".into(), "b2".into()],
        )
        .unwrap();
        let columns = vec![
            vec![(0, 1), (1, 1)],
            vec![(0, 1), (1, 1)],
            vec![(2, 1), (3, 1)],
            vec![(2, 1), (3, 1)],
        ];
        SparseAlleleMatrix::new(labels, 4, columns, vec![0u8; 4], vec![1.0; 4 * ALPHABET])
            .unwrap()
    }

    #[test]
    fn test_default_cut_two_pairs() {
        let m = two_pair_matrix();
        let engine = LikelihoodEngine::new(&m).unwrap();
        let built = HierarchyBuilder::new(&engine, &m).build().unwrap();
        let opt = TreePartitionOptimizer::new(&engine, &m, 1.0).unwrap();
        let (_, partition) = opt.run(&built.hierarchy, DEFAULT_LN_THRESHOLD).unwrap();

        assert_eq!(partition.n_clusters(), 2);
        assert_eq!(
            partition.cluster_of_label("a1"),
            partition.cluster_of_label("a2")
        );
        assert_eq!(
            partition.cluster_of_label("b1"),
            partition.cluster_of_label("b2")
        );
        assert_ne!(
            partition.cluster_of_label("a1"),
            partition.cluster_of_label("b1")
        );
    }

    #[test]
    fn test_round_trip_matches_builder_scores() {
        let m = two_pair_matrix();
        let engine = LikelihoodEngine::new(&m).unwrap();
        let built = HierarchyBuilder::new(&engine, &m).build().unwrap();
        let opt = TreePartitionOptimizer::new(&engine, &m, 1.0).unwrap();
        let scores = opt.score(&built.hierarchy).unwrap();

        let h = &built.hierarchy;
        for id in h.n_leaves()..h.n_nodes() {
            assert!(
                (scores.node_log_rk[id] - h.node(id).log_rk).abs() < 1e-9,
                "rk drift at node {id}"
            );
            assert!((scores.node_log_lik[id] - h.node(id).log_lik).abs() < 1e-9);
        }
        assert!((scores.root_log_evidence - built.root_log_evidence).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_monotone_refinement() {
        let m = two_pair_matrix();
        let engine = LikelihoodEngine::new(&m).unwrap();
        let built = HierarchyBuilder::new(&engine, &m).build().unwrap();
        let opt = TreePartitionOptimizer::new(&engine, &m, 1.0).unwrap();
        let scores = opt.score(&built.hierarchy).unwrap();

        let mut previous: Option<Partition> = None;
        for threshold in [0.01f64, 0.3, 0.5, 0.9, 0.999] {
            let partition = opt.cut(&built.hierarchy, &scores, threshold.ln()).unwrap();
            if let Some(coarser) = &previous {
                // Higher threshold must refine (or equal) the lower one:
                // sequences sharing a cluster now also shared one before.
                for i in 0..4 {
                    for j in (i + 1)..4 {
                        let (a, b) = (SeqIdx::from(i), SeqIdx::from(j));
                        if partition.cluster_of(a) == partition.cluster_of(b) {
                            assert_eq!(coarser.cluster_of(a), coarser.cluster_of(b));
                        }
                    }
                }
            }
            previous = Some(partition);
        }
    }

    #[test]
    fn test_external_tree_same_labels_different_order() {
        // The external tree lists labels in a different order than the
        // matrix; scoring must align them by label, not by index.
        let m = two_pair_matrix();
        let engine = LikelihoodEngine::new(&m).unwrap();
        let tree_labels = SeqLabels::from_labels(
            vec!["b2".into(), "a1".into(), "b1".into(), "a2".into()],
        )
        .unwrap();
        // ((b2, b1), (a1, a2))
        let h = Hierarchy::from_merges(tree_labels, &[(0, 2), (1, 3), (4, 5)]).unwrap();
        let opt = TreePartitionOptimizer::new(&engine, &m, 1.0).unwrap();
        let (_, partition) = opt.run(&h, DEFAULT_LN_THRESHOLD).unwrap();

        assert_eq!(partition.n_clusters(), 2);
        assert_eq!(
            partition.cluster_of_label("a1"),
            partition.cluster_of_label("a2")
        );
        assert_ne!(
            partition.cluster_of_label("a1"),
            partition.cluster_of_label("b1")
        );
    }

    #[test]
    fn test_label_mismatch_is_fatal() {
        let m = two_pair_matrix();
        let engine = LikelihoodEngine::new(&m).unwrap();
        let other = SeqLabels::from_labels(
            vec!["x1".into(), "a2".into(), "b1".into(), "b2".into()],
        )
        .unwrap();
        let h = Hierarchy::from_merges(other, &[(0, 1), (2, 3), (4, 5)]).unwrap();
        let opt = TreePartitionOptimizer::new(&engine, &m, 1.0).unwrap();
        let err = opt.score(&h);
        assert!(matches!(err, Err(BhcError::Structural { .. })));
    }
}
