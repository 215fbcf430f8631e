//! # Merge Hierarchy
//!
//! A rooted strictly-binary tree over the sequence set, stored as an arena of
//! nodes addressed by integer id. Leaves (singletons or pre-clustered groups)
//! come first; each internal node records its two children plus, once
//! evaluated, its merged log-likelihood and merge posterior ratio. Nodes are
//! created once and never mutated afterwards.
//!
//! Traversals use explicit stacks so deep trees cannot overflow the call
//! stack.

use std::sync::Arc;

use crate::data::{SeqIdx, SeqLabels};
use crate::error::{BhcError, Result};

/// One node of the hierarchy.
#[derive(Clone, Debug)]
pub struct Node {
    /// Child node ids; `None` for leaves
    pub children: Option<(usize, usize)>,
    /// Sequences directly owned by a leaf; empty for internal nodes
    pub members: Vec<SeqIdx>,
    /// Total sequences under this node
    pub n_seqs: usize,
    /// Merged-hypothesis marginal log-likelihood (NaN until evaluated)
    pub log_lik: f64,
    /// Log merge posterior ratio; 0.0 for leaves (a leaf is one cluster)
    pub log_rk: f64,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Arena-allocated rooted binary merge tree.
#[derive(Clone, Debug)]
pub struct Hierarchy {
    labels: Arc<SeqLabels>,
    nodes: Vec<Node>,
    n_leaves: usize,
    root: usize,
}

impl Hierarchy {
    /// Start a hierarchy from leaf groups that must partition the label set.
    ///
    /// The builder appends internal nodes with [`Hierarchy::push_merge`];
    /// until `n_leaves - 1` merges have been pushed the root is undefined and
    /// [`Hierarchy::root`] reports the most recent node.
    pub fn with_leaves(labels: Arc<SeqLabels>, groups: Vec<Vec<SeqIdx>>) -> Result<Self> {
        let n_seqs = labels.len();
        if n_seqs == 0 {
            return Err(BhcError::invalid_data("hierarchy over zero sequences"));
        }
        let mut seen = vec![false; n_seqs];
        for group in &groups {
            if group.is_empty() {
                return Err(BhcError::structural("empty leaf group"));
            }
            for &seq in group {
                let i = seq.as_usize();
                if i >= n_seqs {
                    return Err(BhcError::structural(format!(
                        "leaf group references sequence index {} beyond {} sequences",
                        seq.0, n_seqs
                    )));
                }
                if seen[i] {
                    return Err(BhcError::structural(format!(
                        "sequence {:?} appears in more than one leaf group",
                        labels.label(seq)
                    )));
                }
                seen[i] = true;
            }
        }
        if let Some(missing) = seen.iter().position(|&s| !s) {
            return Err(BhcError::structural(format!(
                "sequence {:?} missing from leaf groups",
                labels.label(SeqIdx::new(missing as u32))
            )));
        }

        let nodes: Vec<Node> = groups
            .into_iter()
            .map(|members| Node {
                children: None,
                n_seqs: members.len(),
                members,
                log_lik: f64::NAN,
                log_rk: 0.0,
            })
            .collect();
        let n_leaves = nodes.len();
        Ok(Self {
            labels,
            nodes,
            n_leaves,
            root: n_leaves - 1,
        })
    }

    /// Singleton-leaf hierarchy (one leaf per sequence).
    pub fn with_singleton_leaves(labels: Arc<SeqLabels>) -> Result<Self> {
        let groups = (0..labels.len())
            .map(|i| vec![SeqIdx::new(i as u32)])
            .collect();
        Self::with_leaves(labels, groups)
    }

    /// Record a merge of two existing nodes, returning the new node's id.
    pub fn push_merge(
        &mut self,
        left: usize,
        right: usize,
        log_lik: f64,
        log_rk: f64,
    ) -> Result<usize> {
        if left >= self.nodes.len() || right >= self.nodes.len() || left == right {
            return Err(BhcError::structural(format!(
                "merge references invalid node ids {left} and {right}"
            )));
        }
        let n_seqs = self.nodes[left].n_seqs + self.nodes[right].n_seqs;
        let id = self.nodes.len();
        self.nodes.push(Node {
            children: Some((left, right)),
            members: Vec::new(),
            n_seqs,
            log_lik,
            log_rk,
        });
        self.root = id;
        Ok(id)
    }

    /// Assemble a hierarchy over singleton leaves from an ordered merge list.
    ///
    /// `merges[k]` names the two child node ids of internal node
    /// `labels.len() + k`; children must be defined before use and each node
    /// may be a child exactly once. Node likelihoods stay unset (NaN) until a
    /// [`crate::model::partition::TreePartitionOptimizer`] scores the tree.
    pub fn from_merges(labels: Arc<SeqLabels>, merges: &[(usize, usize)]) -> Result<Self> {
        let mut hierarchy = Self::with_singleton_leaves(labels)?;
        let n_leaves = hierarchy.n_leaves;
        if merges.len() != n_leaves.saturating_sub(1) {
            return Err(BhcError::structural(format!(
                "{} merges cannot form a rooted strictly-binary tree over {} leaves \
                 ({} required)",
                merges.len(),
                n_leaves,
                n_leaves.saturating_sub(1)
            )));
        }
        let total = 2 * n_leaves - 1;
        let mut used = vec![false; total];
        for (k, &(left, right)) in merges.iter().enumerate() {
            let next_id = n_leaves + k;
            if left >= next_id || right >= next_id || left == right {
                return Err(BhcError::structural(format!(
                    "merge {k} references undefined or repeated node ids {left}, {right}"
                )));
            }
            if used[left] || used[right] {
                return Err(BhcError::structural(format!(
                    "merge {k} reuses a node that already has a parent"
                )));
            }
            used[left] = true;
            used[right] = true;
            hierarchy.push_merge(left, right, f64::NAN, f64::NAN)?;
        }
        // Exactly one node (the last) must be parentless.
        debug_assert!(used[..total - 1].iter().all(|&u| u));
        Ok(hierarchy)
    }

    pub fn labels(&self) -> &Arc<SeqLabels> {
        &self.labels
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    pub fn n_internal(&self) -> usize {
        self.nodes.len() - self.n_leaves
    }

    pub fn root(&self) -> usize {
        self.root
    }

    /// True once all `n_leaves - 1` merges have been recorded.
    pub fn is_complete(&self) -> bool {
        self.n_internal() == self.n_leaves - 1
    }

    /// Node ids in post-order (children before parents), iteratively.
    pub fn post_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded || self.nodes[id].is_leaf() {
                order.push(id);
            } else {
                let (l, r) = self.nodes[id].children.unwrap();
                stack.push((id, true));
                stack.push((r, false));
                stack.push((l, false));
            }
        }
        order
    }

    /// All sequences under a node, collected iteratively.
    pub fn seqs_under(&self, id: usize) -> Vec<SeqIdx> {
        let mut seqs = Vec::with_capacity(self.nodes[id].n_seqs);
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            match self.nodes[cur].children {
                Some((l, r)) => {
                    stack.push(r);
                    stack.push(l);
                }
                None => seqs.extend_from_slice(&self.nodes[cur].members),
            }
        }
        seqs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Arc<SeqLabels> {
        SeqLabels::from_labels((0..n).map(|i| format!("s{i}")).collect()).unwrap()
    }

    #[test]
    fn test_from_merges_valid() {
        // ((s0, s1), (s2, s3))
        let h = Hierarchy::from_merges(labels(4), &[(0, 1), (2, 3), (4, 5)]).unwrap();
        assert!(h.is_complete());
        assert_eq!(h.n_internal(), 3);
        assert_eq!(h.root(), 6);
        assert_eq!(h.node(h.root()).n_seqs, 4);

        let mut under = h.seqs_under(4);
        under.sort();
        assert_eq!(under, vec![SeqIdx::new(0), SeqIdx::new(1)]);
    }

    #[test]
    fn test_from_merges_rejects_reuse() {
        let err = Hierarchy::from_merges(labels(3), &[(0, 1), (0, 2)]);
        assert!(err.is_err());
    }

    #[test]
    fn test_from_merges_rejects_wrong_count() {
        let err = Hierarchy::from_merges(labels(4), &[(0, 1)]);
        assert!(err.is_err());
    }

    #[test]
    fn test_leaf_groups_must_partition() {
        let overlap = Hierarchy::with_leaves(
            labels(3),
            vec![vec![SeqIdx::new(0), SeqIdx::new(1)], vec![SeqIdx::new(1)]],
        );
        assert!(overlap.is_err());

        let missing = Hierarchy::with_leaves(labels(3), vec![vec![SeqIdx::new(0)]]);
        assert!(missing.is_err());
    }

    #[test]
    fn test_post_order_children_first() {
        let h = Hierarchy::from_merges(labels(4), &[(0, 1), (2, 3), (4, 5)]).unwrap();
        let order = h.post_order();
        assert_eq!(order.len(), 7);
        let pos = |id: usize| order.iter().position(|&x| x == id).unwrap();
        for id in h.n_leaves()..h.n_nodes() {
            let (l, r) = h.node(id).children.unwrap();
            assert!(pos(l) < pos(id));
            assert!(pos(r) < pos(id));
        }
        assert_eq!(*order.last().unwrap(), h.root());
    }

    #[test]
    fn test_single_leaf() {
        let h = Hierarchy::with_singleton_leaves(labels(1)).unwrap();
        assert!(h.is_complete());
        assert_eq!(h.n_internal(), 0);
        assert_eq!(h.root(), 0);
    }
}
