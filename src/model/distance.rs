//! # Sparse Pairwise Similarity and Distance
//!
//! Match/difference counts over variant sites for every sequence pair,
//! computed from the sparse entries alone. Sites that are all-consensus
//! contribute nothing to any pairwise distance and are never touched.
//!
//! For a pair (i, j) over the V variant sites:
//!
//! ```text
//! matches(i, j) = V - nz_i - nz_j + B(i, j) + E(i, j)
//! distance(i, j) = V - matches(i, j)
//! ```
//!
//! where `nz_x` is the number of nonzero entries of sequence x, `B` counts
//! sites where both are nonzero (any codes) and `E` counts sites where both
//! carry the same nonzero code. `B` and `E` come from one pass over the
//! per-site carrier lists, so the work scales with the nonzero entries
//! (quadratic only in per-site carrier counts), never with the dense size.

use std::sync::Arc;

use crate::data::matrix::SparseAlleleMatrix;
use crate::data::{SeqIdx, SeqLabels};
use crate::error::{BhcError, Result};

/// Symmetric variant-site match counts for all sequence pairs.
///
/// Similarity is the match count (diagonal is maximal: every variant site
/// matches itself); distance is `n_variant_sites - similarity` (diagonal
/// zero).
#[derive(Clone, Debug)]
pub struct PairwiseMatrices {
    labels: Arc<SeqLabels>,
    n_seqs: usize,
    n_variant_sites: u32,
    /// Row-major n x n match counts
    matches: Vec<u32>,
}

impl PairwiseMatrices {
    /// Compute match counts from the sparse matrix.
    pub fn compute(matrix: &SparseAlleleMatrix) -> Result<Self> {
        let n = matrix.n_seqs();
        if n == 0 {
            return Err(BhcError::invalid_data(
                "pairwise distances over zero sequences",
            ));
        }

        // Per-site carrier lists, accumulated from the sparse columns.
        let mut carriers: std::collections::BTreeMap<u32, Vec<(u32, u8)>> =
            std::collections::BTreeMap::new();
        let mut nz = vec![0u32; n];
        for seq in 0..n {
            for &(site, code) in matrix.column(SeqIdx::from(seq)) {
                carriers.entry(site).or_default().push((seq as u32, code));
            }
            nz[seq] = matrix.column(SeqIdx::from(seq)).len() as u32;
        }
        let n_variant_sites = carriers.len() as u32;

        // matches = V - nz_i - nz_j + B + E; B/E corrections accumulate in
        // the upper triangle during the carrier-list pass.
        let mut matches = vec![0u32; n * n];
        let mut corrections = vec![0i64; n * n];
        for site_carriers in carriers.values() {
            for (a, &(i, code_i)) in site_carriers.iter().enumerate() {
                for &(j, code_j) in &site_carriers[a + 1..] {
                    let idx = i as usize * n + j as usize;
                    corrections[idx] += 1; // both nonzero
                    if code_i == code_j {
                        corrections[idx] += 1; // same nonzero code
                    }
                }
            }
        }
        for i in 0..n {
            for j in 0..n {
                let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
                let base = n_variant_sites as i64 - nz[i] as i64 - nz[j] as i64;
                let value = if i == j {
                    n_variant_sites as i64
                } else {
                    base + corrections[lo * n + hi]
                };
                debug_assert!(value >= 0);
                matches[i * n + j] = value as u32;
            }
        }

        Ok(Self {
            labels: matrix.labels().clone(),
            n_seqs: n,
            n_variant_sites,
            matches,
        })
    }

    pub fn labels(&self) -> &Arc<SeqLabels> {
        &self.labels
    }

    pub fn n_seqs(&self) -> usize {
        self.n_seqs
    }

    pub fn n_variant_sites(&self) -> u32 {
        self.n_variant_sites
    }

    /// Variant sites where both sequences carry the same code.
    #[inline]
    pub fn similarity(&self, i: SeqIdx, j: SeqIdx) -> u32 {
        self.matches[i.as_usize() * self.n_seqs + j.as_usize()]
    }

    /// Variant sites where the two sequences differ.
    #[inline]
    pub fn distance(&self, i: SeqIdx, j: SeqIdx) -> u32 {
        self.n_variant_sites - self.similarity(i, j)
    }
}

/// Greedy single-linkage grouping over the sparse distance matrix, used to
/// seed the agglomeration with `target` initial clusters instead of
/// singletons.
pub fn seed_clusters(matrix: &SparseAlleleMatrix, target: usize) -> Result<Vec<Vec<SeqIdx>>> {
    let n = matrix.n_seqs();
    if target == 0 || target > n {
        return Err(BhcError::config(format!(
            "initial cluster count {target} outside 1..={n}"
        )));
    }
    let pairwise = PairwiseMatrices::compute(matrix)?;

    // All pairs sorted by distance, ties by index for determinism.
    let mut pairs: Vec<(u32, u32, u32)> = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((
                pairwise.distance(SeqIdx::from(i), SeqIdx::from(j)),
                i as u32,
                j as u32,
            ));
        }
    }
    pairs.sort_unstable();

    // Union-find: link closest pairs until `target` groups remain.
    let mut parent: Vec<u32> = (0..n as u32).collect();
    fn find(parent: &mut [u32], x: u32) -> u32 {
        let mut root = x;
        while parent[root as usize] != root {
            root = parent[root as usize];
        }
        let mut cur = x;
        while parent[cur as usize] != root {
            let next = parent[cur as usize];
            parent[cur as usize] = root;
            cur = next;
        }
        root
    }
    let mut n_groups = n;
    for &(_, i, j) in &pairs {
        if n_groups <= target {
            break;
        }
        let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
        if ri != rj {
            let (lo, hi) = if ri < rj { (ri, rj) } else { (rj, ri) };
            parent[hi as usize] = lo;
            n_groups -= 1;
        }
    }

    let mut groups: std::collections::BTreeMap<u32, Vec<SeqIdx>> =
        std::collections::BTreeMap::new();
    for seq in 0..n as u32 {
        let root = find(&mut parent, seq);
        groups.entry(root).or_default().push(SeqIdx::new(seq));
    }
    Ok(groups.into_values().collect())
}
