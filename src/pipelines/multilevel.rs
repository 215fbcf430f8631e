//! # Multi-Resolution Clustering Driver
//!
//! Recursively re-applies the agglomeration and cut to each discovered
//! cluster's subset of sequences, producing one partition per level. Deeper
//! levels refine (never cross) shallower cluster boundaries. Branches share
//! nothing but read-only access to the matrix, so each level's clusters are
//! processed in parallel.

use rayon::prelude::*;
use tracing::{debug, info_span};

use crate::data::matrix::SparseAlleleMatrix;
use crate::data::SeqIdx;
use crate::error::Result;
use crate::model::bhc::{BhcParams, HierarchyBuilder};
use crate::model::likelihood::LikelihoodEngine;
use crate::model::partition::{Partition, TreePartitionOptimizer, DEFAULT_LN_THRESHOLD};

/// Driver parameters.
#[derive(Clone, Debug)]
pub struct MultiLevelConfig {
    /// Number of partition columns to produce (>= 1)
    pub levels: usize,
    /// Log cut threshold applied at every level
    pub ln_threshold: f64,
    /// Dirichlet-process concentration of the merge prior
    pub concentration: f64,
}

impl Default for MultiLevelConfig {
    fn default() -> Self {
        Self {
            levels: 1,
            ln_threshold: DEFAULT_LN_THRESHOLD,
            concentration: 1.0,
        }
    }
}

/// Produces nested partitions at increasing resolution.
pub struct MultiResolutionDriver {
    config: MultiLevelConfig,
}

impl MultiResolutionDriver {
    pub fn new(config: MultiLevelConfig) -> Self {
        Self { config }
    }

    /// One full build-and-cut over a matrix, optionally from pre-clustered
    /// starting groups.
    pub fn cluster_once(
        &self,
        matrix: &SparseAlleleMatrix,
        initial_clusters: Option<Vec<Vec<SeqIdx>>>,
    ) -> Result<Partition> {
        let engine = LikelihoodEngine::new(matrix)?;
        let outcome = HierarchyBuilder::new(&engine, matrix)
            .with_params(BhcParams {
                concentration: self.config.concentration,
                initial_clusters,
            })?
            .build()?;
        let optimizer =
            TreePartitionOptimizer::new(&engine, matrix, self.config.concentration)?;
        optimizer.cut(
            &outcome.hierarchy,
            &optimizer.score(&outcome.hierarchy)?,
            self.config.ln_threshold,
        )
    }

    /// Full run: top-level clustering then recursive refinement.
    pub fn run(&self, matrix: &SparseAlleleMatrix) -> Result<Vec<Partition>> {
        let first = info_span!("level", level = 1)
            .in_scope(|| self.cluster_once(matrix, None))?;
        self.refine(matrix, first)
    }

    /// Refine a given first-level partition down to `config.levels` columns.
    pub fn refine(
        &self,
        matrix: &SparseAlleleMatrix,
        first: Partition,
    ) -> Result<Vec<Partition>> {
        let mut levels = vec![first];
        for level in 1..self.config.levels {
            let previous = levels.last().unwrap();
            let next = info_span!("level", level = level + 1)
                .in_scope(|| self.refine_level(matrix, previous))?;
            levels.push(next);
        }
        Ok(levels)
    }

    /// Split every multi-member cluster of `previous` independently.
    fn refine_level(
        &self,
        matrix: &SparseAlleleMatrix,
        previous: &Partition,
    ) -> Result<Partition> {
        let cluster_members: Vec<Vec<SeqIdx>> = (1..=previous.n_clusters() as u32)
            .map(|cid| previous.members(cid))
            .collect();

        // Branches are independent; singleton clusters terminate immediately.
        let sub_partitions: Vec<Option<Partition>> = cluster_members
            .par_iter()
            .map(|members| -> Result<Option<Partition>> {
                if members.len() <= 1 {
                    return Ok(None);
                }
                let restricted = matrix.restrict(members)?;
                let sub = self.cluster_once(&restricted, None)?;
                debug!(
                    parent_size = members.len(),
                    sub_clusters = sub.n_clusters(),
                    "refined cluster"
                );
                Ok(Some(sub))
            })
            .collect::<Result<_>>()?;

        // Renumber so cluster ids stay nested within parent boundaries.
        let mut assignments = vec![0u32; matrix.n_seqs()];
        let mut offset = 0u32;
        for (members, sub) in cluster_members.iter().zip(&sub_partitions) {
            match sub {
                None => {
                    offset += 1;
                    for &seq in members {
                        assignments[seq.as_usize()] = offset;
                    }
                }
                Some(sub) => {
                    // Restricted matrix columns follow `members` order, so
                    // local index k corresponds to members[k].
                    for (k, &seq) in members.iter().enumerate() {
                        assignments[seq.as_usize()] = offset + sub.cluster_of(SeqIdx::from(k));
                    }
                    offset += sub.n_clusters() as u32;
                }
            }
        }
        Partition::new(matrix.labels().clone(), assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::matrix::ALPHABET;
    use crate::data::SeqLabels;

    /// Two well-separated families, each containing two sub-pairs that
    /// differ at a smaller number of sites.
    fn nested_matrix() -> SparseAlleleMatrix {
        let labels = SeqLabels::from_labels(
            (0..8).map(|i| format!("s{i}")).collect(),
        )
        .unwrap();
        let n_sites = 24usize;
        // Family A (seqs 0-3) carries codes at sites 0..8; family B (4-7) at
        // sites 8..16. Within each family, the second pair differs at two
        // extra private sites.
        let family_block = |start: u32| -> Vec<(u32, u8)> {
            (start..start + 8).map(|s| (s, 1u8)).collect()
        };
        let mut columns: Vec<Vec<(u32, u8)>> = Vec::new();
        for seq in 0..8u32 {
            let mut col = if seq < 4 { family_block(0) } else { family_block(8) };
            if seq % 4 >= 2 {
                let private = 16 + (seq / 4) * 4;
                col.push((private, 2));
                col.push((private + 1, 2));
            }
            col.sort_unstable();
            columns.push(col);
        }
        SparseAlleleMatrix::new(
            labels,
            n_sites,
            columns,
            vec![0u8; n_sites],
            vec![1.0; n_sites * ALPHABET],
        )
        .unwrap()
    }

    #[test]
    fn test_levels_never_cross_parents() {
        let m = nested_matrix();
        let driver = MultiResolutionDriver::new(MultiLevelConfig {
            levels: 3,
            ..Default::default()
        });
        let partitions = driver.run(&m).unwrap();
        assert_eq!(partitions.len(), 3);

        for level in 1..partitions.len() {
            let parent = &partitions[level - 1];
            let child = &partitions[level];
            for i in 0..m.n_seqs() {
                for j in (i + 1)..m.n_seqs() {
                    let (a, b) = (SeqIdx::from(i), SeqIdx::from(j));
                    if child.cluster_of(a) == child.cluster_of(b) {
                        assert_eq!(
                            parent.cluster_of(a),
                            parent.cluster_of(b),
                            "level {level} crosses a level {} boundary",
                            level - 1
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_singletons_terminate() {
        let labels = SeqLabels::from_labels(vec!["only".into()]).unwrap();
        let m = SparseAlleleMatrix::new(labels, 2, vec![vec![]], vec![0, 0], vec![1.0; 2 * ALPHABET])
            .unwrap();
        let driver = MultiResolutionDriver::new(MultiLevelConfig {
            levels: 3,
            ..Default::default()
        });
        let partitions = driver.run(&m).unwrap();
        assert_eq!(partitions.len(), 3);
        for p in &partitions {
            assert_eq!(p.n_clusters(), 1);
            assert_eq!(p.cluster_of(SeqIdx::new(0)), 1);
        }
    }

    #[test]
    fn test_first_level_separates_families() {
        let m = nested_matrix();
        let driver = MultiResolutionDriver::new(MultiLevelConfig::default());
        let partitions = driver.run(&m).unwrap();
        let p = &partitions[0];
        // Identical sequences always share a cluster; the two families,
        // differing at 16 sites, never do.
        assert_eq!(p.cluster_of(SeqIdx::new(0)), p.cluster_of(SeqIdx::new(1)));
        assert_eq!(p.cluster_of(SeqIdx::new(6)), p.cluster_of(SeqIdx::new(7)));
        assert_ne!(p.cluster_of(SeqIdx::new(0)), p.cluster_of(SeqIdx::new(4)));
    }
}
