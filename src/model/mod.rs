//! # Clustering Algorithms
//!
//! The statistical core: the Dirichlet-multinomial likelihood engine, the
//! shared merge-posterior evaluation, the greedy agglomerative builder, the
//! fixed-tree partition optimizer, the prior-mixing search and the sparse
//! pairwise distances.

pub mod bhc;
pub mod distance;
pub mod hierarchy;
pub mod likelihood;
pub mod merge;
pub mod partition;
pub mod prior;

pub use bhc::{BhcOutcome, BhcParams, HierarchyBuilder};
pub use hierarchy::Hierarchy;
pub use likelihood::LikelihoodEngine;
pub use partition::{Partition, TreePartitionOptimizer, DEFAULT_LN_THRESHOLD};
pub use prior::{PriorMode, PriorOptimizer};
