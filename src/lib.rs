//! # bhclust
//!
//! Bayesian hierarchical clustering of aligned genetic sequences: a fast
//! approximation to BHC over a per-site Dirichlet-multinomial likelihood,
//! with fixed-tree partition extraction, prior-mixing optimization, sparse
//! pairwise distances and multi-resolution refinement.
//!
//! ## Module Structure
//! ```text
//! bhclust
//! ├── data        # Sparse allele matrix, sufficient statistics, labels
//! ├── io          # FASTA loading, merge-list trees, partition tables
//! ├── model       # Likelihood engine, BHC, partition cut, prior search
//! └── pipelines   # Multi-resolution orchestration
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
