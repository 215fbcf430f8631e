//! # Configuration Logic
//!
//! CLI argument parsing and eager validation. Configuration errors are
//! reported before any heavy input is loaded.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::error::{BhcError, Result};
use crate::model::prior::PriorMode;

/// CLI-facing prior mode selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PriorModeArg {
    FixedSymmetric,
    FixedPopulation,
    OptimizeSymmetric,
    OptimizePopulation,
}

impl From<PriorModeArg> for PriorMode {
    fn from(arg: PriorModeArg) -> Self {
        match arg {
            PriorModeArg::FixedSymmetric => PriorMode::FixedSymmetric,
            PriorModeArg::FixedPopulation => PriorMode::FixedPopulation,
            PriorModeArg::OptimizeSymmetric => PriorMode::OptimizeSymmetric,
            PriorModeArg::OptimizePopulation => PriorMode::OptimizePopulation,
        }
    }
}

/// Command-line configuration.
#[derive(Parser, Debug)]
#[command(name = "bhclust", version, about = "Bayesian hierarchical clustering of aligned sequences")]
pub struct Config {
    /// Input aligned FASTA file
    #[arg(long)]
    pub alignment: PathBuf,

    /// Output TSV path (sequence label, one cluster column per level)
    #[arg(long)]
    pub out: PathBuf,

    /// Prior selection mode
    #[arg(long, value_enum, default_value_t = PriorModeArg::OptimizeSymmetric)]
    pub prior: PriorModeArg,

    /// Number of resolution levels to produce
    #[arg(long, default_value_t = 1)]
    pub levels: usize,

    /// Optional externally supplied hierarchy (merge-list file) used for the
    /// first level instead of a fresh agglomeration
    #[arg(long)]
    pub tree: Option<PathBuf>,

    /// Merge-posterior cut threshold in probability space
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,

    /// Dirichlet-process concentration of the merge prior
    #[arg(long, default_value_t = 1.0)]
    pub concentration: f64,

    /// Seed the agglomeration from roughly this many linkage-derived initial
    /// clusters instead of singletons (0 picks sequence count / 4)
    #[arg(long)]
    pub init_clusters: Option<usize>,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,
}

impl Config {
    /// Parse CLI arguments and validate them.
    pub fn parse_and_validate() -> Result<Self> {
        Self::validate(Self::parse())
    }

    fn validate(config: Self) -> Result<Self> {
        if config.levels == 0 {
            return Err(BhcError::config("levels must be a positive integer"));
        }
        if !(config.threshold > 0.0 && config.threshold < 1.0) {
            return Err(BhcError::config(format!(
                "threshold must lie strictly inside (0, 1), got {}",
                config.threshold
            )));
        }
        if !(config.concentration.is_finite() && config.concentration > 0.0) {
            return Err(BhcError::config(format!(
                "concentration must be positive, got {}",
                config.concentration
            )));
        }
        if !config.alignment.exists() {
            return Err(BhcError::FileNotFound {
                path: config.alignment.clone(),
            });
        }
        if let Some(tree) = &config.tree {
            if !tree.exists() {
                return Err(BhcError::FileNotFound { path: tree.clone() });
            }
            if config.init_clusters.is_some() {
                return Err(BhcError::config(
                    "--init-clusters has no effect when --tree supplies the hierarchy",
                ));
            }
        }
        Ok(config)
    }

    /// Worker thread count, defaulting to all cores.
    pub fn n_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.threads
        }
    }

    /// Resolved initial cluster count for `n` sequences, when seeding is on.
    pub fn init_cluster_target(&self, n_seqs: usize) -> Option<usize> {
        self.init_clusters
            .map(|v| if v == 0 { (n_seqs / 4).max(1) } else { v })
    }
}
