//! # Prior Mixing Optimization
//!
//! The matrix prior is a convex combination of a symmetric baseline and a
//! population-allele-frequency baseline, controlled by a scalar lambda in
//! [0, 1]. The optimizer picks the lambda maximizing the marginal likelihood
//! of the hierarchy built under that prior (an empirical-Bayes choice of
//! prior shape).
//!
//! Each candidate evaluation costs a full agglomeration, so the search is a
//! small fixed grid followed by a bounded golden-section refinement around
//! the best grid point. Grid candidates are independent and evaluated in
//! parallel; the final choice is deterministic, with score ties broken toward
//! the conservative symmetric end (the smallest lambda).

use rayon::prelude::*;
use tracing::{debug, info};

use crate::data::matrix::{PriorPair, SparseAlleleMatrix};
use crate::error::{BhcError, Result};
use crate::model::bhc::{BhcParams, HierarchyBuilder};
use crate::model::likelihood::LikelihoodEngine;

/// How the matrix prior is chosen.
///
/// Both optimize modes run the same lambda search; score ties resolve toward
/// the symmetric end in either mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorMode {
    /// Symmetric baseline, no search (lambda = 0)
    FixedSymmetric,
    /// Population-frequency baseline, no search (lambda = 1)
    FixedPopulation,
    /// Search lambda over [0, 1]
    OptimizeSymmetric,
    /// Search lambda over [0, 1]
    OptimizePopulation,
}

/// Outcome of a prior selection.
#[derive(Debug)]
pub struct PriorSelection {
    /// Chosen mixing parameter
    pub lambda: f64,
    /// Root log evidence under the chosen prior
    pub log_evidence: f64,
    /// The matrix re-equipped with the chosen prior table
    pub matrix: SparseAlleleMatrix,
}

/// Grid-plus-golden-section search over the prior mixing parameter.
pub struct PriorOptimizer {
    grid: Vec<f64>,
    refine_steps: usize,
    concentration: f64,
}

const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;
const SCORE_TIE_TOL: f64 = 1e-9;

impl PriorOptimizer {
    pub fn new(concentration: f64) -> Self {
        Self {
            grid: vec![0.0, 0.25, 0.5, 0.75, 1.0],
            refine_steps: 6,
            concentration,
        }
    }

    /// Replace the default candidate grid (must be sorted, within [0, 1]).
    pub fn with_grid(mut self, grid: Vec<f64>) -> Result<Self> {
        if grid.is_empty()
            || grid.windows(2).any(|w| w[0] >= w[1])
            || grid.iter().any(|l| !(0.0..=1.0).contains(l))
        {
            return Err(BhcError::config(
                "prior grid must be strictly increasing within [0, 1]",
            ));
        }
        self.grid = grid;
        Ok(self)
    }

    /// Evaluate one lambda: rebuild the prior, run a full agglomeration and
    /// report the root marginal likelihood.
    fn evaluate(
        &self,
        matrix: &SparseAlleleMatrix,
        baselines: &PriorPair,
        lambda: f64,
    ) -> Result<f64> {
        let candidate = matrix.with_prior(baselines.mixed(lambda)?)?;
        let engine = LikelihoodEngine::new(&candidate)?;
        let outcome = HierarchyBuilder::new(&engine, &candidate)
            .with_params(BhcParams {
                concentration: self.concentration,
                initial_clusters: None,
            })?
            .build()?;
        debug!(lambda, log_evidence = outcome.root_log_evidence, "prior candidate");
        Ok(outcome.root_log_evidence)
    }

    /// Select the prior for `mode`, returning the matrix under that prior.
    pub fn select(
        &self,
        mode: PriorMode,
        matrix: &SparseAlleleMatrix,
        baselines: &PriorPair,
    ) -> Result<PriorSelection> {
        let lambda = match mode {
            PriorMode::FixedSymmetric => 0.0,
            PriorMode::FixedPopulation => 1.0,
            PriorMode::OptimizeSymmetric | PriorMode::OptimizePopulation => {
                self.optimize(matrix, baselines)?
            }
        };
        let log_evidence = self.evaluate(matrix, baselines, lambda)?;
        info!(lambda, log_evidence, "prior selected");
        Ok(PriorSelection {
            lambda,
            log_evidence,
            matrix: matrix.with_prior(baselines.mixed(lambda)?)?,
        })
    }

    /// Grid scan (parallel) plus golden-section refinement (sequential).
    fn optimize(&self, matrix: &SparseAlleleMatrix, baselines: &PriorPair) -> Result<f64> {
        let mut evaluated: Vec<(f64, f64)> = self
            .grid
            .par_iter()
            .map(|&lambda| Ok((lambda, self.evaluate(matrix, baselines, lambda)?)))
            .collect::<Result<_>>()?;

        let best_idx = Self::pick_best(&evaluated);
        let best_lambda = evaluated[best_idx].0;

        // Refine inside the bracket around the best grid point.
        let grid_pos = self.grid.iter().position(|&l| l == best_lambda).unwrap();
        let mut lo = if grid_pos > 0 { self.grid[grid_pos - 1] } else { best_lambda };
        let mut hi = if grid_pos + 1 < self.grid.len() {
            self.grid[grid_pos + 1]
        } else {
            best_lambda
        };

        if hi > lo {
            let mut c = hi - (hi - lo) / GOLDEN_RATIO;
            let mut d = lo + (hi - lo) / GOLDEN_RATIO;
            let mut fc = self.evaluate(matrix, baselines, c)?;
            let mut fd = self.evaluate(matrix, baselines, d)?;
            evaluated.push((c, fc));
            evaluated.push((d, fd));

            for _ in 0..self.refine_steps {
                if fc > fd {
                    hi = d;
                    d = c;
                    fd = fc;
                    c = hi - (hi - lo) / GOLDEN_RATIO;
                    fc = self.evaluate(matrix, baselines, c)?;
                    evaluated.push((c, fc));
                } else {
                    lo = c;
                    c = d;
                    fc = fd;
                    d = lo + (hi - lo) / GOLDEN_RATIO;
                    fd = self.evaluate(matrix, baselines, d)?;
                    evaluated.push((d, fd));
                }
            }
        }

        let final_idx = Self::pick_best(&evaluated);
        Ok(evaluated[final_idx].0)
    }

    /// Highest score wins; scores within tolerance prefer the smaller lambda
    /// (the conservative symmetric end).
    fn pick_best(evaluated: &[(f64, f64)]) -> usize {
        let mut best = 0;
        for i in 1..evaluated.len() {
            let (lambda, score) = evaluated[i];
            let (best_lambda, best_score) = evaluated[best];
            if score > best_score + SCORE_TIE_TOL
                || ((score - best_score).abs() <= SCORE_TIE_TOL && lambda < best_lambda)
            {
                best = i;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::matrix::ALPHABET;
    use crate::data::SeqLabels;

    /// No variant sites and identical baselines: every lambda scores the
    /// same, so the tie-break must pick the symmetric end.
    fn degenerate_input() -> (SparseAlleleMatrix, PriorPair) {
        let labels =
            SeqLabels::from_labels(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        let n_sites = 4;
        let table = vec![1.0; n_sites * ALPHABET];
        let matrix = SparseAlleleMatrix::new(
            labels,
            n_sites,
            vec![vec![], vec![], vec![]],
            vec![0u8; n_sites],
            table.clone(),
        )
        .unwrap();
        let priors = PriorPair::new(n_sites, table.clone(), table).unwrap();
        (matrix, priors)
    }

    #[test]
    fn test_degenerate_tie_break_symmetric() {
        let (matrix, priors) = degenerate_input();
        let opt = PriorOptimizer::new(1.0);
        let sel = opt
            .select(PriorMode::OptimizeSymmetric, &matrix, &priors)
            .unwrap();
        assert_eq!(sel.lambda, 0.0);
    }

    #[test]
    fn test_degenerate_tie_break_population_mode() {
        // The symmetric tie-break applies regardless of optimize mode.
        let (matrix, priors) = degenerate_input();
        let opt = PriorOptimizer::new(1.0);
        let sel = opt
            .select(PriorMode::OptimizePopulation, &matrix, &priors)
            .unwrap();
        assert_eq!(sel.lambda, 0.0);
    }

    #[test]
    fn test_fixed_modes_skip_search() {
        let (matrix, priors) = degenerate_input();
        let opt = PriorOptimizer::new(1.0);
        let sym = opt
            .select(PriorMode::FixedSymmetric, &matrix, &priors)
            .unwrap();
        let pop = opt
            .select(PriorMode::FixedPopulation, &matrix, &priors)
            .unwrap();
        assert_eq!(sym.lambda, 0.0);
        assert_eq!(pop.lambda, 1.0);
        assert!((sym.log_evidence - pop.log_evidence).abs() < 1e-9);
    }

    #[test]
    fn test_grid_validation() {
        let opt = PriorOptimizer::new(1.0).with_grid(vec![0.5, 0.25]);
        assert!(opt.is_err());
        let opt = PriorOptimizer::new(1.0).with_grid(vec![0.0, 2.0]);
        assert!(opt.is_err());
    }
}
