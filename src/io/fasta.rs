//! # Aligned FASTA Loading
//!
//! Builds a [`SparseAlleleMatrix`] from a multiple-sequence alignment:
//! majority-rule consensus per site, consensus-relative allele codes, and the
//! two baseline prior tables (symmetric and population-frequency).
//!
//! Alphabet: A, C, G, T plus a gap/other category (N, ambiguity codes and
//! gaps all fold into it). U reads as T.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::info;

use crate::data::matrix::{PriorPair, SparseAlleleMatrix, ALPHABET};
use crate::data::SeqLabels;
use crate::error::{BhcError, Result};

/// Pseudo-frequency floor keeping population pseudo-counts strictly positive.
const FREQ_FLOOR: f64 = 1e-3;

/// A loaded alignment: the matrix under the symmetric prior, plus both
/// baseline prior tables for mixing.
#[derive(Debug)]
pub struct Alignment {
    pub matrix: SparseAlleleMatrix,
    pub priors: PriorPair,
}

#[inline]
fn symbol_index(byte: u8) -> usize {
    match byte.to_ascii_lowercase() {
        b'a' => 0,
        b'c' => 1,
        b'g' => 2,
        b't' | b'u' => 3,
        _ => 4,
    }
}

/// Read an aligned FASTA file into label and symbol-index rows.
fn parse_fasta<R: Read>(reader: R) -> Result<(Vec<String>, Vec<Vec<u8>>)> {
    let mut labels = Vec::new();
    let mut rows: Vec<Vec<u8>> = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(header) = trimmed.strip_prefix('>') {
            let label = header.split_whitespace().next().unwrap_or("").to_string();
            if label.is_empty() {
                return Err(BhcError::fasta("record with empty label"));
            }
            labels.push(label);
            rows.push(Vec::new());
        } else {
            let row = rows
                .last_mut()
                .ok_or_else(|| BhcError::fasta("sequence data before first header"))?;
            row.extend(trimmed.bytes().map(|b| symbol_index(b) as u8));
        }
    }
    if labels.is_empty() {
        return Err(BhcError::fasta("no sequences found"));
    }
    let width = rows[0].len();
    if width == 0 {
        return Err(BhcError::fasta(format!("empty sequence: {}", labels[0])));
    }
    for (label, row) in labels.iter().zip(&rows) {
        if row.len() != width {
            return Err(BhcError::fasta(format!(
                "alignment is ragged: {} has {} sites, expected {}",
                label,
                row.len(),
                width
            )));
        }
    }
    Ok((labels, rows))
}

/// Build the sparse matrix and prior tables from parsed symbol rows.
pub fn build_alignment(labels: Vec<String>, rows: Vec<Vec<u8>>) -> Result<Alignment> {
    let n_seqs = rows.len();
    let n_sites = rows[0].len();
    let labels = SeqLabels::from_labels(labels)?;

    // Per-site symbol frequencies and majority-rule consensus.
    let mut consensus = vec![0u8; n_sites];
    let mut code_of_symbol = vec![[0u8; ALPHABET]; n_sites];
    let symmetric = vec![1.0f64; n_sites * ALPHABET];
    let mut population = vec![0.0f64; n_sites * ALPHABET];

    let mut site_counts = vec![0u32; ALPHABET];
    for site in 0..n_sites {
        site_counts.fill(0);
        for row in &rows {
            site_counts[row[site] as usize] += 1;
        }
        let cons = site_counts
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(sym, _)| sym)
            .unwrap();
        consensus[site] = cons as u8;

        // Consensus symbol takes code 0; the rest keep ascending order.
        let mut next_code = 1u8;
        for sym in 0..ALPHABET {
            if sym == cons {
                code_of_symbol[site][sym] = 0;
            } else {
                code_of_symbol[site][sym] = next_code;
                next_code += 1;
            }
        }

        // Population prior: frequency-proportional pseudo-counts normalized
        // to the same total mass as the symmetric prior, so the mixing
        // parameter trades off shape rather than strength.
        let norm = ALPHABET as f64 / (1.0 + ALPHABET as f64 * FREQ_FLOOR);
        for sym in 0..ALPHABET {
            let freq = site_counts[sym] as f64 / n_seqs as f64;
            let code = code_of_symbol[site][sym] as usize;
            population[site * ALPHABET + code] = (freq + FREQ_FLOOR) * norm;
        }
    }

    // Sparse columns: one (site, code) entry per non-consensus cell.
    let columns: Vec<Vec<(u32, u8)>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter_map(|(site, &sym)| {
                    let code = code_of_symbol[site][sym as usize];
                    (code != 0).then_some((site as u32, code))
                })
                .collect()
        })
        .collect();

    let matrix = SparseAlleleMatrix::new(labels, n_sites, columns, consensus, symmetric.clone())?;
    let priors = PriorPair::new(n_sites, symmetric, population)?;
    Ok(Alignment { matrix, priors })
}

/// Load an aligned FASTA file.
pub fn load_fasta(path: &Path) -> Result<Alignment> {
    if !path.exists() {
        return Err(BhcError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let (labels, rows) = parse_fasta(File::open(path)?)?;
    let alignment = build_alignment(labels, rows)?;
    info!(
        n_seqs = alignment.matrix.n_seqs(),
        n_sites = alignment.matrix.n_sites(),
        nnz = alignment.matrix.nnz(),
        "alignment loaded"
    );
    Ok(alignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeqIdx;

    const FASTA: &str = ">s1\nACGT\n>s2\nACGA\n>s3\nACG-\n";

    #[test]
    fn test_parse_and_codes() {
        let (labels, rows) = parse_fasta(FASTA.as_bytes()).unwrap();
        let alignment = build_alignment(labels, rows).unwrap();
        let m = &alignment.matrix;

        assert_eq!(m.n_seqs(), 3);
        assert_eq!(m.n_sites(), 4);
        // Sites 0-2 are all-consensus. At site 3, T, A and gap appear once
        // each; ties prefer the smallest symbol index, so consensus is A and
        // s1 (T) and s3 (gap) carry nonzero codes while s2 matches.
        assert_eq!(m.variant_sites(), vec![3]);
        assert_eq!(m.column(SeqIdx::new(1)), &[] as &[(u32, u8)]);
        assert_eq!(m.column(SeqIdx::new(0)).len(), 1);
        assert_eq!(m.column(SeqIdx::new(2)).len(), 1);
    }

    #[test]
    fn test_population_prior_mass() {
        let (labels, rows) = parse_fasta(FASTA.as_bytes()).unwrap();
        let alignment = build_alignment(labels, rows).unwrap();
        for site in 0..4 {
            let row = &alignment.priors.population()[site * ALPHABET..(site + 1) * ALPHABET];
            let total: f64 = row.iter().sum();
            assert!((total - ALPHABET as f64).abs() < 1e-9, "site {site}: {total}");
            assert!(row.iter().all(|&a| a > 0.0));
        }
    }

    #[test]
    fn test_ragged_alignment_rejected() {
        let err = parse_fasta(">a\nACGT\n>b\nAC\n".as_bytes())
            .and_then(|(l, r)| build_alignment(l, r));
        assert!(err.is_err());
    }

    #[test]
    fn test_multiline_records() {
        let (labels, rows) = parse_fasta(">a\nAC\nGT\n>b\nACGT\n".as_bytes()).unwrap();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(rows[0], rows[1]);
    }
}
