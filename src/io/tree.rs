//! # External Hierarchy Ingestion
//!
//! Reads a merge-list file describing a rooted strictly-binary tree over
//! sequence labels. Each non-empty, non-comment line names the two children
//! of the next internal node: a child is either a sequence label (a leaf) or
//! `#k`, the 1-based index of an earlier merge line. Non-binary or unrooted
//! trees must be resolved by the producing tool before export; this reader
//! validates structure and rejects anything else.
//!
//! ```text
//! # ((s1, s2), (s3, s4))
//! s1 s2
//! s3 s4
//! #1 #2
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::data::SeqLabels;
use crate::error::{BhcError, Result};
use crate::model::hierarchy::Hierarchy;

fn parse_merge_list<R: Read>(reader: R) -> Result<Hierarchy> {
    let mut lines: Vec<(String, String)> = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // Lines starting with '#' are comments unless the first token is a
        // merge reference like "#3".
        let first = trimmed.split_whitespace().next().unwrap();
        let is_merge_ref = first.len() > 1
            && first.starts_with('#')
            && first[1..].chars().all(|c| c.is_ascii_digit());
        if trimmed.starts_with('#') && !is_merge_ref {
            continue;
        }
        let mut tokens = trimmed.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(a), Some(b), None) => lines.push((a.to_string(), b.to_string())),
            _ => {
                return Err(BhcError::structural(format!(
                    "merge line must have exactly two tokens: {trimmed:?}"
                )))
            }
        }
    }
    if lines.is_empty() {
        return Err(BhcError::structural("empty merge list"));
    }

    // First pass: collect leaf labels in first-appearance order.
    let mut label_order: Vec<String> = Vec::new();
    let mut label_seen: HashMap<String, usize> = HashMap::new();
    for (a, b) in &lines {
        for token in [a, b] {
            if !token.starts_with('#') && !label_seen.contains_key(token) {
                label_seen.insert(token.clone(), label_order.len());
                label_order.push(token.clone());
            }
        }
    }
    let n_leaves = label_order.len();
    let labels = SeqLabels::from_labels(label_order)?;

    // Second pass: resolve tokens to node ids.
    let resolve = |token: &str, line_no: usize| -> Result<usize> {
        if let Some(merge_ref) = token.strip_prefix('#') {
            let k: usize = merge_ref.parse().map_err(|_| {
                BhcError::structural(format!("bad merge reference {token:?} on line {line_no}"))
            })?;
            if k == 0 || k > line_no {
                return Err(BhcError::structural(format!(
                    "merge reference {token:?} on line {line_no} is not yet defined"
                )));
            }
            Ok(n_leaves + k - 1)
        } else {
            Ok(label_seen[token])
        }
    };
    let mut merges = Vec::with_capacity(lines.len());
    for (line_no, (a, b)) in lines.iter().enumerate() {
        merges.push((resolve(a, line_no + 1)?, resolve(b, line_no + 1)?));
    }

    Hierarchy::from_merges(labels, &merges)
}

/// Load a merge-list hierarchy file.
pub fn load_merge_list(path: &Path) -> Result<Hierarchy> {
    if !path.exists() {
        return Err(BhcError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    parse_merge_list(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_balanced_tree() {
        let input = "s1 s2\ns3 s4\n#1 #2\n";
        let h = parse_merge_list(input.as_bytes()).unwrap();
        assert_eq!(h.n_leaves(), 4);
        assert_eq!(h.n_internal(), 3);
        assert!(h.is_complete());
        assert_eq!(h.node(h.root()).children, Some((4, 5)));
    }

    #[test]
    fn test_caterpillar_tree() {
        let input = "a b\n#1 c\n#2 d\n";
        let h = parse_merge_list(input.as_bytes()).unwrap();
        assert_eq!(h.n_leaves(), 4);
        assert_eq!(h.node(h.root()).n_seqs, 4);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let err = parse_merge_list("a #2\nb c\n#1 d\n".as_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn test_reuse_rejected() {
        let err = parse_merge_list("a b\na c\n#1 #2\n".as_bytes());
        assert!(err.is_err());
    }
}
