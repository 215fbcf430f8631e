//! # Data Representations
//!
//! Index newtypes, sequence label registry, the sparse allele matrix and the
//! additive cluster sufficient statistic.

pub mod counts;
pub mod matrix;

pub use counts::ClusterCounts;
pub use matrix::SparseAlleleMatrix;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BhcError, Result};

/// Zero-cost newtype for sequence (column) indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SeqIdx(pub u32);

impl SeqIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for SeqIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

/// Registry of sequence labels with index lookup.
///
/// Labels are unique and order-stable: the index of a label never changes
/// after construction.
#[derive(Debug, Clone)]
pub struct SeqLabels {
    labels: Vec<String>,
    index: HashMap<String, SeqIdx>,
}

impl SeqLabels {
    /// Build from a list of labels, rejecting duplicates.
    pub fn from_labels(labels: Vec<String>) -> Result<Arc<Self>> {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), SeqIdx::new(i as u32)).is_some() {
                return Err(BhcError::invalid_data(format!(
                    "duplicate sequence label: {label}"
                )));
            }
        }
        Ok(Arc::new(Self { labels, index }))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, seq: SeqIdx) -> &str {
        &self.labels[seq.as_usize()]
    }

    pub fn lookup(&self, label: &str) -> Option<SeqIdx> {
        self.index.get(label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
