//! # Partition Table Writer
//!
//! Writes the delimited sequence-label-to-cluster-id table, one column per
//! resolution level.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::data::SeqIdx;
use crate::error::{BhcError, Result};
use crate::model::partition::Partition;

/// Write partitions as a TSV table: `sequence`, then `level_1..level_L`.
pub fn write_partitions(path: &Path, partitions: &[Partition]) -> Result<()> {
    let first = partitions
        .first()
        .ok_or_else(|| BhcError::invalid_data("no partitions to write"))?;
    let labels = first.labels();
    for p in partitions {
        if !std::sync::Arc::ptr_eq(p.labels(), labels) && p.labels().iter().ne(labels.iter()) {
            return Err(BhcError::invalid_data(
                "partition levels cover different sequence sets",
            ));
        }
    }

    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "sequence")?;
    for level in 1..=partitions.len() {
        write!(out, "\tlevel_{level}")?;
    }
    writeln!(out)?;

    for i in 0..labels.len() {
        let seq = SeqIdx::from(i);
        write!(out, "{}", labels.label(seq))?;
        for p in partitions {
            let id = p
                .cluster_of_label(labels.label(seq))
                .ok_or_else(|| BhcError::invalid_data("label missing from a level"))?;
            write!(out, "\t{id}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeqLabels;

    fn labels(names: &[&str]) -> std::sync::Arc<SeqLabels> {
        SeqLabels::from_labels(names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_writes_one_column_per_level() {
        let l = labels(&["x", "y", "z"]);
        let levels = vec![
            Partition::new(l.clone(), vec![1, 1, 2]).unwrap(),
            Partition::new(l, vec![1, 2, 3]).unwrap(),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        write_partitions(&path, &levels).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows[0], "sequence\tlevel_1\tlevel_2");
        assert_eq!(rows[1], "x\t1\t1");
        assert_eq!(rows[2], "y\t1\t2");
        assert_eq!(rows[3], "z\t2\t3");
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_rejects_mismatched_label_sets() {
        // Same length, different labels: caught before any row is written.
        let levels = vec![
            Partition::new(labels(&["x", "y"]), vec![1, 2]).unwrap(),
            Partition::new(labels(&["x", "w"]), vec![1, 2]).unwrap(),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        let err = write_partitions(&path, &levels);
        assert!(matches!(err, Err(BhcError::InvalidData { .. })));
    }

    #[test]
    fn test_rejects_empty_partition_list() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_partitions(&dir.path().join("out.tsv"), &[]);
        assert!(err.is_err());
    }
}
