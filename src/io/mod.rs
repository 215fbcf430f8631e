//! # File I/O
//!
//! Input collaborators for the clustering core: aligned-FASTA loading,
//! external hierarchy ingestion and the partition table writer.

pub mod fasta;
pub mod table;
pub mod tree;
