//! # High-Level Orchestration
//!
//! Pipelines tie the model components together: one clustering pass and the
//! multi-resolution recursion.

pub mod multilevel;

pub use multilevel::{MultiLevelConfig, MultiResolutionDriver};
