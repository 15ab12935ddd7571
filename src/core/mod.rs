//! Decoding pipeline, one module per stage
//!
//! `source` loads bytes, `header` and `walker` recover the block lists,
//! `classifier` partitions the file, `strings` pulls out printable runs and
//! `residual` orders them. The remaining modules are plumbing around that.

pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod header;
pub mod layout;
pub mod report;
pub mod residual;
pub mod source;
pub mod strings;
pub mod walker;
pub mod xref;
