// SPDX-License-Identifier: Apache-2.0

//! Structural diff reporting between two versions of a compiled IR module.
//!
//! An external comparator walks the two modules and reports differences into a
//! [`diff_consumer::Consumer`]; this crate records, structures and serializes
//! those differences: a nested human-readable narrative, and a machine-readable
//! summary (affected comparison sites, call-site dominators) for downstream
//! fuzzing target selection.

pub mod correlate;
pub mod diff_consumer;
pub mod id_oracle;
pub mod ir;
pub mod ir_parser;
pub mod numbering;
pub mod report;
pub mod targets_file;
