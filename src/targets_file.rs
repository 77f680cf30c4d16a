// SPDX-License-Identifier: Apache-2.0

//! Typed view of the structured document this tool emits, as the downstream
//! fuzzer consumes it: affected comparison targets, the CFG edge list embedded
//! from the companion pipeline stage, the block-to-comparison mapping, and the
//! call-site dominators.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::id_oracle::{BlockId, CallSiteId, CmpId};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetsDocument {
    pub targets: BTreeSet<CmpId>,
    /// CFG edges embedded from the companion document; absent when the caller
    /// embedded something else.
    #[serde(default)]
    pub edges: Vec<(BlockId, BlockId)>,
    #[serde(default)]
    pub id_mapping: BTreeMap<BlockId, BTreeSet<CmpId>>,
    #[serde(default)]
    pub callsite_dominators: BTreeMap<CallSiteId, BTreeSet<BlockId>>,
}

pub fn parse_targets_document<R: Read>(reader: R) -> anyhow::Result<TargetsDocument> {
    let doc = serde_json::from_reader(reader).context("malformed targets document")?;
    Ok(doc)
}

pub fn load_targets_document(path: &Path) -> anyhow::Result<TargetsDocument> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    parse_targets_document(BufReader::new(file))
}
