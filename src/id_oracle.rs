// SPDX-License-Identifier: Apache-2.0

//! The identifier oracle: the read-only query interface through which diff
//! reporting correlates blocks, comparison instructions and call sites with
//! the global identifier space used by the downstream fuzzer.
//!
//! The diffing core only ever consumes this interface; it is injected by the
//! caller and is never constructed, owned or mutated by the core.
//! `SequentialIdOracle` is a concrete assignment over a single module, used by
//! tests and by callers that do not have an externally built index.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ir::{BlockRef, InstPayload, Module};

pub type BlockId = u32;
pub type CmpId = u32;
pub type CallSiteId = u32;

/// Read-only identifier index, fully built before the diff pass starts.
pub trait IdOracle {
    /// Stable opaque identifier for a block. Blocks unknown to the oracle map
    /// to id 0.
    fn block_diff_id(&self, block: BlockRef) -> BlockId;

    /// For each comparison instruction, the blocks it relates to.
    fn cmp_index(&self) -> &BTreeMap<CmpId, BTreeSet<BlockId>>;

    /// For each call site, the blocks control must pass through to reach it.
    /// Precomputed externally; never recomputed here.
    fn callsite_dominators(&self) -> &BTreeMap<CallSiteId, BTreeSet<BlockId>>;

    /// The block-to-comparison multimap, grouped by block.
    fn block_cmp_map(&self) -> &BTreeMap<BlockId, Vec<CmpId>>;
}

/// Dense sequential id assignment over one module: blocks, comparison
/// instructions and call sites are numbered from 1 in declaration order.
///
/// Call-site dominators are not derivable from a lone module walk (dominance
/// is a whole-CFG property computed by a separate pass), so they are accepted
/// pre-built via [`SequentialIdOracle::set_callsite_dominators`].
#[derive(Debug, Default)]
pub struct SequentialIdOracle {
    block_ids: HashMap<BlockRef, BlockId>,
    cmp_index: BTreeMap<CmpId, BTreeSet<BlockId>>,
    callsite_dominators: BTreeMap<CallSiteId, BTreeSet<BlockId>>,
    block_cmp_map: BTreeMap<BlockId, Vec<CmpId>>,
}

impl SequentialIdOracle {
    pub fn assign(module: &Module) -> Self {
        let mut oracle = SequentialIdOracle::default();
        let mut next_block: BlockId = 1;
        let mut next_cmp: CmpId = 1;
        let mut next_callsite: CallSiteId = 1;

        for (func, function) in module.functions.iter().enumerate() {
            for (index, block) in function.blocks.iter().enumerate() {
                let block_id = next_block;
                next_block += 1;
                oracle.block_ids.insert(BlockRef { func, index }, block_id);

                for inst in block.insts.iter() {
                    match inst.payload {
                        InstPayload::Cmp(..) => {
                            let cmp_id = next_cmp;
                            next_cmp += 1;
                            oracle
                                .cmp_index
                                .entry(cmp_id)
                                .or_default()
                                .insert(block_id);
                            oracle
                                .block_cmp_map
                                .entry(block_id)
                                .or_default()
                                .push(cmp_id);
                        }
                        InstPayload::Call { .. } => {
                            // Call sites claim an id even before dominators
                            // are attached so the numbering is stable.
                            next_callsite += 1;
                        }
                        _ => {}
                    }
                }
            }
        }
        log::debug!(
            "assigned ids for module '{}': {} blocks, {} cmps, {} call sites",
            module.name,
            next_block - 1,
            next_cmp - 1,
            next_callsite - 1
        );
        oracle
    }

    pub fn set_callsite_dominators(
        &mut self,
        dominators: BTreeMap<CallSiteId, BTreeSet<BlockId>>,
    ) {
        self.callsite_dominators = dominators;
    }
}

impl IdOracle for SequentialIdOracle {
    fn block_diff_id(&self, block: BlockRef) -> BlockId {
        self.block_ids.get(&block).copied().unwrap_or(0)
    }

    fn cmp_index(&self) -> &BTreeMap<CmpId, BTreeSet<BlockId>> {
        &self.cmp_index
    }

    fn callsite_dominators(&self) -> &BTreeMap<CallSiteId, BTreeSet<BlockId>> {
        &self.callsite_dominators
    }

    fn block_cmp_map(&self) -> &BTreeMap<BlockId, Vec<CmpId>> {
        &self.block_cmp_map
    }
}
