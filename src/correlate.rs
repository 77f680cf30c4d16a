// SPDX-License-Identifier: Apache-2.0

//! Post-pass correlation of block-level differences against the global
//! identifier space: which comparison instructions are affected by the diff,
//! plus the call-site dominance relation for context.

use std::collections::{BTreeMap, BTreeSet};

use crate::id_oracle::{BlockId, CallSiteId, CmpId, IdOracle};

/// Machine-consumable summary derived once the comparison pass is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedSummary {
    /// Comparison instructions whose block set intersects the differing
    /// blocks.
    pub affected_cmps: BTreeSet<CmpId>,
    /// The full dominance relation, passed through unfiltered: downstream
    /// target selection wants the complete structure regardless of which
    /// blocks differed.
    pub callsite_dominators: BTreeMap<CallSiteId, BTreeSet<BlockId>>,
}

/// Projects the set of differing blocks onto comparison identifiers: a cmp is
/// affected iff any of the blocks it relates to is in `diff_ids`. One linear
/// pass over the oracle's comparison index.
pub fn correlate(diff_ids: &BTreeSet<BlockId>, oracle: &dyn IdOracle) -> CorrelatedSummary {
    let mut affected_cmps = BTreeSet::new();
    for (cmp, blocks) in oracle.cmp_index() {
        if !blocks.is_disjoint(diff_ids) {
            affected_cmps.insert(*cmp);
        }
    }
    log::debug!(
        "{} differing blocks affect {} comparison sites",
        diff_ids.len(),
        affected_cmps.len()
    );
    CorrelatedSummary {
        affected_cmps,
        callsite_dominators: oracle.callsite_dominators().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_oracle::SequentialIdOracle;
    use crate::ir_parser::Parser;

    fn oracle_for(text: &str) -> SequentialIdOracle {
        let m = Parser::new(text).parse_module("test").unwrap();
        SequentialIdOracle::assign(&m)
    }

    const TWO_CMP: &str = r#"
        define i32 @f(i32 %a, i32 %b) {
        entry:
          %c = icmp eq i32 %a, %b
          br i1 %c, label %then, label %exit
        then:
          %d = icmp slt i32 %a, %b
          br label %exit
        exit:
          ret i32 %a
        }
        "#;

    #[test]
    fn test_affected_cmps_intersection() {
        let oracle = oracle_for(TWO_CMP);
        // Blocks: entry=1, then=2, exit=3; cmps: 1 in entry, 2 in then.
        let summary = correlate(&BTreeSet::from([2]), &oracle);
        assert_eq!(summary.affected_cmps, BTreeSet::from([2]));

        let summary = correlate(&BTreeSet::from([1, 2]), &oracle);
        assert_eq!(summary.affected_cmps, BTreeSet::from([1, 2]));

        // A differing block with no cmp affects nothing.
        let summary = correlate(&BTreeSet::from([3]), &oracle);
        assert!(summary.affected_cmps.is_empty());
    }

    #[test]
    fn test_correlate_idempotent() {
        let oracle = oracle_for(TWO_CMP);
        let diff_ids = BTreeSet::from([1]);
        let first = correlate(&diff_ids, &oracle);
        let second = correlate(&diff_ids, &oracle);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dominators_passed_through_unfiltered() {
        let mut oracle = oracle_for(TWO_CMP);
        let dominators = BTreeMap::from([(1, BTreeSet::from([1, 2])), (2, BTreeSet::from([3]))]);
        oracle.set_callsite_dominators(dominators.clone());
        // No differences at all: dominators still reported in full.
        let summary = correlate(&BTreeSet::new(), &oracle);
        assert!(summary.affected_cmps.is_empty());
        assert_eq!(summary.callsite_dominators, dominators);
    }
}
