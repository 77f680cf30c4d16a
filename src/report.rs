// SPDX-License-Identifier: Apache-2.0

//! Serialization of the final diff state: a human-readable statistics block
//! and a structured JSON document for the downstream fuzzer.
//!
//! The JSON mode splices a caller-supplied document fragment (typically the
//! CFG edge list produced by a companion pipeline stage) verbatim between this
//! tool's own fields. The fragment's punctuation must already be compatible
//! with its position inside a JSON object; no validation is performed here.

use std::collections::BTreeSet;
use std::io::{self, Read, Write};

use crate::correlate::correlate;
use crate::id_oracle::{BlockId, IdOracle};

/// Writes the text-mode statistics block: differing block ids, affected
/// comparison ids, and the full call-site dominator relation.
pub fn write_text_stats<W: Write>(
    out: &mut W,
    diff_ids: &BTreeSet<BlockId>,
    oracle: &dyn IdOracle,
) -> io::Result<()> {
    writeln!(out)?;
    write!(out, "Diff BB IDs:")?;
    for id in diff_ids {
        write!(out, " {}", id)?;
    }
    writeln!(out)?;

    let summary = correlate(diff_ids, oracle);
    write!(out, "Diff Cmp IDs:")?;
    for cmp in &summary.affected_cmps {
        write!(out, " {}", cmp)?;
    }
    writeln!(out)?;

    writeln!(out, "Call Site Dominators:")?;
    for (callsite, blocks) in &summary.callsite_dominators {
        write!(out, "{}:", callsite)?;
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                write!(out, ",")?;
            }
            write!(out, " {}", block)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Writes the structured document: `targets`, the embedded fragment copied
/// byte-for-byte from `embedded`, `id_mapping` and `callsite_dominators`.
pub fn write_json_document<W: Write, R: Read>(
    out: &mut W,
    embedded: &mut R,
    diff_ids: &BTreeSet<BlockId>,
    oracle: &dyn IdOracle,
) -> io::Result<()> {
    let summary = correlate(diff_ids, oracle);

    write!(out, "{{\n\"targets\": [")?;
    for (i, cmp) in summary.affected_cmps.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        write!(out, "{}", cmp)?;
    }
    write!(out, "],\n")?;

    io::copy(embedded, out)?;
    write!(out, ",\n")?;

    write!(out, "\"id_mapping\": {{")?;
    for (i, (block, cmps)) in oracle.block_cmp_map().iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        write!(out, "\"{}\": [", block)?;
        for (j, cmp) in cmps.iter().enumerate() {
            if j > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{}", cmp)?;
        }
        write!(out, "]")?;
    }
    write!(out, "}},\n")?;

    write!(out, "\"callsite_dominators\": {{")?;
    for (i, (callsite, blocks)) in summary.callsite_dominators.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        write!(out, "\"{}\": [", callsite)?;
        for (j, block) in blocks.iter().enumerate() {
            if j > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{}", block)?;
        }
        write!(out, "]")?;
    }
    write!(out, "}}\n}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_oracle::SequentialIdOracle;
    use crate::ir_parser::Parser;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn oracle() -> SequentialIdOracle {
        let m = Parser::new(
            r#"
            declare void @sink(i32 %x)
            define i32 @f(i32 %a, i32 %b) {
            entry:
              %c = icmp eq i32 %a, %b
              br i1 %c, label %then, label %exit
            then:
              %d = icmp slt i32 %a, %b
              call void @sink(i32 %a)
              br label %exit
            exit:
              ret i32 %a
            }
            "#,
        )
        .parse_module("test")
        .unwrap();
        let mut oracle = SequentialIdOracle::assign(&m);
        oracle.set_callsite_dominators(BTreeMap::from([(1, BTreeSet::from([1, 2]))]));
        oracle
    }

    #[test]
    fn test_text_stats() {
        let oracle = oracle();
        let mut out = Vec::new();
        write_text_stats(&mut out, &BTreeSet::from([1, 2]), &oracle).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\nDiff BB IDs: 1 2\nDiff Cmp IDs: 1 2\nCall Site Dominators:\n1: 1, 2\n"
        );
    }

    #[test]
    fn test_json_document_verbatim_embedding() {
        let oracle = oracle();
        let mut out = Vec::new();
        let mut embedded = "{\"foo\":1}".as_bytes();
        write_json_document(&mut out, &mut embedded, &BTreeSet::from([2]), &oracle).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "{\n\"targets\": [2],\n{\"foo\":1},\n\"id_mapping\": {\"1\": [1], \"2\": [2]},\n\"callsite_dominators\": {\"1\": [1, 2]}\n}"
        );
        // The fragment sits verbatim between targets and id_mapping.
        let targets_end = text.find("],").unwrap();
        let mapping_start = text.find("\"id_mapping\"").unwrap();
        assert!(text[targets_end..mapping_start].contains("{\"foo\":1}"));
    }

    #[test]
    fn test_json_document_parses_with_fragment_field() {
        // With a key-value fragment (the production shape: a CFG edge list)
        // the result is a well-formed JSON object.
        let oracle = oracle();
        let mut out = Vec::new();
        let mut embedded = "\"edges\": [[1, 2], [2, 3]]".as_bytes();
        write_json_document(&mut out, &mut embedded, &BTreeSet::from([1]), &oracle).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["targets"], serde_json::json!([1]));
        assert_eq!(value["edges"], serde_json::json!([[1, 2], [2, 3]]));
        assert_eq!(value["id_mapping"]["2"], serde_json::json!([2]));
        assert_eq!(value["callsite_dominators"]["1"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_empty_diff_set_still_reports_dominators() {
        let oracle = oracle();
        let mut out = Vec::new();
        write_text_stats(&mut out, &BTreeSet::new(), &oracle).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\nDiff BB IDs:\nDiff Cmp IDs:\nCall Site Dominators:\n1: 1, 2\n"
        );
    }
}
