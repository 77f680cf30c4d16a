// SPDX-License-Identifier: Apache-2.0

//! Sequential display numbering for unnamed entities within a function.
//!
//! Unnamed parameters, blocks and value-producing instructions are assigned
//! small integers in a single deterministic pass so diff output can refer to
//! them the way a textual IR dump would. The pass runs at most once per
//! function per comparison side; callers cache the table for the lifetime of
//! the enclosing comparison scope.

use std::collections::HashMap;

use crate::ir::{BlockRef, FnRef, InstRef, Module, Operand, ParamRef};

/// Walks `f` and numbers every unnamed parameter, block and non-void
/// instruction in declaration order: parameters first, then blocks with their
/// instructions interleaved.
///
/// Void instructions never receive a number since their result cannot be
/// referenced. Panics if the pass finds nothing to number: a numbering request
/// is only ever made on behalf of an entity that was confirmed unnamed, so an
/// empty table means the caller is broken.
pub fn compute_numbering(module: &Module, f: FnRef) -> HashMap<Operand, u32> {
    let mut numbering = HashMap::new();
    let mut next: u32 = 0;
    let func = module.get_fn(f);

    for (index, param) in func.params.iter().enumerate() {
        if param.name.is_none() {
            numbering.insert(
                Operand::Param(ParamRef {
                    func: f.index,
                    index,
                }),
                next,
            );
            next += 1;
        }
    }

    for (block_index, block) in func.blocks.iter().enumerate() {
        if block.name.is_none() {
            numbering.insert(
                Operand::Block(BlockRef {
                    func: f.index,
                    index: block_index,
                }),
                next,
            );
            next += 1;
        }
        for (inst_index, inst) in block.insts.iter().enumerate() {
            if inst.name.is_none() && !inst.ty.is_void() {
                numbering.insert(
                    Operand::Inst(InstRef {
                        func: f.index,
                        block: block_index,
                        index: inst_index,
                    }),
                    next,
                );
                next += 1;
            }
        }
    }

    assert!(
        !numbering.is_empty(),
        "numbering requested for function '{}' but it has no unnamed entities",
        func.name
    );
    log::trace!(
        "numbered {} unnamed entities in function '{}'",
        numbering.len(),
        func.name
    );
    numbering
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_parser::Parser;

    fn parse(text: &str) -> Module {
        Parser::new(text).parse_module("test").unwrap()
    }

    #[test]
    fn test_numbering_order_params_then_blocks_then_insts() {
        let m = parse(
            r#"
            define i32 @f(i32 %0, i32 %named) {
            1:
              %2 = add i32 %0, %named
              br label %exit
            exit:
              %3 = mul i32 %2, %2
              ret i32 %3
            }
            "#,
        );
        let f = m.find_fn("f").unwrap();
        let numbering = compute_numbering(&m, f);
        // Unnamed: param %0, block %1, add %2, mul %3. Named param and the
        // named exit block are skipped; br/ret are void.
        assert_eq!(numbering.len(), 4);
        assert_eq!(
            numbering[&Operand::Param(ParamRef { func: 0, index: 0 })],
            0
        );
        assert_eq!(
            numbering[&Operand::Block(BlockRef { func: 0, index: 0 })],
            1
        );
        assert_eq!(
            numbering[&Operand::Inst(InstRef {
                func: 0,
                block: 0,
                index: 0
            })],
            2
        );
        assert_eq!(
            numbering[&Operand::Inst(InstRef {
                func: 0,
                block: 1,
                index: 0
            })],
            3
        );
    }

    #[test]
    fn test_void_instructions_not_numbered() {
        let m = parse(
            r#"
            declare void @sink(i32 %x)
            define void @f(i32 %0, ptr %p) {
            entry:
              store i32 %0, ptr %p
              call void @sink(i32 %0)
              ret void
            }
            "#,
        );
        let f = m.find_fn("f").unwrap();
        let numbering = compute_numbering(&m, f);
        // Only the unnamed parameter qualifies; the store, the void call and
        // the ret all produce no value.
        assert_eq!(numbering.len(), 1);
        assert_eq!(
            numbering[&Operand::Param(ParamRef { func: 1, index: 0 })],
            0
        );
    }

    #[test]
    #[should_panic(expected = "no unnamed entities")]
    fn test_numbering_empty_table_panics() {
        let m = parse(
            r#"
            define void @f(i32 %a) {
            entry:
              ret void
            }
            "#,
        );
        let f = m.find_fn("f").unwrap();
        compute_numbering(&m, f);
    }
}
