// SPDX-License-Identifier: Apache-2.0

//! Data model for the SSA-style IR that structural diffing operates over:
//! modules containing functions, functions containing basic blocks, blocks
//! containing instructions.
//!
//! Everything is arena-style: a `Module` owns all of its functions, blocks and
//! instructions in declaration order, and the `*Ref` wrappers are plain index
//! handles into that arena. The diff machinery borrows two modules (a left and
//! a right side) and passes refs around; it never owns IR.

use std::fmt;

/// Value type carried by parameters, instructions and constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Void,
    Int(usize),
    Ptr,
}

impl Type {
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(width) => write!(f, "i{}", width),
            Type::Ptr => write!(f, "ptr"),
        }
    }
}

/// Index of a function within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnRef {
    pub index: usize,
}

/// Index of a parameter within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamRef {
    pub func: usize,
    pub index: usize,
}

/// Index of a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef {
    pub func: usize,
    pub index: usize,
}

/// Index of an instruction within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstRef {
    pub func: usize,
    pub block: usize,
    pub index: usize,
}

/// An integer constant with its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Const {
    pub ty: Type,
    pub value: i64,
}

/// Anything an instruction can refer to.
///
/// This is the tagged-variant replacement for downcast-style dispatch: code
/// that cares about the referent's kind matches on this exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Param(ParamRef),
    Inst(InstRef),
    Block(BlockRef),
    Func(FnRef),
    Const(Const),
}

/// One side of a comparison scope: the four structural levels the diff walk
/// descends through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Module,
    Func(FnRef),
    Block(BlockRef),
    Inst(InstRef),
}

impl Entity {
    /// Discriminant-only view, used to check that both sides of a scope pair
    /// the same structural kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Module => "module",
            Entity::Func(_) => "function",
            Entity::Block(_) => "block",
            Entity::Inst(_) => "instruction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binop {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

impl Binop {
    pub fn operator(&self) -> &'static str {
        match self {
            Binop::Add => "add",
            Binop::Sub => "sub",
            Binop::Mul => "mul",
            Binop::And => "and",
            Binop::Or => "or",
            Binop::Xor => "xor",
        }
    }
}

/// Comparison predicate; comparison instructions are the unit of interest for
/// downstream target selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpKind {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpKind {
    pub fn predicate(&self) -> &'static str {
        match self {
            CmpKind::Eq => "eq",
            CmpKind::Ne => "ne",
            CmpKind::Ult => "ult",
            CmpKind::Ule => "ule",
            CmpKind::Ugt => "ugt",
            CmpKind::Uge => "uge",
            CmpKind::Slt => "slt",
            CmpKind::Sle => "sle",
            CmpKind::Sgt => "sgt",
            CmpKind::Sge => "sge",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstPayload {
    Binop(Binop, Operand, Operand),
    Cmp(CmpKind, Operand, Operand),
    Load {
        ty: Type,
        ptr: Operand,
    },
    Store {
        value: Operand,
        ptr: Operand,
    },
    Call {
        callee: Operand,
        args: Vec<Operand>,
    },
    Br(BlockRef),
    CondBr {
        cond: Operand,
        then_blk: BlockRef,
        else_blk: BlockRef,
    },
    Ret(Option<Operand>),
}

impl InstPayload {
    pub fn operator(&self) -> &'static str {
        match self {
            InstPayload::Binop(op, ..) => op.operator(),
            InstPayload::Cmp(..) => "icmp",
            InstPayload::Load { .. } => "load",
            InstPayload::Store { .. } => "store",
            InstPayload::Call { .. } => "call",
            InstPayload::Br(..) | InstPayload::CondBr { .. } => "br",
            InstPayload::Ret(..) => "ret",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// `None` means the parameter is unnamed and gets a synthesized display
    /// number.
    pub name: Option<String>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub name: Option<String>,
    /// `Type::Void` for instructions that do not produce a referenceable
    /// result (stores, branches, void calls, ret).
    pub ty: Type,
    pub payload: InstPayload,
}

impl Inst {
    pub fn is_cmp(&self) -> bool {
        matches!(self.payload, InstPayload::Cmp(..))
    }

    pub fn is_call(&self) -> bool {
        matches!(self.payload, InstPayload::Call { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: Option<String>,
    pub insts: Vec<Inst>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret_ty: Type,
    pub params: Vec<Param>,
    pub blocks: Vec<Block>,
}

impl Function {
    /// A function with no blocks is an external declaration.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            functions: Vec::new(),
        }
    }

    pub fn get_fn(&self, r: FnRef) -> &Function {
        &self.functions[r.index]
    }

    pub fn get_param(&self, r: ParamRef) -> &Param {
        &self.functions[r.func].params[r.index]
    }

    pub fn get_block(&self, r: BlockRef) -> &Block {
        &self.functions[r.func].blocks[r.index]
    }

    pub fn get_inst(&self, r: InstRef) -> &Inst {
        &self.functions[r.func].blocks[r.block].insts[r.index]
    }

    pub fn find_fn(&self, name: &str) -> Option<FnRef> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|index| FnRef { index })
    }

    /// Type of the value an operand denotes. Blocks and functions are only
    /// ever referenced as labels/callees, modeled as pointers.
    pub fn operand_type(&self, op: Operand) -> Type {
        match op {
            Operand::Param(r) => self.get_param(r).ty,
            Operand::Inst(r) => self.get_inst(r).ty,
            Operand::Const(c) => c.ty,
            Operand::Block(_) | Operand::Func(_) => Type::Ptr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(Type::Void.to_string(), "void");
        assert_eq!(Type::Int(32).to_string(), "i32");
        assert_eq!(Type::Int(1).to_string(), "i1");
        assert_eq!(Type::Ptr.to_string(), "ptr");
    }

    #[test]
    fn test_entity_kind() {
        assert_eq!(Entity::Module.kind(), "module");
        assert_eq!(Entity::Func(FnRef { index: 0 }).kind(), "function");
        assert_eq!(
            Entity::Block(BlockRef { func: 0, index: 1 }).kind(),
            "block"
        );
        assert_eq!(
            Entity::Inst(InstRef {
                func: 0,
                block: 1,
                index: 2
            })
            .kind(),
            "instruction"
        );
    }

    #[test]
    fn test_module_lookup() {
        let m = Module {
            name: "m".to_string(),
            functions: vec![Function {
                name: "f".to_string(),
                ret_ty: Type::Int(32),
                params: vec![Param {
                    name: Some("a".to_string()),
                    ty: Type::Int(32),
                }],
                blocks: vec![Block {
                    name: Some("entry".to_string()),
                    insts: vec![Inst {
                        name: None,
                        ty: Type::Void,
                        payload: InstPayload::Ret(Some(Operand::Param(ParamRef {
                            func: 0,
                            index: 0,
                        }))),
                    }],
                }],
            }],
        };
        let f = m.find_fn("f").unwrap();
        assert_eq!(f, FnRef { index: 0 });
        assert!(m.find_fn("g").is_none());
        let block = m.get_block(BlockRef { func: 0, index: 0 });
        assert_eq!(block.name.as_deref(), Some("entry"));
        let inst = m.get_inst(InstRef {
            func: 0,
            block: 0,
            index: 0,
        });
        assert_eq!(inst.payload.operator(), "ret");
        assert!(inst.ty.is_void());
    }

    #[test]
    fn test_operand_type() {
        let m = Module {
            name: "m".to_string(),
            functions: vec![Function {
                name: "f".to_string(),
                ret_ty: Type::Void,
                params: vec![Param {
                    name: None,
                    ty: Type::Ptr,
                }],
                blocks: vec![],
            }],
        };
        assert_eq!(
            m.operand_type(Operand::Param(ParamRef { func: 0, index: 0 })),
            Type::Ptr
        );
        assert_eq!(
            m.operand_type(Operand::Const(Const {
                ty: Type::Int(8),
                value: 3
            })),
            Type::Int(8)
        );
        assert_eq!(m.operand_type(Operand::Func(FnRef { index: 0 })), Type::Ptr);
    }
}
