// SPDX-License-Identifier: Apache-2.0

//! Consumer of structural difference data.
//!
//! An external comparator walks two modules in lockstep, entering a comparison
//! scope per paired entity (module, function, block, instruction) and
//! reporting any difference it finds into the active scope. The consumer turns
//! that stream into a nested, indented report with lazily emitted headers:
//! a scope's header is printed at most once, and only once a diagnostic
//! actually lands in it or in a descendant, so subtrees that compare equal
//! leave no trace in the output.
//!
//! Block-scope headers additionally record the block's oracle-assigned diff
//! identifier; the accumulated identifier set is what the post-pass
//! correlation and serialization stages consume.

use std::collections::{BTreeSet, HashMap};
use std::io;

use crate::id_oracle::{BlockId, IdOracle};
use crate::ir::{Entity, InstPayload, InstRef, Module, Operand};
use crate::numbering::compute_numbering;

/// Which side of the comparison an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// One line of a line-oriented instruction diff.
#[derive(Debug, Clone, Copy)]
pub enum DiffLine {
    /// Instructions matched; the left rendering is shown.
    Match(InstRef, InstRef),
    LeftOnly(InstRef),
    RightOnly(InstRef),
}

/// The reporting capability an external comparator drives.
pub trait Consumer {
    /// Record that a comparison scope for the pair has been entered.
    fn enter_context(&mut self, left: Entity, right: Entity);

    /// Record that the innermost comparison scope has been exited.
    fn exit_context(&mut self);

    /// Record a plain difference message in the current scope.
    fn log(&mut self, text: &str);

    /// Record a formatted difference message. The format string may contain
    /// `%l` (next argument, rendered as seen from the left side), `%r` (ditto,
    /// right side) and `%%` (a literal percent). Any other `%`-escape is a
    /// coding defect and aborts.
    fn logf(&mut self, format: &str, args: &[Operand]);

    /// Record a line-by-line instruction diff.
    fn logd(&mut self, lines: &[DiffLine]);
}

/// Closed placeholder vocabulary for [`Consumer::logf`] format strings.
enum Piece<'a> {
    Text(&'a str),
    Left,
    Right,
    Percent,
}

/// Splits a `logf` format string into pieces. Panics on an unknown `%`-escape:
/// format strings come only from trusted internal call sites.
fn parse_format(format: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = format;
    while let Some(pos) = rest.find('%') {
        if pos > 0 {
            pieces.push(Piece::Text(&rest[..pos]));
        }
        let marker = rest[pos + 1..].chars().next();
        match marker {
            Some('l') => pieces.push(Piece::Left),
            Some('r') => pieces.push(Piece::Right),
            Some('%') => pieces.push(Piece::Percent),
            _ => panic!("unknown format character {:?} in {:?}", marker, format),
        }
        rest = &rest[pos + 2..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    pieces
}

struct Scope {
    left: Entity,
    right: Entity,
    /// True once a diagnostic landed in this scope or a descendant.
    differences: bool,
    /// True once this scope's header line has been printed.
    header_emitted: bool,
    left_numbering: Option<HashMap<Operand, u32>>,
    right_numbering: Option<HashMap<Operand, u32>>,
}

impl Scope {
    fn new(left: Entity, right: Entity) -> Self {
        Scope {
            left,
            right,
            differences: false,
            header_emitted: false,
            left_numbering: None,
            right_numbering: None,
        }
    }
}

/// The one full [`Consumer`] implementation: renders the nested diff narrative
/// to `out` and accumulates the set of differing blocks' diff identifiers.
pub struct DiffConsumer<'a, W: io::Write> {
    left: &'a Module,
    right: &'a Module,
    oracle: &'a dyn IdOracle,
    out: W,
    contexts: Vec<Scope>,
    differences: bool,
    indent: usize,
    diff_ids: BTreeSet<BlockId>,
}

impl<'a, W: io::Write> DiffConsumer<'a, W> {
    pub fn new(left: &'a Module, right: &'a Module, oracle: &'a dyn IdOracle, out: W) -> Self {
        DiffConsumer {
            left,
            right,
            oracle,
            out,
            contexts: Vec::new(),
            differences: false,
            indent: 0,
            diff_ids: BTreeSet::new(),
        }
    }

    /// True iff any difference was reported over the whole comparison.
    pub fn had_differences(&self) -> bool {
        self.differences
    }

    /// Diff identifiers of every block scope whose header was emitted.
    pub fn diff_ids(&self) -> &BTreeSet<BlockId> {
        &self.diff_ids
    }

    /// Hands the output writer back, consuming the consumer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn module_for(&self, side: Side) -> &'a Module {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()) {
            // The caller guarantees the diagnostic stream stays valid for the
            // duration of the pass.
            panic!("failed writing diff report: {}", e);
        }
    }

    fn emit_indent(&mut self) {
        for _ in 0..self.indent {
            self.emit(" ");
        }
    }

    /// Finds the synthesized display number for an unnamed entity by walking
    /// the scope stack innermost-to-outermost for the first function scope on
    /// the requested side. `None` means no enclosing function scope exists.
    fn lookup_number(&mut self, key: Operand, side: Side) -> Option<u32> {
        let module = self.module_for(side);
        for scope in self.contexts.iter_mut().rev() {
            let (entity, numbering) = match side {
                Side::Left => (scope.left, &mut scope.left_numbering),
                Side::Right => (scope.right, &mut scope.right_numbering),
            };
            let Entity::Func(f) = entity else {
                continue;
            };
            let table = numbering.get_or_insert_with(|| compute_numbering(module, f));
            let n = table.get(&key).copied().unwrap_or_else(|| {
                panic!(
                    "entity {:?} missing from numbering table of function '{}'",
                    key,
                    module.get_fn(f).name
                )
            });
            return Some(n);
        }
        None
    }

    /// Renders an operand reference the way the report displays it: names for
    /// named entities, derived descriptions for unnamed void producers, raw
    /// renderings for constants, synthesized numbers otherwise.
    fn operand_to_string(&mut self, op: Operand, side: Side) -> String {
        let module = self.module_for(side);
        match op {
            Operand::Func(f) => format!("@{}", module.get_fn(f).name),
            Operand::Const(c) => format!("{} {}", c.ty, c.value),
            Operand::Param(p) => match &module.get_param(p).name {
                Some(name) => format!("%{}", name),
                None => self.numbered_to_string(op, side),
            },
            Operand::Block(b) => match &module.get_block(b).name {
                Some(name) => format!("%{}", name),
                None => self.numbered_to_string(op, side),
            },
            Operand::Inst(r) => {
                let inst = module.get_inst(r);
                if let Some(name) = &inst.name {
                    return format!("%{}", name);
                }
                if inst.ty.is_void() {
                    return match inst.payload {
                        InstPayload::Store { ptr, .. } => {
                            format!("store to {}", self.operand_to_string(ptr, side))
                        }
                        InstPayload::Call { callee, .. } => {
                            format!("call to {}", self.operand_to_string(callee, side))
                        }
                        _ => self.inst_to_string(r, side),
                    };
                }
                self.numbered_to_string(op, side)
            }
        }
    }

    fn numbered_to_string(&mut self, op: Operand, side: Side) -> String {
        match self.lookup_number(op, side) {
            Some(n) => format!("%{}", n),
            None => "<anonymous>".to_string(),
        }
    }

    /// Like [`Self::operand_to_string`] but for positions inside a full
    /// instruction rendering where the type is already spelled out: constants
    /// print bare.
    fn operand_value_to_string(&mut self, op: Operand, side: Side) -> String {
        match op {
            Operand::Const(c) => format!("{}", c.value),
            _ => self.operand_to_string(op, side),
        }
    }

    fn typed_operand_to_string(&mut self, op: Operand, side: Side) -> String {
        let ty = self.module_for(side).operand_type(op);
        format!("{} {}", ty, self.operand_value_to_string(op, side))
    }

    /// Full textual rendering of an instruction, e.g.
    /// `%c = icmp eq i32 %a, %b`.
    fn inst_to_string(&mut self, r: InstRef, side: Side) -> String {
        let module = self.module_for(side);
        let inst = module.get_inst(r);
        let mut s = String::new();
        if !inst.ty.is_void() {
            s.push_str(&self.operand_to_string(Operand::Inst(r), side));
            s.push_str(" = ");
        }
        match &inst.payload {
            InstPayload::Binop(op, lhs, rhs) => {
                s.push_str(&format!(
                    "{} {} {}, {}",
                    op.operator(),
                    module.operand_type(*lhs),
                    self.operand_value_to_string(*lhs, side),
                    self.operand_value_to_string(*rhs, side)
                ));
            }
            InstPayload::Cmp(kind, lhs, rhs) => {
                s.push_str(&format!(
                    "icmp {} {} {}, {}",
                    kind.predicate(),
                    module.operand_type(*lhs),
                    self.operand_value_to_string(*lhs, side),
                    self.operand_value_to_string(*rhs, side)
                ));
            }
            InstPayload::Load { ty, ptr } => {
                s.push_str(&format!(
                    "load {}, ptr {}",
                    ty,
                    self.operand_to_string(*ptr, side)
                ));
            }
            InstPayload::Store { value, ptr } => {
                s.push_str(&format!(
                    "store {}, ptr {}",
                    self.typed_operand_to_string(*value, side),
                    self.operand_to_string(*ptr, side)
                ));
            }
            InstPayload::Call { callee, args } => {
                s.push_str(&format!(
                    "call {} {}(",
                    inst.ty,
                    self.operand_to_string(*callee, side)
                ));
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    s.push_str(&self.typed_operand_to_string(*arg, side));
                }
                s.push(')');
            }
            InstPayload::Br(target) => {
                s.push_str(&format!(
                    "br label {}",
                    self.operand_to_string(Operand::Block(*target), side)
                ));
            }
            InstPayload::CondBr {
                cond,
                then_blk,
                else_blk,
            } => {
                s.push_str(&format!(
                    "br {}, label {}, label {}",
                    self.typed_operand_to_string(*cond, side),
                    self.operand_to_string(Operand::Block(*then_blk), side),
                    self.operand_to_string(Operand::Block(*else_blk), side)
                ));
            }
            InstPayload::Ret(value) => match value {
                Some(v) => {
                    s.push_str(&format!("ret {}", self.typed_operand_to_string(*v, side)));
                }
                None => s.push_str("ret void"),
            },
        }
        s
    }

    /// Emits any pending scope headers, outermost first, marking each as
    /// emitted (and as containing a difference) so it never prints twice.
    fn header(&mut self) {
        for i in 0..self.contexts.len() {
            if self.contexts[i].header_emitted {
                continue;
            }
            let (left, right) = (self.contexts[i].left, self.contexts[i].right);
            match (left, right) {
                (Entity::Func(lf), Entity::Func(rf)) => {
                    // Extra newline between functions.
                    if self.differences {
                        self.emit("\n\n");
                    }
                    let lname = self.left.get_fn(lf).name.clone();
                    let rname = self.right.get_fn(rf).name.clone();
                    if lname == rname {
                        self.emit(&format!("in function {}:\n", lname));
                    } else {
                        self.emit(&format!("in function {} / {}:\n", lname, rname));
                    }
                }
                (Entity::Block(lb), Entity::Block(rb)) => {
                    let diff_id = self.oracle.block_diff_id(lb);
                    self.diff_ids.insert(diff_id);
                    let lname = self.left.get_block(lb).name.clone();
                    let rname = self.right.get_block(rb).name.clone();
                    match (lname, rname) {
                        (Some(l), Some(r)) if l == r => {
                            self.emit(&format!("  in block %{} ({}):\n", l, diff_id));
                        }
                        _ => {
                            let l = self.operand_to_string(Operand::Block(lb), Side::Left);
                            let r = self.operand_to_string(Operand::Block(rb), Side::Right);
                            self.emit(&format!("  in block {} / {} ({}):\n", l, r, diff_id));
                        }
                    }
                }
                (Entity::Inst(li), Entity::Inst(ri)) => {
                    let l = self.operand_to_string(Operand::Inst(li), Side::Left);
                    let r = self.operand_to_string(Operand::Inst(ri), Side::Right);
                    self.emit(&format!("    in instruction {} / {}:\n", l, r));
                }
                // Module scopes get no header line of their own.
                (Entity::Module, Entity::Module) => {}
                (l, r) => {
                    debug_assert!(false, "mismatched scope kinds: {} vs {}", l.kind(), r.kind());
                }
            }
            self.contexts[i].header_emitted = true;
            self.contexts[i].differences = true;
        }
    }
}

impl<W: io::Write> Consumer for DiffConsumer<'_, W> {
    fn enter_context(&mut self, left: Entity, right: Entity) {
        debug_assert_eq!(
            left.kind(),
            right.kind(),
            "comparator paired entities of different kinds"
        );
        self.contexts.push(Scope::new(left, right));
        self.indent += 2;
    }

    fn exit_context(&mut self) {
        let Some(scope) = self.contexts.pop() else {
            panic!("exit_context without matching enter_context");
        };
        self.differences |= scope.differences;
        if let Some(parent) = self.contexts.last_mut() {
            parent.differences |= scope.differences;
        }
        self.indent -= 2;
    }

    fn log(&mut self, text: &str) {
        self.header();
        self.emit_indent();
        self.emit(text);
        self.emit("\n");
    }

    fn logf(&mut self, format: &str, args: &[Operand]) {
        self.header();
        self.emit_indent();
        let pieces = parse_format(format);
        let mut arg = 0;
        for piece in pieces {
            match piece {
                Piece::Text(text) => self.emit(text),
                Piece::Percent => self.emit("%"),
                Piece::Left => {
                    let s = self.operand_to_string(args[arg], Side::Left);
                    arg += 1;
                    self.emit(&s);
                }
                Piece::Right => {
                    let s = self.operand_to_string(args[arg], Side::Right);
                    arg += 1;
                    self.emit(&s);
                }
            }
        }
        self.emit("\n");
    }

    fn logd(&mut self, lines: &[DiffLine]) {
        self.header();
        for line in lines {
            self.emit_indent();
            let rendered = match *line {
                DiffLine::Match(l, _) => format!("  {}", self.inst_to_string(l, Side::Left)),
                DiffLine::LeftOnly(l) => format!("< {}", self.inst_to_string(l, Side::Left)),
                DiffLine::RightOnly(r) => format!("> {}", self.inst_to_string(r, Side::Right)),
            };
            self.emit(&rendered);
            self.emit("\n");
        }
    }
}
