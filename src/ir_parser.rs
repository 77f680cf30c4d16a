// SPDX-License-Identifier: Apache-2.0

//! Parser for the textual form of the IR (an LLVM-flavored syntax).
//!
//! Identifiers that are plain integers (`%0`, a `1:` block label) denote
//! unnamed entities: they parse to `name: None` and exist in the text only so
//! that other instructions can refer to them. Functions must be declared or
//! defined before they are referenced as callees; use `declare` for externs.
//!
//! ```text
//! declare void @sink(i32 %x)
//! define i32 @max(i32 %a, i32 %b) {
//! entry:
//!   %c = icmp sgt i32 %a, %b
//!   br i1 %c, label %then, label %else
//! then:
//!   ret i32 %a
//! else:
//!   ret i32 %b
//! }
//! ```

use std::collections::HashMap;

use crate::ir::{
    Binop, Block, BlockRef, CmpKind, Const, Function, Inst, InstPayload, InstRef, Module, Operand,
    Param, ParamRef, Type,
};

#[derive(Debug)]
pub struct ParseError {
    msg: String,
}

impl ParseError {
    fn new(msg: String) -> Self {
        Self { msg }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ParseError: {}", self.msg)
    }
}

impl std::error::Error for ParseError {}

pub fn parse_path_to_module(path: &std::path::Path) -> Result<Module, ParseError> {
    let file_content = std::fs::read_to_string(path)
        .map_err(|e| ParseError::new(format!("failed to read file: {}", e)))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();
    Parser::new(&file_content).parse_module(&name)
}

pub struct Parser {
    chars: Vec<char>,
    offset: usize,
}

/// Per-function name environment built up while parsing a body.
struct FnEnv {
    values: HashMap<String, Operand>,
    blocks: HashMap<String, usize>,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            offset: 0,
        }
    }

    fn at_eof(&self) -> bool {
        self.offset >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.offset).copied()
    }

    fn rest_of_line(&self) -> String {
        let mut s = String::new();
        for &c in &self.chars[self.offset..] {
            if c == '\n' {
                break;
            }
            s.push(c);
        }
        s
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.offset += 1;
            } else if c == ';' {
                while let Some(c) = self.peek() {
                    self.offset += 1;
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn try_drop(&mut self, s: &str) -> bool {
        self.skip_whitespace_and_comments();
        let candidate: Vec<char> = s.chars().collect();
        if self.chars[self.offset..].starts_with(&candidate) {
            self.offset += candidate.len();
            true
        } else {
            false
        }
    }

    fn drop_or_error(&mut self, s: &str) -> Result<(), ParseError> {
        if self.try_drop(s) {
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "expected '{}'; got '{}'",
                s,
                self.rest_of_line()
            )))
        }
    }

    fn is_identifier_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '.'
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace_and_comments();
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if Self::is_identifier_char(c) {
                s.push(c);
                self.offset += 1;
            } else {
                break;
            }
        }
        if s.is_empty() {
            return Err(ParseError::new(format!(
                "expected identifier; got '{}'",
                self.rest_of_line()
            )));
        }
        Ok(s)
    }

    fn parse_i64(&mut self) -> Result<i64, ParseError> {
        self.skip_whitespace_and_comments();
        let mut s = String::new();
        if self.peek() == Some('-') {
            s.push('-');
            self.offset += 1;
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.offset += 1;
            } else {
                break;
            }
        }
        s.parse::<i64>()
            .map_err(|e| ParseError::new(format!("expected integer: {}", e)))
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let id = self.parse_identifier()?;
        if id == "void" {
            return Ok(Type::Void);
        }
        if id == "ptr" {
            return Ok(Type::Ptr);
        }
        if let Some(width) = id.strip_prefix('i') {
            if let Ok(width) = width.parse::<usize>() {
                return Ok(Type::Int(width));
            }
        }
        Err(ParseError::new(format!("unknown type '{}'", id)))
    }

    /// `%foo` yields `(name, false)`; `%7` yields `("7", true)` where `true`
    /// marks the entity as unnamed.
    fn parse_local_name(&mut self) -> Result<(String, bool), ParseError> {
        self.drop_or_error("%")?;
        let id = self.parse_identifier()?;
        let unnamed = id.chars().all(|c| c.is_ascii_digit());
        Ok((id, unnamed))
    }

    fn parse_operand(
        &mut self,
        ty: Type,
        module: &Module,
        env: &FnEnv,
    ) -> Result<Operand, ParseError> {
        self.skip_whitespace_and_comments();
        match self.peek() {
            Some('%') => {
                let (name, _) = self.parse_local_name()?;
                env.values.get(&name).copied().ok_or_else(|| {
                    ParseError::new(format!("reference to undefined value '%{}'", name))
                })
            }
            Some('@') => {
                self.offset += 1;
                let name = self.parse_identifier()?;
                module.find_fn(&name).map(Operand::Func).ok_or_else(|| {
                    ParseError::new(format!("reference to undeclared function '@{}'", name))
                })
            }
            _ => {
                let value = self.parse_i64()?;
                Ok(Operand::Const(Const { ty, value }))
            }
        }
    }

    fn parse_block_label(&mut self, env: &FnEnv) -> Result<BlockRef, ParseError> {
        self.drop_or_error("label")?;
        let (name, _) = self.parse_local_name()?;
        let index = *env
            .blocks
            .get(&name)
            .ok_or_else(|| ParseError::new(format!("reference to unknown block '%{}'", name)))?;
        // `func` is patched by the caller; blocks are function-local here.
        Ok(BlockRef { func: 0, index })
    }

    fn parse_params(&mut self) -> Result<(Vec<Param>, Vec<String>), ParseError> {
        self.drop_or_error("(")?;
        let mut params = Vec::new();
        let mut keys = Vec::new();
        if !self.try_drop(")") {
            loop {
                let ty = self.parse_type()?;
                let (key, unnamed) = self.parse_local_name()?;
                params.push(Param {
                    name: if unnamed { None } else { Some(key.clone()) },
                    ty,
                });
                keys.push(key);
                if self.try_drop(")") {
                    break;
                }
                self.drop_or_error(",")?;
            }
        }
        Ok((params, keys))
    }

    /// Scans forward (without consuming) from the current offset to the
    /// closing `}` of a function body, collecting block labels in declaration
    /// order. Labels are lines of the form `name:`.
    fn prescan_block_labels(&self) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        let mut line = String::new();
        let mut offset = self.offset;
        loop {
            let c = self.chars.get(offset).copied();
            offset += 1;
            if let Some(c) = c {
                if c != '\n' {
                    line.push(c);
                    continue;
                }
            }
            // End of line, or end of input (which terminates the final line).
            let trimmed = line.split(';').next().unwrap_or("").trim();
            if trimmed == "}" {
                return Ok(labels);
            }
            if let Some(label) = trimmed.strip_suffix(':') {
                if !label.is_empty() && label.chars().all(Self::is_identifier_char) {
                    labels.push(label.to_string());
                }
            }
            line.clear();
            if c.is_none() {
                break;
            }
        }
        Err(ParseError::new(
            "unterminated function body; missing '}'".to_string(),
        ))
    }

    /// Parses one instruction-producing statement. `result` is present for
    /// `%x = ...` forms.
    fn parse_inst(
        &mut self,
        operator: &str,
        result: Option<(String, bool)>,
        module: &Module,
        env: &FnEnv,
    ) -> Result<Inst, ParseError> {
        let binop = match operator {
            "add" => Some(Binop::Add),
            "sub" => Some(Binop::Sub),
            "mul" => Some(Binop::Mul),
            "and" => Some(Binop::And),
            "or" => Some(Binop::Or),
            "xor" => Some(Binop::Xor),
            _ => None,
        };
        let name = match &result {
            Some((key, unnamed)) => {
                if *unnamed {
                    None
                } else {
                    Some(key.clone())
                }
            }
            None => None,
        };

        if let Some(op) = binop {
            let ty = self.parse_type()?;
            let lhs = self.parse_operand(ty, module, env)?;
            self.drop_or_error(",")?;
            let rhs = self.parse_operand(ty, module, env)?;
            return Ok(Inst {
                name,
                ty,
                payload: InstPayload::Binop(op, lhs, rhs),
            });
        }

        match operator {
            "icmp" => {
                let pred = self.parse_identifier()?;
                let kind = match pred.as_str() {
                    "eq" => CmpKind::Eq,
                    "ne" => CmpKind::Ne,
                    "ult" => CmpKind::Ult,
                    "ule" => CmpKind::Ule,
                    "ugt" => CmpKind::Ugt,
                    "uge" => CmpKind::Uge,
                    "slt" => CmpKind::Slt,
                    "sle" => CmpKind::Sle,
                    "sgt" => CmpKind::Sgt,
                    "sge" => CmpKind::Sge,
                    other => {
                        return Err(ParseError::new(format!("unknown icmp predicate '{}'", other)));
                    }
                };
                let ty = self.parse_type()?;
                let lhs = self.parse_operand(ty, module, env)?;
                self.drop_or_error(",")?;
                let rhs = self.parse_operand(ty, module, env)?;
                Ok(Inst {
                    name,
                    ty: Type::Int(1),
                    payload: InstPayload::Cmp(kind, lhs, rhs),
                })
            }
            "load" => {
                let ty = self.parse_type()?;
                self.drop_or_error(",")?;
                self.drop_or_error("ptr")?;
                let ptr = self.parse_operand(Type::Ptr, module, env)?;
                Ok(Inst {
                    name,
                    ty,
                    payload: InstPayload::Load { ty, ptr },
                })
            }
            "store" => {
                let ty = self.parse_type()?;
                let value = self.parse_operand(ty, module, env)?;
                self.drop_or_error(",")?;
                self.drop_or_error("ptr")?;
                let ptr = self.parse_operand(Type::Ptr, module, env)?;
                Ok(Inst {
                    name,
                    ty: Type::Void,
                    payload: InstPayload::Store { value, ptr },
                })
            }
            "call" => {
                let ret_ty = self.parse_type()?;
                let callee = self.parse_operand(Type::Ptr, module, env)?;
                self.drop_or_error("(")?;
                let mut args = Vec::new();
                if !self.try_drop(")") {
                    loop {
                        let ty = self.parse_type()?;
                        args.push(self.parse_operand(ty, module, env)?);
                        if self.try_drop(")") {
                            break;
                        }
                        self.drop_or_error(",")?;
                    }
                }
                Ok(Inst {
                    name,
                    ty: ret_ty,
                    payload: InstPayload::Call { callee, args },
                })
            }
            "br" => {
                self.skip_whitespace_and_comments();
                if self.peek() == Some('l') {
                    let target = self.parse_block_label(env)?;
                    Ok(Inst {
                        name,
                        ty: Type::Void,
                        payload: InstPayload::Br(target),
                    })
                } else {
                    let ty = self.parse_type()?;
                    let cond = self.parse_operand(ty, module, env)?;
                    self.drop_or_error(",")?;
                    let then_blk = self.parse_block_label(env)?;
                    self.drop_or_error(",")?;
                    let else_blk = self.parse_block_label(env)?;
                    Ok(Inst {
                        name,
                        ty: Type::Void,
                        payload: InstPayload::CondBr {
                            cond,
                            then_blk,
                            else_blk,
                        },
                    })
                }
            }
            "ret" => {
                let ty = self.parse_type()?;
                let value = if ty.is_void() {
                    None
                } else {
                    Some(self.parse_operand(ty, module, env)?)
                };
                Ok(Inst {
                    name,
                    ty: Type::Void,
                    payload: InstPayload::Ret(value),
                })
            }
            other => Err(ParseError::new(format!("unknown operator '{}'", other))),
        }
    }

    fn parse_function_body(
        &mut self,
        module: &Module,
        func_index: usize,
        param_keys: &[String],
    ) -> Result<Vec<Block>, ParseError> {
        let labels = self.prescan_block_labels()?;
        if labels.is_empty() {
            return Err(ParseError::new(
                "function body has no block labels".to_string(),
            ));
        }

        let mut env = FnEnv {
            values: HashMap::new(),
            blocks: HashMap::new(),
        };
        for (index, key) in param_keys.iter().enumerate() {
            let operand = Operand::Param(ParamRef {
                func: func_index,
                index,
            });
            if env.values.insert(key.clone(), operand).is_some() {
                return Err(ParseError::new(format!("duplicate parameter '%{}'", key)));
            }
        }

        let mut blocks: Vec<Block> = Vec::with_capacity(labels.len());
        for (index, label) in labels.iter().enumerate() {
            let unnamed = label.chars().all(|c| c.is_ascii_digit());
            blocks.push(Block {
                name: if unnamed { None } else { Some(label.clone()) },
                insts: Vec::new(),
            });
            if env.blocks.insert(label.clone(), index).is_some() {
                return Err(ParseError::new(format!("duplicate block label '{}'", label)));
            }
        }

        let mut current: Option<usize> = None;
        loop {
            self.skip_whitespace_and_comments();
            if self.try_drop("}") {
                break;
            }
            if self.peek() == Some('%') {
                let (key, unnamed) = self.parse_local_name()?;
                self.drop_or_error("=")?;
                let operator = self.parse_identifier()?;
                let block_index = current.ok_or_else(|| {
                    ParseError::new("instruction before first block label".to_string())
                })?;
                let mut inst =
                    self.parse_inst(&operator, Some((key.clone(), unnamed)), module, &env)?;
                let inst_ref = InstRef {
                    func: func_index,
                    block: block_index,
                    index: blocks[block_index].insts.len(),
                };
                patch_block_func(&mut inst.payload, func_index);
                if env
                    .values
                    .insert(key.clone(), Operand::Inst(inst_ref))
                    .is_some()
                {
                    return Err(ParseError::new(format!("duplicate value name '%{}'", key)));
                }
                blocks[block_index].insts.push(inst);
            } else {
                let token = self.parse_identifier()?;
                if matches!(token.as_str(), "store" | "call" | "br" | "ret") {
                    let block_index = current.ok_or_else(|| {
                        ParseError::new("instruction before first block label".to_string())
                    })?;
                    let mut inst = self.parse_inst(&token, None, module, &env)?;
                    patch_block_func(&mut inst.payload, func_index);
                    blocks[block_index].insts.push(inst);
                } else {
                    self.drop_or_error(":")?;
                    let index = *env.blocks.get(&token).ok_or_else(|| {
                        ParseError::new(format!("label '{}' missed by prescan", token))
                    })?;
                    current = Some(index);
                }
            }
        }
        Ok(blocks)
    }

    pub fn parse_module(&mut self, name: &str) -> Result<Module, ParseError> {
        let mut module = Module::new(name);
        loop {
            self.skip_whitespace_and_comments();
            if self.at_eof() {
                break;
            }
            let is_definition = if self.try_drop("define") {
                true
            } else if self.try_drop("declare") {
                false
            } else {
                return Err(ParseError::new(format!(
                    "expected 'define' or 'declare'; got '{}'",
                    self.rest_of_line()
                )));
            };
            let ret_ty = self.parse_type()?;
            self.drop_or_error("@")?;
            let fn_name = self.parse_identifier()?;
            if module.find_fn(&fn_name).is_some() {
                return Err(ParseError::new(format!(
                    "duplicate function '@{}'",
                    fn_name
                )));
            }
            let (params, param_keys) = self.parse_params()?;
            let func_index = module.functions.len();
            module.functions.push(Function {
                name: fn_name,
                ret_ty,
                params,
                blocks: Vec::new(),
            });
            if is_definition {
                self.drop_or_error("{")?;
                let blocks = self.parse_function_body(&module, func_index, &param_keys)?;
                module.functions[func_index].blocks = blocks;
            }
        }
        Ok(module)
    }
}

/// Branch targets are parsed function-locally with `func: 0`; fix them up to
/// point at the function being parsed.
fn patch_block_func(payload: &mut InstPayload, func_index: usize) {
    match payload {
        InstPayload::Br(target) => target.func = func_index,
        InstPayload::CondBr {
            then_blk, else_blk, ..
        } => {
            then_blk.func = func_index;
            else_blk.func = func_index;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FnRef;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_parse_simple_function() {
        let m = Parser::new(
            r#"
            define i32 @max(i32 %a, i32 %b) {
            entry:
              %c = icmp sgt i32 %a, %b
              br i1 %c, label %then, label %else
            then:
              ret i32 %a
            else:
              ret i32 %b
            }
            "#,
        )
        .parse_module("m")
        .unwrap();
        assert_eq!(m.functions.len(), 1);
        let f = &m.functions[0];
        assert_eq!(f.name, "max");
        assert_eq!(f.ret_ty, Type::Int(32));
        assert_eq!(f.blocks.len(), 3);
        assert_eq!(f.blocks[0].name.as_deref(), Some("entry"));
        let cmp = &f.blocks[0].insts[0];
        assert_eq!(cmp.name.as_deref(), Some("c"));
        assert_eq!(cmp.ty, Type::Int(1));
        assert!(matches!(cmp.payload, InstPayload::Cmp(CmpKind::Sgt, ..)));
        let br = &f.blocks[0].insts[1];
        assert_eq!(
            br.payload,
            InstPayload::CondBr {
                cond: Operand::Inst(InstRef {
                    func: 0,
                    block: 0,
                    index: 0
                }),
                then_blk: BlockRef { func: 0, index: 1 },
                else_blk: BlockRef { func: 0, index: 2 },
            }
        );
    }

    #[test]
    fn test_parse_unnamed_entities() {
        let m = Parser::new(
            r#"
            define i32 @f(i32 %0) {
            1:
              %2 = add i32 %0, 7
              ret i32 %2
            }
            "#,
        )
        .parse_module("m")
        .unwrap();
        let f = &m.functions[0];
        assert_eq!(f.params[0].name, None);
        assert_eq!(f.blocks[0].name, None);
        let add = &f.blocks[0].insts[0];
        assert_eq!(add.name, None);
        assert_eq!(
            add.payload,
            InstPayload::Binop(
                Binop::Add,
                Operand::Param(ParamRef { func: 0, index: 0 }),
                Operand::Const(Const {
                    ty: Type::Int(32),
                    value: 7
                })
            )
        );
    }

    #[test]
    fn test_parse_declare_and_call() {
        let m = Parser::new(
            r#"
            declare void @sink(i32 %x)
            define void @f(ptr %p) {
            entry:
              %v = load i32, ptr %p
              store i32 %v, ptr %p
              call void @sink(i32 %v)
              ret void
            }
            "#,
        )
        .parse_module("m")
        .unwrap();
        assert!(m.functions[0].is_declaration());
        let f = &m.functions[1];
        let call = &f.blocks[0].insts[2];
        assert!(call.ty.is_void());
        assert_eq!(
            call.payload,
            InstPayload::Call {
                callee: Operand::Func(FnRef { index: 0 }),
                args: vec![Operand::Inst(InstRef {
                    func: 1,
                    block: 0,
                    index: 0
                })],
            }
        );
    }

    #[test_case("eq", CmpKind::Eq)]
    #[test_case("ne", CmpKind::Ne)]
    #[test_case("ult", CmpKind::Ult)]
    #[test_case("ule", CmpKind::Ule)]
    #[test_case("ugt", CmpKind::Ugt)]
    #[test_case("uge", CmpKind::Uge)]
    #[test_case("slt", CmpKind::Slt)]
    #[test_case("sle", CmpKind::Sle)]
    #[test_case("sgt", CmpKind::Sgt)]
    #[test_case("sge", CmpKind::Sge)]
    fn test_parse_icmp_predicate(pred: &str, expected: CmpKind) {
        let m = Parser::new(&format!(
            "define i1 @f(i32 %a, i32 %b) {{\nentry:\n  %c = icmp {} i32 %a, %b\n  ret i1 %c\n}}\n",
            pred
        ))
        .parse_module("m")
        .unwrap();
        let cmp = &m.functions[0].blocks[0].insts[0];
        assert_eq!(
            cmp.payload,
            InstPayload::Cmp(
                expected,
                Operand::Param(ParamRef { func: 0, index: 0 }),
                Operand::Param(ParamRef { func: 0, index: 1 }),
            )
        );
    }

    #[test_case("add", Binop::Add)]
    #[test_case("sub", Binop::Sub)]
    #[test_case("mul", Binop::Mul)]
    #[test_case("and", Binop::And)]
    #[test_case("or", Binop::Or)]
    #[test_case("xor", Binop::Xor)]
    fn test_parse_binop_operator(operator: &str, expected: Binop) {
        let m = Parser::new(&format!(
            "define i32 @f(i32 %a, i32 %b) {{\nentry:\n  %x = {} i32 %a, %b\n  ret i32 %x\n}}\n",
            operator
        ))
        .parse_module("m")
        .unwrap();
        let inst = &m.functions[0].blocks[0].insts[0];
        assert_eq!(
            inst.payload,
            InstPayload::Binop(
                expected,
                Operand::Param(ParamRef { func: 0, index: 0 }),
                Operand::Param(ParamRef { func: 0, index: 1 }),
            )
        );
    }

    #[test]
    fn test_parse_without_trailing_newline() {
        let m = Parser::new("define void @f() {\nentry:\n  ret void\n}")
            .parse_module("m")
            .unwrap();
        assert_eq!(m.functions[0].blocks.len(), 1);
        assert_eq!(
            m.functions[0].blocks[0].insts[0].payload,
            InstPayload::Ret(None)
        );
    }

    #[test]
    fn test_parse_error_undefined_value() {
        let err = Parser::new(
            r#"
            define i32 @f() {
            entry:
              ret i32 %missing
            }
            "#,
        )
        .parse_module("m")
        .unwrap_err();
        assert!(err.to_string().contains("undefined value"));
    }

    #[test]
    fn test_parse_error_undeclared_callee() {
        let err = Parser::new(
            r#"
            define void @f() {
            entry:
              call void @ghost()
              ret void
            }
            "#,
        )
        .parse_module("m")
        .unwrap_err();
        assert!(err.to_string().contains("undeclared function"));
    }

    #[test]
    fn test_parse_comments_and_negative_constants() {
        let m = Parser::new(
            r#"
            ; leading comment
            define i32 @f(i32 %a) {
            entry: ; trailing comment
              %x = sub i32 %a, -3
              ret i32 %x
            }
            "#,
        )
        .parse_module("m")
        .unwrap();
        let sub = &m.functions[0].blocks[0].insts[0];
        assert_eq!(
            sub.payload,
            InstPayload::Binop(
                Binop::Sub,
                Operand::Param(ParamRef { func: 0, index: 0 }),
                Operand::Const(Const {
                    ty: Type::Int(32),
                    value: -3
                })
            )
        );
    }
}
