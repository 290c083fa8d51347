//! Code generation: lower the parsed AST into AArch64 assembly text.
//!
//! The emitter is a stack machine over two registers: every expression
//! leaves its result in `x0`, binary operators spill the left operand to a
//! 16-byte-aligned software stack and pop it back into `x1`, and `x2` is
//! scratch for pointer scaling. Locals live at fixed non-negative offsets
//! from `fp` inside a 256-byte frame reserved by the prologue.
//!
//! Expressions emit in one of two modes: address mode produces an lvalue
//! address in `x0` (defined only for variables and dereferences), value mode
//! produces the stored value. Assignment and address-of bridge the two.

use std::collections::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::parser::{BinOpKind, Expr, Stmt, UnOpKind};
use crate::tokenizer::Location;
use crate::ty::Type;

/// Fixed frame reservation. There is no overflow check: more than 32 locals
/// run past the frame.
const FRAME_SIZE: u64 = 256;

/// Every local occupies one 8-byte slot.
const SLOT_SIZE: u64 = 8;

/// Emit assembly for a program rooted at a single top-level statement.
pub fn generate(stmt: &Stmt, source: &str) -> CompileResult<String> {
  let mut cg = CodeGen {
    source,
    asm: String::new(),
    locals: HashMap::new(),
    stack_size: 0,
    label_counter: 0,
  };

  cg.asm.push_str(".file 1 \"stdin\"\n");
  cg.asm.push_str(".text\n");
  cg.asm.push_str(".globl _main\n");
  cg.asm.push_str(".align 4\n");
  cg.asm.push_str("_main:\n");

  cg.asm.push_str("mov fp, sp\n");
  cg.asm.push_str(&format!("sub sp, sp, {FRAME_SIZE}\n"));

  cg.emit_stmt(stmt)?;

  cg.asm.push_str(&format!("add sp, sp, {FRAME_SIZE}\n"));
  cg.asm.push_str("ret\n");

  Ok(cg.asm)
}

struct CodeGen<'a> {
  source: &'a str,
  asm: String,
  locals: HashMap<String, u64>,
  stack_size: u64,
  label_counter: u32,
}

impl<'a> CodeGen<'a> {
  /// Mint a fresh label number; unique across one compile.
  fn next_label(&mut self) -> u32 {
    self.label_counter += 1;
    self.label_counter
  }

  fn error(&self, loc: Location, message: impl Into<String>) -> CompileError {
    CompileError::at(self.source, loc, message)
  }

  /// Stack offset of a named local. Undeclared names silently resolve to
  /// offset zero.
  fn local_offset(&self, ident: &str) -> u64 {
    self.locals.get(ident).copied().unwrap_or(0)
  }

  fn emit_loc(&mut self, loc: Location) {
    self
      .asm
      .push_str(&format!(".loc {} {} {}\n", loc.file, loc.line, loc.col));
  }

  /// Materialize a 64-bit constant into a register. `movz` always writes the
  /// low half-word; higher half-words follow only when non-zero.
  fn emit_constant(&mut self, reg: &str, value: u64) {
    self
      .asm
      .push_str(&format!("movz {reg}, {}\n", value & 0xFFFF));
    if (value >> 16) & 0xFFFF != 0 {
      self
        .asm
        .push_str(&format!("movk {reg}, {}, lsl 16\n", (value >> 16) & 0xFFFF));
    }
    if (value >> 32) & 0xFFFF != 0 {
      self
        .asm
        .push_str(&format!("movk {reg}, {}, lsl 32\n", (value >> 32) & 0xFFFF));
    }
    if (value >> 48) & 0xFFFF != 0 {
      self
        .asm
        .push_str(&format!("movk {reg}, {}, lsl 48\n", (value >> 48) & 0xFFFF));
    }
  }

  /// Emit an expression in address mode: `x0` receives the lvalue address.
  fn emit_addr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Variable { ident, .. } => {
        let offset = self.local_offset(ident);
        self.asm.push_str(&format!("add x0, fp, {offset}\n"));
        Ok(())
      }
      Expr::UnOp {
        op: UnOpKind::Dereference,
        e,
        ..
      } => self.emit_expr(e),
      _ => Err(self.error(expr.loc(), "expression is not an lvalue")),
    }
  }

  /// Emit an expression in value mode: `x0` receives the rvalue.
  fn emit_expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::IntegerConstant { loc, value } => {
        self.emit_loc(*loc);
        self.emit_constant("x0", *value);
        Ok(())
      }
      Expr::Variable { ident, .. } => {
        let offset = self.local_offset(ident);
        self.asm.push_str(&format!("ldr x0, [fp, {offset}]\n"));
        Ok(())
      }
      Expr::UnOp {
        op: UnOpKind::AddressOf,
        e,
        ..
      } => self.emit_addr(e),
      Expr::UnOp {
        op: UnOpKind::Dereference,
        loc,
        e,
      } => {
        self.emit_expr(e)?;
        self.emit_loc(*loc);
        self.asm.push_str("ldr x0, [x0]\n");
        Ok(())
      }
      Expr::UnOp {
        op: UnOpKind::Posate,
        loc,
        e,
      } => {
        self.emit_expr(e)?;
        self.emit_loc(*loc);
        // no instruction
        Ok(())
      }
      Expr::UnOp {
        op: UnOpKind::Negate,
        loc,
        e,
      } => {
        self.emit_expr(e)?;
        self.emit_loc(*loc);
        self.asm.push_str("neg x0, x0\n");
        Ok(())
      }
      Expr::BinOp { loc, op, lhs, rhs } => {
        self.emit_expr(lhs)?;
        self.asm.push_str("str x0, [sp, -16]!\n");
        self.emit_expr(rhs)?;
        self.asm.push_str("ldr x1, [sp], 16\n");

        self.emit_loc(*loc);
        match op {
          BinOpKind::Add | BinOpKind::Subtract => self.emit_addsub(*loc, *op, lhs, rhs),
          BinOpKind::Multiply => {
            self.asm.push_str("mul x0, x1, x0\n");
            Ok(())
          }
          BinOpKind::Divide => {
            // unsigned divide; comparisons below use signed mnemonics
            self.asm.push_str("udiv x0, x1, x0\n");
            Ok(())
          }
          BinOpKind::Modulo => {
            self.asm.push_str("udiv x2, x1, x0\n");
            self.asm.push_str("msub x0, x2, x0, x1\n");
            Ok(())
          }
          BinOpKind::LessThan => {
            self.emit_compare("lt");
            Ok(())
          }
          BinOpKind::GreaterThan => {
            self.emit_compare("gt");
            Ok(())
          }
          BinOpKind::LessThanEqual => {
            self.emit_compare("le");
            Ok(())
          }
          BinOpKind::GreaterThanEqual => {
            self.emit_compare("ge");
            Ok(())
          }
          BinOpKind::Equal => {
            self.emit_compare("eq");
            Ok(())
          }
          BinOpKind::NotEqual => {
            self.emit_compare("ne");
            Ok(())
          }
          BinOpKind::BitAnd => {
            self.asm.push_str("and x0, x1, x0\n");
            Ok(())
          }
          BinOpKind::BitXor => {
            self.asm.push_str("eor x0, x1, x0\n");
            Ok(())
          }
          BinOpKind::BitOr => {
            self.asm.push_str("orr x0, x1, x0\n");
            Ok(())
          }
          BinOpKind::LShift => Err(self.error(*loc, "'<<' is not implemented")),
          BinOpKind::RShift => Err(self.error(*loc, "'>>' is not implemented")),
          BinOpKind::LogicalAnd => Err(self.error(*loc, "'&&' is not implemented")),
          BinOpKind::LogicalOr => Err(self.error(*loc, "'||' is not implemented")),
        }
      }
      Expr::Assign { lhs, rhs, .. } => {
        self.emit_addr(lhs)?;
        self.asm.push_str("str x0, [sp, -16]!\n");
        self.emit_expr(rhs)?;
        self.asm.push_str("ldr x1, [sp], 16\n");
        self.asm.push_str("str x0, [x1]\n");
        Ok(())
      }
    }
  }

  /// Signed condition mnemonics, in contrast to the unsigned divide.
  fn emit_compare(&mut self, cond: &str) {
    self.asm.push_str("cmp x1, x0\n");
    self.asm.push_str(&format!("cset x0, {cond}\n"));
  }

  /// Add and subtract with pointer scaling: the integer operand is scaled by
  /// the pointee size, and a pointer difference is divided back down to
  /// elements. The operands are already in `x1` (left) and `x0` (right).
  fn emit_addsub(
    &mut self,
    loc: Location,
    op: BinOpKind,
    lhs: &Expr,
    rhs: &Expr,
  ) -> CompileResult<()> {
    let is_add = matches!(op, BinOpKind::Add);
    let lt = lhs.ty();
    let rt = rhs.ty();

    if lt.is_pointer() && rt.is_pointer() {
      if is_add {
        return Err(self.error(loc, "pointer + pointer is invalid"));
      }
      self.asm.push_str("sub x0, x1, x0\n");
      let scale = self.pointee_size(&lt, loc)?;
      self.emit_constant("x2", scale);
      self.asm.push_str("udiv x0, x0, x2\n");
      return Ok(());
    }

    if lt.is_pointer() {
      let scale = self.pointee_size(&lt, loc)?;
      self.emit_constant("x2", scale);
      let mnemonic = if is_add { "madd" } else { "msub" };
      // x0 = x1 +- x0 * x2
      self.asm.push_str(&format!("{mnemonic} x0, x0, x2, x1\n"));
      return Ok(());
    }

    if rt.is_pointer() {
      if !is_add {
        return Err(self.error(loc, "integer - pointer is invalid"));
      }
      let scale = self.pointee_size(&rt, loc)?;
      self.emit_constant("x2", scale);
      // x0 = x0 + x1 * x2
      self.asm.push_str("madd x0, x1, x2, x0\n");
      return Ok(());
    }

    if is_add {
      self.asm.push_str("add x0, x1, x0\n");
    } else {
      self.asm.push_str("sub x0, x1, x0\n");
    }
    Ok(())
  }

  fn pointee_size(&self, ty: &Type, loc: Location) -> CompileResult<u64> {
    ty.base()
      .and_then(Type::size)
      .ok_or_else(|| self.error(loc, "operand type has no size"))
  }

  fn emit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Compound { items, .. } => {
        for item in items {
          self.emit_stmt(item)?;
        }
        Ok(())
      }
      Stmt::Expr { e, .. } => {
        if let Some(e) = e {
          self.emit_expr(e)?;
        }
        Ok(())
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
        ..
      } => {
        let i = self.next_label();
        self.emit_expr(cond)?;
        self.asm.push_str("cmp x0, 0\n");
        self.asm.push_str(&format!("b.eq .if{i}.else\n"));
        self.emit_stmt(then_branch)?;
        self.asm.push_str(&format!("b .if{i}.end\n"));
        self.asm.push_str(&format!(".if{i}.else:\n"));
        if let Some(else_branch) = else_branch {
          self.emit_stmt(else_branch)?;
        }
        self.asm.push_str(&format!(".if{i}.end:\n"));
        Ok(())
      }
      Stmt::Loop {
        init,
        cond,
        incr,
        body,
        ..
      } => {
        let i = self.next_label();
        if let Some(init) = init {
          self.emit_expr(init)?;
        }
        self.asm.push_str(&format!(".loop{i}.cond:\n"));
        if let Some(cond) = cond {
          self.emit_expr(cond)?;
          self.asm.push_str("cmp x0, 0\n");
          self.asm.push_str(&format!("b.eq .loop{i}.end\n"));
        }
        self.emit_stmt(body)?;
        if let Some(incr) = incr {
          self.emit_expr(incr)?;
        }
        self.asm.push_str(&format!("b .loop{i}.cond\n"));
        self.asm.push_str(&format!(".loop{i}.end:\n"));
        Ok(())
      }
      Stmt::Return { loc, e } => {
        if let Some(e) = e {
          self.emit_expr(e)?;
        }
        self.emit_loc(*loc);
        // leaves sp untouched; sound only because the driver appends the
        // fixed epilogue after the whole body
        self.asm.push_str("ret\n");
        Ok(())
      }
      Stmt::Decl { ident, .. } => {
        // duplicate declarations are not detected; the latest slot wins
        self.locals.insert(ident.clone(), self.stack_size);
        self.stack_size += SLOT_SIZE;
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::Parser;
  use crate::tokenizer::{CharStream, TokenStream};

  fn compile(source: &str) -> CompileResult<String> {
    let mut parser = Parser::new(TokenStream::new(CharStream::new(1, source)));
    let stmt = parser.statement()?;
    generate(&stmt, source)
  }

  fn compile_ok(source: &str) -> String {
    compile(source).expect("program should compile")
  }

  #[test]
  fn constants_materialize_in_half_words() {
    let asm = compile_ok("{ return 0; }");
    assert!(asm.contains("movz x0, 0\n"));
    assert!(!asm.contains("movk"));

    let asm = compile_ok("{ return 65536; }");
    assert!(asm.contains("movz x0, 0\n"));
    assert!(asm.contains("movk x0, 1, lsl 16\n"));

    let asm = compile_ok("{ return 18446744073709551615; }");
    assert!(asm.contains("movz x0, 65535\n"));
    assert!(asm.contains("movk x0, 65535, lsl 16\n"));
    assert!(asm.contains("movk x0, 65535, lsl 32\n"));
    assert!(asm.contains("movk x0, 65535, lsl 48\n"));
  }

  #[test]
  fn prologue_and_epilogue_bracket_the_body() {
    let asm = compile_ok("{ }");
    let lines: Vec<&str> = asm.lines().collect();
    assert_eq!(
      lines,
      vec![
        ".file 1 \"stdin\"",
        ".text",
        ".globl _main",
        ".align 4",
        "_main:",
        "mov fp, sp",
        "sub sp, sp, 256",
        "add sp, sp, 256",
        "ret",
      ]
    );
  }

  #[test]
  fn locals_get_consecutive_slots() {
    let asm = compile_ok("{ int a; int b; a = 1; b = 2; return a; }");
    assert!(asm.contains("add x0, fp, 0\n"));
    assert!(asm.contains("add x0, fp, 8\n"));
    assert!(asm.contains("ldr x0, [fp, 0]\n"));
  }

  #[test]
  fn undeclared_variables_resolve_to_offset_zero() {
    let asm = compile_ok("{ return ghost; }");
    assert!(asm.contains("ldr x0, [fp, 0]\n"));
  }

  #[test]
  fn label_counter_restarts_per_compile() {
    let first = compile_ok("{ if (1) ; }");
    let second = compile_ok("{ if (1) ; }");
    assert_eq!(first, second);
    assert!(first.contains(".if1.else:\n"));
  }

  #[test]
  fn division_is_unsigned_but_comparisons_are_signed() {
    let asm = compile_ok("{ return 7 / 2; }");
    assert!(asm.contains("udiv x0, x1, x0\n"));

    let asm = compile_ok("{ return 1 < 2; }");
    assert!(asm.contains("cmp x1, x0\n"));
    assert!(asm.contains("cset x0, lt\n"));
  }

  #[test]
  fn modulo_uses_msub() {
    let asm = compile_ok("{ return 7 % 2; }");
    assert!(asm.contains("udiv x2, x1, x0\n"));
    assert!(asm.contains("msub x0, x2, x0, x1\n"));
  }

  #[test]
  fn assignment_stores_through_the_popped_address() {
    let asm = compile_ok("{ int a; a = 7; }");
    assert!(asm.contains("str x0, [x1]\n"));
  }

  #[test]
  fn non_lvalues_are_rejected_in_address_mode() {
    let err = compile("{ 1 = 2; }").expect_err("constants are not lvalues");
    assert!(err.to_string().contains("not an lvalue"));

    let err = compile("{ &(1 + 2); }").expect_err("sums are not lvalues");
    assert!(err.to_string().contains("not an lvalue"));
  }

  #[test]
  fn unimplemented_operators_are_fatal() {
    for source in [
      "{ return 1 << 2; }",
      "{ return 1 >> 2; }",
      "{ return 1 && 2; }",
      "{ return 1 || 2; }",
    ] {
      let err = compile(source).expect_err("operator should be rejected in codegen");
      assert!(err.to_string().contains("not implemented"), "{source}");
    }
  }

  #[test]
  fn invalid_pointer_arithmetic_is_fatal() {
    let err = compile("{ int a; int b; return &a + &b; }").expect_err("ptr + ptr");
    assert!(err.to_string().contains("pointer + pointer"));

    let err = compile("{ int a; return 1 - &a; }").expect_err("int - ptr");
    assert!(err.to_string().contains("integer - pointer"));
  }

  #[test]
  fn return_pins_debug_lines_to_the_return_token() {
    let asm = compile_ok("{\nreturn 42;\n}");
    assert!(asm.contains(".loc 1 2 8\n"), "constant location:\n{asm}");
    assert!(asm.contains(".loc 1 2 1\nret\n"), "return location:\n{asm}");
  }
}
