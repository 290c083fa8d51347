//! Recursive-descent parser producing a statement and expression AST.
//!
//! The grammar follows the C precedence ladder: one method per level, each
//! iterating to realise left associativity and delegating to the next-higher
//! level. Assignment right-associates by recursing into itself. The
//! statement layer sits on top so sequencing lives outside the expression
//! tree. Every node inherits the location of the token that introduced it.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Location, PunctuatorKind, TokenKind, TokenStream};
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpKind {
  AddressOf,
  Dereference,
  Posate,
  Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
  Add,
  Subtract,
  Multiply,
  Divide,
  Modulo,
  LShift,
  RShift,
  LessThan,
  GreaterThan,
  LessThanEqual,
  GreaterThanEqual,
  Equal,
  NotEqual,
  BitAnd,
  BitXor,
  BitOr,
  LogicalAnd,
  LogicalOr,
}

/// Expression tree. Nodes own their children exclusively and are immutable
/// after parsing.
#[derive(Debug, Clone)]
pub enum Expr {
  IntegerConstant {
    loc: Location,
    value: u64,
  },
  Variable {
    loc: Location,
    ident: String,
  },
  UnOp {
    loc: Location,
    op: UnOpKind,
    e: Box<Expr>,
  },
  BinOp {
    loc: Location,
    op: BinOpKind,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Assign {
    loc: Location,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
}

impl Expr {
  pub fn loc(&self) -> Location {
    match self {
      Expr::IntegerConstant { loc, .. }
      | Expr::Variable { loc, .. }
      | Expr::UnOp { loc, .. }
      | Expr::BinOp { loc, .. }
      | Expr::Assign { loc, .. } => *loc,
    }
  }

  /// Derive the value type of this expression.
  ///
  /// Pure and deterministic; code generation consults it on demand, most
  /// importantly to decide pointer arithmetic scaling. Named variables are
  /// always `Int` in this subset, so pointers only arise through `&` and
  /// survive through the operators that propagate their operand's type.
  pub fn ty(&self) -> Type {
    match self {
      Expr::IntegerConstant { .. } => Type::Int,
      Expr::Variable { .. } => Type::Int,
      Expr::UnOp { op, e, .. } => match op {
        UnOpKind::AddressOf => Type::pointer_to(e.ty()),
        // Dereferencing a non-pointer degrades to `Int` rather than
        // erroring; kept for compatibility with accepted programs.
        UnOpKind::Dereference => match e.ty() {
          Type::Ptr(base) => *base,
          _ => Type::Int,
        },
        UnOpKind::Posate | UnOpKind::Negate => e.ty(),
      },
      Expr::BinOp { op, lhs, rhs, .. } => match op {
        BinOpKind::Add => {
          let lt = lhs.ty();
          let rt = rhs.ty();
          if lt.is_pointer() && rt.is_pointer() {
            Type::Invalid
          } else if rt.is_pointer() {
            rt
          } else {
            lt
          }
        }
        BinOpKind::Subtract => {
          let lt = lhs.ty();
          let rt = rhs.ty();
          if lt.is_pointer() && rt.is_pointer() {
            Type::Int
          } else if rt.is_pointer() {
            Type::Invalid
          } else {
            lt
          }
        }
        BinOpKind::Multiply
        | BinOpKind::Divide
        | BinOpKind::Modulo
        | BinOpKind::LShift
        | BinOpKind::RShift
        | BinOpKind::BitAnd
        | BinOpKind::BitXor
        | BinOpKind::BitOr => lhs.ty(),
        BinOpKind::LessThan
        | BinOpKind::GreaterThan
        | BinOpKind::LessThanEqual
        | BinOpKind::GreaterThanEqual
        | BinOpKind::Equal
        | BinOpKind::NotEqual
        | BinOpKind::LogicalAnd
        | BinOpKind::LogicalOr => Type::Int,
      },
      Expr::Assign { lhs, .. } => lhs.ty(),
    }
  }
}

/// Statement tree rooted at a single top-level statement.
#[derive(Debug, Clone)]
pub enum Stmt {
  Compound {
    loc: Location,
    items: Vec<Stmt>,
  },
  /// Expression statement; `None` is the null statement `;`.
  Expr {
    loc: Location,
    e: Option<Expr>,
  },
  If {
    loc: Location,
    cond: Expr,
    then_branch: Box<Stmt>,
    else_branch: Option<Box<Stmt>>,
  },
  /// Uniform loop form covering both `while` (no init/incr) and `for`.
  Loop {
    loc: Location,
    init: Option<Expr>,
    cond: Option<Expr>,
    incr: Option<Expr>,
    body: Box<Stmt>,
  },
  Return {
    loc: Location,
    e: Option<Expr>,
  },
  /// Declaration of an int-typed local.
  Decl {
    loc: Location,
    ident: String,
  },
}

impl Stmt {
  pub fn loc(&self) -> Location {
    match self {
      Stmt::Compound { loc, .. }
      | Stmt::Expr { loc, .. }
      | Stmt::If { loc, .. }
      | Stmt::Loop { loc, .. }
      | Stmt::Return { loc, .. }
      | Stmt::Decl { loc, .. } => *loc,
    }
  }
}

pub struct Parser<'a> {
  inner: TokenStream<'a>,
}

impl<'a> Parser<'a> {
  pub fn new(inner: TokenStream<'a>) -> Self {
    Self { inner }
  }

  // ----- Statement parsing -----

  pub fn statement(&mut self) -> CompileResult<Stmt> {
    if self.inner.consume_if(PunctuatorKind::Semi)? {
      // null statement
      return Ok(Stmt::Expr {
        loc: self.inner.loc(),
        e: None,
      });
    }
    if self.inner.peek_is(PunctuatorKind::LBrace)? {
      return self.compound_statement();
    }
    if self.inner.peek_is_identifier("if")? {
      return self.if_statement();
    }
    if self.inner.peek_is_identifier("while")? {
      return self.while_statement();
    }
    if self.inner.peek_is_identifier("for")? {
      return self.for_statement();
    }
    if self.inner.peek_is_identifier("return")? {
      return self.return_statement();
    }
    if self.inner.peek_is_identifier("int")? {
      return self.declaration_statement();
    }
    self.expression_statement()
  }

  fn compound_statement(&mut self) -> CompileResult<Stmt> {
    self.inner.skip(PunctuatorKind::LBrace)?;
    let loc = self.inner.loc();

    let mut items = Vec::new();
    while !self.inner.consume_if(PunctuatorKind::RBrace)? {
      items.push(self.statement()?);
    }
    Ok(Stmt::Compound { loc, items })
  }

  fn expression_statement(&mut self) -> CompileResult<Stmt> {
    let e = self.expression()?;
    self.inner.skip(PunctuatorKind::Semi)?;
    Ok(Stmt::Expr {
      loc: e.loc(),
      e: Some(e),
    })
  }

  fn if_statement(&mut self) -> CompileResult<Stmt> {
    self.inner.skip_identifier("if")?;
    let loc = self.inner.loc();

    self.inner.skip(PunctuatorKind::LParen)?;
    let cond = self.expression()?;
    self.inner.skip(PunctuatorKind::RParen)?;

    let then_branch = Box::new(self.statement()?);
    let else_branch = if self.inner.consume_if_identifier("else")? {
      Some(Box::new(self.statement()?))
    } else {
      None
    };

    Ok(Stmt::If {
      loc,
      cond,
      then_branch,
      else_branch,
    })
  }

  fn while_statement(&mut self) -> CompileResult<Stmt> {
    self.inner.skip_identifier("while")?;
    let loc = self.inner.loc();

    self.inner.skip(PunctuatorKind::LParen)?;
    let cond = self.expression()?;
    self.inner.skip(PunctuatorKind::RParen)?;
    let body = Box::new(self.statement()?);

    Ok(Stmt::Loop {
      loc,
      init: None,
      cond: Some(cond),
      incr: None,
      body,
    })
  }

  fn for_statement(&mut self) -> CompileResult<Stmt> {
    self.inner.skip_identifier("for")?;
    let loc = self.inner.loc();

    self.inner.skip(PunctuatorKind::LParen)?;
    let init = if self.inner.consume_if(PunctuatorKind::Semi)? {
      None
    } else {
      let e = self.expression()?;
      self.inner.skip(PunctuatorKind::Semi)?;
      Some(e)
    };
    let cond = if self.inner.consume_if(PunctuatorKind::Semi)? {
      None
    } else {
      let e = self.expression()?;
      self.inner.skip(PunctuatorKind::Semi)?;
      Some(e)
    };
    let incr = if self.inner.peek_is(PunctuatorKind::RParen)? {
      None
    } else {
      Some(self.expression()?)
    };
    self.inner.skip(PunctuatorKind::RParen)?;

    let body = Box::new(self.statement()?);

    Ok(Stmt::Loop {
      loc,
      init,
      cond,
      incr,
      body,
    })
  }

  fn return_statement(&mut self) -> CompileResult<Stmt> {
    self.inner.skip_identifier("return")?;
    let loc = self.inner.loc();

    if self.inner.consume_if(PunctuatorKind::Semi)? {
      return Ok(Stmt::Return { loc, e: None });
    }

    let e = self.expression()?;
    self.inner.skip(PunctuatorKind::Semi)?;
    Ok(Stmt::Return { loc, e: Some(e) })
  }

  fn declaration_statement(&mut self) -> CompileResult<Stmt> {
    self.inner.skip_identifier("int")?;
    let loc = self.inner.loc();

    let token = self.inner.next()?;
    let ident = match token.kind {
      TokenKind::Identifier(ident) => ident,
      _ => {
        return Err(self.error(
          token.loc,
          format!("expected an identifier, but got \"{}\"", token.describe()),
        ));
      }
    };
    self.inner.skip(PunctuatorKind::Semi)?;
    Ok(Stmt::Decl { loc, ident })
  }

  // ----- Expression parsing -----

  pub fn expression(&mut self) -> CompileResult<Expr> {
    // comma operator is not part of the subset
    self.assignment_expression()
  }

  fn assignment_expression(&mut self) -> CompileResult<Expr> {
    let e = self.conditional_expression()?;
    if self.inner.consume_if(PunctuatorKind::Eq)? {
      let loc = self.inner.loc();
      let rhs = self.assignment_expression()?;
      return Ok(Expr::Assign {
        loc,
        lhs: Box::new(e),
        rhs: Box::new(rhs),
      });
    }
    Ok(e)
  }

  fn conditional_expression(&mut self) -> CompileResult<Expr> {
    // ternary is not part of the subset
    self.logical_or_expression()
  }

  fn logical_or_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.logical_and_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::OrOr)? {
        e = self.binop(BinOpKind::LogicalOr, e, Self::logical_and_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn logical_and_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.inclusive_or_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::AndAnd)? {
        e = self.binop(BinOpKind::LogicalAnd, e, Self::inclusive_or_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn inclusive_or_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.exclusive_or_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::Or)? {
        e = self.binop(BinOpKind::BitOr, e, Self::exclusive_or_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn exclusive_or_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.and_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::Caret)? {
        e = self.binop(BinOpKind::BitXor, e, Self::and_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn and_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.equality_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::And)? {
        e = self.binop(BinOpKind::BitAnd, e, Self::equality_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn equality_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.relational_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::EqEq)? {
        e = self.binop(BinOpKind::Equal, e, Self::relational_expression)?;
      } else if self.inner.consume_if(PunctuatorKind::NotEq)? {
        e = self.binop(BinOpKind::NotEqual, e, Self::relational_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn relational_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.shift_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::LAngle)? {
        e = self.binop(BinOpKind::LessThan, e, Self::shift_expression)?;
      } else if self.inner.consume_if(PunctuatorKind::RAngle)? {
        e = self.binop(BinOpKind::GreaterThan, e, Self::shift_expression)?;
      } else if self.inner.consume_if(PunctuatorKind::LAngleEq)? {
        e = self.binop(BinOpKind::LessThanEqual, e, Self::shift_expression)?;
      } else if self.inner.consume_if(PunctuatorKind::RAngleEq)? {
        e = self.binop(BinOpKind::GreaterThanEqual, e, Self::shift_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn shift_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.additive_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::LLAngle)? {
        e = self.binop(BinOpKind::LShift, e, Self::additive_expression)?;
      } else if self.inner.consume_if(PunctuatorKind::RRAngle)? {
        e = self.binop(BinOpKind::RShift, e, Self::additive_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn additive_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.multiplicative_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::Plus)? {
        e = self.binop(BinOpKind::Add, e, Self::multiplicative_expression)?;
      } else if self.inner.consume_if(PunctuatorKind::Minus)? {
        e = self.binop(BinOpKind::Subtract, e, Self::multiplicative_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn multiplicative_expression(&mut self) -> CompileResult<Expr> {
    let mut e = self.cast_expression()?;
    loop {
      if self.inner.consume_if(PunctuatorKind::Star)? {
        e = self.binop(BinOpKind::Multiply, e, Self::cast_expression)?;
      } else if self.inner.consume_if(PunctuatorKind::Slash)? {
        e = self.binop(BinOpKind::Divide, e, Self::cast_expression)?;
      } else if self.inner.consume_if(PunctuatorKind::Modulo)? {
        e = self.binop(BinOpKind::Modulo, e, Self::cast_expression)?;
      } else {
        return Ok(e);
      }
    }
  }

  fn cast_expression(&mut self) -> CompileResult<Expr> {
    // cast syntax is not part of the subset
    self.unary_expression()
  }

  fn unary_expression(&mut self) -> CompileResult<Expr> {
    if self.inner.consume_if(PunctuatorKind::And)? {
      return self.unop(UnOpKind::AddressOf);
    }
    if self.inner.consume_if(PunctuatorKind::Star)? {
      return self.unop(UnOpKind::Dereference);
    }
    if self.inner.consume_if(PunctuatorKind::Plus)? {
      return self.unop(UnOpKind::Posate);
    }
    if self.inner.consume_if(PunctuatorKind::Minus)? {
      return self.unop(UnOpKind::Negate);
    }
    self.postfix_expression()
  }

  fn postfix_expression(&mut self) -> CompileResult<Expr> {
    // postfix operators are not part of the subset
    self.primary_expression()
  }

  fn primary_expression(&mut self) -> CompileResult<Expr> {
    if self.inner.consume_if(PunctuatorKind::LParen)? {
      let e = self.expression()?;
      self.inner.skip(PunctuatorKind::RParen)?;
      return Ok(e);
    }

    let token = self.inner.next()?;
    match token.kind {
      TokenKind::IntegerConstant(value) => Ok(Expr::IntegerConstant {
        loc: token.loc,
        value,
      }),
      TokenKind::Identifier(ident) => Ok(Expr::Variable {
        loc: token.loc,
        ident,
      }),
      _ => Err(self.error(
        token.loc,
        format!("expected an expression, but got \"{}\"", token.describe()),
      )),
    }
  }

  // ----- Helpers -----

  /// Build a binary node whose location is the operator token just consumed.
  fn binop(
    &mut self,
    op: BinOpKind,
    lhs: Expr,
    rhs: fn(&mut Self) -> CompileResult<Expr>,
  ) -> CompileResult<Expr> {
    let loc = self.inner.loc();
    let rhs = rhs(self)?;
    Ok(Expr::BinOp {
      loc,
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    })
  }

  /// Build a unary node whose location is the operator token just consumed.
  fn unop(&mut self, op: UnOpKind) -> CompileResult<Expr> {
    let loc = self.inner.loc();
    let e = self.cast_expression()?;
    Ok(Expr::UnOp {
      loc,
      op,
      e: Box::new(e),
    })
  }

  fn error(&self, loc: Location, message: impl Into<String>) -> CompileError {
    self.inner.error(loc, message)
  }
}
