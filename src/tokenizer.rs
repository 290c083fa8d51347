//! Lexical analysis: turns the raw input bytes into tokens on demand.
//!
//! The tokenizer is intentionally tiny – it knows nothing about semantics
//! beyond recognising punctuators, numeric literals and identifiers.
//! Multi-character punctuators are matched longest-first to avoid ambiguity.
//! Tokens are produced lazily through a one-token lookahead slot so the
//! parser never has to materialise the whole stream.

use crate::error::{CompileError, CompileResult};

pub type FileId = usize;

/// Source region attached to every token and, through tokens, to every AST
/// node. `line` and `col` are 1-based; `index` and `length` are byte offsets
/// into the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
  pub file: FileId,
  pub line: usize,
  pub col: usize,
  pub index: usize,
  pub length: usize,
}

impl Location {
  fn start_of(file: FileId) -> Self {
    Self {
      file,
      line: 1,
      col: 1,
      index: 0,
      length: 0,
    }
  }
}

/// Byte-accurate cursor over the source buffer.
///
/// Two locations travel with the cursor: `current_loc` is the region of the
/// token being accumulated (it grows by one for every byte read), and
/// `next_loc` is the prospective position of the next unread byte.
/// `new_loc` commits the cursor to a fresh zero-length region; between
/// tokens `current_loc.index + current_loc.length == next_loc.index`.
pub struct CharStream<'a> {
  contents: &'a str,
  current_loc: Location,
  next_loc: Location,
}

impl<'a> CharStream<'a> {
  pub fn new(file: FileId, contents: &'a str) -> Self {
    Self {
      contents,
      current_loc: Location::start_of(file),
      next_loc: Location::start_of(file),
    }
  }

  pub fn source(&self) -> &'a str {
    self.contents
  }

  pub fn peek(&self) -> Option<u8> {
    self.contents.as_bytes().get(self.next_loc.index).copied()
  }

  pub fn get(&mut self) -> Option<u8> {
    let ch = self.peek()?;
    self.current_loc.length += 1;
    self.next_loc.index += 1;
    self.next_loc.col += 1;
    if ch == b'\n' {
      self.next_loc.line += 1;
      self.next_loc.col = 1;
    }
    Some(ch)
  }

  pub fn consume_if(&mut self, ch: u8) -> bool {
    if self.peek() == Some(ch) {
      self.get();
      return true;
    }
    false
  }

  pub fn loc(&self) -> Location {
    self.current_loc
  }

  pub fn new_loc(&mut self) {
    self.current_loc = self.next_loc;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunctuatorKind {
  LBracket,  // [
  RBracket,  // ]
  LParen,    // (
  RParen,    // )
  LBrace,    // {
  RBrace,    // }
  Dot,       // .
  Arrow,     // ->

  PlusPlus,   // ++
  MinusMinus, // --
  And,        // &
  Star,       // *
  Plus,       // +
  Minus,      // -
  Tilde,      // ~
  Not,        // !

  Slash,    // /
  Modulo,   // %
  LLAngle,  // <<
  RRAngle,  // >>
  LAngle,   // <
  RAngle,   // >
  LAngleEq, // <=
  RAngleEq, // >=
  EqEq,     // ==
  NotEq,    // !=
  Caret,    // ^
  Or,       // |
  AndAnd,   // &&
  OrOr,     // ||

  Query,     // ?
  Colon,     // :
  Semi,      // ;
  DotDotDot, // ...

  Eq,        // =
  StarEq,    // *=
  SlashEq,   // /=
  ModuloEq,  // %=
  PlusEq,    // +=
  MinusEq,   // -=
  LLAngleEq, // <<=
  RRAngleEq, // >>=
  AndEq,     // &=
  CaretEq,   // ^=
  OrEq,      // |=

  Comma,    // ,
  Hash,     // #
  HashHash, // ##
}

impl PunctuatorKind {
  /// Spelling as written in source; used in diagnostics.
  pub fn text(self) -> &'static str {
    match self {
      Self::LBracket => "[",
      Self::RBracket => "]",
      Self::LParen => "(",
      Self::RParen => ")",
      Self::LBrace => "{",
      Self::RBrace => "}",
      Self::Dot => ".",
      Self::Arrow => "->",
      Self::PlusPlus => "++",
      Self::MinusMinus => "--",
      Self::And => "&",
      Self::Star => "*",
      Self::Plus => "+",
      Self::Minus => "-",
      Self::Tilde => "~",
      Self::Not => "!",
      Self::Slash => "/",
      Self::Modulo => "%",
      Self::LLAngle => "<<",
      Self::RRAngle => ">>",
      Self::LAngle => "<",
      Self::RAngle => ">",
      Self::LAngleEq => "<=",
      Self::RAngleEq => ">=",
      Self::EqEq => "==",
      Self::NotEq => "!=",
      Self::Caret => "^",
      Self::Or => "|",
      Self::AndAnd => "&&",
      Self::OrOr => "||",
      Self::Query => "?",
      Self::Colon => ":",
      Self::Semi => ";",
      Self::DotDotDot => "...",
      Self::Eq => "=",
      Self::StarEq => "*=",
      Self::SlashEq => "/=",
      Self::ModuloEq => "%=",
      Self::PlusEq => "+=",
      Self::MinusEq => "-=",
      Self::LLAngleEq => "<<=",
      Self::RRAngleEq => ">>=",
      Self::AndEq => "&=",
      Self::CaretEq => "^=",
      Self::OrEq => "|=",
      Self::Comma => ",",
      Self::Hash => "#",
      Self::HashHash => "##",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
  EndOfFile,
  IntegerConstant(u64),
  Punctuator(PunctuatorKind),
  Identifier(String),
}

#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: Location,
}

impl Token {
  /// Human-friendly description used in diagnostics.
  pub fn describe(&self) -> String {
    match &self.kind {
      TokenKind::EndOfFile => "EOF".to_string(),
      TokenKind::IntegerConstant(value) => value.to_string(),
      TokenKind::Punctuator(punctuator) => punctuator.text().to_string(),
      TokenKind::Identifier(ident) => ident.clone(),
    }
  }
}

fn is_space(ch: Option<u8>) -> bool {
  matches!(ch, Some(b' ' | b'\t' | b'\x0b' | b'\r' | b'\n'))
}

fn is_decimal_digit(ch: Option<u8>) -> bool {
  matches!(ch, Some(b'0'..=b'9'))
}

fn is_identifier_nondigit(ch: Option<u8>) -> bool {
  matches!(ch, Some(b'_' | b'a'..=b'z' | b'A'..=b'Z'))
}

/// Lazy token producer with one-token lookahead.
pub struct TokenStream<'a> {
  inner: CharStream<'a>,
  current: Option<Token>,
  last_loc: Location,
}

impl<'a> TokenStream<'a> {
  pub fn new(inner: CharStream<'a>) -> Self {
    let last_loc = inner.loc();
    Self {
      inner,
      current: None,
      last_loc,
    }
  }

  pub fn source(&self) -> &'a str {
    self.inner.source()
  }

  /// Location of the most recently produced token. The parser snapshots
  /// this right after consuming a node's opening token.
  pub fn loc(&self) -> Location {
    self.last_loc
  }

  pub fn error(&self, loc: Location, message: impl Into<String>) -> CompileError {
    CompileError::at(self.source(), loc, message)
  }

  pub fn peek(&mut self) -> CompileResult<&Token> {
    if self.current.is_none() {
      self.current = Some(self.lex()?);
    }
    Ok(self.current.as_ref().unwrap())
  }

  pub fn next(&mut self) -> CompileResult<Token> {
    match self.current.take() {
      Some(token) => Ok(token),
      None => self.lex(),
    }
  }

  pub fn peek_is(&mut self, punctuator: PunctuatorKind) -> CompileResult<bool> {
    Ok(self.peek()?.kind == TokenKind::Punctuator(punctuator))
  }

  pub fn peek_is_identifier(&mut self, ident: &str) -> CompileResult<bool> {
    Ok(matches!(&self.peek()?.kind, TokenKind::Identifier(text) if text == ident))
  }

  pub fn consume_if(&mut self, punctuator: PunctuatorKind) -> CompileResult<bool> {
    if self.peek_is(punctuator)? {
      self.next()?;
      return Ok(true);
    }
    Ok(false)
  }

  pub fn consume_if_identifier(&mut self, ident: &str) -> CompileResult<bool> {
    if self.peek_is_identifier(ident)? {
      self.next()?;
      return Ok(true);
    }
    Ok(false)
  }

  /// Consume a mandatory punctuator or fail with a diagnostic.
  pub fn skip(&mut self, punctuator: PunctuatorKind) -> CompileResult<()> {
    if self.consume_if(punctuator)? {
      return Ok(());
    }
    let (loc, got) = {
      let token = self.peek()?;
      (token.loc, token.describe())
    };
    Err(self.error(
      loc,
      format!("expected \"{}\", but got \"{got}\"", punctuator.text()),
    ))
  }

  /// Consume a mandatory keyword (spelled as an identifier) or fail.
  pub fn skip_identifier(&mut self, ident: &str) -> CompileResult<()> {
    if self.consume_if_identifier(ident)? {
      return Ok(());
    }
    let (loc, got) = {
      let token = self.peek()?;
      (token.loc, token.describe())
    };
    Err(self.error(loc, format!("expected \"{ident}\", but got \"{got}\"")))
  }

  /// Produce the next token from the character stream.
  fn lex(&mut self) -> CompileResult<Token> {
    use PunctuatorKind::*;

    while is_space(self.inner.peek()) {
      self.inner.get();
    }

    let Some(ch) = self.inner.peek() else {
      return Ok(Token {
        kind: TokenKind::EndOfFile,
        loc: self.inner.loc(),
      });
    };

    self.inner.new_loc();

    let kind = match ch {
      b'0'..=b'9' => {
        let mut text = String::new();
        while let Some(digit) = self.inner.peek().filter(|ch| ch.is_ascii_digit()) {
          self.inner.get();
          text.push(digit as char);
        }
        let value = text.parse::<u64>().map_err(|err| {
          self.error(self.inner.loc(), format!("invalid integer constant: {err}"))
        })?;
        TokenKind::IntegerConstant(value)
      }
      b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
        let mut identifier = String::new();
        while is_decimal_digit(self.inner.peek()) || is_identifier_nondigit(self.inner.peek()) {
          if let Some(ch) = self.inner.get() {
            identifier.push(ch as char);
          }
        }
        TokenKind::Identifier(identifier)
      }
      b'[' => {
        self.inner.get();
        TokenKind::Punctuator(LBracket)
      }
      b']' => {
        self.inner.get();
        TokenKind::Punctuator(RBracket)
      }
      b'(' => {
        self.inner.get();
        TokenKind::Punctuator(LParen)
      }
      b')' => {
        self.inner.get();
        TokenKind::Punctuator(RParen)
      }
      b'{' => {
        self.inner.get();
        TokenKind::Punctuator(LBrace)
      }
      b'}' => {
        self.inner.get();
        TokenKind::Punctuator(RBrace)
      }
      b'.' => {
        self.inner.get();
        if self.inner.consume_if(b'.') {
          if !self.inner.consume_if(b'.') {
            return Err(self.error(self.inner.loc(), "expected \"...\""));
          }
          TokenKind::Punctuator(DotDotDot)
        } else {
          TokenKind::Punctuator(Dot)
        }
      }
      b'&' => {
        self.inner.get();
        if self.inner.consume_if(b'&') {
          TokenKind::Punctuator(AndAnd)
        } else if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(AndEq)
        } else {
          TokenKind::Punctuator(And)
        }
      }
      b'|' => {
        self.inner.get();
        if self.inner.consume_if(b'|') {
          TokenKind::Punctuator(OrOr)
        } else if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(OrEq)
        } else {
          TokenKind::Punctuator(Or)
        }
      }
      b'^' => {
        self.inner.get();
        if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(CaretEq)
        } else {
          TokenKind::Punctuator(Caret)
        }
      }
      b'~' => {
        self.inner.get();
        TokenKind::Punctuator(Tilde)
      }
      b'!' => {
        self.inner.get();
        if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(NotEq)
        } else {
          TokenKind::Punctuator(Not)
        }
      }
      b'+' => {
        self.inner.get();
        if self.inner.consume_if(b'+') {
          TokenKind::Punctuator(PlusPlus)
        } else if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(PlusEq)
        } else {
          TokenKind::Punctuator(Plus)
        }
      }
      b'-' => {
        self.inner.get();
        if self.inner.consume_if(b'-') {
          TokenKind::Punctuator(MinusMinus)
        } else if self.inner.consume_if(b'>') {
          TokenKind::Punctuator(Arrow)
        } else if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(MinusEq)
        } else {
          TokenKind::Punctuator(Minus)
        }
      }
      b'*' => {
        self.inner.get();
        if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(StarEq)
        } else {
          TokenKind::Punctuator(Star)
        }
      }
      b'/' => {
        self.inner.get();
        if self.inner.consume_if(b'/') {
          return Err(self.error(self.inner.loc(), "comments are not implemented"));
        }
        if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(SlashEq)
        } else {
          TokenKind::Punctuator(Slash)
        }
      }
      b'%' => {
        self.inner.get();
        if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(ModuloEq)
        } else {
          TokenKind::Punctuator(Modulo)
        }
      }
      b'<' => {
        self.inner.get();
        if self.inner.consume_if(b'<') {
          if self.inner.consume_if(b'=') {
            TokenKind::Punctuator(LLAngleEq)
          } else {
            TokenKind::Punctuator(LLAngle)
          }
        } else if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(LAngleEq)
        } else {
          TokenKind::Punctuator(LAngle)
        }
      }
      b'>' => {
        self.inner.get();
        if self.inner.consume_if(b'>') {
          if self.inner.consume_if(b'=') {
            TokenKind::Punctuator(RRAngleEq)
          } else {
            TokenKind::Punctuator(RRAngle)
          }
        } else if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(RAngleEq)
        } else {
          TokenKind::Punctuator(RAngle)
        }
      }
      b'?' => {
        self.inner.get();
        TokenKind::Punctuator(Query)
      }
      b':' => {
        self.inner.get();
        TokenKind::Punctuator(Colon)
      }
      b';' => {
        self.inner.get();
        TokenKind::Punctuator(Semi)
      }
      b'=' => {
        self.inner.get();
        if self.inner.consume_if(b'=') {
          TokenKind::Punctuator(EqEq)
        } else {
          TokenKind::Punctuator(Eq)
        }
      }
      b',' => {
        self.inner.get();
        TokenKind::Punctuator(Comma)
      }
      b'#' => {
        self.inner.get();
        if self.inner.consume_if(b'#') {
          TokenKind::Punctuator(HashHash)
        } else {
          TokenKind::Punctuator(Hash)
        }
      }
      _ => {
        return Err(self.error(
          self.inner.loc(),
          format!("invalid token: '{}'", ch as char),
        ));
      }
    };

    self.last_loc = self.inner.loc();
    Ok(Token {
      kind,
      loc: self.last_loc,
    })
  }
}
