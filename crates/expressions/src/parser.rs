//! Parser for the trigger expression language
//!
//! Converts a token stream into a small expression AST. The grammar is a
//! fixed subset: boolean logic, a single (non-chained) comparison,
//! arithmetic, unary negation, indexing, mapping member access, and
//! list/tuple/dict literals. Anything else is a syntax error.

use crate::lexer::{Tok, Token};
use crate::ExpressionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

/// Expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
}

struct Parser<'a> {
    tokens: &'a [Token],
    src_len: usize,
    i: usize,
}

/// Parse a token stream into an expression
pub fn parse(src: &str, tokens: &[Token]) -> Result<Expr, ExpressionError> {
    let mut parser = Parser {
        tokens,
        src_len: src.len(),
        i: 0,
    };
    if tokens.is_empty() {
        return Err(ExpressionError::syntax(0, "empty expression"));
    }
    let expr = parser.parse_or()?;
    if !parser.at_end() {
        return Err(ExpressionError::syntax(
            parser.pos(),
            "unexpected trailing input",
        ));
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.i >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.i).map(|t| &t.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.i + offset).map(|t| &t.tok)
    }

    /// Byte offset of the current token, or end-of-source when exhausted.
    fn pos(&self) -> usize {
        self.tokens
            .get(self.i)
            .map(|t| t.pos)
            .unwrap_or(self.src_len)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.i).map(|t| t.tok.clone());
        if tok.is_some() {
            self.i += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), ExpressionError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                self.pos(),
                format!("expected {}", what),
            ))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.eat(&Tok::And) {
            let right = self.parse_not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Tok::Not) {
            let operand = self.parse_not()?;
            Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
        } else {
            self.parse_comparison()
        }
    }

    fn comparison_op(&self) -> Option<CmpOp> {
        match self.peek() {
            Some(Tok::Eq) => Some(CmpOp::Eq),
            Some(Tok::Ne) => Some(CmpOp::Ne),
            Some(Tok::Lt) => Some(CmpOp::Lt),
            Some(Tok::Le) => Some(CmpOp::Le),
            Some(Tok::Gt) => Some(CmpOp::Gt),
            Some(Tok::Ge) => Some(CmpOp::Ge),
            Some(Tok::In) => Some(CmpOp::In),
            Some(Tok::Not) if self.peek_at(1) == Some(&Tok::In) => Some(CmpOp::NotIn),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_arith()?;
        let Some(op) = self.comparison_op() else {
            return Ok(left);
        };
        self.bump();
        if op == CmpOp::NotIn {
            self.bump();
        }
        let right = self.parse_arith()?;
        if self.comparison_op().is_some() {
            return Err(ExpressionError::syntax(
                self.pos(),
                "chained comparisons are not supported",
            ));
        }
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_arith(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.bump();
                let operand = self.parse_factor()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            Some(Tok::Plus) => {
                self.bump();
                let operand = self.parse_factor()?;
                Ok(Expr::Unary(UnaryOp::Pos, Box::new(operand)))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_postfix()?;
        if self.eat(&Tok::DoubleStar) {
            // right-associative; the exponent may itself be signed
            let exponent = self.parse_factor()?;
            Ok(Expr::Binary(
                BinOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ))
        } else {
            Ok(base)
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat(&Tok::LBracket) {
                let index = self.parse_or()?;
                self.expect(&Tok::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Tok::Dot) {
                match self.bump() {
                    Some(Tok::Ident(name)) => {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                    _ => {
                        return Err(ExpressionError::syntax(
                            self.pos(),
                            "expected member name after '.'",
                        ));
                    }
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, ExpressionError> {
        let pos = self.pos();
        match self.bump() {
            Some(Tok::Int(v)) => Ok(Expr::Int(v)),
            Some(Tok::Float(v)) => Ok(Expr::Float(v)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::True) => Ok(Expr::Bool(true)),
            Some(Tok::False) => Ok(Expr::Bool(false)),
            Some(Tok::None) => Ok(Expr::Null),
            Some(Tok::Ident(name)) => Ok(Expr::Name(name)),
            Some(Tok::LParen) => {
                if self.eat(&Tok::RParen) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_or()?;
                if self.eat(&Tok::Comma) {
                    // tuple literal; tuples evaluate as lists
                    let mut items = vec![first];
                    while self.peek() != Some(&Tok::RParen) {
                        items.push(self.parse_or()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                    self.expect(&Tok::RParen, "')'")?;
                    Ok(Expr::List(items))
                } else {
                    self.expect(&Tok::RParen, "')'")?;
                    Ok(first)
                }
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                while self.peek() != Some(&Tok::RBracket) {
                    items.push(self.parse_or()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(&Tok::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Some(Tok::LBrace) => {
                let mut entries = Vec::new();
                while self.peek() != Some(&Tok::RBrace) {
                    let key = self.parse_or()?;
                    self.expect(&Tok::Colon, "':'")?;
                    let value = self.parse_or()?;
                    entries.push((key, value));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(&Tok::RBrace, "'}'")?;
                Ok(Expr::Dict(entries))
            }
            _ => Err(ExpressionError::syntax(pos, "expected expression")),
        }
    }
}
