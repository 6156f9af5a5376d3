//! Recursive-descent parser for the policy grammar.
//!
//! Consumes the token stream with a single cursor (LL(1), no backtracking)
//! and produces a [`DerivationTree`] whose shapes mirror the grammar
//! productions. AST construction is a separate pass over the tree.

use crate::lexer::{Token, TokenKind};
use thiserror::Error;

/// Nonterminals of the policy grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nont {
    Source,
    Decls,
    DeclRest,
    Decl,
    Topology,
    Aware,
    TopoRest,
    Basic,
    Edge,
    EdgeRest,
    Linear,
    LinearRest,
    Expr,
    Sum,
    SumRest,
    Mul,
    MulRest,
    Elem,
    Pg,
    PgRest,
}

/// A derivation-tree node: interior structure in `subtrees`, consumed
/// terminals in `leaves`, both in source order.
#[derive(Debug)]
pub struct DerivationTree {
    pub label: Nont,
    pub subtrees: Vec<DerivationTree>,
    pub leaves: Vec<Token>,
}

impl DerivationTree {
    fn new(label: Nont) -> Self {
        Self {
            label,
            subtrees: Vec::new(),
            leaves: Vec::new(),
        }
    }
}

/// Syntax error with the offending token's position and text.
#[derive(Debug, Error)]
#[error("line {line}, column {col}: expected {expected}, got {got}")]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub expected: String,
    pub got: String,
}

impl ParseError {
    fn at(token: &Token, expected: &str) -> Self {
        let got = if token.kind == TokenKind::End {
            "end of input".to_string()
        } else {
            format!("'{}'", token.text)
        };
        Self {
            line: token.line,
            col: token.col,
            expected: expected.to_string(),
            got,
        }
    }
}

/// Parses a lexed policy into its derivation tree.
///
/// `tokens` must be lexer output: non-empty and terminated by
/// [`TokenKind::End`].
pub fn parse(tokens: &[Token]) -> Result<DerivationTree, ParseError> {
    Parser { tokens, pos: 0 }.source()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::End {
            self.pos += 1;
        }
        token
    }

    /// Consumes one terminal of the given kind into `tree`, or fails with
    /// `expected` naming what the production needed.
    fn expect(
        &mut self,
        tree: &mut DerivationTree,
        kind: TokenKind,
        expected: &str,
    ) -> Result<(), ParseError> {
        let token = self.advance();
        if token.kind != kind {
            return Err(ParseError::at(&token, expected));
        }
        tree.leaves.push(token);
        Ok(())
    }

    fn source(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Source);
        if self.peek().kind == TokenKind::End {
            return Err(ParseError::at(self.peek(), "a declaration"));
        }
        tree.subtrees.push(self.decls()?);
        Ok(tree)
    }

    fn decls(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Decls);
        tree.subtrees.push(self.decl()?);
        tree.subtrees.push(self.decl_rest()?);
        Ok(tree)
    }

    fn decl_rest(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::DeclRest);
        match self.peek().kind {
            TokenKind::End => {}
            TokenKind::Topology | TokenKind::Pg | TokenKind::Aware => {
                tree.subtrees.push(self.decl()?);
                tree.subtrees.push(self.decl_rest()?);
            }
            _ => return Err(ParseError::at(self.peek(), "a declaration")),
        }
        Ok(tree)
    }

    fn decl(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Decl);
        match self.peek().kind {
            TokenKind::Topology => tree.subtrees.push(self.topology()?),
            TokenKind::Pg => tree.subtrees.push(self.pg()?),
            TokenKind::Aware => tree.subtrees.push(self.aware()?),
            _ => return Err(ParseError::at(self.peek(), "a declaration")),
        }
        Ok(tree)
    }

    fn topology(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Topology);
        self.expect(&mut tree, TokenKind::Topology, "'topology'")?;
        self.expect(&mut tree, TokenKind::Ident, "an identifier")?;
        self.expect(&mut tree, TokenKind::Colon, "':'")?;
        tree.subtrees.push(self.topo_rest()?);
        Ok(tree)
    }

    fn aware(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Aware);
        self.expect(&mut tree, TokenKind::Aware, "'aware'")?;
        self.expect(&mut tree, TokenKind::Ident, "an identifier")?;
        self.expect(&mut tree, TokenKind::Colon, "':'")?;
        tree.subtrees.push(self.topo_rest()?);
        Ok(tree)
    }

    fn topo_rest(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::TopoRest);
        let token = self.advance();
        let kind = token.kind;
        tree.leaves.push(token);
        match kind {
            TokenKind::Basic => {
                self.expect(&mut tree, TokenKind::LBrace, "'{'")?;
                tree.subtrees.push(self.basic()?);
                self.expect(&mut tree, TokenKind::RBrace, "'}'")?;
            }
            TokenKind::Linear => tree.subtrees.push(self.linear()?),
            TokenKind::Expr => tree.subtrees.push(self.expr()?),
            _ => {
                return Err(ParseError::at(
                    &tree.leaves[0],
                    "'basic', 'linear', or 'expr'",
                ))
            }
        }
        Ok(tree)
    }

    fn basic(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Basic);
        tree.subtrees.push(self.edge()?);
        tree.subtrees.push(self.edge_rest()?);
        Ok(tree)
    }

    fn edge(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Edge);
        self.expect(&mut tree, TokenKind::Str, "a tag string")?;
        self.expect(&mut tree, TokenKind::Arrow, "'->'")?;
        self.expect(&mut tree, TokenKind::Str, "a tag string")?;
        Ok(tree)
    }

    fn edge_rest(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::EdgeRest);
        match self.peek().kind {
            TokenKind::RBrace => {}
            TokenKind::Comma => {
                tree.leaves.push(self.advance());
                tree.subtrees.push(self.edge()?);
                tree.subtrees.push(self.edge_rest()?);
            }
            _ => return Err(ParseError::at(self.peek(), "',' or '}'")),
        }
        Ok(tree)
    }

    fn linear(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Linear);
        self.expect(&mut tree, TokenKind::Str, "a tag string")?;
        tree.subtrees.push(self.linear_rest()?);
        Ok(tree)
    }

    fn linear_rest(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::LinearRest);
        match self.peek().kind {
            TokenKind::Topology | TokenKind::Pg | TokenKind::Aware | TokenKind::End => {}
            TokenKind::Comma => {
                tree.leaves.push(self.advance());
                tree.subtrees.push(self.linear()?);
            }
            _ => return Err(ParseError::at(self.peek(), "',' or a declaration")),
        }
        Ok(tree)
    }

    fn expr(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Expr);
        match self.peek().kind {
            TokenKind::Ident | TokenKind::LParen => tree.subtrees.push(self.sum()?),
            _ => return Err(ParseError::at(self.peek(), "an identifier or '('")),
        }
        Ok(tree)
    }

    fn sum(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Sum);
        match self.peek().kind {
            TokenKind::Ident | TokenKind::LParen => {
                tree.subtrees.push(self.mul()?);
                tree.subtrees.push(self.sum_rest()?);
            }
            _ => return Err(ParseError::at(self.peek(), "an identifier or '('")),
        }
        Ok(tree)
    }

    fn sum_rest(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::SumRest);
        match self.peek().kind {
            TokenKind::Topology
            | TokenKind::Pg
            | TokenKind::Aware
            | TokenKind::RParen
            | TokenKind::End => {}
            TokenKind::Plus => {
                tree.leaves.push(self.advance());
                tree.subtrees.push(self.mul()?);
                tree.subtrees.push(self.sum_rest()?);
            }
            _ => return Err(ParseError::at(self.peek(), "'+' or end of expression")),
        }
        Ok(tree)
    }

    fn mul(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Mul);
        match self.peek().kind {
            TokenKind::Ident | TokenKind::LParen => {
                tree.subtrees.push(self.elem()?);
                tree.subtrees.push(self.mul_rest()?);
            }
            _ => return Err(ParseError::at(self.peek(), "an identifier or '('")),
        }
        Ok(tree)
    }

    fn mul_rest(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::MulRest);
        match self.peek().kind {
            TokenKind::Topology
            | TokenKind::Pg
            | TokenKind::Aware
            | TokenKind::RParen
            | TokenKind::Plus
            | TokenKind::End => {}
            TokenKind::Mult => {
                tree.leaves.push(self.advance());
                tree.subtrees.push(self.elem()?);
                tree.subtrees.push(self.mul_rest()?);
            }
            _ => return Err(ParseError::at(self.peek(), "'*' or end of expression")),
        }
        Ok(tree)
    }

    fn elem(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Elem);
        let token = self.advance();
        match token.kind {
            TokenKind::Ident => tree.leaves.push(token),
            TokenKind::LParen => {
                tree.leaves.push(token);
                tree.subtrees.push(self.sum()?);
                self.expect(&mut tree, TokenKind::RParen, "')'")?;
            }
            _ => return Err(ParseError::at(&token, "an identifier or '('")),
        }
        Ok(tree)
    }

    fn pg(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::Pg);
        self.expect(&mut tree, TokenKind::Pg, "'pg'")?;
        self.expect(&mut tree, TokenKind::Ident, "an identifier")?;
        self.expect(&mut tree, TokenKind::LBrace, "'{'")?;
        tree.subtrees.push(self.pg_rest()?);
        self.expect(&mut tree, TokenKind::RBrace, "'}'")?;
        Ok(tree)
    }

    fn pg_rest(&mut self) -> Result<DerivationTree, ParseError> {
        let mut tree = DerivationTree::new(Nont::PgRest);
        self.expect(&mut tree, TokenKind::PgFile, "keyword 'file'")?;
        self.expect(&mut tree, TokenKind::Colon, "':'")?;
        self.expect(&mut tree, TokenKind::Str, "a file name string")?;
        self.expect(&mut tree, TokenKind::Ident, "'tag'")?;
        if tree.leaves[3].text != "tag" {
            return Err(ParseError::at(&tree.leaves[3], "'tag'"));
        }
        self.expect(&mut tree, TokenKind::Equal, "'='")?;
        self.expect(&mut tree, TokenKind::Str, "a tag string")?;
        Ok(tree)
    }
}
