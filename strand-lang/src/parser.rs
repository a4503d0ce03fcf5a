//! Recursive-descent parser for the surface language
//!
//! Statements need no separators (`;` is accepted and ignored). A block
//! runs until one of the keywords that closes it: `end`, `else`,
//! `elseif`, `of`, `handle`, or the end of input.

use crate::ast::{ActorDecl, BinOp, Block, Clause, Expr, FieldPat, ImportDecl, Pat, Statement};
use crate::error::{LangError, Result};
use crate::lexer::{SpannedToken, Token};
use strand_kernel::{ArithOp, Literal, RelOp};
use strand_types::{Ident, Span};

pub struct Parser<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
}

fn int_literal(value: i64) -> Literal {
    match i32::try_from(value) {
        Ok(small) => Literal::Int32(small),
        Err(_) => Literal::Int64(value),
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [SpannedToken]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    /// End of the previously consumed token
    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span.end)
            .unwrap_or(0)
    }

    fn since(&self, start: Span) -> Span {
        Span::new(start.start, self.last_end().max(start.start))
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    fn consume(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, context: &str) -> Result<()> {
        if self.consume(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{:?} {}", expected, context)))
        }
    }

    fn unexpected(&self, wanted: &str) -> LangError {
        LangError::parser(
            self.span(),
            format!("Expected {}, found {}", wanted, self.peek().describe()),
        )
    }

    fn ident(&mut self, context: &str) -> Result<Ident> {
        match self.peek() {
            Token::Identifier(name) => {
                let ident = Ident::new(name);
                self.pos += 1;
                Ok(ident)
            }
            _ => Err(self.unexpected(&format!("identifier {}", context))),
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn at_block_end(&self) -> bool {
        matches!(
            self.peek(),
            Token::End | Token::Else | Token::ElseIf | Token::Of | Token::Handle | Token::Eof
        )
    }

    /// Parse a whole source as a statement program
    pub fn parse_program(&mut self) -> Result<Block> {
        let block = self.parse_block()?;
        if !self.is_eof() {
            return Err(self.unexpected("statement"));
        }
        Ok(block)
    }

    /// Parse a whole source as exactly one actor declaration
    pub fn parse_actor_source(&mut self) -> Result<ActorDecl> {
        while self.consume(&Token::Semi) {}
        let actor = self.parse_actor()?;
        while self.consume(&Token::Semi) {}
        if !self.is_eof() {
            return Err(self.unexpected("end of input after actor"));
        }
        Ok(actor)
    }

    pub fn parse_block(&mut self) -> Result<Block> {
        let start = self.span();
        let mut stmts = Vec::new();
        loop {
            while self.consume(&Token::Semi) {}
            if self.at_block_end() {
                break;
            }
            stmts.push(self.parse_statement()?);
        }
        let span = if stmts.is_empty() {
            Span::new(start.start, start.start)
        } else {
            self.since(start)
        };
        Ok(Block { stmts, span })
    }

    fn parse_params(&mut self) -> Result<Vec<Ident>> {
        self.expect(Token::LParen, "before parameters")?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                params.push(self.ident("in parameter list")?);
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "after parameters")?;
        Ok(params)
    }

    fn parse_actor(&mut self) -> Result<ActorDecl> {
        let start = self.span();
        self.expect(Token::Actor, "at start of actor")?;
        let name = self.ident("after `actor`")?;
        let params = self.parse_params()?;
        self.expect(Token::In, "after actor parameters")?;

        let mut imports = Vec::new();
        let mut init = Vec::new();
        let mut ask_clauses = Vec::new();
        let mut tell_clauses = Vec::new();

        loop {
            while self.consume(&Token::Semi) {}
            match self.peek() {
                Token::End => break,
                Token::Import => imports.push(self.parse_import()?),
                Token::Handle => {
                    let clause_start = self.span();
                    self.pos += 1;
                    let is_ask = match self.advance() {
                        Token::Ask => true,
                        Token::Tell => false,
                        _ => {
                            return Err(LangError::parser(
                                clause_start,
                                "Expected `ask` or `tell` after `handle`",
                            ))
                        }
                    };
                    let pattern = self.parse_pattern()?;
                    self.expect(Token::In, "after handler pattern")?;
                    let body = self.parse_block()?;
                    self.expect(Token::End, "to close handler")?;
                    let clause = Clause {
                        pattern,
                        body,
                        span: self.since(clause_start),
                    };
                    if is_ask {
                        ask_clauses.push(clause);
                    } else {
                        tell_clauses.push(clause);
                    }
                }
                Token::Eof => return Err(self.unexpected("`end` to close actor")),
                _ => init.push(self.parse_statement()?),
            }
        }
        self.expect(Token::End, "to close actor")?;

        let init_span = match (init.first(), init.last()) {
            (Some(first), Some(last)) => first.span().merge(last.span()),
            _ => Span::default(),
        };
        Ok(ActorDecl {
            name,
            params,
            imports,
            init: Block {
                stmts: init,
                span: init_span,
            },
            ask_clauses,
            tell_clauses,
            span: self.since(start),
        })
    }

    fn parse_import(&mut self) -> Result<ImportDecl> {
        let start = self.span();
        self.expect(Token::Import, "")?;
        let mut module = self.ident("as module name")?.to_string();
        while self.consume(&Token::Dot) {
            module.push('.');
            module.push_str(self.ident("in module path")?.as_str());
        }
        self.expect(Token::LBracket, "before imported members")?;
        let mut members = Vec::new();
        loop {
            members.push(self.ident("in import list")?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket, "after imported members")?;
        Ok(ImportDecl {
            module,
            members,
            span: self.since(start),
        })
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        let start = self.span();
        match self.peek() {
            Token::Var => {
                self.pos += 1;
                let name = self.ident("after `var`")?;
                let value = if self.consume(&Token::Eq) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Statement::Var {
                    name,
                    value,
                    span: self.since(start),
                })
            }
            Token::Func | Token::Proc => {
                let is_func = matches!(self.advance(), Token::Func);
                let name = self.ident("as procedure name")?;
                let params = self.parse_params()?;
                self.expect(Token::In, "after parameters")?;
                let body = self.parse_block()?;
                self.expect(Token::End, "to close procedure")?;
                let span = self.since(start);
                Ok(if is_func {
                    Statement::Func {
                        name,
                        params,
                        body,
                        span,
                    }
                } else {
                    Statement::Proc {
                        name,
                        params,
                        body,
                        span,
                    }
                })
            }
            Token::If => {
                let (guard, then_block, else_block) = self.parse_if_tail()?;
                Ok(Statement::If {
                    guard,
                    then_block,
                    else_block,
                    span: self.since(start),
                })
            }
            Token::Case => self.parse_case(),
            Token::Emit => {
                self.pos += 1;
                let value = self.parse_expr()?;
                Ok(Statement::Emit {
                    value,
                    span: self.since(start),
                })
            }
            Token::Skip => {
                self.pos += 1;
                Ok(Statement::Skip(self.since(start)))
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.consume(&Token::Eq) {
                    let target = match expr {
                        Expr::Ident(ident, _) => ident,
                        other => {
                            return Err(LangError::parser(
                                other.span(),
                                "Only an identifier can appear on the left of `=`",
                            ))
                        }
                    };
                    let value = self.parse_expr()?;
                    return Ok(Statement::Assign {
                        target,
                        value,
                        span: self.since(start),
                    });
                }
                if self.check(&Token::Dot) && matches!(self.peek_at(1), Token::Tell) {
                    self.pos += 2;
                    self.expect(Token::LParen, "after `tell`")?;
                    let message = self.parse_expr()?;
                    self.expect(Token::RParen, "after message")?;
                    return Ok(Statement::Tell {
                        actor: expr,
                        message,
                        span: self.since(start),
                    });
                }
                Ok(Statement::Expr(expr))
            }
        }
    }


    /// `if g then A (elseif g then B)* (else C)? end`, starting at `if`
    fn parse_if_tail(&mut self) -> Result<(Expr, Block, Option<Block>)> {
        self.pos += 1;
        let guard = self.parse_expr()?;
        self.expect(Token::Then, "after condition")?;
        let then_block = self.parse_block()?;

        let else_block = match self.peek() {
            Token::ElseIf => {
                // The nested `if` shares the outer `end`.
                let start = self.span();
                let (nested_guard, nested_then, nested_else) = self.parse_if_tail()?;
                let span = self.since(start);
                let nested = Statement::If {
                    guard: nested_guard,
                    then_block: nested_then,
                    else_block: nested_else,
                    span,
                };
                return Ok((
                    guard,
                    then_block,
                    Some(Block {
                        stmts: vec![nested],
                        span,
                    }),
                ));
            }
            Token::Else => {
                self.pos += 1;
                Some(self.parse_block()?)
            }
            _ => None,
        };
        self.expect(Token::End, "to close `if`")?;
        Ok((guard, then_block, else_block))
    }

    fn parse_case(&mut self) -> Result<Statement> {
        let start = self.span();
        self.expect(Token::Case, "")?;
        let subject = self.parse_expr()?;

        let mut clauses = Vec::new();
        while self.check(&Token::Of) {
            let clause_start = self.span();
            self.pos += 1;
            let pattern = self.parse_pattern()?;
            self.expect(Token::Then, "after pattern")?;
            let body = self.parse_block()?;
            clauses.push(Clause {
                pattern,
                body,
                span: self.since(clause_start),
            });
        }
        if clauses.is_empty() {
            return Err(self.unexpected("`of` after case subject"));
        }

        let otherwise = if self.consume(&Token::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        self.expect(Token::End, "to close `case`")?;
        Ok(Statement::Case {
            subject,
            clauses,
            otherwise,
            span: self.since(start),
        })
    }

    fn parse_literal(&mut self) -> Option<Literal> {
        let lit = match self.peek() {
            Token::Int(i) => int_literal(*i),
            Token::Long(i) => Literal::Int64(*i),
            Token::Str(s) => Literal::str(s),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
            Token::Minus => match self.peek_at(1) {
                Token::Int(i) => int_literal(-*i),
                Token::Long(i) => Literal::Int64(-*i),
                _ => return None,
            },
            _ => return None,
        };
        if matches!(self.peek(), Token::Minus) {
            self.pos += 1;
        }
        self.pos += 1;
        Some(lit)
    }

    /// Record feature: a literal, or a bare identifier naming a string feature
    fn parse_feature(&mut self) -> Result<Literal> {
        if let Token::Identifier(name) = self.peek() {
            let lit = Literal::str(name);
            self.pos += 1;
            return Ok(lit);
        }
        self.parse_literal()
            .ok_or_else(|| self.unexpected("record feature"))
    }

    pub fn parse_pattern(&mut self) -> Result<Pat> {
        if let Token::Identifier(name) = self.peek() {
            let ident = Ident::new(name);
            self.pos += 1;
            return Ok(Pat::Bind(ident));
        }

        let label = if self.check(&Token::LBrace) {
            None
        } else {
            let lit = self.parse_literal().ok_or_else(|| self.unexpected("pattern"))?;
            if !self.consume(&Token::Hash) {
                return Ok(Pat::Lit(lit));
            }
            Some(lit)
        };

        self.expect(Token::LBrace, "to open record pattern")?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            let feature = self.parse_feature()?;
            self.expect(Token::Colon, "after feature")?;
            let field = match self.peek() {
                Token::Identifier(name) => {
                    let ident = Ident::new(name);
                    self.pos += 1;
                    FieldPat::Capture(ident)
                }
                _ => FieldPat::Lit(
                    self.parse_literal()
                        .ok_or_else(|| self.unexpected("capture or literal in pattern"))?,
                ),
            };
            fields.push((feature, field));
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace, "to close record pattern")?;
        Ok(Pat::Rec { label, fields })
    }

    // Expressions, lowest precedence first

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span().merge(rhs.span());
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.consume(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Self::binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_rel()?;
        while self.consume(&Token::AndAnd) {
            let rhs = self.parse_rel()?;
            lhs = Self::binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Token::Lt => RelOp::Lt,
            Token::Le => RelOp::Le,
            Token::Gt => RelOp::Gt,
            Token::Ge => RelOp::Ge,
            Token::EqEq => RelOp::Eq,
            Token::NotEq => RelOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_add()?;
        Ok(Self::binary(BinOp::Rel(op), lhs, rhs))
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_mul()?;
            lhs = Self::binary(BinOp::Arith(op), lhs, rhs);
        }
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::Percent => ArithOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Self::binary(BinOp::Arith(op), lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.span();
        match self.peek() {
            Token::Bang => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                Ok(Expr::Not(Box::new(inner), self.since(start)))
            }
            Token::Minus if !matches!(self.peek_at(1), Token::Int(_) | Token::Long(_)) => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                Ok(Expr::Neg(Box::new(inner), self.since(start)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "after arguments")?;
        Ok(args)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let start = self.span();
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.pos += 1;
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span: self.since(start),
                    };
                }
                Token::LBracket => {
                    self.pos += 1;
                    let feature = self.parse_expr()?;
                    self.expect(Token::RBracket, "after feature")?;
                    expr = Expr::Field {
                        record: Box::new(expr),
                        feature: Box::new(feature),
                        span: self.since(start),
                    };
                }
                Token::Dot => match self.peek_at(1) {
                    Token::Ask => {
                        self.pos += 2;
                        self.expect(Token::LParen, "after `ask`")?;
                        let message = self.parse_expr()?;
                        self.expect(Token::RParen, "after message")?;
                        expr = Expr::Ask {
                            actor: Box::new(expr),
                            message: Box::new(message),
                            span: self.since(start),
                        };
                    }
                    // `.tell(...)` is a statement; leave it to the caller.
                    Token::Tell => return Ok(expr),
                    _ => {
                        self.pos += 1;
                        let feature_span = self.span();
                        let name = self.ident("after `.`")?;
                        expr = Expr::Field {
                            record: Box::new(expr),
                            feature: Box::new(Expr::Lit(Literal::str(name.as_str()), feature_span)),
                            span: self.since(start),
                        };
                    }
                },
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.span();
        match self.peek() {
            Token::Identifier(name) => {
                let ident = Ident::new(name);
                self.pos += 1;
                Ok(Expr::Ident(ident, start))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "to close parenthesis")?;
                Ok(inner)
            }
            Token::LBrace => self.parse_record(None, start),
            Token::If => {
                let (guard, then_block, else_block) = self.parse_if_tail()?;
                Ok(Expr::If {
                    guard: Box::new(guard),
                    then_block,
                    else_block,
                    span: self.since(start),
                })
            }
            _ => {
                let lit = self.parse_literal().ok_or_else(|| self.unexpected("expression"))?;
                if self.consume(&Token::Hash) {
                    return self.parse_record(Some(lit), start);
                }
                Ok(Expr::Lit(lit, self.since(start)))
            }
        }
    }

    fn parse_record(&mut self, label: Option<Literal>, start: Span) -> Result<Expr> {
        self.expect(Token::LBrace, "to open record")?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            let feature = self.parse_feature()?;
            self.expect(Token::Colon, "after feature")?;
            fields.push((feature, self.parse_expr()?));
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace, "to close record")?;
        Ok(Expr::Record {
            label,
            fields,
            span: self.since(start),
        })
    }
}

/// Parse a statement program
pub fn parse_program(tokens: &[SpannedToken]) -> Result<Block> {
    Parser::new(tokens).parse_program()
}

/// Parse a source holding one actor declaration
pub fn parse_actor(tokens: &[SpannedToken]) -> Result<ActorDecl> {
    Parser::new(tokens).parse_actor_source()
}
