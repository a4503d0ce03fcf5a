//! Lowering from the surface tree to kernel statements
//!
//! Expressions are lowered in destination-passing style: `expr_into(e, x)`
//! produces statements that unify `x` with the value of `e`. Operands
//! that are not literals or identifiers get a temporary `$vN` declared in
//! a `local` around the statement that uses them.
//!
//! `&&` and `||` have no kernel opcode; they become conditionals:
//!
//! ```text
//! x = a && b      =>  if a then x = b else x = false end
//! x = f(a) || b   =>  local $v0 in $v0 = f(a) if $v0 then x = true else x = b end end
//! ```

use crate::ast::{ActorDecl, BinOp, Block, Clause, Expr, FieldPat, Pat, Statement};
use crate::error::{LangError, Result};
use std::fmt;
use std::sync::Arc;
use strand_kernel::{
    ActorExpr, ArithOp, FieldPattern, Import, Literal, Operand, Pattern, Stmt, MESSAGE_IDENT,
    REPLY_IDENT,
};
use strand_types::{Ident, Span};

/// Hidden result parameter appended to every `func`
pub const RETURN_IDENT: &str = "$ret";

/// A lowered statement program
///
/// Top-level declarations are not wrapped in `local`; they are listed in
/// `globals` so the caller can declare them and read them afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub globals: Vec<Ident>,
    pub body: Arc<Stmt>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.globals.is_empty() {
            write!(f, "var ")?;
            for (i, ident) in self.globals.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", ident)?;
            }
            writeln!(f)?;
        }
        write!(f, "{}", self.body)
    }
}

/// Operands prepared for one kernel statement
struct Operands {
    temps: Vec<Ident>,
    setup: Vec<Stmt>,
    values: Vec<Operand>,
}

impl Operands {
    fn get(&self, index: usize) -> Operand {
        self.values[index].clone()
    }

    /// Emit `stmt` after the setup code, scoping the temporaries around both
    fn wrap(self, stmt: Stmt, span: Span) -> Stmt {
        let mut body = self.setup;
        body.push(stmt);
        let body = Stmt::seq(body);
        if self.temps.is_empty() {
            body
        } else {
            Stmt::Local {
                idents: self.temps,
                body: Arc::new(body),
                span,
            }
        }
    }
}

fn check_features<'a>(features: impl Iterator<Item = &'a Literal>, span: Span) -> Result<()> {
    let mut seen: Vec<&Literal> = Vec::new();
    for feature in features {
        if seen.contains(&feature) {
            return Err(LangError::lower(span, format!("Duplicate feature {}", feature)));
        }
        seen.push(feature);
    }
    Ok(())
}

fn no_value(stmt: &Statement) -> LangError {
    LangError::lower(
        stmt.span(),
        "Block must end with an expression that provides its value",
    )
}

#[derive(Debug, Default)]
pub struct Lowerer {
    next_temp: usize,
}

impl Lowerer {
    pub fn new() -> Self {
        Self::default()
    }

    fn temp(&mut self) -> Ident {
        let ident = Ident::new(format!("$v{}", self.next_temp));
        self.next_temp += 1;
        ident
    }

    pub fn lower_program(&mut self, block: &Block) -> Result<Program> {
        let (globals, body) = self.lower_scope(block)?;
        Ok(Program {
            globals,
            body: Arc::new(body),
        })
    }

    pub fn lower_actor(&mut self, decl: &ActorDecl) -> Result<ActorExpr> {
        let (state, init) = self.lower_scope(&decl.init)?;
        let message = Ident::new(MESSAGE_IDENT);
        let reply = Ident::new(REPLY_IDENT);
        let unhandled = Stmt::Unhandled {
            message: message.clone(),
            span: decl.span,
        };

        let ask_handler = if decl.ask_clauses.is_empty() {
            None
        } else {
            let mut bodies = Vec::with_capacity(decl.ask_clauses.len());
            for clause in &decl.ask_clauses {
                let body = self.lower_block(&clause.body, Some(&reply))?;
                let respond = Stmt::Respond {
                    value: Operand::Ident(reply.clone()),
                    span: clause.span,
                };
                bodies.push(Stmt::seq(vec![body, respond]));
            }
            self.clause_chain(&message, &decl.ask_clauses, bodies, Some(unhandled.clone()))?
        };

        let tell_handler = if decl.tell_clauses.is_empty() {
            None
        } else {
            let bodies = decl
                .tell_clauses
                .iter()
                .map(|clause| self.lower_block(&clause.body, None))
                .collect::<Result<Vec<_>>>()?;
            self.clause_chain(&message, &decl.tell_clauses, bodies, Some(unhandled))?
        };

        Ok(ActorExpr {
            name: decl.name.clone(),
            params: decl.params.clone(),
            imports: decl
                .imports
                .iter()
                .map(|import| Import {
                    module: import.module.clone(),
                    members: import.members.clone(),
                    span: import.span,
                })
                .collect(),
            state,
            init: Arc::new(init),
            ask_handler: ask_handler.map(Arc::new),
            tell_handler: tell_handler.map(Arc::new),
            span: decl.span,
        })
    }

    /// Lower a block whose value is unified with `dest`
    pub fn lower_value(&mut self, block: &Block, dest: &Ident) -> Result<Stmt> {
        self.lower_block(block, Some(dest))
    }

    /// Lower a top-level scope, hoisting its declarations
    fn lower_scope(&mut self, block: &Block) -> Result<(Vec<Ident>, Stmt)> {
        let mut declared: Vec<Ident> = Vec::new();
        let mut out = Vec::new();
        for stmt in &block.stmts {
            match self.declaration(stmt)? {
                Some((name, init)) => {
                    if !declared.contains(&name) {
                        declared.push(name);
                    }
                    out.extend(init);
                }
                None => out.push(self.statement(stmt, None)?),
            }
        }
        let body = if out.is_empty() {
            Stmt::Skip(block.span)
        } else {
            Stmt::seq(out)
        };
        Ok((declared, body))
    }

    /// `var`, `func` and `proc` introduce a name; returns it with the
    /// statement that initializes it, if any
    fn declaration(&mut self, stmt: &Statement) -> Result<Option<(Ident, Option<Stmt>)>> {
        Ok(match stmt {
            Statement::Var { name, value, .. } => {
                let init = match value {
                    Some(value) => Some(self.expr_into(value, name)?),
                    None => None,
                };
                Some((name.clone(), init))
            }
            Statement::Func {
                name,
                params,
                body,
                span,
            } => {
                let ret = Ident::new(RETURN_IDENT);
                let mut params = params.clone();
                params.push(ret.clone());
                let body = self.lower_block(body, Some(&ret))?;
                Some((
                    name.clone(),
                    Some(Stmt::Proc {
                        target: name.clone(),
                        params,
                        body: Arc::new(body),
                        span: *span,
                    }),
                ))
            }
            Statement::Proc {
                name,
                params,
                body,
                span,
            } => {
                let body = self.lower_block(body, None)?;
                Some((
                    name.clone(),
                    Some(Stmt::Proc {
                        target: name.clone(),
                        params: params.clone(),
                        body: Arc::new(body),
                        span: *span,
                    }),
                ))
            }
            _ => None,
        })
    }

    fn lower_block(&mut self, block: &Block, dest: Option<&Ident>) -> Result<Stmt> {
        self.lower_stmts(&block.stmts, dest, block.span)
    }

    fn lower_stmts(&mut self, stmts: &[Statement], dest: Option<&Ident>, span: Span) -> Result<Stmt> {
        if stmts.is_empty() {
            return match dest {
                Some(_) => Err(LangError::lower(span, "Empty block has no value")),
                None => Ok(Stmt::Skip(span)),
            };
        }

        let mut out = Vec::new();
        for (i, stmt) in stmts.iter().enumerate() {
            let rest = &stmts[i + 1..];
            if let Some((name, init)) = self.declaration(stmt)? {
                // The declaration scopes over the rest of the block.
                if rest.is_empty() && dest.is_some() {
                    return Err(no_value(stmt));
                }
                let mut body: Vec<Stmt> = init.into_iter().collect();
                if !rest.is_empty() {
                    let rest_span = rest[0].span().merge(rest[rest.len() - 1].span());
                    body.push(self.lower_stmts(rest, dest, rest_span)?);
                }
                let body = if body.is_empty() {
                    Stmt::Skip(stmt.span())
                } else {
                    Stmt::seq(body)
                };
                out.push(Stmt::Local {
                    idents: vec![name],
                    body: Arc::new(body),
                    span: stmt.span().merge(span),
                });
                return Ok(Stmt::seq(out));
            }
            let value_dest = if rest.is_empty() { dest } else { None };
            out.push(self.statement(stmt, value_dest)?);
        }
        Ok(Stmt::seq(out))
    }

    /// Lower one non-declaration statement; `dest` is set when the
    /// statement must provide the value of its block
    fn statement(&mut self, stmt: &Statement, dest: Option<&Ident>) -> Result<Stmt> {
        match stmt {
            Statement::Var { span, .. } | Statement::Func { span, .. } | Statement::Proc { span, .. } => {
                Err(LangError::lower(*span, "Declaration is not allowed here"))
            }

            Statement::Expr(expr) => match dest {
                Some(dest) => self.expr_into(expr, dest),
                None => self.discard(expr),
            },

            Statement::If {
                guard,
                then_block,
                else_block,
                span,
            } => self.lower_if(guard, then_block, else_block.as_ref(), dest, *span),

            Statement::Case {
                subject,
                clauses,
                otherwise,
                span,
            } => {
                if dest.is_some() && otherwise.is_none() {
                    return Err(LangError::lower(*span, "`case` used as a value needs an `else` branch"));
                }
                let ops = self.operands(&[subject])?;
                let arg = match ops.get(0) {
                    Operand::Ident(ident) => ident,
                    Operand::Lit(_) => {
                        // Case needs a variable to match on.
                        let temp = self.temp();
                        let mut ops = ops;
                        ops.setup.push(Stmt::Bind {
                            target: temp.clone(),
                            value: ops.get(0),
                            span: subject.span(),
                        });
                        ops.temps.push(temp.clone());
                        ops.values[0] = Operand::Ident(temp.clone());
                        return self.lower_case_on(ops, temp, clauses, otherwise.as_ref(), dest, *span);
                    }
                };
                self.lower_case_on(ops, arg, clauses, otherwise.as_ref(), dest, *span)
            }

            other if dest.is_some() => Err(no_value(other)),

            Statement::Assign { target, value, .. } => self.expr_into(value, target),

            Statement::Tell { actor, message, span } => {
                let ops = self.operands(&[actor, message])?;
                let stmt = Stmt::Tell {
                    actor: ops.get(0),
                    message: ops.get(1),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Statement::Emit { value, span } => {
                let ops = self.operands(&[value])?;
                let stmt = Stmt::Emit {
                    value: ops.get(0),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Statement::Skip(span) => Ok(Stmt::Skip(*span)),
        }
    }

    /// An expression evaluated for its effect only
    fn discard(&mut self, expr: &Expr) -> Result<Stmt> {
        match expr {
            Expr::Call { callee, args, span } => {
                let mut exprs: Vec<&Expr> = vec![callee.as_ref()];
                exprs.extend(args.iter());
                let ops = self.operands(&exprs)?;
                let stmt = Stmt::Apply {
                    callee: ops.get(0),
                    args: ops.values[1..].to_vec(),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }
            Expr::Ask { span, .. } => {
                let temp = self.temp();
                let body = self.expr_into(expr, &temp)?;
                Ok(Stmt::Local {
                    idents: vec![temp],
                    body: Arc::new(body),
                    span: *span,
                })
            }
            other => Err(LangError::lower(other.span(), "Expression value is unused")),
        }
    }

    fn lower_if(
        &mut self,
        guard: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
        dest: Option<&Ident>,
        span: Span,
    ) -> Result<Stmt> {
        if dest.is_some() && else_block.is_none() {
            return Err(LangError::lower(span, "`if` used as a value needs an `else` branch"));
        }
        let ops = self.operands(&[guard])?;
        let then_branch = self.lower_block(then_block, dest)?;
        let else_branch = match else_block {
            Some(block) => Some(Arc::new(self.lower_block(block, dest)?)),
            None => None,
        };
        let stmt = Stmt::If {
            guard: ops.get(0),
            then_branch: Arc::new(then_branch),
            else_branch,
            span,
        };
        Ok(ops.wrap(stmt, span))
    }

    fn lower_case_on(
        &mut self,
        ops: Operands,
        arg: Ident,
        clauses: &[Clause],
        otherwise: Option<&Block>,
        dest: Option<&Ident>,
        span: Span,
    ) -> Result<Stmt> {
        let bodies = clauses
            .iter()
            .map(|clause| self.lower_block(&clause.body, dest))
            .collect::<Result<Vec<_>>>()?;
        let otherwise = match otherwise {
            Some(block) => Some(self.lower_block(block, dest)?),
            None => None,
        };
        let chain = self
            .clause_chain(&arg, clauses, bodies, otherwise)?
            .unwrap_or(Stmt::Skip(span));
        Ok(ops.wrap(chain, span))
    }

    /// Nest clauses into `case` statements, first clause outermost
    fn clause_chain(
        &mut self,
        arg: &Ident,
        clauses: &[Clause],
        bodies: Vec<Stmt>,
        otherwise: Option<Stmt>,
    ) -> Result<Option<Stmt>> {
        let mut rest = otherwise;
        for (clause, body) in clauses.iter().zip(bodies).rev() {
            rest = Some(self.match_clause(arg, clause, body, rest)?);
        }
        Ok(rest)
    }

    fn match_clause(&mut self, arg: &Ident, clause: &Clause, body: Stmt, otherwise: Option<Stmt>) -> Result<Stmt> {
        let span = clause.span;
        let pattern = match &clause.pattern {
            Pat::Bind(ident) => {
                let bind = Stmt::Bind {
                    target: ident.clone(),
                    value: Operand::Ident(arg.clone()),
                    span,
                };
                return Ok(Stmt::Local {
                    idents: vec![ident.clone()],
                    body: Arc::new(Stmt::seq(vec![bind, body])),
                    span,
                });
            }
            Pat::Lit(lit) => Pattern::Lit(lit.clone()),
            Pat::Rec { label, fields } => {
                check_features(fields.iter().map(|(feature, _)| feature), span)?;
                let mut captures: Vec<&Ident> = Vec::new();
                for (_, field) in fields {
                    if let FieldPat::Capture(ident) = field {
                        if captures.contains(&ident) {
                            return Err(LangError::lower(span, format!("Duplicate capture `{}`", ident)));
                        }
                        captures.push(ident);
                    }
                }
                Pattern::Rec {
                    label: label.clone(),
                    fields: fields
                        .iter()
                        .map(|(feature, field)| {
                            let field = match field {
                                FieldPat::Capture(ident) => FieldPattern::Capture(ident.clone()),
                                FieldPat::Lit(lit) => FieldPattern::Lit(lit.clone()),
                            };
                            (feature.clone(), field)
                        })
                        .collect(),
                }
            }
        };
        Ok(Stmt::Case {
            arg: arg.clone(),
            pattern,
            body: Arc::new(body),
            otherwise: otherwise.map(Arc::new),
            span,
        })
    }

    /// Turn expressions into operands, lowering non-trivial ones into
    /// fresh temporaries (in order)
    fn operands(&mut self, exprs: &[&Expr]) -> Result<Operands> {
        let mut ops = Operands {
            temps: Vec::new(),
            setup: Vec::new(),
            values: Vec::with_capacity(exprs.len()),
        };
        for expr in exprs {
            let operand = match expr {
                Expr::Lit(lit, _) => Operand::Lit(lit.clone()),
                Expr::Ident(ident, _) => Operand::Ident(ident.clone()),
                other => {
                    let temp = self.temp();
                    ops.setup.push(self.expr_into(other, &temp)?);
                    ops.temps.push(temp.clone());
                    Operand::Ident(temp)
                }
            };
            ops.values.push(operand);
        }
        Ok(ops)
    }

    /// Lower `expr` so that its value is unified with `dest`
    pub fn expr_into(&mut self, expr: &Expr, dest: &Ident) -> Result<Stmt> {
        let target = dest.clone();
        match expr {
            Expr::Lit(lit, span) => Ok(Stmt::Bind {
                target,
                value: Operand::Lit(lit.clone()),
                span: *span,
            }),

            Expr::Ident(ident, span) => Ok(Stmt::Bind {
                target,
                value: Operand::Ident(ident.clone()),
                span: *span,
            }),

            Expr::Binary {
                op: op @ (BinOp::And | BinOp::Or),
                lhs,
                rhs,
                span,
            } => {
                let is_and = *op == BinOp::And;
                let ops = self.operands(&[lhs.as_ref()])?;
                let right = self.expr_into(rhs, dest)?;
                let constant = Stmt::Bind {
                    target,
                    value: Operand::Lit(Literal::Bool(!is_and)),
                    span: *span,
                };
                let (then_branch, else_branch) = if is_and {
                    (right, constant)
                } else {
                    (constant, right)
                };
                let stmt = Stmt::If {
                    guard: ops.get(0),
                    then_branch: Arc::new(then_branch),
                    else_branch: Some(Arc::new(else_branch)),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Expr::Binary { op, lhs, rhs, span } => {
                let ops = self.operands(&[lhs.as_ref(), rhs.as_ref()])?;
                let stmt = match op {
                    BinOp::Rel(op) => Stmt::Rel {
                        target,
                        op: *op,
                        lhs: ops.get(0),
                        rhs: ops.get(1),
                        span: *span,
                    },
                    BinOp::Arith(op) => Stmt::Arith {
                        target,
                        op: *op,
                        lhs: ops.get(0),
                        rhs: ops.get(1),
                        span: *span,
                    },
                    BinOp::And | BinOp::Or => unreachable!("short-circuit operators handled above"),
                };
                Ok(ops.wrap(stmt, *span))
            }

            Expr::Not(inner, span) => {
                let ops = self.operands(&[inner.as_ref()])?;
                let constant = |value: bool| {
                    Arc::new(Stmt::Bind {
                        target: target.clone(),
                        value: Operand::Lit(Literal::Bool(value)),
                        span: *span,
                    })
                };
                let stmt = Stmt::If {
                    guard: ops.get(0),
                    then_branch: constant(false),
                    else_branch: Some(constant(true)),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Expr::Neg(inner, span) => {
                let ops = self.operands(&[inner.as_ref()])?;
                let stmt = Stmt::Arith {
                    target,
                    op: ArithOp::Sub,
                    lhs: Operand::Lit(Literal::Int32(0)),
                    rhs: ops.get(0),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Expr::Record { label, fields, span } => {
                check_features(fields.iter().map(|(feature, _)| feature), *span)?;
                let values: Vec<&Expr> = fields.iter().map(|(_, value)| value).collect();
                let ops = self.operands(&values)?;
                let stmt = Stmt::Record {
                    target,
                    label: label.clone(),
                    fields: fields
                        .iter()
                        .map(|(feature, _)| feature.clone())
                        .zip(ops.values.iter().cloned())
                        .collect(),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Expr::Field { record, feature, span } => {
                let ops = self.operands(&[record.as_ref(), feature.as_ref()])?;
                let stmt = Stmt::Select {
                    target,
                    record: ops.get(0),
                    feature: ops.get(1),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Expr::Call { callee, args, span } => {
                let mut exprs: Vec<&Expr> = vec![callee.as_ref()];
                exprs.extend(args.iter());
                let ops = self.operands(&exprs)?;
                let mut call_args = ops.values[1..].to_vec();
                call_args.push(Operand::Ident(target));
                let stmt = Stmt::Apply {
                    callee: ops.get(0),
                    args: call_args,
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Expr::Ask { actor, message, span } => {
                let ops = self.operands(&[actor.as_ref(), message.as_ref()])?;
                let stmt = Stmt::Ask {
                    target,
                    actor: ops.get(0),
                    message: ops.get(1),
                    span: *span,
                };
                Ok(ops.wrap(stmt, *span))
            }

            Expr::If {
                guard,
                then_block,
                else_block,
                span,
            } => self.lower_if(guard, then_block, else_block.as_ref(), Some(dest), *span),
        }
    }
}
