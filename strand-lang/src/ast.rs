//! Surface syntax tree
//!
//! `Display` pretty-prints every node back to source form with four-space
//! indentation. Nested binary operands are always parenthesized, so the
//! output re-parses to the same tree.

use std::fmt;
use strand_kernel::{ArithOp, Literal, RelOp};
use strand_types::{Ident, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Rel(RelOp),
    Arith(ArithOp),
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Rel(op) => op.symbol(),
            BinOp::Arith(op) => op.symbol(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Literal, Span),
    Ident(Ident, Span),
    Record {
        label: Option<Literal>,
        fields: Vec<(Literal, Expr)>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Not(Box<Expr>, Span),
    Neg(Box<Expr>, Span),
    /// `r.name` or `r[e]`
    Field {
        record: Box<Expr>,
        feature: Box<Expr>,
        span: Span,
    },
    /// Function call; the callee receives an extra result parameter
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Ask {
        actor: Box<Expr>,
        message: Box<Expr>,
        span: Span,
    },
    If {
        guard: Box<Expr>,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Lit(_, span) | Expr::Ident(_, span) | Expr::Not(_, span) | Expr::Neg(_, span) => *span,
            Expr::Record { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Field { span, .. }
            | Expr::Call { span, .. }
            | Expr::Ask { span, .. }
            | Expr::If { span, .. } => *span,
        }
    }

    /// Literals and bare identifiers can be used as kernel operands directly
    pub fn is_trivial(&self) -> bool {
        matches!(self, Expr::Lit(..) | Expr::Ident(..))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldPat {
    Capture(Ident),
    Lit(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pat {
    Lit(Literal),
    /// Binds the whole value
    Bind(Ident),
    Rec {
        label: Option<Literal>,
        fields: Vec<(Literal, FieldPat)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub pattern: Pat,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `var x` or `var x = e`
    Var {
        name: Ident,
        value: Option<Expr>,
        span: Span,
    },
    /// `x = e`: unify `x` with the value of `e`
    Assign {
        target: Ident,
        value: Expr,
        span: Span,
    },
    /// `func f(a) in ... end`: the body's final expression is the result
    Func {
        name: Ident,
        params: Vec<Ident>,
        body: Block,
        span: Span,
    },
    Proc {
        name: Ident,
        params: Vec<Ident>,
        body: Block,
        span: Span,
    },
    Tell {
        actor: Expr,
        message: Expr,
        span: Span,
    },
    Emit {
        value: Expr,
        span: Span,
    },
    If {
        guard: Expr,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },
    Case {
        subject: Expr,
        clauses: Vec<Clause>,
        otherwise: Option<Block>,
        span: Span,
    },
    Skip(Span),
    /// A bare expression: a procedure call, or the value of a block
    Expr(Expr),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Var { span, .. }
            | Statement::Assign { span, .. }
            | Statement::Func { span, .. }
            | Statement::Proc { span, .. }
            | Statement::Tell { span, .. }
            | Statement::Emit { span, .. }
            | Statement::If { span, .. }
            | Statement::Case { span, .. } => *span,
            Statement::Skip(span) => *span,
            Statement::Expr(expr) => expr.span(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub module: String,
    pub members: Vec<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorDecl {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub imports: Vec<ImportDecl>,
    pub init: Block,
    pub ask_clauses: Vec<Clause>,
    pub tell_clauses: Vec<Clause>,
    pub span: Span,
}

// Pretty printing

fn pad(f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    write!(f, "{:width$}", "", width = indent)
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Binary { .. } => write!(f, "({})", expr),
        _ => write!(f, "{}", expr),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(lit, _) => write!(f, "{}", lit),
            Expr::Ident(ident, _) => write!(f, "{}", ident),
            Expr::Record { label, fields, .. } => {
                if let Some(label) = label {
                    write!(f, "{}#", label)?;
                }
                write!(f, "{{")?;
                for (i, (feature, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", feature, value)?;
                }
                write!(f, "}}")
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs)
            }
            Expr::Not(inner, _) => {
                write!(f, "!")?;
                write_operand(f, inner)
            }
            Expr::Neg(inner, _) => {
                write!(f, "-")?;
                write_operand(f, inner)
            }
            Expr::Field { record, feature, .. } => {
                write_operand(f, record)?;
                write!(f, "[{}]", feature)
            }
            Expr::Call { callee, args, .. } => {
                write_operand(f, callee)?;
                write!(f, "(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Ask { actor, message, .. } => {
                write_operand(f, actor)?;
                write!(f, ".ask({})", message)
            }
            Expr::If {
                guard,
                then_block,
                else_block,
                ..
            } => {
                write!(f, "if {} then ", guard)?;
                then_block.write_inline(f)?;
                if let Some(else_block) = else_block {
                    write!(f, " else ")?;
                    else_block.write_inline(f)?;
                }
                write!(f, " end")
            }
        }
    }
}

impl fmt::Display for Pat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pat::Lit(lit) => write!(f, "{}", lit),
            Pat::Bind(ident) => write!(f, "{}", ident),
            Pat::Rec { label, fields } => {
                if let Some(label) = label {
                    write!(f, "{}#", label)?;
                }
                write!(f, "{{")?;
                for (i, (feature, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match field {
                        FieldPat::Capture(ident) => write!(f, "{}: {}", feature, ident)?,
                        FieldPat::Lit(lit) => write!(f, "{}: {}", feature, lit)?,
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

impl Block {
    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        for (i, stmt) in self.stmts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            stmt.write_indented(f, indent)?;
        }
        Ok(())
    }

    /// Single-line form used inside expressions
    fn write_inline(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stmt) in self.stmts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            match stmt {
                Statement::Expr(expr) => write!(f, "{}", expr)?,
                Statement::Assign { target, value, .. } => write!(f, "{} = {}", target, value)?,
                other => write!(f, "{}", other.to_string().replace('\n', " "))?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl Statement {
    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        pad(f, indent)?;
        match self {
            Statement::Var { name, value, .. } => match value {
                Some(value) => write!(f, "var {} = {}", name, value),
                None => write!(f, "var {}", name),
            },
            Statement::Assign { target, value, .. } => write!(f, "{} = {}", target, value),
            Statement::Func {
                name, params, body, ..
            }
            | Statement::Proc {
                name, params, body, ..
            } => {
                let keyword = if matches!(self, Statement::Func { .. }) {
                    "func"
                } else {
                    "proc"
                };
                write!(f, "{} {}(", keyword, name)?;
                write_list(f, params)?;
                writeln!(f, ") in")?;
                body.write_indented(f, indent + 4)?;
                writeln!(f)?;
                pad(f, indent)?;
                write!(f, "end")
            }
            Statement::Tell { actor, message, .. } => {
                write_operand(f, actor)?;
                write!(f, ".tell({})", message)
            }
            Statement::Emit { value, .. } => write!(f, "emit {}", value),
            Statement::If {
                guard,
                then_block,
                else_block,
                ..
            } => {
                writeln!(f, "if {} then", guard)?;
                then_block.write_indented(f, indent + 4)?;
                if let Some(else_block) = else_block {
                    writeln!(f)?;
                    pad(f, indent)?;
                    writeln!(f, "else")?;
                    else_block.write_indented(f, indent + 4)?;
                }
                writeln!(f)?;
                pad(f, indent)?;
                write!(f, "end")
            }
            Statement::Case {
                subject,
                clauses,
                otherwise,
                ..
            } => {
                write!(f, "case {}", subject)?;
                for clause in clauses {
                    writeln!(f)?;
                    pad(f, indent)?;
                    writeln!(f, "of {} then", clause.pattern)?;
                    clause.body.write_indented(f, indent + 4)?;
                }
                if let Some(otherwise) = otherwise {
                    writeln!(f)?;
                    pad(f, indent)?;
                    writeln!(f, "else")?;
                    otherwise.write_indented(f, indent + 4)?;
                }
                writeln!(f)?;
                pad(f, indent)?;
                write!(f, "end")
            }
            Statement::Skip(_) => write!(f, "skip"),
            Statement::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl fmt::Display for ActorDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor {}(", self.name)?;
        write_list(f, &self.params)?;
        writeln!(f, ") in")?;
        for import in &self.imports {
            write!(f, "    import {}[", import.module)?;
            write_list(f, &import.members)?;
            writeln!(f, "]")?;
        }
        if !self.init.stmts.is_empty() {
            self.init.write_indented(f, 4)?;
            writeln!(f)?;
        }
        for (kind, clauses) in [("ask", &self.ask_clauses), ("tell", &self.tell_clauses)] {
            for clause in clauses {
                writeln!(f, "    handle {} {} in", kind, clause.pattern)?;
                clause.body.write_indented(f, 8)?;
                writeln!(f, "\n    end")?;
            }
        }
        write!(f, "end")
    }
}
