//! Kernel instruction set
//!
//! The lowering step turns surface programs into this small statement
//! language. Statements are immutable and shared (`Arc`) between every
//! machine that runs them; `Display` renders the canonical lowered form.

use crate::value::Literal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strand_types::{Ident, Span};

/// Identifier bound to the incoming message inside a handler
pub const MESSAGE_IDENT: &str = "$m";

/// Identifier bound to the reply of an ask handler
pub const REPLY_IDENT: &str = "$r";

/// An identifier or an inline literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Ident(Ident),
    Lit(Literal),
}

impl Operand {
    pub fn ident(name: &str) -> Self {
        Operand::Ident(Ident::new(name))
    }

    pub fn lit(l: impl Into<Literal>) -> Self {
        Operand::Lit(l.into())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Ident(i) => write!(f, "{}", i),
            Operand::Lit(l) => write!(f, "{}", l),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl RelOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
        }
    }

    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            RelOp::Lt => ordering == Less,
            RelOp::Le => ordering != Greater,
            RelOp::Gt => ordering == Greater,
            RelOp::Ge => ordering != Less,
            RelOp::Eq => ordering == Equal,
            RelOp::Ne => ordering != Equal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

/// Field pattern inside a record pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldPattern {
    Capture(Ident),
    Lit(Literal),
}

/// One-level pattern used by `case`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Lit(Literal),
    Rec {
        label: Option<Literal>,
        fields: Vec<(Literal, FieldPattern)>,
    },
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Lit(l) => write!(f, "{}", l),
            Pattern::Rec { label, fields } => {
                if let Some(label) = label {
                    write!(f, "{}#", label)?;
                }
                write!(f, "{{")?;
                for (i, (feature, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match field {
                        FieldPattern::Capture(id) => write!(f, "{}: {}", feature, id)?,
                        FieldPattern::Lit(l) => write!(f, "{}: {}", feature, l)?,
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

/// A kernel statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Seq(Vec<Arc<Stmt>>),
    Skip(Span),
    /// Introduce fresh variables for the body only
    Local {
        idents: Vec<Ident>,
        body: Arc<Stmt>,
        span: Span,
    },
    /// `x = y` or `x = literal`
    Bind {
        target: Ident,
        value: Operand,
        span: Span,
    },
    /// `x = a < b`
    Rel {
        target: Ident,
        op: RelOp,
        lhs: Operand,
        rhs: Operand,
        span: Span,
    },
    /// `x = a + b`
    Arith {
        target: Ident,
        op: ArithOp,
        lhs: Operand,
        rhs: Operand,
        span: Span,
    },
    /// `x = 'label'#{'f': y}`
    Record {
        target: Ident,
        label: Option<Literal>,
        fields: Vec<(Literal, Operand)>,
        span: Span,
    },
    /// `x = r['f']`
    Select {
        target: Ident,
        record: Operand,
        feature: Operand,
        span: Span,
    },
    If {
        guard: Operand,
        then_branch: Arc<Stmt>,
        else_branch: Option<Arc<Stmt>>,
        span: Span,
    },
    Case {
        arg: Ident,
        pattern: Pattern,
        body: Arc<Stmt>,
        otherwise: Option<Arc<Stmt>>,
        span: Span,
    },
    /// `x = proc (a, b) in ... end`
    Proc {
        target: Ident,
        params: Vec<Ident>,
        body: Arc<Stmt>,
        span: Span,
    },
    /// `f(a, b)`
    Apply {
        callee: Operand,
        args: Vec<Operand>,
        span: Span,
    },
    /// Fire-and-forget send
    Tell {
        actor: Operand,
        message: Operand,
        span: Span,
    },
    /// Request-reply send; `target` is the reply variable
    Ask {
        target: Ident,
        actor: Operand,
        message: Operand,
        span: Span,
    },
    /// Intermediate element of a streamed ask reply
    Emit { value: Operand, span: Span },
    /// Final ask reply (end of stream)
    Respond { value: Operand, span: Span },
    /// No handler pattern matched the message
    Unhandled { message: Ident, span: Span },
}

impl Stmt {
    pub fn seq(stmts: Vec<Stmt>) -> Stmt {
        let mut flat = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::Seq(inner) => flat.extend(inner),
                other => flat.push(Arc::new(other)),
            }
        }
        if flat.len() == 1 {
            return Arc::try_unwrap(flat.remove(0)).unwrap_or_else(|arc| (*arc).clone());
        }
        Stmt::Seq(flat)
    }

    pub fn span(&self) -> Span {
        match self {
            Stmt::Seq(stmts) => match (stmts.first(), stmts.last()) {
                (Some(first), Some(last)) => first.span().merge(last.span()),
                _ => Span::default(),
            },
            Stmt::Skip(span) => *span,
            Stmt::Local { span, .. }
            | Stmt::Bind { span, .. }
            | Stmt::Rel { span, .. }
            | Stmt::Arith { span, .. }
            | Stmt::Record { span, .. }
            | Stmt::Select { span, .. }
            | Stmt::If { span, .. }
            | Stmt::Case { span, .. }
            | Stmt::Proc { span, .. }
            | Stmt::Apply { span, .. }
            | Stmt::Tell { span, .. }
            | Stmt::Ask { span, .. }
            | Stmt::Emit { span, .. }
            | Stmt::Respond { span, .. }
            | Stmt::Unhandled { span, .. } => *span,
        }
    }

    /// Statement kind, used for tracing
    pub fn kind(&self) -> &'static str {
        match self {
            Stmt::Seq(_) => "seq",
            Stmt::Skip(_) => "skip",
            Stmt::Local { .. } => "local",
            Stmt::Bind { .. } => "bind",
            Stmt::Rel { .. } => "rel",
            Stmt::Arith { .. } => "arith",
            Stmt::Record { .. } => "record",
            Stmt::Select { .. } => "select",
            Stmt::If { .. } => "if",
            Stmt::Case { .. } => "case",
            Stmt::Proc { .. } => "proc",
            Stmt::Apply { .. } => "apply",
            Stmt::Tell { .. } => "tell",
            Stmt::Ask { .. } => "ask",
            Stmt::Emit { .. } => "emit",
            Stmt::Respond { .. } => "respond",
            Stmt::Unhandled { .. } => "unhandled",
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent);
        match self {
            Stmt::Seq(stmts) => {
                for (i, stmt) in stmts.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    stmt.write_indented(f, indent)?;
                }
                Ok(())
            }
            Stmt::Skip(_) => write!(f, "{}skip", pad),
            Stmt::Local { idents, body, .. } => {
                write!(f, "{}local ", pad)?;
                write_list(f, idents)?;
                writeln!(f, " in")?;
                body.write_indented(f, indent + 4)?;
                write!(f, "\n{}end", pad)
            }
            Stmt::Bind { target, value, .. } => write!(f, "{}{} = {}", pad, target, value),
            Stmt::Rel {
                target, op, lhs, rhs, ..
            } => write!(f, "{}{} = {} {} {}", pad, target, lhs, op.symbol(), rhs),
            Stmt::Arith {
                target, op, lhs, rhs, ..
            } => write!(f, "{}{} = {} {} {}", pad, target, lhs, op.symbol(), rhs),
            Stmt::Record {
                target,
                label,
                fields,
                ..
            } => {
                write!(f, "{}{} = ", pad, target)?;
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
            Stmt::Select {
                target,
                record,
                feature,
                ..
            } => write!(f, "{}{} = {}[{}]", pad, target, record, feature),
            Stmt::If {
                guard,
                then_branch,
                else_branch,
                ..
            } => {
                writeln!(f, "{}if {} then", pad, guard)?;
                then_branch.write_indented(f, indent + 4)?;
                if let Some(else_branch) = else_branch {
                    writeln!(f, "\n{}else", pad)?;
                    else_branch.write_indented(f, indent + 4)?;
                }
                write!(f, "\n{}end", pad)
            }
            Stmt::Case {
                arg,
                pattern,
                body,
                otherwise,
                ..
            } => {
                writeln!(f, "{}case {} of {} then", pad, arg, pattern)?;
                body.write_indented(f, indent + 4)?;
                if let Some(otherwise) = otherwise {
                    writeln!(f, "\n{}else", pad)?;
                    otherwise.write_indented(f, indent + 4)?;
                }
                write!(f, "\n{}end", pad)
            }
            Stmt::Proc {
                target,
                params,
                body,
                ..
            } => {
                write!(f, "{}{} = proc (", pad, target)?;
                write_list(f, params)?;
                writeln!(f, ") in")?;
                body.write_indented(f, indent + 4)?;
                write!(f, "\n{}end", pad)
            }
            Stmt::Apply { callee, args, .. } => {
                write!(f, "{}{}(", pad, callee)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Stmt::Tell { actor, message, .. } => write!(f, "{}{}.tell({})", pad, actor, message),
            Stmt::Ask {
                target,
                actor,
                message,
                ..
            } => write!(f, "{}{} = {}.ask({})", pad, target, actor, message),
            Stmt::Emit { value, .. } => write!(f, "{}emit {}", pad, value),
            Stmt::Respond { value, .. } => write!(f, "{}respond {}", pad, value),
            Stmt::Unhandled { message, .. } => write!(f, "{}unhandled {}", pad, message),
        }
    }
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

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// `import a.b[X, Y]`: bind members of a module record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub module: String,
    pub members: Vec<Ident>,
    pub span: Span,
}

/// A lowered actor definition
///
/// `init` runs once when the actor starts, in an environment holding the
/// parameters, the imported members and the `state` identifiers it
/// declares. Handlers run once per message in that same environment,
/// extended with `$m` bound to the message (and `$r` to the reply for
/// asks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorExpr {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub imports: Vec<Import>,
    pub state: Vec<Ident>,
    pub init: Arc<Stmt>,
    pub ask_handler: Option<Arc<Stmt>>,
    pub tell_handler: Option<Arc<Stmt>>,
    pub span: Span,
}

impl fmt::Display for ActorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor {}(", self.name)?;
        write_list(f, &self.params)?;
        writeln!(f, ") in")?;
        for import in &self.imports {
            write!(f, "    import {}[", import.module)?;
            write_list(f, &import.members)?;
            writeln!(f, "]")?;
        }
        if !self.state.is_empty() {
            write!(f, "    var ")?;
            write_list(f, &self.state)?;
            writeln!(f)?;
        }
        if !matches!(self.init.as_ref(), Stmt::Skip(_)) {
            self.init.write_indented(f, 4)?;
            writeln!(f)?;
        }
        if let Some(handler) = &self.ask_handler {
            writeln!(f, "    handle ask {} in", MESSAGE_IDENT)?;
            handler.write_indented(f, 8)?;
            writeln!(f, "\n    end")?;
        }
        if let Some(handler) = &self.tell_handler {
            writeln!(f, "    handle tell {} in", MESSAGE_IDENT)?;
            handler.write_indented(f, 8)?;
            writeln!(f, "\n    end")?;
        }
        write!(f, "end")
    }
}
