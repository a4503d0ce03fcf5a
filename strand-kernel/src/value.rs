//! Values manipulated by the kernel machine
//!
//! Three families of values live here:
//! - `Literal`: atoms (null, booleans, 32/64-bit integers, strings)
//! - `Value`: what a variable can be bound to inside one machine; records
//!   hold variables, so a `Value` is only meaningful next to its `VarStore`
//! - `Complete`: the variable-free form that may cross actor boundaries

use crate::env::Env;
use crate::kernel::Stmt;
use crate::store::VarId;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use strand_types::{Ident, Span};

/// An atomic value
///
/// Integers of different widths compare (and hash) by numeric value, so
/// `Int32(5) == Int64(5)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Str(Arc<str>),
}

impl Literal {
    pub fn str(s: impl AsRef<str>) -> Self {
        Literal::Str(Arc::from(s.as_ref()))
    }

    /// Widen an integer literal to 64 bits
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int32(i) => Some(*i as i64),
            Literal::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "Null",
            Literal::Bool(_) => "Bool",
            Literal::Int32(_) => "Int32",
            Literal::Int64(_) => "Int64",
            Literal::Str(_) => "Str",
        }
    }

    /// Ordering used by relational operators
    ///
    /// Mixed-width integers are widened before comparison. Returns `None`
    /// for operand types that have no ordering between them.
    pub fn partial_order(&self, other: &Literal) -> Option<Ordering> {
        match (self, other) {
            (Literal::Str(a), Literal::Str(b)) => Some(a.cmp(b)),
            _ => Some(self.as_i64()?.cmp(&other.as_i64()?)),
        }
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Null, Literal::Null) => true,
            (Literal::Bool(a), Literal::Bool(b)) => a == b,
            (Literal::Str(a), Literal::Str(b)) => a == b,
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Literal::Null => 0u8.hash(state),
            Literal::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Literal::Int32(_) | Literal::Int64(_) => {
                2u8.hash(state);
                self.as_i64().hash(state);
            }
            Literal::Str(s) => {
                3u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int32(i) => write!(f, "{}", i),
            Literal::Int64(i) => write!(f, "{}L", i),
            Literal::Str(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    match c {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "'")
            }
        }
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Int32(i)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int64(i)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::str(s)
    }
}

/// A reference to something that can receive messages
///
/// The kernel knows nothing about mailboxes; the actor runtime implements
/// this trait and recovers its concrete type through `as_any` when the
/// machine asks it to deliver a message.
pub trait ActorLink: Send + Sync + fmt::Debug {
    /// The normalized address of the target actor
    fn address(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

pub type ActorLinkRef = Arc<dyn ActorLink>;

/// A record whose fields are variables
///
/// The record is partial while any field variable is unbound.
#[derive(Debug, Clone)]
pub struct Record {
    pub label: Option<Literal>,
    pub fields: Vec<(Literal, VarId)>,
}

impl Record {
    pub fn get(&self, feature: &Literal) -> Option<VarId> {
        self.fields
            .iter()
            .find(|(f, _)| f == feature)
            .map(|(_, v)| *v)
    }

    /// True if both records have the same label and feature set
    pub fn same_shape(&self, other: &Record) -> bool {
        self.label == other.label
            && self.fields.len() == other.fields.len()
            && self.fields.iter().all(|(f, _)| other.get(f).is_some())
    }
}

/// A procedure value: parameters, body and the environment it closed over
#[derive(Debug)]
pub struct Closure {
    pub params: Vec<Ident>,
    pub body: Arc<Stmt>,
    pub env: Env,
    pub span: Span,
}

/// What a variable can be bound to
#[derive(Debug, Clone)]
pub enum Value {
    Lit(Literal),
    Rec(Record),
    Proc(Arc<Closure>),
    Actor(ActorLinkRef),
    /// An error carried as data; using it raises the error
    Failed(Arc<str>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Lit(l) => l.type_name(),
            Value::Rec(_) => "Record",
            Value::Proc(_) => "Proc",
            Value::Actor(_) => "Actor",
            Value::Failed(_) => "Failed",
        }
    }

    /// Short human readable description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Value::Lit(l) => l.to_string(),
            Value::Rec(r) => match &r.label {
                Some(label) => format!("record {}#{{{} fields}}", label, r.fields.len()),
                None => format!("record {{{} fields}}", r.fields.len()),
            },
            Value::Proc(p) => format!("proc/{}", p.params.len()),
            Value::Actor(a) => format!("<actor {}>", a.address()),
            Value::Failed(msg) => format!("<failed: {}>", msg),
        }
    }
}

impl From<Literal> for Value {
    fn from(l: Literal) -> Self {
        Value::Lit(l)
    }
}

/// A fully bound, variable-free value
///
/// Only complete values are exchanged between actors, stored in the module
/// table, or captured in actor configuration. Actor references serialize
/// as an error: they denote live objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Complete {
    Lit(Literal),
    Rec(CompleteRec),
    #[serde(skip)]
    Actor(ActorLinkRef),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRec {
    pub label: Option<Literal>,
    pub fields: Vec<(Literal, Complete)>,
}

impl CompleteRec {
    pub fn new(label: Option<Literal>) -> Self {
        Self {
            label,
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, feature: impl Into<Literal>, value: impl Into<Complete>) -> Self {
        self.insert(feature.into(), value.into());
        self
    }

    /// Insert or replace a field
    pub fn insert(&mut self, feature: Literal, value: Complete) {
        match self.fields.iter_mut().find(|(f, _)| *f == feature) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((feature, value)),
        }
    }

    pub fn get(&self, feature: &Literal) -> Option<&Complete> {
        self.fields.iter().find(|(f, _)| f == feature).map(|(_, v)| v)
    }

    pub fn label_str(&self) -> Option<&str> {
        self.label.as_ref().and_then(Literal::as_str)
    }
}

impl Complete {
    pub fn int(i: i32) -> Self {
        Complete::Lit(Literal::Int32(i))
    }

    pub fn long(i: i64) -> Self {
        Complete::Lit(Literal::Int64(i))
    }

    pub fn bool(b: bool) -> Self {
        Complete::Lit(Literal::Bool(b))
    }

    pub fn str(s: impl AsRef<str>) -> Self {
        Complete::Lit(Literal::str(s))
    }

    pub fn null() -> Self {
        Complete::Lit(Literal::Null)
    }

    pub fn record(label: impl Into<Literal>) -> CompleteRec {
        CompleteRec::new(Some(label.into()))
    }

    pub fn as_lit(&self) -> Option<&Literal> {
        match self {
            Complete::Lit(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_rec(&self) -> Option<&CompleteRec> {
        match self {
            Complete::Rec(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_lit().and_then(Literal::as_i64)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Complete::Failed(_))
    }
}

impl PartialEq for Complete {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Complete::Lit(a), Complete::Lit(b)) => a == b,
            (Complete::Rec(a), Complete::Rec(b)) => a == b,
            (Complete::Actor(a), Complete::Actor(b)) => a.address() == b.address(),
            (Complete::Failed(a), Complete::Failed(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Literal> for Complete {
    fn from(l: Literal) -> Self {
        Complete::Lit(l)
    }
}

impl From<CompleteRec> for Complete {
    fn from(r: CompleteRec) -> Self {
        Complete::Rec(r)
    }
}

impl From<i32> for Complete {
    fn from(i: i32) -> Self {
        Complete::int(i)
    }
}

impl From<i64> for Complete {
    fn from(i: i64) -> Self {
        Complete::long(i)
    }
}

impl From<bool> for Complete {
    fn from(b: bool) -> Self {
        Complete::bool(b)
    }
}

impl From<&str> for Complete {
    fn from(s: &str) -> Self {
        Complete::str(s)
    }
}

impl fmt::Display for CompleteRec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{}#", label)?;
        }
        write!(f, "{{")?;
        for (i, (feature, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", feature, value)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Complete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complete::Lit(l) => write!(f, "{}", l),
            Complete::Rec(r) => write!(f, "{}", r),
            Complete::Actor(a) => write!(f, "<actor {}>", a.address()),
            Complete::Failed(msg) => write!(f, "<failed: {}>", msg),
        }
    }
}
