//! strand-kernel: the dataflow kernel machine
//!
//! - `store`: single-assignment variables, unification, waiter lists
//! - `kernel`: the lowered statement set
//! - `machine`: continuation-based evaluator over kernel statements
//!
//! Everything here is single-threaded; the actor runtime gives every
//! actor its own `Machine`.

pub mod env;
pub mod error;
pub mod kernel;
pub mod machine;
pub mod ops;
pub mod store;
pub mod value;

pub use env::Env;
pub use error::{KernelError, Result};
pub use kernel::{
    ActorExpr, ArithOp, FieldPattern, Import, Operand, Pattern, RelOp, Stmt, MESSAGE_IDENT, REPLY_IDENT,
};
pub use machine::{ActorHost, Detached, Machine, RunState, Task};
pub use store::{Completion, UnifyError, VarId, VarStore};
pub use strand_types::{Ident, Span};
pub use value::{ActorLink, ActorLinkRef, Closure, Complete, CompleteRec, Literal, Record, Value};
