//! # strand-lang
//!
//! Surface syntax for strand programs and actors, lowered to the kernel
//! statements executed by `strand-kernel`.
//!
//! ## Example
//!
//! ```ignore
//! actor Greeter(greeting) in
//!     func greet(name) in greeting + ', ' + name end
//!     handle ask 'hello'#{'name': name} in
//!         greet(name)
//!     end
//! end
//! ```
//!
//! Pipeline: `lexer` (logos tokens) → `parser` (surface `ast`) →
//! `lower` (kernel `Stmt` / `ActorExpr`).

pub mod ast;
pub mod error;
pub mod lexer;
pub mod lower;
pub mod parser;

#[cfg(test)]
mod tests;

pub use ast::{ActorDecl, Block, Expr, Statement};
pub use error::{ErrorContext, LangError, Result};
pub use lexer::{tokenize, SpannedToken, Token};
pub use lower::{Lowerer, Program, RETURN_IDENT};

use strand_kernel::{ActorExpr, Stmt};
use strand_types::Ident;

/// A surface tree together with its lowered form
#[derive(Debug, Clone, PartialEq)]
pub struct Lowered<S, K> {
    pub surface: S,
    pub kernel: K,
}

/// Parse and lower a source holding one actor declaration
pub fn lower_actor(source: &str) -> Result<Lowered<ActorDecl, ActorExpr>> {
    let tokens = tokenize(source)?;
    let surface = parser::parse_actor(&tokens)?;
    let kernel = Lowerer::new().lower_actor(&surface)?;
    Ok(Lowered { surface, kernel })
}

/// Parse and lower a statement program
pub fn lower_program(source: &str) -> Result<Lowered<Block, Program>> {
    let tokens = tokenize(source)?;
    let surface = parser::parse_program(&tokens)?;
    let kernel = Lowerer::new().lower_program(&surface)?;
    Ok(Lowered { surface, kernel })
}

/// Parse and lower a block whose final expression is unified with `dest`
///
/// Used for module sources, which are a single value.
pub fn lower_value(source: &str, dest: &Ident) -> Result<Lowered<Block, Stmt>> {
    let tokens = tokenize(source)?;
    let surface = parser::parse_program(&tokens)?;
    let kernel = Lowerer::new().lower_value(&surface, dest)?;
    Ok(Lowered { surface, kernel })
}
