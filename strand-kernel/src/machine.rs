//! Continuation-based evaluator for kernel statements
//!
//! A `Machine` owns one variable store and a ready queue of tasks. Each
//! task is an explicit stack of `(statement, environment)` frames. Reading
//! an unbound variable never blocks a thread: the task pushes its current
//! frame back, parks itself on the variable's waiter list, and is moved
//! back to the ready queue when the variable gets bound.

use crate::env::Env;
use crate::error::{KernelError, Result};
use crate::kernel::{FieldPattern, Operand, Pattern, Stmt};
use crate::ops;
use crate::store::{Completion, UnifyError, VarId, VarStore};
use crate::value::{ActorLink, ActorLinkRef, Closure, Complete, Literal, Record, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use strand_types::{Ident, Span};

/// Services the machine needs from whoever runs it
///
/// The actor runtime implements this to route sends through mailboxes.
/// Errors are plain messages; the machine wraps them with the span of the
/// statement that caused them.
pub trait ActorHost {
    /// Whether `target` is the actor running this machine
    fn is_self(&self, target: &dyn ActorLink) -> bool;

    fn tell(&mut self, target: &ActorLinkRef, message: Complete) -> std::result::Result<(), String>;

    /// Send a request; the reply must eventually be bound to `reply`
    fn ask(
        &mut self,
        target: &ActorLinkRef,
        message: Complete,
        reply: VarId,
    ) -> std::result::Result<(), String>;

    /// Reply to the ask currently being handled
    fn respond(&mut self, value: Complete, end_of_stream: bool) -> std::result::Result<(), String>;
}

/// Host for code that runs outside any actor (plain programs, modules)
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl ActorHost for Detached {
    fn is_self(&self, _target: &dyn ActorLink) -> bool {
        false
    }

    fn tell(&mut self, target: &ActorLinkRef, _message: Complete) -> std::result::Result<(), String> {
        Err(format!("cannot tell {} outside an actor", target.address()))
    }

    fn ask(
        &mut self,
        target: &ActorLinkRef,
        _message: Complete,
        _reply: VarId,
    ) -> std::result::Result<(), String> {
        Err(format!("cannot ask {} outside an actor", target.address()))
    }

    fn respond(&mut self, _value: Complete, _end_of_stream: bool) -> std::result::Result<(), String> {
        Err("no request to respond to".to_string())
    }
}

#[derive(Debug, Clone)]
struct Frame {
    stmt: Arc<Stmt>,
    env: Env,
}

/// A suspended or runnable thread of evaluation
#[derive(Debug)]
pub struct Task {
    stack: Vec<Frame>,
}

/// Outcome of `Machine::run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing left to do
    Idle,
    /// Every remaining task is parked on an unbound variable
    Waiting,
}

enum Step {
    Next,
    Wait(VarId),
}

enum Fetch<T> {
    Ready(T),
    Wait(VarId),
}

enum Match {
    Bind(Vec<(Ident, VarId)>),
    Fail,
    Wait(VarId),
}

/// Unwrap a `Fetch`, returning `Step::Wait` from the caller if the value
/// is not available yet
macro_rules! ready {
    ($fetch:expr) => {
        match $fetch? {
            Fetch::Ready(value) => value,
            Fetch::Wait(var) => return Ok(Step::Wait(var)),
        }
    };
}

#[derive(Debug, Default)]
pub struct Machine {
    store: VarStore<Task>,
    ready: VecDeque<Task>,
    parked: usize,
    steps: u64,
    trace: bool,
}

fn conflict(err: UnifyError, span: Span) -> KernelError {
    KernelError::UnificationConflict {
        span,
        left: err.left,
        right: err.right,
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every dispatched statement at trace level
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn store(&mut self) -> &mut VarStore<Task> {
        &mut self.store
    }

    pub fn fresh_var(&mut self) -> VarId {
        self.store.fresh()
    }

    /// Total number of statements dispatched so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Number of tasks parked on unbound variables
    pub fn parked(&self) -> usize {
        self.parked
    }

    pub fn is_waiting(&self) -> bool {
        self.parked > 0
    }

    /// Number of variable cells allocated so far
    pub fn mark(&self) -> usize {
        self.store.len()
    }

    /// Free the cells allocated since `mark`
    ///
    /// Only possible once no task is queued or parked and no older cell
    /// refers to a newer one; returns false and keeps the cells otherwise.
    pub fn release(&mut self, mark: usize) -> bool {
        if !self.ready.is_empty() || self.parked > 0 {
            return false;
        }
        self.store.release(mark)
    }

    /// Bind fresh variables for `idents` on top of `env`
    pub fn declare(&mut self, env: &Env, idents: &[Ident]) -> Env {
        let bindings = idents
            .iter()
            .map(|ident| (ident.clone(), self.store.fresh()))
            .collect();
        env.extend(bindings)
    }

    /// Queue a new task executing `stmt` in `env`
    pub fn spawn(&mut self, stmt: Arc<Stmt>, env: Env) {
        self.ready.push_back(Task {
            stack: vec![Frame { stmt, env }],
        });
    }

    pub fn value(&mut self, var: VarId) -> Option<Value> {
        self.store.value(var).cloned()
    }

    /// Read `var` as a complete value
    pub fn complete(&mut self, var: VarId) -> Completion {
        self.store.complete(var)
    }

    /// Bind `var` to a complete value, waking its waiters
    pub fn bind_complete(&mut self, var: VarId, value: &Complete) -> std::result::Result<(), UnifyError> {
        let woken = self.store.bind_complete(var, value)?;
        self.wake(woken);
        Ok(())
    }

    pub fn bind_value(&mut self, var: VarId, value: Value) -> std::result::Result<(), UnifyError> {
        let woken = self.store.bind_value(var, value)?;
        self.wake(woken);
        Ok(())
    }

    /// Drop every pending task
    ///
    /// Used after an error: the variable store is kept (bindings are
    /// permanent) but nothing that was in flight will resume.
    pub fn reset(&mut self) {
        let dropped = self.ready.len() + self.store.clear_waiters();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded pending tasks");
        }
        self.ready.clear();
        self.parked = 0;
    }

    /// Run ready tasks until none is left
    ///
    /// On error the failing task is dropped; the caller is expected to
    /// `reset` before reusing the machine.
    pub fn run(&mut self, host: &mut dyn ActorHost) -> Result<RunState> {
        while let Some(mut task) = self.ready.pop_front() {
            while let Some(frame) = task.stack.pop() {
                self.steps += 1;
                if self.trace {
                    tracing::trace!(kind = frame.stmt.kind(), span = %frame.stmt.span(), "step");
                }
                match self.step(&frame, &mut task, host)? {
                    Step::Next => {}
                    Step::Wait(var) => {
                        task.stack.push(frame);
                        self.park(var, task);
                        break;
                    }
                }
            }
        }

        Ok(if self.parked > 0 {
            RunState::Waiting
        } else {
            RunState::Idle
        })
    }

    /// Run `stmt` to completion with no actor context
    pub fn execute(&mut self, stmt: Arc<Stmt>, env: Env) -> Result<RunState> {
        self.spawn(stmt, env);
        self.run(&mut Detached)
    }

    fn park(&mut self, var: VarId, task: Task) {
        match self.store.suspend(var, task) {
            Ok(()) => self.parked += 1,
            // Bound between the check and the suspend: retry immediately.
            Err(task) => self.ready.push_back(task),
        }
    }

    fn wake(&mut self, woken: Vec<Task>) {
        self.parked = self.parked.saturating_sub(woken.len());
        self.ready.extend(woken);
    }

    fn lookup(&self, env: &Env, ident: &Ident, span: Span) -> Result<VarId> {
        env.get(ident).ok_or_else(|| KernelError::UnboundIdentifier {
            span,
            name: ident.to_string(),
        })
    }

    fn operand_var(&mut self, env: &Env, operand: &Operand, span: Span) -> Result<VarId> {
        match operand {
            Operand::Ident(ident) => self.lookup(env, ident, span),
            Operand::Lit(lit) => Ok(self.store.fresh_bound(Value::Lit(lit.clone()))),
        }
    }

    fn fetch_var(&mut self, var: VarId, span: Span) -> Result<Fetch<Value>> {
        match self.store.value(var).cloned() {
            Some(Value::Failed(message)) => Err(KernelError::FailedValue {
                span,
                message: message.to_string(),
            }),
            Some(value) => Ok(Fetch::Ready(value)),
            None => Ok(Fetch::Wait(self.store.resolve(var))),
        }
    }

    fn fetch(&mut self, env: &Env, operand: &Operand, span: Span) -> Result<Fetch<Value>> {
        match operand {
            Operand::Lit(lit) => Ok(Fetch::Ready(Value::Lit(lit.clone()))),
            Operand::Ident(ident) => {
                let var = self.lookup(env, ident, span)?;
                self.fetch_var(var, span)
            }
        }
    }

    fn fetch_complete(&mut self, env: &Env, operand: &Operand, span: Span) -> Result<Fetch<Complete>> {
        let var = match operand {
            Operand::Lit(lit) => return Ok(Fetch::Ready(Complete::Lit(lit.clone()))),
            Operand::Ident(ident) => self.lookup(env, ident, span)?,
        };
        match self.store.complete(var) {
            Completion::Done(value) => Ok(Fetch::Ready(value)),
            Completion::Pending(var) => Ok(Fetch::Wait(var)),
            Completion::Unsendable(kind) => Err(KernelError::type_mismatch(span, "complete value", kind)),
        }
    }

    fn fetch_actor(&mut self, env: &Env, operand: &Operand, span: Span) -> Result<Fetch<ActorLinkRef>> {
        Ok(match self.fetch(env, operand, span)? {
            Fetch::Ready(Value::Actor(link)) => Fetch::Ready(link),
            Fetch::Ready(other) => return Err(KernelError::type_mismatch(span, "Actor", other.type_name())),
            Fetch::Wait(var) => Fetch::Wait(var),
        })
    }

    fn bind_ident(&mut self, env: &Env, target: &Ident, value: Value, span: Span) -> Result<()> {
        let var = self.lookup(env, target, span)?;
        self.bind_value(var, value).map_err(|err| conflict(err, span))
    }

    fn link_ident(&mut self, env: &Env, target: &Ident, other: VarId, span: Span) -> Result<()> {
        let var = self.lookup(env, target, span)?;
        let woken = self.store.bind_var(var, other).map_err(|err| conflict(err, span))?;
        self.wake(woken);
        Ok(())
    }

    fn step(&mut self, frame: &Frame, task: &mut Task, host: &mut dyn ActorHost) -> Result<Step> {
        let env = &frame.env;
        match frame.stmt.as_ref() {
            Stmt::Seq(stmts) => {
                for stmt in stmts.iter().rev() {
                    task.stack.push(Frame {
                        stmt: stmt.clone(),
                        env: env.clone(),
                    });
                }
            }

            Stmt::Skip(_) => {}

            Stmt::Local { idents, body, .. } => {
                let env = self.declare(env, idents);
                task.stack.push(Frame {
                    stmt: body.clone(),
                    env,
                });
            }

            Stmt::Bind { target, value, span } => match value {
                Operand::Ident(source) => {
                    let source = self.lookup(env, source, *span)?;
                    self.link_ident(env, target, source, *span)?;
                }
                Operand::Lit(lit) => self.bind_ident(env, target, Value::Lit(lit.clone()), *span)?,
            },

            Stmt::Rel {
                target,
                op,
                lhs,
                rhs,
                span,
            } => {
                let lhs = ready!(self.fetch(env, lhs, *span));
                let rhs = ready!(self.fetch(env, rhs, *span));
                let holds = ops::relate(*op, &lhs, &rhs, *span)?;
                self.bind_ident(env, target, Value::Lit(Literal::Bool(holds)), *span)?;
            }

            Stmt::Arith {
                target,
                op,
                lhs,
                rhs,
                span,
            } => {
                let lhs = ready!(self.fetch(env, lhs, *span));
                let rhs = ready!(self.fetch(env, rhs, *span));
                let result = ops::arith(*op, &lhs, &rhs, *span)?;
                self.bind_ident(env, target, Value::Lit(result), *span)?;
            }

            Stmt::Record {
                target,
                label,
                fields,
                span,
            } => {
                for (i, (feature, _)) in fields.iter().enumerate() {
                    if fields[..i].iter().any(|(seen, _)| seen == feature) {
                        return Err(KernelError::DuplicateFeature {
                            span: *span,
                            feature: feature.to_string(),
                        });
                    }
                }
                let fields = fields
                    .iter()
                    .map(|(feature, operand)| Ok((feature.clone(), self.operand_var(env, operand, *span)?)))
                    .collect::<Result<Vec<_>>>()?;
                let record = Record {
                    label: label.clone(),
                    fields,
                };
                self.bind_ident(env, target, Value::Rec(record), *span)?;
            }

            Stmt::Select {
                target,
                record,
                feature,
                span,
            } => {
                let record = match ready!(self.fetch(env, record, *span)) {
                    Value::Rec(record) => record,
                    other => return Err(KernelError::type_mismatch(*span, "Record", other.type_name())),
                };
                let feature = match ready!(self.fetch(env, feature, *span)) {
                    Value::Lit(lit) => lit,
                    other => return Err(KernelError::type_mismatch(*span, "feature literal", other.type_name())),
                };
                let field = record.get(&feature).ok_or_else(|| KernelError::MissingFeature {
                    span: *span,
                    feature: feature.to_string(),
                })?;
                self.link_ident(env, target, field, *span)?;
            }

            Stmt::If {
                guard,
                then_branch,
                else_branch,
                span,
            } => {
                let branch = match ready!(self.fetch(env, guard, *span)) {
                    Value::Lit(Literal::Bool(true)) => Some(then_branch),
                    Value::Lit(Literal::Bool(false)) => else_branch.as_ref(),
                    other => return Err(KernelError::type_mismatch(*span, "Bool", other.type_name())),
                };
                if let Some(branch) = branch {
                    task.stack.push(Frame {
                        stmt: branch.clone(),
                        env: env.clone(),
                    });
                }
            }

            Stmt::Case {
                arg,
                pattern,
                body,
                otherwise,
                span,
            } => {
                let var = self.lookup(env, arg, *span)?;
                let value = ready!(self.fetch_var(var, *span));
                match self.match_pattern(&value, pattern) {
                    Match::Wait(var) => return Ok(Step::Wait(var)),
                    Match::Bind(bindings) => task.stack.push(Frame {
                        stmt: body.clone(),
                        env: env.extend(bindings),
                    }),
                    Match::Fail => {
                        if let Some(otherwise) = otherwise {
                            task.stack.push(Frame {
                                stmt: otherwise.clone(),
                                env: env.clone(),
                            });
                        }
                    }
                }
            }

            Stmt::Proc {
                target,
                params,
                body,
                span,
            } => {
                let closure = Closure {
                    params: params.clone(),
                    body: body.clone(),
                    env: env.clone(),
                    span: *span,
                };
                self.bind_ident(env, target, Value::Proc(Arc::new(closure)), *span)?;
            }

            Stmt::Apply { callee, args, span } => {
                let closure = match ready!(self.fetch(env, callee, *span)) {
                    Value::Proc(closure) => closure,
                    other => return Err(KernelError::type_mismatch(*span, "Proc", other.type_name())),
                };
                if closure.params.len() != args.len() {
                    return Err(KernelError::ArityMismatch {
                        span: *span,
                        expected: closure.params.len(),
                        got: args.len(),
                    });
                }
                let bindings = closure
                    .params
                    .iter()
                    .zip(args)
                    .map(|(param, arg)| Ok((param.clone(), self.operand_var(env, arg, *span)?)))
                    .collect::<Result<Vec<_>>>()?;
                task.stack.push(Frame {
                    stmt: closure.body.clone(),
                    env: closure.env.extend(bindings),
                });
            }

            Stmt::Tell { actor, message, span } => {
                let target = ready!(self.fetch_actor(env, actor, *span));
                let message = ready!(self.fetch_complete(env, message, *span));
                host.tell(&target, message)
                    .map_err(|message| KernelError::Host { span: *span, message })?;
            }

            Stmt::Ask {
                target,
                actor,
                message,
                span,
            } => {
                let actor = ready!(self.fetch_actor(env, actor, *span));
                if host.is_self(actor.as_ref()) {
                    return Err(KernelError::SelfAsk {
                        span: *span,
                        address: actor.address(),
                    });
                }
                let message = ready!(self.fetch_complete(env, message, *span));
                let reply = self.lookup(env, target, *span)?;
                host.ask(&actor, message, reply)
                    .map_err(|message| KernelError::Host { span: *span, message })?;
            }

            Stmt::Emit { value, span } => {
                let value = ready!(self.fetch_complete(env, value, *span));
                host.respond(value, false)
                    .map_err(|message| KernelError::Host { span: *span, message })?;
            }

            Stmt::Respond { value, span } => {
                let value = ready!(self.fetch_complete(env, value, *span));
                host.respond(value, true)
                    .map_err(|message| KernelError::Host { span: *span, message })?;
            }

            Stmt::Unhandled { message, span } => {
                let var = self.lookup(env, message, *span)?;
                let message = match self.store.complete(var) {
                    Completion::Done(value) => value.to_string(),
                    _ => self
                        .store
                        .value(var)
                        .map(Value::describe)
                        .unwrap_or_else(|| var.to_string()),
                };
                return Err(KernelError::Unhandled { span: *span, message });
            }
        }

        Ok(Step::Next)
    }

    fn match_pattern(&mut self, value: &Value, pattern: &Pattern) -> Match {
        match (pattern, value) {
            (Pattern::Lit(expected), Value::Lit(actual)) => {
                if expected == actual {
                    Match::Bind(Vec::new())
                } else {
                    Match::Fail
                }
            }
            (Pattern::Rec { label, fields }, Value::Rec(record)) => {
                if record.label != *label || record.fields.len() != fields.len() {
                    return Match::Fail;
                }
                let mut bindings = Vec::new();
                for (feature, field) in fields {
                    let Some(var) = record.get(feature) else {
                        return Match::Fail;
                    };
                    match field {
                        FieldPattern::Capture(ident) => bindings.push((ident.clone(), var)),
                        FieldPattern::Lit(expected) => match self.store.value(var).cloned() {
                            Some(Value::Lit(actual)) if actual == *expected => {}
                            Some(_) => return Match::Fail,
                            None => return Match::Wait(self.store.resolve(var)),
                        },
                    }
                }
                Match::Bind(bindings)
            }
            _ => Match::Fail,
        }
    }
}
