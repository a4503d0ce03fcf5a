//! Single-assignment variable store and unification
//!
//! Variables live in an arena owned by one machine and are addressed by
//! `VarId`. A cell is either unbound (with the continuations waiting on
//! it), bound to a value, or linked to another variable of the same
//! equivalence class. Links are followed with path compression.

use crate::value::{Complete, CompleteRec, Record, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Pairs of class representatives currently being unified
type Seen = HashSet<(VarId, VarId)>;

/// Index of a variable cell in a `VarStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "_{}", self.0)
    }
}

#[derive(Debug)]
enum Cell<W> {
    Unbound(Vec<W>),
    Bound(Value),
    Link(VarId),
}

/// Two incompatible bindings were attempted on one equivalence class
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot unify {left} with {right}")]
pub struct UnifyError {
    pub left: String,
    pub right: String,
}

/// Result of trying to read a variable as a complete value
#[derive(Debug)]
pub enum Completion {
    Done(Complete),
    /// Some part is still unbound; wait on this variable and retry
    Pending(VarId),
    /// The value contains something that cannot leave the machine
    Unsendable(&'static str),
}

/// Arena of single-assignment variables
///
/// `W` is the type of the continuations parked on unbound variables.
/// Binding a variable returns its waiters in registration order; the
/// caller decides how to resume them.
#[derive(Debug)]
pub struct VarStore<W> {
    cells: Vec<Cell<W>>,
}

impl<W> Default for VarStore<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> VarStore<W> {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Number of cells ever allocated
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Allocate a fresh unbound variable
    pub fn fresh(&mut self) -> VarId {
        let id = VarId(self.cells.len() as u32);
        self.cells.push(Cell::Unbound(Vec::new()));
        id
    }

    /// Allocate a variable already bound to `value`
    pub fn fresh_bound(&mut self, value: Value) -> VarId {
        let id = VarId(self.cells.len() as u32);
        self.cells.push(Cell::Bound(value));
        id
    }

    /// Find the representative of `var`'s equivalence class
    pub fn resolve(&mut self, var: VarId) -> VarId {
        let mut root = var;
        while let Cell::Link(next) = &self.cells[root.index()] {
            root = *next;
        }

        let mut current = var;
        while let Cell::Link(next) = &self.cells[current.index()] {
            let next = *next;
            if next != root {
                self.cells[current.index()] = Cell::Link(root);
            }
            current = next;
        }

        root
    }

    /// The value bound to `var`, if any
    pub fn value(&mut self, var: VarId) -> Option<&Value> {
        let root = self.resolve(var);
        match &self.cells[root.index()] {
            Cell::Bound(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_bound(&mut self, var: VarId) -> bool {
        self.value(var).is_some()
    }

    /// Whether two variables belong to the same equivalence class
    pub fn same(&mut self, a: VarId, b: VarId) -> bool {
        self.resolve(a) == self.resolve(b)
    }

    /// Return the bound value, or park the waiter produced by `waiter`
    pub fn value_or_suspend(&mut self, var: VarId, waiter: impl FnOnce() -> W) -> Option<Value> {
        if let Some(value) = self.value(var) {
            return Some(value.clone());
        }
        let root = self.resolve(var);
        if let Cell::Unbound(waiters) = &mut self.cells[root.index()] {
            waiters.push(waiter());
        }
        None
    }

    /// Park `waiter` on an unbound variable
    ///
    /// Hands the waiter back if the variable turned out to be bound.
    pub fn suspend(&mut self, var: VarId, waiter: W) -> Result<(), W> {
        let root = self.resolve(var);
        match &mut self.cells[root.index()] {
            Cell::Unbound(waiters) => {
                waiters.push(waiter);
                Ok(())
            }
            _ => Err(waiter),
        }
    }

    /// Number of waiters parked on `var`'s class
    pub fn waiter_count(&mut self, var: VarId) -> usize {
        let root = self.resolve(var);
        match &self.cells[root.index()] {
            Cell::Unbound(waiters) => waiters.len(),
            _ => 0,
        }
    }

    /// Drop every parked waiter
    pub fn clear_waiters(&mut self) -> usize {
        let mut dropped = 0;
        for cell in &mut self.cells {
            if let Cell::Unbound(waiters) = cell {
                dropped += waiters.len();
                waiters.clear();
            }
        }
        dropped
    }

    /// Bind `var` to `value`
    ///
    /// Unbound: binds and returns the woken waiters. Bound to an equal
    /// value: no-op. Bound to a record of the same shape: unifies the
    /// fields. Anything else is a conflict, and a bound variable keeps
    /// its value.
    pub fn bind_value(&mut self, var: VarId, value: Value) -> Result<Vec<W>, UnifyError> {
        let mut woken = Vec::new();
        self.unify_value(var, value, &mut woken, &mut HashSet::new())?;
        Ok(woken)
    }

    /// Merge the equivalence classes of `a` and `b`
    pub fn bind_var(&mut self, a: VarId, b: VarId) -> Result<Vec<W>, UnifyError> {
        let mut woken = Vec::new();
        self.unify_vars(a, b, &mut woken, &mut HashSet::new())?;
        Ok(woken)
    }

    fn bound(&self, root: VarId) -> Option<Value> {
        match &self.cells[root.index()] {
            Cell::Bound(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn unify_value(&mut self, var: VarId, value: Value, woken: &mut Vec<W>, seen: &mut Seen) -> Result<(), UnifyError> {
        let root = self.resolve(var);
        match &mut self.cells[root.index()] {
            Cell::Unbound(waiters) => {
                woken.append(waiters);
                self.cells[root.index()] = Cell::Bound(value);
                Ok(())
            }
            Cell::Bound(existing) => {
                let existing = existing.clone();
                self.unify_values(&existing, &value, woken, seen)
            }
            Cell::Link(_) => unreachable!("resolve returned a linked cell"),
        }
    }

    fn unify_vars(&mut self, a: VarId, b: VarId, woken: &mut Vec<W>, seen: &mut Seen) -> Result<(), UnifyError> {
        let ra = self.resolve(a);
        let rb = self.resolve(b);
        if ra == rb {
            return Ok(());
        }

        // The older variable stays the representative; the younger one's
        // waiters queue up behind it.
        let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
        match (self.bound(keep), self.bound(merge)) {
            (Some(kept), Some(merged)) => {
                // A pair met again while unifying its own fields is cyclic
                if !seen.insert((keep, merge)) {
                    return Ok(());
                }
                self.unify_values(&kept, &merged, woken, seen)?;
                // Field unification may already have joined the classes
                let ra = self.resolve(keep);
                let rb = self.resolve(merge);
                if ra != rb {
                    let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
                    self.cells[merge.index()] = Cell::Link(keep);
                }
                Ok(())
            }
            (None, Some(merged)) => {
                self.cells[merge.index()] = Cell::Link(keep);
                self.unify_value(keep, merged, woken, seen)
            }
            (Some(_), None) => {
                if let Cell::Unbound(mut waiters) = std::mem::replace(&mut self.cells[merge.index()], Cell::Link(keep)) {
                    woken.append(&mut waiters);
                }
                Ok(())
            }
            (None, None) => {
                if let Cell::Unbound(mut waiters) = std::mem::replace(&mut self.cells[merge.index()], Cell::Link(keep)) {
                    if let Cell::Unbound(kept) = &mut self.cells[keep.index()] {
                        kept.append(&mut waiters);
                    }
                }
                Ok(())
            }
        }
    }

    fn unify_values(&mut self, left: &Value, right: &Value, woken: &mut Vec<W>, seen: &mut Seen) -> Result<(), UnifyError> {
        match (left, right) {
            (Value::Lit(a), Value::Lit(b)) if a == b => Ok(()),
            (Value::Rec(a), Value::Rec(b)) if a.same_shape(b) => {
                for (feature, var) in &a.fields {
                    if let Some(other) = b.get(feature) {
                        self.unify_vars(*var, other, woken, seen)?;
                    }
                }
                Ok(())
            }
            (Value::Proc(a), Value::Proc(b)) if Arc::ptr_eq(a, b) => Ok(()),
            (Value::Actor(a), Value::Actor(b)) if a.address() == b.address() => Ok(()),
            (Value::Failed(a), Value::Failed(b)) if a == b => Ok(()),
            _ => Err(UnifyError {
                left: left.describe(),
                right: right.describe(),
            }),
        }
    }

    /// Read `var` as a complete value
    ///
    /// A record that contains itself is reported as unsendable.
    pub fn complete(&mut self, var: VarId) -> Completion {
        self.complete_within(var, &mut Vec::new())
    }

    fn complete_within(&mut self, var: VarId, enclosing: &mut Vec<VarId>) -> Completion {
        let root = self.resolve(var);
        let Some(value) = self.bound(root) else {
            return Completion::Pending(root);
        };
        match value {
            Value::Lit(l) => Completion::Done(Complete::Lit(l)),
            Value::Actor(a) => Completion::Done(Complete::Actor(a)),
            Value::Failed(msg) => Completion::Done(Complete::Failed(msg.to_string())),
            Value::Proc(_) => Completion::Unsendable("Proc"),
            Value::Rec(rec) => {
                if enclosing.contains(&root) {
                    return Completion::Unsendable("cyclic record");
                }
                enclosing.push(root);
                let mut out = CompleteRec::new(rec.label.clone());
                let mut result = None;
                for (feature, field) in rec.fields {
                    match self.complete_within(field, enclosing) {
                        Completion::Done(c) => out.fields.push((feature, c)),
                        other => {
                            result = Some(other);
                            break;
                        }
                    }
                }
                enclosing.pop();
                result.unwrap_or(Completion::Done(Complete::Rec(out)))
            }
        }
    }

    /// Cells that reach outside the first `mark` cells
    ///
    /// A cell below the mark escapes if it links above the mark, is bound
    /// to a record with a field above it, or to a procedure whose
    /// environment holds a variable above it.
    pub fn escapes(&self, mark: usize) -> bool {
        let above = |var: VarId| var.index() >= mark;
        self.cells.iter().take(mark).any(|cell| match cell {
            Cell::Link(target) => above(*target),
            Cell::Bound(Value::Rec(rec)) => rec.fields.iter().any(|(_, var)| above(*var)),
            Cell::Bound(Value::Proc(closure)) => closure.env.vars().any(above),
            _ => false,
        })
    }

    /// Drop every cell allocated after `mark`
    ///
    /// Refuses (and returns false) while a cell below the mark still
    /// refers to one of them.
    pub fn release(&mut self, mark: usize) -> bool {
        if mark >= self.cells.len() {
            return true;
        }
        if self.escapes(mark) {
            return false;
        }
        self.cells.truncate(mark);
        true
    }

    /// Materialize a complete value as a fresh bound variable
    pub fn alloc_complete(&mut self, complete: &Complete) -> VarId {
        let value = self.complete_to_value(complete);
        self.fresh_bound(value)
    }

    /// Convert a complete value into a store value, allocating field cells
    pub fn complete_to_value(&mut self, complete: &Complete) -> Value {
        match complete {
            Complete::Lit(l) => Value::Lit(l.clone()),
            Complete::Actor(a) => Value::Actor(a.clone()),
            Complete::Failed(msg) => Value::Failed(Arc::from(msg.as_str())),
            Complete::Rec(rec) => {
                let fields = rec
                    .fields
                    .iter()
                    .map(|(feature, value)| (feature.clone(), self.alloc_complete(value)))
                    .collect();
                Value::Rec(Record {
                    label: rec.label.clone(),
                    fields,
                })
            }
        }
    }

    /// Unify `var` with a complete value
    pub fn bind_complete(&mut self, var: VarId, complete: &Complete) -> Result<Vec<W>, UnifyError> {
        let value = self.complete_to_value(complete);
        self.bind_value(var, value)
    }
}
