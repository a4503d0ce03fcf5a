//! Immutable environments mapping identifiers to variables

use crate::store::VarId;
use std::sync::Arc;
use strand_types::Ident;

#[derive(Debug)]
struct Frame {
    bindings: Vec<(Ident, VarId)>,
    parent: Env,
}

/// A chain of binding frames
///
/// Extending an environment never mutates it; nested scopes get a new
/// frame pointing at their parent, so a closure keeps exactly the
/// bindings that were visible where it was created.
#[derive(Debug, Clone, Default)]
pub struct Env(Option<Arc<Frame>>);

impl Env {
    pub fn empty() -> Self {
        Env(None)
    }

    pub fn extend(&self, bindings: Vec<(Ident, VarId)>) -> Env {
        if bindings.is_empty() {
            return self.clone();
        }
        Env(Some(Arc::new(Frame {
            bindings,
            parent: self.clone(),
        })))
    }

    pub fn bind(&self, ident: Ident, var: VarId) -> Env {
        self.extend(vec![(ident, var)])
    }

    /// Look up the innermost binding of `ident`
    pub fn get(&self, ident: &Ident) -> Option<VarId> {
        let mut current = &self.0;
        while let Some(frame) = current {
            if let Some((_, var)) = frame.bindings.iter().rev().find(|(name, _)| name == ident) {
                return Some(*var);
            }
            current = &frame.parent.0;
        }
        None
    }

    /// Every variable in the chain, shadowed bindings included
    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        std::iter::successors(self.0.as_deref(), |frame| frame.parent.0.as_deref())
            .flat_map(|frame| frame.bindings.iter().map(|(_, var)| *var))
    }

    pub fn contains(&self, ident: &Ident) -> bool {
        self.get(ident).is_some()
    }

    /// Every visible identifier, innermost first, without shadowed duplicates
    pub fn idents(&self) -> Vec<Ident> {
        let mut seen: Vec<Ident> = Vec::new();
        let mut current = &self.0;
        while let Some(frame) = current {
            for (name, _) in frame.bindings.iter().rev() {
                if !seen.contains(name) {
                    seen.push(name.clone());
                }
            }
            current = &frame.parent.0;
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VarStore;

    #[test]
    fn test_extension_does_not_mutate() {
        let mut store: VarStore<()> = VarStore::new();
        let a = store.fresh();
        let b = store.fresh();

        let outer = Env::empty().bind(Ident::new("x"), a);
        let inner = outer.bind(Ident::new("x"), b);

        assert_eq!(outer.get(&Ident::new("x")), Some(a));
        assert_eq!(inner.get(&Ident::new("x")), Some(b));
        assert_eq!(inner.idents(), vec![Ident::new("x")]);
        assert!(!outer.contains(&Ident::new("y")));
    }

    #[test]
    fn test_vars_include_shadowed_bindings() {
        let mut store: VarStore<()> = VarStore::new();
        let a = store.fresh();
        let b = store.fresh();
        let c = store.fresh();

        let env = Env::empty()
            .bind(Ident::new("x"), a)
            .extend(vec![(Ident::new("x"), b), (Ident::new("y"), c)]);
        let vars: Vec<VarId> = env.vars().collect();
        assert_eq!(vars, vec![b, c, a]);
        assert_eq!(Env::empty().vars().count(), 0);
    }
}
