//! Module sources and their evaluation
//!
//! A module is a source text holding a single expression that evaluates
//! to a complete record. Actors import members of that record by name.

use crate::error::{ActorError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strand_kernel::{Complete, CompleteRec, Completion, Env, Ident, Machine, RunState};
use walkdir::WalkDir;

pub const MODULE_EXTENSION: &str = "strand";

/// Lists and loads module sources by dotted path (`shop.prices`)
pub trait ModuleBroker: Send + Sync {
    /// Module paths starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> Vec<String>;

    fn source(&self, path: &str) -> Option<String>;
}

/// Broker over sources held in memory
#[derive(Debug, Default)]
pub struct MemoryBroker {
    modules: RwLock<BTreeMap<String, String>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, source: impl Into<String>) {
        self.modules.write().insert(path.into(), source.into());
    }

    pub fn with(self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }
}

impl ModuleBroker for MemoryBroker {
    fn list(&self, prefix: &str) -> Vec<String> {
        self.modules
            .read()
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn source(&self, path: &str) -> Option<String> {
        self.modules.read().get(path).cloned()
    }
}

/// Broker over `*.strand` files below a root directory
///
/// `shop/prices.strand` is the module `shop.prices`.
#[derive(Debug, Clone)]
pub struct DirectoryBroker {
    root: PathBuf,
}

impl DirectoryBroker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn module_path(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.root).ok()?.with_extension("");
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("."))
    }
}

impl ModuleBroker for DirectoryBroker {
    fn list(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some(MODULE_EXTENSION))
            .filter_map(|e| self.module_path(e.path()))
            .filter(|path| path.starts_with(prefix))
            .collect();
        paths.sort();
        paths
    }

    fn source(&self, path: &str) -> Option<String> {
        if path.is_empty() || path.split('.').any(|part| part.is_empty() || part == "..") {
            return None;
        }
        let mut file = self.root.clone();
        for part in path.split('.') {
            file.push(part);
        }
        file.set_extension(MODULE_EXTENSION);
        std::fs::read_to_string(file).ok()
    }
}

/// Evaluate a module source to its record
pub fn evaluate_module(path: &str, source: &str) -> Result<CompleteRec> {
    let invalid = |message: String| ActorError::InvalidModule {
        module: path.to_string(),
        message,
    };

    let dest = Ident::new("$module");
    let lowered = strand_lang::lower_value(source, &dest)?;

    let mut machine = Machine::new();
    let env = machine.declare(&Env::empty(), std::slice::from_ref(&dest));
    let var = env
        .get(&dest)
        .ok_or_else(|| invalid("module scope is missing its result".to_string()))?;

    if machine.execute(Arc::new(lowered.kernel), env)? == RunState::Waiting {
        return Err(invalid("evaluation is blocked on an unbound variable".to_string()));
    }

    match machine.complete(var) {
        Completion::Done(Complete::Rec(rec)) => {
            tracing::debug!(module = path, members = rec.fields.len(), "evaluated module");
            Ok(rec)
        }
        Completion::Done(other) => Err(invalid(format!("expected a record, got {}", other))),
        Completion::Pending(_) => Err(invalid("result is not fully bound".to_string())),
        Completion::Unsendable(kind) => Err(invalid(format!("result contains a {}", kind))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_kernel::Literal;

    #[test]
    fn test_evaluate_module() {
        let rec = evaluate_module(
            "shop.prices",
            "var base = 10\n{'apple': base, 'pear': base * 2, 'currency': 'EUR'}",
        )
        .unwrap();
        assert_eq!(rec.get(&Literal::str("pear")), Some(&Complete::int(20)));
        assert_eq!(rec.get(&Literal::str("currency")), Some(&Complete::str("EUR")));
    }

    #[test]
    fn test_module_must_be_a_record() {
        let err = evaluate_module("m", "42").unwrap_err();
        assert!(matches!(err, ActorError::InvalidModule { .. }));

        let err = evaluate_module("m", "func f(x) in x end\n{'f': f}").unwrap_err();
        assert!(err.to_string().contains("Proc"), "{err}");
    }

    #[test]
    fn test_memory_broker_list() {
        let broker = MemoryBroker::new()
            .with("shop.prices", "{}")
            .with("shop.tax", "{}")
            .with("util", "{}");
        assert_eq!(broker.list("shop."), vec!["shop.prices", "shop.tax"]);
        assert_eq!(broker.source("util").as_deref(), Some("{}"));
        assert_eq!(broker.source("missing"), None);
    }

    #[test]
    fn test_directory_broker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shop")).unwrap();
        std::fs::write(dir.path().join("shop/prices.strand"), "{'apple': 1}").unwrap();
        std::fs::write(dir.path().join("util.strand"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let broker = DirectoryBroker::new(dir.path());
        assert_eq!(broker.list(""), vec!["shop.prices", "util"]);
        assert_eq!(broker.list("shop"), vec!["shop.prices"]);
        assert_eq!(broker.source("shop.prices").as_deref(), Some("{'apple': 1}"));
        assert_eq!(broker.source("shop..prices"), None);
        assert_eq!(broker.source("notes"), None);
    }
}
