//! Layered environment variable store
//!
//! Provides the chained variable store used to compute a child process
//! environment:
//! - `Variable` - a value with exported/local/read-only flags
//! - `EnvRead` - read access to a store (lookup + iteration)
//! - `ListEnviron` - flat read-only source, usually the process environment
//! - `Environ` - a mutable layer chained on top of an optional parent
//!
//! Lookup consults the local layer first and falls back to the parent chain;
//! iteration visits parent entries before local ones, so folding `each` into
//! a map by name always ends with the most local value.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use thiserror::Error;

// ============================================================================
// Variable
// ============================================================================

/// A single environment variable.
///
/// A variable is "set" iff it carries a value. An unset variable may still
/// carry flags; such tombstones shadow parent entries without providing a
/// value of their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variable {
    /// The value, if set.
    pub value: Option<String>,
    /// Whether the variable is visible to spawned processes.
    pub exported: bool,
    /// Whether the variable is scoped to its layer.
    pub local: bool,
    /// Whether further mutation is rejected.
    pub read_only: bool,
}

impl Variable {
    /// Create a plain string variable (no flags).
    pub fn string(value: impl Into<String>) -> Self {
        Variable {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Create an exported string variable.
    pub fn exported(value: impl Into<String>) -> Self {
        Variable {
            value: Some(value.into()),
            exported: true,
            ..Default::default()
        }
    }

    /// Whether the variable carries a value.
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// The value as a string slice, empty when unset.
    pub fn str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// Attempt to overwrite a value-bearing read-only variable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("readonly variable {name:?}")]
pub struct ReadOnlyVar {
    pub name: String,
}

// ============================================================================
// Read access
// ============================================================================

/// Read access to an environment store.
pub trait EnvRead {
    /// Look up a variable. Absence is not an error; a default (unset,
    /// unflagged) `Variable` is returned when the name is nowhere bound.
    fn get(&self, name: &str) -> Variable;

    /// Visit every entry, parent chain first, then local entries. Stops early
    /// when the visitor returns `false`; the return value reports whether
    /// iteration ran to completion. The visitor must not mutate the store.
    fn each(&self, visit: &mut dyn FnMut(&str, &Variable) -> bool) -> bool;

    /// Downcast hook: layers that accept writes return themselves so that
    /// unset operations can propagate down the chain.
    fn as_layer(&self) -> Option<&Environ> {
        None
    }
}

/// A flat, read-only variable source backed by `NAME=VALUE` pairs.
///
/// Entries are exported: this source models a real process environment.
#[derive(Debug, Clone, Default)]
pub struct ListEnviron {
    values: BTreeMap<String, String>,
}

impl ListEnviron {
    /// Build from explicit pairs.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: pairs.into_iter().collect(),
        }
    }

    /// Build from the current process environment.
    pub fn from_os() -> Self {
        Self::new(std::env::vars())
    }
}

impl EnvRead for ListEnviron {
    fn get(&self, name: &str) -> Variable {
        match self.values.get(name) {
            Some(value) => Variable::exported(value.clone()),
            None => Variable::default(),
        }
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Variable) -> bool) -> bool {
        for (name, value) in &self.values {
            if !visit(name, &Variable::exported(value.clone())) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Environ layer
// ============================================================================

/// One mutable layer of the chained environment store.
///
/// Uses `RefCell` for interior mutability so a layer can be shared through
/// `Rc` and still accept writes, matching the single-threaded state model of
/// the rest of the crate. The parent chain is read-shared and never mutated
/// by children except through the explicit unset propagation below.
#[derive(Default)]
pub struct Environ {
    parent: Option<Rc<dyn EnvRead>>,
    values: RefCell<HashMap<String, Variable>>,
}

impl Environ {
    /// Create a layer on top of an optional parent.
    pub fn new(parent: Option<Rc<dyn EnvRead>>) -> Self {
        Self {
            parent,
            values: RefCell::new(HashMap::new()),
        }
    }

    /// Convenience: a fresh layer over the current process environment.
    pub fn from_os() -> Self {
        Self::new(Some(Rc::new(ListEnviron::from_os())))
    }

    /// Set a plain (unexported) string variable.
    pub fn set_string(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ReadOnlyVar> {
        self.set(name, Variable::string(value))
    }

    /// Set, flag, or unset a variable.
    ///
    /// - an unset `vr` carrying flags only marks the existing entry
    ///   (flag-only updates never fail, even on read-only entries);
    /// - overwriting a value-bearing read-only entry fails;
    /// - an unset, unflagged `vr` unsets the name: a local-flagged entry is
    ///   replaced by a local tombstone, otherwise the entry is removed and,
    ///   when the parent is itself a writable layer, the unset propagates to
    ///   it;
    /// - otherwise the entry is replaced, inheriting the previous local flag.
    pub fn set(&self, name: impl Into<String>, mut vr: Variable) -> Result<(), ReadOnlyVar> {
        let name = name.into();
        let prev = self.get(&name);

        if !vr.is_set() && (vr.exported || vr.local || vr.read_only) {
            // marking as exported/local/readonly
            let mut merged = prev;
            merged.exported |= vr.exported;
            merged.local |= vr.local;
            merged.read_only |= vr.read_only;
            self.values.borrow_mut().insert(name, merged);
            return Ok(());
        }

        if prev.read_only {
            return Err(ReadOnlyVar { name });
        }

        if !vr.is_set() {
            // unsetting
            if prev.local {
                vr.local = true;
                self.values.borrow_mut().insert(name, vr);
                return Ok(());
            }
            self.values.borrow_mut().remove(&name);
            if let Some(parent) = &self.parent {
                if let Some(layer) = parent.as_layer() {
                    return layer.set(name, vr);
                }
            }
        }

        vr.local |= prev.local;
        self.values.borrow_mut().insert(name, vr);
        Ok(())
    }
}

impl EnvRead for Environ {
    fn get(&self, name: &str) -> Variable {
        if let Some(vr) = self.values.borrow().get(name) {
            return vr.clone();
        }
        match &self.parent {
            Some(parent) => parent.get(name),
            None => Variable::default(),
        }
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Variable) -> bool) -> bool {
        if let Some(parent) = &self.parent {
            if !parent.each(visit) {
                return false;
            }
        }
        for (name, vr) in self.values.borrow().iter() {
            if !visit(name, vr) {
                return false;
            }
        }
        true
    }

    fn as_layer(&self) -> Option<&Environ> {
        Some(self)
    }
}

// ============================================================================
// Flattening
// ============================================================================

/// Fold `each` into a single map keyed by name. Later visits (more local
/// layers) override earlier ones.
pub fn env_map(env: &dyn EnvRead) -> HashMap<String, Variable> {
    let mut map = HashMap::new();
    env.each(&mut |name, vr| {
        map.insert(name.to_string(), vr.clone());
        true
    });
    map
}

/// Flatten a store into a sorted `NAME=VALUE` list, optionally filtered by
/// a predicate (e.g. exported-only). Sorting keeps the spawned process
/// environment reproducible.
pub fn env_strings(env: &dyn EnvRead, filter: Option<&dyn Fn(&Variable) -> bool>) -> Vec<String> {
    let mut entries: Vec<String> = env_map(env)
        .into_iter()
        .filter(|(_, vr)| filter.map(|f| f(vr)).unwrap_or(true))
        .map(|(name, vr)| format!("{}={}", name, vr.str()))
        .collect();
    entries.sort();
    entries
}

// ============================================================================
// Tests
// ============================================================================
