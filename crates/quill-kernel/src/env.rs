//! Persistent declaration environment
//!
//! The symbol table handle the session core threads through every
//! branch. Backed by a structurally-shared persistent map, so cloning
//! at a fork point is O(1) and forked branches see a stable snapshot
//! no matter what the parent adds afterwards.

use crate::level::Level;
use crate::name::Name;
use im::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type for environment operations
pub type EnvResult<T> = Result<T, EnvError>;

/// Errors raised by environment updates
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvError {
    /// A declaration with this name already exists on the branch
    #[error("declaration `{0}` has already been declared")]
    Duplicate(Name),
}

/// The signature of one constant: its universe parameters and sort.
///
/// The checking algorithm that validates declarations lives outside the
/// session core; nothing here looks past the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: Name,
    pub level_params: Vec<Name>,
    pub sort: Level,
}

impl Declaration {
    pub fn new(name: Name, level_params: Vec<Name>, sort: Level) -> Self {
        Declaration {
            name,
            level_params,
            sort,
        }
    }
}

/// Persistent map from names to declarations, plus the two switches the
/// session core keeps in sync with its context: the export mode used
/// when minting auxiliary names, and the kernel diagnostics toggle.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    consts: HashMap<Name, Arc<Declaration>>,
    private_scope: Option<Name>,
    diagnostics_enabled: bool,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Add a declaration, rejecting duplicates on this branch.
    pub fn add(&mut self, decl: Declaration) -> EnvResult<()> {
        if self.consts.contains_key(&decl.name) {
            return Err(EnvError::Duplicate(decl.name));
        }
        self.consts.insert(decl.name.clone(), Arc::new(decl));
        Ok(())
    }

    pub fn find(&self, name: &Name) -> Option<&Arc<Declaration>> {
        self.consts.get(name)
    }

    /// Membership as visible to the current branch.
    ///
    /// Forked branches each hold their own persistent snapshot, so this
    /// is exactly "did this branch's lineage declare the name".
    pub fn contains_on_branch(&self, name: &Name) -> bool {
        self.consts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.consts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Arc<Declaration>)> {
        self.consts.iter()
    }

    /// Current export mode. `Some(scope)` means auxiliary definitions
    /// minted by the session belong to `scope`'s private namespace.
    pub fn private_scope(&self) -> Option<&Name> {
        self.private_scope.as_ref()
    }

    pub fn set_private_scope(&mut self, scope: Option<Name>) {
        self.private_scope = scope;
    }

    /// Adjust a name for the current export mode: privatized when a
    /// private scope is set, unchanged otherwise.
    pub fn resolve_export(&self, name: &Name) -> Name {
        match &self.private_scope {
            Some(scope) => name.privatized(scope),
            None => name.clone(),
        }
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics_enabled
    }

    pub fn set_diagnostics_enabled(&mut self, enabled: bool) {
        self.diagnostics_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str) -> Declaration {
        Declaration::new(Name::from(name), vec![], Level::zero())
    }

    #[test]
    fn test_add_and_find() {
        let mut env = Environment::new();
        env.add(decl("Nat")).unwrap();
        assert!(env.contains_on_branch(&Name::from("Nat")));
        assert_eq!(env.find(&Name::from("Nat")).unwrap().name, Name::from("Nat"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut env = Environment::new();
        env.add(decl("Nat")).unwrap();
        let err = env.add(decl("Nat")).unwrap_err();
        assert_eq!(err, EnvError::Duplicate(Name::from("Nat")));
        assert_eq!(err.to_string(), "declaration `Nat` has already been declared");
    }

    #[test]
    fn test_branch_snapshot_isolation() {
        let mut parent = Environment::new();
        parent.add(decl("shared")).unwrap();

        let child = parent.clone();
        parent.add(decl("parent.only")).unwrap();

        assert!(parent.contains_on_branch(&Name::from("parent.only")));
        assert!(!child.contains_on_branch(&Name::from("parent.only")));
        assert!(child.contains_on_branch(&Name::from("shared")));
    }

    #[test]
    fn test_resolve_export_follows_scope() {
        let mut env = Environment::new();
        let name = Name::from("aux.1");
        assert_eq!(env.resolve_export(&name), name);

        env.set_private_scope(Some(Name::from("MyModule")));
        let resolved = env.resolve_export(&name);
        assert!(resolved.is_private());
        assert_eq!(resolved.deprivatized(), Some(name));
    }

    #[test]
    fn test_diagnostics_switch() {
        let mut env = Environment::new();
        assert!(!env.diagnostics_enabled());
        env.set_diagnostics_enabled(true);
        assert!(env.diagnostics_enabled());
    }
}
