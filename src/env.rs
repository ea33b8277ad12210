//! Lexical environments
//!
//! Scopes live in an append-only arena and point at their parent by index.
//! A scope is never removed or reparented; only binding contents change.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::Ident;
use crate::error::EvalError;
use crate::value::Value;

/// Handle to a scope in an [`Environment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub usize);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: HashMap<Ident, Value>,
    parent: Option<ScopeId>,
}

#[derive(Debug, Clone, Default)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty scope whose lookups fall through to `parent`
    pub fn push_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            bindings: HashMap::new(),
            parent,
        });
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope.0).and_then(|s| s.parent)
    }

    /// Number of scopes ever allocated
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// The nearest scope, walking outward from `scope`, that binds `name`
    pub fn owner(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = self.scopes.get(id.0)?;
            if frame.bindings.contains_key(name) {
                return Some(id);
            }
            current = frame.parent;
        }
        None
    }

    /// Resolve `name`; `None` means unbound, never a bound falsy value
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        let owner = self.owner(scope, name)?;
        self.scopes[owner.0].bindings.get(name)
    }

    /// Add `name` to `scope`. Fails if it already resolves anywhere in the chain.
    pub fn bind(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<(), EvalError> {
        if self.owner(scope, name).is_some() {
            return Err(EvalError::AlreadyBound {
                name: name.to_string(),
                scope,
            });
        }
        self.define(scope, name, value);
        Ok(())
    }

    /// Add `name` to a freshly entered `scope`, shadowing any outer binding.
    /// Only a second binding of the same name in this very scope is an error.
    pub fn declare(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<(), EvalError> {
        let taken = self
            .scopes
            .get(scope.0)
            .is_some_and(|frame| frame.bindings.contains_key(name));
        if taken {
            return Err(EvalError::AlreadyBound {
                name: name.to_string(),
                scope,
            });
        }
        self.define(scope, name, value);
        Ok(())
    }

    /// Replace the value of the nearest existing binding of `name`
    pub fn update(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<(), EvalError> {
        let owner = self.owner(scope, name).ok_or_else(|| EvalError::NotBound {
            name: name.to_string(),
            scope,
        })?;
        self.define(owner, name, value);
        Ok(())
    }

    /// Set `name` in `scope` unconditionally
    pub fn define(&mut self, scope: ScopeId, name: &str, value: Value) {
        if let Some(frame) = self.scopes.get_mut(scope.0) {
            frame.bindings.insert(name.to_string(), value);
        }
    }
}
