use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, Result, SourceSpan},
    value::Value,
};

/// Leading character that marks a binding as reassignable.
pub const MUTABLE_MARKER: char = '$';

pub fn is_mutable_name(name: &str) -> bool {
    name.starts_with(MUTABLE_MARKER)
}

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// One node in the scope chain. Only the global root has no parent;
/// lookup starts at the innermost scope and walks outward.
#[derive(Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    values: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: None,
            values: IndexMap::new(),
        }))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            values: IndexMap::new(),
        }))
    }

    /// Unconditionally binds in this scope, shadowing any enclosing
    /// binding of the same name.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(env: &EnvironmentRef, name: &str, span: SourceSpan) -> Result<Value> {
        if let Some(value) = env.borrow().values.get(name) {
            return Ok(value.clone());
        }
        if let Some(parent) = env.borrow().parent.clone() {
            return Environment::get(&parent, name, span);
        }
        Err(Diagnostic::runtime(format!("undefined variable `{name}`"), span).into())
    }

    /// Best-effort lookup: walks the chain outward and returns `None`
    /// instead of failing. Nil bindings are placeholders (a class name is
    /// pre-bound to nil before its body evaluates) and are skipped.
    pub fn try_get(env: &EnvironmentRef, name: &str) -> Option<Value> {
        let mut current = Rc::clone(env);
        loop {
            if let Some(value) = current.borrow().values.get(name) {
                if !value.is_nil() {
                    return Some(value.clone());
                }
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    /// Assignment doubles as definition. The chain is walked outward for
    /// an existing binding: a non-nil one is reassigned in place, subject
    /// to the `$` marker unless `allow_immutable` is set, and a nil
    /// placeholder is replaced freely. An unbound name is created in the
    /// innermost scope.
    pub fn assign(
        env: &EnvironmentRef,
        name: &str,
        value: Value,
        allow_immutable: bool,
        span: SourceSpan,
    ) -> Result<()> {
        let mut current = Rc::clone(env);
        loop {
            let existing = current.borrow().values.get(name).map(Value::is_nil);
            if let Some(is_placeholder) = existing {
                if !is_placeholder && !allow_immutable && !is_mutable_name(name) {
                    return Err(Diagnostic::runtime(
                        format!(
                            "cannot assign to immutable binding `{name}`; start the name with `{MUTABLE_MARKER}` to make it mutable"
                        ),
                        span,
                    )
                    .into());
                }
                current.borrow_mut().values.insert(name.to_string(), value);
                return Ok(());
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        env.borrow_mut().values.insert(name.to_string(), value);
        Ok(())
    }

    /// Jumps exactly `distance` scopes outward; `None` when the chain is
    /// shorter than that.
    pub fn ancestor(env: &EnvironmentRef, distance: usize) -> Option<EnvironmentRef> {
        let mut current = Rc::clone(env);
        for _ in 0..distance {
            let parent = current.borrow().parent.clone()?;
            current = parent;
        }
        Some(current)
    }

    /// Direct-addressed read for references carrying a pre-computed
    /// scope distance.
    pub fn get_at(env: &EnvironmentRef, distance: usize, name: &str) -> Option<Value> {
        let scope = Environment::ancestor(env, distance)?;
        let value = scope.borrow().values.get(name).cloned();
        value
    }

    /// Direct-addressed counterpart of `assign`, rooted at the scope
    /// `distance` hops outward.
    pub fn assign_at(
        env: &EnvironmentRef,
        distance: usize,
        name: &str,
        value: Value,
        span: SourceSpan,
    ) -> Result<()> {
        let scope = Environment::ancestor(env, distance).ok_or_else(|| {
            Diagnostic::runtime(
                format!("scope distance {distance} exceeds the environment chain"),
                span,
            )
        })?;
        Environment::assign(&scope, name, value, false, span)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for key in self.values.keys() {
            dbg.entry(key, &"..");
        }
        dbg.finish()?;
        if self.parent.is_some() {
            write!(f, " -> ..")?;
        }
        Ok(())
    }
}
