use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, Result, SourceSpan},
    value::{Callable, CallableKind, Function, Value},
};

pub const SELF: &str = "self";
pub const SUPER: &str = "super";
pub const INIT: &str = "init";
pub const PRIVATE_INIT: &str = "_init";
pub const NEXT: &str = "next";
pub const ITERATE: &str = "iterate";
pub const EQUALS: &str = "equals";
pub const COMPARE_TO: &str = "compareTo";
pub const HAS: &str = "has";

pub const CLASS_OBJECT: &str = "Object";
pub const CLASS_NUMBER: &str = "Number";
pub const CLASS_STRING: &str = "String";
pub const CLASS_EXCEPTION: &str = "Exception";

/// Namespace the native registry falls back to when the receiver's
/// concrete class has no entry.
pub const CLASS_GLOBALS: &str = "Globals";

pub type InstanceRef = Rc<RefCell<Instance>>;

/// An object instance: a class reference (absent only for primitive
/// wrapper roots), an ordered field map, and a mutability flag fixed at
/// construction.
pub struct Instance {
    pub class: Option<Rc<Class>>,
    pub fields: IndexMap<String, Value>,
    pub immutable: bool,
}

impl Instance {
    pub fn new(
        class: Option<Rc<Class>>,
        fields: IndexMap<String, Value>,
        immutable: bool,
    ) -> InstanceRef {
        Rc::new(RefCell::new(Self {
            class,
            fields,
            immutable,
        }))
    }

    /// Property lookup: own fields first, then the class method table via
    /// `find_method`, binding any hit to this instance.
    pub fn get(instance: &InstanceRef, name: &str, arity: Option<usize>) -> Option<Value> {
        if let Some(value) = instance.borrow().fields.get(name) {
            return Some(value.clone());
        }
        let class = instance.borrow().class.clone()?;
        let receiver = Value::Object(Rc::clone(instance));
        class
            .find_method(Some(&receiver), name, arity)
            .map(Value::Callable)
    }

    pub fn set(instance: &InstanceRef, name: &str, value: Value, span: SourceSpan) -> Result<()> {
        if instance.borrow().immutable {
            return Err(
                Diagnostic::runtime("cannot modify an immutable object", span).into(),
            );
        }
        instance.borrow_mut().fields.insert(name.to_string(), value);
        Ok(())
    }

    /// Class-membership test through the transitive superclass set.
    pub fn is_instance_of(&self, target: &Rc<Class>) -> bool {
        match &self.class {
            Some(class) => class.is_subclass_of(target),
            None => false,
        }
    }
}

/// Identifies one method variant within a class: overloads of the same
/// name with distinct arities coexist as independent entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OverloadKey {
    pub name: String,
    pub arity: usize,
}

/// A class value. Classes are object-like themselves: constants are
/// readable through `get` and the class can serve as a method receiver.
pub struct Class {
    pub name: String,
    pub superclasses: Vec<Rc<Class>>,
    pub constants: IndexMap<String, Value>,
    pub methods: IndexMap<OverloadKey, Rc<Function>>,
}

impl Class {
    pub fn is_root_name(name: &str) -> bool {
        matches!(
            name,
            CLASS_OBJECT | CLASS_NUMBER | CLASS_STRING | CLASS_EXCEPTION
        )
    }

    pub fn is_subclass_of(self: &Rc<Self>, target: &Rc<Class>) -> bool {
        if Rc::ptr_eq(self, target) {
            return true;
        }
        self.superclasses
            .iter()
            .any(|superclass| superclass.is_subclass_of(target))
    }

    /// Property lookup on the class itself: constants first, then methods
    /// bound to the class value.
    pub fn get(self: &Rc<Self>, name: &str, arity: Option<usize>) -> Option<Value> {
        if let Some(value) = self.constants.get(name) {
            return Some(value.clone());
        }
        let receiver = Value::Class(Rc::clone(self));
        self.find_method(Some(&receiver), name, arity)
            .map(Value::Callable)
    }

    /// Method resolution over the multi-parent class graph.
    ///
    /// Without an arity the first name match wins, own table before
    /// superclasses depth-first in declaration order. With an arity, an
    /// exact `(name, arity)` match anywhere in the graph wins before the
    /// nearest-arity fallback is consulted at all; the fallback picks,
    /// among same-named methods whose declared arity does not exceed the
    /// requested one, the candidate minimizing the arity distance
    /// (ascending declared arity breaks ties), again preferring the
    /// current class over its superclasses in declaration order.
    pub fn find_method(
        self: &Rc<Self>,
        instance: Option<&Value>,
        name: &str,
        arity: Option<usize>,
    ) -> Option<Callable> {
        match arity {
            None => self.find_by_name(instance, name),
            Some(requested) => self
                .find_exact(instance, name, requested)
                .or_else(|| self.find_nearest(instance, name, requested)),
        }
    }

    fn find_by_name(self: &Rc<Self>, instance: Option<&Value>, name: &str) -> Option<Callable> {
        for (key, function) in &self.methods {
            if key.name == name {
                return Some(self.make_callable(function, instance, name, false));
            }
        }
        self.superclasses
            .iter()
            .find_map(|superclass| superclass.find_by_name(instance, name))
    }

    pub(crate) fn find_exact(
        self: &Rc<Self>,
        instance: Option<&Value>,
        name: &str,
        requested: usize,
    ) -> Option<Callable> {
        let key = OverloadKey {
            name: name.to_string(),
            arity: requested,
        };
        if let Some(function) = self.methods.get(&key) {
            return Some(self.make_callable(function, instance, name, false));
        }
        self.superclasses
            .iter()
            .find_map(|superclass| superclass.find_exact(instance, name, requested))
    }

    pub(crate) fn find_nearest(
        self: &Rc<Self>,
        instance: Option<&Value>,
        name: &str,
        requested: usize,
    ) -> Option<Callable> {
        let mut candidates: Vec<(usize, &Rc<Function>)> = self
            .methods
            .iter()
            .filter(|(key, _)| key.name == name && key.arity <= requested)
            .map(|(key, function)| (key.arity, function))
            .collect();
        candidates.sort_by_key(|(declared, _)| *declared);
        let best = candidates
            .into_iter()
            .min_by_key(|(declared, _)| requested - declared);
        if let Some((_, function)) = best {
            return Some(self.make_callable(function, instance, name, true));
        }
        self.superclasses
            .iter()
            .find_map(|superclass| superclass.find_nearest(instance, name, requested))
    }

    /// `super` resolution across an ordered superclass list: an exact
    /// arity match in any listed class (or its ancestors) wins before the
    /// nearest-arity fallback is tried anywhere, keeping the two phases
    /// consistent with single-class lookup.
    pub fn resolve_on_all(
        classes: &[Rc<Class>],
        instance: Option<&Value>,
        name: &str,
        arity: Option<usize>,
    ) -> Option<Callable> {
        match arity {
            None => classes
                .iter()
                .find_map(|class| class.find_by_name(instance, name)),
            Some(requested) => classes
                .iter()
                .find_map(|class| class.find_exact(instance, name, requested))
                .or_else(|| {
                    classes
                        .iter()
                        .find_map(|class| class.find_nearest(instance, name, requested))
                }),
        }
    }

    fn make_callable(
        &self,
        function: &Rc<Function>,
        instance: Option<&Value>,
        name: &str,
        via_fallback: bool,
    ) -> Callable {
        let function = match instance {
            Some(receiver) => function.bind(receiver.clone()),
            None => Rc::clone(function),
        };
        Callable {
            kind: CallableKind::Function(function),
            name: Some(name.to_string()),
            receiver: instance.cloned().map(Box::new),
            via_fallback,
        }
    }
}
