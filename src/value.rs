use std::{fmt, rc::Rc};

use crate::{
    ast::BlockAst,
    diagnostics::{Diagnostic, Result, SourceSpan},
    environment::{Environment, EnvironmentRef},
    object::{Class, InstanceRef, SELF},
    runtime::Interpreter,
};

/// A runtime value. Numbers and strings have value semantics (cloning
/// copies them); objects, classes and callables are shared references.
#[derive(Clone)]
pub enum Value {
    Nil,
    Number(f64),
    Str(String),
    Object(InstanceRef),
    Class(Rc<Class>),
    Callable(Callable),
    /// Internal: the ordered superclass list bound to `super` inside a
    /// class body. Never observable from scripts directly.
    Supers(Rc<Vec<Rc<Class>>>),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Nil is falsey, a number is truthy when non-zero, everything else
    /// is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    pub fn bool(value: bool) -> Self {
        Value::Number(if value { 1.0 } else { 0.0 })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Object(_) => "Object",
            Value::Class(_) => "Class",
            Value::Callable(_) => "Callable",
            Value::Supers(_) => "Superclasses",
        }
    }

    pub fn expect_number(&self, span: SourceSpan) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            _ => Err(Diagnostic::runtime(
                format!("expected Number, found {}", self.type_name()),
                span,
            )
            .into()),
        }
    }
}

/// Structural equality, used when no user-level `equals` applies. Object
/// references compare by identity first, then field-by-field within the
/// same class.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let left = x.borrow();
            let right = y.borrow();
            let same_class = match (&left.class, &right.class) {
                (Some(lc), Some(rc)) => Rc::ptr_eq(lc, rc),
                (None, None) => true,
                _ => false,
            };
            same_class
                && left.fields.len() == right.fields.len()
                && left
                    .fields
                    .iter()
                    .all(|(key, value)| match right.fields.get(key) {
                        Some(other) => strict_equals(value, other),
                        None => false,
                    })
        }
        _ => false,
    }
}

/// Formats a number the way scripts see it: integral values print
/// without a decimal point.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A callable value: the underlying function plus the name it was
/// resolved under and the receiver it was bound to, both used by native
/// dispatch. `via_fallback` records that method lookup selected this
/// function through the nearest-arity fallback, which permits surplus
/// arguments to be discarded at the call boundary.
#[derive(Clone)]
pub struct Callable {
    pub kind: CallableKind,
    pub name: Option<String>,
    pub receiver: Option<Box<Value>>,
    pub via_fallback: bool,
}

impl Callable {
    pub fn function(function: Rc<Function>) -> Self {
        Self {
            name: function.name.clone(),
            kind: CallableKind::Function(function),
            receiver: None,
            via_fallback: false,
        }
    }

    pub fn arity(&self) -> usize {
        match &self.kind {
            CallableKind::Function(function) => function.arity(),
            CallableKind::Native(native) => native.arity,
        }
    }
}

#[derive(Clone)]
pub enum CallableKind {
    Function(Rc<Function>),
    Native(Rc<NativeFunction>),
}

/// A block paired with its captured environment. Methods and standalone
/// blocks share this shape; only the flags differ.
pub struct Function {
    pub name: Option<String>,
    pub block: Rc<BlockAst>,
    pub closure: EnvironmentRef,
    pub is_initializer: bool,
    pub is_native: bool,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.block.arity()
    }

    /// Produces a new function sharing this one's block and flags but
    /// closing over an environment that additionally exposes the receiver
    /// as `self`. The original is untouched, so rebinding is safe.
    pub fn bind(self: &Rc<Self>, receiver: Value) -> Rc<Function> {
        let env = Environment::with_parent(Rc::clone(&self.closure));
        env.borrow_mut().define(SELF, receiver);
        Rc::new(Function {
            name: self.name.clone(),
            block: Rc::clone(&self.block),
            closure: env,
            is_initializer: self.is_initializer,
            is_native: self.is_native,
        })
    }
}

pub type NativeCallback = fn(&mut Interpreter, &[Value]) -> Result<Value>;

/// A host-provided implementation resolved through the native registry.
/// `arity` counts the prepended receiver when one applies.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub callback: NativeCallback,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "\"{s}\""),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(instance) => {
                write!(f, "[")?;
                for (idx, (key, value)) in instance.borrow().fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key} = {value:?}")?;
                }
                write!(f, "]")
            }
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Callable(callable) => {
                let name = callable.name.as_deref().unwrap_or("anonymous");
                match &callable.kind {
                    CallableKind::Function(function) if function.is_native => {
                        write!(f, "<native fn {name}>")
                    }
                    CallableKind::Function(_) => write!(f, "<fn {name}>"),
                    CallableKind::Native(native) => write!(f, "<native fn {}>", native.name),
                }
            }
            Value::Supers(_) => write!(f, "<superclasses>"),
        }
    }
}
