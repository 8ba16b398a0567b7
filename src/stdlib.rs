use std::{
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

use indexmap::IndexMap;

use crate::{
    ast::{BlockAst, Stmt, StmtKind},
    diagnostics::{Diagnostic, DiagnosticKind, Result, SourceSpan},
    environment::{Environment, EnvironmentRef},
    object::{
        Class, Instance, OverloadKey, CLASS_EXCEPTION, CLASS_GLOBALS, CLASS_NUMBER, CLASS_OBJECT,
        CLASS_STRING, EQUALS, HAS, INIT, ITERATE, NEXT,
    },
    runtime::Interpreter,
    value::{
        strict_equals, Callable, CallableKind, Function, NativeCallback, NativeFunction, Value,
    },
};

/// Name of the internal class whose `next` drives `for` loops over plain
/// objects.
pub const CLASS_ITERATOR: &str = "Iterator";

const FIELD_CONTAINER: &str = "container";
const FIELD_INDEX: &str = "index";
const FIELD_MESSAGE: &str = "message";

/// Capability table backing native-flagged methods: one callback per
/// (class name, method name, arity). Owned by a single interpreter, so
/// separate interpreter instances never share native state.
pub struct NativeRegistry {
    entries: IndexMap<(String, String, usize), Rc<NativeFunction>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn register(
        &mut self,
        class_name: &str,
        method_name: &'static str,
        arity: usize,
        callback: NativeCallback,
    ) {
        // The callback receives the receiver prepended to the declared
        // arguments, hence the +1 on the stored arity.
        self.entries.insert(
            (class_name.to_string(), method_name.to_string(), arity),
            Rc::new(NativeFunction {
                name: method_name,
                arity: arity + 1,
                callback,
            }),
        );
    }

    pub fn lookup(
        &self,
        class_name: &str,
        method_name: &str,
        arity: usize,
    ) -> Option<Rc<NativeFunction>> {
        self.entries
            .get(&(class_name.to_string(), method_name.to_string(), arity))
            .cloned()
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the base classes and globals into `env` and returns the
/// registry holding their native implementations.
pub fn install(env: &EnvironmentRef) -> NativeRegistry {
    let mut registry = NativeRegistry::new();

    let object = Rc::new(Class {
        name: CLASS_OBJECT.to_string(),
        superclasses: Vec::new(),
        constants: IndexMap::new(),
        methods: methods(
            env,
            &[(HAS, &["value"]), (EQUALS, &["other"]), (ITERATE, &[]), ("size", &[])],
        ),
    });
    let number = Rc::new(Class {
        name: CLASS_NUMBER.to_string(),
        superclasses: vec![Rc::clone(&object)],
        constants: IndexMap::new(),
        methods: IndexMap::new(),
    });
    let string = Rc::new(Class {
        name: CLASS_STRING.to_string(),
        superclasses: vec![Rc::clone(&object)],
        constants: IndexMap::new(),
        methods: methods(env, &[(HAS, &["value"])]),
    });
    let exception = Rc::new(Class {
        name: CLASS_EXCEPTION.to_string(),
        superclasses: vec![Rc::clone(&object)],
        constants: IndexMap::new(),
        methods: methods(env, &[(INIT, &["message"])]),
    });
    let iterator = Rc::new(Class {
        name: CLASS_ITERATOR.to_string(),
        superclasses: vec![Rc::clone(&object)],
        constants: IndexMap::new(),
        methods: methods(env, &[(NEXT, &[])]),
    });

    {
        let mut scope = env.borrow_mut();
        scope.define(CLASS_OBJECT, Value::Class(object));
        scope.define(CLASS_NUMBER, Value::Class(number));
        scope.define(CLASS_STRING, Value::Class(string));
        scope.define(CLASS_EXCEPTION, Value::Class(exception));
        scope.define(CLASS_ITERATOR, Value::Class(iterator));
        scope.define(
            "clock",
            Value::Callable(Callable {
                kind: CallableKind::Native(Rc::new(NativeFunction {
                    name: "clock",
                    arity: 0,
                    callback: native_clock,
                })),
                name: Some("clock".to_string()),
                receiver: None,
                via_fallback: false,
            }),
        );
    }

    for namespace in [CLASS_OBJECT, CLASS_GLOBALS] {
        registry.register(namespace, HAS, 1, object_has);
        registry.register(namespace, EQUALS, 1, object_equals);
        registry.register(namespace, ITERATE, 0, object_iterate);
        registry.register(namespace, "size", 0, object_size);
    }
    registry.register(CLASS_STRING, HAS, 1, string_has);
    registry.register(CLASS_ITERATOR, NEXT, 0, iterator_next);
    registry.register(CLASS_EXCEPTION, INIT, 1, exception_init);
    registry.register(CLASS_GLOBALS, INIT, 1, exception_init);

    registry
}

/// Builds a method table of native-flagged functions; their blocks exist
/// only to carry the declared parameter list.
fn methods(
    env: &EnvironmentRef,
    entries: &[(&'static str, &[&str])],
) -> IndexMap<OverloadKey, Rc<Function>> {
    let mut table = IndexMap::new();
    for (name, params) in entries {
        let block = Rc::new(BlockAst {
            params: params.iter().map(|param| (*param).to_string()).collect(),
            body: vec![Stmt {
                kind: StmtKind::Native,
                span: SourceSpan::new(0, 0),
            }],
        });
        let function = Rc::new(Function {
            name: Some((*name).to_string()),
            block,
            closure: Environment::with_parent(Rc::clone(env)),
            is_initializer: *name == INIT,
            is_native: true,
        });
        table.insert(
            OverloadKey {
                name: (*name).to_string(),
                arity: params.len(),
            },
            function,
        );
    }
    table
}

fn native_error(message: impl Into<String>) -> crate::diagnostics::HyacinthError {
    Diagnostic::new(DiagnosticKind::Runtime, message).into()
}

fn receiver_instance(args: &[Value]) -> Result<crate::object::InstanceRef> {
    match args.first() {
        Some(Value::Object(instance)) => Ok(Rc::clone(instance)),
        _ => Err(native_error("native method expects an object receiver")),
    }
}

fn native_clock(_interpreter: &mut Interpreter, _args: &[Value]) -> Result<Value> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| native_error(format!("system clock unavailable: {err}")))?;
    Ok(Value::Number(now.as_secs_f64()))
}

/// `object.has(value)`: true when `value` names a field (string keys) or
/// equals one of the field values.
fn object_has(_interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let instance = receiver_instance(args)?;
    let needle = args.get(1).cloned().unwrap_or(Value::Nil);
    let fields = &instance.borrow().fields;
    if let Value::Str(key) = &needle {
        if fields.contains_key(key) {
            return Ok(Value::bool(true));
        }
    }
    let found = fields.values().any(|value| strict_equals(value, &needle));
    Ok(Value::bool(found))
}

/// `string.has(value)`: substring containment.
fn string_has(_interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let haystack = match args.first() {
        Some(Value::Str(s)) => s,
        _ => return Err(native_error("`has` expects a string receiver")),
    };
    let found = match args.get(1) {
        Some(Value::Str(needle)) => haystack.contains(needle.as_str()),
        _ => false,
    };
    Ok(Value::bool(found))
}

fn object_equals(_interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let receiver = args.first().cloned().unwrap_or(Value::Nil);
    let other = args.get(1).cloned().unwrap_or(Value::Nil);
    Ok(Value::bool(strict_equals(&receiver, &other)))
}

fn object_size(_interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let instance = receiver_instance(args)?;
    let len = instance.borrow().fields.len();
    Ok(Value::Number(len as f64))
}

/// `object.iterate()`: wraps the receiver in a fresh `Iterator` instance
/// whose `next` walks the field values in insertion order.
fn object_iterate(interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let receiver = args.first().cloned().unwrap_or(Value::Nil);
    let iterator_class = match interpreter.global(CLASS_ITERATOR) {
        Some(Value::Class(class)) => class,
        _ => return Err(native_error("the Iterator class is not installed")),
    };
    let mut fields = IndexMap::new();
    fields.insert(FIELD_CONTAINER.to_string(), receiver);
    fields.insert(FIELD_INDEX.to_string(), Value::Number(0.0));
    let instance = Instance::new(Some(iterator_class), fields, false);
    Ok(Value::Object(instance))
}

/// `iterator.next()`: yields the container's field value at the cursor,
/// or nil once exhausted.
fn iterator_next(_interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let iterator = receiver_instance(args)?;
    let (container, index) = {
        let fields = &iterator.borrow().fields;
        let container = fields.get(FIELD_CONTAINER).cloned().unwrap_or(Value::Nil);
        let index = match fields.get(FIELD_INDEX) {
            Some(Value::Number(n)) => *n as usize,
            _ => 0,
        };
        (container, index)
    };
    let item = match &container {
        Value::Object(instance) => instance
            .borrow()
            .fields
            .get_index(index)
            .map(|(_, value)| value.clone()),
        _ => None,
    };
    match item {
        Some(value) => {
            iterator
                .borrow_mut()
                .fields
                .insert(FIELD_INDEX.to_string(), Value::Number((index + 1) as f64));
            Ok(value)
        }
        None => Ok(Value::Nil),
    }
}

/// `Exception.init(message)`: stores the message on the new instance.
fn exception_init(_interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let instance = receiver_instance(args)?;
    let message = args.get(1).cloned().unwrap_or(Value::Nil);
    instance
        .borrow_mut()
        .fields
        .insert(FIELD_MESSAGE.to_string(), message);
    Ok(Value::Object(instance))
}
