use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{
        BinaryOp, BlockAst, Expr, ExprKind, Literal, LogicalOp, MemberName, MethodAst, ObjectEntry,
        Program, Stmt, StmtKind, UnaryOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, HyacinthError, Result, SourceSpan},
    environment::{Environment, EnvironmentRef},
    lexer::Lexer,
    object::{
        Class, Instance, OverloadKey, CLASS_GLOBALS, CLASS_NUMBER, CLASS_OBJECT, CLASS_STRING,
        COMPARE_TO, EQUALS, HAS, INIT, ITERATE, NEXT, PRIVATE_INIT, SELF, SUPER,
    },
    parser::Parser,
    stdlib::{self, NativeRegistry},
    value::{strict_equals, Callable, CallableKind, Function, Value},
};

/// Outcome of executing a statement: either control falls through
/// (optionally carrying the statement's value) or a jump unwinds toward
/// the construct that consumes it.
enum FlowControl {
    Next,
    NextValue(Value),
    Break,
    Continue,
    Return(Value),
}

/// Key a member access resolved to: a field/method name, or a positional
/// index into the ordered field map.
enum MemberKey {
    Name(String),
    Index(usize),
}

/// The tree-walking evaluator. One interpreter owns its global scope and
/// native registry; evaluation mutates `env` as scopes open and close.
pub struct Interpreter {
    globals: EnvironmentRef,
    env: EnvironmentRef,
    registry: NativeRegistry,
    /// Exceptions raised but not yet consumed by a `rescue`. Statement
    /// lists inspect this after every statement.
    raised: Vec<Value>,
    loop_depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::new();
        let registry = stdlib::install(&globals);
        let env = Rc::clone(&globals);
        Self {
            globals,
            env,
            registry,
            raised: Vec::new(),
            loop_depth: 0,
        }
    }

    /// Lexes, parses and evaluates `source`, returning the value of the
    /// last expression statement. State persists across calls, which is
    /// what the REPL builds on.
    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        let tokens = Lexer::new(source).tokenize()?;
        let program = Parser::new(tokens).parse()?;
        self.interpret(&program)
    }

    pub fn interpret(&mut self, program: &Program) -> Result<Value> {
        let flow = self.run_statements(&program.statements)?;
        if let Some(exception) = self.raised.pop() {
            self.raised.clear();
            return Err(Diagnostic::new(
                DiagnosticKind::Runtime,
                format!("unhandled exception: {}", describe_exception(&exception)),
            )
            .into());
        }
        Ok(match flow {
            FlowControl::NextValue(value) | FlowControl::Return(value) => value,
            _ => Value::Nil,
        })
    }

    /// Reads a binding from the global scope, skipping placeholders.
    pub fn global(&self, name: &str) -> Option<Value> {
        Environment::try_get(&self.globals, name)
    }

    pub fn globals(&self) -> EnvironmentRef {
        Rc::clone(&self.globals)
    }

    /// Runs a statement list, threading the pending-exception protocol: a
    /// raise surfacing after any statement jumps execution forward to the
    /// next `rescue` in this list, or aborts the list when there is none.
    fn run_statements(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let mut index = 0;
        let mut last = FlowControl::Next;
        while index < statements.len() {
            let mut flow = self.execute_statement(&statements[index])?;
            index += 1;
            loop {
                match flow {
                    FlowControl::Break | FlowControl::Continue | FlowControl::Return(_) => {
                        return Ok(flow)
                    }
                    FlowControl::NextValue(value) => last = FlowControl::NextValue(value),
                    FlowControl::Next => {}
                }
                let exception = match self.raised.pop() {
                    Some(exception) => exception,
                    None => break,
                };
                let handler = statements[index..]
                    .iter()
                    .enumerate()
                    .find_map(|(offset, stmt)| match &stmt.kind {
                        StmtKind::Rescue(block) => Some((index + offset, Rc::clone(block))),
                        _ => None,
                    });
                match handler {
                    Some((rescue_index, block)) => {
                        index = rescue_index + 1;
                        flow = self.run_rescue(&block, exception)?;
                    }
                    None => {
                        // No handler in this list; keep the exception
                        // pending and let the enclosing list scan for one.
                        self.raised.push(exception);
                        return Ok(FlowControl::Next);
                    }
                }
            }
        }
        Ok(last)
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                let value = self.evaluate(expr)?;
                Ok(FlowControl::NextValue(value))
            }
            StmtKind::Print(expr) => {
                let value = self.evaluate(expr)?;
                if self.raised.is_empty() {
                    println!("{value}");
                }
                Ok(FlowControl::Next)
            }
            StmtKind::Class {
                name,
                superclasses,
                constants,
                methods,
            } => self.execute_class(name, superclasses.as_deref(), constants, methods, stmt.span),
            StmtKind::If {
                branches,
                else_branch,
            } => {
                for (condition, block) in branches {
                    let chosen = self.evaluate(condition)?.is_truthy();
                    if !self.raised.is_empty() {
                        return Ok(FlowControl::Next);
                    }
                    if chosen {
                        return self.run_block_scope(block);
                    }
                }
                match else_branch {
                    Some(block) => self.run_block_scope(block),
                    None => Ok(FlowControl::Next),
                }
            }
            StmtKind::While { condition, body } => {
                self.loop_depth += 1;
                let result = self.run_while(condition, body);
                self.loop_depth -= 1;
                result
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                self.loop_depth += 1;
                let result = self.run_for(binding, iterable, body, stmt.span);
                self.loop_depth -= 1;
                result
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    return Err(Diagnostic::runtime("`break` outside a loop", stmt.span).into());
                }
                Ok(FlowControl::Break)
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(Diagnostic::runtime("`continue` outside a loop", stmt.span).into());
                }
                Ok(FlowControl::Continue)
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(FlowControl::Return(value))
            }
            StmtKind::Raise(expr) => {
                let exception = self.evaluate(expr)?;
                self.raised.push(exception);
                Ok(FlowControl::Next)
            }
            // A rescue reached in normal flow runs with a nil argument.
            StmtKind::Rescue(block) => self.run_rescue(block, Value::Nil),
            StmtKind::Native => Ok(FlowControl::Next),
        }
    }

    fn run_block_scope(&mut self, block: &BlockAst) -> Result<FlowControl> {
        let env = Environment::with_parent(Rc::clone(&self.env));
        self.execute_block(&block.body, env)
    }

    fn execute_block(&mut self, body: &[Stmt], env: EnvironmentRef) -> Result<FlowControl> {
        let previous = std::mem::replace(&mut self.env, env);
        let result = self.run_statements(body);
        self.env = previous;
        result
    }

    fn run_rescue(&mut self, block: &BlockAst, exception: Value) -> Result<FlowControl> {
        let env = Environment::with_parent(Rc::clone(&self.env));
        if let Some(param) = block.params.first() {
            env.borrow_mut().define(param, exception);
        }
        self.execute_block(&block.body, env)
    }

    fn run_while(&mut self, condition: &Expr, body: &BlockAst) -> Result<FlowControl> {
        loop {
            if !self.raised.is_empty() {
                return Ok(FlowControl::Next);
            }
            let proceed = self.evaluate(condition)?.is_truthy();
            if !self.raised.is_empty() || !proceed {
                return Ok(FlowControl::Next);
            }
            match self.run_block_scope(body)? {
                FlowControl::Break => return Ok(FlowControl::Next),
                FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                FlowControl::Continue | FlowControl::Next | FlowControl::NextValue(_) => {}
            }
        }
    }

    /// Drives a `for` loop through the iteration protocol: a subject that
    /// itself answers `next/0` is the iterator; otherwise its `iterate/0`
    /// must produce one. Iteration ends when `next` yields nil or an
    /// exception surfaces.
    fn run_for(
        &mut self,
        binding: &str,
        iterable: &Expr,
        body: &BlockAst,
        span: SourceSpan,
    ) -> Result<FlowControl> {
        let subject = self.evaluate(iterable)?;
        if !self.raised.is_empty() {
            return Ok(FlowControl::Next);
        }
        let instance = match &subject {
            Value::Object(instance) => Rc::clone(instance),
            other => {
                return Err(Diagnostic::runtime(
                    format!("cannot iterate over a value of type {}", other.type_name()),
                    span,
                )
                .into())
            }
        };
        let iterator = if Instance::get(&instance, NEXT, Some(0)).is_some() {
            subject
        } else {
            let iterate = Instance::get(&instance, ITERATE, Some(0)).ok_or_else(|| {
                HyacinthError::from(Diagnostic::runtime(
                    "object is not iterable: no `next` or `iterate` method",
                    span,
                ))
            })?;
            self.call_value(iterate, Vec::new(), span)?
        };
        let iterator = match &iterator {
            Value::Object(instance) => Rc::clone(instance),
            other => {
                return Err(Diagnostic::runtime(
                    format!("`iterate` must return an object, got {}", other.type_name()),
                    span,
                )
                .into())
            }
        };

        let loop_env = Environment::with_parent(Rc::clone(&self.env));
        loop {
            if !self.raised.is_empty() {
                return Ok(FlowControl::Next);
            }
            let next = Instance::get(&iterator, NEXT, Some(0)).ok_or_else(|| {
                HyacinthError::from(Diagnostic::runtime("iterator has no `next` method", span))
            })?;
            let item = self.call_value(next, Vec::new(), span)?;
            if !self.raised.is_empty() || item.is_nil() {
                return Ok(FlowControl::Next);
            }
            loop_env.borrow_mut().define(binding, item);
            let body_env = Environment::with_parent(Rc::clone(&loop_env));
            match self.execute_block(&body.body, body_env)? {
                FlowControl::Break => return Ok(FlowControl::Next),
                FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                FlowControl::Continue | FlowControl::Next | FlowControl::NextValue(_) => {}
            }
        }
    }

    /// Evaluates a class declaration. The name is pre-bound to a nil
    /// placeholder so method bodies can refer to the class recursively;
    /// constants and method closures capture a dedicated class scope that
    /// exposes the superclass list as `super`.
    fn execute_class(
        &mut self,
        name: &str,
        superclasses: Option<&[Expr]>,
        constants: &[(String, Expr)],
        methods: &[MethodAst],
        span: SourceSpan,
    ) -> Result<FlowControl> {
        // Root classes always bind globally; everything else binds into
        // the scope the declaration appears in.
        let target = if Class::is_root_name(name) {
            Rc::clone(&self.globals)
        } else {
            Rc::clone(&self.env)
        };
        target.borrow_mut().define(name, Value::Nil);

        let mut supers = Vec::new();
        match superclasses {
            Some(exprs) => {
                for expr in exprs {
                    match self.evaluate(expr)? {
                        Value::Class(class) => supers.push(class),
                        other => {
                            return Err(Diagnostic::runtime(
                                format!("superclass must be a class, got {}", other.type_name()),
                                expr.span,
                            )
                            .into())
                        }
                    }
                }
            }
            None => {
                // Every class descends from Object unless it is a root
                // class itself.
                if !Class::is_root_name(name) {
                    if let Some(Value::Class(object)) = self.global(CLASS_OBJECT) {
                        supers.push(object);
                    }
                }
            }
        }

        let class_env = Environment::with_parent(Rc::clone(&self.env));
        class_env
            .borrow_mut()
            .define(SUPER, Value::Supers(Rc::new(supers.clone())));

        let previous = std::mem::replace(&mut self.env, class_env);
        let mut constant_table = IndexMap::new();
        for (constant_name, expr) in constants {
            let value = self.evaluate(expr);
            match value {
                Ok(value) => {
                    constant_table.insert(constant_name.clone(), value);
                }
                Err(err) => {
                    self.env = previous;
                    return Err(err);
                }
            }
        }
        let mut method_table = IndexMap::new();
        for method in methods {
            let function = Rc::new(Function {
                name: Some(method.name.clone()),
                block: Rc::clone(&method.block),
                closure: Rc::clone(&self.env),
                is_initializer: method.name == INIT || method.name == PRIVATE_INIT,
                is_native: method.block.is_native(),
            });
            method_table.insert(
                OverloadKey {
                    name: method.name.clone(),
                    arity: method.block.arity(),
                },
                function,
            );
        }
        self.env = previous;

        let class = Rc::new(Class {
            name: name.to_string(),
            superclasses: supers,
            constants: constant_table,
            methods: method_table,
        });
        Environment::assign(&target, name, Value::Class(class), false, span)?;
        Ok(FlowControl::Next)
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Nil => Value::Nil,
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            ExprKind::Variable(name) => Environment::get(&self.env, name, expr.span),
            ExprKind::SelfExpr => Environment::try_get(&self.env, SELF).ok_or_else(|| {
                Diagnostic::runtime("`self` used outside of a method", expr.span).into()
            }),
            ExprKind::Super { method, arity } => self.evaluate_super(method, *arity, expr.span),
            ExprKind::Assign { name, value } => {
                let computed = match &value.kind {
                    // A block on the right-hand side becomes a named
                    // function closing over the current scope.
                    ExprKind::Block(block) => Value::Callable(Callable::function(Rc::new(
                        Function {
                            name: Some(name.clone()),
                            block: Rc::clone(block),
                            closure: Rc::clone(&self.env),
                            is_initializer: false,
                            is_native: block.is_native(),
                        },
                    ))),
                    _ => self.evaluate(value)?,
                };
                Environment::assign(&self.env, name, computed.clone(), false, expr.span)?;
                Ok(computed)
            }
            ExprKind::Binary { op, left, right } => {
                if *op == BinaryOp::Coalesce {
                    let left = self.evaluate(left)?;
                    if !left.is_nil() {
                        return Ok(left);
                    }
                    return self.evaluate(right);
                }
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.binary(*op, left, right, expr.span)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.evaluate(left)?;
                match op {
                    LogicalOp::And if !left.is_truthy() => Ok(left),
                    LogicalOp::Or if left.is_truthy() => Ok(left),
                    _ => self.evaluate(right),
                }
            }
            ExprKind::Unary { op, expr: inner } => {
                let value = self.evaluate(inner)?;
                match op {
                    UnaryOp::Negate => Ok(Value::Number(-value.expect_number(inner.span)?)),
                    UnaryOp::Not => Ok(Value::bool(!value.is_truthy())),
                }
            }
            ExprKind::Call { callee, args } => {
                let target = self.evaluate(callee)?;
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.evaluate(arg)?);
                }
                if !self.raised.is_empty() {
                    return Ok(Value::Nil);
                }
                self.call_value(target, arguments, expr.span)
            }
            ExprKind::Get {
                object,
                name,
                arity,
            } => {
                let subject = self.evaluate(object)?;
                let key = self.member_key(name, expr.span)?;
                self.get_member(&subject, key, *arity, expr.span)
            }
            ExprKind::Set {
                object,
                name,
                value,
            } => {
                let subject = self.evaluate(object)?;
                let key = self.member_key(name, expr.span)?;
                let value = self.evaluate(value)?;
                self.set_member(&subject, key, value.clone(), expr.span)?;
                Ok(value)
            }
            ExprKind::Group(inner) => self.evaluate(inner),
            ExprKind::Block(block) => Ok(Value::Callable(Callable::function(Rc::new(Function {
                name: None,
                block: Rc::clone(block),
                closure: Rc::clone(&self.env),
                is_initializer: false,
                is_native: block.is_native(),
            })))),
            ExprKind::ObjectLiteral { mutable, entries } => {
                self.object_literal(*mutable, entries)
            }
        }
    }

    fn evaluate_super(
        &mut self,
        method: &str,
        arity: Option<usize>,
        span: SourceSpan,
    ) -> Result<Value> {
        let supers = match Environment::try_get(&self.env, SUPER) {
            Some(Value::Supers(list)) => list,
            _ => {
                return Err(
                    Diagnostic::runtime("`super` used outside of a class method", span).into(),
                )
            }
        };
        let receiver = Environment::try_get(&self.env, SELF);
        Class::resolve_on_all(&supers, receiver.as_ref(), method, arity)
            .map(Value::Callable)
            .ok_or_else(|| {
                Diagnostic::runtime(format!("no superclass method `{method}`"), span).into()
            })
    }

    fn member_key(&mut self, name: &MemberName, span: SourceSpan) -> Result<MemberKey> {
        match name {
            MemberName::Ident(name) => Ok(MemberKey::Name(name.clone())),
            MemberName::Computed(expr) => match self.evaluate(expr)? {
                Value::Str(name) => Ok(MemberKey::Name(name)),
                Value::Number(n) if n >= 0.0 => Ok(MemberKey::Index(n as usize)),
                other => Err(Diagnostic::runtime(
                    format!(
                        "computed member must be a string or non-negative number, got {}",
                        other.type_name()
                    ),
                    span,
                )
                .into()),
            },
        }
    }

    fn get_member(
        &mut self,
        subject: &Value,
        key: MemberKey,
        arity: Option<usize>,
        span: SourceSpan,
    ) -> Result<Value> {
        match (subject, key) {
            (Value::Object(instance), MemberKey::Name(name)) => {
                Instance::get(instance, &name, arity).ok_or_else(|| {
                    Diagnostic::runtime(format!("undefined property `{name}`"), span).into()
                })
            }
            (Value::Object(instance), MemberKey::Index(index)) => instance
                .borrow()
                .fields
                .get_index(index)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| {
                    HyacinthError::from(Diagnostic::runtime(
                        format!("object has no field at index {index}"),
                        span,
                    ))
                }),
            (Value::Class(class), MemberKey::Name(name)) => {
                class.get(&name, arity).ok_or_else(|| {
                    Diagnostic::runtime(
                        format!("undefined property `{}` on class `{}`", name, class.name),
                        span,
                    )
                    .into()
                })
            }
            (Value::Number(_), MemberKey::Name(name)) => {
                self.primitive_member(CLASS_NUMBER, subject, &name, arity, span)
            }
            (Value::Str(_), MemberKey::Name(name)) => {
                self.primitive_member(CLASS_STRING, subject, &name, arity, span)
            }
            (other, _) => Err(Diagnostic::runtime(
                format!("a value of type {} has no properties", other.type_name()),
                span,
            )
            .into()),
        }
    }

    /// Numbers and strings dispatch methods through their wrapper class.
    fn primitive_member(
        &mut self,
        class_name: &str,
        receiver: &Value,
        name: &str,
        arity: Option<usize>,
        span: SourceSpan,
    ) -> Result<Value> {
        let class = match self.global(class_name) {
            Some(Value::Class(class)) => class,
            _ => {
                return Err(Diagnostic::runtime(
                    format!("the {class_name} class is not installed"),
                    span,
                )
                .into())
            }
        };
        class
            .find_method(Some(receiver), name, arity)
            .map(Value::Callable)
            .ok_or_else(|| {
                Diagnostic::runtime(
                    format!("undefined property `{name}` on {class_name}"),
                    span,
                )
                .into()
            })
    }

    fn set_member(
        &mut self,
        subject: &Value,
        key: MemberKey,
        value: Value,
        span: SourceSpan,
    ) -> Result<()> {
        let instance = match subject {
            Value::Object(instance) => instance,
            other => {
                return Err(Diagnostic::runtime(
                    format!("cannot set a property on a value of type {}", other.type_name()),
                    span,
                )
                .into())
            }
        };
        match key {
            MemberKey::Name(name) => Instance::set(instance, &name, value, span),
            MemberKey::Index(index) => {
                if instance.borrow().immutable {
                    return Err(
                        Diagnostic::runtime("cannot modify an immutable object", span).into()
                    );
                }
                let mut borrowed = instance.borrow_mut();
                match borrowed.fields.get_index_mut(index) {
                    Some((_, slot)) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(Diagnostic::runtime(
                        format!("object has no field at index {index}"),
                        span,
                    )
                    .into()),
                }
            }
        }
    }

    fn object_literal(&mut self, mutable: bool, entries: &[ObjectEntry]) -> Result<Value> {
        let class = match self.global(CLASS_OBJECT) {
            Some(Value::Class(class)) => Some(class),
            _ => None,
        };
        let mut fields = IndexMap::new();
        let mut positional = 0usize;
        for entry in entries {
            match entry {
                ObjectEntry::Positional(expr) => {
                    let value = self.evaluate(expr)?;
                    fields.insert(format!("_{positional}"), value);
                    positional += 1;
                }
                ObjectEntry::Named(name, expr) => {
                    let value = self.evaluate(expr)?;
                    fields.insert(name.clone(), value);
                }
            }
        }
        Ok(Value::Object(Instance::new(class, fields, !mutable)))
    }

    pub fn call_value(&mut self, target: Value, args: Vec<Value>, span: SourceSpan) -> Result<Value> {
        match target {
            Value::Class(class) => self.construct(class, args, span),
            Value::Callable(callable) => self.invoke(&callable, args, span),
            other => Err(Diagnostic::runtime(
                format!("cannot call a value of type {}", other.type_name()),
                span,
            )
            .into()),
        }
    }

    /// Calls a resolved callable. Loop bookkeeping does not cross the
    /// call boundary, so a `break` inside a function body needs its own
    /// enclosing loop.
    fn invoke(&mut self, callable: &Callable, args: Vec<Value>, span: SourceSpan) -> Result<Value> {
        match &callable.kind {
            CallableKind::Native(native) => {
                if args.len() != native.arity {
                    return Err(Diagnostic::runtime(
                        format!(
                            "`{}` expects {} argument(s), got {}",
                            native.name,
                            native.arity,
                            args.len()
                        ),
                        span,
                    )
                    .into());
                }
                (native.callback)(self, &args)
            }
            CallableKind::Function(function) => {
                let declared = function.arity();
                let mut args = args;
                if args.len() != declared {
                    // Fallback-resolved overloads accept surplus
                    // arguments and drop the excess.
                    if callable.via_fallback && args.len() > declared {
                        args.truncate(declared);
                    } else {
                        let name = callable.name.as_deref().unwrap_or("block");
                        return Err(Diagnostic::runtime(
                            format!(
                                "`{name}` expects {declared} argument(s), got {}",
                                args.len()
                            ),
                            span,
                        )
                        .into());
                    }
                }
                if function.is_native {
                    return self.invoke_native_method(callable, function, args, span);
                }
                let env = Environment::with_parent(Rc::clone(&function.closure));
                for (param, arg) in function.block.params.iter().zip(args) {
                    env.borrow_mut().define(param, arg);
                }
                let saved_depth = std::mem::replace(&mut self.loop_depth, 0);
                let flow = self.execute_block(&function.block.body, env);
                self.loop_depth = saved_depth;
                let result = match flow? {
                    FlowControl::Return(value) => value,
                    // The value of the final statement is the implicit
                    // result of a block body.
                    FlowControl::NextValue(value) => value,
                    _ => Value::Nil,
                };
                if function.is_initializer {
                    return Ok(callable.receiver.clone().map(|boxed| *boxed).unwrap_or(result));
                }
                Ok(result)
            }
        }
    }

    /// Bridges a native-flagged method to its registry entry. The lookup
    /// tries the receiver's concrete class name first so subclasses can
    /// shadow a native, then the shared `Globals` namespace.
    fn invoke_native_method(
        &mut self,
        callable: &Callable,
        function: &Function,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Value> {
        let receiver = callable.receiver.clone().map(|boxed| *boxed).unwrap_or(Value::Nil);
        let method_name = match function.name.as_deref().or(callable.name.as_deref()) {
            Some(name) => name.to_string(),
            None => {
                return Err(Diagnostic::runtime("native method without a name", span).into());
            }
        };
        let class_name = match &receiver {
            Value::Object(instance) => {
                instance.borrow().class.as_ref().map(|class| class.name.clone())
            }
            Value::Class(class) => Some(class.name.clone()),
            Value::Number(_) => Some(CLASS_NUMBER.to_string()),
            Value::Str(_) => Some(CLASS_STRING.to_string()),
            _ => None,
        };
        let declared = function.arity();
        let native = class_name
            .as_deref()
            .and_then(|name| self.registry.lookup(name, &method_name, declared))
            .or_else(|| self.registry.lookup(CLASS_GLOBALS, &method_name, declared))
            .ok_or_else(|| {
                HyacinthError::from(Diagnostic::runtime(
                    format!("no native implementation for `{method_name}/{declared}`"),
                    span,
                ))
            })?;
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(receiver);
        full_args.extend(args);
        (native.callback)(self, &full_args)
    }

    /// Instantiates a class: a fresh mutable instance, then the matching
    /// `init` (or private `_init`) overload. A class without an
    /// initializer still constructs when called with no arguments.
    fn construct(&mut self, class: Rc<Class>, args: Vec<Value>, span: SourceSpan) -> Result<Value> {
        let instance = Instance::new(Some(Rc::clone(&class)), IndexMap::new(), false);
        let receiver = Value::Object(Rc::clone(&instance));
        let initializer = class
            .find_method(Some(&receiver), INIT, Some(args.len()))
            .or_else(|| class.find_method(Some(&receiver), PRIVATE_INIT, Some(args.len())));
        // A class without a matching initializer still constructs; the
        // instance is simply left default-initialized.
        if let Some(init) = initializer {
            self.invoke(&init, args, span)?;
        }
        Ok(receiver)
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value, span: SourceSpan) -> Result<Value> {
        match op {
            BinaryOp::Add => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
                _ => Err(Diagnostic::runtime(
                    format!("cannot add {} and {}", left.type_name(), right.type_name()),
                    span,
                )
                .into()),
            },
            BinaryOp::Sub => Ok(Value::Number(
                left.expect_number(span)? - right.expect_number(span)?,
            )),
            BinaryOp::Mul => Ok(Value::Number(
                left.expect_number(span)? * right.expect_number(span)?,
            )),
            BinaryOp::Div => Ok(Value::Number(
                left.expect_number(span)? / right.expect_number(span)?,
            )),
            BinaryOp::Mod => Ok(Value::Number(
                left.expect_number(span)? % right.expect_number(span)?,
            )),
            BinaryOp::Equal => Ok(Value::bool(self.values_equal(&left, &right, span)?)),
            BinaryOp::NotEqual => Ok(Value::bool(!self.values_equal(&left, &right, span)?)),
            BinaryOp::Less => Ok(Value::bool(self.compare_values(&left, &right, span)? < 0)),
            BinaryOp::LessEqual => Ok(Value::bool(self.compare_values(&left, &right, span)? <= 0)),
            BinaryOp::Greater => Ok(Value::bool(self.compare_values(&left, &right, span)? > 0)),
            BinaryOp::GreaterEqual => {
                Ok(Value::bool(self.compare_values(&left, &right, span)? >= 0))
            }
            BinaryOp::Compare => Ok(Value::Number(
                self.compare_values(&left, &right, span)? as f64,
            )),
            BinaryOp::Is => Ok(Value::bool(self.is_instance(&left, &right, span)?)),
            BinaryOp::IsNot => Ok(Value::bool(!self.is_instance(&left, &right, span)?)),
            BinaryOp::In => Ok(Value::bool(self.contains(&right, &left, span)?)),
            BinaryOp::NotIn => Ok(Value::bool(!self.contains(&right, &left, span)?)),
            // Coalesce short-circuits in `evaluate`; this arm only fires
            // for pre-evaluated operands.
            BinaryOp::Coalesce => Ok(if left.is_nil() { right } else { left }),
        }
    }

    /// `==` dispatches a user-level `equals/1` when the left operand is
    /// an object; everything else falls back to structural equality.
    fn values_equal(&mut self, left: &Value, right: &Value, span: SourceSpan) -> Result<bool> {
        if let Value::Object(instance) = left {
            if let Some(Value::Callable(equals)) = Instance::get(instance, EQUALS, Some(1)) {
                let result = self.invoke(&equals, vec![right.clone()], span)?;
                return Ok(result.is_truthy());
            }
        }
        Ok(strict_equals(left, right))
    }

    /// Three-way comparison backing `<`, `<=`, `>`, `>=` and `<>`.
    /// Objects delegate to their `compareTo/1`, which must yield a
    /// number.
    fn compare_values(&mut self, left: &Value, right: &Value, span: SourceSpan) -> Result<i32> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(if a < b {
                -1
            } else if a > b {
                1
            } else {
                0
            }),
            (Value::Object(instance), _) => {
                if let Some(Value::Callable(compare)) =
                    Instance::get(instance, COMPARE_TO, Some(1))
                {
                    let result = self.invoke(&compare, vec![right.clone()], span)?;
                    let n = result.expect_number(span)?;
                    return Ok(if n < 0.0 {
                        -1
                    } else if n > 0.0 {
                        1
                    } else {
                        0
                    });
                }
                Err(Diagnostic::runtime(
                    "object does not define `compareTo`",
                    span,
                )
                .into())
            }
            _ => Err(Diagnostic::runtime(
                format!(
                    "cannot compare {} with {}",
                    left.type_name(),
                    right.type_name()
                ),
                span,
            )
            .into()),
        }
    }

    /// `is` / `isnot`: class membership through the transitive superclass
    /// set; numbers and strings answer through their wrapper classes.
    fn is_instance(&mut self, value: &Value, class: &Value, span: SourceSpan) -> Result<bool> {
        let target = match class {
            Value::Class(class) => class,
            other => {
                return Err(Diagnostic::runtime(
                    format!(
                        "right-hand side of `is` must be a class, got {}",
                        other.type_name()
                    ),
                    span,
                )
                .into())
            }
        };
        Ok(match value {
            Value::Object(instance) => instance.borrow().is_instance_of(target),
            Value::Class(class) => class.is_subclass_of(target),
            Value::Number(_) => self.primitive_is(CLASS_NUMBER, target),
            Value::Str(_) => self.primitive_is(CLASS_STRING, target),
            _ => false,
        })
    }

    fn primitive_is(&self, class_name: &str, target: &Rc<Class>) -> bool {
        match self.global(class_name) {
            Some(Value::Class(class)) => class.is_subclass_of(target),
            _ => false,
        }
    }

    /// `in` / `notin`: membership dispatches `has/1` on the container;
    /// strings answer through their wrapper class's native `has`.
    fn contains(&mut self, container: &Value, item: &Value, span: SourceSpan) -> Result<bool> {
        match container {
            Value::Str(_) => {
                let has = self.primitive_member(CLASS_STRING, container, HAS, Some(1), span)?;
                match has {
                    Value::Callable(has) => {
                        let result = self.invoke(&has, vec![item.clone()], span)?;
                        Ok(result.is_truthy())
                    }
                    _ => Ok(false),
                }
            }
            Value::Object(instance) => {
                if let Some(Value::Callable(has)) = Instance::get(instance, HAS, Some(1)) {
                    let result = self.invoke(&has, vec![item.clone()], span)?;
                    return Ok(result.is_truthy());
                }
                Ok(false)
            }
            other => Err(Diagnostic::runtime(
                format!(
                    "right-hand side of `in` must be an object or string, got {}",
                    other.type_name()
                ),
                span,
            )
            .into()),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefers an exception object's `message` field when describing an
/// escaped exception.
fn describe_exception(exception: &Value) -> String {
    if let Value::Object(instance) = exception {
        if let Some(message) = instance.borrow().fields.get("message") {
            return message.to_string();
        }
    }
    exception.to_string()
}
