use std::rc::Rc;

use crate::diagnostics::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Compare,
    Is,
    IsNot,
    In,
    NotIn,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// A first-class statement sequence with parameters. Blocks serve as
/// function and method bodies and may be passed around as values; the
/// evaluator pairs them with a captured environment at that point.
#[derive(Debug, Clone)]
pub struct BlockAst {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

impl BlockAst {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// A body consisting solely of the `native` marker statement declares
    /// that the implementation lives in the native-method registry.
    pub fn is_native(&self) -> bool {
        matches!(self.body.as_slice(), [stmt] if matches!(stmt.kind, StmtKind::Native))
    }
}

/// A getter/setter name: either a plain identifier or a computed
/// expression that must evaluate to a number or string at runtime.
#[derive(Debug, Clone)]
pub enum MemberName {
    Ident(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ObjectEntry {
    Positional(Expr),
    Named(String, Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    SelfExpr,
    /// `super.method(...)`; resolved against the superclass list the
    /// enclosing class body bound into scope.
    Super {
        method: String,
        arity: Option<usize>,
    },
    /// Assignment doubles as definition: an unbound name is created in the
    /// innermost scope, a bound one is reassigned where it lives.
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `arity` is filled in by the parser when the access is immediately
    /// called, enabling overload selection at lookup time.
    Get {
        object: Box<Expr>,
        name: MemberName,
        arity: Option<usize>,
    },
    Set {
        object: Box<Expr>,
        name: MemberName,
        value: Box<Expr>,
    },
    Group(Box<Expr>),
    Block(Rc<BlockAst>),
    /// `[...]` (immutable) or `$[...]` (mutable) object literal.
    ObjectLiteral {
        mutable: bool,
        entries: Vec<ObjectEntry>,
    },
}

#[derive(Debug, Clone)]
pub struct MethodAst {
    pub name: String,
    pub block: Rc<BlockAst>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expression(Expr),
    Print(Expr),
    Class {
        name: String,
        /// `None` means no superclass list was written, which implies the
        /// implicit `Object` root unless the class itself is a root class.
        superclasses: Option<Vec<Expr>>,
        constants: Vec<(String, Expr)>,
        methods: Vec<MethodAst>,
    },
    If {
        branches: Vec<(Expr, Rc<BlockAst>)>,
        else_branch: Option<Rc<BlockAst>>,
    },
    While {
        condition: Expr,
        body: Rc<BlockAst>,
    },
    For {
        binding: String,
        iterable: Expr,
        body: Rc<BlockAst>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Raise(Expr),
    /// An exception handler local to the enclosing block; its block takes
    /// the consumed exception as its single parameter.
    Rescue(Rc<BlockAst>),
    /// Marker body of a native method; a no-op when executed directly.
    Native,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
}
