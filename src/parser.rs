use std::rc::Rc;

use crate::{
    ast::{
        BinaryOp, BlockAst, Expr, ExprKind, Literal, LogicalOp, MemberName, MethodAst, ObjectEntry,
        Program, Stmt, StmtKind, UnaryOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, Result, SourceSpan},
    lexer::{Keyword, Token, TokenKind},
};

/// Recursive-descent parser over the token stream. Statement separators
/// are optional; a semicolon merely terminates an expression statement
/// early.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(mut self) -> Result<Program> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if self.matches(&TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.statement()?);
        }
        Ok(Program { statements })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.current += 1;
        }
        token
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    fn error_at_current(&self, message: &str) -> crate::diagnostics::HyacinthError {
        Diagnostic::new(DiagnosticKind::Parser, message)
            .with_span(self.peek().span)
            .into()
    }

    fn span_from(&self, start: SourceSpan) -> SourceSpan {
        SourceSpan::new(start.start, self.previous().span.end)
    }

    fn identifier(&mut self, message: &str) -> Result<Token> {
        if self.check(&TokenKind::Identifier) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    // ---- statements ------------------------------------------------

    fn statement(&mut self) -> Result<Stmt> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Keyword(Keyword::Class) => self.class_statement(),
            TokenKind::Keyword(Keyword::If) => self.if_statement(),
            TokenKind::Keyword(Keyword::While) => self.while_statement(),
            TokenKind::Keyword(Keyword::For) => self.for_statement(),
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.terminator();
                Ok(Stmt {
                    kind: StmtKind::Break,
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.terminator();
                Ok(Stmt {
                    kind: StmtKind::Continue,
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::Return) => self.return_statement(),
            TokenKind::Keyword(Keyword::Print) => {
                self.advance();
                let expr = self.expression()?;
                self.terminator();
                Ok(Stmt {
                    span: self.span_from(token.span),
                    kind: StmtKind::Print(expr),
                })
            }
            TokenKind::Keyword(Keyword::Raise) => {
                self.advance();
                let expr = self.expression()?;
                self.terminator();
                Ok(Stmt {
                    span: self.span_from(token.span),
                    kind: StmtKind::Raise(expr),
                })
            }
            TokenKind::Keyword(Keyword::Rescue) => {
                self.advance();
                let block = self.block_literal()?;
                Ok(Stmt {
                    span: self.span_from(token.span),
                    kind: StmtKind::Rescue(block),
                })
            }
            TokenKind::Keyword(Keyword::Native) => {
                self.advance();
                self.terminator();
                Ok(Stmt {
                    kind: StmtKind::Native,
                    span: token.span,
                })
            }
            _ => {
                let expr = self.expression()?;
                self.terminator();
                Ok(Stmt {
                    span: expr.span,
                    kind: StmtKind::Expression(expr),
                })
            }
        }
    }

    /// Eats an optional statement separator.
    fn terminator(&mut self) {
        self.matches(&TokenKind::Semicolon);
    }

    fn class_statement(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let name = self.identifier("expected a class name")?.lexeme;

        let superclasses = if self.matches(&TokenKind::LParen) {
            let mut list = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    list.push(self.expression()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(&TokenKind::RParen, "expected `)` after the superclass list")?;
            Some(list)
        } else {
            None
        };

        self.consume(&TokenKind::LBrace, "expected `{` before the class body")?;
        let mut constants = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            if self.matches(&TokenKind::Semicolon) {
                continue;
            }
            let member = self.identifier("expected a constant or method name")?;
            if self.matches(&TokenKind::Assign) {
                let value = self.expression()?;
                self.terminator();
                constants.push((member.lexeme, value));
            } else if self.check(&TokenKind::LParen) {
                let params = self.parameter_list()?;
                self.consume(&TokenKind::LBrace, "expected `{` before the method body")?;
                let body = self.statement_list()?;
                methods.push(MethodAst {
                    span: self.span_from(member.span),
                    name: member.lexeme,
                    block: Rc::new(BlockAst { params, body }),
                });
            } else {
                return Err(self.error_at_current("expected `=` or `(` after the member name"));
            }
        }
        self.consume(&TokenKind::RBrace, "expected `}` after the class body")?;

        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Class {
                name,
                superclasses,
                constants,
                methods,
            },
        })
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let mut branches = Vec::new();
        let condition = self.expression()?;
        branches.push((condition, self.brace_block()?));
        let mut else_branch = None;
        loop {
            if self.matches(&TokenKind::Keyword(Keyword::Elsif)) {
                let condition = self.expression()?;
                branches.push((condition, self.brace_block()?));
            } else if self.matches(&TokenKind::Keyword(Keyword::Else)) {
                else_branch = Some(self.brace_block()?);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::If {
                branches,
                else_branch,
            },
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let condition = self.expression()?;
        let body = self.brace_block()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::While { condition, body },
        })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let binding = self.identifier("expected a loop variable")?.lexeme;
        self.consume(
            &TokenKind::Keyword(Keyword::In),
            "expected `in` after the loop variable",
        )?;
        let iterable = self.expression()?;
        let body = self.brace_block()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::For {
                binding,
                iterable,
                body,
            },
        })
    }

    fn return_statement(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let value = if self.check(&TokenKind::RBrace)
            || self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::Eof)
        {
            None
        } else {
            Some(self.expression()?)
        };
        self.terminator();
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Return(value),
        })
    }

    /// A parameterless `{ ... }` block used as a statement body.
    fn brace_block(&mut self) -> Result<Rc<BlockAst>> {
        self.consume(&TokenKind::LBrace, "expected `{`")?;
        let body = self.statement_list()?;
        Ok(Rc::new(BlockAst {
            params: Vec::new(),
            body,
        }))
    }

    /// Statements up to the closing `}` of the current block.
    fn statement_list(&mut self) -> Result<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            if self.matches(&TokenKind::Semicolon) {
                continue;
            }
            body.push(self.statement()?);
        }
        self.consume(&TokenKind::RBrace, "expected `}` after the block")?;
        Ok(body)
    }

    fn parameter_list(&mut self) -> Result<Vec<String>> {
        self.consume(&TokenKind::LParen, "expected `(` before the parameters")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.identifier("expected a parameter name")?.lexeme);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RParen, "expected `)` after the parameters")?;
        Ok(params)
    }

    /// A block literal: `{ ... }` or `|a, b| { ... }`.
    fn block_literal(&mut self) -> Result<Rc<BlockAst>> {
        let mut params = Vec::new();
        if self.matches(&TokenKind::Pipe) {
            if !self.check(&TokenKind::Pipe) {
                loop {
                    params.push(self.identifier("expected a parameter name")?.lexeme);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(&TokenKind::Pipe, "expected `|` after the block parameters")?;
        }
        self.consume(&TokenKind::LBrace, "expected `{` before the block body")?;
        let body = self.statement_list()?;
        Ok(Rc::new(BlockAst { params, body }))
    }

    // ---- expressions -----------------------------------------------

    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let target = self.coalesce()?;
        if !self.matches(&TokenKind::Assign) {
            return Ok(target);
        }
        let value = self.assignment()?;
        let span = SourceSpan::new(target.span.start, value.span.end);
        match target.kind {
            ExprKind::Variable(name) => Ok(Expr {
                kind: ExprKind::Assign {
                    name,
                    value: Box::new(value),
                },
                span,
            }),
            ExprKind::Get { object, name, .. } => Ok(Expr {
                kind: ExprKind::Set {
                    object,
                    name,
                    value: Box::new(value),
                },
                span,
            }),
            _ => Err(Diagnostic::new(DiagnosticKind::Parser, "invalid assignment target")
                .with_span(target.span)
                .into()),
        }
    }

    fn coalesce(&mut self) -> Result<Expr> {
        let mut expr = self.or()?;
        while self.matches(&TokenKind::QuestionQuestion) {
            let right = self.or()?;
            expr = binary(BinaryOp::Coalesce, expr, right);
        }
        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut expr = self.and()?;
        while self.matches(&TokenKind::Keyword(Keyword::Or)) {
            let right = self.and()?;
            expr = logical(LogicalOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut expr = self.equality()?;
        while self.matches(&TokenKind::Keyword(Keyword::And)) {
            let right = self.equality()?;
            expr = logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.matches(&TokenKind::EqualEqual) {
                BinaryOp::Equal
            } else if self.matches(&TokenKind::BangEqual) {
                BinaryOp::NotEqual
            } else if self.matches(&TokenKind::Keyword(Keyword::Is)) {
                BinaryOp::Is
            } else if self.matches(&TokenKind::Keyword(Keyword::IsNot)) {
                BinaryOp::IsNot
            } else if self.matches(&TokenKind::Keyword(Keyword::In)) {
                BinaryOp::In
            } else if self.matches(&TokenKind::Keyword(Keyword::NotIn)) {
                BinaryOp::NotIn
            } else {
                break;
            };
            let right = self.comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut expr = self.term()?;
        loop {
            let op = if self.matches(&TokenKind::Less) {
                BinaryOp::Less
            } else if self.matches(&TokenKind::LessEqual) {
                BinaryOp::LessEqual
            } else if self.matches(&TokenKind::Greater) {
                BinaryOp::Greater
            } else if self.matches(&TokenKind::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else if self.matches(&TokenKind::Compare) {
                BinaryOp::Compare
            } else {
                break;
            };
            let right = self.term()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = if self.matches(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.matches(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.factor()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = if self.matches(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.matches(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.matches(&TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.unary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = if self.check(&TokenKind::Minus) {
            Some(UnaryOp::Negate)
        } else if self.check(&TokenKind::Keyword(Keyword::Not)) {
            Some(UnaryOp::Not)
        } else {
            None
        };
        match op {
            Some(op) => {
                let start = self.advance().span;
                let expr = self.unary()?;
                Ok(Expr {
                    span: SourceSpan::new(start.start, expr.span.end),
                    kind: ExprKind::Unary {
                        op,
                        expr: Box::new(expr),
                    },
                })
            }
            None => self.call(),
        }
    }

    fn call(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(&TokenKind::LParen) {
                expr = self.finish_call(expr)?;
            } else if self.matches(&TokenKind::Dot) {
                expr = self.member_access(expr)?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RParen, "expected `)` after the arguments")?;
        let span = self.span_from(callee.span);
        // An immediately called access carries the argument count so
        // member lookup can pick among overloads.
        let callee = match callee.kind {
            ExprKind::Get { object, name, .. } => Expr {
                kind: ExprKind::Get {
                    object,
                    name,
                    arity: Some(args.len()),
                },
                span: callee.span,
            },
            ExprKind::Super { method, .. } => Expr {
                kind: ExprKind::Super {
                    method,
                    arity: Some(args.len()),
                },
                span: callee.span,
            },
            _ => callee,
        };
        Ok(Expr {
            kind: ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            span,
        })
    }

    fn member_access(&mut self, object: Expr) -> Result<Expr> {
        let name = if self.check(&TokenKind::Identifier) {
            MemberName::Ident(self.advance().lexeme)
        } else if self.check(&TokenKind::Number) {
            let token = self.advance();
            let index = token.lexeme.parse::<f64>().map_err(|_| {
                crate::diagnostics::HyacinthError::from(
                    Diagnostic::new(DiagnosticKind::Parser, "invalid numeric member")
                        .with_span(token.span),
                )
            })?;
            MemberName::Computed(Box::new(Expr {
                kind: ExprKind::Literal(Literal::Number(index)),
                span: token.span,
            }))
        } else if self.matches(&TokenKind::LParen) {
            let expr = self.expression()?;
            self.consume(&TokenKind::RParen, "expected `)` after the computed member")?;
            MemberName::Computed(Box::new(expr))
        } else {
            return Err(self.error_at_current("expected a member name after `.`"));
        };
        let span = self.span_from(object.span);
        Ok(Expr {
            kind: ExprKind::Get {
                object: Box::new(object),
                name,
                arity: None,
            },
            span,
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        let kind = match &token.kind {
            TokenKind::Number => {
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    crate::diagnostics::HyacinthError::from(
                        Diagnostic::new(DiagnosticKind::Parser, "invalid number literal")
                            .with_span(token.span),
                    )
                })?;
                ExprKind::Literal(Literal::Number(value))
            }
            TokenKind::String => ExprKind::Literal(Literal::Str(token.lexeme.clone())),
            TokenKind::Keyword(Keyword::Nil) => ExprKind::Literal(Literal::Nil),
            // There is no boolean type; `true` and `false` read as the
            // numbers 1 and 0.
            TokenKind::Keyword(Keyword::True) => ExprKind::Literal(Literal::Number(1.0)),
            TokenKind::Keyword(Keyword::False) => ExprKind::Literal(Literal::Number(0.0)),
            TokenKind::Keyword(Keyword::SelfKw) => ExprKind::SelfExpr,
            TokenKind::Keyword(Keyword::Super) => {
                self.consume(&TokenKind::Dot, "expected `.` after `super`")?;
                let method = self.identifier("expected a method name after `super.`")?;
                ExprKind::Super {
                    method: method.lexeme,
                    arity: None,
                }
            }
            TokenKind::Identifier => ExprKind::Variable(token.lexeme.clone()),
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.consume(&TokenKind::RParen, "expected `)` after the expression")?;
                ExprKind::Group(Box::new(expr))
            }
            TokenKind::LBracket => {
                let entries = self.object_entries()?;
                ExprKind::ObjectLiteral {
                    mutable: false,
                    entries,
                }
            }
            TokenKind::DollarBracket => {
                let entries = self.object_entries()?;
                ExprKind::ObjectLiteral {
                    mutable: true,
                    entries,
                }
            }
            TokenKind::LBrace | TokenKind::Pipe => {
                // Rewind so block_literal sees the opening token.
                self.current -= 1;
                let block = self.block_literal()?;
                ExprKind::Block(block)
            }
            _ => return Err(self.error_at_current("expected an expression")),
        };
        Ok(Expr {
            kind,
            span: self.span_from(token.span),
        })
    }

    /// Entries of an object literal: `name = expr` pairs or positional
    /// expressions, freely mixed.
    fn object_entries(&mut self) -> Result<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                let named = self.check(&TokenKind::Identifier)
                    && matches!(
                        self.tokens.get(self.current + 1).map(|t| &t.kind),
                        Some(TokenKind::Assign)
                    );
                if named {
                    let name = self.advance().lexeme;
                    self.advance();
                    let value = self.expression()?;
                    entries.push(ObjectEntry::Named(name, value));
                } else {
                    entries.push(ObjectEntry::Positional(self.expression()?));
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RBracket, "expected `]` after the object literal")?;
        Ok(entries)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: SourceSpan::new(left.span.start, right.span.end),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: SourceSpan::new(left.span.start, right.span.end),
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}
