//! Recursive-descent parser producing [`Program`]s.
//!
//! Follows the shape of the Go grammar closely enough that generated guest
//! programs parse unchanged. `expr_lev` mirrors the reference parser: it is
//! negative inside `if`/`for`/`switch` headers, where `T {` starts the block
//! rather than a composite literal.

use std::rc::Rc;

use crate::ast::*;
use crate::error::{ParseError, Pos};
use crate::lexer::{tokenize, Token, TokenKind};

const MAX_NESTING: usize = 200;

/// Parse a complete guest program.
pub fn parse_program(src: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(src)?;
    Parser::new(tokens).program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    expr_lev: i32,
    depth: usize,
}

enum Simple {
    Stmt(Stmt),
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        iter: Expr,
    },
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            expr_lev: 0,
            depth: 0,
        }
    }

    // ------------------------------------------------------------------
    // token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn here(&self) -> Pos {
        self.tokens[self.pos.min(self.tokens.len() - 1)].pos
    }

    fn line(&self) -> u32 {
        self.here().line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError::new(self.here(), message))
    }

    fn unexpected<T>(&self, expecting: &str) -> Result<T, ParseError> {
        self.error(format!(
            "unexpected {}, expecting {expecting}",
            describe(self.peek())
        ))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ParseError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            self.unexpected(what)
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => self.unexpected("name"),
        }
    }

    fn skip_semis(&mut self) {
        while self.eat(&TokenKind::Semi) {}
    }

    /// A statement terminator; optional before a closing `)` or `}`.
    fn expect_semi(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            TokenKind::Semi => {
                self.advance();
                Ok(())
            }
            TokenKind::RParen | TokenKind::RBrace | TokenKind::Eof => Ok(()),
            _ => self.unexpected("newline or ;"),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return self.error("program nested too deeply");
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ------------------------------------------------------------------
    // file level
    // ------------------------------------------------------------------

    fn program(mut self) -> Result<Program, ParseError> {
        self.skip_semis();
        self.expect(TokenKind::Package, "package clause")?;
        let package = self.ident()?;
        self.expect_semi()?;

        let mut imports = Vec::new();
        self.skip_semis();
        while self.eat(&TokenKind::Import) {
            if self.eat(&TokenKind::LParen) {
                loop {
                    self.skip_semis();
                    if self.eat(&TokenKind::RParen) {
                        break;
                    }
                    imports.push(self.import_spec()?);
                    self.expect_semi()?;
                }
            } else {
                imports.push(self.import_spec()?);
            }
            self.expect_semi()?;
            self.skip_semis();
        }

        let mut decls = Vec::new();
        loop {
            self.skip_semis();
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Func => decls.push(Decl::Func(Rc::new(self.func_decl()?))),
                TokenKind::Var => {
                    self.advance();
                    decls.push(Decl::Var(self.value_specs(false)?));
                }
                TokenKind::Const => {
                    self.advance();
                    decls.push(Decl::Const(self.value_specs(true)?));
                }
                TokenKind::Type => {
                    self.advance();
                    decls.push(Decl::Type(self.type_specs()?));
                }
                TokenKind::Import => {
                    return self.error("imports must appear before other declarations")
                }
                _ => return self.unexpected("declaration"),
            }
            self.expect_semi()?;
        }

        Ok(Program {
            package,
            imports,
            decls,
        })
    }

    fn import_spec(&mut self) -> Result<Import, ParseError> {
        let alias = match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Some(name)
            }
            TokenKind::Dot => {
                self.advance();
                Some(".".to_string())
            }
            _ => None,
        };
        match self.advance() {
            TokenKind::Str(path) => Ok(Import { alias, path }),
            _ => self.error("import path must be a string"),
        }
    }

    fn func_decl(&mut self) -> Result<FuncDecl, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Func, "func")?;
        let receiver = if self.eat(&TokenKind::LParen) {
            let name = match (self.peek().clone(), self.peek_at(1).clone()) {
                (TokenKind::Ident(n), TokenKind::Ident(_)) | (TokenKind::Ident(n), TokenKind::Star) => {
                    self.advance();
                    Some(n)
                }
                _ => None,
            };
            let pointer = self.eat(&TokenKind::Star);
            let type_name = self.ident()?;
            self.expect(TokenKind::RParen, ")")?;
            Some(Receiver {
                name,
                type_name,
                pointer,
            })
        } else {
            None
        };
        let name = self.ident()?;
        let (params, variadic) = self.params()?;
        let results = self.results()?;
        if !self.at(&TokenKind::LBrace) {
            return self.error(format!("missing function body for {name}"));
        }
        let body = self.func_body()?;
        Ok(FuncDecl {
            name,
            receiver,
            func: Rc::new(FuncLit {
                params,
                results,
                variadic,
                body,
            }),
            line,
        })
    }

    fn func_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let saved = self.expr_lev;
        self.expr_lev = 0;
        let body = self.block();
        self.expr_lev = saved;
        body
    }

    fn value_specs(&mut self, is_const: bool) -> Result<Vec<ValueSpec>, ParseError> {
        if self.eat(&TokenKind::LParen) {
            let mut specs = Vec::new();
            let mut previous: Option<(Option<TypeExpr>, Vec<Expr>)> = None;
            let mut iota = 0i64;
            loop {
                self.skip_semis();
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                let mut spec = self.value_spec(is_const)?;
                if is_const {
                    if spec.values.is_empty() {
                        if let Some((ty, values)) = &previous {
                            spec.ty = ty.clone();
                            spec.values = values.clone();
                        }
                    } else {
                        previous = Some((spec.ty.clone(), spec.values.clone()));
                    }
                    spec.iota = iota;
                    iota += 1;
                }
                specs.push(spec);
                self.expect_semi()?;
            }
            Ok(specs)
        } else {
            Ok(vec![self.value_spec(is_const)?])
        }
    }

    fn value_spec(&mut self, is_const: bool) -> Result<ValueSpec, ParseError> {
        let line = self.line();
        let mut names = vec![self.ident()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.ident()?);
        }
        let ty = if !matches!(
            self.peek(),
            TokenKind::Assign | TokenKind::Semi | TokenKind::RParen | TokenKind::RBrace
        ) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let values = if self.eat(&TokenKind::Assign) {
            self.expr_list()?
        } else {
            Vec::new()
        };
        if !is_const && ty.is_none() && values.is_empty() {
            return self.error("missing type or initializer in var declaration");
        }
        Ok(ValueSpec {
            names,
            ty,
            values,
            iota: 0,
            line,
        })
    }

    fn type_specs(&mut self) -> Result<Vec<TypeSpec>, ParseError> {
        let mut specs = Vec::new();
        if self.eat(&TokenKind::LParen) {
            loop {
                self.skip_semis();
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                specs.push(self.type_spec()?);
                self.expect_semi()?;
            }
        } else {
            specs.push(self.type_spec()?);
        }
        Ok(specs)
    }

    fn type_spec(&mut self) -> Result<TypeSpec, ParseError> {
        let name = self.ident()?;
        self.eat(&TokenKind::Assign);
        let ty = self.parse_type()?;
        Ok(TypeSpec { name, ty })
    }

    // ------------------------------------------------------------------
    // types
    // ------------------------------------------------------------------

    fn starts_type(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Ident(_)
                | TokenKind::LBrack
                | TokenKind::Map
                | TokenKind::Star
                | TokenKind::Func
                | TokenKind::Interface
                | TokenKind::Struct
                | TokenKind::LParen
                | TokenKind::Chan
        )
    }

    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        self.enter()?;
        let ty = self.parse_type_inner();
        self.leave();
        ty
    }

    fn parse_type_inner(&mut self) -> Result<TypeExpr, ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                if self.at(&TokenKind::Dot) {
                    if let TokenKind::Ident(member) = self.peek_at(1).clone() {
                        self.advance();
                        self.advance();
                        return Ok(TypeExpr::Qualified(name, member));
                    }
                }
                if name == "any" {
                    return Ok(TypeExpr::Interface(Vec::new()));
                }
                Ok(TypeExpr::Named(name))
            }
            TokenKind::LBrack => {
                self.advance();
                if self.eat(&TokenKind::RBrack) {
                    return Ok(TypeExpr::Slice(Box::new(self.parse_type()?)));
                }
                let len = match self.advance() {
                    TokenKind::Int(n) if n >= 0 => Some(n as usize),
                    TokenKind::Ellipsis => None,
                    _ => return self.error("array length must be a constant integer"),
                };
                self.expect(TokenKind::RBrack, "]")?;
                Ok(TypeExpr::Array(len, Box::new(self.parse_type()?)))
            }
            TokenKind::Map => {
                self.advance();
                self.expect(TokenKind::LBrack, "[")?;
                let key = self.parse_type()?;
                self.expect(TokenKind::RBrack, "]")?;
                let value = self.parse_type()?;
                Ok(TypeExpr::Map(Box::new(key), Box::new(value)))
            }
            TokenKind::Star => {
                self.advance();
                Ok(TypeExpr::Pointer(Box::new(self.parse_type()?)))
            }
            TokenKind::Func => {
                self.advance();
                self.params()?;
                self.results()?;
                Ok(TypeExpr::Func)
            }
            TokenKind::Interface => {
                self.advance();
                self.expect(TokenKind::LBrace, "{")?;
                let mut methods = Vec::new();
                loop {
                    self.skip_semis();
                    if self.eat(&TokenKind::RBrace) {
                        break;
                    }
                    let name = self.ident()?;
                    if self.at(&TokenKind::LParen) {
                        self.params()?;
                        self.results()?;
                        methods.push(name);
                    } else if self.eat(&TokenKind::Dot) {
                        // embedded qualified interface such as fmt.Stringer
                        let member = self.ident()?;
                        if member == "Stringer" {
                            methods.push("String".to_string());
                        }
                    } else if name == "error" {
                        methods.push("Error".to_string());
                    }
                    self.expect_semi()?;
                }
                Ok(TypeExpr::Interface(methods))
            }
            TokenKind::Struct => {
                self.advance();
                self.expect(TokenKind::LBrace, "{")?;
                let mut fields = Vec::new();
                loop {
                    self.skip_semis();
                    if self.eat(&TokenKind::RBrace) {
                        break;
                    }
                    let mut names = vec![self.ident()?];
                    if matches!(self.peek(), TokenKind::Semi | TokenKind::RBrace) {
                        // embedded field
                        let name = names.remove(0);
                        fields.push(FieldDecl {
                            ty: TypeExpr::Named(name.clone()),
                            name,
                            tag: None,
                            embedded: true,
                        });
                        continue;
                    }
                    while self.eat(&TokenKind::Comma) {
                        names.push(self.ident()?);
                    }
                    let ty = self.parse_type()?;
                    let tag = match self.peek().clone() {
                        TokenKind::Str(tag) => {
                            self.advance();
                            Some(tag)
                        }
                        _ => None,
                    };
                    for name in names {
                        fields.push(FieldDecl {
                            name,
                            ty: ty.clone(),
                            tag: tag.clone(),
                            embedded: false,
                        });
                    }
                    self.expect_semi()?;
                }
                Ok(TypeExpr::Struct(fields))
            }
            TokenKind::LParen => {
                self.advance();
                let ty = self.parse_type()?;
                self.expect(TokenKind::RParen, ")")?;
                Ok(ty)
            }
            TokenKind::Chan => self.error("channels are not supported"),
            _ => self.unexpected("type"),
        }
    }

    /// Parameter list; returns the params and whether the last is variadic.
    fn params(&mut self) -> Result<(Vec<Param>, bool), ParseError> {
        self.expect(TokenKind::LParen, "(")?;
        let mut entries: Vec<(Option<String>, Option<TypeExpr>)> = Vec::new();
        let mut variadic = false;
        loop {
            self.skip_semis();
            if self.eat(&TokenKind::RParen) {
                break;
            }
            if variadic {
                return self.error("can only use ... with final parameter");
            }
            match (self.peek().clone(), self.peek_at(1).clone()) {
                (TokenKind::Ident(name), TokenKind::Comma | TokenKind::RParen) => {
                    self.advance();
                    entries.push((Some(name), None));
                }
                (TokenKind::Ident(_), TokenKind::Dot) => {
                    entries.push((None, Some(self.parse_type()?)));
                }
                (TokenKind::Ident(name), _) => {
                    self.advance();
                    if self.eat(&TokenKind::Ellipsis) {
                        variadic = true;
                    }
                    let ty = self.parse_type()?;
                    entries.push((Some(name), Some(ty)));
                }
                (TokenKind::Ellipsis, _) => {
                    self.advance();
                    variadic = true;
                    entries.push((None, Some(self.parse_type()?)));
                }
                _ => entries.push((None, Some(self.parse_type()?))),
            }
            if !self.eat(&TokenKind::Comma) {
                self.skip_semis();
                self.expect(TokenKind::RParen, ")")?;
                break;
            }
        }

        let named = entries.iter().any(|(n, t)| n.is_some() && t.is_some());
        let mut params = Vec::with_capacity(entries.len());
        if named {
            let mut pending: Vec<String> = Vec::new();
            for (name, ty) in entries {
                match (name, ty) {
                    (Some(name), None) => pending.push(name),
                    (Some(name), Some(ty)) => {
                        for p in pending.drain(..) {
                            params.push(Param {
                                name: Some(p),
                                ty: ty.clone(),
                            });
                        }
                        params.push(Param {
                            name: Some(name),
                            ty,
                        });
                    }
                    (None, Some(_)) => return self.error("mixed named and unnamed parameters"),
                    (None, None) => {}
                }
            }
            if !pending.is_empty() {
                return self.error("mixed named and unnamed parameters");
            }
        } else {
            for (name, ty) in entries {
                let ty = match (name, ty) {
                    (Some(name), None) => TypeExpr::Named(name),
                    (_, Some(ty)) => ty,
                    (None, None) => continue,
                };
                params.push(Param { name: None, ty });
            }
        }
        if variadic {
            if let Some(last) = params.last_mut() {
                last.ty = TypeExpr::Slice(Box::new(last.ty.clone()));
            }
        }
        Ok((params, variadic))
    }

    fn results(&mut self) -> Result<Vec<Param>, ParseError> {
        if self.at(&TokenKind::LParen) {
            let (params, _) = self.params()?;
            Ok(params)
        } else if self.starts_type() {
            Ok(vec![Param {
                name: None,
                ty: self.parse_type()?,
            }])
        } else {
            Ok(Vec::new())
        }
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.enter()?;
        self.expect(TokenKind::LBrace, "{")?;
        let stmts = self.stmt_list(&[TokenKind::RBrace]);
        let result = stmts.and_then(|stmts| {
            self.expect(TokenKind::RBrace, "}")?;
            Ok(stmts)
        });
        self.leave();
        result
    }

    fn stmt_list(&mut self, terminators: &[TokenKind]) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_semis();
            if terminators.iter().any(|t| self.at(t)) || self.at(&TokenKind::Eof) {
                return Ok(stmts);
            }
            self.stmt_into(&mut stmts)?;
            if !terminators.iter().any(|t| self.at(t)) {
                self.expect_semi()?;
            }
        }
    }

    fn stmt_into(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        let line = self.line();
        match self.peek() {
            TokenKind::Var | TokenKind::Const => {
                let is_const = self.at(&TokenKind::Const);
                self.advance();
                for spec in self.value_specs(is_const)? {
                    let kind = if is_const {
                        StmtKind::Const(spec)
                    } else {
                        StmtKind::Var(spec)
                    };
                    out.push(Stmt { kind, line });
                }
            }
            TokenKind::Type => {
                self.advance();
                for spec in self.type_specs()? {
                    out.push(Stmt {
                        kind: StmtKind::Type(spec),
                        line,
                    });
                }
            }
            _ => out.push(self.stmt()?),
        }
        Ok(())
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        self.enter()?;
        let stmt = self.stmt_inner();
        self.leave();
        stmt
    }

    fn stmt_inner(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let kind = match self.peek() {
            TokenKind::Return => {
                self.advance();
                if matches!(self.peek(), TokenKind::Semi | TokenKind::RBrace) {
                    StmtKind::Return(Vec::new())
                } else {
                    StmtKind::Return(self.expr_list()?)
                }
            }
            TokenKind::Break => {
                self.advance();
                self.no_label()?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.no_label()?;
                StmtKind::Continue
            }
            TokenKind::Fallthrough => {
                self.advance();
                StmtKind::Fallthrough
            }
            TokenKind::Defer => {
                self.advance();
                let expr = self.expr()?;
                if !matches!(expr, Expr::Call { .. }) {
                    return self.error("expression in defer must be function call");
                }
                StmtKind::Defer(expr)
            }
            TokenKind::Go => return self.error("goroutines are not supported"),
            TokenKind::Select => return self.error("select is not supported"),
            TokenKind::Goto => return self.error("goto is not supported"),
            TokenKind::If => return self.if_stmt(),
            TokenKind::For => return self.for_stmt(),
            TokenKind::Switch => return self.switch_stmt(),
            TokenKind::LBrace => StmtKind::Block(self.block()?),
            TokenKind::Semi => StmtKind::Empty,
            TokenKind::Ident(_) if self.peek_at(1) == &TokenKind::Colon => {
                return self.error("labels are not supported")
            }
            _ => match self.simple_stmt(false)? {
                Simple::Stmt(stmt) => return Ok(stmt),
                Simple::Range { .. } => return self.error("range outside for statement"),
            },
        };
        Ok(Stmt { kind, line })
    }

    fn no_label(&self) -> Result<(), ParseError> {
        if let TokenKind::Ident(_) = self.peek() {
            return self.error("labels are not supported");
        }
        Ok(())
    }

    fn simple_stmt(&mut self, range_ok: bool) -> Result<Simple, ParseError> {
        let line = self.line();
        if range_ok && self.at(&TokenKind::Range) {
            self.advance();
            let iter = self.expr()?;
            return Ok(Simple::Range {
                key: None,
                value: None,
                define: false,
                iter,
            });
        }

        let lhs = self.expr_list()?;
        let op = self.peek().clone();
        let kind = match op {
            TokenKind::Define | TokenKind::Assign => {
                self.advance();
                let define = op == TokenKind::Define;
                if range_ok && self.eat(&TokenKind::Range) {
                    if lhs.len() > 2 {
                        return self.error("range clause permits at most two iteration variables");
                    }
                    let iter = self.expr()?;
                    let mut it = lhs.into_iter();
                    return Ok(Simple::Range {
                        key: it.next(),
                        value: it.next(),
                        define,
                        iter,
                    });
                }
                let rhs = self.expr_list()?;
                if define {
                    let mut names = Vec::with_capacity(lhs.len());
                    for e in lhs {
                        match e {
                            Expr::Ident(name) => names.push(name),
                            _ => return self.error("non-name on left side of :="),
                        }
                    }
                    StmtKind::Define(names, rhs)
                } else {
                    StmtKind::Assign(lhs, rhs)
                }
            }
            TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::StarAssign
            | TokenKind::SlashAssign
            | TokenKind::PercentAssign
            | TokenKind::AmpAssign
            | TokenKind::PipeAssign
            | TokenKind::CaretAssign
            | TokenKind::ShlAssign
            | TokenKind::ShrAssign => {
                self.advance();
                let bin = match op {
                    TokenKind::PlusAssign => BinOp::Add,
                    TokenKind::MinusAssign => BinOp::Sub,
                    TokenKind::StarAssign => BinOp::Mul,
                    TokenKind::SlashAssign => BinOp::Div,
                    TokenKind::PercentAssign => BinOp::Rem,
                    TokenKind::AmpAssign => BinOp::And,
                    TokenKind::PipeAssign => BinOp::Or,
                    TokenKind::CaretAssign => BinOp::Xor,
                    TokenKind::ShlAssign => BinOp::Shl,
                    _ => BinOp::Shr,
                };
                let target = self.single(lhs)?;
                let value = self.expr()?;
                StmtKind::OpAssign(bin, target, value)
            }
            TokenKind::Inc | TokenKind::Dec => {
                self.advance();
                let target = self.single(lhs)?;
                StmtKind::IncDec(target, op == TokenKind::Inc)
            }
            _ => StmtKind::Expr(self.single(lhs)?),
        };
        Ok(Simple::Stmt(Stmt { kind, line }))
    }

    fn single(&self, mut exprs: Vec<Expr>) -> Result<Expr, ParseError> {
        if exprs.len() != 1 {
            return self.error("expected 1 expression");
        }
        Ok(exprs.remove(0))
    }

    fn if_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::If, "if")?;
        let saved = self.expr_lev;
        self.expr_lev = -1;
        let header = self.if_header();
        self.expr_lev = saved;
        let (init, cond) = header?;
        let then = self.block()?;
        let els = if self.eat(&TokenKind::Else) {
            match self.peek() {
                TokenKind::If => Some(Box::new(self.if_stmt()?)),
                TokenKind::LBrace => {
                    let line = self.line();
                    Some(Box::new(Stmt {
                        kind: StmtKind::Block(self.block()?),
                        line,
                    }))
                }
                _ => return self.unexpected("if statement or block"),
            }
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                init,
                cond,
                then,
                els,
            },
            line,
        })
    }

    fn if_header(&mut self) -> Result<(Option<Box<Stmt>>, Expr), ParseError> {
        let first = match self.simple_stmt(false)? {
            Simple::Stmt(s) => s,
            Simple::Range { .. } => return self.error("range in if header"),
        };
        if self.eat(&TokenKind::Semi) {
            let cond = self.expr()?;
            return Ok((Some(Box::new(first)), cond));
        }
        match first.kind {
            StmtKind::Expr(cond) => Ok((None, cond)),
            _ => self.error("cannot use assignment as value in if condition"),
        }
    }

    fn switch_header(&mut self) -> Result<(Option<Box<Stmt>>, Option<Stmt>), ParseError> {
        if self.at(&TokenKind::LBrace) {
            return Ok((None, None));
        }
        let first = if self.at(&TokenKind::Semi) {
            None
        } else {
            Some(self.header_stmt()?)
        };
        if !self.eat(&TokenKind::Semi) {
            return Ok((None, first));
        }
        let tag = if self.at(&TokenKind::LBrace) {
            None
        } else {
            Some(self.header_stmt()?)
        };
        Ok((first.map(Box::new), tag))
    }

    fn header_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.simple_stmt(false)? {
            Simple::Stmt(s) => Ok(s),
            Simple::Range { .. } => self.error("unexpected range"),
        }
    }

    fn for_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::For, "for")?;
        let saved = self.expr_lev;
        self.expr_lev = -1;
        let header = self.for_header();
        self.expr_lev = saved;
        let header = header?;
        let body = self.block()?;
        let kind = match header {
            ForHeader::Loop { init, cond, post } => StmtKind::For {
                init,
                cond,
                post,
                body,
            },
            ForHeader::Range {
                key,
                value,
                define,
                iter,
            } => StmtKind::Range {
                key,
                value,
                define,
                iter,
                body,
            },
        };
        Ok(Stmt { kind, line })
    }

    fn for_header(&mut self) -> Result<ForHeader, ParseError> {
        if self.at(&TokenKind::LBrace) {
            return Ok(ForHeader::Loop {
                init: None,
                cond: None,
                post: None,
            });
        }
        let first = if self.at(&TokenKind::Semi) {
            None
        } else {
            match self.simple_stmt(true)? {
                Simple::Range {
                    key,
                    value,
                    define,
                    iter,
                } => {
                    return Ok(ForHeader::Range {
                        key,
                        value,
                        define,
                        iter,
                    })
                }
                Simple::Stmt(s) => Some(s),
            }
        };
        if self.eat(&TokenKind::Semi) {
            let cond = if self.at(&TokenKind::Semi) {
                None
            } else {
                Some(self.expr()?)
            };
            self.expect(TokenKind::Semi, ";")?;
            let post = if self.at(&TokenKind::LBrace) {
                None
            } else {
                match self.simple_stmt(false)? {
                    Simple::Stmt(s) => Some(Box::new(s)),
                    Simple::Range { .. } => return self.error("unexpected range"),
                }
            };
            return Ok(ForHeader::Loop {
                init: first.map(Box::new),
                cond,
                post,
            });
        }
        match first.map(|s| s.kind) {
            Some(StmtKind::Expr(cond)) => Ok(ForHeader::Loop {
                init: None,
                cond: Some(cond),
                post: None,
            }),
            None => Ok(ForHeader::Loop {
                init: None,
                cond: None,
                post: None,
            }),
            Some(_) => self.error("expected for loop condition"),
        }
    }

    fn switch_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Switch, "switch")?;
        let saved = self.expr_lev;
        self.expr_lev = -1;
        let header = self.switch_header();
        self.expr_lev = saved;
        let (init, tag) = header?;

        let type_switch = match tag.as_ref().map(|s| &s.kind) {
            Some(StmtKind::Expr(Expr::TypeAssert(subject, TypeExpr::Named(t)))) if t == "type" => {
                Some((None, (**subject).clone()))
            }
            Some(StmtKind::Define(names, values)) if names.len() == 1 && values.len() == 1 => {
                match &values[0] {
                    Expr::TypeAssert(subject, TypeExpr::Named(t)) if t == "type" => {
                        Some((Some(names[0].clone()), (**subject).clone()))
                    }
                    _ => return self.error("switch header must be an expression"),
                }
            }
            _ => None,
        };

        self.expect(TokenKind::LBrace, "{")?;
        let kind = if let Some((binding, subject)) = type_switch {
            let mut cases = Vec::new();
            loop {
                self.skip_semis();
                if self.eat(&TokenKind::RBrace) {
                    break;
                }
                let (types, is_default) = if self.eat(&TokenKind::Default) {
                    (Vec::new(), true)
                } else {
                    self.expect(TokenKind::Case, "case or default")?;
                    let mut types = Vec::new();
                    loop {
                        if let TokenKind::Ident(name) = self.peek() {
                            if name == "nil" {
                                self.advance();
                                types.push(None);
                                if !self.eat(&TokenKind::Comma) {
                                    break;
                                }
                                continue;
                            }
                        }
                        types.push(Some(self.parse_type()?));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    (types, false)
                };
                self.expect(TokenKind::Colon, ":")?;
                let body =
                    self.stmt_list(&[TokenKind::Case, TokenKind::Default, TokenKind::RBrace])?;
                cases.push(TypeCase {
                    types,
                    body,
                    is_default,
                });
            }
            StmtKind::TypeSwitch {
                init,
                binding,
                subject,
                cases,
            }
        } else {
            let tag = match tag.map(|s| s.kind) {
                Some(StmtKind::Expr(e)) => Some(e),
                None => None,
                Some(_) => return self.error("switch header must be an expression"),
            };
            let mut cases = Vec::new();
            loop {
                self.skip_semis();
                if self.eat(&TokenKind::RBrace) {
                    break;
                }
                let (exprs, is_default) = if self.eat(&TokenKind::Default) {
                    (Vec::new(), true)
                } else {
                    self.expect(TokenKind::Case, "case or default")?;
                    (self.expr_list()?, false)
                };
                self.expect(TokenKind::Colon, ":")?;
                let body =
                    self.stmt_list(&[TokenKind::Case, TokenKind::Default, TokenKind::RBrace])?;
                cases.push(SwitchCase {
                    exprs,
                    body,
                    is_default,
                });
            }
            StmtKind::Switch { init, tag, cases }
        };
        Ok(Stmt { kind, line })
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.expr()?];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let e = self.binary(1);
        self.leave();
        e
    }

    fn binop(&self) -> Option<BinOp> {
        Some(match self.peek() {
            TokenKind::OrOr => BinOp::LogOr,
            TokenKind::AndAnd => BinOp::LogAnd,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Pipe => BinOp::Or,
            TokenKind::Caret => BinOp::Xor,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Rem,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            TokenKind::Amp => BinOp::And,
            TokenKind::AndNot => BinOp::AndNot,
            _ => return None,
        })
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.binop() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.binary(prec + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let op = match self.peek() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Plus => Some(UnOp::Plus),
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::Caret => Some(UnOp::BitNot),
            TokenKind::Star => Some(UnOp::Deref),
            TokenKind::Amp => Some(UnOp::Addr),
            TokenKind::Arrow => return self.error("channels are not supported"),
            _ => None,
        };
        let e = match op {
            Some(op) => {
                self.advance();
                self.unary().map(|inner| Expr::Unary(op, Box::new(inner)))
            }
            None => self.primary(),
        };
        self.leave();
        e
    }

    fn operand(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(Rc::from(s.as_str())))
            }
            TokenKind::Char(c) => {
                self.advance();
                Ok(Expr::Char(c))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            TokenKind::LParen => {
                self.advance();
                self.expr_lev += 1;
                let e = self.expr();
                self.expr_lev -= 1;
                let e = e?;
                self.expect(TokenKind::RParen, ")")?;
                Ok(e)
            }
            TokenKind::Func => {
                self.advance();
                let (params, variadic) = self.params()?;
                let results = self.results()?;
                if !self.at(&TokenKind::LBrace) {
                    return Ok(Expr::Type(TypeExpr::Func));
                }
                let body = self.func_body()?;
                Ok(Expr::FuncLit(Rc::new(FuncLit {
                    params,
                    results,
                    variadic,
                    body,
                })))
            }
            TokenKind::LBrack | TokenKind::Map | TokenKind::Struct | TokenKind::Interface => {
                Ok(Expr::Type(self.parse_type()?))
            }
            _ => self.unexpected("expression"),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.operand()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    if self.eat(&TokenKind::LParen) {
                        let ty = if self.eat(&TokenKind::Type) {
                            TypeExpr::Named("type".to_string())
                        } else {
                            self.parse_type()?
                        };
                        self.expect(TokenKind::RParen, ")")?;
                        e = Expr::TypeAssert(Box::new(e), ty);
                    } else {
                        let name = self.ident()?;
                        e = Expr::Selector(Box::new(e), name);
                    }
                }
                TokenKind::LBrack => {
                    self.advance();
                    self.expr_lev += 1;
                    let r = self.index_or_slice(e);
                    self.expr_lev -= 1;
                    e = r?;
                    self.expect(TokenKind::RBrack, "]")?;
                }
                TokenKind::LParen => {
                    self.advance();
                    self.expr_lev += 1;
                    let r = self.call_args();
                    self.expr_lev -= 1;
                    let (args, spread) = r?;
                    e = Expr::Call {
                        func: Box::new(e),
                        args,
                        spread,
                    };
                }
                TokenKind::LBrace => {
                    let ty = match &e {
                        Expr::Type(ty) => ty.clone(),
                        Expr::Ident(name) if self.expr_lev >= 0 => TypeExpr::Named(name.clone()),
                        Expr::Selector(base, member) if self.expr_lev >= 0 => match &**base {
                            Expr::Ident(pkg) => TypeExpr::Qualified(pkg.clone(), member.clone()),
                            _ => break,
                        },
                        _ => break,
                    };
                    e = self.composite(ty)?;
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn index_or_slice(&mut self, target: Expr) -> Result<Expr, ParseError> {
        let lo = if self.at(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        if self.eat(&TokenKind::Colon) {
            let hi = if self.at(&TokenKind::RBrack) {
                None
            } else {
                Some(Box::new(self.expr()?))
            };
            if self.at(&TokenKind::Colon) {
                return self.error("3-index slices are not supported");
            }
            return Ok(Expr::Slice {
                target: Box::new(target),
                lo,
                hi,
            });
        }
        match lo {
            Some(index) => Ok(Expr::Index(Box::new(target), index)),
            None => self.error("expected index expression"),
        }
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, bool), ParseError> {
        let mut args = Vec::new();
        let mut spread = false;
        loop {
            self.skip_semis();
            if self.eat(&TokenKind::RParen) {
                break;
            }
            args.push(self.expr()?);
            if self.eat(&TokenKind::Ellipsis) {
                spread = true;
            }
            if !self.eat(&TokenKind::Comma) {
                self.skip_semis();
                self.expect(TokenKind::RParen, ")")?;
                break;
            }
        }
        Ok((args, spread))
    }

    fn composite(&mut self, ty: TypeExpr) -> Result<Expr, ParseError> {
        self.enter()?;
        let saved = self.expr_lev;
        self.expr_lev = 1;
        let r = self.composite_inner(ty);
        self.expr_lev = saved;
        self.leave();
        r
    }

    fn composite_inner(&mut self, ty: TypeExpr) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBrace, "{")?;
        let (key_ty, elem_ty) = match &ty {
            TypeExpr::Slice(t) | TypeExpr::Array(_, t) => (None, Some((**t).clone())),
            TypeExpr::Map(k, v) => (Some((**k).clone()), Some((**v).clone())),
            _ => (None, None),
        };
        let mut elems = Vec::new();
        loop {
            self.skip_semis();
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            let first = self.element(key_ty.as_ref().or(elem_ty.as_ref()))?;
            let elem = if self.eat(&TokenKind::Colon) {
                let value = self.element(elem_ty.as_ref())?;
                (Some(first), value)
            } else {
                (None, first)
            };
            elems.push(elem);
            if !self.eat(&TokenKind::Comma) {
                self.skip_semis();
                self.expect(TokenKind::RBrace, "}")?;
                break;
            }
        }
        Ok(Expr::Composite { ty, elems })
    }

    /// A composite element, allowing the elided `{...}` form.
    fn element(&mut self, elided: Option<&TypeExpr>) -> Result<Expr, ParseError> {
        if self.at(&TokenKind::LBrace) {
            return match elided {
                Some(TypeExpr::Pointer(inner)) => {
                    let inner = (**inner).clone();
                    Ok(Expr::Unary(UnOp::Addr, Box::new(self.composite(inner)?)))
                }
                Some(ty) => self.composite(ty.clone()),
                None => self.error("missing type in composite literal"),
            };
        }
        self.expr()
    }
}

enum ForHeader {
    Loop {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        iter: Expr,
    },
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("name {name}"),
        TokenKind::Int(v) => format!("literal {v}"),
        TokenKind::Float(v) => format!("literal {v}"),
        TokenKind::Str(s) => format!("literal {s:?}"),
        TokenKind::Char(_) => "rune literal".to_string(),
        TokenKind::Semi => "newline".to_string(),
        TokenKind::Eof => "EOF".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        parse_program(src).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    fn main_body(src: &str) -> Vec<Stmt> {
        let program = parse(&format!("package main\nfunc main() {{\n{src}\n}}\n"));
        match &program.decls[0] {
            Decl::Func(f) => f.func.body.clone(),
            other => panic!("expected func, got {other:?}"),
        }
    }

    #[test]
    fn parses_package_and_grouped_imports() {
        let program = parse("package main\n\nimport (\n\t\"fmt\"\n\tj \"encoding/json\"\n)\n\nfunc main() {}\n");
        assert_eq!(program.package, "main");
        assert_eq!(program.imports.len(), 2);
        assert_eq!(program.imports[1].local_name(), "j");
    }

    #[test]
    fn parses_single_import() {
        let program = parse("package main\nimport \"fmt\"\nfunc main() { fmt.Println(1) }");
        assert_eq!(program.imports[0].path, "fmt");
    }

    #[test]
    fn grouped_params_share_type() {
        let program = parse("package main\nfunc add(a, b int, s string) (int, error) { return a + b, nil }");
        let Decl::Func(f) = &program.decls[0] else {
            panic!("expected func")
        };
        assert_eq!(f.func.params.len(), 3);
        assert_eq!(f.func.params[0].ty, TypeExpr::Named("int".into()));
        assert_eq!(f.func.params[2].ty, TypeExpr::Named("string".into()));
        assert_eq!(f.func.results.len(), 2);
    }

    #[test]
    fn variadic_param_becomes_slice() {
        let program = parse("package main\nfunc sum(xs ...int) int { return 0 }");
        let Decl::Func(f) = &program.decls[0] else {
            panic!("expected func")
        };
        assert!(f.func.variadic);
        assert_eq!(
            f.func.params[0].ty,
            TypeExpr::Slice(Box::new(TypeExpr::Named("int".into())))
        );
    }

    #[test]
    fn if_header_does_not_swallow_block_as_composite() {
        let body = main_body("x := 1\nif x {\n}\n");
        assert!(matches!(body[1].kind, StmtKind::If { .. }));
    }

    #[test]
    fn three_clause_for_loop() {
        let body = main_body("for i := 0; i < 10; i++ {\n}\n");
        match &body[0].kind {
            StmtKind::For {
                init, cond, post, ..
            } => {
                assert!(init.is_some());
                assert!(cond.is_some());
                assert!(post.is_some());
            }
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn range_loop_with_composite_iterable() {
        let body = main_body("for _, v := range []int{1, 2, 3} {\n_ = v\n}\n");
        match &body[0].kind {
            StmtKind::Range { define, iter, .. } => {
                assert!(*define);
                assert!(matches!(iter, Expr::Composite { .. }));
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn map_literal_with_trailing_comma_and_nested_elided_values() {
        let body = main_body("m := map[string][]int{\n\"a\": {1, 2},\n\"b\": {3},\n}\n_ = m\n");
        match &body[0].kind {
            StmtKind::Define(_, values) => match &values[0] {
                Expr::Composite { elems, .. } => {
                    assert_eq!(elems.len(), 2);
                    assert!(matches!(elems[0].1, Expr::Composite { .. }));
                }
                other => panic!("expected composite, got {other:?}"),
            },
            other => panic!("expected define, got {other:?}"),
        }
    }

    #[test]
    fn type_switch_with_binding() {
        let body = main_body("var x interface{} = 1\nswitch v := x.(type) {\ncase int:\n_ = v\ncase string, nil:\ndefault:\n}\n");
        match &body[1].kind {
            StmtKind::TypeSwitch { binding, cases, .. } => {
                assert_eq!(binding.as_deref(), Some("v"));
                assert_eq!(cases.len(), 3);
                assert_eq!(cases[1].types.len(), 2);
                assert!(cases[1].types[1].is_none());
                assert!(cases[2].is_default);
            }
            other => panic!("expected type switch, got {other:?}"),
        }
    }

    #[test]
    fn const_group_repeats_previous_expression_with_iota() {
        let program = parse("package main\nconst (\nA = iota\nB\nC\n)\nfunc main() {}");
        let Decl::Const(specs) = &program.decls[0] else {
            panic!("expected const")
        };
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[2].iota, 2);
        assert!(matches!(specs[2].values[0], Expr::Ident(ref n) if n == "iota"));
    }

    #[test]
    fn method_declaration_with_pointer_receiver() {
        let program = parse("package main\ntype C struct { n int }\nfunc (c *C) Inc() { c.n++ }\nfunc main() {}");
        let Decl::Func(f) = &program.decls[1] else {
            panic!("expected func")
        };
        let recv = f.receiver.as_ref().unwrap();
        assert!(recv.pointer);
        assert_eq!(recv.type_name, "C");
    }

    #[test]
    fn precedence_is_respected() {
        let body = main_body("x := 1 + 2*3\n_ = x\n");
        match &body[0].kind {
            StmtKind::Define(_, values) => match &values[0] {
                Expr::Binary(BinOp::Add, _, rhs) => {
                    assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, _, _)))
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_package_clause_is_an_error() {
        let err = parse_program("func main() {}").unwrap_err();
        assert!(err.message.contains("package"));
    }

    #[test]
    fn goroutines_are_rejected() {
        let err = parse_program("package main\nfunc main() { go f() }").unwrap_err();
        assert!(err.message.contains("goroutines"));
    }

    #[test]
    fn deeply_nested_input_is_rejected_not_overflowed() {
        let src = format!(
            "package main\nfunc main() {{ x := {}1{} }}",
            "(".repeat(500),
            ")".repeat(500)
        );
        let err = parse_program(&src).unwrap_err();
        assert!(err.message.contains("nested too deeply"));
    }
}
