//! Recursive-descent parser for templates.
//!
//! Precedence, lowest to highest:
//!
//! ```text
//! formula  → multi-assign | assign-list
//! test     → or → and → not → comparison
//! expr     → '+' '-'
//! term     → '*' '/'
//! dot      → a.b.c()
//! asscalc  → '+=' '-=' '*=' '/='
//! index    → a[k]…
//! factor   → unary '-' | atom
//! ```
//!
//! Parsing stops at the first error.  Besides the grammar itself the parser
//! rejects invalid assignment targets, `break`/`continue` outside a loop, and
//! duplicate parameter names.
//!
//! Binary operators of one precedence level are collected into a flat
//! [`Expr::Binary`] run, so an arbitrarily long sum stays shallow.  Everything
//! that does nest (sub-expressions, unary operators, statement bodies) counts
//! against [`MAX_NESTING`].

use std::rc::Rc;

use super::ast::{
    Assign, AugOp, BinOp, Block, Body, Elem, Expr, ForKind, Formula, FuncDef, Import, Program,
    Stmt,
};
use super::error::{Error, Result};
use super::lexer::{tokenize, Pos, Token, TokenKind};

/// Deepest nesting of expressions and statement bodies the parser accepts.
pub const MAX_NESTING: usize = 64;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Enclosing `for` bodies in the current function (or top level).
    loop_depth: usize,
    nesting: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            loop_depth: 0,
            nesting: 0,
        }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn here(&self) -> Pos {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.pos)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, expected: &TokenKind) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: TokenKind, context: &str) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {expected} {context}")))
        }
    }

    fn unexpected(&self, what: &str) -> Error {
        Error::parse(format!("{what}, found {}", self.peek()), self.here())
    }

    fn too_deep(&self) -> Error {
        Error::parse(format!("nesting exceeds {MAX_NESTING} levels"), self.here())
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.too_deep());
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    fn ident(&mut self, context: &str) -> Result<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(&format!("expected identifier {context}"))),
        }
    }

    // ── Blocks ────────────────────────────────────────────────────────────────

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut blocks = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::Eof => break,
                TokenKind::Text(text) => {
                    self.advance();
                    blocks.push(Block::Text(text));
                }
                TokenKind::RefOpen => blocks.push(self.parse_ref_block()?),
                TokenKind::BlockOpen => {
                    self.advance();
                    let elems = self.parse_code_elems()?;
                    self.expect(TokenKind::BlockClose, "to close code block")?;
                    blocks.push(Block::Code(elems));
                }
                _ => return Err(self.unexpected("expected text or block")),
            }
        }
        Ok(Program { blocks })
    }

    fn parse_ref_block(&mut self) -> Result<Block> {
        self.expect(TokenKind::RefOpen, "")?;
        let formula = self.parse_formula()?;
        self.expect(TokenKind::RefClose, "to close reference block")?;
        Ok(Block::Ref(formula))
    }

    /// Elements of a top-level code block, up to its `@}`.
    fn parse_code_elems(&mut self) -> Result<Vec<Elem>> {
        let mut elems = Vec::new();
        loop {
            match self.peek() {
                TokenKind::BlockClose | TokenKind::Eof => return Ok(elems),
                TokenKind::Semicolon => {
                    self.advance();
                }
                _ => elems.push(self.parse_elem()?),
            }
        }
    }

    /// A statement body, up to (not including) `elif`, `else` or `end`.
    fn parse_body(&mut self) -> Result<Body> {
        let mut blocks = Vec::new();
        let mut elems = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Elif | TokenKind::Else | TokenKind::End => break,
                TokenKind::Eof => return Err(self.unexpected("expected 'end'")),
                TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::BlockClose => {
                    self.advance();
                    if !elems.is_empty() {
                        blocks.push(Block::Code(std::mem::take(&mut elems)));
                    }
                    self.parse_text_run(&mut blocks)?;
                }
                _ => elems.push(self.parse_elem()?),
            }
        }
        if !elems.is_empty() {
            blocks.push(Block::Code(elems));
        }
        Ok(blocks)
    }

    /// Text and ref blocks between `@}` and the next `{@` inside a body.
    fn parse_text_run(&mut self, blocks: &mut Body) -> Result<()> {
        loop {
            match self.peek().clone() {
                TokenKind::Text(text) => {
                    self.advance();
                    blocks.push(Block::Text(text));
                }
                TokenKind::RefOpen => blocks.push(self.parse_ref_block()?),
                TokenKind::BlockOpen => {
                    self.advance();
                    return Ok(());
                }
                _ => return Err(self.unexpected("expected '{@' to resume an open body")),
            }
        }
    }

    fn parse_elem(&mut self) -> Result<Elem> {
        Ok(match self.peek() {
            TokenKind::Def => Elem::Def(Rc::new(self.nested(Self::parse_def)?)),
            TokenKind::If
            | TokenKind::For
            | TokenKind::Break
            | TokenKind::Continue
            | TokenKind::Return
            | TokenKind::Import
            | TokenKind::From => Elem::Stmt(self.nested(Self::parse_stmt)?),
            _ => Elem::Formula(self.parse_formula()?),
        })
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let pos = self.here();
        let tok = self.advance();
        match tok {
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break | TokenKind::Continue if self.loop_depth == 0 => {
                Err(Error::parse(format!("{tok} outside loop"), pos))
            }
            TokenKind::Break => Ok(Stmt::Break),
            TokenKind::Continue => Ok(Stmt::Continue),
            TokenKind::Return => {
                let value = if starts_test(self.peek()) {
                    Some(self.parse_formula()?)
                } else {
                    None
                };
                Ok(Stmt::Return(value))
            }
            TokenKind::Import => {
                let path = self.parse_ident_chain()?;
                let alias = if self.eat(&TokenKind::As) {
                    Some(self.ident("after 'as'")?)
                } else {
                    None
                };
                Ok(Stmt::Import(Import::Module { path, alias }))
            }
            TokenKind::From => {
                let path = self.parse_ident_chain()?;
                self.expect(TokenKind::Import, "after module path")?;
                let paren = self.eat(&TokenKind::LParen);
                let mut names = vec![self.ident("to import")?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.ident("to import")?);
                }
                if paren {
                    self.expect(TokenKind::RParen, "to close import list")?;
                }
                Ok(Stmt::Import(Import::Names { path, names }))
            }
            other => Err(Error::parse(format!("unexpected {other}"), pos)),
        }
    }

    fn parse_ident_chain(&mut self) -> Result<Vec<String>> {
        let mut path = vec![self.ident("in module path")?];
        while self.eat(&TokenKind::Dot) {
            path.push(self.ident("in module path")?);
        }
        Ok(path)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let mut branches = Vec::new();
        let test = self.parse_test()?;
        self.expect(TokenKind::Colon, "after 'if' condition")?;
        branches.push((test, self.parse_body()?));

        while self.eat(&TokenKind::Elif) {
            let test = self.parse_test()?;
            self.expect(TokenKind::Colon, "after 'elif' condition")?;
            branches.push((test, self.parse_body()?));
        }
        let else_body = if self.eat(&TokenKind::Else) {
            self.expect(TokenKind::Colon, "after 'else'")?;
            Some(self.parse_body()?)
        } else {
            None
        };
        self.expect(TokenKind::End, "to close 'if'")?;
        Ok(Stmt::If {
            branches,
            else_body,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let kind = if self.peek() == &TokenKind::Colon {
            ForKind::Forever
        } else if matches!(self.peek(), TokenKind::Ident(_)) && self.peek_at(1) == &TokenKind::In {
            let var = self.ident("")?;
            self.advance();
            ForKind::Each {
                var,
                iter: self.parse_test()?,
            }
        } else {
            let head_pos = self.here();
            let head = self.parse_formula()?;
            if self.eat(&TokenKind::Semicolon) {
                let cond = self.parse_test()?;
                self.expect(TokenKind::Semicolon, "after loop condition")?;
                let step = self.parse_formula()?;
                ForKind::Counted {
                    init: head,
                    cond,
                    step,
                }
            } else {
                match head {
                    Formula::Assign(mut list) if list.len() == 1 && list[0].targets.is_empty() => {
                        ForKind::While(list.remove(0).value)
                    }
                    _ => {
                        return Err(Error::parse(
                            "loop condition must be a single expression",
                            head_pos,
                        ))
                    }
                }
            }
        };
        self.expect(TokenKind::Colon, "after loop header")?;

        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        let body = body?;

        self.expect(TokenKind::End, "to close 'for'")?;
        Ok(Stmt::For { kind, body })
    }

    fn parse_def(&mut self) -> Result<FuncDef> {
        self.expect(TokenKind::Def, "")?;
        let name = self.ident("after 'def'")?;
        self.expect(TokenKind::LParen, "after function name")?;

        let mut params: Vec<String> = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                let pos = self.here();
                let param = self.ident("in parameter list")?;
                if params.contains(&param) {
                    return Err(Error::parse(format!("duplicate parameter '{param}'"), pos));
                }
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "after parameters")?;
        self.expect(TokenKind::Colon, "after function signature")?;

        // A function body starts outside of any loop.
        let saved = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_body();
        self.loop_depth = saved;
        let body = body?;

        self.expect(TokenKind::End, "to close 'def'")?;
        Ok(FuncDef { name, params, body })
    }

    // ── Formulas ──────────────────────────────────────────────────────────────

    pub fn parse_formula(&mut self) -> Result<Formula> {
        let pos = self.here();
        let first = self.parse_test()?;

        if self.peek() == &TokenKind::Comma {
            let mut items = vec![(pos, first)];
            while self.eat(&TokenKind::Comma) {
                items.push((self.here(), self.parse_test()?));
            }
            if self.peek() == &TokenKind::Assign {
                return self.parse_multi_assign(items);
            }
            let list = items.into_iter().map(|(_, e)| Assign::bare(e)).collect();
            return Ok(Formula::Assign(list));
        }

        let mut list = vec![self.parse_assign_chain(pos, first)?];
        while self.eat(&TokenKind::Comma) {
            let pos = self.here();
            let head = self.parse_test()?;
            list.push(self.parse_assign_chain(pos, head)?);
        }
        Ok(Formula::Assign(list))
    }

    /// `head ('=' test)*`, with `head` already parsed.
    fn parse_assign_chain(&mut self, pos: Pos, head: Expr) -> Result<Assign> {
        let mut chain = vec![(pos, head)];
        while self.eat(&TokenKind::Assign) {
            chain.push((self.here(), self.parse_test()?));
        }
        let (_, value) = chain.pop().unwrap_or((pos, Expr::Nil));
        let mut targets = Vec::with_capacity(chain.len());
        for (pos, target) in chain {
            check_target(&target, pos)?;
            targets.push(target);
        }
        Ok(Assign { targets, value })
    }

    fn parse_multi_assign(&mut self, first: Vec<(Pos, Expr)>) -> Result<Formula> {
        let mut lists = vec![first];
        while self.eat(&TokenKind::Assign) {
            let mut items = vec![(self.here(), self.parse_test()?)];
            while self.eat(&TokenKind::Comma) {
                items.push((self.here(), self.parse_test()?));
            }
            lists.push(items);
        }
        let last = lists.len() - 1;
        let mut out = Vec::with_capacity(lists.len());
        for (i, items) in lists.into_iter().enumerate() {
            let mut exprs = Vec::with_capacity(items.len());
            for (pos, expr) in items {
                if i < last {
                    check_target(&expr, pos)?;
                }
                exprs.push(expr);
            }
            out.push(exprs);
        }
        Ok(Formula::Multi(out))
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    pub fn parse_test(&mut self) -> Result<Expr> {
        self.nested(Self::parse_or)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let first = self.parse_and()?;
        let mut rest = Vec::new();
        while self.eat(&TokenKind::Or) {
            rest.push((BinOp::Or, self.parse_and()?));
        }
        Ok(binary(first, rest))
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let first = self.parse_not()?;
        let mut rest = Vec::new();
        while self.eat(&TokenKind::And) {
            rest.push((BinOp::And, self.parse_not()?));
        }
        Ok(binary(first, rest))
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Not) {
            Ok(Expr::Not(Box::new(self.nested(Self::parse_not)?)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let first = self.parse_expr()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_expr()?));
        }
        Ok(binary(first, rest))
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let first = self.parse_term()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_term()?));
        }
        Ok(binary(first, rest))
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let first = self.parse_dot()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_dot()?));
        }
        Ok(binary(first, rest))
    }

    fn parse_dot(&mut self) -> Result<Expr> {
        let head = self.parse_asscalc()?;
        let mut members = Vec::new();
        while self.eat(&TokenKind::Dot) {
            let pos = self.here();
            let member = self.parse_asscalc()?;
            if !is_member(&member) {
                return Err(Error::parse("expected member name or method call after '.'", pos));
            }
            members.push(member);
        }
        if members.is_empty() {
            Ok(head)
        } else {
            Ok(Expr::Dot(Box::new(head), members))
        }
    }

    fn parse_asscalc(&mut self) -> Result<Expr> {
        let pos = self.here();
        let outer = self.nesting;
        let mut lhs = self.parse_index()?;
        loop {
            let op = match self.peek() {
                TokenKind::PlusAssign => AugOp::Add,
                TokenKind::MinusAssign => AugOp::Sub,
                TokenKind::StarAssign => AugOp::Mul,
                TokenKind::SlashAssign => AugOp::Div,
                _ => break,
            };
            if !lhs.is_aug_target() {
                return Err(Error::parse("invalid target for augmented assignment", pos));
            }
            self.advance();
            // Each link wraps the target one level deeper.
            if self.nesting >= MAX_NESTING {
                return Err(self.too_deep());
            }
            self.nesting += 1;
            let rhs = self.parse_index()?;
            lhs = Expr::AugAssign(op, Box::new(lhs), Box::new(rhs));
        }
        self.nesting = outer;
        Ok(lhs)
    }

    fn parse_index(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            return Ok(Expr::Neg(Box::new(self.nested(Self::parse_index)?)));
        }
        let operand = self.parse_atom()?;
        let mut keys = Vec::new();
        while self.eat(&TokenKind::LBracket) {
            keys.push(self.parse_test()?);
            self.expect(TokenKind::RBracket, "to close index")?;
        }
        if keys.is_empty() {
            Ok(operand)
        } else {
            Ok(Expr::Index(Box::new(operand), keys))
        }
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let pos = self.here();
        match self.advance() {
            TokenKind::Nil => Ok(Expr::Nil),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Int(n) => Ok(Expr::Int(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Ident(name) => {
                if !self.eat(&TokenKind::LParen) {
                    return Ok(Expr::Ident(name));
                }
                let mut args = Vec::new();
                if self.peek() != &TokenKind::RParen {
                    args.push(self.parse_test()?);
                    while self.eat(&TokenKind::Comma) {
                        args.push(self.parse_test()?);
                    }
                }
                self.expect(TokenKind::RParen, &format!("after arguments to '{name}'"))?;
                Ok(Expr::Call { name, args })
            }
            TokenKind::LParen => {
                let inner = self.parse_formula()?;
                self.expect(TokenKind::RParen, "to close '('")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                while self.peek() != &TokenKind::RBracket {
                    items.push(self.parse_test()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "to close array")?;
                Ok(Expr::Array(items))
            }
            TokenKind::LBrace => {
                let mut pairs = Vec::new();
                while self.peek() != &TokenKind::RBrace {
                    let key = self.parse_test()?;
                    self.expect(TokenKind::Colon, "after dict key")?;
                    pairs.push((key, self.parse_test()?));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "to close dict")?;
                Ok(Expr::Dict(pairs))
            }
            other => Err(Error::parse(format!("unexpected {other}"), pos)),
        }
    }
}

fn binary(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    if rest.is_empty() {
        first
    } else {
        Expr::Binary(Box::new(first), rest)
    }
}

/// `name`, `name(args)`, or either of those indexed.
fn is_member(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) | Expr::Call { .. } => true,
        Expr::Index(inner, _) => matches!(**inner, Expr::Ident(_) | Expr::Call { .. }),
        _ => false,
    }
}

fn check_target(target: &Expr, pos: Pos) -> Result<()> {
    if target.is_assign_target() {
        Ok(())
    } else {
        Err(Error::parse("invalid assignment target", pos))
    }
}

/// Whether `kind` can begin a test expression.
fn starts_test(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Nil
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Int(_)
            | TokenKind::Str(_)
            | TokenKind::Ident(_)
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Minus
            | TokenKind::Not
    )
}

/// Tokenize and parse a whole template.
pub fn parse(src: &str) -> Result<Program> {
    let tokens = tokenize(src)?;
    Parser::new(tokens).parse_program()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
