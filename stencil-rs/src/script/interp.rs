//! Tree-walking evaluator.
//!
//! The [`Interpreter`] borrows a [`Context`] and executes a parsed
//! [`Program`] against it.  Expressions evaluate to [`Value`]s that may still
//! be references ([`Value::Ident`] / [`Value::Index`]); [`Interpreter::resolve`]
//! turns them into copies.  Statements report non-local exits through
//! [`ControlFlow`].

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::ast::{Assign, Block, Body, Elem, Expr, ForKind, Formula, FuncDef, Import, Program, Stmt};
use super::context::Context;
use super::error::{Error, Result};
use super::module::Module;
use super::parser;
use super::value::{Func, IndexRef, Value};

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    Normal,
    Break,
    Continue,
    /// Value is already resolved.
    Return(Value),
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter<'c> {
    ctx: &'c mut Context,
}

impl<'c> Interpreter<'c> {
    pub fn new(ctx: &'c mut Context) -> Self {
        Interpreter { ctx }
    }

    /// Execute a whole program.  A top-level `return` stops rendering.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        self.exec_blocks(&program.blocks)?;
        Ok(())
    }

    // ── Blocks and statements ─────────────────────────────────────────────────

    fn exec_blocks(&mut self, blocks: &[Block]) -> Result<ControlFlow> {
        for block in blocks {
            let flow = self.exec_block(block)?;
            if flow != ControlFlow::Normal {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Normal)
    }

    fn exec_block(&mut self, block: &Block) -> Result<ControlFlow> {
        match block {
            Block::Text(text) => self.ctx.write(text),
            Block::Ref(formula) => {
                let value = self.eval_formula(formula)?;
                let text = self.resolve(value)?.to_string();
                self.ctx.write(&text);
            }
            Block::Code(elems) => {
                for elem in elems {
                    let flow = self.exec_elem(elem)?;
                    if flow != ControlFlow::Normal {
                        return Ok(flow);
                    }
                }
            }
        }
        Ok(ControlFlow::Normal)
    }

    fn exec_elem(&mut self, elem: &Elem) -> Result<ControlFlow> {
        match elem {
            Elem::Def(def) => {
                let func = Func::new(Rc::clone(def));
                self.ctx.scope.bind(def.name.clone(), Value::Func(func));
                Ok(ControlFlow::Normal)
            }
            Elem::Stmt(stmt) => self.exec_stmt(stmt),
            Elem::Formula(formula) => {
                let value = self.eval_formula(formula)?;
                self.resolve(value)?;
                Ok(ControlFlow::Normal)
            }
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<ControlFlow> {
        match stmt {
            Stmt::If {
                branches,
                else_body,
            } => {
                for (test, body) in branches {
                    if self.truthy(test)? {
                        return self.exec_blocks(body);
                    }
                }
                match else_body {
                    Some(body) => self.exec_blocks(body),
                    None => Ok(ControlFlow::Normal),
                }
            }
            Stmt::For { kind, body } => self.exec_for(kind, body),
            Stmt::Break => Ok(ControlFlow::Break),
            Stmt::Continue => Ok(ControlFlow::Continue),
            Stmt::Return(formula) => {
                let value = match formula {
                    Some(f) => {
                        let v = self.eval_formula(f)?;
                        self.resolve(v)?
                    }
                    None => Value::Nil,
                };
                Ok(ControlFlow::Return(value))
            }
            Stmt::Import(import) => {
                self.exec_import(import)?;
                Ok(ControlFlow::Normal)
            }
        }
    }

    /// Run one loop iteration.  `Some(flow)` means leave the loop with `flow`.
    fn loop_body(&mut self, body: &Body) -> Result<Option<ControlFlow>> {
        Ok(match self.exec_blocks(body)? {
            ControlFlow::Break => Some(ControlFlow::Normal),
            ret @ ControlFlow::Return(_) => Some(ret),
            ControlFlow::Normal | ControlFlow::Continue => None,
        })
    }

    fn exec_for(&mut self, kind: &ForKind, body: &Body) -> Result<ControlFlow> {
        match kind {
            ForKind::Forever => loop {
                if let Some(flow) = self.loop_body(body)? {
                    return Ok(flow);
                }
            },
            ForKind::While(cond) => {
                while self.truthy(cond)? {
                    if let Some(flow) = self.loop_body(body)? {
                        return Ok(flow);
                    }
                }
            }
            ForKind::Counted { init, cond, step } => {
                self.eval_formula(init)?;
                while self.truthy(cond)? {
                    if let Some(flow) = self.loop_body(body)? {
                        return Ok(flow);
                    }
                    self.eval_formula(step)?;
                }
            }
            ForKind::Each { var, iter } => {
                for item in self.iter_items(iter)? {
                    self.ctx.scope.bind(var.clone(), item);
                    if let Some(flow) = self.loop_body(body)? {
                        return Ok(flow);
                    }
                }
            }
        }
        Ok(ControlFlow::Normal)
    }

    /// Items of a `for … in` loop: array elements, dict keys or characters.
    fn iter_items(&mut self, iter: &Expr) -> Result<Vec<Value>> {
        match self.eval_resolved(iter)? {
            Value::Array(items) => Ok(items),
            Value::Dict(map) => Ok(map.into_keys().map(Value::Str).collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            other => Err(Error::Type(format!(
                "'{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    // ── Imports ───────────────────────────────────────────────────────────────

    fn exec_import(&mut self, import: &Import) -> Result<()> {
        match import {
            Import::Module { path, alias } => {
                let module = self.import_module(path)?;
                let name = match alias {
                    Some(a) => a.clone(),
                    None => path.last().cloned().unwrap_or_default(),
                };
                self.ctx.scope.bind(name, Value::Module(module));
            }
            Import::Names { path, names } => {
                let module = self.import_module(path)?;
                for name in names {
                    let value = module.global(name).ok_or_else(|| {
                        Error::Import(format!(
                            "cannot import name '{name}' from '{}'",
                            module.name()
                        ))
                    })?;
                    self.ctx.scope.bind(name.clone(), value);
                }
            }
        }
        Ok(())
    }

    /// Load, compile and cache the module at `path`.
    fn import_module(&mut self, path: &[String]) -> Result<Module> {
        let key = path.join(".");
        if let Some(module) = self.ctx.cached_module(&key) {
            return Ok(module);
        }
        if self.ctx.is_importing(&key) {
            return Err(Error::Import(format!("circular import of '{key}'")));
        }
        let loader = self
            .ctx
            .loader()
            .cloned()
            .ok_or_else(|| Error::Import(format!("no module loader to import '{key}'")))?;
        let source = loader(&key).map_err(|e| Error::Import(format!("cannot load '{key}': {e}")))?;
        debug!(module = %key, bytes = source.len(), "importing module");

        let program = parser::parse(&source)
            .map_err(|e| Error::Import(format!("in module '{key}': {}: {e}", e.kind())))?;
        let mut sandbox = self.ctx.sandbox(&key);
        Interpreter::new(&mut sandbox).run(&program)?;
        sandbox.output.clear();
        self.ctx.aliases.absorb(&mut sandbox.aliases);

        let module = Module::template(&key, sandbox);
        self.ctx.cache_module(&key, module.clone());
        Ok(module)
    }

    // ── Formulas ──────────────────────────────────────────────────────────────

    fn eval_formula(&mut self, formula: &Formula) -> Result<Value> {
        match formula {
            Formula::Assign(list) => {
                let mut last = Value::Nil;
                for assign in list {
                    last = self.eval_assign(assign)?;
                }
                Ok(last)
            }
            Formula::Multi(lists) => {
                let Some((value_exprs, target_lists)) = lists.split_last() else {
                    return Ok(Value::Nil);
                };
                let values = self.eval_args(value_exprs)?;
                for targets in target_lists {
                    if targets.len() != values.len() {
                        return Err(Error::arity("unpacking", targets.len(), values.len()));
                    }
                }
                for targets in target_lists.iter().rev() {
                    for (target, value) in targets.iter().zip(&values) {
                        let place = self.eval(target)?;
                        self.assign_to(place, value.clone())?;
                    }
                }
                Ok(Value::Nil)
            }
        }
    }

    /// `t1 = t2 = value`: evaluate `value` once, assign right to left.
    fn eval_assign(&mut self, assign: &Assign) -> Result<Value> {
        let value = self.eval_resolved(&assign.value)?;
        for target in assign.targets.iter().rev() {
            let place = self.eval(target)?;
            self.assign_to(place, value.clone())?;
        }
        Ok(value)
    }

    /// Store `value` at a reference.  Names bind in the innermost frame;
    /// elements are written in place.
    fn assign_to(&mut self, place: Value, value: Value) -> Result<()> {
        match place {
            Value::Ident(name) => {
                self.ctx.scope.bind(name, value);
                Ok(())
            }
            Value::Index(index) => {
                let IndexRef { operand, keys } = *index;
                let Value::Ident(name) = operand else {
                    return Err(Error::Type("cannot assign to an element of a temporary".into()));
                };
                let Some((last, path)) = keys.split_last() else {
                    unreachable!("index expressions have at least one key")
                };
                let mut slot = self
                    .ctx
                    .scope
                    .get_mut(&name)
                    .ok_or_else(|| Error::Name(name.clone()))?;
                for key in path {
                    slot = slot.element_mut(key)?;
                }
                slot.set_element(last, value)
            }
            other => Err(Error::Type(format!(
                "cannot assign to '{}'",
                other.type_name()
            ))),
        }
    }

    /// Live reference behind an identifier or index reference.
    fn place_mut(&mut self, place: &Value) -> Result<&mut Value> {
        match place {
            Value::Ident(name) => self
                .ctx
                .scope
                .get_mut(name)
                .ok_or_else(|| Error::Name(name.clone())),
            Value::Index(index) => {
                let Value::Ident(name) = &index.operand else {
                    return Err(Error::Type("cannot assign to an element of a temporary".into()));
                };
                let mut slot = self
                    .ctx
                    .scope
                    .get_mut(name)
                    .ok_or_else(|| Error::Name(name.clone()))?;
                for key in &index.keys {
                    slot = slot.element_mut(key)?;
                }
                Ok(slot)
            }
            other => Err(Error::Type(format!(
                "cannot assign to '{}'",
                other.type_name()
            ))),
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    /// Resolve a reference to a copy of the value it names.
    pub fn resolve(&self, value: Value) -> Result<Value> {
        match value {
            Value::Ident(name) => match self.ctx.scope.get(&name) {
                Some(v) => Ok(v.clone()),
                None => Err(Error::Name(name)),
            },
            Value::Index(index) => {
                let IndexRef { operand, keys } = *index;
                match operand {
                    Value::Ident(name) => match self.ctx.scope.get(&name) {
                        Some(base) => base.lookup(&keys),
                        None => Err(Error::Name(name)),
                    },
                    other => self.resolve(other)?.lookup(&keys),
                }
            }
            other => Ok(other),
        }
    }

    fn eval_resolved(&mut self, expr: &Expr) -> Result<Value> {
        let value = self.eval(expr)?;
        self.resolve(value)
    }

    fn truthy(&mut self, expr: &Expr) -> Result<bool> {
        Ok(self.eval_resolved(expr)?.is_truthy())
    }

    fn eval_args(&mut self, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval_resolved(e)).collect()
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Array(items) => Ok(Value::Array(self.eval_args(items)?)),
            Expr::Dict(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = match self.eval_resolved(k)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(Error::Type(format!(
                                "dict key must be str, not '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    let value = self.eval_resolved(v)?;
                    map.insert(key, value);
                }
                Ok(Value::Dict(map))
            }
            Expr::Ident(name) => Ok(Value::Ident(name.clone())),
            Expr::Call { name, args } => {
                let args = self.eval_args(args)?;
                self.call_named(name, args)
            }
            Expr::Paren(formula) => {
                let value = self.eval_formula(formula)?;
                self.resolve(value)
            }
            Expr::Binary(first, rest) => {
                let mut acc = self.eval_resolved(first)?;
                for (op, operand) in rest {
                    let rhs = self.eval_resolved(operand)?;
                    acc = Value::binary(*op, acc, rhs)?;
                }
                Ok(acc)
            }
            Expr::Not(operand) => Ok(Value::Bool(!self.truthy(operand)?)),
            Expr::Neg(operand) => self.eval_resolved(operand)?.neg(),
            Expr::Dot(head, members) => {
                let mut cur = self.eval_resolved(head)?;
                for member in members {
                    cur = self.member(cur, member)?;
                }
                Ok(cur)
            }
            Expr::AugAssign(op, target, rhs) => {
                let place = self.eval(target)?;
                let rhs = self.eval_resolved(rhs)?;
                let slot = self.place_mut(&place)?;
                *slot = Value::binary(op.bin_op(), slot.clone(), rhs)?;
                Ok(place)
            }
            Expr::Index(operand, keys) => {
                let operand = self.eval(operand)?;
                let keys = self.eval_args(keys)?;
                Ok(Value::Index(Box::new(IndexRef { operand, keys })))
            }
        }
    }

    // ── Calls ─────────────────────────────────────────────────────────────────

    /// `name(args)`: global builtins first, then user functions.
    fn call_named(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        if let Some(f) = self.ctx.builtin(name) {
            return f(self.ctx, args);
        }
        match self.ctx.scope.get(name) {
            Some(Value::Func(func)) => {
                let func = func.clone();
                self.call_func(&func, args)
            }
            Some(other) => Err(Error::Type(format!(
                "'{name}' is a {}, not a function",
                other.type_name()
            ))),
            None => Err(Error::Name(name.to_owned())),
        }
    }

    pub fn call_func(&mut self, func: &Func, args: Vec<Value>) -> Result<Value> {
        let expected = func.def.params.len();
        if args.len() != expected {
            return Err(Error::arity(format!("{}()", func.name()), expected, args.len()));
        }
        match &func.owner {
            Some(module) => self.call_in_module(module, &func.def, args),
            None => self.invoke(&func.def, args),
        }
    }

    /// Run a function body in a fresh frame of the current context.
    fn invoke(&mut self, def: &FuncDef, args: Vec<Value>) -> Result<Value> {
        if self.ctx.depth >= self.ctx.max_depth {
            return Err(Error::Recursion(self.ctx.max_depth));
        }
        trace!(func = %def.name, depth = self.ctx.depth, "call");

        self.ctx.depth += 1;
        self.ctx.scope.push();
        for (param, arg) in def.params.iter().zip(args) {
            self.ctx.scope.bind(param.clone(), arg);
        }
        let result = self.exec_blocks(&def.body);
        self.ctx.scope.pop();
        self.ctx.depth -= 1;

        match result? {
            ControlFlow::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }

    /// Run a module function inside the module's sandbox and forward what it
    /// printed and recorded to this context.
    fn call_in_module(&mut self, module: &Module, def: &FuncDef, args: Vec<Value>) -> Result<Value> {
        let Some(cell) = module.sandbox() else {
            return self.invoke(def, args);
        };
        // Re-entered from inside the sandbox: stay where we are.
        let Ok(mut sandbox) = cell.try_borrow_mut() else {
            return self.invoke(def, args);
        };
        sandbox.depth = self.ctx.depth;
        let result = Interpreter::new(&mut sandbox).invoke(def, args);
        sandbox.depth = 0;

        let printed = std::mem::take(&mut sandbox.output);
        self.ctx.write(&printed);
        self.ctx.aliases.absorb(&mut sandbox.aliases);
        result
    }

    /// `recv.member` / `recv.member(args)`, optionally followed by `[k]…`.
    fn member(&mut self, recv: Value, member: &Expr) -> Result<Value> {
        match (recv, member) {
            (recv, Expr::Index(inner, keys)) => {
                let value = self.member(recv, inner)?;
                let keys = self.eval_args(keys)?;
                value.lookup(&keys)
            }
            (Value::Str(s), Expr::Call { name, args }) => {
                let f = self
                    .ctx
                    .string_method(name)
                    .ok_or_else(|| Error::Name(format!("str.{name}")))?;
                let args = self.eval_args(args)?;
                self.ctx.receiver = Some(Value::Str(s));
                let result = f(self.ctx, args);
                self.ctx.receiver = None;
                result
            }
            (Value::Module(module), Expr::Call { name, args }) => {
                let args = self.eval_args(args)?;
                if let Some(f) = module.builtin_fn(name) {
                    return f(self.ctx, args);
                }
                match module.global(name) {
                    Some(Value::Func(func)) => self.call_func(&func, args),
                    Some(other) => Err(Error::Type(format!(
                        "'{}.{name}' is a {}, not a function",
                        module.name(),
                        other.type_name()
                    ))),
                    None => Err(Error::Name(format!("{}.{name}", module.name()))),
                }
            }
            (Value::Module(module), Expr::Ident(name)) => module
                .global(name)
                .ok_or_else(|| Error::Name(format!("{}.{name}", module.name()))),
            (recv, _) => Err(Error::Type(format!(
                "'{}' has no members",
                recv.type_name()
            ))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::script::error::ErrorKind;
    use crate::script::opts::Opts;

    fn run_in(ctx: &mut Context, src: &str) -> Result<String> {
        let program = parser::parse(src)?;
        ctx.clear();
        Interpreter::new(ctx).run(&program)?;
        Ok(std::mem::take(&mut ctx.output))
    }

    fn render(src: &str) -> String {
        run_in(&mut Context::new(), src).unwrap_or_else(|e| panic!("{src:?} failed: {e}"))
    }

    fn err_kind(src: &str) -> ErrorKind {
        match run_in(&mut Context::new(), src) {
            Ok(out) => panic!("{src:?} unexpectedly rendered {out:?}"),
            Err(e) => e.kind(),
        }
    }

    fn with_modules(modules: &[(&str, &str)]) -> Context {
        let sources: HashMap<String, String> = modules
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut ctx = Context::new();
        ctx.set_loader(Some(Arc::new(move |path: &str| -> std::result::Result<String, String> {
            sources
                .get(path)
                .cloned()
                .ok_or_else(|| format!("no such module: {path}"))
        })));
        ctx
    }

    // ── Output ────────────────────────────────────────────────────────────────

    #[test]
    fn literal_text() {
        assert_eq!(render("just text\n"), "just text\n");
    }

    #[test]
    fn ref_blocks() {
        assert_eq!(render("{: 1 + 2 :}"), "3");
        assert_eq!(render("{: \"a\" + \"b\" :}"), "ab");
        assert_eq!(render("{: nil :}|{: true :}|{: [1] :}|{: {} :}"), "nil|true|(array)|(dict)");
    }

    #[test]
    fn code_blocks_produce_no_output() {
        assert_eq!(render("a{@ x = 1 @}b{: x :}"), "ab1");
    }

    #[test]
    fn puts_writes_lines() {
        assert_eq!(render("{@ puts(\"a\", 1, nil) puts() @}"), "a 1 nil\n\n");
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    #[test]
    fn arithmetic() {
        assert_eq!(render("{: 7 / 2 :},{: -7 / 2 :},{: 2 * 3 - 1 :},{: true + 1 :}"), "3,-3,5,2");
        assert_eq!(render("{: -(2 + 3) :}"), "-5");
    }

    #[test]
    fn arithmetic_errors() {
        assert_eq!(err_kind("{: 1 / 0 :}"), ErrorKind::Arithmetic);
        assert_eq!(err_kind("{: 9223372036854775807 + 1 :}"), ErrorKind::Arithmetic);
        assert_eq!(err_kind("{: \"a\" + 1 :}"), ErrorKind::Type);
        assert_eq!(err_kind("{: [1] + [2] :}"), ErrorKind::Type);
    }

    #[test]
    fn truthiness_table() {
        let src = "{@ for v in [nil, 0, 1, \"\", \"x\", [], [1]]: @}{: not not v :} {@ end @}";
        assert_eq!(render(src), "false false true false true false true ");
    }

    #[test]
    fn or_and_select_values() {
        assert_eq!(render("{: 0 or \"b\" :}"), "b");
        assert_eq!(render("{: 2 or \"b\" :}"), "2");
        assert_eq!(render("{: 2 and \"b\" :}"), "b");
        assert_eq!(render("{: \"\" and \"b\" :}"), "");
    }

    #[test]
    fn or_evaluates_both_sides() {
        assert_eq!(err_kind("{: 1 or undefined_name :}"), ErrorKind::Name);
    }

    #[test]
    fn comparisons() {
        assert_eq!(render("{: 1 < 2 :}{: 2 <= 1 :}{: 1 == true :}{: nil == 0 :}{: nil != nil :}"), "truefalsetruefalsefalse");
        assert_eq!(render("{: \"a\" == \"a\" :}"), "true");
        assert_eq!(err_kind("{: \"a\" < \"b\" :}"), ErrorKind::Type);
        assert_eq!(err_kind("{: [] == [] :}"), ErrorKind::Type);
    }

    #[test]
    fn function_equality_is_identity() {
        assert_eq!(render("{@ def f(): end def g(): end h = f @}{: f == h :}{: f == g :}"), "truefalse");
    }

    // ── Names and assignment ──────────────────────────────────────────────────

    #[test]
    fn undefined_name() {
        assert_eq!(err_kind("{: nope :}"), ErrorKind::Name);
        assert_eq!(err_kind("{@ nope @}"), ErrorKind::Name);
        assert_eq!(err_kind("{@ nope() @}"), ErrorKind::Name);
    }

    #[test]
    fn chained_assignment() {
        assert_eq!(render("{@ a = b = 5 @}{: a :}{: b :}"), "55");
        assert_eq!(render("{: x = 4 :}"), "4");
    }

    #[test]
    fn multi_assignment() {
        assert_eq!(render("{@ a, b = 1, 2 @}{: a :}{: b :}"), "12");
        assert_eq!(render("{@ a, b = 1, 2 a, b = b, a @}{: a :}{: b :}"), "21");
        assert_eq!(render("{@ a, b = c, d = 3, 4 @}{: a + b + c + d :}"), "14");
        assert_eq!(err_kind("{@ a, b = 1, 2, 3 @}"), ErrorKind::Arity);
    }

    #[test]
    fn assignment_copies() {
        assert_eq!(render("{@ a = [1, 2] b = a b[0] = 9 @}{: a[0] :}{: b[0] :}"), "19");
        assert_eq!(render("{@ a = {\"k\": [1]} b = a[\"k\"] b[0] = 5 @}{: a[\"k\"][0] :}"), "1");
    }

    #[test]
    fn array_elements() {
        assert_eq!(render("{@ a = [1, 2, 3] a[1] = 9 @}{: a[1] :}"), "9");
        assert_eq!(err_kind("{@ a = [1, 2, 3] @}{: a[10] :}"), ErrorKind::Range);
        assert_eq!(err_kind("{@ a = [1, 2, 3] a[10] = 1 @}"), ErrorKind::Range);
        assert_eq!(err_kind("{@ a = [1] @}{: a[\"0\"] :}"), ErrorKind::Type);
    }

    #[test]
    fn dict_elements() {
        assert_eq!(render("{@ d = {\"k\": \"v\"} @}{: d[\"k\"] :}"), "v");
        assert_eq!(err_kind("{@ d = {\"k\": \"v\"} @}{: d[\"missing\"] :}"), ErrorKind::Key);
        assert_eq!(render("{@ d = {} d[\"n\"] = 1 @}{: d[\"n\"] :}"), "1");
        assert_eq!(err_kind("{@ d = {1: 2} @}"), ErrorKind::Type);
    }

    #[test]
    fn nested_element_assignment() {
        assert_eq!(render("{@ m = [[1, 2], [3, 4]] m[1][0] = 7 @}{: m[1][0] :}"), "7");
        assert_eq!(render("{@ d = {\"a\": {}} d[\"a\"][\"b\"] = 2 @}{: d[\"a\"][\"b\"] :}"), "2");
    }

    #[test]
    fn string_indexing() {
        assert_eq!(render("{@ s = \"héllo\" @}{: s[1] :}"), "é");
        assert_eq!(err_kind("{@ s = \"ab\" s[0] = \"x\" @}"), ErrorKind::Type);
    }

    #[test]
    fn augmented_assignment() {
        assert_eq!(render("{@ a = 1 a += 2 @}{: a :}"), "3");
        assert_eq!(render("{@ a = 10 a += 1 -= 4 @}{: a :}"), "7");
        assert_eq!(render("{@ s = \"ab\" s += \"c\" @}{: s :}"), "abc");
        assert_eq!(render("{@ a = [1, 2] a[1] *= 5 @}{: a[1] :}"), "10");
        assert_eq!(render("{: n = 2 :}{: n += 3 :}"), "25");
        assert_eq!(err_kind("{@ q += 1 @}"), ErrorKind::Name);
        assert_eq!(err_kind("{@ d = {} d[\"x\"] += 1 @}"), ErrorKind::Key);
    }

    #[test]
    fn augmented_assignment_reaches_outer_frames() {
        let src = "{@ n = 1 def bump(): n += 10 end bump() @}{: n :}";
        assert_eq!(render(src), "11");
    }

    #[test]
    fn plain_assignment_binds_locally() {
        let src = "{@ n = 1 def set(): n = 5 return n end @}{: set() :}{: n :}";
        assert_eq!(render(src), "51");
    }

    // ── Control flow ──────────────────────────────────────────────────────────

    #[test]
    fn if_elif_else() {
        let src = "{@ for x in [1, 2, 3]: if x == 1: @}one{@ elif x == 2: @}two{@ else: @}many{@ end end @}";
        assert_eq!(render(src), "onetwomany");
    }

    #[test]
    fn counted_loop() {
        assert_eq!(render("{@ for i = 0; i < 3; i = i + 1: @}{: i :}{@ end @}"), "012");
    }

    #[test]
    fn while_loop_with_break_and_continue() {
        let src = "{@ i = 0 for i < 10: i += 1 if i == 2: continue end if i == 5: break end @}{: i :}{@ end @}";
        assert_eq!(render(src), "134");
    }

    #[test]
    fn counted_loop_continue_runs_step() {
        let src = "{@ for i = 0; i < 4; i += 1: if i == 1: continue end @}{: i :}{@ end @}";
        assert_eq!(render(src), "023");
    }

    #[test]
    fn forever_loop() {
        assert_eq!(render("{@ n = 0 for: n += 1 if n == 3: break end end @}{: n :}"), "3");
    }

    #[test]
    fn for_in_dict_and_string() {
        assert_eq!(render("{@ for k in {\"a\": 1, \"b\": 2}: @}{: k :}{@ end @}"), "ab");
        assert_eq!(render("{@ for c in \"xyz\": @}{: c :}-{@ end @}"), "x-y-z-");
        assert_eq!(err_kind("{@ for c in 5: end @}"), ErrorKind::Type);
    }

    #[test]
    fn top_level_return_stops_rendering() {
        assert_eq!(render("a{@ return @}b"), "a");
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    #[test]
    fn functions() {
        let src = "{@ def add(a, b): return a + b end @}{: add(2, 3) :}";
        assert_eq!(render(src), "5");
    }

    #[test]
    fn function_without_return_yields_nil() {
        assert_eq!(render("{@ def f(): x = 1 end @}{: f() :}"), "nil");
    }

    #[test]
    fn function_body_can_emit_text() {
        let src = "{@ def greet(name): @}Hello, {: name :}!{@ end greet(\"Ann\") greet(\"Bo\") @}";
        assert_eq!(render(src), "Hello, Ann!Hello, Bo!");
    }

    #[test]
    fn return_inside_loop_leaves_function() {
        let src = "{@ def first_big(xs): for x in xs: if x > 2: return x end end return nil end @}{: first_big([1, 5, 9]) :}";
        assert_eq!(render(src), "5");
    }

    #[test]
    fn recursion() {
        let src = "{@ def fact(n): if n <= 1: return 1 end return n * fact(n - 1) end @}{: fact(10) :}";
        assert_eq!(render(src), "3628800");
    }

    #[test]
    fn call_arity() {
        assert_eq!(err_kind("{@ def f(a): end f() @}"), ErrorKind::Arity);
        assert_eq!(err_kind("{@ def f(): end f(1) @}"), ErrorKind::Arity);
    }

    #[test]
    fn calling_a_non_function() {
        assert_eq!(err_kind("{@ x = 1 x() @}"), ErrorKind::Type);
    }

    #[test]
    fn returned_arrays_are_copies() {
        let src = "{@ base = [1, 2] def get(): return base end c = get() c[0] = 7 @}{: base[0] :}{: c[0] :}";
        assert_eq!(render(src), "17");
    }

    #[test]
    fn arguments_are_copies() {
        let src = "{@ def poke(xs): xs[0] = 0 return xs[0] end a = [5] @}{: poke(a) :}{: a[0] :}";
        assert_eq!(render(src), "05");
    }

    #[test]
    fn recursion_limit() {
        let mut ctx = Context::new();
        ctx.max_depth = 10;
        let err = run_in(&mut ctx, "{@ def f(n): return f(n + 1) end f(0) @}").unwrap_err();
        assert_eq!(err, Error::Recursion(10));
        // Depth is unwound after the error on the next run.
        ctx.max_depth = 10;
        let out = run_in(&mut ctx, "{@ def g(n): if n == 0: return 0 end return g(n - 1) end @}{: g(9) :}").unwrap();
        assert_eq!(out, "0");
    }

    #[test]
    fn long_sum() {
        let src = format!("{{: 0{} :}}", " + 1".repeat(50_000));
        assert_eq!(render(&src), "50000");
        let src = format!("{{: 100{} :}}", " - 1 * 2".repeat(40));
        assert_eq!(render(&src), "20");
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let src = format!("{{: {}1{} :}}", "(".repeat(300), ")".repeat(300));
        assert_eq!(err_kind(&src), ErrorKind::Parse);
        let src = format!("{{: {}1{} :}}", "(".repeat(40), ")".repeat(40));
        assert_eq!(render(&src), "1");
    }

    // ── Members ───────────────────────────────────────────────────────────────

    #[test]
    fn string_methods() {
        assert_eq!(render("{: \"helloWorld\".snake() :}"), "hello_world");
        assert_eq!(render("{: \"abc\".upper().lower().capitalize() :}"), "Abc");
        assert_eq!(render("{@ s = \"x\" @}{: s.upper() :}"), "X");
        assert_eq!(err_kind("{: \"abc\".reverse() :}"), ErrorKind::Name);
        assert_eq!(err_kind("{: \"abc\".upper(1) :}"), ErrorKind::Arity);
        assert_eq!(err_kind("{: 5.upper() :}"), ErrorKind::Type);
    }

    #[test]
    fn indexed_members() {
        assert_eq!(render("{: \"abc\".upper()[0] :}"), "A");
        assert_eq!(render("{: \"abc\".upper()[2].lower() :}"), "c");
        assert_eq!(err_kind("{: \"abc\".upper()[3] :}"), ErrorKind::Range);

        let mut ctx = with_modules(&[("m", "{@ xs = [1, [2, 3]] @}")]);
        assert_eq!(run_in(&mut ctx, "{@ import m @}{: m.xs[1][0] :}").unwrap(), "2");

        let mut ctx = Context::new();
        let program = parser::parse("{: opts.args(0)[0] :}").unwrap();
        ctx.opts = Opts::parse(&["prog".to_string()]);
        Interpreter::new(&mut ctx).run(&program).unwrap();
        assert_eq!(ctx.output, "p");
    }

    #[test]
    fn opts_module() {
        let mut ctx = Context::new();
        let program = parser::parse(
            "{: opts.get(\"name\") :} {: opts.has(\"x\") :} {: opts.args(1) :} {: opts.args(5) :} {: opts.get(\"zzz\") :}",
        )
        .unwrap();
        let argv: Vec<String> = ["prog", "--name", "value", "-x", "pos1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        ctx.opts = Opts::parse(&argv);
        Interpreter::new(&mut ctx).run(&program).unwrap();
        assert_eq!(ctx.output, "value true pos1 nil nil");
    }

    #[test]
    fn alias_module() {
        let mut ctx = Context::new();
        run_in(&mut ctx, "{@ alias.set(\"ll\", \"ls -l\") alias.set(\"gs\", \"git status\", \"status\") @}").unwrap();
        assert_eq!(ctx.aliases.len(), 2);
        assert_eq!(ctx.aliases.get("ll").map(|a| a.value.as_str()), Some("ls -l"));
        assert_eq!(err_kind("{@ alias.set(\"k\") @}"), ErrorKind::Arity);
        assert_eq!(err_kind("{@ alias.nope() @}"), ErrorKind::Name);
    }

    // ── Imports ───────────────────────────────────────────────────────────────

    #[test]
    fn import_module_and_call() {
        let mut ctx = with_modules(&[(
            "lib.greet",
            "ignored {@ greeting = \"hi\" def hello(n): @}{: greeting :} {: n :}{@ return n.upper() end @}",
        )]);
        let out = run_in(&mut ctx, "{@ import lib.greet as g @}[{: g.hello(\"bob\") :}] {: g.greeting :}").unwrap();
        assert_eq!(out, "[hi bobBOB] hi");
    }

    #[test]
    fn import_binds_last_segment() {
        let mut ctx = with_modules(&[("a.util", "{@ x = 42 @}")]);
        assert_eq!(run_in(&mut ctx, "{@ import a.util @}{: util.x :}").unwrap(), "42");
    }

    #[test]
    fn from_import() {
        let mut ctx = with_modules(&[("m", "{@ def twice(x): return x * 2 end k = 3 @}")]);
        assert_eq!(run_in(&mut ctx, "{@ from m import twice, k @}{: twice(k) :}").unwrap(), "6");
        let err = run_in(&mut ctx, "{@ from m import missing @}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Import);
    }

    #[test]
    fn module_aliases_reach_caller() {
        let mut ctx = with_modules(&[("al", "{@ alias.set(\"a\", \"1\") def more(): alias.set(\"b\", \"2\") end @}")]);
        run_in(&mut ctx, "{@ import al al.more() @}").unwrap();
        assert_eq!(ctx.aliases.len(), 2);
    }

    #[test]
    fn import_errors() {
        assert_eq!(err_kind("{@ import nothing @}"), ErrorKind::Import);
        let mut ctx = with_modules(&[]);
        assert_eq!(run_in(&mut ctx, "{@ import nothing @}").unwrap_err().kind(), ErrorKind::Import);
        let mut ctx = with_modules(&[("bad", "{@ x = @}")]);
        assert_eq!(run_in(&mut ctx, "{@ import bad @}").unwrap_err().kind(), ErrorKind::Import);
    }

    #[test]
    fn import_cycle() {
        let mut ctx = with_modules(&[("a", "{@ import b @}"), ("b", "{@ import a @}")]);
        assert_eq!(run_in(&mut ctx, "{@ import a @}").unwrap_err().kind(), ErrorKind::Import);
    }

    #[test]
    fn modules_are_loaded_once_per_run() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let mut ctx = Context::new();
        ctx.set_loader(Some(Arc::new(move |_: &str| -> std::result::Result<String, String> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("{@ n = 1 @}".to_owned())
        })));
        let out = run_in(&mut ctx, "{@ import m as a import m as b @}{: a.n + b.n :}").unwrap();
        assert_eq!(out, "2");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
