//! Runtime value type for the template language.
//!
//! Values are dynamically typed.  Arrays and dicts own their elements, so
//! `Clone` is a deep copy; functions and modules share their immutable
//! definition.  [`Value::Ident`] and [`Value::Index`] are unresolved
//! references produced while evaluating assignment targets and lookups; the
//! interpreter resolves them before a value is stored or printed.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::{BinOp, FuncDef};
use super::error::{Error, Result};
use super::module::Module;

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Value>),
    Dict(IndexMap<String, Value>),
    /// Deferred reference to a name.
    Ident(String),
    Func(Func),
    /// Deferred `operand[k1][k2]…` access.
    Index(Box<IndexRef>),
    Module(Module),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRef {
    pub operand: Value,
    pub keys: Vec<Value>,
}

/// A user-defined function.
#[derive(Clone)]
pub struct Func {
    pub def: Rc<FuncDef>,
    /// Module whose sandbox the body runs in, for functions reached through
    /// an import.
    pub owner: Option<Module>,
}

impl Func {
    pub fn new(def: Rc<FuncDef>) -> Self {
        Func { def, owner: None }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl PartialEq for Func {
    /// Functions are equal when they share a definition.
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.def, &other.def)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Func({}/{})", self.def.name, self.def.params.len())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Array(_) => f.write_str("(array)"),
            Value::Dict(_) => f.write_str("(dict)"),
            Value::Ident(name) => f.write_str(name),
            Value::Func(_) => f.write_str("(function)"),
            Value::Index(_) => f.write_str("(index)"),
            Value::Module(_) => f.write_str("(module)"),
        }
    }
}

impl Value {
    /// Truthiness of a resolved value.
    ///
    /// # Panics
    ///
    /// On an unresolved [`Value::Ident`] or [`Value::Index`]; the interpreter
    /// resolves operands before testing them.
    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Func(_) | Value::Module(_) => true,
            Value::Ident(_) | Value::Index(_) => {
                unreachable!("references are resolved before truth tests")
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Ident(_) => "identifier",
            Value::Func(_) => "function",
            Value::Index(_) => "index",
            Value::Module(_) => "module",
        }
    }

    /// Integer view of ints and bools (`true` = 1).
    fn as_number(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    fn arith(&self, op: BinOp, rhs: &Value, f: fn(i64, i64) -> Option<i64>) -> Result<Value> {
        match (self.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => f(a, b)
                .map(Value::Int)
                .ok_or_else(|| Error::Arithmetic("integer overflow".into())),
            _ => Err(unsupported(op, self, rhs)),
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => self.arith(BinOp::Add, rhs, i64::checked_add),
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value> {
        self.arith(BinOp::Sub, rhs, i64::checked_sub)
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value> {
        self.arith(BinOp::Mul, rhs, i64::checked_mul)
    }

    /// Integer division, truncating toward zero.
    pub fn div(&self, rhs: &Value) -> Result<Value> {
        if rhs.as_number() == Some(0) && self.as_number().is_some() {
            return Err(Error::Arithmetic("division by zero".into()));
        }
        self.arith(BinOp::Div, rhs, i64::checked_div)
    }

    pub fn neg(&self) -> Result<Value> {
        match self.as_number() {
            Some(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Error::Arithmetic("integer overflow".into())),
            None => Err(Error::Type(format!(
                "bad operand type for unary -: '{}'",
                self.type_name()
            ))),
        }
    }

    /// `==`.  Nil is unequal to every other comparable kind; ints and bools
    /// compare numerically; functions compare by definition.
    pub fn equals(&self, rhs: &Value) -> Result<bool> {
        let comparable = |v: &Value| {
            matches!(v, Value::Bool(_) | Value::Int(_) | Value::Str(_) | Value::Func(_))
        };
        match (self, rhs) {
            (Value::Nil, Value::Nil) => Ok(true),
            (Value::Nil, other) | (other, Value::Nil) if comparable(other) => Ok(false),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Func(a), Value::Func(b)) => Ok(a == b),
            _ => match (self.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Ok(a == b),
                _ => Err(unsupported(BinOp::Eq, self, rhs)),
            },
        }
    }

    /// Ordering, defined for int/bool pairs only.
    pub fn compare(&self, op: BinOp, rhs: &Value) -> Result<Ordering> {
        match (self.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Ok(a.cmp(&b)),
            _ => Err(unsupported(op, self, rhs)),
        }
    }

    /// Apply a binary operator to two resolved operands.
    ///
    /// `or`/`and` test `lhs` with [`Value::is_truthy`], so both operands must
    /// already be resolved.
    pub(crate) fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
        Ok(match op {
            BinOp::Or => {
                if lhs.is_truthy() {
                    lhs
                } else {
                    rhs
                }
            }
            BinOp::And => {
                if lhs.is_truthy() {
                    rhs
                } else {
                    lhs
                }
            }
            BinOp::Add => lhs.add(&rhs)?,
            BinOp::Sub => lhs.sub(&rhs)?,
            BinOp::Mul => lhs.mul(&rhs)?,
            BinOp::Div => lhs.div(&rhs)?,
            BinOp::Eq => Value::Bool(lhs.equals(&rhs)?),
            BinOp::Ne => Value::Bool(!lhs.equals(&rhs)?),
            BinOp::Lt => Value::Bool(lhs.compare(op, &rhs)? == Ordering::Less),
            BinOp::Gt => Value::Bool(lhs.compare(op, &rhs)? == Ordering::Greater),
            BinOp::Le => Value::Bool(lhs.compare(op, &rhs)? != Ordering::Greater),
            BinOp::Ge => Value::Bool(lhs.compare(op, &rhs)? != Ordering::Less),
        })
    }

    // ── Indexing ──────────────────────────────────────────────────────────────

    /// Follow `keys` left to right and return a copy of the element.
    pub fn lookup(&self, keys: &[Value]) -> Result<Value> {
        let mut cur = self;
        for (i, key) in keys.iter().enumerate() {
            if let Value::Str(s) = cur {
                let ch = char_at(s, key)?;
                return ch.lookup(&keys[i + 1..]);
            }
            cur = cur.element(key)?;
        }
        Ok(cur.clone())
    }

    /// Borrow an array or dict element.  Missing dict keys are a KeyError.
    pub fn element(&self, key: &Value) -> Result<&Value> {
        match self {
            Value::Array(items) => Ok(&items[array_slot(key, items.len())?]),
            Value::Dict(map) => {
                let k = dict_key(key)?;
                map.get(k).ok_or_else(|| Error::Key(k.to_owned()))
            }
            other => Err(not_indexable(other)),
        }
    }

    pub fn element_mut(&mut self, key: &Value) -> Result<&mut Value> {
        match self {
            Value::Array(items) => {
                let slot = array_slot(key, items.len())?;
                Ok(&mut items[slot])
            }
            Value::Dict(map) => {
                let k = dict_key(key)?;
                map.get_mut(k).ok_or_else(|| Error::Key(k.to_owned()))
            }
            other => Err(not_indexable(other)),
        }
    }

    /// Store into an array slot (bounds-checked) or a dict entry (inserted
    /// when missing).
    pub fn set_element(&mut self, key: &Value, value: Value) -> Result<()> {
        match self {
            Value::Array(items) => {
                let slot = array_slot(key, items.len())?;
                items[slot] = value;
                Ok(())
            }
            Value::Dict(map) => {
                map.insert(dict_key(key)?.to_owned(), value);
                Ok(())
            }
            Value::Str(_) => Err(Error::Type("str does not support item assignment".into())),
            other => Err(not_indexable(other)),
        }
    }
}

fn unsupported(op: BinOp, lhs: &Value, rhs: &Value) -> Error {
    Error::Type(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn not_indexable(v: &Value) -> Error {
    Error::Type(format!("'{}' is not indexable", v.type_name()))
}

fn array_slot(key: &Value, len: usize) -> Result<usize> {
    let Value::Int(index) = *key else {
        return Err(Error::Type(format!(
            "index must be int, not '{}'",
            key.type_name()
        )));
    };
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => Err(Error::Range { index, len }),
    }
}

fn dict_key(key: &Value) -> Result<&str> {
    match key {
        Value::Str(s) => Ok(s),
        other => Err(Error::Type(format!(
            "dict key must be str, not '{}'",
            other.type_name()
        ))),
    }
}

fn char_at(s: &str, key: &Value) -> Result<Value> {
    let len = s.chars().count();
    let i = array_slot(key, len)?;
    Ok(s.chars().nth(i).map(|c| Value::Str(c.to_string())).unwrap_or_default())
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
