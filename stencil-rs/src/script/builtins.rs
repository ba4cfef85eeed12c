//! Built-in functions.
//!
//! Each function receives the context and its already-resolved arguments.
//! They are grouped into tables: [`GLOBALS`] are callable by bare name,
//! [`OPTS`] and [`ALIAS`] back the `opts` and `alias` modules, and
//! [`STRING_METHODS`] are called on a string receiver (`"x".upper()`).

use std::sync::LazyLock;

use regex::Regex;

use super::context::Context;
use super::error::{Error, Result};
use super::value::Value;

pub type BuiltinFn = fn(&mut Context, Vec<Value>) -> Result<Value>;

pub const GLOBALS: &[(&str, BuiltinFn)] = &[("puts", puts)];

pub const OPTS: &[(&str, BuiltinFn)] = &[
    ("get", opts_get),
    ("has", opts_has),
    ("args", opts_args),
];

pub const ALIAS: &[(&str, BuiltinFn)] = &[("set", alias_set)];

pub const STRING_METHODS: &[(&str, BuiltinFn)] = &[
    ("lower", str_lower),
    ("upper", str_upper),
    ("capitalize", str_capitalize),
    ("snake", str_snake),
];

// ── Argument helpers ──────────────────────────────────────────────────────────

fn check_arity(args: &[Value], range: std::ops::RangeInclusive<usize>, what: &str) -> Result<()> {
    if range.contains(&args.len()) {
        return Ok(());
    }
    let expected = if range.start() == range.end() {
        range.start().to_string()
    } else {
        format!("{} to {}", range.start(), range.end())
    };
    Err(Error::arity(what, expected, args.len()))
}

fn get_str<'a>(args: &'a [Value], i: usize, what: &str) -> Result<&'a str> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(Error::Type(format!(
            "{what}: argument {} must be str, not '{}'",
            i + 1,
            other.type_name()
        ))),
        None => Err(Error::arity(what, i + 1, args.len())),
    }
}

fn get_int(args: &[Value], i: usize, what: &str) -> Result<i64> {
    match args.get(i) {
        Some(Value::Int(n)) => Ok(*n),
        Some(other) => Err(Error::Type(format!(
            "{what}: argument {} must be int, not '{}'",
            i + 1,
            other.type_name()
        ))),
        None => Err(Error::arity(what, i + 1, args.len())),
    }
}

/// The string a method was called on.
fn receiver(ctx: &mut Context, what: &str) -> Result<String> {
    match ctx.receiver.take() {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(Error::Type(format!(
            "{what}() needs a str receiver, not '{}'",
            other.type_name()
        ))),
        None => Err(Error::Type(format!("{what}() must be called on a str"))),
    }
}

// ── Globals ───────────────────────────────────────────────────────────────────

/// `puts(v1, v2, …)`: space-joined, newline-terminated.
fn puts(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    ctx.write(&line);
    ctx.write("\n");
    Ok(Value::Nil)
}

// ── opts ──────────────────────────────────────────────────────────────────────

fn opts_get(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    check_arity(&args, 1..=1, "opts.get")?;
    let name = get_str(&args, 0, "opts.get")?;
    Ok(ctx.opts.get(name).map(Value::from).unwrap_or_default())
}

fn opts_has(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    check_arity(&args, 1..=1, "opts.has")?;
    let name = get_str(&args, 0, "opts.has")?;
    Ok(Value::Bool(ctx.opts.has(name)))
}

fn opts_args(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    check_arity(&args, 1..=1, "opts.args")?;
    let index = get_int(&args, 0, "opts.args")?;
    Ok(usize::try_from(index)
        .ok()
        .and_then(|i| ctx.opts.arg(i))
        .map(Value::from)
        .unwrap_or_default())
}

// ── alias ─────────────────────────────────────────────────────────────────────

fn alias_set(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    check_arity(&args, 2..=3, "alias.set")?;
    let key = get_str(&args, 0, "alias.set")?;
    let value = get_str(&args, 1, "alias.set")?;
    let desc = match args.get(2) {
        Some(_) => Some(get_str(&args, 2, "alias.set")?.to_owned()),
        None => None,
    };
    tracing::debug!(key, value, "alias recorded");
    ctx.aliases.set(key, value, desc);
    Ok(Value::Nil)
}

// ── String methods ────────────────────────────────────────────────────────────

fn str_lower(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    check_arity(&args, 0..=0, "lower")?;
    Ok(Value::Str(receiver(ctx, "lower")?.to_lowercase()))
}

fn str_upper(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    check_arity(&args, 0..=0, "upper")?;
    Ok(Value::Str(receiver(ctx, "upper")?.to_uppercase()))
}

/// Upper-case the first character; the rest is left alone.
fn str_capitalize(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    check_arity(&args, 0..=0, "capitalize")?;
    let s = receiver(ctx, "capitalize")?;
    let mut chars = s.chars();
    Ok(Value::Str(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }))
}

static ACRONYM_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid pattern"));
static CASE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid pattern"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("valid pattern"));

/// camelCase, kebab-case and spaced words → snake_case.
pub fn snake_case(s: &str) -> String {
    let s = ACRONYM_BOUNDARY.replace_all(s, "${1}_${2}");
    let s = CASE_BOUNDARY.replace_all(&s, "${1}_${2}");
    let s = SEPARATORS.replace_all(s.trim(), "_");
    s.to_lowercase()
}

fn str_snake(ctx: &mut Context, args: Vec<Value>) -> Result<Value> {
    check_arity(&args, 0..=0, "snake")?;
    Ok(Value::Str(snake_case(&receiver(ctx, "snake")?)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ErrorKind;
    use crate::script::opts::Opts;

    fn call_method(f: BuiltinFn, recv: &str) -> Value {
        let mut ctx = Context::new();
        ctx.receiver = Some(Value::from(recv));
        f(&mut ctx, vec![]).unwrap()
    }

    #[test]
    fn puts_joins_with_spaces() {
        let mut ctx = Context::new();
        let r = puts(&mut ctx, vec![Value::from("a"), Value::Int(1), Value::Nil]).unwrap();
        assert_eq!(r, Value::Nil);
        puts(&mut ctx, vec![]).unwrap();
        assert_eq!(ctx.output, "a 1 nil\n\n");
    }

    #[test]
    fn string_methods() {
        assert_eq!(call_method(str_lower, "HeLLo"), Value::from("hello"));
        assert_eq!(call_method(str_upper, "HeLLo"), Value::from("HELLO"));
        assert_eq!(call_method(str_capitalize, "hello World"), Value::from("Hello World"));
        assert_eq!(call_method(str_capitalize, "hELLO"), Value::from("HELLO"));
        assert_eq!(call_method(str_capitalize, ""), Value::from(""));
    }

    #[test]
    fn snake() {
        assert_eq!(snake_case("helloWorld"), "hello_world");
        assert_eq!(snake_case("HelloWorld"), "hello_world");
        assert_eq!(snake_case("kebab-case-name"), "kebab_case_name");
        assert_eq!(snake_case("two words"), "two_words");
        assert_eq!(snake_case("HTMLParser"), "html_parser");
        assert_eq!(snake_case("version2Beta"), "version2_beta");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn method_errors() {
        let mut ctx = Context::new();
        ctx.receiver = Some(Value::from("x"));
        let e = str_upper(&mut ctx, vec![Value::Int(1)]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Arity);
        ctx.receiver = Some(Value::Int(3));
        let e = str_upper(&mut ctx, vec![]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Type);
        assert!(ctx.receiver.is_none());
        let e = str_upper(&mut ctx, vec![]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Type);
    }

    #[test]
    fn opts_functions() {
        let mut ctx = Context::new();
        ctx.opts = Opts::parse(&["prog".into(), "--name".into(), "v".into(), "pos".into()]);
        assert_eq!(opts_get(&mut ctx, vec!["name".into()]).unwrap(), Value::from("v"));
        assert_eq!(opts_get(&mut ctx, vec!["nope".into()]).unwrap(), Value::Nil);
        assert_eq!(opts_has(&mut ctx, vec!["name".into()]).unwrap(), Value::Bool(true));
        assert_eq!(opts_args(&mut ctx, vec![Value::Int(1)]).unwrap(), Value::from("pos"));
        assert_eq!(opts_args(&mut ctx, vec![Value::Int(9)]).unwrap(), Value::Nil);
        assert_eq!(opts_args(&mut ctx, vec![Value::Int(-1)]).unwrap(), Value::Nil);
        assert_eq!(
            opts_get(&mut ctx, vec![Value::Int(1)]).unwrap_err().kind(),
            ErrorKind::Type
        );
        assert_eq!(opts_has(&mut ctx, vec![]).unwrap_err().kind(), ErrorKind::Arity);
    }

    #[test]
    fn alias_set_records() {
        let mut ctx = Context::new();
        alias_set(&mut ctx, vec!["ll".into(), "ls -l".into()]).unwrap();
        alias_set(&mut ctx, vec!["gs".into(), "git status".into(), "status".into()]).unwrap();
        assert_eq!(ctx.aliases.len(), 2);
        assert_eq!(
            ctx.aliases.get("gs").and_then(|a| a.desc.as_deref()),
            Some("status")
        );
        assert_eq!(
            alias_set(&mut ctx, vec!["k".into()]).unwrap_err().kind(),
            ErrorKind::Arity
        );
        assert_eq!(
            alias_set(&mut ctx, vec!["k".into(), Value::Int(1)]).unwrap_err().kind(),
            ErrorKind::Type
        );
    }
}
