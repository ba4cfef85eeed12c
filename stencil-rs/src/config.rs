//! `.stencilrc` configuration file parser.
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set max_depth=<n>` | limit on nested function calls |
//! | `/set <name>=<value>` or `/set <name> <value>` | predefine a global template variable |
//! | Lines starting with `;` | comment, ignored |
//! | Any other `/command` | silently skipped |

use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

use crate::script::context::DEFAULT_MAX_DEPTH;
use crate::script::value::Value;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub max_depth: usize,
    /// Predefined globals, in definition order.
    pub vars: IndexMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_depth: DEFAULT_MAX_DEPTH,
            vars: IndexMap::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Returns the config and a list of any errors on recognised lines; the
    /// offending lines are skipped.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some(rest) = line.strip_prefix('/') else { continue };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));

            match cmd {
                "set" => {
                    let tokens = split_args(args_str.trim());
                    if let Err(message) = config.apply_set(&tokens) {
                        warn!(line = lineno, %message, "config line skipped");
                        errors.push(ConfigError { line: lineno, message });
                    }
                }
                _ => {}
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// The predefined globals as template values: integers become `int`,
    /// anything else stays a string.
    pub fn globals(&self) -> impl Iterator<Item = (String, Value)> + '_ {
        self.vars.iter().map(|(name, raw)| {
            let value = raw
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Str(raw.clone()));
            (name.clone(), value)
        })
    }

    fn apply_set(&mut self, tokens: &[String]) -> Result<(), String> {
        let (name, value) = parse_set(tokens)?;
        if name == "max_depth" {
            self.max_depth = match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(format!("/set: max_depth must be a positive integer, not '{value}'")),
            };
        } else {
            self.vars.insert(name, value);
        }
        Ok(())
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

// ── /set ──────────────────────────────────────────────────────────────────────

fn parse_set(tokens: &[String]) -> Result<(String, String), String> {
    let Some(first) = tokens.first() else {
        return Err("/set: requires an argument".into());
    };

    let (name, value) = if let Some((name, value)) = first.split_once('=') {
        (name.to_owned(), value.to_owned())
    } else if tokens.len() >= 2 {
        (first.clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("/set: missing value for '{first}'"));
    };

    if name.is_empty() {
        return Err("/set: variable name cannot be empty".into());
    }
    Ok((name, value))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#"title "Weekly Report""#), ["title", "Weekly Report"]);
        assert_eq!(split_args(r#""say \"hi\"""#), [r#"say "hi""#]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn set_forms() {
        let (cfg, errs) = Config::load_str(
            "; defaults\n/set author=ann\n/set title \"Weekly Report\"\n/set year=2024\n",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.vars.get("author").map(String::as_str), Some("ann"));
        assert_eq!(cfg.vars.get("title").map(String::as_str), Some("Weekly Report"));
        let globals: Vec<_> = cfg.globals().collect();
        assert_eq!(
            globals,
            vec![
                ("author".to_owned(), Value::from("ann")),
                ("title".to_owned(), Value::from("Weekly Report")),
                ("year".to_owned(), Value::Int(2024)),
            ]
        );
    }

    #[test]
    fn max_depth() {
        let (cfg, errs) = Config::load_str("/set max_depth=12");
        assert!(errs.is_empty());
        assert_eq!(cfg.max_depth, 12);
        assert!(cfg.vars.is_empty());
        assert_eq!(Config::new().max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn bad_lines_are_reported() {
        let (cfg, errs) = Config::load_str("/set max_depth=lots\n\n/set lonely\n/set =x\n/set\n");
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
        let lines: Vec<usize> = errs.iter().map(|e| e.line).collect();
        assert_eq!(lines, [1, 3, 4, 5]);
        assert_eq!(errs[1].to_string(), "line 3: /set: missing value for 'lonely'");
    }

    #[test]
    fn unknown_commands_and_plain_lines_skipped() {
        let (cfg, errs) = Config::load_str("/def foo = bar\nplain text\n/set x=1");
        assert!(errs.is_empty());
        assert_eq!(cfg.vars.len(), 1);
    }

    #[test]
    fn load_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".stencilrc");
        std::fs::write(&path, "/set who=world\n").unwrap();
        let (cfg, errs) = Config::load_file(&path).unwrap();
        assert!(errs.is_empty());
        assert_eq!(cfg.vars.get("who").map(String::as_str), Some("world"));
        assert!(Config::load_file(&dir.path().join("missing")).is_err());
    }
}
