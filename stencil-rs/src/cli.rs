//! Command-line argument parsing.
//!
//! Usage:
//!   stencil [-d] [-a] [-f[<rc>]] [-c<source>] [<template> [args…]]
//!
//! Flag parsing stops at the template path; everything after it belongs to
//! the template.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::BaseDirs;

use crate::script::ModuleLoader;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Print recorded aliases after the output (`-a`).
    pub print_aliases: bool,
    /// Which rc file to load.
    pub config: ConfigFile,
    /// Inline template source (`-c<source>`).
    pub source: Option<String>,
    /// Template path; `-` reads stdin.
    pub template: Option<String>,
    /// Arguments following the template path.
    pub template_args: Vec<String>,
}

/// How to choose the user config file.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConfigFile {
    /// Search the standard locations (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip user config.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

impl CliArgs {
    /// The argument vector handed to the template: program name first.
    pub fn template_argv(&self) -> Vec<String> {
        let name = self.template.clone().unwrap_or_else(|| "stencil".to_owned());
        std::iter::once(name)
            .chain(self.template_args.iter().cloned())
            .collect()
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            i += 1;
            break;
        }
        if !arg.starts_with('-') || arg == "-" {
            break;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'a' => args.print_aliases = true,

                // -f[<file>]; a separate word would be the template.
                'f' => {
                    args.config = if j + 1 < chars.len() {
                        ConfigFile::Explicit(PathBuf::from(chars[j + 1..].iter().collect::<String>()))
                    } else {
                        ConfigFile::Skip
                    };
                    j = chars.len();
                }

                // -c<source>
                'c' => {
                    let src = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires a source argument".to_owned());
                    };
                    args.source = Some(src);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    let mut rest = argv[i..].iter().cloned();
    if args.source.is_none() {
        args.template = rest.next();
    }
    args.template_args = rest.collect();

    if args.source.is_none() && args.template.is_none() {
        return Err("no template given".to_owned());
    }
    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user config file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let dirs = BaseDirs::new();
    let home = dirs.as_ref().map(|d| d.home_dir().join(".stencilrc"));
    let config = dirs.as_ref().map(|d| d.config_dir().join("stencilrc"));
    [home, config, Some(PathBuf::from("./.stencilrc"))]
        .into_iter()
        .flatten()
        .find(|p| p.exists())
}

/// Loader that maps module path `a.b` to the file `<base>/a/b.st`.
pub fn file_loader(base: &Path) -> ModuleLoader {
    let base = base.to_path_buf();
    Arc::new(move |module: &str| {
        let mut path = base.clone();
        path.extend(module.split('.'));
        path.set_extension("st");
        std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
