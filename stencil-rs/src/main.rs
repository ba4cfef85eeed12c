use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use stencil::cli::{self, CliArgs, ConfigFile};
use stencil::logger::{self, LogLevel};
use stencil::{Compiler, Config};

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("stencil: {e}");
            eprintln!("Usage: stencil [-d] [-a] [-f[<rc>]] [-c<source>] [<template> [args...]]");
            return ExitCode::FAILURE;
        }
    };

    logger::init(if args.debug { LogLevel::Debug } else { LogLevel::Warn });

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(lines) => {
            for line in lines {
                eprintln!("stencil: {line}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<(), Vec<String>> {
    // ── Load user config ──────────────────────────────────────────────────────
    let rc = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };
    let config = match rc {
        Some(path) => load_config(&path)?,
        None => Config::new(),
    };

    // ── Read the template ─────────────────────────────────────────────────────
    let (source, base) = match (&args.source, args.template.as_deref()) {
        (Some(src), _) => (src.clone(), PathBuf::from(".")),
        (None, Some("-")) | (None, None) => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .map_err(|e| vec![format!("stdin: {e}")])?;
            (s, PathBuf::from("."))
        }
        (None, Some(path)) => {
            let s = std::fs::read_to_string(path).map_err(|e| vec![format!("{path}: {e}")])?;
            let base = Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            (s, base)
        }
    };

    // ── Compile ───────────────────────────────────────────────────────────────
    let mut compiler = Compiler::with_config(&config);
    compiler.set_module_loader(cli::file_loader(&base));
    let output = compiler
        .compile(&source, None, &args.template_argv())
        .map_err(|errors| errors.iter().map(|e| format!("{}: {e}", e.kind())).collect::<Vec<_>>())?;

    print!("{output}");
    if args.print_aliases {
        print!("{}", compiler.aliases().to_shell());
    }
    Ok(())
}

/// Bad lines are logged by the parser and skipped; an unreadable file is
/// fatal.
fn load_config(path: &Path) -> Result<Config, Vec<String>> {
    let (config, errors) =
        Config::load_file(path).map_err(|e| vec![format!("{}: {e}", path.display())])?;
    tracing::debug!(path = %path.display(), skipped = errors.len(), "config loaded");
    Ok(config)
}
