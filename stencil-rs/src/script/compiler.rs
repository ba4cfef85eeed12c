//! Compilation façade: source text in, rendered text (or errors) out.

use tracing::debug;

use super::alias::AliasRegistry;
use super::builtins::BuiltinFn;
use super::context::{Context, ModuleLoader};
use super::error::Errors;
use super::interp::Interpreter;
use super::lexer::tokenize;
use super::opts::Opts;
use super::parser::Parser;
use super::value::Value;
use crate::config::Config;

/// Output of a one-shot [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub output: String,
    pub aliases: AliasRegistry,
}

/// Owns a [`Context`] and compiles template units against it.  The context
/// is cleared before every unit, so one compiler can render many templates.
pub struct Compiler {
    ctx: Context,
    /// Predefined globals bound at the start of every unit.
    globals: Vec<(String, Value)>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            ctx: Context::new(),
            globals: Vec::new(),
        }
    }

    pub fn with_config(config: &Config) -> Self {
        let mut compiler = Compiler::new();
        compiler.ctx.max_depth = config.max_depth;
        compiler.globals = config.globals().collect();
        compiler
    }

    pub fn set_module_loader(&mut self, loader: ModuleLoader) {
        self.ctx.set_loader(Some(loader));
    }

    /// Add a global builtin callable by bare name from templates.
    pub fn register_function(&mut self, name: &str, f: BuiltinFn) {
        self.ctx.register(name, f);
    }

    /// Bind a global for every subsequent unit.
    pub fn define(&mut self, name: &str, value: Value) {
        self.globals.retain(|(n, _)| n != name);
        self.globals.push((name.to_owned(), value));
    }

    pub fn set_max_depth(&mut self, depth: usize) {
        self.ctx.max_depth = depth;
    }

    /// Compile one unit.
    ///
    /// `args` is the argument vector exposed through `opts` (element 0 is
    /// the program name).  When it is empty, `program_name` alone is used.
    pub fn compile(
        &mut self,
        source: &str,
        program_name: Option<&str>,
        args: &[String],
    ) -> Result<String, Errors> {
        self.ctx.clear();
        let argv = match program_name {
            Some(name) if args.is_empty() => vec![name.to_owned()],
            _ => args.to_vec(),
        };
        self.ctx.opts = Opts::parse(&argv);
        for (name, value) in &self.globals {
            self.ctx.scope.bind(name.clone(), value.clone());
        }

        let tokens = tokenize(source)?;
        debug!(tokens = tokens.len(), "tokenized");
        let program = Parser::new(tokens).parse_program()?;
        debug!(blocks = program.blocks.len(), "parsed");

        Interpreter::new(&mut self.ctx).run(&program)?;
        debug!(
            bytes = self.ctx.output.len(),
            aliases = self.ctx.aliases.len(),
            "rendered"
        );
        Ok(std::mem::take(&mut self.ctx.output))
    }

    /// Aliases recorded by the most recent unit.
    pub fn aliases(&self) -> &AliasRegistry {
        &self.ctx.aliases
    }
}

/// Compile `source` with a throwaway [`Compiler`].
pub fn compile(source: &str, program_name: Option<&str>, args: &[String]) -> Result<Rendered, Errors> {
    let mut compiler = Compiler::new();
    let output = compiler.compile(source, program_name, args)?;
    Ok(Rendered {
        output,
        aliases: compiler.ctx.aliases,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
