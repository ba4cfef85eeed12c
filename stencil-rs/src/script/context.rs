//! Evaluation context: everything a running template can observe or change.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::alias::AliasRegistry;
use super::builtins::{self, BuiltinFn};
use super::module::Module;
use super::opts::Opts;
use super::scope::Scope;
use super::value::Value;

/// Callback that returns the source text of an imported module path
/// (`"a.b"` for `import a.b`).
pub type ModuleLoader = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Default limit on nested function calls.
pub const DEFAULT_MAX_DEPTH: usize = 64;

pub struct Context {
    pub scope: Scope,
    /// Rendered output so far.
    pub output: String,
    pub aliases: AliasRegistry,
    pub opts: Opts,
    /// Receiver of the string method currently being called.
    pub receiver: Option<Value>,
    /// Current function-call nesting.
    pub depth: usize,
    pub max_depth: usize,
    builtins: HashMap<String, BuiltinFn>,
    string_module: Module,
    loader: Option<ModuleLoader>,
    modules: HashMap<String, Module>,
    /// Paths whose import is in progress, outermost first.
    importing: Vec<String>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .field("output_len", &self.output.len())
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new() -> Self {
        let mut ctx = Context {
            scope: Scope::new(),
            output: String::new(),
            aliases: AliasRegistry::new(),
            opts: Opts::default(),
            receiver: None,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            builtins: builtins::GLOBALS
                .iter()
                .map(|(name, f)| (name.to_string(), *f))
                .collect(),
            string_module: Module::builtin("str", builtins::STRING_METHODS),
            loader: None,
            modules: HashMap::new(),
            importing: Vec::new(),
        };
        ctx.bind_builtin_modules();
        ctx
    }

    /// Reset all per-run state.  Builtins, the loader and the depth limit
    /// survive.
    pub fn clear(&mut self) {
        self.scope.clear();
        self.output.clear();
        self.aliases.clear();
        self.opts = Opts::default();
        self.receiver = None;
        self.depth = 0;
        self.modules.clear();
        self.importing.clear();
        self.bind_builtin_modules();
    }

    fn bind_builtin_modules(&mut self) {
        self.scope
            .bind("opts", Value::Module(Module::builtin("opts", builtins::OPTS)));
        self.scope
            .bind("alias", Value::Module(Module::builtin("alias", builtins::ALIAS)));
    }

    /// A fresh context for compiling the module at `path`, inheriting this
    /// context's configuration and import chain.
    pub fn sandbox(&self, path: &str) -> Context {
        let mut ctx = Context::new();
        ctx.max_depth = self.max_depth;
        ctx.builtins = self.builtins.clone();
        ctx.loader = self.loader.clone();
        ctx.opts = self.opts.clone();
        ctx.importing = self.importing.clone();
        ctx.importing.push(path.to_owned());
        ctx
    }

    /// Append text to the output buffer.
    pub fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Register (or replace) a global builtin function.
    pub fn register(&mut self, name: &str, f: BuiltinFn) {
        self.builtins.insert(name.to_owned(), f);
    }

    pub fn builtin(&self, name: &str) -> Option<BuiltinFn> {
        self.builtins.get(name).copied()
    }

    pub fn string_method(&self, name: &str) -> Option<BuiltinFn> {
        self.string_module.builtin_fn(name)
    }

    pub fn set_loader(&mut self, loader: Option<ModuleLoader>) {
        self.loader = loader;
    }

    pub fn loader(&self) -> Option<&ModuleLoader> {
        self.loader.as_ref()
    }

    pub fn cached_module(&self, path: &str) -> Option<Module> {
        self.modules.get(path).cloned()
    }

    pub fn cache_module(&mut self, path: &str, module: Module) {
        self.modules.insert(path.to_owned(), module);
    }

    pub fn is_importing(&self, path: &str) -> bool {
        self.importing.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_has_builtin_modules() {
        let ctx = Context::new();
        assert!(matches!(ctx.scope.get("opts"), Some(Value::Module(m)) if m.name() == "opts"));
        assert!(matches!(ctx.scope.get("alias"), Some(Value::Module(_))));
        assert!(ctx.builtin("puts").is_some());
        assert!(ctx.string_method("snake").is_some());
        assert_eq!(ctx.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn clear_resets_run_state() {
        let mut ctx = Context::new();
        ctx.scope.bind("x", Value::Int(1));
        ctx.write("out");
        ctx.aliases.set("k", "v", None);
        ctx.depth = 3;
        ctx.max_depth = 10;
        ctx.clear();
        assert!(ctx.scope.get("x").is_none());
        assert!(ctx.scope.get("opts").is_some());
        assert!(ctx.output.is_empty());
        assert!(ctx.aliases.is_empty());
        assert_eq!(ctx.depth, 0);
        assert_eq!(ctx.max_depth, 10);
    }

    #[test]
    fn sandbox_inherits_import_chain() {
        let mut ctx = Context::new();
        ctx.max_depth = 5;
        let sb = ctx.sandbox("a.b");
        assert!(sb.is_importing("a.b"));
        assert!(!ctx.is_importing("a.b"));
        assert_eq!(sb.max_depth, 5);
        let inner = sb.sandbox("c");
        assert!(inner.is_importing("a.b") && inner.is_importing("c"));
    }
}
