//! The stencil template language.
//!
//! A template is literal text mixed with two kinds of embedded blocks:
//!
//! - `{@ … @}` code blocks: statements, function definitions and formulas
//!   whose values are discarded.  A code block may close early with `@}`
//!   and reopen with `{@` to emit literal text inside a loop or branch.
//! - `{: … :}` ref blocks: a formula whose value is written to the output.
//!
//! Source is tokenized ([`lexer`]), parsed into an AST ([`parser`],
//! [`ast`]) and evaluated by a tree-walking [`Interpreter`] against a
//! [`Context`].  [`Compiler`] ties the stages together.
//!
//! # Quick start
//!
//! ```rust
//! use stencil::script::compile;
//!
//! let src = "{@ for i = 0; i < 3; i += 1: @}{: i :}{@ end @}";
//! assert_eq!(compile(src, None, &[]).unwrap().output, "012");
//! ```

pub mod alias;
pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod context;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod module;
pub mod opts;
pub mod parser;
pub mod scope;
pub mod value;

// Re-exports for convenience.
pub use alias::{Alias, AliasRegistry};
pub use compiler::{compile, Compiler, Rendered};
pub use context::{Context, ModuleLoader};
pub use error::{Error, ErrorKind, Errors};
pub use interp::Interpreter;
pub use value::Value;
