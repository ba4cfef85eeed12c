//! stencil: a template language mixing literal text with `{@ … @}` code
//! blocks and `{: … :}` reference blocks.
//!
//! ```rust
//! let out = stencil::compile("Hello, {: \"world\".capitalize() :}!", None, &[]).unwrap();
//! assert_eq!(out.output, "Hello, World!");
//! ```

pub mod cli;
pub mod config;
pub mod logger;
pub mod script;

pub use config::{Config, ConfigError};
pub use script::{
    compile, AliasRegistry, Compiler, Error, ErrorKind, Errors, ModuleLoader, Rendered, Value,
};
