//! Module values.
//!
//! A module is either a builtin table (`opts`, `alias`, the string methods)
//! or an imported template compiled into its own sandbox [`Context`].  Both
//! are shared handles: copying a module value never copies the sandbox.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::builtins::BuiltinFn;
use super::context::Context;
use super::value::Value;

struct ModuleData {
    name: String,
    builtins: &'static [(&'static str, BuiltinFn)],
    sandbox: Option<RefCell<Context>>,
}

#[derive(Clone)]
pub struct Module(Rc<ModuleData>);

impl Module {
    /// A module backed only by builtin functions.
    pub fn builtin(name: &str, builtins: &'static [(&'static str, BuiltinFn)]) -> Self {
        Module(Rc::new(ModuleData {
            name: name.to_owned(),
            builtins,
            sandbox: None,
        }))
    }

    /// A module compiled from template source; `sandbox` holds its globals.
    pub fn template(name: &str, sandbox: Context) -> Self {
        Module(Rc::new(ModuleData {
            name: name.to_owned(),
            builtins: &[],
            sandbox: Some(RefCell::new(sandbox)),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn builtin_fn(&self, name: &str) -> Option<BuiltinFn> {
        self.0
            .builtins
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    }

    pub fn sandbox(&self) -> Option<&RefCell<Context>> {
        self.0.sandbox.as_ref()
    }

    /// Copy of a sandbox global.  Functions come back owned by this module so
    /// calling them runs inside the sandbox.
    pub fn global(&self, name: &str) -> Option<Value> {
        let sandbox = self.sandbox()?.try_borrow().ok()?;
        let value = sandbox.scope.get(name)?.clone();
        Some(match value {
            Value::Func(mut func) if func.owner.is_none() => {
                func.owner = Some(self.clone());
                Value::Func(func)
            }
            other => other,
        })
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({})", self.0.name)
    }
}
