//! Variable scope chain.

use std::collections::HashMap;

use super::value::Value;

/// One frame of name → value bindings.
#[derive(Debug, Default)]
struct Frame {
    vars: HashMap<String, Value>,
}

/// A stack of frames; frame 0 is the global frame and is never popped.
/// Lookups walk from the innermost frame outward.
#[derive(Debug)]
pub struct Scope {
    frames: Vec<Frame>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Scope {
            frames: vec![Frame::default()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pop the innermost frame.  The global frame stays.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.vars.get(name))
    }

    /// Live reference to the innermost binding of `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|f| f.vars.get_mut(name))
    }

    /// Bind `name` in the innermost frame.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.into(), value);
        }
    }

    /// Drop every frame and start over with an empty global frame.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.frames.push(Frame::default());
    }
}
