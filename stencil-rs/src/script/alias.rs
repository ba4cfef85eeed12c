//! Alias registry backing the `alias` module.
//!
//! Templates record `key → value` pairs (with an optional description) via
//! `alias.set`; the host reads them back after compilation.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub value: String,
    pub desc: Option<String>,
}

/// Recorded aliases in first-recorded order.  Re-recording a key overwrites
/// its value and description but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasRegistry {
    entries: IndexMap<String, Alias>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, desc: Option<String>) {
        self.entries.insert(
            key.into(),
            Alias {
                value: value.into(),
                desc,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&Alias> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Alias)> {
        self.entries.iter().map(|(k, a)| (k.as_str(), a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Move every entry of `other` into `self`.
    pub fn absorb(&mut self, other: &mut AliasRegistry) {
        for (key, alias) in other.entries.drain(..) {
            self.entries.insert(key, alias);
        }
    }

    /// Shell-style listing: `alias key='value'`, one per line, with
    /// ` # desc` appended when a description was given.
    pub fn to_shell(&self) -> String {
        let mut out = String::new();
        for (key, alias) in &self.entries {
            out.push_str(&format!("alias {key}='{}'", alias.value.replace('\'', "'\\''")));
            if let Some(desc) = &alias.desc {
                out.push_str(&format!(" # {desc}"));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_in_place() {
        let mut reg = AliasRegistry::new();
        reg.set("ll", "ls -l", None);
        reg.set("gs", "git status", Some("status".into()));
        reg.set("ll", "ls -la", None);
        let keys: Vec<&str> = reg.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ll", "gs"]);
        assert_eq!(reg.get("ll").map(|a| a.value.as_str()), Some("ls -la"));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn shell_listing() {
        let mut reg = AliasRegistry::new();
        reg.set("gs", "git status", Some("show status".into()));
        reg.set("q", "echo 'hi'", None);
        assert_eq!(
            reg.to_shell(),
            "alias gs='git status' # show status\nalias q='echo '\\''hi'\\'''\n"
        );
    }

    #[test]
    fn absorb_drains_other() {
        let mut a = AliasRegistry::new();
        let mut b = AliasRegistry::new();
        b.set("k", "v", None);
        a.absorb(&mut b);
        assert!(b.is_empty());
        assert_eq!(a.len(), 1);
    }
}
