//! Invocation arguments exposed to templates as the `opts` module.
//!
//! The argument vector is split into positional arguments and an option map:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `--name value` | option `name` = `value` |
//! | `-n` | option `n` = `""`; a following bare word stays positional |
//! | `--name` / `-n` with no value | option = `""` |
//! | anything else (including `-`) | positional |
//!
//! Element 0 (the program name) is always positional.

use indexmap::IndexMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opts {
    args: Vec<String>,
    options: IndexMap<String, String>,
}

enum Word<'a> {
    Long(&'a str),
    Short(&'a str),
    Bare(&'a str),
}

fn classify(word: &str) -> Word<'_> {
    if let Some(name) = word.strip_prefix("--").filter(|n| !n.is_empty()) {
        Word::Long(name)
    } else if let Some(name) = word.strip_prefix('-').filter(|n| !n.is_empty() && *n != "-") {
        Word::Short(name)
    } else {
        Word::Bare(word)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    AfterLong,
    AfterShort,
}

impl Opts {
    pub fn parse(argv: &[String]) -> Self {
        let mut opts = Opts::default();
        let Some((program, rest)) = argv.split_first() else {
            return opts;
        };
        opts.args.push(program.clone());

        let mut state = State::Normal;
        let mut pending = String::new();

        for word in rest {
            let class = classify(word);
            match (state, &class) {
                (State::AfterLong, Word::Bare(value)) => {
                    opts.options.insert(std::mem::take(&mut pending), (*value).to_owned());
                    state = State::Normal;
                    continue;
                }
                (State::AfterShort, Word::Bare(value)) => {
                    opts.options.insert(std::mem::take(&mut pending), String::new());
                    opts.args.push((*value).to_owned());
                    state = State::Normal;
                    continue;
                }
                (State::AfterLong | State::AfterShort, _) => {
                    opts.options.insert(std::mem::take(&mut pending), String::new());
                }
                (State::Normal, _) => {}
            }
            // Normal processing (possibly a re-processed flag).
            state = match class {
                Word::Long(name) => {
                    pending = name.to_owned();
                    State::AfterLong
                }
                Word::Short(name) => {
                    pending = name.to_owned();
                    State::AfterShort
                }
                Word::Bare(value) => {
                    opts.args.push(value.to_owned());
                    State::Normal
                }
            };
        }
        if state != State::Normal {
            opts.options.insert(pending, String::new());
        }
        opts
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    /// Positional argument `index`; 0 is the program name.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn long_with_value_and_short_flag() {
        let o = Opts::parse(&argv(&["prog", "--name", "value", "-x", "pos1"]));
        assert_eq!(o.args(), &argv(&["prog", "pos1"])[..]);
        assert_eq!(o.get("name"), Some("value"));
        assert_eq!(o.get("x"), Some(""));
        assert!(!o.has("pos1"));
    }

    #[test]
    fn long_followed_by_flag_gets_empty_value() {
        let o = Opts::parse(&argv(&["p", "--a", "--b", "v"]));
        assert_eq!(o.get("a"), Some(""));
        assert_eq!(o.get("b"), Some("v"));
        assert_eq!(o.args(), &argv(&["p"])[..]);
    }

    #[test]
    fn trailing_flags_are_finalized() {
        let o = Opts::parse(&argv(&["p", "-v"]));
        assert!(o.has("v"));
        let o = Opts::parse(&argv(&["p", "--verbose"]));
        assert_eq!(o.get("verbose"), Some(""));
    }

    #[test]
    fn lone_dash_is_positional() {
        let o = Opts::parse(&argv(&["p", "-", "--", "x"]));
        assert_eq!(o.args(), &argv(&["p", "-", "--", "x"])[..]);
        assert!(!o.has(""));
    }

    #[test]
    fn program_name_is_never_an_option() {
        let o = Opts::parse(&argv(&["--weird"]));
        assert_eq!(o.arg(0), Some("--weird"));
        assert!(!o.has("weird"));
    }

    #[test]
    fn empty_argv() {
        let o = Opts::parse(&[]);
        assert!(o.args().is_empty());
        assert_eq!(o.arg(0), None);
    }
}
