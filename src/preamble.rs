//! Directive interception ahead of the backend.
//!
//! Every execute request is first offered to the [`PreambleRegistry`]. The
//! entries are tried in registration order and the first one whose matcher
//! accepts the code produces the whole reply; the backend is never reached.
//!
//! Entries are a closed set of variants. Embedders add their own through
//! [`Directive`], a pair of plain function pointers.

use thiserror::Error;
use tracing::debug;

use crate::backend::Backend;
use crate::config::KernelConfig;
use crate::inspect;
use crate::magics::MagicsManager;
use crate::publish::Publisher;
use crate::reply::Reply;
use crate::shell;

#[derive(Error, Debug, PartialEq)]
pub enum PreambleError {
    #[error("preamble '{0}' is already registered")]
    Duplicate(String),
    #[error("no preamble named '{0}'")]
    NotFound(String),
    #[error("preamble '{name}' is not a {expected} preamble")]
    WrongKind { name: String, expected: &'static str },
}

/// What a directive may touch while it produces its reply
pub struct DirectiveContext<'a> {
    pub backend: &'a mut dyn Backend,
    pub publisher: &'a dyn Publisher,
    pub config: &'a KernelConfig,
}

pub type MatchFn = fn(&str) -> bool;
pub type ApplyFn = fn(&str, &mut DirectiveContext<'_>, &mut Reply);

/// A user-supplied preamble: a predicate and the action it guards
#[derive(Clone, Copy)]
pub struct Directive {
    matches: MatchFn,
    apply: ApplyFn,
}

impl Directive {
    pub fn new(matches: MatchFn, apply: ApplyFn) -> Self {
        Directive { matches, apply }
    }
}

/// One entry of the preamble registry
pub enum Preamble {
    /// `?expression`
    Introspection,
    /// `%magic` and `%%magic`
    Magics(MagicsManager),
    /// `!command`
    Shell,
    Custom(Directive),
}

impl Preamble {
    pub fn is_match(&self, code: &str) -> bool {
        match self {
            Preamble::Introspection => inspect::is_introspection(code),
            Preamble::Magics(_) => MagicsManager::is_match(code),
            Preamble::Shell => shell::is_match(code),
            Preamble::Custom(directive) => (directive.matches)(code),
        }
    }

    pub fn apply(&mut self, code: &str, ctx: &mut DirectiveContext<'_>, reply: &mut Reply) {
        match self {
            Preamble::Introspection => inspect::apply_introspection(code, ctx, reply),
            Preamble::Magics(magics) => magics.apply(code, ctx, reply),
            Preamble::Shell => shell::apply(code, ctx, reply),
            Preamble::Custom(directive) => (directive.apply)(code, ctx, reply),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Preamble::Introspection => "introspection",
            Preamble::Magics(_) => "magics",
            Preamble::Shell => "shell",
            Preamble::Custom(_) => "custom",
        }
    }

    pub fn as_magics_mut(&mut self) -> Option<&mut MagicsManager> {
        match self {
            Preamble::Magics(magics) => Some(magics),
            _ => None,
        }
    }
}

/// Named preambles, kept in registration order
#[derive(Default)]
pub struct PreambleRegistry {
    entries: Vec<(String, Preamble)>,
}

impl PreambleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; it is tried after every entry registered before it
    pub fn register(&mut self, name: &str, preamble: Preamble) -> Result<(), PreambleError> {
        if self.position(name).is_some() {
            return Err(PreambleError::Duplicate(name.to_string()));
        }
        self.entries.push((name.to_string(), preamble));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Preamble, PreambleError> {
        self.position(name)
            .map(|index| &self.entries[index].1)
            .ok_or_else(|| PreambleError::NotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Preamble, PreambleError> {
        match self.position(name) {
            Some(index) => Ok(&mut self.entries[index].1),
            None => Err(PreambleError::NotFound(name.to_string())),
        }
    }

    /// The magics entry registered under `name`
    pub fn magics_mut(&mut self, name: &str) -> Result<&mut MagicsManager, PreambleError> {
        self.get_mut(name)?
            .as_magics_mut()
            .ok_or_else(|| PreambleError::WrongKind {
                name: name.to_string(),
                expected: "magics",
            })
    }

    /// `(name, entry)` pairs in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Preamble)> {
        self.entries.iter().map(|(name, preamble)| (name.as_str(), preamble))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offer `code` to each entry in order; the first match produces the reply
    pub fn dispatch(&mut self, code: &str, ctx: &mut DirectiveContext<'_>) -> Option<Reply> {
        let (name, preamble) = self
            .entries
            .iter_mut()
            .find(|(_, preamble)| preamble.is_match(code))?;

        debug!(preamble = %name, "directive matched");
        let mut reply = Reply::new();
        preamble.apply(code, ctx, &mut reply);
        Some(reply)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| entry == name)
    }
}
