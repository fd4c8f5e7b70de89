//! Line and cell magics.
//!
//! A cell whose first non-blank characters are `%name` runs the line magic
//! `name` with the rest of the line as arguments. `%%name` runs a cell magic:
//! the first line carries the arguments and everything after it is the body.
//!
//! Magics are dispatched by name through the [`MagicsManager`], which is the
//! state of the `magics` preamble entry.

mod file;
mod timeit;

use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::multispace0,
    combinator::value,
    IResult,
};
use thiserror::Error;
use tracing::debug;

use crate::backend::BackendFault;
use crate::preamble::DirectiveContext;
use crate::reply::Reply;

pub use timeit::{format_duration, TimeitOptions};

#[derive(Error, Debug)]
pub enum MagicError {
    #[error("magic '{0}' is already registered")]
    Duplicate(String),
    #[error("unknown line magic: {0}")]
    UnknownLine(String),
    #[error("unknown cell magic: {0}")]
    UnknownCell(String),
    #[error("{0}")]
    Usage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Backend(#[from] BackendFault),
    #[error("{0}")]
    Failed(String),
}

impl MagicError {
    /// Name used as `ename` in the error reply
    pub fn ename(&self) -> &'static str {
        match self {
            MagicError::Duplicate(_)
            | MagicError::UnknownLine(_)
            | MagicError::UnknownCell(_)
            | MagicError::Usage(_) => "UsageError",
            MagicError::Io(_) => "OSError",
            MagicError::Backend(fault) => fault.kind(),
            MagicError::Failed(_) => "ExecutionError",
        }
    }

    pub fn to_reply(&self) -> Reply {
        Reply::error(self.ename(), self.to_string(), Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicKind {
    /// `%name args`
    Line,
    /// `%%name args` followed by a body
    Cell,
}

/// A parsed magic invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicInvocation<'a> {
    pub kind: MagicKind,
    pub name: &'a str,
    pub args: &'a str,
    pub body: &'a str,
}

pub type MagicFn = fn(&MagicInvocation<'_>, &mut DirectiveContext<'_>) -> Result<(), MagicError>;

/// A registered magic
#[derive(Clone, Copy)]
pub enum Magic {
    /// `%%file [-a] path`
    File,
    /// `%timeit` / `%%timeit`
    Timeit,
    Custom(MagicFn),
}

impl Magic {
    fn run(&self, invocation: &MagicInvocation<'_>, ctx: &mut DirectiveContext<'_>) -> Result<(), MagicError> {
        match self {
            Magic::File => file::run(invocation, ctx),
            Magic::Timeit => timeit::run(invocation, ctx),
            Magic::Custom(magic) => magic(invocation, ctx),
        }
    }
}

/// Parse `%name` or `%%name` at the start of the input
fn magic_header(input: &str) -> IResult<&str, (MagicKind, &str)> {
    let (input, _) = multispace0(input)?;
    let (input, kind) = alt((
        value(MagicKind::Cell, tag("%%")),
        value(MagicKind::Line, tag("%")),
    ))(input)?;
    let (input, name) = take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)?;
    Ok((input, (kind, name)))
}

/// Split a magic cell into kind, name, arguments and body
pub fn parse_magic(code: &str) -> Option<MagicInvocation<'_>> {
    let (rest, (kind, name)) = magic_header(code).ok()?;
    let (args, body) = rest.split_once('\n').unwrap_or((rest, ""));
    Some(MagicInvocation {
        kind,
        name,
        args: args.trim(),
        body,
    })
}

/// Magic name to handler table
#[derive(Default)]
pub struct MagicsManager {
    magics: HashMap<String, Magic>,
}

impl MagicsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, magic: Magic) -> Result<(), MagicError> {
        if self.magics.contains_key(name) {
            return Err(MagicError::Duplicate(name.to_string()));
        }
        self.magics.insert(name.to_string(), magic);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.magics.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.magics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_match(code: &str) -> bool {
        parse_magic(code).is_some()
    }

    pub fn apply(&self, code: &str, ctx: &mut DirectiveContext<'_>, reply: &mut Reply) {
        *reply = match self.run(code, ctx) {
            Ok(()) => Reply::ok(),
            Err(err) => {
                debug!(error = %err, "magic failed");
                err.to_reply()
            }
        };
    }

    fn run(&self, code: &str, ctx: &mut DirectiveContext<'_>) -> Result<(), MagicError> {
        let invocation =
            parse_magic(code).ok_or_else(|| MagicError::Usage("not a magic invocation".into()))?;

        let magic = self.magics.get(invocation.name).ok_or_else(|| match invocation.kind {
            MagicKind::Line => MagicError::UnknownLine(invocation.name.to_string()),
            MagicKind::Cell => MagicError::UnknownCell(invocation.name.to_string()),
        })?;

        if invocation.kind == MagicKind::Line && !invocation.body.trim().is_empty() {
            return Err(MagicError::Usage(format!(
                "line magic %{0} must be alone in its cell; use %%{0} for a cell magic",
                invocation.name
            )));
        }

        debug!(magic = invocation.name, kind = ?invocation.kind, "running magic");
        magic.run(&invocation, ctx)
    }
}
