//! Contract for the compiled-language execution backend.
//!
//! The backend compiles and runs source fragments; the kernel only drives
//! it. Faults raised while submitting a block are classified into the three
//! kinds of [`BackendFault`] because each is logged differently.

use std::fmt;

use thiserror::Error;
use tracing::{debug, error};

use crate::reply::Reply;

/// How the backend judged a submitted fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationResult {
    Success,
    Failure,
    /// The fragment is an unfinished multi-line construct
    MoreInputExpected,
}

/// A value computed by the backend that can be rendered for display
pub trait RenderValue {
    fn render(&self) -> String;
}

impl<T: fmt::Display> RenderValue for T {
    fn render(&self) -> String {
        self.to_string()
    }
}

/// Signals returned by the backend for one submitted block
pub struct Submission {
    pub error_level: i32,
    pub result: CompilationResult,
    pub value: Option<Box<dyn RenderValue>>,
}

impl Submission {
    pub fn success() -> Self {
        Submission {
            error_level: 0,
            result: CompilationResult::Success,
            value: None,
        }
    }

    pub fn with_value(value: impl RenderValue + 'static) -> Self {
        Submission {
            value: Some(Box::new(value)),
            ..Submission::success()
        }
    }

    pub fn failure() -> Self {
        Submission {
            result: CompilationResult::Failure,
            ..Submission::success()
        }
    }

    pub fn incomplete() -> Self {
        Submission {
            result: CompilationResult::MoreInputExpected,
            ..Submission::success()
        }
    }

    pub fn with_error_level(error_level: i32) -> Self {
        Submission {
            error_level,
            ..Submission::success()
        }
    }

    /// Whether these signals end the current execution
    pub fn is_fatal(&self) -> bool {
        self.error_level != 0 || self.result != CompilationResult::Success
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("error_level", &self.error_level)
            .field("result", &self.result)
            .field("value", &self.value.as_ref().map(|v| v.render()))
            .finish()
    }
}

/// A fault raised by the backend while processing a block
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendFault {
    /// The backend's own exception type. `diagnosed` is true when the
    /// backend already reported it to the user.
    #[error("{message}")]
    Interpreter { message: String, diagnosed: bool },
    #[error("{0}")]
    Generic(String),
    #[error("unknown fault")]
    Unknown,
}

impl BackendFault {
    pub fn interpreter(message: impl Into<String>) -> Self {
        BackendFault::Interpreter {
            message: message.into(),
            diagnosed: false,
        }
    }

    pub fn diagnosed(message: impl Into<String>) -> Self {
        BackendFault::Interpreter {
            message: message.into(),
            diagnosed: true,
        }
    }

    /// Short classification name, used as `ename` when a magic fails on this fault
    pub fn kind(&self) -> &'static str {
        match self {
            BackendFault::Interpreter { .. } => "InterpreterException",
            BackendFault::Generic(_) => "Exception",
            BackendFault::Unknown => "UnknownFault",
        }
    }

    /// Log the fault on the error channel, unless the backend already did
    pub fn report(&self) {
        match self {
            BackendFault::Interpreter {
                message,
                diagnosed: true,
            } => debug!(%message, "interpreter exception already diagnosed"),
            BackendFault::Interpreter { message, .. } => {
                error!("caught an interpreter exception: {}", message)
            }
            BackendFault::Generic(message) => error!("caught an exception: {}", message),
            BackendFault::Unknown => error!("exception occurred, recovering"),
        }
    }
}

/// The execution backend the kernel drives.
///
/// All calls block until the backend is done; the kernel imposes no timeout.
pub trait Backend {
    /// Compile and run one block
    fn submit(&mut self, block: &str) -> Result<Submission, BackendFault>;

    /// Drop any pending multi-line continuation state
    fn cancel_continuation(&mut self);

    /// Raw completion candidates at byte offset `cursor`, with signature markup
    fn code_complete(&mut self, code: &str, cursor: usize) -> Vec<String>;

    /// Fill `reply` with a description of `expression`
    fn describe(&mut self, expression: &str, reply: &mut Reply);

    /// Language version reported in kernel info, when the backend knows it
    fn language_version(&self) -> Option<String> {
        None
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn submit(&mut self, block: &str) -> Result<Submission, BackendFault> {
        (**self).submit(block)
    }

    fn cancel_continuation(&mut self) {
        (**self).cancel_continuation();
    }

    fn code_complete(&mut self, code: &str, cursor: usize) -> Vec<String> {
        (**self).code_complete(code, cursor)
    }

    fn describe(&mut self, expression: &str, reply: &mut Reply) {
        (**self).describe(expression, reply);
    }

    fn language_version(&self) -> Option<String> {
        (**self).language_version()
    }
}
