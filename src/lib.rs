//! jitcell - notebook kernel core for a JIT-compiled C++ backend
//!
//! # Overview
//!
//! jitcell answers notebook protocol requests on behalf of a backend that
//! compiles and runs C++ fragments. The backend itself is a collaborator
//! behind the [`Backend`] trait; this crate decides what happens to each
//! submission and turns the outcome into protocol replies and publish events.
//!
//! # Request flow
//!
//! ```text
//! execute(code)
//!   ├─ ?expr / %magic / !cmd   -> matching preamble entry answers
//!   └─ otherwise               -> split around #include lines
//!                                 submit each block in order
//!                                 stop at the first failing block
//!                                 publish the last value unless it ends with ';'
//! ```
//!
//! Output written by native code to stdout and stderr is redirected into
//! `stream` publish events while capture is installed.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use jitcell::testing::{RecordingPublisher, ScriptedBackend};
//! use jitcell::{Kernel, KernelConfig, Submission};
//!
//! let backend = ScriptedBackend::new().with_outcome(Ok(Submission::with_value(42)));
//! let publisher = Arc::new(RecordingPublisher::new());
//! let mut kernel = Kernel::new(backend, publisher.clone(), KernelConfig::default()).unwrap();
//!
//! assert!(kernel.execute("6 * 7", 1).is_ok());
//! assert_eq!(publisher.execute_results(), vec![(1, "42".to_string())]);
//! ```

pub mod backend;
pub mod capture;
pub mod complete;
pub mod config;
pub mod inspect;
pub mod kernel;
pub mod logging;
pub mod magics;
pub mod preamble;
pub mod publish;
pub mod reply;
mod shell;
pub mod split;
pub mod testing;

// Re-export commonly used items
pub use backend::{Backend, BackendFault, CompilationResult, RenderValue, Submission};
pub use capture::{CaptureError, StreamBuffer, StreamCapture};
pub use config::{ConfigError, KernelConfig, LanguageInfo, TimeitConfig};
pub use kernel::{Kernel, KernelError};
pub use magics::{Magic, MagicError, MagicInvocation, MagicKind, MagicsManager};
pub use preamble::{Directive, DirectiveContext, Preamble, PreambleError, PreambleRegistry};
pub use publish::{ChannelPublisher, PublishEvent, Publisher, StreamName};
pub use reply::{Reply, Status};
