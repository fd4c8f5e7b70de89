//! The request handler.
//!
//! [`Kernel`] owns the backend, the preamble registry and the output
//! capture, and answers one protocol request at a time.

use std::io::{self, Write};
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{Backend, CompilationResult, RenderValue};
use crate::capture::{CaptureError, StreamCapture};
use crate::complete;
use crate::config::{ConfigError, KernelConfig};
use crate::inspect;
use crate::magics::{Magic, MagicError};
use crate::preamble::{DirectiveContext, Preamble, PreambleError, PreambleRegistry};
use crate::publish::{PublishEvent, Publisher};
use crate::reply::Reply;
use crate::split::{ends_with_terminator, split_blocks};

/// Registry name of the `%` / `%%` entry
pub const MAGICS: &str = "magics";

/// Failure while assembling a kernel
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("preamble error: {0}")]
    Preamble(#[from] PreambleError),
    #[error("magic error: {0}")]
    Magic(#[from] MagicError),
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Answers protocol requests against one backend
pub struct Kernel<B: Backend> {
    backend: B,
    publisher: Arc<dyn Publisher>,
    preambles: PreambleRegistry,
    config: KernelConfig,
    capture: Option<StreamCapture>,
}

impl<B: Backend> Kernel<B> {
    /// Build a kernel with the built-in directives registered.
    ///
    /// Output capture is not installed here; see [`Kernel::install_capture`].
    pub fn new(backend: B, publisher: Arc<dyn Publisher>, config: KernelConfig) -> Result<Self, KernelError> {
        let mut preambles = PreambleRegistry::new();
        preambles.register("introspection", Preamble::Introspection)?;
        preambles.register(MAGICS, Preamble::Magics(Default::default()))?;
        preambles.register("shell", Preamble::Shell)?;

        let magics = preambles.magics_mut(MAGICS)?;
        magics.register("file", Magic::File)?;
        magics.register("timeit", Magic::Timeit)?;

        Ok(Kernel {
            backend,
            publisher,
            preambles,
            config,
            capture: None,
        })
    }

    pub fn preambles(&self) -> &PreambleRegistry {
        &self.preambles
    }

    /// Register further directives or magics here
    pub fn preambles_mut(&mut self) -> &mut PreambleRegistry {
        &mut self.preambles
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Submit the configured prelude blocks. Failures are logged, not returned.
    pub fn configure(&mut self) {
        for block in &self.config.prelude {
            let outcome = self.backend.submit(block);
            flush_output(self.capture.as_mut());
            match outcome {
                Ok(submission) if submission.is_fatal() => {
                    if submission.error_level != 0 {
                        self.backend.cancel_continuation();
                    }
                    warn!(block = %block.trim(), result = ?submission.result, "prelude block failed");
                }
                Ok(_) => debug!(block = %block.trim(), "prelude block submitted"),
                Err(fault) => fault.report(),
            }
        }
        info!(blocks = self.config.prelude.len(), "kernel configured");
    }

    /// Redirect this process's stdout and stderr to the publisher
    pub fn install_capture(&mut self) -> Result<(), CaptureError> {
        if !self.config.capture_output {
            debug!("output capture disabled by configuration");
            return Ok(());
        }
        if self.capture.is_some() {
            return Err(CaptureError::AlreadyInstalled);
        }
        self.capture = Some(StreamCapture::install(Arc::clone(&self.publisher))?);
        debug!("output capture installed");
        Ok(())
    }

    pub fn restore_capture(&mut self) -> Result<(), CaptureError> {
        match self.capture.take() {
            Some(mut capture) => {
                capture.restore()?;
                debug!("output capture restored");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.as_ref().is_some_and(StreamCapture::is_installed)
    }

    /// Run a cell.
    ///
    /// A matching directive answers on its own. Otherwise the code is split
    /// into blocks that are submitted in order, stopping at the first block
    /// whose signals report a failure.
    pub fn execute(&mut self, code: &str, execution_count: i64) -> Reply {
        let mut ctx = DirectiveContext {
            backend: &mut self.backend,
            publisher: &*self.publisher,
            config: &self.config,
        };
        if let Some(reply) = self.preambles.dispatch(code, &mut ctx) {
            flush_output(self.capture.as_mut());
            return reply;
        }

        let blocks = split_blocks(code);
        let mut value: Option<Box<dyn RenderValue>> = None;

        for (index, block) in blocks.iter().enumerate() {
            let outcome = self.backend.submit(block);
            if let Err(fault) = &outcome {
                fault.report();
            }
            // The block's output goes out ahead of its value or error reply.
            flush_output(self.capture.as_mut());

            let submission = match outcome {
                Ok(submission) => submission,
                Err(_) => {
                    value = None;
                    continue;
                }
            };

            if submission.error_level != 0 {
                self.backend.cancel_continuation();
                return block_error(
                    "ExecutionError",
                    format!("block {} exited with error level {}", index, submission.error_level),
                );
            }
            match submission.result {
                CompilationResult::Success => {}
                CompilationResult::Failure => {
                    return block_error("CompilationError", format!("block {} failed to compile", index));
                }
                CompilationResult::MoreInputExpected => {
                    return block_error("IncompleteInput", format!("block {} is incomplete", index));
                }
            }
            value = submission.value;
        }

        if let (Some(value), Some(last)) = (value, blocks.last()) {
            if !ends_with_terminator(last) {
                self.publisher
                    .publish(PublishEvent::execute_result(execution_count, value.render()));
            }
        }

        Reply::ok()
    }

    /// Completion candidates for the token before `cursor` (in characters)
    pub fn complete(&mut self, code: &str, cursor: usize) -> Reply {
        complete::complete(&mut self.backend, code, cursor)
    }

    /// Describe the expression ending at `cursor` (in characters)
    pub fn inspect(&mut self, code: &str, cursor: usize) -> Reply {
        inspect::inspect(&mut self.backend, code, cursor)
    }

    pub fn is_complete(&self, _code: &str) -> Reply {
        Reply::new()
    }

    pub fn history(&self) -> Reply {
        Reply::new()
    }

    pub fn kernel_info(&self) -> Reply {
        let language = &self.config.language;
        let version = self
            .backend
            .language_version()
            .unwrap_or_else(|| language.version.clone());

        let mut reply = Reply::new();
        reply.set("protocol_version", self.config.protocol_version.as_str());
        reply.set("implementation", self.config.implementation.as_str());
        reply.set("implementation_version", self.config.implementation_version.as_str());
        reply.set(
            "language_info",
            json!({
                "name": language.name,
                "version": version,
                "mimetype": language.mimetype,
                "codemirror_mode": language.codemirror_mode,
                "file_extension": language.file_extension,
            }),
        );
        reply
    }

    /// Stdin input is never requested, so replies are dropped
    pub fn input_reply(&mut self, value: &str) {
        debug!(len = value.len(), "ignoring input reply");
    }
}

impl<B: Backend> Drop for Kernel<B> {
    fn drop(&mut self) {
        if let Err(e) = self.restore_capture() {
            warn!("failed to restore output capture: {}", e);
        }
    }
}

/// Push buffered stdout into the descriptor and publish what capture holds
fn flush_output(capture: Option<&mut StreamCapture>) {
    let _ = io::stdout().flush();
    if let Some(capture) = capture {
        if let Err(e) = capture.flush() {
            debug!("failed to flush captured output: {}", e);
        }
    }
}

fn block_error(ename: &str, evalue: String) -> Reply {
    debug!(ename, %evalue, "execution failed");
    let traceback = vec![format!("{}: {}", ename, evalue)];
    Reply::error(ename, evalue, traceback)
}
