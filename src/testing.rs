//! Test doubles for the kernel's collaborators.
//!
//! [`ScriptedBackend`] replays queued outcomes and records what it was
//! asked to do; [`RecordingPublisher`] keeps every published event.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use serde_json::{json, Map};

use crate::backend::{Backend, BackendFault, Submission};
use crate::publish::{PublishEvent, Publisher, StreamName};
use crate::reply::{Reply, Status};

/// A backend that replays queued outcomes.
///
/// Once the queue is empty every submission succeeds without a value.
#[derive(Default)]
pub struct ScriptedBackend {
    outcomes: VecDeque<Result<Submission, BackendFault>>,
    submitted: Vec<String>,
    cancellations: usize,
    completions: Vec<String>,
    completion_requests: Vec<(String, usize)>,
    descriptions: HashMap<String, String>,
    described: Vec<String>,
    version: Option<String>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unanswered submission
    pub fn push_outcome(&mut self, outcome: Result<Submission, BackendFault>) {
        self.outcomes.push_back(outcome);
    }

    pub fn with_outcome(mut self, outcome: Result<Submission, BackendFault>) -> Self {
        self.push_outcome(outcome);
        self
    }

    /// Raw candidates returned by every completion request
    pub fn with_completions(mut self, candidates: &[&str]) -> Self {
        self.completions = candidates.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_description(mut self, expression: &str, text: &str) -> Self {
        self.descriptions
            .insert(expression.to_string(), text.to_string());
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Blocks submitted so far, in order
    pub fn submitted(&self) -> &[String] {
        &self.submitted
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations
    }

    /// `(code, byte cursor)` of each completion request
    pub fn completion_requests(&self) -> &[(String, usize)] {
        &self.completion_requests
    }

    /// Expressions passed to `describe`, in order
    pub fn described(&self) -> &[String] {
        &self.described
    }
}

impl Backend for ScriptedBackend {
    fn submit(&mut self, block: &str) -> Result<Submission, BackendFault> {
        self.submitted.push(block.to_string());
        self.outcomes
            .pop_front()
            .unwrap_or_else(|| Ok(Submission::success()))
    }

    fn cancel_continuation(&mut self) {
        self.cancellations += 1;
    }

    fn code_complete(&mut self, code: &str, cursor: usize) -> Vec<String> {
        self.completion_requests.push((code.to_string(), cursor));
        self.completions.clone()
    }

    /// Fills a protocol inspect reply: `found`, `data`, `metadata`, `status`
    fn describe(&mut self, expression: &str, reply: &mut Reply) {
        self.described.push(expression.to_string());
        match self.descriptions.get(expression) {
            Some(text) => {
                reply.set("found", true);
                reply.set("data", json!({ "text/plain": text }));
            }
            None => {
                reply.set("found", false);
                reply.set("data", Map::new());
            }
        }
        reply.set("metadata", Map::new());
        reply.set_status(Status::Ok);
    }

    fn language_version(&self) -> Option<String> {
        self.version.clone()
    }
}

/// A publisher that keeps every event
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PublishEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(execution_count, text/plain)` of every execute result
    pub fn execute_results(&self) -> Vec<(i64, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PublishEvent::ExecuteResult {
                    execution_count,
                    data,
                    ..
                } => {
                    let text = data.get("text/plain")?.as_str()?.to_string();
                    Some((execution_count, text))
                }
                PublishEvent::Stream { .. } => None,
            })
            .collect()
    }

    /// Concatenated text of every stream event on `name`
    pub fn stream_text(&self, name: StreamName) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PublishEvent::Stream { name: n, text } if n == name => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, event: PublishEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
