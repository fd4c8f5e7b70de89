//! Protocol-level replies.
//!
//! A [`Reply`] is the in-memory outcome of one request. It is a JSON object
//! so directive handlers and backend collaborators can fill arbitrary fields;
//! the constructors here cover the shapes the kernel itself produces.

use serde::Serialize;
use serde_json::{Map, Value};

/// Outcome status carried in the `status` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Error => "error",
        }
    }
}

/// The structured outcome of one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Reply(Map<String, Value>);

impl Reply {
    /// An empty reply (no status, no fields)
    pub fn new() -> Self {
        Reply(Map::new())
    }

    /// A reply carrying only `status: "ok"`
    pub fn ok() -> Self {
        let mut reply = Reply::new();
        reply.set_status(Status::Ok);
        reply
    }

    /// An error reply with name, value and traceback
    pub fn error(ename: impl Into<String>, evalue: impl Into<String>, traceback: Vec<String>) -> Self {
        let mut reply = Reply::new();
        reply.set_status(Status::Error);
        reply.set("ename", ename.into());
        reply.set("evalue", evalue.into());
        reply.set("traceback", traceback);
        reply
    }

    /// A completion reply: matches plus the replaced cursor range
    pub fn complete(matches: Vec<String>, cursor_start: usize, cursor_end: usize) -> Self {
        let mut reply = Reply::new();
        reply.set("matches", matches);
        reply.set("cursor_start", cursor_start);
        reply.set("cursor_end", cursor_end);
        reply.set("metadata", Map::new());
        reply.set_status(Status::Ok);
        reply
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn set_status(&mut self, status: Status) {
        self.set("status", status.as_str());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String field accessor (None when absent or not a string)
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn status(&self) -> Option<Status> {
        match self.get_str("status")? {
            "ok" => Some(Status::Ok),
            "error" => Some(Status::Error),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some(Status::Ok)
    }

    pub fn is_error(&self) -> bool {
        self.status() == Some(Status::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Reply {
    fn from(fields: Map<String, Value>) -> Self {
        Reply(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_reply_shape() {
        let reply = Reply::error("CompilationError", "block 0 did not compile", vec!["x".into()]);
        assert_eq!(
            reply.into_value(),
            json!({
                "status": "error",
                "ename": "CompilationError",
                "evalue": "block 0 did not compile",
                "traceback": ["x"],
            })
        );
    }

    #[test]
    fn complete_reply_shape() {
        let reply = Reply::complete(vec!["foo".into()], 3, 5);
        assert!(reply.is_ok());
        assert_eq!(reply.get("cursor_start"), Some(&json!(3)));
        assert_eq!(reply.get("cursor_end"), Some(&json!(5)));
        assert_eq!(reply.get("metadata"), Some(&json!({})));
    }

    #[test]
    fn unknown_status_is_none() {
        let mut reply = Reply::new();
        assert_eq!(reply.status(), None);
        reply.set("status", "aborted");
        assert_eq!(reply.status(), None);
        assert!(!reply.is_ok() && !reply.is_error());
    }
}
