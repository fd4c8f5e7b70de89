//! `!command`: run a line through the system shell.

use std::process::{Command, Stdio};

use serde_json::Value;
use tracing::{debug, error};

use crate::preamble::DirectiveContext;
use crate::publish::{Publisher, StreamName};
use crate::reply::Reply;

pub(crate) fn is_match(code: &str) -> bool {
    code.trim_start().starts_with('!')
}

pub(crate) fn apply(code: &str, ctx: &mut DirectiveContext<'_>, reply: &mut Reply) {
    let command = code.trim_start().strip_prefix('!').unwrap_or_default().trim();
    let shell = ctx.config.shell.as_str();
    debug!(shell, command, "running shell escape");

    let output = match Command::new(shell)
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            error!("failed to run {}: {}", shell, e);
            *reply = Reply::error("OSError", format!("failed to run {}: {}", shell, e), Vec::new());
            return;
        }
    };

    for (name, bytes) in [(StreamName::Stdout, &output.stdout), (StreamName::Stderr, &output.stderr)] {
        if !bytes.is_empty() {
            ctx.publisher.publish_stream(name, &String::from_utf8_lossy(bytes));
        }
    }

    *reply = Reply::ok();
    reply.set("exit_code", output.status.code().map_or(Value::Null, Value::from));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bang_prefix() {
        assert!(is_match("!ls -la"));
        assert!(is_match("  !echo hi"));
        assert!(!is_match("x != y"));
        assert!(!is_match("int a = !b;"));
    }
}
