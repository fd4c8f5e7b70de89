//! Inspection requests and the `?` introspection directive.

use std::sync::LazyLock;

use regex::Regex;

use crate::backend::Backend;
use crate::complete::byte_offset;
use crate::preamble::DirectiveContext;
use crate::reply::{Reply, Status};

/// A chain of identifier, scope (`::`), template (`<..>`), call (`(..)`)
/// and index (`[..]`) segments, each optionally followed by `.`, anchored
/// at the end of the text.
static TRAILING_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\w*(?:::|<.*>|\(.*\)|\[.*\])?\.?)*$").expect("valid trailing expression pattern")
});

/// The expression ending at byte offset `cursor`, if any
pub fn trailing_expression(code: &str, cursor: usize) -> Option<&str> {
    let head = &code[..cursor];
    TRAILING_EXPRESSION
        .find(head)
        .map(|found| found.as_str())
        .filter(|expression| !expression.is_empty())
}

/// Answer an inspection request at character offset `cursor`
pub fn inspect(backend: &mut dyn Backend, code: &str, cursor: usize) -> Reply {
    let mut reply = Reply::new();
    if let Some(expression) = trailing_expression(code, byte_offset(code, cursor)) {
        backend.describe(expression, &mut reply);
    }
    reply
}

/// `?expression` in an execute request
pub(crate) fn is_introspection(code: &str) -> bool {
    code.trim_start().starts_with('?')
}

pub(crate) fn apply_introspection(code: &str, ctx: &mut DirectiveContext<'_>, reply: &mut Reply) {
    let expression = code
        .trim()
        .strip_prefix('?')
        .map(str::trim)
        .unwrap_or_default();

    if expression.is_empty() {
        *reply = Reply::error("UsageError", "nothing to inspect after `?`", Vec::new());
        return;
    }

    ctx.backend.describe(expression, reply);
    if reply.status().is_none() {
        reply.set_status(Status::Ok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_end(code: &str) -> Option<&str> {
        trailing_expression(code, code.len())
    }

    #[test]
    fn scoped_template_chain() {
        assert_eq!(at_end("std::vector<int>::push_ba"), Some("std::vector<int>::push_ba"));
    }

    #[test]
    fn member_access_chain() {
        assert_eq!(at_end("auto n = v.size"), Some("v.size"));
        assert_eq!(at_end("obj.items[2].name"), Some("obj.items[2].name"));
    }

    #[test]
    fn call_segments() {
        assert_eq!(at_end("make_thing(1, 2).run"), Some("make_thing(1, 2).run"));
    }

    #[test]
    fn stops_at_whitespace() {
        assert_eq!(at_end("int x = foo"), Some("foo"));
    }

    #[test]
    fn nothing_at_cursor() {
        assert_eq!(at_end("foo "), None);
        assert_eq!(at_end(""), None);
    }

    #[test]
    fn cursor_limits_the_text() {
        assert_eq!(trailing_expression("foo.bar baz", 7), Some("foo.bar"));
    }

    #[test]
    fn introspection_prefix() {
        assert!(is_introspection("?std::vector"));
        assert!(is_introspection("  ? x"));
        assert!(!is_introspection("a ? b : c"));
    }
}
