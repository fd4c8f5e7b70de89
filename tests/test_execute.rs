//! Integration tests for the execute pipeline

#[path = "common/mod.rs"]
mod common;
use common::{kernel, BackendFault, PublishEvent, ScriptedBackend, StreamName, Submission};

use jitcell::{Directive, DirectiveContext, Preamble, Publisher, Reply};

#[test]
fn test_empty_code_is_ok_without_output() {
    let (mut kernel, publisher) = kernel(ScriptedBackend::new());
    let reply = kernel.execute("", 1);
    assert!(reply.is_ok());
    assert!(kernel.backend().submitted().is_empty());
    assert!(publisher.events().is_empty());
}

#[test]
fn test_blocks_are_split_around_includes() {
    let (mut kernel, _) = kernel(ScriptedBackend::new());
    kernel.execute("#include <iostream>\nint x = 1;\nx", 1);
    assert_eq!(
        kernel.backend().submitted(),
        &["#include <iostream>\n".to_string(), "int x = 1;\nx".to_string()]
    );
}

#[test]
fn test_value_of_final_block_is_published_with_counter() {
    let backend = ScriptedBackend::new()
        .with_outcome(Ok(Submission::success()))
        .with_outcome(Ok(Submission::with_value("3.14")));
    let (mut kernel, publisher) = kernel(backend);

    let reply = kernel.execute("#include <cmath>\nM_PI", 12);
    assert!(reply.is_ok());
    assert_eq!(
        publisher.events(),
        vec![PublishEvent::execute_result(12, "3.14")]
    );
}

#[test]
fn test_terminated_final_block_publishes_nothing() {
    let backend = ScriptedBackend::new().with_outcome(Ok(Submission::with_value(7)));
    let (mut kernel, publisher) = kernel(backend);

    assert!(kernel.execute("int seven = 7;  \n", 1).is_ok());
    assert!(publisher.execute_results().is_empty());
}

#[test]
fn test_only_the_final_block_value_counts() {
    let backend = ScriptedBackend::new()
        .with_outcome(Ok(Submission::with_value(1)))
        .with_outcome(Ok(Submission::success()));
    let (mut kernel, publisher) = kernel(backend);

    assert!(kernel.execute("x\n#include <vector>", 1).is_ok());
    assert!(publisher.execute_results().is_empty());
}

#[test]
fn test_compilation_failure_stops_without_cancelling() {
    let backend = ScriptedBackend::new().with_outcome(Ok(Submission::failure()));
    let (mut kernel, publisher) = kernel(backend);

    let reply = kernel.execute("int x = ;\n#include <vector>", 1);
    assert!(reply.is_error());
    assert_eq!(reply.get_str("ename"), Some("CompilationError"));
    assert_eq!(reply.get_str("evalue"), Some("block 0 failed to compile"));
    assert_eq!(
        reply.get("traceback"),
        Some(&serde_json::json!(["CompilationError: block 0 failed to compile"]))
    );
    assert_eq!(kernel.backend().submitted().len(), 1);
    assert_eq!(kernel.backend().cancellations(), 0);
    assert!(publisher.events().is_empty());
}

#[test]
fn test_incomplete_input_is_an_error() {
    let backend = ScriptedBackend::new().with_outcome(Ok(Submission::incomplete()));
    let (mut kernel, _) = kernel(backend);

    let reply = kernel.execute("void f() {", 1);
    assert_eq!(reply.get_str("ename"), Some("IncompleteInput"));
}

#[test]
fn test_error_level_cancels_continuation_and_skips_rest() {
    let backend = ScriptedBackend::new()
        .with_outcome(Ok(Submission::success()))
        .with_outcome(Ok(Submission::with_error_level(1)));
    let (mut kernel, _) = kernel(backend);

    let reply = kernel.execute("int a = 1;\n#include <x>\nint b = 2;", 1);
    assert_eq!(reply.get_str("ename"), Some("ExecutionError"));
    assert_eq!(reply.get_str("evalue"), Some("block 1 exited with error level 1"));
    assert_eq!(kernel.backend().submitted().len(), 2);
    assert_eq!(kernel.backend().cancellations(), 1);
}

#[test]
fn test_fault_is_logged_and_execution_continues() {
    let backend = ScriptedBackend::new()
        .with_outcome(Err(BackendFault::interpreter("null dereference")))
        .with_outcome(Ok(Submission::success()))
        .with_outcome(Ok(Submission::with_value(5)));
    let (mut kernel, publisher) = kernel(backend);

    let reply = kernel.execute("*p;\n#include <x>\nfive", 2);
    assert!(reply.is_ok());
    assert_eq!(kernel.backend().submitted().len(), 3);
    assert_eq!(publisher.execute_results(), vec![(2, "5".to_string())]);
}

#[test]
fn test_fault_in_final_block_publishes_nothing() {
    let backend = ScriptedBackend::new().with_outcome(Err(BackendFault::Unknown));
    let (mut kernel, publisher) = kernel(backend);

    assert!(kernel.execute("x", 1).is_ok());
    assert!(publisher.events().is_empty());
}

#[test]
fn test_introspection_never_reaches_submit() {
    let backend = ScriptedBackend::new().with_description("std::vector", "class template");
    let (mut kernel, _) = kernel(backend);

    let reply = kernel.execute("?std::vector", 1);
    assert!(reply.is_ok());
    assert_eq!(reply.get("found"), Some(&serde_json::json!(true)));
    assert_eq!(kernel.backend().described(), &["std::vector".to_string()]);
    assert!(kernel.backend().submitted().is_empty());
}

#[test]
fn test_bare_question_mark_is_a_usage_error() {
    let (mut kernel, _) = kernel(ScriptedBackend::new());
    let reply = kernel.execute("  ?  ", 1);
    assert_eq!(reply.get_str("ename"), Some("UsageError"));
    assert!(kernel.backend().described().is_empty());
}

fn starts_with_percent(code: &str) -> bool {
    code.trim_start().starts_with('%')
}

fn claim(code: &str, ctx: &mut DirectiveContext<'_>, reply: &mut Reply) {
    ctx.publisher.publish(PublishEvent::stream(StreamName::Stdout, code));
    *reply = Reply::ok();
    reply.set("claimed", true);
}

#[test]
fn test_custom_preamble_runs_after_builtins() {
    let (mut kernel, publisher) = kernel(ScriptedBackend::new());
    kernel
        .preambles_mut()
        .register("percent", Preamble::Custom(Directive::new(starts_with_percent, claim)))
        .unwrap();

    // The built-in magics entry is earlier in the registry, so it answers.
    let reply = kernel.execute("%nosuchmagic", 1);
    assert_eq!(reply.get_str("ename"), Some("UsageError"));
    assert!(reply.get("claimed").is_none());
    assert!(publisher.events().is_empty());
}

fn starts_with_at(code: &str) -> bool {
    code.starts_with('@')
}

#[test]
fn test_custom_preamble_short_circuits_backend() {
    let (mut kernel, publisher) = kernel(ScriptedBackend::new());
    kernel
        .preambles_mut()
        .register("at", Preamble::Custom(Directive::new(starts_with_at, claim)))
        .unwrap();

    let reply = kernel.execute("@reload", 1);
    assert_eq!(reply.get("claimed"), Some(&serde_json::json!(true)));
    assert!(kernel.backend().submitted().is_empty());
    assert_eq!(publisher.stream_text(StreamName::Stdout), "@reload");
}

#[test]
fn test_duplicate_builtin_name_is_rejected() {
    let (mut kernel, _) = kernel(ScriptedBackend::new());
    let err = kernel
        .preambles_mut()
        .register("shell", Preamble::Shell)
        .unwrap_err();
    assert_eq!(err.to_string(), "preamble 'shell' is already registered");
}
