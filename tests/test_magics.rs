//! Integration tests for the built-in magics

#[path = "common/mod.rs"]
mod common;
use common::{kernel, kernel_with, KernelConfig, ScriptedBackend, StreamName, Submission};

use std::fs;

use jitcell::{DirectiveContext, Magic, MagicError, MagicInvocation, Publisher};

#[test]
fn test_file_magic_writes_cell_body() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("point.hpp");
    let (mut kernel, publisher) = kernel(ScriptedBackend::new());

    let code = format!("%%file {}\nstruct point {{ int x, y; }};\n", path.display());
    let reply = kernel.execute(&code, 1);

    assert!(reply.is_ok());
    assert_eq!(fs::read_to_string(&path).unwrap(), "struct point { int x, y; };\n");
    assert_eq!(
        publisher.stream_text(StreamName::Stdout),
        format!("Writing {}\n", path.display())
    );
    assert!(kernel.backend().submitted().is_empty());
}

#[test]
fn test_file_magic_append() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "one\n").unwrap();
    let (mut kernel, publisher) = kernel(ScriptedBackend::new());

    let reply = kernel.execute(&format!("%%file --append {}\ntwo\n", path.display()), 1);
    assert!(reply.is_ok());
    assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    assert!(publisher
        .stream_text(StreamName::Stdout)
        .starts_with("Appending to "));
}

#[test]
fn test_file_magic_io_error_reply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing/dir/out.txt");
    let (mut kernel, _) = kernel(ScriptedBackend::new());

    let reply = kernel.execute(&format!("%%file {}\nx", path.display()), 1);
    assert!(reply.is_error());
    assert_eq!(reply.get_str("ename"), Some("OSError"));
}

#[test]
fn test_timeit_line_magic() {
    let (mut kernel, publisher) = kernel(ScriptedBackend::new());

    let reply = kernel.execute("%timeit -n 2 -r 2 ++counter;", 1);
    assert!(reply.is_ok());
    assert_eq!(kernel.backend().submitted().len(), 4);

    let text = publisher.stream_text(StreamName::Stdout);
    assert!(text.contains(" ± "));
    assert!(text.ends_with("per loop (mean ± std. dev. of 2 runs, 2 loops each)\n"));
}

#[test]
fn test_timeit_autorange_respects_configured_cap() {
    let mut config = KernelConfig::default();
    config.timeit.max_loops = 10;
    config.timeit.repeat = 1;
    let (mut kernel, publisher) = kernel_with(ScriptedBackend::new(), config);

    let reply = kernel.execute("%%timeit\nx += 1;", 1);
    assert!(reply.is_ok());
    // autorange: 1 + 10 loops, then one timed run of 10
    assert_eq!(kernel.backend().submitted().len(), 21);
    assert!(publisher
        .stream_text(StreamName::Stdout)
        .contains("1 run, 10 loops each"));
}

#[test]
fn test_timeit_failure_is_an_error_reply() {
    let backend = ScriptedBackend::new().with_outcome(Ok(Submission::failure()));
    let (mut kernel, publisher) = kernel(backend);

    let reply = kernel.execute("%timeit -n 5 undefined_name;", 1);
    assert!(reply.is_error());
    assert_eq!(reply.get_str("ename"), Some("ExecutionError"));
    assert!(publisher.events().is_empty());
}

#[test]
fn test_unknown_cell_magic() {
    let (mut kernel, _) = kernel(ScriptedBackend::new());
    let reply = kernel.execute("%%bash\necho hi", 1);
    assert_eq!(reply.get_str("ename"), Some("UsageError"));
    assert_eq!(reply.get_str("evalue"), Some("unknown cell magic: bash"));
}

fn submit_twice(
    invocation: &MagicInvocation<'_>,
    ctx: &mut DirectiveContext<'_>,
) -> Result<(), MagicError> {
    for _ in 0..2 {
        ctx.backend.submit(invocation.args)?;
    }
    ctx.publisher.publish_stream(StreamName::Stdout, "done\n");
    Ok(())
}

#[test]
fn test_registering_a_custom_magic() {
    let (mut kernel, publisher) = kernel(ScriptedBackend::new());
    kernel
        .preambles_mut()
        .magics_mut("magics")
        .unwrap()
        .register("twice", Magic::Custom(submit_twice))
        .unwrap();

    let reply = kernel.execute("%twice f();", 1);
    assert!(reply.is_ok());
    assert_eq!(kernel.backend().submitted(), &["f();".to_string(), "f();".to_string()]);
    assert_eq!(publisher.stream_text(StreamName::Stdout), "done\n");
}
