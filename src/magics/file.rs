//! `%%file [-a|--append] <path>`: write the cell body to a file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use super::{MagicError, MagicInvocation, MagicKind};
use crate::preamble::DirectiveContext;
use crate::publish::{Publisher, StreamName};

pub(super) fn run(invocation: &MagicInvocation<'_>, ctx: &mut DirectiveContext<'_>) -> Result<(), MagicError> {
    if invocation.kind == MagicKind::Line {
        return Err(MagicError::Usage("%%file is a cell magic; use %%file <path>".into()));
    }

    let mut append = false;
    let mut path = None;
    for arg in invocation.args.split_whitespace() {
        match arg {
            "-a" | "--append" => append = true,
            other if other.starts_with('-') => {
                return Err(MagicError::Usage(format!("%%file: unknown option {}", other)))
            }
            other if path.is_none() => path = Some(other),
            other => return Err(MagicError::Usage(format!("%%file: unexpected argument {}", other))),
        }
    }
    let path = path.ok_or_else(|| MagicError::Usage("%%file: missing file path".into()))?;

    let existed = Path::new(path).exists();
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    file.write_all(invocation.body.as_bytes())?;

    let message = if append {
        format!("Appending to {}\n", path)
    } else if existed {
        format!("Overwriting {}\n", path)
    } else {
        format!("Writing {}\n", path)
    };
    ctx.publisher.publish_stream(StreamName::Stdout, &message);
    Ok(())
}
