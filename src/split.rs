//! Include-aware splitting of a cell into execution blocks.
//!
//! Preprocessor inclusions must reach the backend as self-contained
//! compilation units, so runs of `#include` lines and runs of other code are
//! split into alternating blocks. Order is preserved and empty lines are
//! dropped.

use nom::{
    bytes::complete::tag,
    character::complete::{char, space0},
    sequence::tuple,
    IResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Include,
    Code,
}

impl LineKind {
    fn of(line: &str) -> Self {
        if is_include(line) {
            LineKind::Include
        } else {
            LineKind::Code
        }
    }
}

/// Parse the start of an inclusion directive: `#include`, `# include`
fn include_directive(input: &str) -> IResult<&str, &str> {
    let (input, (_, _, _, keyword)) = tuple((space0, char('#'), space0, tag("include")))(input)?;
    Ok((input, keyword))
}

/// Whether a line is a preprocessor inclusion
pub fn is_include(line: &str) -> bool {
    include_directive(line).is_ok()
}

/// Split `code` into the ordered blocks the backend processes one by one
pub fn split_blocks(code: &str) -> Vec<String> {
    let lines: Vec<&str> = code.split('\n').collect();
    let last = lines.len().saturating_sub(1);

    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut current_kind = None;

    for (index, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }

        let kind = LineKind::of(line);
        if current_kind != Some(kind) && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current_kind = Some(kind);

        current.push_str(line);
        if index != last {
            current.push('\n');
        }
    }

    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Whether a block is a statement whose value should not be displayed
pub fn ends_with_terminator(block: &str) -> bool {
    block.trim_end().ends_with(';')
}
