//! Code completion.
//!
//! The backend returns candidates annotated with signature markup such as
//! `[#int#]foo(<#int x#>, <#int #>)`. Four ordered rewrites reduce that to
//! `foo(int, int)`; each step is a separate pure transform so it can be
//! tested on its own, and all of them leave clean text untouched.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::backend::Backend;
use crate::reply::Reply;

/// Characters that end the token being completed. All ASCII.
pub const DELIMITERS: &str = " \t\n`!@#$^&*()=+[{]}\\|;:'\",<>?.";

static RESULT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[#.*#\]").expect("valid result type pattern"));
static PLACEHOLDER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"( |\*)+(\w+)(#>)").expect("valid placeholder name pattern"));
static PLACEHOLDER_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *(#>)").expect("valid placeholder space pattern"));
static PLACEHOLDER_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#([^#>]*)#>").expect("valid placeholder marker pattern"));

/// One step of candidate cleanup
pub type Rewrite = fn(&str) -> Cow<'_, str>;

/// Cleanup steps, in the order they must run
pub const REWRITES: [Rewrite; 4] = [
    strip_result_type,
    strip_placeholder_name,
    trim_placeholder_space,
    strip_placeholder_markers,
];

/// `[#int#]foo` -> `foo`
pub fn strip_result_type(candidate: &str) -> Cow<'_, str> {
    RESULT_TYPE.replace_all(candidate, "")
}

/// `<#int x#>` -> `<#int #>`, `<#char *s#>` -> `<#char *#>`
pub fn strip_placeholder_name(candidate: &str) -> Cow<'_, str> {
    PLACEHOLDER_NAME.replace_all(candidate, "${1}${3}")
}

/// `<#int   #>` -> `<#int#>`
pub fn trim_placeholder_space(candidate: &str) -> Cow<'_, str> {
    PLACEHOLDER_SPACE.replace_all(candidate, "${1}")
}

/// `<#int#>` -> `int`
pub fn strip_placeholder_markers(candidate: &str) -> Cow<'_, str> {
    PLACEHOLDER_MARKERS.replace_all(candidate, "${1}")
}

/// Run every rewrite over a raw candidate
pub fn clean_candidate(candidate: &str) -> String {
    REWRITES
        .iter()
        .fold(candidate.to_string(), |text, rewrite| rewrite(&text).into_owned())
}

/// Byte offset of the `cursor`-th character, clamped to the end of `code`.
///
/// Protocol cursors count Unicode scalar values, not bytes.
pub(crate) fn byte_offset(code: &str, cursor: usize) -> usize {
    code.char_indices()
        .nth(cursor)
        .map_or(code.len(), |(offset, _)| offset)
}

/// The token immediately before byte offset `cursor`
pub fn preceding_token(code: &str, cursor: usize) -> &str {
    let head = &code[..cursor];
    match head.rfind(|c: char| DELIMITERS.contains(c)) {
        Some(position) => &head[position + 1..],
        None => head,
    }
}

/// Answer a completion request at character offset `cursor`
pub fn complete(backend: &mut dyn Backend, code: &str, cursor: usize) -> Reply {
    let cursor_byte = byte_offset(code, cursor);
    let cursor = code[..cursor_byte].chars().count();
    let token = preceding_token(code, cursor_byte);

    let matches = backend
        .code_complete(code, cursor_byte)
        .iter()
        .map(|candidate| clean_candidate(candidate))
        .collect();

    Reply::complete(matches, cursor - token.chars().count(), cursor)
}
