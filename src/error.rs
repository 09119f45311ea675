//! Error taxonomy for the preprocessor.
//!
//! Every error here is fatal for the whole generation run. Messages always
//! carry the offending source text (or the full macro invocation) so a
//! failure can be located without a debugger.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PreprocessError>;

/// How much of the remaining buffer is quoted in literal/region errors.
const EXCERPT_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("String did not end: {excerpt}")]
    UnterminatedString { excerpt: String },

    #[error("Regular expression did not end: {excerpt}")]
    UnterminatedRegex { excerpt: String },

    #[error("Template literal did not end: {excerpt}")]
    UnterminatedTemplate { excerpt: String },

    #[error("Block comment did not end: {excerpt}")]
    UnterminatedComment { excerpt: String },

    #[error("Source ended with {depth} unclosed bracket(s): {excerpt}")]
    UnterminatedRegion { depth: i32, excerpt: String },

    #[error("{reason}: {excerpt}")]
    UnsupportedRequire { reason: &'static str, excerpt: String },

    #[error("Could not find file {filename} in ${kind} call")]
    NativeFileNotFound { kind: String, filename: String },

    #[error("File {filename} in ${kind} call is ambiguous, it matches: {candidates:?}")]
    AmbiguousNativeFile {
        kind: String,
        filename: String,
        candidates: Vec<String>,
    },

    #[error("Expected filename for ${kind} to have .{kind} extension, got {filename:?}")]
    WrongNativeExtension { kind: String, filename: String },

    #[error("Call is not known at bundle-time: '{invocation}'")]
    MalformedMacro { invocation: String },

    #[error("${name} takes {expected}, but got '{invocation}'")]
    MacroArity {
        name: &'static str,
        expected: &'static str,
        invocation: String,
    },

    #[error("Invalid replacement rule {pattern:?}: {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{message}")]
    Syntax { message: String },

    #[error("Failed to scan native sources under {root}: {source}")]
    Io {
        root: String,
        #[source]
        source: walkdir::Error,
    },
}

impl PreprocessError {
    pub fn syntax(message: impl Into<String>) -> Self {
        PreprocessError::Syntax {
            message: message.into(),
        }
    }
}

/// Returns at most the first 100 characters of `text`, cut on a char boundary.
pub(crate) fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_LEN) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
