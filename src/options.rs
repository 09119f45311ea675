use serde::{Deserialize, Serialize};

/// Configuration tables consumed by the replacement engine.
///
/// These are inputs, not something the preprocessor computes. The defaults
/// match the builtin sources the build pipeline feeds through this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreprocessOptions {
    /// Identifier the bundler defines to `true` in development builds.
    pub dev_flag: String,
    /// Names accepted after `$$` / `.[$$` as well-known symbols.
    pub well_known_symbols: Vec<String>,
    /// Globals that `extends <Global>` must reference through a frozen copy.
    pub prefixed_globals: Vec<String>,
    /// Error-code intrinsics; `$CODE(` becomes `$makeErrorWithCode(<index>, `.
    pub error_codes: Vec<String>,
    /// Base URL used by the `notImplementedIssue` rewrites.
    pub issue_url: String,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        PreprocessOptions {
            dev_flag: "IS_BUN_DEVELOPMENT".to_string(),
            well_known_symbols: to_strings(&[
                "asyncIterator",
                "hasInstance",
                "isConcatSpreadable",
                "iterator",
                "match",
                "matchAll",
                "replace",
                "search",
                "species",
                "split",
                "toPrimitive",
                "toStringTag",
                "unscopables",
            ]),
            prefixed_globals: to_strings(&[
                "AbortSignal",
                "Array",
                "ArrayBuffer",
                "Buffer",
                "Infinity",
                "Loader",
                "Promise",
                "ReadableByteStreamController",
                "ReadableStream",
                "ReadableStreamBYOBReader",
                "ReadableStreamBYOBRequest",
                "ReadableStreamDefaultController",
                "ReadableStreamDefaultReader",
                "RegExp",
                "String",
                "TransformStream",
                "TransformStreamDefaultController",
                "Uint8Array",
                "WritableStream",
                "WritableStreamDefaultController",
                "WritableStreamDefaultWriter",
                "isFinite",
                "undefined",
            ]),
            error_codes: Vec::new(),
            issue_url: "https://github.com/oven-sh/bun/issues/".to_string(),
        }
    }
}

/// Where the native source tree lives and which files in it are candidates
/// for `$zig` / `$cpp` filename resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceScan {
    pub root: String,
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl SourceScan {
    pub fn new(root: impl Into<String>) -> Self {
        SourceScan {
            root: root.into(),
            excluded_dirs: default_excluded_dirs(),
            extensions: default_extensions(),
        }
    }
}

fn default_excluded_dirs() -> Vec<String> {
    to_strings(&["deps", "node_modules", "WebKit", "build", "vendor"])
}

fn default_extensions() -> Vec<String> {
    to_strings(&["zig", "cpp"])
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
