//! # js2native builtin preprocessor
//!
//! Builtin sources are ordinary JavaScript plus `$`-prefixed pseudo-keywords
//! and call-like macros. This crate turns them into plain JavaScript and a
//! side table linking every native-call macro to its implementation:
//!
//! ```text
//! let y = $zig("math.zig", "add")(1,2);
//!   →  let y = __intrinsic__lazy(0)(1,2);
//!      registry[0] = { kind: zig, filename: /…/math.zig, symbol: add }
//! ```
//!
//! ## Pipeline
//!
//! 1. Global rules rewrite the raw file (strings and comments included).
//! 2. The balanced-region scanner walks the code and hands every code chunk
//!    to the replacement engine. Literals pass through untouched.
//! 3. Macros are expanded once their argument list is balanced; native calls
//!    are interned in the run's registry and replaced by their id.
//! 4. Emitters read the registry snapshot after the last file.
//!
//! All state of a run lives in one [`GenerationContext`].

mod bridge;
mod builtins;
mod context;
mod error;
mod options;
mod registry;
mod replacements;
mod scanner;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod scanner_tests;

#[cfg(feature = "napi")]
pub use bridge::preprocess_builtins_native;
pub use bridge::{
    preprocess_builtins, BuiltinFileInput, PreprocessRequest, PreprocessResult, PreprocessedModule,
};
pub use builtins::{split_builtin_module, BuiltinFunction, BuiltinModule};
pub use context::GenerationContext;
pub use error::{PreprocessError, Result};
pub use options::{PreprocessOptions, SourceScan};
pub use registry::{
    display_name, generated_wrapper_symbol, CallKind, NativeCall, NativeCallRegistry,
    RegistrySnapshot, SourceFiles, WrapperCall, WRAP_SYMBOL_PREFIX,
};
pub use replacements::{
    rewrite_sigils, MacroKind, Replacement, ReplacementEngine, ReplacementRule, INTRINSIC_PREFIX,
    NO_INTRINSIC_PREFIX,
};
pub use scanner::{slice_source, RequireResolver, Slice, SliceOptions};
