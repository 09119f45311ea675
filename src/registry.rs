//! Native-Call Registry
//!
//! Interns every `$zig` / `$cpp` / `$newZigFunction` / `$newCppFunction`
//! invocation of a generation run into a dense, id-indexed call table. The
//! emitters that render forward declarations, trampolines and the function
//! pointer table read the final state through [`RegistrySnapshot`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{PreprocessError, Result};
use crate::options::SourceScan;

/// Prefix of the synthesized symbol behind every wrapped call.
pub const WRAP_SYMBOL_PREFIX: &str = "js2native_wrap_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Zig,
    Cpp,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Zig => "zig",
            CallKind::Cpp => "cpp",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the id-indexed call table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCall {
    pub id: usize,
    pub kind: CallKind,
    pub filename: String,
    pub symbol: String,
    pub wrapped: bool,
}

/// Extra metadata for calls that construct a host function instead of
/// calling the native symbol directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapperCall {
    /// Kind of the macro that asked for the wrapper (the backing call is cpp).
    pub kind: CallKind,
    pub target_symbol: String,
    pub generated_symbol: String,
    pub display_name: String,
    pub arity: u32,
    pub filename: String,
}

/// Final registry state handed to the emitters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub calls: Vec<NativeCall>,
    pub wrappers: Vec<WrapperCall>,
    pub count: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE FILES
// ═══════════════════════════════════════════════════════════════════════════════

/// Flat list of candidate native source files, collected once per run.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    paths: Vec<PathBuf>,
}

impl SourceFiles {
    /// Use an already filtered list of absolute paths.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        SourceFiles {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Walk `scan.root`, skipping excluded directories, keeping files whose
    /// extension is listed in `scan.extensions`.
    pub fn scan(scan: &SourceScan) -> Result<Self> {
        let mut paths = Vec::new();
        let walker = WalkDir::new(&scan.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry.depth() > 0
                    && entry
                        .file_name()
                        .to_str()
                        .map_or(false, |name| scan.excluded_dirs.iter().any(|d| d == name)))
            });

        for entry in walker {
            let entry = entry.map_err(|source| PreprocessError::Io {
                root: scan.root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let keep = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| scan.extensions.iter().any(|e| e == ext));
            if keep {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        debug!(root = %scan.root, files = paths.len(), "scanned native source tree");
        Ok(SourceFiles { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Every path ending in `/<filename>`.
    fn matching(&self, filename: &str) -> Vec<&Path> {
        let suffix = format!("/{}", filename.trim_start_matches("./"));
        self.paths
            .iter()
            .filter(|p| p.to_string_lossy().replace('\\', "/").ends_with(&suffix))
            .map(|p| p.as_path())
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only intern table of native calls for one generation run.
///
/// Not synchronized: `register` does check-then-insert, so concurrent
/// population needs a single writer around it.
#[derive(Debug, Default)]
pub struct NativeCallRegistry {
    files: SourceFiles,
    calls: Vec<NativeCall>,
    wrappers: Vec<WrapperCall>,
}

impl NativeCallRegistry {
    pub fn new(files: SourceFiles) -> Self {
        NativeCallRegistry {
            files,
            calls: Vec::new(),
            wrappers: Vec::new(),
        }
    }

    /// Returns the id of the call `(kind, filename, symbol)`, creating it if
    /// this is the first time it is seen. `wrap_arity` marks a wrapped call
    /// (`$newZigFunction` / `$newCppFunction`), which never shares an entry
    /// with a plain call to the same symbol.
    pub fn register(
        &mut self,
        kind: CallKind,
        filename: &str,
        symbol: &str,
        wrap_arity: Option<u32>,
    ) -> Result<usize> {
        let resolved = self.resolve_filename(kind, filename)?;
        let wrapped = wrap_arity.is_some();
        let effective_symbol = if wrapped {
            generated_wrapper_symbol(symbol)
        } else {
            symbol.to_string()
        };
        let stored_kind = if wrapped { CallKind::Cpp } else { kind };

        if let Some(existing) = self.calls.iter().find(|call| {
            call.wrapped == wrapped
                && call.kind == stored_kind
                && call.filename == resolved
                && call.symbol == effective_symbol
        }) {
            trace!(id = existing.id, symbol, "native call already registered");
            return Ok(existing.id);
        }

        let id = self.calls.len();
        debug!(id, %kind, symbol, wrapped, "registered native call");
        self.calls.push(NativeCall {
            id,
            kind: stored_kind,
            filename: resolved.clone(),
            symbol: effective_symbol.clone(),
            wrapped,
        });

        if let Some(arity) = wrap_arity {
            self.wrappers.push(WrapperCall {
                kind,
                target_symbol: symbol.to_string(),
                generated_symbol: effective_symbol,
                display_name: display_name(symbol).to_string(),
                arity,
                filename: resolved,
            });
        }

        Ok(id)
    }

    pub fn calls(&self) -> &[NativeCall] {
        &self.calls
    }

    pub fn wrappers(&self) -> &[WrapperCall] {
        &self.wrappers
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            calls: self.calls.clone(),
            wrappers: self.wrappers.clone(),
            count: self.calls.len(),
        }
    }

    /// Zig calls keep the absolute path (emitters derive `@import` paths from
    /// it); cpp calls keep the name as written.
    fn resolve_filename(&self, kind: CallKind, filename: &str) -> Result<String> {
        if !filename.ends_with(&format!(".{}", kind)) {
            return Err(PreprocessError::WrongNativeExtension {
                kind: kind.to_string(),
                filename: filename.to_string(),
            });
        }

        let matches = self.files.matching(filename);
        let resolved = match matches.as_slice() {
            [] => {
                return Err(PreprocessError::NativeFileNotFound {
                    kind: kind.to_string(),
                    filename: filename.to_string(),
                })
            }
            [single] => *single,
            many => {
                return Err(PreprocessError::AmbiguousNativeFile {
                    kind: kind.to_string(),
                    filename: filename.to_string(),
                    candidates: many.iter().map(|p| p.display().to_string()).collect(),
                })
            }
        };

        Ok(match kind {
            CallKind::Zig => resolved.to_string_lossy().into_owned(),
            CallKind::Cpp => filename.to_string(),
        })
    }
}

/// `js2native_wrap_` followed by the symbol with every non-letter replaced by `_`.
pub fn generated_wrapper_symbol(symbol: &str) -> String {
    let sanitized: String = symbol
        .chars()
        .map(|c| if c.is_ascii_alphabetic() { c } else { '_' })
        .collect();
    format!("{}{}", WRAP_SYMBOL_PREFIX, sanitized)
}

/// Last run of letters/digits in `symbol`.
pub fn display_name(symbol: &str) -> &str {
    symbol
        .rsplit(|c: char| !c.is_ascii_alphanumeric())
        .find(|segment| !segment.is_empty())
        .unwrap_or(symbol)
}
