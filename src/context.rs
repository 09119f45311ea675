use tracing::debug;

use crate::error::Result;
use crate::options::{PreprocessOptions, SourceScan};
use crate::registry::{NativeCallRegistry, RegistrySnapshot, SourceFiles};
use crate::replacements::ReplacementEngine;
use crate::scanner::{Rewriter, Scanner, Slice, SliceOptions};

/// State of one generation run.
///
/// Every file of the run is processed through the same context so identical
/// native calls share an id across files. The registry is read by the
/// emitters only after the last file has been processed.
#[derive(Debug)]
pub struct GenerationContext {
    options: PreprocessOptions,
    engine: ReplacementEngine,
    registry: NativeCallRegistry,
}

impl GenerationContext {
    pub fn new(options: PreprocessOptions, files: SourceFiles) -> Result<Self> {
        let engine = ReplacementEngine::new(&options)?;
        debug!(native_files = files.len(), "created generation context");
        Ok(GenerationContext {
            options,
            engine,
            registry: NativeCallRegistry::new(files),
        })
    }

    /// Scans the native source tree once and builds a context over it.
    pub fn from_scan(options: PreprocessOptions, scan: &SourceScan) -> Result<Self> {
        Self::new(options, SourceFiles::scan(scan)?)
    }

    /// Balanced-region scan; see [`crate::scanner`].
    pub fn slice<'s>(&mut self, src: &'s str, options: SliceOptions<'_>) -> Result<Slice<'s>> {
        let rewriter = Rewriter {
            engine: &self.engine,
            registry: &mut self.registry,
        };
        Scanner::new(src, Some(rewriter), options).run()
    }

    pub fn apply_global_replacements(&self, text: &str) -> String {
        self.engine.apply_global_replacements(text)
    }

    /// Rewrites a whole source text: global rules first, then consecutive
    /// balanced regions in rewrite mode until the input is consumed.
    pub fn rewrite_source(&mut self, src: &str) -> Result<String> {
        self.rewrite_source_with(src, None)
    }

    pub fn rewrite_source_with(
        &mut self,
        src: &str,
        resolver: Option<&dyn Fn(&str) -> String>,
    ) -> Result<String> {
        let text = self.apply_global_replacements(src);
        let mut out = String::with_capacity(text.len());
        let mut rest: &str = &text;
        while !rest.is_empty() {
            let slice = self.slice(
                rest,
                SliceOptions {
                    rewrite: true,
                    stop_on_comma: false,
                    require_resolver: resolver,
                },
            )?;
            out.push_str(&slice.result);
            rest = slice.rest;
        }
        Ok(out)
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.options
    }

    pub fn registry(&self) -> &NativeCallRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn into_registry(self) -> NativeCallRegistry {
        self.registry
    }
}
