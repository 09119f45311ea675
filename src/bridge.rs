//! Batch entry point used by the JavaScript build driver.
//!
//! One request is one generation run: every builtin file in it shares the
//! same native-call registry, and the registry is returned only after the
//! last file has been split.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crate::builtins::{split_builtin_module, BuiltinModule};
use crate::context::GenerationContext;
use crate::error::Result;
use crate::options::{PreprocessOptions, SourceScan};
use crate::registry::{RegistrySnapshot, SourceFiles};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinFileInput {
    /// File name without extension, e.g. `ReadableStream`.
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessRequest {
    pub files: Vec<BuiltinFileInput>,
    /// Pre-filtered native source paths. Ignored when `scan` is given.
    #[serde(default)]
    pub native_files: Vec<String>,
    #[serde(default)]
    pub scan: Option<SourceScan>,
    #[serde(default)]
    pub options: PreprocessOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessedModule {
    pub name: String,
    #[serde(flatten)]
    pub module: BuiltinModule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessResult {
    pub modules: Vec<PreprocessedModule>,
    pub registry: RegistrySnapshot,
}

pub fn preprocess_builtins(request: PreprocessRequest) -> Result<PreprocessResult> {
    let files = match &request.scan {
        Some(scan) => SourceFiles::scan(scan)?,
        None => SourceFiles::from_paths(request.native_files.iter()),
    };
    let mut ctx = GenerationContext::new(request.options, files)?;

    let mut modules = Vec::with_capacity(request.files.len());
    for file in &request.files {
        let module = split_builtin_module(&mut ctx, &file.source, None)?;
        modules.push(PreprocessedModule {
            name: file.name.clone(),
            module,
        });
    }

    Ok(PreprocessResult {
        modules,
        registry: ctx.snapshot(),
    })
}

#[cfg(feature = "napi")]
#[napi]
pub fn preprocess_builtins_native(request: serde_json::Value) -> napi::Result<serde_json::Value> {
    let request: PreprocessRequest = serde_json::from_value(request)
        .map_err(|e| napi::Error::from_reason(format!("Invalid request: {}", e)))?;
    let result = preprocess_builtins(request).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(result)
        .map_err(|e| napi::Error::from_reason(format!("Failed to serialize result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_shares_registry_across_files() {
        let request: PreprocessRequest = serde_json::from_value(json!({
            "files": [
                { "name": "A", "source": "export function a() { return $zig(\"fs.zig\", \"read\")(); }\n" },
                { "name": "B", "source": "export function b() { return $zig('fs.zig', 'read')(1); }\n" }
            ],
            "nativeFiles": ["/repo/src/node/fs.zig"]
        }))
        .unwrap();

        let result = preprocess_builtins(request).unwrap();
        assert_eq!(result.registry.count, 1);
        assert_eq!(
            result.modules[0].module.functions[0].source,
            "return __intrinsic__lazy(0)();"
        );
        assert_eq!(
            result.modules[1].module.functions[0].source,
            "return __intrinsic__lazy(0)(1);"
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["modules"][1]["name"], "B");
        assert_eq!(json["modules"][1]["functions"][0]["name"], "b");
    }

    #[test]
    fn test_batch_fails_whole_run() {
        let request = PreprocessRequest {
            files: vec![BuiltinFileInput {
                name: "A".to_string(),
                source: "export function a() { return $cpp(\"Missing.cpp\", \"f\"); }".to_string(),
            }],
            native_files: vec![],
            scan: None,
            options: PreprocessOptions::default(),
        };
        let err = preprocess_builtins(request).unwrap_err();
        assert!(err.to_string().contains("Missing.cpp"));
    }
}
