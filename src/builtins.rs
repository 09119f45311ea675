//! Builtin Module Splitter
//!
//! A builtin source file is a flat list of top-level items: imports, type
//! declarations, `const enum`s, `$directive` lines and exported functions.
//! Each exported function body is extracted with the balanced-region scanner
//! in rewrite mode, so macros inside it are expanded and registered with the
//! run's native-call registry.
//!
//! Directives apply to the next exported function only:
//!
//! ```text
//! $getter
//! $visibility = "Private"
//! export function size(this: Map) { ... }
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::GenerationContext;
use crate::error::{PreprocessError, Result};
use crate::scanner::{slice_source, RequireResolver, SliceOptions};

lazy_static! {
    static ref TOP_LEVEL_RE: Regex = Regex::new(
        r"^(/\*|//|import\b|(?:export )?type\b|interface\b|\$|const enum\b|export (?:async )?function\b|(?:async )?function\b)"
    )
    .unwrap();
    static ref DIRECTIVE_RE: Regex =
        Regex::new(r"^\$([a-zA-Z0-9]+)(?:[ \t]*=[ \t]*([^\r\n]+?))?[ \t]*;?[ \t]*(?:\r?\n|$)").unwrap();
    static ref EXPORT_NAME_RE: Regex =
        Regex::new(r"^export\s+(async\s+)?function\s+([a-zA-Z0-9_]+)\s*").unwrap();
    static ref FUNCTION_NAME_RE: Regex =
        Regex::new(r"^(?:async\s+)?function\s+([a-zA-Z0-9_]+)").unwrap();
    static ref PARAMS_RE: Regex = Regex::new(r"^\(([^)]*)\)(?:\s*:\s*([^{\n]+))?\s*\{").unwrap();
    static ref PARAM_TYPE_RE: Regex = Regex::new(r":.+$").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinFunction {
    pub name: String,
    pub params: Vec<String>,
    pub directives: Map<String, Value>,
    /// Rewritten body, without the enclosing braces.
    pub source: String,
    pub is_async: bool,
    /// `const enum` declarations the body references.
    pub enums: Vec<String>,
    pub uses_this: bool,
}

impl BuiltinFunction {
    pub fn visibility(&self) -> &str {
        match self.directives.get("visibility").and_then(Value::as_str) {
            Some(visibility) => visibility,
            None if self.is_link_time_constant() => "Private",
            None => "Public",
        }
    }

    pub fn is_getter(&self) -> bool {
        self.flag("getter")
    }

    pub fn is_link_time_constant(&self) -> bool {
        self.flag("linkTimeConstant")
    }

    pub fn construct_ability(&self) -> &str {
        self.directives
            .get("ConstructAbility")
            .and_then(Value::as_str)
            .unwrap_or("CannotConstruct")
    }

    pub fn construct_kind(&self) -> &str {
        self.directives
            .get("ConstructKind")
            .and_then(Value::as_str)
            .unwrap_or("None")
    }

    fn flag(&self, name: &str) -> bool {
        self.directives
            .get(name)
            .map_or(false, |v| !matches!(v, Value::Bool(false) | Value::Null))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinModule {
    /// Sorted by name.
    pub functions: Vec<BuiltinFunction>,
    /// A top-level comment carried `@internal`.
    pub internal: bool,
}

struct ConstEnum {
    name: String,
    code: String,
}

/// Splits one builtin source file into its exported functions.
pub fn split_builtin_module(
    ctx: &mut GenerationContext,
    source: &str,
    resolver: Option<RequireResolver<'_>>,
) -> Result<BuiltinModule> {
    let text = ctx.apply_global_replacements(source);
    let mut rest: &str = &text;
    let mut module = BuiltinModule::default();
    let mut directives = Map::new();
    let mut enums: Vec<ConstEnum> = Vec::new();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let item = match TOP_LEVEL_RE.captures(rest) {
            Some(caps) => caps[1].to_string(),
            None => {
                return Err(PreprocessError::syntax(format!(
                    "Could not process input:\n{}",
                    first_line(rest)
                )))
            }
        };

        match item.as_str() {
            "import" => {
                let end = rest.find(';').ok_or_else(|| {
                    PreprocessError::syntax(format!("Unterminated import:\n{}", first_line(rest)))
                })?;
                rest = &rest[end + 1..];
            }
            "/*" => {
                let end = rest.find("*/").map(|i| i + 2).ok_or_else(|| {
                    PreprocessError::syntax(format!("Unterminated comment:\n{}", first_line(rest)))
                })?;
                module.internal |= rest[..end].contains("@internal");
                rest = &rest[end..];
            }
            "//" => {
                let end = rest.find('\n').map_or(rest.len(), |i| i + 1);
                module.internal |= rest[..end].contains("@internal");
                rest = &rest[end..];
            }
            "type" | "export type" => rest = skip_type_alias(rest)?,
            "interface" => rest = slice_source(rest, SliceOptions::default())?.rest,
            "const enum" => {
                let slice = slice_source(rest, SliceOptions::default())?;
                let brace = slice.result.find('{').unwrap_or(slice.result.len());
                enums.push(ConstEnum {
                    name: slice.result["const enum".len()..brace].trim().to_string(),
                    code: format!("\n{}", slice.result),
                });
                rest = slice.rest;
            }
            "$" => rest = parse_directive(rest, &mut directives)?,
            "export function" | "export async function" => {
                let (function, remaining) = parse_exported_function(
                    ctx,
                    rest,
                    std::mem::take(&mut directives),
                    &enums,
                    resolver,
                )?;
                module.functions.push(function);
                rest = remaining;
            }
            _ => {
                let name = FUNCTION_NAME_RE
                    .captures(rest)
                    .map(|caps| caps[1].to_string())
                    .unwrap_or_default();
                return Err(PreprocessError::syntax(format!(
                    "All top level functions must be exported: {}",
                    name
                )));
            }
        }
    }

    module.functions.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(
        functions = module.functions.len(),
        internal = module.internal,
        "split builtin module"
    );
    Ok(module)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// `type X = ...;`, where an object type body is balanced before the `;`.
fn skip_type_alias(rest: &str) -> Result<&str> {
    let semi = rest.find(';');
    let brace = rest.find('{');
    match (semi, brace) {
        (Some(s), Some(b)) if s < b => Ok(&rest[s + 1..]),
        (_, Some(b)) => {
            let after = slice_source(&rest[b..], SliceOptions::default())?.rest;
            Ok(after.trim_start().strip_prefix(';').unwrap_or(after))
        }
        (Some(s), None) => Ok(&rest[s + 1..]),
        (None, None) => Ok(rest.find('\n').map_or("", |i| &rest[i + 1..])),
    }
}

fn parse_directive<'s>(rest: &'s str, directives: &mut Map<String, Value>) -> Result<&'s str> {
    let caps = DIRECTIVE_RE.captures(rest).ok_or_else(|| {
        PreprocessError::syntax(format!("Could not parse directive:\n{}", first_line(rest)))
    })?;
    let name = &caps[1];
    let value = match caps.get(2) {
        Some(raw) => serde_json::from_str(raw.as_str()).map_err(|_| {
            PreprocessError::syntax(format!(
                "Could not parse directive value {} (must be JSON parsable)",
                raw.as_str()
            ))
        })?,
        None => Value::Bool(true),
    };

    match name {
        "constructor" => {
            directives.insert("ConstructAbility".into(), "CanConstruct".into());
        }
        "nakedConstructor" => {
            directives.insert("ConstructAbility".into(), "CanConstruct".into());
            directives.insert("ConstructKind".into(), "Naked".into());
        }
        _ => {
            directives.insert(name.to_string(), value);
        }
    }
    Ok(&rest[caps[0].len()..])
}

fn parse_exported_function<'s>(
    ctx: &mut GenerationContext,
    rest: &'s str,
    directives: Map<String, Value>,
    enums: &[ConstEnum],
    resolver: Option<RequireResolver<'_>>,
) -> Result<(BuiltinFunction, &'s str)> {
    let caps = EXPORT_NAME_RE.captures(rest).ok_or_else(|| {
        PreprocessError::syntax(format!("Could not parse function name:\n{}", first_line(rest)))
    })?;
    let is_async = caps.get(1).is_some();
    let name = caps[2].to_string();
    let mut remaining = &rest[caps[0].len()..];

    if remaining.starts_with('<') {
        remaining = skip_type_parameters(&name, remaining)?;
    }

    if !remaining.starts_with('(') {
        return Err(PreprocessError::syntax(format!(
            "Function {} is missing parameter list start. Found:\n\n\t{}",
            name,
            crate::error::excerpt(remaining)
        )));
    }
    let params_match = PARAMS_RE.captures(remaining).ok_or_else(|| {
        PreprocessError::syntax(format!(
            "Could not parse parameters for function {}:\n{}",
            name,
            first_line(remaining)
        ))
    })?;
    let mut params: Vec<String> = split_params(&params_match[1])
        .into_iter()
        .map(|p| PARAM_TYPE_RE.replace(p, "").trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if params.first().map(String::as_str) == Some("this") {
        params.remove(0);
    }

    // The body scan starts at the opening `{`.
    let body_start = params_match[0].len() - 1;
    let options = SliceOptions {
        rewrite: true,
        stop_on_comma: false,
        require_resolver: resolver,
    };
    let body = ctx.slice(&remaining[body_start..], options)?;
    let trimmed = body.result.trim();
    let source = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed)
        .trim()
        .to_string();

    let used_enums = enums
        .iter()
        .filter(|e| source.contains(e.name.as_str()))
        .map(|e| e.code.clone())
        .collect();

    Ok((
        BuiltinFunction {
            name,
            params,
            directives,
            source,
            is_async,
            enums: used_enums,
            uses_this: body.uses_this,
        },
        body.rest,
    ))
}

/// Splits a parameter list on commas outside `<>`, `()`, `[]` and `{}`.
fn split_params(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut prev = '\0';
    for (i, c) in list.char_indices() {
        let arrow = prev == '=';
        prev = c;
        match c {
            '<' | '(' | '[' | '{' => depth += 1,
            '>' if arrow => {}
            '>' | ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

fn skip_type_parameters<'s>(name: &str, text: &'s str) -> Result<&'s str> {
    let mut depth = 0usize;
    let mut prev = '\0';
    for (i, c) in text.char_indices() {
        let arrow = prev == '=';
        prev = c;
        match c {
            '<' => depth += 1,
            // `=>` in a function type
            '>' if arrow => {}
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(text[i + 1..].trim_start());
                }
            }
            _ => {}
        }
    }
    Err(PreprocessError::syntax(format!(
        "Function {} has an unclosed generic type. Missing {} closing angle bracket(s).",
        name, depth
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_params_ignores_arrow() {
        assert_eq!(
            split_params("a: Array<(x) => void>, b"),
            vec!["a: Array<(x) => void>", " b"]
        );
        assert_eq!(split_params("cb: (x) => y, z"), vec!["cb: (x) => y", " z"]);
    }
}
