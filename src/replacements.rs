//! Replacement Engine
//!
//! Two rule pools are applied to builtin sources:
//!
//! - **global rules** run once over the raw file, strings and comments included;
//! - **code rules** run on every code chunk the scanner emits, never on the
//!   inside of string, regex, template or comment literals.
//!
//! Before the code rules, well-known symbols (`$$iterator`, `.[$$iterator]`)
//! and `$`-sigiled identifiers are moved onto the reserved intrinsic prefix so
//! the pseudo-keywords survive a standard JavaScript tokenizer. Macro calls
//! (`$debug(...)`, `$zig(...)`, ...) are expanded here once the scanner has
//! balanced their argument list.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::trace;

use crate::error::{PreprocessError, Result};
use crate::options::PreprocessOptions;
use crate::registry::{CallKind, NativeCallRegistry};

/// Reserved prefix every `$name` pseudo-keyword is rewritten to.
pub const INTRINSIC_PREFIX: &str = "__intrinsic__";

/// Marks a global that must not be resolved through the intrinsic table.
pub const NO_INTRINSIC_PREFIX: &str = "__no_intrinsic__";

lazy_static! {
    static ref TEMPLATE_GROUP_RE: Regex = Regex::new(r"%(\d+)").unwrap();
    static ref TRAILING_COMMA_RE: Regex = Regex::new(r",\s*$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// MACROS
// ═══════════════════════════════════════════════════════════════════════════════

/// The six call-like macros the scanner hands to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    Debug,
    Assert,
    Zig,
    Cpp,
    NewZigFunction,
    NewCppFunction,
}

impl MacroKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "debug" => MacroKind::Debug,
            "assert" => MacroKind::Assert,
            "zig" => MacroKind::Zig,
            "cpp" => MacroKind::Cpp,
            "newZigFunction" => MacroKind::NewZigFunction,
            "newCppFunction" => MacroKind::NewCppFunction,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            MacroKind::Debug => "debug",
            MacroKind::Assert => "assert",
            MacroKind::Zig => "zig",
            MacroKind::Cpp => "cpp",
            MacroKind::NewZigFunction => "newZigFunction",
            MacroKind::NewCppFunction => "newCppFunction",
        }
    }

    /// Native language targeted by a native-call macro.
    pub fn call_kind(self) -> Option<CallKind> {
        match self {
            MacroKind::Zig | MacroKind::NewZigFunction => Some(CallKind::Zig),
            MacroKind::Cpp | MacroKind::NewCppFunction => Some(CallKind::Cpp),
            MacroKind::Debug | MacroKind::Assert => None,
        }
    }

    /// `$new*Function` macros build a host function of a declared arity.
    pub fn creates_function(self) -> bool {
        matches!(self, MacroKind::NewZigFunction | MacroKind::NewCppFunction)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULES
// ═══════════════════════════════════════════════════════════════════════════════

pub enum Replacement {
    /// Literal template; `${N}` refers to capture group N.
    Template(String),
    Function(Box<dyn Fn(&Captures) -> String + Send + Sync>),
}

pub struct ReplacementRule {
    pub pattern: Regex,
    pub replacement: Replacement,
}

impl ReplacementRule {
    /// Builds a rule from the shorthand used in the rule tables: `$name`
    /// stands for the intrinsic `__intrinsic__name` and `%N` for capture
    /// group N.
    pub fn template(pattern: &str, to: &str) -> Result<Self> {
        let expanded = to.replace('$', INTRINSIC_PREFIX);
        let expanded = TEMPLATE_GROUP_RE
            .replace_all(&expanded, "$${${1}}")
            .into_owned();
        Ok(ReplacementRule {
            pattern: compile(pattern)?,
            replacement: Replacement::Template(expanded),
        })
    }

    pub fn function<F>(pattern: &str, f: F) -> Result<Self>
    where
        F: Fn(&Captures) -> String + Send + Sync + 'static,
    {
        Ok(ReplacementRule {
            pattern: compile(pattern)?,
            replacement: Replacement::Function(Box::new(f)),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        match &self.replacement {
            Replacement::Template(to) => self.pattern.replace_all(text, to.as_str()).into_owned(),
            Replacement::Function(f) => self
                .pattern
                .replace_all(text, |caps: &Captures| f(caps))
                .into_owned(),
        }
    }
}

impl std::fmt::Debug for ReplacementRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplacementRule")
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| PreprocessError::InvalidRule {
        pattern: pattern.to_string(),
        source,
    })
}

fn alternation(names: &[String]) -> String {
    names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|")
}

fn global_rules(options: &PreprocessOptions) -> Result<Vec<ReplacementRule>> {
    let issue_url = options.issue_url.clone();
    let issue_url_fn = options.issue_url.clone();
    Ok(vec![
        ReplacementRule::function(
            r#"\bnotImplementedIssue\(\s*([0-9]+)\s*,\s*("[^"]*"|'[^']*')\s*\)"#,
            move |caps| not_implemented_error(&issue_url, &caps[1], &caps[2]),
        )?,
        ReplacementRule::function(
            r#"\bnotImplementedIssueFn\(\s*([0-9]+)\s*,\s*("[^"]*"|'[^']*')\s*\)"#,
            move |caps| {
                format!(
                    "() => $throw({})",
                    not_implemented_error(&issue_url_fn, &caps[1], &caps[2])
                )
            },
        )?,
    ])
}

fn not_implemented_error(issue_url: &str, issue: &str, name: &str) -> String {
    format!(
        "new TypeError(`${{{}}} is not implemented yet. See {}{}`)",
        name, issue_url, issue
    )
}

fn code_rules(options: &PreprocessOptions) -> Result<Vec<ReplacementRule>> {
    let mut rules = vec![
        ReplacementRule::template(r"\bthrow new TypeError\b", "$throwTypeError")?,
        ReplacementRule::template(r"\bthrow new RangeError\b", "$throwRangeError")?,
        ReplacementRule::template(r"\bthrow new OutOfMemoryError\b", "$throwOutOfMemoryError")?,
        ReplacementRule::template(r"\bnew TypeError\b", "$makeTypeError")?,
        ReplacementRule::template(r"\bnew Array\(", "$newArrayWithSize(")?,
        ReplacementRule::template(r"\bexport\s*default\b", "$exports =")?,
    ];

    for (index, code) in options.error_codes.iter().enumerate() {
        rules.push(ReplacementRule::template(
            &format!(r"\b{}{}\(", INTRINSIC_PREFIX, regex::escape(code)),
            &format!("$makeErrorWithCode({}, ", index),
        )?);
    }

    if !options.prefixed_globals.is_empty() {
        rules.push(ReplacementRule::template(
            &format!(r"\bextends\s+({})\b", alternation(&options.prefixed_globals)),
            &format!("extends {}%1", NO_INTRINSIC_PREFIX),
        )?);
    }

    Ok(rules)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ReplacementEngine {
    dev_flag: String,
    global_rules: Vec<ReplacementRule>,
    code_rules: Vec<ReplacementRule>,
    /// `.[$$name]`: computed member access with the live symbol as key.
    symbol_member: Option<ReplacementRule>,
    /// `$$name`: the symbol value captured when the builtins were linked.
    symbol_snapshot: Option<ReplacementRule>,
}

impl ReplacementEngine {
    pub fn new(options: &PreprocessOptions) -> Result<Self> {
        let (symbol_member, symbol_snapshot) = if options.well_known_symbols.is_empty() {
            (None, None)
        } else {
            let names = alternation(&options.well_known_symbols);
            (
                Some(ReplacementRule::template(
                    &format!(r"\.\[\$\$({})\]", names),
                    "[$%1Symbol]",
                )?),
                Some(ReplacementRule::template(
                    &format!(r"\$\$({})\b", names),
                    "$%1SymbolSnapshot",
                )?),
            )
        };

        Ok(ReplacementEngine {
            dev_flag: options.dev_flag.clone(),
            global_rules: global_rules(options)?,
            code_rules: code_rules(options)?,
            symbol_member,
            symbol_snapshot,
        })
    }

    /// Whole-file rules, applied before any scanning.
    pub fn apply_global_replacements(&self, text: &str) -> String {
        self.global_rules
            .iter()
            .fold(text.to_string(), |acc, rule| rule.apply(&acc))
    }

    /// Rewrites one code chunk: well-known symbols, then sigils, then the
    /// ordered code rules.
    pub fn rewrite_code(&self, chunk: &str) -> String {
        if chunk.is_empty() {
            return String::new();
        }
        let mut text = chunk.to_string();
        if let Some(rule) = &self.symbol_member {
            text = rule.apply(&text);
        }
        if let Some(rule) = &self.symbol_snapshot {
            text = rule.apply(&text);
        }
        text = rewrite_sigils(&text);
        for rule in &self.code_rules {
            text = rule.apply(&text);
        }
        text
    }

    /// `$debug(args)`: only evaluated when the development flag is set.
    /// `args` is the balanced argument list including its parentheses.
    pub fn expand_debug(&self, args: &str) -> String {
        trace!(args, "expanding $debug");
        format!("({}?$debug_log{}:void 0)", self.dev_flag, args)
    }

    /// `$assert(condition, ...extra)`: carries the condition's source text
    /// (with sigils restored) for the failure message.
    pub fn expand_assert(&self, condition: &str, extra: Option<&str>) -> Result<String> {
        if condition.trim().is_empty() {
            return Err(PreprocessError::MalformedMacro {
                invocation: format!("$assert({})", extra.unwrap_or_default()),
            });
        }
        trace!(condition, "expanding $assert");
        let display = condition.replace(INTRINSIC_PREFIX, "$");
        let display = Value::String(display.trim().to_string()).to_string();
        let extra = match extra {
            Some(args) => format!(", {}", args.trim()),
            None => String::new(),
        };
        Ok(format!(
            "({}?$assert({},{}{}):void 0)",
            self.dev_flag, condition, display, extra
        ))
    }

    /// `$zig` / `$cpp` / `$newZigFunction` / `$newCppFunction`: registers the
    /// native call and substitutes the id-carrying intrinsic.
    pub fn expand_native(
        &self,
        kind: MacroKind,
        args: &str,
        registry: &mut NativeCallRegistry,
    ) -> Result<String> {
        let call_kind = kind.call_kind().ok_or_else(|| PreprocessError::MalformedMacro {
            invocation: format!("${}{}", kind.name(), args),
        })?;
        let parsed = parse_native_args(kind, args)?;
        trace!(name = kind.name(), file = %parsed.filename, symbol = %parsed.symbol, "expanding native call");
        let id = registry.register(call_kind, &parsed.filename, &parsed.symbol, parsed.arity)?;
        Ok(format!("{}lazy({})", INTRINSIC_PREFIX, id))
    }
}

#[derive(Debug, PartialEq)]
struct NativeArgs {
    filename: String,
    symbol: String,
    arity: Option<u32>,
}

/// Argument lists must be literal: they are read as a JSON array after
/// normalizing quotes and dropping a trailing comma.
fn parse_native_args(kind: MacroKind, args: &str) -> Result<NativeArgs> {
    let invocation = format!("${}{}", kind.name(), args);
    let inner = args
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| PreprocessError::MalformedMacro {
            invocation: invocation.clone(),
        })?;
    let normalized = inner.replace('\'', "\"");
    let normalized = TRAILING_COMMA_RE.replace(&normalized, "");
    let values: Vec<Value> = serde_json::from_str(&format!("[{}]", normalized)).map_err(|_| {
        PreprocessError::MalformedMacro {
            invocation: invocation.clone(),
        }
    })?;

    let arity_error = || PreprocessError::MacroArity {
        name: kind.name(),
        expected: if kind.creates_function() {
            "three arguments"
        } else {
            "two string arguments"
        },
        invocation: invocation.clone(),
    };

    match values.as_slice() {
        [Value::String(filename), Value::String(symbol)] if !kind.creates_function() => {
            Ok(NativeArgs {
                filename: filename.clone(),
                symbol: symbol.clone(),
                arity: None,
            })
        }
        [Value::String(filename), Value::String(symbol), Value::Number(arity)]
            if kind.creates_function() =>
        {
            let arity = arity
                .as_u64()
                .and_then(|a| u32::try_from(a).ok())
                .ok_or_else(arity_error)?;
            Ok(NativeArgs {
                filename: filename.clone(),
                symbol: symbol.clone(),
                arity: Some(arity),
            })
        }
        _ => Err(arity_error()),
    }
}

/// `$name` → `__intrinsic__name` unless the `$` follows a word character or
/// another `$`.
pub fn rewrite_sigils(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 32);
    let mut last = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'$' {
            continue;
        }
        let prev_ok = i == 0 || !is_word_or_dollar(bytes[i - 1]);
        let next_ok = bytes
            .get(i + 1)
            .map_or(false, |c| c.is_ascii_alphanumeric() || *c == b'_');
        if prev_ok && next_ok {
            out.push_str(&text[last..i]);
            out.push_str(INTRINSIC_PREFIX);
            last = i + 1;
        }
    }
    out.push_str(&text[last..]);
    out
}

pub(crate) fn is_word_or_dollar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}
