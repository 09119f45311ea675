//! Balanced-Region Scanner
//!
//! Extracts the shortest prefix of a buffer that closes the first unmatched
//! `)` or `}`, without building an AST. String, regex, template and comment
//! literals are consumed whole so brackets inside them never count.
//!
//! The scanner is a single cursor over the input plus an explicit stack of
//! frames. Template interpolations and macro argument lists push a frame
//! instead of recursing, so deeply nested input cannot exhaust the call stack.
//! In rewrite mode every code chunk goes through the [`ReplacementEngine`]
//! before it is appended, and macro calls are expanded when their argument
//! frame closes.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{excerpt, PreprocessError, Result};
use crate::registry::NativeCallRegistry;
use crate::replacements::{is_word_or_dollar, MacroKind, ReplacementEngine};

lazy_static! {
    static ref STOP_RE: Regex = Regex::new(concat!(
        r"(?P<regex>(?:[(,=;:{]|\breturn|=>)\s*)/[^/*]",
        r"|(?P<block>/\*)",
        r"|(?P<line>//)",
        r#"|(?P<punct>['"`})])"#,
        r"|(?P<require>\brequire\()",
        r"|\$(?P<macro>debug|assert|zig|cpp|newZigFunction|newCppFunction)\(",
    ))
    .unwrap();
    static ref STOP_COMMA_RE: Regex = Regex::new(concat!(
        r"(?P<regex>(?:[(,=;:{]|\breturn|=>)\s*)/[^/*]",
        r"|(?P<block>/\*)",
        r"|(?P<line>//)",
        r#"|(?P<punct>['"`}),])"#,
        r"|(?P<require>\brequire\()",
        r"|\$(?P<macro>debug|assert|zig|cpp|newZigFunction|newCppFunction)\(",
    ))
    .unwrap();
    static ref TEMPLATE_STOP_RE: Regex = Regex::new(r"\\|`|\$\{").unwrap();
    static ref STATIC_REQUIRE_RE: Regex = Regex::new(r#"^require\(["']([^"']+)["']\)"#).unwrap();
    static ref CLOSING_PAREN_RE: Regex = Regex::new(r"^\s*\)").unwrap();
    static ref THIS_RE: Regex = Regex::new(r"\bthis\b").unwrap();
}

/// Replacement text for a static `require("specifier")`.
pub type RequireResolver<'a> = &'a dyn Fn(&str) -> String;

#[derive(Clone, Copy, Default)]
pub struct SliceOptions<'a> {
    /// Run code chunks through the replacement engine and expand macros.
    pub rewrite: bool,
    /// Also stop after a comma at bracket depth <= 1.
    pub stop_on_comma: bool,
    pub require_resolver: Option<RequireResolver<'a>>,
}

impl<'a> SliceOptions<'a> {
    pub fn rewrite() -> Self {
        SliceOptions {
            rewrite: true,
            ..Self::default()
        }
    }

    pub fn with_resolver(mut self, resolver: RequireResolver<'a>) -> Self {
        self.require_resolver = Some(resolver);
        self
    }

    pub fn stop_on_comma(mut self) -> Self {
        self.stop_on_comma = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice<'s> {
    /// The balanced region, rewritten when rewriting was requested.
    pub result: String,
    /// Unconsumed input after the region.
    pub rest: &'s str,
    /// Some code chunk of the region mentions `this`.
    pub uses_this: bool,
}

/// Scans without rewriting; no engine or registry is involved.
pub fn slice_source<'s>(src: &'s str, options: SliceOptions<'_>) -> Result<Slice<'s>> {
    Scanner::new(src, None, options).run()
}

/// The engine and the registry it feeds, borrowed for one rewriting scan.
pub(crate) struct Rewriter<'e> {
    pub engine: &'e ReplacementEngine,
    pub registry: &'e mut NativeCallRegistry,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAMES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
enum Role {
    Root,
    Interpolation,
    MacroArgs(MacroKind),
    /// Extra `$assert` arguments after the condition.
    AssertExtra { condition: String },
}

#[derive(Debug)]
struct CodeFrame {
    start: usize,
    out: String,
    depth: i32,
    stop_on_comma: bool,
    role: Role,
}

impl CodeFrame {
    fn new(start: usize, stop_on_comma: bool, role: Role) -> Self {
        CodeFrame {
            start,
            out: String::new(),
            depth: 0,
            stop_on_comma,
            role,
        }
    }
}

#[derive(Debug)]
struct TemplateFrame {
    start: usize,
    out: String,
}

#[derive(Debug)]
enum Frame {
    Code(CodeFrame),
    Template(TemplateFrame),
}

impl Frame {
    fn out_mut(&mut self) -> &mut String {
        match self {
            Frame::Code(code) => &mut code.out,
            Frame::Template(tpl) => &mut tpl.out,
        }
    }
}

enum Step {
    Keep(Frame),
    Enter(Frame, Frame),
    Finish(Frame),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stop {
    /// Regex literal; `slash` is the index of its opening `/`.
    Regex { slash: usize },
    BlockComment,
    LineComment,
    Quote(u8),
    Backtick,
    Close(u8),
    Comma,
    Require,
    Macro(MacroKind),
}

/// A stop found at `at`; the code chunk before it is `src[pos..at]`.
#[derive(Debug, Clone, Copy)]
struct Found {
    at: usize,
    stop: Stop,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNER
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) struct Scanner<'s, 'e> {
    src: &'s str,
    pos: usize,
    rewriter: Option<Rewriter<'e>>,
    resolver: Option<RequireResolver<'e>>,
    uses_this: bool,
    stack: Vec<Frame>,
}

impl<'s, 'e> Scanner<'s, 'e> {
    pub(crate) fn new(
        src: &'s str,
        rewriter: Option<Rewriter<'e>>,
        options: SliceOptions<'e>,
    ) -> Self {
        let rewriter = if options.rewrite { rewriter } else { None };
        Scanner {
            src,
            pos: 0,
            rewriter,
            resolver: options.require_resolver,
            uses_this: false,
            stack: vec![Frame::Code(CodeFrame::new(
                0,
                options.stop_on_comma,
                Role::Root,
            ))],
        }
    }

    pub(crate) fn run(mut self) -> Result<Slice<'s>> {
        loop {
            let frame = match self.stack.pop() {
                Some(frame) => frame,
                None => unreachable!("scanner stack emptied before the root frame finished"),
            };
            let step = match frame {
                Frame::Code(code) => self.step_code(code)?,
                Frame::Template(tpl) => self.step_template(tpl)?,
            };
            match step {
                Step::Keep(frame) => self.stack.push(frame),
                Step::Enter(parent, child) => {
                    self.stack.push(parent);
                    self.stack.push(child);
                }
                Step::Finish(done) => {
                    if let Some(result) = self.finish(done)? {
                        return Ok(Slice {
                            result,
                            rest: self.src.get(self.pos..).unwrap_or_default(),
                            uses_this: self.uses_this,
                        });
                    }
                }
            }
        }
    }

    fn step_code(&mut self, mut code: CodeFrame) -> Result<Step> {
        if self.pos >= self.src.len() {
            if code.depth > 0 {
                return Err(PreprocessError::UnterminatedRegion {
                    depth: code.depth,
                    excerpt: excerpt(&self.src[code.start..]),
                });
            }
            return Ok(Step::Finish(Frame::Code(code)));
        }

        let src = self.src;
        let found = self.find_stop(code.stop_on_comma);
        let at = found.map_or(src.len(), |f| f.at);
        let chunk = &src[self.pos..at];

        code.depth += count_open_brackets(chunk);
        if THIS_RE.is_match(chunk) {
            self.uses_this = true;
        }

        if let (Some(Found { stop: Stop::Macro(kind), .. }), Some(rw)) = (found, &self.rewriter) {
            // The chunk ends with `$name`; the engine takes over from `(`.
            let prefix = &chunk[..chunk.len() - kind.name().len() - 1];
            code.out.push_str(&rw.engine.rewrite_code(prefix));
            self.pos = at;
            let child = CodeFrame::new(at, kind == MacroKind::Assert, Role::MacroArgs(kind));
            return Ok(Step::Enter(Frame::Code(code), Frame::Code(child)));
        }

        match &self.rewriter {
            Some(rw) => code.out.push_str(&rw.engine.rewrite_code(chunk)),
            None => code.out.push_str(chunk),
        }
        self.pos = at;

        let Some(Found { stop, .. }) = found else {
            return Ok(Step::Keep(Frame::Code(code)));
        };

        // Commas only end the region at depth <= 1; a comma that starts a
        // regex literal is still that comma.
        let comma_active = code.stop_on_comma && code.depth <= 1;
        let stop = match stop {
            Stop::Regex { .. } if comma_active && src.as_bytes()[at] == b',' => Stop::Comma,
            Stop::Comma if !comma_active => {
                code.out.push(',');
                self.pos = at + 1;
                return Ok(Step::Keep(Frame::Code(code)));
            }
            other => other,
        };

        match stop {
            Stop::Regex { slash } => {
                if matches!(src.as_bytes()[at], b'(' | b'{') {
                    code.depth += 1;
                }
                let end = self.scan_regex(slash + 1)?;
                code.out.push_str(&src[at..end]);
                self.pos = end;
            }
            Stop::BlockComment => {
                let end = match src[at + 2..].find("*/") {
                    Some(i) => at + 2 + i + 2,
                    None => {
                        return Err(PreprocessError::UnterminatedComment {
                            excerpt: excerpt(&src[at..]),
                        })
                    }
                };
                code.out.push_str(&src[at..end]);
                self.pos = end;
            }
            Stop::LineComment => {
                let end = src[at..]
                    .find('\n')
                    .map_or(src.len(), |i| at + i + 1);
                code.out.push_str(&src[at..end]);
                self.pos = end;
            }
            Stop::Quote(quote) => {
                let end = self.scan_string(at, quote)?;
                code.out.push_str(&src[at..end]);
                self.pos = end;
            }
            Stop::Backtick => {
                self.pos = at + 1;
                let child = TemplateFrame {
                    start: at,
                    out: "`".to_string(),
                };
                return Ok(Step::Enter(Frame::Code(code), Frame::Template(child)));
            }
            Stop::Close(bracket) => {
                code.depth -= 1;
                code.out.push(bracket as char);
                self.pos = at + 1;
                if code.depth <= 0 {
                    return Ok(Step::Finish(Frame::Code(code)));
                }
            }
            Stop::Comma => {
                self.pos = at + 1;
                // A trailing comma before `)` closes the list like a bare `)`.
                match CLOSING_PAREN_RE.find(&src[self.pos..]) {
                    Some(m) => {
                        self.pos += m.end();
                        code.out.push(')');
                    }
                    None => code.out.push(','),
                }
                return Ok(Step::Finish(Frame::Code(code)));
            }
            Stop::Require => {
                let resolver = self.resolver.ok_or_else(|| PreprocessError::UnsupportedRequire {
                    reason: "Require is not supported here",
                    excerpt: excerpt(&src[at..]),
                })?;
                let caps = STATIC_REQUIRE_RE.captures(&src[at..]).ok_or_else(|| {
                    PreprocessError::UnsupportedRequire {
                        reason: "Require with dynamic specifier not supported here",
                        excerpt: excerpt(&src[at..]),
                    }
                })?;
                code.out.push_str(&resolver(&caps[1]));
                self.pos = at + caps[0].len();
            }
            // Not rewriting: `$name` stays plain code and `(` is scanned next.
            Stop::Macro(_) => {}
        }

        Ok(Step::Keep(Frame::Code(code)))
    }

    fn step_template(&mut self, mut tpl: TemplateFrame) -> Result<Step> {
        let unterminated = |tpl: &TemplateFrame, src: &str| PreprocessError::UnterminatedTemplate {
            excerpt: excerpt(&src[tpl.start..]),
        };
        let rest = &self.src[self.pos..];
        let Some(m) = TEMPLATE_STOP_RE.find(rest) else {
            return Err(unterminated(&tpl, self.src));
        };
        tpl.out.push_str(&rest[..m.start()]);
        let at = self.pos + m.start();

        match m.as_str() {
            "\\" => {
                let escaped = self.src[at + 1..]
                    .chars()
                    .next()
                    .ok_or_else(|| unterminated(&tpl, self.src))?;
                let end = at + 1 + escaped.len_utf8();
                tpl.out.push_str(&self.src[at..end]);
                self.pos = end;
                Ok(Step::Keep(Frame::Template(tpl)))
            }
            "`" => {
                tpl.out.push('`');
                self.pos = at + 1;
                Ok(Step::Finish(Frame::Template(tpl)))
            }
            _ => {
                // `${`: the interpolation frame starts at `{` and balances it.
                tpl.out.push('$');
                self.pos = at + 1;
                let child = CodeFrame::new(self.pos, false, Role::Interpolation);
                Ok(Step::Enter(Frame::Template(tpl), Frame::Code(child)))
            }
        }
    }

    /// Hands a finished frame's output to its parent. Returns the result once
    /// the root frame finishes.
    fn finish(&mut self, done: Frame) -> Result<Option<String>> {
        let code = match done {
            Frame::Template(tpl) => {
                self.append_to_parent(&tpl.out);
                return Ok(None);
            }
            Frame::Code(code) => code,
        };

        let text = match code.role {
            Role::Root => return Ok(Some(code.out)),
            Role::Interpolation => code.out,
            Role::MacroArgs(MacroKind::Assert) if code.out.ends_with(',') => {
                // `(condition,` : scan the remaining arguments as if `(` were open.
                let condition = code.out[1..code.out.len() - 1].to_string();
                let mut extra = CodeFrame::new(self.pos, false, Role::AssertExtra { condition });
                extra.out.push('(');
                extra.depth = 1;
                // The synthesized `(` is not in the buffer, so a regex literal
                // opening the extra arguments is consumed here.
                let src = self.src;
                let slash = self.pos + (src[self.pos..].len() - src[self.pos..].trim_start().len());
                let bytes = src.as_bytes();
                if bytes.get(slash) == Some(&b'/')
                    && !matches!(bytes.get(slash + 1), Some(b'/' | b'*') | None)
                {
                    let end = self.scan_regex(slash + 1)?;
                    extra.out.push_str(&src[self.pos..end]);
                    self.pos = end;
                }
                self.stack.push(Frame::Code(extra));
                return Ok(None);
            }
            Role::MacroArgs(kind) => self.expand_macro(kind, &code.out)?,
            Role::AssertExtra { condition } => {
                let extra = &code.out[1..code.out.len() - 1];
                self.engine()?.expand_assert(&condition, Some(extra))?
            }
        };
        self.append_to_parent(&text);
        Ok(None)
    }

    fn expand_macro(&mut self, kind: MacroKind, args: &str) -> Result<String> {
        let rw = self.rewriter.as_mut().ok_or_else(|| PreprocessError::MalformedMacro {
            invocation: format!("${}{}", kind.name(), args),
        })?;
        match kind {
            MacroKind::Debug => Ok(rw.engine.expand_debug(args)),
            MacroKind::Assert => rw.engine.expand_assert(&args[1..args.len() - 1], None),
            _ => rw.engine.expand_native(kind, args, rw.registry),
        }
    }

    fn engine(&self) -> Result<&'e ReplacementEngine> {
        self.rewriter
            .as_ref()
            .map(|rw| rw.engine)
            .ok_or_else(|| PreprocessError::syntax("macro expansion requires rewrite mode"))
    }

    fn append_to_parent(&mut self, text: &str) {
        if let Some(parent) = self.stack.last_mut() {
            parent.out_mut().push_str(text);
        }
    }

    /// Nearest stop at or after the cursor. `require(` preceded by `$` and
    /// macros glued to a preceding identifier are skipped.
    fn find_stop(&self, with_commas: bool) -> Option<Found> {
        let re: &Regex = if with_commas { &STOP_COMMA_RE } else { &STOP_RE };
        let bytes = self.src.as_bytes();
        let mut from = self.pos;

        while let Some(caps) = re.captures_at(self.src, from) {
            if let Some(token) = caps.name("regex") {
                return Some(Found {
                    at: token.start(),
                    stop: Stop::Regex { slash: token.end() },
                });
            }
            if let Some(m) = caps.name("block") {
                return Some(Found {
                    at: m.start(),
                    stop: Stop::BlockComment,
                });
            }
            if let Some(m) = caps.name("line") {
                return Some(Found {
                    at: m.start(),
                    stop: Stop::LineComment,
                });
            }
            if let Some(m) = caps.name("punct") {
                let c = bytes[m.start()];
                let stop = match c {
                    b'\'' | b'"' => Stop::Quote(c),
                    b'`' => Stop::Backtick,
                    b',' => Stop::Comma,
                    _ => Stop::Close(c),
                };
                return Some(Found { at: m.start(), stop });
            }
            if let Some(m) = caps.name("require") {
                if m.start() > 0 && bytes[m.start() - 1] == b'$' {
                    from = m.start() + 1;
                    continue;
                }
                return Some(Found {
                    at: m.start(),
                    stop: Stop::Require,
                });
            }
            if let Some(m) = caps.name("macro") {
                let dollar = m.start() - 1;
                let kind = MacroKind::from_name(m.as_str());
                match kind {
                    Some(kind) if dollar == 0 || !is_word_or_dollar(bytes[dollar - 1]) => {
                        return Some(Found {
                            at: m.end(),
                            stop: Stop::Macro(kind),
                        });
                    }
                    _ => {
                        from = m.start();
                        continue;
                    }
                }
            }
            break;
        }
        None
    }

    /// Index just past the closing quote of the string starting at `open`.
    fn scan_string(&self, open: usize, quote: u8) -> Result<usize> {
        let bytes = self.src.as_bytes();
        let mut i = open + 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b if b == quote => return Ok(i + 1),
                _ => i += 1,
            }
        }
        Err(PreprocessError::UnterminatedString {
            excerpt: excerpt(&self.src[open..]),
        })
    }

    /// Index just past the closing `/` of a regex body starting at `start`.
    /// Flags are left to the caller.
    fn scan_regex(&self, start: usize) -> Result<usize> {
        let bytes = self.src.as_bytes();
        let mut i = start;
        let mut in_class = false;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'\n' => break,
                b'[' => {
                    in_class = true;
                    i += 1;
                }
                b']' if in_class => {
                    in_class = false;
                    i += 1;
                }
                b'/' if !in_class => return Ok(i + 1),
                _ => i += 1,
            }
        }
        Err(PreprocessError::UnterminatedRegex {
            excerpt: excerpt(&self.src[start.saturating_sub(1)..]),
        })
    }
}

fn count_open_brackets(chunk: &str) -> i32 {
    chunk.bytes().filter(|b| matches!(b, b'(' | b'{')).count() as i32
}
