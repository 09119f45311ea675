#[cfg(test)]
mod tests {
    use crate::error::PreprocessError;
    use crate::scanner::{slice_source, SliceOptions};
    use pretty_assertions::assert_eq;

    fn slice(src: &str) -> (String, String) {
        let slice = slice_source(src, SliceOptions::default()).unwrap();
        (slice.result, slice.rest.to_string())
    }

    #[test]
    fn test_balanced_body_and_rest() {
        let (result, rest) = slice("{ a(); b; } rest");
        assert_eq!(result, "{ a(); b; }");
        assert_eq!(rest, " rest");
    }

    #[test]
    fn test_region_ends_when_depth_returns_to_zero() {
        let (result, rest) = slice("a(b), c) d");
        assert_eq!(result, "a(b)");
        assert_eq!(rest, ", c) d");

        let (result, rest) = slice("x; }, y");
        assert_eq!(result, "x; }");
        assert_eq!(rest, ", y");
    }

    #[test]
    fn test_division_is_not_a_regex() {
        assert_eq!(slice("{a/b/g;}").0, "{a/b/g;}");

        let src = "{ n = x / y; z = (w) / 2 }";
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_regex_after_return() {
        let (result, rest) = slice("{ return /ab}c/g; } tail");
        assert_eq!(result, "{ return /ab}c/g; }");
        assert_eq!(rest, " tail");
    }

    #[test]
    fn test_regex_containing_close_brace() {
        let src = "{ let r = /}/g; }";
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_regex_character_class_hides_slash() {
        let src = "{ r = /[/}]x/; }";
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_regex_as_first_argument() {
        let (result, rest) = slice(r"(/\)/)rest");
        assert_eq!(result, r"(/\)/)");
        assert_eq!(rest, "rest");
    }

    #[test]
    fn test_strings_hide_brackets() {
        let src = r#"{ a = '}'; b = "\"}"; }"#;
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_comments_hide_brackets() {
        let src = "{ // }\n /* } */ }";
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_template_interpolation() {
        let src = "{ s = `x${f(1,2)}y`; }";
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_nested_templates() {
        let src = "{ s = `a${`b${c}`}`; } after";
        let (result, rest) = slice(src);
        assert_eq!(result, "{ s = `a${`b${c}`}`; }");
        assert_eq!(rest, " after");
    }

    #[test]
    fn test_template_escapes() {
        let src = "{ s = `\\`}\\${x}`; }";
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let depth = 5000;
        let src = format!("{}x{}", "`${".repeat(depth), "}`".repeat(depth));
        assert_eq!(slice(&src).0, src);

        let parens = format!("{}{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(slice(&parens).0, parens);
    }

    #[test]
    fn test_macros_are_kept_without_rewrite() {
        let src = "{ $debug(x); a$zig(y) }";
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_unterminated_string() {
        let err = slice_source("{ 'abc", SliceOptions::default()).unwrap_err();
        assert!(matches!(err, PreprocessError::UnterminatedString { .. }));
        assert!(err.to_string().contains("'abc"));
    }

    #[test]
    fn test_unterminated_region() {
        let err = slice_source("{ a(", SliceOptions::default()).unwrap_err();
        assert!(matches!(err, PreprocessError::UnterminatedRegion { depth: 2, .. }));
    }

    #[test]
    fn test_regex_cannot_span_lines() {
        let err = slice_source("{ x = /abc\n/ }", SliceOptions::default()).unwrap_err();
        assert!(matches!(err, PreprocessError::UnterminatedRegex { .. }));
    }

    #[test]
    fn test_unterminated_template_and_comment() {
        let err = slice_source("{ `abc", SliceOptions::default()).unwrap_err();
        assert!(matches!(err, PreprocessError::UnterminatedTemplate { .. }));

        let err = slice_source("{ /* abc", SliceOptions::default()).unwrap_err();
        assert!(matches!(err, PreprocessError::UnterminatedComment { .. }));
    }

    #[test]
    fn test_error_excerpt_is_truncated() {
        let src = format!("{{ '{}", "a".repeat(300));
        let err = slice_source(&src, SliceOptions::default()).unwrap_err();
        match err {
            PreprocessError::UnterminatedString { excerpt } => assert_eq!(excerpt.len(), 100),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_static_require_is_resolved() {
        let resolver = |spec: &str| format!("__intrinsic__requireMap.get(\"{}\")", spec);
        let options = SliceOptions::default().with_resolver(&resolver);
        let slice = slice_source("{ const fs = require(\"node:fs\"); }", options).unwrap();
        assert_eq!(
            slice.result,
            "{ const fs = __intrinsic__requireMap.get(\"node:fs\"); }"
        );
    }

    #[test]
    fn test_require_without_resolver() {
        let err = slice_source("{ require('fs') }", SliceOptions::default()).unwrap_err();
        assert!(matches!(err, PreprocessError::UnsupportedRequire { .. }));
        assert!(err.to_string().starts_with("Require is not supported here"));
    }

    #[test]
    fn test_dynamic_require() {
        let resolver = |spec: &str| spec.to_string();
        let options = SliceOptions::default().with_resolver(&resolver);
        let err = slice_source("{ require(name) }", options).unwrap_err();
        assert!(err
            .to_string()
            .contains("Require with dynamic specifier not supported here"));
    }

    #[test]
    fn test_prefixed_require_is_plain_code() {
        let src = "{ $require(x) }";
        assert_eq!(slice(src).0, src);
    }

    #[test]
    fn test_stop_on_comma() {
        let options = SliceOptions::default().stop_on_comma();
        let slice = slice_source("(x > 0, \"msg\")", options).unwrap();
        assert_eq!(slice.result, "(x > 0,");
        assert_eq!(slice.rest, " \"msg\")");
    }

    #[test]
    fn test_nested_comma_does_not_stop() {
        let options = SliceOptions::default().stop_on_comma();
        let slice = slice_source("(f(a, b), c)", options).unwrap();
        assert_eq!(slice.result, "(f(a, b),");
        assert_eq!(slice.rest, " c)");
    }

    #[test]
    fn test_trailing_comma_closes_list() {
        let options = SliceOptions::default().stop_on_comma();
        let slice = slice_source("(x, )rest", options).unwrap();
        assert_eq!(slice.result, "(x)");
        assert_eq!(slice.rest, "rest");
    }

    #[test]
    fn test_uses_this() {
        let options = SliceOptions::default();
        assert!(slice_source("{ return this.x; }", options).unwrap().uses_this);
        assert!(!slice_source("{ s = 'this'; }", options).unwrap().uses_this);
        assert!(!slice_source("{ thisArg(); }", options).unwrap().uses_this);
    }
}
