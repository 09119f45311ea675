#[cfg(test)]
mod tests {
    use crate::context::GenerationContext;
    use crate::error::PreprocessError;
    use crate::options::PreprocessOptions;
    use crate::registry::{CallKind, NativeCall, SourceFiles};
    use pretty_assertions::assert_eq;

    fn ctx() -> GenerationContext {
        GenerationContext::new(
            PreprocessOptions::default(),
            SourceFiles::from_paths([
                "/repo/src/bun.js/math.zig",
                "/repo/src/bun.js/bindings/Process.cpp",
            ]),
        )
        .unwrap()
    }

    #[test]
    fn test_zig_call_end_to_end() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source(r#"let y = $zig("math.zig", "add")(1,2);"#)
            .unwrap();
        assert_eq!(out, "let y = __intrinsic__lazy(0)(1,2);");

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.count, 1);
        assert_eq!(
            snapshot.calls,
            vec![NativeCall {
                id: 0,
                kind: CallKind::Zig,
                filename: "/repo/src/bun.js/math.zig".to_string(),
                symbol: "add".to_string(),
                wrapped: false,
            }]
        );
    }

    #[test]
    fn test_cpp_call_keeps_filename() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source("kill = $cpp('Process.cpp', 'Bun::kill');")
            .unwrap();
        assert_eq!(out, "kill = __intrinsic__lazy(0);");
        assert_eq!(ctx.registry().calls()[0].filename, "Process.cpp");
        assert_eq!(ctx.registry().calls()[0].kind, CallKind::Cpp);
    }

    #[test]
    fn test_debug_expansion() {
        let mut ctx = ctx();
        let out = ctx.rewrite_source(r#"$debug("x", $foo);"#).unwrap();
        assert_eq!(
            out,
            r#"(IS_BUN_DEVELOPMENT?$debug_log("x", __intrinsic__foo):void 0);"#
        );
    }

    #[test]
    fn test_assert_with_message() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source(r#"$assert($isObject(x), "bad");"#)
            .unwrap();
        assert_eq!(
            out,
            r#"(IS_BUN_DEVELOPMENT?$assert(__intrinsic__isObject(x),"$isObject(x)", "bad"):void 0);"#
        );
    }

    #[test]
    fn test_assert_trailing_comma_matches_plain() {
        let mut ctx = ctx();
        let plain = ctx.rewrite_source("$assert(a > b);").unwrap();
        let trailing = ctx.rewrite_source("$assert(a > b,);").unwrap();
        assert_eq!(plain, r#"(IS_BUN_DEVELOPMENT?$assert(a > b,"a > b"):void 0);"#);
        assert_eq!(trailing, plain);
    }

    #[test]
    fn test_assert_message_may_start_with_regex() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source(r#"$assert(x, /\)/.test(s)); done();"#)
            .unwrap();
        assert_eq!(
            out,
            r#"(IS_BUN_DEVELOPMENT?$assert(x,"x", /\)/.test(s)):void 0); done();"#
        );

        let out = ctx.rewrite_source("$assert(x,/[)]/g);").unwrap();
        assert_eq!(out, r#"(IS_BUN_DEVELOPMENT?$assert(x,"x", /[)]/g):void 0);"#);
    }

    #[test]
    fn test_empty_assert_is_rejected() {
        let err = ctx().rewrite_source("$assert();").unwrap_err();
        assert!(matches!(err, PreprocessError::MalformedMacro { .. }));
    }

    #[test]
    fn test_nested_macro_in_debug() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source(r#"$debug($zig("math.zig", "add")());"#)
            .unwrap();
        assert_eq!(
            out,
            "(IS_BUN_DEVELOPMENT?$debug_log(__intrinsic__lazy(0)()):void 0);"
        );
    }

    #[test]
    fn test_macro_inside_template_interpolation() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source(r#"s = `$foo ${$zig("math.zig", "add")}`;"#)
            .unwrap();
        assert_eq!(out, "s = `$foo ${__intrinsic__lazy(0)}`;");
    }

    #[test]
    fn test_code_rules_skip_literals() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source(r#"throw new TypeError("throw new TypeError $foo");"#)
            .unwrap();
        assert_eq!(out, r#"__intrinsic__throwTypeError("throw new TypeError $foo");"#);

        let out = ctx.rewrite_source("x = /$foo/;").unwrap();
        assert_eq!(out, "x = /$foo/;");
    }

    #[test]
    fn test_global_rules_reach_comments() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source("// notImplementedIssue(12, \"x\")\n")
            .unwrap();
        assert_eq!(
            out,
            "// new TypeError(`${\"x\"} is not implemented yet. See https://github.com/oven-sh/bun/issues/12`)\n"
        );
    }

    #[test]
    fn test_well_known_symbol_member() {
        let mut ctx = ctx();
        let out = ctx.rewrite_source("it = o.[$$iterator]();").unwrap();
        assert_eq!(out, "it = o[__intrinsic__iteratorSymbol]();");
    }

    #[test]
    fn test_dedup_across_files() {
        let mut ctx = ctx();
        let a = ctx
            .rewrite_source(r#"a = $zig("math.zig", "add");"#)
            .unwrap();
        let b = ctx
            .rewrite_source(r#"b = $zig('math.zig', 'add') + $zig("math.zig", "sub");"#)
            .unwrap();
        assert_eq!(a, "a = __intrinsic__lazy(0);");
        assert_eq!(b, "b = __intrinsic__lazy(0) + __intrinsic__lazy(1);");
        assert_eq!(ctx.snapshot().count, 2);
    }

    #[test]
    fn test_new_zig_function_records_wrapper() {
        let mut ctx = ctx();
        let out = ctx
            .rewrite_source(
                r#"const f = $newZigFunction("math.zig", "Math.add", 2); g = $zig("math.zig", "Math.add");"#,
            )
            .unwrap();
        assert_eq!(out, "const f = __intrinsic__lazy(0); g = __intrinsic__lazy(1);");

        let registry = ctx.into_registry();
        let wrapped = &registry.calls()[0];
        assert!(wrapped.wrapped);
        assert_eq!(wrapped.kind, CallKind::Cpp);
        assert_eq!(wrapped.symbol, "js2native_wrap_Math_add");

        let wrapper = &registry.wrappers()[0];
        assert_eq!(wrapper.kind, CallKind::Zig);
        assert_eq!(wrapper.display_name, "add");
        assert_eq!(wrapper.arity, 2);
        assert_eq!(wrapper.filename, "/repo/src/bun.js/math.zig");
        assert!(!registry.calls()[1].wrapped);
    }

    #[test]
    fn test_dynamic_macro_arguments_fail() {
        let err = ctx().rewrite_source(r#"$zig(name, "f");"#).unwrap_err();
        assert!(matches!(err, PreprocessError::MalformedMacro { .. }));
        assert!(err.to_string().contains(r#"$zig(name, "f")"#));
    }

    #[test]
    fn test_wrong_arity_fails() {
        let err = ctx()
            .rewrite_source(r#"$cpp("Process.cpp");"#)
            .unwrap_err();
        assert!(matches!(err, PreprocessError::MacroArity { .. }));
    }

    #[test]
    fn test_missing_native_file_fails() {
        let err = ctx()
            .rewrite_source(r#"$zig("nope.zig", "f");"#)
            .unwrap_err();
        assert!(err.to_string().contains("nope.zig"));

        let err = ctx()
            .rewrite_source(r#"$zig("Process.cpp", "f");"#)
            .unwrap_err();
        assert!(matches!(err, PreprocessError::WrongNativeExtension { .. }));
    }

    #[test]
    fn test_require_resolver_in_rewrite_mode() {
        let mut ctx = ctx();
        let resolver = |spec: &str| format!("__intrinsic__requireMap.get(\"{}\")", spec);
        let out = ctx
            .rewrite_source_with("const fs = require(\"fs\");", Some(&resolver))
            .unwrap();
        assert_eq!(out, "const fs = __intrinsic__requireMap.get(\"fs\");");
    }
}
