//! End-to-end generation tests
//!
//! Resolution scenarios from raw tokens to serialized CSS: static and
//! dynamic rules, merging, layers, safelist/blocklist, scoping and
//! preflight ordering.

use strata_engine::{
    BlocklistRule, Config, CssValue, CssValues, GenerateOptions, GenerateResult, Generator,
    MatchError, ParentWrapper, Preflight, ResolveError, Rule, RuleMeta, Variant, VariantHandler,
    VariantMatch, css_entries,
};

fn hover_variant() -> Variant {
    Variant::new("hover", |input: &str, _| {
        input.strip_prefix("hover:").map(|rest| {
            VariantMatch::Handler(
                VariantHandler::new(rest)
                    .with_selector(|selector, _| Some(format!("{selector}:hover"))),
            )
        })
    })
}

fn dark_variant() -> Variant {
    Variant::new("dark", |input: &str, _| {
        input.strip_prefix("dark:").map(|rest| {
            VariantMatch::Handler(VariantHandler::new(rest).with_parent(
                ParentWrapper::with_order("@media (prefers-color-scheme: dark)", 1),
            ))
        })
    })
}

fn base_config() -> Config {
    let mut config = Config::default();
    config
        .rules
        .push(Rule::new("m-1", css_entries(&[("margin", "0.25rem")])));
    config
        .rules
        .push(Rule::new("p-1", css_entries(&[("padding", "0.25rem")])));
    config
        .rules
        .push(Rule::new("text-red", css_entries(&[("color", "red")])));
    config.rules.push(
        Rule::dynamic(r"^w-(\d+)$", |m, _| {
            let n: f32 = m.group(1)?.parse().ok()?;
            let width = format!("{}rem", n * 0.25);
            Some(css_entries(&[("width", width.as_str())]).into())
        })
        .expect("pattern"),
    );
    config.variants.push(hover_variant());
    config.variants.push(dark_variant());
    config
}

fn generate(config: Config, tokens: &[&str]) -> GenerateResult {
    generate_with(config, tokens, &GenerateOptions::default())
}

fn generate_with(config: Config, tokens: &[&str], options: &GenerateOptions) -> GenerateResult {
    let engine = Generator::with_config(config);
    smol::block_on(engine.generate(tokens.iter().copied(), options))
}

#[test]
fn test_static_rule() {
    let result = generate(base_config(), &["m-1"]);
    assert_eq!(result.css, "/* layer: default */\n.m-1{margin:0.25rem;}");
    assert!(result.matched.contains("m-1"));
}

#[test]
fn test_dynamic_rule() {
    let result = generate(base_config(), &["w-4"]);
    assert_eq!(result.css, "/* layer: default */\n.w-4{width:1rem;}");
}

#[test]
fn test_hover_variant_wraps_selector() {
    let result = generate(base_config(), &["hover:text-red"]);
    assert_eq!(
        result.css,
        "/* layer: default */\n.hover\\:text-red:hover{color:red;}"
    );
    assert!(result.matched.contains("hover:text-red"));
}

#[test]
fn test_parent_wrapper_media_query() {
    let result = generate(base_config(), &["dark:m-1"]);
    assert_eq!(
        result.css,
        "/* layer: default */\n@media (prefers-color-scheme: dark){\n.dark\\:m-1{margin:0.25rem;}\n}"
    );
}

#[test]
fn test_merge_identical_bodies() {
    let mut config = Config::default();
    config
        .rules
        .push(Rule::new("a", css_entries(&[("color", "red")])));
    config
        .rules
        .push(Rule::new("b", css_entries(&[("color", "red")])));
    let options = GenerateOptions {
        minify: true,
        ..Default::default()
    };
    let result = generate_with(config, &["a", "b"], &options);
    assert_eq!(result.css, ".a,.b{color:red;}");
}

#[test]
fn test_no_merge_meta_keeps_rules_apart() {
    let mut config = Config::default();
    config
        .rules
        .push(Rule::new("a", css_entries(&[("color", "red")])));
    config.rules.push(
        Rule::new("b", css_entries(&[("color", "red")])).with_meta(RuleMeta {
            no_merge: true,
            ..Default::default()
        }),
    );
    let options = GenerateOptions {
        minify: true,
        ..Default::default()
    };
    let result = generate_with(config, &["a", "b"], &options);
    assert_eq!(result.css, ".a{color:red;}.b{color:red;}");
}

#[test]
fn test_merge_disabled_by_config() {
    let mut config = Config::default();
    config.merge_selectors = false;
    config
        .rules
        .push(Rule::new("a", css_entries(&[("color", "red")])));
    config
        .rules
        .push(Rule::new("b", css_entries(&[("color", "red")])));
    let options = GenerateOptions {
        minify: true,
        ..Default::default()
    };
    let result = generate_with(config, &["a", "b"], &options);
    assert_eq!(result.css, ".a{color:red;}.b{color:red;}");
}

#[test]
fn test_unmatched_token_is_not_an_error() {
    let result = generate(base_config(), &["nope"]);
    assert_eq!(result.css, "");
    assert!(!result.matched.contains("nope"));
    assert!(result.failures.is_empty());
}

#[test]
fn test_blocklist_rejects_before_matching() {
    let mut config = base_config();
    config.blocklist.push(BlocklistRule::exact("m-1"));
    config
        .blocklist
        .push(BlocklistRule::pattern(r"^legacy-").expect("pattern"));
    let result = generate(config, &["m-1", "legacy-w-4", "p-1"]);
    assert!(!result.css.contains(".m-1{"));
    assert!(!result.matched.contains("m-1"));
    assert!(result.css.contains(".p-1{"));
}

#[test]
fn test_safelist_included_without_extraction() {
    let mut config = base_config();
    config.safelist.push("p-1".to_string());
    let result = generate(config, &[]);
    assert!(result.css.contains(".p-1{padding:0.25rem;}"));
    assert!(result.matched.contains("p-1"));
}

#[test]
fn test_safelist_can_be_disabled() {
    let mut config = base_config();
    config.safelist.push("p-1".to_string());
    let options = GenerateOptions {
        safelist: false,
        ..Default::default()
    };
    let result = generate_with(config, &[], &options);
    assert_eq!(result.css, "");
}

#[test]
fn test_determinism() {
    let engine = Generator::with_config(base_config());
    let options = GenerateOptions::default();
    let tokens = ["hover:text-red", "w-4", "m-1", "dark:p-1"];
    let first = smol::block_on(engine.generate(tokens, &options));
    let second = smol::block_on(engine.generate(tokens, &options));
    assert_eq!(first.css, second.css);

    // fresh engine, same configuration shape
    let third = generate(base_config(), &tokens);
    assert_eq!(first.css, third.css);
}

#[test]
fn test_output_independent_of_token_order() {
    let first = generate(base_config(), &["m-1", "w-4"]);
    let second = generate(base_config(), &["w-4", "m-1"]);
    assert_eq!(first.css, second.css);
}

#[test]
fn test_layer_ordering_and_accessors() {
    let mut config = base_config();
    config.rules.push(
        Rule::new("btn-base", css_entries(&[("cursor", "pointer")]))
            .with_meta(RuleMeta::layer("components")),
    );
    config.layers.insert("components".to_string(), -1);
    let result = generate(config, &["btn-base", "m-1"]);

    assert_eq!(result.layers, vec!["components", "default"]);
    let components = result.get_layer("components").expect("components layer");
    assert!(components.contains(".btn-base{cursor:pointer;}"));
    assert!(result.get_layer("nope").is_none());

    let subset = result.get_layers(None, Some(&["components"]));
    assert!(!subset.contains("btn-base"));
    assert!(subset.contains(".m-1"));

    // components sorts ahead of default in the combined output
    let components_at = result.css.find("btn-base").expect("present");
    let default_at = result.css.find(".m-1").expect("present");
    assert!(components_at < default_at);
}

#[test]
fn test_custom_layer_sorter() {
    let mut config = base_config();
    config.rules.push(
        Rule::new("btn-base", css_entries(&[("cursor", "pointer")]))
            .with_meta(RuleMeta::layer("components")),
    );
    config.sort_layers = Some(Box::new(|mut layers| {
        layers.reverse();
        layers
    }));
    let result = generate(config, &["btn-base", "m-1"]);
    assert_eq!(result.layers, vec!["default", "components"]);
}

#[test]
fn test_raw_css_rule_emits_body_bare() {
    let mut config = base_config();
    config.rules.push(
        Rule::dynamic(r"^keyframes-spin$", |_, _| {
            Some("@keyframes spin{to{transform:rotate(360deg)}}".into())
        })
        .expect("pattern"),
    );
    let result = generate(config, &["keyframes-spin"]);
    assert_eq!(
        result.css,
        "/* layer: default */\n@keyframes spin{to{transform:rotate(360deg)}}"
    );
}

#[test]
fn test_value_groups_fan_out() {
    let mut config = Config::default();
    config.rules.push(
        Rule::dynamic(r"^divide-x$", |_, _| {
            Some(CssValues::Groups(vec![
                CssValue::Entries(css_entries(&[("border-left-width", "1px")])),
                CssValue::Entries(css_entries(&[("border-right-width", "0")])),
            ]))
        })
        .expect("pattern"),
    );
    let options = GenerateOptions {
        minify: true,
        ..Default::default()
    };
    let result = generate_with(config, &["divide-x"], &options);
    assert_eq!(
        result.css,
        ".divide-x{border-left-width:1px;}.divide-x{border-right-width:0;}"
    );
}

#[test]
fn test_empty_result_falls_through_to_later_rules() {
    let mut config = Config::default();
    config.rules.push(
        Rule::dynamic(r"^x-(\d+)$", |_, _| Some(CssValues::Groups(Vec::new())))
            .expect("pattern"),
    );
    config.rules.push(
        Rule::dynamic(r"^x-(\d+)$", |_, _| {
            Some(css_entries(&[("order", "2")]).into())
        })
        .expect("pattern"),
    );
    let result = generate(config, &["x-1"]);
    assert!(result.css.contains(".x-1{order:2;}"));
}

#[test]
fn test_first_defined_result_wins() {
    let mut config = Config::default();
    config.rules.push(
        Rule::dynamic(r"^z-(\d+)$", |m, _| {
            let z = m.group(1)?.to_string();
            Some(css_entries(&[("z-index", z.as_str())]).into())
        })
        .expect("pattern"),
    );
    config.rules.push(
        Rule::dynamic(r"^z-(\d+)$", |_, _| {
            Some(css_entries(&[("z-index", "999")]).into())
        })
        .expect("pattern"),
    );
    let result = generate(config, &["z-5"]);
    assert!(result.css.contains(".z-5{z-index:5;}"));
    assert!(!result.css.contains("999"));
}

#[test]
fn test_matcher_failure_is_local_to_its_token() {
    let mut config = base_config();
    config.rules.push(
        Rule::dynamic_async(
            r"^boom$",
            Box::new(|_, _| {
                Box::pin(std::future::ready(Err(MatchError("exploded".to_string()))))
            }),
        )
        .expect("pattern"),
    );
    let result = generate(config, &["boom", "m-1"]);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].token, "boom");
    assert!(matches!(
        result.failures[0].error,
        ResolveError::Matcher { .. }
    ));
    assert!(result.css.contains(".m-1{margin:0.25rem;}"));
}

#[test]
fn test_async_matcher_is_awaited() {
    let mut config = Config::default();
    config.rules.push(
        Rule::dynamic_async(
            r"^async-(\w+)$",
            Box::new(|m, _| {
                Box::pin(async move {
                    let value = m.group(1).unwrap_or("none").to_string();
                    Ok(Some(css_entries(&[("content", value.as_str())]).into()))
                })
            }),
        )
        .expect("pattern"),
    );
    let result = generate(config, &["async-ready"]);
    assert!(result.css.contains(".async-ready{content:ready;}"));
}

#[test]
fn test_minify_drops_newlines_and_marks() {
    let options = GenerateOptions {
        minify: true,
        ..Default::default()
    };
    let result = generate_with(base_config(), &["m-1", "w-4"], &options);
    assert_eq!(result.css, ".m-1{margin:0.25rem;}.w-4{width:1rem;}");
}

#[test]
fn test_scope_prefixes_selectors() {
    let options = GenerateOptions {
        scope: Some(".card".to_string()),
        ..Default::default()
    };
    let result = generate_with(base_config(), &["m-1"], &options);
    assert!(result.css.contains(".card .m-1{margin:0.25rem;}"));
}

#[test]
fn test_scope_does_not_leak_across_batches() {
    let engine = Generator::with_config(base_config());
    let scoped = GenerateOptions {
        scope: Some(".card".to_string()),
        ..Default::default()
    };
    let first = smol::block_on(engine.generate(["m-1"], &scoped));
    assert!(first.css.contains(".card .m-1"));
    let second = smol::block_on(engine.generate(["m-1"], &GenerateOptions::default()));
    assert!(!second.css.contains(".card"));
}

#[test]
fn test_generate_source_splits_on_whitespace() {
    let engine = Generator::with_config(base_config());
    let result = smol::block_on(
        engine.generate_source("m-1\n  w-4\tunknown", &GenerateOptions::default()),
    );
    assert!(result.matched.contains("m-1"));
    assert!(result.matched.contains("w-4"));
    assert!(!result.matched.contains("unknown"));
}

#[test]
fn test_preflight_renders_ahead_of_utilities() {
    let mut config = base_config();
    config
        .preflights
        .push(Preflight::new("*{box-sizing:border-box;}"));
    let result = generate(config, &["m-1"]);
    assert_eq!(
        result.css,
        "/* layer: default */\n*{box-sizing:border-box;}\n.m-1{margin:0.25rem;}"
    );
}

#[test]
fn test_preflight_layer_without_utilities_still_renders() {
    let mut config = base_config();
    config
        .preflights
        .push(Preflight::new("html{line-height:1.5;}").with_layer("base"));
    config.layers.insert("base".to_string(), -10);
    let result = generate(config, &["m-1"]);
    assert_eq!(result.layers, vec!["base", "default"]);
    assert_eq!(
        result.get_layer("base"),
        Some("/* layer: base */\nhtml{line-height:1.5;}")
    );
}

#[test]
fn test_preflights_can_be_disabled() {
    let mut config = base_config();
    config
        .preflights
        .push(Preflight::new("*{box-sizing:border-box;}"));
    let options = GenerateOptions {
        preflights: false,
        ..Default::default()
    };
    let result = generate_with(config, &["m-1"], &options);
    assert!(!result.css.contains("box-sizing"));
}

#[test]
fn test_parse_token_bypasses_serializer() {
    let engine = Generator::with_config(base_config());
    let utils = smol::block_on(engine.parse_token("hover:m-1", None))
        .expect("no failure")
        .expect("matched");
    assert_eq!(utils.len(), 1);
    assert_eq!(utils[0].selector.as_deref(), Some(".hover\\:m-1:hover"));
    assert_eq!(utils[0].body, "margin:0.25rem;");
}

#[test]
fn test_parse_token_alias_placeholder() {
    let engine = Generator::with_config(base_config());
    let utils = smol::block_on(engine.parse_token("m-1", Some("placeholder")))
        .expect("no failure")
        .expect("matched");
    assert_eq!(utils[0].selector.as_deref(), Some(".placeholder"));
    assert_eq!(utils[0].body, "margin:0.25rem;");
}
