use shimmytwig::{compile, render_str, Config, Context, Error, Mapping, Template, Value};

// ── Edge cases around tags, scoping and error reporting ──

fn message(role: &str, content: &str) -> Value {
    let mut m = Mapping::new();
    m.insert("role".to_string(), role.into());
    m.insert("content".to_string(), content.into());
    Value::Mapping(m)
}

fn with_messages(messages: Vec<Value>) -> Context {
    Context::new().with("messages", messages)
}

#[test]
fn empty_messages_produces_empty_output() {
    let template = "{% for message in messages %}{{ message.content }}{% endfor %}";
    let rendered = render_str(template, &with_messages(vec![])).unwrap();
    assert_eq!(rendered, "");
}

#[test]
fn plain_text_template_no_tags() {
    assert_eq!(render_str("Hello, world!", &Context::new()).unwrap(), "Hello, world!");
    assert_eq!(render_str("", &Context::new()).unwrap(), "");
}

#[test]
fn context_var_outside_loop() {
    let mut ctx = Context::new();
    ctx.set_var("bos_token", "<s>");
    ctx.set_var("eos_token", "</s>");
    let rendered = render_str("{{ bos_token }}PROMPT{{ eos_token }}", &ctx).unwrap();
    assert_eq!(rendered, "<s>PROMPT</s>");
}

#[test]
fn dot_access_and_bracket_access_equivalent() {
    let ctx = with_messages(vec![message("user", "hi")]);
    let a = render_str("{% for message in messages %}{{ message.role }}{% endfor %}", &ctx).unwrap();
    let b = render_str("{% for message in messages %}{{ message['role'] }}{% endfor %}", &ctx).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, "user");
}

#[test]
fn loop_first_and_last_single_message() {
    let template = "{% for message in messages %}{% if loop.first %}F{% endif %}{% if loop.last %}L{% endif %}{% endfor %}";
    let rendered = render_str(template, &with_messages(vec![message("user", "x")])).unwrap();
    assert_eq!(rendered, "FL");
}

#[test]
fn loop_first_and_last_multiple_messages() {
    let template = "{% for message in messages %}{% if loop.first %}[{% endif %}{{ message.role }}{% if loop.last %}]{% endif %}{% endfor %}";
    let ctx = with_messages(vec![message("a", ""), message("b", ""), message("c", "")]);
    assert_eq!(render_str(template, &ctx).unwrap(), "[abc]");
}

#[test]
fn or_operator_in_condition() {
    let template = "{% for message in messages %}{% if message.role == 'user' or message.role == 'assistant' %}Y{% else %}N{% endif %}{% endfor %}";
    let ctx = with_messages(vec![message("system", ""), message("user", ""), message("assistant", "")]);
    assert_eq!(render_str(template, &ctx).unwrap(), "NYY");
}

#[test]
fn string_concat_multiple_parts() {
    let template = "{% for message in messages %}{{ 'A' ~ 'B' ~ 'C' ~ message.role ~ 'D' }}{% endfor %}";
    let ctx = with_messages(vec![message("x", "")]);
    assert_eq!(render_str(template, &ctx).unwrap(), "ABCxD");
}

#[test]
fn plus_is_numeric_not_concatenation() {
    assert_eq!(render_str("{{ '1' + '2' }}", &Context::new()).unwrap(), "3");
    assert_eq!(render_str("{{ 'a' + 'b' }}", &Context::new()).unwrap(), "NaN");
}

#[test]
fn elif_chain_inside_for() {
    let template = r#"{% for message in messages %}{% if message.role == 'user' %}U{% elif message.role == 'system' %}S{% elseif message.role == 'tool' %}T{% else %}O{% endif %}{% endfor %}"#;
    let ctx = with_messages(vec![
        message("user", ""),
        message("system", ""),
        message("tool", ""),
        message("other", ""),
    ]);
    assert_eq!(render_str(template, &ctx).unwrap(), "USTO");
}

#[test]
fn special_characters_are_not_escaped() {
    let template = "{% for message in messages %}{{ message.content }}{% endfor %}";
    let ctx = with_messages(vec![message("user", "Hello <world> & \"friends\"")]);
    assert_eq!(render_str(template, &ctx).unwrap(), "Hello <world> & \"friends\"");
}

#[test]
fn unicode_content() {
    let template = "{% for message in messages %}{{ message.content|upper }}{% endfor %}";
    let ctx = with_messages(vec![message("user", "こんにちは 🌍 abc")]);
    assert_eq!(render_str(template, &ctx).unwrap(), "こんにちは 🌍 ABC");
}

#[test]
fn flag_default_false_when_missing() {
    let template = "{% for message in messages %}{{ message.role }}{% if loop.last and add_generation_prompt %}PROMPT{% endif %}{% endfor %}";
    let ctx = with_messages(vec![message("user", "")]);
    assert_eq!(render_str(template, &ctx).unwrap(), "user");
}

#[test]
fn delimiters_inside_strings_do_not_close_tags() {
    let ctx = Context::new();
    assert_eq!(render_str(r#"{{ "a }} b" }}"#, &ctx).unwrap(), "a }} b");
    assert_eq!(render_str(r#"{{ '%}' }}{% if true %}y{% endif %}"#, &ctx).unwrap(), "%}y");
}

#[test]
fn comments_are_dropped() {
    let ctx = Context::new().with("x", 1);
    assert_eq!(render_str("a{# {{ x }} 'unbalanced #}b", &ctx).unwrap(), "ab");
}

#[test]
fn for_else_and_key_value() {
    let mut prices = Mapping::new();
    prices.insert("apple".to_string(), 3.into());
    prices.insert("pear".to_string(), 5.into());
    let ctx = Context::new().with("prices", prices).with("none", Vec::<Value>::new());

    assert_eq!(
        render_str("{% for k, v in prices %}{{ k }}={{ v }};{% endfor %}", &ctx).unwrap(),
        "apple=3;pear=5;"
    );
    assert_eq!(
        render_str("{% for x in none %}{{ x }}{% else %}empty{% endfor %}", &ctx).unwrap(),
        "empty"
    );
}

#[test]
fn block_set_captures_output() {
    let ctx = Context::new().with("name", "ann");
    let rendered = render_str("{% set greeting %}Hi {{ name|capitalize }}{% endset %}[{{ greeting }}]", &ctx).unwrap();
    assert_eq!(rendered, "[Hi Ann]");
}

#[test]
fn unknown_filter_fails_at_render() {
    let template = compile("{% if false %}{{ x|nope }}{% endif %}{{ y|nope }}").unwrap();
    assert_eq!(
        template.render(&Context::new()).unwrap_err(),
        Error::UnknownFilter("nope".into())
    );
}

#[test]
fn compile_errors() {
    assert!(matches!(compile("{{ 1 + }}"), Err(Error::Parse { .. })));
    assert!(matches!(compile("{{ 'open }}"), Err(Error::Lex { .. })));
    assert!(matches!(compile("{% endif %}"), Err(Error::TagMismatch { .. })));
    assert!(matches!(compile("{% for x in xs %}{% endif %}"), Err(Error::TagMismatch { .. })));
    assert!(matches!(compile("{% if x %}"), Err(Error::TagMismatch { .. })));
    assert!(matches!(compile("{% include 'x' %}"), Err(Error::Parse { .. })));
    assert!(compile("{% if x %}{% endif %}").is_ok());
}

#[test]
fn deeply_nested_expressions_fail_to_compile() {
    let parens = format!("{{{{ {}1{} }}}}", "(".repeat(10_000), ")".repeat(10_000));
    assert!(matches!(compile(&parens), Err(Error::Parse { .. })));

    let mappings = format!("{{{{ {}1{} }}}}", "{a: ".repeat(10_000), "}".repeat(10_000));
    assert!(matches!(compile(&mappings), Err(Error::Parse { .. })));

    let nested = format!("{{{{ {}1{} }}}}", "(".repeat(20), ")".repeat(20));
    assert_eq!(render_str(&nested, &Context::new()).unwrap(), "1");
    let strict = Config::new().with_max_depth(8);
    assert!(matches!(Template::compile_with(&nested, strict), Err(Error::Parse { .. })));
}

#[test]
fn mapping_literals_close_before_the_tag() {
    let ctx = Context::new();
    assert_eq!(render_str(r#"{{ {"a":1}}}"#, &ctx).unwrap(), "1");
    assert_eq!(render_str(r#"<{{ {"a": {"b": "deep"}}.a.b }}>"#, &ctx).unwrap(), "<deep>");
}

#[test]
fn iteration_budget_is_per_render() {
    let source = "{% for x in xs %}{% for y in xs %}.{% endfor %}{% endfor %}";
    let config = Config::new().with_max_iterations(20);
    let template = Template::compile_with(source, config).unwrap();

    let small = Context::new().with("xs", vec![1, 2, 3, 4]);
    assert_eq!(template.render(&small).unwrap().len(), 16);
    assert_eq!(template.render(&small).unwrap().len(), 16);

    let big = Context::new().with("xs", vec![1, 2, 3, 4, 5]);
    assert!(matches!(template.render(&big), Err(Error::Evaluation(_))));
}
