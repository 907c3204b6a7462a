use proptest::prelude::*;
use shimmytwig::value::format_number;
use shimmytwig::{render_str, Context, Value};

fn render(template: &str, ctx: &Context) -> String {
    render_str(template, ctx).unwrap()
}

fn mixed_item() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-1000i32..1000).prop_map(Value::from),
        "[a-z]{0,4}".prop_map(Value::from),
        (-1000i32..1000).prop_map(|n| Value::from(n.to_string())),
    ]
}

const KEYWORDS: [&str; 8] = ["true", "false", "null", "none", "and", "or", "not", "in"];

proptest! {
    #[test]
    fn arithmetic_matches_ieee(a in -1.0e9f64..1.0e9, b in -1.0e9f64..1.0e9) {
        let ctx = Context::new().with("a", a).with("b", b);
        prop_assert_eq!(render("{{ a + b }}", &ctx), format_number(a + b));
        prop_assert_eq!(render("{{ a - b }}", &ctx), format_number(a - b));
        prop_assert_eq!(render("{{ a * b }}", &ctx), format_number(a * b));
        prop_assert_eq!(render("{{ a < b }}", &ctx), (a < b).to_string());
    }

    #[test]
    fn number_formatting_round_trips(n in any::<f64>().prop_filter("finite", |n| n.is_finite())) {
        let text = format_number(n);
        prop_assert_eq!(text.parse::<f64>().unwrap(), n);
        prop_assert!(!text.contains(','));
    }

    #[test]
    fn dot_and_bracket_agree(key in "[a-z]{1,8}", value in "[a-z0-9 ]{0,12}") {
        prop_assume!(!KEYWORDS.contains(&key.as_str()));
        let mut object = serde_json::Map::new();
        object.insert(key.clone(), value.clone().into());
        let ctx = Context::from_json(serde_json::json!({ "o": object })).unwrap();
        let dot = render(&format!("{{{{ o.{key} }}}}"), &ctx);
        let bracket = render(&format!("{{{{ o[\"{key}\"] }}}}"), &ctx);
        prop_assert_eq!(&dot, &bracket);
        prop_assert_eq!(dot, value);
    }

    #[test]
    fn length_matches_key_count(entries in prop::collection::vec(("[a-z]{1,6}", -50i32..50), 0..12)) {
        let object: serde_json::Map<String, serde_json::Value> =
            entries.into_iter().map(|(k, v)| (k, v.into())).collect();
        let expected = object.len().to_string();
        let ctx = Context::from_json(serde_json::json!({ "m": object })).unwrap();
        prop_assert_eq!(render("{{ m|length }}", &ctx), render("{{ m|keys|length }}", &ctx));
        prop_assert_eq!(render("{{ m|length }}", &ctx), expected);
    }

    #[test]
    fn array_length_matches_key_count(items in prop::collection::vec(mixed_item(), 0..16)) {
        let expected = items.len().to_string();
        let ctx = Context::new().with("xs", items);
        prop_assert_eq!(render("{{ xs|length }}", &ctx), render("{{ xs|keys|length }}", &ctx));
        prop_assert_eq!(render("{{ xs|length }}", &ctx), expected);
    }

    #[test]
    fn sort_is_idempotent(items in prop::collection::vec(mixed_item(), 0..16)) {
        let ctx = Context::new().with("xs", items);
        let once = render("{{ xs|sort|json_encode }}", &ctx);
        let twice = render("{{ xs|sort|sort|json_encode }}", &ctx);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn json_encode_matches_serde(entries in prop::collection::vec(("[a-z]{1,6}", "[ -~]{0,8}"), 0..8)) {
        let object: serde_json::Map<String, serde_json::Value> =
            entries.into_iter().map(|(k, v)| (k, v.into())).collect();
        let json = serde_json::Value::Object(object);
        let ctx = Context::from_json(serde_json::json!({ "v": json.clone() })).unwrap();
        prop_assert_eq!(render("{{ v|json_encode }}", &ctx), serde_json::to_string(&json).unwrap());
    }

    #[test]
    fn text_without_tags_is_verbatim(text in "[^{]*") {
        prop_assert_eq!(render(&text, &Context::new()), text);
    }

    #[test]
    fn delimiters_inside_string_literals_are_inert(s in "[a-zA-Z0-9 {}%#<>|.,:-]*") {
        prop_assert_eq!(render(&format!("{{{{ \"{s}\" }}}}"), &Context::new()), s.clone());
        prop_assert_eq!(render(&format!("{{{{ '{s}' }}}}"), &Context::new()), s);
    }
}
