#![cfg(feature = "ast-json")]

use serde_json::json;
use stencil_lang::ast::{ArgsList, CmpOp, Expr, Instruction, MacroDef, Param, ParameterList, Template};
use stencil_lang::{Engine, MapResolver, Shared, Value};

const PAGE: &str = r#"{
    "name": "page",
    "source": "<#list items as item>${item}<#sep>, </#list>",
    "header": {"boolean_format": "Y,N"},
    "root": [
        {
            "kind": {
                "List": {
                    "sequence": {"kind": {"Ident": "items"}},
                    "var": "item",
                    "body": [
                        {"kind": {"Interpolation": {"kind": {"Ident": "item"}}}},
                        {
                            "kind": {
                                "If": [
                                    {
                                        "condition": {"kind": {"Ident": "item_has_next"}},
                                        "body": [{"kind": {"Text": ", "}}]
                                    }
                                ]
                            }
                        }
                    ],
                    "otherwise": [{"kind": {"Text": "none"}}]
                }
            }
        },
        {"kind": {"Text": " "}},
        {"kind": {"Interpolation": {"kind": {"Boolean": true}}}}
    ]
}"#;

#[test]
fn test_render_template_loaded_from_json() {
    let template = Shared::new(Template::from_json(PAGE).unwrap());
    let engine = Engine::default();

    let rendered = engine
        .render_to_string(&template, Value::from(json!({"items": ["a", "b", "c"]})))
        .unwrap();
    assert_eq!(rendered, "a, b, c Y");

    let rendered = engine
        .render_to_string(&template, Value::from(json!({"items": []})))
        .unwrap();
    assert_eq!(rendered, "none Y");
}

#[test]
fn test_constructed_tree_round_trips() {
    let template = Template::new(
        "greet",
        vec![
            Instruction::macro_def(MacroDef::new(
                "greet",
                ParameterList::new(vec![
                    Param::new("name"),
                    Param::with_default("greeting", Expr::string("Hello")),
                ])
                .with_catch_all("rest"),
                vec![Instruction::if_else(
                    Expr::compare(CmpOp::Ne, Expr::ident("name"), Expr::string("")),
                    vec![Instruction::interpolation(Expr::ident("greeting"))],
                    vec![],
                )],
            )),
            Instruction::macro_call(
                Expr::ident("greet"),
                ArgsList::named(vec![("name", Expr::number(1.5))]),
            ),
        ],
    )
    .with_header("locale", "en_US");

    let json = template.to_json().unwrap();
    assert!(json.contains("\"MacroDef\""));
    assert!(json.contains("\"rest\""));

    let restored = Template::from_json(&json).unwrap();
    assert_eq!(restored, template);
}

#[test]
fn test_included_template_from_json() {
    let footer = Template::from_json(
        r#"{"name": "site/footer", "root": [{"kind": {"Text": "(c)"}}]}"#,
    )
    .unwrap();
    let mut engine = Engine::default();
    engine.set_resolver(Shared::new(MapResolver::new().with(footer)));

    let page = Template::from_json(
        r#"{"name": "site/page", "root": [{"kind": {"Include": {"kind": {"String": "footer"}}}}]}"#,
    )
    .unwrap();

    assert_eq!(
        engine.render_to_string(&Shared::new(page), Value::Null).unwrap(),
        "(c)"
    );
}

#[test]
fn test_invalid_json_is_rejected() {
    assert!(Template::from_json(r#"{"root": [{"kind": {"Nope": 1}}]}"#).is_err());
}
