use std::any::Any;
use std::sync::LazyLock;

use rstest::{fixture, rstest};
use serde_json::json;
use stencil_lang::ast::{
    ArgsList, ArithOp, AssignScope, CmpOp, Expr, ExprKind, InstrKind, Instruction, MacroDef,
    Param, ParameterList, RangeBound, Segment, SpecialVar, Template,
};
use stencil_lang::{
    Engine, HostClass, HostObject, MapResolver, ParamType, Primitive, RuntimeError, Shared,
    Signature, Value,
};

#[fixture]
fn engine() -> Engine {
    Engine::default()
}

fn render(engine: &Engine, root: Vec<Instruction>, data: serde_json::Value) -> Result<String, RuntimeError> {
    let template = Shared::new(engine.prepare(&Template::new("page", root)));
    engine
        .render_to_string(&template, Value::from(data))
        .map_err(|e| e.cause)
}

fn print(expr: Shared<Expr>) -> Instruction {
    Instruction::interpolation(expr)
}

fn text(s: &str) -> Instruction {
    Instruction::text(s)
}

fn positional(args: Vec<Shared<Expr>>) -> ArgsList {
    ArgsList::Positional(args)
}

fn greet() -> Instruction {
    Instruction::macro_def(MacroDef::new(
        "greet",
        ParameterList::new(vec![
            Param::new("name"),
            Param::with_default("greeting", Expr::string("Hello")),
        ]),
        vec![print(Expr::shared(ExprKind::Interpolated(vec![
            Segment::Expr(Expr::ident("greeting")),
            Segment::Text(", ".into()),
            Segment::Expr(Expr::ident("name")),
            Segment::Text("!".into()),
        ])))],
    ))
}

#[rstest]
#[case::negative(json!({"x": -1}), "non-pos")]
#[case::zero(json!({"x": 0}), "non-pos")]
#[case::positive(json!({"x": 7}), "pos")]
#[case::decimal(json!({"x": 0.5}), "pos")]
fn test_if_else_on_data_model(engine: Engine, #[case] data: serde_json::Value, #[case] expected: &str) {
    let root = vec![Instruction::if_else(
        Expr::paren(Expr::compare(CmpOp::Gt, Expr::ident("x"), Expr::number(0))),
        vec![text("pos")],
        vec![text("non-pos")],
    )];
    assert_eq!(render(&engine, root, data).unwrap(), expected);
}

#[rstest]
#[case::positional(positional(vec![Expr::string("Bo")]), Ok("Hello, Bo!"))]
#[case::positional_override(positional(vec![Expr::string("Bo"), Expr::string("Hi")]), Ok("Hi, Bo!"))]
#[case::named_any_order(
    ArgsList::named(vec![("greeting", Expr::string("Hey")), ("name", Expr::string("Al"))]),
    Ok("Hey, Al!")
)]
#[case::missing_name(ArgsList::Empty, Err("MissingParameter"))]
#[case::unknown_name(
    ArgsList::named(vec![("name", Expr::string("Al")), ("mood", Expr::string("ok"))]),
    Err("ExtraneousParameter")
)]
#[case::too_many(
    positional(vec![Expr::string("a"), Expr::string("b"), Expr::string("c")]),
    Err("ExtraneousParameter")
)]
fn test_greet_binding(engine: Engine, #[case] args: ArgsList, #[case] expected: Result<&str, &str>) {
    let root = vec![greet(), Instruction::macro_call(Expr::ident("greet"), args)];
    let result = render(&engine, root, json!({}));

    match expected {
        Ok(output) => assert_eq!(result.unwrap(), output),
        Err(kind) => assert_eq!(result.unwrap_err().kind(), kind),
    }
}

#[rstest]
fn test_macro_visible_before_definition(engine: Engine) {
    let root = vec![
        Instruction::macro_call(Expr::ident("greet"), positional(vec![Expr::string("early")])),
        greet(),
    ];
    assert_eq!(render(&engine, root, json!({})).unwrap(), "Hello, early!");
}

#[rstest]
fn test_defaults_resolve_in_any_order(engine: Engine) {
    let sum = |name: &str| Expr::add(Expr::ident(name), Expr::number(1));
    let root = vec![
        Instruction::macro_def(MacroDef::new(
            "abc",
            ParameterList::new(vec![
                Param::new("a"),
                Param::with_default("b", sum("a")),
                Param::with_default("c", sum("b")),
            ]),
            vec![
                print(Expr::ident("a")),
                text(","),
                print(Expr::ident("b")),
                text(","),
                print(Expr::ident("c")),
            ],
        )),
        Instruction::macro_call(Expr::ident("abc"), ArgsList::named(vec![("a", Expr::number(5))])),
    ];
    assert_eq!(render(&engine, root, json!({})).unwrap(), "5,6,7");
}

#[rstest]
fn test_break_and_return_scopes(engine: Engine) {
    let body = vec![
        Instruction::list(
            Expr::ident("items"),
            "item",
            vec![
                Instruction::if_else(
                    Expr::compare(CmpOp::Eq, Expr::ident("item"), Expr::number(3)),
                    vec![Instruction::from(InstrKind::Break)],
                    vec![],
                ),
                print(Expr::ident("item")),
            ],
        ),
        text("|"),
        Instruction::ret(None),
        text("unreachable"),
    ];
    let root = vec![
        Instruction::macro_def(MacroDef::new("upto", ParameterList::default(), body)),
        Instruction::macro_call(Expr::ident("upto"), ArgsList::Empty),
        text("end"),
    ];

    assert_eq!(render(&engine, root, json!({"items": [1, 2, 3, 4]})).unwrap(), "12|end");
}

#[rstest]
#[case::inclusive(0, Some(2), RangeBound::Inclusive, Ok("abc"))]
#[case::exclusive(1, Some(3), RangeBound::Exclusive, Ok("bc"))]
#[case::length_clamps(3, Some(10), RangeBound::Length, Ok("de"))]
#[case::unbounded(2, None, RangeBound::Inclusive, Ok("cde"))]
#[case::descending(3, Some(1), RangeBound::Inclusive, Ok("dcb"))]
#[case::empty_at_end(5, None, RangeBound::Inclusive, Ok(""))]
#[case::start_past_end(6, None, RangeBound::Inclusive, Err("IndexOutOfBounds"))]
#[case::end_past_end(1, Some(5), RangeBound::Inclusive, Err("IndexOutOfBounds"))]
#[case::negative_start(-1, Some(2), RangeBound::Inclusive, Err("NegativeIndex"))]
fn test_string_slicing(
    engine: Engine,
    #[case] start: i32,
    #[case] end: Option<i32>,
    #[case] bound: RangeBound,
    #[case] expected: Result<&str, &str>,
) {
    let range = Expr::range(Expr::number(start), end.map(Expr::number), bound);
    let root = vec![print(Expr::index(Expr::ident("s"), range))];
    let result = render(&engine, root, json!({"s": "abcde"}));

    match expected {
        Ok(output) => assert_eq!(result.unwrap(), output),
        Err(kind) => assert_eq!(result.unwrap_err().kind(), kind),
    }
}

#[rstest]
fn test_sequence_slicing_and_joining(engine: Engine) {
    let slice = Expr::index(
        Expr::ident("xs"),
        Expr::range(Expr::number(1), Some(Expr::number(2)), RangeBound::Length),
    );
    let root = vec![print(Expr::builtin(
        slice,
        "join",
        positional(vec![Expr::string("-")]),
    ))];
    assert_eq!(render(&engine, root, json!({"xs": ["a", "b", "c", "d"]})).unwrap(), "b-c");
}

#[rstest]
#[case::missing_is_error(Expr::ident("missing"), Err("InvalidReference"))]
#[case::default_value(
    Expr::shared(ExprKind::Default(Expr::ident("missing"), Some(Expr::string("fallback")))),
    Ok("fallback")
)]
#[case::missing_member_defaults(
    Expr::shared(ExprKind::Default(Expr::dot(Expr::ident("user"), "email"), Some(Expr::string("n/a")))),
    Ok("n/a")
)]
#[case::paren_hides_missing_parent(
    Expr::shared(ExprKind::Default(
        Expr::paren(Expr::dot(Expr::ident("nobody"), "email")),
        Some(Expr::string("n/a"))
    )),
    Ok("n/a")
)]
#[case::bare_parent_must_exist(
    Expr::shared(ExprKind::Default(Expr::dot(Expr::ident("nobody"), "email"), Some(Expr::string("n/a")))),
    Err("InvalidReference")
)]
#[case::nested_member(Expr::dot(Expr::ident("user"), "name"), Ok("Ann"))]
fn test_missing_values(
    engine: Engine,
    #[case] expr: Shared<Expr>,
    #[case] expected: Result<&str, &str>,
) {
    let result = render(&engine, vec![print(expr)], json!({"user": {"name": "Ann"}}));

    match expected {
        Ok(output) => assert_eq!(result.unwrap(), output),
        Err(kind) => assert_eq!(result.unwrap_err().kind(), kind),
    }
}

#[rstest]
fn test_attempt_recover_exposes_error(engine: Engine) {
    let root = vec![
        text("["),
        Instruction::from(InstrKind::Attempt {
            attempt: vec![text("partial"), print(Expr::ident("missing"))],
            recover: vec![
                text("recovered: "),
                print(Expr::builtin(
                    Expr::special(SpecialVar::Error),
                    "contains",
                    positional(vec![Expr::string("missing")]),
                )),
            ],
        }),
        text("]"),
    ];
    assert_eq!(render(&engine, root, json!({})).unwrap(), "[recovered: true]");
}

#[rstest]
fn test_functions_and_curry(engine: Engine) {
    let add = MacroDef::function(
        "add",
        ParameterList::new(vec![Param::new("a"), Param::new("b")]),
        vec![Instruction::ret(Some(Expr::add(Expr::ident("a"), Expr::ident("b"))))],
    );
    let root = vec![
        Instruction::macro_def(add),
        Instruction::assign(
            AssignScope::Unqualified,
            "add10",
            Expr::builtin(Expr::ident("add"), "curry", positional(vec![Expr::number(10)])),
        ),
        print(Expr::call(Expr::ident("add10"), ArgsList::named(vec![("b", Expr::number(5))]))),
        text(" "),
        print(Expr::call(
            Expr::ident("add10"),
            positional(vec![Expr::number(1), Expr::number(2)]),
        )),
        text(" "),
        print(Expr::builtin(
            Expr::builtin(
                Expr::ident("xs"),
                "map",
                positional(vec![Expr::lambda(
                    "x",
                    Expr::call(Expr::ident("add10"), ArgsList::named(vec![("b", Expr::ident("x"))])),
                )]),
            ),
            "join",
            positional(vec![Expr::string(",")]),
        )),
    ];
    assert_eq!(render(&engine, root, json!({"xs": [1, 2]})).unwrap(), "15 3 11,12");
}

#[rstest]
fn test_lambda_filter(engine: Engine) {
    let even = Expr::lambda(
        "n",
        Expr::compare(
            CmpOp::Eq,
            Expr::arithmetic(ArithOp::Mod, Expr::ident("n"), Expr::number(2)),
            Expr::number(0),
        ),
    );
    let root = vec![print(Expr::builtin(
        Expr::builtin(Expr::ident("xs"), "filter", positional(vec![even])),
        "join",
        positional(vec![Expr::string(" ")]),
    ))];
    assert_eq!(render(&engine, root, json!({"xs": [1, 2, 3, 4, 6]})).unwrap(), "2 4 6");
}

#[rstest]
fn test_import_keeps_namespaces_apart(mut engine: Engine) {
    let lib = Template::new(
        "lib/util",
        vec![
            Instruction::assign(AssignScope::Unqualified, "title", Expr::string("lib")),
            Instruction::macro_def(MacroDef::new(
                "shout",
                ParameterList::new(vec![Param::new("s")]),
                vec![print(Expr::builtin(Expr::ident("s"), "upper_case", ArgsList::Empty))],
            )),
        ],
    );
    engine.set_resolver(Shared::new(MapResolver::new().with(lib)));

    let root = vec![
        Instruction::assign(AssignScope::Unqualified, "title", Expr::string("page")),
        Instruction::from(InstrKind::Import {
            template: Expr::string("/lib/util"),
            namespace: stencil_lang::Ident::new("u"),
        }),
        Instruction::macro_call(Expr::dot(Expr::ident("u"), "shout"), positional(vec![Expr::ident("title")])),
        text(" "),
        print(Expr::dot(Expr::ident("u"), "title")),
    ];
    assert_eq!(render(&engine, root, json!({})).unwrap(), "PAGE lib");
}

#[rstest]
fn test_failed_import_is_retried(mut engine: Engine) {
    let lib = Template::new(
        "lib",
        vec![
            Instruction::assign(AssignScope::Unqualified, "ok", Expr::string("yes")),
            print(Expr::ident("boom")),
            Instruction::assign(AssignScope::Unqualified, "late", Expr::string("set")),
        ],
    );
    engine.set_resolver(Shared::new(MapResolver::new().with(lib)));

    let import = |ok: &str, failed: &str| {
        Instruction::from(InstrKind::Attempt {
            attempt: vec![
                Instruction::from(InstrKind::Import {
                    template: Expr::string("lib"),
                    namespace: stencil_lang::Ident::new("l"),
                }),
                text(ok),
            ],
            recover: vec![text(failed)],
        })
    };
    let root = vec![
        import("first", "R1"),
        text(";"),
        import("second", "R2"),
        text(";"),
        print(Expr::shared(ExprKind::Default(
            Expr::paren(Expr::dot(Expr::ident("l"), "late")),
            Some(Expr::string("unbound")),
        ))),
    ];
    assert_eq!(render(&engine, root, json!({})).unwrap(), "R1;R2;unbound");
}

#[rstest]
fn test_missing_include_is_reported(engine: Engine) {
    let root = vec![Instruction::from(InstrKind::Include(Expr::string("nope")))];
    assert_eq!(render(&engine, root, json!({})).unwrap_err().kind(), "TemplateLoad");
}

struct Account {
    owner: String,
    balance: i64,
}

static ACCOUNT_CLASS: LazyLock<HostClass> = LazyLock::new(|| {
    HostClass::builder::<Account>("Account")
        .property("owner", |a: &Account| Value::from(a.owner.as_str()))
        .property("balance", |a: &Account| Value::from(a.balance))
        .method(
            "describe",
            Signature::fixed(vec![ParamType::Primitive(Primitive::Int)]),
            |_, _| Ok(Value::from("int")),
        )
        .method(
            "describe",
            Signature::fixed(vec![ParamType::Primitive(Primitive::Long)]),
            |_, _| Ok(Value::from("long")),
        )
        .method(
            "describe",
            Signature::fixed(vec![ParamType::String]),
            |_, _| Ok(Value::from("string")),
        )
        .method(
            "describe",
            Signature::varargs(vec![ParamType::Object]),
            |_, args| Ok(Value::from(format!("varargs({})", args.len()))),
        )
        .method(
            "withdraw",
            Signature::fixed(vec![ParamType::Primitive(Primitive::Long)]),
            |a: &Account, args| {
                let amount = args[0].as_number().and_then(|n| n.to_i64()).unwrap_or_default();
                if amount > a.balance {
                    Err("insufficient funds".to_string())
                } else {
                    Ok(Value::from(a.balance - amount))
                }
            },
        )
        .build()
});

impl HostObject for Account {
    fn class(&self) -> &'static HostClass {
        &ACCOUNT_CLASS
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn account_call(method: &str, args: Vec<Shared<Expr>>) -> Instruction {
    print(Expr::call(Expr::dot(Expr::ident("account"), method), positional(args)))
}

#[rstest]
#[case::int_exact(vec![Expr::number(1)], Ok("int"))]
#[case::long_exact(vec![Expr::number(1i64)], Ok("long"))]
#[case::byte_widens_to_int(vec![Expr::number(1i8)], Ok("int"))]
#[case::string(vec![Expr::string("x")], Ok("string"))]
#[case::no_fixed_candidate(vec![Expr::boolean(true)], Ok("varargs(1)"))]
#[case::varargs_only_by_arity(vec![Expr::number(1), Expr::number(2)], Ok("varargs(2)"))]
fn test_host_overloads(
    engine: Engine,
    #[case] args: Vec<Shared<Expr>>,
    #[case] expected: Result<&str, &str>,
) {
    let template = Shared::new(Template::new("page", vec![account_call("describe", args)]));
    let data = Value::hash([(
        "account",
        Value::host(Account {
            owner: "Ann".to_string(),
            balance: 10,
        }),
    )]);
    let result = engine.render_to_string(&template, data).map_err(|e| e.cause);

    match expected {
        Ok(output) => assert_eq!(result.unwrap(), output),
        Err(kind) => assert_eq!(result.unwrap_err().kind(), kind),
    }
}

#[rstest]
fn test_host_properties_and_failures(engine: Engine) {
    let data = || {
        Value::hash([(
            "account",
            Value::host(Account {
                owner: "Ann".to_string(),
                balance: 10,
            }),
        )])
    };
    let ok = Shared::new(Template::new(
        "page",
        vec![
            print(Expr::dot(Expr::ident("account"), "owner")),
            text(":"),
            account_call("withdraw", vec![Expr::number(4)]),
        ],
    ));
    assert_eq!(engine.render_to_string(&ok, data()).unwrap(), "Ann:6");

    let failing = Shared::new(Template::new("page", vec![account_call("withdraw", vec![Expr::number(40)])]));
    let error = engine.render_to_string(&failing, data()).unwrap_err();
    assert_eq!(error.cause.kind(), "Evaluation");
    assert!(error.to_string().contains("insufficient funds"));
}

#[rstest]
fn test_error_report_points_at_source(engine: Engine) {
    let source = "Hi ${missing}!";
    let template = Template::new(
        "page",
        vec![
            text("Hi "),
            print(Expr::ident("missing")).at(stencil_lang::Range::line(1, 6, 7)),
            text("!"),
        ],
    )
    .with_source(source);

    let error = engine
        .render_to_string(&Shared::new(template), Value::Null)
        .unwrap_err();

    assert_eq!(error.location.offset(), 5);
    assert_eq!(error.location.len(), 7);
    assert_eq!(
        miette::Diagnostic::code(&error).map(|c| c.to_string()),
        Some("RuntimeError::InvalidReference".to_string())
    );
    assert!(error.to_string().ends_with("missing"));
}

#[rstest]
#[case::defaults(stencil_lang::Settings::default(), "1234.5 true")]
#[case::formatted(
    stencil_lang::Settings {
        number_format: "#,##0.00".to_string(),
        boolean_format: "yes,no".to_string(),
        ..Default::default()
    },
    "1,234.50 yes"
)]
fn test_settings_drive_formatting(#[case] settings: stencil_lang::Settings, #[case] expected: &str) {
    let engine = Engine::new(settings);
    let root = vec![
        print(Expr::ident("amount")),
        text(" "),
        print(Expr::ident("flag")),
    ];
    assert_eq!(render(&engine, root, json!({"amount": 1234.5, "flag": true})).unwrap(), expected);
}

#[rstest]
fn test_setting_instruction_overrides_for_rest_of_render(engine: Engine) {
    let root = vec![
        print(Expr::ident("flag")),
        Instruction::from(InstrKind::Setting {
            name: "boolean_format".into(),
            value: Expr::string("on,off"),
        }),
        text(" "),
        print(Expr::ident("flag")),
    ];
    assert_eq!(render(&engine, root, json!({"flag": false})).unwrap(), "false off");
    assert_eq!(engine.settings().boolean_format, "true,false");
}
