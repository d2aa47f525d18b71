//! Property-based tests for stencil-lang trees, arithmetic and overloads.
use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use proptest::prelude::*;
use stencil_lang::ast::{ArithOp, CmpOp, Expr, ExprKind, Instruction, Template};
use stencil_lang::{
    ArithmeticEngine, DecimalEngine, Engine, HostMethod, Ident, Number, NumberKind, OverloadSet,
    ParamType, Primitive, ResolveError, Shared, Signature, Value, ValueType, compare_numbers,
};

mod strategies {
    use super::*;

    pub fn name() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["a", "b", "c"])
    }

    fn leaf() -> impl Strategy<Value = Shared<Expr>> {
        prop_oneof![
            (-100i32..100).prop_map(Expr::number),
            "[a-z]{0,4}".prop_map(|s| Expr::string(&s)),
            any::<bool>().prop_map(Expr::boolean),
            name().prop_map(Expr::ident),
        ]
    }

    /// Arbitrary trees over the identifiers `a`, `b` and `c`.
    pub fn expr() -> impl Strategy<Value = Shared<Expr>> {
        leaf().prop_recursive(4, 32, 3, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::add(a, b)),
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Expr::compare(CmpOp::Lt, a, b)),
                inner.clone().prop_map(Expr::paren),
                inner
                    .clone()
                    .prop_map(|e| Expr::shared(ExprKind::Not(e))),
                prop::collection::vec(inner.clone(), 0..3)
                    .prop_map(|items| Expr::shared(ExprKind::List(items))),
                (inner.clone(), "[a-z]{1,3}").prop_map(|(e, m)| Expr::dot(e, &m)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::index(a, b)),
                (name(), inner).prop_map(|(p, body)| Expr::lambda(p, body)),
            ]
        })
    }

    fn number_leaf() -> impl Strategy<Value = Shared<Expr>> {
        prop_oneof![
            (-20i32..20).prop_map(Expr::number),
            (-20i64..20).prop_map(Expr::number),
            any::<bool>().prop_map(Expr::boolean),
        ]
    }

    /// Closed trees of numbers and booleans, possibly ill-typed.
    pub fn closed_expr() -> impl Strategy<Value = Shared<Expr>> {
        number_leaf().prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::add(a, b)),
                (
                    prop::sample::select(vec![ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Mod]),
                    inner.clone(),
                    inner.clone()
                )
                    .prop_map(|(op, a, b)| Expr::arithmetic(op, a, b)),
                (
                    prop::sample::select(vec![CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Ge]),
                    inner.clone(),
                    inner.clone()
                )
                    .prop_map(|(op, a, b)| Expr::compare(op, a, b)),
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Expr::shared(ExprKind::And(a, b))),
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Expr::shared(ExprKind::Or(a, b))),
                inner.clone().prop_map(|e| Expr::shared(ExprKind::Not(e))),
                inner.prop_map(|e| Expr::shared(ExprKind::Negate(e))),
            ]
        })
    }

    pub fn integer() -> impl Strategy<Value = Number> {
        prop_oneof![
            any::<i32>().prop_map(Number::from),
            (-1_000_000_000i64..1_000_000_000).prop_map(Number::from),
        ]
    }

    pub fn decimal() -> impl Strategy<Value = Number> {
        (-1_000_000_000i64..1_000_000_000, 0u32..6).prop_map(|(mantissa, scale)| {
            let d = BigDecimal::from_str(&format!("{mantissa}e-{scale}"))
                .unwrap_or_else(|_| BigDecimal::from(mantissa));
            Number::Decimal(d)
        })
    }

    pub fn operand() -> impl Strategy<Value = Number> {
        prop_oneof![integer(), decimal()]
    }

    pub fn param_type() -> impl Strategy<Value = ParamType> {
        prop::sample::select(vec![
            ParamType::Primitive(Primitive::Int),
            ParamType::Primitive(Primitive::Long),
            ParamType::Primitive(Primitive::Double),
            ParamType::Boxed(Primitive::Int),
            ParamType::Boxed(Primitive::Boolean),
            ParamType::Decimal,
            ParamType::Number,
            ParamType::String,
            ParamType::Object,
        ])
    }

    pub fn arg_type() -> impl Strategy<Value = ValueType> {
        prop::sample::select(vec![
            ValueType::Null,
            ValueType::Boolean,
            ValueType::String,
            ValueType::Number(NumberKind::Byte),
            ValueType::Number(NumberKind::Int),
            ValueType::Number(NumberKind::Long),
            ValueType::Number(NumberKind::Float),
            ValueType::Number(NumberKind::Decimal),
            ValueType::Sequence,
        ])
    }
}

fn overloads(signatures: &[Signature]) -> OverloadSet {
    OverloadSet::new(
        "f",
        signatures
            .iter()
            .enumerate()
            .map(|(i, s)| HostMethod::function("f", s.clone(), move |_| Ok(Value::from(i))))
            .collect(),
    )
}

fn equal(a: &Number, b: &Number) -> bool {
    compare_numbers(a, b) == Ordering::Equal
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Substituting a name that does not occur leaves the tree unchanged
    #[test]
    fn deep_clone_of_absent_name_is_identity(expr in strategies::expr()) {
        let substitute = Expr::constant(Value::from(1));
        let cloned = expr.deep_clone(Ident::new("zz"), &substitute);
        prop_assert_eq!(&cloned, expr.as_ref());
    }

    /// After substitution the name no longer occurs free
    #[test]
    fn deep_clone_replaces_every_free_occurrence(expr in strategies::expr(), name in strategies::name()) {
        let name = Ident::new(name);
        let substitute = Expr::constant(Value::from("s"));
        let cloned = expr.deep_clone(name, &substitute);

        prop_assert!(!cloned.references(name));
        if !expr.references(name) {
            prop_assert_eq!(&cloned, expr.as_ref());
        }
    }

    /// `(a + b) - b == a` and `(a * b) / b == a` under the decimal engine
    #[test]
    fn decimal_engine_inverse_operations(a in strategies::operand(), b in strategies::operand()) {
        let engine = DecimalEngine::new(12);

        let sum = engine.add(&a, &b).unwrap();
        prop_assert!(equal(&engine.subtract(&sum, &b).unwrap(), &a));

        let difference = engine.subtract(&a, &b).unwrap();
        prop_assert!(equal(&engine.add(&difference, &b).unwrap(), &a));

        if !b.is_zero() {
            let product = engine.multiply(&a, &b).unwrap();
            prop_assert!(equal(&engine.divide(&product, &b).unwrap(), &a));
        }
    }

    /// Resolution is deterministic and unaffected by overloads of another arity
    #[test]
    fn overload_resolution_is_stable(
        params in prop::collection::vec(strategies::param_type(), 1..6),
        extra in (strategies::param_type(), strategies::param_type()),
        arg in strategies::arg_type(),
    ) {
        let signatures: Vec<Signature> = params
            .iter()
            .map(|p| Signature::fixed(vec![*p]))
            .collect();
        let set = overloads(&signatures);
        let first = set.resolve(&[arg]);
        prop_assert_eq!(&set.resolve(&[arg]), &first);

        let mut extended = signatures.clone();
        extended.push(Signature::fixed(vec![extra.0, extra.1]));
        let extended = overloads(&extended);
        prop_assert_eq!(&extended.resolve(&[arg]), &first);
    }

    /// A call some overload accepts is never rejected outright
    #[test]
    fn applicable_overload_is_always_found(
        params in prop::collection::vec(strategies::param_type(), 1..6),
        arg in strategies::arg_type(),
    ) {
        let signatures: Vec<Signature> = params
            .iter()
            .map(|p| Signature::fixed(vec![*p]))
            .collect();
        let set = overloads(&signatures);

        if params.iter().any(|p| p.accepts(arg)) {
            prop_assert_ne!(set.resolve(&[arg]), Err(ResolveError::NoSuchMethod));
        } else {
            prop_assert_eq!(set.resolve(&[arg]), Err(ResolveError::NoSuchMethod));
        }
    }

    /// Constant folding never changes what a template renders
    #[test]
    fn optimizer_preserves_rendering(expr in strategies::closed_expr()) {
        let template = Template::new("t", vec![Instruction::interpolation(expr)]);

        let mut plain = Engine::default();
        plain.set_optimize(false);
        let optimized = Engine::default();

        let expected = plain
            .render_to_string(&Shared::new(plain.prepare(&template)), Value::Null)
            .map_err(|e| e.cause.kind());
        let actual = optimized
            .render_to_string(&Shared::new(optimized.prepare(&template)), Value::Null)
            .map_err(|e| e.cause.kind());
        prop_assert_eq!(actual, expected);
    }
}
