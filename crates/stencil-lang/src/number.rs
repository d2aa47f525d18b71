use bigdecimal::{BigDecimal, FromPrimitive, RoundingMode, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Runtime kind of a [`Number`], ordered from narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumberKind {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
}

impl NumberKind {
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            NumberKind::Byte | NumberKind::Short | NumberKind::Int | NumberKind::Long
        )
    }

    /// Numeric widening: `byte < short < int < long < float < double`, and
    /// every kind widens to `decimal`.
    pub fn widens_to(self, target: NumberKind) -> bool {
        target == NumberKind::Decimal || (self != NumberKind::Decimal && self <= target)
    }

    pub fn name(self) -> &'static str {
        match self {
            NumberKind::Byte => "byte",
            NumberKind::Short => "short",
            NumberKind::Int => "int",
            NumberKind::Long => "long",
            NumberKind::Float => "float",
            NumberKind::Double => "double",
            NumberKind::Decimal => "decimal",
        }
    }
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A number that remembers the representation it was produced with.
///
/// The kind matters to overload resolution and to the conservative
/// arithmetic engine; the decimal engine computes everything as
/// [`BigDecimal`].
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(BigDecimal),
}

impl Number {
    pub fn kind(&self) -> NumberKind {
        match self {
            Number::Byte(_) => NumberKind::Byte,
            Number::Short(_) => NumberKind::Short,
            Number::Int(_) => NumberKind::Int,
            Number::Long(_) => NumberKind::Long,
            Number::Float(_) => NumberKind::Float,
            Number::Double(_) => NumberKind::Double,
            Number::Decimal(_) => NumberKind::Decimal,
        }
    }

    /// Exact integer value, if the number holds a whole value that fits an `i64`.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Number::Byte(n) => Some(*n as i64),
            Number::Short(n) => Some(*n as i64),
            Number::Int(n) => Some(*n as i64),
            Number::Long(n) => Some(*n),
            Number::Float(n) => whole_f64(*n as f64),
            Number::Double(n) => whole_f64(*n),
            Number::Decimal(d) => {
                if d.is_integer() {
                    d.to_i64()
                } else {
                    None
                }
            }
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Byte(n) => *n as f64,
            Number::Short(n) => *n as f64,
            Number::Int(n) => *n as f64,
            Number::Long(n) => *n as f64,
            Number::Float(n) => *n as f64,
            Number::Double(n) => *n,
            Number::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        }
    }

    /// Exact decimal value; `None` for NaN and infinities.
    pub fn to_decimal(&self) -> Option<BigDecimal> {
        match self {
            Number::Byte(n) => Some(BigDecimal::from(*n)),
            Number::Short(n) => Some(BigDecimal::from(*n)),
            Number::Int(n) => Some(BigDecimal::from(*n)),
            Number::Long(n) => Some(BigDecimal::from(*n)),
            Number::Float(n) => float_to_decimal(*n as f64),
            Number::Double(n) => float_to_decimal(*n),
            Number::Decimal(d) => Some(d.clone()),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Decimal(d) => d.is_zero(),
            Number::Float(_) | Number::Double(_) => self.to_f64() == 0.0,
            _ => self.to_i64() == Some(0),
        }
    }

    pub fn is_nan(&self) -> bool {
        self.to_f64().is_nan()
    }

    pub fn negate(&self) -> Number {
        match self {
            Number::Byte(n) => n.checked_neg().map_or(Number::Short(-(*n as i16)), Number::Byte),
            Number::Short(n) => n.checked_neg().map_or(Number::Int(-(*n as i32)), Number::Short),
            Number::Int(n) => n.checked_neg().map_or(Number::Long(-(*n as i64)), Number::Int),
            Number::Long(n) => n
                .checked_neg()
                .map_or_else(|| Number::Decimal(-BigDecimal::from(*n)), Number::Long),
            Number::Float(n) => Number::Float(-n),
            Number::Double(n) => Number::Double(-n),
            Number::Decimal(d) => Number::Decimal(-d.clone()),
        }
    }

    pub fn abs(&self) -> Number {
        if self.is_negative() {
            self.negate()
        } else {
            self.clone()
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Number::Decimal(d) => d < &BigDecimal::zero(),
            _ => self.to_f64() < 0.0,
        }
    }

    /// Rounds to an integral value with the given mode, keeping the kind for
    /// integral numbers.
    pub fn round_with(&self, mode: RoundingMode) -> Number {
        match self {
            Number::Float(_) | Number::Double(_) => {
                let value = self.to_f64();
                let rounded = match mode {
                    RoundingMode::Floor => value.floor(),
                    RoundingMode::Ceiling => value.ceil(),
                    RoundingMode::Down => value.trunc(),
                    _ => (value + 0.5).floor(),
                };
                Number::Double(rounded)
            }
            Number::Decimal(d) => Number::Decimal(d.with_scale_round(0, mode)),
            _ => self.clone(),
        }
    }

    /// Parses the canonical ("computer") form, e.g. `-12.50`.
    pub fn parse(s: &str) -> Option<Number> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<i32>() {
            return Some(Number::Int(n));
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Some(Number::Long(n));
        }
        match trimmed {
            "NaN" => return Some(Number::Double(f64::NAN)),
            "INF" | "+INF" => return Some(Number::Double(f64::INFINITY)),
            "-INF" => return Some(Number::Double(f64::NEG_INFINITY)),
            _ => {}
        }
        BigDecimal::from_str(trimmed).ok().map(Number::Decimal)
    }
}

fn whole_f64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn float_to_decimal(value: f64) -> Option<BigDecimal> {
    if !value.is_finite() {
        return None;
    }
    // Shortest round-trip text avoids dragging the binary expansion along.
    BigDecimal::from_str(&value.to_string())
        .ok()
        .or_else(|| BigDecimal::from_f64(value))
}

fn decimal_scale(d: &BigDecimal) -> i64 {
    d.as_bigint_and_exponent().1
}

/// Canonical text of a decimal: trailing zeros removed, never exponent form.
pub(crate) fn decimal_to_string(d: &BigDecimal) -> String {
    let normalized = d.normalized();
    if decimal_scale(&normalized) < 0 {
        normalized.with_scale(0).to_string()
    } else {
        normalized.to_string()
    }
}

impl Default for Number {
    fn default() -> Self {
        Number::Int(0)
    }
}

macro_rules! number_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Number {
                fn from(value: $ty) -> Self {
                    Number::$variant(value)
                }
            }
        )*
    };
}

number_from!(i8 => Byte, i16 => Short, i32 => Int, i64 => Long, f32 => Float, f64 => Double, BigDecimal => Decimal);

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        match i32::try_from(value) {
            Ok(n) => Number::Int(n),
            Err(_) => Number::Long(value as i64),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Byte(n) => write!(f, "{}", n),
            Number::Short(n) => write!(f, "{}", n),
            Number::Int(n) => write!(f, "{}", n),
            Number::Long(n) => write!(f, "{}", n),
            Number::Float(_) | Number::Double(_) => {
                let value = self.to_f64();
                if value.is_nan() {
                    write!(f, "NaN")
                } else if value.is_infinite() {
                    write!(f, "{}", if value > 0.0 { "INF" } else { "-INF" })
                } else if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", value as i64)
                } else {
                    write!(f, "{}", value)
                }
            }
            Number::Decimal(d) => write!(f, "{}", decimal_to_string(d)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArithmeticError {
    #[error("Division by zero")]
    DivisionByZero,
}

/// Which [`ArithmeticEngine`] a render uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticKind {
    /// Every operation is carried out on exact decimals.
    #[default]
    Decimal,
    /// Integral operands stay integral while the result fits; floats stay floats.
    Conservative,
}

impl FromStr for ArithmeticKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decimal" | "bigdecimal" => Ok(ArithmeticKind::Decimal),
            "conservative" => Ok(ArithmeticKind::Conservative),
            other => Err(format!("unknown arithmetic engine \"{other}\"")),
        }
    }
}

/// Arithmetic and comparison on [`Number`]s.
pub trait ArithmeticEngine: fmt::Debug + Send + Sync {
    fn add(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError>;
    fn subtract(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError>;
    fn multiply(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError>;
    fn divide(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError>;
    fn modulus(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError>;

    fn compare(&self, a: &Number, b: &Number) -> Ordering {
        compare_numbers(a, b)
    }
}

pub fn engine_for(kind: ArithmeticKind, min_scale: u32) -> Arc<dyn ArithmeticEngine> {
    match kind {
        ArithmeticKind::Decimal => Arc::new(DecimalEngine::new(min_scale)),
        ArithmeticKind::Conservative => Arc::new(ConservativeEngine::new(min_scale)),
    }
}

/// Total order across kinds. NaN sorts above every other value.
pub fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if a.kind().is_integral() && b.kind().is_integral() {
        return a.to_i64().cmp(&b.to_i64());
    }

    if a.kind() == NumberKind::Decimal || b.kind() == NumberKind::Decimal {
        if let (Some(x), Some(y)) = (a.to_decimal(), b.to_decimal()) {
            return x.cmp(&y);
        }
    }

    let (x, y) = (a.to_f64(), b.to_f64());
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn decimal_divide(a: &BigDecimal, b: &BigDecimal, min_scale: i64) -> Result<BigDecimal, ArithmeticError> {
    if b.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    let scale = decimal_scale(a).max(decimal_scale(b)).max(min_scale);
    Ok((a / b).with_scale_round(scale, RoundingMode::HalfUp).normalized())
}

fn decimal_modulus(a: &BigDecimal, b: &BigDecimal) -> Result<BigDecimal, ArithmeticError> {
    if b.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    Ok(a % b)
}

fn float_op(a: &Number, b: &Number, op: fn(f64, f64) -> f64) -> Number {
    let value = op(a.to_f64(), b.to_f64());
    if a.kind() <= NumberKind::Float && b.kind() <= NumberKind::Float {
        Number::Float(value as f32)
    } else {
        Number::Double(value)
    }
}

/// Exact decimal arithmetic, division rounded half-up to at least `min_scale`
/// fractional digits.
#[derive(Debug, Clone)]
pub struct DecimalEngine {
    min_scale: i64,
}

impl DecimalEngine {
    pub fn new(min_scale: u32) -> Self {
        Self {
            min_scale: min_scale as i64,
        }
    }

    fn apply(
        &self,
        a: &Number,
        b: &Number,
        op: impl FnOnce(BigDecimal, BigDecimal) -> Result<BigDecimal, ArithmeticError>,
        fallback: fn(f64, f64) -> f64,
    ) -> Result<Number, ArithmeticError> {
        match (a.to_decimal(), b.to_decimal()) {
            (Some(x), Some(y)) => op(x, y).map(Number::Decimal),
            _ => Ok(Number::Double(fallback(a.to_f64(), b.to_f64()))),
        }
    }
}

impl Default for DecimalEngine {
    fn default() -> Self {
        Self::new(12)
    }
}

impl ArithmeticEngine for DecimalEngine {
    fn add(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        self.apply(a, b, |x, y| Ok(x + y), |x, y| x + y)
    }

    fn subtract(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        self.apply(a, b, |x, y| Ok(x - y), |x, y| x - y)
    }

    fn multiply(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        self.apply(a, b, |x, y| Ok(x * y), |x, y| x * y)
    }

    fn divide(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        let min_scale = self.min_scale;
        self.apply(a, b, |x, y| decimal_divide(&x, &y, min_scale), |x, y| x / y)
    }

    fn modulus(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        self.apply(a, b, |x, y| decimal_modulus(&x, &y), |x, y| x % y)
    }
}

/// Keeps integral operands integral (widening on overflow) and floating
/// operands floating; decimals are computed exactly.
#[derive(Debug, Clone)]
pub struct ConservativeEngine {
    min_scale: i64,
}

impl ConservativeEngine {
    pub fn new(min_scale: u32) -> Self {
        Self {
            min_scale: min_scale as i64,
        }
    }

    fn integral(
        &self,
        a: &Number,
        b: &Number,
        checked: fn(i64, i64) -> Option<i64>,
        exact: fn(BigDecimal, BigDecimal) -> BigDecimal,
    ) -> Number {
        let (x, y) = (a.to_i64().unwrap_or_default(), b.to_i64().unwrap_or_default());
        let kind = a.kind().max(b.kind()).max(NumberKind::Int);
        match checked(x, y) {
            Some(result) => narrow_integral(result, kind),
            None => Number::Decimal(exact(BigDecimal::from(x), BigDecimal::from(y))),
        }
    }

    fn has_decimal(a: &Number, b: &Number) -> bool {
        a.kind() == NumberKind::Decimal || b.kind() == NumberKind::Decimal
    }

    fn both_integral(a: &Number, b: &Number) -> bool {
        a.kind().is_integral() && b.kind().is_integral()
    }
}

impl Default for ConservativeEngine {
    fn default() -> Self {
        Self::new(12)
    }
}

fn narrow_integral(value: i64, kind: NumberKind) -> Number {
    match kind {
        NumberKind::Int => i32::try_from(value).map_or(Number::Long(value), Number::Int),
        _ => Number::Long(value),
    }
}

impl ArithmeticEngine for ConservativeEngine {
    fn add(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        if Self::both_integral(a, b) {
            Ok(self.integral(a, b, i64::checked_add, |x, y| x + y))
        } else if Self::has_decimal(a, b) {
            DecimalEngine::new(self.min_scale as u32).add(a, b)
        } else {
            Ok(float_op(a, b, |x, y| x + y))
        }
    }

    fn subtract(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        if Self::both_integral(a, b) {
            Ok(self.integral(a, b, i64::checked_sub, |x, y| x - y))
        } else if Self::has_decimal(a, b) {
            DecimalEngine::new(self.min_scale as u32).subtract(a, b)
        } else {
            Ok(float_op(a, b, |x, y| x - y))
        }
    }

    fn multiply(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        if Self::both_integral(a, b) {
            Ok(self.integral(a, b, i64::checked_mul, |x, y| x * y))
        } else if Self::has_decimal(a, b) {
            DecimalEngine::new(self.min_scale as u32).multiply(a, b)
        } else {
            Ok(float_op(a, b, |x, y| x * y))
        }
    }

    fn divide(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        if Self::both_integral(a, b) {
            let (x, y) = (a.to_i64().unwrap_or_default(), b.to_i64().unwrap_or_default());
            if y == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            if x.checked_rem(y) == Some(0) {
                return Ok(self.integral(a, b, i64::checked_div, |x, y| x / y));
            }
        }
        if Self::both_integral(a, b) || Self::has_decimal(a, b) {
            DecimalEngine::new(self.min_scale as u32).divide(a, b)
        } else {
            Ok(float_op(a, b, |x, y| x / y))
        }
    }

    fn modulus(&self, a: &Number, b: &Number) -> Result<Number, ArithmeticError> {
        if Self::both_integral(a, b) {
            if b.is_zero() {
                return Err(ArithmeticError::DivisionByZero);
            }
            Ok(self.integral(a, b, i64::checked_rem, |x, y| x % y))
        } else if Self::has_decimal(a, b) {
            DecimalEngine::new(self.min_scale as u32).modulus(a, b)
        } else {
            Ok(float_op(a, b, |x, y| x % y))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn dec(s: &str) -> Number {
        Number::Decimal(BigDecimal::from_str(s).unwrap())
    }

    #[rstest]
    #[case(Number::Int(42), "42")]
    #[case(Number::Long(-42), "-42")]
    #[case(Number::Double(42.0), "42")]
    #[case(Number::Double(42.125), "42.125")]
    #[case(Number::Double(f64::NAN), "NaN")]
    #[case(Number::Double(f64::NEG_INFINITY), "-INF")]
    #[case(dec("42.100"), "42.1")]
    #[case(dec("1E+3"), "1000")]
    #[case(dec("0.000"), "0")]
    fn test_display_formatting(#[case] input: Number, #[case] expected: &str) {
        assert_eq!(input.to_string(), expected);
    }

    #[rstest]
    #[case(NumberKind::Byte, NumberKind::Long, true)]
    #[case(NumberKind::Int, NumberKind::Float, true)]
    #[case(NumberKind::Double, NumberKind::Float, false)]
    #[case(NumberKind::Double, NumberKind::Decimal, true)]
    #[case(NumberKind::Decimal, NumberKind::Double, false)]
    #[case(NumberKind::Long, NumberKind::Int, false)]
    fn test_widens_to(#[case] from: NumberKind, #[case] to: NumberKind, #[case] expected: bool) {
        assert_eq!(from.widens_to(to), expected);
    }

    #[rstest]
    #[case(Number::Int(5), Number::Int(2), "7", "3", "10", "2.5", "1")]
    #[case(Number::Int(10), Number::Int(3), "13", "7", "30", "3.333333333333", "1")]
    #[case(Number::Int(-5), Number::Int(2), "-3", "-7", "-10", "-2.5", "-1")]
    #[case(dec("0.1"), dec("0.2"), "0.3", "-0.1", "0.02", "0.5", "0.1")]
    fn test_decimal_engine(
        #[case] a: Number,
        #[case] b: Number,
        #[case] add_result: &str,
        #[case] sub_result: &str,
        #[case] mul_result: &str,
        #[case] div_result: &str,
        #[case] rem_result: &str,
    ) {
        let engine = DecimalEngine::default();
        assert_eq!(engine.add(&a, &b).unwrap().to_string(), add_result);
        assert_eq!(engine.subtract(&a, &b).unwrap().to_string(), sub_result);
        assert_eq!(engine.multiply(&a, &b).unwrap().to_string(), mul_result);
        assert_eq!(engine.divide(&a, &b).unwrap().to_string(), div_result);
        assert_eq!(engine.modulus(&a, &b).unwrap().to_string(), rem_result);
    }

    #[rstest]
    #[case(Number::Int(7), Number::Int(2), Number::Int(9))]
    #[case(Number::Int(i32::MAX), Number::Int(1), Number::Long(i32::MAX as i64 + 1))]
    #[case(Number::Byte(1), Number::Short(1), Number::Int(2))]
    #[case(Number::Float(1.5), Number::Int(1), Number::Float(2.5))]
    #[case(Number::Double(1.5), Number::Float(1.0), Number::Double(2.5))]
    fn test_conservative_add_kinds(#[case] a: Number, #[case] b: Number, #[case] expected: Number) {
        assert_eq!(ConservativeEngine::default().add(&a, &b).unwrap(), expected);
    }

    #[test]
    fn test_conservative_overflow_promotes_to_decimal() {
        let result = ConservativeEngine::default()
            .multiply(&Number::Long(i64::MAX), &Number::Int(2))
            .unwrap();
        assert_eq!(result.kind(), NumberKind::Decimal);
        assert_eq!(result.to_string(), "18446744073709551614");
    }

    #[test]
    fn test_conservative_division() {
        let engine = ConservativeEngine::default();
        assert_eq!(engine.divide(&Number::Int(6), &Number::Int(3)).unwrap(), Number::Int(2));
        assert_eq!(engine.divide(&Number::Int(7), &Number::Int(2)).unwrap().to_string(), "3.5");
        assert_eq!(
            engine.divide(&Number::Int(1), &Number::Int(0)),
            Err(ArithmeticError::DivisionByZero)
        );
    }

    #[rstest]
    #[case(Number::Int(1), Number::Int(0))]
    #[case(dec("1.5"), dec("0"))]
    fn test_division_by_zero(#[case] a: Number, #[case] b: Number) {
        let engine = DecimalEngine::default();
        assert_eq!(engine.divide(&a, &b), Err(ArithmeticError::DivisionByZero));
        assert_eq!(engine.modulus(&a, &b), Err(ArithmeticError::DivisionByZero));
    }

    #[rstest]
    #[case(Number::Int(5), dec("5.0"), Ordering::Equal)]
    #[case(Number::Int(2), Number::Double(2.5), Ordering::Less)]
    #[case(Number::Long(10), Number::Byte(3), Ordering::Greater)]
    #[case(Number::Double(f64::NAN), Number::Int(3), Ordering::Greater)]
    #[case(dec("0.30"), Number::Double(0.3), Ordering::Equal)]
    fn test_compare(#[case] a: Number, #[case] b: Number, #[case] expected: Ordering) {
        assert_eq!(compare_numbers(&a, &b), expected);
    }

    #[rstest]
    #[case("42", Some(Number::Int(42)))]
    #[case("5000000000", Some(Number::Long(5_000_000_000)))]
    #[case("1.25", Some(dec("1.25")))]
    #[case("abc", None)]
    fn test_parse(#[case] input: &str, #[case] expected: Option<Number>) {
        assert_eq!(Number::parse(input), expected);
    }

    #[test]
    fn test_negate_widens_on_overflow() {
        assert_eq!(Number::Int(i32::MIN).negate(), Number::Long(-(i32::MIN as i64)));
        assert_eq!(Number::Int(4).negate(), Number::Int(-4));
    }

    #[rstest]
    #[case(dec("2.5"), RoundingMode::HalfUp, "3")]
    #[case(dec("2.5"), RoundingMode::Floor, "2")]
    #[case(Number::Double(-2.5), RoundingMode::Ceiling, "-2")]
    #[case(Number::Int(7), RoundingMode::Floor, "7")]
    fn test_round_with(#[case] input: Number, #[case] mode: RoundingMode, #[case] expected: &str) {
        assert_eq!(input.round_with(mode).to_string(), expected);
    }
}
