//! The operator table and the functions backing each operator.
//!
//! An operator's arity comes from the shape of its backing function: a
//! constant takes nothing, a prefix operator takes its right operand and a
//! binary operator takes both neighbours.

use std::cmp::Ordering;

use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;

type BinaryFn = fn(&Value, &Value) -> TemplateResult<Value>;

#[derive(Debug, Clone, Copy)]
pub(crate) enum OperatorFn {
    Constant(fn() -> Value),
    Unary(fn(&Value) -> Value),
    Binary(BinaryFn),
}

#[derive(Debug)]
struct OperatorDef {
    symbol: &'static str,
    function: OperatorFn,
    precedence: Option<u8>,
}

/// Operators sharing a precedence level declare it once on the group.
#[derive(Debug)]
struct OperatorGroup {
    shared_precedence: Option<u8>,
    operators: &'static [OperatorDef],
}

const fn def(symbol: &'static str, function: OperatorFn, precedence: Option<u8>) -> OperatorDef {
    OperatorDef {
        symbol,
        function,
        precedence,
    }
}

pub(crate) const CONSTANT_PRECEDENCE: u8 = 8;
pub(crate) const LOGICAL_PRECEDENCE: u8 = 4;

const CONSTANT_OPERATORS: &[OperatorDef] = &[
    def("pi", OperatorFn::Constant(|| Value::Float(std::f64::consts::PI)), None),
    def("True", OperatorFn::Constant(|| Value::Bool(true)), None),
    def("False", OperatorFn::Constant(|| Value::Bool(false)), None),
    def("None", OperatorFn::Constant(|| Value::None), None),
];

const ARITHMETIC_OPERATORS: &[OperatorDef] = &[
    def("+", OperatorFn::Binary(add), Some(5)),
    def("-", OperatorFn::Binary(sub), Some(5)),
    def("*", OperatorFn::Binary(mul), Some(6)),
    def("/", OperatorFn::Binary(true_div), Some(6)),
    def("//", OperatorFn::Binary(floor_div), Some(6)),
    def("%", OperatorFn::Binary(modulo), Some(6)),
    def("**", OperatorFn::Binary(pow), Some(7)),
];

const LOGICAL_OPERATORS: &[OperatorDef] = &[
    def("==", OperatorFn::Binary(|l, r| Ok(Value::Bool(values_equal(l, r)))), None),
    def("!=", OperatorFn::Binary(|l, r| Ok(Value::Bool(!values_equal(l, r)))), None),
    def(">", OperatorFn::Binary(|l, r| ordered(">", l, r, Ordering::is_gt)), None),
    def(">=", OperatorFn::Binary(|l, r| ordered(">=", l, r, Ordering::is_ge)), None),
    def("<", OperatorFn::Binary(|l, r| ordered("<", l, r, Ordering::is_lt)), None),
    def("<=", OperatorFn::Binary(|l, r| ordered("<=", l, r, Ordering::is_le)), None),
    def("in", OperatorFn::Binary(contains), None),
];

const KEYWORD_OPERATORS: &[OperatorDef] = &[
    def("not", OperatorFn::Unary(|v| Value::Bool(!v.is_truthy())), Some(3)),
    def(
        "and",
        OperatorFn::Binary(|l, r| Ok(Value::Bool(l.is_truthy() && r.is_truthy()))),
        Some(2),
    ),
    def(
        "or",
        OperatorFn::Binary(|l, r| Ok(Value::Bool(l.is_truthy() || r.is_truthy()))),
        Some(1),
    ),
];

static OPERATOR_TABLE: &[OperatorGroup] = &[
    OperatorGroup {
        shared_precedence: Some(CONSTANT_PRECEDENCE),
        operators: CONSTANT_OPERATORS,
    },
    OperatorGroup {
        shared_precedence: None,
        operators: ARITHMETIC_OPERATORS,
    },
    OperatorGroup {
        shared_precedence: Some(LOGICAL_PRECEDENCE),
        operators: LOGICAL_OPERATORS,
    },
    OperatorGroup {
        shared_precedence: None,
        operators: KEYWORD_OPERATORS,
    },
];

fn all_operators() -> impl Iterator<Item = (&'static OperatorGroup, &'static OperatorDef)> {
    OPERATOR_TABLE
        .iter()
        .flat_map(|group| group.operators.iter().map(move |op| (group, op)))
}

/// An arithmetic, logical, keyword or constant operator.
#[derive(Debug, Clone, Copy)]
pub struct Operator {
    symbol: &'static str,
    function: OperatorFn,
    precedence: Option<u8>,
}

impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl Eq for Operator {}

impl Operator {
    /// Looks up the operator spelled `symbol`.
    ///
    /// # Errors
    /// - `UnknownOperator` if no operator is spelled that way.
    pub fn new(symbol: &str) -> TemplateResult<Self> {
        all_operators()
            .find(|(_, op)| op.symbol == symbol)
            .map(|(group, op)| Self {
                symbol: op.symbol,
                function: op.function,
                precedence: op.precedence.or(group.shared_precedence),
            })
            .ok_or_else(|| TemplateError::UnknownOperator {
                operator: symbol.to_string(),
                position: 0,
            })
    }

    pub fn is_valid_operator(symbol: &str) -> bool {
        all_operators().any(|(_, op)| op.symbol == symbol)
    }

    /// Whether `prefix` is the start of at least one operator spelling.
    pub fn string_could_be_operator(prefix: &str) -> bool {
        all_operators().any(|(_, op)| op.symbol.starts_with(prefix))
    }

    pub const fn symbol(&self) -> &'static str {
        self.symbol
    }

    /// Word operators (`in`, `not`, `pi`, ...) are spelled like identifiers.
    pub fn is_word(&self) -> bool {
        self.symbol.chars().all(|c| c.is_ascii_alphabetic())
    }

    pub(crate) const fn function(&self) -> OperatorFn {
        self.function
    }

    /// # Errors
    /// - `MissingOperatorPrecedence` if the table gives this operator none.
    pub fn precedence(&self) -> TemplateResult<u8> {
        self.precedence
            .ok_or_else(|| TemplateError::MissingOperatorPrecedence {
                operator: self.symbol.to_string(),
            })
    }

    pub const fn arity(&self) -> usize {
        match self.function {
            OperatorFn::Constant(_) => 0,
            OperatorFn::Unary(_) => 1,
            OperatorFn::Binary(_) => 2,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Float(f) => Some(Number::Float(*f)),
        Value::Bool(b) => Some(Number::Int(i64::from(*b))),
        Value::None | Value::Str(_) | Value::List(_) | Value::Map(_) => None,
    }
}

#[allow(clippy::cast_precision_loss, reason = "mixed int/float arithmetic widens to float")]
const fn to_float(number: &Number) -> f64 {
    match number {
        Number::Int(i) => *i as f64,
        Number::Float(f) => *f,
    }
}

fn unsupported(operator: &str, left: &Value, right: &Value) -> TemplateError {
    TemplateError::UnsupportedOperand {
        operator: operator.to_string(),
        left: left.type_name().to_string(),
        right: Some(right.type_name().to_string()),
    }
}

/// Applies an integer operation, widening to float when it overflows.
fn arithmetic(
    operator: &str,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> TemplateResult<Value> {
    match (as_number(left), as_number(right)) {
        (Some(Number::Int(l)), Some(Number::Int(r))) => Ok(int_op(l, r).map_or_else(
            || Value::Float(float_op(to_float(&Number::Int(l)), to_float(&Number::Int(r)))),
            Value::Int,
        )),
        (Some(l), Some(r)) => Ok(Value::Float(float_op(to_float(&l), to_float(&r)))),
        _ => Err(unsupported(operator, left, right)),
    }
}

/// Largest string (in bytes) or list (in items) that `*` may build.
pub(crate) const MAX_REPEAT_LEN: usize = 1 << 24;

/// How many copies of a `len` long sequence `*` makes. Negative counts give
/// an empty result.
fn repeat_count(len: usize, count: i64) -> TemplateResult<usize> {
    let count = usize::try_from(count).unwrap_or(0);
    if len == 0 {
        return Ok(0);
    }
    match len.checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(count),
        _ => Err(TemplateError::ValueTooLarge {
            operator: "*".to_string(),
            limit: MAX_REPEAT_LEN,
        }),
    }
}

fn add(left: &Value, right: &Value) -> TemplateResult<Value> {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => Ok(Value::Str(format!("{}{}", l, r))),
        (Value::List(l), Value::List(r)) => Ok(Value::List(l.iter().chain(r).cloned().collect())),
        _ => arithmetic("+", left, right, i64::checked_add, |l, r| l + r),
    }
}

fn sub(left: &Value, right: &Value) -> TemplateResult<Value> {
    arithmetic("-", left, right, i64::checked_sub, |l, r| l - r)
}

fn mul(left: &Value, right: &Value) -> TemplateResult<Value> {
    match (left, right) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            Ok(Value::Str(s.repeat(repeat_count(s.len(), *n)?)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => Ok(Value::List(
            std::iter::repeat_n(items, repeat_count(items.len(), *n)?)
                .flatten()
                .cloned()
                .collect(),
        )),
        _ => arithmetic("*", left, right, i64::checked_mul, |l, r| l * r),
    }
}

fn is_zero(value: &Value) -> bool {
    as_number(value).is_some_and(|n| to_float(&n) == 0.0)
}

fn true_div(left: &Value, right: &Value) -> TemplateResult<Value> {
    match (as_number(left), as_number(right)) {
        (Some(_), Some(_)) if is_zero(right) => Err(TemplateError::DivisionByZero {
            operator: "/".to_string(),
        }),
        (Some(l), Some(r)) => Ok(Value::Float(to_float(&l) / to_float(&r))),
        _ => Err(unsupported("/", left, right)),
    }
}

fn floor_div(left: &Value, right: &Value) -> TemplateResult<Value> {
    if as_number(left).is_some() && is_zero(right) {
        return Err(TemplateError::DivisionByZero {
            operator: "//".to_string(),
        });
    }
    arithmetic(
        "//",
        left,
        right,
        |l, r| {
            let quotient = l.checked_div(r)?;
            if l.checked_rem(r)? != 0 && ((l < 0) != (r < 0)) {
                quotient.checked_sub(1)
            } else {
                Some(quotient)
            }
        },
        |l, r| (l / r).floor(),
    )
}

fn modulo(left: &Value, right: &Value) -> TemplateResult<Value> {
    if as_number(left).is_some() && is_zero(right) {
        return Err(TemplateError::DivisionByZero {
            operator: "%".to_string(),
        });
    }
    arithmetic(
        "%",
        left,
        right,
        |l, r| {
            let remainder = l.checked_rem(r)?;
            if remainder != 0 && ((remainder < 0) != (r < 0)) {
                remainder.checked_add(r)
            } else {
                Some(remainder)
            }
        },
        |l, r| l - r * (l / r).floor(),
    )
}

fn pow(left: &Value, right: &Value) -> TemplateResult<Value> {
    arithmetic(
        "**",
        left,
        right,
        |base, exponent| {
            // Negative exponents fall through to the float path.
            let exponent = u32::try_from(exponent).ok()?;
            base.checked_pow(exponent)
        },
        f64::powf,
    )
}

pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(l), Value::List(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| values_equal(a, b))
        }
        _ => match (as_number(left), as_number(right)) {
            (Some(Number::Int(l)), Some(Number::Int(r))) => l == r,
            (Some(l), Some(r)) => to_float(&l) == to_float(&r),
            _ => left == right,
        },
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => Some(l.cmp(r)),
        (Value::List(l), Value::List(r)) => {
            for (a, b) in l.iter().zip(r) {
                match compare(a, b)? {
                    Ordering::Equal => {}
                    unequal => return Some(unequal),
                }
            }
            Some(l.len().cmp(&r.len()))
        }
        _ => match (as_number(left)?, as_number(right)?) {
            (Number::Int(l), Number::Int(r)) => Some(l.cmp(&r)),
            (l, r) => to_float(&l).partial_cmp(&to_float(&r)),
        },
    }
}

fn ordered(
    operator: &str,
    left: &Value,
    right: &Value,
    test: fn(Ordering) -> bool,
) -> TemplateResult<Value> {
    compare(left, right)
        .map(|ordering| Value::Bool(test(ordering)))
        .ok_or_else(|| unsupported(operator, left, right))
}

fn contains(needle: &Value, haystack: &Value) -> TemplateResult<Value> {
    match (needle, haystack) {
        (Value::Str(n), Value::Str(h)) => Ok(Value::Bool(h.contains(n.as_str()))),
        (_, Value::List(items)) => Ok(Value::Bool(items.iter().any(|item| values_equal(needle, item)))),
        (Value::Str(key), Value::Map(map)) => Ok(Value::Bool(map.contains_key(key))),
        _ => Err(unsupported("in", needle, haystack)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(symbol: &str, left: Value, right: Value) -> TemplateResult<Value> {
        match Operator::new(symbol).unwrap().function() {
            OperatorFn::Binary(f) => f(&left, &right),
            OperatorFn::Constant(_) | OperatorFn::Unary(_) => panic!("{} is not binary", symbol),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_every_operator_has_a_precedence() {
        for (_, op) in all_operators() {
            let operator = Operator::new(op.symbol).unwrap();
            assert!(operator.precedence().is_ok(), "{} has no precedence", op.symbol);
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_precedence_levels() {
        let precedence = |s| Operator::new(s).unwrap().precedence().unwrap();
        assert_eq!(precedence("+"), 5);
        assert_eq!(precedence("//"), 6);
        assert_eq!(precedence("**"), 7);
        assert_eq!(precedence("pi"), 8);
        assert_eq!(precedence("in"), 4);
        assert_eq!(precedence("<="), 4);
        assert_eq!(precedence("not"), 3);
        assert_eq!(precedence("and"), 2);
        assert_eq!(precedence("or"), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_arity_follows_function_shape() {
        assert_eq!(Operator::new("pi").unwrap().arity(), 0);
        assert_eq!(Operator::new("not").unwrap().arity(), 1);
        assert_eq!(Operator::new("==").unwrap().arity(), 2);
        assert_eq!(Operator::new("**").unwrap().arity(), 2);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_operator() {
        assert!(matches!(
            Operator::new("=>"),
            Err(TemplateError::UnknownOperator { ref operator, .. }) if operator == "=>"
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_prefixes() {
        assert!(Operator::string_could_be_operator("*"));
        assert!(Operator::string_could_be_operator("!"));
        assert!(Operator::string_could_be_operator("an"));
        assert!(!Operator::string_could_be_operator("x"));
        assert!(!Operator::is_valid_operator("!"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_floor_division_and_modulo_follow_the_divisor() {
        assert_eq!(call("//", Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(call("%", Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(call("%", Value::Int(7), Value::Int(-2)).unwrap(), Value::Int(-1));
        assert_eq!(call("//", Value::Float(7.0), Value::Int(2)).unwrap(), Value::Float(3.0));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_division_by_zero() {
        for symbol in ["/", "//", "%"] {
            assert!(matches!(
                call(symbol, Value::Int(1), Value::Int(0)),
                Err(TemplateError::DivisionByZero { .. })
            ));
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_overflow_widens_to_float() {
        assert_eq!(
            call("**", Value::Int(2), Value::Int(2)).unwrap(),
            Value::Int(4)
        );
        assert!(matches!(
            call("*", Value::Int(i64::MAX), Value::Int(2)).unwrap(),
            Value::Float(_)
        ));
        assert_eq!(call("**", Value::Int(2), Value::Int(-1)).unwrap(), Value::Float(0.5));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_sequences() {
        assert_eq!(
            call("+", Value::from("ab"), Value::from("cd")).unwrap(),
            Value::from("abcd")
        );
        assert_eq!(
            call("*", Value::from("ab"), Value::Int(2)).unwrap(),
            Value::from("abab")
        );
        assert_eq!(
            call("in", Value::Int(2), Value::from(vec![1, 2])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("in", Value::from("ell"), Value::from("hello")).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_repetition_is_bounded() {
        assert_eq!(
            call("*", Value::from("ab"), Value::Int(99_999_999_999_999)),
            Err(TemplateError::ValueTooLarge {
                operator: "*".to_string(),
                limit: MAX_REPEAT_LEN
            })
        );
        assert!(matches!(
            call("*", Value::Int(i64::MAX), Value::from(vec![1, 2])),
            Err(TemplateError::ValueTooLarge { .. })
        ));
        assert_eq!(
            call("*", Value::from(""), Value::Int(i64::MAX)).unwrap(),
            Value::from("")
        );
        assert_eq!(
            call("*", Value::from(vec![1]), Value::Int(-3)).unwrap(),
            Value::List(Vec::new())
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_mixed_comparisons() {
        assert_eq!(call("==", Value::Int(1), Value::Float(1.0)).unwrap(), Value::Bool(true));
        assert_eq!(call("<", Value::Int(1), Value::Float(1.5)).unwrap(), Value::Bool(true));
        assert!(matches!(
            call("<", Value::Int(1), Value::from("a")),
            Err(TemplateError::UnsupportedOperand { .. })
        ));
        assert!(matches!(
            call("-", Value::from("a"), Value::Int(1)),
            Err(TemplateError::UnsupportedOperand { .. })
        ));
    }
}
