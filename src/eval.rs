//! Reduces a token sequence to a single value.
//!
//! Operators are resolved with an operand stack and an operator stack. A
//! binary operator first reduces every stacked operator of equal or higher
//! precedence, so operators of equal precedence associate left to right.
//! Prefix operators are stacked without reducing anything.

use crate::ast::{Expression, Token};
use crate::error::{SyntaxError, SyntaxErrorKind, TemplateResult};
use crate::interface::Context;
use crate::literal::Literal;
use crate::operator::{Operator, OperatorFn};
use crate::value::Value;

struct Reducer<'e> {
    expression: &'e Expression,
    operands: Vec<Value>,
    operators: Vec<(Operator, u8)>,
}

impl<'e> Reducer<'e> {
    fn missing_right(&self, operator: &Operator) -> SyntaxError {
        SyntaxError::unpositioned(SyntaxErrorKind::MissingRightOperand {
            operator: operator.symbol().to_string(),
            expression: self.expression.to_string(),
        })
    }

    fn pop_operand(&mut self, operator: &Operator) -> TemplateResult<Value> {
        match self.operands.pop() {
            Some(value) => Ok(value),
            None => Err(self.missing_right(operator).into()),
        }
    }

    /// Applies the operator on top of the stack to its operands.
    fn reduce(&mut self) -> TemplateResult<()> {
        let Some((operator, _)) = self.operators.pop() else {
            return Ok(());
        };
        trace!("reducing {}", operator);

        let value = match operator.function() {
            OperatorFn::Constant(constant) => constant(),
            OperatorFn::Unary(apply) => apply(&self.pop_operand(&operator)?),
            OperatorFn::Binary(apply) => {
                let right = self.pop_operand(&operator)?;
                let left = self.pop_operand(&operator)?;
                apply(&left, &right)?
            }
        };
        self.operands.push(value);
        Ok(())
    }

    fn push_operand(&mut self, value: Value, expecting_operand: bool) -> TemplateResult<()> {
        if !expecting_operand {
            return Err(SyntaxError::unpositioned(SyntaxErrorKind::InvalidExpression {
                expression: self.expression.to_string(),
            })
            .into());
        }
        self.operands.push(value);
        Ok(())
    }

    fn run(mut self, context: &Context) -> TemplateResult<Value> {
        let mut expecting_operand = true;

        for token in self.expression.tokens() {
            match token {
                Token::Identifier(identifier) => {
                    self.push_operand(identifier.resolve(context), expecting_operand)?;
                    expecting_operand = false;
                }
                Token::Literal(literal) => {
                    let value = evaluate_literal(literal, context)?;
                    self.push_operand(value, expecting_operand)?;
                    expecting_operand = false;
                }
                Token::Operator(operator) => match operator.arity() {
                    0 => {
                        let value = match operator.function() {
                            OperatorFn::Constant(constant) => constant(),
                            OperatorFn::Unary(_) | OperatorFn::Binary(_) => Value::None,
                        };
                        self.push_operand(value, expecting_operand)?;
                        expecting_operand = false;
                    }
                    1 => {
                        if !expecting_operand {
                            let kind = SyntaxErrorKind::UnexpectedOperator {
                                operator: operator.symbol().to_string(),
                            };
                            return Err(SyntaxError::unpositioned(kind).into());
                        }
                        self.operators.push((*operator, operator.precedence()?));
                    }
                    _ => {
                        if expecting_operand {
                            let kind = SyntaxErrorKind::MissingLeftOperand {
                                operator: operator.symbol().to_string(),
                                expression: self.expression.to_string(),
                            };
                            return Err(SyntaxError::unpositioned(kind).into());
                        }
                        let precedence = operator.precedence()?;
                        while self
                            .operators
                            .last()
                            .is_some_and(|&(_, stacked)| stacked >= precedence)
                        {
                            self.reduce()?;
                        }
                        self.operators.push((*operator, precedence));
                        expecting_operand = true;
                    }
                },
            }
        }

        if expecting_operand {
            if let Some((operator, _)) = self.operators.last() {
                return Err(self.missing_right(operator).into());
            }
        }

        while !self.operators.is_empty() {
            self.reduce()?;
        }

        Ok(self.operands.pop().unwrap_or_default())
    }
}

/// Evaluates `expression` against `context`.
///
/// An empty expression evaluates to `None`.
///
/// # Errors
/// - `ExpressionSyntax` when an operator is missing an operand or two
///   operands sit side by side.
/// - `UnsupportedOperand` or `DivisionByZero` from the operators themselves.
pub(crate) fn evaluate(expression: &Expression, context: &Context) -> TemplateResult<Value> {
    Reducer {
        expression,
        operands: Vec::new(),
        operators: Vec::new(),
    }
    .run(context)
}

fn evaluate_literal(literal: &Literal, context: &Context) -> TemplateResult<Value> {
    Ok(match literal {
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::List(items) => Value::List(
            items
                .iter()
                .map(|item| evaluate(item, context))
                .collect::<TemplateResult<_>>()?,
        ),
        Literal::Group(inner) => evaluate(inner, context)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::literal::LiteralRegistry;
    use crate::parser::tokenize_with;

    fn eval_in(text: &str, context: &Context) -> TemplateResult<Value> {
        evaluate(&tokenize_with(text, &LiteralRegistry::default())?, context)
    }

    fn eval(text: &str) -> Value {
        eval_in(text, &Context::new()).unwrap()
    }

    fn syntax_kind(text: &str) -> SyntaxErrorKind {
        match eval_in(text, &Context::new()) {
            Err(TemplateError::ExpressionSyntax(error)) => error.kind,
            other => panic!("expected a syntax error for {:?}, got {:?}", text, other),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_precedence() {
        assert_eq!(eval("2 + 3 * 4"), Value::Int(14));
        assert_eq!(eval("(2 + 3) * 4"), Value::Int(20));
        assert_eq!(eval("2 * 3 ** 2"), Value::Int(18));
        assert_eq!(eval("1 + 2 == 3"), Value::Bool(true));
        assert_eq!(eval("1 == 1 or 1 == 2 and False"), Value::Bool(true));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_left_associativity() {
        assert_eq!(eval("10 - 4 - 3"), Value::Int(3));
        assert_eq!(eval("100 / 10 / 5"), Value::Float(2.0));
        assert_eq!(eval("2 ** 3 ** 2"), Value::Int(64));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_single_tokens() {
        assert_eq!(eval(""), Value::None);
        assert_eq!(eval("'abc'"), Value::from("abc"));
        assert_eq!(eval("12.5"), Value::Float(12.5));
        assert_eq!(eval("None"), Value::None);
        assert_eq!(eval("[1, 2, 3]"), Value::from(vec![1, 2, 3]));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_constants() {
        assert_eq!(eval("pi == pi"), Value::Bool(true));
        assert_eq!(eval("1 == 1"), Value::Bool(true));
        assert_eq!(eval("1 != 1"), Value::Bool(false));
        assert_eq!(eval("True and not False"), Value::Bool(true));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_identifiers() {
        let mut context = Context::new();
        let inner: Value = [("b", 5)].into_iter().collect();
        context.insert("a", inner);
        context.insert("items", vec![1, 2, 3]);

        assert_eq!(eval_in("a.b", &context).unwrap(), Value::Int(5));
        assert_eq!(eval_in("missing", &context).unwrap(), Value::None);
        assert_eq!(eval_in("a.b * 2", &context).unwrap(), Value::Int(10));
        assert_eq!(eval_in("2 in items", &context).unwrap(), Value::Bool(true));
        assert_eq!(eval_in("[a.b, 1]", &context).unwrap(), Value::from(vec![5, 1]));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_not() {
        assert_eq!(eval("not not 1"), Value::Bool(true));
        assert_eq!(eval("not 1 == 2"), Value::Bool(true));
        assert_eq!(eval("not 0 and 1"), Value::Bool(true));
        assert_eq!(eval("1 and not 0"), Value::Bool(true));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_missing_operands() {
        assert_eq!(
            syntax_kind("1 +"),
            SyntaxErrorKind::MissingRightOperand {
                operator: "+".to_string(),
                expression: "1 +".to_string()
            }
        );
        assert_eq!(
            syntax_kind("* 2"),
            SyntaxErrorKind::MissingLeftOperand {
                operator: "*".to_string(),
                expression: "* 2".to_string()
            }
        );
        assert!(matches!(syntax_kind("not"), SyntaxErrorKind::MissingRightOperand { .. }));
        assert!(matches!(syntax_kind("1 + * 2"), SyntaxErrorKind::MissingLeftOperand { .. }));
        assert!(matches!(syntax_kind("1 not 2"), SyntaxErrorKind::UnexpectedOperator { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_adjacent_operands() {
        assert_eq!(
            syntax_kind("1 2"),
            SyntaxErrorKind::InvalidExpression {
                expression: "1 2".to_string()
            }
        );
        assert!(matches!(syntax_kind("a pi"), SyntaxErrorKind::InvalidExpression { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_operator_failures() {
        assert!(matches!(
            eval_in("1 / 0", &Context::new()),
            Err(TemplateError::DivisionByZero { .. })
        ));
        assert!(matches!(
            eval_in("'a' - 1", &Context::new()),
            Err(TemplateError::UnsupportedOperand { .. })
        ));
    }
}
