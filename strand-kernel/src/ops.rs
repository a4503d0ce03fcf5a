//! Relational and arithmetic operators over values

use crate::error::{KernelError, Result};
use crate::kernel::{ArithOp, RelOp};
use crate::value::{Literal, Value};
use strand_types::Span;

/// Apply a relational operator
///
/// Integers of mixed width are widened to 64 bits first. `==` and `!=`
/// accept any pair of literals (and actor references); ordering operators
/// need two integers or two strings.
pub fn relate(op: RelOp, lhs: &Value, rhs: &Value, span: Span) -> Result<bool> {
    match (lhs, rhs) {
        (Value::Lit(a), Value::Lit(b)) => match op {
            RelOp::Eq => Ok(a == b),
            RelOp::Ne => Ok(a != b),
            _ => a.partial_order(b).map(|ord| op.holds(ord)).ok_or_else(|| {
                KernelError::type_mismatch(
                    span,
                    format!("comparable operands for {}", op.symbol()),
                    format!("{} and {}", a.type_name(), b.type_name()),
                )
            }),
        },
        (Value::Actor(a), Value::Actor(b)) if matches!(op, RelOp::Eq | RelOp::Ne) => {
            Ok((a.address() == b.address()) == (op == RelOp::Eq))
        }
        _ => Err(KernelError::type_mismatch(
            span,
            format!("literal operands for {}", op.symbol()),
            format!("{} and {}", lhs.type_name(), rhs.type_name()),
        )),
    }
}

/// Apply an arithmetic operator
///
/// `Int32 op Int32` stays 32-bit; any 64-bit operand widens the result.
/// Overflow and division by zero are errors, never wrapped. `+` also
/// concatenates strings.
pub fn arith(op: ArithOp, lhs: &Value, rhs: &Value, span: Span) -> Result<Literal> {
    let (a, b) = match (lhs, rhs) {
        (Value::Lit(a), Value::Lit(b)) => (a, b),
        _ => {
            return Err(KernelError::type_mismatch(
                span,
                "integer operands",
                format!("{} and {}", lhs.type_name(), rhs.type_name()),
            ))
        }
    };

    let overflow = || KernelError::Arithmetic {
        span,
        message: format!("overflow in {} {} {}", a, op.symbol(), b),
    };

    if matches!(op, ArithOp::Div | ArithOp::Rem) && b.as_i64() == Some(0) {
        return Err(KernelError::Arithmetic {
            span,
            message: "division by zero".to_string(),
        });
    }

    match (a, b) {
        (Literal::Int32(x), Literal::Int32(y)) => {
            let result = match op {
                ArithOp::Add => x.checked_add(*y),
                ArithOp::Sub => x.checked_sub(*y),
                ArithOp::Mul => x.checked_mul(*y),
                ArithOp::Div => x.checked_div(*y),
                ArithOp::Rem => x.checked_rem(*y),
            };
            result.map(Literal::Int32).ok_or_else(overflow)
        }
        (Literal::Str(x), Literal::Str(y)) if op == ArithOp::Add => {
            Ok(Literal::str(format!("{}{}", x, y)))
        }
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => {
                let result = match op {
                    ArithOp::Add => x.checked_add(y),
                    ArithOp::Sub => x.checked_sub(y),
                    ArithOp::Mul => x.checked_mul(y),
                    ArithOp::Div => x.checked_div(y),
                    ArithOp::Rem => x.checked_rem(y),
                };
                result.map(Literal::Int64).ok_or_else(overflow)
            }
            _ => Err(KernelError::type_mismatch(
                span,
                "integer operands",
                format!("{} and {}", a.type_name(), b.type_name()),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(l: impl Into<Literal>) -> Value {
        Value::Lit(l.into())
    }

    #[test]
    fn test_mixed_width_compare() {
        let span = Span::default();
        assert!(relate(RelOp::Lt, &lit(3), &lit(5i64), span).unwrap());
        assert!(relate(RelOp::Lt, &lit(3i64), &lit(5), span).unwrap());
        assert!(!relate(RelOp::Gt, &lit(i32::MAX), &lit(i32::MAX as i64 + 1), span).unwrap());
        assert!(relate(RelOp::Eq, &lit(7), &lit(7i64), span).unwrap());
        assert!(relate(RelOp::Ne, &lit("7"), &lit(7), span).unwrap());
    }

    #[test]
    fn test_incomparable_operands() {
        let err = relate(RelOp::Lt, &lit(true), &lit(1), Span::new(2, 4)).unwrap_err();
        assert!(matches!(err, KernelError::TypeMismatch { span, .. } if span == Span::new(2, 4)));
    }

    #[test]
    fn test_arith_widening_and_overflow() {
        let span = Span::default();
        assert_eq!(arith(ArithOp::Add, &lit(2), &lit(3), span).unwrap(), Literal::Int32(5));
        assert!(matches!(
            arith(ArithOp::Add, &lit(i32::MAX), &lit(1i64), span).unwrap(),
            Literal::Int64(v) if v == i32::MAX as i64 + 1
        ));
        assert!(matches!(
            arith(ArithOp::Add, &lit(i32::MAX), &lit(1), span),
            Err(KernelError::Arithmetic { .. })
        ));
        assert!(matches!(
            arith(ArithOp::Div, &lit(1), &lit(0), span),
            Err(KernelError::Arithmetic { .. })
        ));
        assert_eq!(
            arith(ArithOp::Add, &lit("ab"), &lit("cd"), span).unwrap(),
            Literal::str("abcd")
        );
    }
}
