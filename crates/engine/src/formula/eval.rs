// Formula evaluator - tree-walk over the parsed AST
//
// Reference resolution never fails: anything unresolvable reads as 0.
// Arithmetic faults (division by zero, non-finite results) fail the whole
// formula, and callers fall back to 0 via `evaluate_or_zero`.

use std::fmt;

use super::parser::{CmpOp, Expr, Formula, Op, RefToken};

/// Data access for formula evaluation.
pub trait ValueLookup {
    /// Numeric value of a reference for the row being evaluated.
    /// Missing pages, columns or rows resolve to 0.
    fn resolve(&self, token: &RefToken) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    DivisionByZero,
    NonFinite,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::NonFinite => write!(f, "result is not a finite number"),
        }
    }
}

impl std::error::Error for EvalError {}

pub fn evaluate<L: ValueLookup + ?Sized>(expr: &Expr, lookup: &L) -> Result<f64, EvalError> {
    let value = match expr {
        Expr::Number(n) => *n,
        Expr::Ref(token) => lookup.resolve(token),
        Expr::Neg(operand) => -evaluate(operand, lookup)?,
        Expr::BinaryOp { op, left, right } => {
            let l = evaluate(left, lookup)?;
            let r = evaluate(right, lookup)?;
            apply_op(*op, l, r)?
        }
        Expr::Compare { first, rest } => {
            let mut left = evaluate(first, lookup)?;
            let mut holds = true;
            for (op, right) in rest {
                let right = evaluate(right, lookup)?;
                if !compare(*op, left, right) {
                    holds = false;
                    break;
                }
                left = right;
            }
            if holds {
                1.0
            } else {
                0.0
            }
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite)
    }
}

/// Evaluate a column formula for one row. Unparseable formulas and
/// evaluation faults yield 0.
pub fn evaluate_or_zero<L: ValueLookup + ?Sized>(formula: &Formula, lookup: &L) -> f64 {
    match formula.ast() {
        Some(ast) => evaluate(ast, lookup).unwrap_or(0.0),
        None => 0.0,
    }
}

fn apply_op(op: Op, l: f64, r: f64) -> Result<f64, EvalError> {
    match op {
        Op::Add => Ok(l + r),
        Op::Sub => Ok(l - r),
        Op::Mul => Ok(l * r),
        Op::Div => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(l / r)
        }
        Op::FloorDiv => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok((l / r).floor())
        }
        Op::Mod => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            // Result takes the sign of the divisor: -7 % 3 == 2
            Ok(l - r * (l / r).floor())
        }
        Op::Pow => {
            if l == 0.0 && r < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(l.powf(r))
        }
    }
}

fn compare(op: CmpOp, l: f64, r: f64) -> bool {
    match op {
        CmpOp::Lt => l < r,
        CmpOp::Gt => l > r,
        CmpOp::LtEq => l <= r,
        CmpOp::GtEq => l >= r,
        CmpOp::Eq => l == r,
        CmpOp::NotEq => l != r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;
    use rustc_hash::FxHashMap;

    struct MapLookup(FxHashMap<String, f64>);

    impl ValueLookup for MapLookup {
        fn resolve(&self, token: &RefToken) -> f64 {
            self.0.get(&token.to_string()).copied().unwrap_or(0.0)
        }
    }

    fn lookup(pairs: &[(&str, f64)]) -> MapLookup {
        MapLookup(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    fn eval_str(formula: &str, l: &MapLookup) -> Result<f64, EvalError> {
        evaluate(&parse(formula).unwrap(), l)
    }

    #[test]
    fn test_arithmetic() {
        let l = lookup(&[]);
        assert_eq!(eval_str("1 + 2 * 3", &l), Ok(7.0));
        assert_eq!(eval_str("(1 + 2) * 3", &l), Ok(9.0));
        assert_eq!(eval_str("10 / 4", &l), Ok(2.5));
        assert_eq!(eval_str("-2 ** 2", &l), Ok(-4.0));
        assert_eq!(eval_str("2 ** -1", &l), Ok(0.5));
        assert_eq!(eval_str("7 // 2", &l), Ok(3.0));
        assert_eq!(eval_str("-7 // 2", &l), Ok(-4.0));
        assert_eq!(eval_str("-7 % 3", &l), Ok(2.0));
    }

    #[test]
    fn test_refs_resolved_through_lookup() {
        let l = lookup(&[("{score}", 10.0), ("{B:bonus}", 5.0)]);
        assert_eq!(eval_str("{score} + {B:bonus}", &l), Ok(15.0));
        assert_eq!(eval_str("{score} + {B:missing}", &l), Ok(10.0));
    }

    #[test]
    fn test_comparisons_yield_one_or_zero() {
        let l = lookup(&[("{a}", 3.0)]);
        assert_eq!(eval_str("{a} > 2", &l), Ok(1.0));
        assert_eq!(eval_str("{a} == 2", &l), Ok(0.0));
        assert_eq!(eval_str("1 < {a} <= 3", &l), Ok(1.0));
        assert_eq!(eval_str("1 < {a} < 3", &l), Ok(0.0));
        assert_eq!(eval_str("({a} >= 3) * 10", &l), Ok(10.0));
    }

    #[test]
    fn test_division_by_zero_is_error() {
        let l = lookup(&[]);
        assert_eq!(eval_str("1 / 0", &l), Err(EvalError::DivisionByZero));
        assert_eq!(eval_str("1 % 0", &l), Err(EvalError::DivisionByZero));
        assert_eq!(eval_str("0 ** -1", &l), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_overflow_is_error() {
        let l = lookup(&[]);
        assert_eq!(eval_str("10 ** 400", &l), Err(EvalError::NonFinite));
    }

    #[test]
    fn test_evaluate_or_zero_fallbacks() {
        let l = lookup(&[("{a}", 4.0)]);
        assert_eq!(evaluate_or_zero(&Formula::new("{a} * 2"), &l), 8.0);
        assert_eq!(evaluate_or_zero(&Formula::new("{a} / 0"), &l), 0.0);
        assert_eq!(evaluate_or_zero(&Formula::new("{a} +"), &l), 0.0);
    }
}
