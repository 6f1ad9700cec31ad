// Formula parsing and evaluation

pub mod eval;
pub mod parser;
pub mod refs;

pub use eval::{evaluate, evaluate_or_zero, EvalError, ValueLookup};
pub use parser::{parse, Expr, Formula, RefToken};
