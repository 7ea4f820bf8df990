//! Integer expression evaluator.
//!
//! Loop-bound and subscript strings coming out of the polyhedral analysis
//! are evaluated here once every symbolic name has been replaced by a
//! parenthesized literal. The grammar is `+ - * /`, parentheses and integer
//! literals. Parsing scans right to left and splits at the rightmost
//! operator of the loosest binding class, which keeps `a - b - c` left
//! associative. A parenthesized group directly following an operand, as in
//! `3(4)` or `(2)(5)`, multiplies.

use crate::utils::errors::{ExprError, ExprErrorKind};
use log::warn;
use std::fmt;

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'+' => Some(BinOp::Add),
            b'-' => Some(BinOp::Sub),
            b'*' => Some(BinOp::Mul),
            b'/' => Some(BinOp::Div),
            _ => None,
        }
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(i64),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    /// Evaluate with checked arithmetic. Division truncates toward zero.
    pub fn eval(&self) -> Result<i64, ExprError> {
        match self {
            Expr::Literal(v) => Ok(*v),
            Expr::Neg(inner) => inner
                .eval()?
                .checked_neg()
                .ok_or_else(|| overflow(self)),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval()?;
                let r = rhs.eval()?;
                let value = match op {
                    BinOp::Add => l.checked_add(r),
                    BinOp::Sub => l.checked_sub(r),
                    BinOp::Mul => l.checked_mul(r),
                    BinOp::Div => {
                        if r == 0 {
                            return Err(ExprError::new(
                                ExprErrorKind::DivisionByZero,
                                "division by zero",
                                self.to_string(),
                            ));
                        }
                        l.checked_div(r)
                    }
                };
                value.ok_or_else(|| overflow(self))
            }
        }
    }
}

fn overflow(expr: &Expr) -> ExprError {
    ExprError::new(ExprErrorKind::Overflow, "integer overflow", expr.to_string())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) if *v < 0 => write!(f, "({})", v),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Neg(inner) => write!(f, "(-{})", inner),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

/// Parse an expression string into a tree.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let compact: Vec<u8> = input.bytes().filter(|b| !b.is_ascii_whitespace()).collect();

    let mut depth = 0i32;
    for &b in &compact {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
    }
    if depth != 0 {
        return Err(ExprError::new(ExprErrorKind::UnbalancedParens, "unbalanced parentheses", input));
    }

    parse_slice(&compact, input)
}

/// Parse and evaluate.
pub fn evaluate(input: &str) -> Result<i64, ExprError> {
    parse(input)?.eval()
}

/// Parse and evaluate, falling back to `0` on any error.
///
/// Bound computations tolerate a conservative estimate better than an abort,
/// so detection uses this variant. The failure is logged at warn level so a
/// substitution gap stays visible.
pub fn evaluate_lenient(input: &str) -> i64 {
    match evaluate(input) {
        Ok(v) => v,
        Err(e) => {
            warn!("treating unevaluable expression as 0: {}", e);
            0
        }
    }
}

fn is_operator(b: u8) -> bool {
    matches!(b, b'+' | b'-' | b'*' | b'/')
}

fn parse_slice(s: &[u8], input: &str) -> Result<Expr, ExprError> {
    if s.is_empty() {
        return Err(ExprError::new(ExprErrorKind::Empty, "empty operand", input));
    }

    // Additive split: rightmost binary + or - at depth 0.
    let mut depth = 0i32;
    for i in (1..s.len()).rev() {
        match s[i] {
            b')' => depth += 1,
            b'(' => depth -= 1,
            b'+' | b'-' if depth == 0 => {
                let prev = s[i - 1];
                if !is_operator(prev) && prev != b'(' {
                    let op = BinOp::from_byte(s[i]).unwrap_or(BinOp::Add);
                    return Ok(Expr::binary(
                        op,
                        parse_slice(&s[..i], input)?,
                        parse_slice(&s[i + 1..], input)?,
                    ));
                }
            }
            _ => {}
        }
    }

    // Multiplicative split, including juxtaposed groups.
    let mut depth = 0i32;
    for i in (1..s.len()).rev() {
        match s[i] {
            b')' => {
                if depth == 0 && i + 1 < s.len() && s[i + 1].is_ascii_digit() {
                    return Ok(Expr::binary(
                        BinOp::Mul,
                        parse_slice(&s[..=i], input)?,
                        parse_slice(&s[i + 1..], input)?,
                    ));
                }
                depth += 1;
            }
            b'(' => {
                depth -= 1;
                let prev = s[i - 1];
                if depth == 0 && !is_operator(prev) && prev != b'(' {
                    return Ok(Expr::binary(
                        BinOp::Mul,
                        parse_slice(&s[..i], input)?,
                        parse_slice(&s[i..], input)?,
                    ));
                }
            }
            b'*' | b'/' if depth == 0 => {
                let op = if s[i] == b'*' { BinOp::Mul } else { BinOp::Div };
                return Ok(Expr::binary(
                    op,
                    parse_slice(&s[..i], input)?,
                    parse_slice(&s[i + 1..], input)?,
                ));
            }
            _ => {}
        }
    }

    match s[0] {
        b'(' => {
            if s[s.len() - 1] != b')' {
                return Err(ExprError::new(ExprErrorKind::UnbalancedParens, "unbalanced parentheses", input));
            }
            parse_slice(&s[1..s.len() - 1], input)
        }
        b'-' => Ok(Expr::Neg(Box::new(parse_slice(&s[1..], input)?))),
        b'+' => parse_slice(&s[1..], input),
        _ => {
            let text = std::str::from_utf8(s).unwrap_or_default();
            text.parse::<i64>().map(Expr::Literal).map_err(|_| {
                ExprError::new(
                    ExprErrorKind::InvalidTerminal,
                    format!("`{}` is not an integer literal", text),
                    input,
                )
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_loop_bound_expression() {
        let v = evaluate("2 + 3840*(-1 + (720)) + 3*(-1 + (1280)) + 1").unwrap();
        assert_eq!(v, 2 + 3840 * 719 + 3 * 1279 + 1);
        assert_eq!(v, 2762882);
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(evaluate("10 - 3 - 2").unwrap(), 5);
        assert_eq!(evaluate("100 / 10 / 5").unwrap(), 2);
        assert_eq!(evaluate("2*3 + 4*5").unwrap(), 26);
        assert_eq!(evaluate("2 - -3").unwrap(), 5);
        assert_eq!(evaluate("2 * -3").unwrap(), -6);
    }

    #[test]
    fn test_truncating_division() {
        assert_eq!(evaluate("7 / 2").unwrap(), 3);
        assert_eq!(evaluate("-7 / 2").unwrap(), -3);
        assert_eq!(evaluate("7 / (-2)").unwrap(), -3);
    }

    #[test]
    fn test_juxtaposition_multiplies() {
        assert_eq!(evaluate("3(4)").unwrap(), 12);
        assert_eq!(evaluate("(2)(5)").unwrap(), 10);
        assert_eq!(evaluate("(2)3").unwrap(), 6);
        assert_eq!(evaluate("1 + 2(3 + 4)").unwrap(), 15);
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate("").unwrap_err().kind, ExprErrorKind::Empty);
        assert_eq!(evaluate("(1 + 2").unwrap_err().kind, ExprErrorKind::UnbalancedParens);
        assert_eq!(evaluate("n + 1").unwrap_err().kind, ExprErrorKind::InvalidTerminal);
        assert_eq!(evaluate("4 / (2 - 2)").unwrap_err().kind, ExprErrorKind::DivisionByZero);
        assert_eq!(evaluate("9223372036854775807 + 1").unwrap_err().kind, ExprErrorKind::Overflow);
        assert_eq!(evaluate_lenient("-1 + n"), 0);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let s = "(1 + 2) * 3 - 4 / 2";
        assert_eq!(parse(s).unwrap(), parse(s).unwrap());
        assert_eq!(evaluate(s).unwrap(), 7);
    }

    fn arb_expr() -> impl Strategy<Value = Expr> {
        let leaf = (-50i64..50).prop_map(Expr::Literal);
        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|e| Expr::Neg(Box::new(e))),
                (
                    prop_oneof![Just(BinOp::Add), Just(BinOp::Sub), Just(BinOp::Mul), Just(BinOp::Div)],
                    inner.clone(),
                    inner,
                )
                    .prop_map(|(op, l, r)| Expr::binary(op, l, r)),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_display_round_trip_preserves_value(tree in arb_expr()) {
            let reparsed = parse(&tree.to_string()).unwrap();
            prop_assert_eq!(reparsed.eval().ok(), tree.eval().ok());
        }
    }
}
