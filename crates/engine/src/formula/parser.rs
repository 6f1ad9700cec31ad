// Formula parser - converts formula strings into AST
// Supports: numbers, column refs ({col}, {page:col}), + - * / // % **, unary +/-,
// parentheses, and comparisons (< > <= >= == !=) which yield 1 or 0.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::column_id::ColumnId;

use super::refs::extract_refs;

/// A `{column}` or `{page:column}` placeholder inside a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefToken {
    /// `None` for same-page references.
    pub page: Option<String>,
    pub column: String,
}

impl RefToken {
    /// Split the text between the braces. The first `:` separates page and column.
    pub fn from_inner(inner: &str) -> Self {
        match inner.split_once(':') {
            Some((page, column)) => Self {
                page: Some(page.to_string()),
                column: column.to_string(),
            },
            None => Self {
                page: None,
                column: inner.to_string(),
            },
        }
    }

    /// The column this token points at when written in a formula on `formula_page`.
    pub fn resolve(&self, formula_page: &str) -> ColumnId {
        ColumnId::new(self.page.as_deref().unwrap_or(formula_page), self.column.as_str())
    }

    /// True if the token refers to a column of `formula_page` itself.
    pub fn is_same_page(&self, formula_page: &str) -> bool {
        self.page.as_deref().map_or(true, |p| p == formula_page)
    }
}

impl fmt::Display for RefToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.page {
            Some(page) => write!(f, "{{{}:{}}}", page, self.column),
            None => write!(f, "{{{}}}", self.column),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ref(RefToken),
    Neg(Box<Expr>),
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Chained comparison: `a < b <= c` means `a < b and b <= c`.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv, // //
    Mod,      // %
    Pow,      // **
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
}

/// A column formula: the source text, the distinct references it contains,
/// and the parsed AST (`None` if the text does not parse; such formulas
/// evaluate to 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Formula {
    source: String,
    refs: Vec<RefToken>,
    ast: Option<Expr>,
    parse_error: Option<String>,
}

impl Formula {
    pub fn new(source: &str) -> Self {
        let source = source.trim().to_string();
        let refs = extract_refs(&source);
        let (ast, parse_error) = match parse(&source) {
            Ok(ast) => (Some(ast), None),
            Err(e) => (None, Some(e)),
        };
        Self { source, refs, ast, parse_error }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct reference tokens, in order of first appearance.
    pub fn refs(&self) -> &[RefToken] {
        &self.refs
    }

    pub fn ast(&self) -> Option<&Expr> {
        self.ast.as_ref()
    }

    pub fn parse_error(&self) -> Option<&str> {
        self.parse_error.as_deref()
    }
}

impl From<String> for Formula {
    fn from(source: String) -> Self {
        Formula::new(&source)
    }
}

impl From<Formula> for String {
    fn from(formula: Formula) -> Self {
        formula.source
    }
}

/// Parse a formula string into an AST.
pub fn parse(formula: &str) -> Result<Expr, String> {
    let tokens = tokenize(formula.trim())?;
    if tokens.is_empty() {
        return Err("Empty formula".to_string());
    }
    let (expr, pos) = parse_comparison(&tokens, 0)?;
    if pos < tokens.len() {
        return Err(format!("Unexpected token at position {}", pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ref(RefToken),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    NotEq,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '%' => { tokens.push(Token::Percent); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::StarStar);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    tokens.push(Token::SlashSlash);
                } else {
                    tokens.push(Token::Slash);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::LtEq);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::GtEq);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' | '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(format!("Expected '=' after '{}'", c));
                }
                tokens.push(if c == '=' { Token::EqEq } else { Token::NotEq });
            }
            '{' => {
                chars.next(); // consume opening brace
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => inner.push(ch),
                        None => return Err("Unterminated reference".to_string()),
                    }
                }
                tokens.push(Token::Ref(RefToken::from_inner(&inner)));
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == '_' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Exponent: 1e3, 2.5E-4
                if matches!(chars.peek(), Some('e') | Some('E')) {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exp = String::from("e");
                    if let Some(&sign) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exp.push(sign);
                            lookahead.next();
                        }
                    }
                    if lookahead.peek().map_or(false, |d| d.is_ascii_digit()) {
                        while let Some(&d) = lookahead.peek() {
                            if d.is_ascii_digit() {
                                exp.push(d);
                                lookahead.next();
                            } else {
                                break;
                            }
                        }
                        num_str.push_str(&exp);
                        chars = lookahead;
                    }
                }
                let cleaned = num_str.replace('_', "");
                let num: f64 = cleaned
                    .parse()
                    .map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

// Lowest precedence: comparison operators
fn parse_comparison(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (first, mut pos) = parse_add_sub(tokens, pos)?;
    let mut rest = Vec::new();

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Lt => CmpOp::Lt,
            Token::Gt => CmpOp::Gt,
            Token::LtEq => CmpOp::LtEq,
            Token::GtEq => CmpOp::GtEq,
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::NotEq,
            _ => break,
        };
        let (right, new_pos) = parse_add_sub(tokens, pos + 1)?;
        rest.push((op, right));
        pos = new_pos;
    }

    if rest.is_empty() {
        Ok((first, pos))
    } else {
        Ok((Expr::Compare { first: Box::new(first), rest }, pos))
    }
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            Token::SlashSlash => Op::FloorDiv,
            Token::Percent => Op::Mod,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

// Unary sign binds looser than `**`: -2**2 == -4
fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    match tokens.get(pos) {
        Some(Token::Plus) => parse_unary(tokens, pos + 1),
        Some(Token::Minus) => {
            let (operand, pos) = parse_unary(tokens, pos + 1)?;
            Ok((Expr::Neg(Box::new(operand)), pos))
        }
        _ => parse_power(tokens, pos),
    }
}

// Exponentiation (**) - right-associative; the exponent may carry a sign (2**-1)
fn parse_power(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (base, pos) = parse_primary(tokens, pos)?;

    if let Some(Token::StarStar) = tokens.get(pos) {
        let (exponent, new_pos) = parse_unary(tokens, pos + 1)?;
        return Ok((
            Expr::BinaryOp {
                op: Op::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            new_pos,
        ));
    }

    Ok((base, pos))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let Some(token) = tokens.get(pos) else {
        return Err("Unexpected end of expression".to_string());
    };

    match token {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::Ref(token) => Ok((Expr::Ref(token.clone()), pos + 1)),
        Token::LParen => {
            let (expr, pos) = parse_comparison(tokens, pos + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                Some(_) => Err("Expected closing parenthesis".to_string()),
                None => Err("Missing closing parenthesis".to_string()),
            }
        }
        _ => Err(format!("Unexpected token at position {}", pos)),
    }
}
