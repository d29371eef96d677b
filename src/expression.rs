//! Match filter expressions.
//!
//! Grammar:
//!
//! ```text
//! expr      := operand ((AND | OR) operand)*
//! operand   := condition | "(" expr ")"
//! condition := field ":" operation
//! field     := artist | title | album | artistWithTitle | artistInTitle
//! operation := match | contains | similarity [">=" number]
//! ```
//!
//! `AND` and `OR` share one precedence level and associate to the left:
//! `a OR b AND c` is `(a OR b) AND c`. Stored filters depend on this, so it
//! must not be changed to the usual "AND binds tighter" rule.
//!
//! Parsing never panics or throws: problems come back as a list of
//! human-readable messages for configuration UIs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{ComparisonMatrix, MatchField};

/// Threshold for `field:similarity` when no `>=n` is given.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Deepest parenthesis nesting `parse_expression` accepts.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Most conditions `parse_expression` accepts in one expression.
pub const MAX_CONDITIONS: usize = 256;

/// Joins "similarity >= 0.8" into one term before tokenizing.
static THRESHOLD_SPACING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*>=\s*").unwrap());

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Match,
    Contains,
    Similarity,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Match => "match",
            Operation::Contains => "contains",
            Operation::Similarity => "similarity",
        }
    }

    fn parse(s: &str) -> Option<Operation> {
        [Operation::Match, Operation::Contains, Operation::Similarity]
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    pub fn as_str(self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

/// Leaf test against one matrix field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Condition {
    pub field: MatchField,
    pub operation: Operation,
    /// Only for `similarity`; `None` means the default threshold
    pub threshold: Option<f64>,
}

impl Condition {
    pub fn new(field: MatchField, operation: Operation) -> Self {
        Self {
            field,
            operation,
            threshold: None,
        }
    }

    fn test(&self, matrix: &ComparisonMatrix, default_threshold: f64) -> bool {
        let result = matrix.get(self.field);
        match self.operation {
            Operation::Match => result.is_match,
            Operation::Contains => result.contains,
            Operation::Similarity => {
                result.similarity >= self.threshold.unwrap_or(default_threshold)
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.operation.as_str())?;
        if let Some(t) = self.threshold {
            write!(f, ">={}", t)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Condition(Condition),
    Binary {
        left: Box<Expr>,
        op: Combinator,
        right: Box<Expr>,
    },
    /// Parenthesised sub-expression, kept so printing reproduces the source
    Group(Box<Expr>),
}

impl Expr {
    /// Evaluate against a comparison matrix. `AND` stops on the first false
    /// operand, `OR` on the first true one. Pure: same inputs, same answer.
    pub fn evaluate(&self, matrix: &ComparisonMatrix, default_threshold: f64) -> bool {
        match self {
            Expr::Condition(c) => c.test(matrix, default_threshold),
            Expr::Group(inner) => inner.evaluate(matrix, default_threshold),
            Expr::Binary { left, op, right } => match op {
                Combinator::And => {
                    left.evaluate(matrix, default_threshold)
                        && right.evaluate(matrix, default_threshold)
                }
                Combinator::Or => {
                    left.evaluate(matrix, default_threshold)
                        || right.evaluate(matrix, default_threshold)
                }
            },
        }
    }

    /// Every condition in source order.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Expr::Condition(c) => out.push(c),
            Expr::Group(inner) => inner.collect_conditions(out),
            Expr::Binary { left, right, .. } => {
                left.collect_conditions(out);
                right.collect_conditions(out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Condition(c) => write!(f, "{}", c),
            Expr::Group(inner) => write!(f, "({})", inner),
            Expr::Binary { left, op, right } => write!(f, "{} {} {}", left, op.as_str(), right),
        }
    }
}

/// Evaluate with the default similarity threshold.
pub fn evaluate(expr: &Expr, matrix: &ComparisonMatrix) -> bool {
    expr.evaluate(matrix, DEFAULT_SIMILARITY_THRESHOLD)
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Op(Combinator),
    Term(Condition),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Op(op) => op.as_str().to_string(),
            Token::Term(c) => format!("'{}'", c),
        }
    }
}

fn field_names() -> String {
    MatchField::ALL
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_term(word: &str) -> Result<Condition, String> {
    let Some((field_text, rest)) = word.split_once(':') else {
        return Err(format!(
            "Invalid condition '{}': expected field:operation (e.g. artist:match)",
            word
        ));
    };

    let field = MatchField::ALL
        .into_iter()
        .find(|f| f.as_str().eq_ignore_ascii_case(field_text))
        .ok_or_else(|| {
            format!(
                "Unknown field '{}' in '{}'. Valid fields: {}",
                field_text,
                word,
                field_names()
            )
        })?;

    let (op_text, threshold_text) = match rest.split_once(">=") {
        Some((op, t)) => (op, Some(t)),
        None => (rest, None),
    };

    let operation = Operation::parse(op_text).ok_or_else(|| {
        format!(
            "Unknown operation '{}' in '{}'. Valid operations: match, contains, similarity",
            op_text, word
        )
    })?;

    let threshold = match threshold_text {
        None => None,
        Some(_) if operation != Operation::Similarity => {
            return Err(format!(
                "Threshold is only supported for similarity, found '{}'",
                word
            ));
        }
        Some(t) => match t.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v.clamp(0.0, 1.0)),
            _ => {
                return Err(format!(
                    "Invalid similarity threshold '{}' in '{}': expected a number between 0 and 1",
                    t, word
                ));
            }
        },
    };

    Ok(Condition {
        field,
        operation,
        threshold,
    })
}

/// Split an expression into tokens, collecting every lexical error.
fn tokenize(text: &str) -> Result<Vec<Token>, Vec<String>> {
    let joined = THRESHOLD_SPACING.replace_all(text, ">=");
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut word = String::new();

    let flush = |word: &mut String, tokens: &mut Vec<Token>, errors: &mut Vec<String>| {
        if word.is_empty() {
            return;
        }
        if word.eq_ignore_ascii_case("and") {
            tokens.push(Token::Op(Combinator::And));
        } else if word.eq_ignore_ascii_case("or") {
            tokens.push(Token::Op(Combinator::Or));
        } else {
            match parse_term(word) {
                Ok(c) => tokens.push(Token::Term(c)),
                Err(e) => errors.push(e),
            }
        }
        word.clear();
    };

    for c in joined.chars() {
        match c {
            '(' | ')' => {
                flush(&mut word, &mut tokens, &mut errors);
                tokens.push(if c == '(' { Token::LParen } else { Token::RParen });
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens, &mut errors),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens, &mut errors);

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

fn check_balance(text: &str) -> Option<String> {
    let mut depth: i32 = 0;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Some("Unbalanced parentheses: unexpected ')'".to_string());
                }
            }
            _ => {}
        }
    }
    if depth > 0 {
        Some(format!("Unbalanced parentheses: {} unclosed '('", depth))
    } else {
        None
    }
}

/// Nesting and size limits. The parser, evaluator and printer recurse over
/// the tree, so oversized input is rejected before a tree is built.
fn check_limits(tokens: &[Token]) -> Option<String> {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut conditions = 0usize;
    for token in tokens {
        match token {
            Token::LParen => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Term(_) => conditions += 1,
            Token::Op(_) => {}
        }
    }
    if deepest > MAX_NESTING_DEPTH {
        Some(format!(
            "Parentheses nested {} levels deep; at most {} are allowed",
            deepest, MAX_NESTING_DEPTH
        ))
    } else if conditions > MAX_CONDITIONS {
        Some(format!(
            "Expression has {} conditions; at most {} are allowed",
            conditions, MAX_CONDITIONS
        ))
    } else {
        None
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn previous(&self) -> Option<&Token> {
        self.pos.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    /// operand ((AND | OR) operand)*, folded to the left.
    fn parse_sequence(&mut self, nested: bool) -> Result<Expr, String> {
        let mut left = self.parse_operand()?;
        loop {
            match self.peek() {
                None => return Ok(left),
                Some(Token::RParen) if nested => return Ok(left),
                Some(Token::RParen) => {
                    return Err("Unbalanced parentheses: unexpected ')'".to_string());
                }
                Some(Token::Op(op)) => {
                    let op = *op;
                    self.pos += 1;
                    let right = self.parse_operand()?;
                    left = Expr::Binary {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    };
                }
                Some(other) => {
                    return Err(format!(
                        "Expected AND or OR before {}",
                        other.describe()
                    ));
                }
            }
        }
    }

    fn parse_operand(&mut self) -> Result<Expr, String> {
        let after = self.previous().map(Token::describe);
        match self.next() {
            Some(Token::Term(c)) => Ok(Expr::Condition(c)),
            Some(Token::LParen) => {
                if matches!(self.peek(), Some(Token::RParen)) {
                    return Err("Empty parentheses".to_string());
                }
                let inner = self.parse_sequence(true)?;
                match self.next() {
                    Some(Token::RParen) => Ok(Expr::Group(Box::new(inner))),
                    _ => Err("Unbalanced parentheses: missing ')'".to_string()),
                }
            }
            Some(Token::Op(op)) => Err(match after {
                Some(prev) => format!("Expected a condition after {} but found {}", prev, op.as_str()),
                None => format!("Expression cannot start with {}", op.as_str()),
            }),
            Some(Token::RParen) => Err("Unbalanced parentheses: unexpected ')'".to_string()),
            None => Err(match after {
                Some(prev) => format!("Expected a condition after {}", prev),
                None => "Expression is empty".to_string(),
            }),
        }
    }
}

/// Parse a match filter expression.
pub fn parse_expression(text: &str) -> Result<Expr, Vec<String>> {
    if text.trim().is_empty() {
        return Err(vec!["Expression is empty".to_string()]);
    }

    let tokens = match (tokenize(text), check_balance(text)) {
        (Ok(tokens), None) => tokens,
        (Ok(_), Some(balance)) => return Err(vec![balance]),
        (Err(mut errors), balance) => {
            errors.extend(balance);
            return Err(errors);
        }
    };

    if let Some(limit) = check_limits(&tokens) {
        return Err(vec![limit]);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_sequence(false).map_err(|e| vec![e])?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(vec![format!("Unexpected {}", t.describe())]),
    }
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate an expression without evaluating it.
pub fn validate_expression(text: &str) -> ValidationResult {
    match parse_expression(text) {
        Ok(_) => ValidationResult {
            valid: true,
            errors: Vec::new(),
        },
        Err(errors) => ValidationResult {
            valid: false,
            errors,
        },
    }
}

// ============================================================================
// UI Form
// ============================================================================

/// Flat, editor-friendly form of an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterUiItem {
    Condition {
        field: MatchField,
        operation: Operation,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f64>,
    },
    Operator {
        operator: Combinator,
    },
    GroupStart,
    GroupEnd,
}

fn push_ui_items(expr: &Expr, out: &mut Vec<FilterUiItem>) {
    match expr {
        Expr::Condition(c) => out.push(FilterUiItem::Condition {
            field: c.field,
            operation: c.operation,
            threshold: c.threshold,
        }),
        Expr::Group(inner) => {
            out.push(FilterUiItem::GroupStart);
            push_ui_items(inner, out);
            out.push(FilterUiItem::GroupEnd);
        }
        Expr::Binary { left, op, right } => {
            push_ui_items(left, out);
            out.push(FilterUiItem::Operator { operator: *op });
            push_ui_items(right, out);
        }
    }
}

/// Convert a stored expression into the UI item list.
pub fn expression_to_ui(text: &str) -> Result<Vec<FilterUiItem>, Vec<String>> {
    let expr = parse_expression(text)?;
    let mut items = Vec::new();
    push_ui_items(&expr, &mut items);
    Ok(items)
}

/// Convert UI items back into the stored expression text.
///
/// The output is always canonical: upper-case `AND`/`OR`, single spaces,
/// `>=` without spaces and thresholds in shortest form. Canonical input
/// round-trips byte for byte; other valid input comes back in canonical
/// form with the same meaning (`"title:similarity >= 0.80"` becomes
/// `"title:similarity>=0.8"`).
pub fn ui_to_expression(items: &[FilterUiItem]) -> String {
    let mut out = String::new();
    for item in items {
        let text = match item {
            FilterUiItem::Condition {
                field,
                operation,
                threshold,
            } => Condition {
                field: *field,
                operation: *operation,
                threshold: *threshold,
            }
            .to_string(),
            FilterUiItem::Operator { operator } => operator.as_str().to_string(),
            FilterUiItem::GroupStart => "(".to_string(),
            FilterUiItem::GroupEnd => ")".to_string(),
        };
        let glued = out.is_empty()
            || out.ends_with('(')
            || matches!(item, FilterUiItem::GroupEnd);
        if !glued {
            out.push(' ');
        }
        out.push_str(&text);
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
