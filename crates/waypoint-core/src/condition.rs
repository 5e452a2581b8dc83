//! Condition language used by decision routes
//!
//! A condition is either a boolean literal or a single comparison of the
//! form `<identifier> <op> <literal>`, where `op` is one of `==`, `!=`,
//! `>`, `>=`, `<`, `<=`. The literal is coerced to the type of the
//! variable it is compared against. Anything that does not parse, and any
//! comparison against a missing variable, evaluates to `false`.

use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;

use crate::types::{parse_timestamp, Value, Variables};

lazy_static! {
    // Two-character operators come first so `>=` is never read as `>` followed by `=...`
    static ref COMPARISON_REGEX: Regex =
        Regex::new(r"^\s*(\w+)\s*(==|!=|>=|<=|>|<)\s*(.+?)\s*$").unwrap();
}

/// Evaluates route conditions against a variable context
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate `condition`; never fails, unparsable conditions are `false`
    fn evaluate(&self, condition: &str, context: &Variables) -> bool;
}

/// Evaluator for the single-comparison condition language
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleConditionEvaluator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            _ => None,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
        }
    }
}

impl ConditionEvaluator for SimpleConditionEvaluator {
    fn evaluate(&self, condition: &str, context: &Variables) -> bool {
        let condition = condition.trim();
        if condition.is_empty() || condition.eq_ignore_ascii_case("true") {
            return true;
        }
        if condition.eq_ignore_ascii_case("false") {
            return false;
        }

        let Some(captures) = COMPARISON_REGEX.captures(condition) else {
            tracing::debug!(condition, "Unrecognized condition, evaluating to false");
            return false;
        };

        let Some(operator) = Operator::parse(&captures[2]) else {
            return false;
        };

        let Some(actual) = context.get(&captures[1]) else {
            return false;
        };

        let literal = captures[3].trim_matches(&['"', '\''][..]);

        match compare(actual, literal) {
            Some(ordering) => operator.holds(ordering),
            None => false,
        }
    }
}

/// Compare a variable against a literal coerced to the variable's type.
/// Falls back to an ordinal comparison of the rendered strings when the
/// literal cannot be coerced.
fn compare(actual: &Value, literal: &str) -> Option<Ordering> {
    match actual {
        Value::Null => Some(Ordering::Less),
        Value::Integer(a) => match literal.parse::<i64>() {
            Ok(b) => Some(a.cmp(&b)),
            Err(_) => Some(ordinal(actual, literal)),
        },
        Value::Float(a) => match literal.parse::<f64>() {
            Ok(b) => a.partial_cmp(&b),
            Err(_) => Some(ordinal(actual, literal)),
        },
        Value::Boolean(a) => match parse_bool(literal) {
            Some(b) => Some(a.cmp(&b)),
            None => Some(ordinal(actual, literal)),
        },
        Value::Timestamp(a) => match parse_timestamp(literal) {
            Some(b) => Some(a.cmp(&b)),
            None => Some(ordinal(actual, literal)),
        },
        Value::String(s) => Some(s.as_str().cmp(literal)),
        Value::List(_) | Value::Map(_) => Some(ordinal(actual, literal)),
    }
}

fn ordinal(actual: &Value, literal: &str) -> Ordering {
    actual.to_string().as_str().cmp(literal)
}

fn parse_bool(literal: &str) -> Option<bool> {
    if literal.eq_ignore_ascii_case("true") {
        Some(true)
    } else if literal.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
