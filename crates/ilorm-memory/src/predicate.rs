//! In-memory evaluation of a query's filter tree.
//!
//! A [`QueryState`] is compiled once per operation into a [`Predicate`] by
//! walking it with a [`FilterVisitor`]; `like` patterns become anchored
//! regexes at that point.

use ilorm_core::{
    Condition, ConnectorError, ConnectorErrorKind, Error, FilterVisitor, Operator, QueryState,
    Result, Row, Value,
};
use regex::Regex;
use std::cmp::Ordering;

enum Check {
    Compare {
        field: String,
        operator: Operator,
        value: Value,
    },
    Like {
        field: String,
        pattern: Regex,
    },
}

/// Compiled filter: every check holds and every OR group has a matching
/// branch.
#[derive(Default)]
pub(crate) struct Predicate {
    checks: Vec<Check>,
    any_of: Vec<Vec<Predicate>>,
}

impl Predicate {
    pub(crate) fn compile(query: &QueryState) -> Result<Self> {
        let mut builder = PredicateBuilder::default();
        query.query_builder(&mut builder);
        match builder.error {
            Some(e) => Err(e),
            None => Ok(builder.predicate),
        }
    }

    pub(crate) fn matches(&self, row: &Row) -> bool {
        self.checks.iter().all(|check| check.matches(row))
            && self
                .any_of
                .iter()
                .all(|group| group.iter().any(|branch| branch.matches(row)))
    }
}

#[derive(Default)]
struct PredicateBuilder {
    predicate: Predicate,
    error: Option<Error>,
}

impl FilterVisitor for PredicateBuilder {
    fn on_operator(&mut self, condition: &Condition) {
        let check = match condition.operator {
            Operator::Like => {
                let Some(pattern) = condition.value.as_str() else {
                    self.fail(format!("like on {} needs a text pattern", condition.field));
                    return;
                };
                match like_regex(pattern) {
                    Ok(pattern) => Check::Like {
                        field: condition.field.clone(),
                        pattern,
                    },
                    Err(e) => {
                        self.fail(format!("invalid like pattern {pattern:?}: {e}"));
                        return;
                    }
                }
            }
            operator => Check::Compare {
                field: condition.field.clone(),
                operator,
                value: condition.value.clone(),
            },
        };
        self.predicate.checks.push(check);
    }

    fn on_or(&mut self, branches: &[QueryState]) {
        let mut group = Vec::with_capacity(branches.len());
        for branch in branches {
            match Predicate::compile(branch) {
                Ok(predicate) => group.push(predicate),
                Err(e) => {
                    self.error.get_or_insert(e);
                    return;
                }
            }
        }
        self.predicate.any_of.push(group);
    }
}

impl PredicateBuilder {
    fn fail(&mut self, message: String) {
        self.error.get_or_insert(Error::Connector(ConnectorError {
            kind: ConnectorErrorKind::Unsupported,
            connector: None,
            message,
            source: None,
        }));
    }
}

impl Check {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Check::Like { field, pattern } => row
                .get_by_name(field)
                .and_then(Value::as_str)
                .is_some_and(|text| pattern.is_match(text)),
            Check::Compare {
                field,
                operator,
                value,
            } => {
                let actual = row.get_by_name(field).unwrap_or(&Value::Null);
                compare(actual, *operator, value)
            }
        }
    }
}

fn compare(actual: &Value, operator: Operator, expected: &Value) -> bool {
    let in_list = || {
        expected
            .as_array()
            .is_some_and(|items| items.iter().any(|item| actual.loose_eq(item)))
    };
    let between = || match expected.as_array() {
        Some([min, max]) => {
            matches!(
                actual.compare(min),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(actual.compare(max), Some(Ordering::Less | Ordering::Equal))
        }
        _ => false,
    };

    match operator {
        Operator::Is => actual.loose_eq(expected),
        Operator::IsNot => !actual.loose_eq(expected),
        Operator::IsIn => in_list(),
        Operator::IsNotIn => !in_list(),
        Operator::Between => between(),
        Operator::NotBetween => !actual.is_null() && !between(),
        Operator::GreaterThan => actual.compare(expected) == Some(Ordering::Greater),
        Operator::GreaterOrEqual => matches!(
            actual.compare(expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::LowerThan => actual.compare(expected) == Some(Ordering::Less),
        Operator::LowerOrEqual => matches!(
            actual.compare(expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Exists => !actual.is_null() == expected.as_bool().unwrap_or(true),
        // Compiled separately.
        Operator::Like => false,
    }
}

/// Translate a SQL `like` pattern into an anchored regex.
fn like_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?s)^");
    let mut buf = [0_u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    source.push('$');
    Regex::new(&source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str, age: i64) -> Row {
        Row::from_pairs([
            ("firstName", Value::from(first)),
            ("lastName", Value::from(last)),
            ("age", Value::BigInt(age)),
        ])
    }

    fn predicate(conditions: &[Condition]) -> Predicate {
        let mut state = QueryState::new("users");
        for c in conditions {
            state.push_condition(c.clone());
        }
        Predicate::compile(&state).unwrap()
    }

    #[test]
    fn test_comparison_operators() {
        let row = user("Guillaume", "Daix", 30);
        let cases = [
            (Condition::new("age", Operator::Is, 30), true),
            (Condition::new("age", Operator::Is, 30.0), true),
            (Condition::new("age", Operator::IsNot, 30), false),
            (Condition::new("age", Operator::IsIn, [10, 30]), true),
            (Condition::new("age", Operator::IsNotIn, [10, 20]), true),
            (Condition::new("age", Operator::Between, [25, 35]), true),
            (Condition::new("age", Operator::Between, [30, 30]), true),
            (Condition::new("age", Operator::NotBetween, [25, 35]), false),
            (Condition::new("age", Operator::GreaterThan, 30), false),
            (Condition::new("age", Operator::GreaterOrEqual, 30), true),
            (Condition::new("age", Operator::LowerThan, 31), true),
            (Condition::new("age", Operator::LowerOrEqual, 29), false),
            (Condition::new("email", Operator::Exists, false), true),
            (Condition::new("firstName", Operator::Exists, true), true),
        ];
        for (condition, expected) in cases {
            assert_eq!(
                predicate(std::slice::from_ref(&condition)).matches(&row),
                expected,
                "{condition:?}"
            );
        }
    }

    #[test]
    fn test_like_patterns() {
        let row = user("Guillaume", "Daix", 30);
        assert!(predicate(&[Condition::new("firstName", Operator::Like, "Guil%")]).matches(&row));
        assert!(predicate(&[Condition::new("lastName", Operator::Like, "D_ix")]).matches(&row));
        assert!(!predicate(&[Condition::new("lastName", Operator::Like, "D_x")]).matches(&row));
        assert!(!predicate(&[Condition::new("firstName", Operator::Like, "%.%")]).matches(&row));
        assert!(!predicate(&[Condition::new("age", Operator::Like, "3%")]).matches(&row));
    }

    #[test]
    fn test_or_groups() {
        let mut state = QueryState::new("users");
        state.push_condition(Condition::new("lastName", Operator::Is, "Daix"));
        let mut guillaume = QueryState::new("users");
        guillaume.push_condition(Condition::new("firstName", Operator::Is, "Guillaume"));
        let mut tom = QueryState::new("users");
        tom.push_condition(Condition::new("firstName", Operator::Is, "Tom"));
        state.push_or_group(vec![guillaume, tom]);
        let predicate = Predicate::compile(&state).unwrap();

        assert!(predicate.matches(&user("Guillaume", "Daix", 30)));
        assert!(predicate.matches(&user("Tom", "Daix", 12)));
        assert!(!predicate.matches(&user("Ana", "Daix", 40)));
        assert!(!predicate.matches(&user("Tom", "Martin", 12)));
    }

    #[test]
    fn test_like_requires_text_pattern() {
        let mut state = QueryState::new("users");
        state.push_condition(Condition::new("firstName", Operator::Like, 3));
        assert!(Predicate::compile(&state).is_err());
    }
}
