//! The condition language used to scan tables, and the lazy key iterator that applies it.

use crate::error::{AcgError, Result};
use crate::records::{Id, Record};
use crate::util::indexing;

use serde_json::Value;

use std::cmp::Ordering;
use std::fmt::Debug;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

/// A caller-supplied test over a field and, if a comparison partner was given, the partner's
///   field of the same name.
pub type Predicate = Arc<dyn Fn(&Value, Option<&Value>) -> bool + Send + Sync>;

/// An ordered list of conditions and how to chain them.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) chaining: Chaining,
}

/// One test of a record field.
#[derive(Debug, Clone)]
pub struct Condition {
    pub(crate) key: String,
    pub(crate) op: Operator,
    pub(crate) rhs: Option<Value>,
}

/// The comparison a condition performs.
#[derive(Clone)]
pub enum Operator {
    /// The field equals the right-hand side.
    Equals,
    /// The field is greater than the right-hand side, numerically or lexicographically.
    Greater,
    /// The field is less than the right-hand side, numerically or lexicographically.
    Lesser,
    /// Both are strings and equal ignoring case.
    EqualsInsensitive,
    /// Both are strings and the field contains the right-hand side.
    Includes,
    /// Both are strings and the field contains the right-hand side ignoring case.
    IncludesInsensitive,
    /// Both are lists and share at least one element.
    IncludesSet,
    /// The predicate holds. Expensive, use sparingly.
    Custom(Predicate),
}

/// How the results of the conditions of a query combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chaining {
    /// Every condition must match. The first failure stops evaluation.
    And,
    /// One condition must match. The first success stops evaluation.
    Or,
}

impl Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equals => write!(f, "Equals"),
            Self::Greater => write!(f, "Greater"),
            Self::Lesser => write!(f, "Lesser"),
            Self::EqualsInsensitive => write!(f, "EqualsInsensitive"),
            Self::Includes => write!(f, "Includes"),
            Self::IncludesInsensitive => write!(f, "IncludesInsensitive"),
            Self::IncludesSet => write!(f, "IncludesSet"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Condition {
    /// A condition comparing against the comparison partner's field of the same name.
    pub fn new(key: impl AsRef<str>, op: Operator) -> Self {
        Self {
            key: key.as_ref().to_string(),
            op,
            rhs: None,
        }
    }

    /// A condition comparing against a fixed right-hand side.
    pub fn with_rhs(key: impl AsRef<str>, op: Operator, rhs: impl Into<Value>) -> Self {
        Self {
            key: key.as_ref().to_string(),
            op,
            rhs: Some(rhs.into()),
        }
    }

    /// A custom predicate over the field.
    pub fn custom<F>(key: impl AsRef<str>, predicate: F) -> Self
    where
        F: Fn(&Value, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self::new(key, Operator::Custom(Arc::new(predicate)))
    }

    /// The dotted path of the field this condition tests.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn has_rhs(&self) -> bool {
        self.rhs.is_some() || matches!(self.op, Operator::Custom(_))
    }

    /// Evaluates the condition. Absent operands never match.
    pub fn matches(&self, json: &Value, partner: Option<&Value>) -> Result<bool> {
        let partner_value = partner.and_then(|p| indexing::get_value(&self.key, p));
        let lhs = match indexing::get_value(&self.key, json) {
            Some(lhs) => lhs,
            None => return Ok(false),
        };

        if let Operator::Custom(predicate) = &self.op {
            return Ok(predicate(lhs, partner_value));
        }

        let rhs = match self.rhs.as_ref().or(partner_value) {
            Some(rhs) if !rhs.is_null() => rhs,
            _ => return Ok(false),
        };

        match &self.op {
            Operator::Equals => Ok(lhs == rhs),
            Operator::Greater => Ok(self.order(lhs, rhs)? == Ordering::Greater),
            Operator::Lesser => Ok(self.order(lhs, rhs)? == Ordering::Less),
            Operator::EqualsInsensitive => {
                let (lhs, rhs) = self.strings(lhs, rhs)?;
                Ok(lhs.to_lowercase() == rhs.to_lowercase())
            }
            Operator::Includes => {
                let (lhs, rhs) = self.strings(lhs, rhs)?;
                Ok(lhs.contains(rhs))
            }
            Operator::IncludesInsensitive => {
                let (lhs, rhs) = self.strings(lhs, rhs)?;
                Ok(lhs.to_lowercase().contains(&rhs.to_lowercase()))
            }
            Operator::IncludesSet => match (lhs.as_array(), rhs.as_array()) {
                (Some(lhs), Some(rhs)) => Ok(rhs.iter().any(|item| lhs.contains(item))),
                _ => Err(AcgError::Query(format!(
                    "cannot perform {:?} on non array field `{}`",
                    self.op, self.key
                ))),
            },
            Operator::Custom(_) => unreachable!("handled above"),
        }
    }

    fn strings<'a>(&self, lhs: &'a Value, rhs: &'a Value) -> Result<(&'a str, &'a str)> {
        match (lhs.as_str(), rhs.as_str()) {
            (Some(lhs), Some(rhs)) => Ok((lhs, rhs)),
            _ => Err(AcgError::Query(format!(
                "cannot perform {:?} on non string field `{}`",
                self.op, self.key
            ))),
        }
    }

    fn order(&self, lhs: &Value, rhs: &Value) -> Result<Ordering> {
        let ordering = match (lhs, rhs) {
            (Value::Number(lhs), Value::Number(rhs)) => lhs
                .as_f64()
                .zip(rhs.as_f64())
                .and_then(|(lhs, rhs)| lhs.partial_cmp(&rhs)),
            (Value::String(lhs), Value::String(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        };

        ordering.ok_or_else(|| {
            AcgError::Query(format!(
                "cannot order `{}`: {} against {}",
                self.key, lhs, rhs
            ))
        })
    }
}

impl Query {
    /// A query without conditions, which matches every record.
    pub fn all() -> Self {
        Self::and(Vec::new())
    }

    /// Every condition must match.
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            chaining: Chaining::And,
        }
    }

    /// At least one condition must match.
    pub fn or(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            chaining: Chaining::Or,
        }
    }

    /// The conditions of the query, in evaluation order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// How the conditions combine.
    pub fn chaining(&self) -> Chaining {
        self.chaining
    }

    /// Checks that the query can be evaluated at all with this comparison partner.
    ///
    /// Fails if no condition has a right-hand side and there is no partner to take one from.
    pub fn validate(&self, partner: Option<&Value>) -> Result<()> {
        if partner.is_none()
            && !self.conditions.is_empty()
            && self.conditions.iter().all(|c| !c.has_rhs())
        {
            return Err(AcgError::Query(
                "no condition has a right-hand side and no comparison partner was given"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Evaluates the query against the JSON form of a record.
    pub fn matches(&self, json: &Value, partner: Option<&Value>) -> Result<bool> {
        match self.chaining {
            Chaining::And => {
                for condition in &self.conditions {
                    if !condition.matches(json, partner)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Chaining::Or => {
                if self.conditions.is_empty() {
                    return Ok(true);
                }
                for condition in &self.conditions {
                    if condition.matches(json, partner)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl From<Condition> for Query {
    fn from(condition: Condition) -> Self {
        Self::and(vec![condition])
    }
}

impl BitAnd for Query {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self {
            conditions: self.conditions.into_iter().chain(rhs.conditions).collect(),
            chaining: Chaining::And,
        }
    }
}

impl BitOr for Query {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            conditions: self.conditions.into_iter().chain(rhs.conditions).collect(),
            chaining: Chaining::Or,
        }
    }
}

pub(crate) enum Filter<T> {
    All,
    Predicate(Box<dyn Fn(&T) -> bool + Send + Sync>),
    Query {
        query: Query,
        partner: Option<Value>,
    },
}

/// A lazy scan over the ids of a table.
///
/// The rows are copied out under a short read lock when the scan starts, so the table is not
///   held while the caller works through the ids. Rows added or removed afterwards are not seen.
pub struct Keys<T> {
    rows: Option<std::vec::IntoIter<T>>,
    filter: Filter<T>,
}

impl<T: Record> Keys<T> {
    pub(crate) fn new(rows: Vec<T>, filter: Filter<T>) -> Self {
        Self {
            rows: Some(rows.into_iter()),
            filter,
        }
    }

    /// Ends the scan early.
    pub fn stop(&mut self) {
        self.rows = None;
    }

    /// Whether the scan may still yield ids.
    pub fn is_active(&self) -> bool {
        self.rows.is_some()
    }

    fn accepts(&self, entry: &T) -> Result<bool> {
        match &self.filter {
            Filter::All => Ok(true),
            Filter::Predicate(predicate) => Ok(predicate(entry)),
            Filter::Query { query, partner } => {
                let json = serde_json::to_value(entry)?;
                query.matches(&json, partner.as_ref())
            }
        }
    }
}

impl<T: Record> Iterator for Keys<T> {
    type Item = Result<Id>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.rows.as_mut()?.next() {
                Some(entry) => entry,
                None => {
                    self.stop();
                    return None;
                }
            };

            match self.accepts(&entry) {
                Ok(true) => return Some(Ok(entry.id())),
                Ok(false) => continue,
                Err(e) => {
                    self.stop();
                    return Some(Err(e));
                }
            }
        }
    }
}
