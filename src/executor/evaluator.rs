//! Resolved predicate trees and their evaluation.
//!
//! Predicates reach this module with column names already turned into
//! positions (see `planner`). Evaluation is total: a missing column or a pair
//! of operands of different types makes the comparison false, never an error.

use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

impl CompareOp {
    /// Derive the operator's result from a single (is_less, is_greater) pair
    fn holds(self, less: bool, greater: bool) -> bool {
        match self {
            CompareOp::Eq => !less && !greater,
            CompareOp::NotEq => less || greater,
            CompareOp::Gt => greater,
            CompareOp::GtEq => !less,
            CompareOp::Lt => less,
            CompareOp::LtEq => !greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Which table of a join a column belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinedColumn {
    pub side: Side,
    pub index: usize,
}

impl JoinedColumn {
    pub fn left(index: usize) -> Self {
        JoinedColumn { side: Side::Left, index }
    }

    pub fn right(index: usize) -> Self {
        JoinedColumn { side: Side::Right, index }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand<C> {
    Constant(Value),
    Column(C),
}

/// Boolean expression tree over columns addressed by `C`.
///
/// `Predicate<usize>` filters one table, `Predicate<JoinedColumn>` filters a
/// joined pair of rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<C> {
    Always,
    Logic {
        op: LogicOp,
        left: Box<Predicate<C>>,
        right: Box<Predicate<C>>,
    },
    Comparison {
        op: CompareOp,
        left: Operand<C>,
        right: Operand<C>,
    },
    Contains {
        left: Operand<C>,
        right: Operand<C>,
    },
}

/// Anything a predicate can read column values from
pub trait Columns<C> {
    fn column(&self, column: &C) -> Option<&Value>;
}

impl Columns<usize> for [Value] {
    fn column(&self, column: &usize) -> Option<&Value> {
        self.get(*column)
    }
}

impl Columns<usize> for Vec<Value> {
    fn column(&self, column: &usize) -> Option<&Value> {
        self.get(*column)
    }
}

impl Columns<JoinedColumn> for (&[Value], &[Value]) {
    fn column(&self, column: &JoinedColumn) -> Option<&Value> {
        match column.side {
            Side::Left => self.0.get(column.index),
            Side::Right => self.1.get(column.index),
        }
    }
}

impl<C> Operand<C> {
    fn resolve<'a, R: Columns<C> + ?Sized>(&'a self, row: &'a R) -> Option<&'a Value> {
        match self {
            Operand::Constant(value) => Some(value),
            Operand::Column(column) => row.column(column),
        }
    }
}

impl<C> Predicate<C> {
    pub fn and(self, other: Predicate<C>) -> Self {
        Predicate::Logic {
            op: LogicOp::And,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn or(self, other: Predicate<C>) -> Self {
        Predicate::Logic {
            op: LogicOp::Or,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn compare(op: CompareOp, left: Operand<C>, right: Operand<C>) -> Self {
        Predicate::Comparison { op, left, right }
    }

    pub fn evaluate<R: Columns<C> + ?Sized>(&self, row: &R) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Logic { op, left, right } => {
                let (left, right) = (left.evaluate(row), right.evaluate(row));
                match op {
                    LogicOp::And => left && right,
                    LogicOp::Or => left || right,
                }
            }
            Predicate::Comparison { op, left, right } => {
                match (left.resolve(row), right.resolve(row)) {
                    (Some(a), Some(b)) => compare(*op, a, b),
                    _ => false,
                }
            }
            Predicate::Contains { left, right } => {
                match (left.resolve(row), right.resolve(row)) {
                    (Some(Value::String(haystack)), Some(Value::String(needle))) => {
                        haystack.contains(needle.as_str())
                    }
                    _ => false,
                }
            }
        }
    }
}

/// (is_less, is_greater) for two values of the same type
fn ordering(a: &Value, b: &Value) -> Option<(bool, bool)> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some((a < b, a > b)),
        (Value::Float(a), Value::Float(b)) => Some((a < b, a > b)),
        (Value::Bool(a), Value::Bool(b)) => Some((!a & b, a & !b)),
        (Value::String(a), Value::String(b)) => Some((a.as_bytes() < b.as_bytes(), a.as_bytes() > b.as_bytes())),
        _ => None,
    }
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> bool {
    ordering(a, b).is_some_and(|(less, greater)| op.holds(less, greater))
}

/// Equality condition of a nested-loop join: one column per side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOn {
    pub left: usize,
    pub right: usize,
}

impl JoinOn {
    pub fn matches(&self, left: &[Value], right: &[Value]) -> bool {
        match (left.get(self.left), right.get(self.right)) {
            (Some(a), Some(b)) => compare(CompareOp::Eq, a, b),
            _ => false,
        }
    }
}
