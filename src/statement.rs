//! Statements in engine vocabulary, as produced by `parser`.
//!
//! Column references are still names here; `planner` resolves them against
//! the stored schemas.

use std::fmt;

use crate::executor::evaluator::{CompareOp, LogicOp};
use crate::types::{Column, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<Column>,
    },
    DropTable {
        name: String,
    },
    Insert {
        table: String,
        rows: Vec<Vec<Value>>,
    },
    Select {
        table: String,
        join: Option<JoinClause>,
        filter: Filter,
        projection: Projection,
    },
    Delete {
        table: String,
        filter: Filter,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        filter: Filter,
    },
}

/// Possibly qualified column reference (`name` or `table.name`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnName {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnName {
    pub fn bare(name: impl Into<String>) -> Self {
        ColumnName {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        ColumnName {
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnName),
    Literal(Value),
}

/// Unresolved WHERE tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Comparison {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    Contains {
        left: Operand,
        right: Operand,
    },
    Logic {
        op: LogicOp,
        left: Box<Filter>,
        right: Box<Filter>,
    },
}

/// `JOIN table ON left = right`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub left: ColumnName,
    pub right: ColumnName,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<ColumnName>),
}
