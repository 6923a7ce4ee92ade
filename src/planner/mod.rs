//! Resolution of statement filters, joins, assignments and projections
//! against stored table schemas.
//!
//! This is the fallible half of predicate handling: unknown columns and
//! incompatible operand types are reported here, so that evaluation can stay
//! total.

use crate::error::{Error, Result};
use crate::executor::evaluator::{self, JoinOn, JoinedColumn, Predicate, Side};
use crate::statement::{ColumnName, Filter, JoinClause, Operand, Projection};
use crate::storage::Table;
use crate::types::{DataType, Value};

fn column_not_found(column: &ColumnName) -> Error {
    Error::SchemaMismatch(format!("Column not found: {}", column))
}

fn lookup_in(table: &Table, column: &ColumnName) -> Option<(usize, DataType)> {
    if column.table.as_deref().is_some_and(|t| t != table.name) {
        return None;
    }
    let index = table.schema.get_column_index(&column.name)?;
    Some((index, table.schema.columns[index].data_type))
}

/// Resolve a single-table WHERE tree
pub fn resolve_filter(filter: &Filter, table: &Table) -> Result<Predicate<usize>> {
    resolve(filter, &|column: &ColumnName| {
        lookup_in(table, column).ok_or_else(|| column_not_found(column))
    })
}

/// Resolve a WHERE tree over a joined pair.
///
/// A `table.column` qualifier picks the side; a bare name is looked up in the
/// left table first, then in the right one.
pub fn resolve_joined_filter(filter: &Filter, left: &Table, right: &Table) -> Result<Predicate<JoinedColumn>> {
    resolve(filter, &|column: &ColumnName| lookup_joined(column, left, right))
}

fn lookup_joined(column: &ColumnName, left: &Table, right: &Table) -> Result<(JoinedColumn, DataType)> {
    if let Some((index, data_type)) = lookup_in(left, column) {
        return Ok((JoinedColumn::left(index), data_type));
    }
    if let Some((index, data_type)) = lookup_in(right, column) {
        return Ok((JoinedColumn::right(index), data_type));
    }
    Err(column_not_found(column))
}

fn resolve<C, F>(filter: &Filter, lookup: &F) -> Result<Predicate<C>>
where
    F: Fn(&ColumnName) -> Result<(C, DataType)>,
{
    match filter {
        Filter::All => Ok(Predicate::Always),
        Filter::Comparison { op, left, right } => {
            let (left, left_type) = resolve_operand(left, lookup)?;
            let (right, right_type) = resolve_operand(right, lookup)?;
            if left_type != right_type {
                return Err(Error::SchemaMismatch(format!(
                    "Where incorrect types: {} compared with {}",
                    left_type, right_type
                )));
            }
            Ok(Predicate::Comparison { op: *op, left, right })
        }
        Filter::Contains { left, right } => {
            let (left, left_type) = resolve_operand(left, lookup)?;
            let (right, right_type) = resolve_operand(right, lookup)?;
            if left_type != DataType::String || right_type != DataType::String {
                return Err(Error::SchemaMismatch("Contains requires text operands".to_string()));
            }
            Ok(Predicate::Contains { left, right })
        }
        Filter::Logic { op, left, right } => Ok(Predicate::Logic {
            op: *op,
            left: Box::new(resolve(left, lookup)?),
            right: Box::new(resolve(right, lookup)?),
        }),
    }
}

fn resolve_operand<C, F>(operand: &Operand, lookup: &F) -> Result<(evaluator::Operand<C>, DataType)>
where
    F: Fn(&ColumnName) -> Result<(C, DataType)>,
{
    match operand {
        Operand::Literal(value) => Ok((evaluator::Operand::Constant(value.clone()), value.data_type())),
        Operand::Column(column) => {
            let (resolved, data_type) = lookup(column)?;
            Ok((evaluator::Operand::Column(resolved), data_type))
        }
    }
}

/// Resolve `ON a = b`.
///
/// Unqualified, `a` belongs to the left table and `b` to the joined table;
/// qualifiers may swap them.
pub fn resolve_join(clause: &JoinClause, left: &Table, right: &Table) -> Result<JoinOn> {
    let first = join_side(&clause.left, left, right, Side::Left);
    let second = join_side(&clause.right, left, right, Side::Right);

    let (left_column, right_column) = match (first, second) {
        (Some(Side::Left), Some(Side::Right)) => (&clause.left, &clause.right),
        (Some(Side::Right), Some(Side::Left)) => (&clause.right, &clause.left),
        (Some(_), Some(_)) => {
            return Err(Error::SchemaMismatch(
                "Join condition must compare one column of each table".to_string(),
            ));
        }
        (None, _) => return Err(column_not_found(&clause.left)),
        (_, None) => return Err(column_not_found(&clause.right)),
    };

    let (left_index, left_type) = left
        .schema
        .get_column_index(&left_column.name)
        .map(|i| (i, left.schema.columns[i].data_type))
        .ok_or_else(|| Error::SchemaMismatch("Table attribute for join not found".to_string()))?;
    let (right_index, right_type) = right
        .schema
        .get_column_index(&right_column.name)
        .map(|i| (i, right.schema.columns[i].data_type))
        .ok_or_else(|| Error::SchemaMismatch("Joined table attribute for join not found".to_string()))?;

    if left_type != right_type {
        return Err(Error::SchemaMismatch(format!(
            "Join columns have different types: {} and {}",
            left_type, right_type
        )));
    }

    Ok(JoinOn {
        left: left_index,
        right: right_index,
    })
}

fn join_side(column: &ColumnName, left: &Table, right: &Table, default: Side) -> Option<Side> {
    let (preferred, preferred_name, other, other_name) = match default {
        Side::Left => (Side::Left, left.name.as_str(), Side::Right, right.name.as_str()),
        Side::Right => (Side::Right, right.name.as_str(), Side::Left, left.name.as_str()),
    };
    match column.table.as_deref() {
        None => Some(default),
        Some(t) if t == preferred_name => Some(preferred),
        Some(t) if t == other_name => Some(other),
        Some(_) => None,
    }
}

/// Resolve UPDATE assignments to column positions, checking value types
pub fn resolve_assignments(assignments: &[(String, Value)], table: &Table) -> Result<Vec<(usize, Value)>> {
    assignments
        .iter()
        .map(|(name, value)| {
            let (index, data_type) = lookup_in(table, &ColumnName::bare(name.as_str()))
                .ok_or_else(|| column_not_found(&ColumnName::bare(name.as_str())))?;
            if value.data_type() != data_type {
                return Err(Error::SchemaMismatch(format!(
                    "Wrong type for column {}: expected {}, got {}",
                    name,
                    data_type,
                    value.data_type()
                )));
            }
            Ok((index, value.clone()))
        })
        .collect()
}

/// Column positions (and output names) selected from one table
pub fn resolve_projection(projection: &Projection, table: &Table) -> Result<Vec<(usize, String)>> {
    match projection {
        Projection::All => Ok(table
            .schema
            .names()
            .enumerate()
            .map(|(i, name)| (i, name.to_string()))
            .collect()),
        Projection::Columns(columns) => columns
            .iter()
            .map(|column| {
                lookup_in(table, column)
                    .map(|(index, _)| (index, column.name.clone()))
                    .ok_or_else(|| column_not_found(column))
            })
            .collect(),
    }
}

/// Column positions (and output names) selected from a joined pair.
/// `*` yields every left column followed by every right column.
pub fn resolve_joined_projection(
    projection: &Projection,
    left: &Table,
    right: &Table,
) -> Result<Vec<(JoinedColumn, String)>> {
    match projection {
        Projection::All => {
            let left_columns = left
                .schema
                .names()
                .enumerate()
                .map(|(i, name)| (JoinedColumn::left(i), name.to_string()));
            let right_columns = right
                .schema
                .names()
                .enumerate()
                .map(|(i, name)| (JoinedColumn::right(i), name.to_string()));
            Ok(left_columns.chain(right_columns).collect())
        }
        Projection::Columns(columns) => columns
            .iter()
            .map(|column| lookup_joined(column, left, right).map(|(resolved, _)| (resolved, column.name.clone())))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::evaluator::CompareOp;
    use crate::storage::pager::{BlobRef, PageKind};
    use crate::types::{Column, Schema};

    fn table(name: &str, columns: &[(&str, DataType)]) -> Table {
        Table {
            name: name.to_string(),
            schema: Schema::new(columns.iter().map(|(n, t)| Column::new(*n, *t)).collect()),
            position: BlobRef {
                kind: PageKind::TableMeta,
                previous_last: None,
                first: 0,
                last: 0,
                next_first: None,
            },
        }
    }

    fn users() -> Table {
        table("users", &[("id", DataType::Int), ("name", DataType::String)])
    }

    fn orders() -> Table {
        table("orders", &[("user_id", DataType::Int), ("item", DataType::String), ("id", DataType::Int)])
    }

    fn col(name: &str) -> Operand {
        Operand::Column(ColumnName::bare(name))
    }

    fn lit(value: impl Into<Value>) -> Operand {
        Operand::Literal(value.into())
    }

    #[test]
    fn test_resolve_comparison() {
        let filter = Filter::Comparison {
            op: CompareOp::Gt,
            left: col("id"),
            right: lit(1i64),
        };
        let predicate = resolve_filter(&filter, &users()).unwrap();
        assert_eq!(
            predicate,
            Predicate::Comparison {
                op: CompareOp::Gt,
                left: evaluator::Operand::Column(0),
                right: evaluator::Operand::Constant(Value::Int(1)),
            }
        );
    }

    #[test]
    fn test_resolution_failures() {
        let unknown = Filter::Comparison {
            op: CompareOp::Eq,
            left: col("age"),
            right: lit(1i64),
        };
        let err = resolve_filter(&unknown, &users()).unwrap_err();
        assert_eq!(err.to_string(), "Column not found: age");

        let mismatched = Filter::Comparison {
            op: CompareOp::Eq,
            left: col("id"),
            right: lit("1"),
        };
        let err = resolve_filter(&mismatched, &users()).unwrap_err();
        assert!(err.to_string().starts_with("Where incorrect types"));

        let contains = Filter::Contains {
            left: col("id"),
            right: lit("1"),
        };
        assert!(matches!(resolve_filter(&contains, &users()), Err(Error::SchemaMismatch(_))));

        let wrong_table = Filter::Comparison {
            op: CompareOp::Eq,
            left: Operand::Column(ColumnName::qualified("orders", "id")),
            right: lit(1i64),
        };
        assert!(resolve_filter(&wrong_table, &users()).is_err());
    }

    #[test]
    fn test_joined_lookup_prefers_left_unless_qualified() {
        let filter = Filter::Logic {
            op: evaluator::LogicOp::And,
            left: Box::new(Filter::Comparison {
                op: CompareOp::Eq,
                left: col("id"),
                right: lit(1i64),
            }),
            right: Box::new(Filter::Comparison {
                op: CompareOp::Eq,
                left: Operand::Column(ColumnName::qualified("orders", "id")),
                right: col("user_id"),
            }),
        };
        let predicate = resolve_joined_filter(&filter, &users(), &orders()).unwrap();
        let Predicate::Logic { left, right, .. } = predicate else {
            panic!("expected logic node");
        };
        assert!(matches!(
            *left,
            Predicate::Comparison { left: evaluator::Operand::Column(JoinedColumn { side: Side::Left, index: 0 }), .. }
        ));
        assert!(matches!(
            *right,
            Predicate::Comparison {
                left: evaluator::Operand::Column(JoinedColumn { side: Side::Right, index: 2 }),
                right: evaluator::Operand::Column(JoinedColumn { side: Side::Right, index: 0 }),
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_join() {
        let clause = JoinClause {
            table: "orders".to_string(),
            left: ColumnName::bare("id"),
            right: ColumnName::bare("user_id"),
        };
        assert_eq!(resolve_join(&clause, &users(), &orders()).unwrap(), JoinOn { left: 0, right: 0 });

        let swapped = JoinClause {
            table: "orders".to_string(),
            left: ColumnName::qualified("orders", "user_id"),
            right: ColumnName::qualified("users", "id"),
        };
        assert_eq!(resolve_join(&swapped, &users(), &orders()).unwrap(), JoinOn { left: 0, right: 0 });

        let missing = JoinClause {
            table: "orders".to_string(),
            left: ColumnName::bare("nope"),
            right: ColumnName::bare("user_id"),
        };
        assert_eq!(
            resolve_join(&missing, &users(), &orders()).unwrap_err().to_string(),
            "Table attribute for join not found"
        );

        let mistyped = JoinClause {
            table: "orders".to_string(),
            left: ColumnName::bare("id"),
            right: ColumnName::bare("item"),
        };
        assert!(resolve_join(&mistyped, &users(), &orders()).is_err());
    }

    #[test]
    fn test_assignments_and_projection() {
        let resolved = resolve_assignments(&[("name".to_string(), Value::from("bob"))], &users()).unwrap();
        assert_eq!(resolved, vec![(1, Value::from("bob"))]);
        assert!(resolve_assignments(&[("name".to_string(), Value::Int(1))], &users()).is_err());
        assert!(resolve_assignments(&[("age".to_string(), Value::Int(1))], &users()).is_err());

        let columns = resolve_projection(&Projection::Columns(vec![ColumnName::bare("name")]), &users()).unwrap();
        assert_eq!(columns, vec![(1, "name".to_string())]);

        let joined = resolve_joined_projection(&Projection::All, &users(), &orders()).unwrap();
        assert_eq!(joined.len(), 5);
        assert_eq!(joined[2], (JoinedColumn::right(0), "user_id".to_string()));
    }
}
