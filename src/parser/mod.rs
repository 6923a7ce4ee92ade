//! SQL text to `Statement`.
//!
//! `sqlparser` does the parsing; this module lowers the subset of its AST the
//! engine understands and rejects everything else by name.

use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, FunctionArg, FunctionArgExpr, FunctionArguments,
    JoinConstraint, JoinOperator, ObjectName, ObjectType, SelectItem, SetExpr, TableFactor, TableWithJoins,
    UnaryOperator,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::executor::error::ExecutorError;
use crate::executor::evaluator::{CompareOp, LogicOp};
use crate::statement::{ColumnName, Filter, JoinClause, Operand, Projection, Statement};
use crate::types::{Column, DataType, Value};

type Result<T> = std::result::Result<T, ExecutorError>;

fn unsupported(what: impl Into<String>) -> ExecutorError {
    ExecutorError::UnsupportedStatement(what.into())
}

pub fn parse(query: &str) -> Result<Vec<Statement>> {
    let dialect = PostgreSqlDialect {};
    let ast = Parser::parse_sql(&dialect, query)
        .map_err(|e| ExecutorError::Parse(format!("Parse error: {}", e)))?;
    debug!(statement_count = ast.len(), "parsed sql");
    ast.iter().map(lower_statement).collect()
}

fn lower_statement(stmt: &ast::Statement) -> Result<Statement> {
    match stmt {
        ast::Statement::CreateTable(ct) => {
            let columns = ct
                .columns
                .iter()
                .map(|col| Ok(Column::new(col.name.value.clone(), lower_data_type(&col.data_type)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Statement::CreateTable {
                name: ct.name.to_string(),
                columns,
            })
        }
        ast::Statement::Drop {
            object_type: ObjectType::Table,
            names,
            ..
        } => match names.as_slice() {
            [name] => Ok(Statement::DropTable { name: name.to_string() }),
            _ => Err(unsupported("DROP TABLE takes exactly one table")),
        },
        ast::Statement::Insert(ins) => {
            if !ins.columns.is_empty() {
                return Err(unsupported("INSERT column lists are not supported"));
            }
            let source = ins
                .source
                .as_ref()
                .ok_or_else(|| unsupported("INSERT without VALUES"))?;
            let SetExpr::Values(values) = &*source.body else {
                return Err(unsupported("INSERT source must be VALUES"));
            };
            let rows = values
                .rows
                .iter()
                .map(|row| row.iter().map(lower_literal).collect::<Result<Vec<_>>>())
                .collect::<Result<Vec<_>>>()?;
            Ok(Statement::Insert {
                table: ins.table.to_string(),
                rows,
            })
        }
        ast::Statement::Query(query) => {
            let SetExpr::Select(select) = &*query.body else {
                return Err(unsupported("only plain SELECT queries are supported"));
            };
            let [from] = select.from.as_slice() else {
                return Err(unsupported("SELECT needs exactly one table in FROM"));
            };
            let table = table_name(&from.relation)?;
            let join = match from.joins.as_slice() {
                [] => None,
                [join] => Some(lower_join(join)?),
                _ => return Err(unsupported("only one JOIN per query is supported")),
            };
            Ok(Statement::Select {
                table,
                join,
                filter: lower_selection(select.selection.as_ref())?,
                projection: lower_projection(&select.projection)?,
            })
        }
        ast::Statement::Delete(delete) => {
            let tables = match &delete.from {
                FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
            };
            Ok(Statement::Delete {
                table: single_table(tables)?,
                filter: lower_selection(delete.selection.as_ref())?,
            })
        }
        ast::Statement::Update {
            table,
            assignments,
            from,
            selection,
            ..
        } => {
            if from.is_some() {
                return Err(unsupported("UPDATE ... FROM is not supported"));
            }
            if !table.joins.is_empty() {
                return Err(unsupported("UPDATE with joins is not supported"));
            }
            let assignments = assignments
                .iter()
                .map(|assignment| {
                    let AssignmentTarget::ColumnName(name) = &assignment.target else {
                        return Err(unsupported("tuple assignments are not supported"));
                    };
                    Ok((last_ident(name)?, lower_literal(&assignment.value)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Statement::Update {
                table: table_name(&table.relation)?,
                assignments,
                filter: lower_selection(selection.as_ref())?,
            })
        }
        other => Err(unsupported(format!("Unsupported statement: {}", other))),
    }
}

fn lower_data_type(data_type: &ast::DataType) -> Result<DataType> {
    match data_type {
        ast::DataType::Int(_) | ast::DataType::Integer(_) | ast::DataType::BigInt(_) | ast::DataType::Int8(_) => {
            Ok(DataType::Int)
        }
        ast::DataType::Real
        | ast::DataType::Float(_)
        | ast::DataType::Double(_)
        | ast::DataType::DoublePrecision
        | ast::DataType::Float8 => Ok(DataType::Float),
        ast::DataType::Bool | ast::DataType::Boolean => Ok(DataType::Bool),
        ast::DataType::Text | ast::DataType::Varchar(_) | ast::DataType::Char(_) | ast::DataType::String(_) => {
            Ok(DataType::String)
        }
        other => Err(unsupported(format!("Unsupported column type: {}", other))),
    }
}

fn table_name(relation: &TableFactor) -> Result<String> {
    match relation {
        TableFactor::Table { name, .. } => Ok(name.to_string()),
        other => Err(unsupported(format!("Unsupported table reference: {}", other))),
    }
}

fn single_table(tables: &[TableWithJoins]) -> Result<String> {
    match tables {
        [table] if table.joins.is_empty() => table_name(&table.relation),
        _ => Err(unsupported("statement must name exactly one table")),
    }
}

fn last_ident(name: &ObjectName) -> Result<String> {
    name.0
        .iter()
        .filter_map(|part| part.as_ident())
        .last()
        .map(|ident| ident.value.clone())
        .ok_or_else(|| ExecutorError::Parse(format!("Invalid column name: {}", name)))
}

fn lower_join(join: &ast::Join) -> Result<JoinClause> {
    let constraint = match &join.join_operator {
        JoinOperator::Join(constraint) | JoinOperator::Inner(constraint) => constraint,
        other => return Err(unsupported(format!("Unsupported join type: {:?}", other))),
    };
    let JoinConstraint::On(on) = constraint else {
        return Err(unsupported("JOIN requires an ON condition"));
    };
    let Expr::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    } = strip_nesting(on)
    else {
        return Err(unsupported("JOIN condition must be a single column equality"));
    };
    Ok(JoinClause {
        table: table_name(&join.relation)?,
        left: column_name(left)?,
        right: column_name(right)?,
    })
}

fn strip_nesting(expr: &Expr) -> &Expr {
    match expr {
        Expr::Nested(inner) => strip_nesting(inner),
        other => other,
    }
}

fn column_name(expr: &Expr) -> Result<ColumnName> {
    match strip_nesting(expr) {
        Expr::Identifier(ident) => Ok(ColumnName::bare(ident.value.clone())),
        Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [table, column] => Ok(ColumnName::qualified(table.value.clone(), column.value.clone())),
            _ => Err(unsupported(format!("Unsupported column reference: {}", expr))),
        },
        other => Err(unsupported(format!("Expected a column, got: {}", other))),
    }
}

fn lower_projection(items: &[SelectItem]) -> Result<Projection> {
    if let [SelectItem::Wildcard(_)] = items {
        return Ok(Projection::All);
    }
    items
        .iter()
        .map(|item| match item {
            SelectItem::UnnamedExpr(expr) => column_name(expr),
            other => Err(unsupported(format!("Unsupported select item: {}", other))),
        })
        .collect::<Result<Vec<_>>>()
        .map(Projection::Columns)
}

fn lower_selection(selection: Option<&Expr>) -> Result<Filter> {
    match selection {
        Some(expr) => lower_filter(expr),
        None => Ok(Filter::All),
    }
}

fn lower_filter(expr: &Expr) -> Result<Filter> {
    match expr {
        Expr::Nested(inner) => lower_filter(inner),
        Expr::BinaryOp { left, op, right } => {
            let logic = match op {
                BinaryOperator::And => Some(LogicOp::And),
                BinaryOperator::Or => Some(LogicOp::Or),
                _ => None,
            };
            if let Some(op) = logic {
                return Ok(Filter::Logic {
                    op,
                    left: Box::new(lower_filter(left)?),
                    right: Box::new(lower_filter(right)?),
                });
            }
            let op = match op {
                BinaryOperator::Eq => CompareOp::Eq,
                BinaryOperator::NotEq => CompareOp::NotEq,
                BinaryOperator::Gt => CompareOp::Gt,
                BinaryOperator::GtEq => CompareOp::GtEq,
                BinaryOperator::Lt => CompareOp::Lt,
                BinaryOperator::LtEq => CompareOp::LtEq,
                other => return Err(unsupported(format!("Unsupported operator: {}", other))),
            };
            Ok(Filter::Comparison {
                op,
                left: lower_operand(left)?,
                right: lower_operand(right)?,
            })
        }
        Expr::Like {
            negated: false,
            expr,
            pattern,
            escape_char: None,
            ..
        } => {
            let needle = match lower_literal(pattern)? {
                Value::String(p) => like_substring(&p)?,
                _ => return Err(unsupported("LIKE pattern must be text")),
            };
            Ok(Filter::Contains {
                left: lower_operand(expr)?,
                right: Operand::Literal(Value::String(needle)),
            })
        }
        Expr::Function(func) if func.name.to_string().eq_ignore_ascii_case("contains") => {
            let FunctionArguments::List(list) = &func.args else {
                return Err(unsupported("contains() takes two arguments"));
            };
            let args = list
                .args
                .iter()
                .map(|arg| match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => lower_operand(e),
                    other => Err(unsupported(format!("Unsupported contains() argument: {}", other))),
                })
                .collect::<Result<Vec<_>>>()?;
            let [left, right]: [Operand; 2] = args
                .try_into()
                .map_err(|_| unsupported("contains() takes two arguments"))?;
            Ok(Filter::Contains { left, right })
        }
        other => Err(unsupported(format!("Unsupported WHERE expression: {}", other))),
    }
}

/// `'%text%'` -> `text`. Other wildcard placements cannot be expressed as contains.
fn like_substring(pattern: &str) -> Result<String> {
    let inner = pattern
        .strip_prefix('%')
        .and_then(|p| p.strip_suffix('%'))
        .filter(|inner| !inner.contains(['%', '_']))
        .ok_or_else(|| unsupported(format!("Only LIKE '%text%' patterns are supported, got '{}'", pattern)))?;
    Ok(inner.to_string())
}

fn lower_operand(expr: &Expr) -> Result<Operand> {
    match strip_nesting(expr) {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => Ok(Operand::Column(column_name(expr)?)),
        other => Ok(Operand::Literal(lower_literal(other)?)),
    }
}

fn lower_literal(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Nested(inner) => lower_literal(inner),
        Expr::Value(val) => match &val.value {
            ast::Value::Number(n, _) => parse_number(n),
            ast::Value::SingleQuotedString(s) => Ok(Value::String(s.clone())),
            ast::Value::Boolean(b) => Ok(Value::Bool(*b)),
            ast::Value::Null => Err(unsupported("NULL values are not supported")),
            other => Err(unsupported(format!("Unsupported value: {}", other))),
        },
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match lower_literal(expr)? {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::Float(f) => Ok(Value::Float(-f)),
            _ => Err(ExecutorError::Parse(format!("Cannot negate {}", expr))),
        },
        other => Err(unsupported(format!("Expected a literal, got: {}", other))),
    }
}

fn parse_number(n: &str) -> Result<Value> {
    if let Ok(i) = n.parse::<i64>() {
        Ok(Value::Int(i))
    } else if let Ok(f) = n.parse::<f64>() {
        Ok(Value::Float(f))
    } else {
        Err(ExecutorError::Parse(format!("Invalid number: {}", n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(sql: &str) -> Statement {
        let mut stmts = parse(sql).unwrap_or_else(|e| panic!("{}: {}", sql, e));
        assert_eq!(stmts.len(), 1);
        stmts.remove(0)
    }

    fn col(name: &str) -> Operand {
        Operand::Column(ColumnName::bare(name))
    }

    #[test]
    fn test_create_table() {
        let stmt = one("CREATE TABLE t (a INT, b TEXT, c DOUBLE PRECISION, d BOOLEAN, e VARCHAR(20))");
        assert_eq!(
            stmt,
            Statement::CreateTable {
                name: "t".to_string(),
                columns: vec![
                    Column::new("a", DataType::Int),
                    Column::new("b", DataType::String),
                    Column::new("c", DataType::Float),
                    Column::new("d", DataType::Bool),
                    Column::new("e", DataType::String),
                ],
            }
        );
        assert!(parse("CREATE TABLE t (a DATE)").is_err());
    }

    #[test]
    fn test_insert_and_drop() {
        assert_eq!(
            one("INSERT INTO t VALUES (1, 'hello', -2.5, true), (2, 'world', 0.5, false)"),
            Statement::Insert {
                table: "t".to_string(),
                rows: vec![
                    vec![Value::Int(1), Value::from("hello"), Value::Float(-2.5), Value::Bool(true)],
                    vec![Value::Int(2), Value::from("world"), Value::Float(0.5), Value::Bool(false)],
                ],
            }
        );
        assert_eq!(one("DROP TABLE t"), Statement::DropTable { name: "t".to_string() });
        assert!(parse("INSERT INTO t (a) VALUES (1)").is_err());
    }

    #[test]
    fn test_select_with_filter() {
        assert_eq!(
            one("SELECT * FROM t WHERE a > 1 AND (b = 'x' OR b <> 'y')"),
            Statement::Select {
                table: "t".to_string(),
                join: None,
                projection: Projection::All,
                filter: Filter::Logic {
                    op: LogicOp::And,
                    left: Box::new(Filter::Comparison {
                        op: CompareOp::Gt,
                        left: col("a"),
                        right: Operand::Literal(Value::Int(1)),
                    }),
                    right: Box::new(Filter::Logic {
                        op: LogicOp::Or,
                        left: Box::new(Filter::Comparison {
                            op: CompareOp::Eq,
                            left: col("b"),
                            right: Operand::Literal(Value::from("x")),
                        }),
                        right: Box::new(Filter::Comparison {
                            op: CompareOp::NotEq,
                            left: col("b"),
                            right: Operand::Literal(Value::from("y")),
                        }),
                    }),
                },
            }
        );
    }

    #[test]
    fn test_select_join_and_projection() {
        let Statement::Select {
            table,
            join,
            projection,
            filter,
        } = one("SELECT users.name, item FROM users JOIN orders ON users.id = orders.user_id")
        else {
            panic!("expected select");
        };
        assert_eq!(table, "users");
        assert_eq!(filter, Filter::All);
        assert_eq!(
            join,
            Some(JoinClause {
                table: "orders".to_string(),
                left: ColumnName::qualified("users", "id"),
                right: ColumnName::qualified("orders", "user_id"),
            })
        );
        assert_eq!(
            projection,
            Projection::Columns(vec![ColumnName::qualified("users", "name"), ColumnName::bare("item")])
        );
        assert!(parse("SELECT * FROM a LEFT JOIN b ON a.x = b.x").is_err());
    }

    #[test]
    fn test_contains_forms() {
        let expected = Filter::Contains {
            left: col("b"),
            right: Operand::Literal(Value::from("ell")),
        };
        for sql in ["SELECT * FROM t WHERE b LIKE '%ell%'", "SELECT * FROM t WHERE contains(b, 'ell')"] {
            let Statement::Select { filter, .. } = one(sql) else {
                panic!("expected select");
            };
            assert_eq!(filter, expected);
        }
        assert!(parse("SELECT * FROM t WHERE b LIKE 'ell%'").is_err());
    }

    #[test]
    fn test_delete_and_update() {
        assert_eq!(
            one("DELETE FROM t WHERE a = 1"),
            Statement::Delete {
                table: "t".to_string(),
                filter: Filter::Comparison {
                    op: CompareOp::Eq,
                    left: col("a"),
                    right: Operand::Literal(Value::Int(1)),
                },
            }
        );
        assert_eq!(
            one("UPDATE t SET b = 'z', a = 3"),
            Statement::Update {
                table: "t".to_string(),
                assignments: vec![("b".to_string(), Value::from("z")), ("a".to_string(), Value::Int(3))],
                filter: Filter::All,
            }
        );
    }

    #[test]
    fn test_errors_are_classified() {
        assert!(matches!(parse("SELEC * FROM t"), Err(ExecutorError::Parse(_))));
        assert!(matches!(parse("BEGIN"), Err(ExecutorError::UnsupportedStatement(_))));
    }
}
