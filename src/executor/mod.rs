pub mod error;
pub mod evaluator;

use std::sync::Arc;

use futures::stream;
use parking_lot::Mutex;
use pgwire::api::Type;
use pgwire::api::results::{DataRowEncoder, FieldFormat, FieldInfo, QueryResponse, Response, Tag};
use tracing::{debug, info};

use crate::config::Config;
use crate::executor::error::ExecutorError;
use crate::parser;
use crate::planner;
use crate::statement::{Filter, JoinClause, Projection, Statement};
use crate::storage::{Database, tuple};
use crate::types::{Column, DataType, Schema, Value};

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Result of one statement, before wire encoding
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Status {
        tag: &'static str,
        rows: Option<usize>,
    },
    Rows {
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
    },
}

/// Runs statements against one database file.
///
/// Every query holds the database lock from its first statement to its last,
/// so connections never interleave inside the pager.
pub struct Executor {
    db: Arc<Mutex<Database>>,
}

impl Executor {
    pub fn new(db: Database) -> Self {
        Executor {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.data_file)?;
        Ok(Executor::new(db))
    }

    /// Parse and run every statement in `query`
    pub fn query(&self, query: &str) -> Result<Vec<Outcome>> {
        debug!("parsing query");
        let stmts = parser::parse(query)?;
        info!(statement_count = stmts.len(), "parsed statements");

        let mut db = self.db.lock();
        let mut outcomes = Vec::with_capacity(stmts.len());
        for (idx, stmt) in stmts.into_iter().enumerate() {
            debug!(statement_idx = idx, "executing statement");
            outcomes.push(run(&mut db, stmt)?);
        }

        info!(outcome_count = outcomes.len(), "execution complete");
        Ok(outcomes)
    }

    pub fn execute(&self, query: &str) -> Result<Vec<Response>> {
        let outcomes = self.query(query)?;
        if outcomes.is_empty() {
            debug!("empty query");
            return Ok(vec![Response::EmptyQuery]);
        }
        outcomes.into_iter().map(outcome_to_response).collect()
    }
}

fn table_not_found(name: &str) -> ExecutorError {
    ExecutorError::Plan(format!("Table not found: {}", name))
}

fn run(db: &mut Database, stmt: Statement) -> Result<Outcome> {
    match stmt {
        Statement::CreateTable { name, columns } => {
            db.create_table(&name, Schema::new(columns))?;
            Ok(Outcome::Status {
                tag: "CREATE TABLE",
                rows: None,
            })
        }
        Statement::DropTable { name } => {
            let table = db.get_table(&name)?.ok_or_else(|| table_not_found(&name))?;
            let removed = db.drop_table(table)?;
            debug!(table = %name, rows = removed, "table dropped");
            Ok(Outcome::Status {
                tag: "DROP TABLE",
                rows: None,
            })
        }
        Statement::Insert { table, rows } => {
            let table = db.get_table(&table)?.ok_or_else(|| table_not_found(&table))?;
            for values in &rows {
                tuple::check_values(&table.schema, values)?;
            }
            for values in &rows {
                db.insert_row(&table, values)?;
            }
            Ok(Outcome::Status {
                tag: "INSERT",
                rows: Some(rows.len()),
            })
        }
        Statement::Select {
            table,
            join: None,
            filter,
            projection,
        } => select(db, &table, &filter, &projection),
        Statement::Select {
            table,
            join: Some(join),
            filter,
            projection,
        } => select_join(db, &table, &join, &filter, &projection),
        Statement::Delete { table, filter } => {
            let table = db.get_table(&table)?.ok_or_else(|| table_not_found(&table))?;
            let predicate = planner::resolve_filter(&filter, &table)?;
            let removed = db.delete_rows(&table, &predicate)?;
            Ok(Outcome::Status {
                tag: "DELETE",
                rows: Some(removed),
            })
        }
        Statement::Update {
            table,
            assignments,
            filter,
        } => {
            let table = db.get_table(&table)?.ok_or_else(|| table_not_found(&table))?;
            let assignments = planner::resolve_assignments(&assignments, &table)?;
            let predicate = planner::resolve_filter(&filter, &table)?;
            let updated = db.update_rows(&table, &predicate, &assignments)?;
            Ok(Outcome::Status {
                tag: "UPDATE",
                rows: Some(updated),
            })
        }
    }
}

fn select(db: &Database, table: &str, filter: &Filter, projection: &Projection) -> Result<Outcome> {
    let table = db.get_table(table)?.ok_or_else(|| table_not_found(table))?;
    let predicate = planner::resolve_filter(filter, &table)?;
    let selected = planner::resolve_projection(projection, &table)?;

    let mut rows = Vec::new();
    let mut current = db.select_row_first(&table, &predicate)?;
    while let Some(row) = current {
        rows.push(selected.iter().map(|(i, _)| row.values[*i].clone()).collect());
        current = db.select_row_next(&table, &predicate, row)?;
    }

    let columns = selected
        .into_iter()
        .map(|(i, name)| Column::new(name, table.schema.columns[i].data_type))
        .collect();
    debug!(table = %table.name, rows = rows.len(), "select complete");
    Ok(Outcome::Rows { columns, rows })
}

fn select_join(
    db: &Database,
    table: &str,
    join: &JoinClause,
    filter: &Filter,
    projection: &Projection,
) -> Result<Outcome> {
    let left = db.get_table(table)?.ok_or_else(|| table_not_found(table))?;
    let right = db
        .get_table(&join.table)?
        .ok_or_else(|| ExecutorError::Plan(format!("Joined table not found: {}", join.table)))?;
    let on = planner::resolve_join(join, &left, &right)?;
    let predicate = planner::resolve_joined_filter(filter, &left, &right)?;
    let selected = planner::resolve_joined_projection(projection, &left, &right)?;

    let mut rows = Vec::new();
    let mut current = db.select_join_first(&left, &right, &on, &predicate)?;
    while let Some(joined) = current {
        let pair = (joined.left.values.as_slice(), joined.right.values.as_slice());
        rows.push(
            selected
                .iter()
                .map(|(column, _)| {
                    evaluator::Columns::column(&pair, column)
                        .cloned()
                        .ok_or_else(|| ExecutorError::Execution(format!("column {} missing from joined row", column.index)))
                })
                .collect::<Result<Vec<_>>>()?,
        );
        current = db.select_join_next(&left, &right, &on, &predicate, joined)?;
    }

    let columns = selected
        .into_iter()
        .map(|(column, name)| {
            let schema = match column.side {
                evaluator::Side::Left => &left.schema,
                evaluator::Side::Right => &right.schema,
            };
            Column::new(name, schema.columns[column.index].data_type)
        })
        .collect();
    debug!(left = %left.name, right = %right.name, rows = rows.len(), "join complete");
    Ok(Outcome::Rows { columns, rows })
}

fn outcome_to_response(outcome: Outcome) -> Result<Response> {
    match outcome {
        Outcome::Status { tag, rows: Some(n) } => Ok(Response::Execution(Tag::new(tag).with_rows(n))),
        Outcome::Status { tag, rows: None } => Ok(Response::Execution(Tag::new(tag))),
        Outcome::Rows { columns, rows } => rows_to_response(&columns, rows),
    }
}

fn rows_to_response(columns: &[Column], rows: Vec<Vec<Value>>) -> Result<Response> {
    let field_infos = columns
        .iter()
        .map(|col| {
            let pgwire_type = match col.data_type {
                DataType::Int => Type::INT8,
                DataType::Float => Type::FLOAT8,
                DataType::Bool => Type::BOOL,
                DataType::String => Type::VARCHAR,
            };
            FieldInfo::new(col.name.clone(), None, None, pgwire_type, FieldFormat::Text)
        })
        .collect::<Vec<_>>();

    let schema = Arc::new(field_infos);

    let mut encoded_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut encoder = DataRowEncoder::new(schema.clone());
        for value in &row {
            let encoded = match value {
                Value::Int(n) => encoder.encode_field(n),
                Value::Float(f) => encoder.encode_field(f),
                Value::Bool(b) => encoder.encode_field(b),
                Value::String(s) => encoder.encode_field(s),
            };
            encoded.map_err(|e| ExecutorError::Execution(format!("Encoding error: {:?}", e)))?;
        }
        encoded_rows.push(encoder.finish());
    }

    Ok(Response::Query(QueryResponse::new(schema, stream::iter(encoded_rows))))
}
