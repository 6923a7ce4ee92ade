pub mod base;
pub mod catalog;
pub mod pager;
pub mod tuple;

pub use crate::error::{Error, Result};

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::executor::evaluator::{JoinOn, JoinedColumn, Predicate};
use crate::types::{Schema, Value};
use self::pager::{BlobRef, PageKind, Pager};

/// Decoded view of a table-definition blob
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
    pub position: BlobRef,
}

/// Decoded row plus its position in the row list.
///
/// The position doubles as the cursor for `select_row_next`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
    pub position: BlobRef,
}

/// One emitted pair of the nested-loop join
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub left: Row,
    pub right: Row,
}

/// Table and row storage on top of a single pager file.
///
/// Table definitions live on the `TableMeta` list; the rows of every table
/// share the `RowData` list and are told apart by the table name each row
/// carries.
pub struct Database {
    pager: Pager,
}

impl Database {
    /// Open `path`, creating an empty database if the file does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let pager = if path.exists() {
            Pager::open(path)?
        } else {
            Pager::create(path)?
        };
        info!(path = %path.display(), pages = pager.page_count()?, "database opened");
        Ok(Database { pager })
    }

    /// Create a fresh database at `path`, discarding any existing content
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Database {
            pager: Pager::create(path)?,
        })
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<Table> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("table name is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for column in &schema.columns {
            if column.name.is_empty() {
                return Err(Error::InvalidArgument(format!("table {} has a column with an empty name", name)));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(Error::InvalidArgument(format!("duplicate column {} in table {}", column.name, name)));
            }
        }
        if self.get_table(name)?.is_some() {
            return Err(Error::AlreadyExists(format!("Table already exists: {}", name)));
        }

        let bytes = catalog::encode_table(name, &schema)?;
        let position = self.pager.write(PageKind::TableMeta, &bytes)?;

        info!(table = %name, columns = schema.len(), "created table");
        Ok(Table {
            name: name.to_string(),
            schema,
            position,
        })
    }

    /// Find a table by exact name. The first definition on the list wins.
    pub fn get_table(&self, name: &str) -> Result<Option<Table>> {
        let mut current = self.pager.read_first(PageKind::TableMeta)?;
        while let Some((position, bytes)) = current {
            let (table_name, schema) = catalog::decode_table(&bytes)?;
            if table_name == name {
                return Ok(Some(Table {
                    name: table_name,
                    schema,
                    position,
                }));
            }
            current = self.pager.read_next(&position)?;
        }
        Ok(None)
    }

    /// All table definitions, newest first
    pub fn tables(&self) -> Result<Vec<Table>> {
        let mut tables = Vec::new();
        let mut current = self.pager.read_first(PageKind::TableMeta)?;
        while let Some((position, bytes)) = current {
            let (name, schema) = catalog::decode_table(&bytes)?;
            current = self.pager.read_next(&position)?;
            tables.push(Table { name, schema, position });
        }
        Ok(tables)
    }

    /// Remove every row of `table`, then its definition. Returns the number of rows removed.
    ///
    /// Not atomic: a failure part-way leaves the rows removed so far deleted.
    pub fn drop_table(&mut self, table: Table) -> Result<usize> {
        let removed = self.delete_rows(&table, &Predicate::Always)?;

        // The caller's position may predate later table definitions.
        let position = match self.get_table(&table.name)? {
            Some(current) => current.position,
            None => return Err(Error::NotFound(format!("Table not found: {}", table.name))),
        };
        self.pager.remove(&position)?;

        info!(table = %table.name, rows = removed, "dropped table");
        Ok(removed)
    }

    pub fn insert_row(&mut self, table: &Table, values: &[Value]) -> Result<()> {
        let bytes = tuple::encode_row(&table.name, &table.schema, values)?;
        let position = self.pager.write(PageKind::RowData, &bytes)?;
        debug!(table = %table.name, page = position.first, "inserted row");
        Ok(())
    }

    /// First row of `table` satisfying `predicate`
    pub fn select_row_first(&self, table: &Table, predicate: &Predicate<usize>) -> Result<Option<Row>> {
        let first = self.pager.read_first(PageKind::RowData)?;
        self.scan_rows(table, predicate, first)
    }

    /// Next matching row after `previous`, which is consumed
    pub fn select_row_next(
        &self,
        table: &Table,
        predicate: &Predicate<usize>,
        previous: Row,
    ) -> Result<Option<Row>> {
        let next = self.pager.read_next(&previous.position)?;
        self.scan_rows(table, predicate, next)
    }

    fn scan_rows(
        &self,
        table: &Table,
        predicate: &Predicate<usize>,
        mut current: Option<(BlobRef, Vec<u8>)>,
    ) -> Result<Option<Row>> {
        while let Some((position, bytes)) = current {
            if tuple::row_table_name(&bytes)? == table.name {
                let values = tuple::decode_row(&bytes, &table.schema)?;
                if predicate.evaluate(&values) {
                    return Ok(Some(Row { values, position }));
                }
            }
            current = self.pager.read_next(&position)?;
        }
        Ok(None)
    }

    /// First joined pair: rows of `left` and `right` equal on `on` and satisfying `predicate`
    pub fn select_join_first(
        &self,
        left: &Table,
        right: &Table,
        on: &JoinOn,
        predicate: &Predicate<JoinedColumn>,
    ) -> Result<Option<JoinedRow>> {
        let Some(outer) = self.select_row_first(left, &Predicate::Always)? else {
            return Ok(None);
        };
        let inner = self.select_row_first(right, &Predicate::Always)?;
        self.join_from(left, right, on, predicate, outer, inner)
    }

    /// Resume the nested loop after `previous`, which is consumed
    pub fn select_join_next(
        &self,
        left: &Table,
        right: &Table,
        on: &JoinOn,
        predicate: &Predicate<JoinedColumn>,
        previous: JoinedRow,
    ) -> Result<Option<JoinedRow>> {
        let JoinedRow { left: outer, right: inner } = previous;
        let inner = self.select_row_next(right, &Predicate::Always, inner)?;
        self.join_from(left, right, on, predicate, outer, inner)
    }

    /// Nested loop starting at (`outer`, `inner`). An exhausted inner cursor
    /// advances the outer one and restarts the inner scan from its first row.
    fn join_from(
        &self,
        left: &Table,
        right: &Table,
        on: &JoinOn,
        predicate: &Predicate<JoinedColumn>,
        mut outer: Row,
        mut inner: Option<Row>,
    ) -> Result<Option<JoinedRow>> {
        loop {
            match inner {
                Some(candidate) => {
                    if on.matches(&outer.values, &candidate.values)
                        && predicate.evaluate(&(outer.values.as_slice(), candidate.values.as_slice()))
                    {
                        return Ok(Some(JoinedRow {
                            left: outer,
                            right: candidate,
                        }));
                    }
                    inner = self.select_row_next(right, &Predicate::Always, candidate)?;
                }
                None => {
                    match self.select_row_next(left, &Predicate::Always, outer)? {
                        Some(next) => outer = next,
                        None => return Ok(None),
                    }
                    inner = self.select_row_first(right, &Predicate::Always)?;
                }
            }
        }
    }

    /// Free a row's pages. `row` must come from the most recent scan step.
    pub fn remove_row(&mut self, row: Row) -> Result<()> {
        self.pager.remove(&row.position)
    }

    /// Remove every row of `table` matching `predicate`; returns the count.
    ///
    /// Each removal restarts the scan so no stale cursor is reused.
    pub fn delete_rows(&mut self, table: &Table, predicate: &Predicate<usize>) -> Result<usize> {
        let mut removed = 0;
        while let Some(row) = self.select_row_first(table, predicate)? {
            self.remove_row(row)?;
            removed += 1;
        }
        debug!(table = %table.name, rows = removed, "deleted rows");
        Ok(removed)
    }

    /// Overwrite columns of every matching row; returns the count.
    ///
    /// Matching rows are snapshotted, removed, then written back with the new
    /// values, so rewritten rows are never visited twice.
    pub fn update_rows(
        &mut self,
        table: &Table,
        predicate: &Predicate<usize>,
        assignments: &[(usize, Value)],
    ) -> Result<usize> {
        let mut updated = Vec::new();
        let mut current = self.select_row_first(table, predicate)?;
        while let Some(row) = current {
            let mut values = row.values.clone();
            for (index, value) in assignments {
                let slot = values.get_mut(*index).ok_or_else(|| {
                    Error::SchemaMismatch(format!("column index {} out of range for table {}", index, table.name))
                })?;
                *slot = value.clone();
            }
            tuple::check_values(&table.schema, &values)?;
            updated.push(values);
            current = self.select_row_next(table, predicate, row)?;
        }

        let removed = self.delete_rows(table, predicate)?;
        if removed != updated.len() {
            return Err(Error::Corrupt(format!(
                "matched {} rows of {} but removed {}",
                updated.len(),
                table.name,
                removed
            )));
        }
        for values in &updated {
            self.insert_row(table, values)?;
        }

        debug!(table = %table.name, rows = updated.len(), "updated rows");
        Ok(updated.len())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Scratch database file removed on drop
    pub struct TempFile {
        path: PathBuf,
    }

    impl TempFile {
        pub fn new(name: &str) -> Self {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            let path = std::env::temp_dir().join(format!(
                "pagedb-{}-{}-{}.db",
                name,
                std::process::id(),
                nanos
            ));
            TempFile { path }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::TempFile;
    use super::*;
    use crate::executor::evaluator::{CompareOp, Operand};
    use crate::types::{Column, DataType};

    fn pair_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Int),
            Column::new("label", DataType::String),
        ])
    }

    fn all_rows(db: &Database, table: &Table, predicate: &Predicate<usize>) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        let mut current = db.select_row_first(table, predicate).unwrap();
        while let Some(row) = current {
            rows.push(row.values.clone());
            current = db.select_row_next(table, predicate, row).unwrap();
        }
        rows
    }

    fn id_gt(n: i64) -> Predicate<usize> {
        Predicate::compare(CompareOp::Gt, Operand::Column(0), Operand::Constant(Value::Int(n)))
    }

    #[test]
    fn test_create_and_get_table() {
        let tmp = TempFile::new("db-tables");
        let mut db = Database::create(tmp.path()).unwrap();
        db.create_table("a", pair_schema()).unwrap();
        db.create_table("b", Schema::new(vec![Column::new("x", DataType::Float)])).unwrap();

        let a = db.get_table("a").unwrap().unwrap();
        assert_eq!(a.schema, pair_schema());
        assert!(db.get_table("c").unwrap().is_none());
        assert_eq!(db.tables().unwrap().len(), 2);
    }

    #[test]
    fn test_create_table_validation() {
        let tmp = TempFile::new("db-validate");
        let mut db = Database::create(tmp.path()).unwrap();
        assert!(matches!(db.create_table("", pair_schema()), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            db.create_table("t", Schema::new(vec![Column::new("", DataType::Int)])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            db.create_table(
                "t",
                Schema::new(vec![Column::new("a", DataType::Int), Column::new("a", DataType::Bool)])
            ),
            Err(Error::InvalidArgument(_))
        ));

        db.create_table("t", pair_schema()).unwrap();
        assert!(matches!(db.create_table("t", pair_schema()), Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_cursor_skips_other_tables() {
        let tmp = TempFile::new("db-interleaved");
        let mut db = Database::create(tmp.path()).unwrap();
        let a = db.create_table("a", pair_schema()).unwrap();
        let b = db.create_table("b", pair_schema()).unwrap();

        for i in 0..5 {
            db.insert_row(&a, &[Value::Int(i), Value::from("a")]).unwrap();
            db.insert_row(&b, &[Value::Int(i), Value::from("b")]).unwrap();
            db.insert_row(&b, &[Value::Int(i + 100), Value::from("b")]).unwrap();
        }

        let rows = all_rows(&db, &a, &Predicate::Always);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r[1] == Value::from("a")));

        assert_eq!(all_rows(&db, &a, &id_gt(2)).len(), 2);
        assert_eq!(all_rows(&db, &b, &id_gt(2)).len(), 7);
    }

    #[test]
    fn test_multi_page_row() {
        let tmp = TempFile::new("db-big-row");
        let mut db = Database::create(tmp.path()).unwrap();
        let t = db.create_table("t", pair_schema()).unwrap();
        let long = "x".repeat(3000);
        db.insert_row(&t, &[Value::Int(1), Value::from(long.as_str())]).unwrap();

        let row = db.select_row_first(&t, &Predicate::Always).unwrap().unwrap();
        assert_eq!(row.values, vec![Value::Int(1), Value::from(long)]);
        assert_ne!(row.position.first, row.position.last);
    }

    #[test]
    fn test_join_emits_matching_pair_only() {
        let tmp = TempFile::new("db-join");
        let mut db = Database::create(tmp.path()).unwrap();
        let l = db.create_table("l", pair_schema()).unwrap();
        let r = db.create_table("r", pair_schema()).unwrap();
        db.insert_row(&l, &[Value::Int(1), Value::from("a")]).unwrap();
        db.insert_row(&l, &[Value::Int(2), Value::from("b")]).unwrap();
        db.insert_row(&r, &[Value::Int(1), Value::from("x")]).unwrap();
        db.insert_row(&r, &[Value::Int(3), Value::from("y")]).unwrap();

        let on = JoinOn { left: 0, right: 0 };
        let first = db.select_join_first(&l, &r, &on, &Predicate::Always).unwrap().unwrap();
        assert_eq!(first.left.values, vec![Value::Int(1), Value::from("a")]);
        assert_eq!(first.right.values, vec![Value::Int(1), Value::from("x")]);
        assert!(db.select_join_next(&l, &r, &on, &Predicate::Always, first).unwrap().is_none());
    }

    #[test]
    fn test_join_rescans_inner_for_each_outer_row() {
        let tmp = TempFile::new("db-join-many");
        let mut db = Database::create(tmp.path()).unwrap();
        let l = db.create_table("l", pair_schema()).unwrap();
        let r = db.create_table("r", pair_schema()).unwrap();
        for label in ["p", "q"] {
            db.insert_row(&l, &[Value::Int(7), Value::from(label)]).unwrap();
        }
        for label in ["x", "y", "z"] {
            db.insert_row(&r, &[Value::Int(7), Value::from(label)]).unwrap();
        }

        let on = JoinOn { left: 0, right: 0 };
        let filter = Predicate::compare(
            CompareOp::NotEq,
            Operand::Column(JoinedColumn::right(1)),
            Operand::Constant(Value::from("y")),
        );
        let mut pairs = Vec::new();
        let mut current = db.select_join_first(&l, &r, &on, &filter).unwrap();
        while let Some(joined) = current {
            pairs.push((joined.left.values[1].as_string(), joined.right.values[1].as_string()));
            current = db.select_join_next(&l, &r, &on, &filter, joined).unwrap();
        }
        pairs.sort();
        let expected: Vec<(String, String)> = [("p", "x"), ("p", "z"), ("q", "x"), ("q", "z")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_drop_and_recreate_is_empty() {
        let tmp = TempFile::new("db-drop");
        let mut db = Database::create(tmp.path()).unwrap();
        let t = db.create_table("t", pair_schema()).unwrap();
        let other = db.create_table("other", pair_schema()).unwrap();
        for i in 0..4 {
            db.insert_row(&t, &[Value::Int(i), Value::from("t")]).unwrap();
        }
        db.insert_row(&other, &[Value::Int(9), Value::from("o")]).unwrap();

        assert_eq!(db.drop_table(t).unwrap(), 4);
        assert!(db.get_table("t").unwrap().is_none());

        let t = db.create_table("t", pair_schema()).unwrap();
        assert!(db.select_row_first(&t, &Predicate::Always).unwrap().is_none());
        assert_eq!(all_rows(&db, &other, &Predicate::Always).len(), 1);
    }

    #[test]
    fn test_delete_and_update_rows() {
        let tmp = TempFile::new("db-dml");
        let mut db = Database::create(tmp.path()).unwrap();
        let t = db.create_table("t", pair_schema()).unwrap();
        for i in 0..6 {
            db.insert_row(&t, &[Value::Int(i), Value::from("old")]).unwrap();
        }

        assert_eq!(db.delete_rows(&t, &id_gt(3)).unwrap(), 2);
        assert_eq!(all_rows(&db, &t, &Predicate::Always).len(), 4);

        let count = db.update_rows(&t, &id_gt(0), &[(1, Value::from("new"))]).unwrap();
        assert_eq!(count, 3);
        let relabelled = Predicate::compare(
            CompareOp::Eq,
            Operand::Column(1),
            Operand::Constant(Value::from("new")),
        );
        assert_eq!(all_rows(&db, &t, &relabelled).len(), 3);
        assert_eq!(all_rows(&db, &t, &Predicate::Always).len(), 4);

        assert!(matches!(
            db.update_rows(&t, &Predicate::Always, &[(0, Value::from("bad"))]),
            Err(Error::SchemaMismatch(_))
        ));
        assert_eq!(all_rows(&db, &t, &relabelled).len(), 3);
    }

    #[test]
    fn test_reopen_keeps_tables_and_rows() {
        let tmp = TempFile::new("db-reopen");
        {
            let mut db = Database::open(tmp.path()).unwrap();
            let t = db.create_table("t", pair_schema()).unwrap();
            db.insert_row(&t, &[Value::Int(1), Value::from("kept")]).unwrap();
        }

        let db = Database::open(tmp.path()).unwrap();
        let t = db.get_table("t").unwrap().unwrap();
        assert_eq!(
            all_rows(&db, &t, &Predicate::Always),
            vec![vec![Value::Int(1), Value::from("kept")]]
        );
    }
}
