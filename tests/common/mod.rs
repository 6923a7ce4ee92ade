#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use pagedb::config::Config;
use pagedb::executor::{Executor, Outcome};
use pagedb::types::Value;

/// TestDb manages an isolated pagedb file for integration testing
pub struct TestDb {
    dir: PathBuf,
    executor: Option<Executor>,
}

impl TestDb {
    /// Create a new test database in an isolated temp directory
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap();
        let dir = std::env::temp_dir().join(format!("pagedb-test-{}", now.as_nanos()));
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        let executor = Executor::open(&Config::new(dir.join("data.db"))).expect("failed to open database");

        TestDb {
            dir,
            executor: Some(executor),
        }
    }

    pub fn data_file(&self) -> PathBuf {
        self.dir.join("data.db")
    }

    fn executor(&self) -> &Executor {
        self.executor.as_ref().expect("database is closed")
    }

    /// Execute SQL, rendering failures as their client-facing message
    pub fn execute_sql(&self, sql: &str) -> Result<Vec<Outcome>, String> {
        self.executor().query(sql).map_err(|e| e.to_string())
    }

    /// Rows returned by a single SELECT
    pub fn query_rows(&self, sql: &str) -> Vec<Vec<Value>> {
        let mut outcomes = self.execute_sql(sql).unwrap_or_else(|e| panic!("{} failed: {}", sql, e));
        assert_eq!(outcomes.len(), 1, "expected one statement in {}", sql);
        match outcomes.remove(0) {
            Outcome::Rows { rows, .. } => rows,
            other => panic!("{} returned {:?}", sql, other),
        }
    }

    /// Close the file and open it again
    pub fn restart(&mut self) {
        self.executor = None;
        self.executor = Some(Executor::open(&Config::new(self.data_file())).expect("failed to reopen database"));
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        self.executor = None;
        let _ = fs::remove_dir_all(&self.dir);
    }
}

pub fn sorted(mut rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    rows.sort_by(|a, b| format!("{:?}", a).cmp(&format!("{:?}", b)));
    rows
}
