use std::fmt;

use pgwire::error::{ErrorInfo, PgWireError};

use crate::error::Error;

#[derive(Debug)]
pub enum ExecutorError {
    Parse(String),
    Plan(String),
    Execution(String),
    UnsupportedStatement(String),
    Storage(Error),
}

impl ExecutorError {
    /// SQLSTATE reported to the client
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorError::Parse(_) => "42601",                // syntax_error
            ExecutorError::UnsupportedStatement(_) => "0A000", // feature_not_supported
            ExecutorError::Plan(_) => "42P01",                 // undefined_table
            ExecutorError::Execution(_) => "XX000",            // internal_error
            ExecutorError::Storage(e) => match e {
                Error::NotFound(_) => "42P01",
                Error::AlreadyExists(_) => "42P07",    // duplicate_table
                Error::SchemaMismatch(_) => "42804",   // datatype_mismatch
                Error::InvalidArgument(_) => "22023",  // invalid_parameter_value
                Error::Corrupt(_) => "XX001",          // data_corrupted
                Error::Io(_) => "58030",               // io_error
            },
        }
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Parse(msg)
            | ExecutorError::Plan(msg)
            | ExecutorError::Execution(msg)
            | ExecutorError::UnsupportedStatement(msg) => write!(f, "{}", msg),
            ExecutorError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for ExecutorError {
    fn from(e: Error) -> Self {
        ExecutorError::Storage(e)
    }
}

impl From<ExecutorError> for PgWireError {
    fn from(e: ExecutorError) -> PgWireError {
        PgWireError::UserError(Box::new(ErrorInfo::new(
            "ERROR".to_string(),
            e.code().to_string(),
            e.to_string(),
        )))
    }
}
