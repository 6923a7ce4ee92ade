//! Row blobs stored on the `RowData` list.
//!
//! ```text
//! [table_name_offset]
//! one word per column: i64 | f64 bits | bool as 0/1 | string offset
//! heap: table name, then string values in column order
//! ```
//!
//! Rows of every table share one list, so each row carries its table name.

use crate::error::{Error, Result};
use crate::storage::base::{StringHeap, WORD_SIZE, read_heap_str, read_word};
use crate::types::{DataType, Schema, Value};

const ROW_HEADER_SIZE: usize = WORD_SIZE;

/// Check that `values` line up with `schema` in count and type
pub fn check_values(schema: &Schema, values: &[Value]) -> Result<()> {
    if values.len() != schema.len() {
        return Err(Error::SchemaMismatch("Incorrect values count".to_string()));
    }
    for (column, value) in schema.columns.iter().zip(values) {
        if value.data_type() != column.data_type {
            return Err(Error::SchemaMismatch(format!(
                "Wrong type for column {}: expected {}, got {}",
                column.name,
                column.data_type,
                value.data_type()
            )));
        }
    }
    Ok(())
}

pub fn encode_row(table_name: &str, schema: &Schema, values: &[Value]) -> Result<Vec<u8>> {
    check_values(schema, values)?;

    let fixed_len = ROW_HEADER_SIZE + values.len() * WORD_SIZE;
    let mut heap = StringHeap::new(fixed_len);
    let mut buf = Vec::with_capacity(fixed_len);

    buf.extend_from_slice(&heap.push(table_name)?.to_le_bytes());
    for value in values {
        let word = match value {
            Value::Int(n) => *n as u64,
            Value::Float(f) => f.to_bits(),
            Value::Bool(b) => *b as u64,
            Value::String(s) => heap.push(s)?,
        };
        buf.extend_from_slice(&word.to_le_bytes());
    }

    buf.extend(heap.into_bytes());
    Ok(buf)
}

/// Name of the table a row blob belongs to
pub fn row_table_name(bytes: &[u8]) -> Result<String> {
    read_heap_str(bytes, read_word(bytes, 0)?)
}

/// Decode column values using the owning table's schema
pub fn decode_row(bytes: &[u8], schema: &Schema) -> Result<Vec<Value>> {
    schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let word = read_word(bytes, ROW_HEADER_SIZE + i * WORD_SIZE)?;
            Ok(match column.data_type {
                DataType::Int => Value::Int(word as i64),
                DataType::Float => Value::Float(f64::from_bits(word)),
                DataType::Bool => Value::Bool(word != 0),
                DataType::String => Value::String(read_heap_str(bytes, word)?),
            })
        })
        .collect()
}
