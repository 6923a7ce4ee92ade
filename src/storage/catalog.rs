//! Table-definition blobs stored on the `TableMeta` list.
//!
//! Layout (all words little-endian u64):
//!
//! ```text
//! [table_name_offset][attribute_count]
//! [name_offset][type_code] * attribute_count
//! heap: table name, then each attribute name, NUL-terminated
//! ```

use bincode::{Decode, Encode};

use crate::error::{Error, Result};
use crate::storage::base::{StringHeap, WORD_SIZE, layout, read_heap_str};
use crate::types::{Column, DataType, Schema};

const TABLE_HEADER_SIZE: usize = 2 * WORD_SIZE;
const ATTRIBUTE_SIZE: usize = 2 * WORD_SIZE;

#[derive(Debug, Encode, Decode)]
struct TableHeader {
    table_name_offset: u64,
    attribute_count: u64,
}

#[derive(Debug, Encode, Decode)]
struct AttributeEntry {
    name_offset: u64,
    type_code: u64,
}

/// Serialise a table definition
pub fn encode_table(name: &str, schema: &Schema) -> Result<Vec<u8>> {
    let fixed_len = TABLE_HEADER_SIZE + schema.len() * ATTRIBUTE_SIZE;
    let mut heap = StringHeap::new(fixed_len);
    let mut buf = Vec::with_capacity(fixed_len);

    let header = TableHeader {
        table_name_offset: heap.push(name)?,
        attribute_count: schema.len() as u64,
    };
    bincode::encode_into_std_write(&header, &mut buf, layout())?;

    for column in &schema.columns {
        let entry = AttributeEntry {
            name_offset: heap.push(&column.name)?,
            type_code: column.data_type.code(),
        };
        bincode::encode_into_std_write(&entry, &mut buf, layout())?;
    }

    buf.extend(heap.into_bytes());
    Ok(buf)
}

/// Deserialise a table definition. Trailing page padding is ignored.
pub fn decode_table(bytes: &[u8]) -> Result<(String, Schema)> {
    let (header, _): (TableHeader, usize) = bincode::decode_from_slice(bytes, layout())?;

    let count = usize::try_from(header.attribute_count)
        .ok()
        .filter(|count| {
            count
                .checked_mul(ATTRIBUTE_SIZE)
                .and_then(|n| n.checked_add(TABLE_HEADER_SIZE))
                .is_some_and(|end| end <= bytes.len())
        })
        .ok_or_else(|| {
            Error::Corrupt(format!(
                "table blob declares {} attributes but holds {} bytes",
                header.attribute_count,
                bytes.len()
            ))
        })?;

    let name = read_heap_str(bytes, header.table_name_offset)?;

    let mut columns = Vec::with_capacity(count);
    for i in 0..count {
        let at = TABLE_HEADER_SIZE + i * ATTRIBUTE_SIZE;
        let (entry, _): (AttributeEntry, usize) = bincode::decode_from_slice(&bytes[at..], layout())?;
        let data_type = DataType::from_code(entry.type_code).ok_or_else(|| {
            Error::Corrupt(format!("unknown attribute type code {}", entry.type_code))
        })?;
        columns.push(Column::new(read_heap_str(bytes, entry.name_offset)?, data_type));
    }

    Ok((name, Schema::new(columns)))
}
