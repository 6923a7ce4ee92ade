use bincode::{Decode, Encode};

use crate::error::{Error, Result};

/// Payload bytes carried by every page
pub const PAGE_DATA_SIZE: usize = 1024;

/// Encoded size of `PageHeader`
pub const PAGE_HEADER_SIZE: usize = 16;

/// Encoded size of `FileHeader`
pub const FILE_HEADER_SIZE: usize = 32;

/// Full on-disk footprint of one page (header + payload)
pub const PAGE_SIZE: usize = PAGE_HEADER_SIZE + PAGE_DATA_SIZE;

/// On-disk sentinel for "no page" / empty list
pub const NO_PAGE: u64 = u64::MAX;

/// Number of independent page lists tracked by the file header
pub const LIST_COUNT: usize = 4;

/// 0-based page number (file offset derived via `page_offset`)
pub type PageNumber = u64;

/// Fixed-width little-endian layout used for every on-disk header.
pub(crate) fn layout() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// File offset of a page's header
pub fn page_offset(page: PageNumber) -> u64 {
    FILE_HEADER_SIZE as u64 + page * PAGE_SIZE as u64
}

pub(crate) fn to_link(page: Option<PageNumber>) -> u64 {
    page.unwrap_or(NO_PAGE)
}

pub(crate) fn from_link(raw: u64) -> Option<PageNumber> {
    if raw == NO_PAGE { None } else { Some(raw) }
}

/// File header at offset 0: one list head per `PageKind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct FileHeader {
    pub heads: [u64; LIST_COUNT],
}

impl FileHeader {
    pub fn empty() -> Self {
        FileHeader {
            heads: [NO_PAGE; LIST_COUNT],
        }
    }

    pub fn to_bytes(&self) -> Result<[u8; FILE_HEADER_SIZE]> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        bincode::encode_into_slice(self, &mut buf, layout())?;
        Ok(buf)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let (header, _) = bincode::decode_from_slice(buf, layout())?;
        Ok(header)
    }
}

/// Header preceding each page's payload.
///
/// `continuation == 1` means `next_page` holds the rest of the same blob.
/// `continuation == 0` means `next_page` is the first page of the next blob in
/// the owning list (or the next free page for free-list pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct PageHeader {
    pub next_page: u64,
    pub continuation: u64,
}

impl PageHeader {
    pub fn new(next_page: Option<PageNumber>, continuation: bool) -> Self {
        PageHeader {
            next_page: to_link(next_page),
            continuation: continuation as u64,
        }
    }

    pub fn next(&self) -> Option<PageNumber> {
        from_link(self.next_page)
    }

    pub fn continues(&self) -> bool {
        self.continuation == 1
    }

    pub fn to_bytes(&self) -> Result<[u8; PAGE_HEADER_SIZE]> {
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        bincode::encode_into_slice(self, &mut buf, layout())?;
        Ok(buf)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let (header, _) = bincode::decode_from_slice(buf, layout())?;
        Ok(header)
    }
}

/// Width of every fixed field in catalog and row blobs
pub const WORD_SIZE: usize = 8;

/// Read one little-endian word at `at`
pub(crate) fn read_word(bytes: &[u8], at: usize) -> Result<u64> {
    bytes
        .get(at..at + WORD_SIZE)
        .and_then(|w| w.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| Error::Corrupt(format!("field at byte {} lies outside the blob", at)))
}

/// Read a NUL-terminated string starting at `offset`
pub(crate) fn read_heap_str(bytes: &[u8], offset: u64) -> Result<String> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|start| *start < bytes.len())
        .ok_or_else(|| Error::Corrupt(format!("string offset {} lies outside the blob", offset)))?;

    let tail = &bytes[start..];
    let end = tail
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::Corrupt(format!("string at offset {} is not terminated", offset)))?;

    String::from_utf8(tail[..end].to_vec())
        .map_err(|_| Error::Corrupt(format!("string at offset {} is not valid UTF-8", offset)))
}

/// String heap appended after the fixed area of a blob.
///
/// Offsets handed out are absolute (measured from the start of the blob).
pub(crate) struct StringHeap {
    base: usize,
    bytes: Vec<u8>,
}

impl StringHeap {
    pub fn new(fixed_len: usize) -> Self {
        StringHeap {
            base: fixed_len,
            bytes: Vec::new(),
        }
    }

    pub fn push(&mut self, s: &str) -> Result<u64> {
        if s.as_bytes().contains(&0) {
            return Err(Error::SchemaMismatch(format!("String {:?} contains a NUL byte", s)));
        }
        let offset = (self.base + self.bytes.len()) as u64;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        Ok(offset)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
