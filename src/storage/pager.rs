use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::base::*;

/// The independent page lists tracked in the file header.
///
/// Every page belongs to exactly one list at a time. `Free` holds reusable
/// pages; the other kinds hold chains of blob pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Free = 0,
    TableMeta = 1,
    RowData = 2,
    Reserved = 3,
}

impl PageKind {
    pub const ALL: [PageKind; LIST_COUNT] = [
        PageKind::Free,
        PageKind::TableMeta,
        PageKind::RowData,
        PageKind::Reserved,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Position of one blob inside its kind list.
///
/// Produced by every read and required by `Pager::remove`: the on-disk list is
/// singly linked, so the predecessor's last page and the successor's first
/// page travel with the cursor instead of living in a reverse index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRef {
    pub kind: PageKind,
    pub previous_last: Option<PageNumber>,
    pub first: PageNumber,
    pub last: PageNumber,
    pub next_first: Option<PageNumber>,
}

/// Single-file page manager.
///
/// Not safe for concurrent use: callers must serialise access (the executor
/// holds the database behind a mutex).
pub struct Pager {
    file: File,
    header: FileHeader,
}

impl Pager {
    /// Create (or truncate) a database file and write an empty header
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        let pager = Pager {
            file,
            header: FileHeader::empty(),
        };
        pager.flush_header()?;

        debug!(path = %path.as_ref().display(), "created database file");
        Ok(pager)
    }

    /// Open an existing database file and load its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        let mut buf = [0u8; FILE_HEADER_SIZE];
        {
            let mut reader = &file;
            reader.seek(SeekFrom::Start(0))?;
            reader.read_exact(&mut buf).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => Error::Corrupt("file header is truncated".to_string()),
                _ => Error::Io(e),
            })?;
        }

        let pager = Pager {
            file,
            header: FileHeader::from_bytes(&buf)?,
        };

        let page_count = pager.page_count()?;
        for kind in PageKind::ALL {
            if let Some(head) = pager.head(kind) {
                if head >= page_count {
                    return Err(Error::Corrupt(format!(
                        "{:?} list starts at page {} but the file has {} pages",
                        kind, head, page_count
                    )));
                }
            }
        }

        debug!(path = %path.as_ref().display(), page_count, "opened database file");
        Ok(pager)
    }

    /// Number of pages currently backed by the file
    pub fn page_count(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        Ok(len.saturating_sub(FILE_HEADER_SIZE as u64) / PAGE_SIZE as u64)
    }

    /// First page of a kind list
    pub fn head(&self, kind: PageKind) -> Option<PageNumber> {
        from_link(self.header.heads[kind.slot()])
    }

    fn set_head(&mut self, kind: PageKind, page: Option<PageNumber>) {
        self.header.heads[kind.slot()] = to_link(page);
    }

    /// Pages currently on the free list, head first
    pub fn free_pages(&self) -> Result<Vec<PageNumber>> {
        let limit = self.page_count()?;
        let mut pages = Vec::new();
        let mut next = self.head(PageKind::Free);
        while let Some(page) = next {
            if pages.len() as u64 >= limit {
                return Err(Error::Corrupt("free list contains a cycle".to_string()));
            }
            pages.push(page);
            next = self.read_page_header(page)?.next();
        }
        Ok(pages)
    }

    /// Store `data` as a new blob at the head of the `kind` list.
    ///
    /// Pages come from the free list first, then from the end of the file.
    /// The chain is built tail to head so that the final page links to the
    /// previous list head. A failure part-way leaks the pages written so far.
    pub fn write(&mut self, kind: PageKind, data: &[u8]) -> Result<BlobRef> {
        if kind == PageKind::Free {
            return Err(Error::InvalidArgument("blobs cannot be written to the free list".to_string()));
        }
        if data.is_empty() {
            return Err(Error::InvalidArgument("cannot write an empty blob".to_string()));
        }

        let old_head = self.head(kind);
        let mut next = old_head;
        let mut continuation = false;
        let mut last = None;

        for chunk in data.chunks(PAGE_DATA_SIZE).rev() {
            let page = self.allocate()?;
            self.write_page(page, PageHeader::new(next, continuation), chunk)?;
            last.get_or_insert(page);
            next = Some(page);
            continuation = true;
        }

        let (Some(first), Some(last)) = (next, last) else {
            return Err(Error::InvalidArgument("cannot write an empty blob".to_string()));
        };

        self.set_head(kind, Some(first));
        self.flush_header()?;

        debug!(?kind, first, last, bytes = data.len(), "wrote blob");
        Ok(BlobRef {
            kind,
            previous_last: None,
            first,
            last,
            next_first: old_head,
        })
    }

    /// Read the blob at the head of the `kind` list
    pub fn read_first(&self, kind: PageKind) -> Result<Option<(BlobRef, Vec<u8>)>> {
        match self.head(kind) {
            Some(first) => self.read_blob(kind, first, None).map(Some),
            None => Ok(None),
        }
    }

    /// Read the blob following `previous` in its kind list
    pub fn read_next(&self, previous: &BlobRef) -> Result<Option<(BlobRef, Vec<u8>)>> {
        match previous.next_first {
            Some(first) => self.read_blob(previous.kind, first, Some(previous.last)).map(Some),
            None => Ok(None),
        }
    }

    /// Unlink a blob from its kind list and push all of its pages onto the free list.
    ///
    /// `blob` must come from a read (or write) that is still current: its
    /// predecessor and successor links are trusted as-is.
    pub fn remove(&mut self, blob: &BlobRef) -> Result<()> {
        if blob.kind == PageKind::Free {
            return Err(Error::InvalidArgument("free pages cannot be removed".to_string()));
        }

        let limit = self.page_count()?;
        let mut page = blob.first;
        let mut freed = 0u64;
        loop {
            if freed >= limit {
                return Err(Error::Corrupt(format!("blob at page {} has a cyclic chain", blob.first)));
            }

            let header = self.read_page_header(page)?;
            let free_head = self.head(PageKind::Free);
            self.write_page_header(page, PageHeader::new(free_head, false))?;
            self.set_head(PageKind::Free, Some(page));
            freed += 1;

            if !header.continues() {
                break;
            }
            page = header.next().ok_or_else(|| {
                Error::Corrupt(format!("page {} continues into no page", page))
            })?;
        }

        if self.head(blob.kind) == Some(blob.first) {
            self.set_head(blob.kind, blob.next_first);
        }
        self.flush_header()?;

        if let Some(previous) = blob.previous_last {
            let mut header = self.read_page_header(previous)?;
            header.next_page = to_link(blob.next_first);
            self.write_page_header(previous, header)?;
        }

        debug!(kind = ?blob.kind, first = blob.first, pages = freed, "removed blob");
        Ok(())
    }

    fn allocate(&mut self) -> Result<PageNumber> {
        match self.head(PageKind::Free) {
            Some(page) => {
                let header = self.read_page_header(page)?;
                self.set_head(PageKind::Free, header.next());
                Ok(page)
            }
            None => self.page_count(),
        }
    }

    fn read_blob(
        &self,
        kind: PageKind,
        first: PageNumber,
        previous_last: Option<PageNumber>,
    ) -> Result<(BlobRef, Vec<u8>)> {
        let limit = self.page_count()?;
        let mut data = Vec::new();
        let mut page = first;
        let mut pages_read = 0u64;
        let mut buf = vec![0u8; PAGE_SIZE];

        loop {
            if pages_read >= limit {
                return Err(Error::Corrupt(format!("blob at page {} has a cyclic chain", first)));
            }

            self.read_at(page, 0, &mut buf)?;
            let header = PageHeader::from_bytes(&buf[..PAGE_HEADER_SIZE])?;
            data.extend_from_slice(&buf[PAGE_HEADER_SIZE..]);
            pages_read += 1;

            if !header.continues() {
                let blob = BlobRef {
                    kind,
                    previous_last,
                    first,
                    last: page,
                    next_first: header.next(),
                };
                return Ok((blob, data));
            }

            page = header.next().ok_or_else(|| {
                Error::Corrupt(format!("page {} continues into no page", page))
            })?;
        }
    }

    fn read_page_header(&self, page: PageNumber) -> Result<PageHeader> {
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        self.read_at(page, 0, &mut buf)?;
        PageHeader::from_bytes(&buf)
    }

    fn write_page_header(&mut self, page: PageNumber, header: PageHeader) -> Result<()> {
        let bytes = header.to_bytes()?;
        self.write_at(page_offset(page), &bytes)
    }

    /// Write a full page: header, payload, zero padding up to `PAGE_DATA_SIZE`
    fn write_page(&mut self, page: PageNumber, header: PageHeader, data: &[u8]) -> Result<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        buf[..PAGE_HEADER_SIZE].copy_from_slice(&header.to_bytes()?);
        buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + data.len()].copy_from_slice(data);
        self.write_at(page_offset(page), &buf)
    }

    fn read_at(&self, page: PageNumber, skip: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(page_offset(page) + skip))?;
        file.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                warn!(page, "read past end of file");
                Error::Corrupt(format!("page {} lies past the end of the file", page))
            }
            _ => Error::Io(e),
        })
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush_header(&self) -> Result<()> {
        let bytes = self.header.to_bytes()?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(())
    }
}
