//! Pagination cursor over the Explorer listing

/// Position in the listing plus whether more pages may follow
///
/// Cursors only move forward: each batch requests the pages directly after
/// the previous one, so no page is fetched twice in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    offset: usize,
    page_size: usize,
    has_more: bool,
}

impl PageCursor {
    /// Cursor at the first page. A page size of zero is treated as one.
    pub fn start(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size: page_size.max(1),
            has_more: true,
        }
    }

    /// Record offset of the page the cursor points at
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 1-based page number
    pub fn page_number(&self) -> u32 {
        (self.offset / self.page_size) as u32 + 1
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Cursor for the page `pages` positions further on
    pub fn advance(&self, pages: usize, has_more: bool) -> Self {
        Self {
            offset: self.offset + pages * self.page_size,
            page_size: self.page_size,
            has_more,
        }
    }

    /// Cursors for the next `pages` pages, in listing order
    pub fn following(&self, pages: usize) -> impl Iterator<Item = PageCursor> + '_ {
        (0..pages).map(move |i| self.advance(i, true))
    }
}
