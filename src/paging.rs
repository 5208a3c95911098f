//! Interface to the external page-buffer layer.
//!
//! The slotted page operates on buffers it does not own. This module defines
//! the fix/unfix protocol those buffers come from: a caller fixes a page for
//! exclusive access, mutates it through [`SlottedPage`](crate::SlottedPage),
//! then unfixes it declaring whether it was modified so the pager knows to
//! persist it. [`MemoryPager`] is a minimal implementation with no eviction
//! and no disk, enough for tests and in-memory callers.

use crate::error::{StorageError, StorageResult};
use crate::page::{PageId, PAGE_SIZE};
use log::trace;

/// Counters a pager keeps about its own activity. Owned by the pager instance
/// rather than living in process-wide state, so callers that want metrics ask
/// the pager they injected.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PagerStats {
    pub allocations: u64,
    pub fixes: u64,
    pub unfixes: u64,
    pub dirty_marks: u64,
}

/// Fix/unfix protocol of the page-buffer layer.
///
/// A fixed page is exclusively owned by the caller until it is unfixed; the
/// returned buffer must not be retained past that point. Pages are iterated
/// in file order via [`first_page`](Pager::first_page) /
/// [`next_page`](Pager::next_page), with `None` as the end-of-file signal.
pub trait Pager {
    /// Allocate a new zeroed page and return its id. The page is not fixed.
    fn alloc_page(&mut self) -> StorageResult<PageId>;

    /// Fix a page for exclusive access and return its buffer.
    fn fix_page(&mut self, page_id: PageId) -> StorageResult<&mut [u8; PAGE_SIZE]>;

    /// Release a fixed page, declaring whether it was modified.
    fn unfix_page(&mut self, page_id: PageId, dirty: bool) -> StorageResult<()>;

    /// First page of the file, if any.
    fn first_page(&self) -> Option<PageId>;

    /// Page following `page_id` in file order, if any.
    fn next_page(&self, page_id: PageId) -> Option<PageId>;
}

struct Frame {
    data: Box<[u8; PAGE_SIZE]>,
    fixed: bool,
    dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
            fixed: false,
            dirty: false,
        }
    }
}

/// In-memory pager: every page stays resident, nothing is ever written out.
pub struct MemoryPager {
    frames: Vec<Frame>,
    stats: PagerStats,
}

impl MemoryPager {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            stats: PagerStats::default(),
        }
    }

    pub fn stats(&self) -> &PagerStats {
        &self.stats
    }

    /// Whether a page was ever unfixed as modified.
    pub fn is_dirty(&self, page_id: PageId) -> StorageResult<bool> {
        let frame = self
            .frames
            .get(page_id.0 as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;
        Ok(frame.dirty)
    }

    fn frame_mut(&mut self, page_id: PageId) -> StorageResult<&mut Frame> {
        self.frames
            .get_mut(page_id.0 as usize)
            .ok_or(StorageError::PageNotFound(page_id))
    }
}

impl Default for MemoryPager {
    fn default() -> Self {
        Self::new()
    }
}

impl Pager for MemoryPager {
    fn alloc_page(&mut self) -> StorageResult<PageId> {
        let page_id = PageId(self.frames.len() as u32);
        self.frames.push(Frame::new());
        self.stats.allocations += 1;
        trace!("allocated page {}", page_id);
        Ok(page_id)
    }

    fn fix_page(&mut self, page_id: PageId) -> StorageResult<&mut [u8; PAGE_SIZE]> {
        self.stats.fixes += 1;
        trace!("fix page {}", page_id);
        let frame = self.frame_mut(page_id)?;
        frame.fixed = true;
        Ok(&mut frame.data)
    }

    fn unfix_page(&mut self, page_id: PageId, dirty: bool) -> StorageResult<()> {
        let frame = self.frame_mut(page_id)?;
        if !frame.fixed {
            return Err(StorageError::PageNotFixed(page_id));
        }
        frame.fixed = false;
        frame.dirty |= dirty;
        self.stats.unfixes += 1;
        if dirty {
            self.stats.dirty_marks += 1;
        }
        trace!("unfix page {} (dirty: {})", page_id, dirty);
        Ok(())
    }

    fn first_page(&self) -> Option<PageId> {
        (!self.frames.is_empty()).then_some(PageId(0))
    }

    fn next_page(&self, page_id: PageId) -> Option<PageId> {
        let next = page_id.0 as usize + 1;
        (next < self.frames.len()).then(|| PageId(next as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_fix() -> StorageResult<()> {
        let mut pager = MemoryPager::new();

        let page_id = pager.alloc_page()?;
        assert_eq!(page_id, PageId(0));

        let buf = pager.fix_page(page_id)?;
        assert!(buf.iter().all(|&b| b == 0));
        buf[0] = 42;
        pager.unfix_page(page_id, true)?;

        let buf = pager.fix_page(page_id)?;
        assert_eq!(buf[0], 42);
        pager.unfix_page(page_id, false)?;

        Ok(())
    }

    #[test]
    fn test_fix_unknown_page() {
        let mut pager = MemoryPager::new();
        assert!(matches!(
            pager.fix_page(PageId(3)),
            Err(StorageError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_unfix_requires_fix() -> StorageResult<()> {
        let mut pager = MemoryPager::new();
        let page_id = pager.alloc_page()?;

        assert!(matches!(
            pager.unfix_page(page_id, false),
            Err(StorageError::PageNotFixed(_))
        ));
        Ok(())
    }

    #[test]
    fn test_dirty_marking_sticks() -> StorageResult<()> {
        let mut pager = MemoryPager::new();
        let page_id = pager.alloc_page()?;

        pager.fix_page(page_id)?;
        pager.unfix_page(page_id, true)?;
        pager.fix_page(page_id)?;
        pager.unfix_page(page_id, false)?;

        // A clean unfix does not clear an earlier dirty mark.
        assert!(pager.is_dirty(page_id)?);
        Ok(())
    }

    #[test]
    fn test_stats_counting() -> StorageResult<()> {
        let mut pager = MemoryPager::new();
        let a = pager.alloc_page()?;
        let b = pager.alloc_page()?;

        pager.fix_page(a)?;
        pager.unfix_page(a, true)?;
        pager.fix_page(b)?;
        pager.unfix_page(b, false)?;

        let stats = pager.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.fixes, 2);
        assert_eq!(stats.unfixes, 2);
        assert_eq!(stats.dirty_marks, 1);
        Ok(())
    }

    #[test]
    fn test_page_iteration() -> StorageResult<()> {
        let mut pager = MemoryPager::new();
        assert_eq!(pager.first_page(), None);

        let ids: Vec<PageId> = (0..3).map(|_| pager.alloc_page()).collect::<StorageResult<_>>()?;

        let mut seen = Vec::new();
        let mut current = pager.first_page();
        while let Some(page_id) = current {
            seen.push(page_id);
            current = pager.next_page(page_id);
        }
        assert_eq!(seen, ids);
        Ok(())
    }
}
