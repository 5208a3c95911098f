//! Slotted-page record storage for slotdb.
//!
//! This crate lays out variable-length records inside fixed-size page buffers
//! supplied by an external page-buffer layer. Key components:
//!
//! - **SlottedPage**: slotted page format storing variable-length records with
//!   an intrusive free list and in-place compaction
//! - **Pager**: the fix/unfix interface of the paging layer that owns the
//!   buffers this crate operates on
//! - **MemoryPager**: a minimal in-memory pager for tests and callers that do
//!   not need disk-backed pages
//!
//! The slotted page never touches a disk or a buffer pool itself: it is always
//! handed an exclusively-owned, already-resident page buffer and mutates it in
//! place. Durability and eviction belong to the paging layer.

pub mod error;
pub mod page;
pub mod paging;

pub use error::{StorageError, StorageResult};
pub use page::{PageId, SlottedPage, PAGE_SIZE};
pub use paging::{MemoryPager, Pager, PagerStats};
