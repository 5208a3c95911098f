use crate::error::{StorageError, StorageResult};
use crate::page::PAGE_SIZE;
use log::debug;

// Header structure (8 bytes, all fields little-endian i16)
const HEADER_SIZE: usize = 8;
const SLOT_COUNT_OFFSET: usize = 0;
const FREE_LIST_HEAD_OFFSET: usize = 2;
const FREE_PTR_OFFSET: usize = 4;
const ATTR_LENGTH_OFFSET: usize = 6;

// Slot entry size (4 bytes: 2 for offset, 2 for length)
const SLOT_SIZE: usize = 4;

/// Sentinel index terminating the free list. A tombstoned slot also stores
/// this value as its length.
const INVALID_SLOT: i16 = -1;

/// Maximum number of slot entries the directory can ever hold.
pub const MAX_SLOTS: usize = (PAGE_SIZE - HEADER_SIZE) / SLOT_SIZE;

/// Slotted page over a borrowed page buffer.
///
/// Layout: `[header][slot directory -> grows up][free space][records <- grow down]`.
/// The slot directory starts right after the header and is indexed by slot id;
/// records fill the page from the high end downward. Deleted slots are kept as
/// tombstones and threaded into an intrusive free list (their offset field is
/// reused as the "next free" index), so slot ids stay stable and get recycled
/// without growing the directory.
pub struct SlottedPage<'a> {
    data: &'a mut [u8; PAGE_SIZE],
}

impl<'a> SlottedPage<'a> {
    /// Initialize a fresh slotted page: zero slots, empty free list, free
    /// pointer at the page end. Destroys any prior contents of the buffer.
    pub fn init(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        data.fill(0);
        let mut page = Self { data };
        page.set_slot_count(0);
        page.set_free_list_head(INVALID_SLOT);
        page.set_free_ptr(PAGE_SIZE as i16);
        page.set_attr_length(0);
        page
    }

    /// Wrap an already-initialized page buffer.
    pub fn from_data(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { data }
    }

    /// Insert a record and return its slot id.
    ///
    /// Reuses a tombstoned slot id if the free list is non-empty, otherwise
    /// appends a new directory entry. If free space is insufficient the page
    /// is compacted first; if the record still does not fit, fails with
    /// [`StorageError::NoSpace`] and the page contents are unchanged
    /// (compaction only moves records, it never changes what is visible).
    pub fn insert(&mut self, record: &[u8]) -> StorageResult<u16> {
        let slot_overhead = if self.get_free_list_head() == INVALID_SLOT {
            SLOT_SIZE
        } else {
            0
        };
        let required = record.len() + slot_overhead;

        // Zero-length records are indistinguishable from tombstones.
        if record.is_empty() {
            return Err(StorageError::NoSpace {
                required,
                available: self.free_space(),
            });
        }

        if self.free_space() < required {
            self.compact();
            if self.free_space() < required {
                return Err(StorageError::NoSpace {
                    required,
                    available: self.free_space(),
                });
            }
        }

        // All checks passed; nothing below can fail.
        let slot_id = self.reserve_slot()?;
        let dest = self.get_free_ptr() as usize - record.len();
        self.data[dest..dest + record.len()].copy_from_slice(record);
        self.set_free_ptr(dest as i16);
        self.set_slot(slot_id, dest as i16, record.len() as i16);

        Ok(slot_id as u16)
    }

    /// Delete the record in `slot_id`, tombstoning the slot and queuing its id
    /// for reuse. The record bytes are not reclaimed until a later insert
    /// triggers compaction.
    pub fn delete(&mut self, slot_id: u16) -> StorageResult<()> {
        self.active_slot(slot_id)?;
        let head = self.get_free_list_head();
        self.set_slot(slot_id as i16, head, INVALID_SLOT);
        self.set_free_list_head(slot_id as i16);
        Ok(())
    }

    /// Borrow the record stored in `slot_id`. The view is only valid while the
    /// page buffer stays fixed.
    pub fn get(&self, slot_id: u16) -> StorageResult<&[u8]> {
        let (offset, length) = self.active_slot(slot_id)?;
        Ok(&self.data[offset as usize..offset as usize + length as usize])
    }

    /// Advance a forward scan to the next active slot at or after
    /// `*cursor + 1`, returning its record and storing its slot id in the
    /// cursor. A cursor of `-1` starts the scan from slot 0. At the end of the
    /// page the cursor is reset to `-1` and [`StorageError::Empty`] is
    /// returned, so the same cursor restarts the scan.
    pub fn next_record(&self, cursor: &mut i16) -> StorageResult<&[u8]> {
        let start = if *cursor < 0 { 0 } else { *cursor + 1 };
        for slot_id in start..self.get_slot_count() {
            let (offset, length) = self.get_slot(slot_id);
            if length > 0 {
                *cursor = slot_id;
                return Ok(&self.data[offset as usize..offset as usize + length as usize]);
            }
        }
        *cursor = INVALID_SLOT;
        Err(StorageError::Empty)
    }

    /// Iterator over `(slot id, record)` pairs in increasing slot-id order.
    pub fn records(&self) -> Records<'_, 'a> {
        Records {
            page: self,
            cursor: INVALID_SLOT,
            done: false,
        }
    }

    /// Bytes available for an insert without compacting the page.
    pub fn free_space(&self) -> usize {
        let slot_bytes = self.get_slot_count() as usize * SLOT_SIZE;
        self.get_free_ptr() as usize - (HEADER_SIZE + slot_bytes)
    }

    /// Total bytes held by active records. Stale bytes left behind by deletes
    /// are not counted.
    pub fn used_bytes(&self) -> usize {
        (0..self.get_slot_count())
            .map(|slot_id| self.get_slot(slot_id).1)
            .filter(|&length| length > 0)
            .map(|length| length as usize)
            .sum()
    }

    /// Number of slot entries ever allocated (active + tombstoned).
    pub fn slot_count(&self) -> u16 {
        self.get_slot_count() as u16
    }

    /// Informational header field, unused by the page algorithms.
    pub fn attr_length(&self) -> i16 {
        self.read_i16(ATTR_LENGTH_OFFSET)
    }

    pub fn set_attr_length(&mut self, attr_length: i16) {
        self.write_i16(ATTR_LENGTH_OFFSET, attr_length);
    }

    /// Pop a slot id off the free list, or append a new directory entry.
    fn reserve_slot(&mut self) -> StorageResult<i16> {
        let head = self.get_free_list_head();
        if head != INVALID_SLOT {
            let (next_free, _) = self.get_slot(head);
            self.set_free_list_head(next_free);
            return Ok(head);
        }

        let slot_count = self.get_slot_count();
        if slot_count as usize >= MAX_SLOTS {
            return Err(StorageError::NoSpace {
                required: SLOT_SIZE,
                available: 0,
            });
        }
        self.set_slot_count(slot_count + 1);
        Ok(slot_count)
    }

    /// Repack all active records against the high end of the page, squeezing
    /// out the gaps left by deleted records. Slot ids, record contents, and
    /// tombstones are untouched; only offsets and the free pointer change.
    fn compact(&mut self) {
        let mut active: Vec<(i16, i16, i16)> = (0..self.get_slot_count())
            .filter_map(|slot_id| {
                let (offset, length) = self.get_slot(slot_id);
                (length > 0).then_some((slot_id, offset, length))
            })
            .collect();

        // Move the record nearest the page end first so that a shifted record
        // never overwrites bytes that still have to move.
        active.sort_unstable_by(|a, b| b.1.cmp(&a.1));

        let mut free_ptr = PAGE_SIZE;
        for (slot_id, offset, length) in active {
            free_ptr -= length as usize;
            if offset as usize != free_ptr {
                // Source and destination may overlap for adjacent records.
                self.data
                    .copy_within(offset as usize..offset as usize + length as usize, free_ptr);
            }
            self.set_slot(slot_id, free_ptr as i16, length);
        }

        let reclaimed = free_ptr - self.get_free_ptr() as usize;
        self.set_free_ptr(free_ptr as i16);
        debug!("compacted page, reclaimed {} bytes", reclaimed);
    }

    /// Bounds-check `slot_id` and require it to be active; returns its
    /// (offset, length).
    fn active_slot(&self, slot_id: u16) -> StorageResult<(i16, i16)> {
        let slot_count = self.get_slot_count();
        if slot_id as usize >= slot_count as usize {
            return Err(StorageError::InvalidSlot {
                slot_id,
                slot_count: slot_count as u16,
            });
        }
        let (offset, length) = self.get_slot(slot_id as i16);
        if length <= 0 {
            return Err(StorageError::InvalidSlot {
                slot_id,
                slot_count: slot_count as u16,
            });
        }
        Ok((offset, length))
    }

    fn get_slot_count(&self) -> i16 {
        self.read_i16(SLOT_COUNT_OFFSET)
    }

    fn set_slot_count(&mut self, slot_count: i16) {
        self.write_i16(SLOT_COUNT_OFFSET, slot_count);
    }

    fn get_free_list_head(&self) -> i16 {
        self.read_i16(FREE_LIST_HEAD_OFFSET)
    }

    fn set_free_list_head(&mut self, slot_id: i16) {
        self.write_i16(FREE_LIST_HEAD_OFFSET, slot_id);
    }

    fn get_free_ptr(&self) -> i16 {
        self.read_i16(FREE_PTR_OFFSET)
    }

    fn set_free_ptr(&mut self, free_ptr: i16) {
        self.write_i16(FREE_PTR_OFFSET, free_ptr);
    }

    fn get_slot(&self, slot_id: i16) -> (i16, i16) {
        let base = Self::slot_offset(slot_id);
        (self.read_i16(base), self.read_i16(base + 2))
    }

    fn set_slot(&mut self, slot_id: i16, offset: i16, length: i16) {
        let base = Self::slot_offset(slot_id);
        self.write_i16(base, offset);
        self.write_i16(base + 2, length);
    }

    fn slot_offset(slot_id: i16) -> usize {
        debug_assert!((0..MAX_SLOTS as i16).contains(&slot_id));
        HEADER_SIZE + slot_id as usize * SLOT_SIZE
    }

    fn read_i16(&self, offset: usize) -> i16 {
        i16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    fn write_i16(&mut self, offset: usize, value: i16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }
}

/// Forward scan over the active records of a page, in slot-id order.
pub struct Records<'p, 'a> {
    page: &'p SlottedPage<'a>,
    cursor: i16,
    done: bool,
}

impl<'p, 'a> Iterator for Records<'p, 'a> {
    type Item = (u16, &'p [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.page.next_record(&mut self.cursor) {
            Ok(record) => Some((self.cursor as u16, record)),
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}
