//! File table bookkeeping for the write-once filesystem.
//!
//! Pure state, no I/O: file records (name, length, cursor, handle, slot
//! list), handle assignment, and the append-only allocation frontier that
//! hands out `(cartridge, frame)` slots. The driver layers bus and cache
//! traffic on top.
//!
//! Names are opaque, length-tagged byte strings; there is no path
//! hierarchy. Slots are never reclaimed - allocation only moves forward
//! within a power cycle, so every slot belongs to at most one file.

use cartfs_proto::{MAX_CARTRIDGES, MAX_FRAMES_PER_CARTRIDGE};
use thiserror::Error;

/// Positive integer naming an open file.
///
/// Unique among currently-open files and reusable after close; closed files
/// hold no handle.
pub type Handle = u16;

/// One allocated `(cartridge, frame)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    /// Cartridge index.
    pub cart: u16,
    /// Frame index within the cartridge.
    pub frame: u16,
}

/// File table errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The handle names no currently-open file.
    #[error("bad file handle {0}")]
    BadHandle(Handle),

    /// The name is already open under another handle.
    #[error("file is already open")]
    Busy,

    /// A seek past the end of the file.
    #[error("seek to {loc} is past end of file (length {length})")]
    OutOfRange {
        /// Requested cursor position.
        loc: usize,
        /// Current file length.
        length: usize,
    },

    /// The allocation frontier has consumed every cartridge.
    #[error("device full: all {cartridges} cartridges are allocated")]
    DeviceFull {
        /// Cartridge count of the device.
        cartridges: u16,
    },
}

/// Per-file metadata.
///
/// Closed files keep their name, length, and slot list so a reopen sees the
/// same contents; only the handle and cursor reset.
#[derive(Debug)]
pub struct FileRecord {
    pub(crate) name: Vec<u8>,
    pub(crate) length: usize,
    pub(crate) cursor: usize,
    pub(crate) handle: Option<Handle>,
    pub(crate) slots: Vec<Slot>,
}

impl FileRecord {
    /// File name bytes.
    #[allow(dead_code)]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Current size in bytes.
    #[allow(dead_code)]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Whether the file is currently open.
    #[allow(dead_code)]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

/// Append-only slot allocator.
///
/// Frames of a cartridge are consumed in order; when a cartridge runs out
/// the frontier moves to frame 0 of the next one. Nothing is ever handed
/// back.
#[derive(Debug, Default)]
struct Frontier {
    next_cart: u16,
    next_frame: u16,
}

impl Frontier {
    fn allocate(&mut self) -> Result<Slot, FsError> {
        if self.next_cart >= MAX_CARTRIDGES {
            return Err(FsError::DeviceFull { cartridges: MAX_CARTRIDGES });
        }
        let slot = Slot { cart: self.next_cart, frame: self.next_frame };
        self.next_frame += 1;
        if self.next_frame == MAX_FRAMES_PER_CARTRIDGE {
            self.next_frame = 0;
            self.next_cart += 1;
        }
        Ok(slot)
    }

    #[cfg(test)]
    fn at(next_cart: u16, next_frame: u16) -> Self {
        Self { next_cart, next_frame }
    }
}

/// The filesystem's record collection plus the allocation frontier.
///
/// # Invariants
///
/// - Names are unique; insertion order is preserved.
/// - No two open records share a handle.
/// - Slot lists are pairwise disjoint across all files.
#[derive(Debug, Default)]
pub struct FileTable {
    files: Vec<FileRecord>,
    frontier: Frontier,
}

impl FileTable {
    /// Create an empty table with the frontier at cartridge 0, frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `name`, creating it on first open.
    ///
    /// Reopening a closed file resets its cursor and assigns a fresh
    /// handle; its length and slots are untouched.
    ///
    /// # Errors
    ///
    /// [`FsError::Busy`] if the name is already open.
    pub fn open(&mut self, name: &[u8]) -> Result<Handle, FsError> {
        if let Some(index) = self.files.iter().position(|f| f.name == name) {
            if self.files[index].handle.is_some() {
                return Err(FsError::Busy);
            }
            let handle = self.fresh_handle();
            let record = &mut self.files[index];
            record.cursor = 0;
            record.handle = Some(handle);
            return Ok(handle);
        }

        let handle = self.fresh_handle();
        self.files.push(FileRecord {
            name: name.to_vec(),
            length: 0,
            cursor: 0,
            handle: Some(handle),
            slots: Vec::new(),
        });
        Ok(handle)
    }

    /// Close the file at `handle`, resetting its cursor.
    pub fn close(&mut self, handle: Handle) -> Result<(), FsError> {
        let index = self.resolve(handle)?;
        let record = &mut self.files[index];
        record.handle = None;
        record.cursor = 0;
        Ok(())
    }

    /// Move the cursor of the file at `handle`.
    ///
    /// # Errors
    ///
    /// [`FsError::OutOfRange`] if `loc` is past the file's length; the
    /// cursor is left where it was.
    pub fn seek(&mut self, handle: Handle, loc: usize) -> Result<(), FsError> {
        let index = self.resolve(handle)?;
        let record = &mut self.files[index];
        if loc > record.length {
            return Err(FsError::OutOfRange { loc, length: record.length });
        }
        record.cursor = loc;
        Ok(())
    }

    /// Number of files ever created (open or closed).
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the table holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Drop every record. Used by poweroff.
    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Index of the open file at `handle`.
    pub(crate) fn resolve(&self, handle: Handle) -> Result<usize, FsError> {
        self.files
            .iter()
            .position(|f| f.handle == Some(handle))
            .ok_or(FsError::BadHandle(handle))
    }

    pub(crate) fn record(&self, index: usize) -> &FileRecord {
        &self.files[index]
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> &mut FileRecord {
        &mut self.files[index]
    }

    /// Grow the slot list of file `index` to at least `slots` entries,
    /// allocating from the frontier.
    pub(crate) fn ensure_slots(&mut self, index: usize, slots: usize) -> Result<(), FsError> {
        while self.files[index].slots.len() < slots {
            let slot = self.frontier.allocate()?;
            self.files[index].slots.push(slot);
        }
        Ok(())
    }

    /// Smallest positive handle not held by any open file.
    fn fresh_handle(&self) -> Handle {
        let mut candidate: Handle = 1;
        while self.files.iter().any(|f| f.handle == Some(candidate)) {
            candidate += 1;
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_sequential_and_reused() {
        let mut table = FileTable::new();
        let a = table.open(b"a").unwrap();
        let b = table.open(b"b").unwrap();
        assert_eq!((a, b), (1, 2));

        table.close(a).unwrap();
        let c = table.open(b"c").unwrap();
        assert_eq!(c, 1, "closed handles are reused");

        let a2 = table.open(b"a").unwrap();
        assert_eq!(a2, 3, "1 and 2 are taken, so the reopen gets 3");
    }

    #[test]
    fn double_open_is_busy() {
        let mut table = FileTable::new();
        table.open(b"a").unwrap();
        assert_eq!(table.open(b"a"), Err(FsError::Busy));
    }

    #[test]
    fn reopen_lands_on_the_matching_record() {
        let mut table = FileTable::new();
        let a = table.open(b"a").unwrap();
        table.open(b"b").unwrap();
        table.record_mut(0).length = 42;
        table.close(a).unwrap();

        let a2 = table.open(b"a").unwrap();
        let index = table.resolve(a2).unwrap();
        assert_eq!(table.record(index).name(), b"a");
        assert_eq!(table.record(index).length(), 42);
        assert_eq!(table.record(index).cursor, 0);
    }

    #[test]
    fn close_unknown_handle_is_rejected() {
        let mut table = FileTable::new();
        assert_eq!(table.close(7), Err(FsError::BadHandle(7)));

        let a = table.open(b"a").unwrap();
        table.close(a).unwrap();
        assert_eq!(table.close(a), Err(FsError::BadHandle(a)), "double close");
    }

    #[test]
    fn seek_bounds() {
        let mut table = FileTable::new();
        let a = table.open(b"a").unwrap();
        table.record_mut(0).length = 10;

        table.seek(a, 10).unwrap();
        assert_eq!(table.record(0).cursor, 10);

        assert_eq!(table.seek(a, 11), Err(FsError::OutOfRange { loc: 11, length: 10 }));
        assert_eq!(table.record(0).cursor, 10, "failed seek leaves the cursor");
    }

    #[test]
    fn frontier_rolls_over_at_cartridge_end() {
        let mut frontier = Frontier::at(0, MAX_FRAMES_PER_CARTRIDGE - 1);
        let last = frontier.allocate().unwrap();
        let next = frontier.allocate().unwrap();
        assert_eq!(last, Slot { cart: 0, frame: MAX_FRAMES_PER_CARTRIDGE - 1 });
        assert_eq!(next, Slot { cart: 1, frame: 0 });
    }

    #[test]
    fn frontier_reports_exhaustion() {
        let mut frontier = Frontier::at(MAX_CARTRIDGES - 1, MAX_FRAMES_PER_CARTRIDGE - 1);
        frontier.allocate().unwrap();
        assert_eq!(
            frontier.allocate(),
            Err(FsError::DeviceFull { cartridges: MAX_CARTRIDGES })
        );
    }

    #[test]
    fn ensure_slots_allocates_disjoint_slots() {
        let mut table = FileTable::new();
        table.open(b"a").unwrap();
        table.open(b"b").unwrap();
        table.ensure_slots(0, 2).unwrap();
        table.ensure_slots(1, 3).unwrap();
        table.ensure_slots(0, 2).unwrap(); // already satisfied, no growth

        let a_slots = table.record(0).slots.clone();
        let b_slots = table.record(1).slots.clone();
        assert_eq!(a_slots.len(), 2);
        assert_eq!(b_slots.len(), 3);
        assert!(a_slots.iter().all(|s| !b_slots.contains(s)), "slots never overlap");
        assert_eq!(a_slots, vec![Slot { cart: 0, frame: 0 }, Slot { cart: 0, frame: 1 }]);
        assert_eq!(b_slots[0], Slot { cart: 0, frame: 2 });
    }
}
