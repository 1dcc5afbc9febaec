//! Fixed-capacity frame cache with priority-ordered eviction.
//!
//! The cache is an array-backed reverse-LRU: every occupied entry carries an
//! integer priority, `1` for the most recently touched entry up to the
//! occupied count for the next victim. Touching an entry promotes it to `1`
//! and ages every entry that was fresher by one step. O(capacity) per
//! access, no auxiliary structures, and a uniquely determined victim - the
//! driver's bus-traffic behavior depends on reproducing this order exactly.
//!
//! # Invariants
//!
//! - The priorities of the occupied entries always form a permutation of
//!   `{1..=occupied}`.
//! - At most one entry exists per `(cartridge, frame)` key.

use cartfs_proto::FrameBuf;
use thiserror::Error;

/// Cache invariant violations.
///
/// These indicate a programming bug, not a recoverable condition; they are
/// surfaced instead of panicking so the driver can report them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// No entry holds the eviction priority, so the permutation is broken.
    #[error("cache eviction order corrupt: no entry holds priority {expected}")]
    Corrupt {
        /// Priority the victim scan expected to find.
        expected: usize,
    },
}

struct CacheEntry {
    cart: u16,
    frame: u16,
    priority: usize,
    payload: Box<FrameBuf>,
}

/// Frame cache keyed by `(cartridge, frame)`.
///
/// Capacity is fixed at construction; a capacity of zero yields an inert
/// cache (every `put` is dropped, every `get` misses), which the driver
/// uses to run uncached.
pub struct FrameCache {
    capacity: usize,
    entries: Vec<CacheEntry>,
}

impl FrameCache {
    /// Create a cache holding up to `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Vec::with_capacity(capacity) }
    }

    /// Maximum number of cached frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently cached.
    pub fn occupied(&self) -> usize {
        self.entries.len()
    }

    /// Insert or overwrite the frame at `(cart, frame)`.
    ///
    /// The entry becomes the most recently used. When the cache is full the
    /// entry with the lowest standing (priority equal to the capacity) is
    /// evicted to make room.
    pub fn put(&mut self, cart: u16, frame: u16, payload: &FrameBuf) -> Result<(), CacheError> {
        if self.capacity == 0 {
            return Ok(());
        }

        if let Some(index) = self.position(cart, frame) {
            let old = self.entries[index].priority;
            self.entries[index].payload.copy_from_slice(payload);
            self.touch(index, old);
            return Ok(());
        }

        if self.entries.len() < self.capacity {
            self.entries.push(CacheEntry {
                cart,
                frame,
                priority: self.entries.len() + 1,
                payload: Box::new(*payload),
            });
            let index = self.entries.len() - 1;
            self.touch(index, self.capacity);
            return Ok(());
        }

        // Full: the victim is the unique entry at the eviction priority.
        let expected = self.capacity;
        let Some(index) = self.entries.iter().position(|e| e.priority == expected) else {
            return Err(CacheError::Corrupt { expected });
        };
        let entry = &mut self.entries[index];
        entry.cart = cart;
        entry.frame = frame;
        entry.payload.copy_from_slice(payload);
        self.touch(index, expected);
        Ok(())
    }

    /// Look up the frame at `(cart, frame)`, marking it most recently used.
    ///
    /// The returned borrow ends at the next cache operation; callers copy
    /// out rather than holding it across further traffic.
    pub fn get(&mut self, cart: u16, frame: u16) -> Option<&FrameBuf> {
        let index = self.position(cart, frame)?;
        let old = self.entries[index].priority;
        self.touch(index, old);
        Some(&*self.entries[index].payload)
    }

    fn position(&self, cart: u16, frame: u16) -> Option<usize> {
        self.entries.iter().position(|e| e.cart == cart && e.frame == frame)
    }

    /// Promote `index` to priority 1 and age every other entry whose
    /// priority was fresher than `old`.
    fn touch(&mut self, index: usize, old: usize) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if i == index {
                entry.priority = 1;
            } else if entry.priority < old {
                entry.priority += 1;
            }
        }
    }

    #[cfg(test)]
    fn priorities(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.priority).collect()
    }

    #[cfg(test)]
    fn priority_of(&self, cart: u16, frame: u16) -> Option<usize> {
        self.position(cart, frame).map(|i| self.entries[i].priority)
    }
}
