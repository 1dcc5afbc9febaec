//! The driver control surface.
//!
//! [`Driver`] owns the four process-wide singletons of the C-era design -
//! bus connection, file table, frame cache, and the loaded-cartridge
//! register - as one value, created by [`Driver::poweron`] and consumed by
//! [`Driver::poweroff`]. All file I/O funnels through here: reads and
//! writes resolve the cursor to a slot range, service each frame through
//! the cache, and fall back to LOAD/READ/WRITE exchanges on the bus.

use cartfs_client::BusClient;
use cartfs_proto::{FRAME_SIZE, FrameBuf, MAX_CARTRIDGES};

use crate::{
    cache::FrameCache,
    config::DriverConfig,
    error::DriverError,
    fs::{FileTable, Handle, Slot},
};

/// A powered-on cartridge filesystem.
///
/// Single-threaded and blocking: each operation runs to completion before
/// the next may begin, and the only suspension points are the socket reads
/// and writes inside the bus client.
///
/// # Invariants
///
/// - `loaded_cart` mirrors the last successful LOAD on the bus.
/// - Every frame reaching the cache or the bus is exactly [`FRAME_SIZE`]
///   bytes.
pub struct Driver {
    bus: BusClient,
    cache: FrameCache,
    table: FileTable,
    loaded_cart: Option<u16>,
}

impl Driver {
    /// Power the memory system on.
    ///
    /// Issues INIT, then LOAD + ZERO for every cartridge so the device
    /// starts blank, and leaves the last cartridge loaded. Any controller
    /// rejection aborts the power-on.
    pub fn poweron(config: &DriverConfig) -> Result<Self, DriverError> {
        let mut bus = BusClient::new(config.controller_addr());
        bus.init()?;

        let mut loaded_cart = None;
        for cart in 0..MAX_CARTRIDGES {
            bus.load(cart)?;
            bus.zero()?;
            loaded_cart = Some(cart);
        }

        tracing::info!(
            controller = %config.controller_addr(),
            cache_frames = config.cache_frames,
            "device powered on"
        );
        Ok(Self {
            bus,
            cache: FrameCache::new(config.cache_frames),
            table: FileTable::new(),
            loaded_cart,
        })
    }

    /// Shut the device down, consuming the driver.
    ///
    /// Local state (file table, cache, connection) is released regardless;
    /// a POWEROFF rejection is reported after the cleanup.
    pub fn poweroff(mut self) -> Result<(), DriverError> {
        self.table.clear();
        if let Err(err) = self.bus.poweroff() {
            tracing::warn!(%err, "poweroff exchange failed; local state discarded anyway");
            return Err(err.into());
        }
        tracing::info!("device powered off");
        Ok(())
    }

    /// Open `name`, creating the file on first open.
    ///
    /// Returns a handle that is positive and unique among open files.
    ///
    /// # Errors
    ///
    /// [`crate::FsError::Busy`] if the name is already open.
    pub fn open(&mut self, name: &[u8]) -> Result<Handle, DriverError> {
        let handle = self.table.open(name)?;
        tracing::debug!(name = %name.escape_ascii(), handle, "file opened");
        Ok(handle)
    }

    /// Close the file at `handle`. Its contents stay addressable by a
    /// later [`Driver::open`] of the same name.
    pub fn close(&mut self, handle: Handle) -> Result<(), DriverError> {
        self.table.close(handle)?;
        tracing::debug!(handle, "file closed");
        Ok(())
    }

    /// Move the cursor of the file at `handle` to `loc`.
    ///
    /// # Errors
    ///
    /// [`crate::FsError::OutOfRange`] if `loc` is past the file's length;
    /// the cursor does not move.
    pub fn seek(&mut self, handle: Handle, loc: usize) -> Result<(), DriverError> {
        self.table.seek(handle, loc)?;
        Ok(())
    }

    /// Read up to `buf.len()` bytes at the cursor into `buf`.
    ///
    /// Returns the number of bytes read, which is short exactly when the
    /// cursor hits end of file; the cursor advances by that amount.
    pub fn read(&mut self, handle: Handle, buf: &mut [u8]) -> Result<usize, DriverError> {
        let index = self.table.resolve(handle)?;
        let (cursor, length) = {
            let record = self.table.record(index);
            (record.cursor, record.length)
        };

        let available = length.saturating_sub(cursor);
        let count = buf.len().min(available);
        if count == 0 {
            return Ok(0);
        }

        let start_slot = cursor / FRAME_SIZE;
        let end_slot = (cursor + count - 1) / FRAME_SIZE;
        let slots = self.table.record(index).slots[start_slot..=end_slot].to_vec();

        let mut staging = vec![0u8; slots.len() * FRAME_SIZE];
        for (i, slot) in slots.iter().enumerate() {
            self.read_through(*slot, &mut staging[i * FRAME_SIZE..(i + 1) * FRAME_SIZE])?;
        }

        let offset = cursor - start_slot * FRAME_SIZE;
        buf[..count].copy_from_slice(&staging[offset..offset + count]);
        self.table.record_mut(index).cursor = cursor + count;

        tracing::trace!(handle, count, "read");
        Ok(count)
    }

    /// Write all of `buf` at the cursor, growing the file as needed.
    ///
    /// Every affected frame is read-modified-written: frames holding live
    /// bytes outside the written range are fetched first (through the
    /// cache), then each modified frame is cached and pushed to the bus.
    /// New slots come from the append-only frontier before any bus traffic,
    /// so a full device fails the call without touching the controller. A
    /// bus failure partway leaves earlier frames written - there is no
    /// journaling.
    pub fn write(&mut self, handle: Handle, buf: &[u8]) -> Result<usize, DriverError> {
        let index = self.table.resolve(handle)?;
        let count = buf.len();
        if count == 0 {
            return Ok(0);
        }

        let (cursor, length) = {
            let record = self.table.record(index);
            (record.cursor, record.length)
        };
        let end = cursor + count;

        self.table.ensure_slots(index, end.div_ceil(FRAME_SIZE))?;

        let start_slot = cursor / FRAME_SIZE;
        let end_slot = (end - 1) / FRAME_SIZE;
        // Slots below this index hold bytes that must survive the overlay.
        let live_slots = length.div_ceil(FRAME_SIZE);
        let slots = self.table.record(index).slots[start_slot..=end_slot].to_vec();

        let mut staging = vec![0u8; slots.len() * FRAME_SIZE];
        for (i, slot) in slots.iter().enumerate() {
            let slot_index = start_slot + i;
            let fully_overlaid =
                cursor <= slot_index * FRAME_SIZE && end >= (slot_index + 1) * FRAME_SIZE;
            if slot_index < live_slots && !fully_overlaid {
                self.read_through(*slot, &mut staging[i * FRAME_SIZE..(i + 1) * FRAME_SIZE])?;
            }
        }

        let offset = cursor - start_slot * FRAME_SIZE;
        staging[offset..offset + count].copy_from_slice(buf);

        let mut frame = [0u8; FRAME_SIZE];
        for (i, slot) in slots.iter().enumerate() {
            frame.copy_from_slice(&staging[i * FRAME_SIZE..(i + 1) * FRAME_SIZE]);
            self.ensure_loaded(slot.cart)?;
            self.cache.put(slot.cart, slot.frame, &frame)?;
            self.bus.write_frame(slot.frame, &frame)?;
        }

        let record = self.table.record_mut(index);
        record.length = record.length.max(end);
        record.cursor = end;

        tracing::trace!(handle, count, "write");
        Ok(count)
    }

    /// Cartridge currently loaded on the bus.
    pub fn loaded_cart(&self) -> Option<u16> {
        self.loaded_cart
    }

    /// Fill `dst` with one frame, from the cache when possible.
    ///
    /// A miss loads the owning cartridge if needed, reads the frame over
    /// the bus, and inserts it into the cache before copying out.
    fn read_through(&mut self, slot: Slot, dst: &mut [u8]) -> Result<(), DriverError> {
        if let Some(bytes) = self.cache.get(slot.cart, slot.frame) {
            dst.copy_from_slice(bytes);
            return Ok(());
        }

        self.ensure_loaded(slot.cart)?;
        let mut frame: FrameBuf = [0u8; FRAME_SIZE];
        self.bus.read_frame(slot.frame, &mut frame)?;
        self.cache.put(slot.cart, slot.frame, &frame)?;
        dst.copy_from_slice(&frame);
        Ok(())
    }

    /// LOAD `cart` unless it is already the loaded cartridge.
    fn ensure_loaded(&mut self, cart: u16) -> Result<(), DriverError> {
        if self.loaded_cart != Some(cart) {
            self.bus.load(cart)?;
            self.loaded_cart = Some(cart);
        }
        Ok(())
    }
}
