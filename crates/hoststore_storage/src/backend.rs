//! Storage device trait.

use crate::error::StorageResult;

/// An append-only byte device.
///
/// The hoststore engine writes one framed record per committed transaction
/// and replays the device from offset zero when it opens. Devices therefore
/// only need sequential appends, positional reads, and a way to cut off a
/// torn tail left by a crash.
///
/// # Invariants
///
/// - `append` returns the offset the data was written at
/// - `read_at` returns exactly the bytes previously appended there
/// - after `sync` returns, every appended byte survives process exit
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range is not fully inside the device.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it starts at.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all appended data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops everything after `new_size`.
    ///
    /// Used during recovery to cut off a partially written record.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is larger than the device.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Replaces the whole contents of the device with `data`.
    ///
    /// The default implementation truncates and re-appends, which is not
    /// crash-atomic. Backends that can do better (see
    /// [`FileBackend`](crate::FileBackend)) override it.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the rewrite fails.
    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()> {
        self.truncate(0)?;
        self.append(data)?;
        self.sync()
    }
}
