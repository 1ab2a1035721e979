//! Persistent volume bring-up.
//!
//! Mounting is attempted exactly once per boot. Everything downstream (config,
//! the log file, captured images) assumes a writable volume, so a failure
//! here is fatal for the boot.

use core::fmt;

/// Default mount point for the persistent volume.
pub const DEFAULT_MOUNT_POINT: &str = "/sdcard";

/// Reasons a mount attempt can fail.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StorageError {
    /// No card answered on the bus.
    NoMedia,
    /// The card answered but holds no readable filesystem.
    Unformatted,
    /// Transport failure while talking to the card.
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NoMedia => f.write_str("no card detected"),
            StorageError::Unformatted => f.write_str("no readable filesystem"),
            StorageError::Io => f.write_str("card i/o error"),
        }
    }
}

/// Handle to a mounted volume.
pub trait MountedVolume {
    /// Total capacity in bytes, if the driver reports it.
    fn capacity_bytes(&self) -> Option<u64>;
}

/// Driver capable of mounting the persistent volume.
pub trait StorageDevice {
    /// Handle produced by a successful mount.
    type Volume: MountedVolume;

    /// Attempts a single mount at `mount_point`.
    fn mount(&mut self, mount_point: &str) -> Result<Self::Volume, StorageError>;
}

/// Capacity in whole mebibytes, for the informational mount log line.
pub fn capacity_mib<V>(volume: &V) -> Option<u64>
where
    V: MountedVolume + ?Sized,
{
    volume.capacity_bytes().map(|bytes| bytes / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedVolume(Option<u64>);

    impl MountedVolume for FixedVolume {
        fn capacity_bytes(&self) -> Option<u64> {
            self.0
        }
    }

    #[test]
    fn capacity_is_reported_in_mebibytes() {
        assert_eq!(capacity_mib(&FixedVolume(Some(4 * 1024 * 1024 * 1024))), Some(4096));
        assert_eq!(capacity_mib(&FixedVolume(Some(1024 * 1024 - 1))), Some(0));
        assert_eq!(capacity_mib(&FixedVolume(None)), None);
    }
}
