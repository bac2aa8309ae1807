mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::error::BackendError;

/// Keys and namespace names every backend accepts: `[A-Za-z0-9_-]`.
///
/// This keeps names valid as NVS identifiers and as single path components.
pub fn is_portable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// A persistent byte-blob namespace (NVS partition, directory, ...).
///
/// Every blob operation goes through a handle returned by [`open`](Self::open)
/// and the handle must be handed back to [`close`](Self::close). Callers are
/// expected to drive the lifecycle through a
/// [`StorageSession`](crate::session::StorageSession) rather than directly.
pub trait StorageBackend {
    type Handle;

    /// One initialization attempt of the underlying medium.
    fn init(&mut self) -> Result<(), BackendError>;

    fn open(&mut self, namespace: &str) -> Result<Self::Handle, BackendError>;

    /// Copies the blob stored under `key` into `buf` and returns its length.
    fn get_blob(
        &mut self,
        handle: &Self::Handle,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, BackendError>;

    fn set_blob(
        &mut self,
        handle: &mut Self::Handle,
        key: &str,
        data: &[u8],
    ) -> Result<(), BackendError>;

    fn erase_namespace(&mut self, handle: &mut Self::Handle) -> Result<(), BackendError>;

    fn close(&mut self, handle: Self::Handle);
}
