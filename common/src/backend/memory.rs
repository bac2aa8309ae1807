use std::collections::{BTreeMap, HashMap};

use super::StorageBackend;
use crate::error::BackendError;

const DEFAULT_MAX_OPEN_HANDLES: usize = 4;

/// Volatile backend with call counters and fault injection.
///
/// Contents survive close/open cycles of a namespace but not the process.
#[derive(Debug)]
pub struct MemoryBackend {
    namespaces: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    max_open_handles: usize,
    open_handles: usize,

    init_failures_remaining: u32,
    failing_write_keys: Vec<String>,

    init_calls: u32,
    opens: u32,
    closes: u32,
    writes: HashMap<String, u32>,
}

#[derive(Debug)]
pub struct MemoryHandle {
    namespace: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            namespaces: BTreeMap::new(),
            max_open_handles: DEFAULT_MAX_OPEN_HANDLES,
            open_handles: 0,
            init_failures_remaining: 0,
            failing_write_keys: Vec::new(),
            init_calls: 0,
            opens: 0,
            closes: 0,
            writes: HashMap::new(),
        }
    }

    pub fn with_max_open_handles(mut self, max: usize) -> Self {
        self.max_open_handles = max;
        self
    }

    /// The next `count` calls to `init` fail.
    pub fn fail_next_inits(&mut self, count: u32) {
        self.init_failures_remaining = count;
    }

    /// Every `set_blob` for `key` fails until cleared.
    pub fn fail_writes_to(&mut self, key: &str) {
        self.failing_write_keys.push(key.to_string());
    }

    pub fn clear_write_faults(&mut self) {
        self.failing_write_keys.clear();
    }

    /// Overwrites a stored blob without going through a handle, the way a
    /// flash bit-flip would.
    pub fn tamper(&mut self, namespace: &str, key: &str, data: &[u8]) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
    }

    pub fn remove(&mut self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.namespaces.get_mut(namespace)?.remove(key)
    }

    pub fn stored(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .map(Vec::as_slice)
    }

    pub fn entry_count(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, BTreeMap::len)
    }

    pub fn init_calls(&self) -> u32 {
        self.init_calls
    }

    pub fn opens(&self) -> u32 {
        self.opens
    }

    pub fn closes(&self) -> u32 {
        self.closes
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles
    }

    /// Successful `set_blob` calls for `key`.
    pub fn writes_for(&self, key: &str) -> u32 {
        self.writes.get(key).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> u32 {
        self.writes.values().sum()
    }
}

impl StorageBackend for MemoryBackend {
    type Handle = MemoryHandle;

    fn init(&mut self) -> Result<(), BackendError> {
        self.init_calls += 1;
        if self.init_failures_remaining > 0 {
            self.init_failures_remaining -= 1;
            return Err(BackendError::Init("injected init failure".to_string()));
        }
        Ok(())
    }

    fn open(&mut self, namespace: &str) -> Result<MemoryHandle, BackendError> {
        if self.open_handles >= self.max_open_handles {
            return Err(BackendError::Open(format!(
                "all {} handles in use",
                self.max_open_handles
            )));
        }
        self.namespaces.entry(namespace.to_string()).or_default();
        self.open_handles += 1;
        self.opens += 1;
        Ok(MemoryHandle {
            namespace: namespace.to_string(),
        })
    }

    fn get_blob(
        &mut self,
        handle: &MemoryHandle,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, BackendError> {
        let value = self
            .namespaces
            .get(&handle.namespace)
            .and_then(|entries| entries.get(key))
            .ok_or(BackendError::NotFound)?;
        if value.len() > buf.len() {
            return Err(BackendError::BufferTooSmall {
                needed: value.len(),
            });
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(value.len())
    }

    fn set_blob(
        &mut self,
        handle: &mut MemoryHandle,
        key: &str,
        data: &[u8],
    ) -> Result<(), BackendError> {
        if self.failing_write_keys.iter().any(|failing| failing == key) {
            return Err(BackendError::Write(format!("injected write failure for `{key}`")));
        }
        self.namespaces
            .entry(handle.namespace.clone())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        *self.writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn erase_namespace(&mut self, handle: &mut MemoryHandle) -> Result<(), BackendError> {
        if let Some(entries) = self.namespaces.get_mut(&handle.namespace) {
            entries.clear();
        }
        Ok(())
    }

    fn close(&mut self, _handle: MemoryHandle) {
        self.open_handles = self.open_handles.saturating_sub(1);
        self.closes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_missing_keys_as_not_found() {
        let mut backend = MemoryBackend::new();
        let handle = backend.open("ns").unwrap();
        let mut buf = [0_u8; 8];

        assert_eq!(
            backend.get_blob(&handle, "absent", &mut buf),
            Err(BackendError::NotFound)
        );
        backend.close(handle);
    }

    #[test]
    fn rejects_short_buffers() {
        let mut backend = MemoryBackend::new();
        let mut handle = backend.open("ns").unwrap();
        backend.set_blob(&mut handle, "k", b"hello").unwrap();

        let mut buf = [0_u8; 3];
        assert_eq!(
            backend.get_blob(&handle, "k", &mut buf),
            Err(BackendError::BufferTooSmall { needed: 5 })
        );
        backend.close(handle);
    }

    #[test]
    fn bounds_concurrent_handles() {
        let mut backend = MemoryBackend::new().with_max_open_handles(1);
        let first = backend.open("ns").unwrap();
        assert!(matches!(backend.open("ns"), Err(BackendError::Open(_))));

        backend.close(first);
        assert_eq!(backend.open_handles(), 0);
        assert!(backend.open("ns").is_ok());
    }

    #[test]
    fn namespaces_are_isolated() {
        let mut backend = MemoryBackend::new();
        let mut a = backend.open("a").unwrap();
        let mut b = backend.open("b").unwrap();
        backend.set_blob(&mut a, "k", b"one").unwrap();
        backend.erase_namespace(&mut b).unwrap();

        assert_eq!(backend.stored("a", "k"), Some(&b"one"[..]));
        assert_eq!(backend.stored("b", "k"), None);
        backend.close(a);
        backend.close(b);
    }
}
