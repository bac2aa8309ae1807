//! Scoped open/close of a storage namespace.
//!
//! A [`StorageSession`] owns the backend and at most one open handle. Each
//! backend-touching operation acquires a [`SessionGuard`]; the guard that
//! actually opened the namespace is the only one that closes it when dropped.
//! Nested acquisitions (a write performing its read-before-write) reuse the
//! open handle. Because a guard mutably borrows its session, an inner guard
//! always drops before the guard it was acquired through.

use std::ops::{Deref, DerefMut};

use log::{debug, warn};

use crate::{
    backend::StorageBackend,
    error::{BackendError, KvsError},
};

pub struct StorageSession<B: StorageBackend> {
    backend: B,
    namespace: String,
    init_retries: u8,
    initialized: bool,
    handle: Option<B::Handle>,
    depth: usize,
}

impl<B: StorageBackend> StorageSession<B> {
    pub fn new(backend: B, namespace: impl Into<String>, init_retries: u8) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            init_retries: init_retries.max(1),
            initialized: false,
            handle: None,
            depth: 0,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access; only valid while no guard is alive.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Number of live guards.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn acquire(&mut self) -> Result<SessionGuard<'_, B>, KvsError> {
        self.ensure_initialized()?;

        let owner = self.handle.is_none();
        if owner {
            let handle = self
                .backend
                .open(&self.namespace)
                .map_err(|source| KvsError::Open {
                    namespace: self.namespace.clone(),
                    attempts: 1,
                    source,
                })?;
            debug!("opened storage namespace `{}`", self.namespace);
            self.handle = Some(handle);
        }
        self.depth += 1;

        Ok(SessionGuard {
            session: self,
            owner,
        })
    }

    fn ensure_initialized(&mut self) -> Result<(), KvsError> {
        if self.initialized {
            return Ok(());
        }

        let mut last_error = BackendError::Init("no attempt made".to_string());
        for attempt in 1..=self.init_retries {
            match self.backend.init() {
                Ok(()) => {
                    self.initialized = true;
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        "storage init attempt {attempt}/{} failed: {err}",
                        self.init_retries
                    );
                    last_error = err;
                }
            }
        }

        Err(KvsError::Open {
            namespace: self.namespace.clone(),
            attempts: self.init_retries,
            source: last_error,
        })
    }

    fn release(&mut self, owner: bool) {
        self.depth = self.depth.saturating_sub(1);
        if !owner {
            return;
        }
        if let Some(handle) = self.handle.take() {
            self.backend.close(handle);
            debug!("closed storage namespace `{}`", self.namespace);
        }
    }
}

/// Proof of an open namespace for the duration of one operation.
pub struct SessionGuard<'a, B: StorageBackend> {
    session: &'a mut StorageSession<B>,
    owner: bool,
}

impl<B: StorageBackend> SessionGuard<'_, B> {
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn get_blob(&mut self, key: &str, buf: &mut [u8]) -> Result<usize, BackendError> {
        let session = &mut *self.session;
        let handle = session.handle.as_ref().ok_or_else(closed_handle)?;
        session.backend.get_blob(handle, key, buf)
    }

    pub fn set_blob(&mut self, key: &str, data: &[u8]) -> Result<(), BackendError> {
        let session = &mut *self.session;
        let handle = session.handle.as_mut().ok_or_else(closed_handle)?;
        session.backend.set_blob(handle, key, data)
    }

    pub fn erase_namespace(&mut self) -> Result<(), BackendError> {
        let session = &mut *self.session;
        let handle = session.handle.as_mut().ok_or_else(closed_handle)?;
        session.backend.erase_namespace(handle)
    }
}

fn closed_handle() -> BackendError {
    BackendError::Other("storage handle is not open".to_string())
}

impl<B: StorageBackend> Deref for SessionGuard<'_, B> {
    type Target = StorageSession<B>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<B: StorageBackend> DerefMut for SessionGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<B: StorageBackend> Drop for SessionGuard<'_, B> {
    fn drop(&mut self) {
        self.session.release(self.owner);
    }
}
