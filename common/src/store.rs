//! Checksum-guarded key-value store.
//!
//! Every entry is paired with a CRC32 record stored under `"CS" + key`.
//! Reads are only reported as successful when the stored checksum matches
//! the retrieved bytes, and writes compare against the stored value first so
//! an unchanged value never wears the flash.

use log::{debug, error, warn};

use crate::{
    backend::{is_portable_name, StorageBackend},
    checksum::crc32,
    config::StoreConfig,
    error::{BackendError, KvsError, ReadFailure, WriteFailure},
    records::Record,
    session::StorageSession,
};

/// NVS key limit including the terminating NUL.
pub const NVS_KEY_NAME_MAX_SIZE: usize = 16;
pub const CHECKSUM_KEY_PREFIX: &str = "CS";
/// Longest user key; leaves room for the checksum prefix and terminator.
pub const MAX_KEY_LEN: usize = NVS_KEY_NAME_MAX_SIZE - 3;

const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Stored value already matched; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Caller {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loaded {
    Entry(usize),
    NewEntry,
}

pub struct KvStore<B: StorageBackend> {
    session: StorageSession<B>,
    max_entry_size: usize,
}

impl<B: StorageBackend> KvStore<B> {
    pub fn new(backend: B, config: &StoreConfig) -> Self {
        Self {
            session: StorageSession::new(backend, config.namespace.clone(), config.init_retries),
            max_entry_size: config.max_entry_size,
        }
    }

    pub fn namespace(&self) -> &str {
        self.session.namespace()
    }

    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    pub fn backend(&self) -> &B {
        self.session.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.session.backend_mut()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn write(&mut self, key: &str, data: &[u8]) -> Result<WriteOutcome, KvsError> {
        validate_key(key)?;
        if data.is_empty() {
            return Err(KvsError::BadParams("value must not be empty"));
        }
        if data.len() > self.max_entry_size {
            return Err(KvsError::BadParams("value exceeds the maximum entry size"));
        }

        let checksum_key = checksum_key(key);
        let mut current = vec![0_u8; self.max_entry_size];
        let mut guard = self.session.acquire()?;

        let mut loaded = load_verified(&mut *guard, key, &checksum_key, &mut current, Caller::Write);

        // An entry stored under a larger limit is verified at its real size
        // instead of being mistaken for corruption.
        let oversized = match &loaded {
            Err(KvsError::ReadFail {
                reason: ReadFailure::SizeMismatch { actual, .. },
                ..
            }) if *actual > current.len() => Some(*actual),
            _ => None,
        };
        if let Some(actual) = oversized {
            debug!("`{key}` holds {actual} bytes, above the configured limit; re-reading");
            current.resize(actual, 0);
            loaded = load_verified(&mut *guard, key, &checksum_key, &mut current, Caller::Write);
        }

        match loaded {
            Ok(Loaded::Entry(len)) if &current[..len] == data => {
                debug!("`{key}` unchanged; skipping write");
                return Ok(WriteOutcome::Unchanged);
            }
            Ok(Loaded::Entry(_)) | Ok(Loaded::NewEntry) => {}
            Err(KvsError::ReadFail { reason, .. }) => {
                error!("refusing to overwrite `{key}`: {reason}");
                return Err(write_fail(key, WriteFailure::UnverifiedExisting(reason)));
            }
            Err(err) => return Err(err),
        }

        guard.set_blob(key, data).map_err(|err| {
            error!("failed to write `{key}`: {err}");
            write_fail(key, WriteFailure::Data(err))
        })?;

        let checksum = crc32(data)
            .trusted()
            .ok_or_else(|| write_fail(key, WriteFailure::UntrustedChecksum))?;

        guard
            .set_blob(&checksum_key, &checksum.to_le_bytes())
            .map_err(|err| {
                error!("failed to write checksum for `{key}`: {err}");
                write_fail(key, WriteFailure::Checksum(err))
            })?;

        Ok(WriteOutcome::Written)
    }

    /// Fills `carrier` with the value stored under `key`.
    ///
    /// `carrier.len()` must equal the stored size. On any failure the carrier
    /// is left zeroed.
    pub fn read(&mut self, key: &str, carrier: &mut [u8]) -> Result<(), KvsError> {
        carrier.fill(0);
        validate_key(key)?;
        if carrier.is_empty() {
            return Err(KvsError::BadParams("carrier must not be empty"));
        }

        let checksum_key = checksum_key(key);
        let expected = carrier.len();
        let result = load_verified(&mut self.session, key, &checksum_key, carrier, Caller::Read);

        let failure = match result {
            Ok(Loaded::Entry(len)) if len == expected => return Ok(()),
            Ok(Loaded::Entry(len)) => ReadFailure::SizeMismatch {
                expected,
                actual: len,
            },
            Ok(Loaded::NewEntry) => ReadFailure::NotFound,
            Err(err) => {
                carrier.fill(0);
                return Err(err);
            }
        };

        carrier.fill(0);
        warn!("read of `{key}` rejected: {failure}");
        Err(read_fail(key, failure))
    }

    pub fn erase_all(&mut self) -> Result<(), KvsError> {
        let mut guard = self.session.acquire()?;
        guard.erase_namespace().map_err(|err| {
            error!("failed to erase namespace `{}`: {err}", guard.namespace());
            KvsError::Erase(err)
        })?;
        warn!("erased every entry in namespace `{}`", guard.namespace());
        Ok(())
    }

    pub fn write_record<R: Record>(
        &mut self,
        key: &str,
        record: &R,
    ) -> Result<WriteOutcome, KvsError> {
        let mut buf = vec![0_u8; R::SIZE];
        record.encode(&mut buf);
        self.write(key, &buf)
    }

    pub fn read_record<R: Record>(&mut self, key: &str) -> Result<R, KvsError> {
        let mut buf = vec![0_u8; R::SIZE];
        self.read(key, &mut buf)?;
        R::decode(&buf).map_err(|err| KvsError::Decode {
            key: key.to_string(),
            reason: err.to_string(),
        })
    }
}

fn validate_key(key: &str) -> Result<(), KvsError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(KvsError::KeyLength {
            key: key.to_string(),
            max: MAX_KEY_LEN,
        });
    }
    if !is_portable_name(key) {
        return Err(KvsError::BadParams(
            "key may only contain ascii letters, digits, `_` and `-`",
        ));
    }
    if key.starts_with(CHECKSUM_KEY_PREFIX) {
        return Err(KvsError::ReservedKey(key.to_string()));
    }
    Ok(())
}

/// Validated keys are at most `MAX_KEY_LEN` long, so the derived key always
/// fits the backend limit and never needs truncation.
fn checksum_key(key: &str) -> String {
    format!("{CHECKSUM_KEY_PREFIX}{key}")
}

/// Reads `key` into `buf` and verifies it against its checksum record.
///
/// Runs under its own guard; when called from `write` that guard is nested
/// and leaves the handle open. `buf` is zeroed on every failure path.
fn load_verified<B: StorageBackend>(
    session: &mut StorageSession<B>,
    key: &str,
    checksum_key: &str,
    buf: &mut [u8],
    caller: Caller,
) -> Result<Loaded, KvsError> {
    let mut guard = session.acquire()?;

    let len = match guard.get_blob(key, buf) {
        Ok(len) => len,
        Err(BackendError::NotFound) => {
            buf.fill(0);
            return match caller {
                Caller::Write => Ok(Loaded::NewEntry),
                Caller::Read => Err(read_fail(key, ReadFailure::NotFound)),
            };
        }
        Err(BackendError::BufferTooSmall { needed }) => {
            buf.fill(0);
            return Err(read_fail(
                key,
                ReadFailure::SizeMismatch {
                    expected: buf.len(),
                    actual: needed,
                },
            ));
        }
        Err(err) => {
            buf.fill(0);
            error!("backend read of `{key}` failed: {err}");
            return Err(read_fail(key, ReadFailure::Backend(err)));
        }
    };

    let computed = crc32(&buf[..len]).value;

    let mut stored = [0_u8; CHECKSUM_LEN];
    let failure = match guard.get_blob(checksum_key, &mut stored) {
        Ok(CHECKSUM_LEN) => {
            let stored = u32::from_le_bytes(stored);
            if stored == computed {
                return Ok(Loaded::Entry(len));
            }
            error!(
                "checksum mismatch for `{key}`: stored {stored:#010x}, computed {computed:#010x}"
            );
            ReadFailure::ChecksumMismatch { stored, computed }
        }
        Ok(other) => ReadFailure::ChecksumMalformed { len: other },
        Err(BackendError::BufferTooSmall { needed }) => {
            ReadFailure::ChecksumMalformed { len: needed }
        }
        Err(BackendError::NotFound) if caller == Caller::Write => {
            // Data landed but its checksum did not; let the pending write complete the pair.
            warn!("`{key}` has no checksum record; treating as a new entry");
            buf.fill(0);
            return Ok(Loaded::NewEntry);
        }
        Err(BackendError::NotFound) => ReadFailure::ChecksumMissing,
        Err(err) => ReadFailure::Backend(err),
    };

    buf.fill(0);
    Err(read_fail(key, failure))
}

fn read_fail(key: &str, reason: ReadFailure) -> KvsError {
    KvsError::ReadFail {
        key: key.to_string(),
        reason,
    }
}

fn write_fail(key: &str, reason: WriteFailure) -> KvsError {
    KvsError::WriteFail {
        key: key.to_string(),
        reason,
    }
}
