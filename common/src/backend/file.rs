use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use super::{is_portable_name, StorageBackend};
use crate::error::BackendError;

const TEMP_SUFFIX: &str = ".tmp";

/// Host-side medium: one directory per namespace, one file per key.
///
/// Blobs are written to a sibling temporary file, synced, then renamed over
/// the target so an interrupted write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

#[derive(Debug)]
pub struct FileHandle {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn blob_path(handle: &FileHandle, key: &str) -> Result<PathBuf, BackendError> {
    if !is_portable_name(key) {
        return Err(BackendError::Other(format!(
            "key `{key}` is not a valid file name"
        )));
    }
    Ok(handle.dir.join(key))
}

impl StorageBackend for FileBackend {
    type Handle = FileHandle;

    fn init(&mut self) -> Result<(), BackendError> {
        fs::create_dir_all(&self.root).map_err(|err| BackendError::Init(err.to_string()))
    }

    fn open(&mut self, namespace: &str) -> Result<FileHandle, BackendError> {
        if !is_portable_name(namespace) {
            return Err(BackendError::Open(format!(
                "namespace `{namespace}` is not a valid directory name"
            )));
        }
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir).map_err(|err| BackendError::Open(err.to_string()))?;
        Ok(FileHandle { dir })
    }

    fn get_blob(
        &mut self,
        handle: &FileHandle,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, BackendError> {
        let raw = fs::read(blob_path(handle, key)?)?;
        if raw.len() > buf.len() {
            return Err(BackendError::BufferTooSmall { needed: raw.len() });
        }
        buf[..raw.len()].copy_from_slice(&raw);
        Ok(raw.len())
    }

    fn set_blob(
        &mut self,
        handle: &mut FileHandle,
        key: &str,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let path = blob_path(handle, key)?;
        let temp = handle.dir.join(format!("{key}{TEMP_SUFFIX}"));
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&temp, &path)
        };
        write().map_err(|err| BackendError::Write(err.to_string()))
    }

    fn erase_namespace(&mut self, handle: &mut FileHandle) -> Result<(), BackendError> {
        let entries = match fs::read_dir(&handle.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn close(&mut self, _handle: FileHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path());
        backend.init().unwrap();

        let mut handle = backend.open("greenhouse").unwrap();
        backend.set_blob(&mut handle, "boot_count", &[7, 0, 0, 0]).unwrap();
        backend.close(handle);

        let mut reopened = FileBackend::new(dir.path());
        let handle = reopened.open("greenhouse").unwrap();
        let mut buf = [0_u8; 16];
        let len = reopened.get_blob(&handle, "boot_count", &mut buf).unwrap();
        assert_eq!(&buf[..len], &[7, 0, 0, 0]);
        assert!(!dir.path().join("greenhouse/boot_count.tmp").exists());
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path());
        let handle = backend.open("greenhouse").unwrap();
        let mut buf = [0_u8; 4];

        assert_eq!(
            backend.get_blob(&handle, "absent", &mut buf),
            Err(BackendError::NotFound)
        );
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path());
        let mut handle = backend.open("greenhouse").unwrap();

        assert!(matches!(
            backend.set_blob(&mut handle, "../escape", b"x"),
            Err(BackendError::Other(_))
        ));
    }

    #[test]
    fn rejects_namespaces_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path().join("nvs"));
        let escape = outside.path().to_string_lossy().into_owned();

        for namespace in ["..", ".", "a/b", escape.as_str()] {
            assert!(
                matches!(backend.open(namespace), Err(BackendError::Open(_))),
                "namespace `{namespace}` should be rejected"
            );
        }
        assert!(!dir.path().join("nvs").exists());
    }

    #[test]
    fn erase_clears_only_its_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path());
        let mut a = backend.open("a").unwrap();
        let mut b = backend.open("b").unwrap();
        backend.set_blob(&mut a, "k", b"one").unwrap();
        backend.set_blob(&mut b, "k", b"two").unwrap();

        backend.erase_namespace(&mut a).unwrap();
        backend.erase_namespace(&mut a).unwrap();

        let mut buf = [0_u8; 8];
        assert_eq!(
            backend.get_blob(&a, "k", &mut buf),
            Err(BackendError::NotFound)
        );
        assert_eq!(backend.get_blob(&b, "k", &mut buf), Ok(3));
    }
}
