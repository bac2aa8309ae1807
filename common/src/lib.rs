pub mod backend;
pub mod checksum;
pub mod config;
pub mod device;
pub mod error;
pub mod records;
pub mod session;
pub mod store;

pub use backend::{is_portable_name, FileBackend, MemoryBackend, StorageBackend};
pub use checksum::{crc32, Checksum, UNTRUSTED_CHECKSUM};
pub use config::{RuntimeConfig, StoreConfig};
pub use error::{BackendError, KvsError, ReadFailure, WriteFailure};
pub use records::{BootRecord, Credentials, GreenhouseSettings, Record, RecordError, SensorReading};
pub use session::{SessionGuard, StorageSession};
pub use store::{KvStore, WriteOutcome, CHECKSUM_KEY_PREFIX, MAX_KEY_LEN, NVS_KEY_NAME_MAX_SIZE};
