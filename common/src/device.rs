use log::{info, warn};

use crate::{
    backend::StorageBackend,
    error::KvsError,
    records::{BootRecord, Credentials, GreenhouseSettings, SensorReading},
    store::{KvStore, WriteOutcome},
};

pub const BOOT_COUNT_KEY: &str = "boot_count";
pub const SETTINGS_KEY: &str = "settings";
pub const CREDENTIALS_KEY: &str = "wifi_creds";
pub const READING_KEY: &str = "last_reading";

/// Increments and persists the boot counter, returning the new count.
pub fn record_boot<B: StorageBackend>(store: &mut KvStore<B>) -> Result<u32, KvsError> {
    let previous = match store.read_record::<BootRecord>(BOOT_COUNT_KEY) {
        Ok(record) => record.count,
        Err(err) if err.is_not_found() => 0,
        Err(err) => return Err(err),
    };

    let count = previous.wrapping_add(1);
    store.write_record(BOOT_COUNT_KEY, &BootRecord { count })?;
    info!("boot #{count}");
    Ok(count)
}

pub fn load_settings<B: StorageBackend>(store: &mut KvStore<B>) -> GreenhouseSettings {
    let mut settings = match store.read_record::<GreenhouseSettings>(SETTINGS_KEY) {
        Ok(settings) => settings,
        Err(err) if err.is_not_found() => GreenhouseSettings::default(),
        Err(err) => {
            warn!("failed to load settings; using defaults: {err}");
            GreenhouseSettings::default()
        }
    };
    settings.sanitize();
    settings
}

pub fn save_settings<B: StorageBackend>(
    store: &mut KvStore<B>,
    settings: &GreenhouseSettings,
) -> Result<WriteOutcome, KvsError> {
    let mut settings = *settings;
    settings.sanitize();
    store.write_record(SETTINGS_KEY, &settings)
}

/// `None` when no credentials were ever provisioned.
pub fn load_credentials<B: StorageBackend>(
    store: &mut KvStore<B>,
) -> Result<Option<Credentials>, KvsError> {
    match store.read_record::<Credentials>(CREDENTIALS_KEY) {
        Ok(creds) => Ok(Some(creds)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

pub fn save_credentials<B: StorageBackend>(
    store: &mut KvStore<B>,
    creds: &Credentials,
) -> Result<WriteOutcome, KvsError> {
    store.write_record(CREDENTIALS_KEY, creds)
}

/// Persists a quantized reading; repeated identical readings cost no flash writes.
pub fn persist_reading<B: StorageBackend>(
    store: &mut KvStore<B>,
    reading: SensorReading,
) -> Result<WriteOutcome, KvsError> {
    store.write_record(READING_KEY, &reading.quantized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::MemoryBackend, config::StoreConfig, error::WriteFailure};
    use pretty_assertions::assert_eq;

    fn store() -> KvStore<MemoryBackend> {
        KvStore::new(MemoryBackend::new(), &StoreConfig::default())
    }

    #[test]
    fn boot_counter_starts_at_one_and_increments() {
        let mut store = store();
        assert_eq!(record_boot(&mut store), Ok(1));
        assert_eq!(record_boot(&mut store), Ok(2));
        assert_eq!(record_boot(&mut store), Ok(3));
    }

    #[test]
    fn corrupt_boot_counter_is_reported() {
        let mut store = store();
        record_boot(&mut store).unwrap();
        store
            .backend_mut()
            .tamper("greenhouse", BOOT_COUNT_KEY, &[9, 9, 9, 9]);

        assert!(matches!(
            record_boot(&mut store),
            Err(KvsError::ReadFail { .. })
        ));
    }

    #[test]
    fn settings_fall_back_to_defaults_when_corrupt() {
        let mut store = store();
        let custom = GreenhouseSettings {
            target_temp_c: 18.0,
            ..GreenhouseSettings::default()
        };
        save_settings(&mut store, &custom).unwrap();
        assert_eq!(load_settings(&mut store), custom);

        store
            .backend_mut()
            .tamper("greenhouse", "CSsettings", &[0, 0, 0, 0]);
        assert_eq!(load_settings(&mut store), GreenhouseSettings::default());
    }

    #[test]
    fn credentials_are_optional() {
        let mut store = store();
        assert_eq!(load_credentials(&mut store), Ok(None));

        let creds = Credentials::new("glasshouse", "tomato42").unwrap();
        save_credentials(&mut store, &creds).unwrap();
        assert_eq!(load_credentials(&mut store), Ok(Some(creds)));
    }

    #[test]
    fn identical_readings_skip_flash_writes() {
        let mut store = store();
        let first = SensorReading {
            temperature_c: 21.6,
            humidity_pct: 60.2,
        };
        let jitter = SensorReading {
            temperature_c: 21.4,
            humidity_pct: 59.8,
        };

        assert_eq!(persist_reading(&mut store, first), Ok(WriteOutcome::Written));
        assert_eq!(persist_reading(&mut store, jitter), Ok(WriteOutcome::Unchanged));
        assert_eq!(store.backend().writes_for(READING_KEY), 1);
    }

    #[test]
    fn write_fault_propagates_from_helpers() {
        let mut store = store();
        store.backend_mut().fail_writes_to(BOOT_COUNT_KEY);

        assert!(matches!(
            record_boot(&mut store),
            Err(KvsError::WriteFail {
                reason: WriteFailure::Data(_),
                ..
            })
        ));
    }
}
