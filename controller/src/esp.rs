use std::{thread, time::Duration};

use esp_idf_svc::{
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    sys,
};
use log::{info, warn};

use greenhouse_common::{
    device, BackendError, KvStore, RuntimeConfig, StorageBackend, WriteOutcome,
};

const HEARTBEAT_INTERVAL_MS: u64 = 60_000;

/// Default NVS partition. Each handle is an `EspNvs` namespace; dropping it
/// closes the underlying NVS handle.
#[derive(Default)]
struct EspNvsBackend {
    partition: Option<EspDefaultNvsPartition>,
}

impl StorageBackend for EspNvsBackend {
    type Handle = EspNvs<NvsDefault>;

    fn init(&mut self) -> Result<(), BackendError> {
        if self.partition.is_none() {
            let partition =
                EspDefaultNvsPartition::take().map_err(|err| BackendError::Init(err.to_string()))?;
            self.partition = Some(partition);
        }
        Ok(())
    }

    fn open(&mut self, namespace: &str) -> Result<EspNvs<NvsDefault>, BackendError> {
        let partition = self
            .partition
            .clone()
            .ok_or_else(|| BackendError::Open("nvs partition not initialized".to_string()))?;
        EspNvs::new(partition, namespace, true).map_err(|err| BackendError::Open(err.to_string()))
    }

    fn get_blob(
        &mut self,
        handle: &EspNvs<NvsDefault>,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, BackendError> {
        let needed = handle
            .blob_len(key)
            .map_err(|err| BackendError::Other(err.to_string()))?
            .ok_or(BackendError::NotFound)?;
        if needed > buf.len() {
            return Err(BackendError::BufferTooSmall { needed });
        }

        match handle.get_raw(key, buf) {
            Ok(Some(value)) => Ok(value.len()),
            Ok(None) => Err(BackendError::NotFound),
            Err(err) => Err(BackendError::Other(err.to_string())),
        }
    }

    fn set_blob(
        &mut self,
        handle: &mut EspNvs<NvsDefault>,
        key: &str,
        data: &[u8],
    ) -> Result<(), BackendError> {
        handle
            .set_raw(key, data)
            .map(|_| ())
            .map_err(|err| BackendError::Write(err.to_string()))
    }

    fn erase_namespace(&mut self, handle: &mut EspNvs<NvsDefault>) -> Result<(), BackendError> {
        // `EspNvs` only removes single keys; wipe the namespace through its raw handle.
        let rc = unsafe { sys::nvs_erase_all(handle.handle()) };
        if rc != sys::ESP_OK {
            return Err(BackendError::Write(format!("nvs_erase_all failed with code {rc}")));
        }
        let rc = unsafe { sys::nvs_commit(handle.handle()) };
        if rc != sys::ESP_OK {
            return Err(BackendError::Write(format!("nvs_commit failed with code {rc}")));
        }
        Ok(())
    }

    fn close(&mut self, handle: EspNvs<NvsDefault>) {
        drop(handle);
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let runtime = RuntimeConfig::default();
    let mut store = KvStore::new(EspNvsBackend::default(), &runtime.store);

    match device::record_boot(&mut store) {
        Ok(count) => info!("greenhouse controller boot #{count}"),
        Err(err) => warn!("failed to record boot: {err}"),
    }

    let settings = device::load_settings(&mut store);
    match device::save_settings(&mut store, &settings) {
        Ok(WriteOutcome::Written) => info!("persisted sanitized settings"),
        Ok(WriteOutcome::Unchanged) => {}
        Err(err) => warn!("failed to persist settings: {err}"),
    }
    info!(
        "settings: target {:.1}C, humidity {:.0}%, vent at {:.1}C, watering every {} min",
        settings.target_temp_c,
        settings.target_humidity_pct,
        settings.vent_open_temp_c,
        settings.watering_interval_min
    );

    match device::load_credentials(&mut store) {
        Ok(Some(creds)) => info!("wifi credentials provisioned for `{}`", creds.ssid()),
        Ok(None) => warn!("no wifi credentials provisioned"),
        Err(err) => warn!("stored wifi credentials are unusable: {err}"),
    }

    let mut uptime_min: u64 = 0;
    loop {
        thread::sleep(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
        uptime_min = uptime_min.saturating_add(HEARTBEAT_INTERVAL_MS / 60_000);
        info!("uptime {uptime_min} min");
    }
}
