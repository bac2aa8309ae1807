use std::{io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use greenhouse_common::{
    device, FileBackend, KvStore, RuntimeConfig, SensorReading, WriteOutcome,
};

type SharedStore = Arc<Mutex<KvStore<FileBackend>>>;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("GREENHOUSE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.greenhouse"));

    let runtime = load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });

    let store: SharedStore = Arc::new(Mutex::new(KvStore::new(
        FileBackend::new(data_dir.join("nvs")),
        &runtime.store,
    )));

    if std::env::var("GREENHOUSE_FACTORY_RESET").is_ok_and(|value| value == "1") {
        with_store(&store, |store| store.erase_all())
            .await?
            .context("factory reset failed")?;
    }

    let boot_count = with_store(&store, |store| device::record_boot(store)).await?;
    match boot_count {
        Ok(count) => info!("greenhouse controller boot #{count}"),
        Err(err) => warn!("failed to record boot: {err}"),
    }

    let (settings, credentials) = with_store(&store, |store| {
        (device::load_settings(store), device::load_credentials(store))
    })
    .await?;
    info!(
        "settings: target {:.1}C, humidity {:.0}%, vent at {:.1}C, watering every {} min",
        settings.target_temp_c,
        settings.target_humidity_pct,
        settings.vent_open_temp_c,
        settings.watering_interval_min
    );
    match credentials {
        Ok(Some(creds)) => info!("wifi credentials provisioned for `{}`", creds.ssid()),
        Ok(None) => info!("no wifi credentials provisioned"),
        Err(err) => warn!("stored wifi credentials are unusable: {err}"),
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_millis(runtime.persist_interval_ms));
    info!("persisting readings every {} ms", runtime.persist_interval_ms);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
        tick = tick.saturating_add(1);

        // Simulated readings; sensor polling is not part of this firmware.
        let reading = SensorReading {
            temperature_c: 21.0 + ((tick % 8) as f32 * 0.2),
            humidity_pct: 60.0 + ((tick % 6) as f32 * 0.5),
        };

        match with_store(&store, move |store| device::persist_reading(store, reading)).await? {
            Ok(WriteOutcome::Written) => info!(
                "persisted reading {:.1}C / {:.0}%",
                reading.temperature_c, reading.humidity_pct
            ),
            Ok(WriteOutcome::Unchanged) => debug!("reading unchanged; flash write skipped"),
            Err(err) => warn!("failed to persist reading: {err}"),
        }
    }

    Ok(())
}

/// Runs one store operation on the blocking pool, holding the lock for its duration.
async fn with_store<T, F>(store: &SharedStore, op: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut KvStore<FileBackend>) -> T + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || {
        let mut store = store.blocking_lock();
        op(&mut store)
    })
    .await
    .context("store task failed")
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let Ok(path) = std::env::var("GREENHOUSE_CONFIG") else {
        return Ok(RuntimeConfig::default());
    };

    match tokio::fs::read(&path).await {
        Ok(raw) => RuntimeConfig::from_json(&raw)
            .with_context(|| format!("invalid runtime config in {path}")),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}
