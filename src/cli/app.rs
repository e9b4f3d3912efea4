//! CLI command wiring

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{
    CaptureError, CheckpointStore, ClipStore, ConfigStore, FrameStore, PairingGateway,
    SegmentStore,
};
use crate::application::upload::{ProgressCallback, UploadError, UploadOptions};
use crate::application::{CaptureController, EncodePipeline, UploadManager};
use crate::domain::{AppConfig, UploadTarget};
use crate::infrastructure::{
    CpalAudioInput, FilePairingStore, HttpTransport, RubatoResampler, SledStores,
    ThreadedOpusSpawner, XdgConfigStore,
};

use super::args::PairAction;
use super::presenter::{human_size, Presenter};

/// Generic failure exit code
pub const EXIT_ERROR: u8 = 1;

type Pipeline =
    EncodePipeline<SledStores, SledStores, SledStores, ThreadedOpusSpawner, RubatoResampler>;

/// Load the config file merged over built-in defaults.
pub async fn load_merged_config() -> AppConfig {
    let store = XdgConfigStore::new();
    let file = match store.load().await {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "config load failed, using defaults");
            AppConfig::empty()
        }
    };
    AppConfig::defaults().merge(file)
}

fn database_path(config: &AppConfig) -> PathBuf {
    if let Some(dir) = &config.data_dir {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("storycap")
        .join("db")
}

fn open_stores(config: &AppConfig) -> Result<Arc<SledStores>, String> {
    SledStores::open(database_path(config))
        .map(Arc::new)
        .map_err(|e| format!("Failed to open data store: {}", e))
}

/// `storycap record`: capture until Ctrl-C, then encode in the background
/// and wait for the result.
pub async fn run_record(
    title: &str,
    device: Option<&str>,
    config: &AppConfig,
    presenter: &mut Presenter,
) -> Result<(), String> {
    let stores = open_stores(config)?;
    let controller =
        CaptureController::new(CpalAudioInput, Arc::clone(&stores), Arc::clone(&stores));

    let clip_id = match controller.start(title, device).await {
        Ok(id) => id,
        Err(CaptureError::DeviceUnavailable(msg)) if device.is_some() => {
            presenter.warning(&format!("{}; falling back to the default device", msg));
            controller
                .start(title, None)
                .await
                .map_err(|e| e.to_string())?
        }
        Err(e) => return Err(e.to_string()),
    };

    presenter.info("Recording... press Ctrl-C to stop");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                let level = controller.level();
                let filled = (level * 20.0).round() as usize;
                eprint!("\r  level [{:<20}]", "#".repeat(filled.min(20)));
                let _ = std::io::stderr().flush();
            }
        }
    }
    eprintln!();

    let clip_id = controller.stop().await.map_err(|e| e.to_string())?;

    // stop() returned as soon as capture halted; encoding proceeds on its
    // own task and we only wait here to report the outcome.
    let pipeline: Arc<Pipeline> = Arc::new(EncodePipeline::new(
        Arc::clone(&stores),
        Arc::clone(&stores),
        Arc::clone(&stores),
        Arc::new(ThreadedOpusSpawner),
        Arc::new(RubatoResampler),
        config.bitrate_kbps_or_default(),
    ));
    presenter.start_spinner("Encoding...");
    let handle = pipeline.spawn(clip_id.clone());
    match handle.await {
        Ok(Ok(())) => {
            let clip = ClipStore::get(&*stores, &clip_id)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| "clip disappeared during encode".to_string())?;
            presenter.spinner_success(&format!(
                "Encoded {} ({}, {}s)",
                clip.filename,
                human_size(clip.size_bytes),
                clip.duration_seconds
            ));
            presenter.line(&clip_id);
            Ok(())
        }
        Ok(Err(e)) => {
            presenter.spinner_fail("Encoding failed; raw audio kept for retry");
            Err(e.to_string())
        }
        Err(e) => {
            presenter.spinner_fail("Encoding task failed");
            Err(e.to_string())
        }
    }
}

/// `storycap clips`: list stored clips, newest first.
pub async fn run_clips(config: &AppConfig, presenter: &Presenter) -> Result<(), String> {
    let stores = open_stores(config)?;
    let clips = ClipStore::list(&*stores).await.map_err(|e| e.to_string())?;
    if clips.is_empty() {
        presenter.info("No clips recorded yet");
        return Ok(());
    }
    for clip in clips {
        presenter.line(&format!(
            "{}  {:<9}  {:>4}s  {:>10}  {}",
            clip.id,
            clip.status.to_string(),
            clip.duration_seconds,
            human_size(clip.size_bytes),
            clip.title,
        ));
    }
    Ok(())
}

async fn resolve_target(
    endpoint: Option<&str>,
    config: &AppConfig,
    pairing: &FilePairingStore,
) -> Result<UploadTarget, String> {
    if let Some(url) = endpoint {
        return Ok(UploadTarget::new(url));
    }
    if let Some(url) = &config.endpoint {
        return Ok(UploadTarget::new(url));
    }
    if let Some(target) = pairing
        .current_target()
        .await
        .map_err(|e| e.to_string())?
    {
        return Ok(target);
    }
    Err("No upload target: pass --endpoint, set the endpoint config key, or pair a device".into())
}

/// `storycap upload`: resumable transfer of a ready clip.
pub async fn run_upload(
    clip_id: &str,
    endpoint: Option<&str>,
    config: &AppConfig,
    presenter: &Presenter,
) -> Result<(), String> {
    let stores = open_stores(config)?;
    let pairing = Arc::new(FilePairingStore::new());
    let target = resolve_target(endpoint, config, &pairing).await?;

    let clip = ClipStore::get(&*stores, clip_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Clip not found: {}", clip_id))?;

    let bar = presenter.transfer_bar(clip.size_bytes);
    let progress_bar = bar.clone();
    let on_progress: ProgressCallback =
        Arc::new(move |offset, _total| progress_bar.set_position(offset));

    let manager = UploadManager::new(
        HttpTransport::new(),
        Arc::clone(&stores),
        Arc::clone(&stores),
        Arc::clone(&stores),
        Some(Arc::clone(&pairing)),
        UploadOptions {
            chunk_bytes: config.chunk_bytes_or_default(),
            max_file_bytes: config.max_file_bytes_or_default(),
        },
    );

    match manager.upload(clip_id, &target, Some(on_progress)).await {
        Ok(outcome) => {
            bar.finish_and_clear();
            presenter.success(&format!(
                "Uploaded {} ({} strategy)",
                human_size(outcome.total),
                outcome.strategy
            ));
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            if matches!(e, UploadError::Unauthorized) {
                presenter
                    .warning("Pairing credentials were invalidated; run `storycap pair set` again");
            }
            Err(e.to_string())
        }
    }
}

/// `storycap delete`: remove a clip and every associated record.
pub async fn run_delete(
    clip_id: &str,
    config: &AppConfig,
    presenter: &Presenter,
) -> Result<(), String> {
    let stores = open_stores(config)?;
    if ClipStore::get(&*stores, clip_id)
        .await
        .map_err(|e| e.to_string())?
        .is_none()
    {
        return Err(format!("Clip not found: {}", clip_id));
    }

    SegmentStore::clear(&*stores, clip_id)
        .await
        .map_err(|e| e.to_string())?;
    FrameStore::clear(&*stores, clip_id)
        .await
        .map_err(|e| e.to_string())?;
    CheckpointStore::clear(&*stores, clip_id)
        .await
        .map_err(|e| e.to_string())?;
    ClipStore::delete(&*stores, clip_id)
        .await
        .map_err(|e| e.to_string())?;

    presenter.success(&format!("Deleted {}", clip_id));
    Ok(())
}

/// `storycap pair`: manage paired-device credentials.
pub async fn run_pair(action: PairAction, presenter: &Presenter) -> Result<(), String> {
    let store = FilePairingStore::new();
    match action {
        PairAction::Set { device, token, ttl } => {
            store
                .save_pairing(&device, &token, ttl)
                .await
                .map_err(|e| e.to_string())?;
            presenter.success(&format!("Paired with {}", device.trim_end_matches('/')));
            Ok(())
        }
        PairAction::Show => {
            match store.current_target().await.map_err(|e| e.to_string())? {
                Some(target) => presenter.line(&format!("{} (token stored)", target.base_url)),
                None => presenter.info("No active pairing"),
            }
            Ok(())
        }
        PairAction::Clear => {
            store.clear().await.map_err(|e| e.to_string())?;
            presenter.success("Pairing cleared");
            Ok(())
        }
    }
}
