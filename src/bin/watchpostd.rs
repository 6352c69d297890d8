//! watchpostd - camera threat monitor daemon
//!
//! This daemon:
//! 1. Loads configuration (`.env`, `WATCHPOST_CONFIG`, `WATCHPOST_*`)
//! 2. Starts the HTTP surface (status, incidents, MJPEG video feed)
//! 3. Opens the camera; failure here is fatal
//! 4. Runs the capture loop, analyzing the latest frame on every interval tick
//! 5. Stops on Ctrl-C after the in-flight analysis finishes

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use watchpost::{
    api::{ApiServer, ApiState},
    build_analyzer, CameraSource, FrameHub, FrameSource, LiveMonitor, StatusBoard, StopReason,
    WatchpostConfig,
};

fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(anyhow!("failed to read .env: {}", err));
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = WatchpostConfig::load()?;
    log::debug!("configuration: {:?}", cfg);

    let analyzer = Arc::new(build_analyzer(&cfg)?);
    let status = Arc::new(StatusBoard::new());
    let hub = Arc::new(FrameHub::default());

    let api_handle = ApiServer::new(
        cfg.api_config(),
        ApiState {
            status: status.clone(),
            hub: hub.clone(),
            log: analyzer.recorder().log().clone(),
        },
    )
    .spawn()?;
    log::info!("http api listening on http://{}", api_handle.addr);

    let mut source = CameraSource::new(cfg.camera.clone())?;
    if let Err(err) = source.connect() {
        hub.close();
        let _ = api_handle.stop();
        return Err(err.context(format!("could not open camera {}", cfg.camera.device)));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        shutdown_signal.store(true, Ordering::SeqCst);
    })?;

    log::info!(
        "watchpostd running: camera {}, inference {}, evidence in {}",
        cfg.camera.device,
        cfg.inference.endpoint,
        cfg.evidence.dir.display()
    );
    let monitor = LiveMonitor::new(analyzer, hub.clone(), status, cfg.monitor_options());
    let stats = monitor.run(&mut source, &shutdown)?;

    hub.close();
    api_handle.stop()?;
    log::info!(
        "watchpostd stopped: {} frames, {} analyses, {} ticks skipped, {} read failures",
        stats.frames,
        stats.dispatched,
        stats.skipped_ticks,
        stats.read_failures
    );

    if stats.stop_reason == StopReason::ReadFailures {
        return Err(anyhow!(
            "camera {} stopped delivering frames",
            cfg.camera.device
        ));
    }
    Ok(())
}
