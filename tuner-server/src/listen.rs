//! Local microphone mode: the same session pipeline as a WebSocket client,
//! fed from the default input device.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tuner_core::{audio, Outbound, Session};

pub fn run(config: tuner_core::TunerConfig, instrument: Option<String>) -> Result<()> {
    let analysis_rate = config.sample_rate;
    let catalog = Arc::new(config.catalog().context("Failed to build tuning catalog")?);
    let mut session = Session::new(Arc::new(config), catalog);

    if let Some(name) = instrument {
        let ack = session.handle_control(&serde_json::json!({ "instrument": name }).to_string());
        info!(tuning = %ack.instrument, "tuning selected");
    }

    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Vec<f32>>(64);
    let (stream, device_rate) =
        audio::start_audio_capture(frame_tx).context("Failed to start audio capture")?;
    info!(device_rate, analysis_rate, "listening on default input device");

    audio::run_feed_loop(&mut session, frame_rx, device_rate, analysis_rate, |estimate| {
        match Outbound::Estimate(estimate.clone()).to_json() {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode estimate"),
        }
        true
    });

    drop(stream);
    Ok(())
}
