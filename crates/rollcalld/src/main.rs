use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod display;
mod engine;
mod recorder;
mod relay;
mod render;
mod session;
mod stream;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = config::Config::from_env();

    let store = rollcall_store::AttendanceStore::open(&config.db_path)
        .await
        .context("failed to open attendance database")?;

    let gallery = rollcall_store::load_gallery(&store)
        .await
        .context("failed to load the student gallery")?;
    if gallery.entries.is_empty() {
        bail!(
            "no usable face encodings in {} — enroll students with `rollcall enroll` before starting recognition",
            config.db_path.display()
        );
    }

    rollcall_models::verify_models_dir(&config.model_dir)
        .context("pinned model verification failed — run `rollcall setup`")?;
    rollcall_models::verify_landmark_model(&config.landmark_model)
        .context("landmark model missing — set ROLLCALL_LANDMARK_MODEL")?;

    let mut analyzer = rollcall_core::OnnxFaceAnalyzer::load(
        &config.detection_model_path(),
        &config.landmark_model,
        &config.recognition_model_path(),
    )
    .context("failed to load the vision pipeline")?;

    let mut source = stream::MjpegStream::connect(
        &config.stream_url,
        Duration::from_secs(config.stream_connect_timeout_secs),
    )
    .with_context(|| format!("video stream unreachable at {}", config.stream_url))?;

    let relay = relay::spawn(
        config.relay_url.clone(),
        Duration::from_secs(config.relay_timeout_secs),
    );
    let recorder =
        recorder::AttendanceRecorder::new(store, tokio::runtime::Handle::current(), relay);

    let renderer = render::Renderer::new(
        &config.font_path,
        render::Layout {
            width: config.window_width,
            height: config.window_height,
            roster_panel_width: config.roster_panel_width,
            feed_panel_height: config.feed_panel_height,
        },
    )
    .context("failed to load the overlay font")?;

    let options = engine::EngineOptions::from_config(&config);

    // The loop owns all session state on a dedicated thread; the runtime
    // stays free for the store and the relay dispatcher.
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let result = display::StationWindow::new(renderer).map(|mut ui| {
                engine::run_loop(options, &gallery, &mut source, &mut analyzer, &mut ui, &recorder)
            });
            let _ = tx.send(result);
        })
        .context("failed to spawn engine thread")?;

    let summary = rx
        .await
        .context("engine thread exited without a result")?
        .context("failed to open the station window")?;

    tracing::info!(
        present = summary.present_count,
        roster = summary.roster_total,
        end = ?summary.end,
        "session finished"
    );
    print!("{}", summary.render());

    Ok(())
}
