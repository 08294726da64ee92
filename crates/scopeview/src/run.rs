use anyhow::Result;
use renderer::{RenderMode, Renderer};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{build_scene, capture_dir, load_config, renderer_config};
use crate::cli::Args;
use crate::replay;

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let config = load_config(&args.config)?;
    let dir = capture_dir(&config, &args.config);
    let scene = build_scene(&config, &dir)?;
    let renderer = Renderer::new(renderer_config(&args, &config)?);
    let area = renderer.area(scene.channels, scene.decodes, scene.view);

    match &renderer.config().mode {
        RenderMode::Export { path } => {
            if !args.replay.is_empty() {
                tracing::warn!("--replay is ignored when exporting a still frame");
            }
            tracing::info!(path = %path.display(), "exporting still frame");
            renderer.run(area)
        }
        RenderMode::Windowed if !args.replay.is_empty() => {
            let frames = replay::load_frames(&config, &args.replay);
            let runtime = renderer.spawn_window(area)?;
            replay::run(runtime, frames, args.replay_interval)
        }
        RenderMode::Windowed => renderer.run(area),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
