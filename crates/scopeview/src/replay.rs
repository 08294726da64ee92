use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use renderer::{ChannelId, WindowRuntime};
use scopeconfig::ScopeConfig;
use tracing::{debug, info, warn};
use waveform::Capture;

use crate::bootstrap::load_capture;

/// Captures loaded from one replay directory.
pub struct ReplayFrame {
    pub dir: PathBuf,
    pub captures: Vec<(ChannelId, Arc<Capture>)>,
}

/// Loads every configured channel from `dir`. Channels without a readable
/// file are left out, keeping whatever capture the window already shows.
pub fn load_frame(config: &ScopeConfig, dir: &Path) -> ReplayFrame {
    let mut captures = Vec::new();
    for (position, settings) in config.channels.iter().enumerate() {
        match load_capture(dir, settings) {
            Ok(capture) => captures.push((ChannelId(position as u32), Arc::new(capture))),
            Err(err) => warn!(
                dir = %dir.display(),
                channel = %settings.name,
                error = %err,
                "replay capture unavailable"
            ),
        }
    }
    ReplayFrame {
        dir: dir.to_path_buf(),
        captures,
    }
}

pub fn load_frames(config: &ScopeConfig, dirs: &[PathBuf]) -> Vec<ReplayFrame> {
    dirs.iter()
        .map(|dir| load_frame(config, dir))
        .filter(|frame| !frame.captures.is_empty())
        .collect()
}

/// Cycles `frames` into the window every `interval` until it closes.
pub fn run(runtime: WindowRuntime, frames: Vec<ReplayFrame>, interval: Duration) -> Result<()> {
    if frames.is_empty() {
        warn!("no replay captures could be loaded");
        return runtime.wait();
    }
    info!(frames = frames.len(), ?interval, "replaying capture history");

    for frame in frames.iter().cycle() {
        thread::sleep(interval);
        if !runtime.is_running() {
            break;
        }
        debug!(dir = %frame.dir.display(), "replaying");
        for (channel, capture) in &frame.captures {
            if runtime.replace_capture(*channel, capture.clone()).is_err() {
                return runtime.wait();
            }
        }
    }
    runtime.wait()
}
