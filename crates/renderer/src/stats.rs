use std::time::{Duration, Instant};

use tracing::debug;

/// Frame stage a timing belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Per-sample coordinate transform.
    Prepare,
    /// Column index scan.
    Index,
    Upload,
    Underlay,
    Overlay,
    /// Everything from the start of a frame to submission.
    Render,
}

const STAGES: usize = 6;

impl Stage {
    fn slot(self) -> usize {
        match self {
            Stage::Prepare => 0,
            Stage::Index => 1,
            Stage::Upload => 2,
            Stage::Underlay => 3,
            Stage::Overlay => 4,
            Stage::Render => 5,
        }
    }
}

/// Cumulative per-stage timings, summarized in the log once per interval.
#[derive(Debug)]
pub struct FrameStats {
    totals: [Duration; STAGES],
    frames: u64,
    frame_interval: Duration,
    last_frame: Option<Instant>,
    window_start: Instant,
    window_frames: u64,
    report_every: Duration,
}

impl FrameStats {
    pub fn new(report_every: Duration, now: Instant) -> Self {
        Self {
            totals: [Duration::ZERO; STAGES],
            frames: 0,
            frame_interval: Duration::ZERO,
            last_frame: None,
            window_start: now,
            window_frames: 0,
            report_every,
        }
    }

    pub fn add(&mut self, stage: Stage, elapsed: Duration) {
        self.totals[stage.slot()] += elapsed;
    }

    /// Marks the start of a frame, accumulating the time since the previous one.
    pub fn begin_frame(&mut self, now: Instant) {
        if let Some(last) = self.last_frame.replace(now) {
            self.frame_interval += now.saturating_duration_since(last);
        }
        self.frames += 1;
        self.window_frames += 1;
    }

    /// Logs a summary if the report interval has elapsed. Returns whether it did.
    pub fn maybe_report(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.window_start);
        if self.report_every.is_zero() || elapsed < self.report_every {
            return false;
        }
        let fps = self.window_frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        debug!(
            frames = self.frames,
            fps,
            prepare_ms = ms(self.total(Stage::Prepare)),
            index_ms = ms(self.total(Stage::Index)),
            upload_ms = ms(self.total(Stage::Upload)),
            underlay_ms = ms(self.total(Stage::Underlay)),
            overlay_ms = ms(self.total(Stage::Overlay)),
            render_ms = ms(self.total(Stage::Render)),
            "frame timing"
        );
        self.window_start = now;
        self.window_frames = 0;
        true
    }

    pub fn total(&self, stage: Stage) -> Duration {
        self.totals[stage.slot()]
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Summed time between consecutive frame starts.
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
