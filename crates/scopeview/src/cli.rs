use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use scopeconfig::EyeColor;

#[derive(Parser, Debug)]
#[command(
    name = "scopeview",
    author,
    version,
    about = "GPU waveform viewer for oscilloscope captures"
)]
pub struct Args {
    /// Viewer configuration (TOML).
    #[arg(value_name = "CONFIG", default_value = "scopeview.toml")]
    pub config: PathBuf,

    /// Override the window or export resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Override the trace intensity, within [0, 1].
    #[arg(long, value_name = "ALPHA", value_parser = parse_alpha)]
    pub trace_alpha: Option<f32>,

    /// Color ramp for eye and waterfall displays: crt, ironbow, grayscale, viridis or rainbow.
    #[arg(long, value_name = "RAMP", value_parser = EyeColor::parse)]
    pub eye_color: Option<EyeColor>,

    /// Render one frame offscreen and write it as PNG instead of opening a window.
    /// Without a path, a timestamped file name is used.
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub export: Option<Option<PathBuf>>,

    /// Capture directories cycled into the open window, in order.
    #[arg(long, value_name = "DIR", num_args = 1..)]
    pub replay: Vec<PathBuf>,

    /// Delay between replayed captures (e.g. `500ms`, `2s`).
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "1s"
    )]
    pub replay_interval: Duration,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_alpha(value: &str) -> Result<f32, String> {
    let alpha: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid trace alpha '{value}'"))?;
    if !(0.0..=1.0).contains(&alpha) {
        return Err(format!("trace alpha {alpha} must be within [0, 1]"));
    }
    Ok(alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_flag_accepts_optional_path() {
        let args = Args::try_parse_from(["scopeview", "scope.toml", "--export"]).unwrap();
        assert_eq!(args.export, Some(None));
        let args =
            Args::try_parse_from(["scopeview", "--export", "out.png", "scope.toml"]).unwrap();
        assert_eq!(args.export, Some(Some(PathBuf::from("out.png"))));
        assert_eq!(args.config, PathBuf::from("scope.toml"));
    }

    #[test]
    fn replay_takes_directories_and_interval() {
        let args = Args::try_parse_from([
            "scopeview",
            "--replay-interval",
            "250ms",
            "--replay",
            "run1",
            "run2",
        ])
        .unwrap();
        assert_eq!(args.replay, vec![PathBuf::from("run1"), PathBuf::from("run2")]);
        assert_eq!(args.replay_interval, Duration::from_millis(250));
        assert_eq!(args.config, PathBuf::from("scopeview.toml"));
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        assert_eq!(parse_alpha("0.25"), Ok(0.25));
        assert!(parse_alpha("1.5").is_err());
        assert!(parse_alpha("bright").is_err());
        assert!(Args::try_parse_from(["scopeview", "--eye-color", "sepia"]).is_err());
    }
}
