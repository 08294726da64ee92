use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use renderer::decode::{BusValues, DigitalLevels, SymbolTable};
use renderer::{
    Channel, ChannelId, ColorRamp, CursorMode, Cursors, DecodeOverlay, DisplayMode,
    DisplaySettings, RenderMode, RendererConfig, Rgba, Timebase, TriggerMarker, Unit,
    VerticalAxis, ViewGroup,
};
use scopeconfig::{
    parse_color, BufferLayout, ChannelKind, ChannelSettings, DecodeSettings, EyeColor,
    ScopeConfig,
};
use tracing::{debug, info, warn};
use waveform::format::{load_analog, load_density, load_digital};
use waveform::{stream_file_name, Capture, CaptureData, SampleFormat, SampleSeries};

use crate::cli::Args;

const DEFAULT_SURFACE: (u32, u32) = (1280, 720);

/// Everything the renderer needs to draw one plot.
pub struct Scene {
    pub channels: Vec<Channel>,
    pub decodes: Vec<DecodeOverlay>,
    pub view: ViewGroup,
}

pub fn load_config(path: &Path) -> Result<ScopeConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = ScopeConfig::from_toml_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(
        path = %path.display(),
        channels = config.channels.len(),
        decodes = config.decodes.len(),
        "loaded configuration"
    );
    Ok(config)
}

/// Directory holding the capture files, resolved against the config file.
pub fn capture_dir(config: &ScopeConfig, config_path: &Path) -> PathBuf {
    let base = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    match &config.capture_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => base.join(dir),
        None => base,
    }
}

pub fn renderer_config(args: &Args, config: &ScopeConfig) -> Result<RendererConfig> {
    let surface_size = args
        .size
        .as_deref()
        .map(parse_surface_size)
        .transpose()?
        .unwrap_or(DEFAULT_SURFACE);

    let display = &config.display;
    let mode = match &args.export {
        Some(Some(path)) => RenderMode::Export { path: path.clone() },
        Some(None) => RenderMode::Export {
            path: renderer::default_export_path(),
        },
        None => RenderMode::Windowed,
    };

    Ok(RendererConfig {
        surface_size,
        mode,
        display: DisplaySettings {
            trace_alpha: args.trace_alpha.unwrap_or(display.trace_alpha),
            color_ramp: color_ramp(args.eye_color.unwrap_or(display.eye_color)),
            grid_max_lines: display.grid_max_lines,
            padding: display.padding,
            label_font: display.label_font.clone(),
        },
        stats_interval: config.stats_interval(),
    })
}

pub fn color_ramp(eye_color: EyeColor) -> ColorRamp {
    match eye_color {
        EyeColor::Crt => ColorRamp::Crt,
        EyeColor::Ironbow => ColorRamp::Ironbow,
        EyeColor::Grayscale => ColorRamp::Grayscale,
        EyeColor::Viridis => ColorRamp::Viridis,
        EyeColor::Rainbow => ColorRamp::Rainbow,
    }
}

/// Loads every channel's capture from `dir`. Channels whose file is missing
/// or malformed stay in the plot without a capture.
pub fn build_scene(config: &ScopeConfig, dir: &Path) -> Result<Scene> {
    let mut channels = Vec::with_capacity(config.channels.len());
    for (position, settings) in config.channels.iter().enumerate() {
        let mut channel = channel_from_settings(position, settings)?;
        match load_capture(dir, settings) {
            Ok(capture) => {
                debug!(
                    channel = %settings.name,
                    samples = capture.sample_count(),
                    kind = %capture.kind(),
                    "loaded capture"
                );
                channel.capture = Some(Arc::new(capture));
            }
            Err(err) => warn!(channel = %settings.name, error = %err, "capture unavailable"),
        }
        channels.push(channel);
    }

    let mut decodes = Vec::with_capacity(config.decodes.len());
    for (position, settings) in config.decodes.iter().enumerate() {
        let id = ChannelId((config.channels.len() + position) as u32);
        match decode_overlay(id, settings, config, &channels) {
            Ok(decode) => decodes.push(decode),
            Err(err) => warn!(decode = %settings.name, error = %err, "decode row skipped"),
        }
    }

    let view = view_group(config, &channels);
    info!(
        channels = channels.len(),
        decodes = decodes.len(),
        dir = %dir.display(),
        "scene ready"
    );
    Ok(Scene {
        channels,
        decodes,
        view,
    })
}

fn channel_from_settings(position: usize, settings: &ChannelSettings) -> Result<Channel> {
    let color = parse_color(&settings.color).map_err(|err| anyhow!(err))?;
    let mut channel = Channel::new(ChannelId(position as u32), settings.name.clone());
    channel.color = Rgba::from(color);
    channel.enabled = settings.enabled;
    channel.offset = settings.offset;
    channel.range = settings.range;
    channel.unit = Unit::parse(&settings.unit).unwrap_or_else(|| {
        warn!(channel = %settings.name, unit = %settings.unit, "unknown unit; using volts");
        Unit::Volts
    });
    channel.axis = match settings.kind {
        ChannelKind::Spectrum => VerticalAxis::Decibel,
        _ => VerticalAxis::Linear,
    };
    channel.display = match settings.kind {
        ChannelKind::Eye => DisplayMode::Eye,
        ChannelKind::Waterfall => DisplayMode::Waterfall,
        _ => DisplayMode::Trace,
    };
    channel.physical = matches!(settings.kind, ChannelKind::Analog | ChannelKind::Digital);
    Ok(channel)
}

pub fn sample_format(layout: BufferLayout) -> SampleFormat {
    match layout {
        BufferLayout::Sparse => SampleFormat::SparseV1,
        BufferLayout::Dense => SampleFormat::DenseV1,
    }
}

/// Reads the stream file for `settings` from `dir`.
pub fn load_capture(dir: &Path, settings: &ChannelSettings) -> Result<Capture> {
    let path = dir.join(stream_file_name(settings.index, settings.stream));
    let format = sample_format(settings.layout);
    let data = match settings.kind {
        ChannelKind::Analog | ChannelKind::Spectrum => {
            CaptureData::Analog(load_analog(&path, format)?)
        }
        ChannelKind::Digital => CaptureData::Digital(load_digital(&path, format)?),
        ChannelKind::Eye | ChannelKind::Waterfall => {
            let field = settings
                .field
                .ok_or_else(|| anyhow!("channel '{}' has no field size", settings.name))?;
            let field = load_density(&path, field.width, field.height)?;
            if settings.kind == ChannelKind::Eye {
                CaptureData::Eye(field)
            } else {
                CaptureData::Waterfall(field)
            }
        }
    };
    Ok(Capture::new(data, settings.timescale, settings.trigger_phase))
}

fn decode_overlay(
    id: ChannelId,
    settings: &DecodeSettings,
    config: &ScopeConfig,
    channels: &[Channel],
) -> Result<DecodeOverlay> {
    let color = Rgba::from(parse_color(&settings.color).map_err(|err| anyhow!(err))?);

    if let Some(levels) = &settings.levels {
        let capture = source_capture(channels, levels)?;
        return Ok(DecodeOverlay {
            id,
            name: settings.name.clone(),
            color,
            renderer: Arc::new(DigitalLevels::new(capture.clone())),
            capture,
        });
    }

    if !settings.bus.is_empty() {
        let capture = Arc::new(bus_capture(channels, &settings.bus)?);
        return Ok(DecodeOverlay {
            id,
            name: settings.name.clone(),
            color,
            renderer: Arc::new(BusValues::new(capture.clone(), color)),
            capture,
        });
    }

    let timescale = settings
        .timescale
        .or_else(|| config.channels.first().map(|channel| channel.timescale))
        .unwrap_or(1);
    let (capture, symbols) = event_capture(settings, color, timescale)?;
    let capture = Arc::new(capture);
    Ok(DecodeOverlay {
        id,
        name: settings.name.clone(),
        color,
        renderer: Arc::new(SymbolTable::new(capture.clone(), symbols)),
        capture,
    })
}

fn source_capture(channels: &[Channel], name: &str) -> Result<Arc<Capture>> {
    channels
        .iter()
        .find(|channel| channel.name == name)
        .ok_or_else(|| anyhow!("unknown channel '{name}'"))?
        .capture
        .clone()
        .ok_or_else(|| anyhow!("channel '{name}' has no capture"))
}

/// Combines the named digital channels, least significant bit first, into a
/// bus capture. The lanes must share one timing; the first lane's timescale
/// and trigger phase carry over.
pub fn bus_capture(channels: &[Channel], lanes: &[String]) -> Result<Capture> {
    let captures = lanes
        .iter()
        .map(|name| source_capture(channels, name))
        .collect::<Result<Vec<_>>>()?;
    let mut series = Vec::with_capacity(captures.len());
    for (name, capture) in lanes.iter().zip(&captures) {
        match capture.data() {
            CaptureData::Digital(lane) => series.push(lane),
            _ => bail!("bus lane '{name}' is not a digital capture"),
        }
    }
    let bus = SampleSeries::<Vec<bool>>::from_lanes(&series).context("bus lanes disagree")?;
    let (timescale, trigger_phase) = captures
        .first()
        .map(|capture| (capture.timescale(), capture.trigger_phase()))
        .unwrap_or((1, 0.0));
    Ok(Capture::new(CaptureData::Bus(bus), timescale, trigger_phase))
}

/// Turns configured decode events into a protocol capture plus the symbol
/// table its values index into. Identical text and color share one entry.
pub fn event_capture(
    settings: &DecodeSettings,
    default_color: Rgba,
    timescale: i64,
) -> Result<(Capture, Vec<(String, Rgba)>)> {
    let mut symbols: Vec<(String, Rgba)> = Vec::new();
    let mut offsets = Vec::with_capacity(settings.events.len());
    let mut durations = Vec::with_capacity(settings.events.len());
    let mut values = Vec::with_capacity(settings.events.len());
    for event in &settings.events {
        let color = match &event.color {
            Some(raw) => Rgba::from(parse_color(raw).map_err(|err| anyhow!(err))?),
            None => default_color,
        };
        let index = match symbols
            .iter()
            .position(|(text, c)| *text == event.text && *c == color)
        {
            Some(index) => index,
            None => {
                symbols.push((event.text.clone(), color));
                symbols.len() - 1
            }
        };
        offsets.push(event.start);
        durations.push(event.length);
        values.push(index as u32);
    }
    let series = SampleSeries::sparse(offsets, durations, values)
        .with_context(|| format!("decode '{}' events", settings.name))?;
    Ok((
        Capture::new(CaptureData::Protocol(series), timescale, 0.0),
        symbols,
    ))
}

fn view_group(config: &ScopeConfig, channels: &[Channel]) -> ViewGroup {
    let mut view = ViewGroup::new(Timebase::new(
        config.view.pixels_per_x_unit,
        config.view.x_axis_offset,
    ));
    let mut positions = [0i64; 2];
    for (slot, at) in positions.iter_mut().zip(&config.view.cursors) {
        *slot = *at;
    }
    view.cursors = Cursors {
        mode: match config.view.cursor {
            scopeconfig::CursorMode::None => CursorMode::None,
            scopeconfig::CursorMode::Single => CursorMode::Single,
            scopeconfig::CursorMode::Dual => CursorMode::Dual,
        },
        positions,
    };
    view.trigger = config.trigger.as_ref().and_then(|trigger| {
        channels
            .iter()
            .find(|channel| channel.name == trigger.channel)
            .map(|channel| TriggerMarker {
                channel: channel.id,
                level: trigger.level,
                dragging: false,
            })
    });
    view
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use waveform::format::{save_analog, save_digital};
    use waveform::CaptureKind;

    const CONFIG: &str = r##"
version = 1

[view]
pixels_per_x_unit = 0.5
cursor = "single"
cursors = [40]

[trigger]
channel = "CH1"
level = 0.1

[[channels]]
name = "CH1"
index = 0
layout = "dense"
color = "#ff0000"
timescale = 1000

[[channels]]
name = "D0"
index = 1
kind = "digital"
layout = "dense"

[[channels]]
name = "MISSING"
index = 7

[[decodes]]
name = "logic"
levels = "D0"

[[decodes]]
name = "uart"
color = "#00ff00"
events = [
    { start = 0, length = 10, text = "0x41" },
    { start = 12, length = 10, text = "0x42" },
    { start = 30, length = 10, text = "0x41" },
]
"##;

    #[test]
    fn parses_surface_size() {
        assert_eq!(parse_surface_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_surface_size(" 640 X 480 ").unwrap(), (640, 480));
        assert!(parse_surface_size("0x10").is_err());
        assert!(parse_surface_size("wide").is_err());
    }

    #[test]
    fn builds_scene_from_capture_directory() {
        let dir = tempfile::tempdir().unwrap();
        save_analog(
            &dir.path().join("channel_0.bin"),
            &SampleSeries::dense(vec![0.0, 0.5, -0.5]),
            SampleFormat::DenseV1,
        )
        .unwrap();
        save_digital(
            &dir.path().join("channel_1.bin"),
            &SampleSeries::dense(vec![true, false]),
            SampleFormat::DenseV1,
        )
        .unwrap();

        let config = ScopeConfig::from_toml_str(CONFIG).unwrap();
        let scene = build_scene(&config, dir.path()).unwrap();

        assert_eq!(scene.channels.len(), 3);
        let ch1 = &scene.channels[0];
        assert_eq!(ch1.color, Rgba::opaque(1.0, 0.0, 0.0));
        assert_eq!(ch1.capture.as_ref().unwrap().sample_count(), 3);
        assert_eq!(ch1.capture.as_ref().unwrap().timescale(), 1000);
        assert!(scene.channels[2].capture.is_none());

        assert_eq!(scene.decodes.len(), 2);
        assert!(scene.decodes[0].renderer.as_levels().is_some());
        let uart = scene.decodes[1].renderer.as_text().unwrap();
        assert_eq!(uart.text(2), "0x41");
        assert_eq!(scene.decodes[1].id, ChannelId(4));

        assert_eq!(scene.view.cursors.mode, CursorMode::Single);
        assert_eq!(scene.view.cursors.positions, [40, 0]);
        assert_eq!(scene.view.trigger.unwrap().channel, ChannelId(0));
    }

    #[test]
    fn bus_decode_combines_digital_lanes() {
        let config = r##"
version = 1

[[channels]]
name = "D0"
index = 0
kind = "digital"
layout = "dense"

[[channels]]
name = "D1"
index = 1
kind = "digital"
layout = "dense"

[[decodes]]
name = "DATA"
color = "#3399ff"
bus = ["D0", "D1"]
"##;
        let dir = tempfile::tempdir().unwrap();
        for (index, levels) in [(0, vec![true, false, true]), (1, vec![false, true, true])] {
            save_digital(
                &dir.path().join(format!("channel_{index}.bin")),
                &SampleSeries::dense(levels),
                SampleFormat::DenseV1,
            )
            .unwrap();
        }

        let config = ScopeConfig::from_toml_str(config).unwrap();
        let scene = build_scene(&config, dir.path()).unwrap();
        assert_eq!(scene.decodes.len(), 1);
        let data = &scene.decodes[0];
        assert_eq!(data.capture.kind(), CaptureKind::Bus);
        let text = data.renderer.as_text().unwrap();
        assert_eq!(
            (0..3).map(|index| text.text(index)).collect::<Vec<_>>(),
            vec!["0x1", "0x2", "0x3"]
        );

        let short = Channel::new(ChannelId(9), "SHORT").with_capture(Capture::new(
            CaptureData::Digital(SampleSeries::dense(vec![true])),
            1,
            0.0,
        ));
        let mut channels = scene.channels.clone();
        channels.push(short);
        assert!(bus_capture(&channels, &["D0".into(), "SHORT".into()]).is_err());
    }

    #[test]
    fn event_symbols_are_shared() {
        let config = ScopeConfig::from_toml_str(CONFIG).unwrap();
        let (capture, symbols) = event_capture(&config.decodes[1], Rgba::WHITE, 1).unwrap();
        assert_eq!(capture.sample_count(), 3);
        assert_eq!(symbols.len(), 2);
        assert_eq!(capture.span(2), Some((30, 10)));
    }

    #[test]
    fn capture_dir_resolves_against_config() {
        let mut config = ScopeConfig::from_toml_str(CONFIG).unwrap();
        let path = Path::new("/etc/scope/view.toml");
        assert_eq!(capture_dir(&config, path), PathBuf::from("/etc/scope"));
        config.capture_dir = Some(PathBuf::from("runs/a"));
        assert_eq!(capture_dir(&config, path), PathBuf::from("/etc/scope/runs/a"));
    }
}
