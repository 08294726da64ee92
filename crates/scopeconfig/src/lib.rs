//! TOML configuration for the waveform viewer.
//!
//! A configuration names the channels to plot (with their capture files and
//! vertical scaling), the shared timebase, cursor and trigger-marker state, and
//! any decode rows to draw on top of the plot. Parsing and validation live here;
//! turning the description into loaded captures is the binary's job.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopeConfig {
    pub version: u32,
    /// Directory holding `channel_<n>.bin` files; relative paths resolve
    /// against the configuration file's directory.
    #[serde(default)]
    pub capture_dir: Option<PathBuf>,
    #[serde(
        default = "default_stats_interval",
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub stats_interval: Option<Duration>,
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub view: ViewSettings,
    #[serde(default)]
    pub trigger: Option<TriggerSettings>,
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,
    #[serde(default)]
    pub decodes: Vec<DecodeSettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplaySettings {
    #[serde(default = "default_trace_alpha")]
    pub trace_alpha: f32,
    #[serde(default)]
    pub eye_color: EyeColor,
    #[serde(default = "default_grid_max_lines")]
    pub grid_max_lines: u32,
    #[serde(default = "default_padding")]
    pub padding: f32,
    #[serde(default)]
    pub label_font: Option<PathBuf>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            trace_alpha: default_trace_alpha(),
            eye_color: EyeColor::default(),
            grid_max_lines: default_grid_max_lines(),
            padding: default_padding(),
            label_font: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeColor {
    #[default]
    Crt,
    Ironbow,
    Grayscale,
    Viridis,
    Rainbow,
}

impl EyeColor {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "crt" => Ok(Self::Crt),
            "ironbow" => Ok(Self::Ironbow),
            "grayscale" | "greyscale" | "gray" => Ok(Self::Grayscale),
            "viridis" => Ok(Self::Viridis),
            "rainbow" | "krain" => Ok(Self::Rainbow),
            other => Err(format!("unknown eye color ramp '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewSettings {
    #[serde(default = "default_pixels_per_x_unit")]
    pub pixels_per_x_unit: f64,
    #[serde(default)]
    pub x_axis_offset: i64,
    #[serde(default)]
    pub cursor: CursorMode,
    #[serde(default)]
    pub cursors: Vec<i64>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            pixels_per_x_unit: default_pixels_per_x_unit(),
            x_axis_offset: 0,
            cursor: CursorMode::default(),
            cursors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    #[default]
    None,
    Single,
    Dual,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TriggerSettings {
    pub channel: String,
    pub level: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Analog,
    Digital,
    Spectrum,
    Eye,
    Waterfall,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferLayout {
    #[default]
    Sparse,
    Dense,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelSettings {
    pub name: String,
    pub index: u32,
    #[serde(default)]
    pub stream: u32,
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub layout: BufferLayout,
    #[serde(default = "default_channel_color")]
    pub color: String,
    /// Duration of one offset unit, in picoseconds.
    #[serde(default = "default_timescale")]
    pub timescale: i64,
    #[serde(default)]
    pub trigger_phase: f64,
    #[serde(default)]
    pub offset: f32,
    #[serde(default = "default_range")]
    pub range: f32,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Density field dimensions for eye and waterfall channels.
    #[serde(default)]
    pub field: Option<FieldSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecodeSettings {
    pub name: String,
    #[serde(default = "default_channel_color")]
    pub color: String,
    /// Name of a digital channel whose levels are drawn as a stepped row.
    #[serde(default)]
    pub levels: Option<String>,
    /// Digital channels combined into a bus row, least significant bit first.
    #[serde(default)]
    pub bus: Vec<String>,
    #[serde(default)]
    pub timescale: Option<i64>,
    #[serde(default)]
    pub events: Vec<DecodeEvent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecodeEvent {
    pub start: i64,
    pub length: i64,
    pub text: String,
    #[serde(default)]
    pub color: Option<String>,
}

fn default_stats_interval() -> Option<Duration> {
    Some(Duration::from_secs(5))
}

fn default_trace_alpha() -> f32 {
    0.5
}

fn default_grid_max_lines() -> u32 {
    5
}

fn default_padding() -> f32 {
    2.0
}

fn default_pixels_per_x_unit() -> f64 {
    0.05
}

fn default_channel_color() -> String {
    "#ffff80".into()
}

fn default_timescale() -> i64 {
    1
}

fn default_range() -> f32 {
    1.0
}

fn default_unit() -> String {
    "V".into()
}

fn default_enabled() -> bool {
    true
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as seconds or a human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v)
                .map(|secs| Some(Duration::from_secs(secs)))
                .map_err(|_| E::custom("duration must be non-negative"))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Parses `#rrggbb` into normalized RGB components.
pub fn parse_color(raw: &str) -> Result<[f32; 3], String> {
    let hex = raw
        .trim()
        .strip_prefix('#')
        .ok_or_else(|| format!("color '{raw}' must start with '#'"))?;
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(format!("color '{raw}' must be in #rrggbb form"));
    }
    let channel = |at: usize| -> Result<f32, String> {
        u8::from_str_radix(&hex[at..at + 2], 16)
            .map(|v| f32::from(v) / 255.0)
            .map_err(|err| format!("color '{raw}': {err}"))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

impl ScopeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ScopeConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSettings> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    pub fn stats_interval(&self) -> Duration {
        self.stats_interval.unwrap_or(Duration::from_secs(5))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.channels.is_empty() {
            return Err(ConfigError::Invalid(
                "config must define at least one channel".into(),
            ));
        }

        let display = &self.display;
        if !(0.0..=1.0).contains(&display.trace_alpha) {
            return Err(ConfigError::Invalid(
                "display.trace_alpha must be within [0, 1]".into(),
            ));
        }
        if display.grid_max_lines < 2 {
            return Err(ConfigError::Invalid(
                "display.grid_max_lines must be at least 2".into(),
            ));
        }
        if display.padding < 0.0 {
            return Err(ConfigError::Invalid(
                "display.padding must be non-negative".into(),
            ));
        }

        if !(self.view.pixels_per_x_unit.is_finite() && self.view.pixels_per_x_unit > 0.0) {
            return Err(ConfigError::Invalid(
                "view.pixels_per_x_unit must be a positive number".into(),
            ));
        }
        let wanted_cursors = match self.view.cursor {
            CursorMode::None => 0,
            CursorMode::Single => 1,
            CursorMode::Dual => 2,
        };
        if self.view.cursors.len() < wanted_cursors {
            return Err(ConfigError::Invalid(format!(
                "view.cursor mode needs {wanted_cursors} cursor positions, found {}",
                self.view.cursors.len()
            )));
        }

        for (position, channel) in self.channels.iter().enumerate() {
            let name = channel.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "channel #{position} has an empty name"
                )));
            }
            if self.channels[..position].iter().any(|c| c.name == channel.name) {
                return Err(ConfigError::Invalid(format!(
                    "channel '{name}' is defined more than once"
                )));
            }
            parse_color(&channel.color)
                .map_err(|err| ConfigError::Invalid(format!("channel '{name}': {err}")))?;
            if channel.timescale <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "channel '{name}' timescale must be > 0"
                )));
            }
            if !(channel.range.is_finite() && channel.range > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "channel '{name}' range must be > 0"
                )));
            }
            let needs_field = matches!(channel.kind, ChannelKind::Eye | ChannelKind::Waterfall);
            match (needs_field, channel.field) {
                (true, None) => {
                    return Err(ConfigError::Invalid(format!(
                        "channel '{name}' needs a [field] size"
                    )))
                }
                (true, Some(field)) if field.width == 0 || field.height == 0 => {
                    return Err(ConfigError::Invalid(format!(
                        "channel '{name}' field dimensions must be > 0"
                    )))
                }
                _ => {}
            }
        }

        if let Some(trigger) = &self.trigger {
            if self.channel(&trigger.channel).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "trigger references unknown channel '{}'",
                    trigger.channel
                )));
            }
        }

        for decode in &self.decodes {
            let name = decode.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("decode has an empty name".into()));
            }
            parse_color(&decode.color)
                .map_err(|err| ConfigError::Invalid(format!("decode '{name}': {err}")))?;
            let sources = [
                decode.levels.is_some(),
                !decode.bus.is_empty(),
                !decode.events.is_empty(),
            ];
            match sources.iter().filter(|used| **used).count() {
                0 => {
                    return Err(ConfigError::Invalid(format!(
                        "decode '{name}' must define levels, bus or events"
                    )))
                }
                1 => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "decode '{name}' may use only one of levels, bus or events"
                    )))
                }
            }
            for source in decode.levels.iter().chain(&decode.bus) {
                self.require_digital(name, source)?;
            }
            if let Some(timescale) = decode.timescale {
                if timescale <= 0 {
                    return Err(ConfigError::Invalid(format!(
                        "decode '{name}' timescale must be > 0"
                    )));
                }
            }
            for event in &decode.events {
                if event.length < 0 {
                    return Err(ConfigError::Invalid(format!(
                        "decode '{name}' event at {} has negative length",
                        event.start
                    )));
                }
                if let Some(color) = &event.color {
                    parse_color(color)
                        .map_err(|err| ConfigError::Invalid(format!("decode '{name}': {err}")))?;
                }
            }
            let mut starts = decode.events.iter().map(|event| event.start);
            if let Some(first) = starts.next() {
                let ordered = starts
                    .try_fold(first, |prev, next| (next >= prev).then_some(next))
                    .is_some();
                if !ordered {
                    return Err(ConfigError::Invalid(format!(
                        "decode '{name}' events must be sorted by start"
                    )));
                }
            }
        }

        Ok(())
    }

    fn require_digital(&self, decode: &str, source: &str) -> Result<(), ConfigError> {
        match self.channel(source) {
            Some(channel) if channel.kind == ChannelKind::Digital => Ok(()),
            Some(_) => Err(ConfigError::Invalid(format!(
                "decode '{decode}' channel '{source}' is not digital"
            ))),
            None => Err(ConfigError::Invalid(format!(
                "decode '{decode}' references unknown channel '{source}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1
capture_dir = "captures/run1"
stats_interval = "2s"

[display]
trace_alpha = 0.75
eye_color = "ironbow"
grid_max_lines = 6

[view]
pixels_per_x_unit = 0.5
x_axis_offset = -100
cursor = "dual"
cursors = [10, 250]

[trigger]
channel = "CH1"
level = 0.2

[[channels]]
name = "CH1"
index = 0
color = "#ffff00"
timescale = 1000
range = 2.0

[[channels]]
name = "D0"
index = 4
kind = "digital"
layout = "dense"

[[decodes]]
name = "UART"
color = "#00ff80"
events = [
    { start = 0, length = 40, text = "0x41" },
    { start = 60, length = 40, text = "0x42", color = "#ff0000" },
]

[[decodes]]
name = "D0 levels"
levels = "D0"
"##;

    #[test]
    fn parses_sample_config() {
        let config = ScopeConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.display.eye_color, EyeColor::Ironbow);
        assert_eq!(config.view.cursor, CursorMode::Dual);
        assert_eq!(config.stats_interval(), Duration::from_secs(2));
        let digital = config.channel("D0").unwrap();
        assert_eq!(digital.kind, ChannelKind::Digital);
        assert_eq!(digital.layout, BufferLayout::Dense);
        assert_eq!(config.decodes[0].events.len(), 2);
    }

    #[test]
    fn applies_defaults() {
        let config = ScopeConfig::from_toml_str(
            r#"
version = 1

[[channels]]
name = "CH1"
index = 0
"#,
        )
        .unwrap();
        assert_eq!(config.display.trace_alpha, 0.5);
        assert_eq!(config.display.grid_max_lines, 5);
        assert_eq!(config.view.cursor, CursorMode::None);
        assert_eq!(config.channels[0].unit, "V");
        assert!(config.channels[0].enabled);
        assert_eq!(config.stats_interval(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_missing_channels() {
        let err = ScopeConfig::from_toml_str("version = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_trigger_channel() {
        let config = r#"
version = 1

[trigger]
channel = "CH9"
level = 0.0

[[channels]]
name = "CH1"
index = 0
"#;
        let err = ScopeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_eye_without_field() {
        let config = r#"
version = 1

[[channels]]
name = "EYE"
index = 0
kind = "eye"
"#;
        let err = ScopeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("field")));
    }

    #[test]
    fn rejects_levels_from_analog_channel() {
        let config = r#"
version = 1

[[channels]]
name = "CH1"
index = 0

[[decodes]]
name = "bad"
levels = "CH1"
"#;
        let err = ScopeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("not digital")));
    }

    #[test]
    fn bus_decodes_need_digital_sources() {
        let config = r#"
version = 1

[[channels]]
name = "D0"
index = 0
kind = "digital"

[[channels]]
name = "D1"
index = 1
kind = "digital"

[[decodes]]
name = "DATA"
bus = ["D0", "D1"]
"#;
        let parsed = ScopeConfig::from_toml_str(config).unwrap();
        assert_eq!(parsed.decodes[0].bus, vec!["D0", "D1"]);

        let missing = config.replace("\"D1\"]", "\"D7\"]");
        let err = ScopeConfig::from_toml_str(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("unknown channel 'D7'")));

        let mixed = format!("{config}levels = \"D0\"\n");
        let err = ScopeConfig::from_toml_str(&mixed).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("only one of")));
    }

    #[test]
    fn rejects_unsorted_events() {
        let config = r#"
version = 1

[[channels]]
name = "CH1"
index = 0

[[decodes]]
name = "UART"
events = [
    { start = 50, length = 10, text = "b" },
    { start = 10, length = 10, text = "a" },
]
"#;
        let err = ScopeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("sorted")));
    }

    #[test]
    fn rejects_dual_cursor_without_positions() {
        let config = r#"
version = 1

[view]
cursor = "dual"
cursors = [5]

[[channels]]
name = "CH1"
index = 0
"#;
        assert!(ScopeConfig::from_toml_str(config).is_err());
    }

    #[test]
    fn parses_colors() {
        assert_eq!(parse_color("#ff0000").unwrap(), [1.0, 0.0, 0.0]);
        assert!(parse_color("ff0000").is_err());
        assert!(parse_color("#ff00").is_err());
        assert!(parse_color("#gg0000").is_err());
    }

    #[test]
    fn parses_eye_color_aliases() {
        assert_eq!(EyeColor::parse("KRain").unwrap(), EyeColor::Rainbow);
        assert_eq!(EyeColor::parse("greyscale").unwrap(), EyeColor::Grayscale);
        assert!(EyeColor::parse("sepia").is_err());
    }
}
