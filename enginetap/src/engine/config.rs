//! Rendering preferences consulted by the dispatcher and poller.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default interval between two buffer drains.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(15);

static GRAPH_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(default|[0-9]*\.?[0-9]+)[ \t]*(px|in|cm)?$").expect("static graph size pattern")
});

/// Unit of a graph dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GraphUnit {
    #[default]
    #[serde(rename = "in")]
    Inches,
    #[serde(rename = "px")]
    Pixels,
    #[serde(rename = "cm")]
    Centimeters,
}

impl GraphUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inches => "in",
            Self::Pixels => "px",
            Self::Centimeters => "cm",
        }
    }
}

/// One graph dimension. `value == None` means the engine's default.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSize {
    pub value: Option<f64>,
    pub unit: GraphUnit,
}

impl GraphSize {
    /// The engine's default size, expressed in `unit`.
    pub fn default_in(unit: GraphUnit) -> Self {
        Self { value: None, unit }
    }

    pub fn is_default(&self) -> bool {
        self.value.is_none()
    }
}

impl FromStr for GraphSize {
    type Err = ConfigError;

    /// Accepts `default`, a bare number of inches (rounded), or a number
    /// followed by `px` (rounded), `in`, or `cm` (3 decimals).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let invalid = || ConfigError::InvalidGraphSize {
            value: s.to_string(),
        };

        let caps = GRAPH_SIZE.captures(&normalized).ok_or_else(invalid)?;
        let number = &caps[1];
        let unit = match caps.get(2).map(|m| m.as_str()) {
            Some("px") => Some(GraphUnit::Pixels),
            Some("cm") => Some(GraphUnit::Centimeters),
            Some(_) => Some(GraphUnit::Inches),
            None => None,
        };

        if number == "default" {
            return Ok(Self::default_in(unit.unwrap_or_default()));
        }

        let parsed: f64 = number.parse().map_err(|_| invalid())?;
        let (value, unit) = match unit {
            None => (parsed.round(), GraphUnit::Inches),
            Some(GraphUnit::Pixels) => (parsed.round(), GraphUnit::Pixels),
            Some(GraphUnit::Centimeters) => {
                ((parsed * 1000.0).round() / 1000.0, GraphUnit::Centimeters)
            }
            Some(GraphUnit::Inches) => (parsed, GraphUnit::Inches),
        };

        Ok(Self {
            value: Some(value),
            unit,
        })
    }
}

impl fmt::Display for GraphSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{}{}", v, self.unit.as_str()),
            None => f.write_str("default"),
        }
    }
}

/// File format used to export graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    #[default]
    Svg,
    Png,
    Pdf,
}

impl FromStr for GraphFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            "pdf" => Ok(Self::Pdf),
            other => Err(ConfigError::InvalidGraphFormat {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Pdf => "pdf",
        })
    }
}

/// Graph export and display preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub width: GraphSize,
    pub height: GraphSize,
    pub format: GraphFormat,
    /// Export and display graphs at all.
    pub show: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            width: GraphSize::default(),
            height: GraphSize::default(),
            format: GraphFormat::default(),
            show: true,
        }
    }
}

impl GraphConfig {
    /// Set the graph size from user strings.
    ///
    /// At least one dimension is required. A missing dimension falls back
    /// to `default`, expressed in the unit of the given one.
    pub fn set_size(&mut self, width: Option<&str>, height: Option<&str>) -> Result<(), ConfigError> {
        let width = width.filter(|w| !w.is_empty()).map(str::parse::<GraphSize>).transpose()?;
        let height = height.filter(|h| !h.is_empty()).map(str::parse::<GraphSize>).transpose()?;

        let (width, height) = match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, GraphSize::default_in(w.unit)),
            (None, Some(h)) => (GraphSize::default_in(h.unit), h),
            (None, None) => return Err(ConfigError::MissingGraphSize),
        };

        self.width = width;
        self.height = height;
        Ok(())
    }
}

/// Whether partial output is shown while a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamingMode {
    #[default]
    On,
    Off,
}

impl FromStr for StreamingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(ConfigError::InvalidStreamingMode {
                value: other.to_string(),
            }),
        }
    }
}

/// Read-only snapshot of rendering preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub graph: GraphConfig,

    /// Forward partial output while the engine runs. When off, output is
    /// withheld and delivered in one final chunk.
    pub streaming_output: bool,

    /// Delay between two drains of the engine buffer.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            streaming_output: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RenderConfig {
    pub fn with_streaming(mut self, mode: StreamingMode) -> Self {
        self.streaming_output = mode == StreamingMode::On;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graph = graph;
        self
    }
}

impl fmt::Display for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    Settings")?;
        writeln!(f, "      graphic display        {}", self.graph.show)?;
        writeln!(
            f,
            "      graphic size           width = {}, height = {}",
            self.graph.width, self.graph.height
        )?;
        writeln!(f, "      graphic format         {}", self.graph.format)?;
        write!(
            f,
            "      streaming output       {}",
            if self.streaming_output { "on" } else { "off" }
        )
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_size_units() {
        let s: GraphSize = "300px".parse().unwrap();
        assert_eq!(s.value, Some(300.0));
        assert_eq!(s.unit, GraphUnit::Pixels);

        let s: GraphSize = "5.5in".parse().unwrap();
        assert_eq!(s.value, Some(5.5));
        assert_eq!(s.unit, GraphUnit::Inches);

        let s: GraphSize = "2.34567cm".parse().unwrap();
        assert_eq!(s.value, Some(2.346));
        assert_eq!(s.unit, GraphUnit::Centimeters);
    }

    #[test]
    fn test_graph_size_bare_number_rounds_to_inches() {
        let s: GraphSize = " 3.6 ".parse().unwrap();
        assert_eq!(s.value, Some(4.0));
        assert_eq!(s.unit, GraphUnit::Inches);
        assert_eq!(s.to_string(), "4in");
    }

    #[test]
    fn test_graph_size_default() {
        let s: GraphSize = "Default".parse().unwrap();
        assert!(s.is_default());
        assert_eq!(s.to_string(), "default");

        let s: GraphSize = "default px".parse().unwrap();
        assert!(s.is_default());
        assert_eq!(s.unit, GraphUnit::Pixels);
    }

    #[test]
    fn test_graph_size_invalid() {
        assert!("-3in".parse::<GraphSize>().is_err());
        assert!("wide".parse::<GraphSize>().is_err());
        assert!("3ft".parse::<GraphSize>().is_err());
    }

    #[test]
    fn test_set_size_single_dimension() {
        let mut graph = GraphConfig::default();
        graph.set_size(Some("300px"), None).unwrap();
        assert_eq!(graph.width.value, Some(300.0));
        assert!(graph.height.is_default());
        assert_eq!(graph.height.unit, GraphUnit::Pixels);

        graph.set_size(None, Some("4cm")).unwrap();
        assert!(graph.width.is_default());
        assert_eq!(graph.width.unit, GraphUnit::Centimeters);
    }

    #[test]
    fn test_set_size_requires_one_dimension() {
        let mut graph = GraphConfig::default();
        assert!(matches!(
            graph.set_size(None, Some("")),
            Err(ConfigError::MissingGraphSize)
        ));
    }

    #[test]
    fn test_graph_format_and_streaming_mode() {
        assert_eq!("png".parse::<GraphFormat>().unwrap(), GraphFormat::Png);
        assert!("gif".parse::<GraphFormat>().is_err());
        assert_eq!("off".parse::<StreamingMode>().unwrap(), StreamingMode::Off);
        assert!("maybe".parse::<StreamingMode>().is_err());

        let config = RenderConfig::default().with_streaming(StreamingMode::Off);
        assert!(!config.streaming_output);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: RenderConfig = serde_json::from_str(
            r#"{"streaming_output": false, "poll_interval": 50, "graph": {"format": "pdf"}}"#,
        )
        .unwrap();
        assert!(!config.streaming_output);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.graph.format, GraphFormat::Pdf);
        assert!(config.graph.show);
    }

    #[test]
    fn test_status_summary() {
        let summary = RenderConfig::default().to_string();
        assert!(summary.contains("graphic format         svg"));
        assert!(summary.contains("width = default, height = default"));
        assert!(summary.contains("streaming output       on"));
    }
}
