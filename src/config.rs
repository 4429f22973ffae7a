//! Persisted configuration: the layout description plus the handful of
//! control-surface scalars (brightness, pattern selection, schedule, power
//! ceiling) that should survive a restart. Loaded once at startup and again
//! whenever the hot-reload watcher or a control-surface write touches the
//! file on disk.

use std::path::Path;

use serde::Deserialize;
use serde_json::json;

use crate::layout::{LayoutDescription, UnitSpec, WiringMode};
use crate::pattern::generators::generator_by_name;
use crate::pattern::PatternSelection;
use crate::power::PowerConfig;

/// Raw `grid` section of the persisted layout document.
#[derive(Debug, Deserialize)]
struct RawGrid {
    grid_width: usize,
    grid_height: usize,
    panel_width: usize,
    panel_height: usize,
    wiring_pattern: String,
}

#[derive(Debug, Deserialize)]
struct RawPanel {
    id: usize,
    position: [usize; 2],
    rotation: u16,
}

#[derive(Debug, Deserialize)]
struct RawLayout {
    grid: RawGrid,
    panels: Vec<RawPanel>,
}

impl RawLayout {
    fn into_description(self) -> Result<LayoutDescription, ConfigError> {
        let wiring = match self.grid.wiring_pattern.as_str() {
            "sequential" => WiringMode::Sequential,
            "snake" => WiringMode::Snake,
            "vertical_snake" => WiringMode::VerticalSnake,
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown wiring_pattern '{}'",
                    other
                )))
            }
        };

        let units = self
            .panels
            .into_iter()
            .map(|p| UnitSpec {
                chain_index: p.id,
                grid_position: (p.position[0], p.position[1]),
                rotation: p.rotation,
            })
            .collect();

        Ok(LayoutDescription {
            grid_width: self.grid.grid_width,
            grid_height: self.grid.grid_height,
            panel_width: self.grid.panel_width,
            panel_height: self.grid.panel_height,
            wiring,
            units,
        })
    }
}

fn wiring_pattern_str(wiring: WiringMode) -> &'static str {
    match wiring {
        WiringMode::Sequential => "sequential",
        WiringMode::Snake => "snake",
        WiringMode::VerticalSnake => "vertical_snake",
    }
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    params: std::collections::HashMap<String, String>,
}

impl RawPattern {
    fn into_selection(self) -> Result<PatternSelection, ConfigError> {
        match self.kind.as_str() {
            "external" => Ok(PatternSelection::External),
            "internal" => {
                let name = self.name.ok_or_else(|| {
                    ConfigError::Validation("internal pattern requires a name".into())
                })?;
                if generator_by_name(&name).is_none() {
                    return Err(ConfigError::Validation(format!("unknown pattern '{}'", name)));
                }
                Ok(PatternSelection::Internal { name, params: self.params })
            }
            other => Err(ConfigError::Validation(format!("unknown pattern type '{}'", other))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPower {
    ceiling_amps: f64,
    #[serde(default)]
    enabled: bool,
}

/// Ingress/control-surface bind points. Not part of the core's contract,
/// but needed to run the binary end to end.
#[derive(Debug, Deserialize)]
struct RawIngress {
    #[serde(default = "default_datagram_bind")]
    datagram_bind: String,
    #[serde(default)]
    pipe_path: Option<String>,
    #[serde(default = "default_web_bind")]
    web_bind: String,
}

impl Default for RawIngress {
    fn default() -> Self {
        RawIngress {
            datagram_bind: default_datagram_bind(),
            pipe_path: None,
            web_bind: default_web_bind(),
        }
    }
}

fn default_datagram_bind() -> String {
    "0.0.0.0:6454".into()
}

fn default_web_bind() -> String {
    "0.0.0.0:7878".into()
}

#[derive(Debug, Deserialize)]
struct RawAppConfig {
    layout: RawLayout,
    #[serde(default = "default_brightness")]
    brightness: u16,
    #[serde(default = "default_pattern")]
    pattern: RawPattern,
    #[serde(default = "default_schedule")]
    schedule: String,
    power: RawPower,
    #[serde(default)]
    ingress: RawIngress,
}

fn default_brightness() -> u16 {
    128
}

fn default_pattern() -> RawPattern {
    RawPattern { kind: "external".into(), name: None, params: Default::default() }
}

fn default_schedule() -> String {
    "awake".into()
}

/// Ingress/control-surface bind points, resolved from `RawIngress`.
#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub datagram_bind: String,
    pub pipe_path: Option<String>,
    pub web_bind: String,
}

/// Resolved, ready-to-apply application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub layout: LayoutDescription,
    pub brightness: u16,
    pub pattern: PatternSelection,
    pub schedule_awake: bool,
    pub power: PowerConfig,
    pub ingress: IngressConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&contents)
    }

    /// Parse config from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawAppConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let layout = raw.layout.into_description()?;
        let pattern = raw.pattern.into_selection()?;
        let schedule_awake = match raw.schedule.as_str() {
            "awake" => true,
            "asleep" => false,
            other => {
                return Err(ConfigError::Validation(format!("unknown schedule state '{}'", other)))
            }
        };

        let config = AppConfig {
            layout,
            brightness: raw.brightness,
            pattern,
            schedule_awake,
            power: PowerConfig::new(raw.power.ceiling_amps, raw.power.enabled),
            ingress: IngressConfig {
                datagram_bind: raw.ingress.datagram_bind,
                pipe_path: raw.ingress.pipe_path,
                web_bind: raw.ingress.web_bind,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges. Layout itself is
    /// validated separately by `Layout::parse` once the Arbiter applies it.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.brightness > 255 {
            return Err(ConfigError::Validation(format!(
                "brightness must be 0-255, got {}",
                self.brightness
            )));
        }
        if self.power.enabled && self.power.ceiling_amps <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "power ceiling must be > 0 when enabled, got {}",
                self.power.ceiling_amps
            )));
        }
        Ok(())
    }

    /// Render back to the persisted JSON shape, the inverse of `from_json`.
    pub fn to_json(&self) -> String {
        let panels: Vec<serde_json::Value> = self
            .layout
            .units
            .iter()
            .map(|u| {
                json!({
                    "id": u.chain_index,
                    "position": [u.grid_position.0, u.grid_position.1],
                    "rotation": u.rotation,
                })
            })
            .collect();

        let pattern = match &self.pattern {
            PatternSelection::External => json!({ "type": "external" }),
            PatternSelection::Internal { name, params } => json!({
                "type": "internal",
                "name": name,
                "params": params,
            }),
        };

        let doc = json!({
            "layout": {
                "grid": {
                    "grid_width": self.layout.grid_width,
                    "grid_height": self.layout.grid_height,
                    "panel_width": self.layout.panel_width,
                    "panel_height": self.layout.panel_height,
                    "wiring_pattern": wiring_pattern_str(self.layout.wiring),
                },
                "panels": panels,
            },
            "brightness": self.brightness,
            "pattern": pattern,
            "schedule": if self.schedule_awake { "awake" } else { "asleep" },
            "power": {
                "ceiling_amps": self.power.ceiling_amps,
                "enabled": self.power.enabled,
            },
            "ingress": {
                "datagram_bind": self.ingress.datagram_bind,
                "pipe_path": self.ingress.pipe_path,
                "web_bind": self.ingress.web_bind,
            },
        });

        serde_json::to_string_pretty(&doc).unwrap_or_default()
    }
}

/// Parse a standalone layout document (the `layout` field of the persisted
/// config, or the body of a control-surface `PUT /layout` request) into a
/// `LayoutDescription`. Validation against the grid itself still happens in
/// `Layout::parse`, called by the Arbiter.
pub fn parse_layout(value: serde_json::Value) -> Result<LayoutDescription, ConfigError> {
    let raw: RawLayout = serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    raw.into_description()
}

/// Parse a standalone pattern-selection document into a `PatternSelection`.
pub fn parse_pattern(value: serde_json::Value) -> Result<PatternSelection, ConfigError> {
    let raw: RawPattern = serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    raw.into_selection()
}

/// Render a validated `Layout` back to the persisted document shape.
pub fn layout_to_json(layout: &crate::layout::Layout) -> serde_json::Value {
    let panels: Vec<serde_json::Value> = layout
        .units()
        .iter()
        .map(|u| {
            json!({
                "id": u.chain_index,
                "position": [u.grid_position.0, u.grid_position.1],
                "rotation": u.rotation,
            })
        })
        .collect();

    json!({
        "grid": {
            "grid_width": layout.grid_width,
            "grid_height": layout.grid_height,
            "panel_width": layout.panel_width,
            "panel_height": layout.panel_height,
            "wiring_pattern": wiring_pattern_str(layout.wiring),
        },
        "panels": panels,
    })
}

/// Render a `PatternSelection` back to the persisted document shape.
pub fn pattern_to_json(pattern: &PatternSelection) -> serde_json::Value {
    match pattern {
        PatternSelection::External => json!({ "type": "external" }),
        PatternSelection::Internal { name, params } => json!({
            "type": "internal",
            "name": name,
            "params": params,
        }),
    }
}

/// Write `contents` to `path` atomically: write to a sibling temp file, then
/// rename over the destination so readers never observe a partial write.
pub fn atomic_write_config(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "config I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "config parse error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "layout": {
                "grid": {
                    "grid_width": 2, "grid_height": 2,
                    "panel_width": 16, "panel_height": 16,
                    "wiring_pattern": "snake"
                },
                "panels": [
                    {"id": 0, "position": [0, 0], "rotation": 0},
                    {"id": 1, "position": [1, 0], "rotation": 0},
                    {"id": 2, "position": [1, 1], "rotation": 180},
                    {"id": 3, "position": [0, 1], "rotation": 180}
                ]
            },
            "brightness": 180,
            "pattern": {"type": "internal", "name": "solid", "params": {"r": "255"}},
            "schedule": "awake",
            "power": {"ceiling_amps": 5.0, "enabled": true}
        }"#
    }

    #[test]
    fn parses_full_document() {
        let cfg = AppConfig::from_json(sample_json()).unwrap();
        assert_eq!(cfg.layout.grid_width, 2);
        assert_eq!(cfg.brightness, 180);
        assert!(cfg.schedule_awake);
        assert_eq!(cfg.power.ceiling_amps, 5.0);
        assert_eq!(
            cfg.pattern,
            PatternSelection::Internal {
                name: "solid".into(),
                params: [("r".to_string(), "255".to_string())].into_iter().collect(),
            }
        );
    }

    #[test]
    fn rejects_unknown_wiring_pattern() {
        let json = sample_json().replace("\"snake\"", "\"diagonal\"");
        assert!(AppConfig::from_json(&json).is_err());
    }

    #[test]
    fn rejects_brightness_out_of_range() {
        let json = sample_json().replace("180", "99999");
        assert!(AppConfig::from_json(&json).is_err());
    }

    #[test]
    fn rejects_unknown_internal_pattern_name() {
        let json = sample_json().replace("\"solid\"", "\"does-not-exist\"");
        assert!(AppConfig::from_json(&json).is_err());
    }

    #[test]
    fn defaults_apply_when_brightness_and_pattern_omitted() {
        let json = r#"{
            "layout": {
                "grid": {
                    "grid_width": 1, "grid_height": 1,
                    "panel_width": 4, "panel_height": 4,
                    "wiring_pattern": "sequential"
                },
                "panels": [{"id": 0, "position": [0, 0], "rotation": 0}]
            },
            "power": {"ceiling_amps": 1.0, "enabled": false}
        }"#;
        let cfg = AppConfig::from_json(json).unwrap();
        assert_eq!(cfg.brightness, 128);
        assert_eq!(cfg.pattern, PatternSelection::External);
        assert!(cfg.schedule_awake);
    }

    #[test]
    fn round_trips_through_to_json() {
        let cfg = AppConfig::from_json(sample_json()).unwrap();
        let rendered = cfg.to_json();
        let reparsed = AppConfig::from_json(&rendered).unwrap();
        assert_eq!(reparsed.brightness, cfg.brightness);
        assert_eq!(reparsed.layout.grid_width, cfg.layout.grid_width);
        assert_eq!(reparsed.pattern, cfg.pattern);
    }

    #[test]
    fn atomic_write_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("ledgrid-config-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let cfg = AppConfig::from_json(sample_json()).unwrap();
        atomic_write_config(&path, &cfg.to_json()).unwrap();
        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.brightness, cfg.brightness);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn ingress_defaults_when_omitted() {
        let cfg = AppConfig::from_json(sample_json()).unwrap();
        assert_eq!(cfg.ingress.datagram_bind, "0.0.0.0:6454");
        assert_eq!(cfg.ingress.web_bind, "0.0.0.0:7878");
        assert!(cfg.ingress.pipe_path.is_none());
    }

    #[test]
    fn parse_layout_standalone_document() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{
                "grid": {
                    "grid_width": 1, "grid_height": 1,
                    "panel_width": 4, "panel_height": 4,
                    "wiring_pattern": "sequential"
                },
                "panels": [{"id": 0, "position": [0, 0], "rotation": 0}]
            }"#,
        )
        .unwrap();
        let desc = parse_layout(value).unwrap();
        assert_eq!((desc.grid_width, desc.grid_height), (1, 1));
    }

    #[test]
    fn parse_pattern_standalone_document() {
        let value = json!({"type": "internal", "name": "plasma", "params": {}});
        let selection = parse_pattern(value).unwrap();
        assert_eq!(
            selection,
            PatternSelection::Internal { name: "plasma".into(), params: Default::default() }
        );
    }
}
