//! Persistent settings
//!
//! Parser, model and drawing defaults stored as JSON in the config directory.
//! Library functions never read these globals; callers turn them into explicit
//! option structs with [`parse_options`], [`fit_options`] and [`draw_options`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::drawing::DrawOptions;
use crate::error::{ChatNetError, Result};
use crate::graph::LayoutKind;
use crate::null_model::FitOptions;
use crate::transcript::{DateOrder, ParseOptions};
use crate::weights::Normalization;

/// Global settings instance
static SETTINGS: RwLock<Option<Settings>> = RwLock::new(None);

/// Path to config file (set during init)
static CONFIG_PATH: RwLock<Option<PathBuf>> = RwLock::new(None);

pub const SETTINGS_FILE: &str = "settings.json";
pub const HEADER_LINES_ENV: &str = "CHATNET_HEADER_LINES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,
    #[serde(default = "default_true")]
    pub collapse_consecutive: bool,
    #[serde(default)]
    pub date_order: DateOrder,
    #[serde(default = "default_error_marker")]
    pub error_marker: String,
    #[serde(default = "default_tolerance")]
    pub optimizer_tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub optimizer_max_iterations: usize,
    /// Replaces a zero standard deviation
    #[serde(default = "default_std_floor")]
    pub std_floor: f64,
    #[serde(default)]
    pub layout: LayoutKind,
    #[serde(default = "default_layout_scale")]
    pub layout_scale: f64,
    /// Only used by the random layout
    #[serde(default = "default_layout_seed")]
    pub layout_seed: u64,
    #[serde(default = "default_edge_segments")]
    pub edge_segments: usize,
    /// Normalization whose incoming weight sizes the nodes
    #[serde(default)]
    pub size_by: Normalization,
    #[serde(default = "default_unselected_opacity")]
    pub unselected_opacity: f64,
}

fn default_header_lines() -> usize {
    ParseOptions::default().header_lines
}

fn default_true() -> bool {
    true
}

fn default_error_marker() -> String {
    ParseOptions::default().error_marker
}

fn default_tolerance() -> f64 {
    FitOptions::default().tolerance
}

fn default_max_iterations() -> usize {
    FitOptions::default().max_iterations
}

fn default_std_floor() -> f64 {
    FitOptions::default().std_floor
}

fn default_layout_scale() -> f64 {
    1.0
}

fn default_layout_seed() -> u64 {
    42
}

fn default_edge_segments() -> usize {
    DrawOptions::default().edge_segments
}

fn default_unselected_opacity() -> f64 {
    DrawOptions::default().unselected_opacity
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            header_lines: default_header_lines(),
            collapse_consecutive: true,
            date_order: DateOrder::Auto,
            error_marker: default_error_marker(),
            optimizer_tolerance: default_tolerance(),
            optimizer_max_iterations: default_max_iterations(),
            std_floor: default_std_floor(),
            layout: LayoutKind::Circular,
            layout_scale: default_layout_scale(),
            layout_seed: default_layout_seed(),
            edge_segments: default_edge_segments(),
            size_by: Normalization::Count,
            unselected_opacity: default_unselected_opacity(),
        }
    }
}

impl Settings {
    pub const KEYS: [&'static str; 13] = [
        "header_lines",
        "collapse_consecutive",
        "date_order",
        "error_marker",
        "optimizer_tolerance",
        "optimizer_max_iterations",
        "std_floor",
        "layout",
        "layout_scale",
        "layout_seed",
        "edge_segments",
        "size_by",
        "unselected_opacity",
    ];

    /// Load settings from disk or fall back to defaults
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Settings::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("[Settings] Ignoring malformed {}: {}", path.display(), e);
                Settings::default()
            }),
            Err(e) => {
                warn!("[Settings] Could not read {}: {}", path.display(), e);
                Settings::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ChatNetError::Settings(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ChatNetError::Io { path: parent.to_path_buf(), source: e })?;
        }

        fs::write(path, content).map_err(|e| ChatNetError::Io { path: path.to_path_buf(), source: e })
    }

    /// Assign one field from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn parsed<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| ChatNetError::Settings(format!("invalid value for {}: {:?}", key, value)))
        }

        match key {
            "header_lines" => self.header_lines = parsed(key, value)?,
            "collapse_consecutive" => self.collapse_consecutive = parsed(key, value)?,
            "date_order" => {
                self.date_order = DateOrder::from_str(value.trim())
                    .ok_or_else(|| ChatNetError::Settings(format!("unknown date order: {}", value)))?
            }
            "error_marker" => self.error_marker = value.to_string(),
            "optimizer_tolerance" => self.optimizer_tolerance = positive(key, parsed(key, value)?)?,
            "optimizer_max_iterations" => self.optimizer_max_iterations = parsed(key, value)?,
            "std_floor" => self.std_floor = positive(key, parsed(key, value)?)?,
            "layout" => {
                self.layout = LayoutKind::from_str(value.trim())
                    .ok_or_else(|| ChatNetError::Settings(format!("unknown layout: {}", value)))?
            }
            "layout_scale" => self.layout_scale = positive(key, parsed(key, value)?)?,
            "layout_seed" => self.layout_seed = parsed(key, value)?,
            "edge_segments" => {
                let segments: usize = parsed(key, value)?;
                if segments == 0 {
                    return Err(ChatNetError::Settings("edge_segments must be at least 1".into()));
                }
                self.edge_segments = segments;
            }
            "size_by" => self.size_by = Normalization::parse(value.trim())?,
            "unselected_opacity" => {
                let opacity: f64 = parsed(key, value)?;
                if !(0.0..=1.0).contains(&opacity) {
                    return Err(ChatNetError::Settings("unselected_opacity must be within [0, 1]".into()));
                }
                self.unselected_opacity = opacity;
            }
            _ => return Err(ChatNetError::Settings(format!("unknown setting: {}", key))),
        }
        Ok(())
    }
}

fn positive(key: &str, value: f64) -> Result<f64> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ChatNetError::Settings(format!("{} must be positive", key)))
    }
}

/// Default config directory: `<platform config dir>/chatnet`
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chatnet"))
}

/// Initialize settings from a config directory
pub fn init(config_dir: PathBuf) {
    let config_path = config_dir.join(SETTINGS_FILE);
    let settings = Settings::load(&config_path);
    debug!("[Settings] Loaded from {}", config_path.display());

    if let Ok(mut guard) = CONFIG_PATH.write() {
        *guard = Some(config_path);
    }
    if let Ok(mut guard) = SETTINGS.write() {
        *guard = Some(settings);
    }
}

/// Path of the settings file, once initialized
pub fn config_path() -> Option<PathBuf> {
    CONFIG_PATH.read().ok()?.clone()
}

/// Current settings (defaults before init)
pub fn get() -> Settings {
    SETTINGS
        .read()
        .ok()
        .and_then(|guard| guard.clone())
        .unwrap_or_default()
}

/// Set one field and save to disk
pub fn set_value(key: &str, value: &str) -> Result<()> {
    let mut settings_guard = SETTINGS
        .write()
        .map_err(|_| ChatNetError::Settings("Failed to acquire settings lock".into()))?;

    let mut updated = settings_guard.clone().unwrap_or_default();
    updated.set(key, value)?;

    let config_path = config_path().ok_or_else(|| ChatNetError::Settings("Settings not initialized".into()))?;
    updated.save(&config_path)?;

    *settings_guard = Some(updated);
    debug!("[Settings] {} = {}", key, value);
    Ok(())
}

// ==================== Option structs ====================

/// Parser options. `CHATNET_HEADER_LINES` takes precedence over the stored value.
pub fn parse_options(settings: &Settings) -> ParseOptions {
    let header_lines = std::env::var(HEADER_LINES_ENV)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(settings.header_lines);

    ParseOptions {
        header_lines,
        collapse_consecutive: settings.collapse_consecutive,
        date_order: settings.date_order,
        error_marker: settings.error_marker.clone(),
    }
}

pub fn fit_options(settings: &Settings) -> FitOptions {
    FitOptions {
        tolerance: settings.optimizer_tolerance,
        max_iterations: settings.optimizer_max_iterations,
        std_floor: settings.std_floor,
    }
}

pub fn draw_options(settings: &Settings) -> DrawOptions {
    DrawOptions {
        layout: settings.layout,
        layout_scale: settings.layout_scale,
        layout_seed: settings.layout_seed,
        edge_segments: settings.edge_segments,
        size_by: settings.size_by,
        unselected_opacity: settings.unselected_opacity,
        fit: fit_options(settings),
    }
}
