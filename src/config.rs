use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use std::{fs, path::{Path, PathBuf}};
use std::time::Duration;
use thiserror::Error;

use crate::control::DEFAULT_PORT;
use crate::kiosk::DEFAULT_PLUGINS;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(40);
pub const MIN_RENDER_INTERVAL: Duration = Duration::from_millis(1);
pub const MAX_RENDER_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_CLEAR_COLOUR: [u8; 4] = [0, 0, 0, 255];

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub log_level: Option<String>,              // e.g., "info" | "debug"
    pub render_interval_secs: Option<f64>,

    /// logical plugin names, loaded in order
    pub plugins: Option<Vec<String>>,
    /// directories searched after the working directory; overrides PROP_PLUGIN_PATH
    pub plugin_path: Option<Vec<PathBuf>>,

    pub control: Option<ControlConfig>,
    pub surface: Option<SurfaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ControlConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SurfaceConfig {
    /// framebuffer node, e.g. /dev/fb0; absent means headless
    pub device: Option<PathBuf>,
    /// headless size; a framebuffer reports its own
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub clear_colour: Option<Vec<u8>>, // [r,g,b] or [r,g,b,a]
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Falls back to the default when the configured value is out of range
    pub fn render_interval(&self) -> Duration {
        self.render_interval_secs
            .and_then(interval_from_secs)
            .unwrap_or(DEFAULT_RENDER_INTERVAL)
    }

    pub fn plugins(&self) -> Vec<String> {
        match &self.plugins {
            Some(plugins) => plugins.clone(),
            None => DEFAULT_PLUGINS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn bind_address(&self) -> String {
        let control = self.control.as_ref();
        let bind = control.and_then(|c| c.bind.as_deref()).unwrap_or(DEFAULT_BIND);
        let port = control.and_then(|c| c.port).unwrap_or(DEFAULT_PORT);
        format!("{}:{}", bind, port)
    }

    pub fn device(&self) -> Option<&Path> {
        self.surface.as_ref().and_then(|s| s.device.as_deref())
    }

    pub fn size(&self) -> (u32, u32) {
        let surface = self.surface.as_ref();
        (
            surface.and_then(|s| s.width).unwrap_or(DEFAULT_WIDTH),
            surface.and_then(|s| s.height).unwrap_or(DEFAULT_HEIGHT),
        )
    }

    pub fn clear_colour(&self) -> [u8; 4] {
        match self.surface.as_ref().and_then(|s| s.clear_colour.as_deref()) {
            Some(&[r, g, b]) => [r, g, b, 255],
            Some(&[r, g, b, a]) => [r, g, b, a],
            _ => DEFAULT_CLEAR_COLOUR,
        }
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "kioskd", about = "kioskd - plugin driven kiosk display", version)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// shorthand for --log-level debug
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub log_level: Option<String>,
    /// control plane TCP port
    #[arg(short, long)]
    pub port: Option<u16>,
    /// seconds between frames
    #[arg(short = 'i', long)]
    pub render_interval: Option<f64>,
    /// plugin search directory, may be repeated
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub plugin_path: Vec<PathBuf>,
    /// framebuffer device, e.g. /dev/fb0
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub device: Option<PathBuf>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_with(&cli)?;

    if cli.dump_config {
        // effective config after every layer
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Layer defaults, YAML and the given CLI, then validate.
pub fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/kioskd/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/kioskd/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/kioskd.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["kioskd.yaml", "config/kioskd.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    // an empty file is an empty config
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = serde_yaml::from_str(s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()            { dst.log_level = src.log_level; }
    if src.render_interval_secs.is_some() { dst.render_interval_secs = src.render_interval_secs; }
    if src.plugins.is_some()              { dst.plugins = src.plugins; }
    if src.plugin_path.is_some()          { dst.plugin_path = src.plugin_path; }
    // control
    match (&mut dst.control, src.control) {
        (None, Some(c)) => dst.control = Some(c),
        (Some(d), Some(s)) => merge_control(d, s),
        _ => {}
    }
    // surface
    match (&mut dst.surface, src.surface) {
        (None, Some(c)) => dst.surface = Some(c),
        (Some(d), Some(s)) => merge_surface(d, s),
        _ => {}
    }
}

fn merge_control(dst: &mut ControlConfig, src: ControlConfig) {
    if src.bind.is_some() { dst.bind = src.bind; }
    if src.port.is_some() { dst.port = src.port; }
}

fn merge_surface(dst: &mut SurfaceConfig, src: SurfaceConfig) {
    if src.device.is_some()       { dst.device = src.device; }
    if src.width.is_some()        { dst.width = src.width; }
    if src.height.is_some()       { dst.height = src.height; }
    if src.clear_colour.is_some() { dst.clear_colour = src.clear_colour; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.debug {
        cfg.log_level = Some("debug".into());
    } else if cli.log_level.is_some() {
        cfg.log_level = cli.log_level.clone();
    }
    if cli.render_interval.is_some() { cfg.render_interval_secs = cli.render_interval; }
    if !cli.plugin_path.is_empty()   { cfg.plugin_path = Some(cli.plugin_path.clone()); }

    if cli.port.is_some() {
        cfg.control.get_or_insert_with(ControlConfig::default).port = cli.port;
    }

    let any_surface = cli.device.is_some() || cli.width.is_some() || cli.height.is_some();
    if any_surface && cfg.surface.is_none() {
        cfg.surface = Some(SurfaceConfig::default());
    }
    if let Some(surface) = cfg.surface.as_mut() {
        if cli.device.is_some() { surface.device = cli.device.clone(); }
        if cli.width.is_some()  { surface.width = cli.width; }
        if cli.height.is_some() { surface.height = cli.height; }
    }
}

/// A frame period tokio can tick on, or `None` when out of range
fn interval_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| (MIN_RENDER_INTERVAL..=MAX_RENDER_INTERVAL).contains(d))
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(secs) = cfg.render_interval_secs {
        if interval_from_secs(secs).is_none() {
            return Err(ConfigError::Validation(format!(
                "render_interval_secs must be between {} and {}, got {}",
                MIN_RENDER_INTERVAL.as_secs_f64(),
                MAX_RENDER_INTERVAL.as_secs_f64(),
                secs
            )));
        }
    }
    if let Some(surface) = cfg.surface.as_ref() {
        if surface.width == Some(0) || surface.height == Some(0) {
            return Err(ConfigError::Validation("surface width/height must be > 0".into()));
        }
        if let Some(colour) = surface.clear_colour.as_ref() {
            if !matches!(colour.len(), 3 | 4) {
                return Err(ConfigError::Validation("surface clear_colour must be [r,g,b] or [r,g,b,a]".into()));
            }
        }
    }
    if let Some(plugins) = cfg.plugins.as_ref() {
        if plugins.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Validation("plugin names must not be empty".into()));
        }
    }
    Ok(())
}
