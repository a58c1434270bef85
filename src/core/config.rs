//! Configuration module for the scanner tool
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Windows: %APPDATA%\scanner_cli_tool\config.toml
//! - Linux: ~/.config/scanner_cli_tool/config.toml
//! - macOS: ~/Library/Application Support/scanner_cli_tool/config.toml
//!
//! The file is the persistent layer; [`ScanConfiguration`] is the immutable
//! per-run view built from it after command-line overrides are applied.

use crate::device::traits::{FilmType, LightPath, PixelType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application name used for config directory
const APP_NAME: &str = "scanner_cli_tool";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Get the standard configuration directory for the application.
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Ensure the configuration directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let config_dir = get_config_dir().ok_or(ConfigError::ConfigDirNotFound)?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .map_err(|e| ConfigError::WriteError(config_dir.clone(), e.to_string()))?;
    }

    Ok(config_dir)
}

/// Initialize the configuration file if it doesn't exist.
///
/// Creates the config directory and writes the default config template.
/// Returns the path to the config file.
pub fn init_config() -> Result<PathBuf, ConfigError> {
    let config_dir = ensure_config_dir()?;
    let config_path = config_dir.join(CONFIG_FILE_NAME);

    if !config_path.exists() {
        fs::write(&config_path, Config::generate_default_config())
            .map_err(|e| ConfigError::WriteError(config_path.clone(), e.to_string()))?;
    }

    Ok(config_path)
}

/// Open the configuration file in the default application.
pub fn open_config_in_editor() -> Result<PathBuf, ConfigError> {
    let config_path = init_config()?;

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", config_path.to_str().unwrap_or("")])
            .spawn()
            .map_err(|e| ConfigError::OpenError(config_path.clone(), e.to_string()))?;
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(&config_path)
            .spawn()
            .map_err(|e| ConfigError::OpenError(config_path.clone(), e.to_string()))?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(&config_path)
            .spawn()
            .map_err(|e| ConfigError::OpenError(config_path.clone(), e.to_string()))?;
    }

    Ok(config_path)
}

/// Requested color mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// 1-bit black and white
    #[serde(alias = "bw", alias = "blackandwhite", alias = "1bit")]
    #[value(name = "bw", aliases = ["blackandwhite", "1bit", "monochrome"])]
    Monochrome,
    /// 8-bit gray
    #[serde(alias = "gray")]
    #[value(name = "gray", aliases = ["grayscale"])]
    Grayscale,
    /// 24-bit RGB
    #[serde(alias = "rgb")]
    #[value(name = "color", aliases = ["rgb"])]
    Color,
}

impl ColorMode {
    /// Pixel type the scanner is asked for
    pub fn pixel_type(&self) -> PixelType {
        match self {
            ColorMode::Monochrome => PixelType::BlackWhite,
            ColorMode::Grayscale => PixelType::Gray,
            ColorMode::Color => PixelType::Rgb,
        }
    }
}

/// Paper path / film holder to scan from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Automatic document feeder
    Feeder,
    /// Flatbed glass, reflected light
    #[serde(alias = "reflected", alias = "reflective")]
    #[value(aliases = ["reflected", "reflective"])]
    Flatbed,
    /// Positive film (slides), transmitted light
    Positive,
    /// Negative film, transmitted light
    Negative,
}

impl SourceType {
    pub fn uses_feeder(&self) -> bool {
        matches!(self, SourceType::Feeder)
    }

    /// Light path for this source, `None` for the feeder
    pub fn light_path(&self) -> Option<LightPath> {
        match self {
            SourceType::Feeder => None,
            SourceType::Flatbed => Some(LightPath::Reflective),
            SourceType::Positive | SourceType::Negative => Some(LightPath::Transmissive),
        }
    }

    /// Film type for film sources
    pub fn film_type(&self) -> Option<FilmType> {
        match self {
            SourceType::Positive => Some(FilmType::Positive),
            SourceType::Negative => Some(FilmType::Negative),
            _ => None,
        }
    }
}

/// When the duplex capability is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplexPolicy {
    /// Enable duplex when requested, otherwise leave the device default
    #[default]
    OnlyWhenRequested,
    /// Always write duplex, on or off
    Explicit,
}

/// Encoding used for pages received as raw buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output settings
    pub output: OutputConfig,

    /// Scanner selection
    pub device: DeviceConfig,

    /// Scan parameters
    pub scan: ScanSettings,

    /// Cancellation trigger settings
    pub cancellation: CancellationConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Output directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory scanned pages are written to (created if absent)
    pub directory: PathBuf,

    /// Encoding for pages received as raw buffers
    pub format: OutputFormat,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    /// File name prefix, followed by timestamp and sequence number
    pub file_prefix: String,
}

/// Scanner selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Case-insensitive substring of the scanner name
    pub name_filter: Option<String>,

    /// Simulated scanner scenario backing the device subsystem
    pub scenario: String,
}

/// Scan area, in millimeters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaConfig {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Scan parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Resolution in DPI, 0 keeps the device default
    pub resolution: u32,

    /// Color mode, unset keeps the device default
    pub color_mode: Option<ColorMode>,

    /// Source type
    pub source: Option<SourceType>,

    /// Request duplex scanning
    pub duplex: bool,

    /// When the duplex capability is written
    pub duplex_policy: DuplexPolicy,

    /// Show the driver's own dialog instead of negotiating
    pub show_ui: bool,

    /// Scan area; ignored unless width and height are both positive
    pub area: AreaConfig,
}

/// Cancellation trigger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationConfig {
    /// Name of the file whose creation cancels the scan
    pub trigger_name: String,

    /// Directory watched for the trigger (default: system temp dir)
    pub watch_dir: Option<PathBuf>,

    /// Delete the trigger file when the monitor stops
    pub remove_trigger_on_stop: bool,

    /// Treat Ctrl+C as a cancellation request
    pub handle_ctrl_c: bool,
}

impl CancellationConfig {
    /// Directory actually watched
    pub fn effective_watch_dir(&self) -> PathBuf {
        self.watch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Also write logs to a file
    pub log_to_file: bool,

    /// Log file path
    pub log_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./scans"),
            format: OutputFormat::Jpeg,
            jpeg_quality: 90,
            file_prefix: "scan".to_string(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name_filter: None,
            scenario: "flatbed".to_string(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            resolution: 200,
            color_mode: Some(ColorMode::Color),
            source: Some(SourceType::Flatbed),
            duplex: false,
            duplex_policy: DuplexPolicy::OnlyWhenRequested,
            show_ui: false,
            area: AreaConfig::default(),
        }
    }
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            trigger_name: "cancel".to_string(),
            watch_dir: None,
            remove_trigger_on_stop: true,
            handle_ctrl_c: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("./scanner_cli.log"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./scanner_cli.toml (current directory, for per-project overrides)
    /// 2. Standard config location
    ///
    /// If no config file is found, returns default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        let local = PathBuf::from("./scanner_cli.toml");
        if local.exists() {
            return Self::load(&local);
        }

        if let Some(config_path) = get_config_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        Ok(Self::default())
    }

    /// Path of the config file in use (or the standard location if none exists)
    pub fn get_active_config_path() -> PathBuf {
        let local = PathBuf::from("./scanner_cli.toml");
        if local.exists() {
            return local;
        }

        get_config_path().unwrap_or_else(|| PathBuf::from("./scanner_cli.toml"))
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path.as_ref(), content)
            .map_err(|e| ConfigError::WriteError(path.as_ref().to_path_buf(), e.to_string()))?;

        Ok(())
    }

    /// Generate a default config file with comments
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }

    /// Build the immutable configuration for one scan run
    pub fn scan_configuration(&self) -> ScanConfiguration {
        let area = &self.scan.area;
        ScanConfiguration {
            output_dir: self.output.directory.clone(),
            output_format: self.output.format,
            jpeg_quality: self.output.jpeg_quality.clamp(1, 100),
            file_prefix: self.output.file_prefix.clone(),
            device_selector: self
                .device
                .name_filter
                .clone()
                .filter(|s| !s.trim().is_empty()),
            resolution: self.scan.resolution,
            color_mode: self.scan.color_mode,
            source: self.scan.source,
            duplex: self.scan.duplex,
            duplex_policy: self.scan.duplex_policy,
            area: ScanArea::new(area.left, area.top, area.width, area.height),
            show_ui: self.scan.show_ui,
            trigger_name: self.cancellation.trigger_name.clone(),
            watch_dir: self.cancellation.effective_watch_dir(),
            remove_trigger_on_stop: self.cancellation.remove_trigger_on_stop,
        }
    }
}

/// Scan rectangle given as offset plus size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanArea {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ScanArea {
    /// `None` unless both width and height are strictly positive
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Option<Self> {
        (width > 0.0 && height > 0.0).then_some(Self {
            left,
            top,
            width,
            height,
        })
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// Immutable configuration of one scan run
#[derive(Debug, Clone)]
pub struct ScanConfiguration {
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,
    pub file_prefix: String,
    pub device_selector: Option<String>,
    pub resolution: u32,
    pub color_mode: Option<ColorMode>,
    pub source: Option<SourceType>,
    pub duplex: bool,
    pub duplex_policy: DuplexPolicy,
    pub area: Option<ScanArea>,
    pub show_ui: bool,
    pub trigger_name: String,
    pub watch_dir: PathBuf,
    pub remove_trigger_on_stop: bool,
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        Config::default().scan_configuration()
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path
    FileNotFound(PathBuf),
    /// Failed to read the configuration file
    ReadError(PathBuf, String),
    /// Failed to parse the configuration file (invalid TOML)
    ParseError(PathBuf, String),
    /// Failed to serialize configuration to TOML
    SerializeError(String),
    /// Failed to write configuration file
    WriteError(PathBuf, String),
    /// Could not determine config directory
    ConfigDirNotFound,
    /// Failed to open config file in editor
    OpenError(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ReadError(path, err) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), err)
            }
            ConfigError::ParseError(path, err) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), err)
            }
            ConfigError::SerializeError(err) => {
                write!(f, "Failed to serialize configuration: {}", err)
            }
            ConfigError::WriteError(path, err) => {
                write!(f, "Failed to write config file '{}': {}", path.display(), err)
            }
            ConfigError::ConfigDirNotFound => {
                write!(f, "Could not determine configuration directory")
            }
            ConfigError::OpenError(path, err) => {
                write!(f, "Failed to open config file '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_follow_cli_defaults() {
        let config = Config::default();
        assert_eq!(config.scan.resolution, 200);
        assert_eq!(config.scan.color_mode, Some(ColorMode::Color));
        assert_eq!(config.scan.source, Some(SourceType::Flatbed));
        assert_eq!(config.scan.duplex_policy, DuplexPolicy::OnlyWhenRequested);
        assert_eq!(config.cancellation.trigger_name, "cancel");
        assert_eq!(config.output.format, OutputFormat::Jpeg);
    }

    #[test]
    fn test_scan_area_requires_both_dimensions() {
        assert!(ScanArea::new(0.0, 0.0, 210.0, 297.0).is_some());
        assert!(ScanArea::new(10.0, 10.0, 210.0, 0.0).is_none());
        assert!(ScanArea::new(10.0, 10.0, 0.0, 297.0).is_none());
        assert!(ScanArea::new(0.0, 0.0, -5.0, 297.0).is_none());

        let area = ScanArea::new(10.0, 20.0, 100.0, 50.0).unwrap();
        assert_eq!(area.right(), 110.0);
        assert_eq!(area.bottom(), 70.0);
    }

    #[test]
    fn test_scan_configuration_from_config() {
        let mut config = Config::default();
        config.device.name_filter = Some("   ".to_string());
        config.scan.area = AreaConfig {
            left: 5.0,
            top: 5.0,
            width: 100.0,
            height: 0.0,
        };
        config.output.jpeg_quality = 0;

        let scan = config.scan_configuration();
        assert!(scan.device_selector.is_none());
        assert!(scan.area.is_none());
        assert_eq!(scan.jpeg_quality, 1);
        assert_eq!(scan.trigger_name, "cancel");
    }

    #[test]
    fn test_source_type_mapping() {
        assert!(SourceType::Feeder.uses_feeder());
        assert_eq!(SourceType::Feeder.light_path(), None);
        assert_eq!(
            SourceType::Flatbed.light_path(),
            Some(LightPath::Reflective)
        );
        assert_eq!(
            SourceType::Negative.light_path(),
            Some(LightPath::Transmissive)
        );
        assert_eq!(SourceType::Negative.film_type(), Some(FilmType::Negative));
        assert_eq!(SourceType::Positive.film_type(), Some(FilmType::Positive));
        assert_eq!(SourceType::Flatbed.film_type(), None);
    }

    #[test]
    fn test_parse_aliases_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [scan]
            color_mode = "bw"
            source = "reflected"
            duplex_policy = "explicit"

            [scan.area]
            width = 210.0
            height = 297.0
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.color_mode, Some(ColorMode::Monochrome));
        assert_eq!(config.scan.source, Some(SourceType::Flatbed));
        assert_eq!(config.scan.duplex_policy, DuplexPolicy::Explicit);
        assert!(config.scan_configuration().area.is_some());
        // untouched sections keep their defaults
        assert_eq!(config.scan.resolution, 200);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.scan.resolution = 600;
        config.device.name_filter = Some("epson".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.scan.resolution, 600);
        assert_eq!(loaded.device.name_filter.as_deref(), Some("epson"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(temp.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(&Config::generate_default_config()).unwrap();
        assert_eq!(config.cancellation.trigger_name, "cancel");
    }
}
