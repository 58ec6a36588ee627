use std::path::{Path, PathBuf};

use crate::bake::DEFAULT_MAX_DIMENSION;
use crate::error::ConfigError;

/// Engine tunables persisted between sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Undo snapshots kept.
    pub history_limit: usize,
    /// Largest side of any baked raster.
    pub bake_max_dimension: u32,
    /// Panels baked per batch during export.
    pub export_batch_size: usize,
    /// How long a cancelled export may take to stop before it is detached.
    pub export_cancel_timeout_ms: u64,
    pub default_journal: String,
    pub default_dpi: u32,
    pub jpeg_quality: u8,
    /// TIFF uploads above this size go through the converter.
    pub tiff_convert_threshold_bytes: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            history_limit: 30,
            bake_max_dimension: DEFAULT_MAX_DIMENSION,
            export_batch_size: 4,
            export_cancel_timeout_ms: 5000,
            default_journal: "Default".to_string(),
            default_dpi: 600,
            jpeg_quality: 90,
            tiff_convert_threshold_bytes: 20 * 1024 * 1024,
        }
    }
}

impl EngineSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/figcomposer/figcomposer.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\FigComposer\figcomposer.cfg
    /// On macOS:   ~/Library/Application Support/FigComposer/figcomposer.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("figcomposer");
            return Some(config_dir.join("figcomposer.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_default();
            return Some(PathBuf::from(appdata).join("FigComposer").join("figcomposer.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("FigComposer")
                    .join("figcomposer.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("figcomposer.cfg")))
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "history_limit={}\n\
             bake_max_dimension={}\n\
             export_batch_size={}\n\
             export_cancel_timeout_ms={}\n\
             default_journal={}\n\
             default_dpi={}\n\
             jpeg_quality={}\n\
             tiff_convert_threshold_bytes={}\n",
            self.history_limit,
            self.bake_max_dimension,
            self.export_batch_size,
            self.export_cancel_timeout_ms,
            self.default_journal,
            self.default_dpi,
            self.jpeg_quality,
            self.tiff_convert_threshold_bytes,
        )
    }

    /// Parse `key=value` lines. Unknown keys and unparsable values keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "history_limit" => {
                    s.history_limit = val.parse().ok().filter(|&v| v >= 2).unwrap_or(s.history_limit);
                }
                "bake_max_dimension" => {
                    s.bake_max_dimension = val.parse().ok().filter(|&v| v > 0).unwrap_or(s.bake_max_dimension);
                }
                "export_batch_size" => {
                    s.export_batch_size = val.parse().ok().filter(|&v| v > 0).unwrap_or(s.export_batch_size);
                }
                "export_cancel_timeout_ms" => {
                    s.export_cancel_timeout_ms = val.parse().unwrap_or(s.export_cancel_timeout_ms);
                }
                "default_journal" => {
                    if !val.is_empty() {
                        s.default_journal = val.to_string();
                    }
                }
                "default_dpi" => {
                    s.default_dpi = val.parse().map(crate::export::clamp_dpi).unwrap_or(s.default_dpi);
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val.parse().map(crate::export::clamp_quality).unwrap_or(s.jpeg_quality);
                }
                "tiff_convert_threshold_bytes" => {
                    s.tiff_convert_threshold_bytes = val.parse().unwrap_or(s.tiff_convert_threshold_bytes);
                }
                other => {
                    tracing::debug!(key = other, "ignoring unknown settings key");
                }
            }
        }
        s
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io { path: dir.to_path_buf(), source })?;
        }
        std::fs::write(path, self.to_config_string())
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
    }

    /// Load settings from the platform path (defaults if missing or corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path).unwrap_or_else(|e| {
            tracing::warn!("settings unreadable, using defaults: {}", e);
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_overrides_and_ignores_garbage() {
        let s = EngineSettings::parse(
            "# comment\nhistory_limit=50\njpeg_quality=100\ndefault_dpi=20\nexport_batch_size=zero\nnonsense\nmystery=1\n",
        );
        assert_eq!(s.history_limit, 50);
        assert_eq!(s.jpeg_quality, 95);
        assert_eq!(s.default_dpi, 50);
        assert_eq!(s.export_batch_size, 4);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("figcomposer.cfg");
        let mut s = EngineSettings::default();
        s.default_journal = "Nature".into();
        s.export_cancel_timeout_ms = 1234;
        s.save_to(&path).unwrap();
        assert_eq!(EngineSettings::load_from(&path).unwrap(), s);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let s = EngineSettings::load_from(&dir.path().join("absent.cfg")).unwrap();
        assert_eq!(s, EngineSettings::default());
    }
}
