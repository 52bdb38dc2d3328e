//! Editor configuration.
//!
//! Every field has a default, so a partial JSON object (or `{}`) is a valid
//! configuration:
//!
//! ```
//! use md_surface::config::EditorConfig;
//! use md_surface::format::ContentFormat;
//!
//! let config = EditorConfig::from_json(r#"{ "format": "html", "preset": "full" }"#).unwrap();
//! assert_eq!(config.format, ContentFormat::Html);
//! assert!(config.plugin_config().is_enabled("slash-commands"));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::{ContentFormat, ExternalValue};
use crate::plugin::{PluginConfig, PluginOverrides, Preset, PresetOrConfig, resolve};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid editor config: {0}")]
    Json(String),
    #[error("namespace must not be empty")]
    EmptyNamespace,
    #[error("history depth must be at least 1")]
    ZeroHistoryDepth,
    #[error("slash trigger must be a visible character, got {0:?}")]
    InvalidTrigger(char),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub namespace: String,
    pub format: ContentFormat,
    pub preset: Preset,
    /// Per-plugin switches keyed by plugin id; they win over the preset.
    pub plugins: PluginOverrides,
    pub editable: bool,
    pub initial_content: Option<ExternalValue>,
    pub history_depth: usize,
    pub slash_trigger: char,
    pub overlay: OverlayConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            namespace: "md-surface".to_string(),
            format: ContentFormat::Markdown,
            preset: Preset::Standard,
            plugins: PluginOverrides::default(),
            editable: true,
            initial_content: None,
            history_depth: 100,
            slash_trigger: '/',
            overlay: OverlayConfig::default(),
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|err| ConfigError::Json(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.history_depth == 0 {
            return Err(ConfigError::ZeroHistoryDepth);
        }
        if self.slash_trigger.is_whitespace() || self.slash_trigger.is_control() {
            return Err(ConfigError::InvalidTrigger(self.slash_trigger));
        }
        Ok(())
    }

    pub fn plugin_config(&self) -> PluginConfig {
        resolve(&PresetOrConfig::Custom {
            preset: self.preset,
            overrides: self.plugins.clone(),
        })
    }

    pub fn with_format(mut self, format: ContentFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_plugin(mut self, id: impl Into<String>, enabled: bool) -> Self {
        self.plugins = self.plugins.set(id, enabled);
        self
    }

    pub fn with_initial_content(mut self, value: impl Into<ExternalValue>) -> Self {
        self.initial_content = Some(value.into());
        self
    }
}

/// Overlay timing and placement, in milliseconds and pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Delay before the block handle hides after the pointer leaves.
    pub handle_hide_delay_ms: u64,
    /// Delay before a deferred hide is re-checked once a menu closes.
    pub menu_recheck_delay_ms: u64,
    pub toolbar_gap: f32,
    pub toolbar_height: f32,
    /// Horizontal distance of the block handle left of its block.
    pub handle_offset: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            handle_hide_delay_ms: 300,
            menu_recheck_delay_ms: 100,
            toolbar_gap: 8.0,
            toolbar_height: 40.0,
            handle_offset: 28.0,
        }
    }
}

impl OverlayConfig {
    pub fn handle_hide_delay(&self) -> Duration {
        Duration::from_millis(self.handle_hide_delay_ms)
    }

    pub fn menu_recheck_delay(&self) -> Duration {
        Duration::from_millis(self.menu_recheck_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{TABLE, SLASH_COMMANDS};

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(EditorConfig::from_json("{}").unwrap(), EditorConfig::default());
    }

    #[test]
    fn test_overrides_and_nested_defaults() {
        let config = EditorConfig::from_json(
            r##"{
                "plugins": { "table": false, "slash-commands": true },
                "overlay": { "handle_hide_delay_ms": 50 },
                "initial_content": "# hi"
            }"##,
        )
        .unwrap();
        let plugins = config.plugin_config();
        assert!(!plugins.is_enabled(TABLE));
        assert!(plugins.is_enabled(SLASH_COMMANDS));
        assert_eq!(config.overlay.handle_hide_delay(), Duration::from_millis(50));
        assert_eq!(config.overlay.toolbar_gap, 8.0);
        assert_eq!(config.initial_content, Some(ExternalValue::from("# hi")));
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            EditorConfig::from_json(r#"{ "namespace": "" }"#).unwrap_err(),
            ConfigError::EmptyNamespace
        );
        assert_eq!(
            EditorConfig::from_json(r#"{ "history_depth": 0 }"#).unwrap_err(),
            ConfigError::ZeroHistoryDepth
        );
        assert!(matches!(
            EditorConfig::from_json(r#"{ "format": "rtf" }"#).unwrap_err(),
            ConfigError::Json(_)
        ));
    }
}
