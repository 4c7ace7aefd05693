use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tracing::warn;

use crate::dom::Document;

/// Id of the inline `<script type="application/json">` block a page can use
/// to override settings.
pub const INLINE_CONFIG_ID: &str = "cake-spa-config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to convert config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runtime settings. Field names serialize in camelCase so page-supplied
/// overrides use the same keys as the server-side plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpaConfig {
    pub attribute_prefix: String,
    /// Quiet period for input debouncing, in milliseconds.
    pub debounce_time: u64,
    pub loading_class: String,
    pub updating_class: String,
    /// How long the updating class stays on a patched element, in milliseconds.
    pub update_pulse: u64,
    pub csrf_meta_name: String,
    pub csrf_input_name: String,
    pub csrf_header_name: String,
    pub navigation_header: String,
    pub ajax_header: String,
    pub ajax_header_value: String,
    pub debug: bool,
}

impl Default for SpaConfig {
    fn default() -> Self {
        Self {
            attribute_prefix: "data-spa".to_string(),
            debounce_time: 500,
            loading_class: "spa-loading".to_string(),
            updating_class: "spa-updating".to_string(),
            update_pulse: 300,
            csrf_meta_name: "csrf-token".to_string(),
            csrf_input_name: "_csrfToken".to_string(),
            csrf_header_name: "X-CSRF-Token".to_string(),
            navigation_header: "X-Live-Nav".to_string(),
            ajax_header: "X-Requested-With".to_string(),
            ajax_header_value: "XMLHttpRequest".to_string(),
            debug: false,
        }
    }
}

impl SpaConfig {
    /// Defaults with `overrides` layered on top.
    pub fn resolve(overrides: &JsonValue) -> Self {
        Self::default().merged(overrides)
    }

    /// Returns a copy with every recognised key of `overrides` applied.
    ///
    /// Unknown keys are ignored; a value of the wrong type keeps the current
    /// setting.
    pub fn merged(&self, overrides: &JsonValue) -> Self {
        let overrides = match overrides {
            JsonValue::Object(map) => map,
            JsonValue::Null => return self.clone(),
            other => {
                warn!(target = "cake_spa", overrides = %other, "ignoring non-object config overrides");
                return self.clone();
            }
        };

        let mut merged = match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => map,
            _ => return self.clone(),
        };

        for (key, value) in overrides {
            if !merged.contains_key(key) {
                continue;
            }
            let previous = merged.insert(key.clone(), value.clone());
            if decode(&merged).is_none() {
                warn!(target = "cake_spa", option = %key, value = %value, "ignoring config override with unexpected type");
                if let Some(previous) = previous {
                    merged.insert(key.clone(), previous);
                }
            }
        }

        decode(&merged).unwrap_or_else(|| self.clone())
    }

    /// Loads overrides from a YAML file. A missing path or file yields the
    /// defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let Some(path) = config_path.filter(|path| path.exists()) else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path)?;
        let yaml: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        let overrides = serde_json::to_value(yaml)?;
        Ok(Self::resolve(&overrides))
    }

    /// Overrides embedded in the page, if any.
    pub fn inline_overrides(document: &Document) -> Option<JsonValue> {
        let script = document.query(&format!("script#{INLINE_CONFIG_ID}"))?;
        match serde_json::from_str(&script.text()) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(target = "cake_spa", error = %err, "invalid inline config block");
                None
            }
        }
    }

    pub fn attribute_names(&self) -> AttributeNames {
        AttributeNames::new(&self.attribute_prefix)
    }
}

fn decode(map: &JsonMap<String, JsonValue>) -> Option<SpaConfig> {
    serde_json::from_value(JsonValue::Object(map.clone())).ok()
}

/// The DOM attribute contract, with the configured prefix applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeNames {
    pub action: String,
    pub nav: String,
    pub form: String,
    pub target: String,
    pub loading: String,
    pub push_url: String,
    pub param_prefix: String,
    pub key: String,
    pub model: String,
    pub unsafe_html: String,
    pub class: String,
    pub content: String,
}

impl AttributeNames {
    pub fn new(prefix: &str) -> Self {
        let name = |suffix: &str| format!("{prefix}-{suffix}");
        Self {
            action: name("action"),
            nav: name("nav"),
            form: name("form"),
            target: name("target"),
            loading: name("loading"),
            push_url: name("push-url"),
            param_prefix: name("param-"),
            key: name("key"),
            model: name("model"),
            unsafe_html: name("unsafe-html"),
            class: name("class"),
            content: name("content"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn overrides_win_over_defaults() {
        let config = SpaConfig::resolve(&json!({
            "debounceTime": 250,
            "loadingClass": "busy",
            "debug": true
        }));
        assert_eq!(config.debounce_time, 250);
        assert_eq!(config.loading_class, "busy");
        assert!(config.debug);
        assert_eq!(config.attribute_prefix, "data-spa");
    }

    #[test]
    fn unknown_and_mistyped_keys_are_ignored() {
        let config = SpaConfig::resolve(&json!({
            "nonsense": 1,
            "debounceTime": "fast",
            "updatingClass": "flash"
        }));
        assert_eq!(config.debounce_time, 500);
        assert_eq!(config.updating_class, "flash");
    }

    #[test]
    fn loads_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "attributePrefix: data-live\ncsrfHeaderName: X-Token").unwrap();
        let config = SpaConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.attribute_prefix, "data-live");
        assert_eq!(config.csrf_header_name, "X-Token");
        assert_eq!(SpaConfig::load(None).unwrap(), SpaConfig::default());
    }

    #[test]
    fn reads_inline_block() {
        let document = Document::parse(
            r#"<html><head><script type="application/json" id="cake-spa-config">{"debounceTime": 50}</script></head><body></body></html>"#,
        );
        let overrides = SpaConfig::inline_overrides(&document).unwrap();
        assert_eq!(SpaConfig::resolve(&overrides).debounce_time, 50);
    }

    #[test]
    fn attribute_names_use_prefix() {
        let names = AttributeNames::new("data-live");
        assert_eq!(names.action, "data-live-action");
        assert_eq!(names.push_url, "data-live-push-url");
        assert_eq!(names.param_prefix, "data-live-param-");
    }
}
