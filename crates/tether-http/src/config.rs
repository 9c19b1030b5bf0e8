//! tether.toml client configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub xhr: XhrConfig,
    pub jsonp: JsonpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XhrConfig {
    /// `Accept` header sent when the request has none.
    pub default_accept: String,
    /// Strip a leading `)]}'` guard from text bodies.
    pub strip_xssi_prefix: bool,
    pub quirks: XhrQuirks,
}

impl Default for XhrConfig {
    fn default() -> Self {
        Self {
            default_accept: "application/json, text/plain, */*".to_string(),
            strip_xssi_prefix: true,
            quirks: XhrQuirks::default(),
        }
    }
}

/// Status normalisations applied to completed transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XhrQuirks {
    /// Report status 1223 as 204.
    pub remap_status_1223: bool,
    /// Report status 0 as 200 when a body arrived.
    pub promote_status_zero: bool,
}

impl Default for XhrQuirks {
    fn default() -> Self {
        Self {
            remap_status_1223: true,
            promote_status_zero: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonpConfig {
    pub callback_prefix: String,
    /// Token in the url replaced by the generated callback name.
    pub placeholder: String,
}

impl Default for JsonpConfig {
    fn default() -> Self {
        Self {
            callback_prefix: "tether_jsonp_callback_".to_string(),
            placeholder: "JSONP_CALLBACK".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.xhr.default_accept, "application/json, text/plain, */*");
        assert!(config.xhr.quirks.remap_status_1223);
        assert_eq!(config.jsonp.placeholder, "JSONP_CALLBACK");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
[xhr.quirks]
promote_status_zero = false

[jsonp]
callback_prefix = "cb_"
"#,
        )
        .unwrap();
        assert!(!config.xhr.quirks.promote_status_zero);
        assert!(config.xhr.quirks.remap_status_1223);
        assert!(config.xhr.strip_xssi_prefix);
        assert_eq!(config.jsonp.callback_prefix, "cb_");
        assert_eq!(config.jsonp.placeholder, "JSONP_CALLBACK");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[xhr]\ndefault_accept = \"text/plain\"").unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.xhr.default_accept, "text/plain");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ClientConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("strip_xssi_prefix"));
        assert_eq!(ClientConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn rejects_bad_types() {
        assert!(ClientConfig::from_toml_str("[xhr]\nstrip_xssi_prefix = \"yes\"").is_err());
    }
}
