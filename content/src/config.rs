//! Serializer configuration loaded from the `[content]` table of a TOML file.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// How the writer emits type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStyle {
    /// Long-form type name.
    #[default]
    Name,
    /// Short numeric id when the type has one, long-form name otherwise.
    ShortId,
}

/// What to do with identifier references that never resolve.
///
/// Either way the field stays at its default value and reading succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    Ignore,
    /// Log a warning and record a diagnostic.
    #[default]
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub tag_style: TagStyle,
    /// Pretty-print documents when encoding with [`Format::from_config`](crate::Format::from_config).
    pub pretty: bool,
    pub unresolved_references: UnresolvedPolicy,
    /// Maximum object nesting depth for reading and writing.
    pub max_depth: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            tag_style: TagStyle::Name,
            pretty: true,
            unresolved_references: UnresolvedPolicy::Warn,
            max_depth: 256,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    content: ContentConfig,
}

impl ContentConfig {
    /// Parse the `[content]` table of a TOML document. Missing keys keep
    /// their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<ConfigFile>(text).map(|file| file.content)
    }
}

/// Load a config from a TOML file.
pub fn load_config(path: &Path) -> Result<ContentConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    let config = ContentConfig::from_toml(&text).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })?;
    log::info!("Loaded content config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(ContentConfig::from_toml("").unwrap(), ContentConfig::default());
    }

    #[test]
    fn parses_content_table() {
        let config = ContentConfig::from_toml(
            r#"
            [project]
            name = "demo"

            [content]
            tag_style = "short_id"
            unresolved_references = "ignore"
            max_depth = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.tag_style, TagStyle::ShortId);
        assert_eq!(config.unresolved_references, UnresolvedPolicy::Ignore);
        assert_eq!(config.max_depth, 16);
        assert!(config.pretty);
    }

    #[test]
    fn rejects_unknown_variant() {
        assert!(ContentConfig::from_toml("[content]\ntag_style = \"guid\"").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/content.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
