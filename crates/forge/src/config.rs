//! Generator options, loaded from TOML and overridable from the environment.

use crate::ForgeError;
use serde::Deserialize;
use std::path::Path;

/// Options that shape the emitted code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Module providing `Duration` and `Timestamp`.
    pub well_known_path: String,
    /// Name of the generated method.
    pub method_name: String,
    /// Banner placed at the top of every generated file.
    pub header: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            well_known_path: "::prost_types".to_string(),
            method_name: "apply_defaults".to_string(),
            header: "// @generated by protodefaults. Do not edit.".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ForgeError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ForgeError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Applies `PROTODEFAULTS_WELL_KNOWN_PATH` and `PROTODEFAULTS_METHOD_NAME`.
    pub fn merge_with_env(&mut self) {
        if let Ok(path) = std::env::var("PROTODEFAULTS_WELL_KNOWN_PATH") {
            self.well_known_path = path;
        }
        if let Ok(name) = std::env::var("PROTODEFAULTS_METHOD_NAME") {
            self.method_name = name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_empty() {
        assert_eq!(GeneratorConfig::from_toml_str("").unwrap(), GeneratorConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = GeneratorConfig::from_toml_str(r#"well_known_path = "crate::wkt""#).unwrap();
        assert_eq!(config.well_known_path, "crate::wkt");
        assert_eq!(config.method_name, "apply_defaults");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = GeneratorConfig::from_toml_str("wellknown = 1").unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }

    #[test]
    fn test_merge_with_env_overrides() {
        std::env::set_var("PROTODEFAULTS_WELL_KNOWN_PATH", "crate::wkt");
        std::env::set_var("PROTODEFAULTS_METHOD_NAME", "fill_defaults");
        let mut config = GeneratorConfig::default();
        config.merge_with_env();
        std::env::remove_var("PROTODEFAULTS_WELL_KNOWN_PATH");
        std::env::remove_var("PROTODEFAULTS_METHOD_NAME");

        assert_eq!(config.well_known_path, "crate::wkt");
        assert_eq!(config.method_name, "fill_defaults");
        assert_eq!(config.header, GeneratorConfig::default().header);

        let mut untouched = GeneratorConfig::default();
        untouched.merge_with_env();
        assert_eq!(untouched, GeneratorConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"method_name = "fill_defaults""#).unwrap();
        let config = GeneratorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.method_name, "fill_defaults");
    }
}
