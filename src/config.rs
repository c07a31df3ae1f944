//! Engine configuration, loaded from JSON. Every field has a default, so an
//! empty object (or no file at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid engine config: {0}")]
    Invalid(String),
    #[error("failed to read engine config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Column appended by Calculation nodes.
    pub result_column: String,
    /// Reserved identifier that names the incoming table in expressions (`df["a"]`).
    pub frame_identifier: String,
    pub csv: CsvOptions,
    pub codegen: CodegenOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            result_column: "Result".to_string(),
            frame_identifier: "df".to_string(),
            csv: CsvOptions::default(),
            codegen: CodegenOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.result_column.trim().is_empty() {
            return Err(ConfigError::Invalid("result_column must not be empty".into()));
        }
        if !is_identifier(&self.frame_identifier) {
            return Err(ConfigError::Invalid(format!(
                "frame_identifier '{}' is not a valid identifier",
                self.frame_identifier
            )));
        }
        if let Some(d) = self.csv.delimiter {
            if !d.is_ascii() || d == '"' || d == '\n' || d == '\r' {
                return Err(ConfigError::Invalid(format!("unsupported csv delimiter {d:?}")));
            }
        }
        if self.codegen.max_in_flight == 0 {
            return Err(ConfigError::Invalid("codegen.max_in_flight must be at least 1".into()));
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// How Input nodes parse their source files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsvOptions {
    /// Field separator. `None` sniffs it from the header line.
    pub delimiter: Option<char>,
    /// Cell texts read as a missing value.
    pub missing_values: Vec<String>,
    /// Strip surrounding whitespace from headers and cells.
    pub trim: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            missing_values: ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"]
                .into_iter()
                .map(String::from)
                .collect(),
            trim: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodegenOptions {
    /// Upper bound on concurrently running code-generation requests.
    pub max_in_flight: usize,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self { max_in_flight: 4 }
    }
}
