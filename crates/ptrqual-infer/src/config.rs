use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Engine options, read from a `ptrqual.toml` file or built in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Do not equate the declarations of one function across files.
    pub separate_multiple_func_decls: bool,
    /// Force arguments passed through `...` to `Wild`.
    pub handle_varargs: bool,
    /// Bodiless functions whose signatures are trusted as checked.
    pub safe_externs: Vec<String>,
    /// Upper bound on solve/reconcile alternations.
    pub max_reconcile_rounds: usize,
    /// Print the analysis settings above the statistics table.
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            separate_multiple_func_decls: false,
            handle_varargs: false,
            safe_externs: vec!["malloc".to_string(), "free".to_string()],
            max_reconcile_rounds: 5,
            verbose: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Options {
    /// Read and parse an options file.
    pub fn from_file(path: &Path) -> Result<Options, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse options from TOML text. Missing keys take their defaults.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Options, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn is_safe_extern(&self, name: &str) -> bool {
        self.safe_externs.iter().any(|s| s == name)
    }
}
