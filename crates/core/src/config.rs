//! Engine configuration
//!
//! Settings shared by the backends, loadable from TOML:
//!
//! ```toml
//! # What insert does when the primary key already exists:
//! # "error", "replace" (default) or "update"
//! conflict = "replace"
//!
//! # How many random primary keys to try before giving up
//! id_attempts = 8
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What `insert` does on a primary-key collision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conflict {
    /// Fail the row
    Error,
    /// Overwrite the stored row
    #[default]
    Replace,
    /// Merge the new fields into the stored row
    Update,
}

/// Per-call insert options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Conflict handling, falls back to the configured default
    pub conflict: Option<Conflict>,
}

impl InsertOptions {
    /// Options with an explicit conflict mode
    pub fn conflict(conflict: Conflict) -> Self {
        Self {
            conflict: Some(conflict),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Default conflict mode for inserts
    #[serde(default)]
    pub conflict: Conflict,
    /// Random primary-key attempts before an insert fails
    #[serde(default = "default_id_attempts")]
    pub id_attempts: u32,
}

fn default_id_attempts() -> u32 {
    8
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            conflict: Conflict::default(),
            id_attempts: default_id_attempts(),
        }
    }
}

impl ChainConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error for malformed TOML or a zero `id_attempts`.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ChainConfig = toml::from_str(text)?;
        if config.id_attempts == 0 {
            return Err(Error::argument("id_attempts must be at least 1"));
        }
        Ok(config)
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# chainql configuration
#
# What insert does when the primary key already exists:
#   "error"   = fail the row
#   "replace" = overwrite the stored row (default)
#   "update"  = merge the new fields into the stored row
conflict = "replace"

# How many random primary keys to try before giving up
id_attempts = 8
"#
    }

    /// Resolve per-call insert options against the configured default
    pub fn conflict_for(&self, options: &InsertOptions) -> Conflict {
        options.conflict.unwrap_or(self.conflict)
    }
}
