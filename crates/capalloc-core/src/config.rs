//! Allocator configuration that downstream crates can serialize/deserialize.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;
pub const GIB: usize = 1024 * MIB;

/// Default ceiling on live allocation: 1 GiB.
pub const DEFAULT_MAX_ALLOCATION: usize = GIB;

/// Document type requested from the host library when none is configured.
pub const DEFAULT_DOCUMENT_MAGIC: &str = "pdf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Hard ceiling (in bytes) on the live-usage counter, headers included.
    /// Fixed for the lifetime of an allocator.
    pub max_allocation_bytes: usize,

    /// Format hint passed to the host library when opening each input.
    pub document_magic: String,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_allocation_bytes: DEFAULT_MAX_ALLOCATION,
            document_magic: DEFAULT_DOCUMENT_MAGIC.to_string(),
        }
    }
}

impl AllocatorConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `CAPALLOC_MAX_ALLOCATION_BYTES`: ceiling in bytes
    /// - `CAPALLOC_DOCUMENT_MAGIC`: document type hint for the host library
    ///
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Overlay any `CAPALLOC_*` environment variables onto `self`.
    pub fn apply_env(&mut self) {
        if let Ok(s) = std::env::var("CAPALLOC_MAX_ALLOCATION_BYTES") {
            if let Ok(v) = s.trim().parse::<usize>() {
                self.max_allocation_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("CAPALLOC_DOCUMENT_MAGIC") {
            if !s.trim().is_empty() {
                self.document_magic = s.trim().to_string();
            }
        }
    }

    /// Overlay the fields a config file sets; absent fields keep their value.
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(cap) = file.max_allocation_bytes {
            self.max_allocation_bytes = cap;
        }
        if let Some(magic) = &file.document_magic {
            self.document_magic = magic.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_allocation_bytes == 0 {
            return Err(Error::Config(
                "max_allocation_bytes must be greater than zero".into(),
            ));
        }
        if self.document_magic.is_empty() {
            return Err(Error::Config("document_magic must not be empty".into()));
        }
        Ok(())
    }
}

/// On-disk (JSON) configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub max_allocation_bytes: Option<usize>,
    pub document_magic: Option<String>,
}

impl ConfigFile {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
