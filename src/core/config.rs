//! Analysis configuration
//!
//! Everything here can come from a TOML file, from CLI flags, or both (flags
//! win). There is no environment-variable configuration.

use crate::error::{AnalysisError, Result};
use crate::layout::{DEFAULT_ACTIVE_ROOT, DEFAULT_MIN_STRING_LEN};
use crate::walker::Roots;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for one analysis run.
///
/// ```
/// use assocmem::AnalysisConfig;
///
/// let config = AnalysisConfig::from_toml_str("min_string_len = 5\nfree_root = 512\n").unwrap();
/// assert_eq!(config.min_string_len, 5);
/// assert_eq!(config.roots().free, Some(512));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Shortest printable run reported as a candidate string
    pub min_string_len: usize,

    /// Offset of the first block on the active list
    pub active_root: Option<u32>,

    /// Offset of the first block on the free list
    pub free_root: Option<u32>,

    /// Also extract strings from unclassified bytes
    pub scan_unclassified: bool,

    /// Treat several input files as successive dumps of one store
    pub lineage: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            min_string_len: DEFAULT_MIN_STRING_LEN,
            active_root: Some(DEFAULT_ACTIVE_ROOT),
            free_root: None,
            scan_unclassified: false,
            lineage: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AnalysisConfig =
            toml::from_str(text).map_err(|e| AnalysisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("Loaded config from {:?}", path.as_ref());
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| AnalysisError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_string_len == 0 {
            return Err(AnalysisError::Config(
                "min_string_len must be at least 1".to_string(),
            ));
        }
        if self.active_root.is_none() && self.free_root.is_none() {
            return Err(AnalysisError::Config(
                "at least one of active_root and free_root is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn roots(&self) -> Roots {
        Roots::new(self.active_root, self.free_root)
    }
}
