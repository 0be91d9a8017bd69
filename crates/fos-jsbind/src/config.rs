//! Runtime Configuration

use serde::{Deserialize, Serialize};

use crate::Result;

/// Engine runtime limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Heap limit in bytes, `None` for unlimited
    pub memory_limit: Option<usize>,

    /// Native stack the interpreter may use, in bytes
    pub max_stack_size: Option<usize>,

    /// Allocated bytes between automatic collections
    pub gc_threshold: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_limit: Some(32 * 1024 * 1024), // 32MB
            max_stack_size: Some(1024 * 1024),    // 1MB
            gc_threshold: None,
        }
    }
}

impl RuntimeConfig {
    /// Configuration without a heap limit
    pub fn unlimited() -> Self {
        Self {
            memory_limit: None,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON, missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub(crate) fn apply(&self, runtime: &rquickjs::Runtime) {
        if let Some(limit) = self.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = self.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        if let Some(threshold) = self.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = RuntimeConfig::default();
        assert_eq!(config.memory_limit, Some(32 * 1024 * 1024));
        assert_eq!(config.gc_threshold, None);
        assert_eq!(RuntimeConfig::unlimited().memory_limit, None);
    }

    #[test]
    fn test_from_json_partial() {
        let config = RuntimeConfig::from_json(r#"{ "gc_threshold": 65536 }"#).unwrap();
        assert_eq!(config.gc_threshold, Some(65536));
        assert_eq!(config.memory_limit, RuntimeConfig::default().memory_limit);
    }

    #[test]
    fn test_from_json_null_disables_limit() {
        let config = RuntimeConfig::from_json(r#"{ "memory_limit": null }"#).unwrap();
        assert_eq!(config.memory_limit, None);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(RuntimeConfig::from_json("{ memory_limit: 1 }").is_err());
    }
}
