//! Engine configuration.
//!
//! Every section has defaults, so a TOML file only needs the keys it
//! changes:
//!
//! ```toml
//! [limits]
//! memory_bytes = 33554432
//! timeout_ms = 5000
//!
//! [interpreter]
//! pool_size = 8
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// wasm linear memory page size.
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: ResourceLimits,
    pub validation: ValidationConfig,
    pub cache: CacheConfig,
    pub toolchain: ToolchainConfig,
    pub interpreter: InterpreterConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.limits.timeout_ms == 0 {
            return Err(ConfigError::Invalid("limits.timeout_ms must be positive".into()));
        }
        if self.limits.memory_bytes < WASM_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "limits.memory_bytes must be at least one page ({WASM_PAGE_SIZE} bytes)"
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be positive".into()));
        }
        if self.toolchain.program.trim().is_empty() {
            return Err(ConfigError::Invalid("toolchain.program must not be empty".into()));
        }
        if self.interpreter.max_alloc == 0 {
            return Err(ConfigError::Invalid("interpreter.max_alloc must be positive".into()));
        }
        if !crate::scan::is_identifier(&self.interpreter.bridge_name) {
            return Err(ConfigError::Invalid(format!(
                "interpreter.bridge_name {:?} is not a Go identifier",
                self.interpreter.bridge_name
            )));
        }
        Ok(())
    }
}

/// Per-call execution bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Linear memory ceiling; only the compiled backend enforces it.
    pub memory_bytes: u64,
    pub timeout_ms: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 64 * 1024 * 1024,
            timeout_ms: 30_000,
        }
    }
}

impl ResourceLimits {
    pub fn new(memory_bytes: u64, timeout: Duration) -> Self {
        Self {
            memory_bytes,
            timeout_ms: timeout.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_memory(mut self, memory_bytes: u64) -> Self {
        self.memory_bytes = memory_bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Ceiling rounded up to whole wasm pages.
    pub fn memory_pages(&self) -> u64 {
        self.memory_bytes.div_ceil(WASM_PAGE_SIZE)
    }

    /// Ceiling in bytes after page rounding.
    pub fn memory_ceiling(&self) -> usize {
        usize::try_from(self.memory_pages() * WASM_PAGE_SIZE).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_source_bytes: usize,
    pub forbidden_imports: Vec<String>,
    pub forbidden_directives: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: 256 * 1024,
            forbidden_imports: [
                "os/exec",
                "syscall",
                "unsafe",
                "plugin",
                "net",
                "net/http",
                "net/rpc",
                "runtime/cgo",
                "C",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            forbidden_directives: [
                "//go:linkname",
                "//go:embed",
                "//export",
                "//go:wasmimport",
                "#cgo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub program: String,
    pub target: String,
    pub opt_level: String,
    pub timeout_secs: u64,
    pub extra_args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "tinygo".into(),
            target: "wasi".into(),
            opt_level: "z".into(),
            timeout_secs: 120,
            extra_args: Vec::new(),
        }
    }
}

impl ToolchainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub pool_size: usize,
    /// Evaluation steps per run; unset means the timeout alone bounds CPU.
    pub max_steps: Option<u64>,
    pub max_call_depth: usize,
    /// Largest slice (elements) or string (bytes) a guest may build; past
    /// it the guest panics instead of exhausting host memory.
    pub max_alloc: usize,
    /// Cap on captured bytes per stream, for both backends.
    pub output_cap_bytes: usize,
    /// Name the host bridge is bound under in interpreted programs.
    pub bridge_name: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            max_steps: None,
            max_call_depth: gobox_interp::DEFAULT_MAX_CALL_DEPTH,
            max_alloc: gobox_interp::DEFAULT_MAX_ALLOC,
            output_cap_bytes: gobox_interp::DEFAULT_OUTPUT_CAP,
            bridge_name: crate::CANONICAL_HOST_CALL.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.interpreter.pool_size, 5);
        assert!(config
            .validation
            .forbidden_imports
            .iter()
            .any(|i| i == "os/exec"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [limits]
            timeout_ms = 100

            [interpreter]
            max_steps = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.timeout(), Duration::from_millis(100));
        assert_eq!(config.limits.memory_bytes, ResourceLimits::default().memory_bytes);
        assert_eq!(config.interpreter.max_steps, Some(5000));
        assert_eq!(config.interpreter.bridge_name, "callTool");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("[limits]\ntimeout_ms = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[limits]\nmemory_bytes = 10\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[interpreter]\nbridge_name = \"\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("limits = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gobox.toml");
        std::fs::write(&path, "[cache]\nmax_entries = 3\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.cache.max_entries, 3);
    }

    #[test]
    fn memory_rounds_up_to_pages() {
        let limits = ResourceLimits::default().with_memory(WASM_PAGE_SIZE + 1);
        assert_eq!(limits.memory_pages(), 2);
        assert_eq!(limits.memory_ceiling(), 2 * WASM_PAGE_SIZE as usize);
    }
}
