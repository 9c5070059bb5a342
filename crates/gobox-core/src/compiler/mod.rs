//! Source → wasm compilation through an external toolchain, memoized in a
//! [`CompilationCache`].

pub mod diagnostics;
pub mod toolchain;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::cache::{CompilationCache, CompiledArtifact};
use crate::error::CompilationError;
use crate::obs;
use crate::source::SourceUnit;

pub use diagnostics::first_diagnostic;
use toolchain::Toolchain;

const SOURCE_FILE: &str = "main.go";
const ARTIFACT_FILE: &str = "main.wasm";
const GO_MOD: &str = "module guest\n\ngo 1.21\n";

pub struct Compiler {
    toolchain: Arc<dyn Toolchain>,
    cache: CompilationCache,
}

impl Compiler {
    pub fn new(toolchain: Arc<dyn Toolchain>, cache: CompilationCache) -> Self {
        Self { toolchain, cache }
    }

    pub fn cache(&self) -> &CompilationCache {
        &self.cache
    }

    /// Number of cached artifacts.
    pub fn size(&self) -> usize {
        self.cache.size()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Compile `source`, returning the cached artifact when the same text
    /// was compiled before.
    pub async fn compile(
        &self,
        source: impl Into<SourceUnit>,
    ) -> Result<CompiledArtifact, CompilationError> {
        let unit = source.into();
        let digest = unit.digest();
        if let Some(hit) = self.cache.get(&digest) {
            obs::emit_cache_hit(&digest);
            return Ok(hit);
        }
        obs::emit_cache_miss(&digest);

        // Removed when `workspace` drops, on every path out of this fn.
        let workspace = tempfile::Builder::new().prefix("gobox-build-").tempdir()?;
        let source_path = workspace.path().join(SOURCE_FILE);
        let output_path = workspace.path().join(ARTIFACT_FILE);
        tokio::fs::write(&source_path, unit.text()).await?;
        tokio::fs::write(workspace.path().join("go.mod"), GO_MOD).await?;

        let started = Instant::now();
        let out = self
            .toolchain
            .build(workspace.path(), &source_path, &output_path)
            .await?;
        if !out.success {
            let message = first_diagnostic(&out.combined);
            obs::emit_compile_failed(&digest, &message);
            return Err(CompilationError::ToolInvocationFailed {
                message,
                diagnostics: out.combined,
            });
        }

        let bytes = match tokio::fs::read(&output_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(toolchain = %self.toolchain.name(), "toolchain produced no artifact");
                return Err(CompilationError::MissingArtifact);
            }
            Err(e) => return Err(e.into()),
        };
        let artifact = CompiledArtifact::from(bytes);
        debug!(
            digest = %digest.short(),
            toolchain = %self.toolchain.name(),
            size = artifact.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compiled guest program"
        );
        self.cache.insert(digest, artifact.clone());
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::toolchain::ToolOutput;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Records the workspace it was handed and fails with fixed output.
    struct Rejecting {
        seen: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl Toolchain for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn build(
            &self,
            workspace: &Path,
            source: &Path,
            _output: &Path,
        ) -> Result<ToolOutput, CompilationError> {
            assert!(source.exists());
            assert!(workspace.join("go.mod").exists());
            *self.seen.lock().unwrap() = Some(workspace.to_path_buf());
            Ok(ToolOutput {
                success: false,
                combined: "# guest\nmain.go:3:9: undefined: x\n".into(),
            })
        }
    }

    struct Silent;

    #[async_trait]
    impl Toolchain for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn build(&self, _: &Path, _: &Path, _: &Path) -> Result<ToolOutput, CompilationError> {
            Ok(ToolOutput {
                success: true,
                combined: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn failure_reports_first_diagnostic_and_cleans_up() {
        let tc = Arc::new(Rejecting {
            seen: Mutex::new(None),
        });
        let compiler = Compiler::new(tc.clone(), CompilationCache::default());
        let err = compiler
            .compile("package main\nfunc main() { x }\n")
            .await
            .unwrap_err();
        match &err {
            CompilationError::ToolInvocationFailed { message, diagnostics } => {
                assert_eq!(message, "main.go:3:9: undefined: x");
                assert!(diagnostics.starts_with("# guest"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let workspace = tc.seen.lock().unwrap().clone().unwrap();
        assert!(!workspace.exists());
        assert_eq!(compiler.size(), 0);
    }

    #[tokio::test]
    async fn success_without_output_file_is_missing_artifact() {
        let compiler = Compiler::new(Arc::new(Silent), CompilationCache::default());
        let err = compiler.compile("package main\nfunc main() {}\n").await.unwrap_err();
        assert!(matches!(err, CompilationError::MissingArtifact));
    }
}
