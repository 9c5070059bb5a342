//! External ahead-of-time toolchains.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolchainConfig;
use crate::error::CompilationError;

/// What a toolchain run left behind, whatever its exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    /// stdout followed by stderr.
    pub combined: String,
}

/// Builds `source` inside `workspace` into the wasm file at `output`.
#[async_trait]
pub trait Toolchain: Send + Sync {
    fn name(&self) -> &str;

    async fn build(
        &self,
        workspace: &Path,
        source: &Path,
        output: &Path,
    ) -> Result<ToolOutput, CompilationError>;
}

/// TinyGo targeting WASI.
#[derive(Debug, Clone, Default)]
pub struct TinyGo {
    config: ToolchainConfig,
}

impl TinyGo {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    /// Arguments after the program name.
    pub fn args(&self, source: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "-o".to_string(),
            output.display().to_string(),
            format!("-target={}", self.config.target),
            format!("-opt={}", self.config.opt_level),
            "-no-debug".to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.push(source.display().to_string());
        args
    }
}

#[async_trait]
impl Toolchain for TinyGo {
    fn name(&self) -> &str {
        &self.config.program
    }

    async fn build(
        &self,
        workspace: &Path,
        source: &Path,
        output: &Path,
    ) -> Result<ToolOutput, CompilationError> {
        let args = self.args(source, output);
        debug!(program = %self.config.program, ?args, "invoking toolchain");

        let child = Command::new(&self.config.program)
            .args(&args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CompilationError::ToolchainUnavailable {
                    program: self.config.program.clone(),
                },
                _ => CompilationError::Workspace(e),
            })?;

        let timeout = self.config.timeout();
        let out = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CompilationError::TimedOut(timeout))??;

        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(ToolOutput {
            success: out.status.success(),
            combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn tinygo_args_follow_wasi_size_profile() {
        let tc = TinyGo::default();
        let args = tc.args(&PathBuf::from("main.go"), &PathBuf::from("main.wasm"));
        assert_eq!(
            args,
            ["build", "-o", "main.wasm", "-target=wasi", "-opt=z", "-no-debug", "main.go"]
        );
        assert_eq!(tc.name(), "tinygo");
    }

    #[test]
    fn extra_args_precede_the_source_file() {
        let tc = TinyGo::new(ToolchainConfig {
            extra_args: vec!["-scheduler=none".into()],
            ..ToolchainConfig::default()
        });
        let args = tc.args(&PathBuf::from("main.go"), &PathBuf::from("out.wasm"));
        assert_eq!(args[args.len() - 2], "-scheduler=none");
        assert_eq!(args[args.len() - 1], "main.go");
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let tc = TinyGo::new(ToolchainConfig {
            program: "gobox-no-such-toolchain-binary".into(),
            ..ToolchainConfig::default()
        });
        let err = tc
            .build(dir.path(), &dir.path().join("main.go"), &dir.path().join("main.wasm"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompilationError::ToolchainUnavailable { .. }));
    }
}
