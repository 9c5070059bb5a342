//! End-to-end runs through `SandboxEngine`.
//!
//! The compiled path uses a stand-in toolchain that emits a WAT module
//! printing a fixed greeting; wasmtime accepts WAT text directly.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gobox_core::{
    CompilationError, EngineConfig, EngineError, ExecutionErrorKind, HostError,
    HostFunctionBridge, SandboxEngine, StructureError, ToolCall, ToolOutput, Toolchain,
    ValidationError,
};
use serde_json::{json, Map, Value};

const GREETING_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "hi from wasm\n")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 16))
    (i32.store (i32.const 4) (i32.const 13))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))
"#;

#[derive(Default)]
struct WatToolchain {
    calls: AtomicUsize,
}

#[async_trait]
impl Toolchain for WatToolchain {
    fn name(&self) -> &str {
        "wat"
    }

    async fn build(
        &self,
        _workspace: &Path,
        source: &Path,
        output: &Path,
    ) -> Result<ToolOutput, CompilationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = tokio::fs::read_to_string(source).await?;
        if text.contains("undefined_thing") {
            return Ok(ToolOutput {
                success: false,
                combined: "# guest\nmain.go:4:2: undefined: undefined_thing\n".into(),
            });
        }
        tokio::fs::write(output, GREETING_WAT).await?;
        Ok(ToolOutput {
            success: true,
            combined: String::new(),
        })
    }
}

struct Doubler;

#[async_trait]
impl ToolCall for Doubler {
    async fn call(&self, name: &str, args: Map<String, Value>) -> Result<Value, HostError> {
        match name {
            "double" => {
                let n = args.get("n").and_then(Value::as_f64).unwrap_or(0.0);
                Ok(json!(n * 2.0))
            }
            other => Err(HostError::UnknownTool(other.to_string())),
        }
    }
}

fn engine() -> (Arc<WatToolchain>, SandboxEngine) {
    let tc = Arc::new(WatToolchain::default());
    let engine = SandboxEngine::new(EngineConfig::default(), tc.clone());
    (tc, engine)
}

const FENCED: &str = "Sure, here is the program:\n\n```go\npackage main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi from go\")\n}\n```\n";

// ---------------------------------------------------------------------------
// Compiled path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn compiled_run_extracts_compiles_and_executes() {
    let (tc, engine) = engine();
    let result = engine.run_compiled(FENCED).await.expect("run");
    assert!(result.success, "{}", result.error);
    assert_eq!(result.stdout, "hi from wasm\n");

    engine.run_compiled(FENCED).await.expect("second run");
    assert_eq!(tc.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.compiler().size(), 1);
}

#[tokio::test]
async fn compile_failure_is_an_engine_error() {
    let (_tc, engine) = engine();
    let src = "package main\n\nfunc main() {\n\tundefined_thing()\n}\n";
    let err = engine.run_compiled(src).await.unwrap_err();
    match err {
        EngineError::Compilation(CompilationError::ToolInvocationFailed { message, .. }) => {
            assert_eq!(message, "main.go:4:2: undefined: undefined_thing");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn forbidden_import_never_reaches_the_toolchain() {
    let (tc, engine) = engine();
    let src = "package main\n\nimport \"os/exec\"\n\nfunc main() { exec.Command(\"ls\") }\n";
    let err = engine.run_compiled(src).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::ForbiddenImport(ref p)) if p == "os/exec"
    ));
    assert_eq!(tc.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_entry_point_is_a_structure_error() {
    let (_tc, engine) = engine();
    let err = engine
        .run_compiled("package main\n\nfunc helper() {}\n")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Structure(StructureError::MissingMainFunc)
    ));
}

#[tokio::test]
async fn runtime_policy_extension_applies_to_later_runs() {
    let (_tc, engine) = engine();
    let src = "package main\n\nimport \"strings\"\n\nfunc main() { _ = strings.ToUpper(\"x\") }\n";
    assert!(engine.run_interpreted(src, None).await.is_ok());
    engine.validator().forbid_import("strings");
    assert!(matches!(
        engine.run_interpreted(src, None).await,
        Err(EngineError::Validation(ValidationError::ForbiddenImport(_)))
    ));
}

// ---------------------------------------------------------------------------
// Interpreted path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interpreted_run_handles_fenced_text() {
    let (tc, engine) = engine();
    let result = engine.run_interpreted(FENCED, None).await.expect("run");
    assert!(result.success, "{}", result.error);
    assert_eq!(result.stdout, "hi from go\n");
    assert_eq!(tc.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn guest_stub_is_replaced_by_the_host_binding() {
    let raw = r#"```go
package main

import "fmt"

func callTool(name string, args map[string]interface{}) (interface{}, error) {
	return "stub", nil
}

func main() {
	out, err := callTool("double", map[string]interface{}{"n": 21})
	fmt.Println(out, err)
}
```"#;
    let bridge = HostFunctionBridge::new().with_tool_dispatch("callTool", Arc::new(Doubler));

    let (_tc, engine) = engine();
    let result = engine.run_interpreted(raw, Some(bridge)).await.expect("run");
    assert!(result.success, "{}", result.error);
    assert_eq!(result.stdout, "42 <nil>\n");
}

#[tokio::test]
async fn interpreted_panic_is_trap_result_not_engine_error() {
    let (_tc, engine) = engine();
    let src = "package main\n\nfunc main() {\n\tpanic(\"boom\")\n}\n";
    let result = engine.run_interpreted(src, None).await.expect("admitted");
    assert!(!result.success);
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Trap));
}
