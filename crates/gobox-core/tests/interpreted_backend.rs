//! Interpreted backend: host bridge, limits and pooling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gobox_core::{
    ExecutionErrorKind, HostError, HostFunctionBridge, InterpretedBackend, InterpreterConfig,
    ResourceLimits, ToolCall,
};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

fn timeout(ms: u64) -> Option<ResourceLimits> {
    Some(ResourceLimits::default().with_timeout(Duration::from_millis(ms)))
}

fn adder() -> HostFunctionBridge {
    HostFunctionBridge::new().with_function("add", |args| {
        let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
        let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(json!(a + b))
    })
}

// ---------------------------------------------------------------------------
// Host bridge
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn host_add_prints_five() {
    let src = r#"package main

import "fmt"

func main() {
	sum, err := add(map[string]interface{}{"a": 2, "b": 3})
	if err != nil {
		fmt.Println("error:", err)
		return
	}
	fmt.Println(sum)
}
"#;
    let backend = InterpretedBackend::default();
    let result = backend.execute_with_host_functions(src, None, adder()).await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.stdout, "5\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn host_errors_reach_the_guest_as_errors() {
    let src = r#"package main

import "fmt"

func main() {
	_, err := fail(nil)
	fmt.Println("got:", err)
}
"#;
    let bridge = HostFunctionBridge::new()
        .with_function("fail", |_| Err(HostError::Failed("quota exceeded".into())));
    let result = InterpretedBackend::default()
        .execute_with_host_functions(src, None, bridge)
        .await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.stdout, "got: quota exceeded\n");
}

struct Registry {
    calls: AtomicUsize,
}

#[async_trait]
impl ToolCall for Registry {
    async fn call(&self, name: &str, args: Map<String, Value>) -> Result<Value, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        match name {
            "upper" => {
                let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
                Ok(json!(text.to_uppercase()))
            }
            other => Err(HostError::UnknownTool(other.to_string())),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_dispatch_runs_async_tools() {
    let src = r#"package main

import "fmt"

func main() {
	out, err := callTool("upper", map[string]interface{}{"text": "shout"})
	fmt.Println(out, err)
	_, err = callTool("nope", nil)
	fmt.Println(err)
}
"#;
    let registry = Arc::new(Registry {
        calls: AtomicUsize::new(0),
    });
    let bridge = HostFunctionBridge::new().with_tool_dispatch("callTool", registry.clone());
    let result = InterpretedBackend::default()
        .execute_with_host_functions(src, None, bridge)
        .await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.stdout, "SHOUT <nil>\nunknown tool: nope\n");
    assert_eq!(registry.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn host_calls_are_refused_after_the_deadline() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let bridge = HostFunctionBridge::new().with_function("tick", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        Ok(Value::Null)
    });
    let src = "package main\nfunc main() {\n\tfor {\n\t\ttick(nil)\n\t}\n}\n";
    let result = InterpretedBackend::default()
        .execute_with_host_functions(src, timeout(100), bridge)
        .await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Timeout), "{}", result.error);

    let at_stop = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    // At most the call already in flight completes after the stop.
    assert!(calls.load(Ordering::SeqCst) <= at_stop + 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn host_panic_after_the_deadline_is_still_timeout() {
    let bridge = HostFunctionBridge::new().with_function("slow", |_| {
        std::thread::sleep(Duration::from_millis(60));
        panic!("host gave up");
    });
    let src = "package main\nfunc main() {\n\tslow(nil)\n}\n";
    let result = InterpretedBackend::default()
        .execute_with_host_functions(src, timeout(30), bridge)
        .await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Timeout), "{}", result.error);
}

// ---------------------------------------------------------------------------
// Limits and classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn infinite_loop_times_out_and_keeps_partial_output() {
    let src = "package main\nimport \"fmt\"\nfunc main() {\n\tfmt.Println(\"before\")\n\tfor {\n\t}\n}\n";
    let started = Instant::now();
    let result = InterpretedBackend::default().execute(src, timeout(100)).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Timeout), "{}", result.error);
    assert_eq!(result.stdout, "before\n");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn cancellation_is_reported_as_canceled() {
    let src = "package main\nfunc main() {\n\tfor {\n\t}\n}\n";
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });
    let result = InterpretedBackend::default()
        .execute_cancellable(src, timeout(10_000), None, &cancel)
        .await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Canceled), "{}", result.error);
}

#[tokio::test]
async fn step_budget_exhaustion_is_timeout() {
    let backend = InterpretedBackend::new(
        ResourceLimits::default(),
        InterpreterConfig {
            max_steps: Some(1_000),
            ..InterpreterConfig::default()
        },
    );
    let src = "package main\nfunc main() {\n\tfor {\n\t}\n}\n";
    let result = backend.execute(src, None).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Timeout));
    assert!(result.error.contains("step budget"), "{}", result.error);
}

#[tokio::test]
async fn runtime_faults_are_traps() {
    let src = "package main\nimport \"fmt\"\nfunc main() {\n\tvar xs []int\n\tfmt.Println(\"start\")\n\tfmt.Println(xs[3])\n}\n";
    let result = InterpretedBackend::default().execute(src, None).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Trap));
    assert!(result.error.contains("index out of range"), "{}", result.error);
    assert_eq!(result.stdout, "start\n");
}

#[tokio::test]
async fn oversized_allocations_are_traps_not_aborts() {
    for body in [
        "s := make([]int, 1<<40)\n\t_ = s",
        "_ = strings.Repeat(\"x\", 1<<42)",
    ] {
        let src = format!("package main\nimport \"strings\"\nfunc main() {{\n\t{body}\n}}\n");
        let result = InterpretedBackend::default().execute(&src, timeout(2_000)).await;
        assert_eq!(result.kind(), Some(ExecutionErrorKind::Trap), "{}", result.error);
    }
}

#[tokio::test]
async fn unbounded_recursion_is_trap() {
    let src = "package main\nfunc f(n int) int { return f(n+1) }\nfunc main() { f(0) }\n";
    let result = InterpretedBackend::default().execute(src, None).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Trap), "{}", result.error);
}

#[tokio::test]
async fn syntax_errors_are_runtime() {
    let result = InterpretedBackend::default()
        .execute("package main\nfunc main() {", None)
        .await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Runtime));
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_never_exceeds_capacity() {
    let backend = Arc::new(InterpretedBackend::new(
        ResourceLimits::default(),
        InterpreterConfig {
            pool_size: 2,
            ..InterpreterConfig::default()
        },
    ));
    let src = "package main\nimport \"fmt\"\nfunc main() { fmt.Println(\"ok\") }\n";
    let mut handles = Vec::new();
    for _ in 0..8 {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move { backend.execute(src, None).await }));
    }
    for h in handles {
        let result = h.await.unwrap();
        assert_eq!(result.stdout, "ok\n");
    }
    assert_eq!(backend.pool().available(), 2);
    assert_eq!(backend.pool().capacity(), 2);
}

#[tokio::test]
async fn concurrent_runs_keep_output_separate() {
    let backend = InterpretedBackend::default();
    let a = "package main\nimport \"fmt\"\nfunc main() { for i := 0; i < 3; i++ { fmt.Print(\"a\") } }\n";
    let b = "package main\nimport \"fmt\"\nfunc main() { for i := 0; i < 3; i++ { fmt.Print(\"b\") } }\n";
    let (ra, rb) = tokio::join!(backend.execute(a, None), backend.execute(b, None));
    assert_eq!(ra.stdout, "aaa");
    assert_eq!(rb.stdout, "bbb");
}
