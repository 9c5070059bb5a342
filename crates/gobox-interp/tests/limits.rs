//! Run limits and host bindings: step budget, interrupt flag, call depth,
//! output cap and natives.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gobox_interp::{InterpError, Interpreter, NativeFn, OutputBuffer, RunOptions, TRUNCATION_MARKER};

const SPIN: &str = "package main\n\nfunc main() {\n\tfor {\n\t}\n}\n";

#[test]
fn step_budget_stops_infinite_loop() {
    let err = Interpreter::new()
        .run(SPIN, RunOptions::new().max_steps(10_000))
        .unwrap_err();
    assert!(matches!(err, InterpError::BudgetExhausted(10_000)));
}

#[test]
fn interrupt_flag_stops_a_running_program() {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = {
        let flag = flag.clone();
        std::thread::spawn(move || {
            Interpreter::new().run(SPIN, RunOptions::new().interrupt(flag))
        })
    };
    std::thread::sleep(Duration::from_millis(50));
    flag.store(true, Ordering::SeqCst);
    let result = handle.join().unwrap();
    assert!(matches!(result, Err(InterpError::Interrupted)));
}

#[test]
fn deep_recursion_is_a_stack_overflow() {
    let src = "package main\n\nfunc f(n int) int { return f(n + 1) }\n\nfunc main() { f(0) }\n";
    let err = Interpreter::new()
        .run(src, RunOptions::new().max_call_depth(200))
        .unwrap_err();
    assert!(matches!(err, InterpError::StackOverflow(200)));
}

#[test]
fn output_beyond_cap_is_truncated() {
    let out = OutputBuffer::new(16);
    let src = r#"package main

import "fmt"

func main() {
	for i := 0; i < 100; i++ {
		fmt.Println("line", i)
	}
}
"#;
    Interpreter::new()
        .run(src, RunOptions::new().stdout(out.clone()))
        .unwrap();
    assert!(out.is_truncated());
    assert!(out.contents().ends_with(TRUNCATION_MARKER));
    assert!(out.contents().starts_with("line 0\nline 1\n"));
}

fn add_native() -> NativeFn {
    Arc::new(|args: Vec<serde_json::Value>| {
        let obj = args
            .first()
            .and_then(|v| v.as_object())
            .ok_or_else(|| "add expects an object".to_string())?;
        let a = obj.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let b = obj.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok(serde_json::json!(a + b))
    })
}

#[test]
fn native_results_arrive_as_value_error_pairs() {
    let out = OutputBuffer::new(1024);
    let src = r#"package main

import "fmt"

func main() {
	sum, err := add(map[string]interface{}{"a": 2, "b": 3})
	fmt.Println(sum, err)
	_, err = add("nope")
	fmt.Println(err)
}
"#;
    Interpreter::new()
        .run(
            src,
            RunOptions::new().stdout(out.clone()).native("add", add_native()),
        )
        .unwrap();
    assert_eq!(out.contents(), "5 <nil>\nadd expects an object\n");
}

#[test]
fn natives_shadow_guest_declarations() {
    let out = OutputBuffer::new(1024);
    let src = r#"package main

import "fmt"

func add(m map[string]interface{}) (interface{}, error) {
	return -1, nil
}

func main() {
	v, _ := add(map[string]interface{}{"a": 1, "b": 1})
	fmt.Println(v)
}
"#;
    Interpreter::new()
        .run(
            src,
            RunOptions::new().stdout(out.clone()).native("add", add_native()),
        )
        .unwrap();
    assert_eq!(out.contents(), "2\n");
}

#[test]
fn natives_are_refused_after_interrupt() {
    let flag = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let native: NativeFn = {
        let flag = flag.clone();
        let calls = calls.clone();
        Arc::new(move |_args: Vec<serde_json::Value>| {
            calls.fetch_add(1, Ordering::SeqCst);
            // The host fires the interrupt while this call is in flight.
            flag.store(true, Ordering::SeqCst);
            Ok(serde_json::Value::Null)
        })
    };
    let src = r#"package main

func main() {
	for i := 0; i < 10; i++ {
		tool()
	}
}
"#;
    let err = Interpreter::new()
        .run(src, RunOptions::new().interrupt(flag).native("tool", native))
        .unwrap_err();
    assert!(matches!(err, InterpError::Interrupted));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Allocation cap
// ---------------------------------------------------------------------------

fn alloc_panic(src: &str) -> String {
    match Interpreter::new().run(src, RunOptions::new()) {
        Err(InterpError::Panic { message }) => message,
        other => panic!("expected panic, got {other:?}"),
    }
}

#[test]
fn huge_make_is_a_guest_panic() {
    let message =
        alloc_panic("package main\n\nfunc main() {\n\ts := make([]int, 1<<40)\n\t_ = s\n}\n");
    assert!(message.contains("makeslice: len out of range"), "{message}");
    let message =
        alloc_panic("package main\n\nfunc main() {\n\ts := make([]int, 0, 1<<40)\n\t_ = s\n}\n");
    assert!(message.contains("makeslice: cap out of range"), "{message}");
}

#[test]
fn huge_repeat_is_a_guest_panic() {
    let src = "package main\n\nimport \"strings\"\n\nfunc main() {\n\t_ = strings.Repeat(\"x\", 1<<42)\n}\n";
    assert!(alloc_panic(src).contains("Repeat output length overflow"));
}

#[test]
fn doubling_strings_and_slices_stop_at_the_cap() {
    let strings = "package main\n\nfunc main() {\n\ts := \"xx\"\n\tfor {\n\t\ts += s\n\t}\n}\n";
    let err = Interpreter::new()
        .run(strings, RunOptions::new().max_alloc(1 << 16))
        .unwrap_err();
    assert!(matches!(err, InterpError::Panic { ref message } if message.contains("string concatenation")));

    let slices = "package main\n\nfunc main() {\n\ts := []int{1}\n\tfor {\n\t\ts = append(s, s...)\n\t}\n}\n";
    let err = Interpreter::new()
        .run(slices, RunOptions::new().max_alloc(1 << 16))
        .unwrap_err();
    assert!(matches!(err, InterpError::Panic { ref message } if message.contains("growslice")));
}

#[test]
fn allocation_panics_can_be_recovered() {
    let out = OutputBuffer::new(1024);
    let src = r#"package main

import "fmt"

func try(n int) {
	defer func() {
		if r := recover(); r != nil {
			fmt.Println("recovered")
		}
	}()
	s := make([]byte, n)
	fmt.Println(len(s))
}

func main() {
	try(1 << 50)
	try(3)
}
"#;
    Interpreter::new()
        .run(src, RunOptions::new().stdout(out.clone()))
        .unwrap();
    assert_eq!(out.contents(), "recovered\n3\n");
}

#[test]
fn large_make_is_checked_while_filling() {
    let src = "package main\n\nfunc main() {\n\ts := make([]int, 1<<20)\n\t_ = s\n}\n";
    let err = Interpreter::new()
        .run(src, RunOptions::new().max_steps(50))
        .unwrap_err();
    assert!(matches!(err, InterpError::BudgetExhausted(50)));
}
