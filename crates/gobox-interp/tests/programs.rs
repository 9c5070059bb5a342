//! End-to-end guest programs run through the public interpreter API.

use gobox_interp::{InterpError, Interpreter, OutputBuffer, RunOptions};

fn run(src: &str) -> (Result<(), InterpError>, String, String) {
    let stdout = OutputBuffer::new(64 * 1024);
    let stderr = OutputBuffer::new(64 * 1024);
    let result = Interpreter::new().run(
        src,
        RunOptions::new()
            .stdout(stdout.clone())
            .stderr(stderr.clone())
            .max_steps(5_000_000),
    );
    (result, stdout.contents(), stderr.contents())
}

fn run_ok(src: &str) -> String {
    let (result, stdout, stderr) = run(src);
    if let Err(e) = result {
        panic!("program failed: {e}\nstdout:\n{stdout}\nstderr:\n{stderr}");
    }
    stdout
}

#[test]
fn empty_main_produces_no_output() {
    assert_eq!(run_ok("package main\n\nfunc main() {}\n"), "");
}

#[test]
fn printf_verbs() {
    let out = run_ok(
        r#"package main

import "fmt"

func main() {
	fmt.Printf("%d %s %v %.2f %q\n", 42, "go", true, 3.14159, "hi")
	fmt.Printf("%5d|%-5s|%05.1f\n", 7, "ab", 2.5)
	fmt.Println(fmt.Sprintf("%x %X %o %b", 255, 255, 8, 5))
	fmt.Printf("%T %T %T\n", 1, "s", 1.5)
}
"#,
    );
    assert_eq!(
        out,
        "42 go true 3.14 \"hi\"\n    7|ab   |002.5\nff FF 10 101\nint string float64\n"
    );
}

#[test]
fn closures_capture_by_reference() {
    let out = run_ok(
        r#"package main

import "fmt"

func counter() func() int {
	n := 0
	return func() int {
		n++
		return n
	}
}

func main() {
	next := counter()
	next()
	next()
	fmt.Println(next())
}
"#,
    );
    assert_eq!(out, "3\n");
}

#[test]
fn maps_print_in_sorted_key_order() {
    let out = run_ok(
        r#"package main

import "fmt"

func main() {
	m := map[string]int{"b": 2, "a": 1}
	m["c"] = 3
	delete(m, "b")
	v, ok := m["missing"]
	fmt.Println(m, len(m), v, ok)
}
"#,
    );
    assert_eq!(out, "map[a:1 c:3] 2 0 false\n");
}

#[test]
fn structs_and_pointer_receivers() {
    let out = run_ok(
        r#"package main

import "fmt"

type Account struct {
	Owner   string
	Balance int
}

func (a *Account) Deposit(n int) {
	a.Balance += n
}

func (a Account) String() string {
	return fmt.Sprintf("%s:%d", a.Owner, a.Balance)
}

func main() {
	acc := Account{Owner: "ada", Balance: 10}
	acc.Deposit(5)
	copyAcc := acc
	copyAcc.Deposit(100)
	fmt.Println(acc.Balance, copyAcc.Balance)
	fmt.Println(acc)
}
"#,
    );
    assert_eq!(out, "15 115\nada:15\n");
}

#[test]
fn slices_share_backing_arrays() {
    let out = run_ok(
        r#"package main

import "fmt"

func main() {
	a := []int{1, 2, 3, 4}
	b := a[1:3]
	b[0] = 20
	a = append(a, 5)
	fmt.Println(a, b, len(b), cap(b))
}
"#,
    );
    assert_eq!(out, "[1 20 3 4 5] [20 3] 2 3\n");
}

#[test]
fn defer_and_recover() {
    let out = run_ok(
        r#"package main

import "fmt"

func safeDiv(a, b int) (result int, err error) {
	defer func() {
		if r := recover(); r != nil {
			err = fmt.Errorf("recovered: %v", r)
		}
	}()
	return a / b, nil
}

func main() {
	defer fmt.Println("deferred last")
	_, err := safeDiv(1, 0)
	fmt.Println(err)
	q, err := safeDiv(9, 3)
	fmt.Println(q, err)
}
"#,
    );
    assert_eq!(
        out,
        "recovered: runtime error: integer divide by zero\n3 <nil>\ndeferred last\n"
    );
}

#[test]
fn errors_wrap_and_compare() {
    let out = run_ok(
        r#"package main

import (
	"errors"
	"fmt"
)

var ErrNotFound = errors.New("not found")

func find(k string) error {
	return fmt.Errorf("find %s: %w", k, ErrNotFound)
}

func main() {
	err := find("x")
	fmt.Println(err)
	fmt.Println(errors.Is(err, ErrNotFound), errors.Unwrap(err) == ErrNotFound)
}
"#,
    );
    assert_eq!(out, "find x: not found\ntrue true\n");
}

#[test]
fn switch_and_type_switch() {
    let out = run_ok(
        r#"package main

import "fmt"

func kind(v interface{}) string {
	switch x := v.(type) {
	case int:
		return fmt.Sprintf("int %d", x)
	case string:
		return "string " + x
	case nil:
		return "nil"
	default:
		return "other"
	}
}

func grade(n int) string {
	switch {
	case n >= 90:
		return "A"
	case n >= 80:
		return "B"
	}
	return "C"
}

func main() {
	fmt.Println(kind(3), kind("s"), kind(nil), kind(2.5))
	fmt.Println(grade(95), grade(85), grade(10))
}
"#,
    );
    assert_eq!(out, "int 3 string s nil other\nA B C\n");
}

#[test]
fn stdlib_strings_strconv_sort() {
    let out = run_ok(
        r#"package main

import (
	"fmt"
	"sort"
	"strconv"
	"strings"
)

func main() {
	words := strings.Fields("  pear apple  fig ")
	sort.Strings(words)
	fmt.Println(strings.Join(words, ","))
	n, err := strconv.Atoi("42")
	fmt.Println(n+1, err)
	_, err = strconv.Atoi("x")
	fmt.Println(err)
	nums := []int{5, 2, 9}
	sort.Slice(nums, func(i, j int) bool { return nums[i] > nums[j] })
	fmt.Println(nums, strings.ToUpper("go"), strings.Repeat("ab", 2))
}
"#,
    );
    assert_eq!(
        out,
        "apple,fig,pear\n43 <nil>\nstrconv.Atoi: parsing \"x\": invalid syntax\n[9 5 2] GO abab\n"
    );
}

#[test]
fn json_marshal_follows_struct_tags() {
    let out = run_ok(
        r#"package main

import (
	"encoding/json"
	"fmt"
)

type Item struct {
	Name  string `json:"name"`
	Count int    `json:"count,omitempty"`
	note  string
}

func main() {
	b, err := json.Marshal(Item{Name: "a<b", note: "hidden"})
	fmt.Println(string(b), err)
	b, _ = json.Marshal(map[string]int{"z": 1, "a": 2})
	fmt.Println(string(b))
}
"#,
    );
    assert_eq!(out, "{\"name\":\"a\\u003cb\"} <nil>\n{\"a\":2,\"z\":1}\n");
}

#[test]
fn unrecovered_panic_is_classified() {
    let (result, stdout, _) = run(
        r#"package main

import "fmt"

func main() {
	fmt.Println("before")
	var xs []int
	_ = xs[3]
}
"#,
    );
    assert_eq!(stdout, "before\n");
    match result {
        Err(InterpError::Panic { message }) => {
            assert!(message.contains("index out of range [3] with length 0"), "{message}")
        }
        other => panic!("expected panic, got {other:?}"),
    }
}

#[test]
fn unknown_import_is_rejected() {
    let (result, _, _) = run("package main\n\nimport \"net/http\"\n\nfunc main() {}\n");
    match result {
        Err(InterpError::Runtime { message }) => {
            assert!(message.contains("not available in the sandbox"), "{message}")
        }
        other => panic!("expected runtime error, got {other:?}"),
    }
}

#[test]
fn println_builtin_writes_stderr() {
    let (result, stdout, stderr) = run("package main\n\nfunc main() { println(\"oops\", 1) }\n");
    assert!(result.is_ok());
    assert_eq!(stdout, "");
    assert_eq!(stderr, "oops 1\n");
}

#[test]
fn empty_and_nil_slices_differ() {
    let out = run_ok(
        r#"package main

import (
	"encoding/json"
	"fmt"
)

func main() {
	var n []int
	e := []int{}
	fmt.Println(n == nil, e == nil, len(e))
	a, _ := json.Marshal(n)
	b, _ := json.Marshal(e)
	fmt.Println(string(a), string(b))
	fmt.Println(n[:0] == nil, e[:0] == nil)
}
"#,
    );
    assert_eq!(out, "true false 0\nnull []\ntrue false\n");
}

#[test]
fn sized_integers_wrap() {
    let out = run_ok(
        r#"package main

import "fmt"

func bump(b byte) byte {
	b += 10
	return b
}

func main() {
	var x int8 = 127
	x++
	var u uint8 = 0
	u--
	c := byte(250)
	c += 10
	var w uint16 = 65535
	w = w + 2
	fmt.Println(x, u, c, w, bump(250), int8(200), uint32(1<<32+5))
	n := 127
	n++
	fmt.Println(n)
}
"#,
    );
    assert_eq!(out, "-128 255 4 1 4 -56 5\n128\n");
}
