//! Turn free-form model output into a runnable guest program.
//!
//! None of this is a security boundary; the [`Validator`](crate::Validator)
//! runs afterwards on whatever comes out.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::error::StructureError;
use crate::scan::{is_identifier, scan, TokenKind};
use crate::CANONICAL_HOST_CALL;

const FENCE: &str = "```";

/// Pull guest code out of raw generated text.
///
/// A complete fenced block (tagged or bare) yields its interior. With a
/// single fence, a tagged or leading fence opens the code and a bare
/// trailing one closes it; prose on the other side is dropped. Text without
/// fences comes back trimmed. Never fails.
pub fn extract_code(raw: &str) -> String {
    let Some(open) = raw.find(FENCE) else {
        return raw.trim().to_string();
    };
    let tag_start = open + FENCE.len();
    let line_end = raw[tag_start..]
        .find('\n')
        .map_or(raw.len(), |i| tag_start + i);
    let after = &raw[line_end..];
    if let Some(close) = after.find(FENCE) {
        return after[..close].trim().to_string();
    }

    // Only one fence marker.
    let tag = raw[tag_start..line_end].trim();
    let before = raw[..open].trim();
    let after = after.trim();
    let opens = !tag.is_empty()
        || before.is_empty()
        || (!after.is_empty() && has_package_main(after));
    if opens {
        after.to_string()
    } else {
        before.to_string()
    }
}

/// Point host-bridge calls at `bound_name` and drop guest declarations
/// that would collide with the injected binding.
///
/// Only identifier tokens are renamed; string literals and comments keep
/// their text. A `bound_name` that is not a Go identifier leaves the code
/// untouched.
pub fn rewrite_host_calls(code: &str, bound_name: &str) -> String {
    if !is_identifier(bound_name) {
        warn!(bound_name, "host binding name is not an identifier; code left as is");
        return code.to_string();
    }
    let renamed = if bound_name == CANONICAL_HOST_CALL {
        code.to_string()
    } else {
        rename_identifier(code, CANONICAL_HOST_CALL, bound_name)
    };
    strip_declarations(&renamed, bound_name)
}

fn rename_identifier(code: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut copied = 0;
    for token in scan(code) {
        if token.kind == TokenKind::Ident && token.text(code) == from {
            out.push_str(&code[copied..token.start]);
            out.push_str(to);
            copied = token.end;
        }
    }
    out.push_str(&code[copied..]);
    out
}

/// Remove top-level `func NAME(...) { ... }` and `var NAME ...` declarations.
fn strip_declarations(code: &str, name: &str) -> String {
    let escaped = regex::escape(name);
    let Ok(func_re) = Regex::new(&format!(r"(?m)^func\s+{escaped}\s*\(")) else {
        return code.to_string();
    };
    let Ok(var_re) = Regex::new(&format!(r"(?m)^var\s+{escaped}\b[^\n]*\n?")) else {
        return code.to_string();
    };

    let mut out = code.to_string();
    while let Some(m) = func_re.find(&out) {
        let start = m.start();
        let end = body_brace(&out, m.end())
            .and_then(|open| matching_brace(&out, open))
            .unwrap_or(out.len());
        let end = if out[end..].starts_with('\n') { end + 1 } else { end };
        out.replace_range(start..end, "");
    }
    var_re.replace_all(&out, "").into_owned()
}

/// Offset of the `{` opening a function body, skipping braces that belong
/// to parameter lists or `interface{}` / `struct{...}` result types.
fn body_brace(code: &str, from: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut parens = 1usize;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => parens += 1,
            b')' => parens = parens.saturating_sub(1),
            b'{' if parens == 0 => {
                let before = code[..i].trim_end();
                if before.ends_with("interface") || before.ends_with("struct") {
                    i = matching_brace(code, i)?;
                    continue;
                }
                return Some(i);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Byte offset just past the `}` matching the `{` at `open`. Skips string,
/// rune and comment contents.
fn matching_brace(code: &str, open: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Cheap entry-point check: a `package main` clause and `func main()`.
pub fn validate_structure(code: &str) -> Result<(), StructureError> {
    static MAIN: OnceLock<Regex> = OnceLock::new();
    if !has_package_main(code) {
        return Err(StructureError::MissingPackageMain);
    }
    if !crate::static_regex(&MAIN, r"(?m)^\s*func\s+main\s*\(\s*\)").is_match(code) {
        return Err(StructureError::MissingMainFunc);
    }
    Ok(())
}

fn has_package_main(code: &str) -> bool {
    static PACKAGE: OnceLock<Regex> = OnceLock::new();
    crate::static_regex(&PACKAGE, r"(?m)^\s*package\s+main\s*(?://.*)?$").is_match(code)
}

/// [`extract_code`] then [`rewrite_host_calls`].
pub fn preprocess(raw: &str, bound_name: &str) -> String {
    rewrite_host_calls(&extract_code(raw), bound_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}";

    #[test]
    fn fenced_block_round_trips() {
        for tag in ["go", "golang", ""] {
            let raw = format!("Here you go:\n```{tag}\n{PROGRAM}\n```\nHope it helps.");
            assert_eq!(extract_code(&raw), PROGRAM.trim(), "tag {tag:?}");
        }
    }

    #[test]
    fn lone_fences_are_stripped() {
        assert_eq!(extract_code(&format!("```go\n{PROGRAM}")), PROGRAM);
        assert_eq!(extract_code(&format!("{PROGRAM}\n```")), PROGRAM);
        assert_eq!(
            extract_code(&format!("Here is the program:\n```go\n{PROGRAM}")),
            PROGRAM
        );
        assert_eq!(extract_code(&format!("{PROGRAM}\n```\nDone.")), PROGRAM);
        assert_eq!(
            extract_code(&format!("Here is the program:\n```\n{PROGRAM}")),
            PROGRAM
        );
    }

    #[test]
    fn plain_text_is_trimmed() {
        assert_eq!(extract_code(&format!("\n\n{PROGRAM}\n  ")), PROGRAM);
        assert_eq!(extract_code(""), "");
    }

    #[test]
    fn host_calls_are_renamed() {
        let code = "package main\n\nfunc main() {\n\tr, err := callTool(\"search\", nil)\n\t_ = r\n\t_ = err\n}\n";
        let out = rewrite_host_calls(code, "hostCall");
        assert!(out.contains("hostCall(\"search\", nil)"));
        assert!(!out.contains("callTool"));
    }

    #[test]
    fn literals_and_comments_keep_the_canonical_name() {
        let code = "package main\n\n// callTool reaches the host\nfunc main() {\n\tcallTool(\"callTool\", nil)\n\t_ = `callTool`\n}\n";
        let out = rewrite_host_calls(code, "hostCall");
        assert_eq!(
            out,
            "package main\n\n// callTool reaches the host\nfunc main() {\n\thostCall(\"callTool\", nil)\n\t_ = `callTool`\n}\n"
        );
    }

    #[test]
    fn non_identifier_binding_leaves_code_alone() {
        let code = "package main\nfunc main() {\n\tcallTool(\"x\", nil)\n}\n";
        assert_eq!(rewrite_host_calls(code, ""), code);
        assert_eq!(rewrite_host_calls(code, "host call"), code);
    }

    #[test]
    fn colliding_guest_stub_is_removed() {
        let code = "package main\n\nfunc callTool(name string, args map[string]interface{}) (interface{}, error) {\n\tif name == \"}\" {\n\t\treturn nil, nil\n\t}\n\treturn nil, nil\n}\n\nvar callTool2 = 1\n\nfunc main() {\n\tcallTool(\"x\", nil)\n}\n";
        let out = rewrite_host_calls(code, "callTool");
        assert!(!out.contains("func callTool("), "{out}");
        assert!(out.contains("var callTool2 = 1"));
        assert!(out.contains("func main() {\n\tcallTool(\"x\", nil)\n}"));
    }

    #[test]
    fn colliding_var_is_removed() {
        let code = "package main\nvar bridge = 3\nfunc main() {}\n";
        assert_eq!(
            rewrite_host_calls(code, "bridge"),
            "package main\nfunc main() {}\n"
        );
    }

    #[test]
    fn structure_requires_package_and_main() {
        assert!(validate_structure(PROGRAM).is_ok());
        assert_eq!(
            validate_structure("func main() {}"),
            Err(StructureError::MissingPackageMain)
        );
        assert_eq!(
            validate_structure("package main\nfunc helper() {}"),
            Err(StructureError::MissingMainFunc)
        );
    }

    #[test]
    fn preprocess_extracts_then_rewrites() {
        let raw = "```go\npackage main\nfunc main() { callTool(\"a\", nil) }\n```";
        assert_eq!(
            preprocess(raw, "tool"),
            "package main\nfunc main() { tool(\"a\", nil) }"
        );
    }
}
