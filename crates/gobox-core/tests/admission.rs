//! Validator and preprocessor behavior on realistic generated text.

use gobox_core::{
    extract_code, preprocess, validate_structure, EngineConfig, ValidationError, ValidationPolicy,
    Validator,
};

fn default_validator() -> Validator {
    Validator::new(EngineConfig::default().validation.into())
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

#[test]
fn source_over_the_limit_is_size_exceeded() {
    let v = Validator::new(ValidationPolicy {
        max_source_bytes: 64,
        ..ValidationPolicy::default()
    });
    let src = format!("package main\nfunc main() {{}}\n// {}\n", "x".repeat(64));
    match v.validate(&src) {
        Err(ValidationError::SizeExceeded { size, limit }) => {
            assert_eq!(size, src.len());
            assert_eq!(limit, 64);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn empty_and_whitespace_sources_are_empty() {
    let v = default_validator();
    for src in ["", " ", "\n\t\n"] {
        assert_eq!(v.validate(src), Err(ValidationError::Empty), "{src:?}");
    }
}

#[test]
fn every_default_forbidden_import_is_rejected() {
    let v = default_validator();
    for path in &EngineConfig::default().validation.forbidden_imports {
        let single = format!("package main\nimport \"{path}\"\nfunc main() {{}}\n");
        let grouped = format!("package main\nimport (\n\t\"fmt\"\n\t\"{path}\"\n)\nfunc main() {{}}\n");
        for src in [single, grouped] {
            assert_eq!(
                v.validate(&src),
                Err(ValidationError::ForbiddenImport(path.clone())),
                "{src}"
            );
        }
    }
}

#[test]
fn every_default_directive_is_rejected() {
    let v = default_validator();
    for directive in &EngineConfig::default().validation.forbidden_directives {
        let src = format!("package main\n{directive} something\nfunc main() {{}}\n");
        assert_eq!(
            v.validate(&src),
            Err(ValidationError::ForbiddenDirective(directive.clone()))
        );
    }
}

#[test]
fn ordinary_programs_pass() {
    let src = "package main\n\nimport (\n\t\"encoding/json\"\n\t\"fmt\"\n\t\"strings\"\n)\n\nfunc main() {\n\tb, _ := json.Marshal(strings.Fields(\"a b\"))\n\tfmt.Println(string(b))\n}\n";
    assert_eq!(default_validator().validate(src), Ok(()));
}

#[test]
fn import_forms_valid_in_go_are_all_checked() {
    let v = Validator::default();
    for src in [
        "package main; import \"os/exec\"\nfunc main() {}\n",
        "package main\nimport `os/exec`\nfunc main() {}\n",
        "package main\nimport /* x */ \"os/exec\"\nfunc main() {}\n",
        "package main\nimport (\n\t\"fmt\" // :)\n\t\"os/exec\"\n)\nfunc main() {}\n",
    ] {
        assert_eq!(
            v.validate(src),
            Err(ValidationError::ForbiddenImport("os/exec".into())),
            "{src}"
        );
    }
}

#[test]
fn size_is_checked_before_imports() {
    let v = Validator::new(ValidationPolicy {
        max_source_bytes: 10,
        ..ValidationPolicy::default()
    });
    let src = "package main\nimport \"os/exec\"\nfunc main() {}\n";
    assert!(matches!(
        v.validate(src),
        Err(ValidationError::SizeExceeded { .. })
    ));
}

// ---------------------------------------------------------------------------
// Preprocessor
// ---------------------------------------------------------------------------

const PROGRAM: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hello\")\n}";

#[test]
fn fenced_program_round_trips_through_extract() {
    for tag in ["go", ""] {
        let raw = format!("Explanation first.\n\n```{tag}\n{PROGRAM}\n```\n\nAnd a closing remark.");
        assert_eq!(extract_code(&raw), PROGRAM);
    }
}

#[test]
fn only_the_first_fenced_block_is_taken() {
    let raw = format!("```go\n{PROGRAM}\n```\n\n```bash\ngo run main.go\n```");
    assert_eq!(extract_code(&raw), PROGRAM);
}

#[test]
fn prose_around_a_lone_fence_is_dropped() {
    let opened = format!("Here is the program:\n```go\n{PROGRAM}");
    assert_eq!(extract_code(&opened), PROGRAM);
    let closed = format!("{PROGRAM}\n```\nDone.");
    assert_eq!(extract_code(&closed), PROGRAM);
}

#[test]
fn extracted_code_passes_structure_check() {
    let raw = format!("```golang\n{PROGRAM}\n```");
    assert!(validate_structure(&extract_code(&raw)).is_ok());
}

#[test]
fn preprocess_rebinds_host_calls() {
    let raw = "```go\npackage main\n\nfunc callTool(n string, a map[string]interface{}) (interface{}, error) {\n\treturn nil, nil\n}\n\nfunc main() {\n\tcallTool(\"x\", nil)\n}\n```";
    let out = preprocess(raw, "host");
    assert!(!out.contains("callTool"), "{out}");
    assert!(out.contains("func main() {\n\thost(\"x\", nil)\n}"), "{out}");
    assert!(!out.contains("func host("), "{out}");
}
