//! Static security gate over guest source.
//!
//! Runs before any compiler or interpreter resource is touched. Checks are
//! ordered: size, emptiness, imports, directives. The first failure wins.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::config::ValidationConfig;
use crate::error::ValidationError;
use crate::scan::{scan, TokenKind};

/// What the validator rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub max_source_bytes: usize,
    /// A path is forbidden when it equals an entry or lives under it
    /// (`net` also blocks `net/smtp`).
    pub forbidden_imports: BTreeSet<String>,
    pub forbidden_directives: Vec<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        ValidationConfig::default().into()
    }
}

impl From<ValidationConfig> for ValidationPolicy {
    fn from(config: ValidationConfig) -> Self {
        Self {
            max_source_bytes: config.max_source_bytes,
            forbidden_imports: config.forbidden_imports.into_iter().collect(),
            forbidden_directives: config.forbidden_directives,
        }
    }
}

impl ValidationPolicy {
    fn forbids_import(&self, path: &str) -> bool {
        self.forbidden_imports.iter().any(|forbidden| {
            path == forbidden
                || path
                    .strip_prefix(forbidden.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Thread-safe validator. The policy can be extended at runtime but never
/// relaxed.
#[derive(Debug, Default)]
pub struct Validator {
    policy: RwLock<ValidationPolicy>,
}

impl Validator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn forbid_import(&self, path: impl Into<String>) {
        self.policy
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .forbidden_imports
            .insert(path.into());
    }

    pub fn forbid_directive(&self, directive: impl Into<String>) {
        let directive = directive.into();
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        if !policy.forbidden_directives.contains(&directive) {
            policy.forbidden_directives.push(directive);
        }
    }

    pub fn validate(&self, source: &str) -> Result<(), ValidationError> {
        let policy = self.policy.read().unwrap_or_else(PoisonError::into_inner);

        if source.len() > policy.max_source_bytes {
            return Err(ValidationError::SizeExceeded {
                size: source.len(),
                limit: policy.max_source_bytes,
            });
        }
        if source.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        for path in import_paths(source) {
            if policy.forbids_import(&path) {
                debug!(import = %path, "rejecting forbidden import");
                return Err(ValidationError::ForbiddenImport(path));
            }
        }
        for directive in &policy.forbidden_directives {
            if source.contains(directive.as_str()) {
                debug!(directive = %directive, "rejecting forbidden directive");
                return Err(ValidationError::ForbiddenDirective(directive.clone()));
            }
        }
        Ok(())
    }
}

/// Import paths in single (`import "p"`, `import x "p"`) and grouped
/// (`import ( ... )`) form, wherever the `import` keyword appears. Comments
/// are skipped and both string forms are decoded, so a path is seen the
/// way the Go toolchain would see it.
pub fn import_paths(source: &str) -> Vec<String> {
    let tokens = scan(source);
    let mut paths = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let is_import =
            tokens[i].kind == TokenKind::Ident && tokens[i].text(source) == "import";
        i += 1;
        if !is_import {
            continue;
        }
        match tokens.get(i).map(|t| &t.kind) {
            Some(TokenKind::LParen) => {
                i += 1;
                while let Some(token) = tokens.get(i) {
                    match &token.kind {
                        TokenKind::RParen => break,
                        TokenKind::Str(path) => paths.push(path.clone()),
                        _ => {}
                    }
                    i += 1;
                }
            }
            Some(TokenKind::Ident | TokenKind::Dot) => {
                if let Some(TokenKind::Str(path)) = tokens.get(i + 1).map(|t| &t.kind) {
                    paths.push(path.clone());
                    i += 2;
                }
            }
            Some(TokenKind::Str(path)) => {
                paths.push(path.clone());
                i += 1;
            }
            _ => {}
        }
    }
    paths
}
