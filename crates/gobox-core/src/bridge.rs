//! Host functions injected into interpreted guest programs.
//!
//! A bridge is built per call and handed to the interpreted backend; it is
//! never stored on a pooled instance. Values cross the boundary as JSON, so
//! a guest `map[string]interface{}` argument arrives as a JSON object and
//! a host number reaches the guest as `float64`.
//!
//! Guest-side shapes:
//!
//! ```go
//! sum, err := add(map[string]interface{}{"a": 2, "b": 3})
//! hits, err := callTool("search", map[string]interface{}{"q": "rust"})
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// A synchronous host function.
pub type HostFn = Arc<dyn Fn(Map<String, Value>) -> Result<Value, HostError> + Send + Sync>;

/// Dispatch to an external tool registry.
#[async_trait]
pub trait ToolCall: Send + Sync {
    async fn call(&self, name: &str, args: Map<String, Value>) -> Result<Value, HostError>;
}

#[derive(Clone)]
enum Binding {
    Function(HostFn),
    ToolDispatch(Arc<dyn ToolCall>),
}

/// Named host functions for one interpreted execution.
#[derive(Clone, Default)]
pub struct HostFunctionBridge {
    bindings: BTreeMap<String, Binding>,
}

impl std::fmt::Debug for HostFunctionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunctionBridge")
            .field("names", &self.names())
            .finish()
    }
}

impl HostFunctionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `f` as guest function `name(args map[string]interface{})`.
    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        self.bindings
            .insert(name.into(), Binding::Function(Arc::new(f)));
        self
    }

    /// Bind `tool` as guest function `name(tool string, args map[string]interface{})`.
    pub fn with_tool_dispatch(mut self, name: impl Into<String>, tool: Arc<dyn ToolCall>) -> Self {
        self.bindings
            .insert(name.into(), Binding::ToolDispatch(tool));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Lower into interpreter natives. Tool dispatch blocks on `handle`, so
    /// the natives must be called off the runtime's worker threads.
    pub fn into_natives(self, handle: Handle) -> Vec<(String, gobox_interp::NativeFn)> {
        self.bindings
            .into_iter()
            .map(|(name, binding)| {
                let native: gobox_interp::NativeFn = match binding {
                    Binding::Function(f) => {
                        let label = name.clone();
                        Arc::new(move |args: Vec<Value>| {
                            let map = single_object(&label, args)?;
                            f(map).map_err(|e| e.to_string())
                        })
                    }
                    Binding::ToolDispatch(tool) => {
                        let label = name.clone();
                        let handle = handle.clone();
                        Arc::new(move |args: Vec<Value>| {
                            let (tool_name, map) = tool_and_object(&label, args)?;
                            debug!(binding = %label, tool = %tool_name, "dispatching tool call");
                            handle
                                .block_on(tool.call(&tool_name, map))
                                .map_err(|e| e.to_string())
                        })
                    }
                };
                (name, native)
            })
            .collect()
    }
}

fn object_arg(label: &str, value: Option<Value>) -> Result<Map<String, Value>, String> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(HostError::InvalidArguments(format!(
            "{label}: expected a map argument, got {}",
            json_kind(&other)
        ))
        .to_string()),
    }
}

fn single_object(label: &str, args: Vec<Value>) -> Result<Map<String, Value>, String> {
    if args.len() > 1 {
        return Err(HostError::InvalidArguments(format!(
            "{label}: expected at most 1 argument, got {}",
            args.len()
        ))
        .to_string());
    }
    object_arg(label, args.into_iter().next())
}

fn tool_and_object(label: &str, args: Vec<Value>) -> Result<(String, Map<String, Value>), String> {
    if args.is_empty() || args.len() > 2 {
        return Err(HostError::InvalidArguments(format!(
            "{label}: expected (name, args), got {} arguments",
            args.len()
        ))
        .to_string());
    }
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        other => {
            return Err(HostError::InvalidArguments(format!(
                "{label}: tool name must be a string, got {}",
                other.as_ref().map(json_kind).unwrap_or("nothing")
            ))
            .to_string())
        }
    };
    Ok((name, object_arg(label, args.next())?))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
