// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and schema-validating registry.
//!
//! The [`Tool`] trait is the interface every callable function implements.
//! The [`ToolRegistry`] compiles each tool's JSON Schema once at registration
//! and validates arguments before every invocation. [`ToolRegistry::invoke`]
//! never fails: unknown tools, bad arguments, and tool errors all become
//! error [`ToolResult`]s the model can read.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tally_core::{TallyError, ToolCall, ToolDefinition, ToolResult};
use tracing::{debug, warn};

/// A function the model may call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used for lookup and in provider payloads.
    fn name(&self) -> &str;

    /// What the tool does, phrased for the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool on already-validated arguments.
    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError>;
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    schema: Value,
    validator: jsonschema::Validator,
}

/// Registry of available tools, indexed and ordered by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Creates an empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool after compiling its schema.
    ///
    /// Rejects empty names, duplicate names, and schemas that do not compile
    /// or do not describe an object.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), TallyError> {
        let name = tool.name().trim().to_string();
        if name.is_empty() {
            return Err(TallyError::Config("tool name must not be empty".into()));
        }
        if self.tools.contains_key(&name) {
            return Err(TallyError::Config(format!("tool `{name}` is already registered")));
        }

        let schema = tool.parameters_schema();
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(TallyError::Config(format!(
                "tool `{name}` schema must have type \"object\""
            )));
        }
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            TallyError::Config(format!("tool `{name}` has an invalid schema: {e}"))
        })?;

        debug!(tool = %name, "tool registered");
        self.tools.insert(
            name,
            RegisteredTool {
                tool,
                schema,
                validator,
            },
        );
        Ok(())
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| Arc::clone(&entry.tool))
    }

    /// Definition of a single tool.
    pub fn resolve(&self, name: &str) -> Option<ToolDefinition> {
        self.tools.get(name).map(definition)
    }

    /// Definitions of all tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(definition).collect()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Validate arguments for `name`, returning every violation.
    pub fn validate(&self, name: &str, arguments: &Value) -> Result<(), TallyError> {
        let entry = self.tools.get(name).ok_or_else(|| TallyError::ToolValidation {
            tool: name.to_string(),
            message: format!("unknown tool; available tools: {}", self.names().join(", ")),
        })?;

        let violations: Vec<String> = entry
            .validator
            .iter_errors(arguments)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(TallyError::ToolValidation {
                tool: name.to_string(),
                message: violations.join("; "),
            })
        }
    }

    /// Validate and run one call. Always produces a result for `call`.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        if let Err(e) = self.validate(&call.name, &call.arguments) {
            warn!(tool = %call.name, error = %e, "tool call rejected");
            return ToolResult::failure(call, &e);
        }
        let Some(tool) = self.get(&call.name) else {
            // validate() already rejected unknown names.
            return ToolResult::failure(
                call,
                &TallyError::Internal(format!("tool `{}` vanished", call.name)),
            );
        };

        match tool.invoke(call.arguments.clone()).await {
            Ok(output) => {
                debug!(tool = %call.name, "tool call succeeded");
                ToolResult::success(call, output)
            }
            Err(e) => {
                let e = match e {
                    TallyError::ToolValidation { .. } | TallyError::ToolExecution { .. } => e,
                    other => TallyError::ToolExecution {
                        tool: call.name.clone(),
                        message: other.to_string(),
                    },
                };
                warn!(tool = %call.name, error = %e, "tool call failed");
                ToolResult::failure(call, &e)
            }
        }
    }

    /// Returns the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

fn definition(entry: &RegisteredTool) -> ToolDefinition {
    ToolDefinition {
        name: entry.tool.name().to_string(),
        description: entry.tool.description().to_string(),
        input_schema: entry.schema.clone(),
    }
}

/// Deserialize validated arguments into a typed struct.
pub fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, TallyError> {
    serde_json::from_value(arguments).map_err(|e| TallyError::ToolValidation {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Round a currency amount to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
