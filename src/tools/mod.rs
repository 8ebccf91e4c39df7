//! # Banking tools
//!
//! Functions the assistant can call once a query has been routed. Each tool is a plain
//! typed Rust function (e.g. [`loans::calculate_emi`]) plus a [`Tool`] wrapper that
//! accepts and returns JSON, so an agent layer can discover tools through
//! [`ToolDefinition`] and invoke them by name through the [`ToolRegistry`].
//!
//! | Tool                   | Module        |
//! |------------------------|---------------|
//! | `calculate_emi`        | [`loans`]     |
//! | `recommend_card`       | [`cards`]     |
//! | `suggest_fd_ladder`    | [`savings`]   |
//! | `search_policy`        | [`policy`]    |
//! | `get_forex_rates`      | [`forex`]     |
//! | `handle_fraud_dispute` | [`fraud`]     |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::embeddings::Embedder;
use crate::error::RouterError;

pub mod cards;
pub mod forex;
pub mod fraud;
pub mod loans;
pub mod policy;
pub mod savings;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unsupported currency: {0}")]
    UnknownCurrency(String),

    #[error("bad tool arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Name, description and JSON-schema parameters of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A callable tool with JSON arguments and output.
pub trait Tool {
    fn name(&self) -> &'static str;

    fn definition(&self) -> ToolDefinition;

    fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Deserialize arguments, run `f`, serialize its output.
pub(crate) fn call_typed<A, O, F>(args: Value, f: F) -> Result<Value, ToolError>
where
    A: serde::de::DeserializeOwned,
    O: Serialize,
    F: FnOnce(A) -> Result<O, ToolError>,
{
    let args: A = serde_json::from_value(args)?;
    Ok(serde_json::to_value(f(args)?)?)
}

/// Round to two decimals (paise).
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Tools addressable by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the tools installed by [`ToolRegistry::with_defaults`].
    pub fn builtin_tool_names() -> &'static [&'static str] {
        &[
            loans::TOOL_NAME,
            cards::TOOL_NAME,
            savings::TOOL_NAME,
            policy::TOOL_NAME,
            forex::TOOL_NAME,
            fraud::TOOL_NAME,
        ]
    }

    /// Registry with every built-in tool. Policy search indexes the bundled policy
    /// sections with `embedder`.
    pub fn with_defaults(embedder: Box<dyn Embedder>) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        registry.register(Box::new(loans::EmiTool));
        registry.register(Box::new(cards::CardTool));
        registry.register(Box::new(savings::FdLadderTool));
        registry.register(Box::new(policy::PolicySearch::with_default_policies(embedder)?));
        registry.register(Box::new(forex::ForexDesk::default()));
        registry.register(Box::new(fraud::FraudDisputeTool));
        Ok(registry)
    }

    /// Add or replace a tool.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Call a tool by name.
    pub fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        debug!("Calling tool {name} with {args}");
        tool.call(args)
    }
}
