//! Tool catalog
//!
//! The declarative list of tools the host add-in understands. The dispatcher
//! only needs it as the set of valid names; the MCP layer also serves the
//! descriptors to clients and reads numeric defaults from the schemas.

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::coerce::{NumericField, coerce_number_fields};
use crate::dispatch::MACRO_TOOL;

pub mod embedded;

/// One tool as advertised to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|props| props.iter())
    }
}

/// Ordered set of tool descriptors, indexed by name
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// The catalog compiled into the binary
    pub fn embedded() -> Result<Self> {
        debug!("ToolCatalog::embedded: called");
        Self::from_json(embedded::TOOLS_JSON).context("Embedded tool catalog is invalid")
    }

    /// Parse a JSON array of descriptors
    pub fn from_json(json: &str) -> Result<Self> {
        debug!(len = json.len(), "ToolCatalog::from_json: called");
        let tools: Vec<ToolDescriptor> = serde_json::from_str(json).context("Failed to parse tool catalog")?;

        let mut index = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if tool.name.trim().is_empty() {
                bail!("Tool at position {} has an empty name", i);
            }
            if index.insert(tool.name.clone(), i).is_some() {
                bail!("Duplicate tool name in catalog: {}", tool.name);
            }
        }
        if !index.contains_key(MACRO_TOOL) {
            bail!("Tool catalog does not declare {}", MACRO_TOOL);
        }

        debug!(count = tools.len(), "ToolCatalog::from_json: loaded");
        Ok(Self { tools, index })
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Numeric properties of `name` that declare a default
    ///
    /// `integer` properties coerce to integers; `minimum`/`maximum` become bounds.
    pub fn numeric_defaults(&self, name: &str) -> Vec<NumericField> {
        let Some(tool) = self.get(name) else {
            return Vec::new();
        };

        tool.properties()
            .filter_map(|(prop, schema)| {
                let default = schema.get("default").and_then(Value::as_f64)?;
                let field = match schema.get("type").and_then(Value::as_str)? {
                    "number" => NumericField::number(prop.as_str(), default),
                    "integer" => NumericField::integer(prop.as_str(), default.round() as i64),
                    _ => return None,
                };
                let min = schema.get("minimum").and_then(Value::as_f64).unwrap_or(field.min);
                let max = schema.get("maximum").and_then(Value::as_f64).unwrap_or(field.max);
                Some(field.with_bounds(min, max))
            })
            .collect()
    }

    /// Coerce the numeric arguments of a call to `name` in place
    ///
    /// Recurses into `execute_macro` steps. Returns how many fields changed.
    pub fn normalize_arguments(&self, name: &str, args: &mut Value) -> usize {
        let mut touched = 0;
        if name == MACRO_TOOL {
            if let Some(commands) = args.get_mut("commands").and_then(Value::as_array_mut) {
                for step in commands {
                    let Some(tool_name) = step.get("tool_name").and_then(Value::as_str).map(str::to_string) else {
                        continue;
                    };
                    if let Some(step_args) = step.get_mut("arguments") {
                        touched += self.normalize_arguments(&tool_name, step_args);
                    }
                }
            }
            return touched;
        }

        touched += coerce_number_fields(args, &self.numeric_defaults(name));
        if touched > 0 {
            debug!(%name, touched, "ToolCatalog::normalize_arguments: coerced fields");
        }
        touched
    }
}
