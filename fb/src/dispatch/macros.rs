//! Macro commands - ordered batches of tool invocations
//!
//! `execute_macro` arrives as `{ "commands": [{ "tool_name", "arguments" }], "macro_id"? }`.
//! Steps may themselves be macros; [`MacroGuard`] bounds the nesting and
//! refuses a macro that re-enters an id already executing.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use tracing::debug;

use super::DispatchError;

/// Tool name of the composite command
pub const MACRO_TOOL: &str = "execute_macro";

/// One step of a macro
#[derive(Debug, Clone, PartialEq)]
pub struct MacroStep {
    pub tool_name: String,
    pub arguments: Value,
}

impl MacroStep {
    pub fn is_macro(&self) -> bool {
        self.tool_name == MACRO_TOOL
    }
}

/// A parsed `execute_macro` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCommand {
    pub id: String,
    pub steps: Vec<MacroStep>,
}

impl MacroCommand {
    /// Parse `execute_macro` arguments
    pub fn parse(args: &Value) -> Result<Self, DispatchError> {
        debug!("MacroCommand::parse: called");
        let commands = args
            .get("commands")
            .and_then(Value::as_array)
            .ok_or_else(|| DispatchError::InvalidArguments("execute_macro requires a 'commands' array".to_string()))?;

        let mut steps = Vec::with_capacity(commands.len());
        for (i, entry) in commands.iter().enumerate() {
            let tool_name = entry
                .get("tool_name")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    DispatchError::InvalidArguments(format!("macro step {} is missing 'tool_name'", i + 1))
                })?;
            let arguments = match entry.get("arguments") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(v @ Value::Object(_)) => v.clone(),
                Some(_) => {
                    return Err(DispatchError::InvalidArguments(format!(
                        "macro step {} has non-object 'arguments'",
                        i + 1
                    )));
                }
            };
            steps.push(MacroStep {
                tool_name: tool_name.to_string(),
                arguments,
            });
        }

        let id = match args.get("macro_id").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => anonymous_id(commands),
        };

        debug!(%id, steps = steps.len(), "MacroCommand::parse: parsed");
        Ok(Self { id, steps })
    }
}

/// Content-derived id for macros the caller did not name
fn anonymous_id(commands: &[Value]) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for c in commands {
        c.to_string().hash(&mut hasher);
    }
    format!("anon-{:016x}", hasher.finish())
}

/// Nesting counter plus the set of macros currently executing
#[derive(Debug)]
pub struct MacroGuard {
    max_depth: usize,
    active: HashSet<String>,
    stack: Vec<String>,
}

impl MacroGuard {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            active: HashSet::new(),
            stack: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    /// Enter macro `id`, failing if that would nest too deep or recurse
    pub fn enter(&mut self, id: &str) -> Result<(), DispatchError> {
        let depth = self.stack.len() + 1;
        debug!(%id, depth, max = self.max_depth, "MacroGuard::enter: called");
        if depth > self.max_depth {
            return Err(DispatchError::MacroDepthExceeded {
                depth,
                max: self.max_depth,
                reason: format!("macro '{}' nests deeper than allowed", id),
            });
        }
        if self.active.contains(id) {
            return Err(DispatchError::MacroDepthExceeded {
                depth,
                max: self.max_depth,
                reason: format!("macro '{}' invokes itself", id),
            });
        }
        self.active.insert(id.to_string());
        self.stack.push(id.to_string());
        Ok(())
    }

    /// Leave the innermost macro
    pub fn exit(&mut self) {
        if let Some(id) = self.stack.pop() {
            debug!(%id, "MacroGuard::exit: called");
            self.active.remove(&id);
        }
    }

    /// Forget every active macro; used when a dispatch was dropped mid-macro
    pub fn reset(&mut self) {
        if !self.stack.is_empty() {
            debug!(depth = self.stack.len(), "MacroGuard::reset: clearing abandoned macros");
        }
        self.stack.clear();
        self.active.clear();
    }

    /// Walk a macro tree without executing anything
    ///
    /// Leaves the guard as it found it whether or not validation passes.
    pub fn validate(
        &mut self,
        command: &MacroCommand,
        is_known: &dyn Fn(&str) -> bool,
    ) -> Result<(), DispatchError> {
        self.enter(&command.id)?;
        let outcome = self.validate_steps(command, is_known);
        self.exit();
        outcome
    }

    fn validate_steps(&mut self, command: &MacroCommand, is_known: &dyn Fn(&str) -> bool) -> Result<(), DispatchError> {
        for step in &command.steps {
            if step.is_macro() {
                let nested = MacroCommand::parse(&step.arguments)?;
                self.validate(&nested, is_known)?;
            } else if !is_known(&step.tool_name) {
                return Err(DispatchError::UnknownTool {
                    name: step.tool_name.clone(),
                });
            }
        }
        Ok(())
    }
}
