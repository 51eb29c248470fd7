//! Embedded tool catalog
//!
//! Compiled into the binary from `catalog/tools.json`.

/// JSON array of tool descriptors
pub const TOOLS_JSON: &str = include_str!("../../catalog/tools.json");
