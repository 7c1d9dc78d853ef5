// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow definition DTOs, bit-exact against the editor's JSON.
//!
//! Unknown fields are captured and re-serialized verbatim so definitions
//! survive export/import round-trips from newer editors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node types the translator understands. Unknown tags are skipped with a
/// warning rather than failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Start,
    End,
    Decision,
    Parallel,
    Join,
    ActionCommand,
    ActionScript,
    ActionHttp,
    ActionFileTransfer,
    ActionDatabase,
    ActionNotification,
    ConditionIf,
    ConditionWhile,
    ConditionForEach,
    DataTransform,
    DataValidate,
    DataAggregate,
}

impl NodeType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "start" => NodeType::Start,
            "end" => NodeType::End,
            "decision" => NodeType::Decision,
            "parallel" => NodeType::Parallel,
            "join" => NodeType::Join,
            "action.command" => NodeType::ActionCommand,
            "action.script" => NodeType::ActionScript,
            "action.http" => NodeType::ActionHttp,
            "action.file_transfer" => NodeType::ActionFileTransfer,
            "action.database" => NodeType::ActionDatabase,
            "action.notification" => NodeType::ActionNotification,
            "condition.if" => NodeType::ConditionIf,
            "condition.while" => NodeType::ConditionWhile,
            "condition.for_each" => NodeType::ConditionForEach,
            "data.transform" => NodeType::DataTransform,
            "data.validate" => NodeType::DataValidate,
            "data.aggregate" => NodeType::DataAggregate,
            _ => return None,
        })
    }

    /// Flow anchors order the graph but emit no step.
    pub fn is_flow_anchor(&self) -> bool {
        matches!(self, NodeType::Start | NodeType::End | NodeType::Join)
    }

    /// Loop nodes bound cycles through their `max_iterations` payload.
    pub fn is_loop(&self) -> bool {
        matches!(self, NodeType::ConditionWhile | NodeType::ConditionForEach)
    }
}

/// Declared workflow parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParameterDecl {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
    /// Presentation only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl NodeDef {
    pub fn parsed_type(&self) -> Option<NodeType> {
        NodeType::from_tag(&self.node_type)
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn data_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }

    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    /// Distinguishes outgoing branches on decision/parallel nodes.
    #[serde(default, rename = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, rename = "targetHandle", skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A complete workflow definition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ParameterDecl>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl WorkflowDefinition {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    pub fn node(&self, id: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of a node, in definition order.
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeDef> {
        self.edges.iter().filter(move |e| e.source == id)
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
