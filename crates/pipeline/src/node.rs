//! The record shape of a single executable pipeline node.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{NodeId, NodeType};

/// A single executable node in a [`crate::Pipeline`].
///
/// The node's behavior is described entirely by its [`NodeType`] tag and the
/// free-form `config` payload. Interpretation of both belongs to the pipeline
/// executor, not to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericNode {
    /// Identifier of this node; equal to its key in the owning pipeline.
    pub id: NodeId,

    /// The executable kind of this node.
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Type-specific configuration (selectors, URLs, transforms, ...).
    #[serde(default)]
    pub config: Value,

    /// Upstream nodes whose output feeds this node, in evaluation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<NodeId>,
}

impl GenericNode {
    /// Creates a node with an empty (`null`) configuration and no inputs.
    pub fn new(id: NodeId, node_type: NodeType) -> Self {
        Self {
            id,
            node_type,
            config: Value::Null,
            inputs: Vec::new(),
        }
    }

    /// Replaces the node configuration.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Appends an upstream input.
    #[must_use]
    pub fn with_input(mut self, input: NodeId) -> Self {
        self.inputs.push(input);
        self
    }
}
