//! The [`Pipeline`] node map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{GenericNode, NodeId};

/// A pipeline: a mapping from [`NodeId`] to [`GenericNode`].
///
/// Edges are expressed through each node's `inputs`. The pipeline does not
/// enforce that inputs resolve; use [`Pipeline::dangling_inputs`] to find
/// references to absent nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    nodes: BTreeMap<NodeId, GenericNode>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `node` under its own id, returning the node it replaced.
    pub fn insert(&mut self, node: GenericNode) -> Option<GenericNode> {
        self.nodes.insert(node.id.clone(), node)
    }

    /// Returns the node with the given id.
    pub fn get(&self, id: &NodeId) -> Option<&GenericNode> {
        self.nodes.get(id)
    }

    /// Removes and returns the node with the given id.
    pub fn remove(&mut self, id: &NodeId) -> Option<GenericNode> {
        self.nodes.remove(id)
    }

    /// Returns `true` if a node with the given id exists.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes in the pipeline.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the pipeline has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &GenericNode)> {
        self.nodes.iter()
    }

    /// Returns `(node, missing input)` pairs for every input that does not
    /// resolve to a node in this pipeline.
    pub fn dangling_inputs(&self) -> Vec<(&NodeId, &NodeId)> {
        self.nodes
            .values()
            .flat_map(|node| {
                node.inputs
                    .iter()
                    .filter(|input| !self.nodes.contains_key(*input))
                    .map(move |input| (&node.id, input))
            })
            .collect()
    }
}

impl FromIterator<GenericNode> for Pipeline {
    fn from_iter<I: IntoIterator<Item = GenericNode>>(iter: I) -> Self {
        let mut pipeline = Self::new();
        for node in iter {
            pipeline.insert(node);
        }
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::NodeType;

    fn node(id: &str, kind: &str) -> GenericNode {
        GenericNode::new(NodeId::new(id).unwrap(), NodeType::new(kind).unwrap())
    }

    #[test]
    fn insert_replaces_node_with_same_id() {
        let mut pipeline = Pipeline::new();
        assert!(pipeline.insert(node("a", "fetch")).is_none());
        let replaced = pipeline.insert(node("a", "extract")).unwrap();
        assert_eq!(replaced.node_type.as_str(), "fetch");
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn dangling_inputs_lists_unresolved_references() {
        let pipeline: Pipeline = [
            node("a", "fetch"),
            node("b", "extract")
                .with_input(NodeId::new("a").unwrap())
                .with_input(NodeId::new("ghost").unwrap()),
        ]
        .into_iter()
        .collect();

        let dangling = pipeline.dangling_inputs();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].0.as_str(), "b");
        assert_eq!(dangling[0].1.as_str(), "ghost");
    }

    #[test]
    fn serializes_as_object_keyed_by_node_id() {
        let pipeline: Pipeline = [node("fetch", "fetch")
            .with_config(json!({ "url": "https://example.com" }))]
        .into_iter()
        .collect();

        let value = serde_json::to_value(&pipeline).unwrap();
        assert_eq!(
            value,
            json!({
                "fetch": {
                    "id": "fetch",
                    "type": "fetch",
                    "config": { "url": "https://example.com" }
                }
            })
        );

        let back: Pipeline = serde_json::from_value(value).unwrap();
        assert_eq!(back, pipeline);
    }
}
