use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{
    ir::{VidarOp, VidarShape},
    util::{error::ShapeError, shape::infer_shape},
};

pub type NodeId = u64;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct VidarNode {
    pub op: VidarOp,
    // always ids of nodes pushed before this one
    pub inputs: Vec<NodeId>,
    pub shape: VidarShape,
}

/// Append-only arena of lazily evaluated matrix operations.
///
/// Node ids are indices into the arena, so every node only ever refers to
/// nodes created before it and the arena order is a valid topological order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VidarGraph {
    pub nodes: Vec<VidarNode>,
    // proof that every node went through shape inference
    #[serde(skip)]
    pub(crate) verified: bool,
}

impl Default for VidarGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl VidarGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![],
            verified: true,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn node(&self, id: NodeId) -> Option<&VidarNode> {
        self.nodes.get(id as usize)
    }

    pub fn shape(&self, id: NodeId) -> Option<VidarShape> {
        self.node(id).map(|n| n.shape)
    }

    /// Appends a node after checking that its inputs exist and that their
    /// shapes are valid for `op`.
    pub fn push(&mut self, op: VidarOp, inputs: Vec<NodeId>) -> Result<NodeId, ShapeError> {
        let id = self.nodes.len() as NodeId;

        let mut input_shapes = Vec::with_capacity(inputs.len());
        for input in &inputs {
            match self.shape(*input) {
                Some(shape) => input_shapes.push(shape),
                None => return Err(ShapeError::DanglingInput(id, *input)),
            }
        }

        let shape = infer_shape(&op, &input_shapes)?;
        self.nodes.push(VidarNode { op, inputs, shape });

        Ok(id)
    }

    /// Hash of the node structure, used as a plan cache key.
    ///
    /// `Input` and `Fill` nodes only contribute their shape, so graphs that
    /// differ only in which host arrays they read or in their constant values
    /// share a hash. Plans read both at execution time.
    pub fn structural_hash(&self) -> u64 {
        let mut s = DefaultHasher::new();
        for node in &self.nodes {
            match &node.op {
                VidarOp::Input { shape, .. } => ("input", shape).hash(&mut s),
                VidarOp::Fill { shape, .. } => ("fill", shape).hash(&mut s),
                op => op.hash(&mut s),
            }
            node.inputs.hash(&mut s);
            node.shape.hash(&mut s);
        }
        s.finish()
    }

    /// Values of the `Fill` nodes, in node order.
    pub fn fill_values(&self) -> Vec<f64> {
        self.nodes
            .iter()
            .filter_map(|n| n.op.fill_value())
            .collect()
    }
}
