use std::{collections::HashMap, sync::Arc};

use vidar_ir::{
    graph::{NodeId, VidarGraph},
    ir::VidarOp,
    util::error::ShapeError,
};
use vidar_runtime::generic::array::VidarBuffer;

use super::{ExprNode, Matrix};

/// Expression DAG flattened into a graph arena, ready for execution.
pub(crate) struct Lowered {
    pub(crate) graph: VidarGraph,
    pub(crate) outputs: Vec<NodeId>,
    pub(crate) arrays: HashMap<u64, VidarBuffer>,
    // identical leaves are emitted once
    leaves: HashMap<VidarOp, NodeId>,
}

impl Lowered {
    pub(crate) fn new(outputs: &[&Matrix]) -> Result<Self, ShapeError> {
        let mut lowered = Self {
            graph: VidarGraph::new(),
            outputs: Vec::with_capacity(outputs.len()),
            arrays: HashMap::new(),
            leaves: HashMap::new(),
        };
        // shared subexpressions are emitted once
        let mut seen: HashMap<*const ExprNode, NodeId> = HashMap::new();

        for output in outputs {
            let id = lowered.lower(&output.node, &mut seen)?;
            lowered.outputs.push(id);
        }

        Ok(lowered)
    }

    // Post-order walk with an explicit stack, inputs left to right. Expression
    // chains can be far deeper than the call stack allows.
    fn lower(
        &mut self,
        root: &Arc<ExprNode>,
        seen: &mut HashMap<*const ExprNode, NodeId>,
    ) -> Result<NodeId, ShapeError> {
        let mut stack: Vec<(&ExprNode, bool)> = vec![(root.as_ref(), false)];

        while let Some((node, expanded)) = stack.pop() {
            let key: *const ExprNode = node;
            if seen.contains_key(&key) {
                continue;
            }

            if !expanded && !node.inputs.is_empty() {
                stack.push((node, true));
                for input in node.inputs.iter().rev() {
                    if !seen.contains_key(&Arc::as_ptr(input)) {
                        stack.push((input.as_ref(), false));
                    }
                }
                continue;
            }

            let id = if node.op.is_leaf() {
                self.lower_leaf(node)?
            } else {
                let next = self.graph.len() as NodeId;
                let inputs = node
                    .inputs
                    .iter()
                    .map(|input| {
                        seen.get(&Arc::as_ptr(input))
                            .copied()
                            .ok_or(ShapeError::DanglingInput(next, NodeId::MAX))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.graph.push(node.op.clone(), inputs)?
            };
            seen.insert(key, id);
        }

        seen.get(&Arc::as_ptr(root))
            .copied()
            .ok_or(ShapeError::DanglingInput(self.graph.len() as NodeId, NodeId::MAX))
    }

    fn lower_leaf(&mut self, node: &ExprNode) -> Result<NodeId, ShapeError> {
        if let (VidarOp::Input { array, .. }, Some(buffer)) = (&node.op, &node.data) {
            self.arrays.insert(*array, buffer.clone());
        }
        if let Some(id) = self.leaves.get(&node.op) {
            return Ok(*id);
        }
        let id = self.graph.push(node.op.clone(), vec![])?;
        self.leaves.insert(node.op.clone(), id);
        Ok(id)
    }
}
