use crate::{
    graph::VidarGraph,
    util::{error::ShapeError, shape::infer_shape},
};

/// Re-runs shape inference over every node and marks the graph verified.
pub fn shape_pass(graph: &VidarGraph) -> Result<VidarGraph, ShapeError> {
    for (idx, node) in graph.nodes.iter().enumerate() {
        let id = idx as u64;
        let mut input_shapes = Vec::with_capacity(node.inputs.len());
        for input in &node.inputs {
            if *input >= id {
                return Err(ShapeError::DanglingInput(id, *input));
            }
            input_shapes.push(graph.nodes[*input as usize].shape);
        }

        let shape = infer_shape(&node.op, &input_shapes)?;
        if shape != node.shape {
            return Err(ShapeError::RecordedShapeMismatch(id, node.shape, shape));
        }
    }

    let mut ret = graph.clone();
    ret.verified = true;
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::VidarNode,
        ir::{VidarOp, VidarShape},
    };

    #[test]
    fn rejects_forward_references() {
        let mut g = VidarGraph::new();
        g.nodes.push(VidarNode {
            op: VidarOp::Transpose,
            inputs: vec![1],
            shape: VidarShape::new(2, 2),
        });
        g.verified = false;
        assert_eq!(shape_pass(&g), Err(ShapeError::DanglingInput(0, 1)));
    }

    #[test]
    fn rejects_tampered_shapes() {
        let mut g = VidarGraph::new();
        let a = g.push(VidarOp::Seq { from: 1, to: 3 }, vec![]).unwrap();
        g.push(VidarOp::Transpose, vec![a]).unwrap();
        g.nodes[1].shape = VidarShape::new(3, 1);
        g.verified = false;

        assert_eq!(
            shape_pass(&g),
            Err(ShapeError::RecordedShapeMismatch(
                1,
                VidarShape::new(3, 1),
                VidarShape::new(1, 3)
            ))
        );
    }

    #[test]
    fn marks_valid_graphs_verified() {
        let mut g = VidarGraph::new();
        g.push(VidarOp::Seq { from: 1, to: 3 }, vec![]).unwrap();
        g.verified = false;
        assert!(shape_pass(&g).unwrap().is_verified());
    }
}
