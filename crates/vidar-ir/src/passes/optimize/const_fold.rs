use crate::{
    graph::{NodeId, VidarGraph, VidarNode},
    ir::{VidarAggOp, VidarOp},
    passes::{GraphRewritePass, Rewrite},
    util::error::{ConstFoldPassError, MultiPassError, ShapeError},
};

/// Folds ops over `Fill` operands and removes algebraic identities
/// (`x + 0`, `x * 1`, `t(t(x))`).
pub(crate) struct ConstFoldPass;

impl ConstFoldPass {
    fn fold(node: &VidarNode, inputs: &[NodeId], out: &VidarGraph) -> Option<Rewrite> {
        let operand = |i: usize| out.node(inputs[i]);
        let fill = |i: usize| operand(i).and_then(|n| n.op.fill_value());

        match &node.op {
            VidarOp::Unary(un_op) => {
                let v = fill(0)?;
                Some(Rewrite::Replace(
                    VidarOp::fill(un_op.apply(v), node.shape),
                    vec![],
                ))
            }
            VidarOp::ReplaceNaN { value } => {
                let v = fill(0)?;
                let v = if v.is_nan() { f64::from_bits(*value) } else { v };
                Some(Rewrite::Replace(VidarOp::fill(v, node.shape), vec![]))
            }
            VidarOp::Binary(bin_op) => match (fill(0), fill(1)) {
                (Some(a), Some(b)) => Some(Rewrite::Replace(
                    VidarOp::fill(bin_op.apply(a, b), node.shape),
                    vec![],
                )),
                (None, Some(b)) if bin_op.right_identity() == Some(b) => {
                    (operand(0)?.shape == node.shape).then_some(Rewrite::Alias(inputs[0]))
                }
                (Some(a), None) if bin_op.left_identity() == Some(a) => {
                    (operand(1)?.shape == node.shape).then_some(Rewrite::Alias(inputs[1]))
                }
                _ => None,
            },
            VidarOp::Transpose => {
                let input = operand(0)?;
                match &input.op {
                    VidarOp::Transpose => Some(Rewrite::Alias(input.inputs[0])),
                    VidarOp::Fill { value, .. } => Some(Rewrite::Replace(
                        VidarOp::Fill {
                            value: *value,
                            shape: node.shape,
                        },
                        vec![],
                    )),
                    _ => None,
                }
            }
            VidarOp::Agg(agg) => {
                let input = operand(0)?;
                let v = input.op.fill_value()?;
                let folded = match agg {
                    VidarAggOp::Sum => v * input.shape.len() as f64,
                    VidarAggOp::RowSums => v * input.shape.cols as f64,
                    VidarAggOp::ColSums => v * input.shape.rows as f64,
                    VidarAggOp::MinValue | VidarAggOp::MaxValue | VidarAggOp::RowMaxs => v,
                    VidarAggOp::RowIndexMax => 1.0,
                };
                Some(Rewrite::Replace(VidarOp::fill(folded, node.shape), vec![]))
            }
            _ => None,
        }
    }
}

impl GraphRewritePass for ConstFoldPass {
    fn node_pass(
        node: &VidarNode,
        inputs: &[NodeId],
        out: &VidarGraph,
    ) -> Result<Rewrite, MultiPassError> {
        Ok(Self::fold(node, inputs, out).unwrap_or(Rewrite::Keep))
    }

    fn shape_err(op: &VidarOp, err: ShapeError) -> MultiPassError {
        MultiPassError::ConstFold(ConstFoldPassError::Shape(op.name(), err))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        graph::VidarGraph,
        ir::{VidarBinOp, VidarOp, VidarShape, VidarUnOp},
        passes::{GraphPassSettings, graph_pass},
    };

    #[test]
    fn folds_fill_arithmetic() {
        let shape = VidarShape::new(2, 3);
        let mut g = VidarGraph::new();
        let a = g.push(VidarOp::fill(2.0, shape), vec![]).unwrap();
        let b = g.push(VidarOp::fill(3.0, VidarShape::SCALAR), vec![]).unwrap();
        let c = g.push(VidarOp::Binary(VidarBinOp::Mul), vec![a, b]).unwrap();
        let d = g.push(VidarOp::Unary(VidarUnOp::Neg), vec![c]).unwrap();

        let (folded, outputs) = graph_pass(&g, &[d], GraphPassSettings::default()).unwrap();
        assert_eq!(folded.len(), 1);
        assert_eq!(folded.nodes[outputs[0] as usize].op, VidarOp::fill(-6.0, shape));
    }

    #[test]
    fn removes_identities() {
        let mut g = VidarGraph::new();
        let x = g.push(VidarOp::Seq { from: 1, to: 4 }, vec![]).unwrap();
        let one = g.push(VidarOp::fill(1.0, VidarShape::SCALAR), vec![]).unwrap();
        let zero = g.push(VidarOp::fill(0.0, VidarShape::SCALAR), vec![]).unwrap();
        let m = g.push(VidarOp::Binary(VidarBinOp::Mul), vec![x, one]).unwrap();
        let s = g.push(VidarOp::Binary(VidarBinOp::Add), vec![zero, m]).unwrap();
        let t = g.push(VidarOp::Transpose, vec![s]).unwrap();
        let tt = g.push(VidarOp::Transpose, vec![t]).unwrap();

        let (folded, outputs) = graph_pass(&g, &[tt], GraphPassSettings::default()).unwrap();
        assert_eq!(folded.len(), 1);
        assert_eq!(folded.nodes[outputs[0] as usize].op, VidarOp::Seq { from: 1, to: 4 });
    }

    #[test]
    fn does_not_alias_across_broadcasts() {
        // scalar + zero matrix broadcasts, so the scalar cannot stand in for the result
        let mut g = VidarGraph::new();
        let x = g.push(VidarOp::Seq { from: 5, to: 5 }, vec![]).unwrap();
        let zeros = g
            .push(VidarOp::fill(0.0, VidarShape::new(3, 3)), vec![])
            .unwrap();
        let s = g.push(VidarOp::Binary(VidarBinOp::Add), vec![x, zeros]).unwrap();

        let (folded, outputs) = graph_pass(&g, &[s], GraphPassSettings::default()).unwrap();
        assert_eq!(folded.shape(outputs[0]), Some(VidarShape::new(3, 3)));
        assert_eq!(folded.len(), 3);
    }
}
