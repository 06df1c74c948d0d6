use crate::{
    graph::{NodeId, VidarGraph},
    util::error::{MultiPassError, PrunePassError},
};

/// Drops every node that does not contribute to `outputs`.
pub fn prune_pass(
    graph: &VidarGraph,
    outputs: &[NodeId],
) -> Result<(VidarGraph, Vec<NodeId>), MultiPassError> {
    let mut live = vec![false; graph.len()];
    for output in outputs {
        if *output as usize >= graph.len() {
            return Err(MultiPassError::Prune(PrunePassError::UnknownOutput(
                *output,
                graph.len(),
            )));
        }
        live[*output as usize] = true;
    }

    // inputs always precede their consumers
    for idx in (0..graph.len()).rev() {
        if live[idx] {
            for input in &graph.nodes[idx].inputs {
                live[*input as usize] = true;
            }
        }
    }

    let mut ret = VidarGraph::new();
    ret.verified = graph.verified;
    let mut remap = vec![NodeId::MAX; graph.len()];
    for (idx, node) in graph.nodes.iter().enumerate() {
        if !live[idx] {
            continue;
        }
        let mut node = node.clone();
        for input in node.inputs.iter_mut() {
            *input = remap[*input as usize];
        }
        remap[idx] = ret.nodes.len() as NodeId;
        ret.nodes.push(node);
    }

    let outputs = outputs.iter().map(|o| remap[*o as usize]).collect();
    Ok((ret, outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{VidarAggOp, VidarOp};

    #[test]
    fn keeps_only_reachable_nodes() {
        let mut g = VidarGraph::new();
        let a = g.push(VidarOp::Seq { from: 1, to: 5 }, vec![]).unwrap();
        let _unused = g.push(VidarOp::Transpose, vec![a]).unwrap();
        let sum = g.push(VidarOp::Agg(VidarAggOp::Sum), vec![a]).unwrap();

        let (pruned, outputs) = prune_pass(&g, &[sum]).unwrap();
        assert_eq!(pruned.len(), 2);
        assert_eq!(outputs, vec![1]);
        assert_eq!(pruned.nodes[1].inputs, vec![0]);
    }

    #[test]
    fn unknown_outputs_fail() {
        let g = VidarGraph::new();
        assert_eq!(
            prune_pass(&g, &[3]),
            Err(MultiPassError::Prune(PrunePassError::UnknownOutput(3, 0)))
        );
    }
}
