use crate::{
    graph::{NodeId, VidarGraph, VidarNode},
    ir::VidarOp,
    passes::{
        optimize::{const_fold::ConstFoldPass, prune::prune_pass},
        safety::shape_pass,
    },
    util::error::{MultiPassError, ShapeError},
};

pub(crate) mod optimize;
pub(crate) mod safety;

pub use optimize::prune::prune_pass as prune;
pub use safety::shape_pass as verify;

pub(crate) enum Rewrite {
    Keep,
    // reuse an already rewritten node
    Alias(NodeId),
    Replace(VidarOp, Vec<NodeId>),
}

pub(crate) trait GraphRewritePass {
    // `inputs` are the node's inputs already remapped into `out`
    fn node_pass(
        node: &VidarNode,
        inputs: &[NodeId],
        out: &VidarGraph,
    ) -> Result<Rewrite, MultiPassError>;

    fn shape_err(_op: &VidarOp, err: ShapeError) -> MultiPassError {
        MultiPassError::Shape(err)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphPassSettings {
    pub const_fold_pass: bool,
    pub prune_pass: bool,
}

impl Default for GraphPassSettings {
    fn default() -> Self {
        Self {
            const_fold_pass: true,
            prune_pass: true,
        }
    }
}

/// Prepares a graph for execution of `outputs`.
///
/// Unverified graphs (i.e. deserialized ones) are shape checked first. The
/// returned output ids refer to the returned graph.
pub fn graph_pass(
    graph: &VidarGraph,
    outputs: &[NodeId],
    settings: GraphPassSettings,
) -> Result<(VidarGraph, Vec<NodeId>), MultiPassError> {
    let mut ret_graph = if graph.is_verified() {
        graph.clone()
    } else {
        shape_pass(graph).map_err(MultiPassError::Shape)?
    };
    let mut ret_outputs = outputs.to_vec();

    if settings.prune_pass {
        (ret_graph, ret_outputs) = prune_pass(&ret_graph, &ret_outputs)?;
    }

    if settings.const_fold_pass {
        (ret_graph, ret_outputs) = run_graph_pass::<ConstFoldPass>(&ret_graph, &ret_outputs)?;

        // folded nodes leave their old operands behind
        if settings.prune_pass {
            (ret_graph, ret_outputs) = prune_pass(&ret_graph, &ret_outputs)?;
        }
    }

    Ok((ret_graph, ret_outputs))
}

pub(crate) fn run_graph_pass<P>(
    graph: &VidarGraph,
    outputs: &[NodeId],
) -> Result<(VidarGraph, Vec<NodeId>), MultiPassError>
where
    P: GraphRewritePass,
{
    let mut out = VidarGraph::new();
    let mut remap: Vec<NodeId> = Vec::with_capacity(graph.len());

    for node in &graph.nodes {
        let inputs = node
            .inputs
            .iter()
            .map(|i| remap[*i as usize])
            .collect::<Vec<_>>();

        let new_id = match P::node_pass(node, &inputs, &out)? {
            Rewrite::Keep => out
                .push(node.op.clone(), inputs)
                .map_err(|e| P::shape_err(&node.op, e))?,
            Rewrite::Alias(id) => id,
            Rewrite::Replace(op, new_inputs) => {
                let id = out
                    .push(op, new_inputs)
                    .map_err(|e| P::shape_err(&node.op, e))?;
                if out.shape(id) != Some(node.shape) {
                    return Err(P::shape_err(
                        &node.op,
                        ShapeError::RecordedShapeMismatch(id, node.shape, out.nodes[id as usize].shape),
                    ));
                }
                id
            }
        };
        remap.push(new_id);
    }

    let outputs = outputs
        .iter()
        .map(|o| remap[*o as usize])
        .collect::<Vec<_>>();

    Ok((out, outputs))
}
