use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
};

use postcard::{from_bytes, to_allocvec};
use serde::{Deserialize, Serialize};

use crate::{
    graph::{NodeId, VidarGraph},
    ir::{VidarOp, VidarShape},
    ir_validation_err,
    util::error::IRError,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VidarHostArray {
    pub shape: VidarShape,
    // row-major
    pub data: Vec<f64>,
}

/// A self-contained bundle of a graph, the outputs of interest and the host
/// arrays its `Input` nodes reference.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VidarIRData {
    pub graph: VidarGraph,
    pub outputs: Vec<NodeId>,
    pub arrays: BTreeMap<u64, VidarHostArray>,
}

impl VidarIRData {
    pub fn save(ir: &VidarIRData, write: &mut dyn Write) -> Result<(), IRError> {
        let bytes: Vec<u8> = to_allocvec(ir)
            .map_err(|e| IRError::Serialization(e.to_string()))?
            .to_vec();

        write.write_all(&bytes).map_err(IRError::Io)?;

        Ok(())
    }

    /// Loads and validates a bundle. The graph comes back unverified and is
    /// shape checked again before execution.
    pub fn load(read: &mut dyn BufRead) -> Result<VidarIRData, IRError> {
        let mut bytes: Vec<u8> = vec![];

        let _ = read.read_to_end(&mut bytes).map_err(IRError::Io)?;

        let ir_data: VidarIRData =
            from_bytes(&bytes).map_err(|e| IRError::Deserialization(e.to_string()))?;

        for node in &ir_data.graph.nodes {
            let VidarOp::Input { array, shape } = node.op else {
                continue;
            };
            match ir_data.arrays.get(&array) {
                Some(host) if host.data.len() != host.shape.len() => {
                    return ir_validation_err!(
                        "array `{}` holds {} values but is declared as `{}`",
                        array,
                        host.data.len(),
                        host.shape
                    );
                }
                Some(host) if host.shape != shape => {
                    return ir_validation_err!(
                        "array `{}` is a `{}` matrix but its input node expects `{}`",
                        array,
                        host.shape,
                        shape
                    );
                }
                Some(_) => {}
                None => return ir_validation_err!("array `{}` is missing from the bundle", array),
            }
        }

        for output in &ir_data.outputs {
            if *output as usize >= ir_data.graph.len() {
                return ir_validation_err!("output `{}` is not a node of the graph", output);
            }
        }

        Ok(ir_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{VidarAggOp, VidarOp};

    fn bundle() -> VidarIRData {
        let shape = VidarShape::new(2, 2);
        let mut graph = VidarGraph::new();
        let x = graph.push(VidarOp::Input { array: 7, shape }, vec![]).unwrap();
        let s = graph.push(VidarOp::Agg(VidarAggOp::Sum), vec![x]).unwrap();

        let mut arrays = BTreeMap::new();
        arrays.insert(
            7,
            VidarHostArray {
                shape,
                data: vec![1.0, 2.0, 3.0, 4.0],
            },
        );

        VidarIRData {
            graph,
            outputs: vec![s],
            arrays,
        }
    }

    #[test]
    fn save_then_load() {
        let ir = bundle();
        let mut bytes = vec![];
        VidarIRData::save(&ir, &mut bytes).unwrap();

        let loaded = VidarIRData::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(loaded.graph.nodes, ir.graph.nodes);
        assert_eq!(loaded.arrays, ir.arrays);
        assert!(!loaded.graph.is_verified());
    }

    #[test]
    fn missing_arrays_are_rejected() {
        let mut ir = bundle();
        ir.arrays.clear();
        let mut bytes = vec![];
        VidarIRData::save(&ir, &mut bytes).unwrap();

        assert!(matches!(
            VidarIRData::load(&mut bytes.as_slice()),
            Err(IRError::Validation(_))
        ));
    }

    #[test]
    fn transposed_arrays_are_rejected() {
        let mut ir = bundle();
        let mut graph = VidarGraph::new();
        let x = graph
            .push(
                VidarOp::Input {
                    array: 7,
                    shape: VidarShape::new(3, 2),
                },
                vec![],
            )
            .unwrap();
        graph.push(VidarOp::Agg(VidarAggOp::Sum), vec![x]).unwrap();
        ir.graph = graph;
        ir.arrays.insert(
            7,
            VidarHostArray {
                shape: VidarShape::new(2, 3),
                data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            },
        );

        let mut bytes = vec![];
        VidarIRData::save(&ir, &mut bytes).unwrap();
        assert!(matches!(
            VidarIRData::load(&mut bytes.as_slice()),
            Err(IRError::Validation(_))
        ));
    }

    #[test]
    fn garbage_fails_to_deserialize() {
        let bytes = [0xffu8; 3];
        assert!(matches!(
            VidarIRData::load(&mut bytes.as_slice()),
            Err(IRError::Deserialization(_))
        ));
    }
}
