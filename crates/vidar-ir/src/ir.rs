use serde::{Deserialize, Serialize};

//
// The graph IR is rebuilt for every session and only persisted through `io`.
// Op encodings may still change between versions.

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VidarShape {
    pub rows: usize,
    pub cols: usize,
}

impl VidarShape {
    pub const SCALAR: VidarShape = VidarShape { rows: 1, cols: 1 };

    #[inline]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    #[inline]
    pub fn is_row_vector(&self) -> bool {
        self.rows == 1
    }

    #[inline]
    pub fn is_col_vector(&self) -> bool {
        self.cols == 1
    }

    pub fn transposed(&self) -> Self {
        Self {
            rows: self.cols,
            cols: self.rows,
        }
    }
}

impl std::fmt::Display for VidarShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VidarUnOp {
    Neg,
    Not,
    Exp,
    // natural logarithm
    Log,
    Sqrt,
    Abs,
    IsNaN,
}

impl VidarUnOp {
    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            VidarUnOp::Neg => -x,
            VidarUnOp::Not => bool_to_f64(x == 0.0),
            VidarUnOp::Exp => x.exp(),
            VidarUnOp::Log => x.ln(),
            VidarUnOp::Sqrt => x.sqrt(),
            VidarUnOp::Abs => x.abs(),
            VidarUnOp::IsNaN => bool_to_f64(x.is_nan()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VidarBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
    Lt,  // <
    Lte, // <=
    Gt,  // >
    Gte, // >=
    Eq,  // ==
    Ne,  // !=
    And,
    Or,
}

impl VidarBinOp {
    #[inline]
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            VidarBinOp::Add => a + b,
            VidarBinOp::Sub => a - b,
            VidarBinOp::Mul => a * b,
            VidarBinOp::Div => a / b,
            VidarBinOp::Pow => a.powf(b),
            VidarBinOp::Min => a.min(b),
            VidarBinOp::Max => a.max(b),
            VidarBinOp::Lt => bool_to_f64(a < b),
            VidarBinOp::Lte => bool_to_f64(a <= b),
            VidarBinOp::Gt => bool_to_f64(a > b),
            VidarBinOp::Gte => bool_to_f64(a >= b),
            VidarBinOp::Eq => bool_to_f64(a == b),
            VidarBinOp::Ne => bool_to_f64(a != b),
            VidarBinOp::And => bool_to_f64(a != 0.0 && b != 0.0),
            VidarBinOp::Or => bool_to_f64(a != 0.0 || b != 0.0),
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            VidarBinOp::Lt
                | VidarBinOp::Lte
                | VidarBinOp::Gt
                | VidarBinOp::Gte
                | VidarBinOp::Eq
                | VidarBinOp::Ne
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, VidarBinOp::And | VidarBinOp::Or)
    }

    // `x op identity == x` for every x
    pub fn right_identity(&self) -> Option<f64> {
        match self {
            VidarBinOp::Add | VidarBinOp::Sub => Some(0.0),
            VidarBinOp::Mul | VidarBinOp::Div | VidarBinOp::Pow => Some(1.0),
            _ => None,
        }
    }

    pub fn left_identity(&self) -> Option<f64> {
        match self {
            VidarBinOp::Add => Some(0.0),
            VidarBinOp::Mul => Some(1.0),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VidarAggOp {
    Sum,
    MinValue,
    MaxValue,
    RowSums,
    ColSums,
    RowMaxs,
    // 1-based column index of the first maximum in each row
    RowIndexMax,
}

impl VidarAggOp {
    pub fn output_shape(&self, input: VidarShape) -> VidarShape {
        match self {
            VidarAggOp::Sum | VidarAggOp::MinValue | VidarAggOp::MaxValue => VidarShape::SCALAR,
            VidarAggOp::RowSums | VidarAggOp::RowMaxs | VidarAggOp::RowIndexMax => {
                VidarShape::new(input.rows, 1)
            }
            VidarAggOp::ColSums => VidarShape::new(1, input.cols),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VidarOp {
    // host array registered with the session under `array`
    Input {
        array: u64,
        shape: VidarShape,
    },
    Fill {
        value: u64, // f64::to_bits()
        shape: VidarShape,
    },
    // inclusive column vector from..=to
    Seq {
        from: i64,
        to: i64,
    },
    Unary(VidarUnOp),
    Binary(VidarBinOp),
    MatMul,
    Transpose,
    Agg(VidarAggOp),
    Cbind,
    // zero-based, half open ranges
    Slice {
        rows: (usize, usize),
        cols: (usize, usize),
    },
    // contingency table from two 1-based index columns
    Table {
        rows: usize,
        cols: usize,
    },
    ReplaceNaN {
        value: u64, // f64::to_bits()
    },
    // column vector to diagonal matrix
    Diag,
}

impl VidarOp {
    pub fn fill(value: f64, shape: VidarShape) -> Self {
        Self::Fill {
            value: value.to_bits(),
            shape,
        }
    }

    pub fn replace_nan(value: f64) -> Self {
        Self::ReplaceNaN {
            value: value.to_bits(),
        }
    }

    pub fn fill_value(&self) -> Option<f64> {
        match self {
            VidarOp::Fill { value, .. } => Some(f64::from_bits(*value)),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            VidarOp::Input { .. } | VidarOp::Fill { .. } | VidarOp::Seq { .. }
        )
    }

    pub fn arity(&self) -> usize {
        match self {
            VidarOp::Input { .. } | VidarOp::Fill { .. } | VidarOp::Seq { .. } => 0,
            VidarOp::Unary(_)
            | VidarOp::Transpose
            | VidarOp::Agg(_)
            | VidarOp::Slice { .. }
            | VidarOp::ReplaceNaN { .. }
            | VidarOp::Diag => 1,
            VidarOp::Binary(_) | VidarOp::MatMul | VidarOp::Cbind | VidarOp::Table { .. } => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VidarOp::Input { .. } => "input",
            VidarOp::Fill { .. } => "fill",
            VidarOp::Seq { .. } => "seq",
            VidarOp::Unary(_) => "unary",
            VidarOp::Binary(_) => "binary",
            VidarOp::MatMul => "matmul",
            VidarOp::Transpose => "t",
            VidarOp::Agg(_) => "agg",
            VidarOp::Cbind => "cbind",
            VidarOp::Slice { .. } => "slice",
            VidarOp::Table { .. } => "table",
            VidarOp::ReplaceNaN { .. } => "replace",
            VidarOp::Diag => "diag",
        }
    }
}

#[inline]
pub(crate) fn bool_to_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}
