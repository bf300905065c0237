// Op — the graph node kind attached to every recorded operator output
//
// Every tensor produced by an operator while at least one operand requires
// grad records HOW it was created. The variants hold the operand tensors
// themselves (Arc handles), so the Op is also the owner of the `prev` edges:
// an output keeps its operands alive for as long as it lives.
//
// Example: c = a * b
//   a.op = Op::None (leaf)
//   b.op = Op::None (leaf)
//   c.op = Op::Binary { lhs: a@v0, rhs: b@v0, op: Mul }
//
// Operands whose VALUES the gradient rule reads (b for d(a*b)/da) are kept as
// SavedTensor, which remembers the operand's version at record time. If an
// in-place write bumps the version before backward runs, reading the saved
// value fails instead of silently producing a wrong gradient. Operands that
// only route gradient (a + b) are read through `tensor()` and are never
// checked.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{Backend, BinaryOp, ShiftOp, UnaryOp};
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Unique identifier for a tensor. Used as keys in GradStore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub(crate) u64);

impl Default for TensorId {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorId {
    /// Generate a new unique tensor ID (uses a global atomic counter).
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        TensorId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operand captured by a graph node together with its version at the time
/// the node was recorded.
pub struct SavedTensor<B: Backend> {
    tensor: Tensor<B>,
    version: u64,
}

impl<B: Backend> SavedTensor<B> {
    pub fn new(tensor: &Tensor<B>) -> Self {
        SavedTensor {
            tensor: tensor.clone(),
            version: tensor.version(),
        }
    }

    /// The operand as a graph edge. Does not check the version.
    pub fn tensor(&self) -> &Tensor<B> {
        &self.tensor
    }

    /// The operand's value as recorded. Fails if it was overwritten in place.
    pub fn value(&self) -> Result<&Tensor<B>> {
        let current = self.tensor.version();
        if current != self.version {
            return Err(Error::SavedTensorModified {
                id: self.tensor.id().as_u64(),
                saved: self.version,
                current,
            });
        }
        Ok(&self.tensor)
    }

    pub fn saved_version(&self) -> u64 {
        self.version
    }
}

impl<B: Backend> Clone for SavedTensor<B> {
    fn clone(&self) -> Self {
        SavedTensor {
            tensor: self.tensor.clone(),
            version: self.version,
        }
    }
}

/// Records the operation that produced a tensor, storing references to inputs.
///
/// backward() interprets each variant with its local gradient rule.
pub enum Op<B: Backend> {
    /// Leaf tensor, or an operator output whose operands did not require grad.
    None,

    /// Element-wise binary: result = op(lhs, rhs), operands broadcast to the
    /// joint shape.
    Binary {
        lhs: SavedTensor<B>,
        rhs: SavedTensor<B>,
        op: BinaryOp,
    },

    /// Element-wise unary: result = op(input)
    Unary { input: SavedTensor<B>, op: UnaryOp },

    /// Bit shift by a constant amount.
    Shift {
        input: Tensor<B>,
        op: ShiftOp,
        shift: i32,
    },

    /// Matrix multiplication: result = lhs @ rhs
    Matmul {
        lhs: SavedTensor<B>,
        rhs: SavedTensor<B>,
    },

    /// Sum over one dimension, or over everything when `dim` is None.
    Sum {
        input: Tensor<B>,
        dim: Option<usize>,
        keep_dim: bool,
    },

    /// Materialized broadcast of `input` to the output shape.
    BroadcastTo { input: Tensor<B> },

    /// Same elements, new shape.
    Reshape { input: Tensor<B> },

    /// Axis permutation (transpose is the reversed permutation).
    Permute { input: Tensor<B>, perm: Vec<usize> },

    /// Indexing: output[i] = input[map[i]]
    Index { input: Tensor<B>, map: Vec<usize> },
}

impl<B: Backend> Op<B> {
    /// The operands this node depends on, in order. These are `prev`.
    pub fn inputs(&self) -> Vec<&Tensor<B>> {
        match self {
            Op::None => vec![],
            Op::Binary { lhs, rhs, .. } | Op::Matmul { lhs, rhs } => {
                vec![lhs.tensor(), rhs.tensor()]
            }
            Op::Unary { input, .. } => vec![input.tensor()],
            Op::Shift { input, .. }
            | Op::Sum { input, .. }
            | Op::BroadcastTo { input }
            | Op::Reshape { input }
            | Op::Permute { input, .. }
            | Op::Index { input, .. } => vec![input],
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Op::None)
    }

    /// Short name of the node kind, used in logs and Debug output.
    pub fn name(&self) -> &'static str {
        match self {
            Op::None => "none",
            Op::Binary { op, .. } => op.name(),
            Op::Unary { op, .. } => op.name(),
            Op::Shift { op, .. } => op.name(),
            Op::Matmul { .. } => "matmul",
            Op::Sum { .. } => "sum",
            Op::BroadcastTo { .. } => "broadcast_to",
            Op::Reshape { .. } => "reshape",
            Op::Permute { .. } => "permute",
            Op::Index { .. } => "index",
        }
    }
}

impl<B: Backend> Clone for Op<B> {
    fn clone(&self) -> Self {
        match self {
            Op::None => Op::None,
            Op::Binary { lhs, rhs, op } => Op::Binary {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
                op: *op,
            },
            Op::Unary { input, op } => Op::Unary {
                input: input.clone(),
                op: *op,
            },
            Op::Shift { input, op, shift } => Op::Shift {
                input: input.clone(),
                op: *op,
                shift: *shift,
            },
            Op::Matmul { lhs, rhs } => Op::Matmul {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
            Op::Sum {
                input,
                dim,
                keep_dim,
            } => Op::Sum {
                input: input.clone(),
                dim: *dim,
                keep_dim: *keep_dim,
            },
            Op::BroadcastTo { input } => Op::BroadcastTo {
                input: input.clone(),
            },
            Op::Reshape { input } => Op::Reshape {
                input: input.clone(),
            },
            Op::Permute { input, perm } => Op::Permute {
                input: input.clone(),
                perm: perm.clone(),
            },
            Op::Index { input, map } => Op::Index {
                input: input.clone(),
                map: map.clone(),
            },
        }
    }
}

impl<B: Backend> fmt::Debug for Op<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<TensorId> = self.inputs().iter().map(|t| t.id()).collect();
        write!(f, "Op::{}({:?})", self.name(), ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CpuBackend, CpuDevice};

    type T = Tensor<CpuBackend>;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = TensorId::new();
        let b = TensorId::new();
        assert!(b > a);
    }

    #[test]
    fn test_saved_tensor_detects_inplace_write() {
        let t = T::ones(2, false, &CpuDevice).unwrap();
        let saved = SavedTensor::new(&t);
        assert_eq!(saved.saved_version(), 0);
        assert!(saved.value().is_ok());

        t.fill_(2.0).unwrap();
        let err = saved.value().unwrap_err();
        assert!(matches!(err, Error::SavedTensorModified { saved: 0, current: 1, .. }));
        assert!(saved.tensor().same(&t));
    }

    #[test]
    fn test_debug_lists_inputs() {
        let a = T::ones(2, true, &CpuDevice).unwrap();
        let b = a.exp().unwrap();
        assert_eq!(format!("{:?}", b.op()), format!("Op::exp([{:?}])", a.id()));
        assert_eq!(b.op().inputs().len(), 1);
    }
}
