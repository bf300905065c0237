use std::fmt;

use crate::error::Result;

// Backend — the device buffer manager and kernel library contract
//
// A Backend owns two concerns:
//
//   1. Buffers. `Storage` is one contiguous block of f32 on the device. Each
//      tensor owns exactly one Storage; dropping the tensor drops the Storage,
//      which releases the device memory. Storage is deliberately not Clone:
//      duplicating a buffer is an explicit `copy` kernel call.
//
//   2. Kernels. Every operator maps to an entry point with a fixed calling
//      convention on flat buffers:
//
//        binary  (lhs, rhs, out, n)
//        unary   (input, out, n)
//        shift   (input, out, n, shift)
//
//      plus matmul and the data-movement kernels (gather / scatter /
//      reduce_sum / fill / copy) the shape engine needs to materialize
//      broadcasts, permutations and slices.
//
// The dispatch layer (dispatch.rs) allocates every output buffer and
// reconciles shapes before calling in, so kernels only ever see contiguous
// buffers of matching length.
//
// Tensor<B: Backend> is generic over this trait, so the host reference
// backend and the CUDA backend are interchangeable.

/// Identifies a compute device (e.g., "cpu", "cuda:0").
pub trait BackendDevice: Clone + fmt::Debug + Send + Sync + 'static {
    /// A human-readable name for this device.
    fn name(&self) -> String;
}

/// A device-resident contiguous f32 buffer.
pub trait BackendStorage: Send + Sync + 'static {
    /// Number of f32 elements in this buffer.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Element-wise binary operators sharing the `(lhs, rhs, out, n)` convention.
///
/// Comparisons produce 1.0 / 0.0. Bitwise operators truncate both operands to
/// i32, apply the integer operation and convert back. `Rem` follows the C
/// `fmodf` convention: the result takes the sign of the dividend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    /// Kernel name suffix, e.g. `binary_add`.
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::Pow => "pow",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::BitAnd => "bitand",
            BinaryOp::BitOr => "bitor",
            BinaryOp::BitXor => "bitxor",
        }
    }

    /// Whether the operator has a non-zero local gradient anywhere.
    /// Comparisons and bitwise operators are piecewise constant.
    pub fn is_differentiable(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Rem
                | BinaryOp::Pow
        )
    }
}

/// Element-wise unary operators sharing the `(input, out, n)` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    /// Bitwise not on the i32-truncated value.
    Invert,
    Abs,
    Exp,
    Log,
    Sqrt,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Invert => "invert",
            UnaryOp::Abs => "abs",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
        }
    }
}

/// Bit-shift operators sharing the `(input, out, n, shift)` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Shl,
    Shr,
}

impl ShiftOp {
    pub fn name(&self) -> &'static str {
        match self {
            ShiftOp::Shl => "shl",
            ShiftOp::Shr => "shr",
        }
    }
}

/// The main Backend trait. Implementing it for a marker type makes that type
/// a complete device for ryu tensors.
///
/// All kernel methods write into a caller-allocated `out` buffer and return
/// only after the results are ready to be read by the next call.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// The device type for this backend.
    type Device: BackendDevice;
    /// The buffer type for this backend.
    type Storage: BackendStorage;

    //  Buffers

    /// Allocate `n` zero-initialized elements. Fails with an allocation error
    /// if the device cannot provide the memory.
    fn alloc_zeros(n: usize, device: &Self::Device) -> Result<Self::Storage>;

    /// Upload a host slice into a fresh device buffer.
    fn from_slice(data: &[f32], device: &Self::Device) -> Result<Self::Storage>;

    /// Download a device buffer to the host.
    fn to_vec(storage: &Self::Storage) -> Result<Vec<f32>>;

    //  Kernels

    /// out[i] = value
    fn fill(out: &mut Self::Storage, value: f32) -> Result<()>;

    /// dst[i] = src[i]; both buffers must have the same length.
    fn copy(src: &Self::Storage, dst: &mut Self::Storage) -> Result<()>;

    /// out[i] = op(lhs[i], rhs[i]) for i in 0..n
    fn binary(
        op: BinaryOp,
        lhs: &Self::Storage,
        rhs: &Self::Storage,
        out: &mut Self::Storage,
        n: usize,
    ) -> Result<()>;

    /// out[i] = op(input[i]) for i in 0..n
    fn unary(op: UnaryOp, input: &Self::Storage, out: &mut Self::Storage, n: usize)
        -> Result<()>;

    /// out[i] = op(input[i], shift) for i in 0..n
    fn shift(
        op: ShiftOp,
        input: &Self::Storage,
        out: &mut Self::Storage,
        n: usize,
        shift: i32,
    ) -> Result<()>;

    /// out[m x n] = lhs[m x k] @ rhs[k x n], all row-major.
    fn matmul(
        lhs: &Self::Storage,
        rhs: &Self::Storage,
        out: &mut Self::Storage,
        m: usize,
        k: usize,
        n: usize,
    ) -> Result<()>;

    /// out[i] = src[indices[i]]
    fn gather(src: &Self::Storage, indices: &[usize], out: &mut Self::Storage) -> Result<()>;

    /// dst[indices[i]] = src[i]
    fn scatter(src: &Self::Storage, indices: &[usize], dst: &mut Self::Storage) -> Result<()>;

    /// Sum the middle axis of a `[outer, len, inner]` view:
    /// out[o * inner + i] = Σ_j src[(o * len + j) * inner + i]
    fn reduce_sum(
        src: &Self::Storage,
        out: &mut Self::Storage,
        outer: usize,
        len: usize,
        inner: usize,
    ) -> Result<()>;
}
