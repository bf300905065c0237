use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::backend::{Backend, BackendDevice, BinaryOp, ShiftOp, UnaryOp};
use crate::backprop;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::host::HostData;
use crate::index::{self, TensorIndex};
use crate::op::{Op, SavedTensor, TensorId};
use crate::shape::{inverse_permutation, Shape, MAX_ELEMS};

// Tensor — the central data structure
//
// A Tensor is a handle to a reference-counted TensorInner that exclusively
// owns one contiguous device buffer. There are no views: every operator,
// including broadcast_to, reshape, transpose and indexing, materializes a
// fresh buffer. Cloning a Tensor clones the handle, not the data.
//
// GRAPH EDGES
//
//   prev  strong. Held inside `op` (the graph node kind). An output keeps its
//         operands alive, so dropping the last user handle of a loss frees the
//         whole graph bottom-up.
//   next  weak. Consumers register themselves here when they are created.
//         It only serves introspection and never keeps anything alive.
//
// MUTATION
//
//   The buffer sits behind an RwLock. In-place operators, set_item and
//   fill_ take the write lock, change contents only (identity, shape and
//   `next` are preserved), and bump `version` so graph nodes that saved the
//   old value can detect the overwrite at backward time.

struct TensorInner<B: Backend> {
    /// Unique identifier for this tensor (used in autograd graph).
    id: TensorId,
    /// The buffer on the backend's device. Exclusively owned.
    storage: RwLock<B::Storage>,
    shape: Shape,
    device: B::Device,
    /// The operation that created this tensor. Holds the `prev` edges.
    op: Op<B>,
    is_leaf: bool,
    requires_grad: AtomicBool,
    grad: RwLock<Option<Tensor<B>>>,
    next: Mutex<Vec<Weak<TensorInner<B>>>>,
    version: AtomicU64,
}

impl<B: Backend> Drop for TensorInner<B> {
    fn drop(&mut self) {
        tracing::trace!(id = self.id.as_u64(), elems = self.shape.elem_count(), "release tensor");
    }
}

/// An n-dimensional f32 array on a backend device, with autograd support.
///
/// ```ignore
/// use ryu_core::{CpuDevice, Tensor, CpuBackend};
///
/// let a = Tensor::<CpuBackend>::from_host([[1.0f32, 2.0], [3.0, 4.0]], true, &CpuDevice)?;
/// let b = Tensor::<CpuBackend>::ones((2, 2), false, &CpuDevice)?;
/// let c = (&a * &b)?.sum(None, false)?;
/// c.backward(None)?;
/// ```
pub struct Tensor<B: Backend> {
    inner: Arc<TensorInner<B>>,
}

impl<B: Backend> Clone for Tensor<B> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Tensor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tensor(id={}, shape={}, device={}, requires_grad={}, op={:?})",
            self.inner.id,
            self.inner.shape,
            self.inner.device.name(),
            self.requires_grad(),
            self.inner.op,
        )
    }
}

impl<B: Backend> Tensor<B> {
    // Internal constructors

    fn build(storage: B::Storage, shape: Shape, device: B::Device, op: Op<B>, is_leaf: bool, requires_grad: bool) -> Self {
        let inner = Arc::new(TensorInner {
            id: TensorId::new(),
            storage: RwLock::new(storage),
            shape,
            device,
            op,
            is_leaf,
            requires_grad: AtomicBool::new(requires_grad),
            grad: RwLock::new(None),
            next: Mutex::new(Vec::new()),
            version: AtomicU64::new(0),
        });
        for input in inner.op.inputs() {
            input.register_consumer(&inner);
        }
        Tensor { inner }
    }

    /// A leaf tensor owning `storage`.
    pub(crate) fn leaf(storage: B::Storage, shape: Shape, device: &B::Device, requires_grad: bool) -> Self {
        Self::build(storage, shape, device.clone(), Op::None, true, requires_grad)
    }

    /// An operator output. It requires grad exactly when a graph node is
    /// attached.
    pub(crate) fn from_op(storage: B::Storage, shape: Shape, device: &B::Device, op: Op<B>) -> Self {
        let requires_grad = !op.is_none();
        Self::build(storage, shape, device.clone(), op, false, requires_grad)
    }

    /// Wrap an operator result, recording `op` only when grad mode is on and
    /// some operand requires grad.
    fn output(&self, storage: B::Storage, shape: Shape, inputs: &[&Tensor<B>], op: impl FnOnce() -> Op<B>) -> Self {
        let record = backprop::is_grad_enabled() && inputs.iter().any(|t| t.requires_grad());
        let op = if record { op() } else { Op::None };
        Self::from_op(storage, shape, &self.inner.device, op)
    }

    fn register_consumer(&self, consumer: &Arc<TensorInner<B>>) {
        if let Ok(mut next) = self.inner.next.lock() {
            next.retain(|w| w.strong_count() > 0);
            if !next.iter().any(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(consumer))) {
                next.push(Arc::downgrade(consumer));
            }
        }
    }

    // Accessors

    /// Unique tensor ID.
    pub fn id(&self) -> TensorId {
        self.inner.id
    }

    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    /// The dimensions as a slice (shortcut for shape().dims()).
    pub fn dims(&self) -> &[usize] {
        self.inner.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.shape.rank()
    }

    /// Total number of elements.
    pub fn elem_count(&self) -> usize {
        self.inner.shape.elem_count()
    }

    pub fn device(&self) -> &B::Device {
        &self.inner.device
    }

    /// The graph node kind that produced this tensor.
    pub fn op(&self) -> &Op<B> {
        &self.inner.op
    }

    pub fn is_leaf(&self) -> bool {
        self.inner.is_leaf
    }

    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad.load(Ordering::Relaxed)
    }

    /// Toggle gradient tracking. Only leaves may change it; an operator
    /// output's flag is derived from its operands.
    pub fn set_requires_grad(&self, requires_grad: bool) -> Result<()> {
        if !self.is_leaf() {
            return Err(Error::NonLeafRequiresGrad);
        }
        self.inner.requires_grad.store(requires_grad, Ordering::Relaxed);
        Ok(())
    }

    /// The accumulated gradient, if a backward pass has written one.
    pub fn grad(&self) -> Option<Tensor<B>> {
        self.inner.grad.read().ok().and_then(|g| g.clone())
    }

    /// Replace the gradient. The new gradient must have this tensor's shape,
    /// and only tensors that require grad can hold one.
    pub fn set_grad(&self, grad: Option<Tensor<B>>) -> Result<()> {
        if let Some(g) = &grad {
            if !self.requires_grad() {
                return Err(Error::RequiresGradDisabled);
            }
            if g.shape() != self.shape() {
                return Err(Error::GradShapeMismatch {
                    expected: self.shape().clone(),
                    got: g.shape().clone(),
                });
            }
        }
        self.replace_grad(grad)
    }

    /// Clear the gradient.
    pub fn zero_grad(&self) -> Result<()> {
        self.replace_grad(None)
    }

    pub(crate) fn replace_grad(&self, grad: Option<Tensor<B>>) -> Result<()> {
        let mut slot = self
            .inner
            .grad
            .write()
            .map_err(|_| Error::msg("tensor grad lock poisoned"))?;
        *slot = grad;
        Ok(())
    }

    /// Operands that produced this tensor, in order. Empty for leaves and for
    /// untracked operator outputs.
    pub fn prev(&self) -> Vec<Tensor<B>> {
        self.inner.op.inputs().into_iter().cloned().collect()
    }

    /// Tracked consumers of this tensor that are still alive.
    pub fn next(&self) -> Vec<Tensor<B>> {
        match self.inner.next.lock() {
            Ok(next) => next
                .iter()
                .filter_map(Weak::upgrade)
                .map(|inner| Tensor { inner })
                .collect(),
            Err(_) => {
                tracing::warn!(id = self.id().as_u64(), "consumer list lock poisoned");
                Vec::new()
            }
        }
    }

    /// Number of in-place writes this tensor's buffer has received.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    fn bump_version(&self) {
        self.inner.version.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether two handles refer to the same tensor.
    pub fn same(&self, other: &Tensor<B>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn read_storage(&self) -> Result<RwLockReadGuard<'_, B::Storage>> {
        self.inner
            .storage
            .read()
            .map_err(|_| Error::msg("tensor storage lock poisoned"))
    }

    pub(crate) fn write_storage(&self) -> Result<RwLockWriteGuard<'_, B::Storage>> {
        self.inner
            .storage
            .write()
            .map_err(|_| Error::msg("tensor storage lock poisoned"))
    }

    // Factories

    /// A tensor filled with `value`.
    pub fn fill(shape: impl Into<Shape>, value: f32, requires_grad: bool, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = dispatch::full::<B>(&shape, value, device)?;
        Ok(Self::leaf(storage, shape, device, requires_grad))
    }

    pub fn zeros(shape: impl Into<Shape>, requires_grad: bool, device: &B::Device) -> Result<Self> {
        Self::fill(shape, 0.0, requires_grad, device)
    }

    pub fn ones(shape: impl Into<Shape>, requires_grad: bool, device: &B::Device) -> Result<Self> {
        Self::fill(shape, 1.0, requires_grad, device)
    }

    /// A 0-dimensional tensor holding `value`.
    pub fn scalar(value: f32, requires_grad: bool, device: &B::Device) -> Result<Self> {
        Self::fill((), value, requires_grad, device)
    }

    /// Zeros with this tensor's shape and device. Does not require grad.
    pub fn zeros_like(&self) -> Result<Self> {
        Self::zeros(self.shape(), false, self.device())
    }

    pub fn ones_like(&self) -> Result<Self> {
        Self::ones(self.shape(), false, self.device())
    }

    /// Upload a row-major host buffer with an explicit shape.
    pub fn from_slice(data: &[f32], shape: impl Into<Shape>, requires_grad: bool, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let expected = dispatch::check_size::<B>(&shape, device)?;
        if data.len() != expected {
            return Err(Error::ElementCountMismatch {
                expected,
                got: data.len(),
                shape,
            });
        }
        let storage = B::from_slice(data, device)?;
        Ok(Self::leaf(storage, shape, device, requires_grad))
    }

    pub fn from_vec(data: Vec<f32>, shape: impl Into<Shape>, requires_grad: bool, device: &B::Device) -> Result<Self> {
        Self::from_slice(&data, shape, requires_grad, device)
    }

    /// Build a tensor from nested host data, inferring the shape.
    pub fn from_host(data: impl Into<HostData>, requires_grad: bool, device: &B::Device) -> Result<Self> {
        let (flat, shape) = data.into().flatten_data()?;
        Self::from_slice(&flat, shape, requires_grad, device)
    }

    /// Values `start, start + step, ...` strictly before `stop`.
    /// The length is `ceil((stop - start) / step)`, or 0 when that is negative.
    pub fn arange(start: f32, stop: f32, step: f32, requires_grad: bool, device: &B::Device) -> Result<Self> {
        if step == 0.0 {
            return Err(Error::invalid_argument("arange step must be non-zero"));
        }
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err(Error::invalid_argument(format!(
                "arange arguments must be finite, got {start}, {stop}, {step}"
            )));
        }
        let len = ((stop - start) / step).ceil();
        let count = if len > 0.0 { len as usize } else { 0 };
        // `as` saturates, so compare before trusting the cast
        if len.is_nan() || len >= MAX_ELEMS as f32 {
            return Err(Error::too_large(&Shape::from(count), device.name()));
        }
        let mut data = dispatch::host_buffer::<B>(count, device)?;
        data.extend((0..count).map(|i| start + i as f32 * step));
        Self::from_slice(&data, count, requires_grad, device)
    }

    /// `num` evenly spaced values from `start` to `stop`, both inclusive.
    pub fn linspace(start: f32, stop: f32, num: usize, requires_grad: bool, device: &B::Device) -> Result<Self> {
        let mut data = dispatch::host_buffer::<B>(num, device)?;
        match num {
            0 => {}
            1 => data.push(start),
            _ => {
                let step = (stop - start) / (num - 1) as f32;
                data.extend((0..num).map(|i| if i == num - 1 { stop } else { start + i as f32 * step }));
            }
        }
        Self::from_slice(&data, num, requires_grad, device)
    }

    /// The `[n, n]` identity matrix.
    pub fn eye(n: usize, requires_grad: bool, device: &B::Device) -> Result<Self> {
        let shape = Shape::from((n, n));
        let count = dispatch::check_size::<B>(&shape, device)?;
        let mut data = dispatch::host_buffer::<B>(count, device)?;
        data.resize(count, 0.0);
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self::from_slice(&data, shape, requires_grad, device)
    }

    // Element-wise binary operators

    fn binary_op(&self, rhs: &Self, op: BinaryOp) -> Result<Self> {
        let (storage, shape) = dispatch::binary(op, self, rhs)?;
        Ok(self.output(storage, shape, &[self, rhs], || Op::Binary {
            lhs: SavedTensor::new(self),
            rhs: SavedTensor::new(rhs),
            op,
        }))
    }

    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Add)
    }

    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Sub)
    }

    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Mul)
    }

    pub fn div(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Div)
    }

    /// Remainder with the sign of the dividend (C `fmodf`).
    pub fn rem(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Rem)
    }

    pub fn pow(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Pow)
    }

    pub fn eq(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Eq)
    }

    pub fn ne(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Ne)
    }

    pub fn lt(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Lt)
    }

    pub fn le(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Le)
    }

    pub fn gt(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Gt)
    }

    pub fn ge(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Ge)
    }

    pub fn bitand(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::BitAnd)
    }

    pub fn bitor(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::BitOr)
    }

    pub fn bitxor(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::BitXor)
    }

    // Shifts

    fn shift_op(&self, amount: i32, op: ShiftOp) -> Result<Self> {
        let storage = dispatch::shift(op, self, amount)?;
        Ok(self.output(storage, self.shape().clone(), &[self], || Op::Shift {
            input: self.clone(),
            op,
            shift: amount,
        }))
    }

    pub fn shl(&self, amount: i32) -> Result<Self> {
        self.shift_op(amount, ShiftOp::Shl)
    }

    pub fn shr(&self, amount: i32) -> Result<Self> {
        self.shift_op(amount, ShiftOp::Shr)
    }

    // Unary operators

    fn unary_op(&self, op: UnaryOp) -> Result<Self> {
        let storage = dispatch::unary(op, self)?;
        Ok(self.output(storage, self.shape().clone(), &[self], || Op::Unary {
            input: SavedTensor::new(self),
            op,
        }))
    }

    pub fn neg(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Neg)
    }

    /// Bitwise not of the i32-truncated values.
    pub fn invert(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Invert)
    }

    pub fn abs(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Abs)
    }

    pub fn exp(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Exp)
    }

    pub fn log(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Log)
    }

    pub fn sqrt(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Sqrt)
    }

    // In-place operators
    //
    // The rhs must broadcast INTO self's shape. Nothing is written when
    // validation fails. These create no graph node.

    fn binary_inplace(&self, rhs: &Self, op: BinaryOp) -> Result<()> {
        dispatch::binary_inplace(op, self, rhs)?;
        self.bump_version();
        Ok(())
    }

    pub fn add_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::Add)
    }

    pub fn sub_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::Sub)
    }

    pub fn mul_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::Mul)
    }

    pub fn div_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::Div)
    }

    pub fn rem_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::Rem)
    }

    pub fn pow_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::Pow)
    }

    pub fn bitand_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::BitAnd)
    }

    pub fn bitor_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::BitOr)
    }

    pub fn bitxor_(&self, rhs: &Self) -> Result<()> {
        self.binary_inplace(rhs, BinaryOp::BitXor)
    }

    pub fn shl_(&self, amount: i32) -> Result<()> {
        dispatch::shift_inplace(ShiftOp::Shl, self, amount)?;
        self.bump_version();
        Ok(())
    }

    pub fn shr_(&self, amount: i32) -> Result<()> {
        dispatch::shift_inplace(ShiftOp::Shr, self, amount)?;
        self.bump_version();
        Ok(())
    }

    /// Overwrite every element with `value`.
    pub fn fill_(&self, value: f32) -> Result<()> {
        let mut storage = self.write_storage()?;
        B::fill(&mut storage, value)?;
        drop(storage);
        self.bump_version();
        Ok(())
    }

    // Linear algebra and reductions

    /// [m, k] @ [k, n] → [m, n]
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        let (storage, shape) = dispatch::matmul(self, rhs)?;
        Ok(self.output(storage, shape, &[self, rhs], || Op::Matmul {
            lhs: SavedTensor::new(self),
            rhs: SavedTensor::new(rhs),
        }))
    }

    /// Sum over `dim`, or over all elements when `dim` is None.
    pub fn sum(&self, dim: Option<usize>, keep_dim: bool) -> Result<Self> {
        let (storage, shape) = dispatch::reduce_sum(self, dim, keep_dim)?;
        Ok(self.output(storage, shape, &[self], || Op::Sum {
            input: self.clone(),
            dim,
            keep_dim,
        }))
    }

    /// Sum of all elements as a scalar tensor.
    pub fn sum_all(&self) -> Result<Self> {
        self.sum(None, false)
    }

    // Shape operators

    pub fn is_broadcastable_to(&self, target: &Shape) -> bool {
        self.shape().is_broadcastable_to(target)
    }

    /// Materialize this tensor expanded to `shape`.
    pub fn broadcast_to(&self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        let storage = dispatch::expand(self, &shape)?;
        Ok(self.output(storage, shape, &[self], || Op::BroadcastTo {
            input: self.clone(),
        }))
    }

    /// Same elements in row-major order under a new shape.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if shape.elem_count() != self.elem_count() {
            return Err(Error::ReshapeElementMismatch {
                src: self.elem_count(),
                dst: shape.elem_count(),
                dst_shape: shape,
            });
        }
        let storage = dispatch::duplicate(self)?;
        Ok(self.output(storage, shape, &[self], || Op::Reshape {
            input: self.clone(),
        }))
    }

    /// Reorder dimensions: output dim `i` is input dim `perm[i]`.
    pub fn permute(&self, perm: &[usize]) -> Result<Self> {
        let (shape, map) = self.shape().permute_index_map(perm)?;
        let storage = dispatch::gather(self, &map, &shape)?;
        Ok(self.output(storage, shape, &[self], || Op::Permute {
            input: self.clone(),
            perm: perm.to_vec(),
        }))
    }

    /// Reverse the dimension order. For a matrix this is the usual transpose.
    pub fn transpose(&self) -> Result<Self> {
        let perm: Vec<usize> = (0..self.rank()).rev().collect();
        self.permute(&perm)
    }

    /// Undo a permutation. Used by backward.
    pub(crate) fn unpermute(&self, perm: &[usize]) -> Result<Self> {
        self.permute(&inverse_permutation(perm))
    }

    // Indexing

    /// Select a sub-tensor. Integer indices drop their dimension, slices keep
    /// it, and trailing dimensions without an index are taken whole.
    pub fn get_item(&self, indices: &[TensorIndex]) -> Result<Self> {
        let selection = index::resolve(self.shape(), indices)?;
        let storage = dispatch::gather(self, &selection.map, &selection.shape)?;
        Ok(self.output(storage, selection.shape, &[self], || Op::Index {
            input: self.clone(),
            map: selection.map,
        }))
    }

    /// Write `value`, broadcast to the selected region, into this tensor's
    /// buffer. No graph node is created.
    pub fn set_item(&self, indices: &[TensorIndex], value: &Tensor<B>) -> Result<()> {
        let selection = index::resolve(self.shape(), indices)?;
        let values = dispatch::expand(value, &selection.shape)?;
        dispatch::scatter_into(self, &values, &selection.map)?;
        self.bump_version();
        Ok(())
    }

    // Copies and host access

    /// Deep copy into a fresh leaf. requires_grad is preserved; the copy has
    /// no graph history.
    pub fn copy(&self) -> Result<Self> {
        let storage = dispatch::duplicate(self)?;
        Ok(Self::leaf(storage, self.shape().clone(), self.device(), self.requires_grad()))
    }

    /// Flattened row-major contents.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        let storage = self.read_storage()?;
        B::to_vec(&storage)
    }

    /// Contents as nested host data matching the shape.
    pub fn to_host(&self) -> Result<HostData> {
        HostData::reshape_data(&self.to_vec()?, self.shape())
    }

    /// The single value of a one-element tensor.
    pub fn to_scalar(&self) -> Result<f32> {
        if self.elem_count() != 1 {
            return Err(Error::NotAScalar {
                shape: self.shape().clone(),
            });
        }
        Ok(self.to_vec()?[0])
    }

    // Autograd

    /// Backpropagate from this tensor, accumulating into the `grad` of every
    /// reachable tensor that requires grad.
    ///
    /// Without `gradient` this tensor must hold a single element and the seed
    /// is 1.
    pub fn backward(&self, gradient: Option<&Tensor<B>>) -> Result<()> {
        backprop::backward(self, gradient)
    }
}
