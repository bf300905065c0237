// Dispatch — shape reconciliation and kernel invocation
//
// Every operator funnels through here before touching a kernel:
//
//   1. validate shapes (broadcast compatibility, ranks, dims, and the
//      element limit for any shape not already owned by a tensor);
//   2. materialize operands whose shape differs from the output shape with
//      a gather through the broadcast index map;
//   3. allocate the output buffer;
//   4. call the kernel with the fixed (buffers..., n[, shift]) convention.
//
// Functions here return raw storage plus shape. Wrapping the result in a
// Tensor and recording the graph node is tensor.rs's job, which keeps the
// dispatch layer free of autograd concerns and lets backward reuse it.

use std::ops::Deref;
use std::sync::RwLockReadGuard;

use crate::backend::{Backend, BackendDevice, BinaryOp, ShiftOp, UnaryOp};
use crate::error::{Error, Result};
use crate::shape::{Shape, MAX_ELEMS};
use crate::tensor::Tensor;

/// An operand ready for a kernel: either the tensor's own buffer, or a
/// freshly broadcast copy when its shape differs from the output's.
enum Operand<'a, B: Backend> {
    Borrowed(RwLockReadGuard<'a, B::Storage>),
    Owned(B::Storage),
}

impl<'a, B: Backend> Deref for Operand<'a, B> {
    type Target = B::Storage;

    fn deref(&self) -> &B::Storage {
        match self {
            Operand::Borrowed(guard) => guard,
            Operand::Owned(storage) => storage,
        }
    }
}

/// Element count of a shape about to get a buffer on `device`.
pub(crate) fn check_size<B: Backend>(shape: &Shape, device: &B::Device) -> Result<usize> {
    shape
        .checked_elem_count()
        .ok_or_else(|| Error::too_large(shape, device.name()))
}

/// An empty host vector with room for `n` values, for factories that build
/// their data on the host before uploading it.
pub(crate) fn host_buffer<B: Backend>(n: usize, device: &B::Device) -> Result<Vec<f32>> {
    let mut data = Vec::new();
    if n > MAX_ELEMS {
        return Err(Error::too_large(&Shape::from(n), device.name()));
    }
    data.try_reserve_exact(n).map_err(|e| Error::Allocation {
        elems: n,
        device: device.name(),
        reason: e.to_string(),
    })?;
    Ok(data)
}

fn operand<'a, B: Backend>(t: &'a Tensor<B>, target: &Shape) -> Result<Operand<'a, B>> {
    if t.shape() == target {
        Ok(Operand::Borrowed(t.read_storage()?))
    } else {
        Ok(Operand::Owned(expand(t, target)?))
    }
}

/// Materialize `t` broadcast to `target` into a new buffer.
pub(crate) fn expand<B: Backend>(t: &Tensor<B>, target: &Shape) -> Result<B::Storage> {
    check_size::<B>(target, t.device())?;
    let src = t.read_storage()?;
    if t.shape() == target {
        let mut out = B::alloc_zeros(target.elem_count(), t.device())?;
        B::copy(&src, &mut out)?;
        return Ok(out);
    }
    let map = t.shape().broadcast_index_map(target)?;
    let mut out = B::alloc_zeros(map.len(), t.device())?;
    B::gather(&src, &map, &mut out)?;
    Ok(out)
}

/// A fresh buffer of `shape.elem_count()` elements set to `value`.
pub(crate) fn full<B: Backend>(shape: &Shape, value: f32, device: &B::Device) -> Result<B::Storage> {
    let n = check_size::<B>(shape, device)?;
    let mut out = B::alloc_zeros(n, device)?;
    if value != 0.0 {
        B::fill(&mut out, value)?;
    }
    Ok(out)
}

/// Deep copy of a tensor's buffer.
pub(crate) fn duplicate<B: Backend>(t: &Tensor<B>) -> Result<B::Storage> {
    let src = t.read_storage()?;
    let mut out = B::alloc_zeros(t.elem_count(), t.device())?;
    B::copy(&src, &mut out)?;
    Ok(out)
}

fn binary_with_shape<B: Backend>(
    op: BinaryOp,
    lhs: &Tensor<B>,
    rhs: &Tensor<B>,
    shape: &Shape,
) -> Result<B::Storage> {
    let n = check_size::<B>(shape, lhs.device())?;
    let l = operand(lhs, shape)?;
    // `x op x` shares one read guard
    let r = if lhs.same(rhs) { None } else { Some(operand(rhs, shape)?) };
    let r: &B::Storage = r.as_deref().unwrap_or(&*l);
    let mut out = B::alloc_zeros(n, lhs.device())?;
    tracing::trace!(op = op.name(), n, "dispatch binary");
    B::binary(op, &l, r, &mut out, n)?;
    Ok(out)
}

/// out = op(lhs, rhs) over the joint broadcast shape.
pub(crate) fn binary<B: Backend>(
    op: BinaryOp,
    lhs: &Tensor<B>,
    rhs: &Tensor<B>,
) -> Result<(B::Storage, Shape)> {
    let shape = Shape::broadcast_shape(lhs.shape(), rhs.shape())?;
    let out = binary_with_shape(op, lhs, rhs, &shape)?;
    Ok((out, shape))
}

/// lhs = op(lhs, rhs), with rhs broadcast into lhs's shape.
///
/// The result is computed into a temporary buffer and then copied over the
/// lhs buffer, so nothing is written unless every step before it succeeded
/// and `x.add_(&x)` never reads a half-written buffer.
pub(crate) fn binary_inplace<B: Backend>(
    op: BinaryOp,
    lhs: &Tensor<B>,
    rhs: &Tensor<B>,
) -> Result<()> {
    if !rhs.shape().is_broadcastable_to(lhs.shape()) {
        return Err(Error::BroadcastTo {
            src: rhs.shape().clone(),
            dst: lhs.shape().clone(),
        });
    }
    let tmp = binary_with_shape(op, lhs, rhs, lhs.shape())?;
    let mut dst = lhs.write_storage()?;
    B::copy(&tmp, &mut dst)
}

pub(crate) fn unary<B: Backend>(op: UnaryOp, t: &Tensor<B>) -> Result<B::Storage> {
    let n = t.elem_count();
    let src = t.read_storage()?;
    let mut out = B::alloc_zeros(n, t.device())?;
    tracing::trace!(op = op.name(), n, "dispatch unary");
    B::unary(op, &src, &mut out, n)?;
    Ok(out)
}

fn check_shift(shift: i32) -> Result<()> {
    if !(0..32).contains(&shift) {
        return Err(Error::invalid_argument(format!(
            "shift amount {shift} outside 0..32"
        )));
    }
    Ok(())
}

pub(crate) fn shift<B: Backend>(op: ShiftOp, t: &Tensor<B>, shift: i32) -> Result<B::Storage> {
    check_shift(shift)?;
    let n = t.elem_count();
    let src = t.read_storage()?;
    let mut out = B::alloc_zeros(n, t.device())?;
    tracing::trace!(op = op.name(), n, shift, "dispatch shift");
    B::shift(op, &src, &mut out, n, shift)?;
    Ok(out)
}

pub(crate) fn shift_inplace<B: Backend>(op: ShiftOp, t: &Tensor<B>, amount: i32) -> Result<()> {
    let tmp = shift(op, t, amount)?;
    let mut dst = t.write_storage()?;
    B::copy(&tmp, &mut dst)
}

/// [m, k] @ [k, n] → [m, n]
pub(crate) fn matmul<B: Backend>(lhs: &Tensor<B>, rhs: &Tensor<B>) -> Result<(B::Storage, Shape)> {
    for t in [lhs, rhs] {
        if t.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: t.rank(),
            });
        }
    }
    let (m, k1) = (lhs.dims()[0], lhs.dims()[1]);
    let (k2, n) = (rhs.dims()[0], rhs.dims()[1]);
    if k1 != k2 {
        return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
    }
    let shape = Shape::from((m, n));
    let count = check_size::<B>(&shape, lhs.device())?;
    let a = lhs.read_storage()?;
    let b_guard = if lhs.same(rhs) { None } else { Some(rhs.read_storage()?) };
    let b: &B::Storage = b_guard.as_deref().unwrap_or(&*a);
    let mut out = B::alloc_zeros(count, lhs.device())?;
    tracing::trace!(m, k = k1, n, "dispatch matmul");
    B::matmul(&a, b, &mut out, m, k1, n)?;
    Ok((out, shape))
}

/// out[i] = t[map[i]], laid out as `shape`.
pub(crate) fn gather<B: Backend>(t: &Tensor<B>, map: &[usize], shape: &Shape) -> Result<B::Storage> {
    debug_assert_eq!(map.len(), shape.elem_count());
    let src = t.read_storage()?;
    let mut out = B::alloc_zeros(map.len(), t.device())?;
    B::gather(&src, map, &mut out)?;
    Ok(out)
}

/// A zero buffer of `shape` with `src[i]` written at `map[i]`.
pub(crate) fn scatter_zeros<B: Backend>(
    src: &Tensor<B>,
    map: &[usize],
    shape: &Shape,
) -> Result<B::Storage> {
    let values = src.read_storage()?;
    let mut out = B::alloc_zeros(shape.elem_count(), src.device())?;
    B::scatter(&values, map, &mut out)?;
    Ok(out)
}

/// dst[map[i]] = values[i], in place.
pub(crate) fn scatter_into<B: Backend>(
    dst: &Tensor<B>,
    values: &B::Storage,
    map: &[usize],
) -> Result<()> {
    let mut out = dst.write_storage()?;
    B::scatter(values, map, &mut out)
}

/// Sum over `dim`, or over every element when `dim` is None.
pub(crate) fn reduce_sum<B: Backend>(
    t: &Tensor<B>,
    dim: Option<usize>,
    keep_dim: bool,
) -> Result<(B::Storage, Shape)> {
    let (outer, len, inner, shape) = match dim {
        Some(d) => {
            let (outer, len, inner) = t.shape().reduce_geometry(d)?;
            (outer, len, inner, t.shape().reduced(d, keep_dim))
        }
        None => {
            let shape = if keep_dim {
                Shape::new(vec![1; t.rank()])
            } else {
                Shape::from(())
            };
            (1, t.elem_count(), 1, shape)
        }
    };
    let count = check_size::<B>(&shape, t.device())?;
    let src = t.read_storage()?;
    let mut out = B::alloc_zeros(count, t.device())?;
    tracing::trace!(outer, len, inner, "dispatch reduce_sum");
    B::reduce_sum(&src, &mut out, outer, len, inner)?;
    Ok((out, shape))
}
