// CPU Backend — host reference implementation of the kernel library
//
// Buffers are plain `Vec<f32>`. Every operator is a free function with the
// exact calling convention of the device kernel library, collected into
// lookup tables (`binary_kernel`, `unary_kernel`, `shift_kernel`) keyed by
// operator. Large buffers are processed in parallel with rayon; the
// parallelism is invisible to callers, which only see a completed buffer.

use rayon::prelude::*;

use crate::backend::{Backend, BackendDevice, BackendStorage, BinaryOp, ShiftOp, UnaryOp};
use crate::bail;
use crate::error::{Error, Result};
use crate::shape::dims_elem_count;

/// Buffers at least this long are processed with rayon.
const PAR_THRESHOLD: usize = 1 << 15;

/// Kernel entry point for binary element-wise operators.
pub type BinaryKernel = fn(&[f32], &[f32], &mut [f32], usize);
/// Kernel entry point for unary element-wise operators.
pub type UnaryKernel = fn(&[f32], &mut [f32], usize);
/// Kernel entry point for bit-shift operators.
pub type ShiftKernel = fn(&[f32], &mut [f32], usize, i32);

/// The host device. There is exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuDevice;

impl BackendDevice for CpuDevice {
    fn name(&self) -> String {
        "cpu".to_string()
    }
}

/// A host buffer owned by exactly one tensor.
#[derive(Debug)]
pub struct CpuStorage(Vec<f32>);

impl CpuStorage {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl BackendStorage for CpuStorage {
    fn len(&self) -> usize {
        self.0.len()
    }
}

/// The host reference backend. This is a zero-sized marker type.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

// Kernels

macro_rules! binary_kernel {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        fn $name(lhs: &[f32], rhs: &[f32], out: &mut [f32], n: usize) {
            if n >= PAR_THRESHOLD {
                out[..n]
                    .par_iter_mut()
                    .zip(lhs[..n].par_iter().zip(rhs[..n].par_iter()))
                    .for_each(|(o, (&$a, &$b))| *o = $body);
            } else {
                for ((o, &$a), &$b) in out[..n].iter_mut().zip(&lhs[..n]).zip(&rhs[..n]) {
                    *o = $body;
                }
            }
        }
    };
}

macro_rules! unary_kernel {
    ($name:ident, |$a:ident| $body:expr) => {
        fn $name(input: &[f32], out: &mut [f32], n: usize) {
            if n >= PAR_THRESHOLD {
                out[..n]
                    .par_iter_mut()
                    .zip(input[..n].par_iter())
                    .for_each(|(o, &$a)| *o = $body);
            } else {
                for (o, &$a) in out[..n].iter_mut().zip(&input[..n]) {
                    *o = $body;
                }
            }
        }
    };
}

fn flag(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

binary_kernel!(add_kernel, |a, b| a + b);
binary_kernel!(sub_kernel, |a, b| a - b);
binary_kernel!(mul_kernel, |a, b| a * b);
binary_kernel!(div_kernel, |a, b| a / b);
binary_kernel!(rem_kernel, |a, b| a % b);
binary_kernel!(pow_kernel, |a, b| a.powf(b));
binary_kernel!(eq_kernel, |a, b| flag(a == b));
binary_kernel!(ne_kernel, |a, b| flag(a != b));
binary_kernel!(lt_kernel, |a, b| flag(a < b));
binary_kernel!(le_kernel, |a, b| flag(a <= b));
binary_kernel!(gt_kernel, |a, b| flag(a > b));
binary_kernel!(ge_kernel, |a, b| flag(a >= b));
binary_kernel!(bitand_kernel, |a, b| ((a as i32) & (b as i32)) as f32);
binary_kernel!(bitor_kernel, |a, b| ((a as i32) | (b as i32)) as f32);
binary_kernel!(bitxor_kernel, |a, b| ((a as i32) ^ (b as i32)) as f32);

unary_kernel!(neg_kernel, |a| -a);
unary_kernel!(invert_kernel, |a| !(a as i32) as f32);
unary_kernel!(abs_kernel, |a| a.abs());
unary_kernel!(exp_kernel, |a| a.exp());
unary_kernel!(log_kernel, |a| a.ln());
unary_kernel!(sqrt_kernel, |a| a.sqrt());

fn shl_kernel(input: &[f32], out: &mut [f32], n: usize, shift: i32) {
    for (o, &a) in out[..n].iter_mut().zip(&input[..n]) {
        *o = (a as i32).wrapping_shl(shift as u32) as f32;
    }
}

fn shr_kernel(input: &[f32], out: &mut [f32], n: usize, shift: i32) {
    for (o, &a) in out[..n].iter_mut().zip(&input[..n]) {
        *o = (a as i32).wrapping_shr(shift as u32) as f32;
    }
}

/// Kernel table for binary operators.
pub fn binary_kernel(op: BinaryOp) -> BinaryKernel {
    match op {
        BinaryOp::Add => add_kernel,
        BinaryOp::Sub => sub_kernel,
        BinaryOp::Mul => mul_kernel,
        BinaryOp::Div => div_kernel,
        BinaryOp::Rem => rem_kernel,
        BinaryOp::Pow => pow_kernel,
        BinaryOp::Eq => eq_kernel,
        BinaryOp::Ne => ne_kernel,
        BinaryOp::Lt => lt_kernel,
        BinaryOp::Le => le_kernel,
        BinaryOp::Gt => gt_kernel,
        BinaryOp::Ge => ge_kernel,
        BinaryOp::BitAnd => bitand_kernel,
        BinaryOp::BitOr => bitor_kernel,
        BinaryOp::BitXor => bitxor_kernel,
    }
}

/// Kernel table for unary operators.
pub fn unary_kernel(op: UnaryOp) -> UnaryKernel {
    match op {
        UnaryOp::Neg => neg_kernel,
        UnaryOp::Invert => invert_kernel,
        UnaryOp::Abs => abs_kernel,
        UnaryOp::Exp => exp_kernel,
        UnaryOp::Log => log_kernel,
        UnaryOp::Sqrt => sqrt_kernel,
    }
}

/// Kernel table for shift operators.
pub fn shift_kernel(op: ShiftOp) -> ShiftKernel {
    match op {
        ShiftOp::Shl => shl_kernel,
        ShiftOp::Shr => shr_kernel,
    }
}

/// Row-major GEMM, parallel over output rows.
fn gemm(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    if n == 0 {
        return;
    }
    let row = |(i, c_row): (usize, &mut [f32])| {
        c_row.iter_mut().for_each(|v| *v = 0.0);
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (c_v, &b_v) in c_row.iter_mut().zip(b_row) {
                *c_v += a_ip * b_v;
            }
        }
    };
    if m.saturating_mul(k).saturating_mul(n) >= PAR_THRESHOLD {
        c[..m * n].par_chunks_mut(n).enumerate().for_each(row);
    } else {
        c[..m * n].chunks_mut(n).enumerate().for_each(row);
    }
}

fn check_len(what: &str, got: usize, need: usize) -> Result<()> {
    if got < need {
        bail!("cpu {what}: buffer holds {got} elements, kernel needs {need}");
    }
    Ok(())
}

fn check_indices(what: &str, indices: &[usize], bound: usize) -> Result<()> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= bound) {
        bail!("cpu {what}: index {bad} outside buffer of {bound} elements");
    }
    Ok(())
}

impl Backend for CpuBackend {
    type Device = CpuDevice;
    type Storage = CpuStorage;

    fn alloc_zeros(n: usize, device: &CpuDevice) -> Result<CpuStorage> {
        let mut data = Vec::new();
        data.try_reserve_exact(n).map_err(|e| Error::Allocation {
            elems: n,
            device: device.name(),
            reason: e.to_string(),
        })?;
        data.resize(n, 0.0);
        tracing::trace!(elems = n, "cpu alloc");
        Ok(CpuStorage(data))
    }

    fn from_slice(data: &[f32], device: &CpuDevice) -> Result<CpuStorage> {
        let mut storage = Self::alloc_zeros(data.len(), device)?;
        storage.0.copy_from_slice(data);
        Ok(storage)
    }

    fn to_vec(storage: &CpuStorage) -> Result<Vec<f32>> {
        Ok(storage.0.clone())
    }

    fn fill(out: &mut CpuStorage, value: f32) -> Result<()> {
        out.0.iter_mut().for_each(|v| *v = value);
        Ok(())
    }

    fn copy(src: &CpuStorage, dst: &mut CpuStorage) -> Result<()> {
        if src.len() != dst.len() {
            return Err(Error::msg(format!(
                "cpu copy: source has {} elements, destination {}",
                src.len(),
                dst.len()
            )));
        }
        dst.0.copy_from_slice(&src.0);
        Ok(())
    }

    fn binary(
        op: BinaryOp,
        lhs: &CpuStorage,
        rhs: &CpuStorage,
        out: &mut CpuStorage,
        n: usize,
    ) -> Result<()> {
        check_len("binary lhs", lhs.len(), n)?;
        check_len("binary rhs", rhs.len(), n)?;
        check_len("binary out", out.len(), n)?;
        binary_kernel(op)(&lhs.0, &rhs.0, &mut out.0, n);
        Ok(())
    }

    fn unary(op: UnaryOp, input: &CpuStorage, out: &mut CpuStorage, n: usize) -> Result<()> {
        check_len("unary input", input.len(), n)?;
        check_len("unary out", out.len(), n)?;
        unary_kernel(op)(&input.0, &mut out.0, n);
        Ok(())
    }

    fn shift(
        op: ShiftOp,
        input: &CpuStorage,
        out: &mut CpuStorage,
        n: usize,
        shift: i32,
    ) -> Result<()> {
        check_len("shift input", input.len(), n)?;
        check_len("shift out", out.len(), n)?;
        shift_kernel(op)(&input.0, &mut out.0, n, shift);
        Ok(())
    }

    fn matmul(
        lhs: &CpuStorage,
        rhs: &CpuStorage,
        out: &mut CpuStorage,
        m: usize,
        k: usize,
        n: usize,
    ) -> Result<()> {
        check_len("matmul lhs", lhs.len(), dims_elem_count(&[m, k]))?;
        check_len("matmul rhs", rhs.len(), dims_elem_count(&[k, n]))?;
        check_len("matmul out", out.len(), dims_elem_count(&[m, n]))?;
        if m == 0 || n == 0 {
            return Ok(());
        }
        gemm(&lhs.0, &rhs.0, &mut out.0, m, k, n);
        Ok(())
    }

    fn gather(src: &CpuStorage, indices: &[usize], out: &mut CpuStorage) -> Result<()> {
        check_len("gather out", out.len(), indices.len())?;
        check_indices("gather", indices, src.len())?;
        let src = &src.0;
        if indices.len() >= PAR_THRESHOLD {
            out.0[..indices.len()]
                .par_iter_mut()
                .zip(indices.par_iter())
                .for_each(|(o, &i)| *o = src[i]);
        } else {
            for (o, &i) in out.0.iter_mut().zip(indices) {
                *o = src[i];
            }
        }
        Ok(())
    }

    fn scatter(src: &CpuStorage, indices: &[usize], dst: &mut CpuStorage) -> Result<()> {
        check_len("scatter src", src.len(), indices.len())?;
        check_indices("scatter", indices, dst.len())?;
        for (&v, &i) in src.0.iter().zip(indices) {
            dst.0[i] = v;
        }
        Ok(())
    }

    fn reduce_sum(
        src: &CpuStorage,
        out: &mut CpuStorage,
        outer: usize,
        len: usize,
        inner: usize,
    ) -> Result<()> {
        check_len("reduce_sum src", src.len(), dims_elem_count(&[outer, len, inner]))?;
        check_len("reduce_sum out", out.len(), dims_elem_count(&[outer, inner]))?;
        if out.is_empty() {
            return Ok(());
        }
        for o in 0..outer {
            for i in 0..inner {
                let mut acc = 0.0f32;
                for j in 0..len {
                    acc += src.0[(o * len + j) * inner + i];
                }
                out.0[o * inner + i] = acc;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(v: &[f32]) -> CpuStorage {
        CpuBackend::from_slice(v, &CpuDevice).unwrap()
    }

    #[test]
    fn test_kernel_table_arithmetic() {
        let mut out = [0.0f32; 3];
        binary_kernel(BinaryOp::Sub)(&[5.0, 7.0, 9.0], &[1.0, 2.0, 3.0], &mut out, 3);
        assert_eq!(out, [4.0, 5.0, 6.0]);
        binary_kernel(BinaryOp::Rem)(&[-7.0, 7.0, 5.5], &[3.0, -3.0, 2.0], &mut out, 3);
        assert_eq!(out, [-1.0, 1.0, 1.5]);
    }

    #[test]
    fn test_kernel_table_bitwise_and_compare() {
        let mut out = [0.0f32; 2];
        binary_kernel(BinaryOp::BitAnd)(&[6.0, 5.9], &[3.0, 1.0], &mut out, 2);
        assert_eq!(out, [2.0, 1.0]);
        binary_kernel(BinaryOp::Le)(&[1.0, 3.0], &[1.0, 2.0], &mut out, 2);
        assert_eq!(out, [1.0, 0.0]);
        unary_kernel(UnaryOp::Invert)(&[0.0, 5.0], &mut out, 2);
        assert_eq!(out, [-1.0, -6.0]);
        shift_kernel(ShiftOp::Shl)(&[1.0, 3.0], &mut out, 2, 2);
        assert_eq!(out, [4.0, 12.0]);
        shift_kernel(ShiftOp::Shr)(&[-8.0, 9.0], &mut out, 2, 1);
        assert_eq!(out, [-4.0, 4.0]);
    }

    #[test]
    fn test_kernel_respects_n() {
        let mut out = [9.0f32; 3];
        binary_kernel(BinaryOp::Add)(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], &mut out, 2);
        assert_eq!(out, [2.0, 2.0, 9.0]);
    }

    #[test]
    fn test_parallel_path_matches() {
        let n = PAR_THRESHOLD + 7;
        let a: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let mut out = vec![0.0f32; n];
        binary_kernel(BinaryOp::Mul)(&a, &a, &mut out, n);
        assert_eq!(out[n - 1], a[n - 1] * a[n - 1]);
        assert_eq!(out[3], 9.0);
    }

    #[test]
    fn test_matmul() {
        // [[1, 2], [3, 4]] @ [[5, 6], [7, 8]] = [[19, 22], [43, 50]]
        let a = storage(&[1.0, 2.0, 3.0, 4.0]);
        let b = storage(&[5.0, 6.0, 7.0, 8.0]);
        let mut c = CpuBackend::alloc_zeros(4, &CpuDevice).unwrap();
        CpuBackend::matmul(&a, &b, &mut c, 2, 2, 2).unwrap();
        assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_gather_scatter() {
        let src = storage(&[10.0, 20.0, 30.0]);
        let mut out = CpuBackend::alloc_zeros(4, &CpuDevice).unwrap();
        CpuBackend::gather(&src, &[2, 0, 0, 1], &mut out).unwrap();
        assert_eq!(out.as_slice(), &[30.0, 10.0, 10.0, 20.0]);

        let mut dst = CpuBackend::alloc_zeros(4, &CpuDevice).unwrap();
        CpuBackend::scatter(&src, &[3, 1, 0], &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[30.0, 20.0, 0.0, 10.0]);

        assert!(CpuBackend::gather(&src, &[3], &mut out).is_err());
    }

    #[test]
    fn test_reduce_sum_middle_axis() {
        // [2, 3] summed over dim 0 → [3]
        let src = storage(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut out = CpuBackend::alloc_zeros(3, &CpuDevice).unwrap();
        CpuBackend::reduce_sum(&src, &mut out, 1, 2, 3).unwrap();
        assert_eq!(out.as_slice(), &[5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let a = storage(&[1.0, 2.0]);
        let mut out = CpuBackend::alloc_zeros(1, &CpuDevice).unwrap();
        assert!(CpuBackend::binary(BinaryOp::Add, &a, &a, &mut out, 2).is_err());
        assert!(CpuBackend::copy(&a, &mut out).is_err());
    }
}
