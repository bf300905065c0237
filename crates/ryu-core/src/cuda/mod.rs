// CUDA Backend — device kernel library on NVIDIA GPUs via cudarc
//
// ARCHITECTURE:
// - CudaDevice wraps cudarc's device handle + a cuBLAS handle. Creating one
//   compiles every kernel in kernels.rs with NVRTC and loads the module.
// - CudaStorage is one CudaSlice<f32> plus the device it lives on, so the
//   static Backend methods can find the kernels for any buffer.
// - Matmul is a single cuBLAS sgemm on row-major data.
// - Every Backend method synchronizes the device before returning, so an
//   operator never hands back a buffer that is still being written.
//
// USAGE:
//   let device = CudaDevice::new(0)?;  // GPU ordinal 0
//   let t = Tensor::<CudaBackend>::zeros((2, 3), false, &device)?;

mod kernels;

use std::fmt;
use std::sync::Arc;

use cudarc::cublas::CudaBlas;
use cudarc::driver::{CudaFunction, CudaSlice, DevicePtr, DeviceSlice, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::{compile_ptx_with_opts, CompileOptions};

use crate::backend::{Backend, BackendDevice, BackendStorage, BinaryOp, ShiftOp, UnaryOp};
use crate::bail;
use crate::error::{Error, Result};
use crate::shape::dims_elem_count;

/// A CUDA device handle. Clonable (uses Arc internally).
pub struct CudaDevice {
    dev: Arc<cudarc::driver::CudaDevice>,
    blas: Arc<CudaBlas>,
    ordinal: usize,
}

impl CudaDevice {
    /// Open the GPU with the given ordinal (0, 1, ...) and compile the
    /// kernel library for it.
    pub fn new(ordinal: usize) -> Result<Self> {
        let dev = cudarc::driver::CudaDevice::new(ordinal)
            .map_err(|e| Error::msg(format!("CUDA device creation failed: {e}")))?;

        let blas = CudaBlas::new(dev.clone())
            .map_err(|e| Error::msg(format!("cuBLAS init failed: {e}")))?;

        let ptx = compile_ptx_with_opts(kernels::KERNEL_SOURCE, CompileOptions::default())
            .map_err(|e| Error::msg(format!("NVRTC compilation failed: {e}")))?;
        dev.load_ptx(ptx, kernels::MODULE_NAME, kernels::KERNEL_NAMES)
            .map_err(|e| Error::msg(format!("PTX load failed: {e}")))?;

        tracing::debug!(ordinal, kernels = kernels::KERNEL_NAMES.len(), "cuda device ready");
        Ok(CudaDevice {
            dev,
            blas: Arc::new(blas),
            ordinal,
        })
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Get a compiled kernel function by name.
    fn get_func(&self, name: &str) -> Result<CudaFunction> {
        self.dev
            .get_func(kernels::MODULE_NAME, name)
            .ok_or_else(|| Error::msg(format!("CUDA kernel '{name}' not found")))
    }

    fn synchronize(&self) -> Result<()> {
        self.dev
            .synchronize()
            .map_err(|e| Error::msg(format!("CUDA synchronize: {e}")))
    }

    fn alloc(&self, n: usize) -> Result<CudaSlice<f32>> {
        self.dev.alloc_zeros::<f32>(n).map_err(|e| Error::Allocation {
            elems: n,
            device: self.name(),
            reason: e.to_string(),
        })
    }

    fn upload_indices(&self, indices: &[usize]) -> Result<CudaSlice<u32>> {
        let host = indices
            .iter()
            .map(|&i| u32::try_from(i))
            .collect::<std::result::Result<Vec<u32>, _>>()
            .map_err(|_| Error::msg("index map exceeds u32 range for CUDA kernels"))?;
        self.dev
            .htod_copy(host)
            .map_err(|e| Error::msg(format!("htod indices: {e}")))
    }
}

impl Clone for CudaDevice {
    fn clone(&self) -> Self {
        CudaDevice {
            dev: self.dev.clone(),
            blas: self.blas.clone(),
            ordinal: self.ordinal,
        }
    }
}

impl fmt::Debug for CudaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CudaDevice(cuda:{})", self.ordinal)
    }
}

// Safety: cudarc's device is thread-safe (CUDA runtime is thread-safe)
unsafe impl Send for CudaDevice {}
unsafe impl Sync for CudaDevice {}

impl BackendDevice for CudaDevice {
    fn name(&self) -> String {
        format!("cuda:{}", self.ordinal)
    }
}

/// A device buffer of f32, freed when dropped.
pub struct CudaStorage {
    data: CudaSlice<f32>,
    device: CudaDevice,
}

impl CudaStorage {
    pub fn device(&self) -> &CudaDevice {
        &self.device
    }
}

impl fmt::Debug for CudaStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CudaStorage(len={}, {})", self.data.len(), self.device.name())
    }
}

unsafe impl Send for CudaStorage {}
unsafe impl Sync for CudaStorage {}

impl BackendStorage for CudaStorage {
    fn len(&self) -> usize {
        self.data.len()
    }
}

fn launch_cfg(n: usize) -> LaunchConfig {
    const BLOCK: u32 = 256;
    let grid = (n as u32).div_ceil(BLOCK);
    LaunchConfig {
        block_dim: (BLOCK, 1, 1),
        grid_dim: (grid.max(1), 1, 1),
        shared_mem_bytes: 0,
    }
}

fn check_len(what: &str, got: usize, need: usize) -> Result<()> {
    if got < need {
        bail!("cuda {what}: buffer holds {got} elements, kernel needs {need}");
    }
    Ok(())
}

fn check_count(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::msg(format!("cuda kernels take at most u32::MAX elements, got {n}")))
}

/// The CUDA GPU backend. This is a zero-sized marker type.
#[derive(Clone, Debug)]
pub struct CudaBackend;

impl Backend for CudaBackend {
    type Device = CudaDevice;
    type Storage = CudaStorage;

    fn alloc_zeros(n: usize, device: &CudaDevice) -> Result<CudaStorage> {
        let data = device.alloc(n)?;
        tracing::trace!(elems = n, device = %device.name(), "cuda alloc");
        Ok(CudaStorage {
            data,
            device: device.clone(),
        })
    }

    fn from_slice(data: &[f32], device: &CudaDevice) -> Result<CudaStorage> {
        let data = device
            .dev
            .htod_sync_copy(data)
            .map_err(|e| Error::msg(format!("htod f32: {e}")))?;
        Ok(CudaStorage {
            data,
            device: device.clone(),
        })
    }

    fn to_vec(storage: &CudaStorage) -> Result<Vec<f32>> {
        storage
            .device
            .dev
            .dtoh_sync_copy(&storage.data)
            .map_err(|e| Error::msg(format!("dtoh f32: {e}")))
    }

    fn fill(out: &mut CudaStorage, value: f32) -> Result<()> {
        let n = out.data.len();
        if n == 0 {
            return Ok(());
        }
        let dev = out.device.clone();
        let func = dev.get_func("fill")?;
        unsafe { func.launch(launch_cfg(n), (&mut out.data, value, check_count(n)?)) }
            .map_err(|e| Error::msg(format!("fill: {e}")))?;
        dev.synchronize()
    }

    fn copy(src: &CudaStorage, dst: &mut CudaStorage) -> Result<()> {
        if src.data.len() != dst.data.len() {
            return Err(Error::msg(format!(
                "cuda copy: source has {} elements, destination {}",
                src.data.len(),
                dst.data.len()
            )));
        }
        let dev = dst.device.clone();
        dev.dev
            .dtod_copy(&src.data, &mut dst.data)
            .map_err(|e| Error::msg(format!("dtod f32: {e}")))?;
        dev.synchronize()
    }

    fn binary(
        op: BinaryOp,
        lhs: &CudaStorage,
        rhs: &CudaStorage,
        out: &mut CudaStorage,
        n: usize,
    ) -> Result<()> {
        check_len("binary lhs", lhs.len(), n)?;
        check_len("binary rhs", rhs.len(), n)?;
        check_len("binary out", out.len(), n)?;
        if n == 0 {
            return Ok(());
        }
        let dev = out.device.clone();
        let name = format!("binary_{}", op.name());
        let func = dev.get_func(&name)?;
        unsafe {
            func.launch(
                launch_cfg(n),
                (&lhs.data, &rhs.data, &mut out.data, check_count(n)?),
            )
        }
        .map_err(|e| Error::msg(format!("{name}: {e}")))?;
        dev.synchronize()
    }

    fn unary(op: UnaryOp, input: &CudaStorage, out: &mut CudaStorage, n: usize) -> Result<()> {
        check_len("unary input", input.len(), n)?;
        check_len("unary out", out.len(), n)?;
        if n == 0 {
            return Ok(());
        }
        let dev = out.device.clone();
        let name = format!("unary_{}", op.name());
        let func = dev.get_func(&name)?;
        unsafe { func.launch(launch_cfg(n), (&input.data, &mut out.data, check_count(n)?)) }
            .map_err(|e| Error::msg(format!("{name}: {e}")))?;
        dev.synchronize()
    }

    fn shift(
        op: ShiftOp,
        input: &CudaStorage,
        out: &mut CudaStorage,
        n: usize,
        shift: i32,
    ) -> Result<()> {
        check_len("shift input", input.len(), n)?;
        check_len("shift out", out.len(), n)?;
        if n == 0 {
            return Ok(());
        }
        let dev = out.device.clone();
        let name = format!("shift_{}", op.name());
        let func = dev.get_func(&name)?;
        unsafe {
            func.launch(
                launch_cfg(n),
                (&input.data, &mut out.data, check_count(n)?, shift),
            )
        }
        .map_err(|e| Error::msg(format!("{name}: {e}")))?;
        dev.synchronize()
    }

    fn matmul(
        lhs: &CudaStorage,
        rhs: &CudaStorage,
        out: &mut CudaStorage,
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
        let dev = out.device.clone();

        // cuBLAS is column-major. A row-major C = A @ B is the column-major
        // Cᵀ = Bᵀ @ Aᵀ, so pass B first with the dimensions swapped.
        use cudarc::cublas::sys::cublasOperation_t;
        unsafe {
            cudarc::cublas::result::sgemm(
                *dev.blas.handle(),
                cublasOperation_t::CUBLAS_OP_N,
                cublasOperation_t::CUBLAS_OP_N,
                n as i32,
                m as i32,
                k as i32,
                (&1.0f32) as *const f32,
                *rhs.data.device_ptr() as *const f32,
                n as i32,
                *lhs.data.device_ptr() as *const f32,
                k.max(1) as i32,
                (&0.0f32) as *const f32,
                *out.data.device_ptr() as *mut f32,
                n as i32,
            )
        }
        .map_err(|e| Error::msg(format!("cuBLAS sgemm: {e}")))?;
        dev.synchronize()
    }

    fn gather(src: &CudaStorage, indices: &[usize], out: &mut CudaStorage) -> Result<()> {
        let n = indices.len();
        check_len("gather out", out.len(), n)?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= src.len()) {
            return Err(Error::msg(format!(
                "cuda gather: index {bad} outside buffer of {} elements",
                src.len()
            )));
        }
        if n == 0 {
            return Ok(());
        }
        let dev = out.device.clone();
        let index = dev.upload_indices(indices)?;
        let func = dev.get_func("gather")?;
        unsafe {
            func.launch(
                launch_cfg(n),
                (&src.data, &index, &mut out.data, check_count(n)?),
            )
        }
        .map_err(|e| Error::msg(format!("gather: {e}")))?;
        dev.synchronize()
    }

    fn scatter(src: &CudaStorage, indices: &[usize], dst: &mut CudaStorage) -> Result<()> {
        let n = indices.len();
        check_len("scatter src", src.len(), n)?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= dst.len()) {
            return Err(Error::msg(format!(
                "cuda scatter: index {bad} outside buffer of {} elements",
                dst.len()
            )));
        }
        if n == 0 {
            return Ok(());
        }
        let dev = dst.device.clone();
        let index = dev.upload_indices(indices)?;
        let func = dev.get_func("scatter")?;
        unsafe {
            func.launch(
                launch_cfg(n),
                (&src.data, &index, &mut dst.data, check_count(n)?),
            )
        }
        .map_err(|e| Error::msg(format!("scatter: {e}")))?;
        dev.synchronize()
    }

    fn reduce_sum(
        src: &CudaStorage,
        out: &mut CudaStorage,
        outer: usize,
        len: usize,
        inner: usize,
    ) -> Result<()> {
        check_len("reduce_sum src", src.len(), dims_elem_count(&[outer, len, inner]))?;
        check_len("reduce_sum out", out.len(), dims_elem_count(&[outer, inner]))?;
        let total = out.len();
        if total == 0 {
            return Ok(());
        }
        let dev = out.device.clone();
        let func = dev.get_func("reduce_sum")?;
        unsafe {
            func.launch(
                launch_cfg(total),
                (
                    &src.data,
                    &mut out.data,
                    check_count(outer)?,
                    check_count(len)?,
                    check_count(inner)?,
                ),
            )
        }
        .map_err(|e| Error::msg(format!("reduce_sum: {e}")))?;
        dev.synchronize()
    }
}
