//! # ryu-core
//!
//! Device-resident f32 tensors with reverse-mode automatic differentiation.
//!
//! This crate provides:
//! - [`Tensor`] — n-dimensional array that owns one contiguous device buffer
//! - [`Shape`] — shapes, broadcasting and the index maps behind reshapes,
//!   transposes and slices
//! - [`Backend`] trait — buffer management plus the kernel library contract
//! - [`CpuBackend`] — host reference kernels (always available)
//! - `CudaBackend` — NVRTC-compiled kernels and cuBLAS (feature `cuda`)
//! - [`HostData`] — nested host values for ingestion and export
//! - [`no_grad`] — disable graph recording for a closure
//!
//! ```ignore
//! use ryu_core::{CpuBackend, CpuDevice, Tensor};
//!
//! let x = Tensor::<CpuBackend>::fill((2, 2), 3.0, true, &CpuDevice)?;
//! let y = Tensor::<CpuBackend>::fill((2, 2), 2.0, true, &CpuDevice)?;
//! let z = (&x * &y)?;
//! z.backward(Some(&Tensor::ones((2, 2), false, &CpuDevice)?))?;
//! assert_eq!(x.grad().unwrap().to_vec()?, vec![2.0; 4]);
//! ```

pub mod backend;
pub mod backprop;
pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;
mod dispatch;
pub mod error;
pub mod host;
pub mod index;
pub mod init;
pub mod op;
mod ops;
pub mod repr;
pub mod shape;
pub mod telemetry;
pub mod tensor;

pub use backend::{Backend, BackendDevice, BackendStorage, BinaryOp, ShiftOp, UnaryOp};
pub use backprop::{is_grad_enabled, no_grad};
pub use cpu::{CpuBackend, CpuDevice, CpuStorage};
#[cfg(feature = "cuda")]
pub use cuda::{CudaBackend, CudaDevice, CudaStorage};
pub use error::{Error, ErrorKind, Result};
pub use host::HostData;
pub use index::TensorIndex;
pub use init::calculate_fans;
pub use op::{Op, TensorId};
pub use repr::ReprOptions;
pub use shape::Shape;
pub use telemetry::init_tracing;
pub use tensor::Tensor;

/// Tensor on the host reference backend.
pub type CpuTensor = Tensor<CpuBackend>;

/// Tensor on the CUDA backend.
#[cfg(feature = "cuda")]
pub type CudaTensor = Tensor<CudaBackend>;
