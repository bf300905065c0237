// CUDA backend tests — device results checked against the host kernels
//
// Run with: `cargo test -p ryu-core --features cuda`
//
// Every test creates CudaDevice(0).

#![cfg(feature = "cuda")]

use ryu_core::{CpuDevice, CpuTensor, CudaDevice, CudaTensor, ErrorKind, TensorIndex};

type T = CudaTensor;

fn gpu() -> CudaDevice {
    CudaDevice::new(0).expect("CUDA device 0 not available, skip CUDA tests")
}

fn approx(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() < tol
}

fn assert_approx_vec(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(approx(*a, *e, tol), "index {i}: {a} != {e} (tol={tol})");
    }
}

// Creation

#[test]
fn test_factories() {
    let dev = gpu();
    let z = T::zeros((2, 3), false, &dev).unwrap();
    assert_eq!(z.to_vec().unwrap(), vec![0.0; 6]);
    let f = T::fill(4, 2.5, false, &dev).unwrap();
    assert_eq!(f.to_vec().unwrap(), vec![2.5; 4]);
    let i = T::eye(2, false, &dev).unwrap();
    assert_eq!(i.to_vec().unwrap(), vec![1.0, 0.0, 0.0, 1.0]);
    let e = T::zeros(0, false, &dev).unwrap();
    assert!(e.to_vec().unwrap().is_empty());
}

// Kernels against the host reference

#[test]
fn test_binary_kernels_match_host() {
    let dev = gpu();
    let lhs = [7.5f32, -3.0, 2.0, 12.0];
    let rhs = [2.0f32, 4.0, 2.0, 10.0];
    let (ga, gb) = (
        T::from_slice(&lhs, 4, false, &dev).unwrap(),
        T::from_slice(&rhs, 4, false, &dev).unwrap(),
    );
    let (ca, cb) = (
        CpuTensor::from_slice(&lhs, 4, false, &CpuDevice).unwrap(),
        CpuTensor::from_slice(&rhs, 4, false, &CpuDevice).unwrap(),
    );

    let pairs = [
        (ga.add(&gb), ca.add(&cb)),
        (ga.sub(&gb), ca.sub(&cb)),
        (ga.mul(&gb), ca.mul(&cb)),
        (ga.div(&gb), ca.div(&cb)),
        (ga.rem(&gb), ca.rem(&cb)),
        (ga.abs().unwrap().pow(&gb), ca.abs().unwrap().pow(&cb)),
        (ga.le(&gb), ca.le(&cb)),
        (ga.ne(&gb), ca.ne(&cb)),
        (ga.bitand(&gb), ca.bitand(&cb)),
        (ga.bitor(&gb), ca.bitor(&cb)),
        (ga.bitxor(&gb), ca.bitxor(&cb)),
    ];
    for (g, c) in pairs {
        assert_approx_vec(&g.unwrap().to_vec().unwrap(), &c.unwrap().to_vec().unwrap(), 1e-3);
    }
}

#[test]
fn test_unary_and_shift_kernels_match_host() {
    let dev = gpu();
    let data = [0.5f32, 1.0, 4.0, 9.0];
    let g = T::from_slice(&data, 4, false, &dev).unwrap();
    let c = CpuTensor::from_slice(&data, 4, false, &CpuDevice).unwrap();

    let pairs = [
        (g.neg(), c.neg()),
        (g.exp(), c.exp()),
        (g.log(), c.log()),
        (g.sqrt(), c.sqrt()),
        (g.invert(), c.invert()),
        (g.shl(3), c.shl(3)),
        (g.shr(1), c.shr(1)),
    ];
    for (g, c) in pairs {
        assert_approx_vec(&g.unwrap().to_vec().unwrap(), &c.unwrap().to_vec().unwrap(), 1e-4);
    }
}

#[test]
fn test_broadcast_and_reduce() {
    let dev = gpu();
    let m = T::from_host([[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]], false, &dev).unwrap();
    let col = T::from_host([[10.0f32], [20.0]], false, &dev).unwrap();
    let s = (&m + &col).unwrap();
    assert_eq!(s.to_vec().unwrap(), vec![11.0, 12.0, 13.0, 24.0, 25.0, 26.0]);
    assert_eq!(m.sum(Some(0), false).unwrap().to_vec().unwrap(), vec![5.0, 7.0, 9.0]);
    assert_eq!(m.sum_all().unwrap().to_scalar().unwrap(), 21.0);
    assert_eq!(
        m.transpose().unwrap().to_vec().unwrap(),
        vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
    );
}

#[test]
fn test_matmul_cublas() {
    let dev = gpu();
    let a = T::from_host([[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]], false, &dev).unwrap();
    let b = T::from_host([[7.0f32, 8.0], [9.0, 10.0], [11.0, 12.0]], false, &dev).unwrap();
    let c = a.matmul(&b).unwrap();
    assert_eq!(c.dims(), &[2, 2]);
    assert_approx_vec(&c.to_vec().unwrap(), &[58.0, 64.0, 139.0, 154.0], 1e-4);
}

#[test]
fn test_indexing() {
    let dev = gpu();
    let g = T::arange(0.0, 12.0, 1.0, false, &dev)
        .unwrap()
        .reshape((3, 4))
        .unwrap();
    let col = g
        .get_item(&[TensorIndex::Full, TensorIndex::Index(-1)])
        .unwrap();
    assert_eq!(col.to_vec().unwrap(), vec![3.0, 7.0, 11.0]);

    let zero = T::scalar(0.0, false, &dev).unwrap();
    g.set_item(&[TensorIndex::Index(1)], &zero).unwrap();
    assert_eq!(
        g.get_item(&[TensorIndex::Index(1)]).unwrap().to_vec().unwrap(),
        vec![0.0; 4]
    );
}

#[test]
fn test_inplace_on_device() {
    let dev = gpu();
    let a = T::from_slice(&[1.0, 2.0], 2, false, &dev).unwrap();
    a.mul_(&a).unwrap();
    assert_eq!(a.to_vec().unwrap(), vec![1.0, 4.0]);
    let err = a.shl_(32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(a.version(), 1);
}

// Autograd on device

#[test]
fn test_backward_on_device() {
    let dev = gpu();
    let a = T::from_host([[1.0f32, 2.0], [3.0, 4.0]], true, &dev).unwrap();
    let b = T::from_host([[5.0f32, 6.0], [7.0, 8.0]], true, &dev).unwrap();
    a.matmul(&b).unwrap().sum_all().unwrap().backward(None).unwrap();
    assert_approx_vec(&a.grad().unwrap().to_vec().unwrap(), &[11.0, 15.0, 11.0, 15.0], 1e-4);
    assert_approx_vec(&b.grad().unwrap().to_vec().unwrap(), &[4.0, 4.0, 6.0, 6.0], 1e-4);

    let x = T::ones((3, 1), true, &dev).unwrap();
    let y = T::ones((3, 4), false, &dev).unwrap();
    (&x + &y).unwrap().sum_all().unwrap().backward(None).unwrap();
    assert_eq!(x.grad().unwrap().to_vec().unwrap(), vec![4.0; 3]);
}
