// Operator overloading for &Tensor
//
// Operators borrow both sides and return Result<Tensor>, because every one
// of them can fail (shape mismatch, allocation). Typical use:
//
//   let c = (&a + &b)?;
//   let d = ((&c * &a)? - &b)?;
//
// Shifts take the bit count on the right: `(&t << 2)?`.

use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Shl, Shr, Sub};

use crate::backend::Backend;
use crate::error::Result;
use crate::tensor::Tensor;

macro_rules! binary_operator {
    ($trait:ident, $method:ident) => {
        impl<'b, B: Backend> $trait<&'b Tensor<B>> for &Tensor<B> {
            type Output = Result<Tensor<B>>;

            fn $method(self, rhs: &'b Tensor<B>) -> Self::Output {
                Tensor::$method(self, rhs)
            }
        }
    };
}

binary_operator!(Add, add);
binary_operator!(Sub, sub);
binary_operator!(Mul, mul);
binary_operator!(Div, div);
binary_operator!(Rem, rem);
binary_operator!(BitAnd, bitand);
binary_operator!(BitOr, bitor);
binary_operator!(BitXor, bitxor);

impl<B: Backend> Neg for &Tensor<B> {
    type Output = Result<Tensor<B>>;

    fn neg(self) -> Self::Output {
        Tensor::neg(self)
    }
}

/// `!t` is the bitwise invert of the i32-truncated values.
impl<B: Backend> Not for &Tensor<B> {
    type Output = Result<Tensor<B>>;

    fn not(self) -> Self::Output {
        Tensor::invert(self)
    }
}

impl<B: Backend> Shl<i32> for &Tensor<B> {
    type Output = Result<Tensor<B>>;

    fn shl(self, amount: i32) -> Self::Output {
        Tensor::shl(self, amount)
    }
}

impl<B: Backend> Shr<i32> for &Tensor<B> {
    type Output = Result<Tensor<B>>;

    fn shr(self, amount: i32) -> Self::Output {
        Tensor::shr(self, amount)
    }
}

#[cfg(test)]
mod tests {
    use crate::cpu::{CpuBackend, CpuDevice};
    use crate::tensor::Tensor;

    type T = Tensor<CpuBackend>;

    #[test]
    fn test_operators_match_methods() {
        let a = T::from_slice(&[6.0, 5.0], 2, false, &CpuDevice).unwrap();
        let b = T::from_slice(&[3.0, 2.0], 2, false, &CpuDevice).unwrap();
        assert_eq!((&a + &b).unwrap().to_vec().unwrap(), vec![9.0, 7.0]);
        assert_eq!((&a - &b).unwrap().to_vec().unwrap(), vec![3.0, 3.0]);
        assert_eq!((&a * &b).unwrap().to_vec().unwrap(), vec![18.0, 10.0]);
        assert_eq!((&a / &b).unwrap().to_vec().unwrap(), vec![2.0, 2.5]);
        assert_eq!((&a % &b).unwrap().to_vec().unwrap(), vec![0.0, 1.0]);
        assert_eq!((&a & &b).unwrap().to_vec().unwrap(), vec![2.0, 0.0]);
        assert_eq!((&a | &b).unwrap().to_vec().unwrap(), vec![7.0, 7.0]);
        assert_eq!((&a ^ &b).unwrap().to_vec().unwrap(), vec![5.0, 7.0]);
        assert_eq!((-&a).unwrap().to_vec().unwrap(), vec![-6.0, -5.0]);
        assert_eq!((!&b).unwrap().to_vec().unwrap(), vec![-4.0, -3.0]);
        assert_eq!((&b << 1).unwrap().to_vec().unwrap(), vec![6.0, 4.0]);
        assert_eq!((&a >> 1).unwrap().to_vec().unwrap(), vec![3.0, 2.0]);
    }

    #[test]
    fn test_shift_out_of_range() {
        let a = T::ones(2, false, &CpuDevice).unwrap();
        let err = (&a << 32).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        assert!((&a >> -1).is_err());
    }
}
