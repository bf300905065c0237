// Random factories and weight-initialization schemes
//
// Samples are drawn on the host from a caller-supplied RNG and uploaded in
// one copy. Passing the RNG explicitly keeps runs reproducible: seed a
// `StdRng` and the same calls produce the same tensors.
//
// Scheme                 Distribution
// xavier_uniform         U(-a, a),  a = sqrt(6 / (fan_in + fan_out))
// xavier_normal          N(0, s),   s = sqrt(2 / (fan_in + fan_out))
// kaiming_uniform        U(-a, a),  a = sqrt(6 / fan_in)
// kaiming_normal         N(0, s),   s = sqrt(2 / fan_in)

use rand::Rng;
use rand_distr::StandardNormal;

use crate::backend::Backend;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::shape::{dims_elem_count, Shape};
use crate::tensor::Tensor;

/// Fan-in and fan-out of a weight shape.
///
/// - For 2-D: fan_in = dims[1], fan_out = dims[0]
/// - For 3-D+: fan_in = dims[1] * product(dims[2..]),
///   fan_out = dims[0] * product(dims[2..])
///   (convolution-style: dims[0]=out_channels, dims[1]=in_channels, rest=kernel)
///
/// Shapes with fewer than two dimensions have no fans.
pub fn calculate_fans(shape: &Shape) -> Result<(usize, usize)> {
    let dims = shape.dims();
    if dims.len() < 2 {
        return Err(Error::RankMismatch {
            expected: 2,
            got: dims.len(),
        });
    }
    let receptive_field = dims_elem_count(&dims[2..]);
    Ok((
        dims[1].saturating_mul(receptive_field),
        dims[0].saturating_mul(receptive_field),
    ))
}

/// `sqrt(gain / fan)`. A fan of 0 only occurs for zero-element shapes, which
/// draw no samples.
fn fan_scale(gain: f32, fan: usize) -> f32 {
    if fan == 0 {
        0.0
    } else {
        (gain / fan as f32).sqrt()
    }
}

impl<B: Backend> Tensor<B> {
    /// Samples from U[low, high).
    pub fn random_uniform<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        low: f32,
        high: f32,
        rng: &mut R,
        requires_grad: bool,
        device: &B::Device,
    ) -> Result<Self> {
        if !(low.is_finite() && high.is_finite()) || low > high {
            return Err(Error::invalid_argument(format!(
                "random_uniform requires finite low <= high, got low={low}, high={high}"
            )));
        }
        let range = high - low;
        if !range.is_finite() {
            return Err(Error::invalid_argument(format!(
                "random_uniform range {low}..{high} overflows f32"
            )));
        }
        let shape = shape.into();
        let count = dispatch::check_size::<B>(&shape, device)?;
        let mut data = dispatch::host_buffer::<B>(count, device)?;
        data.extend((0..count).map(|_| low + range * rng.gen::<f32>()));
        Self::from_slice(&data, shape, requires_grad, device)
    }

    /// Samples from N(mean, std).
    pub fn random_normal<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        mean: f32,
        std: f32,
        rng: &mut R,
        requires_grad: bool,
        device: &B::Device,
    ) -> Result<Self> {
        if !(mean.is_finite() && std.is_finite()) || std < 0.0 {
            return Err(Error::invalid_argument(format!(
                "random_normal requires a finite mean and a finite non-negative std, got mean={mean}, std={std}"
            )));
        }
        let shape = shape.into();
        let count = dispatch::check_size::<B>(&shape, device)?;
        let mut data = dispatch::host_buffer::<B>(count, device)?;
        data.extend((0..count).map(|_| mean + std * rng.sample::<f32, _>(StandardNormal)));
        Self::from_slice(&data, shape, requires_grad, device)
    }

    pub fn xavier_uniform<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        rng: &mut R,
        requires_grad: bool,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let (fan_in, fan_out) = calculate_fans(&shape)?;
        let bound = fan_scale(6.0, fan_in.saturating_add(fan_out));
        Self::random_uniform(shape, -bound, bound, rng, requires_grad, device)
    }

    pub fn xavier_normal<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        rng: &mut R,
        requires_grad: bool,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let (fan_in, fan_out) = calculate_fans(&shape)?;
        let std = fan_scale(2.0, fan_in.saturating_add(fan_out));
        Self::random_normal(shape, 0.0, std, rng, requires_grad, device)
    }

    pub fn kaiming_uniform<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        rng: &mut R,
        requires_grad: bool,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let (fan_in, _) = calculate_fans(&shape)?;
        let bound = fan_scale(6.0, fan_in);
        Self::random_uniform(shape, -bound, bound, rng, requires_grad, device)
    }

    pub fn kaiming_normal<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        rng: &mut R,
        requires_grad: bool,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let (fan_in, _) = calculate_fans(&shape)?;
        let std = fan_scale(2.0, fan_in);
        Self::random_normal(shape, 0.0, std, rng, requires_grad, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fans_linear() {
        assert_eq!(calculate_fans(&Shape::from((4, 3))).unwrap(), (3, 4));
    }

    #[test]
    fn test_fans_conv() {
        // [out_channels, in_channels, kH, kW]
        assert_eq!(calculate_fans(&Shape::from((8, 3, 5, 5))).unwrap(), (75, 200));
    }

    #[test]
    fn test_fans_saturate() {
        let (fan_in, fan_out) = calculate_fans(&Shape::from((1 << 40, 1 << 40, 1 << 40))).unwrap();
        assert_eq!((fan_in, fan_out), (usize::MAX, usize::MAX));
        assert_eq!(calculate_fans(&Shape::from((3, 0))).unwrap(), (0, 3));
    }

    #[test]
    fn test_fan_scale() {
        assert_eq!(fan_scale(6.0, 0), 0.0);
        assert_eq!(fan_scale(6.0, 6), 1.0);
    }

    #[test]
    fn test_fans_need_two_dims() {
        assert!(calculate_fans(&Shape::from(5)).is_err());
        assert!(calculate_fans(&Shape::from(())).is_err());
    }
}
