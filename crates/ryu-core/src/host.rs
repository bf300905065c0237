// Host data — nested host-side sequences and their conversion to flat buffers
//
// A binding layer hands the core arbitrarily nested sequences of numbers
// (Python lists, JSON arrays, ...). HostData is the neutral representation:
// a scalar or a list of HostData. The three marshalling calls are:
//
//   infer_shape   nested → dimension sizes (rejects jagged nesting)
//   flatten_data  nested → row-major Vec<f32>
//   reshape_data  (flat, shape) → nested
//
// Empty lists are allowed and produce a zero-sized dimension.

use crate::error::{Error, Result};
use crate::shape::Shape;

/// A nested host-side value: either a number or a sequence of nested values.
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    Scalar(f32),
    List(Vec<HostData>),
}

impl HostData {
    /// Dimension sizes implied by the nesting.
    ///
    /// Every sibling at every depth must have the same shape; otherwise the
    /// data is jagged and a shape error is returned.
    pub fn infer_shape(&self) -> Result<Shape> {
        let mut dims = Vec::new();
        infer_dims(self, 0, &mut dims)?;
        Ok(Shape::new(dims))
    }

    /// Flatten into a row-major buffer after validating the nesting.
    pub fn flatten_data(&self) -> Result<(Vec<f32>, Shape)> {
        let shape = self.infer_shape()?;
        let mut out = Vec::with_capacity(shape.elem_count());
        flatten_into(self, &mut out);
        Ok((out, shape))
    }

    /// Rebuild nested data from a flat row-major buffer.
    pub fn reshape_data(data: &[f32], shape: &Shape) -> Result<HostData> {
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                shape: shape.clone(),
                expected: shape.elem_count(),
                got: data.len(),
            });
        }
        Ok(build(data, shape.dims()))
    }
}

fn describe(node: &HostData) -> String {
    match node {
        HostData::Scalar(_) => "a scalar".to_string(),
        HostData::List(items) => format!("a sequence of length {}", items.len()),
    }
}

fn infer_dims(node: &HostData, depth: usize, dims: &mut Vec<usize>) -> Result<()> {
    let items = match node {
        HostData::Scalar(_) => return Ok(()),
        HostData::List(items) => items,
    };
    dims.push(items.len());
    let Some(first) = items.first() else {
        return Ok(());
    };
    let mut first_dims = Vec::new();
    infer_dims(first, depth + 1, &mut first_dims)?;
    for sibling in &items[1..] {
        let mut sibling_dims = Vec::new();
        infer_dims(sibling, depth + 1, &mut sibling_dims)?;
        let same_kind = matches!(
            (first, sibling),
            (HostData::Scalar(_), HostData::Scalar(_)) | (HostData::List(_), HostData::List(_))
        );
        if !same_kind || sibling_dims != first_dims {
            return Err(Error::JaggedData {
                depth: depth + 1,
                expected: describe(first),
                got: describe(sibling),
            });
        }
    }
    dims.extend(first_dims);
    Ok(())
}

fn flatten_into(node: &HostData, out: &mut Vec<f32>) {
    match node {
        HostData::Scalar(v) => out.push(*v),
        HostData::List(items) => items.iter().for_each(|item| flatten_into(item, out)),
    }
}

fn build(data: &[f32], dims: &[usize]) -> HostData {
    match dims.split_first() {
        None => HostData::Scalar(data[0]),
        Some((&len, rest)) => {
            let chunk = crate::shape::dims_elem_count(rest);
            HostData::List(
                (0..len)
                    .map(|i| build(&data[i * chunk..(i + 1) * chunk], rest))
                    .collect(),
            )
        }
    }
}

// Conversions from plain Rust containers

impl From<f32> for HostData {
    fn from(v: f32) -> Self {
        HostData::Scalar(v)
    }
}

impl<T: Into<HostData>> From<Vec<T>> for HostData {
    fn from(v: Vec<T>) -> Self {
        HostData::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostData>, const N: usize> From<[T; N]> for HostData {
    fn from(a: [T; N]) -> Self {
        HostData::List(a.into_iter().map(Into::into).collect())
    }
}

impl From<&[f32]> for HostData {
    fn from(s: &[f32]) -> Self {
        HostData::List(s.iter().copied().map(HostData::Scalar).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_shape_nested() {
        let data = HostData::from(vec![vec![1.0f32, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(data.infer_shape().unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn test_scalar_has_empty_shape() {
        let data = HostData::from(7.0f32);
        assert_eq!(data.infer_shape().unwrap().dims(), &[] as &[usize]);
        let (flat, _) = data.flatten_data().unwrap();
        assert_eq!(flat, vec![7.0]);
    }

    #[test]
    fn test_jagged_lengths_rejected() {
        let data = HostData::from(vec![vec![1.0f32, 2.0], vec![3.0]]);
        let err = data.infer_shape().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Shape);
    }

    #[test]
    fn test_mixed_depth_rejected() {
        let data = HostData::List(vec![
            HostData::Scalar(1.0),
            HostData::List(vec![HostData::Scalar(2.0)]),
        ]);
        assert!(data.infer_shape().is_err());
    }

    #[test]
    fn test_deep_jagged_rejected() {
        let data = HostData::from(vec![
            vec![vec![1.0f32, 2.0], vec![3.0, 4.0]],
            vec![vec![5.0, 6.0], vec![7.0]],
        ]);
        assert!(data.infer_shape().is_err());
    }

    #[test]
    fn test_empty_list() {
        let data = HostData::List(vec![HostData::List(vec![]), HostData::List(vec![])]);
        assert_eq!(data.infer_shape().unwrap().dims(), &[2, 0]);
    }

    #[test]
    fn test_reshape_data_inverts_flatten() {
        let data = HostData::from([[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let (flat, shape) = data.flatten_data().unwrap();
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(HostData::reshape_data(&flat, &shape).unwrap(), data);
        assert!(HostData::reshape_data(&flat, &Shape::from(4)).is_err());
    }
}
