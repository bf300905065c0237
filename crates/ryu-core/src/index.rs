// Indexing — resolving `t[i, a:b:s, :]`-style selections into gather maps
//
// Each TensorIndex addresses one dimension, left to right; dimensions past
// the last index are taken whole. An integer picks one position and removes
// the dimension; a slice keeps it. The result is the shape of the selection
// plus, for every selected element in row-major order, its flat position in
// the source buffer. get_item gathers through that map and its gradient
// scatters back through it; set_item scatters into it.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use crate::error::{Error, Result};
use crate::shape::{strided_indices, Shape};

/// One component of a multi-dimensional index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorIndex {
    /// A single position; negative values count from the end.
    Index(isize),
    /// `start:stop:step` with Python-style negative bounds. `step` must be
    /// positive.
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
    },
    /// `:`
    Full,
}

impl TensorIndex {
    pub fn slice(start: Option<isize>, stop: Option<isize>, step: isize) -> Self {
        TensorIndex::Slice { start, stop, step }
    }
}

impl From<isize> for TensorIndex {
    fn from(i: isize) -> Self {
        TensorIndex::Index(i)
    }
}

impl From<Range<isize>> for TensorIndex {
    fn from(r: Range<isize>) -> Self {
        TensorIndex::slice(Some(r.start), Some(r.end), 1)
    }
}

impl From<RangeFrom<isize>> for TensorIndex {
    fn from(r: RangeFrom<isize>) -> Self {
        TensorIndex::slice(Some(r.start), None, 1)
    }
}

impl From<RangeTo<isize>> for TensorIndex {
    fn from(r: RangeTo<isize>) -> Self {
        TensorIndex::slice(None, Some(r.end), 1)
    }
}

impl From<RangeFull> for TensorIndex {
    fn from(_: RangeFull) -> Self {
        TensorIndex::Full
    }
}

/// A resolved selection: the shape of the selected region and the source
/// offset of each of its elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selection {
    pub shape: Shape,
    pub map: Vec<usize>,
}

/// Normalize one slice bound into `0..=size`.
fn slice_bound(bound: isize, size: usize) -> Option<usize> {
    let size = size as isize;
    if bound < -size || bound > size {
        return None;
    }
    let pos = if bound < 0 { bound + size } else { bound };
    Some(pos as usize)
}

pub(crate) fn resolve(shape: &Shape, indices: &[TensorIndex]) -> Result<Selection> {
    let rank = shape.rank();
    if indices.len() > rank {
        return Err(Error::TooManyIndices {
            got: indices.len(),
            rank,
        });
    }
    let strides = shape.stride_contiguous();
    let mut offset = 0usize;
    let mut dims = Vec::with_capacity(rank);
    let mut sel_strides = Vec::with_capacity(rank);

    for (d, &size) in shape.dims().iter().enumerate() {
        let index = indices.get(d).copied().unwrap_or(TensorIndex::Full);
        match index {
            TensorIndex::Index(i) => {
                let pos = if i < 0 { i + size as isize } else { i };
                if pos < 0 || pos >= size as isize {
                    return Err(Error::IndexOutOfRange {
                        index: i,
                        dim: d,
                        size,
                    });
                }
                offset += pos as usize * strides[d];
            }
            TensorIndex::Full => {
                dims.push(size);
                sel_strides.push(strides[d]);
            }
            TensorIndex::Slice { start, stop, step } => {
                let invalid = || Error::InvalidSlice {
                    start,
                    stop,
                    step,
                    dim: d,
                    size,
                };
                if step <= 0 {
                    return Err(invalid());
                }
                let lo = match start {
                    Some(s) => slice_bound(s, size).ok_or_else(invalid)?,
                    None => 0,
                };
                let hi = match stop {
                    Some(s) => slice_bound(s, size).ok_or_else(invalid)?,
                    None => size,
                };
                let step = step as usize;
                let count = if hi > lo { (hi - lo + step - 1) / step } else { 0 };
                if count > 0 {
                    offset += lo * strides[d];
                }
                dims.push(count);
                sel_strides.push(step * strides[d]);
            }
        }
    }

    let map = strided_indices(&dims, &sel_strides, offset);
    Ok(Selection {
        shape: Shape::new(dims),
        map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_integer_drops_dim() {
        let sel = resolve(&Shape::from((2, 3)), &[TensorIndex::Index(1)]).unwrap();
        assert_eq!(sel.shape.dims(), &[3]);
        assert_eq!(sel.map, vec![3, 4, 5]);
    }

    #[test]
    fn test_negative_index() {
        let sel = resolve(&Shape::from((2, 3)), &[TensorIndex::Full, TensorIndex::Index(-1)]).unwrap();
        assert_eq!(sel.shape.dims(), &[2]);
        assert_eq!(sel.map, vec![2, 5]);
    }

    #[test]
    fn test_stepped_slice() {
        let sel = resolve(&Shape::from(7), &[TensorIndex::slice(Some(1), None, 2)]).unwrap();
        assert_eq!(sel.map, vec![1, 3, 5]);
        let sel = resolve(&Shape::from(5), &[TensorIndex::from(-2isize..5)]).unwrap();
        assert_eq!(sel.map, vec![3, 4]);
    }

    #[test]
    fn test_empty_slice() {
        let sel = resolve(&Shape::from((4, 2)), &[TensorIndex::from(3isize..1)]).unwrap();
        assert_eq!(sel.shape.dims(), &[0, 2]);
        assert!(sel.map.is_empty());
    }

    #[test]
    fn test_errors() {
        let shape = Shape::from((2, 3));
        let err = resolve(&shape, &[TensorIndex::Index(2)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        let err = resolve(&shape, &[TensorIndex::Full, TensorIndex::Index(-4)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        let err = resolve(&shape, &[TensorIndex::slice(None, None, 0)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        let err = resolve(&shape, &[TensorIndex::from(0isize..4)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        let err = resolve(&shape, &[TensorIndex::Full; 3]).unwrap_err();
        assert!(matches!(err, Error::TooManyIndices { got: 3, rank: 2 }));
    }
}
