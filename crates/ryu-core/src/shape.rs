use std::fmt;

use crate::error::{Error, Result};

// Shape — N-dimensional shape and the index arithmetic built on it
//
// A Shape describes the size of each dimension of a tensor:
//   - Scalar: Shape([])          — 0 dimensions, 1 element
//   - Vector: Shape([5])         — 1 dimension, 5 elements
//   - Matrix: Shape([3, 4])      — 2 dimensions, 12 elements
//   - Empty:  Shape([2, 0])      — 2 dimensions, 0 elements
//
// Every tensor buffer is contiguous and row-major. Broadcasting, transposes
// and slices are therefore never views: they are expressed as an index map
// (output position -> source position) that the kernel layer applies with a
// single gather, producing a fresh buffer.
//
// Element counts are bounded by MAX_ELEMS, the largest f32 buffer an
// allocation can describe. `elem_count` saturates instead of wrapping, and
// every place that turns a caller-supplied shape into a buffer goes through
// `checked_elem_count` first.

/// Largest number of f32 elements a single buffer may hold.
pub const MAX_ELEMS: usize = isize::MAX as usize / std::mem::size_of::<f32>();

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element; any zero-sized dimension gives 0.
    /// Saturates at `usize::MAX` for shapes no buffer could hold.
    pub fn elem_count(&self) -> usize {
        dims_elem_count(&self.0)
    }

    /// The element count, or None if it exceeds [`MAX_ELEMS`].
    pub fn checked_elem_count(&self) -> Option<usize> {
        Some(self.elem_count()).filter(|&n| n <= MAX_ELEMS)
    }

    /// Contiguous (row-major) strides. For [2, 3, 4] this is [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1].saturating_mul(self.0[i + 1]);
            }
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.0.get(d).copied().ok_or(Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }

    // Broadcasting

    /// Joint broadcast shape of two operands (numpy rules).
    ///
    ///   [3, 4] and [4]       → [3, 4]
    ///   [2, 1] and [1, 3]    → [2, 3]
    ///   [3] and [4]          → Error
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
        let l = lhs.dims();
        let r = rhs.dims();
        let max_rank = l.len().max(r.len());
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            let ld = if i < l.len() { l[l.len() - 1 - i] } else { 1 };
            let rd = if i < r.len() { r[r.len() - 1 - i] } else { 1 };

            if ld == rd || rd == 1 {
                result.push(ld);
            } else if ld == 1 {
                result.push(rd);
            } else {
                return Err(Error::BroadcastMismatch {
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// True iff `self` can be expanded to exactly `target`: walking from the
    /// trailing dimension leftward, each source size equals the target size or
    /// is 1, and the source has no more dimensions than the target.
    pub fn is_broadcastable_to(&self, target: &Shape) -> bool {
        let src = self.dims();
        let dst = target.dims();
        if src.len() > dst.len() {
            return false;
        }
        src.iter()
            .rev()
            .zip(dst.iter().rev())
            .all(|(&s, &d)| s == d || s == 1)
    }

    /// Strides that read `self` as if it had shape `target`. Broadcast
    /// dimensions (size 1 or missing) get stride 0.
    ///
    /// Callers must have checked `is_broadcastable_to` first.
    pub fn broadcast_strides(&self, target: &Shape) -> Vec<usize> {
        let self_dims = self.dims();
        let target_dims = target.dims();
        let self_strides = self.stride_contiguous();

        let mut result = vec![0usize; target_dims.len()];
        let offset = target_dims.len() - self_dims.len();

        for i in 0..self_dims.len() {
            if self_dims[i] == target_dims[i + offset] {
                result[i + offset] = self_strides[i];
            }
        }
        result
    }

    /// Source index for every element of `target` when broadcasting `self`.
    pub fn broadcast_index_map(&self, target: &Shape) -> Result<Vec<usize>> {
        if !self.is_broadcastable_to(target) {
            return Err(Error::BroadcastTo {
                src: self.clone(),
                dst: target.clone(),
            });
        }
        let strides = self.broadcast_strides(target);
        Ok(strided_indices(target.dims(), &strides, 0))
    }

    /// Dimensions of `target` that were created by broadcasting `self` up to it,
    /// indexed in `target`'s coordinates. Summing over them undoes the
    /// broadcast.
    pub fn broadcast_reduced_dims(&self, target: &Shape) -> Vec<usize> {
        let src = self.dims();
        let dst = target.dims();
        let offset = dst.len().saturating_sub(src.len());
        (0..dst.len())
            .filter(|&d| d < offset || (src[d - offset] == 1 && dst[d] != 1))
            .collect()
    }

    // Permutations

    /// Validate `perm` as a permutation of `0..rank`.
    pub fn check_permutation(&self, perm: &[usize]) -> Result<()> {
        let rank = self.rank();
        let mut seen = vec![false; rank];
        let valid = perm.len() == rank
            && perm.iter().all(|&p| {
                if p >= rank || seen[p] {
                    return false;
                }
                seen[p] = true;
                true
            });
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidPermutation {
                perm: perm.to_vec(),
                rank,
            })
        }
    }

    /// Shape after permuting, plus the gather map that re-lays a contiguous
    /// buffer of `self` into the permuted order.
    pub fn permute_index_map(&self, perm: &[usize]) -> Result<(Shape, Vec<usize>)> {
        self.check_permutation(perm)?;
        let strides = self.stride_contiguous();
        let new_dims: Vec<usize> = perm.iter().map(|&p| self.0[p]).collect();
        let new_strides: Vec<usize> = perm.iter().map(|&p| strides[p]).collect();
        let map = strided_indices(&new_dims, &new_strides, 0);
        Ok((Shape::new(new_dims), map))
    }

    // Reductions

    /// Split the shape around `dim` as (outer, len, inner) so a reduction over
    /// `dim` can run on a flat buffer.
    pub fn reduce_geometry(&self, dim: usize) -> Result<(usize, usize, usize)> {
        let len = self.dim(dim)?;
        let outer = dims_elem_count(&self.0[..dim]);
        let inner = dims_elem_count(&self.0[dim + 1..]);
        Ok((outer, len, inner))
    }

    /// Shape after reducing over `dim`.
    pub fn reduced(&self, dim: usize, keep_dim: bool) -> Shape {
        let mut dims = self.0.clone();
        if keep_dim {
            dims[dim] = 1;
        } else {
            dims.remove(dim);
        }
        Shape(dims)
    }
}

/// Saturating product of `dims`. Exact whenever it is at most `usize::MAX`,
/// and 0 whenever any dimension is 0.
pub(crate) fn dims_elem_count(dims: &[usize]) -> usize {
    if dims.contains(&0) {
        return 0;
    }
    dims.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
}

/// Walk every position of a `dims`-shaped grid in row-major order and return
/// the flat source offset `offset + Σ index[d] * strides[d]` for each.
pub(crate) fn strided_indices(dims: &[usize], strides: &[usize], offset: usize) -> Vec<usize> {
    let n = dims_elem_count(dims);
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return out;
    }
    let rank = dims.len();
    let mut counter = vec![0usize; rank];
    let mut cur = offset;
    for _ in 0..n {
        out.push(cur);
        let mut d = rank;
        while d > 0 {
            d -= 1;
            counter[d] += 1;
            cur += strides[d];
            if counter[d] < dims[d] {
                break;
            }
            cur -= strides[d] * dims[d];
            counter[d] = 0;
        }
    }
    out
}

/// Inverse of a permutation: `inv[perm[i]] = i`.
pub(crate) fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0usize; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// These let you write: Shape::from((3, 4)) instead of Shape::new(vec![3, 4])

impl From<()> for Shape {
    /// Scalar shape (0 dimensions).
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize,)> for Shape {
    fn from((d0,): (usize,)) -> Self {
        Shape(vec![d0])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(a: [usize; N]) -> Self {
        Shape(a.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::from(());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.elem_count(), 1);
        assert_eq!(s.stride_contiguous(), Vec::<usize>::new());
    }

    #[test]
    fn test_zero_sized() {
        assert_eq!(Shape::from((2, 0)).elem_count(), 0);
        assert_eq!(Shape::from(0).elem_count(), 0);
    }

    #[test]
    fn test_huge_shapes_saturate() {
        let huge = Shape::from((1 << 40, 1 << 40));
        assert_eq!(huge.elem_count(), usize::MAX);
        assert_eq!(huge.checked_elem_count(), None);
        assert_eq!(huge.stride_contiguous(), vec![1 << 40, 1]);

        // A zero anywhere wins, even after the running product overflowed.
        let empty = Shape::from((1 << 40, 1 << 40, 0));
        assert_eq!(empty.elem_count(), 0);
        assert_eq!(empty.checked_elem_count(), Some(0));
        assert_eq!(empty.reduce_geometry(0).unwrap(), (1, 1 << 40, 0));

        assert_eq!(Shape::from(MAX_ELEMS).checked_elem_count(), Some(MAX_ELEMS));
        assert_eq!(Shape::from(MAX_ELEMS + 1).checked_elem_count(), None);
    }

    #[test]
    fn test_3d_strides() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.stride_contiguous(), vec![12, 4, 1]);
        assert_eq!(s.elem_count(), 24);
    }

    #[test]
    fn test_broadcast_shape() {
        let s = Shape::broadcast_shape(&Shape::from((5, 3, 1)), &Shape::from((3, 4))).unwrap();
        assert_eq!(s.dims(), &[5, 3, 4]);
        assert!(Shape::broadcast_shape(&Shape::from(3), &Shape::from(4)).is_err());
    }

    #[test]
    fn test_is_broadcastable_to() {
        let target = Shape::from((3, 4));
        assert!(Shape::from((3, 1)).is_broadcastable_to(&target));
        assert!(Shape::from(4).is_broadcastable_to(&target));
        assert!(Shape::from(()).is_broadcastable_to(&target));
        assert!(!Shape::from(3).is_broadcastable_to(&target));
        // A larger rank never fits into a smaller one.
        assert!(!Shape::from((1, 3, 4)).is_broadcastable_to(&target));
        // Broadcasting is directional: [3, 4] does not fit into [3, 1].
        assert!(!target.is_broadcastable_to(&Shape::from((3, 1))));
    }

    #[test]
    fn test_broadcast_index_map() {
        // [3, 1] → [3, 2]: each row repeats its single source element.
        let map = Shape::from((3, 1))
            .broadcast_index_map(&Shape::from((3, 2)))
            .unwrap();
        assert_eq!(map, vec![0, 0, 1, 1, 2, 2]);

        // [2] → [2, 2]: the vector repeats per row.
        let map = Shape::from(2).broadcast_index_map(&Shape::from((2, 2))).unwrap();
        assert_eq!(map, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_broadcast_reduced_dims() {
        let dims = Shape::from((3, 1)).broadcast_reduced_dims(&Shape::from((2, 3, 4)));
        assert_eq!(dims, vec![0, 2]);
        let dims = Shape::from((3, 4)).broadcast_reduced_dims(&Shape::from((3, 4)));
        assert!(dims.is_empty());
    }

    #[test]
    fn test_permute_index_map() {
        // [[0, 1, 2], [3, 4, 5]] transposed → [[0, 3], [1, 4], [2, 5]]
        let (shape, map) = Shape::from((2, 3)).permute_index_map(&[1, 0]).unwrap();
        assert_eq!(shape.dims(), &[3, 2]);
        assert_eq!(map, vec![0, 3, 1, 4, 2, 5]);
        assert!(Shape::from((2, 3)).permute_index_map(&[0, 0]).is_err());
        assert!(Shape::from((2, 3)).permute_index_map(&[0]).is_err());
    }

    #[test]
    fn test_inverse_permutation() {
        assert_eq!(inverse_permutation(&[2, 0, 1]), vec![1, 2, 0]);
    }

    #[test]
    fn test_reduce_geometry() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.reduce_geometry(1).unwrap(), (2, 3, 4));
        assert_eq!(s.reduced(1, true).dims(), &[2, 1, 4]);
        assert_eq!(s.reduced(1, false).dims(), &[2, 4]);
        assert!(s.reduce_geometry(3).is_err());
    }

    #[test]
    fn test_display() {
        let s = Shape::from((3, 4));
        assert_eq!(format!("{}", s), "[3, 4]");
    }
}
