use crate::shape::Shape;

/// Coarse classification of an [`Error`], used by binding layers to pick the
/// host environment's native exception type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Shape,
    Gradient,
    Index,
    Allocation,
    InvalidArgument,
    Backend,
}

/// All errors that can occur within ryu.
///
/// Every failure is detected synchronously at the offending call. Nothing is
/// retried, and an operator that fails never hands back a partial tensor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Nested host data whose siblings disagree in length or nesting depth.
    #[error("jagged host data: expected {expected} at depth {depth}, got {got}")]
    JaggedData {
        depth: usize,
        expected: String,
        got: String,
    },

    /// Two shapes that cannot be broadcast together.
    #[error("shapes {lhs} and {rhs} are not broadcast-compatible")]
    BroadcastMismatch { lhs: Shape, rhs: Shape },

    /// A source shape that cannot be broadcast into a fixed target shape.
    #[error("cannot broadcast {src} to {dst}")]
    BroadcastTo { src: Shape, dst: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Dimension index out of range for the tensor's rank.
    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// A permutation that is not a rearrangement of `0..rank`.
    #[error("invalid permutation {perm:?} for tensor with {rank} dimensions")]
    InvalidPermutation { perm: Vec<usize>, rank: usize },

    /// Element count mismatch when creating from a flat buffer.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Matrix multiplication dimension mismatch.
    #[error("matmul shape mismatch: [{m}x{k1}] @ [{k2}x{n}], inner dims must match")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error(
        "cannot reshape: source has {src} elements, target shape {dst_shape} has {dst} elements"
    )]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// Tried to read a scalar from a tensor with more than one element.
    #[error("not a scalar: tensor has shape {shape}")]
    NotAScalar { shape: Shape },

    /// backward() on a tensor that does not require grad.
    #[error("tensor does not require grad and has no graph node")]
    RequiresGradDisabled,

    /// backward() without an explicit gradient on a non-scalar tensor.
    #[error("implicit gradient can only be created for scalar outputs, got shape {shape}")]
    ImplicitGradNonScalar { shape: Shape },

    /// An explicit gradient (or assigned grad) whose shape differs from its owner.
    #[error("gradient shape {got} does not match tensor shape {expected}")]
    GradShapeMismatch { expected: Shape, got: Shape },

    /// requires_grad can only be toggled on leaf tensors.
    #[error("requires_grad can only be changed on leaf tensors")]
    NonLeafRequiresGrad,

    /// A value saved for backward was overwritten by an in-place write.
    #[error(
        "tensor {id} saved for backward was modified in place (saved at version {saved}, now {current})"
    )]
    SavedTensorModified { id: u64, saved: u64, current: u64 },

    /// Integer index outside `[-len, len)`.
    #[error("index {index} is out of range for dim {dim} with size {size}")]
    IndexOutOfRange { index: isize, dim: usize, size: usize },

    /// Slice bounds outside `[-len, len]` or a non-positive step.
    #[error("invalid slice {start:?}:{stop:?}:{step} for dim {dim} with size {size}")]
    InvalidSlice {
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
        dim: usize,
        size: usize,
    },

    /// More indices than the tensor has dimensions.
    #[error("too many indices: {got} given for tensor with {rank} dimensions")]
    TooManyIndices { got: usize, rank: usize },

    /// Device buffer allocation failed.
    #[error("failed to allocate {elems} f32 elements on {device}: {reason}")]
    Allocation {
        elems: usize,
        device: String,
        reason: String,
    },

    /// Factory or operator argument outside its valid domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Generic message for backend failures not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    pub fn invalid_argument(s: impl Into<String>) -> Self {
        Error::InvalidArgument(s.into())
    }

    /// Allocation failure for a shape whose element count exceeds
    /// [`MAX_ELEMS`](crate::shape::MAX_ELEMS).
    pub fn too_large(shape: &Shape, device: impl Into<String>) -> Self {
        Error::Allocation {
            elems: shape.elem_count(),
            device: device.into(),
            reason: format!(
                "shape {shape} exceeds the limit of {} elements",
                crate::shape::MAX_ELEMS
            ),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::JaggedData { .. }
            | Error::BroadcastMismatch { .. }
            | Error::BroadcastTo { .. }
            | Error::RankMismatch { .. }
            | Error::DimOutOfRange { .. }
            | Error::InvalidPermutation { .. }
            | Error::ElementCountMismatch { .. }
            | Error::MatmulShapeMismatch { .. }
            | Error::ReshapeElementMismatch { .. }
            | Error::NotAScalar { .. } => ErrorKind::Shape,
            Error::RequiresGradDisabled
            | Error::ImplicitGradNonScalar { .. }
            | Error::GradShapeMismatch { .. }
            | Error::NonLeafRequiresGrad
            | Error::SavedTensorModified { .. } => ErrorKind::Gradient,
            Error::IndexOutOfRange { .. }
            | Error::InvalidSlice { .. }
            | Error::TooManyIndices { .. } => ErrorKind::Index,
            Error::Allocation { .. } => ErrorKind::Allocation,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Msg(_) => ErrorKind::Backend,
        }
    }
}

/// Convenience Result type used throughout ryu.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted backend error.
/// Usage: `bail!("kernel {} not loaded", name)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_buckets() {
        let e = Error::BroadcastMismatch {
            lhs: Shape::from(3),
            rhs: Shape::from(4),
        };
        assert_eq!(e.kind(), ErrorKind::Shape);
        assert_eq!(Error::RequiresGradDisabled.kind(), ErrorKind::Gradient);
        let e = Error::IndexOutOfRange {
            index: 5,
            dim: 0,
            size: 2,
        };
        assert_eq!(e.kind(), ErrorKind::Index);
        assert_eq!(Error::msg("boom").kind(), ErrorKind::Backend);
    }

    #[test]
    fn test_bail_is_backend_error() {
        fn check(n: usize) -> Result<usize> {
            if n > 2 {
                bail!("{} is more than {}", n, 2);
            }
            Ok(n)
        }
        assert_eq!(check(1).unwrap(), 1);
        let e = check(3).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Backend);
        assert_eq!(e.to_string(), "3 is more than 2");
    }

    #[test]
    fn test_too_large() {
        let e = Error::too_large(&Shape::from((1 << 40, 1 << 40)), "cpu");
        assert_eq!(e.kind(), ErrorKind::Allocation);
        assert!(matches!(e, Error::Allocation { elems: usize::MAX, .. }));
    }

    #[test]
    fn test_display() {
        let e = Error::MatmulShapeMismatch {
            m: 2,
            k1: 3,
            k2: 4,
            n: 5,
        };
        assert_eq!(
            e.to_string(),
            "matmul shape mismatch: [2x3] @ [4x5], inner dims must match"
        );
    }
}
