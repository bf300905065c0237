// Text rendering of tensors
//
//   tensor([[1.0000, 2.0000],
//           [3.0000, 4.0000]], shape=[2, 2], requires_grad=false)
//
// Tensors with more than `threshold` elements are summarized: along every
// dimension longer than 2 * edge_items only the first and last edge_items
// entries are printed, with `...` between them. Output depends only on the
// values, shape and flags, so equal tensors always render identically.

use std::fmt;

use crate::backend::Backend;
use crate::error::Result;
use crate::tensor::Tensor;

const PREFIX: &str = "tensor(";

/// Controls how tensors are rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReprOptions {
    /// Summarize tensors with more elements than this.
    pub threshold: usize,
    /// Entries kept at each end of a summarized dimension.
    pub edge_items: usize,
    /// Digits after the decimal point.
    pub precision: usize,
}

impl Default for ReprOptions {
    fn default() -> Self {
        ReprOptions {
            threshold: 1000,
            edge_items: 3,
            precision: 4,
        }
    }
}

fn format_block(data: &[f32], dims: &[usize], opts: &ReprOptions, summarize: bool, indent: usize) -> String {
    let Some((&len, rest)) = dims.split_first() else {
        return format!("{:.*}", opts.precision, data[0]);
    };
    let chunk = crate::shape::dims_elem_count(rest);
    let edge = opts.edge_items;
    let positions: Vec<Option<usize>> = if summarize && len > 2 * edge {
        (0..edge)
            .map(Some)
            .chain(std::iter::once(None))
            .chain((len - edge..len).map(Some))
            .collect()
    } else {
        (0..len).map(Some).collect()
    };
    let separator = if rest.is_empty() {
        ", ".to_string()
    } else {
        format!(",{}{}", "\n".repeat(rest.len()), " ".repeat(indent + 1))
    };
    let items: Vec<String> = positions
        .iter()
        .map(|p| match p {
            Some(i) => format_block(&data[i * chunk..(i + 1) * chunk], rest, opts, summarize, indent + 1),
            None => "...".to_string(),
        })
        .collect();
    format!("[{}]", items.join(&separator))
}

impl<B: Backend> Tensor<B> {
    /// Render with the default options.
    pub fn repr(&self) -> Result<String> {
        self.repr_with(&ReprOptions::default())
    }

    pub fn repr_with(&self, opts: &ReprOptions) -> Result<String> {
        let data = self.to_vec()?;
        let summarize = data.len() > opts.threshold;
        let body = format_block(&data, self.dims(), opts, summarize, PREFIX.len());
        Ok(format!(
            "{PREFIX}{body}, shape={}, requires_grad={})",
            self.shape(),
            self.requires_grad()
        ))
    }
}

impl<B: Backend> fmt::Display for Tensor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            Ok(s) => f.write_str(&s),
            Err(e) => write!(f, "{PREFIX}<unreadable: {e}>, shape={})", self.shape()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CpuBackend, CpuDevice};

    type T = Tensor<CpuBackend>;

    #[test]
    fn test_matrix() {
        let t = T::from_host([[1.0f32, 2.0], [3.0, 4.0]], false, &CpuDevice).unwrap();
        assert_eq!(
            t.repr().unwrap(),
            "tensor([[1.0000, 2.0000],\n        [3.0000, 4.0000]], shape=[2, 2], requires_grad=false)"
        );
    }

    #[test]
    fn test_scalar_and_empty() {
        let s = T::scalar(2.5, true, &CpuDevice).unwrap();
        assert_eq!(s.to_string(), "tensor(2.5000, shape=[], requires_grad=true)");
        let e = T::zeros(0, false, &CpuDevice).unwrap();
        assert_eq!(e.to_string(), "tensor([], shape=[0], requires_grad=false)");
    }

    #[test]
    fn test_summarized() {
        let t = T::arange(0.0, 10.0, 1.0, false, &CpuDevice).unwrap();
        let opts = ReprOptions {
            threshold: 5,
            edge_items: 2,
            precision: 1,
        };
        assert_eq!(
            t.repr_with(&opts).unwrap(),
            "tensor([0.0, 1.0, ..., 8.0, 9.0], shape=[10], requires_grad=false)"
        );
    }

    #[test]
    fn test_deterministic() {
        let a = T::ones((3, 2, 2), false, &CpuDevice).unwrap();
        let b = T::ones((3, 2, 2), false, &CpuDevice).unwrap();
        assert_eq!(a.repr().unwrap(), b.repr().unwrap());
        assert!(a.repr().unwrap().contains("]],\n\n        [["));
    }
}
