// Backpropagation — reverse-mode automatic differentiation
//
// backward() walks the graph recorded in each tensor's Op from a starting
// tensor back to the leaves:
//
//   1. Topologically sort everything reachable through `prev` edges whose
//      tensors require grad (DFS post-order, each node once). Operands that
//      do not require grad are not descended into.
//
//   2. Seed the start with the caller's gradient, or with 1 for a scalar.
//
//   3. Walk in reverse topological order. For each node, apply its local
//      rule to the upstream gradient and accumulate the result per operand
//      in a GradStore. Operands that were broadcast get their contribution
//      summed back to their own shape first.
//
//   4. Commit: add every accumulated gradient into the owning tensor's
//      `grad` field. This happens only after step 3 finished for the whole
//      graph, so a failing pass leaves every `grad` as it was.
//
// All gradient math runs with recording disabled, so backward never grows
// the graph it is walking.
//
// GRADIENT RULES (up = upstream gradient):
//
//   add     a: up              b: up
//   sub     a: up              b: -up
//   mul     a: up * b          b: up * a
//   div     a: up / b          b: -up * a / b²
//   rem     a: up              b: -up * trunc(a / b)
//   pow     a: up * b * a^(b-1)   b: up * a^b * ln(a)
//   matmul  a: up @ bᵀ         b: aᵀ @ up
//   neg     -up      abs  up * sign(x)    exp  up * exp(x)
//   log     up / x   sqrt up / (2 * sqrt(x))
//   sum           broadcast up back to the input shape
//   broadcast_to  sum up over the broadcast dims
//   reshape       reshape up to the input shape
//   permute       apply the inverse permutation
//   index         scatter up into zeros of the input shape
//
// Comparisons, bitwise operators, shifts and invert are piecewise constant:
// their nodes link the graph but contribute nothing.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use crate::backend::{Backend, BinaryOp, UnaryOp};
use crate::dispatch;
use crate::error::{Error, Result};
use crate::op::{Op, SavedTensor, TensorId};
use crate::shape::Shape;
use crate::tensor::Tensor;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether operators on this thread currently record graph nodes.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|g| g.get())
}

/// Restores the previous grad mode when dropped, so an early return or a
/// panic inside `no_grad` cannot leave recording switched off.
struct GradModeGuard {
    prev: bool,
}

impl GradModeGuard {
    fn set(enabled: bool) -> Self {
        let prev = GRAD_ENABLED.with(|g| g.replace(enabled));
        GradModeGuard { prev }
    }
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|g| g.set(self.prev));
    }
}

/// Run `f` with graph recording disabled on the current thread.
///
/// Tensors produced inside have no graph node and do not require grad.
pub fn no_grad<T>(f: impl FnOnce() -> T) -> T {
    let _guard = GradModeGuard::set(false);
    f()
}

/// Gradients accumulated during one backward pass, keyed by tensor.
pub(crate) struct GradStore<B: Backend> {
    grads: HashMap<TensorId, Tensor<B>>,
}

impl<B: Backend> GradStore<B> {
    fn new() -> Self {
        GradStore {
            grads: HashMap::new(),
        }
    }

    fn get(&self, tensor: &Tensor<B>) -> Option<&Tensor<B>> {
        self.grads.get(&tensor.id())
    }

    /// Add `grad` to whatever has been accumulated for `tensor` so far.
    fn accumulate(&mut self, tensor: &Tensor<B>, grad: Tensor<B>) -> Result<()> {
        let id = tensor.id();
        let total = match self.grads.get(&id) {
            Some(existing) => existing.add(&grad)?,
            None => grad,
        };
        self.grads.insert(id, total);
        Ok(())
    }

    /// Accumulate into `target` after summing away any broadcast dims.
    fn contribute(&mut self, target: &Tensor<B>, grad: Tensor<B>) -> Result<()> {
        let grad = sum_to_shape(&grad, target.shape())?;
        self.accumulate(target, grad)
    }
}

/// Reduce a gradient computed at a broadcast output shape back to the shape
/// of the operand that was broadcast.
///
///   [3, 4] → [3, 1]   sum over dim 1, keep it
///   [2, 3] → [3]      sum over dim 0, then drop it
fn sum_to_shape<B: Backend>(grad: &Tensor<B>, target: &Shape) -> Result<Tensor<B>> {
    if grad.shape() == target {
        return Ok(grad.clone());
    }
    let mut result = grad.clone();
    for d in target.broadcast_reduced_dims(grad.shape()) {
        result = result.sum(Some(d), true)?;
    }
    result.reshape(target)
}

/// Topological ordering of everything reachable from `root` through tensors
/// that require grad. Inputs come before the tensors computed from them.
fn build_topo<B: Backend>(root: &Tensor<B>) -> Vec<Tensor<B>> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();

    fn visit<B: Backend>(t: &Tensor<B>, visited: &mut HashSet<TensorId>, order: &mut Vec<Tensor<B>>) {
        if !visited.insert(t.id()) {
            return;
        }
        for input in t.op().inputs() {
            if input.requires_grad() {
                visit(input, visited, order);
            }
        }
        order.push(t.clone());
    }

    visit(root, &mut visited, &mut order);
    order
}

/// A copy of `t`'s values with no graph history.
fn detached<B: Backend>(t: &Tensor<B>) -> Result<Tensor<B>> {
    let storage = dispatch::duplicate(t)?;
    Ok(Tensor::leaf(storage, t.shape().clone(), t.device(), false))
}

/// Backpropagate from `root`. See [`Tensor::backward`].
pub fn backward<B: Backend>(root: &Tensor<B>, gradient: Option<&Tensor<B>>) -> Result<()> {
    if !root.requires_grad() {
        return Err(Error::RequiresGradDisabled);
    }
    let _guard = GradModeGuard::set(false);

    let seed = match gradient {
        Some(g) => {
            if g.shape() != root.shape() {
                return Err(Error::GradShapeMismatch {
                    expected: root.shape().clone(),
                    got: g.shape().clone(),
                });
            }
            detached(g)?
        }
        None => {
            if root.elem_count() != 1 {
                return Err(Error::ImplicitGradNonScalar {
                    shape: root.shape().clone(),
                });
            }
            root.ones_like()?
        }
    };

    let topo = build_topo(root);
    tracing::debug!(root = %root.id(), nodes = topo.len(), "backward");

    let mut grads = GradStore::new();
    grads.accumulate(root, seed)?;
    for tensor in topo.iter().rev() {
        let up = match grads.get(tensor) {
            Some(g) => g.clone(),
            None => continue,
        };
        apply_rule(tensor.op(), &up, &mut grads)?;
    }

    // Fold this pass into the existing grads before touching any of them.
    let mut updates = Vec::with_capacity(topo.len());
    for tensor in &topo {
        if let Some(g) = grads.get(tensor) {
            let total = match tensor.grad() {
                Some(existing) => detached(&existing.add(g)?)?,
                None => detached(g)?,
            };
            updates.push((tensor, total));
        }
    }
    let written = updates.len();
    for (tensor, total) in updates {
        tensor.replace_grad(Some(total))?;
    }
    tracing::debug!(root = %root.id(), written, "backward complete");
    Ok(())
}

fn apply_rule<B: Backend>(op: &Op<B>, up: &Tensor<B>, grads: &mut GradStore<B>) -> Result<()> {
    match op {
        Op::None | Op::Shift { .. } => {}

        Op::Binary { lhs, rhs, op } => binary_rule(*op, lhs, rhs, up, grads)?,

        Op::Unary { input, op } => unary_rule(*op, input, up, grads)?,

        Op::Matmul { lhs, rhs } => {
            if lhs.tensor().requires_grad() {
                let b = rhs.value()?;
                grads.contribute(lhs.tensor(), up.matmul(&b.transpose()?)?)?;
            }
            if rhs.tensor().requires_grad() {
                let a = lhs.value()?;
                grads.contribute(rhs.tensor(), a.transpose()?.matmul(up)?)?;
            }
        }

        Op::Sum {
            input,
            dim,
            keep_dim,
        } => {
            let up = match (dim, keep_dim) {
                (Some(d), false) => up.reshape(input.shape().reduced(*d, true))?,
                _ => up.clone(),
            };
            grads.contribute(input, up.broadcast_to(input.shape())?)?;
        }

        Op::BroadcastTo { input } => grads.contribute(input, up.clone())?,

        Op::Reshape { input } => grads.contribute(input, up.reshape(input.shape())?)?,

        Op::Permute { input, perm } => grads.contribute(input, up.unpermute(perm)?)?,

        Op::Index { input, map } => {
            let storage = dispatch::scatter_zeros(up, map, input.shape())?;
            let grad = Tensor::leaf(storage, input.shape().clone(), input.device(), false);
            grads.contribute(input, grad)?;
        }
    }
    Ok(())
}

fn binary_rule<B: Backend>(
    op: BinaryOp,
    lhs: &SavedTensor<B>,
    rhs: &SavedTensor<B>,
    up: &Tensor<B>,
    grads: &mut GradStore<B>,
) -> Result<()> {
    if !op.is_differentiable() {
        return Ok(());
    }
    let (a, b) = (lhs.tensor(), rhs.tensor());
    let (need_a, need_b) = (a.requires_grad(), b.requires_grad());

    match op {
        BinaryOp::Add => {
            if need_a {
                grads.contribute(a, up.clone())?;
            }
            if need_b {
                grads.contribute(b, up.clone())?;
            }
        }
        BinaryOp::Sub => {
            if need_a {
                grads.contribute(a, up.clone())?;
            }
            if need_b {
                grads.contribute(b, up.neg()?)?;
            }
        }
        BinaryOp::Mul => {
            if need_a {
                grads.contribute(a, up.mul(rhs.value()?)?)?;
            }
            if need_b {
                grads.contribute(b, up.mul(lhs.value()?)?)?;
            }
        }
        BinaryOp::Div => {
            let bv = rhs.value()?;
            if need_a {
                grads.contribute(a, up.div(bv)?)?;
            }
            if need_b {
                let av = lhs.value()?;
                let g = up.mul(av)?.div(&bv.mul(bv)?)?.neg()?;
                grads.contribute(b, g)?;
            }
        }
        BinaryOp::Rem => {
            if need_a {
                grads.contribute(a, up.clone())?;
            }
            if need_b {
                let (av, bv) = (lhs.value()?, rhs.value()?);
                // trunc(a / b) = (a - fmod(a, b)) / b
                let quotient = av.sub(&av.rem(bv)?)?.div(bv)?;
                grads.contribute(b, up.mul(&quotient)?.neg()?)?;
            }
        }
        BinaryOp::Pow => {
            let (av, bv) = (lhs.value()?, rhs.value()?);
            if need_a {
                let one = Tensor::scalar(1.0, false, av.device())?;
                let g = up.mul(bv)?.mul(&av.pow(&bv.sub(&one)?)?)?;
                grads.contribute(a, g)?;
            }
            if need_b {
                let g = up.mul(&av.pow(bv)?)?.mul(&av.log()?)?;
                grads.contribute(b, g)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn unary_rule<B: Backend>(
    op: UnaryOp,
    input: &SavedTensor<B>,
    up: &Tensor<B>,
    grads: &mut GradStore<B>,
) -> Result<()> {
    let x = input.tensor();
    if !x.requires_grad() {
        return Ok(());
    }
    let grad = match op {
        UnaryOp::Invert => return Ok(()),
        UnaryOp::Neg => up.neg()?,
        UnaryOp::Abs => {
            let xv = input.value()?;
            let zero = Tensor::scalar(0.0, false, xv.device())?;
            let sign = xv.gt(&zero)?.sub(&xv.lt(&zero)?)?;
            up.mul(&sign)?
        }
        UnaryOp::Exp => up.mul(&input.value()?.exp()?)?,
        UnaryOp::Log => up.div(input.value()?)?,
        UnaryOp::Sqrt => {
            let two = Tensor::scalar(2.0, false, x.device())?;
            up.div(&input.value()?.sqrt()?.mul(&two)?)?
        }
    };
    grads.contribute(x, grad)
}
