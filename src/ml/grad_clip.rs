// ============================================================
// Layer 5 — Global Gradient-Norm Clipping
// ============================================================
// Rescales the whole gradient set so its combined L2 norm is at
// most `max_norm`:
//
//   total = sqrt(Σ_p ||g_p||²)
//   g_p  ← g_p * min(1, max_norm / total)    for every parameter p
//
// Burn's optimizer-level clipping works on one parameter tensor
// at a time, which bounds each tensor separately. Here the
// module's parameter ids are walked with a ModuleVisitor and the
// gradients are read from / written back to GradientsParams.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::marker::PhantomData;

/// Sums the squared L2 norm of every gradient the module owns.
struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum:   f64,
    _b:    PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

/// Multiplies every gradient the module owns by `scale`.
struct ScaleGrads<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    _b:    PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register(id, grad.mul_scalar(self.scale));
        }
    }
}

/// Global L2 norm of `grads` over the parameters of `module`.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> { grads, sum: 0.0, _b: PhantomData };
    module.visit(&mut visitor);
    visitor.sum.sqrt()
}

/// Clip `grads` to a global norm of `max_norm` (disabled when `max_norm <= 0`).
/// Returns the clipped gradients and the norm measured before clipping.
pub fn clip_grad_norm<B, M>(module: &M, mut grads: GradientsParams, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let total = global_grad_norm::<B, M>(module, &grads);
    if max_norm > 0.0 && total.is_finite() && total > max_norm {
        let scale = max_norm / (total + 1e-6);
        let mut visitor = ScaleGrads::<B> { grads: &mut grads, scale, _b: PhantomData };
        module.visit(&mut visitor);
    }
    (grads, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{tests::{backend_rng_guard, tiny_config}, BiasClassifier};
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    /// Gradients of a large loss, so every tensor's own norm is well above 5.
    fn large_grads(model: &BiasClassifier<B>, device: &<B as Backend>::Device) -> GradientsParams {
        let ids  = Tensor::<B, 1, Int>::from_ints([3, 4, 5, 0, 6, 7, 8, 9].as_slice(), device).reshape([2, 4]);
        let mask = Tensor::<B, 1, Int>::from_ints([1, 1, 1, 0, 1, 1, 1, 1].as_slice(), device).reshape([2, 4]);
        let loss = model.forward(ids, mask).sum().mul_scalar(1e4);
        GradientsParams::from_grads(loss.backward(), model)
    }

    #[test]
    fn test_clipping_bounds_the_combined_norm() {
        let _guard = backend_rng_guard();
        let device = Default::default();
        let model: BiasClassifier<B> = tiny_config(3).init(&device);

        let grads = large_grads(&model, &device);
        let (clipped, before) = clip_grad_norm::<B, _>(&model, grads, 5.0);
        assert!(before > 5.0, "fixture gradients too small: {before}");

        let after = global_grad_norm::<B, _>(&model, &clipped);
        assert!(after <= 5.0 + 1e-3, "global norm after clipping was {after}");
        assert!(after > 4.9);
    }

    #[test]
    fn test_small_gradients_are_left_alone() {
        let _guard = backend_rng_guard();
        let device = Default::default();
        let model: BiasClassifier<B> = tiny_config(3).init(&device);

        let grads = large_grads(&model, &device);
        let before = global_grad_norm::<B, _>(&model, &grads);
        let (kept, measured) = clip_grad_norm::<B, _>(&model, grads, before * 2.0);

        assert!((measured - before).abs() < 1e-9);
        let after = global_grad_norm::<B, _>(&model, &kept);
        assert!((after - before).abs() / before < 1e-6);
    }

    #[test]
    fn test_zero_threshold_disables_clipping() {
        let _guard = backend_rng_guard();
        let device = Default::default();
        let model: BiasClassifier<B> = tiny_config(3).init(&device);

        let grads = large_grads(&model, &device);
        let (kept, before) = clip_grad_norm::<B, _>(&model, grads, 0.0);
        let after = global_grad_norm::<B, _>(&model, &kept);
        assert!((after - before).abs() / before < 1e-6);
    }
}
