//! Multilayer perceptrons.
//!
//! Reference implementations of the approximator traits in [`crate::model`].
mod base;
mod config;
mod duel;
mod gaussian;
mod shared;
pub use base::Mlp;
use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};
pub use config::{MlpConfig, SharedMlpConfig};
pub use duel::DuelMlp;
pub use gaussian::GaussianMlp;
pub use shared::{SharedDpgMlp, SharedPpoMlp, SharedSacMlp};

/// Linear layers from `in_dim` through `units`, with a last layer to `out_dim` if given.
fn create_linear_layers(
    vb: VarBuilder,
    in_dim: usize,
    units: &[usize],
    out_dim: Option<usize>,
) -> anyhow::Result<Vec<Linear>> {
    let mut dims = vec![in_dim];
    dims.extend_from_slice(units);
    dims.extend(out_dim);

    let layers = dims
        .windows(2)
        .enumerate()
        .map(|(i, w)| linear(w[0], w[1], vb.pp(format!("ln{}", i))))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layers)
}

/// Applies the layers with ReLU in between; the output of the last layer is
/// returned as is.
fn mlp_forward(xs: Tensor, layers: &[Linear]) -> anyhow::Result<Tensor> {
    let mut xs = xs;
    for (i, layer) in layers.iter().enumerate() {
        xs = layer.forward(&xs)?;
        if i + 1 < layers.len() {
            xs = xs.relu()?;
        }
    }
    Ok(xs)
}
