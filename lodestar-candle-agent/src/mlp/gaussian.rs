use super::{create_linear_layers, mlp_forward, MlpConfig};
use crate::model::{ModelBase, SubModel1};
use anyhow::Result;
use candle_core::{Device, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// Multilayer perceptron that outputs the mean and the log standard deviation
/// of a diagonal Gaussian.
pub struct GaussianMlp {
    device: Device,
    layers: Vec<Linear>,
    mean: Linear,
    log_std: Linear,
}

impl ModelBase for GaussianMlp {
    type Config = MlpConfig;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let device = vb.device().clone();
        let layers = create_linear_layers(vb.pp("mlp"), config.in_dim, &config.units, None)?;
        let in_dim = config.units.last().copied().unwrap_or(config.in_dim);
        let mean = linear(in_dim, config.out_dim, vb.pp("mean"))?;
        let log_std = linear(in_dim, config.out_dim, vb.pp("log_std"))?;

        Ok(Self {
            device,
            layers,
            mean,
            log_std,
        })
    }
}

impl SubModel1 for GaussianMlp {
    type Output = (Tensor, Tensor);

    fn forward(&self, xs: &Tensor) -> Result<(Tensor, Tensor)> {
        let xs = mlp_forward(xs.to_device(&self.device)?, &self.layers)?;
        let xs = match self.layers.is_empty() {
            true => xs,
            false => xs.relu()?,
        };
        Ok((self.mean.forward(&xs)?, self.log_std.forward(&xs)?))
    }
}
