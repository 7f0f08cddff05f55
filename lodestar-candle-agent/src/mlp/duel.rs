use super::{create_linear_layers, mlp_forward, MlpConfig};
use crate::model::{ModelBase, SubModel1};
use anyhow::Result;
use candle_core::{Device, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// Dueling Q-network.
///
/// A shared trunk feeds a state-value head and an advantage head. The output
/// is `value + advantage - mean(advantage)`.
pub struct DuelMlp {
    device: Device,
    layers: Vec<Linear>,
    value: Linear,
    advantage: Linear,
}

impl ModelBase for DuelMlp {
    type Config = MlpConfig;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let device = vb.device().clone();
        let layers = create_linear_layers(vb.pp("mlp"), config.in_dim, &config.units, None)?;
        let in_dim = config.units.last().copied().unwrap_or(config.in_dim);
        let value = linear(in_dim, 1, vb.pp("value"))?;
        let advantage = linear(in_dim, config.out_dim, vb.pp("advantage"))?;

        Ok(Self {
            device,
            layers,
            value,
            advantage,
        })
    }
}

impl SubModel1 for DuelMlp {
    type Output = Tensor;

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = mlp_forward(xs.to_device(&self.device)?, &self.layers)?;
        let xs = match self.layers.is_empty() {
            true => xs,
            false => xs.relu()?,
        };
        let v = self.value.forward(&xs)?;
        let a = self.advantage.forward(&xs)?;
        let a = a.broadcast_sub(&a.mean_keepdim(1)?)?;
        Ok(a.broadcast_add(&v)?)
    }
}
