use super::{create_linear_layers, mlp_forward, MlpConfig};
use crate::model::{ModelBase, SubModel1, SubModel2};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::{Linear, VarBuilder};

/// Multilayer perceptron with ReLU activation function.
///
/// As a [`SubModel2`], the two inputs are concatenated along the last
/// dimension, so `in_dim` is the sum of their dimensions.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    layers: Vec<Linear>,
}

impl Mlp {
    fn forward_(&self, xs: Tensor) -> Result<Tensor> {
        let xs = mlp_forward(xs.to_device(&self.device)?, &self.layers)?;
        match self.config.activation_out {
            false => Ok(xs),
            true => Ok(xs.relu()?),
        }
    }
}

impl ModelBase for Mlp {
    type Config = MlpConfig;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let device = vb.device().clone();
        let layers = create_linear_layers(
            vb.pp("mlp"),
            config.in_dim,
            &config.units,
            Some(config.out_dim),
        )?;

        Ok(Self {
            config,
            device,
            layers,
        })
    }
}

impl SubModel1 for Mlp {
    type Output = Tensor;

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.forward_(xs.clone())
    }
}

impl SubModel2 for Mlp {
    type Output = Tensor;

    fn forward(&self, x1: &Tensor, x2: &Tensor) -> Result<Tensor> {
        let x1 = x1.to_device(&self.device)?;
        let x2 = x2.to_device(&self.device)?;
        self.forward_(Tensor::cat(&[x1, x2], D::Minus1)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_output_shapes() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let q = Mlp::build(vb.pp("q"), MlpConfig::new(5, vec![16, 16], 1, false))?;

        let obs = Tensor::zeros((4, 3), DType::F32, &Device::Cpu)?;
        let act = Tensor::zeros((4, 2), DType::F32, &Device::Cpu)?;
        assert_eq!(SubModel2::forward(&q, &obs, &act)?.dims(), &[4, 1]);

        let xs = Tensor::zeros((4, 5), DType::F32, &Device::Cpu)?;
        assert_eq!(SubModel1::forward(&q, &xs)?.dims(), &[4, 1]);

        // 3 layers with weights and biases
        assert_eq!(varmap.all_vars().len(), 6);
        Ok(())
    }

    #[test]
    fn test_activation_out() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mlp = Mlp::build(vb, MlpConfig::new(2, vec![8], 3, true))?;
        let xs = Tensor::new(&[[1f32, -1.0], [-2.0, 0.5]], &Device::Cpu)?;
        let ys = SubModel1::forward(&mlp, &xs)?.flatten_all()?.to_vec1::<f32>()?;
        assert!(ys.iter().all(|y| *y >= 0.0));
        Ok(())
    }
}
