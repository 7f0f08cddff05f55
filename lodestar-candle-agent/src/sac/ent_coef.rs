//! Entropy coefficient of SAC.
use crate::opt::{named_vars, Optimizer, OptimizerConfig, ParamGroup};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{init::Init, VarMap};
use log::info;
use std::path::Path;

/// The entropy coefficient `alpha = exp(alpha_log)` of SAC, tuned toward a
/// target entropy.
///
/// After every update `alpha_log` is clamped into a fixed range.
pub struct EntCoef {
    varmap: VarMap,
    alpha_log: Var,
    target_entropy: f64,
    range: (f64, f64),
    opt: Option<Optimizer>,
}

impl EntCoef {
    /// Constructs the coefficient.
    ///
    /// Without `opt_config`, the coefficient has no optimizer of its own and
    /// is expected to be trained through [`EntCoef::param_group`].
    pub fn new(
        init: f64,
        target_entropy: f64,
        range: (f64, f64),
        opt_config: Option<&OptimizerConfig>,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        varmap.get(1, "alpha_log", Init::Const(init), DType::F32, device)?;
        let (_, alpha_log) = named_vars(&varmap)
            .into_iter()
            .next()
            .context("alpha_log is not created")?;
        let opt = match opt_config {
            Some(config) => Some(config.build(&varmap)?),
            None => None,
        };

        Ok(Self {
            varmap,
            alpha_log,
            target_entropy,
            range,
            opt,
        })
    }

    /// Returns the entropy coefficient, detached from the graph.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.alpha_log.as_tensor().detach().exp()?)
    }

    /// Returns `alpha_log` as a scalar.
    pub fn alpha_log_value(&self) -> Result<f32> {
        Ok(self.alpha_log.as_tensor().to_vec1::<f32>()?[0])
    }

    /// The target entropy.
    pub fn target_entropy(&self) -> f64 {
        self.target_entropy
    }

    /// `mean(alpha_log * (-logp - target_entropy))` with `logp` detached.
    pub fn objective(&self, logp: &Tensor) -> Result<Tensor> {
        let entropy_gap = ((logp.detach() * -1.0)? - self.target_entropy)?;
        Ok(entropy_gap
            .broadcast_mul(self.alpha_log.as_tensor())?
            .mean_all()?)
    }

    /// Applies one optimizer step on [`EntCoef::objective`] and clamps `alpha_log`.
    pub fn update(&mut self, logp: &Tensor) -> Result<f32> {
        let loss = self.objective(logp)?;
        if let Some(opt) = &mut self.opt {
            opt.backward_step(&loss)?;
        }
        self.clamp()?;
        Ok(loss.to_scalar::<f32>()?)
    }

    /// Clamps `alpha_log` into its range.
    pub fn clamp(&self) -> Result<()> {
        let (min, max) = self.range;
        self.alpha_log
            .set(&self.alpha_log.as_tensor().clamp(min, max)?)?;
        Ok(())
    }

    /// `alpha_log` as a parameter group of another optimizer.
    pub fn param_group(&self) -> ParamGroup {
        ParamGroup::new(vec![("alpha_log".to_string(), self.alpha_log.clone())])
    }

    /// Save the parameter into a file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save entropy coefficient to {:?}", path.as_ref());
        Ok(())
    }

    /// Load the parameter from a file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load entropy coefficient from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_alpha_log_stays_in_range() -> Result<()> {
        let opt_config = OptimizerConfig::Adam { lr: 10.0 };
        let mut ent_coef = EntCoef::new(0.0, 1.0, (-2.0, 0.5), Some(&opt_config), &Device::Cpu)?;

        // Low entropy, alpha grows until the upper bound
        let logp = Tensor::new(&[[3f32], [2.0]], &Device::Cpu)?;
        for _ in 0..10 {
            ent_coef.update(&logp)?;
            assert!(ent_coef.alpha_log_value()? <= 0.5);
        }
        assert!((ent_coef.alpha_log_value()? - 0.5).abs() < 1e-6);

        // High entropy, alpha shrinks until the lower bound
        let logp = Tensor::new(&[[-30f32], [-20.0]], &Device::Cpu)?;
        for _ in 0..10 {
            ent_coef.update(&logp)?;
            assert!(ent_coef.alpha_log_value()? >= -2.0);
        }
        assert!((ent_coef.alpha_log_value()? + 2.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_objective() -> Result<()> {
        let ent_coef = EntCoef::new(0.5, 1.0, (-20.0, 2.0), None, &Device::Cpu)?;
        let logp = Tensor::new(&[[-2f32], [0.0]], &Device::Cpu)?;
        // mean(0.5 * [1, -1]) = 0
        let obj = ent_coef.objective(&logp)?.to_scalar::<f32>()?;
        assert!(obj.abs() < 1e-6);
        let alpha = ent_coef.alpha()?.to_vec1::<f32>()?[0];
        assert!((alpha - 0.5f32.exp()).abs() < 1e-6);
        Ok(())
    }
}
