//! Optimizers.
mod adam;
pub use adam::Adam;
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of optimizer for training neural networks in an RL agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer, Adam with decoupled weight decay.
    AdamW {
        /// Learning rate.
        lr: f64,
        #[serde(default = "default_beta1")]
        /// Decay of the first moment.
        beta1: f64,
        #[serde(default = "default_beta2")]
        /// Decay of the second moment.
        beta2: f64,
        #[serde(default = "default_eps")]
        /// Term added to the denominator.
        eps: f64,
        #[serde(default = "default_weight_decay")]
        /// Weight decay.
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_eps() -> f64 {
    1e-8
}

fn default_weight_decay() -> f64 {
    0.01
}

/// Parameters sharing a learning rate multiplier.
pub struct ParamGroup {
    /// Named parameters.
    pub vars: Vec<(String, Var)>,

    /// Multiplier of the base learning rate.
    pub lr_scale: f64,
}

impl ParamGroup {
    /// Creates a group with the base learning rate.
    pub fn new(vars: Vec<(String, Var)>) -> Self {
        Self {
            vars,
            lr_scale: 1.0,
        }
    }

    /// Sets the learning rate multiplier.
    pub fn lr_scale(mut self, lr_scale: f64) -> Self {
        self.lr_scale = lr_scale;
        self
    }

    /// Groups the variables of a [`VarMap`] by a learning rate multiplier.
    ///
    /// Groups are sorted by the multiplier, variables by name.
    pub fn from_varmap(varmap: &VarMap, lr_scale: impl Fn(&str) -> f64) -> Vec<Self> {
        let mut vars = named_vars(varmap)
            .into_iter()
            .map(|(name, var)| (lr_scale(&name), name, var))
            .collect::<Vec<_>>();
        vars.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut groups: Vec<Self> = vec![];
        for (scale, name, var) in vars.into_iter() {
            match groups.last_mut() {
                Some(group) if group.lr_scale == scale => group.vars.push((name, var)),
                _ => groups.push(Self::new(vec![(name, var)]).lr_scale(scale)),
            }
        }
        groups
    }
}

/// Returns the variables of a [`VarMap`] sorted by name.
pub fn named_vars(varmap: &VarMap) -> Vec<(String, Var)> {
    let data = varmap.data().lock().unwrap();
    let mut vars = data
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<Vec<_>>();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars
}

impl OptimizerConfig {
    /// Constructs an optimizer over all variables of a [`VarMap`].
    pub fn build(&self, varmap: &VarMap) -> Result<Optimizer> {
        self.build_grouped(vec![ParamGroup::new(named_vars(varmap))])
    }

    /// Constructs an optimizer over parameter groups.
    pub fn build_grouped(&self, groups: Vec<ParamGroup>) -> Result<Optimizer> {
        let opt = match self {
            Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Adam::new(groups, *lr, (*beta1, *beta2), *eps, *weight_decay)?,
            Self::Adam { lr } => Adam::new(
                groups,
                *lr,
                (default_beta1(), default_beta2()),
                default_eps(),
                0.0,
            )?,
        };
        Ok(Optimizer::Adam(opt))
    }

    /// Base learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            Self::AdamW { lr, .. } => *lr,
            Self::Adam { lr } => *lr,
        }
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _ } => Self::Adam { lr },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 1e-4 }
    }
}

/// Optimizers.
pub enum Optimizer {
    /// Adam optimizer, with optional decoupled weight decay.
    Adam(Adam),
}

impl Optimizer {
    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Updates the parameters with given gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::Adam(opt) => opt.step(grads),
        }
    }

    /// Saves the internal state of the optimizer.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        match self {
            Self::Adam(opt) => opt.save(path),
        }
    }

    /// Loads the internal state of the optimizer.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        match self {
            Self::Adam(opt) => opt.load(path),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::Init;

    #[test]
    fn test_param_groups() -> Result<()> {
        let varmap = VarMap::new();
        for name in ["enc.w", "dec.w", "enc.b"].iter() {
            varmap.get((2,), name, Init::Const(0.0), DType::F32, &Device::Cpu)?;
        }
        let groups =
            ParamGroup::from_varmap(&varmap, |name| if name.starts_with("enc") { 0.9 } else { 1.0 });

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].lr_scale, 0.9);
        let names = groups[0]
            .vars
            .iter()
            .map(|(n, _)| n.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["enc.b", "enc.w"]);
        assert_eq!(groups[1].vars.len(), 1);
        Ok(())
    }
}
