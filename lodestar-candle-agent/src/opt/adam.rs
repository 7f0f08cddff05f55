//! Adam optimizer with parameter groups and persistent moments.
use super::ParamGroup;
use anyhow::Result;
use candle_core::{backprop::GradStore, safetensors, DType, Device, Tensor, Var};
use log::info;
use std::{collections::HashMap, path::Path};

struct AdamParam {
    name: String,
    var: Var,
    lr_scale: f64,
    m: Var,
    v: Var,
}

/// Adam optimizer.
///
/// With a positive `weight_decay`, the decay is applied directly to the
/// parameters as in AdamW. The first and second moments and the step count
/// can be saved and loaded as safetensors.
pub struct Adam {
    params: Vec<AdamParam>,
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    weight_decay: f64,
    t: usize,
}

impl Adam {
    /// Creates the optimizer.
    pub fn new(
        groups: Vec<ParamGroup>,
        lr: f64,
        (beta1, beta2): (f64, f64),
        eps: f64,
        weight_decay: f64,
    ) -> Result<Self> {
        let mut params = vec![];
        for group in groups.into_iter() {
            for (name, var) in group.vars.into_iter() {
                let m = Var::zeros(var.dims(), var.dtype(), var.device())?;
                let v = Var::zeros(var.dims(), var.dtype(), var.device())?;
                params.push(AdamParam {
                    name,
                    var,
                    lr_scale: group.lr_scale,
                    m,
                    v,
                });
            }
        }

        Ok(Self {
            params,
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
            t: 0,
        })
    }

    /// Base learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.lr
    }

    /// Number of steps taken.
    pub fn n_steps(&self) -> usize {
        self.t
    }

    /// Updates every parameter that has a gradient in `grads`.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);

        for p in self.params.iter() {
            let g = match grads.get(&p.var) {
                Some(g) => g,
                None => continue,
            };
            let lr = self.lr * p.lr_scale;
            let m = ((p.m.as_tensor() * self.beta1)? + (g * (1.0 - self.beta1))?)?;
            let v = ((p.v.as_tensor() * self.beta2)? + (g.sqr()? * (1.0 - self.beta2))?)?;
            let m_hat = (&m / bias1)?;
            let v_hat = (&v / bias2)?;
            let delta = (m_hat / (v_hat.sqrt()? + self.eps)?)?;
            let theta = if self.weight_decay > 0.0 {
                (p.var.as_tensor() * (1.0 - lr * self.weight_decay))?
            } else {
                p.var.as_tensor().clone()
            };
            p.var.set(&(theta - (delta * lr)?)?)?;
            p.m.set(&m)?;
            p.v.set(&v)?;
        }

        Ok(())
    }

    /// Saves the moments and the step count.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let mut tensors = HashMap::new();
        for p in self.params.iter() {
            tensors.insert(format!("{}.m", p.name), p.m.as_tensor().clone());
            tensors.insert(format!("{}.v", p.name), p.v.as_tensor().clone());
        }
        tensors.insert(
            "step".to_string(),
            Tensor::new(&[self.t as f64], &Device::Cpu)?,
        );
        safetensors::save(&tensors, path.as_ref())?;
        info!("Save optimizer state to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the moments and the step count.
    ///
    /// Parameters missing in the file keep their current state.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        let device = match self.params.first() {
            Some(p) => p.var.device().clone(),
            None => Device::Cpu,
        };
        let tensors = safetensors::load(path.as_ref(), &device)?;
        for p in self.params.iter() {
            if let Some(m) = tensors.get(&format!("{}.m", p.name)) {
                p.m.set(&m.to_dtype(p.m.dtype())?)?;
            }
            if let Some(v) = tensors.get(&format!("{}.v", p.name)) {
                p.v.set(&v.to_dtype(p.v.dtype())?)?;
            }
        }
        if let Some(t) = tensors.get("step") {
            let t = t.to_dtype(DType::F64)?.to_vec1::<f64>()?;
            self.t = t.first().copied().unwrap_or(0.0) as usize;
        }
        info!("Load optimizer state from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::opt::named_vars;
    use candle_nn::{Init, VarMap};
    use tempdir::TempDir;

    fn new_varmap(v: f32) -> Result<VarMap> {
        let varmap = VarMap::new();
        varmap.get((1,), "x", Init::Const(v as f64), DType::F32, &Device::Cpu)?;
        Ok(varmap)
    }

    fn value(varmap: &VarMap) -> Result<f32> {
        let (_, var) = named_vars(varmap).remove(0);
        Ok(var.as_tensor().to_vec1::<f32>()?[0])
    }

    #[test]
    fn test_first_step_moves_by_lr() -> Result<()> {
        let varmap = new_varmap(1.0)?;
        let mut opt = Adam::new(
            vec![ParamGroup::new(named_vars(&varmap))],
            0.1,
            (0.9, 0.999),
            1e-8,
            0.0,
        )?;

        // loss = x^2, gradient is positive
        let (_, x) = named_vars(&varmap).remove(0);
        let loss = x.as_tensor().sqr()?.sum_all()?;
        opt.step(&loss.backward()?)?;

        // The bias-corrected first step has magnitude lr
        assert!((value(&varmap)? - 0.9).abs() < 1e-5);
        assert_eq!(opt.n_steps(), 1);
        Ok(())
    }

    #[test]
    fn test_lr_scale() -> Result<()> {
        let varmap = new_varmap(1.0)?;
        let group = ParamGroup::new(named_vars(&varmap)).lr_scale(0.5);
        let mut opt = Adam::new(vec![group], 0.1, (0.9, 0.999), 1e-8, 0.0)?;
        let (_, x) = named_vars(&varmap).remove(0);
        let loss = x.as_tensor().sqr()?.sum_all()?;
        opt.step(&loss.backward()?)?;
        assert!((value(&varmap)? - 0.95).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let varmap = new_varmap(1.0)?;
        let mut opt = Adam::new(
            vec![ParamGroup::new(named_vars(&varmap))],
            0.1,
            (0.9, 0.999),
            1e-8,
            0.0,
        )?;
        let (_, x) = named_vars(&varmap).remove(0);
        let loss = x.as_tensor().sqr()?.sum_all()?;
        opt.step(&loss.backward()?)?;

        let dir = TempDir::new("adam")?;
        let path = dir.path().join("opt.pt");
        opt.save(&path)?;

        let varmap2 = new_varmap(1.0)?;
        let mut opt2 = Adam::new(
            vec![ParamGroup::new(named_vars(&varmap2))],
            0.1,
            (0.9, 0.999),
            1e-8,
            0.0,
        )?;
        opt2.load(&path)?;
        assert_eq!(opt2.n_steps(), 1);
        let m = opt2.params[0].m.as_tensor().to_vec1::<f32>()?[0];
        let m_ = opt.params[0].m.as_tensor().to_vec1::<f32>()?[0];
        assert_eq!(m, m_);
        Ok(())
    }
}
