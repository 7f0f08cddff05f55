//! Online and target networks.
use crate::{
    model::ModelBase,
    opt::{Optimizer, OptimizerConfig, ParamGroup},
    util::track,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// File names of the network, its target and its optimizer.
#[derive(Clone, Copy, Debug)]
pub struct Roles {
    /// Online network.
    pub net: &'static str,

    /// Target network.
    pub target: &'static str,

    /// Optimizer.
    pub optim: &'static str,
}

/// Roles of the actor.
pub const ACTOR: Roles = Roles {
    net: "actor",
    target: "act_target",
    optim: "act_optim",
};

/// Roles of the critic.
pub const CRITIC: Roles = Roles {
    net: "critic",
    target: "cri_target",
    optim: "cri_optim",
};

/// Path of the file holding a role.
pub fn role_path(dir: &Path, role: &str) -> PathBuf {
    dir.join(format!("{}.pt", role))
}

/// Calls `f` if `path` exists, otherwise logs and does nothing.
pub(crate) fn load_if_exists(path: &Path, f: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    if path.exists() {
        f(path)
    } else {
        warn!("Skip loading {:?}, file not found", path);
        Ok(())
    }
}

/// A model together with the [`VarMap`] holding its parameters.
pub struct Net<M> {
    varmap: VarMap,
    model: M,
}

impl<M: ModelBase> Net<M> {
    /// Builds a model in a new [`VarMap`].
    pub fn build(config: M::Config, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let model = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
            M::build(vb, config)?
        };
        Ok(Self { varmap, model })
    }

    /// The model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The parameters of the model.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        Ok(())
    }

    /// Loads the parameters.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        Ok(())
    }
}

/// An online network, its optional target and the optimizer of the online one.
///
/// Without an independent target, [`NetPair::target`] returns the online
/// network itself and soft updates do nothing.
pub struct NetPair<M> {
    online: Net<M>,
    target: Option<Net<M>>,
    opt: Optimizer,
}

impl<M: ModelBase> NetPair<M> {
    /// Builds the online network and, if `use_target`, a target initialized
    /// with a copy of its parameters.
    pub fn build(
        config: M::Config,
        opt_config: &OptimizerConfig,
        use_target: bool,
        device: &Device,
    ) -> Result<Self> {
        Self::build_with_extra_params(config, opt_config, use_target, device, vec![])
    }

    /// Same as [`NetPair::build`], with additional parameters trained by the
    /// same optimizer.
    pub fn build_with_extra_params(
        config: M::Config,
        opt_config: &OptimizerConfig,
        use_target: bool,
        device: &Device,
        extra: Vec<ParamGroup>,
    ) -> Result<Self> {
        let online = Net::<M>::build(config.clone(), device)?;
        let target = match use_target {
            true => {
                let target = Net::<M>::build(config, device)?;
                track(target.varmap(), online.varmap(), 1.0)?;
                Some(target)
            }
            false => None,
        };
        let mut groups = ParamGroup::from_varmap(online.varmap(), M::lr_scale);
        groups.extend(extra);
        let opt = opt_config.build_grouped(groups)?;

        Ok(Self {
            online,
            target,
            opt,
        })
    }

    /// The online network.
    pub fn online(&self) -> &M {
        self.online.model()
    }

    /// The target network, which is the online network without an independent target.
    pub fn target(&self) -> &M {
        match &self.target {
            Some(target) => target.model(),
            None => self.online.model(),
        }
    }

    /// Returns `true` if the target is a separate copy.
    pub fn has_independent_target(&self) -> bool {
        self.target.is_some()
    }

    /// Parameters of the online network.
    pub fn varmap(&self) -> &VarMap {
        self.online.varmap()
    }

    /// Blends the target toward the online network, `target <- (1 - tau) * target + tau * online`.
    pub fn soft_update(&self, tau: f64) -> Result<()> {
        if let Some(target) = &self.target {
            track(target.varmap(), self.online.varmap(), tau)?;
        }
        Ok(())
    }

    /// Copies the online parameters into the target.
    pub fn hard_update(&self) -> Result<()> {
        self.soft_update(1.0)
    }

    /// Applies one optimizer step on `loss`.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Saves the online network, the target and the optimizer state.
    ///
    /// Without an independent target, the online parameters are written for
    /// the target role.
    pub fn save(&self, dir: &Path, roles: Roles) -> Result<()> {
        let path = role_path(dir, roles.net);
        self.online.save(&path)?;
        info!("Save {} to {:?}", roles.net, path);

        let path = role_path(dir, roles.target);
        match &self.target {
            Some(target) => target.save(&path)?,
            None => self.online.save(&path)?,
        }
        info!("Save {} to {:?}", roles.target, path);

        self.opt.save(role_path(dir, roles.optim))
    }

    /// Loads the files written by [`NetPair::save`], skipping absent ones.
    pub fn load(&mut self, dir: &Path, roles: Roles) -> Result<()> {
        let online = &mut self.online;
        load_if_exists(&role_path(dir, roles.net), |path| {
            online.load(path)?;
            info!("Load {} from {:?}", roles.net, path);
            Ok(())
        })?;

        if let Some(target) = self.target.as_mut() {
            load_if_exists(&role_path(dir, roles.target), |path| {
                target.load(path)?;
                info!("Load {} from {:?}", roles.target, path);
                Ok(())
            })?;
        }

        let opt = &mut self.opt;
        load_if_exists(&role_path(dir, roles.optim), |path| opt.load(path))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        model::SubModel1,
    };
    use tempdir::TempDir;

    fn pair(use_target: bool) -> Result<NetPair<Mlp>> {
        let config = MlpConfig::new(2, vec![8], 1, false);
        NetPair::build(config, &OptimizerConfig::default(), use_target, &Device::Cpu)
    }

    fn outputs(m: &Mlp) -> Result<Vec<f32>> {
        let obs = Tensor::new(&[[0.1f32, 0.2], [0.3, -0.4]], &Device::Cpu)?;
        Ok(SubModel1::forward(m, &obs)?.flatten_all()?.to_vec1::<f32>()?)
    }

    fn shift_online(pair: &NetPair<Mlp>, value: f32) -> Result<()> {
        for (_, var) in crate::opt::named_vars(pair.varmap()).iter() {
            var.set(&var.as_tensor().ones_like()?.affine(value as f64, 0.0)?)?;
        }
        Ok(())
    }

    #[test]
    fn test_target_starts_as_copy() -> Result<()> {
        let pair = pair(true)?;
        assert!(pair.has_independent_target());
        assert_eq!(outputs(pair.online())?, outputs(pair.target())?);
        Ok(())
    }

    #[test]
    fn test_aliased_target() -> Result<()> {
        let pair = pair(false)?;
        assert!(!pair.has_independent_target());
        assert!(std::ptr::eq(pair.online(), pair.target()));

        // Mutations of the online network are visible through the target
        shift_online(&pair, 0.5)?;
        pair.soft_update(0.1)?;
        assert_eq!(outputs(pair.online())?, outputs(pair.target())?);
        Ok(())
    }

    #[test]
    fn test_soft_and_hard_update() -> Result<()> {
        let pair = pair(true)?;
        let before = outputs(pair.target())?;
        shift_online(&pair, 0.5)?;
        pair.soft_update(0.0)?;
        assert_eq!(outputs(pair.target())?, before);

        pair.hard_update()?;
        assert_eq!(outputs(pair.online())?, outputs(pair.target())?);
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let dir = TempDir::new("net_pair")?;
        let src = pair(true)?;
        shift_online(&src, 0.25)?;
        src.save(dir.path(), CRITIC)?;
        assert!(role_path(dir.path(), "critic").exists());
        assert!(role_path(dir.path(), "cri_target").exists());
        assert!(role_path(dir.path(), "cri_optim").exists());

        let mut dest = pair(true)?;
        dest.load(dir.path(), CRITIC)?;
        assert_eq!(outputs(dest.online())?, outputs(src.online())?);
        assert_eq!(outputs(dest.target())?, outputs(src.target())?);
        Ok(())
    }

    #[test]
    fn test_load_missing_files_is_noop() -> Result<()> {
        let dir = TempDir::new("net_pair_empty")?;
        let mut pair = pair(true)?;
        let before = outputs(pair.online())?;
        pair.load(dir.path(), ACTOR)?;
        assert_eq!(outputs(pair.online())?, before);
        Ok(())
    }
}
