//! Policies of PPO.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::{ModelBase, SubModel1},
    util::gaussian_log_prob,
    Decision,
};
use anyhow::Result;
use candle_core::{DType, Tensor, D};
use candle_nn::{
    init::Init,
    ops::{log_softmax, softmax},
    VarBuilder,
};
use rand::{distributions::WeightedIndex, Rng};

/// Initial value of the state-independent log standard deviation.
pub const A_STD_LOG_INIT: f64 = -0.5;

/// Stochastic policy trained by PPO.
///
/// Transitions record the action returned by [`PpoPolicy::sample`] together
/// with auxiliary data, from which [`PpoPolicy::old_log_prob`] recovers the
/// log-probability of the action at collection time.
pub trait PpoPolicy: ModelBase {
    /// Action of the environment.
    type Act;

    /// Dimension of recorded actions.
    fn act_dim(config: &Self::Config) -> usize;

    /// Dimension of recorded auxiliary data.
    fn aux_dim(config: &Self::Config) -> usize;

    /// Samples an action for every row of `obs`.
    fn sample(&self, obs: &Tensor, rng: &mut impl Rng) -> Result<Vec<Decision<Self::Act>>>;

    /// Log-probabilities of recorded actions, of shape `[batch, 1]`.
    fn old_log_prob(&self, act: &Tensor, aux: &Tensor) -> Result<Tensor>;

    /// Log-probabilities of `act` under the current policy, of shape
    /// `[batch, 1]`, and the entropy bonus as a scalar.
    fn log_prob_entropy(&self, obs: &Tensor, act: &Tensor) -> Result<(Tensor, Tensor)>;
}

/// Samples `mean + exp(log_std) * noise` and returns it with the noise.
pub(crate) fn gaussian_sample(mean: &Tensor, log_std: &Tensor) -> Result<(Tensor, Tensor)> {
    let noise = mean.randn_like(0.0, 1.0)?;
    let act = log_std.exp()?.broadcast_mul(&noise)?.broadcast_add(mean)?;
    Ok((act, noise))
}

/// Log-probabilities of `act` under a diagonal Gaussian and the estimate
/// `-mean(p * log p)` of its entropy over the batch.
pub(crate) fn gaussian_log_prob_entropy(
    mean: &Tensor,
    log_std: &Tensor,
    act: &Tensor,
) -> Result<(Tensor, Tensor)> {
    let noise = (act - mean)?.broadcast_div(&log_std.exp()?)?;
    let logp = gaussian_log_prob(&noise, log_std)?;
    let entropy = ((logp.exp()? * &logp)?.mean_all()? * -1.0)?;
    Ok((logp, entropy))
}

/// Decisions passing `tanh(act)` to the environment and recording the raw
/// action with its noise.
pub(crate) fn squashed_decisions(act: &Tensor, noise: &Tensor) -> Result<Vec<Decision<Vec<f32>>>> {
    let env_act = act.tanh()?.to_vec2::<f32>()?;
    let act = act.to_vec2::<f32>()?;
    let noise = noise.to_vec2::<f32>()?;
    Ok(env_act
        .into_iter()
        .zip(act.into_iter().zip(noise.into_iter()))
        .map(|(env_act, (act, noise))| Decision {
            act: env_act,
            stored_act: act,
            aux: noise,
        })
        .collect())
}

/// Gaussian policy with a state-dependent mean and a learnable
/// state-independent log standard deviation.
///
/// The environment receives `tanh` of the sampled action. The noise is
/// recorded as auxiliary data.
pub struct PpoGaussianActor {
    mean: Mlp,
    a_std_log: Tensor,
}

impl ModelBase for PpoGaussianActor {
    type Config = MlpConfig;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let a_std_log = vb.get_with_hints(
            (1, config.out_dim()),
            "a_std_log",
            Init::Const(A_STD_LOG_INIT),
        )?;
        Ok(Self {
            mean: Mlp::build(vb.pp("mean"), config)?,
            a_std_log,
        })
    }
}

impl PpoGaussianActor {
    /// Mean of the policy.
    pub fn mean(&self, obs: &Tensor) -> Result<Tensor> {
        SubModel1::forward(&self.mean, obs)
    }
}

impl PpoPolicy for PpoGaussianActor {
    type Act = Vec<f32>;

    fn act_dim(config: &MlpConfig) -> usize {
        config.out_dim()
    }

    fn aux_dim(config: &MlpConfig) -> usize {
        config.out_dim()
    }

    fn sample(&self, obs: &Tensor, _rng: &mut impl Rng) -> Result<Vec<Decision<Vec<f32>>>> {
        let (act, noise) = gaussian_sample(&self.mean(obs)?, &self.a_std_log)?;
        squashed_decisions(&act, &noise)
    }

    fn old_log_prob(&self, _act: &Tensor, aux: &Tensor) -> Result<Tensor> {
        gaussian_log_prob(aux, &self.a_std_log.detach())
    }

    fn log_prob_entropy(&self, obs: &Tensor, act: &Tensor) -> Result<(Tensor, Tensor)> {
        gaussian_log_prob_entropy(&self.mean(obs)?, &self.a_std_log, act)
    }
}

/// Categorical policy over the outputs of an MLP.
///
/// The action index is recorded as a one-element action, the action
/// probabilities as auxiliary data.
pub struct PpoDiscreteActor {
    logits: Mlp,
}

impl ModelBase for PpoDiscreteActor {
    type Config = MlpConfig;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        Ok(Self {
            logits: Mlp::build(vb.pp("logits"), config)?,
        })
    }
}

impl PpoDiscreteActor {
    fn logits(&self, obs: &Tensor) -> Result<Tensor> {
        SubModel1::forward(&self.logits, obs)
    }
}

fn act_index(act: &Tensor) -> Result<Tensor> {
    Ok(act.to_dtype(DType::U32)?)
}

impl PpoPolicy for PpoDiscreteActor {
    type Act = i64;

    fn act_dim(_config: &MlpConfig) -> usize {
        1
    }

    fn aux_dim(config: &MlpConfig) -> usize {
        config.out_dim()
    }

    fn sample(&self, obs: &Tensor, rng: &mut impl Rng) -> Result<Vec<Decision<i64>>> {
        let probs = softmax(&self.logits(obs)?, D::Minus1)?.to_vec2::<f32>()?;
        probs
            .into_iter()
            .map(|p| {
                let a = rng.sample(WeightedIndex::new(&p)?);
                Ok(Decision {
                    act: a as i64,
                    stored_act: vec![a as f32],
                    aux: p,
                })
            })
            .collect()
    }

    fn old_log_prob(&self, act: &Tensor, aux: &Tensor) -> Result<Tensor> {
        Ok(aux.gather(&act_index(act)?, 1)?.log()?)
    }

    fn log_prob_entropy(&self, obs: &Tensor, act: &Tensor) -> Result<(Tensor, Tensor)> {
        let log_probs = log_softmax(&self.logits(obs)?, D::Minus1)?;
        let logp = log_probs.gather(&act_index(act)?, 1)?;
        let entropy = ((log_probs.exp()? * &log_probs)?
            .sum_keepdim(1)?
            .mean_all()?
            * -1.0)?;
        Ok((logp, entropy))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{base::obs_to_tensor, util::LOG_SQRT_2PI};
    use candle_core::Device;
    use candle_nn::VarMap;
    use rand::{rngs::SmallRng, SeedableRng};

    fn build<P: PpoPolicy<Config = MlpConfig>>(out_dim: usize) -> Result<P> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        P::build(vb, MlpConfig::new(3, vec![8], out_dim, false))
    }

    fn rows<A>(decisions: &[Decision<A>], f: impl Fn(&Decision<A>) -> Vec<f32>) -> Result<Tensor> {
        obs_to_tensor(&decisions.iter().map(f).collect::<Vec<_>>(), &Device::Cpu)
    }

    #[test]
    fn test_gaussian_recorded_log_prob_matches_recomputed() -> Result<()> {
        let actor = build::<PpoGaussianActor>(2)?;
        let mut rng = SmallRng::seed_from_u64(0);
        let obs = Tensor::new(&[[0.1f32, 0.2, 0.3], [1.0, -1.0, 0.5]], &Device::Cpu)?;
        let decisions = actor.sample(&obs, &mut rng)?;
        assert!(decisions.iter().all(|d| d.act.iter().all(|a| a.abs() <= 1.0)));

        let act = rows(&decisions, |d| d.stored_act.clone())?;
        let noise = rows(&decisions, |d| d.aux.clone())?;
        let old = actor.old_log_prob(&act, &noise)?.to_vec2::<f32>()?;
        let (new, _) = actor.log_prob_entropy(&obs, &act)?;
        for (o, n) in old.iter().zip(new.to_vec2::<f32>()?.iter()) {
            assert!((o[0] - n[0]).abs() < 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_gaussian_log_prob_at_mean() -> Result<()> {
        let actor = build::<PpoGaussianActor>(2)?;
        let obs = Tensor::new(&[[0.1f32, 0.2, 0.3]], &Device::Cpu)?;
        let mean = actor.mean(&obs)?;
        let (logp, _) = actor.log_prob_entropy(&obs, &mean)?;
        let expected = 2.0 * (0.5 - LOG_SQRT_2PI) as f32;
        assert!((logp.to_vec2::<f32>()?[0][0] - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_discrete_sample_and_log_prob() -> Result<()> {
        let actor = build::<PpoDiscreteActor>(4)?;
        let mut rng = SmallRng::seed_from_u64(0);
        let obs = Tensor::new(&[[0.1f32, 0.2, 0.3], [1.0, -1.0, 0.5]], &Device::Cpu)?;
        let decisions = actor.sample(&obs, &mut rng)?;
        for d in decisions.iter() {
            assert!((0..4).contains(&d.act));
            assert_eq!(d.stored_act, vec![d.act as f32]);
            assert!((d.aux.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }

        let act = rows(&decisions, |d| d.stored_act.clone())?;
        let probs = rows(&decisions, |d| d.aux.clone())?;
        let old = actor.old_log_prob(&act, &probs)?.to_vec2::<f32>()?;
        let (new, entropy) = actor.log_prob_entropy(&obs, &act)?;
        for (o, n) in old.iter().zip(new.to_vec2::<f32>()?.iter()) {
            assert!((o[0] - n[0]).abs() < 1e-4);
        }
        // Entropy of a categorical over 4 actions is at most ln 4
        let entropy = entropy.to_scalar::<f32>()?;
        assert!(entropy > 0.0 && entropy <= 4f32.ln() + 1e-5);
        Ok(())
    }
}
