//! Interface of function approximators used in RL agents.
//!
//! Approximators do not own their [`VarMap`]; they are built from a
//! [`VarBuilder`], so that an agent can create independent copies (target
//! networks) and enumerate their parameters.
//!
//! [`VarMap`]: candle_nn::VarMap
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::VarBuilder;

/// A model constructed from a [`VarBuilder`] and a configuration.
pub trait ModelBase: Sized {
    /// Configuration from which the model is constructed.
    type Config: Clone;

    /// Builds the model.
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>;

    /// Learning rate multiplier of the parameter with the given name.
    ///
    /// Names are the keys of the [`VarMap`](candle_nn::VarMap) the model was
    /// built in. Optimizers group parameters by this value.
    fn lr_scale(name: &str) -> f64 {
        let _ = name;
        1.0
    }
}

/// Model with a single input.
pub trait SubModel1: ModelBase {
    /// Output of the model.
    type Output;

    /// A generalized forward function.
    fn forward(&self, xs: &Tensor) -> Result<Self::Output>;
}

/// Model with two inputs, typically an observation and an action.
pub trait SubModel2: ModelBase {
    /// Output of the model.
    type Output;

    /// A generalized forward function.
    fn forward(&self, x1: &Tensor, x2: &Tensor) -> Result<Self::Output>;
}

/// Two independently parameterized copies of a model.
///
/// The copies live in the same [`VarMap`](candle_nn::VarMap) under the
/// prefixes `q1` and `q2`, so that one optimizer trains both.
pub struct Twin<Q> {
    q1: Q,
    q2: Q,
}

impl<Q: ModelBase> ModelBase for Twin<Q> {
    type Config = Q::Config;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        Ok(Self {
            q1: Q::build(vb.pp("q1"), config.clone())?,
            q2: Q::build(vb.pp("q2"), config)?,
        })
    }
}

impl<Q> Twin<Q> {
    /// The first model.
    pub fn q1(&self) -> &Q {
        &self.q1
    }

    /// The second model.
    pub fn q2(&self) -> &Q {
        &self.q2
    }
}

impl<Q: SubModel1<Output = Tensor>> Twin<Q> {
    /// Evaluates both models on observations.
    pub fn qs(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        Ok((self.q1.forward(obs)?, self.q2.forward(obs)?))
    }
}

impl<Q: SubModel2<Output = Tensor>> Twin<Q> {
    /// Evaluates both models on observation-action pairs.
    pub fn qs_with_act(&self, obs: &Tensor, act: &Tensor) -> Result<(Tensor, Tensor)> {
        Ok((self.q1.forward(obs, act)?, self.q2.forward(obs, act)?))
    }

    /// Elementwise minimum of both models on observation-action pairs.
    pub fn min_q(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let (q1, q2) = self.qs_with_act(obs, act)?;
        Ok(q1.broadcast_minimum(&q2)?)
    }
}

/// Deterministic actor and Q-function sharing one network.
pub trait SharedDpgModel: ModelBase {
    /// Action in `[-1, 1]`.
    fn act(&self, obs: &Tensor) -> Result<Tensor>;

    /// Action value of shape `[batch, 1]`.
    fn critic(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor>;
}

/// Gaussian policy and twin Q-functions sharing one network.
pub trait SharedSacModel: ModelBase {
    /// Mean and log standard deviation of the pre-squash Gaussian policy.
    fn policy(&self, obs: &Tensor) -> Result<(Tensor, Tensor)>;

    /// Both action values, each of shape `[batch, 1]`.
    fn q1_q2(&self, obs: &Tensor, act: &Tensor) -> Result<(Tensor, Tensor)>;
}

/// Gaussian policy and state-value function sharing one network.
pub trait SharedPpoModel: ModelBase {
    /// Mean of the Gaussian policy.
    fn action_mean(&self, obs: &Tensor) -> Result<Tensor>;

    /// State value of shape `[batch, 1]`.
    fn value(&self, obs: &Tensor) -> Result<Tensor>;

    /// State-independent log standard deviation of shape `[1, action_dim]`.
    fn log_std(&self) -> Result<Tensor>;
}
